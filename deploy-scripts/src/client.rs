//! The chain client: the transaction and state primitives deployments are built on

use std::str::FromStr;

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, Bytes, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use tracing::debug;

use crate::{
    errors::ScriptError,
    network::{GasPolicy, NetworkProfile, SignerSource},
};

/// The outcome of a confirmed, successful transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxOutcome {
    /// The transaction hash
    pub tx_hash: B256,
    /// The address of the created contract, for deployments
    pub contract_address: Option<Address>,
}

/// The operations the sequencer needs from a chain.
///
/// Every transaction method resolves only once the transaction is confirmed,
/// and fails with [`ScriptError::TransactionFailure`] if it reverted.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// The account transactions are sent from
    fn deployer(&self) -> Address;

    /// The chain ID reported by the node
    async fn chain_id(&self) -> Result<u64, ScriptError>;

    /// Send a contract creation transaction with the given creation code
    async fn deploy(&self, creation_code: Bytes) -> Result<TxOutcome, ScriptError>;

    /// Send a call transaction
    async fn send(&self, to: Address, calldata: Bytes) -> Result<TxOutcome, ScriptError>;

    /// The runtime code at an address, empty if there is no contract
    async fn code_at(&self, address: Address) -> Result<Bytes, ScriptError>;

    /// A storage slot of a contract
    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError>;
}

/// A [`ChainClient`] talking to a JSON-RPC node
#[derive(Clone)]
pub struct RpcClient {
    /// The provider, with a wallet attached when signing locally
    provider: DynProvider<Ethereum>,
    /// The account transactions are sent from
    deployer: Address,
    /// Gas overrides applied to every transaction
    gas: GasPolicy,
    /// The number of confirmations to wait for
    confirmations: u64,
}

impl RpcClient {
    /// Connect to the network described by `profile`
    pub async fn connect(profile: &NetworkProfile, confirmations: u64) -> Result<Self, ScriptError> {
        let url = Url::parse(&profile.rpc_url)
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        let (provider, deployer) = match &profile.signer {
            SignerSource::PrivateKey(key) => {
                let signer = PrivateKeySigner::from_str(key)
                    .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
                let deployer = signer.address();
                let provider = ProviderBuilder::new().wallet(signer).connect_http(url);
                (DynProvider::new(provider), deployer)
            }
            SignerSource::NodeAccount => {
                let provider = ProviderBuilder::new().connect_http(url);
                let deployer = provider
                    .get_accounts()
                    .await
                    .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        ScriptError::ClientInitialization(
                            "node has no unlocked accounts, set PRIVATE_KEY".to_string(),
                        )
                    })?;
                (DynProvider::new(provider), deployer)
            }
        };

        debug!("Connected to {} as {:#x}", profile.network, deployer);
        Ok(Self {
            provider,
            deployer,
            gas: profile.gas,
            confirmations,
        })
    }

    /// Apply the sender and gas policy to a transaction
    fn prepare(&self, tx: TransactionRequest) -> TransactionRequest {
        let mut tx = tx.with_from(self.deployer);
        if let Some(gas_price) = self.gas.gas_price {
            tx = tx.with_gas_price(gas_price);
        }
        if let Some(gas_limit) = self.gas.gas_limit {
            tx = tx.with_gas_limit(gas_limit);
        }
        tx
    }

    /// Send a transaction and wait for a successful receipt
    async fn send_and_confirm(&self, tx: TransactionRequest) -> Result<TransactionReceipt, ScriptError> {
        let receipt = self
            .provider
            .send_transaction(self.prepare(tx))
            .await
            .map_err(|e| ScriptError::TransactionFailure(e.to_string()))?
            .with_required_confirmations(self.confirmations)
            .get_receipt()
            .await
            .map_err(|e| ScriptError::TransactionFailure(e.to_string()))?;

        if !receipt.status() {
            return Err(ScriptError::TransactionFailure(format!(
                "transaction {:#x} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

impl ChainClient for RpcClient {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn chain_id(&self) -> Result<u64, ScriptError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))
    }

    async fn deploy(&self, creation_code: Bytes) -> Result<TxOutcome, ScriptError> {
        let tx = TransactionRequest::default().with_deploy_code(creation_code);
        let receipt = self.send_and_confirm(tx).await?;

        let contract_address = receipt.contract_address.ok_or_else(|| {
            ScriptError::TransactionFailure(format!(
                "no contract created by {:#x}",
                receipt.transaction_hash
            ))
        })?;
        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            contract_address: Some(contract_address),
        })
    }

    async fn send(&self, to: Address, calldata: Bytes) -> Result<TxOutcome, ScriptError> {
        let tx = TransactionRequest::default().with_to(to).with_input(calldata);
        let receipt = self.send_and_confirm(tx).await?;
        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            contract_address: None,
        })
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ScriptError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError> {
        let value = self
            .provider
            .get_storage_at(address, U256::from_be_slice(slot.as_slice()))
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }
}
