//! An in-memory chain implementing just enough EVM semantics for the deploy
//! scripts: contract creation at nonce-derived addresses, EIP-173 proxy
//! construction and upgrades, and storage reads.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{keccak256, Address, Bytes, B256},
    sol_types::SolCall,
};
use deploy_scripts::{
    client::{ChainClient, TxOutcome},
    constants::{NUM_BYTES_ADDRESS, PROXY_IMPLEMENTATION_STORAGE_SLOT},
    errors::ScriptError,
    solidity::upgradeToCall,
};
use tracing::debug;

/// The chain ID the mock reports
pub const MOCK_CHAIN_ID: u64 = 31337;

/// The initializer call made by a proxy's constructor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitializerCall {
    /// The proxy that was constructed
    pub proxy: Address,
    /// The implementation the call was delegated to
    pub implementation: Address,
    /// The owner the proxy was constructed with
    pub owner: Address,
    /// The calldata, including the selector
    pub calldata: Bytes,
}

/// An `upgradeTo` call on a proxy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upgrade {
    /// The upgraded proxy
    pub proxy: Address,
    /// The implementation before the upgrade
    pub from: Address,
    /// The implementation after the upgrade
    pub to: Address,
}

/// The mutable state of the chain
#[derive(Default)]
struct ChainState {
    /// The deployer's nonce
    nonce: u64,
    /// The number of transactions mined
    tx_count: usize,
    /// Contract address -> creation code
    code: HashMap<Address, Bytes>,
    /// Contract storage
    storage: HashMap<(Address, B256), B256>,
    /// Proxy address -> owner
    proxy_owners: HashMap<Address, Address>,
    /// Every initializer run by a proxy constructor
    initializer_calls: Vec<InitializerCall>,
    /// Every proxy upgrade
    upgrades: Vec<Upgrade>,
    /// The number of transactions to accept before failing every other one
    fail_after: Option<usize>,
}

/// An in-memory [`ChainClient`]
pub struct MockChain {
    /// The sending account
    deployer: Address,
    /// The creation bytecode of the proxy contract, used to recognize proxy constructions
    proxy_bytecode: Bytes,
    /// The chain state
    state: Mutex<ChainState>,
}

impl MockChain {
    /// A fresh chain recognizing proxies by `proxy_bytecode`
    pub fn new(proxy_bytecode: Bytes) -> Self {
        Self {
            deployer: Address::repeat_byte(0xde),
            proxy_bytecode,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// The number of transactions mined so far
    pub fn tx_count(&self) -> usize {
        self.state().tx_count
    }

    /// Every initializer run by a proxy constructor, in order
    pub fn initializer_calls(&self) -> Vec<InitializerCall> {
        self.state().initializer_calls.clone()
    }

    /// Every proxy upgrade, in order
    pub fn upgrades(&self) -> Vec<Upgrade> {
        self.state().upgrades.clone()
    }

    /// The creation code a contract was deployed with
    pub fn creation_code(&self, address: Address) -> Option<Bytes> {
        self.state().code.get(&address).cloned()
    }

    /// The owner a proxy was constructed with
    pub fn proxy_owner(&self, proxy: Address) -> Option<Address> {
        self.state().proxy_owners.get(&proxy).copied()
    }

    /// Overwrite a storage slot
    pub fn set_storage(&self, address: Address, slot: B256, value: B256) {
        self.state().storage.insert((address, slot), value);
    }

    /// Accept `n` more transactions, then fail every following one.
    /// `None` lifts the limit
    pub fn fail_after(&self, n: Option<usize>) {
        let mut state = self.state();
        let mined = state.tx_count;
        state.fail_after = n.map(|n| mined + n);
    }

    /// Drop every contract and all storage, as a restarted development node does
    pub fn wipe(&self) {
        let mut state = self.state();
        state.code.clear();
        state.storage.clear();
        state.proxy_owners.clear();
    }

    // -----------
    // | HELPERS |
    // -----------

    /// Lock the chain state
    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    /// Mine a transaction, failing it if the failure limit is reached
    fn mine(state: &mut ChainState) -> Result<B256, ScriptError> {
        if state.fail_after.is_some_and(|limit| state.tx_count >= limit) {
            return Err(ScriptError::TransactionFailure(
                "transaction reverted: injected failure".to_string(),
            ));
        }

        state.tx_count += 1;
        Ok(keccak256((state.tx_count as u64).to_be_bytes()))
    }

    /// Run a proxy constructor: store the implementation and delegate the initializer
    fn construct_proxy(
        state: &mut ChainState,
        proxy: Address,
        constructor_args: &[u8],
    ) -> Result<(), ScriptError> {
        let decoded = DynSolType::Tuple(vec![
            DynSolType::Address,
            DynSolType::Address,
            DynSolType::Bytes,
        ])
        .abi_decode_params(constructor_args)
        .map_err(|e| ScriptError::TransactionFailure(e.to_string()))?;

        let DynSolValue::Tuple(values) = decoded else {
            return Err(ScriptError::TransactionFailure("bad proxy arguments".to_string()));
        };
        let [DynSolValue::Address(implementation), DynSolValue::Address(owner), DynSolValue::Bytes(data)] =
            values.as_slice()
        else {
            return Err(ScriptError::TransactionFailure("bad proxy arguments".to_string()));
        };

        if !state.code.contains_key(implementation) {
            return Err(ScriptError::TransactionFailure(
                "proxy implementation has no code".to_string(),
            ));
        }

        state
            .storage
            .insert((proxy, PROXY_IMPLEMENTATION_STORAGE_SLOT), implementation.into_word());
        state.proxy_owners.insert(proxy, *owner);
        if !data.is_empty() {
            state.initializer_calls.push(InitializerCall {
                proxy,
                implementation: *implementation,
                owner: *owner,
                calldata: Bytes::from(data.clone()),
            });
        }

        debug!("Constructed proxy {:#x} -> {:#x}", proxy, implementation);
        Ok(())
    }

    /// Run `upgradeTo` on a proxy
    fn upgrade_proxy(
        state: &mut ChainState,
        sender: Address,
        proxy: Address,
        calldata: &[u8],
    ) -> Result<(), ScriptError> {
        if state.proxy_owners.get(&proxy) != Some(&sender) {
            return Err(ScriptError::TransactionFailure(
                "upgradeTo reverted: not the proxy owner".to_string(),
            ));
        }
        let offset = upgradeToCall::SELECTOR.len() + 32 - NUM_BYTES_ADDRESS;
        let Some(word) = calldata.get(offset..offset + NUM_BYTES_ADDRESS) else {
            return Err(ScriptError::TransactionFailure("bad upgradeTo calldata".to_string()));
        };
        let implementation = Address::from_slice(word);
        if !state.code.contains_key(&implementation) {
            return Err(ScriptError::TransactionFailure(
                "upgradeTo reverted: implementation has no code".to_string(),
            ));
        }

        let slot = (proxy, PROXY_IMPLEMENTATION_STORAGE_SLOT);
        let from = state
            .storage
            .insert(slot, implementation.into_word())
            .map(Address::from_word)
            .unwrap_or_default();
        state.upgrades.push(Upgrade {
            proxy,
            from,
            to: implementation,
        });
        Ok(())
    }
}

impl ChainClient for MockChain {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn chain_id(&self) -> Result<u64, ScriptError> {
        Ok(MOCK_CHAIN_ID)
    }

    async fn deploy(&self, creation_code: Bytes) -> Result<TxOutcome, ScriptError> {
        let mut state = self.state();
        let tx_hash = Self::mine(&mut state)?;

        let address = self.deployer.create(state.nonce);
        state.nonce += 1;
        if let Some(args) = creation_code.strip_prefix(&self.proxy_bytecode[..]) {
            Self::construct_proxy(&mut state, address, args)?;
        }
        state.code.insert(address, creation_code);

        Ok(TxOutcome {
            tx_hash,
            contract_address: Some(address),
        })
    }

    async fn send(&self, to: Address, calldata: Bytes) -> Result<TxOutcome, ScriptError> {
        let mut state = self.state();
        let tx_hash = Self::mine(&mut state)?;
        state.nonce += 1;

        if calldata.starts_with(&upgradeToCall::SELECTOR) {
            Self::upgrade_proxy(&mut state, self.deployer, to, &calldata)?;
        }

        Ok(TxOutcome {
            tx_hash,
            contract_address: None,
        })
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ScriptError> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ScriptError> {
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }
}
