//! Network profiles: RPC endpoint, chain ID, signer source and gas policy per network

use std::fmt::{self, Debug, Display};

use clap::ValueEnum;

use crate::errors::ScriptError;

/// One gwei, in wei
const GWEI: u128 = 1_000_000_000;

/// The networks the protocol can be deployed to
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Network {
    /// A local development node
    Localhost,
    /// The Sepolia testnet
    Sepolia,
    /// The Goerli testnet
    Goerli,
    /// Ethereum mainnet
    Mainnet,
    /// Gnosis chain
    Xdai,
    /// Polygon PoS
    Matic,
    /// Arbitrum One
    Arbitrum,
    /// The Arbitrum Goerli testnet
    #[value(name = "goerliArbitrum")]
    GoerliArbitrum,
    /// The Optimism Kovan testnet
    #[value(name = "kovanOptimism")]
    KovanOptimism,
    /// OP mainnet
    Optimism,
    /// Base mainnet
    BaseMainnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Localhost => write!(f, "localhost"),
            Network::Sepolia => write!(f, "sepolia"),
            Network::Goerli => write!(f, "goerli"),
            Network::Mainnet => write!(f, "mainnet"),
            Network::Xdai => write!(f, "xdai"),
            Network::Matic => write!(f, "matic"),
            Network::Arbitrum => write!(f, "arbitrum"),
            Network::GoerliArbitrum => write!(f, "goerliArbitrum"),
            Network::KovanOptimism => write!(f, "kovanOptimism"),
            Network::Optimism => write!(f, "optimism"),
            Network::BaseMainnet => write!(f, "base-mainnet"),
        }
    }
}

/// Where a network's RPC endpoint comes from
enum RpcEndpoint {
    /// A fixed public endpoint
    Url(&'static str),
    /// An Infura endpoint under the given subdomain, keyed by `INFURA_API_KEY`
    Infura(&'static str),
}

impl Network {
    /// The chain ID the network is expected to report
    pub fn chain_id(self) -> u64 {
        match self {
            Network::Localhost => 31337,
            Network::Sepolia => 11155111,
            Network::Goerli => 5,
            Network::Mainnet => 1,
            Network::Xdai => 100,
            Network::Matic => 137,
            Network::Arbitrum => 42161,
            Network::GoerliArbitrum => 421613,
            Network::KovanOptimism => 69,
            Network::Optimism => 10,
            Network::BaseMainnet => 8453,
        }
    }

    /// Whether deploying here moves real funds, in which case the operator confirms first
    pub fn is_production(self) -> bool {
        matches!(
            self,
            Network::Mainnet
                | Network::Xdai
                | Network::Matic
                | Network::Arbitrum
                | Network::Optimism
                | Network::BaseMainnet
        )
    }

    /// The gas settings transactions on this network are sent with
    pub fn gas_policy(self) -> GasPolicy {
        match self {
            Network::Xdai
            | Network::Matic
            | Network::KovanOptimism
            | Network::BaseMainnet => GasPolicy {
                gas_price: Some(GWEI),
                gas_limit: None,
            },
            Network::GoerliArbitrum => GasPolicy {
                gas_price: Some(2 * GWEI),
                gas_limit: Some(50_000_000),
            },
            _ => GasPolicy::default(),
        }
    }

    /// The Etherscan-compatible explorer API contracts are verified through,
    /// `None` for networks without one
    pub fn explorer_api(self) -> Option<&'static str> {
        match self {
            Network::Localhost => None,
            Network::Sepolia => Some("https://api-sepolia.etherscan.io/api"),
            Network::Goerli => Some("https://api-goerli.etherscan.io/api"),
            Network::Mainnet => Some("https://api.etherscan.io/api"),
            Network::Xdai => Some("https://api.gnosisscan.io/api"),
            Network::Matic => Some("https://api.polygonscan.com/api"),
            Network::Arbitrum => Some("https://api.arbiscan.io/api"),
            Network::GoerliArbitrum => Some("https://api-testnet.arbiscan.io/api"),
            Network::KovanOptimism => Some("https://api-kovan-optimistic.etherscan.io/api"),
            Network::Optimism => Some("https://api-optimistic.etherscan.io/api"),
            Network::BaseMainnet => Some("https://api.basescan.org/api"),
        }
    }

    /// The RPC endpoint of the network
    fn endpoint(self) -> RpcEndpoint {
        match self {
            Network::Localhost => RpcEndpoint::Url("http://127.0.0.1:8545"),
            Network::Sepolia => RpcEndpoint::Infura("sepolia"),
            Network::Goerli => RpcEndpoint::Infura("goerli"),
            Network::Mainnet => RpcEndpoint::Infura("mainnet"),
            Network::Xdai => RpcEndpoint::Url("https://rpc.xdaichain.com/"),
            Network::Matic => RpcEndpoint::Url("https://rpc-mainnet.maticvigil.com/"),
            Network::Arbitrum => RpcEndpoint::Url("https://arb1.arbitrum.io/rpc"),
            Network::GoerliArbitrum => RpcEndpoint::Url("https://goerli-rollup.arbitrum.io/rpc"),
            Network::KovanOptimism => RpcEndpoint::Infura("optimism-kovan"),
            Network::Optimism => RpcEndpoint::Infura("optimism-mainnet"),
            Network::BaseMainnet => RpcEndpoint::Url("https://mainnet.base.org"),
        }
    }
}

/// Gas overrides applied to every transaction; `None` leaves the value to the node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPolicy {
    /// A fixed gas price, in wei
    pub gas_price: Option<u128>,
    /// A fixed gas limit
    pub gas_limit: Option<u64>,
}

/// The account transactions are sent from
#[derive(Clone, PartialEq, Eq)]
pub enum SignerSource {
    /// A local private key, in hex
    PrivateKey(String),
    /// The first account unlocked on the node
    NodeAccount,
}

impl Debug for SignerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerSource::PrivateKey(_) => write!(f, "PrivateKey(<redacted>)"),
            SignerSource::NodeAccount => write!(f, "NodeAccount"),
        }
    }
}

/// Everything needed to talk to a network, fixed for the duration of a run
#[derive(Clone, Debug)]
pub struct NetworkProfile {
    /// The network
    pub network: Network,
    /// The RPC URL
    pub rpc_url: String,
    /// The chain ID the RPC endpoint must report
    pub chain_id: u64,
    /// The account deployments are sent from
    pub signer: SignerSource,
    /// Gas overrides
    pub gas: GasPolicy,
}

impl NetworkProfile {
    /// Build the profile for a network.
    ///
    /// `rpc_url` overrides the network's default endpoint. Every network but
    /// `localhost` requires a private key; `localhost` falls back to the node's
    /// first unlocked account.
    pub fn resolve(
        network: Network,
        rpc_url: Option<String>,
        infura_key: Option<&str>,
        private_key: Option<String>,
    ) -> Result<Self, ScriptError> {
        let rpc_url = match (rpc_url, network.endpoint()) {
            (Some(url), _) => url,
            (None, RpcEndpoint::Url(url)) => url.to_string(),
            (None, RpcEndpoint::Infura(subdomain)) => {
                let key = infura_key.ok_or_else(|| {
                    ScriptError::Config(format!(
                        "network `{}` uses Infura, set INFURA_API_KEY or pass --rpc-url",
                        network
                    ))
                })?;
                format!("https://{}.infura.io/v3/{}", subdomain, key)
            }
        };

        let signer = match private_key {
            Some(key) => SignerSource::PrivateKey(key),
            None if network == Network::Localhost => SignerSource::NodeAccount,
            None => {
                return Err(ScriptError::Config(format!(
                    "network `{}` requires a deployer key, set PRIVATE_KEY",
                    network
                )))
            }
        };

        Ok(Self {
            network,
            rpc_url,
            chain_id: network.chain_id(),
            signer,
            gas: network.gas_policy(),
        })
    }
}
