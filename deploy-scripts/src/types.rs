//! Type definitions used throughout the scripts

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use alloy::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use serde::{Deserialize, Serialize};

use crate::constants::{PERMIT2, PYTH, UNISWAP_QUOTER_V2, UNISWAP_SWAP_ROUTER, UNISWAP_V3_FACTORY};

/// Library name -> deployed library address, substituted into dependent bytecode
pub type LibraryLinks = BTreeMap<String, Address>;

/// The persisted result of a successful deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRecord {
    /// The address the contract lives at. For proxied contracts this is the proxy
    pub address: Address,
    /// The contract interface. For proxied contracts this is the implementation's ABI
    pub abi: JsonAbi,
    /// The transaction that produced the current state of this record
    pub transaction_hash: B256,
    /// The address arguments passed to the constructor, or to the initializer
    /// for proxied contracts
    #[serde(default)]
    pub args: Vec<Address>,
    /// keccak256 of the creation code (linked bytecode + encoded constructor arguments)
    pub bytecode_hash: B256,
    /// The libraries linked into the bytecode
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub libraries: LibraryLinks,
    /// The implementation behind the proxy, if this contract is proxied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    /// The initializer the proxy constructor executed, on `_Proxy` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<ExecutedCall>,
}

/// A method call a deployment executed on chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedCall {
    /// The method name
    pub method_name: String,
    /// The address arguments the method was called with
    pub args: Vec<Address>,
}

/// The state of an upgradeable contract after its deploy step ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyInstance {
    /// The proxy's address
    pub proxy_address: Address,
    /// The implementation the proxy forwards to
    pub implementation_address: Address,
    /// Whether the initializer ran during this step, i.e. the proxy was constructed
    pub initializer_called: bool,
}

/// An external contract whose address is an input to the deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExternalContract {
    /// The Uniswap V3 factory
    UniswapFactory,
    /// The Uniswap V3 swap router
    SwapRouter,
    /// The Uniswap quoter
    QuoterV2,
    /// The Pyth price oracle
    Pyth,
    /// The Permit2 contract
    Permit2,
    /// The identity allowed to fill market orders
    Filler,
}

impl Display for ExternalContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalContract::UniswapFactory => write!(f, "UniswapV3Factory"),
            ExternalContract::SwapRouter => write!(f, "SwapRouter"),
            ExternalContract::QuoterV2 => write!(f, "QuoterV2"),
            ExternalContract::Pyth => write!(f, "Pyth"),
            ExternalContract::Permit2 => write!(f, "Permit2"),
            ExternalContract::Filler => write!(f, "Filler"),
        }
    }
}

/// An address argument to a constructor or initializer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployArg {
    /// The address of a contract deployed by an earlier step
    Deployment(&'static str),
    /// The address of a contract outside of this deployment
    External(ExternalContract),
}

/// The static table of external addresses consumed by the deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressBook {
    /// The Uniswap V3 factory
    pub uniswap_factory: Address,
    /// The Uniswap V3 swap router
    pub swap_router: Address,
    /// The Uniswap quoter
    pub quoter_v2: Address,
    /// The Pyth price oracle
    pub pyth: Address,
    /// The Permit2 contract
    pub permit2: Address,
    /// The filler identity, which has no canonical value and must be supplied
    pub filler: Option<Address>,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self {
            uniswap_factory: UNISWAP_V3_FACTORY,
            swap_router: UNISWAP_SWAP_ROUTER,
            quoter_v2: UNISWAP_QUOTER_V2,
            pyth: PYTH,
            permit2: PERMIT2,
            filler: None,
        }
    }
}

impl AddressBook {
    /// Set the filler identity
    pub fn with_filler(mut self, filler: Option<Address>) -> Self {
        self.filler = filler;
        self
    }

    /// Look up an external address, `None` if it was never configured
    pub fn resolve(&self, contract: ExternalContract) -> Option<Address> {
        match contract {
            ExternalContract::UniswapFactory => Some(self.uniswap_factory),
            ExternalContract::SwapRouter => Some(self.swap_router),
            ExternalContract::QuoterV2 => Some(self.quoter_v2),
            ExternalContract::Pyth => Some(self.pyth),
            ExternalContract::Permit2 => Some(self.permit2),
            ExternalContract::Filler => self.filler,
        }
    }
}
