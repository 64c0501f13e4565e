//! Constants used in the deploy scripts

use std::time::Duration;

use alloy::primitives::{address, b256, Address, B256};

/// The Uniswap V3 factory, passed to `PredyPool.initialize`
pub const UNISWAP_V3_FACTORY: Address = address!("1F98431c8aD98523631AE4a59f267346ea31F984");

/// The Uniswap V3 `SwapRouter`, used by the Uniswap settlement
pub const UNISWAP_SWAP_ROUTER: Address = address!("E592427A0AEce92De3Edee1F18E0157C05861564");

/// The Uniswap `QuoterV2`, used by the Uniswap settlement
pub const UNISWAP_QUOTER_V2: Address = address!("61fFE014bA17989E743c5F6cB21bF9697530B21e");

/// The Pyth price oracle gateway, used by the price feed factory
pub const PYTH: Address = address!("ff1a0f4744e8582DF1aE09D5611b887B6a12925C");

/// The canonical Permit2 deployment, identical on every supported chain
pub const PERMIT2: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

/// The storage slot containing the implementation address of an EIP-1967 proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const PROXY_IMPLEMENTATION_STORAGE_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The number of confirmations to wait for on each deployment transaction
pub const NUM_DEPLOY_CONFIRMATIONS: u64 = 1;

/// The proxy contract installed in front of upgradeable contracts
pub const PROXY_CONTRACT_NAME: &str = "EIP173Proxy";

/// The initializer invoked through the proxy's construction data
pub const INITIALIZER_METHOD: &str = "initialize";

/// Suffix of the registry record holding a proxied contract's implementation
pub const IMPLEMENTATION_SUFFIX: &str = "_Implementation";

/// Suffix of the registry record holding a proxied contract's proxy
pub const PROXY_SUFFIX: &str = "_Proxy";

/// The extension of deployment record and artifact files
pub const JSON_EXTENSION: &str = "json";

/// The file in a network's deployments directory recording its chain ID
pub const CHAIN_ID_FILE: &str = ".chainId";

/// The default directory holding the per-network deployment records
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// The default directory holding the compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "out";

/// The artifact directory suffix used by the Solidity compiler output layout,
/// i.e. `out/<Name>.sol/<Name>.json`
pub const ARTIFACT_SOURCE_EXTENSION: &str = "sol";

/// The prefix of an unresolved library placeholder in hex bytecode
pub const LIBRARY_PLACEHOLDER_PREFIX: &str = "__$";

/// The `codeformat` of a verification submitting standard JSON compiler input
pub const STANDARD_JSON_CODE_FORMAT: &str = "solidity-standard-json-input";

/// How long to wait between verification status checks
pub const VERIFICATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How many times a pending verification is checked before giving up
pub const VERIFICATION_MAX_POLLS: usize = 24;

/// The timeout of a single block explorer request
pub const EXPLORER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The contracts whose events are exported for indexers
pub const EVENT_ABI_CONTRACTS: [&str; 10] = [
    "PredyPool",
    "ApplyInterestLib",
    "AddPairLogic",
    "LiquidationLogic",
    "ReallocationLogic",
    "SupplyLogic",
    "TradeLogic",
    "VaultLib",
    "Perp",
    "ScaledAsset",
];
