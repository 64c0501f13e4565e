//! Definitions of Solidity functions called during deployment

use alloy::sol;

sol! {
    /// Points an EIP-173 proxy at a new implementation, callable by the proxy owner
    function upgradeTo(address newImplementation) external;
}
