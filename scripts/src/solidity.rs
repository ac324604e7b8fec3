//! Definitions of Solidity functions called during upgrades

use alloy::sol;

sol! {
    /// Repoint a UUPS proxy, called on the proxy itself
    function upgradeToAndCall(address newImplementation, bytes memory data) external payable;

    /// Repoint a transparent proxy, called on its `ProxyAdmin`
    function upgradeAndCall(address proxy, address implementation, bytes memory data) external payable;
}
