//! Type definitions used throughout the scripts

use std::fmt::{self, Display};

use alloy::primitives::{Address, TxHash};
use clap::ValueEnum;
use serde::Deserialize;

use crate::constants::{DEFAULT_TRANSPARENT_PROXY_CONTRACT, DEFAULT_UUPS_PROXY_CONTRACT};

/// The upgrade pattern implemented by a proxied contract
#[derive(ValueEnum, Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// An ERC1967 proxy whose implementation carries the upgrade logic
    #[default]
    Uups,
    /// A `TransparentUpgradeableProxy`, upgraded through its `ProxyAdmin`
    Transparent,
}

impl ProxyKind {
    /// The name of the proxy contract deployed for this kind
    pub fn default_proxy_contract(&self) -> &'static str {
        match self {
            ProxyKind::Uups => DEFAULT_UUPS_PROXY_CONTRACT,
            ProxyKind::Transparent => DEFAULT_TRANSPARENT_PROXY_CONTRACT,
        }
    }
}

impl Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Uups => write!(f, "uups"),
            ProxyKind::Transparent => write!(f, "transparent"),
        }
    }
}

/// A contract whose creation transaction has been confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    /// The address of the new contract
    pub address: Address,
    /// The hash of the creation transaction
    pub tx_hash: TxHash,
}

/// An implementation contract deployed and initialized behind a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDeployment {
    /// The proxy, the contract's stable address
    pub proxy: DeployedContract,
    /// The implementation the proxy delegates to
    pub implementation: DeployedContract,
}
