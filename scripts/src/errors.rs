//! Definitions of errors that can occur during the execution of the contract management scripts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the contract management scripts
#[derive(Debug)]
pub enum ScriptError {
    /// The deployment ledger does not exist at the given path
    MissingLedger(String),
    /// Error parsing the deployment ledger
    LedgerFormat(String),
    /// Error writing the deployment ledger
    WriteLedger(String),
    /// Error acquiring the deployment ledger lock
    LedgerLock(String),
    /// The named proxy is absent from the ledger, or has no address
    ProxyNotFound(String),
    /// There is no signer at the requested index
    SignerNotFound {
        /// The requested signer index
        index: usize,
        /// The number of signers available
        available: usize,
    },
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error locating or parsing a Solidity compilation artifact
    ArtifactParsing(String),
    /// Error loading the deployment plan
    Config(String),
    /// Error constructing calldata for a contract method or constructor
    CalldataConstruction(String),
    /// A transaction reverted, either when mined or during gas estimation
    TransactionReverted(String),
    /// A transaction could not be submitted or confirmed
    TransactionFailed(String),
    /// Error deploying a contract
    DeploymentFailed(String),
    /// The initializer of a contract deployed behind a proxy reverted
    InitializationFailed(String),
    /// Error calling a contract method or reading contract state
    ContractInteraction(String),
    /// Error submitting a contract for source verification
    Verification(String),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::MissingLedger(s) => {
                write!(f, "deployment ledger not found at {}, run deploy first", s)
            }
            ScriptError::LedgerFormat(s) => write!(f, "error parsing deployment ledger: {}", s),
            ScriptError::WriteLedger(s) => write!(f, "error writing deployment ledger: {}", s),
            ScriptError::LedgerLock(s) => write!(f, "error locking deployment ledger: {}", s),
            ScriptError::ProxyNotFound(s) => write!(f, "proxy `{}` not found in ledger", s),
            ScriptError::SignerNotFound { index, available } => write!(
                f,
                "no signer at index {} ({} signers available)",
                index, available
            ),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::Config(s) => write!(f, "error loading deployment plan: {}", s),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {}", s),
            ScriptError::TransactionReverted(s) => write!(f, "transaction reverted: {}", s),
            ScriptError::TransactionFailed(s) => write!(f, "transaction failed: {}", s),
            ScriptError::DeploymentFailed(s) => write!(f, "error deploying contract: {}", s),
            ScriptError::InitializationFailed(s) => {
                write!(f, "error initializing contract behind proxy: {}", s)
            }
            ScriptError::ContractInteraction(s) => {
                write!(f, "error interacting with contract: {}", s)
            }
            ScriptError::Verification(s) => write!(f, "error verifying contract: {}", s),
        }
    }
}

impl Error for ScriptError {}
