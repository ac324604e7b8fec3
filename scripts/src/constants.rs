//! Constants used in the deploy scripts

use alloy::primitives::{b256, B256};

/// The default path of the deployment ledger
pub const DEFAULT_LEDGER_PATH: &str = "deployedAddresses.json";

/// The default path of the deployment plan
pub const DEFAULT_PLAN_PATH: &str = "deploy.toml";

/// The default path of the Hardhat artifacts directory
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The default RPC URL, a local Hardhat / Anvil node
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// The log filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info";

/// The suffix appended to the ledger path to obtain its lock file
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// The storage slot containing the implementation address in an upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const IMPLEMENTATION_STORAGE_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The storage slot containing the proxy admin contract address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The proxy contract deployed in front of UUPS implementations
pub const DEFAULT_UUPS_PROXY_CONTRACT: &str = "ERC1967Proxy";

/// The proxy contract deployed in front of transparent-proxy implementations
pub const DEFAULT_TRANSPARENT_PROXY_CONTRACT: &str = "TransparentUpgradeableProxy";

/// The default name of the one-time initializer of an upgradeable contract
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// The suffix of the ledger key under which a proxy is recorded
pub const PROXY_ENTRY_SUFFIX: &str = "Proxy";

/// The suffix of the ledger key under which a proxy's implementation is recorded
pub const IMPLEMENTATION_ENTRY_SUFFIX: &str = "Impl";

/// The ledger key of the proxy upgraded when none is configured
pub const DEFAULT_UPGRADE_PROXY_ENTRY: &str = "VaultProxy";

/// The implementation contract upgraded to when none is configured
pub const DEFAULT_UPGRADE_IMPLEMENTATION: &str = "VaultV2";

/// The ledger key of the implementation recorded when none is configured
pub const DEFAULT_UPGRADE_IMPLEMENTATION_ENTRY: &str = "VaultImpl";

/// The template key that resolves to the deployer's address in argument lists
pub const DEPLOYER_TEMPLATE_KEY: &str = "deployer";

/// The name of the Hardhat build-info directory inside the artifacts directory
pub const BUILD_INFO_DIR: &str = "build-info";

/// The suffix of the Hardhat debug file accompanying each artifact
pub const DEBUG_FILE_SUFFIX: &str = ".dbg.json";

/// The substring, compared case-insensitively, by which a verification
/// service reports a contract that is already verified
pub const ALREADY_VERIFIED_INDICATOR: &str = "already verified";

/// The substring by which Etherscan reports a queued verification request
pub const PENDING_INDICATOR: &str = "pending in queue";

/// The substring by which Etherscan reports a successful verification
pub const PASS_INDICATOR: &str = "pass - verified";

/// The default Etherscan API endpoint
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// The code format submitted to Etherscan
pub const ETHERSCAN_CODE_FORMAT: &str = "solidity-standard-json-input";

/// The default number of seconds between verification status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// The default number of verification status polls before giving up
pub const DEFAULT_MAX_POLLS: u32 = 12;
