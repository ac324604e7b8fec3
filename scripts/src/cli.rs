//! Definitions of CLI arguments and commands for the deploy scripts

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{deploy, show, upgrade, verify},
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_ETHERSCAN_API_URL, DEFAULT_LEDGER_PATH, DEFAULT_MAX_POLLS,
        DEFAULT_PLAN_PATH, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RPC_URL,
    },
    errors::ScriptError,
    types::ProxyKind,
};

/// Deploy, upgrade and verify the Taco vault contracts
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> Result<ExitCode, ScriptError> {
        let Cli { global, command } = self;
        match command {
            Command::Deploy => deploy(&global).await.map(|_| ExitCode::SUCCESS),
            Command::Upgrade(args) => upgrade(args, &global).await.map(|_| ExitCode::SUCCESS),
            Command::Verify(args) => verify(args, &global).await,
            Command::Show => show(&global).map(|_| ExitCode::SUCCESS),
        }
    }
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    pub rpc_url: String,

    /// Private keys of the available signers, repeated or comma separated
    #[arg(
        short,
        long = "priv-key",
        env = "PKEY",
        value_delimiter = ',',
        hide_env_values = true,
        global = true
    )]
    pub priv_keys: Vec<String>,

    /// Index of the signer that sends transactions
    #[arg(long, default_value_t = 0, global = true)]
    pub deployer_index: usize,

    /// Path of the deployment ledger
    #[arg(long, default_value = DEFAULT_LEDGER_PATH, global = true)]
    pub ledger: PathBuf,

    /// Path of the deployment plan
    #[arg(short, long, default_value = DEFAULT_PLAN_PATH, global = true)]
    pub config: PathBuf,

    /// Path of the Hardhat artifacts directory
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR, global = true)]
    pub artifacts: PathBuf,
}

/// The commands supported by the scripts
#[derive(Subcommand)]
pub enum Command {
    /// Deploy every contract in the deployment plan, recording each in the ledger
    Deploy,
    /// Upgrade a proxy to a freshly deployed implementation
    Upgrade(UpgradeArgs),
    /// Submit every non-proxy ledger entry for source verification
    Verify(VerifyArgs),
    /// Print the ledger
    Show,
}

/// Upgrade a proxy recorded in the ledger.
///
/// Unset options fall back to the `[upgrade]` table of the deployment plan.
#[derive(Args, Debug, Clone)]
pub struct UpgradeArgs {
    /// Ledger entry of the proxy
    #[arg(long)]
    pub proxy: Option<String>,

    /// Artifact name of the new implementation
    #[arg(long)]
    pub implementation: Option<String>,

    /// Ledger entry the new implementation is recorded under
    #[arg(long)]
    pub implementation_entry: Option<String>,

    /// The upgrade pattern of the proxy
    #[arg(long, value_enum)]
    pub kind: Option<ProxyKind>,
}

/// Verify the ledger's contracts with an Etherscan-compatible service
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// The verification API endpoint
    #[arg(long, env = "ETHERSCAN_API_URL", default_value = DEFAULT_ETHERSCAN_API_URL)]
    pub api_url: String,

    /// The verification API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// The chain the contracts are deployed on, queried from the RPC node if unset
    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Seconds between verification status polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Status polls before a pending verification counts as failed
    #[arg(long, default_value_t = DEFAULT_MAX_POLLS)]
    pub max_polls: u32,

    /// Exit non-zero if any contract fails to verify
    #[arg(long)]
    pub strict: bool,
}
