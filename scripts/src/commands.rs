//! Implementations of the various deploy scripts

use std::{future::Future, path::Path, process::ExitCode, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    artifacts::{ArtifactSource, HardhatArtifacts},
    cli::{GlobalArgs, UpgradeArgs, VerifyArgs},
    client::{fetch_chain_id, resolve_signer, ChainClient, RpcClient},
    deployer::deploy_plan,
    errors::ScriptError,
    etherscan::{EtherscanClient, EtherscanConfig},
    ledger::{Ledger, LedgerStore},
    plan::{DeploymentPlan, UpgradeTarget},
    upgrade::{find_proxy, upgrade as upgrade_proxy},
    verifier::{verify_all, VerificationService},
};

/// Connect to the RPC node as the selected deployer
async fn connect(global: &GlobalArgs) -> Result<RpcClient, ScriptError> {
    let signer = resolve_signer(&global.priv_keys, global.deployer_index)?;
    RpcClient::connect(&global.rpc_url, signer).await
}

/// Deploy the contracts of the deployment plan
pub async fn deploy(global: &GlobalArgs) -> Result<(), ScriptError> {
    let plan = DeploymentPlan::load(&global.config)?;
    let store = LedgerStore::new(&global.ledger);
    let artifacts = HardhatArtifacts::new(&global.artifacts);
    let client = connect(global).await?;

    info!("deploying {} contracts", plan.contracts.len());
    let ledger = deploy_plan(&client, &artifacts, &store, &plan).await?;
    info!(
        "deployment complete, {} entries recorded in {}",
        ledger.len(),
        store.path().display()
    );

    Ok(())
}

/// Upgrade a proxy and record its new implementation
pub async fn upgrade(args: UpgradeArgs, global: &GlobalArgs) -> Result<(), ScriptError> {
    let store = LedgerStore::new(&global.ledger);
    let artifacts = HardhatArtifacts::new(&global.artifacts);
    let target = upgrade_target(args, &global.config)?;

    upgrade_recorded(&store, &artifacts, &target, || connect(global)).await?;
    Ok(())
}

/// Upgrade the proxy of `target` as recorded in the ledger at `store`, saving
/// the new implementation.
///
/// `connect` is only invoked once the ledger is known to hold the proxy, so a
/// missing ledger or proxy never touches the network.
pub async fn upgrade_recorded<C, F, Fut>(
    store: &LedgerStore,
    artifacts: &impl ArtifactSource,
    target: &UpgradeTarget,
    connect: F,
) -> Result<Ledger, ScriptError>
where
    C: ChainClient,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C, ScriptError>>,
{
    let _lock = store.lock()?;
    let ledger = store.load()?;
    find_proxy(&ledger, &target.proxy)?;

    let client = connect().await?;
    info!(
        "upgrading {} ({}) to {}",
        target.proxy, target.kind, target.implementation
    );
    let ledger = upgrade_proxy(&client, artifacts, ledger, target).await?;
    store.save(&ledger)?;

    Ok(ledger)
}

/// Resolve the upgrade target from the CLI, falling back to the `[upgrade]`
/// table of the deployment plan at `config`, if there is one
pub fn upgrade_target(args: UpgradeArgs, config: &Path) -> Result<UpgradeTarget, ScriptError> {
    let mut target = if config.exists() {
        DeploymentPlan::load(config)?.upgrade
    } else {
        debug!(
            "no deployment plan at {}, using default upgrade target",
            config.display()
        );
        UpgradeTarget::default()
    };

    if let Some(proxy) = args.proxy {
        target.proxy = proxy;
    }
    if let Some(implementation) = args.implementation {
        target.implementation = implementation;
    }
    if let Some(implementation_entry) = args.implementation_entry {
        target.implementation_entry = implementation_entry;
    }
    if let Some(kind) = args.kind {
        target.kind = kind;
    }

    Ok(target)
}

/// Verify every non-proxy contract in the ledger
pub async fn verify(args: VerifyArgs, global: &GlobalArgs) -> Result<ExitCode, ScriptError> {
    let ledger = LedgerStore::new(&global.ledger).load()?;
    let chain_id = resolve_chain_id(args.chain_id, || fetch_chain_id(&global.rpc_url)).await?;
    let config = EtherscanConfig {
        api_url: args.api_url,
        api_key: args.api_key,
        chain_id,
        poll_interval: Duration::from_secs(args.poll_interval),
        max_polls: args.max_polls,
    };
    let service = EtherscanClient::new(config, HardhatArtifacts::new(&global.artifacts))?;

    Ok(verify_ledger(&ledger, &service, args.strict).await)
}

/// The configured chain id, or the one reported by `fetch` if none is configured
pub async fn resolve_chain_id<F, Fut>(configured: Option<u64>, fetch: F) -> Result<u64, ScriptError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<u64, ScriptError>>,
{
    match configured {
        Some(chain_id) => Ok(chain_id),
        None => {
            let chain_id = fetch().await?;
            info!("verifying on chain {chain_id}, as reported by the RPC node");
            Ok(chain_id)
        }
    }
}

/// Verify the ledger with `service`, reporting the results.
///
/// Failed entries only fail the run when `strict` is set.
pub async fn verify_ledger(
    ledger: &Ledger,
    service: &impl VerificationService,
    strict: bool,
) -> ExitCode {
    let report = verify_all(ledger, service).await;
    info!(
        "verification complete: {} verified, {} already verified, {} failed",
        report.verified.len(),
        report.already_verified.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        warn!("{}: {}", failure.name, failure.reason);
    }

    if strict && !report.is_success() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Print the ledger
pub fn show(global: &GlobalArgs) -> Result<(), ScriptError> {
    let ledger = LedgerStore::new(&global.ledger).load()?;
    for (name, entry) in ledger.iter() {
        println!("{name:<24} {:<15} {}", entry.kind().to_string(), entry.address());
    }
    for (name, invalid) in ledger.invalid() {
        println!("{name:<24} {:<15} unusable: {}", invalid.kind.to_string(), invalid.reason);
    }

    Ok(())
}
