//! Deploying contracts, standalone or behind a proxy, and executing a full
//! deployment plan against the ledger

use alloy::{hex, primitives::Address};
use itertools::Itertools;
use serde_json::Value;
use tracing::info;

use crate::{
    artifacts::{ArtifactSource, ContractArtifact},
    client::ChainClient,
    errors::ScriptError,
    ledger::{value_to_arg_string, ContractEntry, Ledger, LedgerEntry, LedgerStore, ProxyEntry},
    plan::{resolve_args, DeploymentPlan, PlannedContract, ProxySettings},
    types::{DeployedContract, ProxyDeployment, ProxyKind},
    utils::{deploy_code, encode_constructor_args, encode_function_call},
};

/// Deploy a contract with the given constructor arguments and wait for confirmation
pub async fn deploy_contract(
    client: &impl ChainClient,
    artifact: &ContractArtifact,
    constructor_args: &[String],
) -> Result<DeployedContract, ScriptError> {
    send_creation(client, artifact, constructor_args)
        .await
        .map_err(|e| deployment_failed(artifact, e))
}

/// Deploy an implementation, then a proxy in front of it whose constructor
/// calls `initializer` with `init_args` through the proxy
pub async fn deploy_behind_proxy(
    client: &impl ChainClient,
    implementation: &ContractArtifact,
    proxy: &ContractArtifact,
    kind: ProxyKind,
    initializer: &str,
    init_args: &[String],
) -> Result<ProxyDeployment, ScriptError> {
    // Encode the initializer before sending anything, so bad arguments cost no gas
    let init_data = encode_function_call(&implementation.abi, initializer, init_args)
        .map_err(|e| deployment_failed(implementation, e))?;

    let implementation_deployment = deploy_contract(client, implementation, &[]).await?;
    info!(
        "deployed {} implementation at {:#x}",
        implementation.contract_name, implementation_deployment.address
    );

    let implementation_address = implementation_deployment.address.to_string();
    let init_data = hex::encode_prefixed(init_data);
    let proxy_args = match kind {
        ProxyKind::Uups => vec![implementation_address, init_data],
        ProxyKind::Transparent => {
            vec![implementation_address, client.sender().to_string(), init_data]
        }
    };

    let proxy_deployment = send_creation(client, proxy, &proxy_args)
        .await
        .map_err(|e| match e {
            ScriptError::TransactionReverted(reason) => ScriptError::InitializationFailed(format!(
                "{}.{initializer}: {reason}",
                implementation.contract_name
            )),
            e => deployment_failed(proxy, e),
        })?;

    Ok(ProxyDeployment {
        proxy: proxy_deployment,
        implementation: implementation_deployment,
    })
}

/// Deploy every contract in the plan, in order.
///
/// The ledger is saved after each confirmed deployment, so a failure leaves
/// every earlier entry recorded and the failed one absent.
pub async fn deploy_plan(
    client: &impl ChainClient,
    artifacts: &impl ArtifactSource,
    store: &LedgerStore,
    plan: &DeploymentPlan,
) -> Result<Ledger, ScriptError> {
    let _lock = store.lock()?;
    let mut ledger = store.load_or_default()?;

    for contract in &plan.contracts {
        match &contract.proxy {
            Some(proxy) => deploy_proxied(client, artifacts, &mut ledger, contract, proxy).await?,
            None => deploy_plain(client, artifacts, &mut ledger, contract).await?,
        }

        store.save(&ledger)?;
    }

    Ok(ledger)
}

/// Deploy a plain contract and record it in the ledger
async fn deploy_plain(
    client: &impl ChainClient,
    artifacts: &impl ArtifactSource,
    ledger: &mut Ledger,
    contract: &PlannedContract,
) -> Result<(), ScriptError> {
    let artifact = artifacts.artifact(contract.artifact_name())?;
    let args = resolve_args(&contract.constructor_args, ledger, client.sender())?;
    let arg_strings = args_to_strings(&args);

    info!(
        "deploying {} ({}) with args [{}]",
        contract.name,
        artifact.contract_name,
        arg_strings.iter().join(", ")
    );
    let deployed = deploy_contract(client, &artifact, &arg_strings).await?;
    info!(
        "deployed {} at {:#x} in tx {:#x}",
        contract.name, deployed.address, deployed.tx_hash
    );

    ledger.upsert(
        &contract.name,
        LedgerEntry::Contract(ContractEntry {
            address: deployed.address,
            name: contract.contract.clone(),
            constructor_args: args,
            contract_path: Some(artifact.fully_qualified_name()),
            ..Default::default()
        }),
    );

    Ok(())
}

/// Deploy a contract behind a proxy and record both in the ledger
async fn deploy_proxied(
    client: &impl ChainClient,
    artifacts: &impl ArtifactSource,
    ledger: &mut Ledger,
    contract: &PlannedContract,
    settings: &ProxySettings,
) -> Result<(), ScriptError> {
    if !contract.constructor_args.is_empty() {
        return Err(ScriptError::Config(format!(
            "{} is deployed behind a proxy and cannot take constructor arguments",
            contract.name
        )));
    }

    let implementation = artifacts.artifact(contract.artifact_name())?;
    let proxy = artifacts.artifact(settings.proxy_contract())?;
    let init_args = resolve_args(&settings.init_args, ledger, client.sender())?;
    let init_arg_strings = args_to_strings(&init_args);

    info!(
        "deploying {} behind a {} proxy, calling {}({})",
        contract.name,
        settings.kind,
        settings.initializer,
        init_arg_strings.iter().join(", ")
    );
    let deployment = deploy_behind_proxy(
        client,
        &implementation,
        &proxy,
        settings.kind,
        &settings.initializer,
        &init_arg_strings,
    )
    .await?;

    let proxy_entry = settings.proxy_entry(&contract.name);
    let implementation_entry = settings.implementation_entry(&contract.name);
    info!(
        "deployed {proxy_entry} at {:#x}, {implementation_entry} at {:#x}",
        deployment.proxy.address, deployment.implementation.address
    );

    ledger.upsert(
        proxy_entry,
        LedgerEntry::Proxy(ProxyEntry {
            address: deployment.proxy.address,
            name: Some(implementation.contract_name.clone()),
            ..Default::default()
        }),
    );
    ledger.upsert(
        implementation_entry,
        LedgerEntry::Implementation(ContractEntry {
            address: deployment.implementation.address,
            name: Some(implementation.contract_name.clone()),
            constructor_args: Vec::new(),
            contract_path: Some(implementation.fully_qualified_name()),
            ..Default::default()
        }),
    );

    Ok(())
}

/// Encode the constructor arguments, send the creation transaction and check the result
async fn send_creation(
    client: &impl ChainClient,
    artifact: &ContractArtifact,
    constructor_args: &[String],
) -> Result<DeployedContract, ScriptError> {
    let encoded_args = encode_constructor_args(&artifact.abi, constructor_args)?;
    let deployed = client
        .deploy_code(deploy_code(&artifact.bytecode, &encoded_args))
        .await?;

    if deployed.address == Address::ZERO {
        return Err(ScriptError::DeploymentFailed(format!(
            "no contract created in tx {:#x}",
            deployed.tx_hash
        )));
    }

    Ok(deployed)
}

/// Attribute a deployment error to the contract being deployed
fn deployment_failed(artifact: &ContractArtifact, err: ScriptError) -> ScriptError {
    match err {
        ScriptError::DeploymentFailed(reason) => {
            ScriptError::DeploymentFailed(format!("{}: {reason}", artifact.contract_name))
        }
        err => ScriptError::DeploymentFailed(format!("{}: {err}", artifact.contract_name)),
    }
}

fn args_to_strings(args: &[Value]) -> Vec<String> {
    args.iter().map(value_to_arg_string).collect()
}
