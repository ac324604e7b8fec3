//! Upgrading a proxy to a freshly deployed implementation

use alloy::{
    primitives::{Address, Bytes},
    sol_types::SolCall,
};
use tracing::{info, warn};

use crate::{
    artifacts::ArtifactSource,
    client::ChainClient,
    constants::{IMPLEMENTATION_STORAGE_SLOT, PROXY_ADMIN_STORAGE_SLOT},
    deployer::deploy_contract,
    errors::ScriptError,
    ledger::{ContractEntry, Ledger, LedgerEntry},
    plan::UpgradeTarget,
    solidity::{upgradeAndCallCall, upgradeToAndCallCall},
    types::ProxyKind,
    utils::read_address_slot,
};

/// Deploy the target's new implementation, point its proxy at it, and record
/// the implementation the proxy reports under the target's implementation entry.
///
/// The proxy entry itself is left untouched.
pub async fn upgrade(
    client: &impl ChainClient,
    artifacts: &impl ArtifactSource,
    mut ledger: Ledger,
    target: &UpgradeTarget,
) -> Result<Ledger, ScriptError> {
    let proxy_address = find_proxy(&ledger, &target.proxy)?;

    let artifact = artifacts.artifact(&target.implementation)?;
    let new_implementation = deploy_contract(client, &artifact, &[]).await?;
    info!(
        "deployed {} at {:#x}",
        target.implementation, new_implementation.address
    );

    let tx_hash = match target.kind {
        ProxyKind::Uups => {
            let calldata = upgradeToAndCallCall {
                newImplementation: new_implementation.address,
                data: Bytes::new(),
            }
            .abi_encode();
            client.send_call(proxy_address, calldata.into()).await
        }
        ProxyKind::Transparent => {
            let admin = read_address_slot(client, proxy_address, PROXY_ADMIN_STORAGE_SLOT).await?;
            if admin == Address::ZERO {
                return Err(ScriptError::ContractInteraction(format!(
                    "{} has no proxy admin",
                    target.proxy
                )));
            }

            let calldata = upgradeAndCallCall {
                proxy: proxy_address,
                implementation: new_implementation.address,
                data: Bytes::new(),
            }
            .abi_encode();
            client.send_call(admin, calldata.into()).await
        }
    }
    .map_err(|e| ScriptError::ContractInteraction(format!("upgrading {}: {e}", target.proxy)))?;
    info!("upgraded {} in tx {tx_hash:#x}", target.proxy);

    let confirmed =
        read_address_slot(client, proxy_address, IMPLEMENTATION_STORAGE_SLOT).await?;
    if confirmed == Address::ZERO {
        return Err(ScriptError::ContractInteraction(format!(
            "{} reports no implementation",
            target.proxy
        )));
    }
    if confirmed != new_implementation.address {
        warn!(
            "{} reports implementation {confirmed:#x}, expected {:#x}",
            target.proxy, new_implementation.address
        );
    }

    ledger.upsert(
        &target.implementation_entry,
        LedgerEntry::Implementation(ContractEntry {
            address: confirmed,
            name: Some(target.implementation.clone()),
            constructor_args: Vec::new(),
            contract_path: Some(artifact.fully_qualified_name()),
            ..Default::default()
        }),
    );
    info!(
        "recorded {} at {confirmed:#x}",
        target.implementation_entry
    );

    Ok(ledger)
}

/// The address of the named proxy, which must be recorded with a non-zero address
pub fn find_proxy(ledger: &Ledger, name: &str) -> Result<Address, ScriptError> {
    match ledger.get(name) {
        Some(entry) if entry.address() != Address::ZERO => {
            if !entry.is_proxy() {
                warn!("{name} is not recorded as a proxy, upgrading it anyway");
            }
            Ok(entry.address())
        }
        _ => {
            if let Some(invalid) = ledger.get_invalid(name) {
                warn!("{name} is recorded without a usable address: {}", invalid.reason);
            }
            Err(ScriptError::ProxyNotFound(name.to_string()))
        }
    }
}
