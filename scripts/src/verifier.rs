//! Submitting the contracts recorded in the ledger for source verification

use alloy::primitives::Address;
use tracing::{info, warn};

use crate::{
    constants::{ALREADY_VERIFIED_INDICATOR, IMPLEMENTATION_ENTRY_SUFFIX},
    errors::ScriptError,
    ledger::{ContractEntry, EntryKind, Ledger, LedgerEntry},
};

/// A contract to verify
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    /// The ledger key of the contract
    pub logical_name: String,
    /// The contract address
    pub address: Address,
    /// The constructor arguments the contract was deployed with
    pub constructor_args: Vec<String>,
    /// The artifact name of the contract
    pub contract: String,
    /// The fully qualified source name, if recorded
    pub contract_path: Option<String>,
}

impl VerificationRequest {
    /// Build a request for a ledger entry
    fn new(logical_name: &str, entry: &ContractEntry) -> Self {
        let contract = entry
            .name
            .clone()
            .unwrap_or_else(|| strip_entry_suffix(logical_name).to_string());

        Self {
            logical_name: logical_name.to_string(),
            address: entry.address,
            constructor_args: entry.constructor_args_as_strings(),
            contract,
            contract_path: entry.contract_path.clone(),
        }
    }

    /// The name the artifact of the contract is looked up by
    pub fn artifact_name(&self) -> &str {
        self.contract_path.as_deref().unwrap_or(&self.contract)
    }
}

/// The contract name of an unnamed entry, e.g. `VaultImpl` -> `Vault`
fn strip_entry_suffix(logical_name: &str) -> &str {
    logical_name
        .strip_suffix(IMPLEMENTATION_ENTRY_SUFFIX)
        .filter(|s| !s.is_empty())
        .unwrap_or(logical_name)
}

/// The successful result of a verification submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The service accepted and verified the source
    Verified,
    /// The service already had the source
    AlreadyVerified,
}

/// A remote source verification service
#[allow(async_fn_in_trait)]
pub trait VerificationService {
    /// Submit a contract for verification and wait for the result
    async fn verify(&self, request: &VerificationRequest)
        -> Result<VerificationOutcome, ScriptError>;
}

/// An entry that could not be verified
#[derive(Debug, Clone, PartialEq)]
pub struct FailedVerification {
    /// The ledger key of the entry
    pub name: String,
    /// Why verification failed
    pub reason: String,
}

/// The per-entry results of a verification run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    /// Entries verified by this run
    pub verified: Vec<String>,
    /// Entries the service had already verified
    pub already_verified: Vec<String>,
    /// Entries that failed to verify
    pub failed: Vec<FailedVerification>,
}

impl VerificationReport {
    /// Whether every submitted entry verified
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Submit every non-proxy ledger entry for verification.
///
/// Failures are recorded per entry and never stop the run. Non-proxy entries
/// without a usable address are recorded as failures without being submitted.
pub async fn verify_all(
    ledger: &Ledger,
    service: &impl VerificationService,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    for (name, entry) in ledger.iter() {
        let contract = match entry {
            LedgerEntry::Proxy(_) => {
                info!("skipping proxy {name}");
                continue;
            }
            LedgerEntry::Implementation(contract) | LedgerEntry::Contract(contract) => contract,
        };

        let request = VerificationRequest::new(name, contract);
        info!("verifying {name} at {:#x}", request.address);
        match service.verify(&request).await {
            Ok(VerificationOutcome::Verified) => {
                info!("verified {name}");
                report.verified.push(name.to_string());
            }
            Ok(VerificationOutcome::AlreadyVerified) => {
                info!("{name} is already verified");
                report.already_verified.push(name.to_string());
            }
            Err(e) if is_already_verified(&e.to_string()) => {
                info!("{name} is already verified");
                report.already_verified.push(name.to_string());
            }
            Err(e) => {
                warn!("failed to verify {name}: {e}");
                report.failed.push(FailedVerification {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for (name, invalid) in ledger.invalid() {
        if invalid.kind == EntryKind::Proxy {
            continue;
        }
        warn!("cannot verify {name}: {}", invalid.reason);
        report.failed.push(FailedVerification {
            name: name.to_string(),
            reason: invalid.reason.clone(),
        });
    }

    report
}

/// Whether a service message reports an already verified contract
pub fn is_already_verified(message: &str) -> bool {
    message.to_lowercase().contains(ALREADY_VERIFIED_INDICATOR)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use alloy::primitives::address;
    use serde_json::json;

    use super::*;
    use crate::ledger::ProxyEntry;

    /// Fails the contracts it is told to, and reports the rest as already verified after the first time
    #[derive(Default)]
    struct ScriptedService {
        failing: Vec<String>,
        seen: RefCell<Vec<String>>,
    }

    impl VerificationService for ScriptedService {
        async fn verify(
            &self,
            request: &VerificationRequest,
        ) -> Result<VerificationOutcome, ScriptError> {
            if self.failing.contains(&request.logical_name) {
                return Err(ScriptError::Verification("Fail - Unable to verify".to_string()));
            }

            let mut seen = self.seen.borrow_mut();
            if seen.contains(&request.logical_name) {
                return Err(ScriptError::Verification(
                    "Contract source code already verified".to_string(),
                ));
            }
            seen.push(request.logical_name.clone());
            Ok(VerificationOutcome::Verified)
        }
    }

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.upsert(
            "VaultProxy",
            LedgerEntry::Proxy(ProxyEntry::new(address!("0x00000000000000000000000000000000000000a1"))),
        );
        ledger.upsert(
            "VaultImpl",
            LedgerEntry::Implementation(ContractEntry {
                address: address!("0x00000000000000000000000000000000000000a2"),
                ..Default::default()
            }),
        );
        ledger.upsert(
            "TacoCoin",
            LedgerEntry::Contract(ContractEntry {
                address: address!("0x00000000000000000000000000000000000000a3"),
                constructor_args: vec![json!("100000000000000000000")],
                contract_path: Some("contracts/TacoCoin.sol:TacoCoin".to_string()),
                ..Default::default()
            }),
        );
        ledger
    }

    #[tokio::test]
    async fn test_verify_all_skips_proxies() {
        let service = ScriptedService::default();
        let report = verify_all(&ledger(), &service).await;

        assert_eq!(report.verified, vec!["TacoCoin", "VaultImpl"]);
        assert!(report.already_verified.is_empty());
        assert!(!service.seen.borrow().contains(&"VaultProxy".to_string()));
    }

    #[tokio::test]
    async fn test_verify_all_twice_is_already_verified() {
        let service = ScriptedService::default();
        let ledger = ledger();

        verify_all(&ledger, &service).await;
        let report = verify_all(&ledger, &service).await;

        assert!(report.verified.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.already_verified, vec!["TacoCoin", "VaultImpl"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let service = ScriptedService {
            failing: vec!["TacoCoin".to_string()],
            ..Default::default()
        };
        let report = verify_all(&ledger(), &service).await;

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "TacoCoin");
        assert_eq!(report.verified, vec!["VaultImpl"]);
    }

    #[tokio::test]
    async fn test_unusable_entries_fail_without_submission() {
        let mut ledger: Ledger = serde_json::from_value(json!({
            "Relayer": { "name": "Relayer" },
            "VaultProxy": { "address": "" }
        }))
        .unwrap();
        ledger.upsert(
            "TacoCoin",
            LedgerEntry::Contract(ContractEntry {
                address: address!("0x00000000000000000000000000000000000000a3"),
                ..Default::default()
            }),
        );
        let service = ScriptedService::default();

        let report = verify_all(&ledger, &service).await;

        assert_eq!(report.verified, vec!["TacoCoin"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "Relayer");
        assert_eq!(*service.seen.borrow(), vec!["TacoCoin".to_string()]);
    }

    #[test]
    fn test_request_contract_name() {
        let ledger = ledger();
        let Some(LedgerEntry::Implementation(entry)) = ledger.get("VaultImpl") else {
            panic!("missing implementation entry");
        };
        let request = VerificationRequest::new("VaultImpl", entry);
        assert_eq!(request.artifact_name(), "Vault");

        let Some(LedgerEntry::Contract(entry)) = ledger.get("TacoCoin") else {
            panic!("missing contract entry");
        };
        let request = VerificationRequest::new("TacoCoin", entry);
        assert_eq!(request.artifact_name(), "contracts/TacoCoin.sol:TacoCoin");
        assert_eq!(request.constructor_args, vec!["100000000000000000000"]);
    }

    #[test]
    fn test_already_verified_is_case_insensitive() {
        assert!(is_already_verified("Contract source code already verified"));
        assert!(is_already_verified("Already Verified"));
        assert!(!is_already_verified("Fail - Unable to verify"));
    }
}
