//! The deployment plan: which contracts to deploy, in what order, with which
//! arguments, and which proxy the `upgrade` command targets.
//!
//! Arguments are strings (or TOML primitives) coerced to the ABI types of the
//! constructor or initializer they are passed to. A string of the form
//! `${Name}` is replaced by the address of the ledger entry `Name`, and
//! `${deployer}` by the address of the deploying account.

use std::{fs, path::Path};

use alloy::primitives::Address;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    constants::{
        DEFAULT_INITIALIZER, DEFAULT_UPGRADE_IMPLEMENTATION, DEFAULT_UPGRADE_IMPLEMENTATION_ENTRY,
        DEFAULT_UPGRADE_PROXY_ENTRY, DEPLOYER_TEMPLATE_KEY, IMPLEMENTATION_ENTRY_SUFFIX,
        PROXY_ENTRY_SUFFIX,
    },
    errors::ScriptError,
    ledger::Ledger,
    types::ProxyKind,
};

/// The full deployment plan
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentPlan {
    /// The contracts to deploy, in order
    #[serde(default, rename = "contract")]
    pub contracts: Vec<PlannedContract>,
    /// The proxy targeted by the `upgrade` command
    #[serde(default)]
    pub upgrade: UpgradeTarget,
}

impl DeploymentPlan {
    /// Load a plan from a TOML file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ScriptError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Parse a plan from TOML
    pub fn from_toml(contents: &str) -> Result<Self, ScriptError> {
        let plan: Self = toml::from_str(contents).map_err(|e| ScriptError::Config(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check that no two contracts would be recorded under the same ledger key
    fn validate(&self) -> Result<(), ScriptError> {
        let mut keys = Vec::new();
        for contract in &self.contracts {
            let contract_keys = match &contract.proxy {
                Some(proxy) => vec![
                    proxy.proxy_entry(&contract.name),
                    proxy.implementation_entry(&contract.name),
                ],
                None => vec![contract.name.clone()],
            };

            for key in contract_keys {
                if keys.contains(&key) {
                    return Err(ScriptError::Config(format!("duplicate ledger entry `{key}`")));
                }
                keys.push(key);
            }
        }

        Ok(())
    }
}

/// A single contract in the plan
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannedContract {
    /// The logical name of the contract
    pub name: String,
    /// The artifact name, if different from the logical name
    #[serde(default)]
    pub contract: Option<String>,
    /// The constructor arguments. Must be empty for proxied contracts
    #[serde(default)]
    pub constructor_args: Vec<Value>,
    /// Deploy the contract behind a proxy
    #[serde(default)]
    pub proxy: Option<ProxySettings>,
}

impl PlannedContract {
    /// The name of the artifact to deploy
    pub fn artifact_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }
}

/// How a proxied contract is deployed and initialized
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    /// The upgrade pattern of the proxy
    #[serde(default)]
    pub kind: ProxyKind,
    /// The initializer called through the proxy on deployment
    #[serde(default = "default_initializer")]
    pub initializer: String,
    /// The initializer arguments
    #[serde(default)]
    pub init_args: Vec<Value>,
    /// The proxy artifact name, defaulting to the standard proxy of `kind`
    #[serde(default)]
    pub proxy_contract: Option<String>,
    /// The ledger key of the proxy, defaulting to `<name>Proxy`
    #[serde(default)]
    pub proxy_entry: Option<String>,
    /// The ledger key of the implementation, defaulting to `<name>Impl`
    #[serde(default)]
    pub implementation_entry: Option<String>,
}

impl ProxySettings {
    /// The name of the proxy artifact to deploy
    pub fn proxy_contract(&self) -> &str {
        self.proxy_contract
            .as_deref()
            .unwrap_or_else(|| self.kind.default_proxy_contract())
    }

    /// The ledger key of the proxy
    pub fn proxy_entry(&self, name: &str) -> String {
        self.proxy_entry
            .clone()
            .unwrap_or_else(|| format!("{name}{PROXY_ENTRY_SUFFIX}"))
    }

    /// The ledger key of the implementation
    pub fn implementation_entry(&self, name: &str) -> String {
        self.implementation_entry
            .clone()
            .unwrap_or_else(|| format!("{name}{IMPLEMENTATION_ENTRY_SUFFIX}"))
    }
}

fn default_initializer() -> String {
    DEFAULT_INITIALIZER.to_string()
}

/// The proxy upgraded by the `upgrade` command
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeTarget {
    /// The ledger key of the proxy
    #[serde(default = "default_upgrade_proxy")]
    pub proxy: String,
    /// The artifact name of the new implementation
    #[serde(default = "default_upgrade_implementation")]
    pub implementation: String,
    /// The ledger key the new implementation is recorded under
    #[serde(default = "default_upgrade_implementation_entry")]
    pub implementation_entry: String,
    /// The upgrade pattern of the proxy
    #[serde(default)]
    pub kind: ProxyKind,
}

impl Default for UpgradeTarget {
    fn default() -> Self {
        Self {
            proxy: default_upgrade_proxy(),
            implementation: default_upgrade_implementation(),
            implementation_entry: default_upgrade_implementation_entry(),
            kind: ProxyKind::default(),
        }
    }
}

fn default_upgrade_proxy() -> String {
    DEFAULT_UPGRADE_PROXY_ENTRY.to_string()
}

fn default_upgrade_implementation() -> String {
    DEFAULT_UPGRADE_IMPLEMENTATION.to_string()
}

fn default_upgrade_implementation_entry() -> String {
    DEFAULT_UPGRADE_IMPLEMENTATION_ENTRY.to_string()
}

// ------------------------
// | Argument Templating |
// ------------------------

/// Resolve `${Name}` and `${deployer}` references in an argument list.
///
/// Non-string values and strings that are not a single reference are passed through unchanged.
pub fn resolve_args(
    args: &[Value],
    ledger: &Ledger,
    deployer: Address,
) -> Result<Vec<Value>, ScriptError> {
    args.iter()
        .map(|arg| resolve_arg(arg, ledger, deployer))
        .collect()
}

/// Resolve a single argument, see [`resolve_args`]
fn resolve_arg(arg: &Value, ledger: &Ledger, deployer: Address) -> Result<Value, ScriptError> {
    let reference = match arg.as_str().and_then(template_reference) {
        Some(reference) => reference,
        None => return Ok(arg.clone()),
    };

    let address = if reference == DEPLOYER_TEMPLATE_KEY {
        deployer
    } else {
        ledger
            .get(reference)
            .map(|entry| entry.address())
            .ok_or_else(|| {
                ScriptError::Config(format!("argument references unknown contract `{reference}`"))
            })?
    };

    Ok(Value::String(address.to_checksum(None)))
}

/// Extract `Name` from `${Name}`
fn template_reference(s: &str) -> Option<&str> {
    s.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|reference| !reference.is_empty())
}
