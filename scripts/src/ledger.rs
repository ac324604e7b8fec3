//! The deployment ledger: a persisted mapping from logical contract name to
//! the address and verification metadata of what was deployed under it.
//!
//! The ledger is stored as a flat JSON object, e.g.
//!
//! ```json
//! {
//!   "TacoCoin": { "kind": "contract", "address": "0x…", "constructorArgs": ["100"] },
//!   "VaultProxy": { "kind": "proxy", "address": "0x…" }
//! }
//! ```
//!
//! Entries without a `kind` have it inferred from the logical name. An entry
//! without a usable address does not fail the load; it is reported by
//! [`Ledger::invalid`] and left as-is on disk.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fmt::{self, Display},
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    constants::{IMPLEMENTATION_ENTRY_SUFFIX, LOCK_FILE_SUFFIX, PROXY_ENTRY_SUFFIX},
    errors::ScriptError,
};

// -----------
// | Entries |
// -----------

/// A single ledger record
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    /// The stable-address front of an upgradeable contract
    Proxy(ProxyEntry),
    /// The implementation a proxy currently delegates to
    Implementation(ContractEntry),
    /// A plain, non-upgradeable contract
    Contract(ContractEntry),
}

impl LedgerEntry {
    /// The address recorded for the entry
    pub fn address(&self) -> Address {
        match self {
            LedgerEntry::Proxy(entry) => entry.address,
            LedgerEntry::Implementation(entry) | LedgerEntry::Contract(entry) => entry.address,
        }
    }

    /// Whether the entry is a proxy
    pub fn is_proxy(&self) -> bool {
        matches!(self, LedgerEntry::Proxy(_))
    }

    /// The kind tag written for the entry
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::Proxy(_) => EntryKind::Proxy,
            LedgerEntry::Implementation(_) => EntryKind::Implementation,
            LedgerEntry::Contract(_) => EntryKind::Contract,
        }
    }
}

/// A proxy record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProxyEntry {
    /// The proxy address
    pub address: Address,
    /// Informational name of the proxied contract
    pub name: Option<String>,
    /// Fields the ledger does not interpret, preserved as-is
    pub extra: Map<String, Value>,
}

impl ProxyEntry {
    /// A proxy record with no metadata
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }
}

/// A record of a contract that is submitted for source verification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractEntry {
    /// The contract address
    pub address: Address,
    /// Informational name of the contract
    pub name: Option<String>,
    /// The constructor arguments the contract was deployed with, in order
    pub constructor_args: Vec<Value>,
    /// The fully qualified source name, e.g. `contracts/Vault.sol:Vault`
    pub contract_path: Option<String>,
    /// Fields the ledger does not interpret, preserved as-is
    pub extra: Map<String, Value>,
}

impl ContractEntry {
    /// The constructor arguments as the strings they are ABI-coerced from
    pub fn constructor_args_as_strings(&self) -> Vec<String> {
        self.constructor_args.iter().map(value_to_arg_string).collect()
    }
}

/// Render a JSON primitive as a constructor argument string
pub fn value_to_arg_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The on-disk discriminator of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// See [`LedgerEntry::Proxy`]
    Proxy,
    /// See [`LedgerEntry::Implementation`]
    Implementation,
    /// See [`LedgerEntry::Contract`]
    Contract,
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Proxy => write!(f, "proxy"),
            EntryKind::Implementation => write!(f, "implementation"),
            EntryKind::Contract => write!(f, "contract"),
        }
    }
}

impl EntryKind {
    /// Infer the kind of an untagged entry from its logical name
    pub fn infer(logical_name: &str) -> Self {
        if logical_name.ends_with(PROXY_ENTRY_SUFFIX) {
            EntryKind::Proxy
        } else if logical_name.ends_with(IMPLEMENTATION_ENTRY_SUFFIX) {
            EntryKind::Implementation
        } else {
            EntryKind::Contract
        }
    }
}

/// The JSON shape of an entry
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<EntryKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    constructor_args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contract_path: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RawEntry {
    /// Convert into a typed entry, inferring the kind from the logical name if untagged
    fn into_entry(self, logical_name: &str) -> Result<LedgerEntry, String> {
        let address = match self.address.as_deref().map(str::trim) {
            None | Some("") => return Err("no address recorded".to_string()),
            Some(s) => Address::from_str(s).map_err(|e| format!("invalid address `{s}`: {e}"))?,
        };

        let kind = self.kind.unwrap_or_else(|| EntryKind::infer(logical_name));
        let entry = match kind {
            EntryKind::Proxy => {
                // Keep verification metadata a proxy should not carry, without interpreting it
                let mut extra = self.extra;
                if let Some(args) = self.constructor_args {
                    extra.insert("constructorArgs".to_string(), Value::Array(args));
                }
                if let Some(path) = self.contract_path {
                    extra.insert("contractPath".to_string(), Value::String(path));
                }
                LedgerEntry::Proxy(ProxyEntry {
                    address,
                    name: self.name,
                    extra,
                })
            }
            EntryKind::Implementation | EntryKind::Contract => {
                let entry = ContractEntry {
                    address,
                    name: self.name,
                    constructor_args: self.constructor_args.unwrap_or_default(),
                    contract_path: self.contract_path,
                    extra: self.extra,
                };
                if kind == EntryKind::Implementation {
                    LedgerEntry::Implementation(entry)
                } else {
                    LedgerEntry::Contract(entry)
                }
            }
        };

        Ok(entry)
    }
}

impl From<&LedgerEntry> for RawEntry {
    fn from(entry: &LedgerEntry) -> Self {
        let kind = Some(entry.kind());
        let address = Some(entry.address().to_checksum(None));
        match entry {
            LedgerEntry::Proxy(proxy) => RawEntry {
                kind,
                name: proxy.name.clone(),
                address,
                constructor_args: None,
                contract_path: None,
                extra: proxy.extra.clone(),
            },
            LedgerEntry::Implementation(contract) | LedgerEntry::Contract(contract) => RawEntry {
                kind,
                name: contract.name.clone(),
                address,
                constructor_args: Some(contract.constructor_args.clone()),
                contract_path: contract.contract_path.clone(),
                extra: contract.extra.clone(),
            },
        }
    }
}

/// A ledger entry that could not be interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidEntry {
    /// The tagged kind of the entry, or the kind inferred from its logical name
    pub kind: EntryKind,
    /// Why the entry could not be interpreted
    pub reason: String,
}

/// A ledger record, together with the JSON it was loaded from
#[derive(Debug, Clone)]
enum Record {
    /// A usable entry. `source` is kept until the entry is replaced, and is
    /// what gets written back
    Valid {
        entry: LedgerEntry,
        source: Option<Value>,
    },
    /// An unusable entry, written back verbatim
    Invalid { invalid: InvalidEntry, source: Value },
}

impl Record {
    /// Interpret the JSON of the entry recorded under `logical_name`
    fn parse(logical_name: &str, source: Value) -> Self {
        let parsed = serde_json::from_value::<RawEntry>(source.clone())
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_entry(logical_name));

        match parsed {
            Ok(entry) => Record::Valid {
                entry,
                source: Some(source),
            },
            Err(reason) => {
                let kind = source
                    .get("kind")
                    .and_then(|kind| EntryKind::deserialize(kind).ok())
                    .unwrap_or_else(|| EntryKind::infer(logical_name));
                Record::Invalid {
                    invalid: InvalidEntry { kind, reason },
                    source,
                }
            }
        }
    }
}

// Records are equal when they hold the same entry, however it was written
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Record::Valid { entry: a, .. }, Record::Valid { entry: b, .. }) => a == b,
            (
                Record::Invalid {
                    invalid: a,
                    source: a_source,
                },
                Record::Invalid {
                    invalid: b,
                    source: b_source,
                },
            ) => a == b && a_source == b_source,
            _ => false,
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Record::Valid {
                source: Some(source),
                ..
            }
            | Record::Invalid { source, .. } => source.serialize(serializer),
            Record::Valid {
                entry,
                source: None,
            } => RawEntry::from(entry).serialize(serializer),
        }
    }
}

// ----------
// | Ledger |
// ----------

/// The in-memory deployment ledger.
///
/// Entries that are never replaced are written back exactly as they were
/// loaded, including ones that could not be interpreted. Replaced entries are
/// written in the canonical tagged form, with checksummed addresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    /// The records, keyed by logical name
    records: BTreeMap<String, Record>,
}

impl Ledger {
    /// An empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the usable entry recorded under a logical name
    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        match self.records.get(name)? {
            Record::Valid { entry, .. } => Some(entry),
            Record::Invalid { .. } => None,
        }
    }

    /// Get the unusable entry recorded under a logical name
    pub fn get_invalid(&self, name: &str) -> Option<&InvalidEntry> {
        match self.records.get(name)? {
            Record::Invalid { invalid, .. } => Some(invalid),
            Record::Valid { .. } => None,
        }
    }

    /// Record `entry` under `name`, fully replacing any previous entry of that name.
    /// All other entries are left untouched.
    ///
    /// Returns the replaced entry, if it was usable
    pub fn upsert(&mut self, name: impl Into<String>, entry: LedgerEntry) -> Option<LedgerEntry> {
        let record = Record::Valid {
            entry,
            source: None,
        };
        match self.records.insert(name.into(), record)? {
            Record::Valid { entry, .. } => Some(entry),
            Record::Invalid { .. } => None,
        }
    }

    /// Iterate over the usable entries in logical-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.records.iter().filter_map(|(name, record)| match record {
            Record::Valid { entry, .. } => Some((name.as_str(), entry)),
            Record::Invalid { .. } => None,
        })
    }

    /// Iterate over the unusable entries in logical-name order
    pub fn invalid(&self) -> impl Iterator<Item = (&str, &InvalidEntry)> {
        self.records.iter().filter_map(|(name, record)| match record {
            Record::Invalid { invalid, .. } => Some((name.as_str(), invalid)),
            Record::Valid { .. } => None,
        })
    }

    /// The number of entries, usable or not
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no entries
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for Ledger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(&self.records)
    }
}

impl<'de> Deserialize<'de> for Ledger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let records = raw
            .into_iter()
            .map(|(name, source)| {
                let record = Record::parse(&name, source);
                (name, record)
            })
            .collect();

        Ok(Self { records })
    }
}

// ---------
// | Store |
// ---------

/// The ledger's backing file
#[derive(Debug, Clone)]
pub struct LedgerStore {
    /// The path of the ledger file
    path: PathBuf,
}

impl LedgerStore {
    /// A store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, failing with [`ScriptError::MissingLedger`] if the file does not exist
    pub fn load(&self) -> Result<Ledger, ScriptError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScriptError::MissingLedger(self.path.display().to_string()))
            }
            Err(e) => return Err(ScriptError::LedgerFormat(e.to_string())),
        };

        let ledger: Ledger = serde_json::from_str(&contents)
            .map_err(|e| ScriptError::LedgerFormat(format!("{}: {e}", self.path.display())))?;
        for (name, invalid) in ledger.invalid() {
            warn!("ledger entry {name} is unusable: {}", invalid.reason);
        }
        debug!(path = %self.path.display(), entries = ledger.len(), "loaded ledger");

        Ok(ledger)
    }

    /// Load the ledger, starting from an empty one if the file does not exist yet
    pub fn load_or_default(&self) -> Result<Ledger, ScriptError> {
        match self.load() {
            Err(ScriptError::MissingLedger(_)) => {
                debug!(path = %self.path.display(), "no ledger yet, starting empty");
                Ok(Ledger::new())
            }
            res => res,
        }
    }

    /// Persist the ledger.
    ///
    /// The ledger is written to a temporary file in the same directory which is
    /// then renamed over the target, so an interrupted write never clobbers the
    /// previously saved ledger.
    pub fn save(&self, ledger: &Ledger) -> Result<(), ScriptError> {
        let mut tmp = NamedTempFile::new_in(self.parent_dir())
            .map_err(|e| ScriptError::WriteLedger(e.to_string()))?;

        serde_json::to_writer_pretty(&mut tmp, ledger)
            .map_err(|e| ScriptError::WriteLedger(e.to_string()))?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ScriptError::WriteLedger(e.to_string()))?;

        tmp.persist(&self.path)
            .map_err(|e| ScriptError::WriteLedger(e.error.to_string()))?;
        debug!(path = %self.path.display(), entries = ledger.len(), "saved ledger");

        Ok(())
    }

    /// Take an exclusive advisory lock on the ledger, blocking until it is available.
    ///
    /// The lock is held on a sibling `.lock` file until the returned guard is dropped.
    pub fn lock(&self) -> Result<LedgerLock, ScriptError> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| ScriptError::LedgerLock(format!("{}: {e}", lock_path.display())))?;

        file.lock()
            .map_err(|e| ScriptError::LedgerLock(format!("{}: {e}", lock_path.display())))?;
        debug!(path = %lock_path.display(), "acquired ledger lock");

        Ok(LedgerLock { file })
    }

    /// The path of the lock file guarding the ledger
    fn lock_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("ledger"));
        file_name.push(LOCK_FILE_SUFFIX);
        self.path.with_file_name(file_name)
    }

    /// The directory containing the ledger file
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

/// A held ledger lock, released on drop
#[derive(Debug)]
pub struct LedgerLock {
    /// The locked file
    file: File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("failed to release ledger lock: {e}");
        }
    }
}
