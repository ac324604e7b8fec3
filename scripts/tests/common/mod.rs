//! In-memory stand-ins for the chain, the artifacts directory and the
//! verification service

#![allow(dead_code)]

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use alloy::{
    json_abi::JsonAbi,
    primitives::{address, Address, Bytes, TxHash, B256, U256},
    sol,
    sol_types::SolCall,
};
use serde_json::{json, Value};
use taco_scripts::{
    artifacts::{ArtifactSource, BuildInfo, ContractArtifact},
    client::ChainClient,
    constants::{IMPLEMENTATION_STORAGE_SLOT, PROXY_ADMIN_STORAGE_SLOT},
    errors::ScriptError,
    types::DeployedContract,
    verifier::{VerificationOutcome, VerificationRequest, VerificationService},
};

sol! {
    function upgradeToAndCall(address newImplementation, bytes memory data) external payable;
    function upgradeAndCall(address proxy, address implementation, bytes memory data) external payable;
}

/// The account the fake chain sends from
pub const DEPLOYER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
/// The `ProxyAdmin` every fake transparent proxy reports
pub const PROXY_ADMIN: Address = address!("0x00000000000000000000000000000000000ad314");

/// Creation code prefix of the fake `ERC1967Proxy`
pub const UUPS_PROXY_CODE: [u8; 2] = [0xfe, 0x01];
/// Creation code prefix of the fake `TransparentUpgradeableProxy`
pub const TRANSPARENT_PROXY_CODE: [u8; 2] = [0xfe, 0x02];

/// The plan deployed by most tests
pub const PLAN: &str = r#"
    [[contract]]
    name = "TacoCoin"
    constructor_args = ["100000000000000000000"]

    [[contract]]
    name = "Relayer"
    constructor_args = ["Taco-Vault"]

    [[contract]]
    name = "Vault"
    proxy = { init_args = ["${TacoCoin}", "${deployer}", 1, "${Relayer}"] }

    [[contract]]
    name = "VaultFactory"
    constructor_args = ["${VaultImpl}", "${Relayer}"]
"#;

// --------------
// | Fake Chain |
// --------------

#[derive(Default)]
struct ChainState {
    nonce: u64,
    calls: usize,
    storage: HashMap<(Address, U256), U256>,
}

/// A chain that creates contracts at `CREATE` addresses and emulates the
/// proxy storage layout, without executing any code
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    /// Creation code prefixes whose deployment reverts
    reverting_code: Vec<Vec<u8>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert every deployment of code starting with `prefix`
    pub fn reverting(mut self, prefix: &[u8]) -> Self {
        self.reverting_code.push(prefix.to_vec());
        self
    }

    /// The number of chain operations performed so far
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// The address stored in the implementation slot of a proxy
    pub fn implementation_of(&self, proxy: Address) -> Address {
        let state = self.state.lock().unwrap();
        let value = state
            .storage
            .get(&(proxy, slot(IMPLEMENTATION_STORAGE_SLOT)))
            .copied()
            .unwrap_or_default();
        Address::from_word(B256::from(value.to_be_bytes::<32>()))
    }

    fn next_tx_hash(state: &ChainState) -> TxHash {
        B256::from(U256::from(state.nonce).to_be_bytes::<32>())
    }
}

fn slot(slot: B256) -> U256 {
    U256::from_be_bytes(slot.0)
}

fn address_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

impl ChainClient for FakeChain {
    fn sender(&self) -> Address {
        DEPLOYER
    }

    async fn deploy_code(&self, code: Bytes) -> Result<DeployedContract, ScriptError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        if self.reverting_code.iter().any(|prefix| code.starts_with(prefix)) {
            return Err(ScriptError::TransactionReverted("execution reverted".to_string()));
        }

        let address = DEPLOYER.create(state.nonce);
        let tx_hash = Self::next_tx_hash(&state);
        state.nonce += 1;

        // The first constructor argument of both proxies is the implementation
        let is_uups = code.starts_with(&UUPS_PROXY_CODE);
        let is_transparent = code.starts_with(&TRANSPARENT_PROXY_CODE);
        if is_uups || is_transparent {
            let implementation = Address::from_slice(&code[2 + 12..2 + 32]);
            state.storage.insert(
                (address, slot(IMPLEMENTATION_STORAGE_SLOT)),
                address_word(implementation),
            );
        }
        if is_transparent {
            state
                .storage
                .insert((address, slot(PROXY_ADMIN_STORAGE_SLOT)), address_word(PROXY_ADMIN));
        }

        Ok(DeployedContract { address, tx_hash })
    }

    async fn send_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, ScriptError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let (proxy, implementation) = if calldata.starts_with(&upgradeToAndCallCall::SELECTOR) {
            let call = upgradeToAndCallCall::abi_decode(&calldata)
                .map_err(|e| ScriptError::TransactionReverted(e.to_string()))?;
            (to, call.newImplementation)
        } else if calldata.starts_with(&upgradeAndCallCall::SELECTOR) && to == PROXY_ADMIN {
            let call = upgradeAndCallCall::abi_decode(&calldata)
                .map_err(|e| ScriptError::TransactionReverted(e.to_string()))?;
            (call.proxy, call.implementation)
        } else {
            return Err(ScriptError::TransactionReverted("unknown call".to_string()));
        };

        state.storage.insert(
            (proxy, slot(IMPLEMENTATION_STORAGE_SLOT)),
            address_word(implementation),
        );
        state.nonce += 1;
        Ok(Self::next_tx_hash(&state))
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, ScriptError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Ok(state.storage.get(&(address, slot)).copied().unwrap_or_default())
    }
}

// ------------------
// | Fake Artifacts |
// ------------------

/// The artifacts of the Taco contracts, keyed by contract name
pub struct FakeArtifacts {
    artifacts: HashMap<String, ContractArtifact>,
}

impl FakeArtifacts {
    pub fn new() -> Self {
        let initialize = json!({
            "type": "function",
            "name": "initialize",
            "inputs": [
                { "name": "token", "type": "address", "internalType": "address" },
                { "name": "owner", "type": "address", "internalType": "address" },
                { "name": "rewardRatePerDay", "type": "uint256", "internalType": "uint256" },
                { "name": "relayer", "type": "address", "internalType": "address" }
            ],
            "outputs": [],
            "stateMutability": "nonpayable"
        });

        let contracts = [
            (
                "TacoCoin",
                vec![0x60, 0x01],
                json!([constructor(&[("initialSupply", "uint256")])]),
            ),
            (
                "Relayer",
                vec![0x60, 0x02],
                json!([constructor(&[("name", "string")])]),
            ),
            ("Vault", vec![0x60, 0x03], json!([initialize.clone()])),
            ("VaultV2", vec![0x60, 0x04], json!([initialize])),
            (
                "VaultFactory",
                vec![0x60, 0x05],
                json!([constructor(&[("vaultImplementation", "address"), ("relayer", "address")])]),
            ),
            (
                "ERC1967Proxy",
                UUPS_PROXY_CODE.to_vec(),
                json!([constructor(&[("implementation", "address"), ("_data", "bytes")])]),
            ),
            (
                "TransparentUpgradeableProxy",
                TRANSPARENT_PROXY_CODE.to_vec(),
                json!([constructor(&[
                    ("_logic", "address"),
                    ("initialOwner", "address"),
                    ("_data", "bytes")
                ])]),
            ),
        ];

        let artifacts = contracts
            .into_iter()
            .map(|(name, bytecode, abi)| {
                let abi: JsonAbi = serde_json::from_value(abi).unwrap();
                let artifact = ContractArtifact {
                    contract_name: name.to_string(),
                    source_name: format!("contracts/{name}.sol"),
                    abi,
                    bytecode: bytecode.into(),
                    artifact_path: PathBuf::from(format!("artifacts/contracts/{name}.sol/{name}.json")),
                };
                (name.to_string(), artifact)
            })
            .collect();

        Self { artifacts }
    }
}

fn constructor(inputs: &[(&str, &str)]) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .map(|(name, ty)| json!({ "name": name, "type": ty, "internalType": ty }))
        .collect();
    json!({ "type": "constructor", "inputs": inputs, "stateMutability": "nonpayable" })
}

impl ArtifactSource for FakeArtifacts {
    fn artifact(&self, name: &str) -> Result<ContractArtifact, ScriptError> {
        let name = name.rsplit_once(':').map(|(_, name)| name).unwrap_or(name);
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::ArtifactParsing(format!("no artifact for `{name}`")))
    }

    fn build_info(&self, _artifact: &ContractArtifact) -> Result<BuildInfo, ScriptError> {
        Ok(BuildInfo {
            solc_long_version: "0.8.20+commit.a1b79de6".to_string(),
            input: json!({ "language": "Solidity", "sources": {} }),
        })
    }
}

// -----------------
// | Fake Verifier |
// -----------------

/// A verification service that verifies each address once
#[derive(Default)]
pub struct FakeVerifier {
    requests: Mutex<Vec<VerificationRequest>>,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl VerificationService for FakeVerifier {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, ScriptError> {
        let mut requests = self.requests.lock().unwrap();
        let seen = requests.iter().any(|r| r.address == request.address);
        requests.push(request.clone());

        if seen {
            return Err(ScriptError::Verification(
                "Contract source code already verified".to_string(),
            ));
        }
        Ok(VerificationOutcome::Verified)
    }
}
