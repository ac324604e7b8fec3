//! Locating and parsing the Hardhat compilation artifacts of the contracts
//! being deployed and verified

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    constants::{BUILD_INFO_DIR, DEBUG_FILE_SUFFIX},
    errors::ScriptError,
};

/// A source of contract compilation artifacts
pub trait ArtifactSource {
    /// Look up the artifact of a contract, by bare or fully qualified name
    fn artifact(&self, name: &str) -> Result<ContractArtifact, ScriptError>;

    /// The compiler input and version the artifact was built from
    fn build_info(&self, artifact: &ContractArtifact) -> Result<BuildInfo, ScriptError>;
}

/// A compiled contract
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    /// The contract name
    pub contract_name: String,
    /// The path of the source file, relative to the project root
    pub source_name: String,
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode
    pub bytecode: Bytes,
    /// The path of the artifact file the contract was read from
    #[serde(skip)]
    pub artifact_path: PathBuf,
}

impl ContractArtifact {
    /// The fully qualified name of the contract, e.g. `contracts/Vault.sol:Vault`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

/// The compiler run a contract was built by
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// The full compiler version, e.g. `0.8.20+commit.a1b79de6`
    pub solc_long_version: String,
    /// The standard JSON input given to the compiler
    pub input: Value,
}

/// The debug file written next to each artifact
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    /// The path of the build info, relative to the debug file
    build_info: PathBuf,
}

/// Artifacts laid out by Hardhat under `artifacts/<source path>/<Contract>.json`
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    /// The artifacts directory
    root: PathBuf,
}

impl HardhatArtifacts {
    /// Artifacts rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the artifact files of every contract with the given bare name
    fn find_artifacts(&self, contract_name: &str) -> Result<Vec<PathBuf>, ScriptError> {
        let file_name = format!("{contract_name}.json");
        let mut matches = Vec::new();
        let mut directories = vec![self.root.clone()];

        while let Some(dir) = directories.pop() {
            let entries = fs::read_dir(&dir)
                .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {e}", dir.display())))?;

            for entry in entries {
                let path = entry
                    .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?
                    .path();

                if path.is_dir() {
                    if !path.ends_with(BUILD_INFO_DIR) {
                        directories.push(path);
                    }
                } else if path.file_name().is_some_and(|f| *f == *file_name) {
                    matches.push(path);
                }
            }
        }

        Ok(matches)
    }

    /// The path of the artifact file of a contract
    fn artifact_path(&self, name: &str) -> Result<PathBuf, ScriptError> {
        if let Some((source, contract)) = name.rsplit_once(':') {
            return Ok(self.root.join(source).join(format!("{contract}.json")));
        }

        let mut matches = self.find_artifacts(name)?;
        match matches.len() {
            0 => Err(ScriptError::ArtifactParsing(format!(
                "no artifact for `{name}` under {}",
                self.root.display()
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(ScriptError::ArtifactParsing(format!(
                "multiple artifacts for `{name}`, use a fully qualified name"
            ))),
        }
    }
}

impl ArtifactSource for HardhatArtifacts {
    fn artifact(&self, name: &str) -> Result<ContractArtifact, ScriptError> {
        let path = self.artifact_path(name)?;
        let mut artifact: ContractArtifact = read_json(&path)?;
        if artifact.bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "`{name}` has no creation bytecode, is it abstract?"
            )));
        }

        debug!(artifact = %path.display(), "loaded artifact for {name}");
        artifact.artifact_path = path;
        Ok(artifact)
    }

    fn build_info(&self, artifact: &ContractArtifact) -> Result<BuildInfo, ScriptError> {
        let stem = artifact
            .artifact_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.contract_name.clone());
        let debug_path = artifact
            .artifact_path
            .with_file_name(format!("{stem}{DEBUG_FILE_SUFFIX}"));
        let debug_file: DebugFile = read_json(&debug_path)?;

        let build_info_path = debug_path
            .parent()
            .map(|dir| dir.join(&debug_file.build_info))
            .unwrap_or(debug_file.build_info);
        read_json(&build_info_path)
    }
}

/// Read and parse a JSON file
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ScriptError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    /// Write a minimal artifact, its debug file, and a shared build info
    fn write_artifact(root: &Path, source: &str, name: &str) {
        let dir = root.join(source);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("{name}.json")),
            json!({
                "_format": "hh-sol-artifact-1",
                "contractName": name,
                "sourceName": source,
                "abi": [],
                "bytecode": "0x6080",
                "deployedBytecode": "0x",
            })
            .to_string(),
        )
        .unwrap();

        let depth = Path::new(source).components().count();
        let build_info = format!("{}build-info/abc.json", "../".repeat(depth));
        fs::write(
            dir.join(format!("{name}.dbg.json")),
            json!({ "_format": "hh-sol-dbg-1", "buildInfo": build_info }).to_string(),
        )
        .unwrap();

        fs::create_dir_all(root.join("build-info")).unwrap();
        fs::write(
            root.join("build-info/abc.json"),
            json!({
                "solcLongVersion": "0.8.20+commit.a1b79de6",
                "input": { "language": "Solidity", "sources": {} },
                "output": {},
            })
            .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_artifact_by_bare_name() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "contracts/Vault.sol", "Vault");

        let artifacts = HardhatArtifacts::new(dir.path());
        let artifact = artifacts.artifact("Vault").unwrap();

        assert_eq!(artifact.fully_qualified_name(), "contracts/Vault.sol:Vault");
        assert_eq!(&artifact.bytecode[..], &[0x60, 0x80]);
    }

    #[test]
    fn test_artifact_by_qualified_name() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "contracts/Vault.sol", "Vault");
        write_artifact(dir.path(), "contracts/legacy/Vault.sol", "Vault");

        let artifacts = HardhatArtifacts::new(dir.path());
        assert!(matches!(
            artifacts.artifact("Vault"),
            Err(ScriptError::ArtifactParsing(_))
        ));

        let artifact = artifacts.artifact("contracts/legacy/Vault.sol:Vault").unwrap();
        assert_eq!(artifact.source_name, "contracts/legacy/Vault.sol");
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let res = HardhatArtifacts::new(dir.path()).artifact("VaultV2");

        assert!(matches!(res, Err(ScriptError::ArtifactParsing(_))));
    }

    #[test]
    fn test_build_info() {
        let dir = tempdir().unwrap();
        write_artifact(dir.path(), "contracts/TacoCoin.sol", "TacoCoin");

        let artifacts = HardhatArtifacts::new(dir.path());
        let artifact = artifacts.artifact("TacoCoin").unwrap();
        let build_info = artifacts.build_info(&artifact).unwrap();

        assert_eq!(build_info.solc_long_version, "0.8.20+commit.a1b79de6");
        assert_eq!(build_info.input["language"], json!("Solidity"));
    }
}
