//! A [`VerificationService`] backed by an Etherscan-compatible API

use std::time::Duration;

use alloy::hex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    artifacts::ArtifactSource,
    constants::{ETHERSCAN_CODE_FORMAT, PASS_INDICATOR, PENDING_INDICATOR},
    errors::ScriptError,
    utils::encode_constructor_args,
    verifier::{is_already_verified, VerificationOutcome, VerificationRequest, VerificationService},
};

/// The `status` of a successful Etherscan response
const STATUS_OK: &str = "1";

/// Connection settings for the verification API
#[derive(Debug, Clone)]
pub struct EtherscanConfig {
    /// The API endpoint
    pub api_url: String,
    /// The API key
    pub api_key: String,
    /// The chain the contracts are deployed on, required by multichain endpoints
    pub chain_id: u64,
    /// The delay between verification status polls
    pub poll_interval: Duration,
    /// The number of status polls before giving up on a pending verification
    pub max_polls: u32,
}

/// The envelope of every Etherscan API response
#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanResponse {
    /// `"1"` on success, `"0"` otherwise
    pub status: String,
    /// A short description of the status
    #[serde(default)]
    pub message: String,
    /// The payload, or an error description
    #[serde(default)]
    pub result: String,
}

/// The result of submitting source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The submission was queued under the given guid
    Queued(String),
    /// The contract is already verified
    AlreadyVerified,
}

/// The result of polling a queued submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Still in the queue
    Pending,
    /// Done
    Complete(VerificationOutcome),
}

/// Classify the response to a `verifysourcecode` request
pub fn classify_submission(response: &EtherscanResponse) -> Result<Submission, ScriptError> {
    if response.status == STATUS_OK {
        return Ok(Submission::Queued(response.result.clone()));
    }
    if is_already_verified(&response.result) || is_already_verified(&response.message) {
        return Ok(Submission::AlreadyVerified);
    }

    Err(ScriptError::Verification(format!(
        "{}: {}",
        response.message, response.result
    )))
}

/// Classify the response to a `checkverifystatus` request
pub fn classify_status(response: &EtherscanResponse) -> Result<PollStatus, ScriptError> {
    let result = response.result.to_lowercase();
    if result.contains(PENDING_INDICATOR) {
        return Ok(PollStatus::Pending);
    }
    if is_already_verified(&result) {
        return Ok(PollStatus::Complete(VerificationOutcome::AlreadyVerified));
    }
    if response.status == STATUS_OK || result.contains(PASS_INDICATOR) {
        return Ok(PollStatus::Complete(VerificationOutcome::Verified));
    }

    Err(ScriptError::Verification(response.result.clone()))
}

/// Submits contracts to an Etherscan-compatible API, reading their sources
/// from the build info of their artifacts
pub struct EtherscanClient<A: ArtifactSource> {
    /// The HTTP client
    client: Client,
    /// The API settings
    config: EtherscanConfig,
    /// Where contract artifacts are read from
    artifacts: A,
}

impl<A: ArtifactSource> EtherscanClient<A> {
    /// Create a new client
    pub fn new(config: EtherscanConfig, artifacts: A) -> Result<Self, ScriptError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        Ok(Self {
            client,
            config,
            artifacts,
        })
    }

    /// The `chainid` query parameter sent with every request
    fn chain_query(&self) -> Vec<(&'static str, String)> {
        vec![("chainid", self.config.chain_id.to_string())]
    }

    /// Submit the source of a contract
    async fn submit(&self, request: &VerificationRequest) -> Result<Submission, ScriptError> {
        let artifact = self.artifacts.artifact(request.artifact_name())?;
        let build_info = self.artifacts.build_info(&artifact)?;

        let constructor_args = encode_constructor_args(&artifact.abi, &request.constructor_args)?;
        let source_code = serde_json::to_string(&build_info.input)
            .map_err(|e| ScriptError::Verification(e.to_string()))?;
        let contract_name = request
            .contract_path
            .clone()
            .unwrap_or_else(|| artifact.fully_qualified_name());

        let form = [
            ("apikey", self.config.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", request.address.to_checksum(None)),
            ("sourceCode", source_code),
            ("codeformat", ETHERSCAN_CODE_FORMAT.to_string()),
            ("contractname", contract_name),
            ("compilerversion", format!("v{}", build_info.solc_long_version)),
            // Sic, the API's spelling
            ("constructorArguements", hex::encode(constructor_args)),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .query(&self.chain_query())
            .form(&form)
            .send()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?;
        let response = parse_response(response).await?;
        debug!(?response, "submitted {}", request.logical_name);

        classify_submission(&response)
    }

    /// Poll a queued submission until it leaves the queue
    async fn wait_for_result(&self, guid: &str) -> Result<VerificationOutcome, ScriptError> {
        let mut query = self.chain_query();
        query.extend([
            ("apikey", self.config.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "checkverifystatus".to_string()),
            ("guid", guid.to_string()),
        ]);

        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .client
                .get(&self.config.api_url)
                .query(&query)
                .send()
                .await
                .map_err(|e| ScriptError::Verification(e.to_string()))?;
            let response = parse_response(response).await?;
            debug!(?response, "polled verification {guid}");

            if let PollStatus::Complete(outcome) = classify_status(&response)? {
                return Ok(outcome);
            }
        }

        Err(ScriptError::Verification(format!(
            "verification {guid} still pending after {} polls",
            self.config.max_polls
        )))
    }
}

impl<A: ArtifactSource> VerificationService for EtherscanClient<A> {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, ScriptError> {
        match self.submit(request).await? {
            Submission::AlreadyVerified => Ok(VerificationOutcome::AlreadyVerified),
            Submission::Queued(guid) => self.wait_for_result(&guid).await,
        }
    }
}

/// Check the HTTP status of a response and parse its body
async fn parse_response(response: reqwest::Response) -> Result<EtherscanResponse, ScriptError> {
    if !response.status().is_success() {
        return Err(ScriptError::Verification(format!(
            "API request failed: {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ScriptError::Verification(format!("unexpected API response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::HardhatArtifacts;

    fn response(status: &str, message: &str, result: &str) -> EtherscanResponse {
        EtherscanResponse {
            status: status.to_string(),
            message: message.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_classify_submission() {
        let queued = response("1", "OK", "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn");
        assert_eq!(
            classify_submission(&queued).unwrap(),
            Submission::Queued("ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn".to_string())
        );

        let already = response("0", "NOTOK", "Contract source code already verified");
        assert_eq!(classify_submission(&already).unwrap(), Submission::AlreadyVerified);

        let failed = response("0", "NOTOK", "Invalid API Key");
        assert!(matches!(
            classify_submission(&failed),
            Err(ScriptError::Verification(_))
        ));
    }

    #[test]
    fn test_classify_status() {
        let pending = response("0", "NOTOK", "Pending in queue");
        assert_eq!(classify_status(&pending).unwrap(), PollStatus::Pending);

        let pass = response("1", "OK", "Pass - Verified");
        assert_eq!(
            classify_status(&pass).unwrap(),
            PollStatus::Complete(VerificationOutcome::Verified)
        );

        let already = response("0", "NOTOK", "Already Verified");
        assert_eq!(
            classify_status(&already).unwrap(),
            PollStatus::Complete(VerificationOutcome::AlreadyVerified)
        );

        let failed = response("0", "NOTOK", "Fail - Unable to verify");
        assert!(matches!(
            classify_status(&failed),
            Err(ScriptError::Verification(_))
        ));
    }

    #[test]
    fn test_chain_id_always_sent() {
        let config = EtherscanConfig {
            api_url: "https://api.etherscan.io/v2/api".to_string(),
            api_key: "key".to_string(),
            chain_id: 421614,
            poll_interval: Duration::from_secs(5),
            max_polls: 12,
        };
        let client = EtherscanClient::new(config, HardhatArtifacts::new("artifacts")).unwrap();

        assert_eq!(client.chain_query(), vec![("chainid", "421614".to_string())]);
    }
}
