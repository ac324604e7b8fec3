//! The chain client used to deploy and upgrade contracts, and the resolution
//! of the signer it sends transactions from

use std::{future::Future, str::FromStr, time::Duration};

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use reqwest::Url;
use tracing::{debug, info};

use crate::{errors::ScriptError, types::DeployedContract};

/// The delay between receipt polls
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// The substring by which a node reports a reverted call
const REVERT_INDICATOR: &str = "revert";

/// The chain operations the scripts rely on
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// The address transactions are sent from
    fn sender(&self) -> Address;

    /// Send a contract creation transaction and wait for it to be mined
    async fn deploy_code(&self, code: Bytes) -> Result<DeployedContract, ScriptError>;

    /// Send a call transaction and wait for it to be mined
    async fn send_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, ScriptError>;

    /// Read a storage slot of a contract
    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, ScriptError>;
}

/// Select the signer at `index` from a list of private keys
pub fn resolve_signer(priv_keys: &[String], index: usize) -> Result<PrivateKeySigner, ScriptError> {
    let key = priv_keys.get(index).ok_or(ScriptError::SignerNotFound {
        index,
        available: priv_keys.len(),
    })?;

    PrivateKeySigner::from_str(key.trim())
        .map_err(|e| ScriptError::ClientInitialization(format!("invalid private key: {e}")))
}

/// A [`ChainClient`] backed by a JSON-RPC node
#[derive(Clone)]
pub struct RpcClient {
    /// The signing provider
    provider: DynProvider,
    /// The signer's address
    sender: Address,
}

/// Parse the URL of an RPC node
fn parse_rpc_url(rpc_url: &str) -> Result<Url, ScriptError> {
    rpc_url
        .parse()
        .map_err(|e| ScriptError::ClientInitialization(format!("invalid RPC url: {e}")))
}

/// Query the chain id of the node at `rpc_url`, without a signer
pub async fn fetch_chain_id(rpc_url: &str) -> Result<u64, ScriptError> {
    let provider = ProviderBuilder::new().connect_http(parse_rpc_url(rpc_url)?);
    provider
        .get_chain_id()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))
}

/// Poll `fetch` every `interval` until it yields a receipt.
///
/// There is no bound on the number of polls: a transaction that was sent is
/// waited on until it is mined or the process is killed.
pub async fn poll_for_receipt<R, F, Fut>(mut fetch: F, interval: Duration) -> Result<R, ScriptError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<R>, ScriptError>>,
{
    loop {
        if let Some(receipt) = fetch().await? {
            return Ok(receipt);
        }
        tokio::time::sleep(interval).await;
    }
}

impl RpcClient {
    /// Connect to the node at `rpc_url`, signing with `signer`
    pub async fn connect(rpc_url: &str, signer: PrivateKeySigner) -> Result<Self, ScriptError> {
        let url = parse_rpc_url(rpc_url)?;
        let sender = signer.address();
        let provider = ProviderBuilder::new().wallet(signer).connect_http(url);
        let provider = DynProvider::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        info!("connected to chain {chain_id} as {sender}");

        Ok(Self { provider, sender })
    }

    /// Send a transaction and wait for a successful receipt
    async fn send_and_confirm(
        &self,
        tx: TransactionRequest,
    ) -> Result<TransactionReceipt, ScriptError> {
        let pending_tx = self.provider.send_transaction(tx).await.map_err(map_send_error)?;
        let tx_hash = *pending_tx.tx_hash();
        debug!("sent transaction {tx_hash:#x}");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.status() {
            return Err(ScriptError::TransactionReverted(format!("{tx_hash:#x}")));
        }

        Ok(receipt)
    }

    /// Wait, without a timeout, for the receipt of a transaction
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ScriptError> {
        let provider = &self.provider;
        let fetch = move || async move {
            provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ScriptError::TransactionFailed(e.to_string()))
        };
        poll_for_receipt(fetch, RECEIPT_POLL_INTERVAL).await
    }
}

impl ChainClient for RpcClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy_code(&self, code: Bytes) -> Result<DeployedContract, ScriptError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_deploy_code(code);
        let receipt = self.send_and_confirm(tx).await?;

        let address = receipt.contract_address.ok_or_else(|| {
            ScriptError::DeploymentFailed(format!(
                "no contract address in receipt of {:#x}",
                receipt.transaction_hash
            ))
        })?;

        Ok(DeployedContract {
            address,
            tx_hash: receipt.transaction_hash,
        })
    }

    async fn send_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, ScriptError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(calldata);
        let receipt = self.send_and_confirm(tx).await?;

        Ok(receipt.transaction_hash)
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, ScriptError> {
        self.provider
            .get_storage_at(address, slot)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))
    }
}

/// Classify an error returned when submitting a transaction
fn map_send_error(err: TransportError) -> ScriptError {
    match err {
        TransportError::ErrorResp(payload)
            if payload.message.to_lowercase().contains(REVERT_INDICATOR) =>
        {
            let data = payload.data.map(|d| d.get().to_string()).unwrap_or_default();
            ScriptError::TransactionReverted(format!("{} (data = {data})", payload.message))
        }
        err => ScriptError::TransactionFailed(err.to_string()),
    }
}
