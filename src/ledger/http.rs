//! HTTP adapter for the external ledger service.
//!
//! The ledger is opaque to us: we POST a hash, poll until the network
//! reports inclusion, and read proofs/stats back. Only transient
//! transport failures are retried; a rejection from the contract is
//! terminal for the request.
use super::{LedgerClient, LedgerProof, LedgerReceipt, LedgerStats, RetryConfig};
use crate::error::AnchorError;
use crate::trade::TradeHash;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const SIGNER_HEADER: &str = "x-signer-key";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    signer_key: String,
    confirm_timeout: Duration,
    retry: RetryConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    trade_hash: &'a str,
    submitter: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAck {
    transaction_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorStatus {
    status: String,
    block_number: Option<u64>,
    gas_used: Option<u64>,
}

impl HttpLedger {
    pub fn new(
        base_url: &str,
        signer_key: &str,
        confirm_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, AnchorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer_key: signer_key.to_string(),
            confirm_timeout,
            retry,
        })
    }

    /// Send the anchor request once. The contract accepts duplicate hashes
    /// idempotently, so retrying this call after a transport failure is safe.
    async fn post_anchor(&self, hash: &TradeHash, submitter: &str) -> Result<SubmitAck, AnchorError> {
        let url = format!("{}/anchors", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(SIGNER_HEADER, &self.signer_key)
            .json(&SubmitBody {
                trade_hash: hash.as_str(),
                submitter,
            })
            .send()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AnchorError::LedgerUnavailable(format!(
                "ledger returned {status}"
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::LedgerRejected(body));
        }

        response
            .json::<SubmitAck>()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))
    }

    /// Poll the submitted transaction until it is confirmed or the
    /// bounded wait elapses. The submission itself may still land after a
    /// timeout here; a later proof query discovers it.
    async fn await_confirmation(
        &self,
        hash: &TradeHash,
        transaction_hash: &str,
    ) -> Result<LedgerReceipt, AnchorError> {
        let url = format!("{}/anchors/{}", self.base_url, transaction_hash);
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

            if response.status().is_success() {
                let status: AnchorStatus = response
                    .json()
                    .await
                    .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

                match status.status.as_str() {
                    "confirmed" => {
                        return Ok(LedgerReceipt {
                            trade_hash: hash.as_str().to_string(),
                            transaction_hash: transaction_hash.to_string(),
                            block_number: status.block_number.unwrap_or_default(),
                            gas_used: status.gas_used.unwrap_or_default(),
                        });
                    }
                    "reverted" => {
                        return Err(AnchorError::LedgerRejected(format!(
                            "transaction {transaction_hash} reverted"
                        )));
                    }
                    other => debug!(tx = transaction_hash, status = other, "anchor pending"),
                }
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(AnchorError::LedgerTimeout(self.confirm_timeout.as_secs()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    async fn submit(
        &self,
        hash: &TradeHash,
        submitter: &str,
    ) -> Result<LedgerReceipt, AnchorError> {
        let mut attempt = 0;
        let ack = loop {
            match self.post_anchor(hash, submitter).await {
                Ok(ack) => break ack,
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        hash = hash.as_str(),
                        attempt,
                        ?delay,
                        error = %err,
                        "anchor submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        debug!(hash = hash.as_str(), tx = %ack.transaction_hash, "anchor accepted");
        self.await_confirmation(hash, &ack.transaction_hash).await
    }

    async fn proof(&self, hash: &TradeHash) -> Result<LedgerProof, AnchorError> {
        let url = format!("{}/proofs/{}", self.base_url, hash.as_str());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

        // An unknown hash is a normal outcome, not a failure.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(LedgerProof::absent());
        }
        if !response.status().is_success() {
            return Err(AnchorError::LedgerUnavailable(format!(
                "ledger returned {}",
                response.status()
            )));
        }

        response
            .json::<LedgerProof>()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))
    }

    async fn stats(&self) -> Result<LedgerStats, AnchorError> {
        let url = format!("{}/stats", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnchorError::LedgerUnavailable(format!(
                "ledger returned {}",
                response.status()
            )));
        }

        response
            .json::<LedgerStats>()
            .await
            .map_err(|e| AnchorError::LedgerUnavailable(e.to_string()))
    }
}
