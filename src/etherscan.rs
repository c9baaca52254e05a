// src/etherscan.rs
use crate::error::ProviderError;
use crate::models::RawTransaction;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);
const NO_TRANSACTIONS: &str = "No transactions found";

/// Source of raw chain data for a single address
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Full transaction list, newest first
    async fn transactions(&self, address: &str) -> Result<Vec<RawTransaction>, ProviderError>;

    /// Balance in base units as a decimal string
    async fn balance(&self, address: &str) -> Result<String, ProviderError>;
}

/// Etherscan `{status, message, result}` envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    fn failure(&self) -> ProviderError {
        let detail = match &self.result {
            Value::String(s) if !s.is_empty() => format!("{} ({})", self.message, s),
            _ => self.message.clone(),
        };
        if detail.is_empty() {
            ProviderError::InvalidResponse("missing status".to_string())
        } else {
            ProviderError::Upstream(detail)
        }
    }
}

fn parse_envelope(body: &str) -> Result<Envelope, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

/// Decode a `txlist` reply. "No transactions found" is an empty history.
pub fn parse_transactions(body: &str) -> Result<Vec<RawTransaction>, ProviderError> {
    let envelope = parse_envelope(body)?;

    if envelope.status != "1" {
        if envelope.message.starts_with(NO_TRANSACTIONS) {
            return Ok(Vec::new());
        }
        return Err(envelope.failure());
    }

    match envelope.result {
        Value::Array(_) => serde_json::from_value(envelope.result)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string())),
        other => Err(ProviderError::InvalidResponse(format!(
            "expected a transaction list, got {}",
            other
        ))),
    }
}

/// Decode a `balance` reply
pub fn parse_balance(body: &str) -> Result<String, ProviderError> {
    let envelope = parse_envelope(body)?;

    if envelope.status != "1" {
        return Err(envelope.failure());
    }

    match envelope.result {
        Value::String(balance) => Ok(balance),
        other => Err(ProviderError::InvalidResponse(format!(
            "expected a balance string, got {}",
            other
        ))),
    }
}

/// HTTP client for the Etherscan account API
#[derive(Clone)]
pub struct EtherscanClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EtherscanClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// GET with retries on transport failures. HTTP errors are not retried.
    async fn get(&self, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", api_key));

        for attempt in 1..=MAX_ATTEMPTS {
            info!("📡 Sending {:?} → {}", params, self.base_url);

            match self.client.get(&self.base_url).query(&query).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        return Err(ProviderError::Upstream(format!("HTTP {}", resp.status())));
                    }
                    return Ok(resp.text().await?);
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "⚠️ Etherscan request failed (attempt {}): {}. Retrying...",
                        attempt, e
                    );
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    return Err(ProviderError::Upstream(format!(
                        "request failed after {} attempts: {}",
                        MAX_ATTEMPTS, e
                    )))
                }
            }
        }

        Err(ProviderError::Upstream("retries exhausted".to_string()))
    }
}

#[async_trait]
impl ChainDataProvider for EtherscanClient {
    async fn transactions(&self, address: &str) -> Result<Vec<RawTransaction>, ProviderError> {
        let body = self
            .get(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", "desc"),
            ])
            .await?;

        let txs = parse_transactions(&body)?;
        info!("📩 {} transactions for {}", txs.len(), address);
        Ok(txs)
    }

    async fn balance(&self, address: &str) -> Result<String, ProviderError> {
        let body = self
            .get(&[
                ("module", "account"),
                ("action", "balance"),
                ("address", address),
                ("tag", "latest"),
            ])
            .await?;

        parse_balance(&body)
    }
}
