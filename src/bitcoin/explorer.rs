//! Price ticker and block explorer client.
//!
//! The default backend speaks the blockchain.info REST API. Response bodies are
//! kept as `serde_json::Value` where individual entries may be malformed so a
//! single bad transaction does not fail the whole lookup.

use std::collections::HashMap;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::ExplorerConfig;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("request timed out")]
    Timeout,

    #[error("received status code {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ExplorerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExplorerError::Timeout
        } else {
            ExplorerError::Request(e)
        }
    }
}

pub trait Explorer
where
    Self: Clone,
{
    /// Last traded USD price of one bitcoin.
    async fn usd_price(&self) -> Result<f64, ExplorerError>;

    /// Height of the chain tip, `None` when the explorer reports something unusable.
    async fn latest_block_height(&self) -> Result<Option<i64>, ExplorerError>;

    async fn address_transactions(&self, address: &str) -> Result<Vec<Value>, ExplorerError>;

    /// Total satoshis ever received per address, in one request.
    async fn total_received(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, i64>, ExplorerError>;
}

#[derive(Clone)]
pub struct BlockchainInfo {
    client: reqwest::Client,
    base_url: String,
}

impl BlockchainInfo {
    pub fn new(config: &ExplorerConfig) -> Result<Self, ExplorerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ExplorerError::Request)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, ExplorerError> {
        debug!("[Explorer] GET {}", url);

        let res = self.client.get(url).send().await?;
        if res.status() != StatusCode::OK {
            return Err(ExplorerError::Status(res.status().as_u16()));
        }

        res.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ExplorerError::Timeout
            } else {
                ExplorerError::Malformed(e.to_string())
            }
        })
    }
}

impl Explorer for BlockchainInfo {
    async fn usd_price(&self) -> Result<f64, ExplorerError> {
        let body = self.get_json(&format!("{}/ticker", self.base_url)).await?;
        parse_usd_price(&body)
    }

    async fn latest_block_height(&self) -> Result<Option<i64>, ExplorerError> {
        let body = self
            .get_json(&format!("{}/latestblock", self.base_url))
            .await?;
        Ok(parse_block_height(&body))
    }

    async fn address_transactions(&self, address: &str) -> Result<Vec<Value>, ExplorerError> {
        let body = self
            .get_json(&format!("{}/address/{}?format=json", self.base_url, address))
            .await?;

        match body.get("txs") {
            Some(Value::Array(txs)) => Ok(txs.clone()),
            Some(_) => Err(ExplorerError::Malformed("txs is not a list".to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn total_received(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, i64>, ExplorerError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }

        let body = self
            .get_json(&format!(
                "{}/multiaddr?active={}",
                self.base_url,
                addresses.join("|")
            ))
            .await?;
        parse_multiaddr(body)
    }
}

pub fn parse_usd_price(body: &Value) -> Result<f64, ExplorerError> {
    body.get("USD")
        .and_then(|usd| usd.get("last"))
        .and_then(Value::as_f64)
        .ok_or_else(|| ExplorerError::Malformed("missing USD.last".to_string()))
}

/// Reads `height`, accepting integers and integer strings.
pub fn parse_block_height(body: &Value) -> Option<i64> {
    let height = body.get("height")?;
    let parsed = json_integer(height);
    if parsed.is_none() {
        error!("Invalid block height: {}", height);
    }
    parsed
}

#[derive(Debug, Deserialize)]
struct MultiAddrResponse {
    addresses: Vec<AddressBalance>,
}

#[derive(Debug, Deserialize)]
struct AddressBalance {
    address: String,
    total_received: i64,
}

fn parse_multiaddr(body: Value) -> Result<HashMap<String, i64>, ExplorerError> {
    let res: MultiAddrResponse =
        serde_json::from_value(body).map_err(|e| ExplorerError::Malformed(e.to_string()))?;

    Ok(res
        .addresses
        .into_iter()
        .map(|balance| (balance.address, balance.total_received))
        .collect())
}

fn json_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Received outputs of one address, one entry per paying output.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSummary {
    pub payments: Vec<ReceivedPayment>,
    pub total_received_mbtc: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPayment {
    pub amount_mbtc: Decimal,
    pub confirmations: String,
}

pub const UNKNOWN_CONFIRMATIONS: &str = "unable to determine confirmations";

fn describe_confirmations(confirmations: i64) -> String {
    if confirmations == 1 {
        "1 confirmation".to_string()
    } else {
        format!("{} confirmations", confirmations)
    }
}

/// Sums the outputs paying `address`, in mBTC.
///
/// An unknown (or zero) tip height marks every transaction as undeterminable.
/// Transactions and outputs that fail to parse are skipped, as are block
/// heights too far from the tip to count.
pub fn summarize_transactions(
    address: &str,
    current_height: Option<i64>,
    txs: &[Value],
) -> TransactionSummary {
    let mut summary = TransactionSummary {
        payments: Vec::new(),
        total_received_mbtc: Decimal::ZERO,
    };
    let satoshis_per_mbtc = Decimal::from(crate::bitcoin::amounts::SATOSHIS_PER_MBTC);

    for tx in txs {
        let confirmations = match (current_height.filter(|h| *h != 0), tx.get("block_height")) {
            (None, _) => UNKNOWN_CONFIRMATIONS.to_string(),
            (Some(_), None) | (Some(_), Some(Value::Null)) => describe_confirmations(0),
            (Some(height), Some(block_height)) => match json_integer(block_height)
                .and_then(|block_height| height.checked_sub(block_height))
                .and_then(|depth| depth.checked_add(1))
            {
                Some(confirmations) => describe_confirmations(confirmations),
                None => {
                    error!("Error parsing transaction {}", tx);
                    continue;
                }
            },
        };

        let outputs = match tx.get("out").and_then(Value::as_array) {
            Some(outputs) => outputs,
            None => {
                error!("Error parsing transaction {}", tx);
                continue;
            }
        };

        for output in outputs {
            if output.get("addr").and_then(Value::as_str) != Some(address) {
                continue;
            }

            let amount = match output.get("value").and_then(json_decimal) {
                Some(value) => value / satoshis_per_mbtc,
                None => {
                    error!("Error parsing transaction output {}", output);
                    continue;
                }
            };

            summary.total_received_mbtc += amount;
            summary.payments.push(ReceivedPayment {
                amount_mbtc: amount,
                confirmations: confirmations.clone(),
            });
        }
    }

    summary
}
