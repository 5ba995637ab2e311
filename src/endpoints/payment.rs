use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use poem_openapi::{payload::Html, payload::Json, Object};
use rust_decimal::prelude::ToPrimitive;
use tracing::error;

use crate::bitcoin::amounts::format_mbtc;
use crate::bitcoin::chain::Chain;
use crate::bitcoin::explorer::{summarize_transactions, Explorer, ExplorerError};
use crate::config::EventConfig;
use crate::db::RegistrationRepository;
use crate::responses::PageResponse;
use crate::templates::pages;

#[derive(Debug, Object, Clone, PartialEq)]
pub struct PriceResponseObject {
    pub timestamp: String,
    pub successful: bool,
    pub price: f64,
}

#[derive(Debug, Object, Clone, PartialEq)]
pub struct TransactionsResponseObject {
    pub timestamp: String,
    pub successful: bool,
    /// `[amount in mBTC, confirmations]` per received output.
    pub transactions: Vec<Vec<String>>,
    pub total_received: f64,
}

/// `MM/DD/YYYY HH:MM:SS ZONE` in the configured zone, e.g. `03/01/2015 12:00:00 EST`.
fn format_timestamp(now: DateTime<Utc>, time_zone: Tz) -> String {
    now.with_timezone(&time_zone)
        .format("%m/%d/%Y %H:%M:%S %Z")
        .to_string()
}

fn timestamp(time_zone: Tz) -> String {
    format_timestamp(Utc::now(), time_zone)
}

fn log_failure(what: &str, e: &ExplorerError) {
    match e {
        ExplorerError::Timeout => error!("Timeout querying for {}", what),
        ExplorerError::Status(status) => {
            error!("Received status code {} when querying for {}", status, what)
        }
        e => error!("Error querying for {}: {}", what, e),
    }
}

pub async fn address<R: RegistrationRepository>(
    pool: &R,
    event: &EventConfig,
    btc_address: &str,
) -> PageResponse {
    match pool.get_registration_by_address(btc_address).await {
        Ok(Some(registration)) => PageResponse::Ok(Html(pages::address(event, &registration))),
        Ok(None) => PageResponse::redirect("/not_in_system"),
        Err(e) => {
            error!("Unable to query Registration table: {}", e);
            PageResponse::server_error(event)
        }
    }
}

pub async fn btcprice<E: Explorer>(explorer: &E, time_zone: Tz) -> Json<PriceResponseObject> {
    let timestamp = timestamp(time_zone);

    match explorer.usd_price().await {
        Ok(price) => Json(PriceResponseObject {
            timestamp,
            successful: true,
            price,
        }),
        Err(e) => {
            log_failure("BTC price", &e);
            Json(PriceResponseObject {
                timestamp,
                successful: false,
                price: 0.0,
            })
        }
    }
}

pub async fn btctrans<E: Explorer>(
    explorer: &E,
    chain: Chain,
    time_zone: Tz,
    btc_address: &str,
) -> Json<TransactionsResponseObject> {
    let mut res = TransactionsResponseObject {
        timestamp: timestamp(time_zone),
        successful: false,
        transactions: Vec::new(),
        total_received: 0.0,
    };

    if !chain.is_valid_address(btc_address) {
        error!("Refusing transaction lookup for invalid address {}", btc_address);
        return Json(res);
    }

    let current_height = match explorer.latest_block_height().await {
        Ok(height) => height,
        Err(e) => {
            log_failure("blockchain height", &e);
            None
        }
    };

    let txs = match explorer.address_transactions(btc_address).await {
        Ok(txs) => txs,
        Err(e) => {
            log_failure("transaction info", &e);
            return Json(res);
        }
    };

    let summary = summarize_transactions(btc_address, current_height, &txs);

    res.successful = true;
    res.total_received = summary.total_received_mbtc.to_f64().unwrap_or_default();
    res.transactions = summary
        .payments
        .into_iter()
        .map(|payment| vec![format_mbtc(payment.amount_mbtc), payment.confirmations])
        .collect();

    Json(res)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::test_support::{event_config, registration, Failure, MemoryRepository, ScriptedExplorer};

    const ADDR: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

    #[tokio::test]
    async fn test_address_unknown_redirects() {
        let pool = MemoryRepository::new();
        match address(&pool, &event_config(), "1Nobody").await {
            PageResponse::Found(location) => assert_eq!(location, "/not_in_system"),
            _ => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn test_address_renders_amounts() {
        let pool = MemoryRepository::new();
        pool.insert_registration(registration("1Reg", "Ada", 4_166_666));

        match address(&pool, &event_config(), "1Reg").await {
            PageResponse::Ok(Html(page)) => {
                assert!(page.contains("0.04166666 BTC"));
                assert!(page.contains("41.66666 mBTC"));
                assert!(page.contains("/qrcode?address=1Reg&amp;amount=0.04166666&amp;label=Meetup"));
            }
            _ => panic!("expected payment page"),
        }
    }

    #[tokio::test]
    async fn test_address_store_failure() {
        let pool = MemoryRepository::new();
        pool.fail_queries(true);
        assert!(matches!(
            address(&pool, &event_config(), "1Reg").await,
            PageResponse::InternalServerError(_)
        ));
    }

    #[test]
    fn test_timestamp_names_the_zone() {
        let now = Utc.with_ymd_and_hms(2015, 3, 1, 17, 30, 5).unwrap();

        assert_eq!(format_timestamp(now, Tz::UTC), "03/01/2015 17:30:05 UTC");
        assert_eq!(
            format_timestamp(now, Tz::America__New_York),
            "03/01/2015 12:30:05 EST"
        );
        assert_eq!(
            format_timestamp(now, Tz::Europe__Berlin),
            "03/01/2015 18:30:05 CET"
        );
    }

    #[tokio::test]
    async fn test_btcprice_success() {
        let explorer = ScriptedExplorer::new();
        explorer.set_price(Ok(431.27));

        let Json(res) = btcprice(&explorer, Tz::UTC).await;
        assert!(res.successful);
        assert_eq!(res.price, 431.27);
        assert!(!res.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_btcprice_failures_degrade() {
        for failure in [Failure::Timeout, Failure::Status(503), Failure::Malformed] {
            let explorer = ScriptedExplorer::new();
            explorer.set_price(Err(failure));

            let Json(res) = btcprice(&explorer, Tz::UTC).await;
            assert!(!res.successful);
            assert_eq!(res.price, 0.0);
        }
    }

    #[tokio::test]
    async fn test_btctrans_summarizes() {
        let explorer = ScriptedExplorer::new();
        explorer.set_height(Ok(Some(200)));
        explorer.set_transactions(Ok(vec![
            json!({"block_height": 200, "out": [{"addr": ADDR, "value": 150000}]}),
            json!({"out": [{"addr": ADDR, "value": 50000}, {"addr": "1Other", "value": 7}]}),
        ]));

        let Json(res) = btctrans(&explorer, Chain::Mainnet, Tz::UTC, ADDR).await;
        assert!(res.successful);
        assert_eq!(
            res.transactions,
            vec![
                vec!["1.50000".to_string(), "1 confirmation".to_string()],
                vec!["0.50000".to_string(), "0 confirmations".to_string()],
            ]
        );
        assert_eq!(res.total_received, 2.0);
    }

    #[tokio::test]
    async fn test_btctrans_height_failure_fails_open() {
        let explorer = ScriptedExplorer::new();
        explorer.set_height(Err(Failure::Timeout));
        explorer.set_transactions(Ok(vec![
            json!({"block_height": 200, "out": [{"addr": ADDR, "value": 100000}]}),
        ]));

        let Json(res) = btctrans(&explorer, Chain::Mainnet, Tz::UTC, ADDR).await;
        assert!(res.successful);
        assert_eq!(res.transactions[0][1], "unable to determine confirmations");
    }

    #[tokio::test]
    async fn test_btctrans_lookup_failure() {
        let explorer = ScriptedExplorer::new();
        explorer.set_transactions(Err(Failure::Status(500)));

        let Json(res) = btctrans(&explorer, Chain::Mainnet, Tz::UTC, ADDR).await;
        assert!(!res.successful);
        assert!(res.transactions.is_empty());
        assert_eq!(res.total_received, 0.0);
    }

    #[tokio::test]
    async fn test_btctrans_invalid_address_skips_explorer() {
        let explorer = ScriptedExplorer::new();

        let Json(res) = btctrans(&explorer, Chain::Mainnet, Tz::UTC, "bogus").await;
        assert!(!res.successful);
        assert_eq!(explorer.calls(), 0);
    }
}
