use std::collections::HashMap;

use chrono::{DateTime, Utc};
use poem_openapi::payload::Html;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::auth::resolve_session;
use crate::bitcoin::amounts::{format_mbtc, format_usd, satoshis_to_mbtc};
use crate::bitcoin::explorer::Explorer;
use crate::config::EventConfig;
use crate::db::repositories::models::registration::Registration;
use crate::db::{RegistrationRepository, Role, SessionRepository};
use crate::responses::PageResponse;
use crate::templates::pages;

/// A registration together with what the ledger says it has received.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInfo {
    pub date_added: DateTime<Utc>,
    pub full_name: String,
    pub email_address: String,
    pub payment_usd: Decimal,
    pub payment_mbtc: Decimal,
    pub received_mbtc: Decimal,
    pub btc_price: Decimal,
    pub btc_address: String,
    pub paid: bool,
}

impl From<&Registration> for RegistrationInfo {
    fn from(registration: &Registration) -> Self {
        Self {
            date_added: registration.date_added,
            full_name: registration.full_name.clone(),
            email_address: registration.email_address.clone(),
            payment_usd: registration.payment_usd,
            payment_mbtc: satoshis_to_mbtc(registration.payment_btc),
            received_mbtc: Decimal::ZERO,
            btc_price: registration.btc_price,
            btc_address: registration.btc_address.clone(),
            paid: false,
        }
    }
}

impl RegistrationInfo {
    pub fn payment_usd_str(&self) -> String {
        format_usd(self.payment_usd)
    }

    pub fn payment_mbtc_str(&self) -> String {
        format_mbtc(self.payment_mbtc)
    }

    pub fn received_mbtc_str(&self) -> String {
        format_mbtc(self.received_mbtc)
    }

    pub fn btc_price_str(&self) -> String {
        format_usd(self.btc_price)
    }
}

/// Joins registrations with received totals (satoshis) and orders newest first.
///
/// Without balances every registration stays unpaid with nothing received.
pub fn registration_infos(
    registrations: &[Registration],
    received: Option<&HashMap<String, i64>>,
) -> Vec<RegistrationInfo> {
    let mut infos: Vec<RegistrationInfo> = registrations
        .iter()
        .map(|registration| {
            let mut info = RegistrationInfo::from(registration);
            if let Some(satoshis) = received.and_then(|r| r.get(&info.btc_address)) {
                info.received_mbtc = satoshis_to_mbtc(*satoshis);
                info.paid = info.received_mbtc >= info.payment_mbtc;
            }
            info
        })
        .collect();

    infos.sort_by(|a, b| b.date_added.cmp(&a.date_added));
    infos
}

/// `None` when the caller may see manager reports, otherwise the response to send.
///
/// Anonymous callers and unknown sessions are sent to the forbidden page like
/// any other non-manager.
async fn require_manager<R: SessionRepository>(
    pool: &R,
    event: &EventConfig,
    session: Option<&str>,
) -> Option<PageResponse> {
    let context = match session {
        Some(token) => resolve_session(pool, token).await,
        None => None,
    };
    let account_id = match context {
        Some(context) => context.account_id,
        None => {
            warn!("Report requested without a valid session");
            return Some(PageResponse::redirect("/forbidden"));
        }
    };

    match pool.has_role(&account_id, Role::Manager).await {
        Ok(true) => None,
        Ok(false) => {
            warn!("Account {} is not a manager", account_id);
            Some(PageResponse::redirect("/forbidden"))
        }
        Err(e) => {
            error!("Unable to check roles for account {}: {}", account_id, e);
            Some(PageResponse::server_error(event))
        }
    }
}

pub async fn address_report<R>(pool: &R, event: &EventConfig, session: Option<&str>) -> PageResponse
where
    R: RegistrationRepository + SessionRepository,
{
    if let Some(denied) = require_manager(pool, event, session).await {
        return denied;
    }

    info!("Presenting addresses available report");

    match pool.get_available_addresses().await {
        Ok(addresses) => {
            info!("There are {} BTC addresses available", addresses.len());
            PageResponse::Ok(Html(pages::address_report(event, &addresses)))
        }
        Err(e) => {
            error!("Unable to query PaymentAddress table: {}", e);
            PageResponse::server_error(event)
        }
    }
}

pub async fn registration_report<R, E>(
    pool: &R,
    explorer: &E,
    event: &EventConfig,
    session: Option<&str>,
) -> PageResponse
where
    R: RegistrationRepository + SessionRepository,
    E: Explorer,
{
    if let Some(denied) = require_manager(pool, event, session).await {
        return denied;
    }

    info!("Presenting registration report");

    let registrations = match pool.get_registrations().await {
        Ok(registrations) => registrations,
        Err(e) => {
            error!("Unable to query Registration table: {}", e);
            return PageResponse::server_error(event);
        }
    };

    let addresses: Vec<String> = registrations
        .iter()
        .map(|r| r.btc_address.clone())
        .collect();

    let received = if addresses.is_empty() {
        None
    } else {
        match explorer.total_received(&addresses).await {
            Ok(received) => Some(received),
            Err(e) => {
                error!("Error querying for multiple transaction info: {}", e);
                None
            }
        }
    };

    let infos = registration_infos(&registrations, received.as_ref());
    info!("There are {} registrations", infos.len());

    PageResponse::Ok(Html(pages::registration_report(event, &infos)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::test_support::{
        event_config, registration, Failure, MemoryRepository, ScriptedExplorer,
    };

    fn dated(address: &str, name: &str, satoshis: i64, day: u32) -> Registration {
        let mut r = registration(address, name, satoshis);
        r.date_added = Utc.with_ymd_and_hms(2015, 3, day, 12, 0, 0).unwrap();
        r
    }

    #[test]
    fn test_paid_when_received_covers_expected() {
        let registrations = vec![
            dated("1Exact", "Exact", 150_000, 1),
            dated("1Short", "Short", 150_000, 2),
            dated("1Over", "Over", 150_000, 3),
            dated("1Missing", "Missing", 150_000, 4),
        ];
        let received = HashMap::from([
            ("1Exact".to_string(), 150_000),
            ("1Short".to_string(), 149_999),
            ("1Over".to_string(), 1_000_000),
            ("1Stranger".to_string(), 5),
        ]);

        let infos = registration_infos(&registrations, Some(&received));
        let paid: HashMap<_, _> = infos
            .iter()
            .map(|i| (i.btc_address.as_str(), i.paid))
            .collect();

        assert_eq!(paid["1Exact"], true);
        assert_eq!(paid["1Short"], false);
        assert_eq!(paid["1Over"], true);
        assert_eq!(paid["1Missing"], false);
        assert_eq!(infos.len(), 4);
    }

    #[test]
    fn test_ordered_newest_first() {
        let registrations = vec![
            dated("1A", "A", 1, 1),
            dated("1B", "B", 1, 5),
            dated("1C", "C", 1, 3),
        ];

        let infos = registration_infos(&registrations, None);
        let order: Vec<_> = infos.iter().map(|i| i.full_name.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
        assert!(infos.iter().all(|i| !i.paid && i.received_mbtc == Decimal::ZERO));
    }

    #[test]
    fn test_info_strings() {
        let info = RegistrationInfo::from(&registration("1A", "A", 4_166_666));
        assert_eq!(info.payment_mbtc_str(), "41.66666");
        assert_eq!(info.received_mbtc_str(), "0.00000");
        assert_eq!(info.payment_usd_str(), "25.00");
        assert_eq!(info.btc_price_str(), "600.00");
    }

    fn manager_session(pool: &MemoryRepository) -> &'static str {
        let manager = pool.add_manager("boss@example.com");
        pool.add_session("boss-session", manager);
        "boss-session"
    }

    #[tokio::test]
    async fn test_reports_require_manager() {
        let pool = MemoryRepository::new();
        let visitor = pool.add_account("visitor@example.com");
        pool.add_session("visitor-session", visitor);
        let explorer = ScriptedExplorer::new();

        for session in [None, Some("visitor-session"), Some("expired-session")] {
            match address_report(&pool, &event_config(), session).await {
                PageResponse::Found(location) => assert_eq!(location, "/forbidden"),
                _ => panic!("expected forbidden redirect for {:?}", session),
            }
            match registration_report(&pool, &explorer, &event_config(), session).await {
                PageResponse::Found(location) => assert_eq!(location, "/forbidden"),
                _ => panic!("expected forbidden redirect for {:?}", session),
            }
        }
        assert_eq!(explorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_role_lookup_failure_is_server_error() {
        let pool = MemoryRepository::new();
        let session = manager_session(&pool);
        pool.fail_queries(true);

        assert!(matches!(
            address_report(&pool, &event_config(), Some(session)).await,
            PageResponse::InternalServerError(_)
        ));
    }

    #[tokio::test]
    async fn test_address_report_lists_available() {
        let pool = MemoryRepository::new();
        let manager = manager_session(&pool);
        pool.add_address("1Free");
        pool.add_address("1Taken");
        pool.insert_registration(registration("1Taken", "Ada", 1));

        match address_report(&pool, &event_config(), Some(manager)).await {
            PageResponse::Ok(Html(page)) => {
                assert!(page.contains("There are 1 addresses available."));
                assert!(page.contains("1Free"));
                assert!(!page.contains("1Taken"));
            }
            _ => panic!("expected report"),
        }
    }

    #[tokio::test]
    async fn test_registration_report_with_balances() {
        let pool = MemoryRepository::new();
        let manager = manager_session(&pool);
        let first = dated("1Old", "Old Timer", 100_000, 1);
        let mut second = dated("1New", "New Comer", 100_000, 1);
        second.date_added = first.date_added + Duration::hours(1);
        pool.insert_registration(first);
        pool.insert_registration(second);

        let explorer = ScriptedExplorer::new();
        explorer.set_balances(Ok(HashMap::from([
            ("1Old".to_string(), 100_000),
            ("1New".to_string(), 0),
        ])));

        match registration_report(&pool, &explorer, &event_config(), Some(manager)).await {
            PageResponse::Ok(Html(page)) => {
                let new = page.find("New Comer").unwrap();
                let old = page.find("Old Timer").unwrap();
                assert!(new < old);
                assert!(page.contains(r#"<tr class="paid">"#));
                assert!(page.contains(r#"<tr class="unpaid">"#));
            }
            _ => panic!("expected report"),
        }
        assert_eq!(explorer.calls(), 1);
    }

    #[tokio::test]
    async fn test_registration_report_ledger_failure_is_silent() {
        let pool = MemoryRepository::new();
        let manager = manager_session(&pool);
        pool.insert_registration(registration("1Reg", "Ada", 100_000));

        let explorer = ScriptedExplorer::new();
        explorer.set_balances(Err(Failure::Timeout));

        match registration_report(&pool, &explorer, &event_config(), Some(manager)).await {
            PageResponse::Ok(Html(page)) => {
                assert!(page.contains("There are 1 registrations."));
                assert!(!page.contains(r#"<tr class="paid">"#));
            }
            _ => panic!("expected report"),
        }
    }
}
