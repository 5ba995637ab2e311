//! In-memory stand-ins for the database, explorer and mail server.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    bitcoin::explorer::{Explorer, ExplorerError},
    config::EventConfig,
    db::{
        repositories::models::{
            payment_address::PaymentAddress,
            registration::{NewRegistration, Registration},
        },
        RegistrationRepository, Role, SessionRepository,
    },
    notifications::mailer::{recipients, MailError, Mailer, OutgoingEmail},
};

pub fn event_config() -> EventConfig {
    EventConfig {
        event_name: "Meetup".to_string(),
        environment_name: String::new(),
        host_url: "http://meetup.test".to_string(),
    }
}

/// A $25 registration at $600/BTC with the given expected satoshis.
pub fn registration(btc_address: &str, full_name: &str, payment_btc: i64) -> Registration {
    Registration {
        id: Uuid::new_v4(),
        full_name: full_name.to_string(),
        email_address: format!("{}@example.com", full_name.to_lowercase().replace(' ', ".")),
        payment_usd: Decimal::new(25, 0),
        btc_price: Decimal::new(600, 0),
        payment_btc,
        btc_address: btc_address.to_string(),
        date_added: Utc::now(),
    }
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected {} failure", what))
}

#[derive(Default)]
struct Store {
    addresses: Vec<PaymentAddress>,
    registrations: Vec<Registration>,
    accounts: HashMap<Uuid, String>,
    roles: Vec<(Uuid, Role)>,
    sessions: HashMap<String, Uuid>,
    fail_queries: bool,
    fail_inserts: bool,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    store: Arc<Mutex<Store>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(&self, btc_address: &str) {
        self.store.lock().unwrap().addresses.push(PaymentAddress {
            btc_address: btc_address.to_string(),
            available: true,
            created_at: Utc::now(),
        });
    }

    /// Stores a registration as-is, consuming its address if pooled.
    pub fn insert_registration(&self, registration: Registration) {
        let mut store = self.store.lock().unwrap();
        for address in store.addresses.iter_mut() {
            if address.btc_address == registration.btc_address {
                address.available = false;
            }
        }
        store.registrations.push(registration);
    }

    pub fn add_account(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .lock()
            .unwrap()
            .accounts
            .insert(id, email.to_string());
        id
    }

    pub fn add_manager(&self, email: &str) -> Uuid {
        let id = self.add_account(email);
        self.store.lock().unwrap().roles.push((id, Role::Manager));
        id
    }

    pub fn add_session(&self, token: &str, account_id: Uuid) {
        self.store
            .lock()
            .unwrap()
            .sessions
            .insert(token.to_string(), account_id);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.store.lock().unwrap().fail_queries = fail;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.store.lock().unwrap().fail_inserts = fail;
    }

    pub fn available_addresses(&self) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .addresses
            .iter()
            .filter(|a| a.available)
            .map(|a| a.btc_address.clone())
            .collect()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.store.lock().unwrap().registrations.clone()
    }
}

impl RegistrationRepository for MemoryRepository {
    async fn has_available_address(&self) -> Result<bool, sqlx::Error> {
        let store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }
        Ok(store.addresses.iter().any(|a| a.available))
    }

    async fn get_available_addresses(&self) -> Result<Vec<PaymentAddress>, sqlx::Error> {
        let store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }
        Ok(store
            .addresses
            .iter()
            .filter(|a| a.available)
            .cloned()
            .collect())
    }

    async fn add_addresses(&self, addresses: &[String]) -> Result<u64, sqlx::Error> {
        let mut added = 0;
        for address in addresses {
            let exists = self
                .store
                .lock()
                .unwrap()
                .addresses
                .iter()
                .any(|a| &a.btc_address == address);
            if !exists {
                self.add_address(address);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn create_registration(
        &self,
        registration: &NewRegistration,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let mut store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }

        let index = match store.addresses.iter().position(|a| a.available) {
            Some(index) => index,
            None => return Ok(None),
        };

        // Fails before anything is written, as a rolled-back transaction would.
        if store.fail_inserts {
            return Err(injected("insert"));
        }

        store.addresses[index].available = false;
        let created = Registration {
            id: Uuid::new_v4(),
            full_name: registration.full_name.clone(),
            email_address: registration.email_address.clone(),
            payment_usd: registration.payment_usd,
            btc_price: registration.btc_price,
            payment_btc: registration.payment_btc,
            btc_address: store.addresses[index].btc_address.clone(),
            date_added: Utc::now(),
        };
        store.registrations.push(created.clone());

        Ok(Some(created))
    }

    async fn get_registration_by_address(
        &self,
        btc_address: &str,
    ) -> Result<Option<Registration>, sqlx::Error> {
        let store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }
        Ok(store
            .registrations
            .iter()
            .find(|r| r.btc_address == btc_address)
            .cloned())
    }

    async fn get_registrations(&self) -> Result<Vec<Registration>, sqlx::Error> {
        let store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }
        let mut registrations = store.registrations.clone();
        registrations.sort_by_key(|r| r.date_added);
        Ok(registrations)
    }
}

impl SessionRepository for MemoryRepository {
    async fn get_session(&self, token: &str) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self.store.lock().unwrap().sessions.get(token).copied())
    }

    async fn has_role(&self, account_id: &Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let store = self.store.lock().unwrap();
        if store.fail_queries {
            return Err(injected("query"));
        }
        Ok(store.roles.contains(&(*account_id, role)))
    }

    async fn get_role_emails(&self, role: Role) -> Result<Vec<String>, sqlx::Error> {
        let store = self.store.lock().unwrap();
        let mut emails: Vec<String> = store
            .roles
            .iter()
            .filter(|(_, r)| *r == role)
            .filter_map(|(id, _)| store.accounts.get(id).cloned())
            .collect();
        emails.sort();
        Ok(emails)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Timeout,
    Status(u16),
    Malformed,
}

impl Failure {
    fn error(self) -> ExplorerError {
        match self {
            Failure::Timeout => ExplorerError::Timeout,
            Failure::Status(status) => ExplorerError::Status(status),
            Failure::Malformed => ExplorerError::Malformed("scripted".to_string()),
        }
    }
}

struct Script {
    price: Result<f64, Failure>,
    height: Result<Option<i64>, Failure>,
    transactions: Result<Vec<Value>, Failure>,
    balances: Result<HashMap<String, i64>, Failure>,
    calls: usize,
}

/// Explorer that replays canned answers and counts requests.
#[derive(Clone)]
pub struct ScriptedExplorer {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExplorer {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                price: Err(Failure::Status(404)),
                height: Ok(None),
                transactions: Ok(Vec::new()),
                balances: Ok(HashMap::new()),
                calls: 0,
            })),
        }
    }

    pub fn set_price(&self, price: Result<f64, Failure>) {
        self.script.lock().unwrap().price = price;
    }

    pub fn set_height(&self, height: Result<Option<i64>, Failure>) {
        self.script.lock().unwrap().height = height;
    }

    pub fn set_transactions(&self, transactions: Result<Vec<Value>, Failure>) {
        self.script.lock().unwrap().transactions = transactions;
    }

    pub fn set_balances(&self, balances: Result<HashMap<String, i64>, Failure>) {
        self.script.lock().unwrap().balances = balances;
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls
    }
}

impl Explorer for ScriptedExplorer {
    async fn usd_price(&self) -> Result<f64, ExplorerError> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        script.price.map_err(Failure::error)
    }

    async fn latest_block_height(&self) -> Result<Option<i64>, ExplorerError> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        script.height.map_err(Failure::error)
    }

    async fn address_transactions(&self, _address: &str) -> Result<Vec<Value>, ExplorerError> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        script.transactions.clone().map_err(Failure::error)
    }

    async fn total_received(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, i64>, ExplorerError> {
        let mut script = self.script.lock().unwrap();
        script.calls += 1;
        let balances = script.balances.clone().map_err(Failure::error)?;
        Ok(balances
            .into_iter()
            .filter(|(address, _)| addresses.contains(address))
            .collect())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Vec<OutgoingEmail>,
    attempts: usize,
    fail_next: usize,
}

/// Mailer that keeps what it would have delivered.
///
/// Recipients are filtered the same way the SMTP mailer filters them.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    outbox: Arc<Mutex<Outbox>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next(&self, count: usize) {
        self.outbox.lock().unwrap().fail_next = count;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().unwrap().sent.clone()
    }

    pub fn attempts(&self) -> usize {
        self.outbox.lock().unwrap().attempts
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, message: &OutgoingEmail) -> Result<(), MailError> {
        let mut outbox = self.outbox.lock().unwrap();
        outbox.attempts += 1;
        if outbox.fail_next > 0 {
            outbox.fail_next -= 1;
            return Err(MailError::Transport("connection refused".to_string()));
        }

        let to = recipients(&message.to)?
            .into_iter()
            .map(|mailbox| mailbox.email.to_string())
            .collect();
        outbox.sent.push(OutgoingEmail {
            to,
            email: message.email.clone(),
        });
        Ok(())
    }
}
