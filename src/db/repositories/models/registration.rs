use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow, Clone, PartialEq)]
pub struct Registration {
    pub id: Uuid,

    pub full_name: String,
    pub email_address: String,

    pub payment_usd: Decimal,
    pub btc_price: Decimal,
    /// Expected payment in satoshis.
    pub payment_btc: i64,

    pub btc_address: String,
    pub date_added: DateTime<Utc>,
}

/// A validated submission, before an address has been claimed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistration {
    pub full_name: String,
    pub email_address: String,
    pub payment_usd: Decimal,
    pub btc_price: Decimal,
    pub payment_btc: i64,
}
