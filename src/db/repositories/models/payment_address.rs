use sqlx::types::chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct PaymentAddress {
    pub btc_address: String,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}
