//! Conversions between USD, satoshis, BTC and mBTC.
//!
//! Satoshis are the stored unit. BTC values are shown with 8 decimals and mBTC
//! values with 5, both exact since they are plain decimal shifts.

use rust_decimal::{prelude::ToPrimitive, Decimal};

pub const SATOSHIS_PER_BTC: i64 = 100_000_000;
pub const SATOSHIS_PER_MBTC: i64 = 100_000;

/// Expected payment in satoshis, truncated toward zero.
///
/// Returns `None` when the price is not positive or the result does not fit.
pub fn satoshis_for_usd(payment_usd: Decimal, btc_price: Decimal) -> Option<i64> {
    if btc_price <= Decimal::ZERO || payment_usd.is_sign_negative() {
        return None;
    }

    let btc = payment_usd.checked_div(btc_price)?;
    btc.checked_mul(Decimal::from(SATOSHIS_PER_BTC))?
        .trunc()
        .to_i64()
}

pub fn satoshis_to_btc(satoshis: i64) -> Decimal {
    Decimal::new(satoshis, 8)
}

pub fn satoshis_to_mbtc(satoshis: i64) -> Decimal {
    Decimal::new(satoshis, 5)
}

pub fn format_btc(satoshis: i64) -> String {
    format!("{:.8}", satoshis_to_btc(satoshis))
}

pub fn format_mbtc(mbtc: Decimal) -> String {
    format!("{:.5}", mbtc)
}

pub fn format_usd(usd: Decimal) -> String {
    format!("{:.2}", usd)
}
