use std::{collections::HashMap, str::FromStr};

use lazy_static::lazy_static;
use poem_openapi::{payload::Html, Object};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use crate::bitcoin::amounts::satoshis_for_usd;
use crate::config::EventConfig;
use crate::db::repositories::models::registration::NewRegistration;
use crate::db::RegistrationRepository;
use crate::notifications::{Notification, Notifier};
use crate::responses::PageResponse;
use crate::templates::pages;

const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_AMOUNT_DECIMALS: u32 = 2;
const MAX_AMOUNT_DIGITS: usize = 10;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

#[derive(Debug, Object, Deserialize, Clone, Default, Eq, PartialEq)]
pub struct RegistrationForm {
    pub full_name: Option<String>,
    pub email_address: Option<String>,
    pub payment_usd: Option<String>,
    pub btc_price: Option<String>,
}

/// Submitted values and per-field errors for re-rendering the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub full_name: String,
    pub email_address: String,
    pub payment_usd: String,
    pub btc_price: String,
    pub errors: HashMap<&'static str, String>,
}

impl From<&RegistrationForm> for FormState {
    fn from(form: &RegistrationForm) -> Self {
        let value = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();

        Self {
            full_name: value(&form.full_name),
            email_address: value(&form.email_address),
            payment_usd: value(&form.payment_usd),
            btc_price: value(&form.btc_price),
            errors: HashMap::new(),
        }
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, String> {
    if raw.is_empty() {
        return Err("This field is required.".to_string());
    }

    let amount = Decimal::from_str(raw).map_err(|_| "Enter a number.".to_string())?;
    if amount <= Decimal::ZERO {
        return Err("Enter an amount greater than zero.".to_string());
    }

    let amount = amount.normalize();
    if amount.scale() > MAX_AMOUNT_DECIMALS {
        return Err(format!(
            "Enter an amount with no more than {} decimal places.",
            MAX_AMOUNT_DECIMALS
        ));
    }
    if amount.trunc().to_string().len() > MAX_AMOUNT_DIGITS {
        return Err(format!(
            "Enter an amount with no more than {} digits before the decimal point.",
            MAX_AMOUNT_DIGITS
        ));
    }

    Ok(amount)
}

/// Checks the submission and computes the expected payment.
pub fn validate(form: &RegistrationForm) -> Result<NewRegistration, FormState> {
    let mut state = FormState::from(form);

    if state.full_name.is_empty() {
        state.errors.insert("full_name", "This field is required.".to_string());
    } else if state.full_name.chars().count() > MAX_NAME_LENGTH {
        state.errors.insert(
            "full_name",
            format!("Ensure this value has at most {} characters.", MAX_NAME_LENGTH),
        );
    }

    if state.email_address.is_empty() {
        state.errors.insert("email_address", "This field is required.".to_string());
    } else if state.email_address.len() > MAX_EMAIL_LENGTH
        || !EMAIL_REGEX.is_match(&state.email_address)
    {
        state.errors.insert("email_address", "Enter a valid email address.".to_string());
    }

    let payment_usd = parse_amount(&state.payment_usd)
        .map_err(|e| state.errors.insert("payment_usd", e))
        .ok();
    let btc_price = parse_amount(&state.btc_price)
        .map_err(|e| state.errors.insert("btc_price", e))
        .ok();

    let (payment_usd, btc_price) = match (payment_usd, btc_price) {
        (Some(payment_usd), Some(btc_price)) if state.errors.is_empty() => (payment_usd, btc_price),
        _ => return Err(state),
    };

    let payment_btc = match satoshis_for_usd(payment_usd, btc_price) {
        Some(payment_btc) => payment_btc,
        None => {
            state
                .errors
                .insert("payment_usd", "Payment is too large for this price.".to_string());
            return Err(state);
        }
    };

    Ok(NewRegistration {
        full_name: state.full_name,
        email_address: state.email_address,
        payment_usd,
        btc_price,
        payment_btc,
    })
}

pub async fn index<R: RegistrationRepository>(pool: &R, event: &EventConfig) -> PageResponse {
    match pool.has_available_address().await {
        Ok(true) => PageResponse::Ok(Html(pages::index(event, &FormState::default()))),
        Ok(false) => PageResponse::redirect("/not_available"),
        Err(e) => {
            error!("Unable to query PaymentAddress table: {}", e);
            PageResponse::server_error(event)
        }
    }
}

pub async fn register<R: RegistrationRepository>(
    pool: &R,
    notifier: &Notifier,
    event: &EventConfig,
    form: &RegistrationForm,
) -> PageResponse {
    let new_registration = match validate(form) {
        Ok(new_registration) => new_registration,
        Err(state) => return PageResponse::Ok(Html(pages::index(event, &state))),
    };

    let registration = match pool.create_registration(&new_registration).await {
        Ok(Some(registration)) => registration,
        Ok(None) => return PageResponse::redirect("/not_available"),
        Err(e) => {
            error!("Unable to create registration: {}", e);
            return PageResponse::server_error(event);
        }
    };

    info!("Reserved BTC address {}", registration.btc_address);
    info!(
        "Created registration record for {} ({} satoshis)",
        registration.full_name, registration.payment_btc
    );

    let location = format!(
        "/address/{}",
        urlencoding::encode(&registration.btc_address)
    );

    if let Err(Notification::Registered(registration)) =
        notifier.notify(Notification::Registered(registration))
    {
        error!(
            "Notification dispatcher is not running, no emails for registration {}",
            registration.id
        );
    }

    PageResponse::redirect(location)
}
