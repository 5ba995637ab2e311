use crate::{
    bitcoin::amounts::{format_btc, format_mbtc, format_usd, satoshis_to_mbtc},
    config::EventConfig,
    db::repositories::models::registration::Registration,
    templates::escape,
};

/// Subject line and both bodies of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

struct Context<'a> {
    registration: &'a Registration,
    payment_btc: String,
    payment_mbtc: String,
    payment_url: String,
}

impl<'a> Context<'a> {
    fn new(event: &EventConfig, registration: &'a Registration) -> Self {
        Self {
            registration,
            payment_btc: format_btc(registration.payment_btc),
            payment_mbtc: format_mbtc(satoshis_to_mbtc(registration.payment_btc)),
            payment_url: format!("{}/address/{}", event.host_url, registration.btc_address),
        }
    }
}

fn with_environment(subject: String, event: &EventConfig) -> String {
    if event.environment_name.is_empty() {
        subject
    } else {
        format!("{} - {}", subject, event.environment_name)
    }
}

pub fn registrant(event: &EventConfig, registration: &Registration) -> RenderedEmail {
    let c = Context::new(event, registration);
    let subject = with_environment(format!("{} Bitcoin Registration", event.event_name), event);

    let text = format!(
        "Dear {name},\n\n\
         Thank you for registering for {event_name}.\n\n\
         Please send {btc} BTC ({mbtc} mBTC) to the following address:\n\n\
         {address}\n\n\
         You can check the status of your payment at:\n\
         {url}\n",
        name = c.registration.full_name,
        event_name = event.event_name,
        btc = c.payment_btc,
        mbtc = c.payment_mbtc,
        address = c.registration.btc_address,
        url = c.payment_url,
    );

    let html = format!(
        r#"<p>Dear {name},</p>
<p>Thank you for registering for {event_name}.</p>
<p>Please send <strong>{btc} BTC</strong> ({mbtc} mBTC) to the following address:</p>
<p><code>{address}</code></p>
<p>You can check the status of your payment <a href="{url}">here</a>.</p>"#,
        name = escape(&c.registration.full_name),
        event_name = escape(&event.event_name),
        btc = c.payment_btc,
        mbtc = c.payment_mbtc,
        address = escape(&c.registration.btc_address),
        url = escape(&c.payment_url),
    );

    RenderedEmail { subject, text, html }
}

pub fn managers(event: &EventConfig, registration: &Registration) -> RenderedEmail {
    let c = Context::new(event, registration);
    let subject = with_environment(
        format!(
            "{} Bitcoin Registration ({})",
            registration.full_name, event.event_name
        ),
        event,
    );

    let text = format!(
        "New Bitcoin registration for {event_name}:\n\n\
         Name: {name}\n\
         Email: {email}\n\
         Contribution: ${usd} at ${price} per BTC\n\
         Expected: {btc} BTC ({mbtc} mBTC)\n\
         Address: {address}\n\
         Status: {url}\n",
        event_name = event.event_name,
        name = c.registration.full_name,
        email = c.registration.email_address,
        usd = format_usd(c.registration.payment_usd),
        price = format_usd(c.registration.btc_price),
        btc = c.payment_btc,
        mbtc = c.payment_mbtc,
        address = c.registration.btc_address,
        url = c.payment_url,
    );

    let html = format!(
        r#"<p>New Bitcoin registration for {event_name}:</p>
<table>
<tr><th>Name</th><td>{name}</td></tr>
<tr><th>Email</th><td>{email}</td></tr>
<tr><th>Contribution</th><td>${usd} at ${price} per BTC</td></tr>
<tr><th>Expected</th><td>{btc} BTC ({mbtc} mBTC)</td></tr>
<tr><th>Address</th><td><a href="{url}">{address}</a></td></tr>
</table>"#,
        event_name = escape(&event.event_name),
        name = escape(&c.registration.full_name),
        email = escape(&c.registration.email_address),
        usd = format_usd(c.registration.payment_usd),
        price = format_usd(c.registration.btc_price),
        btc = c.payment_btc,
        mbtc = c.payment_mbtc,
        address = escape(&c.registration.btc_address),
        url = escape(&c.payment_url),
    );

    RenderedEmail { subject, text, html }
}
