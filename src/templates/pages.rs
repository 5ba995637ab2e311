use crate::{
    bitcoin::amounts::{format_btc, format_mbtc, format_usd, satoshis_to_mbtc},
    config::EventConfig,
    db::repositories::models::{payment_address::PaymentAddress, registration::Registration},
    endpoints::{register::FormState, reports::RegistrationInfo},
    templates::{escape, layout},
};

fn field(name: &str, label: &str, value: &str, error: Option<&String>) -> String {
    let error = error
        .map(|e| format!(r#"<span class="error">{}</span>"#, escape(e)))
        .unwrap_or_default();

    format!(
        r#"<p><label for="{name}">{label}</label> <input id="{name}" name="{name}" value="{value}"> {error}</p>"#,
        value = escape(value),
    )
}

pub fn index(event: &EventConfig, form: &FormState) -> String {
    let body = format!(
        r#"<form method="post" action="/">
    {full_name}
    {email_address}
    {payment_usd}
    {btc_price}
    <p id="btc-price-timestamp"></p>
    <button type="submit">Register</button>
</form>
<script>
fetch('/btcprice').then(r => r.json()).then(d => {{
    if (d.successful) {{ document.getElementById('btc_price').value = d.price.toFixed(2); }}
    document.getElementById('btc-price-timestamp').textContent = 'Price as of ' + d.timestamp;
}});
</script>"#,
        full_name = field("full_name", "Full name", &form.full_name, form.errors.get("full_name")),
        email_address = field(
            "email_address",
            "Email address",
            &form.email_address,
            form.errors.get("email_address")
        ),
        payment_usd = field(
            "payment_usd",
            "Payment (USD)",
            &form.payment_usd,
            form.errors.get("payment_usd")
        ),
        btc_price = field(
            "btc_price",
            "BTC price (USD)",
            &form.btc_price,
            form.errors.get("btc_price")
        ),
    );

    layout(event, "Bitcoin Registration", &body)
}

pub fn address(event: &EventConfig, registration: &Registration) -> String {
    let payment_btc = format_btc(registration.payment_btc);
    let payment_mbtc = format_mbtc(satoshis_to_mbtc(registration.payment_btc));
    let qrcode = format!(
        "/qrcode?address={}&amount={}&label={}",
        urlencoding::encode(&registration.btc_address),
        payment_btc,
        urlencoding::encode(&event.event_name),
    );

    let body = format!(
        r#"<p>Thank you, {full_name}. Please send <strong>{payment_btc} BTC</strong> ({payment_mbtc} mBTC) to:</p>
<p class="address">{address}</p>
<p><img src="{qrcode}" alt="{address}"></p>
<p>Contribution: ${payment_usd} at ${btc_price} per BTC</p>
<h3>Received</h3>
<table id="transactions"><tr><th>mBTC</th><th>Confirmations</th></tr></table>
<p>Total received: <span id="total-received">0.00000</span> mBTC</p>
<script>
fetch('/btctrans/{address}').then(r => r.json()).then(d => {{
    const table = document.getElementById('transactions');
    d.transactions.forEach(t => {{ const row = table.insertRow(); row.insertCell().textContent = t[0]; row.insertCell().textContent = t[1]; }});
    document.getElementById('total-received').textContent = d.total_received.toFixed(5);
}});
</script>"#,
        full_name = escape(&registration.full_name),
        address = escape(&registration.btc_address),
        qrcode = escape(&qrcode),
        payment_usd = format_usd(registration.payment_usd),
        btc_price = format_usd(registration.btc_price),
    );

    layout(event, "Payment", &body)
}

pub fn address_report(event: &EventConfig, addresses: &[PaymentAddress]) -> String {
    let rows: String = addresses
        .iter()
        .map(|a| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(&a.btc_address),
                a.created_at.format("%Y-%m-%d")
            )
        })
        .collect();

    let body = format!(
        r#"<p>There are {count} addresses available.</p>
<table>
<tr><th>Address</th><th>Added</th></tr>
{rows}</table>"#,
        count = addresses.len(),
    );

    layout(event, "Available Addresses", &body)
}

pub fn registration_report(event: &EventConfig, infos: &[RegistrationInfo]) -> String {
    let rows: String = infos
        .iter()
        .map(|info| {
            format!(
                "<tr class=\"{class}\"><td>{date}</td><td>{name}</td><td>{email}</td><td>{usd}</td><td>{price}</td><td>{address}</td><td>{expected}</td><td>{received}</td><td>{paid}</td></tr>\n",
                class = if info.paid { "paid" } else { "unpaid" },
                date = info.date_added.format("%m/%d/%Y %H:%M"),
                name = escape(&info.full_name),
                email = escape(&info.email_address),
                usd = info.payment_usd_str(),
                price = info.btc_price_str(),
                address = escape(&info.btc_address),
                expected = info.payment_mbtc_str(),
                received = info.received_mbtc_str(),
                paid = if info.paid { "yes" } else { "no" },
            )
        })
        .collect();

    let body = format!(
        r#"<p>There are {count} registrations.</p>
<table>
<tr><th>Date</th><th>Name</th><th>Email</th><th>USD</th><th>BTC price</th><th>Address</th><th>Expected mBTC</th><th>Received mBTC</th><th>Paid</th></tr>
{rows}</table>"#,
        count = infos.len(),
    );

    layout(event, "Registrations", &body)
}

pub fn not_available(event: &EventConfig) -> String {
    layout(
        event,
        "Registration Closed",
        "<p>Sorry, there are no payment addresses available right now. Please check back later.</p>",
    )
}

pub fn not_in_system(event: &EventConfig) -> String {
    layout(
        event,
        "Unknown Address",
        "<p>That payment address is not registered in our system.</p>",
    )
}

pub fn forbidden(event: &EventConfig) -> String {
    layout(
        event,
        "Forbidden",
        "<p>You do not have permission to view this page.</p>",
    )
}

pub fn server_error(event: &EventConfig) -> String {
    layout(
        event,
        "Server Error",
        "<p>Something went wrong on our end. Please try again later.</p>",
    )
}
