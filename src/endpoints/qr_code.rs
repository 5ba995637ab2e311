use poem_openapi::{
    payload::{Binary, Html},
    ApiResponse,
};
use tracing::error;

use crate::config::EventConfig;
use crate::templates::pages;
use crate::utils::qr::{payment_uri, render_png};

#[derive(ApiResponse)]
pub enum QrCodeResponse {
    #[oai(status = 200, content_type = "image/png")]
    Ok(Binary<Vec<u8>>),

    #[oai(status = 500)]
    InternalServerError(Html<String>),
}

pub async fn qrcode(
    event: &EventConfig,
    address: &str,
    amount: Option<&str>,
    label: Option<&str>,
) -> QrCodeResponse {
    let content = payment_uri(address, amount, label);

    // Encoding and the temporary file are blocking work.
    match tokio::task::spawn_blocking(move || render_png(&content)).await {
        Ok(Ok(png)) => QrCodeResponse::Ok(Binary(png)),
        Ok(Err(e)) => {
            error!("Unable to render QR code for {}: {}", address, e);
            QrCodeResponse::InternalServerError(Html(pages::server_error(event)))
        }
        Err(e) => {
            error!("QR code task for {} failed: {}", address, e);
            QrCodeResponse::InternalServerError(Html(pages::server_error(event)))
        }
    }
}
