use std::io::{self, Read, Seek, SeekFrom};

use image::{ImageFormat, Luma};
use qrcode::{types::QrError, QrCode};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Pixels per QR module.
const SCALE: u32 = 5;

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("unable to encode content: {0}")]
    Encode(#[from] QrError),

    #[error("unable to create temp file: {0}")]
    TempFile(io::Error),

    #[error("unable to write to temp file: {0}")]
    Write(image::ImageError),

    #[error("unable to read temp file: {0}")]
    Read(io::Error),
}

/// Builds a BIP21 `bitcoin:` URI. Empty parameters are left out.
pub fn payment_uri(address: &str, amount: Option<&str>, label: Option<&str>) -> String {
    let params: Vec<String> = [("label", label), ("amount", amount)]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

    if params.is_empty() {
        format!("bitcoin:{}", address)
    } else {
        format!("bitcoin:{}?{}", address, params.join("&"))
    }
}

/// Renders `content` as a PNG, going through a temporary file that is removed on return.
pub fn render_png(content: &str) -> Result<Vec<u8>, QrCodeError> {
    let code = QrCode::new(content.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(SCALE, SCALE)
        .build();

    let mut file = NamedTempFile::new().map_err(QrCodeError::TempFile)?;

    image
        .write_to(file.as_file_mut(), ImageFormat::Png)
        .map_err(QrCodeError::Write)?;

    let mut png = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut png))
        .map_err(QrCodeError::Read)?;

    // The file is gone either way; a failed close changes nothing for the caller.
    let _ = file.close();

    Ok(png)
}
