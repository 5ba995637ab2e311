//! Out-of-band provisioning of the deposit address pool.

use tracing::{info, warn};

use crate::bitcoin::chain::Chain;
use crate::db::RegistrationRepository;

/// An address line that does not belong to the configured chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAddress {
    pub line: usize,
    pub address: String,
}

/// Reads one address per line. Blank lines and `#` comments are ignored.
pub fn parse_address_list(content: &str, chain: Chain) -> Result<Vec<String>, Vec<InvalidAddress>> {
    let mut addresses = Vec::new();
    let mut invalid = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let address = line.split('#').next().unwrap_or_default().trim();
        if address.is_empty() {
            continue;
        }

        if chain.is_valid_address(address) {
            addresses.push(address.to_string());
        } else {
            invalid.push(InvalidAddress {
                line: index + 1,
                address: address.to_string(),
            });
        }
    }

    if invalid.is_empty() {
        Ok(addresses)
    } else {
        Err(invalid)
    }
}

pub async fn add_to_pool<R: RegistrationRepository>(
    pool: &R,
    addresses: &[String],
) -> Result<u64, sqlx::Error> {
    let added = pool.add_addresses(addresses).await?;
    let skipped = (addresses.len() as u64).saturating_sub(added);

    if skipped > 0 {
        warn!("Skipped {} addresses already in the pool", skipped);
    }
    info!("Added {} addresses to the pool", added);

    Ok(added)
}
