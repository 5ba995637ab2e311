//! Fresh deposit addresses from a bitcoind wallet.

use bitcoincore_rpc::{json::AddressType, Auth, Client, RpcApi};
use tracing::{debug, info};

use crate::{bitcoin::chain::Chain, config::RpcConfig};

pub fn connect(config: &RpcConfig) -> Result<Client, bitcoincore_rpc::Error> {
    let auth = match &config.cookie {
        Some(cookie) => Auth::CookieFile(cookie.clone()),
        None => Auth::None,
    };

    debug!("[RPC] Connecting to {}", config.url);
    let rpc = Client::new(&config.url, auth)?;

    if !rpc.list_wallets()?.contains(&config.wallet) {
        info!("[RPC] Loading wallet {}", config.wallet);
        rpc.load_wallet(&config.wallet)?;
    }

    Ok(rpc)
}

/// Derives `count` new bech32 receive addresses for `chain`.
///
/// Blocking; call from `spawn_blocking`.
pub fn new_addresses(
    rpc: &Client,
    chain: Chain,
    count: usize,
) -> Result<Vec<String>, bitcoincore_rpc::Error> {
    let mut addresses = Vec::with_capacity(count);

    for _ in 0..count {
        let address = rpc
            .get_new_address(None, Some(AddressType::Bech32))?
            .require_network(chain.network())
            .map_err(|e| bitcoincore_rpc::Error::ReturnedError(e.to_string()))?
            .to_string();

        debug!("[RPC] Derived address {}", address);
        addresses.push(address);
    }

    Ok(addresses)
}
