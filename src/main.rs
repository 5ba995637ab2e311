use std::{path::PathBuf, time::Duration};

use bitcoin::explorer::BlockchainInfo;
use clap::{Parser, Subcommand};
use color_eyre::eyre::bail;
use config::Config;
use db::Repository;
use endpoints::{
    payment::{PriceResponseObject, TransactionsResponseObject},
    qr_code::QrCodeResponse,
    register::RegistrationForm,
};
use notifications::{NotificationDispatcher, Notifier, SmtpMailer};
use poem::{listener::TcpListener, middleware::Cors, web::Data, Endpoint, EndpointExt, Route, Server};
use poem_openapi::{
    param::{Cookie, Path, Query},
    payload::{Form, Html, Json},
    OpenApi, OpenApiService,
};
use responses::PageResponse;
use templates::pages;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod auth;
pub mod bitcoin;
pub mod config;
pub mod db;
pub mod endpoints;
pub mod notifications;
pub mod pool;
pub mod responses;
pub mod templates;
pub mod utils;

#[cfg(test)]
mod test_support;

/// How long in-flight requests get to finish once shutdown starts.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
/// How long queued emails get to go out after the server has stopped.
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

struct Api;

#[OpenApi]
impl Api {
    #[oai(path = "/", method = "get")]
    async fn index(&self, pool: Data<&Repository>, config: Data<&Config>) -> PageResponse {
        endpoints::register::index(pool.0, &config.event).await
    }

    #[oai(path = "/", method = "post")]
    async fn register(
        &self,
        pool: Data<&Repository>,
        notifier: Data<&Notifier>,
        config: Data<&Config>,
        form: Form<RegistrationForm>,
    ) -> PageResponse {
        endpoints::register::register(pool.0, &notifier, &config.event, &form).await
    }

    #[oai(path = "/btcprice", method = "get")]
    async fn btcprice(
        &self,
        explorer: Data<&BlockchainInfo>,
        config: Data<&Config>,
    ) -> Json<PriceResponseObject> {
        endpoints::payment::btcprice(explorer.0, config.time_zone).await
    }

    #[oai(path = "/address/:btc_address", method = "get")]
    async fn address(
        &self,
        pool: Data<&Repository>,
        config: Data<&Config>,
        btc_address: Path<String>,
    ) -> PageResponse {
        endpoints::payment::address(pool.0, &config.event, &btc_address).await
    }

    #[oai(path = "/qrcode", method = "get")]
    async fn qrcode(
        &self,
        config: Data<&Config>,
        address: Query<String>,
        amount: Query<Option<String>>,
        label: Query<Option<String>>,
    ) -> QrCodeResponse {
        endpoints::qr_code::qrcode(
            &config.event,
            &address,
            amount.0.as_deref(),
            label.0.as_deref(),
        )
        .await
    }

    #[oai(path = "/btctrans/:btc_address", method = "get")]
    async fn btctrans(
        &self,
        explorer: Data<&BlockchainInfo>,
        config: Data<&Config>,
        btc_address: Path<String>,
    ) -> Json<TransactionsResponseObject> {
        endpoints::payment::btctrans(explorer.0, config.chain, config.time_zone, &btc_address)
            .await
    }

    #[oai(path = "/address_report", method = "get")]
    async fn address_report(
        &self,
        pool: Data<&Repository>,
        config: Data<&Config>,
        #[oai(name = "sessionid")] session: Cookie<Option<String>>,
    ) -> PageResponse {
        endpoints::reports::address_report(pool.0, &config.event, session.0.as_deref()).await
    }

    #[oai(path = "/registration_report", method = "get")]
    async fn registration_report(
        &self,
        pool: Data<&Repository>,
        explorer: Data<&BlockchainInfo>,
        config: Data<&Config>,
        #[oai(name = "sessionid")] session: Cookie<Option<String>>,
    ) -> PageResponse {
        endpoints::reports::registration_report(
            pool.0,
            explorer.0,
            &config.event,
            session.0.as_deref(),
        )
        .await
    }

    #[oai(path = "/not_available", method = "get")]
    async fn not_available(&self, config: Data<&Config>) -> Html<String> {
        Html(pages::not_available(&config.event))
    }

    #[oai(path = "/not_in_system", method = "get")]
    async fn not_in_system(&self, config: Data<&Config>) -> Html<String> {
        Html(pages::not_in_system(&config.event))
    }

    #[oai(path = "/forbidden", method = "get")]
    async fn forbidden(&self, config: Data<&Config>) -> Html<String> {
        Html(pages::forbidden(&config.event))
    }
}

#[derive(Parser)]
#[command(name = "cointrax", version, about = "Bitcoin event registration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web application (default)
    Serve,
    /// Add addresses from a file, one per line, to the deposit pool
    ImportAddresses { file: PathBuf },
    /// Derive new deposit addresses from the bitcoind wallet
    GenerateAddresses {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

fn app(
    config: Config,
    repository: Repository,
    explorer: BlockchainInfo,
    notifier: Notifier,
) -> impl Endpoint {
    let api_service = OpenApiService::new(Api, "Cointrax", env!("CARGO_PKG_VERSION"))
        .server(config.event.host_url.clone());
    let open_api = api_service.swagger_ui();

    Route::new()
        .nest("/", api_service)
        .nest("/swagger", open_api)
        .with(Cors::new().allow_origin(config.event.host_url.clone()))
        .data(repository)
        .data(explorer)
        .data(notifier)
        .data(config)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    info!("Shutting down");
}

async fn serve(config: Config, repository: Repository) -> color_eyre::Result<()> {
    repository.migrate().await?;

    let explorer = BlockchainInfo::new(&config.explorer)?;
    let mailer = SmtpMailer::new(&config.mail)?;

    let (notifier, rx) = Notifier::channel();
    let dispatcher = NotificationDispatcher::new(
        rx,
        repository.clone(),
        mailer,
        config.event.clone(),
        config.mail.send_attempts,
    );
    let dispatcher = tokio::spawn(dispatcher.run());

    let bind_address = config.bind_address.clone();
    let routes = app(config, repository, explorer, notifier);

    info!("Listening on {}", bind_address);
    // The last `Notifier` lives in `routes`, so the dispatcher drains once the server is gone.
    Server::new(TcpListener::bind(bind_address))
        .run_with_graceful_shutdown(routes, shutdown_signal(), Some(SHUTDOWN_TIMEOUT))
        .await?;

    info!("Waiting for queued notifications");
    match tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, dispatcher).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Notification dispatcher failed: {}", e),
        Err(_) => warn!("Gave up waiting for queued notifications"),
    }

    Ok(())
}

async fn import_addresses(
    config: &Config,
    repository: &Repository,
    file: &std::path::Path,
) -> color_eyre::Result<()> {
    let content = tokio::fs::read_to_string(file).await?;

    let addresses = match pool::parse_address_list(&content, config.chain) {
        Ok(addresses) => addresses,
        Err(invalid) => {
            for bad in &invalid {
                error!(
                    "Line {}: {} is not a {} address",
                    bad.line, bad.address, config.chain
                );
            }
            bail!("{} invalid addresses, nothing imported", invalid.len());
        }
    };

    pool::add_to_pool(repository, &addresses).await?;
    Ok(())
}

async fn generate_addresses(
    config: &Config,
    repository: &Repository,
    count: usize,
) -> color_eyre::Result<()> {
    if config.rpc.cookie.is_none() {
        bail!("BITCOIN_RPC_COOKIE must be set to generate addresses");
    }

    let rpc_config = config.rpc.clone();
    let chain = config.chain;
    let addresses = tokio::task::spawn_blocking(move || {
        let rpc = bitcoin::wallet::connect(&rpc_config)?;
        bitcoin::wallet::new_addresses(&rpc, chain, count)
    })
    .await??;

    pool::add_to_pool(repository, &addresses).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install().ok();
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    debug!("Loaded configuration for {} on {}", config.event.event_name, config.chain);

    let repository = Repository::connect(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, repository).await,
        Command::ImportAddresses { file } => import_addresses(&config, &repository, &file).await,
        Command::GenerateAddresses { count } => {
            generate_addresses(&config, &repository, count).await
        }
    }
}
