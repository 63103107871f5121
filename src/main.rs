use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use linesmith::adapter::inbound::http::{serve, AdminContext};
use linesmith::adapter::outbound::exchange::ExchangeClient;
use linesmith::adapter::outbound::oddsapi::OddsApiClient;
use linesmith::application::controller::LineController;
use linesmith::application::pairing::EventResolver;
use linesmith::application::scheduler::Scheduler;
use linesmith::application::state::AppState;
use linesmith::domain::ladder::OddsLadder;
use linesmith::domain::pricing::PricingEngine;
use linesmith::infrastructure::config::Config;
use linesmith::port::outbound::exchange::ExchangeApi;
use linesmith::port::outbound::feed::ReferenceFeed;

#[derive(Parser)]
#[command(name = "linesmith", about = "Market-making agent for a betting exchange")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the market-making agent (default).
    Run,
    /// Load and validate the configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => check(&config),
        Command::Run => run(config).await,
    }
}

fn check(config: &Config) -> anyhow::Result<()> {
    println!("configuration ok");
    println!("  sport:            {}", config.reference.sport);
    println!("  bookmaker:        {}", config.reference.bookmaker);
    println!("  exchange:         {}", config.exchange.effective_base_url());
    println!("  poll interval:    {}s", config.scheduler.poll_interval_seconds);
    println!("  dry run:          {}", config.dry_run);
    if config.reference.api_key.is_empty() {
        println!("  warning: REFERENCE_API_KEY is not set");
    }
    if config.exchange.access_key.is_empty() || config.exchange.secret_key.is_empty() {
        println!("  warning: exchange credentials are not set");
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.init_logging();
    info!(dry_run = config.dry_run, "linesmith starting");

    let timeout = Duration::from_secs(config.scheduler.request_timeout_seconds);

    let feed: Arc<dyn ReferenceFeed> =
        Arc::new(OddsApiClient::from_config(&config.reference, timeout));
    let exchange_client = Arc::new(ExchangeClient::from_config(
        &config.exchange,
        timeout,
        config.dry_run,
    ));
    let exchange: Arc<dyn ExchangeApi> = exchange_client.clone();

    let resolver = Arc::new(EventResolver::new(config.pairing_config()));
    let state = Arc::new(AppState::new(config.runtime_settings(), true));

    let engine = PricingEngine::new(config.pricing_config(), OddsLadder::standard());
    let controller = LineController::new(config.controller_config());
    let scheduler = Scheduler::new(
        config.scheduler_config(),
        Arc::clone(&feed),
        Arc::clone(&exchange),
        Arc::clone(&resolver),
        engine,
        controller,
        Arc::clone(&state),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The auth refresher outlives everything else so in-flight cycle work
    // never loses its token source; it is cancelled last.
    let auth_handle = tokio::spawn(
        exchange_client
            .auth()
            .run_refresh_loop(shutdown_rx.clone()),
    );

    let admin_context = AdminContext {
        state: Arc::clone(&state),
        resolver: Arc::clone(&resolver),
        feed: Arc::clone(&feed),
    };
    let admin_bind = config.admin.bind.clone();
    let admin_shutdown = shutdown_rx.clone();
    let admin_handle = tokio::spawn(async move {
        if let Err(err) = serve(&admin_bind, admin_context, admin_shutdown).await {
            error!(error = %err, "Admin surface failed");
        }
    });

    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = scheduler_handle.await;
    let _ = admin_handle.await;
    let _ = auth_handle.await;

    info!("linesmith stopped");
    Ok(())
}
