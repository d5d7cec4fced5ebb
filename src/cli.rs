//! CLI entry points.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::exchange_rate_api::HttpRateSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::desk::{TradingDesk, seed_catalog};
use crate::domain::error::BolsaError;
use crate::domain::exchange_rate::{ExchangeRateCell, ExchangeRateUpdater};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::settings::Settings;
use crate::domain::simulator::PriceSimulator;
use crate::domain::user::normalize_email;
use crate::ports::StoragePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::market_port::MarketPort;
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Parser, Debug)]
#[command(name = "bolsa", about = "Simulated stock trading desk")]
pub struct Cli {
    /// Log level for bolsa's own events when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the web app with the price simulator and exchange-rate updater
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the schema and seed the instrument catalog
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List instruments with their current prices
    Instruments {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run price simulation ticks once, without the background loop
    Tick {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Refresh the exchange rate once and print it
    Rate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print a user's portfolio
    Portfolio {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        email: String,
    },
}

/// Install the global subscriber. Events go to stderr so command output on
/// stdout stays clean; a second call is a no-op.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bolsa={log_level},tower_http={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(&cli.log_level);
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Init { config } => run_init(&config),
        Command::Instruments { config } => run_instruments(&config),
        Command::Tick { config, count } => run_tick(&config, count),
        Command::Rate { config } => run_rate(&config),
        Command::Portfolio { config, email } => run_portfolio(&config, &email),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BolsaError> {
    FileConfigAdapter::from_file(path)
}

fn has_postgres_config(config: &dyn ConfigPort) -> bool {
    config
        .get_string("postgres", "connection_string")
        .or_else(|| config.get_string("database", "conninfo"))
        .is_some_and(|s| !s.trim().is_empty())
}

/// Open the configured store and make sure its schema exists.
///
/// PostgreSQL is used when compiled in and a connection string is configured,
/// SQLite otherwise.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn StoragePort>, BolsaError> {
    #[cfg(feature = "postgres")]
    if has_postgres_config(config) {
        use crate::adapters::postgres_adapter::PostgresAdapter;
        let adapter = PostgresAdapter::from_config(config)?;
        adapter.initialize_schema()?;
        return Ok(Arc::new(adapter));
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        #[cfg(not(feature = "postgres"))]
        if has_postgres_config(config) {
            tracing::warn!("postgres connection configured but not compiled in, using sqlite");
        }
        let adapter = SqliteAdapter::from_config(config)?;
        adapter.initialize_schema()?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        if has_postgres_config(config) {
            return Err(BolsaError::Database {
                reason: "built without the postgres feature".into(),
            });
        }
        Err(BolsaError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, BolsaError> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn run_init(config_path: &Path) -> Result<(), BolsaError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let inserted = seed_catalog(&*store, &mut rand::thread_rng())?;
    if inserted == 0 {
        eprintln!("Catalog already present, nothing seeded");
    } else {
        eprintln!("Seeded {inserted} instruments");
    }
    Ok(())
}

fn run_instruments(config_path: &Path) -> Result<(), BolsaError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let instruments = store.list_instruments()?;
    if instruments.is_empty() {
        eprintln!("No instruments; run `bolsa init` first");
        return Ok(());
    }

    println!(
        "{:<8} {:<32} {:<7} {:>10} {:>8}",
        "SYMBOL", "NAME", "MARKET", "PRICE", "CHANGE"
    );
    for inst in &instruments {
        println!(
            "{:<8} {:<32} {:<7} {:>10.2} {:>7.2}%",
            inst.symbol,
            inst.name,
            inst.market,
            inst.current_price,
            inst.change_pct()
        );
    }
    Ok(())
}

fn run_tick(config_path: &Path, count: u32) -> Result<(), BolsaError> {
    let config = load_config(config_path)?;
    let settings = Settings::from_config(&config)?;
    let store = open_store(&config)?;

    let simulator = PriceSimulator::new(
        Arc::clone(&store),
        settings.simulator.band,
        settings.simulator.price_floor,
    );
    let mut rng = rand::thread_rng();
    for _ in 0..count {
        let updated = simulator.tick(&mut rng)?;
        eprintln!("Updated {updated} prices");
    }
    Ok(())
}

fn run_rate(config_path: &Path) -> Result<(), BolsaError> {
    let config = load_config(config_path)?;
    let settings = Settings::from_config(&config)?;

    let cell = Arc::new(ExchangeRateCell::new(settings.trading.initial_exchange_rate));
    let source = HttpRateSource::from_settings(&settings.exchange_rate, &settings.trading)?;
    let updater = ExchangeRateUpdater::new(Arc::clone(&cell), Arc::new(source), settings.exchange_rate.band);

    let rate = runtime()?.block_on(async {
        let mut rng = StdRng::from_entropy();
        updater.tick(&mut rng).await
    });

    println!(
        "{}/{} {:.2} ({:?}, {})",
        settings.trading.base_currency,
        settings.trading.home_currency,
        rate.rate,
        rate.origin,
        rate.updated_at.to_rfc3339()
    );
    Ok(())
}

pub fn format_portfolio(snapshot: &PortfolioSnapshot, currency: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<8} {:>8} {:>10} {:>10} {:>12} {:>12}\n",
        "SYMBOL", "QTY", "PRICE", "AVG COST", "VALUE", "P/L"
    ));
    for line in &snapshot.lines {
        out.push_str(&format!(
            "{:<8} {:>8} {:>10.2} {:>10.2} {:>12.2} {:>+12.2}\n",
            line.symbol,
            line.quantity,
            line.current_price,
            line.cost_basis,
            line.market_value,
            line.unrealized_pnl
        ));
    }
    out.push_str(&format!(
        "Holdings: {:.2} ({:.2} {currency} at {:.2})\n",
        snapshot.total_value,
        snapshot.total_value_home(),
        snapshot.exchange_rate
    ));
    out.push_str(&format!("Cash: {:.2} {currency}\n", snapshot.cash_balance));
    out.push_str(&format!("Net worth: {:.2} {currency}\n", snapshot.net_worth()));
    out
}

fn run_portfolio(config_path: &Path, email: &str) -> Result<(), BolsaError> {
    let config = load_config(config_path)?;
    let settings = Settings::from_config(&config)?;
    let store = open_store(&config)?;

    let user = store
        .find_user_by_email(&normalize_email(email))?
        .ok_or_else(|| BolsaError::not_found(format!("user {email}")))?;

    let rates = Arc::new(ExchangeRateCell::new(settings.trading.initial_exchange_rate));
    let desk = TradingDesk::new(store, rates, settings.trading.initial_cash);
    let snapshot = desk.portfolio_snapshot(user.id)?;

    print!("{}", format_portfolio(&snapshot, &settings.trading.home_currency));
    Ok(())
}

#[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn run_serve(config_path: &Path) -> Result<(), BolsaError> {
    #[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
    {
        use crate::adapters::web::{AppState, build_router};
        use crate::background::{shutdown_channel, spawn_price_simulator, spawn_rate_updater};

        eprintln!("Loading config from {}", config_path.display());
        let config = load_config(config_path)?;
        let settings = Settings::from_config(&config)?;
        let store = open_store(&config)?;
        seed_catalog(&*store, &mut rand::thread_rng())?;

        let rates = Arc::new(ExchangeRateCell::new(settings.trading.initial_exchange_rate));
        let desk = Arc::new(TradingDesk::new(
            Arc::clone(&store),
            Arc::clone(&rates),
            settings.trading.initial_cash,
        ));
        let source = HttpRateSource::from_settings(&settings.exchange_rate, &settings.trading)?;

        runtime()?.block_on(async move {
            let (shutdown_tx, shutdown_rx) = shutdown_channel();

            let simulator = Arc::new(PriceSimulator::new(
                Arc::clone(&store),
                settings.simulator.band,
                settings.simulator.price_floor,
            ));
            let simulator_task = spawn_price_simulator(
                simulator,
                settings.simulator.interval,
                settings.simulator.backoff,
                shutdown_rx.clone(),
            );

            let updater = Arc::new(ExchangeRateUpdater::new(
                rates,
                Arc::new(source),
                settings.exchange_rate.band,
            ));
            let rate_task =
                spawn_rate_updater(updater, settings.exchange_rate.interval, shutdown_rx);

            let router = build_router(AppState {
                desk,
                trading: settings.trading.clone(),
                config: Arc::new(config),
            })
            .await?;

            let listener = tokio::net::TcpListener::bind(settings.web.listen).await?;
            tracing::info!(addr = %settings.web.listen, "web server listening");
            eprintln!("Starting web server on {}", settings.web.listen);

            let served = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await;

            let _ = shutdown_tx.send(true);
            let _ = tokio::join!(simulator_task, rate_task);
            served?;
            Ok::<(), BolsaError>(())
        })
    }

    #[cfg(not(any(feature = "web-sqlite", feature = "web-postgres")))]
    {
        let _ = config_path;
        Err(BolsaError::ConfigInvalid {
            section: "web".into(),
            key: "listen".into(),
            reason: "built without the web feature".into(),
        })
    }
}
