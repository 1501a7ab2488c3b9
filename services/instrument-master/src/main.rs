//! Instrument Master - command line entry point
//!
//! Refreshes the security master, resolves trading intents and runs the
//! periodic refresh loop.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use instrument_master::config::breeze_feed;
use instrument_master::instruments::InstrumentClass;
use instrument_master::{
    ExpiryBucket, InstrumentMasterConfig, InstrumentMasterService, OptionRight, ResolveRequest,
    Venue,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[clap(name = "instrument-master")]
#[clap(about = "Broker security master refresh and instrument resolution")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[clap(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Use the ICICI Direct security master instead of the TradeSmart feeds
    #[clap(long, global = true)]
    breeze: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all feeds once and write the cache
    Refresh,

    /// Resolve a trading intent to token, trading symbol and lot size
    Resolve {
        /// Venue code (NFO, NSE, BFO, ...)
        #[clap(long)]
        venue: Venue,
        /// Underlying, e.g. BANKNIFTY
        #[clap(long)]
        symbol: String,
        /// Strike price (options only)
        #[clap(long)]
        strike: Option<Decimal>,
        /// CE or PE (options only)
        #[clap(long)]
        right: Option<String>,
        /// W, NW, M, NM or NNM
        #[clap(long, default_value = "W")]
        expiry: ExpiryBucket,
        /// EQUITY, FUTURE or OPTION
        #[clap(long, default_value = "OPTION")]
        class: InstrumentClass,
    },

    /// Case-insensitive symbol search within one venue
    Search {
        #[clap(long)]
        venue: Venue,
        text: String,
        /// Maximum rows to print
        #[clap(long, default_value = "20")]
        limit: usize,
    },

    /// Print vendor and canonical symbols for a venue
    Normalize {
        #[clap(long)]
        venue: Venue,
        #[clap(long, default_value = "20")]
        limit: usize,
    },

    /// Keep the security master fresh until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "instrument_master=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = InstrumentMasterConfig::load(cli.config.as_deref())?;
    if cli.breeze {
        config.feeds = vec![breeze_feed()];
    }
    if !matches!(cli.command, Commands::Serve) {
        config.refresh.enable_auto_updates = false;
    }

    let service = InstrumentMasterService::new(config)?;

    match cli.command {
        Commands::Refresh => {
            let summary = service.refresh_now().await?;
            for (venue, count) in &summary.venues {
                info!("{}: {} instruments", venue, count);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Resolve {
            venue,
            symbol,
            strike,
            right,
            expiry,
            class,
        } => {
            service.start().await?;
            let right = right
                .map(|r| r.parse::<OptionRight>())
                .transpose()
                .context("Invalid option right")?;
            let request = ResolveRequest {
                venue,
                underlying: symbol,
                strike,
                right,
                expiry,
                instrument_class: class,
            };
            let lookup = service.resolve(&request);
            if let Some(stale) = &lookup.stale {
                warn!(
                    "Serving stale instrument data ({:?}, {} failed refreshes, retrieved at {:?})",
                    stale.reason, stale.consecutive_failures, stale.snapshot_retrieved_at
                );
            }
            match &lookup.value {
                Some(_) => println!("{}", serde_json::to_string_pretty(&lookup)?),
                None => println!("not found"),
            }
        }
        Commands::Search { venue, text, limit } => {
            service.start().await?;
            let lookup = service.search(venue, &text);
            for record in lookup.value.iter().take(limit) {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.token, record.trading_symbol, record.instrument_class, record.lot_size
                );
            }
            info!("{} matches for '{}' on {}", lookup.value.len(), text, venue);
        }
        Commands::Normalize { venue, limit } => {
            service.start().await?;
            let snapshot = service.store().current();
            for record in snapshot.venue(venue).take(limit) {
                println!(
                    "{}\t{}",
                    record.trading_symbol,
                    service.normalizer().normalize(record)
                );
            }
        }
        Commands::Serve => {
            let handle = service.start().await?;
            info!("Instrument master running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            if let Some(handle) = handle {
                handle.abort();
            }
            match service.store().staleness() {
                Some(stale) => error!(
                    "Stopping with stale data ({:?}): {}",
                    stale.reason, stale.last_error
                ),
                None => info!("Instrument master stopped"),
            }
        }
    }

    Ok(())
}
