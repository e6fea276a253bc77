//! Confluence Engine - scores market structure, Fibonacci and smart-money
//! confluence on candle data and gates the resulting trades through the risk
//! manager.
//!
//! # NOTE
//! - Signals are analysis output, not advice. Nothing here places orders.
//! - Candle files are read from `data.dir` as `{SYMBOL}_{tf}.json`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use confluence_engine::cli::commands;
use confluence_engine::config::Config;
use confluence_engine::market::Timeframe;

/// Confluence Engine - multi-factor trade signal scoring
#[derive(Parser)]
#[command(name = "confluence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "CONFLUENCE_CONFIG")]
    config: String,

    /// Emit JSON logs and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one symbol and print the confluence result and entry plan
    Analyze {
        /// Symbol, e.g. BTCUSDT
        #[arg(short, long)]
        symbol: String,

        /// Signal timeframe (default: watchlist.timeframe)
        #[arg(short, long)]
        timeframe: Option<Timeframe>,

        /// Higher timeframes for trend context (default: watchlist.higher_timeframes)
        #[arg(long, value_delimiter = ',')]
        htf: Option<Vec<Timeframe>>,
    },

    /// Analyze every configured symbol
    Scan,

    /// Show the risk ledger: capital, drawdown, budgets, open positions
    Status,

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(
        "confluence_engine=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_thread_ids(true).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Analyze {
            symbol,
            timeframe,
            htf,
        } => commands::analyze(&config, &symbol, timeframe, htf, cli.json).await,
        Commands::Scan => commands::scan(&config, cli.json).await,
        Commands::Status => commands::status(&config, cli.json).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
