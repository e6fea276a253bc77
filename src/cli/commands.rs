//! CLI command implementations

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{fetch_many, CandleSource, JsonFileSource};
use crate::market::{Candle, Timeframe};
use crate::orchestrator::{AnalysisOutcome, Orchestrator};
use crate::risk::RiskDesk;

fn source(config: &Config) -> Arc<dyn CandleSource> {
    Arc::new(JsonFileSource::new(config.data.dir.clone()))
}

fn orchestrator(config: &Config) -> Result<Orchestrator> {
    Orchestrator::from_config(&config.analysis, &config.risk).context("Failed to build analysis engines")
}

/// Run the pipeline on one symbol from already fetched series
fn analyze_series(
    orchestrator: &Orchestrator,
    symbol: &str,
    timeframe: Timeframe,
    series: &HashMap<Timeframe, Vec<Candle>>,
    higher: &[Timeframe],
) -> Option<AnalysisOutcome> {
    let primary = series.get(&timeframe)?;
    let higher: Vec<(Timeframe, &[Candle])> = higher
        .iter()
        .filter_map(|tf| series.get(tf).map(|c| (*tf, c.as_slice())))
        .collect();
    Some(orchestrator.analyze_multi_timeframe(symbol, (timeframe, primary), &higher))
}

fn print_outcome(outcome: &AnalysisOutcome) {
    println!("\n=== {} {} ===\n", outcome.symbol, outcome.timeframe);
    println!("Candles: {}", outcome.candles);
    println!("Stage reached: {:?}", outcome.stage);

    if let Some(structure) = &outcome.structure {
        println!("Trend: {} ({:?})", structure.trend(), structure.state);
        if let Some(last) = structure.breaks.breaks.last() {
            println!("Last break: {:?} {} @ {:.4}", last.kind, last.direction, last.level);
        }
    }
    if let Some(mtf) = &outcome.mtf {
        println!("Higher timeframes: {:?}", mtf);
    }
    if let Some(fib) = &outcome.fibonacci {
        println!(
            "Fibonacci: in OTE {}, in golden pocket {}, location {:?}",
            fib.in_ote, fib.in_golden_pocket, fib.location
        );
    }
    if let Some(smc) = &outcome.smc {
        println!(
            "Smart money: {} order blocks, {} FVGs, {} displacements",
            smc.order_blocks.len(),
            smc.fvgs.len(),
            smc.displacements.len()
        );
    }
    if !outcome.patterns.is_empty() {
        let names: Vec<String> = outcome.patterns.iter().map(|p| format!("{:?}", p.pattern)).collect();
        println!("Patterns: {}", names.join(", "));
    }

    if let Some(confluence) = &outcome.confluence {
        println!(
            "\nConfluence: {:.1}/100 grade {} ({})",
            confluence.score, confluence.tier, confluence.direction
        );
        for factor in &confluence.factors {
            println!(
                "  {:<20} {:>5.1} / {:<5.1} {}",
                format!("{:?}", factor.kind),
                factor.score,
                factor.cap,
                factor.detail
            );
        }
    }

    match (&outcome.signal, &outcome.no_signal) {
        (Some(signal), _) => println!("\n{}", signal.plan),
        (None, Some(reason)) => println!("\nNo signal: {}", reason),
        (None, None) => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Dry-run the risk gate for a signal without touching the ledger
async fn preview_signal(desk: &RiskDesk, outcome: &AnalysisOutcome) {
    let Some(signal) = &outcome.signal else {
        return;
    };
    match desk.preview(&signal.to_trade_request()).await {
        Ok(size) => println!("\n{}", size),
        Err(rejection) => println!("\nRisk gate: rejected ({}) {}", rejection.code(), rejection),
    }
}

/// Analyze one symbol
pub async fn analyze(
    config: &Config,
    symbol: &str,
    timeframe: Option<Timeframe>,
    higher: Option<Vec<Timeframe>>,
    json: bool,
) -> Result<()> {
    let symbol = symbol.to_uppercase();
    let timeframe = timeframe.unwrap_or(config.watchlist.timeframe);
    let higher = higher.unwrap_or_else(|| config.watchlist.higher_timeframes.clone());
    info!("Analyzing {} {} (context: {:?})", symbol, timeframe, higher);

    let requests = std::iter::once(timeframe)
        .chain(higher.iter().copied())
        .map(|tf| (symbol.clone(), tf))
        .collect();
    let mut series = HashMap::new();
    for result in fetch_many(source(config), requests, config.data.limit, config.data.concurrency).await {
        match result.candles {
            Ok(candles) => {
                series.insert(result.timeframe, candles);
            }
            Err(e) if result.timeframe == timeframe => {
                return Err(e).with_context(|| format!("Failed to load {} {}", symbol, timeframe));
            }
            Err(_) => {}
        }
    }

    let orchestrator = orchestrator(config)?;
    let outcome = analyze_series(&orchestrator, &symbol, timeframe, &series, &higher)
        .with_context(|| format!("No candles for {} {}", symbol, timeframe))?;

    if json {
        return print_json(&outcome);
    }

    print_outcome(&outcome);
    if outcome.has_signal() {
        let desk = RiskDesk::open(config.risk.clone(), config.ledger.snapshot_path()).await?;
        preview_signal(&desk, &outcome).await;
    }
    Ok(())
}

/// Analyze every watchlist symbol, fetching with bounded concurrency
pub async fn scan_watchlist(config: &Config) -> Result<Vec<AnalysisOutcome>> {
    let watchlist = &config.watchlist;
    let requests: Vec<(String, Timeframe)> = watchlist
        .symbols
        .iter()
        .flat_map(|symbol| {
            std::iter::once(watchlist.timeframe)
                .chain(watchlist.higher_timeframes.iter().copied())
                .map(move |tf| (symbol.clone(), tf))
        })
        .collect();
    info!(
        "Scanning {} symbols ({} series, concurrency {})",
        watchlist.symbols.len(),
        requests.len(),
        config.data.concurrency
    );

    let mut by_symbol: HashMap<String, HashMap<Timeframe, Vec<Candle>>> = HashMap::new();
    for result in fetch_many(source(config), requests, config.data.limit, config.data.concurrency).await {
        if let Ok(candles) = result.candles {
            by_symbol.entry(result.symbol).or_default().insert(result.timeframe, candles);
        }
    }

    let orchestrator = orchestrator(config)?;
    let mut outcomes = Vec::new();
    for symbol in &watchlist.symbols {
        let analyzed = by_symbol.get(symbol).and_then(|series| {
            analyze_series(
                &orchestrator,
                symbol,
                watchlist.timeframe,
                series,
                &watchlist.higher_timeframes,
            )
        });
        match analyzed {
            Some(outcome) => outcomes.push(outcome),
            None => warn!("{} {}: no candles, skipped", symbol, watchlist.timeframe),
        }
    }
    debug!("Scan produced {} outcomes", outcomes.len());
    Ok(outcomes)
}

/// Scan the watchlist and print one line per symbol
pub async fn scan(config: &Config, json: bool) -> Result<()> {
    let outcomes = scan_watchlist(config).await?;
    if json {
        return print_json(&outcomes);
    }

    println!("\n=== CONFLUENCE SCAN ({}) ===\n", config.watchlist.timeframe);
    if outcomes.is_empty() {
        println!("No symbols analyzed.");
        return Ok(());
    }

    for outcome in &outcomes {
        let (score, tier, direction) = match &outcome.confluence {
            Some(c) => (format!("{:.1}", c.score), c.tier.to_string(), c.direction.to_string()),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let verdict = match (&outcome.signal, &outcome.no_signal) {
            (Some(s), _) => format!("SIGNAL avg {:.4} stop {:.4}", s.plan.average_entry, s.plan.stop_loss),
            (None, Some(reason)) => reason.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{:<12} {:>6} {:<3} {:<8} {}",
            outcome.symbol, score, tier, direction, verdict
        );
    }

    let signals: Vec<&AnalysisOutcome> = outcomes.iter().filter(|o| o.has_signal()).collect();
    if !signals.is_empty() {
        let desk = RiskDesk::open(config.risk.clone(), config.ledger.snapshot_path()).await?;
        for outcome in signals {
            println!("\n--- {} ---", outcome.symbol);
            preview_signal(&desk, outcome).await;
        }
    }
    Ok(())
}

/// Show the risk ledger
pub async fn status(config: &Config, json: bool) -> Result<()> {
    let desk = RiskDesk::open(config.risk.clone(), config.ledger.snapshot_path()).await?;
    let status = desk.status().await;
    if json {
        return print_json(&status);
    }

    println!("\n=== RISK LEDGER ===\n");
    match desk.path() {
        Some(path) => println!("Snapshot: {}", path.display()),
        None => println!("Snapshot: disabled"),
    }
    println!("{}", status);

    println!("\n=== OPEN POSITIONS ===\n");
    let snapshot = desk.snapshot().await;
    if snapshot.positions.is_empty() {
        println!("No open positions.");
    }
    for p in &snapshot.positions {
        println!(
            "{} {} {} qty {:.4} @ {:.4} stop {:.4} realized {:.2}",
            &p.id[..8.min(p.id.len())],
            p.symbol,
            p.direction,
            p.quantity,
            p.entry,
            p.stop_loss,
            p.realized_pnl
        );
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.summary());
    Ok(())
}
