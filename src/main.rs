//! LpSentry - on-chain token safety gate
//!
//! Subcommands:
//! - classify <address>      bytecode rug-similarity verdict
//! - monitor <pair>          stream liquidity signals until Ctrl+C
//! - gate <pair> <token>     run the buy-safety gate once

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lp_sentry::utils::constants::{get_chain_name, APP_NAME, APP_VERSION};
use lp_sentry::{
    BuySafetyGate, ChainReader, DexScreenerMarketCheck, LiquidityMonitor, PurchaseLatch,
    RpcProvider, RugDetector, SentryConfig, SentryTelemetry,
};

#[derive(Parser)]
#[command(name = "lp_sentry", version, about = "On-chain token safety gate")]
struct Cli {
    /// Write session telemetry JSON into this directory on exit
    #[arg(long, global = true)]
    telemetry_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify the bytecode deployed at an address
    Classify { address: Address },
    /// Print liquidity signals for a pair until Ctrl+C
    Monitor {
        pair: Address,
        #[arg(long, default_value_t = 3_000)]
        interval_ms: u64,
    },
    /// Run the buy-safety gate for a pair/token
    Gate {
        pair: Address,
        token: Address,
        #[arg(long)]
        max_wait_minutes: Option<u64>,
        #[arg(long)]
        passes: Option<u32>,
        #[arg(long)]
        poll_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = SentryConfig::from_env().map_err(|e| eyre!("{}", e))?;
    info!(
        "🛡️ {} v{} on {} (chain {})",
        APP_NAME,
        APP_VERSION,
        get_chain_name(config.chain_id),
        config.chain_id
    );

    let telemetry = Arc::new(SentryTelemetry::new());
    let chain: Arc<dyn ChainReader> =
        Arc::new(RpcProvider::new(&config.rpc).map_err(|e| eyre!("{}", e))?);

    match cli.command {
        Command::Classify { address } => {
            let detector = RugDetector::new(chain, config.detector.clone())
                .map_err(|e| eyre!("{}", e))?
                .with_telemetry(telemetry.clone());
            let report = detector.classify_bytecode(address).await;
            println!("{}", serde_json::to_string_pretty(&report)?);

            let (hashes, fingerprints) = detector.database_size().await;
            let cache = detector.cache_stats();
            println!(
                "📚 Rug DB: {} hashes, {} fingerprints | cache {} entries, {:.1}% hit rate",
                hashes, fingerprints, cache.entries, cache.hit_rate
            );
        }
        Command::Monitor { pair, interval_ms } => {
            let monitor = LiquidityMonitor::with_telemetry(
                chain,
                pair,
                config.paired_asset,
                config.gate.monitor_thresholds(),
                Some(telemetry.clone()),
            )
            .map_err(|e| eyre!("{}", e))?;

            let mut signals = monitor.subscribe();
            monitor.start(Duration::from_millis(interval_ms));

            loop {
                tokio::select! {
                    signal = signals.recv() => match signal {
                        Ok(check) => println!("{}", check.summary()),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("⚠️ Skipped {} signals", n);
                        }
                        Err(_) => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        println!("\n🛑 Shutting down...");
                        break;
                    }
                }
            }
            monitor.stop();
        }
        Command::Gate {
            pair,
            token,
            max_wait_minutes,
            passes,
            poll_ms,
        } => {
            let mut opts = config.gate.clone();
            if let Some(m) = max_wait_minutes {
                opts.max_wait_minutes = m;
            }
            if let Some(p) = passes {
                opts.required_consecutive_passes = p;
            }
            if let Some(ms) = poll_ms {
                opts.poll_interval = Duration::from_millis(ms);
            }

            let market = DexScreenerMarketCheck::new(config.chain_id, config.market.clone())?;
            let latch = PurchaseLatch::new();
            let gate = BuySafetyGate::new(chain, Arc::new(market), config.paired_asset, latch.clone())
                .with_telemetry(telemetry.clone());

            tokio::select! {
                verdict = gate.check_buy_safety(pair, token, &opts) => {
                    let verdict = verdict.map_err(|e| eyre!("{}", e))?;
                    println!("{}", serde_json::to_string_pretty(&verdict)?);
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\n🛑 Gate cancelled");
                }
            }
        }
    }

    let stats = telemetry.get_stats();
    println!("{}", stats.summary());
    if let Some(dir) = cli.telemetry_dir {
        match telemetry.export_stats_json(&dir) {
            Ok(path) => println!("   ✅ Telemetry exported to: {}", path.display()),
            Err(e) => println!("   ❌ Telemetry export failed: {}", e),
        }
    }

    Ok(())
}
