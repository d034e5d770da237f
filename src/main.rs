//! Forex Risk Desk
//!
//! Fixed-percentage position sizing with a daily drawdown limit, a trade
//! journal, pattern signals and a chat front-end.

mod analysis;
mod api;
mod chat;
mod db;
mod desk;
mod models;
mod risk;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::RatesClient;
use crate::chat::{money, truncate};
use crate::db::NewDetection;
use crate::desk::{Desk, DeskConfig};
use crate::models::{Candle, Direction};
use crate::risk::{PositionRequest, RiskConfig, DEFAULT_BALANCE};

/// Forex risk desk CLI.
#[derive(Parser)]
#[command(name = "fxdesk")]
#[command(about = "Size forex positions and track daily drawdown", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "FXDESK_DATABASE_URL", default_value = "sqlite:./fxdesk.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Account-currency value of one pip on one standard lot
    #[arg(long, env = "FXDESK_PIP_VALUE", default_value = "10")]
    pip_value: Decimal,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset the account with a new balance and risk settings
    Init {
        #[arg(short, long, default_value_t = DEFAULT_BALANCE)]
        balance: Decimal,

        /// Risk per trade, percent of balance
        #[arg(short, long, default_value = "0.2")]
        risk: Decimal,

        /// Daily drawdown limit, percent of yesterday's balance
        #[arg(short, long, default_value = "8")]
        drawdown: Decimal,
    },

    /// Show balance, risk and drawdown status
    Account {
        #[arg(long)]
        json: bool,
    },

    /// Size a position for the current balance
    Calculate {
        #[arg(short, long)]
        entry: Decimal,

        #[arg(short, long)]
        stop_loss: Decimal,

        #[arg(short, long)]
        take_profit: Option<Decimal>,

        /// Currency pair, e.g. EUR/USD (sets the pip scale)
        #[arg(short, long)]
        pair: Option<String>,

        /// buy or sell; inferred from the stop when omitted
        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,

        #[arg(long)]
        json: bool,
    },

    /// Show what a trade stands to win or lose
    Simulate {
        #[arg(short, long)]
        entry: Decimal,

        /// Position size in price-weighted units
        #[arg(long)]
        size: Decimal,

        #[arg(short, long)]
        stop_loss: Decimal,

        #[arg(short, long)]
        take_profit: Option<Decimal>,
    },

    /// Size and journal a new trade
    Open {
        #[arg(short, long)]
        pair: String,

        #[arg(short, long)]
        entry: Decimal,

        #[arg(short, long)]
        stop_loss: Decimal,

        #[arg(short, long)]
        take_profit: Option<Decimal>,

        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,
    },

    /// Close a journal trade and apply its profit or loss
    Close {
        /// Trade id
        id: i64,

        /// Exit price
        #[arg(short, long)]
        exit: Decimal,
    },

    /// Apply a profit (positive) or loss (negative) to the account
    Record {
        #[arg(allow_hyphen_values = true)]
        pnl: Decimal,
    },

    /// Start a new trading day now
    NewDay,

    /// List supported currency pairs
    Pairs,

    /// List chart patterns
    Patterns,

    /// Show sized pattern signals above a confidence threshold
    Signals {
        /// Minimum confidence (0-100)
        #[arg(short, long)]
        min_confidence: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Record a pattern detection
    Detect {
        #[arg(short, long)]
        pair: String,

        /// Pattern name, e.g. "Double Bottom"
        #[arg(long)]
        pattern: String,

        #[arg(long, default_value = "1h")]
        timeframe: String,

        #[arg(short, long)]
        entry: Decimal,

        #[arg(short, long)]
        stop_loss: Decimal,

        #[arg(short, long)]
        take_profit: Option<Decimal>,

        /// Confidence (0-100)
        #[arg(short, long)]
        confidence: f64,
    },

    /// Store candles from a JSON array of {timestamp, open, high, low, close, volume}
    ImportCandles {
        #[arg(short, long)]
        pair: String,

        #[arg(long, default_value = "1h")]
        timeframe: String,

        /// JSON file
        file: std::path::PathBuf,
    },

    /// Look for trend-line and horizontal breakouts and store them as detections
    Scan {
        /// Currency pair; every pair when omitted
        #[arg(short, long)]
        pair: Option<String>,

        #[arg(long, default_value = "1h")]
        timeframe: String,

        #[arg(long)]
        json: bool,
    },

    /// Show journal trades and statistics
    Journal {
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Fetch latest quotes for every pair
    Rates {
        #[arg(long, env = "FXDESK_RATES_API_KEY", hide_env_values = true)]
        api_key: String,

        #[arg(long, env = "FXDESK_RATES_URL")]
        base_url: Option<String>,
    },

    /// Interactive chat commands on stdin
    Chat,

    /// Show current configuration, optionally changing it
    Config {
        /// New risk per trade, percent of balance
        #[arg(long)]
        risk: Option<Decimal>,

        /// New daily drawdown limit, percent of yesterday's balance
        #[arg(long)]
        drawdown: Option<Decimal>,

        /// New default signal confidence threshold (0-100)
        #[arg(long)]
        min_confidence: Option<f64>,
    },
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    Direction::parse(s).ok_or_else(|| format!("expected buy or sell, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DeskConfig {
        database_url: cli.database.clone(),
        pip_value_per_lot: cli.pip_value,
        ..DeskConfig::default()
    };
    let mut desk = Desk::open(config).await?;

    match cli.command {
        Commands::Init {
            balance,
            risk,
            drawdown,
        } => {
            let metrics = desk.initialize_account(balance, risk, drawdown).await?;
            println!("\n{}", chat::risk_summary(&metrics));
        }

        Commands::Account { json } => {
            let metrics = desk.metrics();
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("\n{}", chat::risk_summary(&metrics));
                println!("Trading day:     {}", desk.trading_day());
            }
        }

        Commands::Calculate {
            entry,
            stop_loss,
            take_profit,
            pair,
            direction,
            json,
        } => {
            let request = build_request(entry, stop_loss, take_profit, direction);
            let quote = desk.calculate(&request, pair.as_deref()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&quote)?);
            } else {
                println!("\n{}", chat::position_reply(&quote));
            }
        }

        Commands::Simulate {
            entry,
            size,
            stop_loss,
            take_profit,
        } => {
            let sim = desk.simulate(entry, size, stop_loss, take_profit)?;

            println!("\n=== Trade Simulation ===");
            println!("Entry:           {}", sim.entry_price);
            println!("Size:            {}", sim.position_size);
            println!("Potential loss:  {}", money(sim.potential_loss));
            if let Some(profit) = sim.potential_profit {
                println!("Potential gain:  {}", money(profit));
            }
            if let Some(rr) = sim.risk_reward_ratio {
                println!("Risk/reward:     1:{}", money(rr));
            }
        }

        Commands::Open {
            pair,
            entry,
            stop_loss,
            take_profit,
            direction,
        } => {
            let request = build_request(entry, stop_loss, take_profit, direction);
            let (id, quote) = desk.open_trade(&pair, &request).await?;

            println!("\nOpened trade #{}", id);
            println!("{}", chat::position_reply(&quote));
        }

        Commands::Close { id, exit } => {
            let closed = desk.close_trade(id, exit).await?;
            let pnl = closed.trade.profit_loss.unwrap_or_default();

            println!("\nClosed trade #{} {} at {}", id, closed.trade.pair_symbol, exit);
            println!("{}", chat::trade_recorded_reply(pnl, &closed.recorded));
        }

        Commands::Record { pnl } => {
            let recorded = desk.record_result(pnl).await?;
            println!("\n{}", chat::trade_recorded_reply(pnl, &recorded));
        }

        Commands::NewDay => {
            let limit = desk.new_trading_day().await?;
            println!("\n{}", chat::new_day_reply(&desk.metrics(), limit));
        }

        Commands::Pairs => {
            let pairs = desk.pairs().await?;
            println!("\n{}", chat::pairs_table(&pairs));
        }

        Commands::Patterns => {
            let patterns = desk.db().list_patterns().await?;
            println!("\n{}", chat::patterns_table(&patterns));
        }

        Commands::Signals { min_confidence, json } => {
            let signals = desk.signals(min_confidence).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&signals)?);
            } else {
                println!("\n{}", chat::signals_table(&signals));
                for signal in signals.iter().filter(|s| !s.confirmation.reasons.is_empty()) {
                    println!(
                        "\n#{} {} {}: {:.0} -> {:.0}",
                        signal.detection.id,
                        signal.detection.pair_symbol,
                        signal.detection.pattern_name,
                        signal.confirmation.base_confidence,
                        signal.confirmation.confidence
                    );
                    for reason in &signal.confirmation.reasons {
                        println!("  - {}", reason);
                    }
                }
            }
        }

        Commands::ImportCandles { pair, timeframe, file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let candles: Vec<Candle> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse candles in {}", file.display()))?;

            let count = desk.import_candles(&pair, &timeframe, &candles).await?;
            println!("Imported {} candles for {} {}", count, pair, timeframe);
        }

        Commands::Scan { pair, timeframe, json } => {
            let reports = desk.scan(pair.as_deref(), &timeframe).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
                return Ok(());
            }

            let mut found = 0;
            for report in reports.iter().filter(|r| !r.breakouts.is_empty()) {
                println!("\n{} {} ({} candles)", report.symbol, report.timeframe, report.candles);
                for breakout in &report.breakouts {
                    println!(
                        "  {} {:<10} {} close {:.5} vs {:.5} ({:+.2}%), {} touches",
                        breakout.timestamp.format("%Y-%m-%d %H:%M"),
                        breakout.source.as_str(),
                        breakout.direction.as_str(),
                        breakout.price,
                        breakout.level,
                        breakout.fraction * 100.0,
                        breakout.touches
                    );
                }
                if !report.stored.is_empty() {
                    println!("  Stored detections: {:?}", report.stored);
                }
                found += report.breakouts.len();
            }

            if found == 0 {
                println!("No breakouts found on {} candles.", timeframe);
            }
        }

        Commands::Detect {
            pair,
            pattern,
            timeframe,
            entry,
            stop_loss,
            take_profit,
            confidence,
        } => {
            let id = desk
                .record_detection(&NewDetection {
                    pair_symbol: &pair,
                    pattern_name: &pattern,
                    timeframe: &timeframe,
                    entry_price: entry,
                    stop_loss,
                    take_profit,
                    confidence,
                })
                .await?;

            info!(id = id, pair = %pair, pattern = %pattern, "Detection recorded");
            println!("Recorded detection #{}", id);
        }

        Commands::Journal { limit } => {
            let (trades, metrics) = desk.journal(limit).await?;

            if trades.is_empty() {
                println!("No trades journaled. Use 'fxdesk open' to add one.");
                return Ok(());
            }

            println!(
                "\n{:>5} {:<8} {:<4} {:>9} {:>9} {:>10} {:<6} {:>10}",
                "ID", "PAIR", "SIDE", "ENTRY", "STOP", "SIZE", "STATUS", "P&L"
            );
            println!("{}", "-".repeat(70));

            for trade in &trades {
                let pnl = trade
                    .profit_loss
                    .map(|p| money(p).to_string())
                    .unwrap_or_else(|| "-".to_string());

                println!(
                    "{:>5} {:<8} {:<4} {:>9} {:>9} {:>10} {:<6} {:>10}",
                    trade.id,
                    truncate(&trade.pair_symbol, 8),
                    trade.direction.as_str(),
                    trade.entry_price.normalize(),
                    trade.stop_loss.normalize(),
                    money(trade.position_size),
                    trade.status.as_str(),
                    pnl
                );
            }

            println!("\n--- Closed Trades ---");
            println!("Trades:         {}", metrics.closed_trades);
            println!("Win Rate:       {:.1}%", metrics.win_rate * 100.0);
            println!("Winning Trades: {}", metrics.winning_trades);
            println!("Losing Trades:  {}", metrics.losing_trades);
            println!("Break-even:     {}", metrics.break_even_trades);
            println!("Total P&L:      {}", money(metrics.total_pnl));
            println!("Avg Win:        {}", money(metrics.avg_win));
            println!("Avg Loss:       {}", money(metrics.avg_loss));
            println!("Profit Factor:  {:.2}", metrics.profit_factor);
            println!("P&L Std Dev:    {:.2}", metrics.pnl_std_dev);
            println!("Max Drawdown:   {}", money(metrics.max_drawdown));
        }

        Commands::Rates { api_key, base_url } => {
            let client = match base_url {
                Some(url) => RatesClient::with_base_url(api_key, url)?,
                None => RatesClient::new(api_key)?,
            };

            let updates = desk.refresh_rates(&client).await?;

            println!("\n{:<9} {:>12}", "PAIR", "RATE");
            println!("{}", "-".repeat(40));
            for update in updates {
                match (update.rate, update.error) {
                    (Some(rate), _) => println!("{:<9} {:>12}", update.symbol, rate.round_dp(5)),
                    (None, Some(error)) => {
                        println!("{:<9} {:>12}  {}", update.symbol, "failed", truncate(&error, 40))
                    }
                    (None, None) => println!("{:<9} {:>12}", update.symbol, "-"),
                }
            }
        }

        Commands::Chat => {
            run_chat(&mut desk).await?;
        }

        Commands::Config {
            risk,
            drawdown,
            min_confidence,
        } => {
            if risk.is_some() || drawdown.is_some() {
                let current = desk.calculator().config();
                let updated = RiskConfig::new(
                    risk.unwrap_or(current.risk_percentage()),
                    drawdown.unwrap_or(current.drawdown_percentage()),
                )?;
                desk.update_risk_settings(updated).await?;
                info!(risk = %updated.risk_percentage(), drawdown = %updated.drawdown_percentage(), "Risk settings updated");
            }
            if let Some(value) = min_confidence {
                desk.set_signal_min_confidence(value).await?;
            }

            let signal_threshold = desk.signal_min_confidence().await?;
            let risk = desk.calculator().config();
            let config = desk.config();
            let defaults = RiskConfig::default();

            println!("\n=== Risk Configuration ===\n");
            println!("  Risk per trade:       {}% (default {}%)", risk.risk_percentage(), defaults.risk_percentage());
            println!(
                "  Daily drawdown limit: {}% (default {}%)",
                risk.drawdown_percentage(),
                defaults.drawdown_percentage()
            );

            println!("\n=== Desk Configuration ===\n");
            println!("  Database:             {}", config.database_url);
            println!("  Pip value per lot:    {}", config.pip_value_per_lot);
            println!(
                "  Signal confidence:    {}% (default {}%)",
                signal_threshold, config.signal_min_confidence
            );
            println!("  Signal limit:         {}", config.signal_limit);
            println!("  Rate timeframe:       {}", config.rate_timeframe);
        }
    }

    Ok(())
}

fn build_request(
    entry: Decimal,
    stop_loss: Decimal,
    take_profit: Option<Decimal>,
    direction: Option<Direction>,
) -> PositionRequest {
    let mut request = PositionRequest::new(entry, stop_loss);
    if let Some(tp) = take_profit {
        request = request.with_take_profit(tp);
    }
    if let Some(direction) = direction {
        request = request.with_direction(direction);
    }
    request
}

/// Read chat commands from stdin until EOF or Ctrl+C.
async fn run_chat(desk: &mut Desk) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("{}", chat::help_text());
    println!("\nPress Ctrl+C to stop.\n");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };

        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = chat::respond(desk, &line).await;
        println!("{}\n", reply);
    }

    info!("Chat session ended");
    Ok(())
}
