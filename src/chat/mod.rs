//! Chat front-end: line parsing, command execution and reply formatting.
//!
//! Transport-free. A line of text goes in, a reply string comes out; the
//! `chat` subcommand feeds it from stdin.

mod format;

pub use format::*;

use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::desk::Desk;
use crate::risk::{PositionRequest, RiskError};

const CALCULATE_USAGE: &str = "/calculate <entry> <stop_loss> [take_profit] [PAIR]";
const RESULT_USAGE: &str = "/result <profit_or_loss>";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Help,
    Pairs,
    Patterns,
    Risk,
    Signals,
    Calculate {
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        pair: Option<String>,
    },
    Result {
        profit_or_loss: Decimal,
    },
    NewDay,
}

/// Why a line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Send a command starting with '/'. Try /help.")]
    NotACommand,

    #[error("Unknown command '{0}'. Try /help.")]
    UnknownCommand(String),

    #[error("Missing arguments. Usage: {0}")]
    MissingArguments(&'static str),

    #[error("Too many arguments. Usage: {0}")]
    TooManyArguments(&'static str),

    #[error("'{0}' is not a number.")]
    InvalidNumber(String),
}

impl FromStr for ChatCommand {
    type Err = ChatError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or(ChatError::NotACommand)?;
        let name = head.strip_prefix('/').ok_or(ChatError::NotACommand)?;

        // "/risk@SomeBot" addresses a specific bot in group chats.
        let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "pairs" => Self::Pairs,
            "patterns" => Self::Patterns,
            "risk" => Self::Risk,
            "signals" => Self::Signals,
            "newday" => Self::NewDay,
            "calculate" => parse_calculate(&args)?,
            "result" => match args.as_slice() {
                [] => return Err(ChatError::MissingArguments(RESULT_USAGE)),
                [value] => Self::Result {
                    profit_or_loss: parse_number(value)?,
                },
                _ => return Err(ChatError::TooManyArguments(RESULT_USAGE)),
            },
            _ => return Err(ChatError::UnknownCommand(head.to_string())),
        };

        Ok(command)
    }
}

fn parse_number(value: &str) -> Result<Decimal, ChatError> {
    Decimal::from_str(value.trim_start_matches('+'))
        .map_err(|_| ChatError::InvalidNumber(value.to_string()))
}

fn parse_calculate(args: &[&str]) -> Result<ChatCommand, ChatError> {
    if args.len() < 2 {
        return Err(ChatError::MissingArguments(CALCULATE_USAGE));
    }
    if args.len() > 4 {
        return Err(ChatError::TooManyArguments(CALCULATE_USAGE));
    }

    let entry = parse_number(args[0])?;
    let stop_loss = parse_number(args[1])?;

    let mut take_profit = None;
    let mut pair = None;
    match &args[2..] {
        [] => {}
        [third] => match parse_number(third) {
            Ok(value) => take_profit = Some(value),
            Err(_) if third.chars().any(|c| c.is_ascii_alphabetic()) => pair = Some(third.to_string()),
            Err(e) => return Err(e),
        },
        [third, fourth] => {
            take_profit = Some(parse_number(third)?);
            pair = Some(fourth.to_string());
        }
        _ => return Err(ChatError::TooManyArguments(CALCULATE_USAGE)),
    }

    Ok(ChatCommand::Calculate {
        entry,
        stop_loss,
        take_profit,
        pair,
    })
}

/// Parse and execute one line, always producing a reply.
pub async fn respond(desk: &mut Desk, line: &str) -> String {
    match line.parse::<ChatCommand>() {
        Ok(command) => execute(desk, command).await,
        Err(e) => {
            debug!(line = %line, error = %e, "Unparseable chat line");
            e.to_string()
        }
    }
}

/// Execute a command against the desk.
pub async fn execute(desk: &mut Desk, command: ChatCommand) -> String {
    if let Err(e) = desk.roll_day(Utc::now().date_naive()).await {
        return error_reply(&e);
    }

    let reply = match command {
        ChatCommand::Start => Ok(welcome_text(&desk.metrics())),
        ChatCommand::Help => Ok(help_text()),
        ChatCommand::Pairs => desk.pairs().await.map(|pairs| pairs_table(&pairs)),
        ChatCommand::Patterns => desk
            .db()
            .list_patterns()
            .await
            .map(|patterns| patterns_table(&patterns)),
        ChatCommand::Risk => Ok(risk_summary(&desk.metrics())),
        ChatCommand::Signals => desk.signals(None).await.map(|signals| signals_table(&signals)),
        ChatCommand::Calculate {
            entry,
            stop_loss,
            take_profit,
            pair,
        } => {
            let mut request = PositionRequest::new(entry, stop_loss);
            if let Some(tp) = take_profit {
                request = request.with_take_profit(tp);
            }
            desk.calculate(&request, pair.as_deref())
                .await
                .map(|quote| position_reply(&quote))
        }
        ChatCommand::Result { profit_or_loss } => desk
            .record_result(profit_or_loss)
            .await
            .map(|recorded| trade_recorded_reply(profit_or_loss, &recorded)),
        ChatCommand::NewDay => desk
            .new_trading_day()
            .await
            .map(|limit| new_day_reply(&desk.metrics(), limit)),
    };

    reply.unwrap_or_else(|e| error_reply(&e))
}

/// User-facing text for a failed command.
pub fn error_reply(error: &anyhow::Error) -> String {
    match error.downcast_ref::<RiskError>() {
        Some(RiskError::InvalidPriceInput(msg)) => format!("Invalid prices: {}", msg),
        Some(RiskError::InvalidConfiguration(msg)) => format!("Invalid settings: {}", msg),
        Some(RiskError::InvalidTradeResult(msg)) => format!("Result not recorded: {}", msg),
        Some(RiskError::DrawdownLimitReached { current, limit }) => format!(
            "Daily drawdown limit reached ({} of {}). Stop trading for today.",
            current.round_dp(2),
            limit.round_dp(2)
        ),
        None => {
            warn!(error = %error, "Chat command failed");
            "Something went wrong. Please try again.".to_string()
        }
    }
}
