//! tenderhub: a tender and bid lifecycle engine.
//!
//! Organizations publish tenders; users and organizations submit competing
//! bids. Every content edit is recorded as an immutable version snapshot and
//! can be rolled back, and bids are closed by a quorum of decisions from the
//! tender organization's responsible users.
//!
//! # Architecture
//!
//! - [`core`]: storage plumbing ([`core::store::Store`], pool, schemas), the
//!   error taxonomy, configuration, status gates and the generic
//!   version/history manager.
//! - [`plugins`]: one subsystem per table family (`directory`, `tender`,
//!   `bid`, `decision`, `feedback`). Each adds its operations to
//!   [`core::engine::Engine`] and contributes a CLI group.
//!
//! All state lives in one SQLite database under the store root. Writes are
//! serialized per store and run in `BEGIN IMMEDIATE` transactions.
//!
//! # Examples
//!
//! ```bash
//! tenderhub init
//! tenderhub directory add-employee --username alice
//! tenderhub directory add-organization --name Acme
//! tenderhub directory grant --organization OR_... --username alice
//! tenderhub tender new --name "Road" --description "Repave" \
//!     --service-type Construction --organization OR_... --username alice
//! tenderhub --format json bid decide BD_... Approved --username alice
//! ```

pub mod core;
pub mod plugins;
mod subsystems;

use crate::core::config;
use crate::core::engine::Engine;
use crate::core::error;
use crate::core::output;
use crate::core::time;
use crate::plugins::{bid, directory, tender};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`tracing_subscriber` syntax).
pub const LOG_ENV: &str = "TENDERHUB_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "tenderhub",
    version = env!("CARGO_PKG_VERSION"),
    about = "Tender and bid lifecycle engine"
)]
struct Cli {
    /// Store directory.
    #[clap(long, global = true, default_value = ".tenderhub")]
    store: PathBuf,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store and write a default tenderhub.toml.
    Init,
    /// Seed employees, organizations and responsibilities.
    Directory(directory::DirectoryCli),
    /// Create, edit and publish tenders.
    Tender(tender::TenderCli),
    /// Submit, edit and decide on bids.
    Bid(bid::BidCli),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second call (tests driving `run` in-process) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn init_store(engine: &Engine) -> Result<serde_json::Value, error::TenderError> {
    let root = &engine.store().root;
    let wrote_config = config::write_default_config(root)?;
    Ok(time::command_envelope(
        "init",
        "ok",
        serde_json::json!({
            "store": root.display().to_string(),
            "db_path": engine.store().db_path().display().to_string(),
            "config_written": wrote_config,
        }),
    ))
}

fn dispatch(cli: Cli) -> Result<serde_json::Value, error::TenderError> {
    let engine = Engine::open(&cli.store)?;
    let result = match cli.command {
        Command::Init => init_store(&engine),
        Command::Directory(sub) => directory::run_directory_cli(engine.store(), sub),
        Command::Tender(sub) => tender::run_tender_cli(&engine, sub),
        Command::Bid(sub) => bid::run_bid_cli(&engine, sub),
    };
    settle(result, engine.close())
}

/// The command's own error wins over a failure to close the store.
fn settle<T>(
    result: Result<T, error::TenderError>,
    closed: Result<(), error::TenderError>,
) -> Result<T, error::TenderError> {
    match (result, closed) {
        (result, Ok(())) => result,
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "store close failed after command error");
            Err(e)
        }
    }
}

/// Dotted command name (`bid.decide`, `directory.add_employee`) from parsed matches.
fn command_name(matches: &ArgMatches) -> String {
    let mut parts = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        parts.push(name.replace('-', "_"));
        current = sub;
    }
    parts.join(".")
}

fn print_envelope(format: OutputFormat, envelope: &serde_json::Value) -> Result<(), error::TenderError> {
    match format {
        OutputFormat::Json => {
            let body = serde_json::to_string_pretty(envelope)
                .map_err(|e| error::TenderError::StorageError(e.to_string()))?;
            println!("{}", body);
        }
        OutputFormat::Text => {
            let cmd = envelope.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            println!("{} {}", "✓".bright_green(), cmd.bold());
            let body = output::render_text(envelope);
            if !body.is_empty() {
                println!("{}", body);
            }
        }
    }
    Ok(())
}

/// Parse the command line, run one command and print its result.
///
/// Errors are returned to the caller for the `error[kind]: reason` line and the
/// exit code; with `--format json` an error envelope is also printed to stdout.
pub fn run() -> Result<(), error::TenderError> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    init_tracing();
    let format = cli.format;
    match dispatch(cli) {
        Ok(envelope) => print_envelope(format, &envelope),
        Err(e) => {
            if format == OutputFormat::Json {
                let envelope = time::command_envelope(
                    &command_name(&matches),
                    "error",
                    serde_json::json!({ "kind": e.kind(), "reason": e.reason() }),
                );
                print_envelope(format, &envelope)?;
            }
            Err(e)
        }
    }
}
