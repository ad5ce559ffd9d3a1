//! Command-line entry point.
//!
//! # Responsibility
//! - Bootstrap logging and the store from environment plus flags.
//! - Dispatch one request through the boundary and print its JSON response.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use lineage_api::{Api, ApiConfig, ApiRequest, Method};
use lineage_core::{
    init_logging, seed_demo_data, LogTarget, RecalcService, RecalcServiceError,
    SqliteCalculationRepository, SqliteVariableRepository, Store,
};
use log::info;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "lineage", about = "Resource lineage and expression recalculation")]
struct Args {
    /// Request method (GET, POST, PUT).
    method: Method,

    /// Request path, e.g. `/3` or `/expressions/1`.
    path: String,

    /// JSON request body.
    body: Option<String>,

    /// SQLite store file; overrides LINEAGE_DB_PATH.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Reset the demo dataset before handling the request.
    #[arg(long)]
    seed: bool,

    /// Re-derive the calculation dependency index before handling the request.
    #[arg(long = "rebuild-index")]
    rebuild_index: bool,

    /// Log level; overrides LINEAGE_LOG_LEVEL.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Absolute log directory; overrides LINEAGE_LOG_DIR.
    #[arg(long = "log-dir")]
    log_dir: Option<String>,

    /// Pretty-print the response body.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let mut config = ApiConfig::from_env().context("invalid environment configuration")?;
    if let Some(db) = args.db.clone() {
        config.db_path = db;
    }
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }
    if let Some(dir) = args.log_dir.as_deref() {
        config.log_target = LogTarget::directory(dir).map_err(|err| anyhow!(err))?;
    }
    config.seed_demo |= args.seed;

    init_logging(&config.log_level, config.log_target.clone())
        .map_err(|err| anyhow!(err))
        .context("failed to initialize logging")?;

    let body = args
        .body
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("request body is not valid JSON")?;

    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))?;

    if config.seed_demo {
        store
            .write(seed_demo_data)
            .context("failed to seed demo data")?;
    }
    if args.rebuild_index {
        let report = store
            .write(|conn| -> Result<_, RecalcServiceError> {
                RecalcService::new(
                    SqliteVariableRepository::try_new(conn)?,
                    SqliteCalculationRepository::try_new(conn)?,
                )
                .rebuild_dependency_index()
            })
            .context("failed to rebuild dependency index")?;
        info!(
            "event=cli_rebuild_index module=cli status=ok rebuilt={} skipped={}",
            report.rebuilt,
            report.skipped.len()
        );
    }

    let request = ApiRequest::new(args.method, args.path, body);
    let response = Api::new(&store).handle(&request);

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&response.body)?
    } else {
        serde_json::to_string(&response.body)?
    };
    println!("{rendered}");

    store.close().context("failed to close store")?;

    if response.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("request failed with status {}", response.status);
        Ok(ExitCode::FAILURE)
    }
}
