//! # sync-queue
//!
//! Inspects or clears a persisted sync queue without starting an engine.
//!
//! ```text
//! sync-queue [--config <sync.toml>] status   counts per lifecycle state
//! sync-queue [--config <sync.toml>] list     one line per operation, drain order
//! sync-queue [--config <sync.toml>] clear    delete the persisted queue
//! ```
//!
//! `status` and `list` only read. A corrupt snapshot is reported and left
//! in place for the app to quarantine on its next start.
//!
//! Storage backend and path come from the same `SyncConfig` the app
//! uses, so `PRODY_SYNC_DB_PATH` works here too.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use prody_core::{SyncOperation, SyncStatus, SyncTelemetry};
use prody_sync::{open_store, SyncConfig, SyncError, SyncResult};

const USAGE: &str = "usage: sync-queue [--config <path>] <status|list|clear>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    List,
    Clear,
}

/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: `info,prody=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,prody=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<(Option<PathBuf>, Command), String> {
    let mut config_path = None;
    let mut command = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "status" => command = Some(Command::Status),
            "list" => command = Some(Command::List),
            "clear" => command = Some(Command::Clear),
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument '{}'\n{}", other, USAGE)),
        }
    }

    command
        .map(|c| (config_path, c))
        .ok_or_else(|| USAGE.to_string())
}

async fn run(config_path: Option<PathBuf>, command: Command) -> SyncResult<()> {
    let config = SyncConfig::load(config_path)?;
    let store = open_store(&config).await?;

    match command {
        Command::Clear => {
            store.clear().await?;
            info!("Persisted sync queue cleared");
            println!("cleared");
        }
        Command::Status | Command::List => {
            let mut operations = match store.peek().await {
                Ok(operations) => operations,
                Err(SyncError::CorruptQueue(reason)) => {
                    println!("queue is corrupt and was left untouched: {}", reason);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            operations.sort_by(SyncOperation::drain_order);

            if command == Command::Status {
                let saved_at = store.saved_at().await?;
                print_status(&operations, &config, saved_at);
            } else {
                print_list(&operations);
            }
        }
    }

    Ok(())
}

fn print_status(operations: &[SyncOperation], config: &SyncConfig, saved_at: Option<DateTime<Utc>>) {
    let telemetry = SyncTelemetry::from_operations(operations, Utc::now(), config.stuck_threshold());
    let status = SyncStatus::settled(operations);

    println!("status:    {} ({})", status, status.message(operations.len()));
    println!("depth:     {}", telemetry.queue_depth);
    println!("retrying:  {}", telemetry.retrying_count);
    println!("stuck:     {}", telemetry.stuck_count);
    println!("failed:    {}", telemetry.failed_count);
    println!(
        "saved:     {}",
        saved_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
}

fn print_list(operations: &[SyncOperation]) {
    if operations.is_empty() {
        println!("(empty)");
        return;
    }
    for op in operations {
        let next = op
            .next_retry_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<22} {:<15} p={:<3} attempts={} next={} created={}{}",
            op.id,
            op.operation_type.as_str(),
            op.lifecycle_state.to_string(),
            op.priority,
            op.attempt_count,
            next,
            op.created_at.to_rfc3339(),
            op.last_error
                .as_deref()
                .map(|e| format!("  error={}", e))
                .unwrap_or_default(),
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let (config_path, command) = match parse_args(std::env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(config_path, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "sync-queue failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(args(&["status"])).unwrap(), (None, Command::Status));
        assert_eq!(
            parse_args(args(&["--config", "/tmp/sync.toml", "clear"])).unwrap(),
            (Some(PathBuf::from("/tmp/sync.toml")), Command::Clear)
        );
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["purge"])).is_err());
    }

    #[tokio::test]
    async fn test_status_leaves_corrupt_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join("pending_sync_operations.json");
        std::fs::write(&queue_path, "[{\"id\":").unwrap();

        let mut config = SyncConfig::default();
        config.storage.backend = prody_sync::StorageBackend::File;
        config.storage.path = Some(queue_path.clone());
        let config_path = dir.path().join("sync.toml");
        std::fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

        run(Some(config_path.clone()), Command::Status).await.unwrap();
        run(Some(config_path), Command::List).await.unwrap();

        assert_eq!(std::fs::read_to_string(&queue_path).unwrap(), "[{\"id\":");
        assert!(!dir.path().join("pending_sync_operations.json.corrupt").exists());
    }
}
