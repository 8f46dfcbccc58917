// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    env, process,
    sync::{mpsc, Arc},
    time::Duration,
};

use core_types::{Address, AppConfig, ForkId, RetryPolicy};
use engine_api::{Engine, EngineError};
use ledger_rpc::{HttpLedgerClient, LedgerRpc, LedgerRpcConfig, RpcError};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use vote_driver::{
    CreatePhase, CycleEngine, CycleEngineConfig, CycleMode, MaintenanceOps, SettlementPoller,
    SlotDeriver, TransferPhase,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("votemill failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = parse_command(env::args().skip(1))?;
    let config = AppConfig::load()?;

    let rpc_config = LedgerRpcConfig::new(
        config.node.rpc_url.clone(),
        config.node.passphrase.clone(),
    )
    .with_fork(config.node.fork.clone().map(ForkId::new))
    .with_request_timeout(Duration::from_secs(config.node.request_timeout_secs));
    let client: Arc<dyn LedgerRpc> = Arc::new(HttpLedgerClient::new(rpc_config)?);

    let source = Address::new(config.accounts.source_address.clone());
    let owner = Address::new(config.accounts.owner_address.clone());
    let deriver = Arc::new(SlotDeriver::new(
        client.clone(),
        config.accounts.delegate_id.clone(),
        owner.clone(),
        config.accounts.reward_mode,
    ));
    let poller = Arc::new(SettlementPoller::new(client.clone()));
    let create = CreatePhase::new(
        client.clone(),
        deriver.clone(),
        poller.clone(),
        source.clone(),
        config.driver.funding_amount,
    )
    .with_scan_span(config.driver.scan_span);
    let transfer = TransferPhase::new(
        client.clone(),
        deriver.clone(),
        poller.clone(),
        source.clone(),
        owner.clone(),
        config.driver.fee_margin,
    )
    .with_remove_after_sweep(config.driver.remove_after_sweep);

    println!(
        "votemill targeting {} (fork: {})",
        config.node.rpc_url,
        config.node.fork.as_deref().unwrap_or("default")
    );
    println!(
        "source {}, owner {}, delegate {}, funding {} (fee margin {})",
        config.accounts.source_address,
        config.accounts.owner_address,
        config.accounts.delegate_id,
        config.driver.funding_amount,
        config.driver.fee_margin
    );

    match command {
        Command::Run { start } => {
            let engine_config = CycleEngineConfig::new("cycle", CycleMode::Cycle)
                .with_create_start(start)
                .with_policy(config.cycle.clone());
            run_engine(CycleEngine::new(engine_config, create, transfer))
        }
        Command::RunCreate { start, batch } => {
            let mut policy = config.cycle.clone();
            if let Some(batch) = batch {
                policy.create_only_batch = batch;
            }
            let engine_config = CycleEngineConfig::new("create-only", CycleMode::CreateOnly)
                .with_create_start(start)
                .with_policy(policy);
            run_engine(CycleEngine::new(engine_config, create, transfer))
        }
        Command::RunSweep { start, batch } => {
            let mut policy = config.cycle.clone();
            if let Some(batch) = batch {
                policy.sweep_only_batch = batch;
            }
            let engine_config = CycleEngineConfig::new("sweep-only", CycleMode::SweepOnly)
                .with_transfer_start(start)
                .with_policy(policy);
            run_engine(CycleEngine::new(engine_config, create, transfer))
        }
        one_shot => {
            let pace_ms = config.cycle.pace_secs.max(1) * 1_000;
            let settle_wait =
                RetryPolicy::new(config.driver.settle_wait_attempts, pace_ms, pace_ms, 0.0);
            let ops = MaintenanceOps::new(
                client,
                deriver,
                poller,
                create,
                transfer,
                config.driver.funding_amount,
                settle_wait,
            );
            run_maintenance(one_shot, ops)
        }
    }
}

fn run_engine(engine: CycleEngine) -> Result<(), AppError> {
    engine.start()?;
    log_engine_health(&engine);
    println!("votemill is running; press Ctrl+C to shut down.");
    wait_for_shutdown_signal()?;
    println!("Shutdown signal received; stopping...");
    engine.stop()?;
    log_engine_health(&engine);
    Ok(())
}

fn run_maintenance(command: Command, ops: MaintenanceOps) -> Result<(), AppError> {
    let runtime = Runtime::new()?;
    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())?;

    match command {
        Command::Create { count, start } => {
            let report = runtime.block_on(ops.create_range(&cancel, start, count));
            println!(
                "create: funded {}, skipped {}, failed {}",
                report.funded, report.skipped, report.failed
            );
        }
        Command::Sweep { count, start } => {
            let report = runtime.block_on(ops.sweep_range(&cancel, start, count));
            println!(
                "sweep: swept {}, empty {}, unsettled {}, failed {}",
                report.swept, report.empty, report.unsettled, report.failed
            );
        }
        Command::Remove { count, start } => {
            let report = runtime.block_on(ops.remove_range(&cancel, start, count));
            println!(
                "remove: removed {}, occupied {}, failed {}",
                report.removed, report.occupied, report.failed
            );
        }
        Command::Audit { count } => {
            let report = runtime.block_on(ops.audit(&cancel, count));
            println!(
                "audit: total {} across {} slots ({} mismatched, {} unreadable)",
                report.total, count, report.mismatches, report.unreadable
            );
        }
        Command::Run { .. } | Command::RunCreate { .. } | Command::RunSweep { .. } => {
            unreachable!("engine commands are dispatched in run()")
        }
    }
    Ok(())
}

fn wait_for_shutdown_signal() -> Result<(), AppError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;
    Ok(())
}

fn log_engine_health(engine: &dyn Engine) {
    let health = engine.health();
    println!("cycle engine status: {:?} ({:?})", health.status, health.detail);
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Full create/sweep cycle, indefinitely.
    Run { start: u64 },
    /// Funding passes only.
    RunCreate { start: u64, batch: Option<u32> },
    /// Sweep passes only.
    RunSweep { start: u64, batch: Option<u32> },
    /// Fund a slot range once.
    Create { count: u64, start: u64 },
    /// Sweep a slot range once, waiting out settlement.
    Sweep { count: u64, start: u64 },
    /// Remove template registrations for empty slots in a range.
    Remove { count: u64, start: u64 },
    /// Sum balances over the first `count` slots.
    Audit { count: u64 },
}

fn parse_command(args: impl Iterator<Item = String>) -> Result<Command, AppError> {
    let rest: Vec<String> = args.collect();
    let Some(word) = rest.first() else {
        return Err(AppError::Usage);
    };
    let rest = &rest[1..];
    match word.as_str() {
        "run" => Ok(Command::Run {
            start: parse_or(rest, 0, "start", 0)?,
        }),
        "run-create" => Ok(Command::RunCreate {
            start: parse_or(rest, 0, "start", 0)?,
            batch: parse_opt(rest, 1, "batch")?,
        }),
        "run-sweep" => Ok(Command::RunSweep {
            start: parse_or(rest, 0, "start", 0)?,
            batch: parse_opt(rest, 1, "batch")?,
        }),
        "create" => Ok(Command::Create {
            count: parse_or(rest, 0, "count", 1)?,
            start: parse_or(rest, 1, "start", 0)?,
        }),
        "sweep" => Ok(Command::Sweep {
            count: parse_or(rest, 0, "count", 1)?,
            start: parse_or(rest, 1, "start", 0)?,
        }),
        "remove" => Ok(Command::Remove {
            count: parse_or(rest, 0, "count", 1)?,
            start: parse_or(rest, 1, "start", 0)?,
        }),
        "audit" => Ok(Command::Audit {
            count: parse_at(rest, 0, "count")?,
        }),
        other => Err(AppError::UnknownCommand(other.to_string())),
    }
}

fn parse_at<T: std::str::FromStr>(
    args: &[String],
    index: usize,
    name: &'static str,
) -> Result<T, AppError> {
    let value = args.get(index).ok_or(AppError::Usage)?;
    value.parse().map_err(|_| AppError::BadArgument {
        name,
        value: value.clone(),
    })
}

fn parse_or<T: std::str::FromStr>(
    args: &[String],
    index: usize,
    name: &'static str,
    default: T,
) -> Result<T, AppError> {
    match args.get(index) {
        Some(value) => value.parse().map_err(|_| AppError::BadArgument {
            name,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

fn parse_opt<T: std::str::FromStr>(
    args: &[String],
    index: usize,
    name: &'static str,
) -> Result<Option<T>, AppError> {
    match args.get(index) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadArgument {
                name,
                value: value.clone(),
            }),
        None => Ok(None),
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: votemill <run|run-create|run-sweep|create|sweep|remove|audit> [args]")]
    Usage,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("invalid value for {name}: {value:?}")]
    BadArgument { name: &'static str, value: String },
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    ShutdownWait(#[from] mpsc::RecvError),
    #[error("runtime setup failed: {0}")]
    Io(#[from] std::io::Error),
}
