// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;
use std::time::Duration;

use core_types::config::CyclePolicy;
use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
use log::{error, info};
use parking_lot::Mutex;
use tokio::{runtime::Runtime, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::create::CreatePhase;
use crate::transfer::TransferPhase;

/// Which loop the engine runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleMode {
    /// Alternate create and transfer batches (the full lifecycle).
    Cycle,
    /// Only fund slots.
    CreateOnly,
    /// Only sweep slots, with the scan-reset policy.
    SweepOnly,
}

#[derive(Clone)]
pub struct CycleEngineConfig {
    pub label: String,
    pub mode: CycleMode,
    pub create_start: u64,
    pub transfer_start: u64,
    pub policy: CyclePolicy,
}

impl CycleEngineConfig {
    pub fn new(label: impl Into<String>, mode: CycleMode) -> Self {
        Self {
            label: label.into(),
            mode,
            create_start: 0,
            transfer_start: 0,
            policy: CyclePolicy::default(),
        }
    }

    pub fn with_create_start(mut self, start: u64) -> Self {
        self.create_start = start;
        self
    }

    pub fn with_transfer_start(mut self, start: u64) -> Self {
        self.transfer_start = start;
        self
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// The outer scheduler: one logical thread of control over the cursor pair,
/// paced by a fixed sleep, stopped only by cancellation.
pub struct CycleEngine {
    inner: Arc<CycleInner>,
}

impl CycleEngine {
    pub fn new(config: CycleEngineConfig, create: CreatePhase, transfer: TransferPhase) -> Self {
        Self {
            inner: CycleInner::new(config, create, transfer),
        }
    }
}

impl Engine for CycleEngine {
    fn start(&self) -> EngineResult<()> {
        self.inner.start()
    }

    fn stop(&self) -> EngineResult<()> {
        self.inner.stop()
    }

    fn health(&self) -> EngineHealth {
        self.inner.health()
    }
}

struct CycleInner {
    config: CycleEngineConfig,
    create: CreatePhase,
    transfer: TransferPhase,
    state: Mutex<EngineRuntimeState>,
    health: Mutex<EngineHealth>,
}

impl CycleInner {
    fn new(config: CycleEngineConfig, create: CreatePhase, transfer: TransferPhase) -> Arc<Self> {
        Arc::new(Self {
            config,
            create,
            transfer,
            state: Mutex::new(EngineRuntimeState::Stopped),
            health: Mutex::new(EngineHealth::new(HealthStatus::Stopped, None)),
        })
    }

    fn start(self: &Arc<Self>) -> EngineResult<()> {
        let mut guard = self.state.lock();
        if matches!(*guard, EngineRuntimeState::Running(_)) {
            return Err(EngineError::AlreadyRunning);
        }
        self.set_health(HealthStatus::Starting, None);
        let runtime = Runtime::new().map_err(|err| EngineError::Failure {
            source: Box::new(err),
        })?;
        let cancel = CancellationToken::new();
        let runner = Arc::clone(self);
        let cancel_clone = cancel.clone();
        let handle = runtime.spawn(async move {
            runner.run(cancel_clone).await;
        });
        *guard = EngineRuntimeState::Running(RuntimeBundle {
            runtime,
            handle,
            cancel,
        });
        info!(
            "[{}] cycle engine starting in {:?} mode",
            self.config.label, self.config.mode
        );
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        let mut guard = self.state.lock();
        let Some(bundle) = guard.take_running() else {
            return Err(EngineError::NotRunning);
        };
        bundle.cancel.cancel();
        if let Err(err) = RuntimeBundle::join(bundle) {
            error!("[{}] runtime join failed: {:?}", self.config.label, err);
        }
        *guard = EngineRuntimeState::Stopped;
        self.set_health(HealthStatus::Stopped, None);
        Ok(())
    }

    fn health(&self) -> EngineHealth {
        self.health.lock().clone()
    }

    fn set_health(&self, status: HealthStatus, detail: Option<String>) {
        let mut guard = self.health.lock();
        guard.status = status;
        guard.detail = detail;
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.set_health(HealthStatus::Ready, None);
        match self.config.mode {
            CycleMode::Cycle => self.run_cycle(&cancel).await,
            CycleMode::CreateOnly => self.run_create_only(&cancel).await,
            CycleMode::SweepOnly => self.run_sweep_only(&cancel).await,
        }
        self.set_health(HealthStatus::Stopped, None);
        info!("[{}] cycle engine stopped", self.config.label);
    }

    async fn run_cycle(&self, cancel: &CancellationToken) {
        let policy = &self.config.policy;
        let mut cursors = CycleCursors::new(self.config.create_start, self.config.transfer_start);
        while !cancel.is_cancelled() {
            cursors.create = self
                .create
                .advance(cancel, cursors.create, policy.create_batch)
                .await;
            let next = self
                .transfer
                .advance(cancel, cursors.transfer, policy.transfer_batch)
                .await;
            cursors.apply_transfer(next, policy);
            self.pace(cancel).await;
        }
    }

    async fn run_create_only(&self, cancel: &CancellationToken) {
        let policy = &self.config.policy;
        let mut cursor = self.config.create_start;
        while !cancel.is_cancelled() {
            cursor = self
                .create
                .advance(cancel, cursor, policy.create_only_batch)
                .await;
            if cursor > policy.create_ceiling {
                cursor = 0;
            }
            self.pace(cancel).await;
        }
    }

    async fn run_sweep_only(&self, cancel: &CancellationToken) {
        let policy = &self.config.policy;
        let mut sweep = SweepCursor::new(self.config.transfer_start);
        while !cancel.is_cancelled() {
            let batch = policy.sweep_only_batch;
            let next = self.transfer.advance(cancel, sweep.cursor, batch).await;
            sweep.apply(next, batch, policy);
            self.pace(cancel).await;
        }
    }

    async fn pace(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sleep(Duration::from_secs(self.config.policy.pace_secs)) => {}
        }
    }
}

/// Cursor pair plus the lock-retry counter; `apply_transfer` is the whole
/// wraparound/backoff policy of one scheduler iteration.
#[derive(Clone, Copy, Debug)]
struct CycleCursors {
    create: u64,
    transfer: u64,
    lock_retries: u32,
}

impl CycleCursors {
    fn new(create: u64, transfer: u64) -> Self {
        Self {
            create,
            transfer,
            lock_retries: 0,
        }
    }

    fn apply_transfer(&mut self, next: u64, policy: &CyclePolicy) {
        if next == self.transfer {
            // Stuck on a locked slot; give up waiting once the budget is
            // spent and restart the sweep from the beginning.
            self.lock_retries += 1;
            if self.lock_retries > policy.lock_retry_ceiling {
                self.lock_retries = 0;
                self.transfer = 0;
            }
        } else {
            self.lock_retries = 0;
            self.transfer = next;
        }
        if self.create > policy.create_ceiling {
            self.create = 0;
        }
        if self.transfer > self.create.saturating_add(policy.transfer_lead_margin) {
            self.transfer = 0;
        }
        if self.transfer > policy.transfer_ceiling {
            self.transfer = 0;
        }
    }
}

/// Sweep-only cursor with the scan-reset policy: once the scan has run for
/// a full ceiling's worth of iterations and is still hitting a locked slot,
/// restart from slot 0.
#[derive(Clone, Copy, Debug)]
struct SweepCursor {
    cursor: u64,
    iterations_since_reset: u32,
}

impl SweepCursor {
    fn new(cursor: u64) -> Self {
        Self {
            cursor,
            iterations_since_reset: 0,
        }
    }

    fn apply(&mut self, next: u64, batch: u32, policy: &CyclePolicy) {
        let halted = next < self.cursor.saturating_add(batch as u64);
        if halted && self.iterations_since_reset >= policy.sweep_scan_ceiling {
            self.cursor = 0;
            self.iterations_since_reset = 0;
            return;
        }
        self.cursor = next;
        self.iterations_since_reset += 1;
        if self.cursor > policy.transfer_ceiling {
            self.cursor = 0;
            self.iterations_since_reset = 0;
        }
    }
}

enum EngineRuntimeState {
    Stopped,
    Running(RuntimeBundle),
}

impl EngineRuntimeState {
    fn take_running(&mut self) -> Option<RuntimeBundle> {
        match std::mem::replace(self, EngineRuntimeState::Stopped) {
            EngineRuntimeState::Running(bundle) => Some(bundle),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct RuntimeBundle {
    runtime: Runtime,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RuntimeBundle {
    fn join(bundle: RuntimeBundle) -> Result<(), tokio::task::JoinError> {
        let RuntimeBundle {
            runtime,
            handle,
            cancel: _,
        } = bundle;
        runtime.block_on(async { handle.await })
    }
}
