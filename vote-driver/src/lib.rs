// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Vote-template lifecycle driver.
//!
//! Drives logical slot indices through a create → fund → settle → sweep →
//! reuse cycle against an asynchronously-settling ledger node:
//! - [`SlotDeriver`]: slot index → deterministic template address.
//! - [`SettlementPoller`]: balance query → slot funding state.
//! - [`CreatePhase`] / [`TransferPhase`]: cursor-advancing batch drivers.
//! - [`CycleEngine`]: the long-running scheduler alternating the phases.
//! - [`MaintenanceOps`]: one-shot operator commands over a slot range.

mod create;
mod ops;
mod poll;
mod scheduler;
mod slots;
mod transfer;

#[cfg(test)]
mod testkit;

pub use create::CreatePhase;
pub use ops::{AuditReport, CreateReport, MaintenanceOps, RemoveReport, SweepReport};
pub use poll::{PollError, SettlementPoller, SlotState};
pub use scheduler::{CycleEngine, CycleEngineConfig, CycleMode};
pub use slots::SlotDeriver;
pub use transfer::TransferPhase;
