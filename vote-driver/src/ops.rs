// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! One-shot operator commands over a slot range: bulk create, bulk sweep
//! with a bounded settle wait, template cleanup, and a balance audit.

use std::sync::Arc;

use core_types::{Address, Amount, RetryPolicy};
use ledger_rpc::LedgerRpc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::create::CreatePhase;
use crate::poll::{SettlementPoller, SlotState};
use crate::slots::SlotDeriver;
use crate::transfer::TransferPhase;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CreateReport {
    pub funded: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub swept: u64,
    pub empty: u64,
    pub unsettled: u64,
    pub failed: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemoveReport {
    pub removed: u64,
    pub occupied: u64,
    pub failed: u64,
}

#[derive(Debug, Default, PartialEq)]
pub struct AuditReport {
    pub total: Amount,
    pub mismatches: u64,
    pub unreadable: u64,
}

pub struct MaintenanceOps {
    client: Arc<dyn LedgerRpc>,
    deriver: Arc<SlotDeriver>,
    poller: Arc<SettlementPoller>,
    create: CreatePhase,
    transfer: TransferPhase,
    expected_amount: Amount,
    settle_wait: RetryPolicy,
}

impl MaintenanceOps {
    pub fn new(
        client: Arc<dyn LedgerRpc>,
        deriver: Arc<SlotDeriver>,
        poller: Arc<SettlementPoller>,
        create: CreatePhase,
        transfer: TransferPhase,
        expected_amount: Amount,
        settle_wait: RetryPolicy,
    ) -> Self {
        Self {
            client,
            deriver,
            poller,
            create,
            transfer,
            expected_amount,
            settle_wait,
        }
    }

    /// Fund every empty slot in `[start, start + count)`. Pre-funded slots
    /// are skipped; failures stay unfunded for a re-run.
    pub async fn create_range(
        &self,
        cancel: &CancellationToken,
        start: u64,
        count: u64,
    ) -> CreateReport {
        let mut report = CreateReport::default();
        for slot in start..start.saturating_add(count) {
            if cancel.is_cancelled() {
                break;
            }
            let address = match self.deriver.register(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template registration failed: {err}");
                    report.failed += 1;
                    continue;
                }
            };
            match self.poller.classify(cancel, &address).await {
                SlotState::Unknown => {
                    warn!("slot {slot}: balance unresolved, not funding");
                    report.failed += 1;
                }
                state if state.is_occupied() => {
                    info!("slot {slot}: already funded, skipping {address}");
                    report.skipped += 1;
                }
                _ => match self.create.fund(slot, &address).await {
                    Ok(txid) => {
                        info!("slot {slot}: funded {address} ({txid})");
                        report.funded += 1;
                    }
                    Err(err) => {
                        warn!("slot {slot}: funding failed: {err}");
                        report.failed += 1;
                    }
                },
            }
        }
        report
    }

    /// Sweep every slot in `[start, start + count)`, waiting (bounded) for
    /// each slot's locked balance to clear first.
    pub async fn sweep_range(
        &self,
        cancel: &CancellationToken,
        start: u64,
        count: u64,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        for slot in start..start.saturating_add(count) {
            if cancel.is_cancelled() {
                break;
            }
            let address = match self.deriver.lookup(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template derivation failed: {err}");
                    report.failed += 1;
                    continue;
                }
            };
            match self.wait_settled(cancel, &address).await {
                None => break,
                Some(SlotState::Empty) => {
                    info!("slot {slot}: balance is 0, nothing to sweep");
                    report.empty += 1;
                }
                Some(SlotState::Funded { available }) => {
                    if self.transfer.sweep(slot, &address, available).await {
                        report.swept += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Some(state) => {
                    warn!("slot {slot}: still unsettled after wait ({state:?})");
                    report.unsettled += 1;
                }
            }
            self.transfer.discard_registration(&address).await;
        }
        report
    }

    /// Remove template registrations for slots whose balance is zero.
    pub async fn remove_range(
        &self,
        cancel: &CancellationToken,
        start: u64,
        count: u64,
    ) -> RemoveReport {
        let mut report = RemoveReport::default();
        for slot in start..start.saturating_add(count) {
            if cancel.is_cancelled() {
                break;
            }
            let address = match self.deriver.lookup(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template derivation failed: {err}");
                    report.failed += 1;
                    continue;
                }
            };
            match self.poller.classify(cancel, &address).await {
                SlotState::Empty => match self.client.remove_template(&address).await {
                    Ok(()) => {
                        info!("slot {slot}: removed template {address}");
                        report.removed += 1;
                    }
                    Err(err) => {
                        warn!("slot {slot}: template removal failed: {err}");
                        report.failed += 1;
                    }
                },
                SlotState::Unknown => {
                    warn!("slot {slot}: balance unresolved, leaving template");
                    report.failed += 1;
                }
                state => {
                    warn!("slot {slot}: balance not zero ({state:?}), leaving template");
                    report.occupied += 1;
                }
            }
        }
        report
    }

    /// Sum available balances over slots `[0, count)`, flagging every slot
    /// whose balance differs from the expected funding amount.
    pub async fn audit(&self, cancel: &CancellationToken, count: u64) -> AuditReport {
        let mut report = AuditReport::default();
        for slot in 0..count {
            if cancel.is_cancelled() {
                break;
            }
            let address = match self.deriver.lookup(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template derivation failed: {err}");
                    report.unreadable += 1;
                    continue;
                }
            };
            match self.poller.poll(cancel, &address).await {
                Some(Ok(balance)) => {
                    report.total += balance.available;
                    if balance.available != self.expected_amount {
                        warn!(
                            "slot {slot}: balance {} differs from expected {} on {address}",
                            balance.available, self.expected_amount
                        );
                        report.mismatches += 1;
                    }
                }
                _ => {
                    warn!("slot {slot}: balance unreadable for {address}");
                    report.unreadable += 1;
                }
            }
        }
        report
    }

    /// Poll until the slot settles (`Funded` or `Empty`), bounded by the
    /// settle-wait policy. Returns the last observed state, or `None` when
    /// cancelled.
    async fn wait_settled(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> Option<SlotState> {
        let outcome = self
            .settle_wait
            .retry_async_cancellable(cancel, |attempt| async move {
                let state = self.poller.classify(cancel, address).await;
                match state {
                    SlotState::Funded { .. } | SlotState::Empty => Ok(state),
                    other => {
                        if attempt > 0 {
                            debug!("still waiting on {address}: {other:?}");
                        }
                        Err(other)
                    }
                }
            })
            .await;
        match outcome {
            None => None,
            Some(Ok(state)) => Some(state),
            Some(Err(state)) => Some(state),
        }
    }
}
