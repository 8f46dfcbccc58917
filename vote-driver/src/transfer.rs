// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use core_types::{Address, Amount};
use ledger_rpc::{LedgerRpc, TransferRequest};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::poll::{SettlementPoller, SlotState};
use crate::slots::SlotDeriver;

/// Advances the transfer cursor: sweeps settled balances back to the source
/// account. The cursor never advances past a slot whose locked balance was
/// nonzero at inspection time, so in-flight settlement is never skipped.
pub struct TransferPhase {
    client: Arc<dyn LedgerRpc>,
    deriver: Arc<SlotDeriver>,
    poller: Arc<SettlementPoller>,
    source: Address,
    owner: Address,
    fee_margin: Amount,
    remove_after_sweep: bool,
}

impl TransferPhase {
    pub fn new(
        client: Arc<dyn LedgerRpc>,
        deriver: Arc<SlotDeriver>,
        poller: Arc<SettlementPoller>,
        source: Address,
        owner: Address,
        fee_margin: Amount,
    ) -> Self {
        Self {
            client,
            deriver,
            poller,
            source,
            owner,
            fee_margin,
            remove_after_sweep: true,
        }
    }

    pub fn with_remove_after_sweep(mut self, remove: bool) -> Self {
        self.remove_after_sweep = remove;
        self
    }

    /// One transfer pass over at most `batch_target` slots. Returns the next
    /// slot to inspect; the return value equals `cursor` exactly when no
    /// progress was made.
    pub async fn advance(
        &self,
        cancel: &CancellationToken,
        cursor: u64,
        batch_target: u32,
    ) -> u64 {
        for key in [&self.source, &self.owner] {
            if let Err(err) = self.client.unlock_signing_key(key).await {
                debug!("unlock for {key} failed: {err}");
            }
        }

        let end = cursor.saturating_add(batch_target as u64);
        let mut slot = cursor;
        while slot < end {
            if cancel.is_cancelled() {
                return slot;
            }
            let address = match self.deriver.lookup(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template derivation failed, halting sweep: {err}");
                    return slot;
                }
            };
            match self.poller.classify(cancel, &address).await {
                SlotState::Unknown => {
                    warn!("slot {slot}: balance unresolved, halting sweep at {address}");
                    return slot;
                }
                SlotState::Settling { available, locked } => {
                    info!(
                        "slot {slot}: {locked} locked ({available} available) on {address}, awaiting settlement"
                    );
                    return slot;
                }
                SlotState::Empty => {
                    debug!("slot {slot}: nothing to sweep on {address}");
                }
                SlotState::Funded { available } => {
                    self.sweep(slot, &address, available).await;
                }
            }
            self.discard_registration(&address).await;
            slot += 1;
        }
        slot
    }

    /// Sweep the slot's available balance minus the fee margin back to the
    /// source account. A failed sweep is logged and left for manual
    /// recovery; the caller advances past the slot either way.
    pub(crate) async fn sweep(&self, slot: u64, address: &Address, available: Amount) -> bool {
        let amount = available - self.fee_margin;
        if amount <= 0.0 {
            warn!("slot {slot}: balance {available} within fee margin, leaving on {address}");
            return false;
        }
        // The wallet must hold the template registration to sign the spend.
        if let Err(err) = self.deriver.register(slot).await {
            warn!("slot {slot}: template registration before sweep failed: {err}");
            return false;
        }
        if let Err(err) = self.client.unlock_signing_key(address).await {
            debug!("slot {slot}: unlock for {address} failed: {err}");
        }
        match self
            .client
            .submit_transfer(&TransferRequest {
                from: address.clone(),
                to: self.source.clone(),
                amount,
                data: None,
            })
            .await
        {
            Ok(txid) => {
                info!("slot {slot}: swept {amount} from {address} ({txid})");
                true
            }
            Err(err) => {
                warn!("slot {slot}: sweep from {address} failed, left for manual recovery: {err}");
                false
            }
        }
    }

    pub(crate) async fn discard_registration(&self, address: &Address) {
        if !self.remove_after_sweep {
            return;
        }
        if let Err(err) = self.client.remove_template(address).await {
            debug!("template removal for {address} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{harness, Harness};

    fn transfer_phase(h: &Harness) -> TransferPhase {
        TransferPhase::new(
            h.ledger.clone(),
            h.deriver.clone(),
            h.poller.clone(),
            h.source.clone(),
            h.owner.clone(),
            0.01,
        )
    }

    fn mark_empty(h: &Harness, slots: impl IntoIterator<Item = u64>) {
        for slot in slots {
            h.ledger.set_balance(&h.address_for(slot), 0.0, 0.0);
        }
    }

    #[tokio::test]
    async fn halts_at_the_first_locked_slot() {
        let h = harness();
        mark_empty(&h, 0..7);
        h.ledger.set_balance(&h.address_for(7), 0.0, 200.0);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 10).await;

        assert_eq!(next, 7);
        assert!(h.ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn locked_balance_halts_even_with_funds_available() {
        let h = harness();
        h.ledger.set_balance(&h.address_for(0), 1500.0, 500.0);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 5).await;

        assert_eq!(next, 0);
        assert!(h.ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn all_locked_batch_reports_no_progress() {
        let h = harness();
        for slot in 0..5 {
            h.ledger.set_balance(&h.address_for(slot), 0.0, 100.0);
        }

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        assert_eq!(phase.advance(&cancel, 0, 5).await, 0);
    }

    #[tokio::test]
    async fn sweeps_settled_slots_minus_fee_margin() {
        let h = harness();
        mark_empty(&h, 0..2);
        h.ledger.set_balance(&h.address_for(2), 2000.0, 0.0);
        mark_empty(&h, 3..5);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 5).await;

        assert_eq!(next, 5);
        let transfers = h.ledger.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from, h.address_for(2));
        assert_eq!(transfers[0].to, h.source);
        assert!((transfers[0].amount - 1999.99).abs() < 1e-9);
        // the wallet re-registers the template before spending from it
        assert!(h.ledger.registered().contains(&h.address_for(2)));
    }

    #[tokio::test]
    async fn failed_sweep_still_advances() {
        let h = harness();
        let address = h.address_for(0);
        h.ledger.set_balance(&address, 2000.0, 0.0);
        h.ledger.fail_transfers_from(&address);
        mark_empty(&h, 1..3);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 3).await;

        assert_eq!(next, 3);
        assert!(h.ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn unresolved_balance_halts_instead_of_sweeping() {
        let h = harness();
        mark_empty(&h, 0..2);
        h.ledger.fail_queries_for(&h.address_for(2));

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 5).await;

        assert_eq!(next, 2);
        assert!(h.ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn removes_template_registrations_for_processed_slots() {
        let h = harness();
        mark_empty(&h, 0..2);
        h.ledger.set_balance(&h.address_for(2), 2000.0, 0.0);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        phase.advance(&cancel, 0, 3).await;

        let removed = h.ledger.removed();
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&h.address_for(0)));
        assert!(removed.contains(&h.address_for(2)));
    }

    #[tokio::test]
    async fn template_removal_can_be_disabled() {
        let h = harness();
        mark_empty(&h, 0..3);

        let phase = transfer_phase(&h).with_remove_after_sweep(false);
        let cancel = CancellationToken::new();
        phase.advance(&cancel, 0, 3).await;

        assert!(h.ledger.removed().is_empty());
    }

    #[tokio::test]
    async fn dust_below_fee_margin_is_left_in_place() {
        let h = harness();
        h.ledger.set_balance(&h.address_for(0), 0.005, 0.0);
        mark_empty(&h, 1..2);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        let next = phase.advance(&cancel, 0, 2).await;

        assert_eq!(next, 2);
        assert!(h.ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn cancellation_returns_the_cursor_unchanged() {
        let h = harness();
        mark_empty(&h, 0..3);

        let phase = transfer_phase(&h);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(phase.advance(&cancel, 1, 3).await, 1);
    }
}
