// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use core_types::config::DEFAULT_SCAN_SPAN;
use core_types::{Address, Amount, TxId};
use ledger_rpc::{LedgerRpc, RpcError, TransferRequest};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::poll::{SettlementPoller, SlotState};
use crate::slots::SlotDeriver;

/// Advances the create cursor: funds not-yet-funded slots from the source
/// account until the batch target is met, skipping slots that already hold
/// funds. Skips do not count against the batch; the scan span caps how far
/// a single pass may look ahead.
pub struct CreatePhase {
    client: Arc<dyn LedgerRpc>,
    deriver: Arc<SlotDeriver>,
    poller: Arc<SettlementPoller>,
    source: Address,
    funding_amount: Amount,
    scan_span: u64,
}

impl CreatePhase {
    pub fn new(
        client: Arc<dyn LedgerRpc>,
        deriver: Arc<SlotDeriver>,
        poller: Arc<SettlementPoller>,
        source: Address,
        funding_amount: Amount,
    ) -> Self {
        Self {
            client,
            deriver,
            poller,
            source,
            funding_amount,
            scan_span: DEFAULT_SCAN_SPAN,
        }
    }

    pub fn with_scan_span(mut self, span: u64) -> Self {
        self.scan_span = span.max(1);
        self
    }

    /// One create pass. Returns the next unscanned slot index.
    pub async fn advance(
        &self,
        cancel: &CancellationToken,
        cursor: u64,
        batch_target: u32,
    ) -> u64 {
        match self.client.fork_height().await {
            Ok(Some(height)) => debug!("create pass from slot {cursor}, fork height {height}"),
            Ok(None) => debug!("create pass from slot {cursor}, fork height unavailable"),
            Err(err) => debug!("create pass from slot {cursor}, fork height query failed: {err}"),
        }

        let mut issued = 0u32;
        let mut slot = cursor;
        while issued < batch_target && slot.saturating_sub(cursor) < self.scan_span {
            if cancel.is_cancelled() {
                return slot;
            }
            let address = match self.deriver.register(slot).await {
                Ok(address) => address,
                Err(err) => {
                    warn!("slot {slot}: template registration failed: {err}");
                    slot += 1;
                    continue;
                }
            };
            match self.poller.classify(cancel, &address).await {
                SlotState::Unknown => {
                    warn!("slot {slot}: balance unresolved, leaving for a later pass");
                }
                state if state.is_occupied() => {
                    debug!("slot {slot}: already funded, skipping {address}");
                }
                _ => match self.fund(slot, &address).await {
                    Ok(txid) => {
                        info!(
                            "slot {slot}: funded {} with {} ({txid})",
                            address, self.funding_amount
                        );
                        issued += 1;
                    }
                    Err(err) => {
                        warn!("slot {slot}: funding transfer to {address} failed: {err}");
                    }
                },
            }
            slot += 1;
        }
        slot
    }

    /// Unlock-then-submit one funding transfer to the slot address.
    pub(crate) async fn fund(&self, slot: u64, address: &Address) -> Result<TxId, RpcError> {
        if let Err(err) = self.client.unlock_signing_key(&self.source).await {
            debug!("slot {slot}: unlock for {} failed: {err}", self.source);
        }
        self.client
            .submit_transfer(&TransferRequest {
                from: self.source.clone(),
                to: address.clone(),
                amount: self.funding_amount,
                data: None,
            })
            .await
    }
}
