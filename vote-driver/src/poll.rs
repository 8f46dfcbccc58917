// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use core_types::{Address, Amount, Balance, RetryPolicy};
use ledger_rpc::{LedgerRpc, RpcError};
use log::debug;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Funding state of a slot at the moment of inspection. Derived, never
/// cached; the node owns the authoritative balance data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotState {
    /// Balance could not be determined (query failed, account not visible
    /// yet, or the wait was cancelled). Not the same as [`SlotState::Empty`].
    Unknown,
    /// Funds present but not yet confirmed final; the slot cannot be swept.
    Settling { available: Amount, locked: Amount },
    /// Settled funds ready to sweep.
    Funded { available: Amount },
    /// Nothing on the address.
    Empty,
}

impl SlotState {
    pub fn from_balance(balance: &Balance) -> Self {
        if balance.locked > 0.0 {
            SlotState::Settling {
                available: balance.available,
                locked: balance.locked,
            }
        } else if balance.available > 0.0 {
            SlotState::Funded {
                available: balance.available,
            }
        } else {
            SlotState::Empty
        }
    }

    /// True when the address holds anything at all, settled or not.
    pub fn is_occupied(&self) -> bool {
        matches!(self, SlotState::Settling { .. } | SlotState::Funded { .. })
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("account not visible yet")]
    NotVisible,
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Queries available vs. locked balance for an address, retrying transient
/// failures within a bounded policy.
pub struct SettlementPoller {
    client: Arc<dyn LedgerRpc>,
    retry: RetryPolicy,
}

impl SettlementPoller {
    pub fn new(client: Arc<dyn LedgerRpc>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default_rpc(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Balance for the address. `None` when cancelled mid-wait; an error
    /// after the retry budget is spent means the slot stays unresolved.
    pub async fn poll(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> Option<Result<Balance, PollError>> {
        self.retry
            .retry_async_cancellable(cancel, |_| async move {
                match self.client.query_balance(address).await {
                    Ok(Some(balance)) => Ok(balance),
                    Ok(None) => Err(PollError::NotVisible),
                    Err(err) => Err(PollError::Rpc(err)),
                }
            })
            .await
    }

    /// Fold the poll outcome into the slot's funding state.
    pub async fn classify(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> SlotState {
        match self.poll(cancel, address).await {
            None => SlotState::Unknown,
            Some(Ok(balance)) => SlotState::from_balance(&balance),
            Some(Err(err)) => {
                debug!("balance query for {address} unresolved: {err}");
                SlotState::Unknown
            }
        }
    }
}
