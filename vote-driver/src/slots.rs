// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use core_types::Address;
use ledger_rpc::{LedgerRpc, RpcError, VoteTemplate};

/// Maps a slot index to its template address for a fixed
/// (delegate, owner, reward mode) triple. Same inputs, same address;
/// registering repeatedly creates no duplicate obligations on the node.
pub struct SlotDeriver {
    client: Arc<dyn LedgerRpc>,
    delegate: String,
    owner: Address,
    reward_mode: u8,
}

impl SlotDeriver {
    pub fn new(
        client: Arc<dyn LedgerRpc>,
        delegate: impl Into<String>,
        owner: Address,
        reward_mode: u8,
    ) -> Self {
        Self {
            client,
            delegate: delegate.into(),
            owner,
            reward_mode,
        }
    }

    pub fn template_for(&self, slot: u64) -> VoteTemplate {
        VoteTemplate {
            delegate: self.delegate.clone(),
            owner: self.owner.clone(),
            reward_mode: self.reward_mode,
            nonce: slot,
        }
    }

    /// Register the slot's template in the node wallet and return its
    /// address. Used before the wallet has to sign for the address.
    pub async fn register(&self, slot: u64) -> Result<Address, RpcError> {
        self.client
            .register_vote_template(&self.template_for(slot))
            .await
    }

    /// Derive the slot's address without touching wallet state. Used for
    /// inspection-only paths.
    pub async fn lookup(&self, slot: u64) -> Result<Address, RpcError> {
        Ok(self
            .client
            .derive_vote_template(&self.template_for(slot))
            .await?
            .address)
    }
}
