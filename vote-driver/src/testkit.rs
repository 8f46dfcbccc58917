//! In-memory ledger double for driver tests: deterministic address
//! derivation, scripted balances, and failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{Address, Amount, Balance, RetryPolicy, TxId};
use ledger_rpc::{DerivedTemplate, LedgerRpc, RpcError, TransferRequest, VoteTemplate};
use parking_lot::Mutex;

use crate::poll::SettlementPoller;
use crate::slots::SlotDeriver;

/// Retry policy for tests: several attempts, millisecond delays, no jitter.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(5, 1, 1, 0.0)
}

#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    balances: HashMap<Address, Balance>,
    transfers: Vec<TransferRequest>,
    registered: Vec<Address>,
    removed: Vec<Address>,
    unlocked: Vec<Address>,
    fail_queries: HashSet<Address>,
    fail_transfers_from: HashSet<Address>,
    fail_transfers_to: HashSet<Address>,
    settle_countdowns: HashMap<Address, u32>,
    next_tx: u64,
    height: Option<u64>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Derivation the node would apply: one address per template tuple.
    pub fn address_for_template(template: &VoteTemplate) -> Address {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(template.delegate.as_bytes());
        hasher.update(template.owner.as_str().as_bytes());
        hasher.update(&[template.reward_mode]);
        hasher.update(&template.nonce.to_le_bytes());
        Address::new(format!("20v{:08x}", hasher.finalize()))
    }

    pub fn set_balance(&self, address: &Address, available: Amount, locked: Amount) {
        self.state
            .lock()
            .balances
            .insert(address.clone(), Balance::new(available, locked));
    }

    pub fn fail_queries_for(&self, address: &Address) {
        self.state.lock().fail_queries.insert(address.clone());
    }

    pub fn fail_transfers_from(&self, address: &Address) {
        self.state
            .lock()
            .fail_transfers_from
            .insert(address.clone());
    }

    pub fn fail_transfers_to(&self, address: &Address) {
        self.state.lock().fail_transfers_to.insert(address.clone());
    }

    /// After `queries` balance queries, the address's locked funds become
    /// available (settlement completing under observation).
    pub fn settle_after_queries(&self, address: &Address, queries: u32) {
        self.state
            .lock()
            .settle_countdowns
            .insert(address.clone(), queries);
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().transfers.clone()
    }

    pub fn registered(&self) -> Vec<Address> {
        self.state.lock().registered.clone()
    }

    pub fn removed(&self) -> Vec<Address> {
        self.state.lock().removed.clone()
    }

    pub fn unlocked(&self) -> Vec<Address> {
        self.state.lock().unlocked.clone()
    }

    fn node_error(method: &'static str) -> RpcError {
        RpcError::Node {
            method,
            code: -32000,
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn register_vote_template(&self, template: &VoteTemplate) -> Result<Address, RpcError> {
        let address = Self::address_for_template(template);
        let mut state = self.state.lock();
        state.registered.push(address.clone());
        // registration makes the account visible with a zero balance
        state.balances.entry(address.clone()).or_default();
        Ok(address)
    }

    async fn derive_vote_template(
        &self,
        template: &VoteTemplate,
    ) -> Result<DerivedTemplate, RpcError> {
        Ok(DerivedTemplate {
            address: Self::address_for_template(template),
            hex: Some(format!("76{:04x}", template.nonce)),
        })
    }

    async fn query_balance(&self, address: &Address) -> Result<Option<Balance>, RpcError> {
        let mut state = self.state.lock();
        if state.fail_queries.contains(address) {
            return Err(Self::node_error("getbalance"));
        }
        if let Some(remaining) = state.settle_countdowns.get_mut(address) {
            if *remaining > 1 {
                *remaining -= 1;
            } else {
                state.settle_countdowns.remove(address);
                if let Some(balance) = state.balances.get_mut(address) {
                    balance.available += balance.locked;
                    balance.locked = 0.0;
                }
            }
        }
        Ok(state.balances.get(address).copied())
    }

    async fn submit_transfer(&self, transfer: &TransferRequest) -> Result<TxId, RpcError> {
        let mut state = self.state.lock();
        if state.fail_transfers_from.contains(&transfer.from)
            || state.fail_transfers_to.contains(&transfer.to)
        {
            return Err(Self::node_error("sendfrom"));
        }
        if let Some(balance) = state.balances.get_mut(&transfer.from) {
            balance.available -= transfer.amount;
        }
        // incoming funds settle asynchronously: they arrive locked
        let credited = state.balances.entry(transfer.to.clone()).or_default();
        credited.locked += transfer.amount;
        state.transfers.push(transfer.clone());
        state.next_tx += 1;
        Ok(TxId::new(format!("tx{:08}", state.next_tx)))
    }

    async fn unlock_signing_key(&self, address: &Address) -> Result<(), RpcError> {
        self.state.lock().unlocked.push(address.clone());
        Ok(())
    }

    async fn remove_template(&self, address: &Address) -> Result<(), RpcError> {
        self.state.lock().removed.push(address.clone());
        Ok(())
    }

    async fn fork_height(&self) -> Result<Option<u64>, RpcError> {
        Ok(self.state.lock().height)
    }
}

/// Shared fixture: a mock ledger wired to a deriver and poller over the
/// usual fixed account triple.
pub struct Harness {
    pub ledger: Arc<MockLedger>,
    pub deriver: Arc<SlotDeriver>,
    pub poller: Arc<SettlementPoller>,
    pub source: Address,
    pub owner: Address,
}

impl Harness {
    /// Address the fixture's deriver maps the slot to.
    pub fn address_for(&self, slot: u64) -> Address {
        MockLedger::address_for_template(&self.deriver.template_for(slot))
    }
}

pub fn harness() -> Harness {
    let ledger = MockLedger::new();
    let owner = Address::new("1j6x8vdkkbnxe8qwjggfan9c8m8zhmez7gm3pznsqxgch3eyrwxby8eda");
    let source = Address::new("1549pyzf8dhx7r4x40k5j80f12btkpqfprjp134bcgcrjn963nzsx57xb");
    let deriver = Arc::new(SlotDeriver::new(
        ledger.clone(),
        "20m053vhn4ygv9m8pzhevnjvtgbbqhgs66qv31ez39v9xbxvk0ynhfzer",
        owner.clone(),
        0,
    ));
    let poller = Arc::new(SettlementPoller::new(ledger.clone()).with_retry(fast_retry()));
    Harness {
        ledger,
        deriver,
        poller,
        source,
        owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_addresses_are_stable_and_distinct() {
        let a = VoteTemplate {
            delegate: "20m053".to_string(),
            owner: Address::new("1j6x8v"),
            reward_mode: 0,
            nonce: 1,
        };
        let mut b = a.clone();
        b.nonce = 2;

        assert_eq!(
            MockLedger::address_for_template(&a),
            MockLedger::address_for_template(&a)
        );
        assert_ne!(
            MockLedger::address_for_template(&a),
            MockLedger::address_for_template(&b)
        );
    }

    #[tokio::test]
    async fn transfers_credit_the_destination_as_locked() {
        let ledger = MockLedger::new();
        let from = Address::new("1549py");
        let to = Address::new("20v000");
        ledger.set_balance(&from, 10_000.0, 0.0);

        ledger
            .submit_transfer(&TransferRequest {
                from: from.clone(),
                to: to.clone(),
                amount: 2000.0,
                data: None,
            })
            .await
            .unwrap();

        let credited = ledger.query_balance(&to).await.unwrap().unwrap();
        assert_eq!(credited.locked, 2000.0);
        assert_eq!(credited.available, 0.0);
        let debited = ledger.query_balance(&from).await.unwrap().unwrap();
        assert_eq!(debited.available, 8000.0);
    }

    #[tokio::test]
    async fn settle_countdown_releases_locked_funds() {
        let ledger = MockLedger::new();
        let address = Address::new("20v001");
        ledger.set_balance(&address, 0.0, 500.0);
        ledger.settle_after_queries(&address, 2);

        let first = ledger.query_balance(&address).await.unwrap().unwrap();
        assert_eq!(first.locked, 500.0);

        let second = ledger.query_balance(&address).await.unwrap().unwrap();
        assert_eq!(second.locked, 0.0);
        assert_eq!(second.available, 500.0);
    }
}
