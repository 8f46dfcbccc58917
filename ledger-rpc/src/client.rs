// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use core_types::{Address, Balance, ForkId, TxId};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RpcError;
use crate::wire::{
    BalanceParams, DerivedTemplate, ForkHeightParams, RemoveTemplateParams, RpcRequest,
    RpcResponse, TemplateParams, TransferParams, TransferRequest, UnlockParams, VoteTemplate,
    JSONRPC_VERSION,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Call contract consumed by the drivers. Implementations must be safe to
/// call repeatedly: template registration is idempotent on the node side and
/// unlocking an already-unlocked key succeeds trivially.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Register the vote template in the node wallet and return its address.
    async fn register_vote_template(&self, template: &VoteTemplate) -> Result<Address, RpcError>;

    /// Derive the template address without registering anything.
    async fn derive_vote_template(
        &self,
        template: &VoteTemplate,
    ) -> Result<DerivedTemplate, RpcError>;

    /// First matching balance entry for the address; `None` means the node
    /// reported no matching account, which is not the same as a zero balance.
    async fn query_balance(&self, address: &Address) -> Result<Option<Balance>, RpcError>;

    async fn submit_transfer(&self, transfer: &TransferRequest) -> Result<TxId, RpcError>;

    async fn unlock_signing_key(&self, address: &Address) -> Result<(), RpcError>;

    /// Drop a template registration from the node wallet. Callers treat
    /// failures as non-fatal housekeeping.
    async fn remove_template(&self, address: &Address) -> Result<(), RpcError>;

    async fn fork_height(&self) -> Result<Option<u64>, RpcError>;
}

/// Connection settings for [`HttpLedgerClient`]. The passphrase and default
/// fork selector live here so no call site carries ambient globals.
#[derive(Clone)]
pub struct LedgerRpcConfig {
    pub rpc_url: String,
    pub passphrase: String,
    pub fork: Option<ForkId>,
    pub request_timeout: Duration,
}

impl LedgerRpcConfig {
    pub fn new(rpc_url: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            passphrase: passphrase.into(),
            fork: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_fork(mut self, fork: Option<ForkId>) -> Self {
        self.fork = fork;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

pub struct HttpLedgerClient {
    config: LedgerRpcConfig,
    endpoint: Url,
    client: Client,
    next_id: AtomicU32,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerRpcConfig) -> Result<Self, RpcError> {
        let endpoint = Url::parse(&config.rpc_url)?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client");
        Ok(Self {
            config,
            endpoint,
            client,
            next_id: AtomicU32::new(1),
        })
    }

    fn fork_param(&self) -> Option<&str> {
        self.config.fork.as_ref().map(ForkId::as_str)
    }

    /// Post one request and unwrap the result/error pair. `Ok(None)` is a
    /// success response whose `result` was null.
    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<Option<R>, RpcError>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RpcError::Http {
                method,
                status: response.status().as_u16(),
            });
        }
        let parsed: RpcResponse<R> = response.json().await?;
        if let Some(failure) = parsed.error {
            return Err(RpcError::Node {
                method,
                code: failure.code,
                message: failure.message,
            });
        }
        Ok(parsed.result)
    }

    async fn call_required<P, R>(&self, method: &'static str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        self.call(method, params).await?.ok_or(RpcError::Malformed {
            method,
            detail: "response carried neither result nor error",
        })
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerClient {
    async fn register_vote_template(&self, template: &VoteTemplate) -> Result<Address, RpcError> {
        self.call_required("addnewtemplate", TemplateParams::vote(template))
            .await
    }

    async fn derive_vote_template(
        &self,
        template: &VoteTemplate,
    ) -> Result<DerivedTemplate, RpcError> {
        self.call_required("maketemplate", TemplateParams::vote(template))
            .await
    }

    async fn query_balance(&self, address: &Address) -> Result<Option<Balance>, RpcError> {
        let params = BalanceParams {
            address: address.as_str(),
            fork: self.fork_param(),
        };
        let entries: Option<Vec<Balance>> = self.call("getbalance", params).await?;
        Ok(entries.unwrap_or_default().into_iter().next())
    }

    async fn submit_transfer(&self, transfer: &TransferRequest) -> Result<TxId, RpcError> {
        let params = TransferParams {
            from: transfer.from.as_str(),
            to: transfer.to.as_str(),
            amount: transfer.amount,
            fork: self.fork_param(),
            tx_type: 0,
            data: transfer.data.as_deref(),
        };
        self.call_required("sendfrom", params).await
    }

    async fn unlock_signing_key(&self, address: &Address) -> Result<(), RpcError> {
        let params = UnlockParams {
            pubkey: address.as_str(),
            passphrase: &self.config.passphrase,
        };
        let _: Option<serde_json::Value> = self.call("unlockkey", params).await?;
        Ok(())
    }

    async fn remove_template(&self, address: &Address) -> Result<(), RpcError> {
        let params = RemoveTemplateParams {
            address: address.as_str(),
        };
        let _: Option<serde_json::Value> = self.call("removetemplate", params).await?;
        Ok(())
    }

    async fn fork_height(&self) -> Result<Option<u64>, RpcError> {
        let params = ForkHeightParams {
            fork: self.fork_param(),
        };
        self.call("getforkheight", params).await
    }
}
