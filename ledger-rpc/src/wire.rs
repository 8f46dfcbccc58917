// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Wire shapes for the consumed JSON-RPC subset. Field names follow the
//! node's protocol; `Option` fields serialize as `null` the way the node
//! expects omitted parameters.

use core_types::{Address, Amount};
use serde::{Deserialize, Serialize};

pub(crate) const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<P> {
    pub id: u32,
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse<R> {
    pub result: Option<R>,
    pub error: Option<RpcFailure>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcFailure {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Vote template registration parameters. The slot index travels as the
/// template `nonce`, so a fixed (delegate, owner, rewardmode) triple maps
/// each slot to its own deterministic address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteTemplate {
    pub delegate: String,
    pub owner: Address,
    #[serde(rename = "rewardmode")]
    pub reward_mode: u8,
    pub nonce: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateParams<'a> {
    #[serde(rename = "type")]
    pub template_type: &'static str,
    pub vote: &'a VoteTemplate,
}

impl<'a> TemplateParams<'a> {
    pub fn vote(template: &'a VoteTemplate) -> Self {
        Self {
            template_type: "vote",
            vote: template,
        }
    }
}

/// `maketemplate` result: the derived address plus the serialized template
/// blob some transfers embed.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedTemplate {
    pub address: Address,
    #[serde(default)]
    pub hex: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BalanceParams<'a> {
    pub address: &'a str,
    pub fork: Option<&'a str>,
}

/// One outbound transfer. The default fork selector and the signing
/// passphrase come from the client configuration, not from the request.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferParams<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub amount: Amount,
    pub fork: Option<&'a str>,
    #[serde(rename = "type")]
    pub tx_type: u8,
    pub data: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnlockParams<'a> {
    pub pubkey: &'a str,
    pub passphrase: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveTemplateParams<'a> {
    pub address: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ForkHeightParams<'a> {
    pub fork: Option<&'a str>,
}
