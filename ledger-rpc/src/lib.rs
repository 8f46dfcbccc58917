// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Narrow JSON-RPC client for the ledger node.
//!
//! The crate exposes:
//! - [`LedgerRpc`]: the call contract the drivers are written against.
//! - [`HttpLedgerClient`]: the production implementation over HTTP POST.
//! - Wire parameter/result types for the consumed method subset.

mod client;
mod error;
mod wire;

pub use client::{HttpLedgerClient, LedgerRpc, LedgerRpcConfig};
pub use error::RpcError;
pub use wire::{DerivedTemplate, TransferRequest, VoteTemplate};
