// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared primitives, retry policy, and configuration for the vote lifecycle driver.

pub mod config;
pub mod retry;
pub mod types;

pub use crate::config::AppConfig;
pub use crate::retry::RetryPolicy;
pub use crate::types::{Address, Amount, Balance, ForkId, TxId};
