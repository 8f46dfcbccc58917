// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coin amount as carried on the wire.
pub type Amount = f64;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Ledger account or template address.
    Address
}

string_id! {
    /// Transaction id returned by a submit call.
    TxId
}

string_id! {
    /// Fork/chain selector.
    ForkId
}

/// Balance entry as reported by the node; `locked` funds are received but
/// not yet confirmed final and cannot be spent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(rename = "avail")]
    pub available: Amount,
    pub locked: Amount,
}

impl Balance {
    pub fn new(available: Amount, locked: Amount) -> Self {
        Self { available, locked }
    }

    pub fn total(&self) -> Amount {
        self.available + self.locked
    }
}
