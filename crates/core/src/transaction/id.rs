//! Transaction identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of random hex characters after the prefix.
const RANDOM_LEN: usize = 16;

/// Opaque, generator-assigned transaction id.
///
/// Used verbatim as the ledger idempotency reference and as the gateway
/// payment reference, so it is never regenerated for an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

/// Prefix identifying what produced a transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    /// Direct customer or system request.
    Transfer,
    /// Reversal mirror.
    Reversal,
    /// Bulk batch line item.
    BulkItem,
    /// Standing order occurrence.
    StandingOrder,
    /// Credit received through the switch.
    Inward,
}

impl IdPrefix {
    /// The literal prefix.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "CLT",
            Self::Reversal => "CLR",
            Self::BulkItem => "CLB",
            Self::StandingOrder => "CLS",
            Self::Inward => "CLI",
        }
    }
}

impl TransactionId {
    /// Generates a fresh id: prefix followed by 16 upper-case hex characters.
    #[must_use]
    pub fn generate(prefix: IdPrefix) -> Self {
        let random = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("{}{}", prefix.as_str(), &random[..RANDOM_LEN]))
    }

    /// Wraps an id read back from storage or received from a caller.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
