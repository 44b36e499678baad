//! Withdrawal nonces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-chosen identifier correlating a withdrawal request with its later
/// confirmation or expiry. Unique across all live withdrawals.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nonce(String);

impl Nonce {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Nonce {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
