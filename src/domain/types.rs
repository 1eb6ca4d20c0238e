use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Rowid of a visit event in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pseudonymous visitor identifier: hex-encoded SHA-256 of the client IP
/// and user agent. Deterministic across calls and restarts; no salt, no
/// time input. Digest collisions count as identity equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(pub String);

impl VisitorId {
    /// Domain separator between the two inputs so that
    /// ("ab", "c") and ("a", "bc") hash differently.
    const SEPARATOR: &'static [u8] = b"\x1f";

    pub fn derive(client_ip: &str, user_agent: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(client_ip.as_bytes());
        hasher.update(Self::SEPARATOR);
        hasher.update(user_agent.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VisitorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
