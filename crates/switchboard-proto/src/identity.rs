//! Connection identities and room tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, server-assigned connection identity.
///
/// Generated by the hub at connection time and never reused. Clients only ever
/// echo identities back (as route targets or room partners); the hub never
/// trusts a client to choose its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Render 128 random bits as an identity (32 lowercase hex characters).
    pub fn from_random(bits: u128) -> Self {
        Self(format!("{bits:032x}"))
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Canonical token naming a two-party room.
///
/// Derived from both participants' identities, independent of order, so either
/// side recomputing it gets the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Room shared by `a` and `b`.
    ///
    /// # Invariants
    ///
    /// - `RoomId::between(a, b) == RoomId::between(b, a)`
    pub fn between(a: &Identity, b: &Identity) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}:{hi}"))
    }

    /// Room id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
