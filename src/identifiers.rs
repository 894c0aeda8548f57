//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers keep execution ids, listener ids and connection ids
//! from being mixed up at compile time.
//!
//! | Type | Backing | Scope |
//! |------|---------|-------|
//! | [`ExecutionId`] | string (caller-supplied or UUID v4) | one execution |
//! | [`ListenerId`] | process-wide counter | one registered listener |
//! | [`ConnectionId`] | UUID v4 | one boot handshake |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::events::READY_BASE;

// ============================================================================
// ExecutionId
// ============================================================================

/// Identifier of one logical execution.
///
/// Callers may supply their own (any string); otherwise a UUID v4 is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generates a fresh random execution id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the scoped event name `<base><id>`.
    #[inline]
    #[must_use]
    pub fn scoped(&self, base: &str) -> String {
        format!("{base}{}", self.0)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Counter shared by all bridges so ids never repeat within a process.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering an event listener.
///
/// Pass it to `Bridge::off` to remove exactly that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener id.
    #[inline]
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Random identifier correlating one boot handshake.
///
/// The sandbox signals readiness with the event `load.<id>`; a signal carrying
/// any other id is not a readiness signal for this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh connection id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the readiness event name for this connection.
    #[inline]
    #[must_use]
    pub fn ready_event(&self) -> String {
        format!("{READY_BASE}{}", self.0)
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
