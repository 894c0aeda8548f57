//! Bridge connection options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sandbox_bridge::{BridgeOptions, TransportKind};
//!
//! let options = BridgeOptions::new()
//!     .with_transport(TransportKind::Worker)
//!     .with_boot_timeout(Duration::from_secs(5))
//!     .with_debug();
//!
//! assert_eq!(options.transport, TransportKind::Worker);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

// ============================================================================
// Constants
// ============================================================================

/// Default boot window.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// BridgeOptions
// ============================================================================

/// Configuration for one bridge connection.
///
/// Durations serialize as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Which realm backend to create.
    pub transport: TransportKind,

    /// Time allowed between connect and the readiness signal.
    #[serde(with = "millis")]
    pub boot_timeout: Duration,

    /// Budget for each synchronous delivery into an in-process realm.
    ///
    /// `None` disables the budget. Other transports ignore it.
    #[serde(with = "millis::option")]
    pub dispatch_timeout: Option<Duration>,

    /// Install a console inside the realm that logs to the host.
    pub debug: bool,

    /// Heap limit of the realm in bytes.
    pub memory_limit: Option<usize>,

    /// Stack limit of the realm in bytes.
    pub max_stack_size: Option<usize>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transport: TransportKind::InProcess,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            dispatch_timeout: None,
            debug: false,
            memory_limit: None,
            max_stack_size: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Sets the realm backend.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the boot window.
    #[inline]
    #[must_use]
    pub fn with_boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = timeout;
        self
    }

    /// Sets the synchronous delivery budget.
    #[inline]
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Enables the realm console.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Sets the realm heap limit in bytes.
    #[inline]
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Sets the realm stack limit in bytes.
    #[inline]
    #[must_use]
    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Serializes a duration as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
