//! Error types for the sandbox bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sandbox_bridge::{ExecuteOptions, Result, Sandbox};
//!
//! async fn example(sandbox: &Sandbox) -> Result<()> {
//!     let result = sandbox.execute("return 1 + 1", ExecuteOptions::new()).await?;
//!     println!("{result:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::BootTimeout`], [`Error::BootScript`], [`Error::ConnectionClosed`] |
//! | Bridge | [`Error::DispatchDropped`], [`Error::Decode`], [`Error::Transport`] |
//! | Execution | [`Error::SyncExecutionTimeout`], [`Error::AsyncExecutionTimeout`], [`Error::ExecutionAborted`], [`Error::ScriptError`] |
//! | Liveness | [`Error::PingMismatch`] |
//! | External | [`Error::Io`], [`Error::Engine`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::codec::{Object, Value};
use crate::identifiers::ExecutionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when builder or option values are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport could not be created.
    ///
    /// Fatal to the connect attempt.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// No readiness signal within the boot window.
    ///
    /// The transport is destroyed before this is reported.
    #[error("Boot timed out after {timeout_ms}ms")]
    BootTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The bootstrap threw while being injected.
    ///
    /// The message is the sandbox's own error text, unchanged.
    #[error("{message}")]
    BootScript {
        /// Error text raised by the bootstrap.
        message: String,
    },

    /// The bridge went away while an outcome was awaited.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Bridge Errors
    // ========================================================================
    /// Dispatch attempted while disconnected.
    ///
    /// Only ever reported through the generic `error` event.
    #[error("Unable to dispatch \"{event}\" post disconnection")]
    DispatchDropped {
        /// Event name of the dropped dispatch.
        event: String,
    },

    /// A message received from the sandbox could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the malformed input.
        message: String,
    },

    /// The transport failed after the connection was established.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// The engine interrupted a synchronous run that exceeded its budget.
    #[error("Script execution timed out after {timeout_ms}ms")]
    SyncExecutionTimeout {
        /// Configured budget in milliseconds.
        timeout_ms: u64,
    },

    /// The host watchdog fired before the sandbox answered.
    #[error("Sandbox not responding: execution {id} timed out after {timeout_ms}ms")]
    AsyncExecutionTimeout {
        /// The execution that timed out.
        id: ExecutionId,
        /// Execution timeout in milliseconds (without grace).
        timeout_ms: u64,
    },

    /// The execution was still pending when the sandbox was disposed.
    #[error("Execution {id} interrupted, bridge disconnecting")]
    ExecutionAborted {
        /// The aborted execution.
        id: ExecutionId,
    },

    /// The sandbox reported an error for an execution.
    #[error("{name}: {message}")]
    ScriptError {
        /// Error name reported by the sandbox (e.g. `TypeError`).
        name: String,
        /// Error message reported by the sandbox.
        message: String,
    },

    // ========================================================================
    // Liveness Errors
    // ========================================================================
    /// A pong came back carrying a different nonce.
    #[error("Ping packet mismatch: sent {expected}, received {received}")]
    PingMismatch {
        /// Nonce that was sent.
        expected: String,
        /// Nonce that came back.
        received: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Script engine error outside of any script.
    #[error("Engine error: {message}")]
    Engine {
        /// Description of the engine failure.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an engine error.
    #[inline]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Creates a boot timeout error.
    #[inline]
    pub fn boot_timeout(timeout_ms: u64) -> Self {
        Self::BootTimeout { timeout_ms }
    }

    /// Creates a boot script error.
    #[inline]
    pub fn boot_script(message: impl Into<String>) -> Self {
        Self::BootScript {
            message: message.into(),
        }
    }

    /// Creates a dispatch dropped error.
    #[inline]
    pub fn dispatch_dropped(event: impl Into<String>) -> Self {
        Self::DispatchDropped {
            event: event.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a synchronous execution timeout error.
    #[inline]
    pub fn sync_execution_timeout(timeout_ms: u64) -> Self {
        Self::SyncExecutionTimeout { timeout_ms }
    }

    /// Creates an asynchronous execution timeout error.
    #[inline]
    pub fn async_execution_timeout(id: ExecutionId, timeout_ms: u64) -> Self {
        Self::AsyncExecutionTimeout { id, timeout_ms }
    }

    /// Creates an execution aborted error.
    #[inline]
    pub fn execution_aborted(id: ExecutionId) -> Self {
        Self::ExecutionAborted { id }
    }

    /// Creates a script error.
    #[inline]
    pub fn script_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a ping mismatch error.
    #[inline]
    pub fn ping_mismatch(expected: impl Into<String>, received: impl Into<String>) -> Self {
        Self::PingMismatch {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Builds a script error from an error object sent by the sandbox.
    ///
    /// Missing fields fall back to `Error` and the object's string form.
    pub fn from_sandbox_value(value: &Value) -> Self {
        let name = value
            .get("name")
            .and_then(|v| v.as_string())
            .unwrap_or_else(|| "Error".to_string());
        let message = value
            .get("message")
            .and_then(|v| v.as_string())
            .unwrap_or_else(|| value.to_display_string());

        Self::script_error(name, message)
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::BootTimeout { .. }
                | Self::SyncExecutionTimeout { .. }
                | Self::AsyncExecutionTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::BootTimeout { .. }
                | Self::BootScript { .. }
                | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. This crate never retries.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BootTimeout { .. }
                | Self::SyncExecutionTimeout { .. }
                | Self::AsyncExecutionTimeout { .. }
                | Self::DispatchDropped { .. }
        )
    }
}

// ============================================================================
// Event Payloads
// ============================================================================

impl Error {
    /// Returns the taxonomy name of this error.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::InvalidArgument { .. } => "InvalidArgumentError",
            Self::Connection { .. } => "ConnectionError",
            Self::BootTimeout { .. } => "BootTimeoutError",
            Self::BootScript { .. } => "BootScriptError",
            Self::ConnectionClosed => "ConnectionClosedError",
            Self::DispatchDropped { .. } => "DispatchDroppedError",
            Self::Decode { .. } => "DecodeError",
            Self::Transport { .. } => "TransportError",
            Self::SyncExecutionTimeout { .. } => "SyncExecutionTimeoutError",
            Self::AsyncExecutionTimeout { .. } => "AsyncExecutionTimeoutError",
            Self::ExecutionAborted { .. } => "ExecutionAbortedError",
            Self::ScriptError { .. } => "ScriptError",
            Self::PingMismatch { .. } => "PingMismatchError",
            Self::Io(_) => "IoError",
            Self::Engine { .. } => "EngineError",
        }
    }

    /// Converts this error into the `{name, message}` object carried by
    /// `error` and `execution` events.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let object = Object::new();
        let name = match self {
            Self::ScriptError { name, .. } => name.clone(),
            _ => self.name().to_string(),
        };
        let message = match self {
            Self::ScriptError { message, .. } => message.clone(),
            _ => self.to_string(),
        };
        object.insert("name", name);
        object.insert("message", message);
        Value::Object(object)
    }
}

// ============================================================================
// Tests
// ============================================================================
