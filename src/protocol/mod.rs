//! Bridge protocol message types.
//!
//! This module defines the messages exchanged between the host (Rust) and
//! the sandbox realm.
//!
//! # Protocol Overview
//!
//! Every message is a named event with positional arguments, encoded as one
//! value graph `[event, ...args]` with the crate codec.
//!
//! | Event | Direction | Arguments |
//! |-------|-----------|-----------|
//! | `load.<connection>` | Sandbox → Host | none (readiness) |
//! | `ping` | Host → Sandbox | nonce packet |
//! | `pong` | Sandbox → Host | echoed packet |
//! | `execute` | Host → Sandbox | id, target, context, settings |
//! | `execution.result.<id>` | Sandbox → Host | error or null, result |
//! | `execution.abort.<id>` | Host → Sandbox | none |
//! | `execution.console.<id>` | Sandbox → Host | cursor, level, args |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `events` | Event name constants |
//! | `message` | The `Message` envelope |

// ============================================================================
// Submodules
// ============================================================================

/// Event name constants.
pub mod events;

/// Message envelope.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::Message;
