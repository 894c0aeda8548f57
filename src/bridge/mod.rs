//! Host bridge to a sandbox realm.
//!
//! A [`Bridge`] owns one transport, performs the readiness handshake, queues
//! dispatches made while connecting and fans inbound events out to local
//! listeners.
//!
//! # Example
//!
//! ```no_run
//! use sandbox_bridge::{Bridge, BridgeOptions, Value};
//!
//! # async fn example() -> sandbox_bridge::Result<()> {
//! let bootstrap = "bridge.on('hello', function (n) { bridge.dispatch('hi', n + 1); });";
//! let bridge = Bridge::spawn(BridgeOptions::new(), bootstrap).await?;
//!
//! bridge.on("hi", |args| println!("sandbox said {:?}", args));
//! bridge.dispatch("hello", vec![Value::from(41)]);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | `Bridge` state machine and event loop |
//! | `listeners` | Listener registry |
//! | `options` | `BridgeOptions` |

// ============================================================================
// Submodules
// ============================================================================

/// Bridge state machine and event loop.
pub mod connection;

/// Listener registry.
pub mod listeners;

/// Bridge options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Bridge, BridgeState};
pub use listeners::Listener;
pub use options::{BridgeOptions, DEFAULT_BOOT_TIMEOUT};
