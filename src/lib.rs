//! Sandbox Bridge - host bridge to isolated JavaScript realms.
//!
//! This library runs untrusted scripts in a separate QuickJS realm and talks
//! to it only through encoded messages.
//!
//! # Architecture
//!
//! The bridge follows a host/realm model:
//!
//! - **Host (Rust)**: dispatches events, receives events, tracks executions
//! - **Realm (QuickJS)**: runs the bootstrap, which listens on a `bridge`
//!   object and dispatches results back
//!
//! Key design principles:
//!
//! - Every message crossing the boundary is one codec string
//! - The codec preserves shared references and cycles
//! - Host capabilities reach the realm only as closure parameters
//! - Dispatches made while connecting are queued, never dropped
//!
//! # Quick Start
//!
//! ```no_run
//! use sandbox_bridge::{ExecuteOptions, Object, Result, Sandbox};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sandbox = Sandbox::builder().basic_runner().build().await?;
//!
//!     let context = Object::from_iter([("a", 41)]);
//!     let result = sandbox
//!         .execute("return context.a + 1;", ExecuteOptions::new().with_context(context))
//!         .await?;
//!     println!("returned {:?}", result.get("returned"));
//!
//!     sandbox.dispose();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Connection state machine and listeners |
//! | [`codec`] | Cyclic-safe value codec |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Message envelope and event names |
//! | [`sandbox`] | Execution manager |
//! | [`transport`] | Realm backends |
//!
//! # Transports
//!
//! - **In-process**: realm on the calling thread, synchronous timeouts
//! - **Worker**: realm on a dedicated thread
//! - **Frame**: realm on a dedicated thread with its own event loop

// ============================================================================
// Modules
// ============================================================================

/// Host bridge to a sandbox realm.
///
/// Use [`Bridge::spawn()`] to create a connected bridge.
pub mod bridge;

/// Cyclic-safe value codec.
///
/// Encodes [`Value`] graphs, including shared references and cycles, as JSON.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bridge entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Message envelope and protocol event names.
pub mod protocol;

/// Execution manager.
///
/// Use [`Sandbox::builder()`] to create a configured sandbox.
pub mod sandbox;

/// Realm transport layer.
///
/// Internal backends hosting QuickJS realms.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{Bridge, BridgeOptions, BridgeState, Listener};

// Codec types
pub use codec::{Array, Object, Value};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, ExecutionId, ListenerId};

// Sandbox types
pub use sandbox::{
    BootstrapCache, BootstrapSource, ExecuteOptions, ExecutionTarget, FileBootstrap, Sandbox,
    SandboxBuilder, StaticBootstrap,
};

// Transport types
pub use transport::{TimerHost, TransportKind};
