//! Sandbox execution manager.
//!
//! This module runs scripts through a connected bridge and tracks each
//! execution until it settles.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Sandbox`] | Execution manager |
//! | [`SandboxBuilder`] | Fluent configuration builder |
//! | [`ExecuteOptions`] | Per-execution options |
//! | [`ExecutionTarget`] | Script or event to run |
//! | [`BootstrapSource`] | Bootstrap supplier |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sandbox_bridge::{ExecuteOptions, Sandbox, TransportKind};
//!
//! # async fn example() -> sandbox_bridge::Result<()> {
//! let sandbox = Sandbox::builder()
//!     .transport(TransportKind::Worker)
//!     .basic_runner()
//!     .timeout(Duration::from_secs(5))
//!     .build()
//!     .await?;
//!
//! sandbox.bridge().on("console", |args| println!("{:?}", args));
//! sandbox
//!     .execute("console.log('hello');", ExecuteOptions::new())
//!     .await?;
//!
//! sandbox.dispose();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Bootstrap suppliers and the basic runner.
pub mod bootstrap;

/// Fluent builder for sandbox configuration.
pub mod builder;

/// Core execution manager.
pub mod core;

/// Execution targets and options.
pub mod execute;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::{BootstrapCache, BootstrapSource, FileBootstrap, StaticBootstrap};
pub use builder::{DEFAULT_GRACE, SandboxBuilder};
pub use self::core::Sandbox;
pub use execute::{ExecuteOptions, ExecutionTarget};
