//! Builder pattern for sandbox configuration.
//!
//! Provides a fluent API for configuring and creating [`Sandbox`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sandbox_bridge::{Sandbox, TransportKind};
//!
//! # async fn example() -> sandbox_bridge::Result<()> {
//! let sandbox = Sandbox::builder()
//!     .transport(TransportKind::Worker)
//!     .bootstrap_file("./bootcode.js")
//!     .timeout(Duration::from_secs(10))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};
use crate::transport::TransportKind;

use super::bootstrap::{BootstrapSource, FileBootstrap, StaticBootstrap, load_checked};
use super::core::{Sandbox, SandboxSettings};

// ============================================================================
// Constants
// ============================================================================

/// Default time a watchdog waits past the execution timeout.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// SandboxBuilder
// ============================================================================

/// Builder for configuring a [`Sandbox`] instance.
///
/// Use [`Sandbox::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SandboxBuilder {
    /// Bridge configuration.
    options: BridgeOptions,
    /// Default execution timeout.
    timeout: Option<Duration>,
    /// Watchdog grace past the timeout.
    grace: Duration,
    /// Bootstrap supplier.
    bootstrap: Option<Arc<dyn BootstrapSource>>,
}

impl Default for SandboxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SandboxBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxBuilder")
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("grace", &self.grace)
            .field("bootstrap", &self.bootstrap.is_some())
            .finish()
    }
}

// ============================================================================
// SandboxBuilder Implementation
// ============================================================================

impl SandboxBuilder {
    /// Creates a new sandbox builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: BridgeOptions::new(),
            timeout: None,
            grace: DEFAULT_GRACE,
            bootstrap: None,
        }
    }

    /// Replaces the whole bridge configuration.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the realm backend.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.options.transport = transport;
        self
    }

    /// Sets the boot window.
    #[inline]
    #[must_use]
    pub fn boot_timeout(mut self, timeout: Duration) -> Self {
        self.options.boot_timeout = timeout;
        self
    }

    /// Sets the synchronous delivery budget of the in-process backend.
    ///
    /// Defaults to the execution timeout when that is set.
    #[inline]
    #[must_use]
    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.options.dispatch_timeout = Some(timeout);
        self
    }

    /// Sets the default execution timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how long a watchdog waits past the execution timeout.
    #[inline]
    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Enables debug mode for the realm and every execution.
    #[inline]
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Sets the realm heap limit in bytes.
    #[inline]
    #[must_use]
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.options.memory_limit = Some(bytes);
        self
    }

    /// Sets the realm stack limit in bytes.
    #[inline]
    #[must_use]
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.options.max_stack_size = Some(bytes);
        self
    }

    /// Sets the bootstrap from source code.
    #[inline]
    #[must_use]
    pub fn bootstrap(mut self, code: impl Into<Arc<str>>) -> Self {
        self.bootstrap = Some(Arc::new(StaticBootstrap::new(code)));
        self
    }

    /// Reads the bootstrap from a file at build time.
    #[inline]
    #[must_use]
    pub fn bootstrap_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap = Some(Arc::new(FileBootstrap::new(path)));
        self
    }

    /// Sets the bootstrap supplier directly.
    #[inline]
    #[must_use]
    pub fn bootstrap_source(mut self, source: impl BootstrapSource + 'static) -> Self {
        self.bootstrap = Some(Arc::new(source));
        self
    }

    /// Uses the built-in basic runner as bootstrap.
    #[inline]
    #[must_use]
    pub fn basic_runner(self) -> Self {
        self.bootstrap_source(StaticBootstrap::basic_runner())
    }

    /// Loads the bootstrap, connects and pings the sandbox.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no bootstrap is set, it is empty, or the boot
    ///   window is zero
    /// - any error the bootstrap source, connect or ping resolves with
    pub async fn build(self) -> Result<Sandbox> {
        let source = self.validate_bootstrap()?;
        self.validate_timeouts()?;

        let code = load_checked(source.as_ref()).await?;

        let mut options = self.options;
        if options.dispatch_timeout.is_none() {
            options.dispatch_timeout = self.timeout;
        }
        let settings = SandboxSettings {
            default_timeout: self.timeout,
            grace: self.grace,
            debug: options.debug,
        };

        Sandbox::connect(options, settings, &code).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SandboxBuilder {
    /// Validates the bootstrap configuration.
    fn validate_bootstrap(&self) -> Result<Arc<dyn BootstrapSource>> {
        self.bootstrap.clone().ok_or_else(|| {
            Error::config(
                "sandbox: bootcode missing. Use .bootstrap() or .bootstrap_file() to set it.\n\
                 Example: Sandbox::builder().bootstrap_file(\"./bootcode.js\")",
            )
        })
    }

    /// Validates timeouts.
    fn validate_timeouts(&self) -> Result<()> {
        if self.options.boot_timeout.is_zero() {
            return Err(Error::config(
                "Boot timeout must be greater than zero.\n\
                 Example: Sandbox::builder().boot_timeout(Duration::from_secs(30))",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default_builder() {
        let builder = SandboxBuilder::new();
        assert!(builder.bootstrap.is_none());
        assert!(builder.timeout.is_none());
        assert_eq!(builder.grace, DEFAULT_GRACE);
        assert_eq!(builder.options, BridgeOptions::new());
    }

    #[test]
    fn test_setters() {
        let builder = SandboxBuilder::new()
            .transport(TransportKind::Frame)
            .boot_timeout(Duration::from_secs(2))
            .timeout(Duration::from_millis(300))
            .grace(Duration::from_millis(50))
            .debug(true)
            .memory_limit(1 << 24);

        assert_eq!(builder.options.transport, TransportKind::Frame);
        assert_eq!(builder.options.boot_timeout, Duration::from_secs(2));
        assert_eq!(builder.timeout, Some(Duration::from_millis(300)));
        assert_eq!(builder.grace, Duration::from_millis(50));
        assert!(builder.options.debug);
        assert_eq!(builder.options.memory_limit, Some(1 << 24));
    }

    #[tokio::test]
    async fn test_build_fails_without_bootstrap() {
        let err = SandboxBuilder::new().build().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("bootcode missing"));
    }

    #[tokio::test]
    async fn test_build_fails_with_empty_bootstrap() {
        let err = SandboxBuilder::new().bootstrap("").build().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_fails_with_zero_boot_timeout() {
        let err = SandboxBuilder::new()
            .basic_runner()
            .boot_timeout(Duration::ZERO)
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Boot timeout"));
    }

    #[tokio::test]
    async fn test_build_fails_with_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = SandboxBuilder::new()
            .bootstrap_file(dir.path().join("absent.js"))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_build_connects() {
        let sandbox = SandboxBuilder::new()
            .basic_runner()
            .build()
            .await
            .expect("sandbox");
        assert!(sandbox.bridge().is_connected());
        sandbox.dispose();
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = SandboxBuilder::new().timeout(Duration::from_secs(1));
        let cloned = builder.clone();
        assert_eq!(builder.timeout, cloned.timeout);
    }
}
