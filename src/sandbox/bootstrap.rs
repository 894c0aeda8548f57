//! Bootstrap sources.
//!
//! The bootstrap is the script a realm runs on connect; it receives the
//! `bridge` object and wires the sandbox protocol onto it. Bootstraps may be
//! large, so sources are async and a [`BootstrapCache`] can keep one loaded.
//!
//! | Source | Loads from |
//! |--------|------------|
//! | [`StaticBootstrap`] | an in-memory string |
//! | [`FileBootstrap`] | a file, via `tokio::fs` |
//! | [`BootstrapCache`] | another source, once |
//!
//! [`StaticBootstrap::basic_runner`] provides a minimal runner that speaks
//! the sandbox protocol (`ping`, `execute`, `execution.abort.<id>`).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// BootstrapSource
// ============================================================================

/// Supplier of bootstrap code.
#[async_trait]
pub trait BootstrapSource: Send + Sync {
    /// Loads the bootstrap code.
    ///
    /// # Errors
    ///
    /// Source-specific; an empty result is reported by the caller.
    async fn load(&self) -> Result<Arc<str>>;
}

// ============================================================================
// StaticBootstrap
// ============================================================================

/// Bootstrap held in memory.
#[derive(Clone)]
pub struct StaticBootstrap(Arc<str>);

impl StaticBootstrap {
    /// Wraps bootstrap code.
    #[must_use]
    pub fn new(code: impl Into<Arc<str>>) -> Self {
        Self(code.into())
    }

    /// The built-in basic runner.
    #[must_use]
    pub fn basic_runner() -> Self {
        Self::new(BASIC_RUNNER)
    }

    /// Returns the code.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StaticBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticBootstrap")
            .field("len", &self.0.len())
            .finish()
    }
}

#[async_trait]
impl BootstrapSource for StaticBootstrap {
    async fn load(&self) -> Result<Arc<str>> {
        Ok(Arc::clone(&self.0))
    }
}

// ============================================================================
// FileBootstrap
// ============================================================================

/// Bootstrap read from a file on every load.
#[derive(Debug, Clone)]
pub struct FileBootstrap {
    path: PathBuf,
}

impl FileBootstrap {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BootstrapSource for FileBootstrap {
    async fn load(&self) -> Result<Arc<str>> {
        let code = tokio::fs::read_to_string(&self.path).await?;
        debug!(path = %self.path.display(), bytes = code.len(), "Bootstrap loaded");
        Ok(Arc::from(code))
    }
}

// ============================================================================
// BootstrapCache
// ============================================================================

/// Loads a bootstrap once and hands out the same code afterwards.
///
/// Concurrent first loads wait for a single load. Empty code is never
/// cached.
pub struct BootstrapCache<S> {
    source: S,
    cached: Mutex<Option<Arc<str>>>,
}

impl<S: BootstrapSource> BootstrapCache<S> {
    /// Creates an empty cache over `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached code, loading it on first use.
    ///
    /// # Errors
    ///
    /// Any error from the underlying source.
    pub async fn get(&self) -> Result<Arc<str>> {
        let mut cached = self.cached.lock().await;
        if let Some(code) = cached.as_ref() {
            return Ok(Arc::clone(code));
        }

        let code = self.source.load().await?;
        if !code.is_empty() {
            *cached = Some(Arc::clone(&code));
        }
        Ok(code)
    }

    /// Drops the cached code so the next load hits the source.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    /// Returns `true` if code is cached.
    pub async fn is_cached(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

#[async_trait]
impl<S: BootstrapSource> BootstrapSource for BootstrapCache<S> {
    async fn load(&self) -> Result<Arc<str>> {
        self.get().await
    }
}

/// Loads a bootstrap and rejects empty code.
pub(crate) async fn load_checked(source: &dyn BootstrapSource) -> Result<Arc<str>> {
    let code = source.load().await?;
    if code.trim().is_empty() {
        return Err(Error::config("sandbox: bootcode missing"));
    }
    Ok(code)
}

// ============================================================================
// Basic Runner
// ============================================================================

/// Minimal bootstrap implementing the sandbox protocol.
///
/// - `ping (packet)` answers `pong (packet)`
/// - `execute (id, target, context, settings)` runs `target.script.exec`
///   (a string or list of lines) as a function body with `context` and a
///   forwarding `console` in scope, awaits a returned thenable, and answers
///   `execution.result.<id> (error, {context, returned})`
/// - `execution.abort.<id>` marks the execution settled
const BASIC_RUNNER: &str = r#"
var levels = ['log', 'info', 'warn', 'error', 'debug'],
    slice = Array.prototype.slice;

var serializeError = function (error) {
    if (error && typeof error === 'object') {
        return { name: String(error.name || 'Error'), message: String(error.message || '') };
    }
    return { name: 'Error', message: String(error) };
};

bridge.on('ping', function (packet) {
    bridge.dispatch('pong', packet);
});

bridge.on('execute', function (id, target, context, options) {
    if (!(id && typeof id === 'string')) {
        bridge.dispatch('error', { name: 'Error', message: 'sandbox: execution identifier parameter(s) missing' });
        return;
    }

    options = options || {};
    context = context || {};

    var resultEvent = 'execution.result.' + id,
        consoleEvent = 'execution.console.' + id,
        abortEvent = 'execution.abort.' + id,
        cursor = options.cursor || {},
        script = target && target.script,
        code = script && script.exec,
        settled = false,
        returned,
        sandboxConsole = {};

    var done = function (error, value) {
        if (settled) {
            return;
        }
        settled = true;
        bridge.off(abortEvent);
        if (error) {
            bridge.dispatch(resultEvent, serializeError(error));
        }
        else {
            bridge.dispatch(resultEvent, null, { context: context, returned: value });
        }
    };

    bridge.on(abortEvent, function () {
        settled = true;
        bridge.off(abortEvent);
    });

    levels.forEach(function (level) {
        sandboxConsole[level] = function () {
            bridge.dispatch(consoleEvent, cursor, level, slice.call(arguments));
        };
    });

    if (Array.isArray(code)) {
        code = code.join('\n');
    }

    if (typeof code !== 'string') {
        done(new TypeError('sandbox: nothing to execute'));
        return;
    }

    try {
        returned = (new Function('context', 'console', code)).call(undefined, context, sandboxConsole);
    }
    catch (error) {
        done(error);
        return;
    }

    if (returned && typeof returned.then === 'function') {
        returned.then(function (value) { done(null, value); }, function (error) { done(error || new Error('rejected')); });
    }
    else {
        done(null, returned);
    }
});
"#;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        loads: AtomicUsize,
        code: &'static str,
    }

    #[async_trait]
    impl BootstrapSource for Counting {
        async fn load(&self) -> Result<Arc<str>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::from(self.code))
        }
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticBootstrap::new("bridge;");
        assert_eq!(&*source.load().await.expect("load"), "bridge;");
    }

    #[tokio::test]
    async fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "bridge.on('x', function () {{}});").expect("write");

        let source = FileBootstrap::new(file.path());
        let code = source.load().await.expect("load");
        assert_eq!(&*code, "bridge.on('x', function () {});");
    }

    #[tokio::test]
    async fn test_file_source_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = FileBootstrap::new(dir.path().join("missing.js"));
        assert!(matches!(source.load().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_cache_loads_once() {
        let cache = BootstrapCache::new(Counting {
            loads: AtomicUsize::new(0),
            code: "x",
        });
        assert!(!cache.is_cached().await);

        cache.get().await.expect("first");
        cache.get().await.expect("second");
        assert!(cache.is_cached().await);
        assert_eq!(cache.source.loads.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert!(!cache.is_cached().await);
        cache.get().await.expect("third");
        assert_eq!(cache.source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_skips_empty() {
        let cache = BootstrapCache::new(Counting {
            loads: AtomicUsize::new(0),
            code: "",
        });
        cache.get().await.expect("load");
        assert!(!cache.is_cached().await);
    }

    #[tokio::test]
    async fn test_empty_bootstrap_rejected() {
        let err = load_checked(&StaticBootstrap::new("  \n"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        tokio_test::assert_ok!(load_checked(&StaticBootstrap::basic_runner()).await);
    }
}
