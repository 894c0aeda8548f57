//! Sandbox execution manager.
//!
//! The [`Sandbox`] struct drives executions over a connected [`Bridge`]. It
//! correlates each execution with its scoped result event and settles it
//! exactly once: with the sandbox's result, a timeout, a delivery failure or
//! an abort at dispose.
//!
//! # Example
//!
//! ```no_run
//! use sandbox_bridge::{ExecuteOptions, Sandbox};
//!
//! # async fn example() -> sandbox_bridge::Result<()> {
//! let sandbox = Sandbox::builder().basic_runner().build().await?;
//!
//! let result = sandbox
//!     .execute("return 6 * 7;", ExecuteOptions::new())
//!     .await?;
//! println!("returned {:?}", result.get("returned"));
//!
//! sandbox.dispose();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::bridge::{Bridge, BridgeOptions};
use crate::codec::{self, Object, Value};
use crate::error::{Error, Result};
use crate::identifiers::{ExecutionId, ListenerId};
use crate::protocol::events;

use super::builder::SandboxBuilder;
use super::execute::{ExecuteOptions, ExecutionTarget, execution_cursor, execution_settings, spread};

// ============================================================================
// Constants
// ============================================================================

/// Delivery budget for pings and aborts when no dispatch timeout is set.
const CONTROL_BUDGET: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

/// Sandbox-wide execution defaults.
#[derive(Debug, Clone)]
pub(crate) struct SandboxSettings {
    /// Timeout for executions that do not set one.
    pub default_timeout: Option<Duration>,

    /// Extra time a watchdog waits past the timeout.
    pub grace: Duration,

    /// Debug flag for executions that do not set one.
    pub debug: bool,
}

/// Bookkeeping for one unsettled execution.
struct PendingExecution {
    tx: oneshot::Sender<Result<Value>>,
    watchdog: Option<JoinHandle<()>>,
    listeners: Vec<(String, ListenerId)>,
}

/// Internal shared state for the sandbox.
pub(crate) struct SandboxInner {
    bridge: Bridge,
    settings: SandboxSettings,
    executing: Mutex<FxHashMap<ExecutionId, PendingExecution>>,
}

// ============================================================================
// Sandbox
// ============================================================================

/// Execution manager on top of a connected bridge.
///
/// Cheap to clone; all clones share the same bridge and pending executions.
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<SandboxInner>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("bridge", &self.inner.bridge)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sandbox - Constructors
// ============================================================================

impl Sandbox {
    /// Creates a configuration builder for the sandbox.
    #[inline]
    #[must_use]
    pub fn builder() -> SandboxBuilder {
        SandboxBuilder::new()
    }

    /// Creates a sandbox with default settings running `bootstrap`.
    ///
    /// # Errors
    ///
    /// Any error [`SandboxBuilder::build`] resolves with.
    pub async fn create(bootstrap: impl Into<Arc<str>>) -> Result<Self> {
        Self::builder().bootstrap(bootstrap).build().await
    }

    /// Connects a bridge and pings it before handing the sandbox out.
    ///
    /// The ping shares the boot window.
    pub(crate) async fn connect(
        options: BridgeOptions,
        settings: SandboxSettings,
        bootstrap: &str,
    ) -> Result<Self> {
        let boot_timeout = options.boot_timeout;
        let bridge = Bridge::new(options);
        bridge.connect(bootstrap).await?;

        let sandbox = Self {
            inner: Arc::new(SandboxInner {
                bridge,
                settings,
                executing: Mutex::new(FxHashMap::default()),
            }),
        };

        let ping = sandbox.ping_within(boot_timeout);
        let checked = match tokio::time::timeout(boot_timeout, ping).await {
            Ok(Err(Error::SyncExecutionTimeout { .. })) | Err(_) => {
                Err(Error::boot_timeout(boot_timeout.as_millis() as u64))
            }
            Ok(outcome) => outcome,
        };
        match checked {
            Ok(latency) => {
                info!(
                    transport = %sandbox.inner.bridge.options().transport,
                    latency_us = latency.as_micros() as u64,
                    "Sandbox ready"
                );
                Ok(sandbox)
            }
            Err(e) => {
                sandbox.dispose();
                Err(e)
            }
        }
    }
}

// ============================================================================
// Sandbox - Public API
// ============================================================================

impl Sandbox {
    /// Runs `target` in the sandbox and waits for it to settle.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if an execution with the same id is pending
    /// - [`Error::ScriptError`] if the sandbox reports an error
    /// - [`Error::SyncExecutionTimeout`] if an in-process realm is interrupted
    /// - [`Error::AsyncExecutionTimeout`] if the watchdog fires first
    /// - [`Error::ExecutionAborted`] if the sandbox is disposed meanwhile
    /// - [`Error::DispatchDropped`] or [`Error::Transport`] if delivery fails
    pub async fn execute(
        &self,
        target: impl Into<ExecutionTarget>,
        options: ExecuteOptions,
    ) -> Result<Value> {
        let rx = self.inner.start(target.into(), options)?;
        rx.await.unwrap_or(Err(Error::ConnectionClosed))
    }

    /// Measures a round trip to the sandbox.
    ///
    /// Delivery runs under the dispatch timeout, or a short fixed budget
    /// when none is set.
    ///
    /// # Errors
    ///
    /// - [`Error::PingMismatch`] if the pong carries another nonce
    /// - [`Error::ConnectionClosed`] if the bridge disconnects first
    /// - [`Error::SyncExecutionTimeout`] if an in-process handler overruns
    /// - [`Error::DispatchDropped`] or [`Error::Transport`] if delivery fails
    pub async fn ping(&self) -> Result<Duration> {
        self.ping_within(self.inner.control_budget()).await
    }

    async fn ping_within(&self, budget: Duration) -> Result<Duration> {
        let bridge = &self.inner.bridge;
        let nonce = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let listener = bridge.once(events::PONG, move |args| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(args.first().cloned().unwrap_or_default());
            }
        });

        let packet = Object::new();
        packet.insert("nonce", nonce.as_str());
        packet.insert("timestamp", epoch_millis());

        let started = Instant::now();
        let args = vec![Value::Object(packet)];
        if let Err(e) = bridge.try_dispatch(events::PING, args, Some(budget)) {
            bridge.off(events::PONG, Some(listener));
            return Err(e);
        }

        let pong = rx.await.map_err(|_| Error::ConnectionClosed)?;
        let elapsed = started.elapsed();

        let received = pong
            .get("nonce")
            .and_then(|v| v.as_string())
            .unwrap_or_else(|| "undefined".to_string());
        if received != nonce {
            return Err(Error::ping_mismatch(nonce, received));
        }

        trace!(latency_us = elapsed.as_micros() as u64, "Pong");
        Ok(elapsed)
    }

    /// Aborts every pending execution and disconnects.
    ///
    /// Each pending execution is told to abort and settles with
    /// [`Error::ExecutionAborted`] before this returns. Abort deliveries
    /// share the ping budget. Idempotent.
    pub fn dispose(&self) {
        let ids: Vec<ExecutionId> = self.inner.executing.lock().keys().cloned().collect();
        let budget = self.inner.control_budget();

        for id in &ids {
            let watchdog = self
                .inner
                .executing
                .lock()
                .get_mut(id)
                .and_then(|pending| pending.watchdog.take());
            if let Some(watchdog) = watchdog {
                watchdog.abort();
            }

            let abort_event = id.scoped(events::EXECUTION_ABORT_BASE);
            let delivered = self
                .inner
                .bridge
                .try_dispatch(&abort_event, Vec::new(), Some(budget));
            if let Err(e) = delivered {
                trace!(execution = %id, error = %e, "Abort not delivered");
            }

            self.inner.settle(id, Err(Error::execution_aborted(id.clone())));
        }

        self.inner.bridge.disconnect();
        debug!(aborted = ids.len(), "Sandbox disposed");
    }

    /// Returns the number of unsettled executions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.executing.lock().len()
    }

    /// Returns the underlying bridge.
    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }
}

// ============================================================================
// SandboxInner
// ============================================================================

impl SandboxInner {
    fn control_budget(&self) -> Duration {
        self.bridge.options().dispatch_timeout.unwrap_or(CONTROL_BUDGET)
    }

    /// Registers an execution and dispatches it.
    ///
    /// Delivery failures settle the execution before this returns.
    fn start(
        self: &Arc<Self>,
        target: ExecutionTarget,
        options: ExecuteOptions,
    ) -> Result<oneshot::Receiver<Result<Value>>> {
        let id = options.id.unwrap_or_else(ExecutionId::generate);
        let timeout = options.timeout.or(self.settings.default_timeout);
        let debug = options.debug.unwrap_or(self.settings.debug);
        let (tx, rx) = oneshot::channel();

        {
            let mut executing = self.executing.lock();
            if executing.contains_key(&id) {
                return Err(Error::invalid_argument(format!(
                    "execution {id} is already pending"
                )));
            }
            executing.insert(
                id.clone(),
                PendingExecution {
                    tx,
                    watchdog: None,
                    listeners: Vec::new(),
                },
            );
        }

        let weak = Arc::downgrade(self);
        let listeners = self.listen(&id, &weak, options.serialize_logs);
        let watchdog = timeout.map(|timeout| self.arm_watchdog(&id, weak, timeout));

        let mut watchdog = watchdog;
        let registered = match self.executing.lock().get_mut(&id) {
            Some(pending) => {
                pending.listeners = listeners.clone();
                pending.watchdog = watchdog.take();
                true
            }
            None => false,
        };
        // Settled by a concurrent dispose while registering.
        if !registered {
            if let Some(watchdog) = watchdog {
                watchdog.abort();
            }
            for (event, listener) in &listeners {
                self.bridge.off(event, Some(*listener));
            }
            return Ok(rx);
        }

        let cursor = execution_cursor(options.cursor.as_ref(), &id);
        let context = options
            .context
            .unwrap_or_else(|| Value::Object(Object::new()));
        let settings = execution_settings(cursor, debug, timeout, options.legacy);
        let budget = timeout.or(self.bridge.options().dispatch_timeout);

        debug!(execution = %id, ?timeout, "Executing");

        let args = vec![Value::from(id.as_str()), target.into_value(), context, settings];
        if let Err(e) = self.bridge.try_dispatch(events::EXECUTE, args, budget) {
            debug!(execution = %id, error = %e, "Execute dispatch failed");
            self.settle(&id, Err(e));
        }

        Ok(rx)
    }

    /// Subscribes to the scoped result and console events of `id`.
    fn listen(
        &self,
        id: &ExecutionId,
        weak: &Weak<Self>,
        serialize_logs: bool,
    ) -> Vec<(String, ListenerId)> {
        let result_event = id.scoped(events::EXECUTION_RESULT_BASE);
        let console_event = id.scoped(events::EXECUTION_CONSOLE_BASE);

        let on_result = {
            let weak = weak.clone();
            let id = id.clone();
            self.bridge.once(&result_event, move |args| {
                if let Some(inner) = weak.upgrade() {
                    inner.settle(&id, outcome_from_args(args));
                }
            })
        };

        let on_console = {
            let weak = weak.clone();
            self.bridge.on(&console_event, move |args| {
                if let Some(inner) = weak.upgrade() {
                    inner.forward_console(args, serialize_logs);
                }
            })
        };

        vec![(result_event, on_result), (console_event, on_console)]
    }

    /// Spawns the watchdog that times `id` out after `timeout` plus grace.
    fn arm_watchdog(&self, id: &ExecutionId, weak: Weak<Self>, timeout: Duration) -> JoinHandle<()> {
        let id = id.clone();
        let deadline = timeout + self.settings.grace;

        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let timeout_ms = timeout.as_millis() as u64;
            if inner.settle(&id, Err(Error::async_execution_timeout(id.clone(), timeout_ms))) {
                warn!(execution = %id, timeout_ms, "Execution timed out");
            }
        })
    }

    /// Settles `id` once; later calls for the same id are ignored.
    ///
    /// Returns `true` if this call settled it.
    fn settle(&self, id: &ExecutionId, outcome: Result<Value>) -> bool {
        let Some(pending) = self.executing.lock().remove(id) else {
            trace!(execution = %id, "Already settled");
            return false;
        };

        if let Some(watchdog) = pending.watchdog {
            watchdog.abort();
        }
        for (event, listener) in &pending.listeners {
            self.bridge.off(event, Some(*listener));
        }

        let (err, result) = match &outcome {
            Ok(value) => (Value::Null, value.clone()),
            Err(e) => (e.to_value(), Value::Undefined),
        };
        self.bridge
            .emit(events::EXECUTION, &[err, Value::from(id.as_str()), result]);

        trace!(execution = %id, ok = outcome.is_ok(), "Execution settled");
        let _ = pending.tx.send(outcome);
        true
    }

    /// Re-emits `execution.console.<id> (cursor, level, args)` as
    /// `console (cursor, level, ...args)`, or as `console (cursor, level,
    /// encoded)` with the list kept in wire form when logs are serialized.
    fn forward_console(&self, args: &[Value], serialize_logs: bool) {
        let mut forwarded = Vec::with_capacity(args.len() + 2);
        forwarded.push(args.first().cloned().unwrap_or_default());
        forwarded.push(args.get(1).cloned().unwrap_or_default());
        if serialize_logs {
            let list = args.get(2).cloned().unwrap_or_default();
            forwarded.push(Value::from(codec::encode(&list)));
        } else {
            forwarded.extend(spread(args.get(2)));
        }
        self.bridge.emit(events::CONSOLE, &forwarded);
    }
}

impl Drop for SandboxInner {
    fn drop(&mut self) {
        for pending in self.executing.get_mut().values_mut() {
            if let Some(watchdog) = pending.watchdog.take() {
                watchdog.abort();
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Maps `execution.result.<id> (error, result)` to an outcome.
fn outcome_from_args(args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(error) if !error.is_nullish() => Err(Error::from_sandbox_value(error)),
        _ => Ok(args.get(1).cloned().unwrap_or_default()),
    }
}

fn epoch_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_millis() as f64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use crate::transport::TransportKind;

    const NEVER_SETTLES: &str = "return new Promise(function () {});";

    fn all_kinds() -> [TransportKind; 3] {
        [TransportKind::InProcess, TransportKind::Worker, TransportKind::Frame]
    }

    async fn sandbox(kind: TransportKind) -> Sandbox {
        Sandbox::builder()
            .transport(kind)
            .basic_runner()
            .build()
            .await
            .expect("sandbox")
    }

    async fn wait_pending(sandbox: &Sandbox, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while sandbox.pending_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pending count reached");
    }

    #[tokio::test]
    async fn test_execute_returns_value() {
        for kind in all_kinds() {
            let sandbox = sandbox(kind).await;
            let result = sandbox
                .execute("return 1 + 1;", ExecuteOptions::new())
                .await
                .expect("result");
            assert_eq!(result.get("returned"), Some(Value::Number(2.0)), "{kind}");
            assert_eq!(sandbox.pending_count(), 0);
            sandbox.dispose();
        }
    }

    #[tokio::test]
    async fn test_execute_context_round_trip() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        let context = Object::new();
        context.insert("count", 1);

        let result = sandbox
            .execute(
                "context.count += 1; return context.count;",
                ExecuteOptions::new().with_context(context),
            )
            .await
            .expect("result");
        let echoed = result.get("context").expect("context");
        assert_eq!(echoed.get("count"), Some(Value::Number(2.0)));
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_execute_awaits_promise() {
        for kind in all_kinds() {
            let sandbox = sandbox(kind).await;
            let result = sandbox
                .execute(
                    "return new Promise(function (resolve) { setTimeout(function () { resolve('late'); }, 10); });",
                    ExecuteOptions::new(),
                )
                .await
                .expect("result");
            assert_eq!(result.get("returned"), Some(Value::from("late")), "{kind}");
            sandbox.dispose();
        }
    }

    #[tokio::test]
    async fn test_script_error() {
        let sandbox = sandbox(TransportKind::Worker).await;
        let err = sandbox
            .execute("throw new TypeError('bad input');", ExecuteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScriptError { .. }));
        assert_eq!(err.to_string(), "TypeError: bad input");
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_sync_timeout_in_process() {
        let sandbox = Sandbox::builder()
            .basic_runner()
            .timeout(Duration::from_millis(50))
            .build()
            .await
            .expect("sandbox");

        let err = sandbox
            .execute("while (true) {}", ExecuteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SyncExecutionTimeout { .. }), "{err}");
        assert_eq!(sandbox.pending_count(), 0);

        // The realm stays usable after an interrupt.
        let result = sandbox
            .execute("return 'alive';", ExecuteOptions::new())
            .await
            .expect("result");
        assert_eq!(result.get("returned"), Some(Value::from("alive")));
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_async_timeout_remote_backends() {
        for kind in [TransportKind::Worker, TransportKind::Frame] {
            let sandbox = Sandbox::builder()
                .transport(kind)
                .basic_runner()
                .timeout(Duration::from_millis(50))
                .grace(Duration::from_millis(20))
                .build()
                .await
                .expect("sandbox");

            let err = sandbox
                .execute("while (true) {}", ExecuteOptions::new().with_id("spin"))
                .await
                .unwrap_err();
            match err {
                Error::AsyncExecutionTimeout { id, timeout_ms } => {
                    assert_eq!(id.as_str(), "spin");
                    assert_eq!(timeout_ms, 50);
                }
                other => panic!("{kind}: unexpected {other}"),
            }
            sandbox.dispose();
        }
    }

    #[tokio::test]
    async fn test_settles_exactly_once_after_watchdog() {
        let sandbox = Sandbox::builder()
            .basic_runner()
            .timeout(Duration::from_millis(20))
            .grace(Duration::from_millis(10))
            .build()
            .await
            .expect("sandbox");
        let settled = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&settled);
        sandbox.bridge().on(events::EXECUTION, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let err = sandbox
            .execute(
                "return new Promise(function (resolve) { setTimeout(function () { resolve(1); }, 150); });",
                ExecuteOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AsyncExecutionTimeout { .. }));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(settled.load(Ordering::SeqCst), 1);
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_dispose_mid_flight() {
        for kind in all_kinds() {
            let sandbox = Sandbox::builder()
                .transport(kind)
                .basic_runner()
                .grace(Duration::from_millis(100))
                .build()
                .await
                .expect("sandbox");
            let echoes = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&echoes);
            sandbox.bridge().on(events::EXECUTION, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

            let window = Duration::from_millis(1000);
            let started = Instant::now();
            let mut tasks = Vec::new();
            for n in 0..3 {
                let sandbox = sandbox.clone();
                tasks.push(tokio::spawn(async move {
                    sandbox
                        .execute(
                            NEVER_SETTLES,
                            ExecuteOptions::new()
                                .with_id(format!("job-{n}"))
                                .with_timeout(window),
                        )
                        .await
                }));
            }
            wait_pending(&sandbox, 3).await;

            sandbox.dispose();
            assert_eq!(sandbox.pending_count(), 0);
            assert_eq!(echoes.load(Ordering::SeqCst), 3, "{kind}");
            assert!(!sandbox.bridge().is_connected());

            for task in tasks {
                let outcome = task.await.expect("joined");
                assert!(matches!(outcome, Err(Error::ExecutionAborted { .. })), "{kind}");
            }
            assert!(started.elapsed() < window / 2, "{kind}: settled by dispose");

            // Watchdogs are gone: nothing settles again once the window passes.
            tokio::time::sleep_until(started + window + Duration::from_millis(300)).await;
            assert_eq!(echoes.load(Ordering::SeqCst), 3, "{kind}");
            sandbox.dispose();
        }
    }

    #[tokio::test]
    async fn test_dispose_bounded_by_stuck_abort_handler() {
        let code = "bridge.on('ping', function (packet) { bridge.dispatch('pong', packet); });\n\
                    bridge.on('execution.abort.stuck', function () { for (;;) {} });";
        let sandbox = Sandbox::create(code).await.expect("sandbox");

        let task = {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                sandbox
                    .execute("return 1;", ExecuteOptions::new().with_id("stuck"))
                    .await
            })
        };
        wait_pending(&sandbox, 1).await;

        let started = Instant::now();
        sandbox.dispose();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(sandbox.pending_count(), 0);

        let outcome = task.await.expect("joined");
        assert!(matches!(outcome, Err(Error::ExecutionAborted { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        let first = {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                sandbox
                    .execute(NEVER_SETTLES, ExecuteOptions::new().with_id("dup"))
                    .await
            })
        };
        wait_pending(&sandbox, 1).await;

        let err = sandbox
            .execute("return 1;", ExecuteOptions::new().with_id("dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        sandbox.dispose();
        assert!(first.await.expect("joined").is_err());
    }

    #[tokio::test]
    async fn test_execute_after_dispose() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        sandbox.dispose();

        let err = sandbox
            .execute("return 1;", ExecuteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DispatchDropped { .. }));
        assert_eq!(sandbox.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_execution_event_echo() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        sandbox.bridge().on(events::EXECUTION, move |args| {
            let _ = tx.send(args.to_vec());
        });

        sandbox
            .execute("return 'ok';", ExecuteOptions::new().with_id("echo"))
            .await
            .expect("result");

        let args = rx.recv().await.expect("echo");
        assert!(args[0].is_null());
        assert_eq!(args[1], Value::from("echo"));
        assert_eq!(
            args[2].get("returned"),
            Some(Value::from("ok"))
        );
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_console_forwarding() {
        let sandbox = sandbox(TransportKind::Worker).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        sandbox.bridge().on(events::CONSOLE, move |args| {
            let _ = tx.send(args.to_vec());
        });

        let cursor = Object::new();
        cursor.insert("ref", "r1");
        sandbox
            .execute(
                "console.warn('careful', 3);",
                ExecuteOptions::new().with_id("logs").with_cursor(cursor),
            )
            .await
            .expect("result");

        let args = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("console within 2s")
            .expect("open");
        assert_eq!(args[0].get("execution"), Some(Value::from("logs")));
        assert_eq!(args[0].get("ref"), Some(Value::from("r1")));
        assert_eq!(&args[1..], &[Value::from("warn"), Value::from("careful"), Value::from(3)]);
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_serialized_console_logs() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        sandbox.bridge().on(events::CONSOLE, move |args| {
            let _ = tx.send(args.to_vec());
        });

        sandbox
            .execute(
                "console.log('a', 1);",
                ExecuteOptions::new().with_id("raw").with_serialize_logs(true),
            )
            .await
            .expect("result");

        let args = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("console within 2s")
            .expect("open");
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].get("execution"), Some(Value::from("raw")));
        assert_eq!(args[1], Value::from("log"));

        let encoded = args[2].as_str().expect("encoded list");
        let list = codec::decode(encoded).expect("decodable");
        assert_eq!(
            list.as_array().expect("array").to_vec(),
            vec![Value::from("a"), Value::from(1)]
        );
        sandbox.dispose();
    }

    #[tokio::test]
    async fn test_ping() {
        for kind in all_kinds() {
            let sandbox = sandbox(kind).await;
            let latency = sandbox.ping().await.expect("pong");
            assert!(latency < Duration::from_secs(2));
            sandbox.dispose();
        }
    }

    #[tokio::test]
    async fn test_ping_mismatch_fails_build() {
        let code = "bridge.on('ping', function () { bridge.dispatch('pong', { nonce: 'other' }); });";
        let err = Sandbox::create(code).await.unwrap_err();
        match err {
            Error::PingMismatch { received, .. } => assert_eq!(received, "other"),
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn test_silent_bootstrap_fails_build() {
        let err = Sandbox::builder()
            .bootstrap("var quiet = true;")
            .boot_timeout(Duration::from_millis(100))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BootTimeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn test_stuck_ping_handler_fails_build_fast() {
        let started = Instant::now();
        let err = Sandbox::builder()
            .bootstrap("bridge.on('ping', function () { for (;;) {} });")
            .boot_timeout(Duration::from_millis(200))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BootTimeout { timeout_ms: 200 }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_sandbox_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sandbox>();
    }

    #[tokio::test]
    async fn test_ping_after_dispose() {
        let sandbox = sandbox(TransportKind::InProcess).await;
        sandbox.dispose();
        assert!(matches!(sandbox.ping().await, Err(Error::DispatchDropped { .. })));
        assert_eq!(sandbox.bridge().listener_count(events::PONG), 0);
    }

    #[test]
    fn test_outcome_from_args() {
        assert_eq!(
            outcome_from_args(&[Value::Null, Value::from(1)]).expect("ok"),
            Value::from(1)
        );
        assert!(outcome_from_args(&[]).expect("ok").is_undefined());

        let error = Object::new();
        error.insert("name", "RangeError");
        error.insert("message", "too far");
        let err = outcome_from_args(&[Value::Object(error)]).unwrap_err();
        assert_eq!(err.to_string(), "RangeError: too far");
    }
}
