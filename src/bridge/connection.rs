//! Bridge connection and event loop.
//!
//! This module owns one transport and its boot/dispatch/disconnect
//! lifecycle, including the readiness handshake and the dispatch queue.
//!
//! # Event Loop
//!
//! `connect` spawns a tokio task that handles:
//!
//! - Inbound messages from the realm (decoded and emitted by event name)
//! - The readiness signal `load.<connection id>` (queue replay)
//! - The boot timer
//! - Transport faults (emitted on `error`)
//!
//! # States
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ready──► Connected
//!      ▲                        │                     │
//!      └──── boot failure ──────┘◄──── disconnect ────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, ListenerId};
use crate::protocol::{Message, events};
use crate::transport::{Inbound, Transport, TransportKind};

use super::listeners::ListenerRegistry;
use super::options::BridgeOptions;

// ============================================================================
// BridgeState
// ============================================================================

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// No transport.
    Disconnected,
    /// Transport created, waiting for the readiness signal.
    Connecting,
    /// Ready; dispatches are sent immediately.
    Connected,
}

// ============================================================================
// Types
// ============================================================================

/// A dispatch made while connecting.
struct QueuedDispatch {
    event: String,
    payload: String,
    budget: Option<Duration>,
}

enum Link {
    Disconnected,
    Connecting {
        id: ConnectionId,
        transport: Transport,
        queue: Vec<QueuedDispatch>,
    },
    Connected {
        id: ConnectionId,
        transport: Transport,
    },
}

impl Link {
    fn state(&self) -> BridgeState {
        match self {
            Self::Disconnected => BridgeState::Disconnected,
            Self::Connecting { .. } => BridgeState::Connecting,
            Self::Connected { .. } => BridgeState::Connected,
        }
    }

    fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { transport, .. } | Self::Connected { transport, .. } => {
                Some(transport.kind())
            }
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Host end of a sandbox realm.
///
/// Cheap to clone; all clones share the same connection.
///
/// # Thread Safety
///
/// `Bridge` is `Send + Sync`. No lock is held while listeners run or across
/// an `.await`.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    options: BridgeOptions,
    link: Mutex<Link>,
    listeners: ListenerRegistry,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Bridge - Constructors
// ============================================================================

impl Bridge {
    /// Creates a disconnected bridge.
    #[must_use]
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                options,
                link: Mutex::new(Link::Disconnected),
                listeners: ListenerRegistry::default(),
                event_loop: Mutex::new(None),
            }),
        }
    }

    /// Creates a bridge and connects it.
    ///
    /// # Errors
    ///
    /// Any error [`Bridge::connect`] resolves with.
    pub async fn spawn(options: BridgeOptions, bootstrap: &str) -> Result<Self> {
        let bridge = Self::new(options);
        bridge.connect(bootstrap).await?;
        Ok(bridge)
    }
}

// ============================================================================
// Bridge - Lifecycle
// ============================================================================

impl Bridge {
    /// Creates the transport and starts booting `bootstrap`.
    ///
    /// The state is `Connecting` as soon as this returns; dispatches made
    /// before the returned future resolves are queued and replayed in order
    /// once the realm signals readiness.
    ///
    /// Resolves immediately if already connected.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if already connecting or the transport fails
    /// - [`Error::BootScript`] if the bootstrap throws
    /// - [`Error::BootTimeout`] if readiness does not arrive in time
    /// - [`Error::ConnectionClosed`] if disconnected while connecting
    pub fn connect(&self, bootstrap: &str) -> BoxFuture<'static, Result<()>> {
        if Handle::try_current().is_err() {
            return future::ready(Err(Error::connection("bridge requires a tokio runtime"))).boxed();
        }

        let mut link = self.inner.link.lock();

        match *link {
            Link::Connected { .. } => return future::ready(Ok(())).boxed(),
            Link::Connecting { .. } => {
                return future::ready(Err(Error::connection("bridge is already connecting")))
                    .boxed();
            }
            Link::Disconnected => {}
        }

        let id = ConnectionId::generate();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = match Transport::create(
            self.inner.options.transport,
            bootstrap,
            id,
            &self.inner.options,
            inbound_tx,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                debug!(connection = %id, error = %e, "Transport creation failed");
                return future::ready(Err(e)).boxed();
            }
        };

        *link = Link::Connecting {
            id,
            transport,
            queue: Vec::new(),
        };

        // Registered before the link unlocks so a racing disconnect aborts it.
        let (boot_tx, boot_rx) = oneshot::channel();
        let task = tokio::spawn(BridgeInner::run_event_loop(
            Arc::downgrade(&self.inner),
            id,
            inbound_rx,
            boot_tx,
            self.inner.options.boot_timeout,
        ));
        if let Some(previous) = self.inner.event_loop.lock().replace(task) {
            previous.abort();
        }
        drop(link);

        debug!(
            connection = %id,
            transport = %self.inner.options.transport,
            "Bridge connecting"
        );

        async move { boot_rx.await.unwrap_or(Err(Error::ConnectionClosed)) }.boxed()
    }

    /// Destroys the transport, clears every listener and returns to
    /// `Disconnected`. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        self.inner.link.lock().state()
    }

    /// Returns `true` when connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == BridgeState::Connected
    }

    /// Returns the backend of the live transport, if any.
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.inner.link.lock().transport_kind()
    }

    /// Returns the options this bridge was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }
}

// ============================================================================
// Bridge - Dispatch
// ============================================================================

impl Bridge {
    /// Sends an event to the sandbox with the default delivery budget.
    ///
    /// Never fails: problems are reported on the `error` event.
    pub fn dispatch(&self, event: &str, args: Vec<Value>) {
        self.dispatch_with_budget(event, args, self.inner.options.dispatch_timeout);
    }

    /// Sends an event to the sandbox under an explicit delivery budget.
    ///
    /// The budget only applies to the in-process backend.
    pub fn dispatch_with_budget(&self, event: &str, args: Vec<Value>, budget: Option<Duration>) {
        if let Err(e) = self.try_dispatch(event, args, budget) {
            self.inner.report(e);
        }
    }

    /// Sends an event and returns the delivery outcome to the caller.
    pub(crate) fn try_dispatch(
        &self,
        event: &str,
        args: Vec<Value>,
        budget: Option<Duration>,
    ) -> Result<()> {
        let payload = Message::new(event, args).encode();
        let mut link = self.inner.link.lock();

        match &mut *link {
            Link::Connected { transport, .. } => {
                trace!(event, "Dispatching");
                transport.send(payload, budget)
            }
            Link::Connecting { queue, .. } => {
                trace!(event, queued = queue.len() + 1, "Queued until ready");
                queue.push(QueuedDispatch {
                    event: event.to_string(),
                    payload,
                    budget,
                });
                Ok(())
            }
            Link::Disconnected => Err(Error::dispatch_dropped(event)),
        }
    }
}

// ============================================================================
// Bridge - Events
// ============================================================================

impl Bridge {
    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.listeners.add(event, Arc::new(listener), false)
    }

    /// Registers a listener that runs on the next `event` only.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.listeners.add(event, Arc::new(listener), true)
    }

    /// Removes one listener, or every listener of `event` with `None`.
    ///
    /// Returns the number removed.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> usize {
        self.inner.listeners.remove(event, id)
    }

    /// Emits `event` locally. Nothing is sent to the sandbox.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        self.inner.listeners.emit(event, args)
    }

    /// Returns the number of listeners of `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.count(event)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("transport", &self.inner.options.transport)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BridgeInner
// ============================================================================

impl BridgeInner {
    /// Event loop for one connection attempt.
    async fn run_event_loop(
        bridge: Weak<BridgeInner>,
        id: ConnectionId,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        boot_tx: oneshot::Sender<Result<()>>,
        boot_timeout: Duration,
    ) {
        let ready_event = id.ready_event();
        let mut boot_tx = Some(boot_tx);
        let boot_timer = tokio::time::sleep(boot_timeout);
        tokio::pin!(boot_timer);

        loop {
            tokio::select! {
                _ = &mut boot_timer, if boot_tx.is_some() => {
                    warn!(connection = %id, timeout_ms = boot_timeout.as_millis() as u64, "Boot timed out");
                    if let Some(inner) = bridge.upgrade() {
                        inner.abandon_boot(id);
                    }
                    if let Some(tx) = boot_tx.take() {
                        let _ = tx.send(Err(Error::boot_timeout(boot_timeout.as_millis() as u64)));
                    }
                    break;
                }

                received = inbound.recv() => {
                    let Some(received) = received else {
                        debug!(connection = %id, "Transport channel closed");
                        break;
                    };
                    let Some(inner) = bridge.upgrade() else {
                        break;
                    };

                    match received {
                        Inbound::Message(data) => match Message::decode(&data) {
                            Ok(message) if boot_tx.is_some() && message.event == ready_event => {
                                let outcome = inner.complete_boot(id);
                                if let Some(tx) = boot_tx.take() {
                                    let _ = tx.send(outcome);
                                }
                            }
                            Ok(message) => {
                                trace!(event = %message.event, "Inbound event");
                                inner.listeners.emit(&message.event, &message.args);
                            }
                            Err(e) => inner.report(e),
                        },

                        Inbound::Fault(e) => inner.report(e),

                        Inbound::BootFailed(e) => {
                            if let Some(tx) = boot_tx.take() {
                                inner.abandon_boot(id);
                                let _ = tx.send(Err(e));
                                break;
                            }
                            inner.report(e);
                        }
                    }
                }
            }
        }

        debug!(connection = %id, "Event loop terminated");
    }

    /// Moves `Connecting` to `Connected` and replays the queue in order.
    fn complete_boot(&self, id: ConnectionId) -> Result<()> {
        let mut failures = Vec::new();

        {
            let mut link = self.link.lock();
            let Link::Connecting { id: current, .. } = &*link else {
                return Err(Error::ConnectionClosed);
            };
            if *current != id {
                return Err(Error::ConnectionClosed);
            }

            let Link::Connecting {
                transport, queue, ..
            } = std::mem::replace(&mut *link, Link::Disconnected)
            else {
                return Err(Error::ConnectionClosed);
            };

            let replayed = queue.len();
            for queued in queue {
                if let Err(e) = transport.send(queued.payload, queued.budget) {
                    warn!(event = %queued.event, error = %e, "Queued dispatch failed");
                    failures.push(e);
                }
            }

            *link = Link::Connected { id, transport };
            debug!(connection = %id, replayed, "Bridge connected");
        }

        for failure in failures {
            self.report(failure);
        }
        Ok(())
    }

    /// Tears down a connection attempt that never became ready.
    fn abandon_boot(&self, id: ConnectionId) {
        let abandoned = {
            let mut link = self.link.lock();
            match &*link {
                Link::Connecting { id: current, .. } if *current == id => {
                    std::mem::replace(&mut *link, Link::Disconnected)
                }
                _ => return,
            }
        };

        if let Link::Connecting {
            transport, queue, ..
        } = abandoned
        {
            if !queue.is_empty() {
                debug!(connection = %id, discarded = queue.len(), "Discarded queued dispatches");
            }
            transport.destroy();
        }
    }

    fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.link.lock(), Link::Disconnected);
        let event_loop = self.event_loop.lock().take();

        if let Some(task) = event_loop {
            task.abort();
        }
        self.listeners.clear();

        match previous {
            Link::Disconnected => {}
            Link::Connecting { id, transport, .. } | Link::Connected { id, transport } => {
                transport.destroy();
                debug!(connection = %id, "Bridge disconnected");
            }
        }
    }

    /// Emits an error on the generic `error` event.
    fn report(&self, error: Error) {
        let handled = self.listeners.emit(events::ERROR, &[error.to_value()]);
        if handled == 0 {
            warn!(error = %error, "Unhandled bridge error");
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop.get_mut().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
