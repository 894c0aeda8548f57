//! Realm hosted on the caller's thread.
//!
//! Deliveries run synchronously inside [`InProcessTransport::send`], so the
//! delivery budget can interrupt a script that never yields. Timer callbacks
//! run on a pump task of the ambient tokio runtime.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::Inbound;
use super::realm::{Entry, Interrupt, Ports, Realm};
use super::timers::{TimerHost, TokioTimers};

// ============================================================================
// InProcessTransport
// ============================================================================

/// Realm that runs on whichever thread delivers to it.
pub struct InProcessTransport {
    realm: Arc<Mutex<Realm>>,
    interrupt: Arc<Interrupt>,
    timers: Arc<TokioTimers>,
    pump: JoinHandle<()>,
}

impl InProcessTransport {
    /// Boots the realm synchronously.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] outside a tokio runtime or if the engine fails
    /// - [`Error::BootScript`] / [`Error::BootTimeout`] from the bootstrap
    pub fn create(
        bootstrap: &str,
        connection: ConnectionId,
        options: &BridgeOptions,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|_| Error::connection("in-process transport requires a tokio runtime"))?;

        let (timers, mut fired) = TokioTimers::new(handle.clone());
        let interrupt = Interrupt::new();

        let outbound = inbound.clone();
        let ports = Ports {
            emit: Arc::new(move |data| {
                let _ = outbound.send(Inbound::Message(data));
            }),
            timers: Arc::clone(&timers) as Arc<dyn TimerHost>,
            interrupt: Arc::clone(&interrupt),
        };

        let ready_event = connection.ready_event();
        let realm = Realm::boot(
            Entry::Bootstrap {
                code: bootstrap,
                ready_event: &ready_event,
            },
            ports,
            options,
        )?;
        let realm = Arc::new(Mutex::new(realm));

        let pump_realm = Arc::clone(&realm);
        let budget = options.dispatch_timeout;
        let pump = handle.spawn(async move {
            while let Some(id) = fired.recv().await {
                let result = pump_realm.lock().fire_timer(id, budget);
                if let Err(e) = result
                    && inbound.send(Inbound::Fault(e)).is_err()
                {
                    break;
                }
            }
        });

        debug!(%connection, "In-process realm created");

        Ok(Self {
            realm,
            interrupt,
            timers,
            pump,
        })
    }

    /// Delivers a message and runs it to completion under `budget`.
    ///
    /// # Errors
    ///
    /// See `Realm::deliver`.
    pub fn send(&self, data: &str, budget: Option<Duration>) -> Result<()> {
        self.realm.lock().deliver(data, budget)
    }
}

impl Drop for InProcessTransport {
    fn drop(&mut self) {
        self.interrupt.terminate();
        self.timers.clear_all();
        self.pump.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    async fn next_event(inbound: &mut mpsc::UnboundedReceiver<Inbound>) -> Message {
        let received = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .expect("inbound within 2s")
            .expect("channel open");
        match received {
            Inbound::Message(data) => Message::decode(&data).expect("decodable"),
            other => panic!("unexpected inbound: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ready_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::generate();
        let _transport =
            InProcessTransport::create("", connection, &BridgeOptions::new(), tx).expect("boots");

        assert_eq!(next_event(&mut rx).await.event, connection.ready_event());
    }

    #[tokio::test]
    async fn test_timer_pump() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = "bridge.on('wait', function () { setTimeout(function () { bridge.dispatch('waited'); }, 5); });";
        let transport =
            InProcessTransport::create(code, ConnectionId::generate(), &BridgeOptions::new(), tx)
                .expect("boots");
        next_event(&mut rx).await;

        transport
            .send(&Message::new("wait", Vec::new()).encode(), None)
            .expect("sent");
        assert_eq!(next_event(&mut rx).await.event, "waited");
    }

    #[tokio::test]
    async fn test_timer_fault_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = "setTimeout(function () { throw new Error('late'); }, 1);";
        let _transport =
            InProcessTransport::create(code, ConnectionId::generate(), &BridgeOptions::new(), tx)
                .expect("boots");
        next_event(&mut rx).await;

        let fault = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("fault within 2s")
            .expect("channel open");
        assert!(matches!(fault, Inbound::Fault(Error::ScriptError { .. })));
    }

    #[test]
    fn test_requires_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result =
            InProcessTransport::create("", ConnectionId::generate(), &BridgeOptions::new(), tx);
        assert!(matches!(result, Err(Error::Connection { .. })));
    }
}
