//! Realm on a dedicated OS thread.
//!
//! The host posts messages into the thread's queue and never waits for them
//! to run, so there is no synchronous budget. Termination interrupts
//! whatever the realm is running.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::Inbound;
use super::realm::{Entry, Interrupt, Ports, Realm};
use super::timers::{TimerHost, TimerQueue};

// ============================================================================
// Types
// ============================================================================

/// Commands accepted by the worker thread.
enum Command {
    Post(String),
    Terminate,
}

// ============================================================================
// WorkerTransport
// ============================================================================

/// Realm running on its own thread.
pub struct WorkerTransport {
    commands: std_mpsc::Sender<Command>,
    interrupt: Arc<Interrupt>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerTransport {
    /// Spawns the worker thread. Boot happens on the thread; failures are
    /// reported as [`Inbound::BootFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the thread cannot be spawned.
    pub fn create(
        bootstrap: &str,
        connection: ConnectionId,
        options: &BridgeOptions,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<Self> {
        let (commands, queue) = std_mpsc::channel();
        let interrupt = Interrupt::new();

        let worker = Worker {
            bootstrap: bootstrap.to_string(),
            ready_event: connection.ready_event(),
            options: options.clone(),
            inbound,
            interrupt: Arc::clone(&interrupt),
        };

        let thread = thread::Builder::new()
            .name(format!("sandbox-worker-{connection}"))
            .spawn(move || worker.run(queue))
            .map_err(|e| Error::connection(format!("failed to spawn worker thread: {e}")))?;

        debug!(%connection, "Worker realm spawned");

        Ok(Self {
            commands,
            interrupt,
            thread: Some(thread),
        })
    }

    /// Posts a message to the worker queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the worker has stopped.
    pub fn send(&self, data: String) -> Result<()> {
        self.commands
            .send(Command::Post(data))
            .map_err(|_| Error::transport("worker has stopped"))
    }
}

impl Drop for WorkerTransport {
    fn drop(&mut self) {
        self.interrupt.terminate();
        let _ = self.commands.send(Command::Terminate);
        // Detached: the thread exits on its own once interrupted.
        drop(self.thread.take());
    }
}

// ============================================================================
// Worker Thread
// ============================================================================

struct Worker {
    bootstrap: String,
    ready_event: String,
    options: BridgeOptions,
    inbound: mpsc::UnboundedSender<Inbound>,
    interrupt: Arc<Interrupt>,
}

impl Worker {
    fn run(self, queue: std_mpsc::Receiver<Command>) {
        let timers = Arc::new(TimerQueue::new());

        let outbound = self.inbound.clone();
        let ports = Ports {
            emit: Arc::new(move |data| {
                let _ = outbound.send(Inbound::Message(data));
            }),
            timers: Arc::clone(&timers) as Arc<dyn TimerHost>,
            interrupt: Arc::clone(&self.interrupt),
        };

        let realm = match Realm::boot(
            Entry::Bootstrap {
                code: &self.bootstrap,
                ready_event: &self.ready_event,
            },
            ports,
            &self.options,
        ) {
            Ok(realm) => realm,
            Err(e) => {
                let _ = self.inbound.send(Inbound::BootFailed(e));
                return;
            }
        };

        loop {
            if self.interrupt.is_terminated() {
                break;
            }

            let command = match timers.next_deadline() {
                Some(deadline) => {
                    match queue.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match queue.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(Command::Post(data)) => self.report(realm.deliver(&data, None)),
                Some(Command::Terminate) => break,
                None => {}
            }

            for id in timers.take_due(Instant::now()) {
                if self.interrupt.is_terminated() {
                    break;
                }
                self.report(realm.fire_timer(id, None));
            }
        }

        timers.clear_all();
        trace!("Worker realm stopped");
    }

    fn report(&self, result: Result<()>) {
        if let Err(e) = result
            && !self.interrupt.is_terminated()
        {
            let _ = self.inbound.send(Inbound::Fault(e));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
