//! Realm transport layer.
//!
//! This module hosts sandbox realms and moves encoded messages between the
//! host bridge and the realm.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    send(data)     ┌──────────────────────────┐
//! │  Bridge (Rust)  │──────────────────►│  Transport               │
//! │                 │                   │  ┌────────────────────┐  │
//! │  event loop     │◄──────────────────│  │ Realm (QuickJS)    │  │
//! │                 │   Inbound (mpsc)  │  │ firmware + bridge  │  │
//! └─────────────────┘                   │  └────────────────────┘  │
//!                                       └──────────────────────────┘
//! ```
//!
//! # Backends
//!
//! | Kind | Realm runs on | Sync budget | Boot errors |
//! |------|---------------|-------------|-------------|
//! | [`TransportKind::InProcess`] | caller's thread | yes | returned from create |
//! | [`TransportKind::Worker`] | dedicated thread | no | [`Inbound::BootFailed`] |
//! | [`TransportKind::Frame`] | dedicated thread + event loop | no | [`Inbound::BootFailed`] |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `assets` | Firmware and frame document |
//! | `timers` | Host timers behind the realm timer globals |

// ============================================================================
// Submodules
// ============================================================================

/// Script assets evaluated in every realm.
pub mod assets;

/// Host timers for realm timer globals.
pub mod timers;

mod frame;
mod in_process;
mod realm;
mod worker;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use self::frame::FrameTransport;
use self::in_process::InProcessTransport;
use self::worker::WorkerTransport;

// ============================================================================
// Re-exports
// ============================================================================

pub use timers::{TimerHost, TimerQueue, TokioTimers};

// ============================================================================
// TransportKind
// ============================================================================

/// Realm backend selected at connect time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Realm on the delivering thread.
    #[default]
    InProcess,
    /// Realm on a dedicated thread.
    Worker,
    /// Realm in a detached frame with its own event loop.
    Frame,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProcess => "in-process",
            Self::Worker => "worker",
            Self::Frame => "frame",
        })
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Everything a transport reports back to its bridge.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// An encoded message sent by the sandbox.
    Message(String),
    /// A failure outside any host call (e.g. a throwing timer callback).
    Fault(Error),
    /// The realm failed to boot.
    BootFailed(Error),
}

// ============================================================================
// Transport
// ============================================================================

/// A live realm of one of the backend kinds.
pub(crate) enum Transport {
    InProcess(InProcessTransport),
    Worker(WorkerTransport),
    Frame(FrameTransport),
}

impl Transport {
    /// Creates a realm and starts booting `bootstrap`.
    ///
    /// Readiness is signalled through `inbound` as the message
    /// `connection.ready_event()`.
    pub fn create(
        kind: TransportKind,
        bootstrap: &str,
        connection: ConnectionId,
        options: &BridgeOptions,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<Self> {
        match kind {
            TransportKind::InProcess => {
                InProcessTransport::create(bootstrap, connection, options, inbound)
                    .map(Self::InProcess)
            }
            TransportKind::Worker => {
                WorkerTransport::create(bootstrap, connection, options, inbound).map(Self::Worker)
            }
            TransportKind::Frame => {
                FrameTransport::create(bootstrap, connection, options, inbound).map(Self::Frame)
            }
        }
    }

    /// Hands an encoded message to the realm.
    ///
    /// Only the in-process backend runs the message before returning and
    /// honours `budget`.
    pub fn send(&self, data: String, budget: Option<Duration>) -> Result<()> {
        match self {
            Self::InProcess(transport) => transport.send(&data, budget),
            Self::Worker(transport) => transport.send(data),
            Self::Frame(transport) => transport.send(data),
        }
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::InProcess(_) => TransportKind::InProcess,
            Self::Worker(_) => TransportKind::Worker,
            Self::Frame(_) => TransportKind::Frame,
        }
    }

    /// Tears the realm down, interrupting any running script.
    pub fn destroy(self) {
        drop(self);
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&TransportKind::InProcess).expect("serialize");
        assert_eq!(json, "\"in-process\"");
        let kind: TransportKind = serde_json::from_str("\"frame\"").expect("parse");
        assert_eq!(kind, TransportKind::Frame);
        assert_eq!(TransportKind::Worker.to_string(), "worker");
    }

    #[tokio::test]
    async fn test_create_reports_kind() {
        for kind in [TransportKind::InProcess, TransportKind::Worker, TransportKind::Frame] {
            let (tx, _rx) = mpsc::unbounded_channel();
            let transport = Transport::create(
                kind,
                "",
                ConnectionId::generate(),
                &BridgeOptions::new(),
                tx,
            )
            .expect("created");
            assert_eq!(transport.kind(), kind);
            transport.destroy();
        }
    }
}
