//! Realm loaded as a detached document.
//!
//! The frame owns a thread with its own single-threaded event loop. It
//! loads one document (firmware plus bootstrap) which boots on load, then
//! receives posted messages and timer ticks through that loop. Unloading the
//! frame interrupts any running script.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

use super::Inbound;
use super::assets;
use super::realm::{Entry, Interrupt, Ports, Realm};
use super::timers::{TimerHost, TokioTimers};

// ============================================================================
// Types
// ============================================================================

/// Messages posted into the frame.
enum Post {
    Message(String),
    Unload,
}

// ============================================================================
// FrameTransport
// ============================================================================

/// Realm hosted in a detached frame.
pub struct FrameTransport {
    posts: mpsc::UnboundedSender<Post>,
    interrupt: Arc<Interrupt>,
    thread: Option<JoinHandle<()>>,
}

impl FrameTransport {
    /// Builds the document and starts the frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the frame thread cannot be spawned.
    /// Load failures are reported as [`Inbound::BootFailed`].
    pub fn create(
        bootstrap: &str,
        connection: ConnectionId,
        options: &BridgeOptions,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<Self> {
        let (posts, inbox) = mpsc::unbounded_channel();
        let interrupt = Interrupt::new();

        let frame = Frame {
            document: assets::build_frame_document(bootstrap, &connection.ready_event()),
            options: options.clone(),
            inbound,
            interrupt: Arc::clone(&interrupt),
        };

        let thread = thread::Builder::new()
            .name(format!("sandbox-frame-{connection}"))
            .spawn(move || frame.run(inbox))
            .map_err(|e| Error::connection(format!("failed to spawn frame thread: {e}")))?;

        debug!(%connection, "Frame created");

        Ok(Self {
            posts,
            interrupt,
            thread: Some(thread),
        })
    }

    /// Posts a message into the frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the frame was unloaded.
    pub fn send(&self, data: String) -> Result<()> {
        self.posts
            .send(Post::Message(data))
            .map_err(|_| Error::transport("frame was unloaded"))
    }
}

impl Drop for FrameTransport {
    fn drop(&mut self) {
        self.interrupt.terminate();
        let _ = self.posts.send(Post::Unload);
        drop(self.thread.take());
    }
}

// ============================================================================
// Frame Event Loop
// ============================================================================

struct Frame {
    document: String,
    options: BridgeOptions,
    inbound: mpsc::UnboundedSender<Inbound>,
    interrupt: Arc<Interrupt>,
}

impl Frame {
    fn run(self, inbox: mpsc::UnboundedReceiver<Post>) {
        let runtime = match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = self.inbound.send(Inbound::BootFailed(Error::connection(format!(
                    "failed to start frame event loop: {e}"
                ))));
                return;
            }
        };

        runtime.block_on(self.event_loop(inbox));
    }

    async fn event_loop(self, mut inbox: mpsc::UnboundedReceiver<Post>) {
        let (timers, mut fired) = TokioTimers::new(Handle::current());

        let outbound = self.inbound.clone();
        let ports = Ports {
            emit: Arc::new(move |data| {
                let _ = outbound.send(Inbound::Message(data));
            }),
            timers: Arc::clone(&timers) as Arc<dyn TimerHost>,
            interrupt: Arc::clone(&self.interrupt),
        };

        let realm = match Realm::boot(Entry::Document(&self.document), ports, &self.options) {
            Ok(realm) => realm,
            Err(e) => {
                let _ = self.inbound.send(Inbound::BootFailed(e));
                return;
            }
        };

        loop {
            tokio::select! {
                post = inbox.recv() => match post {
                    Some(Post::Message(data)) => self.report(realm.deliver(&data, None)),
                    Some(Post::Unload) | None => break,
                },

                Some(id) = fired.recv() => self.report(realm.fire_timer(id, None)),
            }

            if self.interrupt.is_terminated() {
                break;
            }
        }

        timers.clear_all();
        trace!("Frame unloaded");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::codec::Value;
    use crate::protocol::Message;

    async fn next_inbound(inbound: &mut mpsc::UnboundedReceiver<Inbound>) -> Inbound {
        tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .expect("inbound within 2s")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_document_boots_and_echoes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::generate();
        let code = "bridge.on('echo', function (v) { bridge.dispatch('echo', v); });";
        let frame =
            FrameTransport::create(code, connection, &BridgeOptions::new(), tx).expect("frame");

        let Inbound::Message(ready) = next_inbound(&mut rx).await else {
            panic!("expected ready");
        };
        assert_eq!(
            Message::decode(&ready).expect("decode").event,
            connection.ready_event()
        );

        frame
            .send(Message::new("echo", vec![Value::from(2.5)]).encode())
            .expect("posted");
        let Inbound::Message(echo) = next_inbound(&mut rx).await else {
            panic!("expected echo");
        };
        assert_eq!(Message::decode(&echo).expect("decode").args, vec![Value::from(2.5)]);
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _frame = FrameTransport::create(
            "throw new SyntaxError('broken');",
            ConnectionId::generate(),
            &BridgeOptions::new(),
            tx,
        )
        .expect("frame");

        match next_inbound(&mut rx).await {
            Inbound::BootFailed(err) => assert_eq!(err.to_string(), "SyntaxError: broken"),
            other => panic!("unexpected inbound: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frame_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = "setTimeout(function (a) { bridge.dispatch('later', a); }, 5, 'arg');";
        let _frame = FrameTransport::create(code, ConnectionId::generate(), &BridgeOptions::new(), tx)
            .expect("frame");
        next_inbound(&mut rx).await;

        let Inbound::Message(later) = next_inbound(&mut rx).await else {
            panic!("expected timer message");
        };
        let message = Message::decode(&later).expect("decode");
        assert_eq!(message.event, "later");
        assert_eq!(message.args, vec![Value::from("arg")]);
    }

    #[tokio::test]
    async fn test_unload_interrupts_busy_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let code = "bridge.on('spin', function () { for (;;) {} });";
        let frame = FrameTransport::create(code, ConnectionId::generate(), &BridgeOptions::new(), tx)
            .expect("frame");
        next_inbound(&mut rx).await;

        frame
            .send(Message::new("spin", Vec::new()).encode())
            .expect("posted");
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(frame);

        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame exits");
        assert!(closed.is_none());
    }
}
