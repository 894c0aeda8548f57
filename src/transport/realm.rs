//! Script realm shared by every transport.
//!
//! A [`Realm`] owns one QuickJS runtime and context with the firmware
//! installed. Inbound messages enter through [`Realm::deliver`], timer
//! callbacks through [`Realm::fire_timer`]; everything the sandbox sends
//! leaves through the `emit` port given at boot.
//!
//! # Interrupts
//!
//! Each call may carry a budget. The engine interrupt handler checks the
//! shared [`Interrupt`] and aborts the running script once the deadline
//! passes or the realm was terminated. Budget overruns surface as
//! [`Error::SyncExecutionTimeout`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rquickjs::convert::Coerced;
use rquickjs::{Context, Ctx, Exception, FromJs, Function, JsLifetime, Object, Runtime};
use tracing::{debug, error, info, trace, warn};

use crate::bridge::BridgeOptions;
use crate::error::{Error, Result};

use super::assets;
use super::timers::{TimerHost, delay_from_millis};

// ============================================================================
// Types
// ============================================================================

/// Sink for encoded messages leaving the realm.
pub type Emitter = Arc<dyn Fn(String) + Send + Sync>;

/// How the realm receives its bootstrap.
pub enum Entry<'a> {
    /// Install the firmware, then run the bootstrap through the client.
    Bootstrap {
        /// Bootstrap source.
        code: &'a str,
        /// Readiness event to emit once the bootstrap returned.
        ready_event: &'a str,
    },
    /// Evaluate a self-booting document (see `assets::build_frame_document`).
    Document(&'a str),
}

/// Host capabilities handed to the firmware.
pub struct Ports {
    /// Outbound message sink.
    pub emit: Emitter,
    /// Timer backend.
    pub timers: Arc<dyn TimerHost>,
    /// Interrupt state checked by the engine.
    pub interrupt: Arc<Interrupt>,
}

// ============================================================================
// Interrupt
// ============================================================================

/// Interrupt state polled by the engine while a script runs.
#[derive(Debug, Default)]
pub struct Interrupt {
    terminated: AtomicBool,
    tripped: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl Interrupt {
    /// Creates a fresh interrupt state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stops the running script and every later call.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`Interrupt::terminate`] was called.
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn arm(&self, budget: Option<Duration>) {
        self.tripped.store(false, Ordering::SeqCst);
        *self.deadline.lock() = budget.map(|budget| Instant::now() + budget);
    }

    /// Clears the deadline and returns whether it fired.
    fn disarm(&self) -> bool {
        *self.deadline.lock() = None;
        self.tripped.swap(false, Ordering::SeqCst)
    }

    fn should_interrupt(&self) -> bool {
        if self.is_terminated() {
            return true;
        }
        match *self.deadline.lock() {
            Some(deadline) if Instant::now() >= deadline => {
                self.tripped.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Realm
// ============================================================================

/// An isolated script realm with the firmware installed.
///
/// The firmware entry points live in the context's userdata and are looked
/// up inside each call, so the realm holds no engine handles and can move
/// between threads.
pub struct Realm {
    context: Context,
    runtime: Runtime,
    interrupt: Arc<Interrupt>,
}

/// Firmware entry points, stored as context userdata.
#[derive(Clone)]
struct Client<'js> {
    dispatch: Function<'js>,
    fire: Function<'js>,
}

// SAFETY: `Client` holds only values bound to `'js`.
unsafe impl<'js> JsLifetime<'js> for Client<'js> {
    type Changed<'to> = Client<'to>;
}

impl<'js> Client<'js> {
    fn load(ctx: &Ctx<'js>) -> Result<Self> {
        ctx.userdata::<Client<'js>>()
            .map(|client| Client::clone(&client))
            .ok_or_else(|| Error::engine("realm client is not installed"))
    }
}

enum Call<'a> {
    Dispatch(&'a str),
    Fire(u32),
}

impl Realm {
    /// Creates a runtime, installs the firmware and runs the bootstrap.
    ///
    /// The bootstrap runs under `options.boot_timeout` as its budget.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the engine cannot be created
    /// - [`Error::BootScript`] if the bootstrap throws
    /// - [`Error::BootTimeout`] if the bootstrap exceeds its budget
    pub fn boot(entry: Entry<'_>, ports: Ports, options: &BridgeOptions) -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| Error::connection(format!("failed to create script runtime: {e}")))?;

        if let Some(limit) = options.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = options.max_stack_size {
            runtime.set_max_stack_size(size);
        }

        let interrupt = Arc::clone(&ports.interrupt);
        let handler_state = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || handler_state.should_interrupt())));

        let context = Context::full(&runtime)
            .map_err(|e| Error::connection(format!("failed to create script context: {e}")))?;

        let realm = Self {
            context,
            runtime,
            interrupt,
        };

        realm.interrupt.arm(Some(options.boot_timeout));
        let installed = realm
            .context
            .with(|ctx| install(&ctx, entry, ports, options.debug));
        drain_jobs(&realm.runtime);

        if realm.interrupt.disarm() {
            return Err(Error::boot_timeout(options.boot_timeout.as_millis() as u64));
        }
        installed?;

        debug!(
            memory_limit = ?options.memory_limit,
            max_stack_size = ?options.max_stack_size,
            "Realm booted"
        );

        Ok(realm)
    }

    /// Delivers an encoded message to the sandbox `bridge` listeners.
    ///
    /// # Errors
    ///
    /// - [`Error::SyncExecutionTimeout`] if `budget` ran out
    /// - [`Error::ScriptError`] if a listener threw
    /// - [`Error::Transport`] if the realm was terminated
    pub fn deliver(&self, data: &str, budget: Option<Duration>) -> Result<()> {
        self.invoke(Call::Dispatch(data), budget)
    }

    /// Runs the callback registered for timer `id`.
    ///
    /// # Errors
    ///
    /// Same as [`Realm::deliver`].
    pub fn fire_timer(&self, id: u32, budget: Option<Duration>) -> Result<()> {
        self.invoke(Call::Fire(id), budget)
    }

    /// Returns the interrupt state of this realm.
    #[inline]
    #[must_use]
    pub fn interrupt(&self) -> &Arc<Interrupt> {
        &self.interrupt
    }

    fn invoke(&self, call: Call<'_>, budget: Option<Duration>) -> Result<()> {
        if self.interrupt.is_terminated() {
            return Err(Error::transport("realm terminated"));
        }

        self.interrupt.arm(budget);
        let outcome = self.context.with(|ctx| {
            let client = Client::load(&ctx)?;
            let result = match call {
                Call::Dispatch(data) => client.dispatch.call::<_, ()>((data,)),
                Call::Fire(id) => client.fire.call::<_, ()>((id,)),
            };
            result.map_err(|e| describe_failure(&ctx, e))
        });
        drain_jobs(&self.runtime);
        let tripped = self.interrupt.disarm();

        if tripped {
            let timeout_ms = budget.map_or(0, |b| b.as_millis() as u64);
            warn!(timeout_ms, "Script interrupted after exceeding its budget");
            return Err(Error::sync_execution_timeout(timeout_ms));
        }
        if self.interrupt.is_terminated() {
            return Err(Error::transport("realm terminated"));
        }
        outcome
    }
}

impl Drop for Realm {
    fn drop(&mut self) {
        self.context.with(|ctx| {
            let _ = ctx.remove_userdata::<Client<'_>>();
        });
    }
}

// ============================================================================
// Internal Functions
// ============================================================================

/// Installs the firmware with the host ports and boots the entry.
fn install(ctx: &Ctx<'_>, entry: Entry<'_>, ports: Ports, debug: bool) -> Result<()> {
    let Ports {
        emit, timers, ..
    } = ports;

    let emit_fn = Function::new(ctx.clone(), move |data: String| -> rquickjs::Result<()> {
        emit(data);
        Ok(())
    })
    .map_err(|e| Error::engine(e.to_string()))?;

    let schedule_timers = Arc::clone(&timers);
    let schedule_fn = Function::new(
        ctx.clone(),
        move |id: f64, delay: f64, repeat: bool| -> rquickjs::Result<()> {
            schedule_timers.schedule(id as u32, delay_from_millis(delay), repeat);
            Ok(())
        },
    )
    .map_err(|e| Error::engine(e.to_string()))?;

    let cancel_fn = Function::new(ctx.clone(), move |id: f64| -> rquickjs::Result<()> {
        timers.cancel(id as u32);
        Ok(())
    })
    .map_err(|e| Error::engine(e.to_string()))?;

    let log_fn = Function::new(
        ctx.clone(),
        move |level: String, line: String| -> rquickjs::Result<()> {
            log_console(&level, &line);
            Ok(())
        },
    )
    .map_err(|e| Error::engine(e.to_string()))?;

    let ports = (emit_fn, schedule_fn, cancel_fn, log_fn, debug);

    let client: Object<'_> = match entry {
        Entry::Bootstrap { code, ready_event } => {
            let firmware: Function<'_> = ctx
                .eval(assets::firmware())
                .map_err(|e| Error::engine(format!("firmware failed to load: {e}")))?;
            let client: Object<'_> = firmware
                .call(ports)
                .map_err(|e| Error::engine(describe_failure(ctx, e).to_string()))?;
            let boot: Function<'_> = client
                .get("boot")
                .map_err(|e| Error::engine(e.to_string()))?;
            boot.call::<_, ()>((code, ready_event))
                .map_err(|e| as_boot_failure(describe_failure(ctx, e)))?;
            client
        }
        Entry::Document(document) => {
            let loader: Function<'_> = ctx
                .eval(document)
                .map_err(|e| as_boot_failure(describe_failure(ctx, e)))?;
            loader
                .call(ports)
                .map_err(|e| as_boot_failure(describe_failure(ctx, e)))?
        }
    };

    let dispatch: Function<'_> = client
        .get("dispatch")
        .map_err(|e| Error::engine(e.to_string()))?;
    let fire: Function<'_> = client
        .get("fire")
        .map_err(|e| Error::engine(e.to_string()))?;

    ctx.store_userdata(Client { dispatch, fire })
        .map_err(|e| Error::engine(format!("failed to install realm client: {e}")))?;
    Ok(())
}

/// Turns a failed engine call into a crate error, consuming the pending
/// exception if there is one.
fn describe_failure(ctx: &Ctx<'_>, error: rquickjs::Error) -> Error {
    if !matches!(error, rquickjs::Error::Exception) {
        return Error::engine(error.to_string());
    }

    let caught = ctx.catch();
    if let Some(exception) = caught
        .as_object()
        .and_then(|obj| Exception::from_object(obj.clone()))
    {
        let name = exception
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        let message = exception.message().unwrap_or_default();
        return Error::script_error(name, message);
    }

    match Coerced::<String>::from_js(ctx, caught) {
        Ok(value) => Error::script_error("Error", value.0),
        Err(err) => Error::engine(format!("failed to stringify exception: {err}")),
    }
}

/// Maps a bootstrap throw to a boot script error carrying the sandbox text.
fn as_boot_failure(error: Error) -> Error {
    match error {
        Error::ScriptError { .. } => Error::boot_script(error.to_string()),
        other => other,
    }
}

/// Runs queued promise jobs until the queue is empty.
fn drain_jobs(runtime: &Runtime) {
    loop {
        match runtime.execute_pending_job() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(_) => trace!("Pending job raised an exception"),
        }
    }
}

/// Forwards a sandbox console line to the host log.
fn log_console(level: &str, line: &str) {
    match level {
        "error" => error!(target: "sandbox_bridge::console", "{line}"),
        "warn" => warn!(target: "sandbox_bridge::console", "{line}"),
        "debug" => debug!(target: "sandbox_bridge::console", "{line}"),
        _ => info!(target: "sandbox_bridge::console", "{line}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::protocol::Message;
    use crate::transport::timers::TimerQueue;

    fn boot(code: &str, options: &BridgeOptions) -> (Result<Realm>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let ports = Ports {
            emit: Arc::new(move |data| sink.lock().push(data)),
            timers: Arc::new(TimerQueue::new()),
            interrupt: Interrupt::new(),
        };
        let realm = Realm::boot(
            Entry::Bootstrap {
                code,
                ready_event: "load.test",
            },
            ports,
            options,
        );
        (realm, sent)
    }

    fn events(sent: &Arc<Mutex<Vec<String>>>) -> Vec<Message> {
        sent.lock()
            .iter()
            .map(|data| Message::decode(data).expect("decodable"))
            .collect()
    }

    #[test]
    fn test_boot_emits_ready() {
        let (realm, sent) = boot("", &BridgeOptions::new());
        assert!(realm.is_ok());
        let events = events(&sent);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "load.test");
    }

    #[test]
    fn test_realm_moves_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<Realm>();

        let code = "bridge.on('echo', function (a) { bridge.dispatch('echoed', a); });";
        let (realm, sent) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        std::thread::spawn(move || {
            realm
                .deliver(&Message::new("echo", vec![codec::Value::from(7)]).encode(), None)
                .expect("delivered");
        })
        .join()
        .expect("thread");

        let events = events(&sent);
        assert_eq!(events[1].event, "echoed");
        assert_eq!(events[1].args, vec![codec::Value::from(7)]);
    }

    #[test]
    fn test_boot_script_error_is_verbatim() {
        let (realm, sent) = boot("throw new TypeError('bad boot');", &BridgeOptions::new());
        let err = realm.err().expect("boot fails");
        assert_eq!(err.to_string(), "TypeError: bad boot");
        assert!(matches!(err, Error::BootScript { .. }));
        assert!(sent.lock().is_empty());
    }

    #[test]
    fn test_deliver_reaches_listeners() {
        let code = "bridge.on('echo', function (a, b) { bridge.dispatch('echoed', b, a); });";
        let (realm, sent) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        let message = Message::new("echo", vec![codec::Value::from(1), codec::Value::from("x")]);
        realm.deliver(&message.encode(), None).expect("delivered");

        let events = events(&sent);
        assert_eq!(events[1].event, "echoed");
        assert_eq!(events[1].args, vec![codec::Value::from("x"), codec::Value::from(1)]);
    }

    #[test]
    fn test_bridge_is_not_global() {
        let code = "bridge.on('inspect', function () { bridge.dispatch('inspected', typeof globalThis.bridge, typeof emit); });";
        let (realm, sent) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        realm
            .deliver(&Message::new("inspect", Vec::new()).encode(), None)
            .expect("delivered");

        let events = events(&sent);
        assert_eq!(
            events[1].args,
            vec![codec::Value::from("undefined"), codec::Value::from("undefined")]
        );
    }

    #[test]
    fn test_listener_throw_is_script_error() {
        let code = "bridge.on('boom', function () { throw new RangeError('nope'); });";
        let (realm, _) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        let err = realm
            .deliver(&Message::new("boom", Vec::new()).encode(), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "RangeError: nope");
    }

    #[test]
    fn test_budget_interrupts_busy_loop() {
        let code = "bridge.on('spin', function () { while (true) {} });";
        let (realm, _) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        let err = realm
            .deliver(
                &Message::new("spin", Vec::new()).encode(),
                Some(Duration::from_millis(50)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::SyncExecutionTimeout { timeout_ms: 50 }));

        // The realm stays usable after an interrupt.
        assert!(realm.deliver(&Message::new("idle", Vec::new()).encode(), None).is_ok());
    }

    #[test]
    fn test_terminate_stops_calls() {
        let (realm, _) = boot("", &BridgeOptions::new());
        let realm = realm.expect("boots");
        realm.interrupt().terminate();

        let err = realm
            .deliver(&Message::new("x", Vec::new()).encode(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_promise_jobs_are_drained() {
        let code = "bridge.on('later', function () { Promise.resolve(5).then(function (v) { bridge.dispatch('done', v); }); });";
        let (realm, sent) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        realm
            .deliver(&Message::new("later", Vec::new()).encode(), None)
            .expect("delivered");
        let events = events(&sent);
        assert_eq!(events[1].event, "done");
        assert_eq!(events[1].args, vec![codec::Value::from(5)]);
    }

    #[test]
    fn test_cycles_cross_into_realm() {
        let code = "bridge.on('loop', function (data) { bridge.dispatch('loop', data.self === data, data); });";
        let (realm, sent) = boot(code, &BridgeOptions::new());
        let realm = realm.expect("boots");

        let object = codec::Object::new();
        object.insert("self", object.clone());
        realm
            .deliver(
                &Message::new("loop", vec![codec::Value::Object(object.clone())]).encode(),
                None,
            )
            .expect("delivered");

        let events = events(&sent);
        assert_eq!(events[1].args[0], codec::Value::Bool(true));
        let echoed = &events[1].args[1];
        assert!(echoed.ptr_eq(&echoed.get("self").expect("self")));
    }

    #[test]
    fn test_timer_globals_reach_host() {
        let code = "var id = setTimeout(function () { bridge.dispatch('tick'); }, 10); bridge.on('fire', function () {});";
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let timers = Arc::new(TimerQueue::new());
        let ports = Ports {
            emit: Arc::new(move |data| sink.lock().push(data)),
            timers: timers.clone(),
            interrupt: Interrupt::new(),
        };
        let realm = Realm::boot(
            Entry::Bootstrap {
                code,
                ready_event: "load.t",
            },
            ports,
            &BridgeOptions::new(),
        )
        .expect("boots");

        let deadline = timers.next_deadline().expect("scheduled");
        let due = timers.take_due(deadline);
        assert_eq!(due, vec![1]);

        realm.fire_timer(due[0], None).expect("fired");
        let events = events(&sent);
        assert_eq!(events.last().map(|m| m.event.as_str()), Some("tick"));
    }

    #[test]
    fn test_document_entry_boots() {
        let document = assets::build_frame_document("bridge.on('x', function () {});", "load.doc");
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let ports = Ports {
            emit: Arc::new(move |data| sink.lock().push(data)),
            timers: Arc::new(TimerQueue::new()),
            interrupt: Interrupt::new(),
        };

        let realm = Realm::boot(Entry::Document(&document), ports, &BridgeOptions::new());
        assert!(realm.is_ok());
        assert_eq!(events(&sent)[0].event, "load.doc");
    }

    #[test]
    fn test_document_boot_error() {
        let document = assets::build_frame_document("null.x;", "load.doc");
        let ports = Ports {
            emit: Arc::new(|_| {}),
            timers: Arc::new(TimerQueue::new()),
            interrupt: Interrupt::new(),
        };

        let err = Realm::boot(Entry::Document(&document), ports, &BridgeOptions::new())
            .err()
            .expect("boot fails");
        assert!(matches!(err, Error::BootScript { .. }));
        assert!(err.to_string().starts_with("TypeError"));
    }
}
