//! Execution targets and per-call options.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::codec::{Object, Value};
use crate::identifiers::ExecutionId;

// ============================================================================
// ExecutionTarget
// ============================================================================

/// What the sandbox should run.
#[derive(Debug, Clone)]
pub enum ExecutionTarget {
    /// Script source, sent as `{script: {exec: source}}`.
    Source(String),
    /// Script lines, sent as `{script: {exec: [lines]}}`.
    Lines(Vec<String>),
    /// An event object passed through untouched.
    Event(Value),
}

impl ExecutionTarget {
    /// Converts the target into its wire value.
    #[must_use]
    pub fn into_value(self) -> Value {
        let exec = match self {
            Self::Event(value) => return value,
            Self::Source(source) => Value::from(source),
            Self::Lines(lines) => Value::Array(lines.into_iter().map(Value::from).collect()),
        };

        let script = Object::new();
        script.insert("exec", exec);
        let target = Object::new();
        target.insert("script", script);
        Value::Object(target)
    }
}

impl From<&str> for ExecutionTarget {
    fn from(source: &str) -> Self {
        Self::Source(source.to_string())
    }
}

impl From<String> for ExecutionTarget {
    fn from(source: String) -> Self {
        Self::Source(source)
    }
}

impl From<Vec<String>> for ExecutionTarget {
    fn from(lines: Vec<String>) -> Self {
        Self::Lines(lines)
    }
}

impl From<Value> for ExecutionTarget {
    fn from(event: Value) -> Self {
        Self::Event(event)
    }
}

impl From<Object> for ExecutionTarget {
    fn from(event: Object) -> Self {
        Self::Event(Value::Object(event))
    }
}

// ============================================================================
// ExecuteOptions
// ============================================================================

/// Options for one [`Sandbox::execute`](super::Sandbox::execute) call.
///
/// Unset fields fall back to the sandbox defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Execution id; a UUID is generated when unset.
    pub id: Option<ExecutionId>,

    /// Debug flag forwarded to the sandbox.
    pub debug: Option<bool>,

    /// Execution timeout.
    pub timeout: Option<Duration>,

    /// Caller cursor, echoed back on console and result events.
    pub cursor: Option<Object>,

    /// Execution context handed to the script.
    pub context: Option<Value>,

    /// Legacy globals forwarded untouched.
    pub legacy: Option<Value>,

    /// Emit console arguments as one encoded string instead of spreading
    /// them (see [`codec::decode`](crate::codec::decode)).
    pub serialize_logs: bool,
}

impl ExecuteOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution id.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ExecutionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the debug flag.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Sets the execution timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cursor.
    #[inline]
    #[must_use]
    pub fn with_cursor(mut self, cursor: Object) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Sets the context.
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: impl Into<Value>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets the legacy globals.
    #[inline]
    #[must_use]
    pub fn with_legacy(mut self, legacy: impl Into<Value>) -> Self {
        self.legacy = Some(legacy.into());
        self
    }

    /// Keeps console arguments encoded on the host `console` event.
    #[inline]
    #[must_use]
    pub fn with_serialize_logs(mut self, serialize_logs: bool) -> Self {
        self.serialize_logs = serialize_logs;
        self
    }
}

// ============================================================================
// Wire Arguments
// ============================================================================

/// Builds the cursor sent with an execution.
///
/// The caller's cursor is copied, never mutated.
pub(crate) fn execution_cursor(cursor: Option<&Object>, id: &ExecutionId) -> Object {
    let cursor = cursor.map_or_else(Object::new, Object::shallow_clone);
    cursor.insert("execution", id.as_str());
    cursor
}

/// Builds the settings object sent with an execution.
pub(crate) fn execution_settings(
    cursor: Object,
    debug: bool,
    timeout: Option<Duration>,
    legacy: Option<Value>,
) -> Value {
    let settings = Object::new();
    settings.insert("cursor", cursor);
    settings.insert("debug", debug);
    if let Some(timeout) = timeout {
        settings.insert("timeout", timeout.as_millis() as f64);
    }
    if let Some(legacy) = legacy {
        settings.insert("legacy", legacy);
    }
    Value::Object(settings)
}

/// Spreads a console arguments list into positional event arguments.
pub(crate) fn spread(list: Option<&Value>) -> Vec<Value> {
    match list {
        Some(Value::Array(items)) => items.to_vec(),
        Some(Value::Undefined) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

// ============================================================================
// Tests
// ============================================================================
