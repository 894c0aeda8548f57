//! Event names shared by the host and the sandbox runner.
//!
//! Execution-scoped events are formed by appending the execution id to a
//! `*_BASE` prefix (see `ExecutionId::scoped`).

/// Generic error event emitted on the host bridge.
pub const ERROR: &str = "error";

/// Liveness check sent to the sandbox.
pub const PING: &str = "ping";

/// Liveness check reply.
pub const PONG: &str = "pong";

/// Starts an execution in the sandbox.
pub const EXECUTE: &str = "execute";

/// Host-side echo of every execution outcome: `(err, id, result)`.
pub const EXECUTION: &str = "execution";

/// Prefix of the per-execution result event.
pub const EXECUTION_RESULT_BASE: &str = "execution.result.";

/// Prefix of the per-execution abort event.
pub const EXECUTION_ABORT_BASE: &str = "execution.abort.";

/// Prefix of the per-execution console event.
pub const EXECUTION_CONSOLE_BASE: &str = "execution.console.";

/// Host-side console event: `(cursor, level, ...args)`.
pub const CONSOLE: &str = "console";

/// Prefix of the readiness event (`load.<connection id>`).
pub const READY_BASE: &str = "load.";
