//! Message envelope.
//!
//! A [`Message`] is an event name plus positional arguments. On the wire it
//! is the codec encoding of the array `[event, ...args]`, so arguments may
//! share references with each other.

// ============================================================================
// Imports
// ============================================================================

use crate::codec::{self, Array, Value};
use crate::error::{Error, Result};

// ============================================================================
// Message
// ============================================================================

/// A named event with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Event name.
    pub event: String,

    /// Positional arguments.
    pub args: Vec<Value>,
}

impl Message {
    /// Creates a new message.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Returns the event prefix before the first `.`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let message = Message::new("execution.result.abc", vec![]);
    /// assert_eq!(message.namespace(), "execution");
    /// ```
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.event.split('.').next().unwrap_or_default()
    }

    /// Encodes the message into its wire string.
    #[must_use]
    pub fn encode(&self) -> String {
        let frame = Array::new();
        frame.push(self.event.as_str());
        for arg in &self.args {
            frame.push(arg.clone());
        }
        codec::encode(&Value::Array(frame))
    }

    /// Decodes a wire string into a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload is malformed, is not an array
    /// or does not start with a string event name.
    pub fn decode(data: &str) -> Result<Self> {
        let value = codec::decode(data)?;
        let Some(frame) = value.as_array() else {
            return Err(Error::decode("message payload is not an argument list"));
        };

        let mut items = frame.to_vec().into_iter();
        let event = match items.next() {
            Some(Value::String(event)) => event,
            _ => return Err(Error::decode("message has no event name")),
        };

        Ok(Self {
            event,
            args: items.collect(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
