//! Cyclic-safe value codec.
//!
//! Converts value graphs (shared references and cycles included) to and
//! from the flat string form that crosses the sandbox boundary.
//!
//! # Example
//!
//! ```
//! use sandbox_bridge::codec::{self, Object, Value};
//!
//! let node = Object::new();
//! node.insert("self", node.clone());
//!
//! let decoded = codec::decode(&codec::encode(&Value::Object(node.clone())))?;
//! let again = decoded.get("self").expect("present");
//! assert!(decoded.ptr_eq(&again));
//! # Ok::<(), sandbox_bridge::Error>(())
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod value;
mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use value::{Array, Object, Value};
pub use wire::{decode, encode};
