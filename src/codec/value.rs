//! Host-side value graph.
//!
//! [`Value`] mirrors the shapes a script value can take on the other side of
//! the boundary. Arrays and objects are shared handles: cloning an [`Object`]
//! clones the reference, so two slots can point at the same object and an
//! object can (transitively) contain itself.
//!
//! Composites live in a shared heap. Links between nodes of one heap are
//! plain indices, so a cycle inside a heap (everything one decoded message
//! holds, or nodes made with [`Object::sibling`]) is freed with its last
//! outside handle. A cycle spanning separately created composites keeps
//! its members alive until one of the links is removed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

// ============================================================================
// Value
// ============================================================================

/// A value that can cross the sandbox boundary.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent marker (`undefined`).
    #[default]
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number (always a double, as in the sandbox).
    Number(f64),
    /// A string.
    String(String),
    /// A shared array handle.
    Array(Array),
    /// A shared object handle.
    Object(Object),
}

impl Value {
    /// Returns `true` for the absent marker.
    #[inline]
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` for `null`.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for `null` or the absent marker.
    #[inline]
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// Returns the boolean, if this is one.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number, if this is one.
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns an owned copy of the string, if this is a string.
    #[inline]
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        self.as_str().map(str::to_string)
    }

    /// Returns the object handle, if this is an object.
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the array handle, if this is an array.
    #[inline]
    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Looks up a property on an object value.
    ///
    /// Returns `None` for non-objects and missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Returns `true` if both values are the same shared array/object.
    ///
    /// Scalars are never identical in this sense.
    #[must_use]
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Renders the value the way the sandbox's `String(value)` would for
    /// scalars; composites render as `[object Object]` / `[object Array]`.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(_) => "[object Array]".to_string(),
            Self::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Identity key for composite values.
    pub(crate) fn identity(&self) -> Option<(usize, usize)> {
        match self {
            Self::Object(o) => Some(o.id()),
            Self::Array(a) => Some(a.id()),
            _ => None,
        }
    }
}

/// Formats a number without a trailing `.0` for integral values.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        n.to_string()
    }
}

// ============================================================================
// Heap
// ============================================================================

/// Storage shared by the nodes of one graph.
///
/// Links between nodes of the same heap are indices, so a cycle inside a
/// heap holds no strong reference to it and is freed with the heap.
struct Heap {
    nodes: RwLock<Vec<Node>>,
}

enum Node {
    Array(Vec<Slot>),
    Object(IndexMap<String, Slot>),
}

/// A stored element. `Value` never holds a handle into its own heap.
enum Slot {
    Value(Value),
    Local(usize),
}

impl Heap {
    fn new(nodes: Vec<Node>) -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(nodes),
        })
    }
}

impl Drop for Heap {
    /// Releases foreign heaps with an explicit stack so long chains of
    /// separately built composites never recurse.
    fn drop(&mut self) {
        let mut orphans = Vec::new();
        take_foreign(self.nodes.get_mut(), &mut orphans);
        while let Some(heap) = orphans.pop() {
            if let Some(mut heap) = Arc::into_inner(heap) {
                take_foreign(heap.nodes.get_mut(), &mut orphans);
            }
        }
    }
}

fn take_foreign(nodes: &mut Vec<Node>, orphans: &mut Vec<Arc<Heap>>) {
    let mut keep = |slot: Slot| {
        if let Slot::Value(Value::Array(Array(handle)) | Value::Object(Object(handle))) = slot {
            orphans.push(handle.heap);
        }
    };
    for node in nodes.drain(..) {
        match node {
            Node::Array(slots) => slots.into_iter().for_each(&mut keep),
            Node::Object(map) => map.into_values().for_each(&mut keep),
        }
    }
}

/// A node reference: the heap plus the node's index in it.
#[derive(Clone)]
struct Handle {
    heap: Arc<Heap>,
    index: usize,
}

impl Handle {
    fn alone(node: Node) -> Self {
        Self {
            heap: Heap::new(vec![node]),
            index: 0,
        }
    }

    fn alloc(heap: &Arc<Heap>, node: Node) -> Self {
        let mut nodes = heap.nodes.write();
        nodes.push(node);
        Self {
            heap: Arc::clone(heap),
            index: nodes.len() - 1,
        }
    }

    #[inline]
    fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.heap, &other.heap) && self.index == other.index
    }

    #[inline]
    fn id(&self) -> (usize, usize) {
        (Arc::as_ptr(&self.heap) as usize, self.index)
    }

    /// Turns a value into a slot of this heap.
    fn store(&self, value: Value) -> Slot {
        let local = match &value {
            Value::Array(Array(handle)) | Value::Object(Object(handle))
                if Arc::ptr_eq(&handle.heap, &self.heap) =>
            {
                Some(handle.index)
            }
            _ => None,
        };
        match local {
            Some(index) => Slot::Local(index),
            None => Slot::Value(value),
        }
    }

    /// Reads a slot of this heap back as a value.
    fn load(&self, nodes: &[Node], slot: &Slot) -> Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::Local(index) => {
                let handle = Handle {
                    heap: Arc::clone(&self.heap),
                    index: *index,
                };
                match nodes.get(*index) {
                    Some(Node::Array(_)) => Value::Array(Array(handle)),
                    Some(Node::Object(_)) => Value::Object(Object(handle)),
                    None => Value::Undefined,
                }
            }
        }
    }
}

/// Allocates composites that share one heap.
///
/// Used by the decoder so cycles inside a message are freed with it.
pub(crate) struct Arena {
    heap: Arc<Heap>,
}

impl Arena {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Heap::new(Vec::with_capacity(capacity)),
        }
    }

    pub(crate) fn array(&self) -> Array {
        Array(Handle::alloc(&self.heap, Node::Array(Vec::new())))
    }

    pub(crate) fn object(&self) -> Object {
        Object(Handle::alloc(&self.heap, Node::Object(IndexMap::new())))
    }
}

// ============================================================================
// Object
// ============================================================================

/// Shared, insertion-ordered object handle.
#[derive(Clone)]
pub struct Object(Handle);

impl Default for Object {
    fn default() -> Self {
        Self(Handle::alone(Node::Object(IndexMap::new())))
    }
}

impl Object {
    /// Creates an empty object.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty object in the same graph as `self`.
    ///
    /// Cycles between objects of one graph are freed once the last outside
    /// handle goes away; cycles across graphs live until a link is removed.
    #[must_use]
    pub fn sibling(&self) -> Object {
        Object(Handle::alloc(&self.0.heap, Node::Object(IndexMap::new())))
    }

    fn read<R>(&self, f: impl FnOnce(&IndexMap<String, Slot>, &[Node]) -> R) -> Option<R> {
        let nodes = self.0.heap.nodes.read();
        match nodes.get(self.0.index) {
            Some(Node::Object(map)) => Some(f(map, &nodes)),
            _ => None,
        }
    }

    /// Inserts or replaces a property, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let slot = self.0.store(value.into());
        let previous = {
            let mut nodes = self.0.heap.nodes.write();
            let Some(Node::Object(map)) = nodes.get_mut(self.0.index) else {
                return None;
            };
            let previous = map.insert(key.into(), slot)?;
            (self.0.load(&nodes, &previous), previous)
        };
        Some(previous.0)
    }

    /// Returns a property (cloned handle for composites).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(|map, nodes| map.get(key).map(|slot| self.0.load(nodes, slot)))
            .flatten()
    }

    /// Removes a property, keeping the order of the rest.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut nodes = self.0.heap.nodes.write();
            let Some(Node::Object(map)) = nodes.get_mut(self.0.index) else {
                return None;
            };
            let removed = map.shift_remove(key)?;
            (self.0.load(&nodes, &removed), removed)
        };
        Some(removed.0)
    }

    /// Returns `true` if the property exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.read(|map, _| map.contains_key(key)).unwrap_or(false)
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|map, _| map.len()).unwrap_or(0)
    }

    /// Returns `true` if there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read(|map, _| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of all entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.read(|map, nodes| {
            map.iter()
                .map(|(k, slot)| (k.clone(), self.0.load(nodes, slot)))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Removes every property.
    pub fn clear(&self) {
        let removed = {
            let mut nodes = self.0.heap.nodes.write();
            match nodes.get_mut(self.0.index) {
                Some(Node::Object(map)) => std::mem::take(map),
                _ => IndexMap::new(),
            }
        };
        drop(removed);
    }

    /// Creates a new object holding the same entries.
    ///
    /// Nested composites stay shared with the original.
    #[must_use]
    pub fn shallow_clone(&self) -> Self {
        self.entries().into_iter().collect()
    }

    /// Returns `true` if both handles point at the same object.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.0.ptr_eq(&other.0)
    }

    #[inline]
    pub(crate) fn id(&self) -> (usize, usize) {
        self.0.id()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), Slot::Value(v.into())))
            .collect::<IndexMap<_, _>>();
        Self(Handle::alone(Node::Object(map)))
    }
}

// ============================================================================
// Array
// ============================================================================

/// Shared array handle.
#[derive(Clone)]
pub struct Array(Handle);

impl Default for Array {
    fn default() -> Self {
        Self(Handle::alone(Node::Array(Vec::new())))
    }
}

impl Array {
    /// Creates an empty array.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&[Slot], &[Node]) -> R) -> Option<R> {
        let nodes = self.0.heap.nodes.read();
        match nodes.get(self.0.index) {
            Some(Node::Array(items)) => Some(f(items, &nodes)),
            _ => None,
        }
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<Value>) {
        let slot = self.0.store(value.into());
        let mut nodes = self.0.heap.nodes.write();
        if let Some(Node::Array(items)) = nodes.get_mut(self.0.index) {
            items.push(slot);
        }
    }

    /// Returns the element at `index` (cloned handle for composites).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.read(|items, nodes| items.get(index).map(|slot| self.0.load(nodes, slot)))
            .flatten()
    }

    /// Replaces the element at `index`, growing with absent markers if needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let slot = self.0.store(value.into());
        let replaced = {
            let mut nodes = self.0.heap.nodes.write();
            let Some(Node::Array(items)) = nodes.get_mut(self.0.index) else {
                return;
            };
            if index >= items.len() {
                items.resize_with(index + 1, || Slot::Value(Value::Undefined));
            }
            std::mem::replace(&mut items[index], slot)
        };
        drop(replaced);
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|items, _| items.len()).unwrap_or(0)
    }

    /// Returns `true` if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.read(|items, nodes| items.iter().map(|slot| self.0.load(nodes, slot)).collect())
            .unwrap_or_default()
    }

    /// Removes every element.
    pub fn clear(&self) {
        let removed = {
            let mut nodes = self.0.heap.nodes.write();
            match nodes.get_mut(self.0.index) {
                Some(Node::Array(items)) => std::mem::take(items),
                _ => Vec::new(),
            }
        };
        drop(removed);
    }

    /// Returns `true` if both handles point at the same array.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Array) -> bool {
        self.0.ptr_eq(&other.0)
    }

    #[inline]
    pub(crate) fn id(&self) -> (usize, usize) {
        self.0.id()
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let items = iter
            .into_iter()
            .map(|v| Slot::Value(v.into()))
            .collect::<Vec<_>>();
        Self(Handle::alone(Node::Array(items)))
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        items.into_iter().collect()
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Value {
    /// Converts to a JSON tree the way `JSON.stringify` would: absent
    /// properties are skipped, absent array slots become `null`, non-finite
    /// numbers become `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the graph is cyclic.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut ancestors = Vec::new();
        to_json_inner(self, &mut ancestors)
    }
}

fn to_json_inner(value: &Value, ancestors: &mut Vec<(usize, usize)>) -> Result<JsonValue> {
    if let Some(id) = value.identity() {
        if ancestors.contains(&id) {
            return Err(Error::invalid_argument(
                "cannot convert a cyclic value to JSON",
            ));
        }
        ancestors.push(id);
    }

    let json = match value {
        Value::Undefined | Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Array(array) => {
            let mut items = Vec::with_capacity(array.len());
            for item in array.to_vec() {
                items.push(to_json_inner(&item, ancestors)?);
            }
            JsonValue::Array(items)
        }
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            for (key, item) in object.entries() {
                if item.is_undefined() {
                    continue;
                }
                map.insert(key, to_json_inner(&item, ancestors)?);
            }
            JsonValue::Object(map)
        }
    };

    if value.identity().is_some() {
        ancestors.pop();
    }
    Ok(json)
}

/// Integral doubles become JSON integers so the wire stays compact.
pub(crate) fn number_to_json(n: f64) -> JsonValue {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE && !(n == 0.0 && n.is_sign_negative()) {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

// ============================================================================
// Structural Equality
// ============================================================================

impl PartialEq for Value {
    /// Structural, cycle-aware comparison.
    ///
    /// Pairs of composites already under comparison are assumed equal, so
    /// two isomorphic cyclic graphs compare equal.
    fn eq(&self, other: &Self) -> bool {
        let mut assumed: FxHashSet<((usize, usize), (usize, usize))> = FxHashSet::default();
        let mut stack = vec![(self.clone(), other.clone())];

        while let Some((a, b)) = stack.pop() {
            match (&a, &b) {
                (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => {}
                (Value::Bool(x), Value::Bool(y)) if x == y => {}
                (Value::Number(x), Value::Number(y)) if x == y || (x.is_nan() && y.is_nan()) => {}
                (Value::String(x), Value::String(y)) if x == y => {}
                (Value::Array(x), Value::Array(y)) => {
                    if !assumed.insert((x.id(), y.id())) {
                        continue;
                    }
                    let (xs, ys) = (x.to_vec(), y.to_vec());
                    if xs.len() != ys.len() {
                        return false;
                    }
                    stack.extend(xs.into_iter().zip(ys));
                }
                (Value::Object(x), Value::Object(y)) => {
                    if !assumed.insert((x.id(), y.id())) {
                        continue;
                    }
                    if x.len() != y.len() {
                        return false;
                    }
                    for (key, item) in x.entries() {
                        match y.get(&key) {
                            Some(other_item) => stack.push((item, other_item)),
                            None => return false,
                        }
                    }
                }
                _ => return false,
            }
        }

        true
    }
}

// ============================================================================
// Debug
// ============================================================================

impl fmt::Debug for Value {
    /// Iterative, so deep graphs print without growing the call stack.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ancestors: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut stack = vec![Piece::Value(self.clone())];

        while let Some(piece) = stack.pop() {
            let value = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Key(key) => {
                    write!(f, "{key:?}: ")?;
                    continue;
                }
                Piece::Leave(id) => {
                    ancestors.remove(&id);
                    continue;
                }
                Piece::Value(value) => value,
            };

            if let Some(id) = value.identity() {
                if !ancestors.insert(id) {
                    f.write_str("[Circular]")?;
                    continue;
                }
                stack.push(Piece::Leave(id));
            }

            match value {
                Value::Undefined => f.write_str("undefined")?,
                Value::Null => f.write_str("null")?,
                Value::Bool(b) => write!(f, "{b}")?,
                Value::Number(n) => f.write_str(&format_number(n))?,
                Value::String(s) => write!(f, "{s:?}")?,
                Value::Array(array) => {
                    f.write_str("[")?;
                    stack.push(Piece::Text("]"));
                    for (i, item) in array.to_vec().into_iter().enumerate().rev() {
                        stack.push(Piece::Value(item));
                        if i > 0 {
                            stack.push(Piece::Text(", "));
                        }
                    }
                }
                Value::Object(object) => {
                    f.write_str("{")?;
                    stack.push(Piece::Text("}"));
                    for (i, (key, item)) in object.entries().into_iter().enumerate().rev() {
                        stack.push(Piece::Value(item));
                        stack.push(Piece::Key(key));
                        if i > 0 {
                            stack.push(Piece::Text(", "));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Pending output of the debug walk.
enum Piece {
    Value(Value),
    Key(String),
    Text(&'static str),
    Leave((usize, usize)),
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Object(self.clone()), f)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Array(self.clone()), f)
    }
}

// ============================================================================
// Tests
// ============================================================================
