//! The fields capability.
//!
//! Character frames and state frames are accessed through one small
//! interface, so a host can back characters with its own game objects. The
//! default backing is a string-keyed map that preserves declaration order.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use loreline_par::NodeId;

use crate::value::Value;

/// The backing object of a character or state frame.
pub trait Fields {
    /// Read a field, `None` when absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a field, creating it if needed.
    fn set(&mut self, key: &str, value: Value);

    /// True if the field exists.
    fn exists(&self, key: &str) -> bool;

    /// Remove a field; returns whether it existed.
    fn remove(&mut self, key: &str) -> bool;

    /// Field names in declaration order.
    fn fields(&self) -> Vec<String>;
}

/// Shared handle to a fields object.
pub type FieldsRef = Rc<RefCell<dyn Fields>>;

/// What a frame being created is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// A character's frame.
    Character,
    /// The global state frame (or the transient-global frame).
    GlobalState,
    /// A beat-local state frame.
    BeatState,
}

/// Context passed to a [`FieldsFactory`] when a frame is instantiated.
#[derive(Clone, Copy, Debug)]
pub struct FieldsContext<'a> {
    pub kind: FrameKind,
    /// Id of the declaring node (`NodeId::ROOT` for the global frames).
    pub node: NodeId,
    /// Character identifier, when `kind` is `Character`.
    pub name: Option<&'a str>,
}

/// Creates fields objects for the interpreter.
///
/// The default implementation hands out [`MapFields`]; hosts install their
/// own factory through the interpreter options to back characters with
/// custom objects.
pub trait FieldsFactory {
    fn create(&self, ctx: FieldsContext<'_>) -> FieldsRef;
}

/// The default factory.
#[derive(Default)]
pub struct MapFieldsFactory;

impl FieldsFactory for MapFieldsFactory {
    fn create(&self, _ctx: FieldsContext<'_>) -> FieldsRef {
        MapFields::new_ref()
    }
}

/// Default map-backed fields object.
#[derive(Default)]
pub struct MapFields {
    entries: IndexMap<String, Value>,
}

impl MapFields {
    pub fn new_ref() -> FieldsRef {
        Rc::new(RefCell::new(MapFields::default()))
    }
}

impl Fields for MapFields {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        self.entries.shift_remove(key).is_some()
    }

    fn fields(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Structural equality through the capability: same field-name set, equal
/// values.
pub fn fields_equal(a: &FieldsRef, b: &FieldsRef) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    let a = a.borrow();
    let b = b.borrow();
    let keys = a.fields();
    if keys.len() != b.fields().len() {
        return false;
    }
    keys.into_iter().all(|key| match (a.get(&key), b.get(&key)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    })
}

/// Replace a frame's contents with `entries`.
pub(crate) fn overwrite_fields(frame: &FieldsRef, entries: Vec<(String, Value)>) {
    let mut frame = frame.borrow_mut();
    for key in frame.fields() {
        frame.remove(&key);
    }
    for (key, value) in entries {
        frame.set(&key, value);
    }
}
