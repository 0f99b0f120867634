//! The runtime value model.
//!
//! Values are a tagged union. Containers use shared handles so frames and
//! host code can see each other's mutations, but identity is never
//! observable: equality is structural all the way down.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::fields::{fields_equal, FieldsRef};

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// Ordered sequence.
    Array(Rc<RefCell<Vec<Value>>>),
    /// String-keyed map preserving insertion order.
    StringMap(Rc<RefCell<IndexMap<String, Value>>>),
    /// Integer-keyed map preserving insertion order.
    IntMap(Rc<RefCell<IndexMap<i64, Value>>>),
    /// A fields-capability object (character frame, state frame, or a host
    /// object).
    Fields(FieldsRef),
}

impl Value {
    /// Build an array value.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Build a string map value.
    pub fn string_map(entries: IndexMap<String, Value>) -> Value {
        Value::StringMap(Rc::new(RefCell::new(entries)))
    }

    /// Build an integer map value.
    pub fn int_map(entries: IndexMap<i64, Value>) -> Value {
        Value::IntMap(Rc::new(RefCell::new(entries)))
    }

    /// Condition truthiness: non-null, non-zero, non-empty-string.
    /// Containers and fields objects are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::String(v) => !v.is_empty(),
            Value::Array(_) | Value::StringMap(_) | Value::IntMap(_) | Value::Fields(_) => true,
        }
    }

    /// The textual rendering used by interpolation.
    ///
    /// Integers render without a decimal point, floats with the shortest
    /// representation that round-trips, `Null` as the empty string.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{v}"),
            Value::Bool(v) => if *v { "true" } else { "false" }.to_string(),
            Value::String(v) => v.clone(),
            Value::Array(items) => {
                let items = items.borrow();
                let parts: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::StringMap(map) => {
                let map = map.borrow();
                let parts: Vec<String> =
                    map.iter().map(|(k, v)| format!("{k}: {}", v.render())).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::IntMap(map) => {
                let map = map.borrow();
                let parts: Vec<String> =
                    map.iter().map(|(k, v)| format!("{k}: {}", v.render())).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Fields(fields) => {
                let fields = fields.borrow();
                let parts: Vec<String> = fields
                    .fields()
                    .into_iter()
                    .map(|key| {
                        let value = fields.get(&key).unwrap_or(Value::Null);
                        format!("{key}: {}", value.render())
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }

    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::StringMap(_) => "string map",
            Value::IntMap(_) => "int map",
            Value::Fields(_) => "fields",
        }
    }

    /// Numeric view, promoting `Int` to `f64`. `None` for non-numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // numeric comparison promotes across int/float
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::StringMap(a), Value::StringMap(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::IntMap(a), Value::IntMap(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Fields(a), Value::Fields(b)) => fields_equal(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::String(v) => write!(f, "String({v:?})"),
            other => write!(f, "{}({})", other.type_name(), other.render()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
