//! Dynamic Values
//!
//! A scope is an open property bag: application state is whatever the
//! embedding code puts on it, with no fixed schema. [`Value`] is the variant
//! type those properties hold.
//!
//! # Reference Semantics
//!
//! Primitives (`Undefined`, `Null`, `Bool`, `Number`, `String`) are plain
//! values. Arrays and objects are *shared handles*: cloning a `Value::Array`
//! clones the `Rc`, not the contents, and mutation goes through the shared
//! `RefCell`. This is what lets the identity equality mode tell "same
//! collection mutated in place" apart from "new collection", and what makes
//! [`Value::deep_copy`] necessary for deep-mode snapshots.
//!
//! Cyclic structures (an array containing itself) are representable but not
//! supported by deep equality or deep copy, which would recurse forever.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{WatchError, WatchResult};
use crate::scope::equality;

/// Shared, interior-mutable array storage.
pub type Array = Rc<RefCell<Vec<Value>>>;

/// Shared, interior-mutable object storage. Keys keep insertion order.
pub type Object = Rc<RefCell<IndexMap<String, Value>>>;

/// A dynamically typed value stored on a scope.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent. Reading a missing scope property yields this.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
}

impl Value {
    /// Build a new array from anything convertible to values.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Array(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// Build a new object from key/value pairs.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    /// Name of the variant, used in type mismatch errors and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Like [`as_str`](Self::as_str), but a mismatch is a [`WatchError`],
    /// so fallible watch functions can use `?`.
    pub fn try_str(&self) -> WatchResult<&str> {
        self.as_str().ok_or_else(|| self.mismatch("string"))
    }

    /// Like [`as_f64`](Self::as_f64), but a mismatch is a [`WatchError`].
    pub fn try_f64(&self) -> WatchResult<f64> {
        self.as_f64().ok_or_else(|| self.mismatch("number"))
    }

    /// Number of elements (arrays), entries (objects) or bytes (strings).
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Array(items) => Some(items.borrow().len()),
            Value::Object(entries) => Some(entries.borrow().len()),
            _ => None,
        }
    }

    /// Element `index` of an array; `Undefined` when out of range or not an
    /// array.
    pub fn at(&self, index: usize) -> Value {
        match self {
            Value::Array(items) => items.borrow().get(index).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Property `key` of an object; `Undefined` when absent or not an
    /// object.
    pub fn field(&self, key: &str) -> Value {
        match self {
            Value::Object(entries) => entries.borrow().get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Append to an array in place. Every handle to the array sees the new
    /// element.
    pub fn push(&self, value: impl Into<Value>) -> WatchResult<()> {
        match self {
            Value::Array(items) => {
                items.borrow_mut().push(value.into());
                Ok(())
            }
            other => Err(other.mismatch("array")),
        }
    }

    /// Overwrite element `index` of an array in place, padding with
    /// `Undefined` when writing past the end.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> WatchResult<()> {
        match self {
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value.into();
                Ok(())
            }
            other => Err(other.mismatch("array")),
        }
    }

    /// Set property `key` of an object in place, returning the old value.
    pub fn set_field(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> WatchResult<Option<Value>> {
        match self {
            Value::Object(entries) => Ok(entries.borrow_mut().insert(key.into(), value.into())),
            other => Err(other.mismatch("object")),
        }
    }

    /// Recursively copy this value so that no array or object handle is
    /// shared with the original.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(items) => Value::Array(Rc::new(RefCell::new(
                items.borrow().iter().map(Value::deep_copy).collect(),
            ))),
            Value::Object(entries) => Value::Object(Rc::new(RefCell::new(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ))),
            primitive => primitive.clone(),
        }
    }

    /// Convert to JSON. `Undefined` and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Json::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Json::Number)
                        .unwrap_or(Json::Null)
                }
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.borrow().iter().map(Value::to_json).collect()),
            Value::Object(entries) => Json::Object(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    fn mismatch(&self, expected: &'static str) -> WatchError {
        WatchError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

/// Structural comparison, with `NaN` equal to itself. This is the deep
/// equality mode; watchers in identity mode do not use `PartialEq`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equality::deep_equal(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::array(items),
            Json::Object(entries) => Value::object(entries),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
