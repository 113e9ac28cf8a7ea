//! Equality Strategies
//!
//! Each watcher picks how its consecutive values are compared.
//!
//! - [`Equality::Identity`] compares primitives by value and arrays/objects by
//!   handle. Mutating a watched array in place is *not* a change.
//! - [`Equality::Deep`] compares structurally, and snapshots the observed
//!   value with [`Value::deep_copy`] so later in-place mutation of the
//!   original cannot rewrite the stored "last" value.
//!
//! In both modes `NaN` is equal to `NaN`.

use std::rc::Rc;

use crate::value::Value;

/// How a watcher decides whether its value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Equality {
    /// Reference identity for arrays/objects, value equality for primitives.
    #[default]
    Identity,

    /// Structural equality with deep-copied snapshots.
    Deep,
}

impl Equality {
    /// Whether `new` and `old` count as the same value under this strategy.
    pub fn are_equal(self, new: &Value, old: &Value) -> bool {
        match self {
            Equality::Identity => identical(new, old),
            Equality::Deep => deep_equal(new, old),
        }
    }

    /// The value to remember as "last" after observing `value`.
    pub fn snapshot(self, value: &Value) -> Value {
        match self {
            Equality::Identity => value.clone(),
            Equality::Deep => value.deep_copy(),
        }
    }
}

/// Identity comparison.
pub fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Structural comparison.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| deep_equal(l, r)))
        }
        _ => identical(a, b),
    }
}

fn numbers_equal(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_treats_nan_as_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(Equality::Identity.are_equal(&nan, &nan.clone()));
        assert!(!Equality::Identity.are_equal(&nan, &Value::from(0)));
    }

    #[test]
    fn identity_compares_collections_by_handle() {
        let a = Value::array([1, 2, 3]);
        let same = a.clone();
        let lookalike = Value::array([1, 2, 3]);

        assert!(Equality::Identity.are_equal(&a, &same));
        assert!(!Equality::Identity.are_equal(&a, &lookalike));
    }

    #[test]
    fn identity_distinguishes_null_and_undefined() {
        assert!(!identical(&Value::Null, &Value::Undefined));
        assert!(!identical(&Value::from(1), &Value::from("1")));
    }

    #[test]
    fn deep_compares_structure() {
        let a = Value::object([("xs", Value::array([1, 2])), ("n", Value::from("x"))]);
        let b = Value::object([("xs", Value::array([1, 2])), ("n", Value::from("x"))]);
        let c = Value::object([("xs", Value::array([1, 3])), ("n", Value::from("x"))]);

        assert!(Equality::Deep.are_equal(&a, &b));
        assert!(!Equality::Deep.are_equal(&a, &c));
    }

    #[test]
    fn deep_object_key_sets_must_match() {
        let a = Value::object([("a", 1)]);
        let b = Value::object([("b", 1)]);
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn snapshot_copies_only_in_deep_mode() {
        let a = Value::array([1]);

        let shallow = Equality::Identity.snapshot(&a);
        let deep = Equality::Deep.snapshot(&a);
        a.push(2).unwrap();

        assert_eq!(shallow.len(), Some(2));
        assert_eq!(deep.len(), Some(1));
    }
}
