//! A [`Transform`] reshapes values on their way out of the decoder and back into
//! the encoder:
//! - **Forward**: applied to the decoded value before it is stored in the tree.
//! - **Reverse**: applied to the tree value before it is serialized.
//!
//! Numeric transforms built with [`Transform::linear`] derive their reverse
//! automatically as `(value - offset) / scale`, so decode and encode stay
//! symmetric. Arbitrary pairs can be supplied with [`Transform::new`].
//!
//! ## Example
//!
//! ```
//! use bingrammar::{Transform, Value};
//!
//! let t = Transform::linear(2.0, 1.0);
//! assert_eq!(t.apply(Value::UInt(10)), Value::Float(21.0));
//! assert_eq!(t.reverse(Value::Float(21.0)), Value::Float(10.0));
//! ```

use std::{fmt, sync::Arc};

use crate::value::Value;

type ValueFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Forward/reverse pair of value mappings.
#[derive(Clone)]
pub struct Transform {
    forward: ValueFn,
    reverse: ValueFn,
    label: &'static str,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.label).finish()
    }
}

impl Transform {
    /// Builds a transform from an arbitrary forward/reverse pair.
    pub fn new<F, R>(forward: F, reverse: R) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
        R: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Transform {
            forward: Arc::new(forward),
            reverse: Arc::new(reverse),
            label: "custom",
        }
    }

    /// Identity in both directions.
    pub fn identity() -> Self {
        Transform {
            forward: Arc::new(|v| v),
            reverse: Arc::new(|v| v),
            label: "identity",
        }
    }

    /// `value * scale + offset` on decode, `(value - offset) / scale` on encode.
    ///
    /// Applying a linear transform always produces a floating-point result.
    /// A zero scale has no inverse; its reverse passes values through unchanged.
    pub fn linear(scale: f64, offset: f64) -> Self {
        Transform {
            forward: Arc::new(move |v| match v.as_f64() {
                Some(x) => Value::Float(x * scale + offset),
                None => v,
            }),
            reverse: Arc::new(move |v| match v.as_f64() {
                Some(x) if scale != 0.0 => Value::Float((x - offset) / scale),
                _ => v,
            }),
            label: "linear",
        }
    }

    /// Integer shift: `value + delta` on decode, `value - delta` on encode.
    /// Typically used to adjust size fields that count a header too.
    pub fn offset(delta: i64) -> Self {
        Transform {
            forward: Arc::new(move |v| shift(v, delta)),
            reverse: Arc::new(move |v| shift(v, -delta)),
            label: "offset",
        }
    }

    /// Applies the forward mapping.
    pub fn apply(&self, value: Value) -> Value {
        (self.forward)(value)
    }

    /// Applies the reverse mapping.
    pub fn reverse(&self, value: Value) -> Value {
        (self.reverse)(value)
    }
}

fn shift(value: Value, delta: i64) -> Value {
    match value {
        Value::UInt(v) => match i64::try_from(v).ok().and_then(|v| v.checked_add(delta)) {
            Some(r) if r >= 0 => Value::UInt(r as u64),
            Some(r) => Value::Int(r),
            None => Value::UInt(v),
        },
        Value::Int(v) => Value::Int(v.saturating_add(delta)),
        Value::Float(v) => Value::Float(v + delta as f64),
        other => other,
    }
}

/// Applies `transform` forward if present.
pub(crate) fn forward(transform: Option<&Transform>, value: Value) -> Value {
    match transform {
        Some(t) => t.apply(value),
        None => value,
    }
}

/// Applies `transform` in reverse if present.
pub(crate) fn backward(transform: Option<&Transform>, value: Value) -> Value {
    match transform {
        Some(t) => t.reverse(value),
        None => value,
    }
}
