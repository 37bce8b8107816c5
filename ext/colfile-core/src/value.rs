use ordered_float::OrderedFloat;
use std::sync::Arc;

use crate::types::Decimal;

/// A single cell of a [`crate::Column`], used for row access and for building
/// columns from row-oriented data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    // Numeric types
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    Decimal(Decimal),

    // Basic types
    Boolean(bool),
    String(Arc<str>),

    // Complex types
    List(Vec<Value>),
    Struct(Vec<Value>), // positional, in field order

    // Null value
    Null,
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of the value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Decimal(_) => "Decimal",
            Value::Boolean(_) => "Boolean",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Struct(_) => "Struct",
            Value::Null => "Null",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(OrderedFloat(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(OrderedFloat(v))
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_creation() {
        let v = Value::Int32(42);
        assert_eq!(v, Value::Int32(42));
        assert!(!v.is_null());
        assert_eq!(v.type_name(), "Int32");
    }

    #[test]
    fn test_null_value() {
        let v = Value::from(None::<i64>);
        assert!(v.is_null());
        assert_eq!(v.type_name(), "Null");
    }

    #[test]
    fn test_float_equality() {
        assert_eq!(Value::from(3.5f32), Value::from(3.5f32));
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
    }

    #[test]
    fn test_decimal_values_compare_numerically() {
        assert_eq!(
            Value::Decimal(Decimal::new(100, 2)),
            Value::Decimal(Decimal::new(1, 0))
        );
    }

    #[test]
    fn test_hash_consistency() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(Value::from("rapids"));
        set.insert(Value::List(vec![Value::Int64(1), Value::Null]));
        assert!(set.contains(&Value::from("rapids")));
        assert!(set.contains(&Value::List(vec![Value::Int64(1), Value::Null])));
        assert!(!set.contains(&Value::Struct(vec![])));
    }
}
