//! Store values and field conversions
//!
//! Every persisted field is converted to one of SQLite's primitive column
//! values (integer, real, text, blob, null) through [`FieldValue`]. Keys are
//! ordered lists of such values.

use crate::entity::FieldKind;
use std::fmt;

pub use rusqlite::types::Value;

/// Why a value could not be converted between its Rust and store forms
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {0} out of range for {1}")]
    OutOfRange(String, &'static str),

    /// SQLite stores NaN as NULL
    #[error("NaN cannot be stored as {0}")]
    NotANumber(&'static str),
}

/// Name of a store value's type, for diagnostics
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ValueError {
    ValueError::Mismatch {
        expected,
        found: type_name(found),
    }
}

/// Conversion between a Rust field type and a store column value.
pub trait FieldValue: Sized {
    /// Column kind used when creating the table
    const KIND: FieldKind;
    /// Whether the column accepts NULL
    const NULLABLE: bool = false;

    fn to_value(&self) -> Result<Value, ValueError>;
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

macro_rules! int_field {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                const KIND: FieldKind = FieldKind::Integer;

                fn to_value(&self) -> Result<Value, ValueError> {
                    i64::try_from(*self)
                        .map(Value::Integer)
                        .map_err(|_| ValueError::OutOfRange(self.to_string(), stringify!($ty)))
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(i)
                            .map_err(|_| ValueError::OutOfRange(i.to_string(), stringify!($ty))),
                        other => Err(mismatch("integer", &other)),
                    }
                }
            }
        )*
    };
}

int_field!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> Result<Value, ValueError> {
        Ok(Value::Integer(i64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(i) => Err(ValueError::OutOfRange(i.to_string(), "bool")),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> Result<Value, ValueError> {
        if self.is_nan() {
            return Err(ValueError::NotANumber("f64"));
        }
        Ok(Value::Real(*self))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl FieldValue for f32 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> Result<Value, ValueError> {
        if self.is_nan() {
            return Err(ValueError::NotANumber("f32"));
        }
        Ok(Value::Real(f64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Result<Value, ValueError> {
        Ok(Value::Text(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: FieldKind = FieldKind::Blob;

    fn to_value(&self) -> Result<Value, ValueError> {
        Ok(Value::Blob(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(mismatch("blob", &other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Result<Value, ValueError> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Identity of a row: one value per key field, in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(display_value).collect();
        if parts.len() == 1 {
            write!(f, "{}", parts[0])
        } else {
            write!(f, "({})", parts.join(", "))
        }
    }
}

/// Render a store value the way it would appear in SQL text
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Anything usable as a row key: single field values, string slices and tuples.
pub trait IntoKey {
    fn into_key(self) -> Result<Key, ValueError>;
}

impl IntoKey for Key {
    fn into_key(self) -> Result<Key, ValueError> {
        Ok(self)
    }
}

impl<T: FieldValue> IntoKey for T {
    fn into_key(self) -> Result<Key, ValueError> {
        Ok(Key(vec![self.to_value()?]))
    }
}

impl IntoKey for &str {
    fn into_key(self) -> Result<Key, ValueError> {
        Ok(Key(vec![Value::Text(self.to_string())]))
    }
}

macro_rules! tuple_key {
    ($($name:ident),+) => {
        impl<$($name: IntoKey),+> IntoKey for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_key(self) -> Result<Key, ValueError> {
                let ($($name,)+) = self;
                let mut values = Vec::new();
                $(values.extend($name.into_key()?.into_values());)+
                Ok(Key(values))
            }
        }
    };
}

tuple_key!(A, B);
tuple_key!(A, B, C);
tuple_key!(A, B, C, D);
