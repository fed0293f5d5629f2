//! Entity descriptors
//!
//! Every persistable type implements [`Entity`] to describe its table:
//! - the schema version, compared against the stored version at registration
//! - a single primary key field, or an ordered composite key
//! - transient fields, which are never written to the store
//! - by-name access to field values in store form
//!
//! The [`entity!`](crate::entity!) macro writes the implementation for plain
//! structs whose fields implement [`FieldValue`](crate::FieldValue).

use crate::value::{FieldValue, Value};
use crate::Result;

/// Store-side column kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Blob,
    /// A field with no store representation. Only valid when transient.
    Unmapped,
}

impl FieldKind {
    /// SQL column type used in `CREATE TABLE`
    pub fn sql_type(&self) -> Option<&'static str> {
        match self {
            FieldKind::Integer => Some("INTEGER"),
            FieldKind::Real => Some("REAL"),
            FieldKind::Text => Some("TEXT"),
            FieldKind::Blob => Some("BLOB"),
            FieldKind::Unmapped => None,
        }
    }

    /// Whether a non-null store value belongs to this kind
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::Integer, Value::Integer(_))
                | (FieldKind::Real, Value::Real(_))
                | (FieldKind::Text, Value::Text(_))
                | (FieldKind::Blob, Value::Blob(_))
        )
    }
}

/// A declared field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl Field {
    /// Describe a field from its Rust type
    pub const fn of<T: FieldValue>(name: &'static str) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
        }
    }

    /// Describe a field that has no store representation
    pub const fn unmapped(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Unmapped,
            nullable: true,
        }
    }
}

/// How rows of an entity are identified.
///
/// A composite key lists its fields most significant first; that order is
/// used for key tuples and for the generated `WHERE` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDef {
    Primary(&'static str),
    Composite(&'static [&'static str]),
}

impl KeyDef {
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            KeyDef::Primary(field) => vec![*field],
            KeyDef::Composite(fields) => fields.to_vec(),
        }
    }
}

/// Schema descriptor of a persistable type.
///
/// Materialized rows start from `Default::default()`; transient fields keep
/// their default value.
pub trait Entity: Default + 'static {
    /// Table name, also the key of the version record
    fn table_name() -> &'static str;

    /// Schema version, starting at 1
    fn version() -> u32;

    /// All declared fields in declaration order, transient ones included
    fn fields() -> &'static [Field];

    fn key() -> KeyDef;

    fn transient_fields() -> &'static [&'static str] {
        &[]
    }

    fn read_field(&self, field: &str) -> Result<Value>;

    fn write_field(&mut self, field: &str, value: Value) -> Result<()>;
}

/// Implement [`Entity`] for a struct.
///
/// ```
/// use entity_manager::entity;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Account {
///     id: i64,
///     owner: String,
///     balance: i64,
///     cached_label: Option<std::rc::Rc<str>>,
/// }
///
/// entity!(Account {
///     table: "accounts",
///     version: 1,
///     primary_key: id,
///     fields: { id: i64, owner: String, balance: i64 },
///     transient: { cached_label: Option<std::rc::Rc<str>> },
/// });
/// ```
///
/// Composite keys use `composite_key: [a, b]` in place of `primary_key`.
#[macro_export]
macro_rules! entity {
    (
        $ty:ident {
            table: $table:expr,
            version: $version:expr,
            primary_key: $pk:ident,
            fields: { $($field:ident : $fty:ty),+ $(,)? }
            $(, transient: { $($tfield:ident : $tty:ty),* $(,)? })?
            $(,)?
        }
    ) => {
        $crate::entity!(@impl $ty, $table, $version,
            $crate::KeyDef::Primary(stringify!($pk)),
            { $($field : $fty),+ },
            { $($($tfield),*)? });
    };
    (
        $ty:ident {
            table: $table:expr,
            version: $version:expr,
            composite_key: [$($ck:ident),+ $(,)?],
            fields: { $($field:ident : $fty:ty),+ $(,)? }
            $(, transient: { $($tfield:ident : $tty:ty),* $(,)? })?
            $(,)?
        }
    ) => {
        $crate::entity!(@impl $ty, $table, $version,
            $crate::KeyDef::Composite(&[$(stringify!($ck)),+]),
            { $($field : $fty),+ },
            { $($($tfield),*)? });
    };
    (@impl $ty:ident, $table:expr, $version:expr, $key:expr,
        { $($field:ident : $fty:ty),+ },
        { $($tfield:ident),* }
    ) => {
        impl $crate::Entity for $ty {
            fn table_name() -> &'static str {
                $table
            }

            fn version() -> u32 {
                $version
            }

            fn fields() -> &'static [$crate::Field] {
                const FIELDS: &[$crate::Field] = &[
                    $($crate::Field::of::<$fty>(stringify!($field)),)+
                    $($crate::Field::unmapped(stringify!($tfield)),)*
                ];
                FIELDS
            }

            fn key() -> $crate::KeyDef {
                $key
            }

            fn transient_fields() -> &'static [&'static str] {
                &[$(stringify!($tfield)),*]
            }

            fn read_field(&self, field: &str) -> $crate::Result<$crate::Value> {
                $(
                    if field == stringify!($field) {
                        return <$fty as $crate::FieldValue>::to_value(&self.$field)
                            .map_err(|e| $crate::Error::unsupported($table, field, e));
                    }
                )+
                Err($crate::Error::unknown_field($table, field))
            }

            fn write_field(&mut self, field: &str, value: $crate::Value) -> $crate::Result<()> {
                $(
                    if field == stringify!($field) {
                        self.$field = <$fty as $crate::FieldValue>::from_value(value)
                            .map_err(|e| $crate::Error::unsupported($table, field, e))?;
                        return Ok(());
                    }
                )+
                Err($crate::Error::unknown_field($table, field))
            }
        }
    };
}
