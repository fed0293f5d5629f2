//! Entity types shared by the unit tests

use crate::entity::{Entity, Field, FieldKind, KeyDef};
use crate::value::Value;
use crate::{entity, Error, Result};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(id: i64, owner: &str, balance: i64) -> Self {
        Self {
            id,
            owner: owner.to_string(),
            balance,
        }
    }
}

entity!(Account {
    table: "accounts",
    version: 1,
    primary_key: id,
    fields: { id: i64, owner: String, balance: i64 },
});

/// `Account` after a currency column was added
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AccountV2 {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    pub currency: Option<String>,
}

entity!(AccountV2 {
    table: "accounts",
    version: 2,
    primary_key: id,
    fields: { id: i64, owner: String, balance: i64, currency: Option<String> },
});

/// `Account` at a later version with unchanged columns
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AccountV3 {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
}

entity!(AccountV3 {
    table: "accounts",
    version: 3,
    primary_key: id,
    fields: { id: i64, owner: String, balance: i64 },
});

/// Same table and version as `Account`, different columns
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConflictingAccount {
    pub id: i64,
    pub name: String,
}

entity!(ConflictingAccount {
    table: "accounts",
    version: 1,
    primary_key: id,
    fields: { id: i64, name: String },
});

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    pub scratch: Vec<String>,
}

entity!(Note {
    table: "notes",
    version: 1,
    primary_key: id,
    fields: { id: i64, title: String, body: Option<String> },
    transient: { scratch: Vec<String> },
});

/// Declaration order differs from key order on purpose
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Membership {
    pub user_id: i64,
    pub group_id: i64,
    pub role: String,
}

entity!(Membership {
    table: "memberships",
    version: 1,
    composite_key: [group_id, user_id],
    fields: { user_id: i64, group_id: i64, role: String },
});

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub slug: String,
    pub score: f64,
    pub published: bool,
    pub payload: Vec<u8>,
    pub views: u32,
    pub summary: Option<String>,
}

entity!(Document {
    table: "documents",
    version: 3,
    primary_key: slug,
    fields: {
        slug: String,
        score: f64,
        published: bool,
        payload: Vec<u8>,
        views: u32,
        summary: Option<String>,
    },
});

/// Every column is part of the key
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
}

entity!(Tag {
    table: "tags",
    version: 1,
    primary_key: name,
    fields: { name: String },
});

#[derive(Debug, Default)]
pub struct KeyedOnTransient {
    pub id: i64,
    pub cache: Vec<u8>,
}

entity!(KeyedOnTransient {
    table: "keyed_on_transient",
    version: 1,
    primary_key: cache,
    fields: { id: i64 },
    transient: { cache: Vec<u8> },
});

/// Declares a field with no store form without marking it transient
#[derive(Debug, Default)]
pub struct Unstorable {
    pub id: i64,
}

impl Entity for Unstorable {
    fn table_name() -> &'static str {
        "unstorable"
    }

    fn version() -> u32 {
        1
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[Field::of::<i64>("id"), Field::unmapped("handle")];
        FIELDS
    }

    fn key() -> KeyDef {
        KeyDef::Primary("id")
    }

    fn read_field(&self, field: &str) -> Result<Value> {
        match field {
            "id" => Ok(Value::Integer(self.id)),
            _ => Err(Error::unknown_field("unstorable", field)),
        }
    }

    fn write_field(&mut self, field: &str, _value: Value) -> Result<()> {
        Err(Error::unknown_field("unstorable", field))
    }
}

/// Declares `weight` as real but hands out integers
#[derive(Debug, Default)]
pub struct Gadget {
    pub id: i64,
    pub weight: i64,
}

impl Entity for Gadget {
    fn table_name() -> &'static str {
        "gadgets"
    }

    fn version() -> u32 {
        1
    }

    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::of::<i64>("id"),
            Field {
                name: "weight",
                kind: FieldKind::Real,
                nullable: false,
            },
        ];
        FIELDS
    }

    fn key() -> KeyDef {
        KeyDef::Primary("id")
    }

    fn read_field(&self, field: &str) -> Result<Value> {
        match field {
            "id" => Ok(Value::Integer(self.id)),
            "weight" => Ok(Value::Integer(self.weight)),
            _ => Err(Error::unknown_field("gadgets", field)),
        }
    }

    fn write_field(&mut self, field: &str, _value: Value) -> Result<()> {
        Err(Error::unknown_field("gadgets", field))
    }
}
