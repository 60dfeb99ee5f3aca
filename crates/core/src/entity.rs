// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Business entities tracked by stockbook.
//!
//! Records are schemaless JSON objects keyed by id. The remote store owns
//! validation; locally a record is just an id plus whatever fields the user
//! entered and the server assigned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kinds of records the application manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customers,
    Products,
    Sales,
}

impl EntityType {
    /// All entity types, in display order.
    pub const ALL: [EntityType; 3] = [
        EntityType::Customers,
        EntityType::Products,
        EntityType::Sales,
    ];

    /// Returns the string representation used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customers => "customers",
            EntityType::Products => "products",
            EntityType::Sales => "sales",
        }
    }

    /// Short prefix used for locally generated ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityType::Customers => "cus",
            EntityType::Products => "prd",
            EntityType::Sales => "sal",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "customers" | "customer" => Ok(EntityType::Customers),
            "products" | "product" => Ok(EntityType::Products),
            "sales" | "sale" => Ok(EntityType::Sales),
            _ => Err(Error::InvalidEntityType(s.to_string())),
        }
    }
}

/// A single stored record.
///
/// Serialized flat: `{"id": "cus-1a2b3c4d", "name": "Ali", "phone": "555"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record, dropping any stray `id` key from the fields.
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        Record {
            id: id.into(),
            fields,
        }
    }

    /// Builds a record from an arbitrary JSON value.
    ///
    /// The value must be an object carrying a non-empty string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::InvalidRecord("expected a JSON object".to_string()));
        };
        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => return Err(Error::InvalidRecord("id must be a string".to_string())),
            None => return Err(Error::InvalidRecord("missing id".to_string())),
        };
        Ok(Record { id, fields })
    }

    /// Returns a copy with `patch` applied over the current fields.
    ///
    /// A `null` in the patch removes the field.
    pub fn patched(&self, patch: &Map<String, Value>) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            if value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }
        Record {
            id: self.id.clone(),
            fields,
        }
    }

    /// Returns a string field, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Checks the minimal shape the authoritative store requires.
///
/// Customers and products need a non-empty `name`; sales need a numeric,
/// non-negative `total`.
pub fn validate_record(entity: EntityType, record: &Record) -> std::result::Result<(), String> {
    match entity {
        EntityType::Customers | EntityType::Products => match record.get_str("name") {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(format!("{} require a non-empty name", entity)),
        },
        EntityType::Sales => match record.fields.get("total").and_then(Value::as_f64) {
            Some(total) if total >= 0.0 => Ok(()),
            Some(_) => Err("sale total cannot be negative".to_string()),
            None => Err("sales require a numeric total".to_string()),
        },
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
