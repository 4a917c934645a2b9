//! Collection schemas.
//!
//! Payloads are free-form maps, but the app knows the shape of its two
//! collections. A schema checks the JSON type of every known column that a
//! local write sets. Columns the schema does not mention are accepted, so a
//! newer server can add attributes without breaking older clients.

use crate::error::{CoreError, CoreResult};
use rentsync_protocol::Payload;
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the car catalog collection.
pub const CARS: &str = "cars";

/// Name of the signed-in user collection.
pub const USERS: &str = "users";

/// JSON type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
}

impl ColumnType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ColumnType::String => value.is_string(),
            ColumnType::Number => value.is_number(),
            ColumnType::Boolean => value.is_boolean(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
        }
    }
}

/// One column of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Expected JSON type.
    pub ty: ColumnType,
    /// Whether `null` is allowed.
    pub optional: bool,
}

/// Columns of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionSchema {
    columns: BTreeMap<String, Column>,
}

impl CollectionSchema {
    /// Creates an empty collection schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required column.
    #[must_use]
    pub fn column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.insert(
            name.to_string(),
            Column {
                name: name.to_string(),
                ty,
                optional: false,
            },
        );
        self
    }

    /// Adds a column that may be `null`.
    #[must_use]
    pub fn optional_column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.insert(
            name.to_string(),
            Column {
                name: name.to_string(),
                ty,
                optional: true,
            },
        );
        self
    }

    /// Returns the columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }
}

/// Set of known collections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    collections: BTreeMap<String, CollectionSchema>,
    strict: bool,
}

impl Schema {
    /// A schema that accepts every collection and payload.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// The car-rental schema: `cars` and `users`, strict.
    #[must_use]
    pub fn rentx() -> Self {
        let cars = CollectionSchema::new()
            .column("name", ColumnType::String)
            .column("brand", ColumnType::String)
            .column("about", ColumnType::String)
            .column("fuel_type", ColumnType::String)
            .column("period", ColumnType::String)
            .column("price", ColumnType::Number)
            .column("thumbnail", ColumnType::String);

        let users = CollectionSchema::new()
            .column("user_id", ColumnType::String)
            .column("name", ColumnType::String)
            .column("email", ColumnType::String)
            .column("driver_license", ColumnType::String)
            .optional_column("avatar", ColumnType::String)
            .column("token", ColumnType::String);

        Self::permissive()
            .with_collection(CARS, cars)
            .with_collection(USERS, users)
            .strict(true)
    }

    /// Adds or replaces a collection.
    #[must_use]
    pub fn with_collection(mut self, name: &str, collection: CollectionSchema) -> Self {
        self.collections.insert(name.to_string(), collection);
        self
    }

    /// Rejects collections that are not declared when set.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Returns the schema of one collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Returns declared collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Checks the attributes set by a write.
    ///
    /// Only attributes present in `payload` are checked, so partial updates
    /// validate.
    pub fn validate(&self, collection: &str, payload: &Payload) -> CoreResult<()> {
        let Some(schema) = self.collections.get(collection) else {
            if self.strict {
                return Err(CoreError::UnknownCollection {
                    name: collection.to_string(),
                });
            }
            return Ok(());
        };

        for (name, value) in payload {
            let Some(column) = schema.columns.get(name) else {
                continue;
            };
            if value.is_null() {
                if column.optional {
                    continue;
                }
                return Err(CoreError::schema_violation(
                    collection,
                    name,
                    "null not allowed",
                ));
            }
            if !column.ty.matches(value) {
                return Err(CoreError::schema_violation(
                    collection,
                    name,
                    format!("expected {}", column.ty.name()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn rentx_accepts_car() {
        let schema = Schema::rentx();
        let car = payload(json!({
            "name": "Huracan",
            "brand": "Lamborghini",
            "price": 580,
            "fuel_type": "gasoline_motor",
        }));
        schema.validate(CARS, &car).unwrap();
    }

    #[test]
    fn wrong_type_is_rejected() {
        let schema = Schema::rentx();
        let err = schema
            .validate(CARS, &payload(json!({ "price": "580" })))
            .unwrap_err();
        assert!(matches!(err, CoreError::SchemaViolation { ref column, .. } if column == "price"));
    }

    #[test]
    fn null_only_for_optional_columns() {
        let schema = Schema::rentx();
        schema
            .validate(USERS, &payload(json!({ "avatar": null })))
            .unwrap();
        assert!(schema
            .validate(USERS, &payload(json!({ "email": null })))
            .is_err());
    }

    #[test]
    fn unknown_columns_are_tolerated() {
        let schema = Schema::rentx();
        schema
            .validate(CARS, &payload(json!({ "photos": ["a.png"] })))
            .unwrap();
    }

    #[test]
    fn strict_rejects_unknown_collection() {
        let err = Schema::rentx()
            .validate("rentals", &Payload::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownCollection { .. }));
        Schema::permissive()
            .validate("rentals", &Payload::new())
            .unwrap();
    }

    #[test]
    fn collection_names() {
        let schema = Schema::rentx();
        let names: Vec<&str> = schema.collection_names().collect();
        assert_eq!(names, vec![CARS, USERS]);
        assert_eq!(schema.collection(CARS).unwrap().columns().count(), 7);
    }
}
