// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Entity-to-table binding
//!
//! The Unit-of-Work core never inspects user types beyond serde plus this
//! small capability: which table an entity maps to and which column holds
//! its identifier.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Default identifier column used when a binding does not override it
pub const DEFAULT_KEY_COLUMN: &str = "objectId";

/// Maps an entity type to its backend table.
///
/// Implement this for plain `Serialize` structs to pass them directly to
/// staging methods:
///
/// ```ignore
/// #[derive(Serialize)]
/// struct Person {
///     #[serde(rename = "objectId", skip_serializing_if = "Option::is_none")]
///     object_id: Option<String>,
///     name: String,
/// }
///
/// impl TableBinding for Person {
///     fn table_name() -> &'static str {
///         "Person"
///     }
/// }
/// ```
pub trait TableBinding {
    /// Backend table this entity type is stored in
    fn table_name() -> &'static str;

    /// Column holding the record identifier
    fn key_column() -> &'static str {
        DEFAULT_KEY_COLUMN
    }
}

/// Serialize an entity into a JSON object, rejecting non-object shapes
pub(crate) fn entity_record<T: Serialize>(entity: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::usage(format!(
            "entity must serialize to a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Human-readable JSON type name for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
