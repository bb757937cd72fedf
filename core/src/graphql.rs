//! GraphQL query construction and response projection.
//!
//! # Design
//! The service only ever gets one query shape from this crate: "the first
//! thing of class C whose property P equals V". All three inputs are written
//! as GraphQL string literals, so every one of them goes through
//! [`escape_string`] before it lands in the query text.

use std::fmt;

use serde_json::Value;

use crate::error::ApiError;
use crate::types::GraphQLQuery;

/// Selects the first thing of a class matching one property equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstThingQuery {
    class_name: String,
    property_name: String,
    property_value: String,
}

impl FirstThingQuery {
    pub fn new(class_name: impl Into<String>, property_name: impl Into<String>, property_value: impl fmt::Display) -> Self {
        Self {
            class_name: class_name.into(),
            property_name: property_name.into(),
            property_value: property_value.to_string(),
        }
    }

    pub fn to_query(&self) -> GraphQLQuery {
        let filter = format!("{}:{}", self.property_name, self.property_value);
        GraphQLQuery {
            query: format!(
                "{{listThings(first:1 schema:\"{}\", class:\"{}\") {{things {{uuid}}}}}}",
                escape_string(&filter),
                escape_string(&self.class_name),
            ),
        }
    }
}

/// Escape `raw` for use inside a double-quoted GraphQL string literal.
pub fn escape_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{08}' => escaped.push_str("\\b"),
            '\u{0C}' => escaped.push_str("\\f"),
            c if c.is_control() => escaped.push_str(&format!("\\u{:04X}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `data.listThings.things`, when present and an array.
pub fn listed_things(response: &Value) -> Option<&Vec<Value>> {
    response
        .pointer("/data/listThings/things")
        .and_then(Value::as_array)
}

/// UUID of the first listed thing; `None` when the list is absent or empty.
pub fn first_uuid(response: &Value) -> Result<Option<String>, ApiError> {
    let Some(first) = listed_things(response).and_then(|things| things.first()) else {
        return Ok(None);
    };
    first
        .get("uuid")
        .and_then(Value::as_str)
        .map(|uuid| Some(uuid.to_string()))
        .ok_or_else(|| ApiError::DeserializationError("first listed thing has no uuid".to_string()))
}

/// Every listed thing; `None` when the list is absent or empty.
pub fn all_things(response: &Value) -> Option<Vec<Value>> {
    listed_things(response)
        .filter(|things| !things.is_empty())
        .cloned()
}
