//! Wire DTOs for request bodies the client shapes itself.
//!
//! # Design
//! Responses stay loosely typed (`serde_json::Value`): the service owns the
//! object schemas and the client forwards them untouched. Only the bodies the
//! client constructs get concrete types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-LD context stamped on every thing the client creates.
pub const THING_CONTEXT: &str = "http://dbpedia.org";

/// Property map stored on a thing or action.
pub type Schema = Map<String, Value>;

/// JSON-Patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// One entry of a PATCH body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value,
        }
    }
}

/// Schema value pointing at another thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    #[serde(rename = "locationUrl")]
    pub location_url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "$cref")]
    pub cref: String,
}

impl CrossReference {
    pub fn thing(location_url: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            location_url: location_url.into(),
            kind: "Thing".to_string(),
            cref: uuid.into(),
        }
    }
}

/// Request payload for creating a thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateThing {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@class")]
    pub class: String,
    pub schema: Schema,
}

impl CreateThing {
    pub fn new(class: impl Into<String>, schema: Schema) -> Self {
        Self {
            context: THING_CONTEXT.to_string(),
            class: class.into(),
            schema,
        }
    }
}

/// Body of a `/graphql` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLQuery {
    pub query: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cross_reference_serializes_with_wire_names() {
        let cref = CrossReference::thing("http://host:8070", "X");
        assert_eq!(
            serde_json::to_value(&cref).unwrap(),
            json!({"locationUrl": "http://host:8070", "type": "Thing", "$cref": "X"})
        );
    }

    #[test]
    fn patch_op_serializes_lowercase() {
        let op = PatchOperation::replace("/schema/name", json!("Amsterdam"));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "replace", "path": "/schema/name", "value": "Amsterdam"})
        );
    }

    #[test]
    fn patch_op_rejects_unknown_kind() {
        let result: Result<PatchOperation, _> =
            serde_json::from_value(json!({"op": "merge", "path": "/schema", "value": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn create_thing_carries_fixed_context() {
        let mut schema = Schema::new();
        schema.insert("name".to_string(), json!("Utrecht"));
        let body = CreateThing::new("City", schema);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"@context": "http://dbpedia.org", "@class": "City", "schema": {"name": "Utrecht"}})
        );
    }
}
