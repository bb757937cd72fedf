//! Domain layer: thing-level operations for import scripts.
//!
//! `ThingRepository` shapes bodies (creation envelopes, cross-references,
//! patch lists, first-match queries) and delegates the HTTP work to
//! `ApiClient`.

use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::config::ConnectionConfig;
use crate::error::ApiError;
use crate::graphql::FirstThingQuery;
use crate::transport::{Transport, UreqTransport};
use crate::types::{CreateThing, CrossReference, PatchOp, PatchOperation, Schema};

#[derive(Debug, Clone)]
pub struct ThingRepository<T = UreqTransport> {
    client: ApiClient<T>,
    location_url: String,
}

impl ThingRepository<UreqTransport> {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> ThingRepository<T> {
    pub fn with_transport(config: &ConnectionConfig, transport: T) -> Self {
        Self {
            client: ApiClient::with_transport(config, transport),
            location_url: config.location_url(),
        }
    }

    /// The underlying transport-layer client, for operations this type does
    /// not wrap.
    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    /// Schema value referring to the thing `uuid` on this instance.
    pub fn cref(&self, uuid: &str) -> CrossReference {
        CrossReference::thing(self.location_url.clone(), uuid)
    }

    /// UUID of the first thing of `class_name` whose `property_name` equals
    /// `property_value`, or `None` when nothing matches.
    pub fn find_uuid(
        &self,
        class_name: &str,
        property_name: &str,
        property_value: impl fmt::Display,
    ) -> Result<Option<String>, ApiError> {
        let query = FirstThingQuery::new(class_name, property_name, property_value).to_query();
        let uuid = self.client.graphql_post_first_uuid(&query)?;
        debug!(class_name, property_name, found = uuid.is_some(), "thing lookup");
        Ok(uuid)
    }

    /// Create a thing of `class_name` and return the UUID the service
    /// assigned to it.
    pub fn create(&self, class_name: &str, schema: Schema) -> Result<String, ApiError> {
        let body = CreateThing::new(class_name, schema);
        let response = self.client.things_create(&body)?;
        let uuid = response
            .get("thingId")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::DeserializationError("create response has no thingId".to_string()))?
            .to_string();
        info!(class_name, thing_id = %uuid, "thing created");
        Ok(uuid)
    }

    /// Apply a single patch operation to one thing.
    pub fn update_field(&self, uuid: &str, op: PatchOp, path: &str, value: Value) -> Result<Value, ApiError> {
        let operation = PatchOperation {
            op,
            path: path.to_string(),
            value,
        };
        self.client.things_patch(uuid, &[operation])
    }

    /// Replace the whole schema of one thing.
    pub fn replace_schema(&self, uuid: &str, schema: Schema) -> Result<Value, ApiError> {
        let operation = PatchOperation::replace("/schema", Value::Object(schema));
        self.client.things_patch(uuid, &[operation])
    }
}
