//! Transport layer: one method per (resource, HTTP verb) pair of the
//! Weaviate REST surface.
//!
//! # Design
//! Each operation is split the same way:
//! - `build_*` produces an `HttpRequest` and never touches the network, so
//!   URL shaping and header attachment can be tested on their own.
//! - the operation method hands that request to the `Transport`, checks the
//!   one status code the endpoint is expected to answer with, and decodes the
//!   body.
//!
//! Any other status is returned as `ApiError::UnexpectedStatus`; nothing is
//! retried.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::ConnectionConfig;
use crate::error::ApiError;
use crate::graphql;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{GraphQLQuery, PatchOperation};

const OK: u16 = 200;
const ACCEPTED: u16 = 202;
const NO_CONTENT: u16 = 204;

/// Blocking client for a single Weaviate instance.
///
/// Holds the base URL and API key derived from a `ConnectionConfig` plus the
/// transport that executes requests. Carries no other state between calls.
#[derive(Debug, Clone)]
pub struct ApiClient<T = UreqTransport> {
    base_url: String,
    api_token: String,
    transport: T,
}

impl ApiClient<UreqTransport> {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(config: &ConnectionConfig, transport: T) -> Self {
        Self {
            base_url: config.base_url(),
            api_token: config.api_token().to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Things
    // -----------------------------------------------------------------------

    /// List things visible to this key.
    ///
    /// `page` is only forwarded when `max_results` is given; a missing `page`
    /// is sent as `page=0`.
    pub fn things_list(&self, max_results: Option<i64>, page: Option<i64>) -> Result<Value, ApiError> {
        let request = self.build_things_list(max_results, page)?;
        self.call_json(&request, OK)
    }

    /// Create a thing. The service answers 202 and creates it asynchronously;
    /// the decoded body carries the assigned `thingId`.
    pub fn things_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ApiError> {
        let request = self.build_things_create(body)?;
        self.call_json(&request, ACCEPTED)
    }

    pub fn things_validate<B: Serialize + ?Sized>(&self, body: &B) -> Result<bool, ApiError> {
        let request = self.build_things_validate(body)?;
        self.call(&request, OK)?;
        Ok(true)
    }

    pub fn things_get(&self, thing_id: &str) -> Result<Value, ApiError> {
        self.call_json(&self.build_things_get(thing_id), OK)
    }

    pub fn things_patch(&self, thing_id: &str, operations: &[PatchOperation]) -> Result<Value, ApiError> {
        let request = self.build_things_patch(thing_id, operations)?;
        self.call_json(&request, OK)
    }

    pub fn things_put<B: Serialize + ?Sized>(&self, thing_id: &str, body: &B) -> Result<Value, ApiError> {
        let request = self.build_things_put(thing_id, body)?;
        self.call_json(&request, OK)
    }

    pub fn things_delete(&self, thing_id: &str) -> Result<bool, ApiError> {
        self.call(&self.build_things_delete(thing_id), NO_CONTENT)?;
        Ok(true)
    }

    /// Actions whose subject or object is the given thing.
    pub fn things_actions_list(&self, thing_id: &str) -> Result<Value, ApiError> {
        self.call_json(&self.build_things_actions_list(thing_id), OK)
    }

    pub fn build_things_list(&self, max_results: Option<i64>, page: Option<i64>) -> Result<HttpRequest, ApiError> {
        let max_results = non_negative("maxResults", max_results)?;
        let page = non_negative("page", page)?;

        let mut path = match max_results {
            Some(n) => format!("/things?maxResults={n}"),
            None => "/things?maxResults=0".to_string(),
        };
        match (max_results, page) {
            (Some(_), Some(p)) => path.push_str(&format!("&page={p}")),
            (None, Some(_)) => {}
            (_, None) => path.push_str("&page=0"),
        }
        Ok(self.request(HttpMethod::Get, &path))
    }

    pub fn build_things_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/things", body)
    }

    pub fn build_things_validate<B: Serialize + ?Sized>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/things/validate", body)
    }

    pub fn build_things_get(&self, thing_id: &str) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/things/{}", path_segment(thing_id)))
    }

    pub fn build_things_patch(&self, thing_id: &str, operations: &[PatchOperation]) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Patch, &format!("/things/{}", path_segment(thing_id)), operations)
    }

    pub fn build_things_put<B: Serialize + ?Sized>(&self, thing_id: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/things/{}", path_segment(thing_id)), body)
    }

    pub fn build_things_delete(&self, thing_id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/things/{}", path_segment(thing_id)))
    }

    pub fn build_things_actions_list(&self, thing_id: &str) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/things/{}/actions", path_segment(thing_id)))
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    pub fn actions_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ApiError> {
        let request = self.build_actions_create(body)?;
        self.call_json(&request, ACCEPTED)
    }

    pub fn actions_get(&self, action_id: &str) -> Result<Value, ApiError> {
        self.call_json(&self.build_actions_get(action_id), OK)
    }

    pub fn actions_patch(&self, action_id: &str, operations: &[PatchOperation]) -> Result<Value, ApiError> {
        let request = self.build_actions_patch(action_id, operations)?;
        self.call_json(&request, OK)
    }

    pub fn actions_delete(&self, action_id: &str) -> Result<bool, ApiError> {
        self.call(&self.build_actions_delete(action_id), NO_CONTENT)?;
        Ok(true)
    }

    pub fn actions_validate<B: Serialize + ?Sized>(&self, body: &B) -> Result<bool, ApiError> {
        let request = self.build_actions_validate(body)?;
        self.call(&request, OK)?;
        Ok(true)
    }

    pub fn build_actions_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/actions", body)
    }

    pub fn build_actions_get(&self, action_id: &str) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/actions/{}", path_segment(action_id)))
    }

    /// The deployed service routes action patches through the singular
    /// `/action/{id}`; every other action endpoint is plural.
    pub fn build_actions_patch(&self, action_id: &str, operations: &[PatchOperation]) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Patch, &format!("/action/{}", path_segment(action_id)), operations)
    }

    pub fn build_actions_delete(&self, action_id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/actions/{}", path_segment(action_id)))
    }

    pub fn build_actions_validate<B: Serialize + ?Sized>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/actions/validate", body)
    }

    // -----------------------------------------------------------------------
    // GraphQL
    // -----------------------------------------------------------------------

    pub fn graphql_post(&self, query: &GraphQLQuery) -> Result<Value, ApiError> {
        let request = self.build_graphql_post(query)?;
        self.call_json(&request, OK)
    }

    /// UUID of the first thing in `data.listThings.things`, if any.
    pub fn graphql_post_first_uuid(&self, query: &GraphQLQuery) -> Result<Option<String>, ApiError> {
        let response = self.graphql_post(query)?;
        graphql::first_uuid(&response)
    }

    /// Every thing in `data.listThings.things`; `None` when there are none.
    pub fn graphql_post_all_things(&self, query: &GraphQLQuery) -> Result<Option<Vec<Value>>, ApiError> {
        let response = self.graphql_post(query)?;
        Ok(graphql::all_things(&response))
    }

    pub fn build_graphql_post(&self, query: &GraphQLQuery) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/graphql", query)
    }

    // -----------------------------------------------------------------------
    // Meta
    // -----------------------------------------------------------------------

    /// Meta information about the instance. The service serves this read
    /// over POST.
    pub fn meta(&self) -> Result<Value, ApiError> {
        self.call_json(&self.build_meta(), OK)
    }

    pub fn build_meta(&self) -> HttpRequest {
        self.request(HttpMethod::Post, "/meta")
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    /// Create a child of the key used for this request.
    pub fn keys_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ApiError> {
        let request = self.build_keys_create(body)?;
        self.call_json(&request, ACCEPTED)
    }

    pub fn keys_get(&self, key_id: &str) -> Result<Value, ApiError> {
        self.call_json(&self.build_keys_get(key_id), OK)
    }

    pub fn keys_delete(&self, key_id: &str) -> Result<bool, ApiError> {
        self.call(&self.build_keys_delete(key_id), NO_CONTENT)?;
        Ok(true)
    }

    pub fn keys_children(&self, key_id: &str) -> Result<Value, ApiError> {
        self.call_json(&self.build_keys_children(key_id), OK)
    }

    /// The key this client authenticates with.
    pub fn keys_me(&self) -> Result<Value, ApiError> {
        self.call_json(&self.build_keys_me(), OK)
    }

    pub fn keys_me_children(&self) -> Result<Value, ApiError> {
        self.call_json(&self.build_keys_me_children(), OK)
    }

    pub fn build_keys_create<B: Serialize + ?Sized>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/keys", body)
    }

    pub fn build_keys_get(&self, key_id: &str) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/keys/{}", path_segment(key_id)))
    }

    pub fn build_keys_delete(&self, key_id: &str) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/keys/{}", path_segment(key_id)))
    }

    pub fn build_keys_children(&self, key_id: &str) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("/keys/{}/children", path_segment(key_id)))
    }

    pub fn build_keys_me(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/keys/me")
    }

    pub fn build_keys_me_children(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/keys/me/children")
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            headers: vec![
                ("X-API-KEY".to_string(), self.api_token.clone()),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: None,
        }
    }

    fn json_request<B: Serialize + ?Sized>(&self, method: HttpMethod, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(HttpRequest {
            body: Some(body),
            ..self.request(method, path)
        })
    }

    fn call(&self, request: &HttpRequest, expected: u16) -> Result<HttpResponse, ApiError> {
        let response = self.transport.execute(request)?;
        check_status(request, response, expected)
    }

    fn call_json(&self, request: &HttpRequest, expected: u16) -> Result<Value, ApiError> {
        let response = self.call(request, expected)?;
        decode_json(&response)
    }
}

/// Pass `response` through when its status is `expected`; otherwise build
/// the `UnexpectedStatus` error for `request`.
fn check_status(request: &HttpRequest, response: HttpResponse, expected: u16) -> Result<HttpResponse, ApiError> {
    if response.status == expected {
        return Ok(response);
    }
    warn!(
        method = %request.method,
        url = %request.url,
        status = response.status,
        expected,
        "unexpected status"
    );
    Err(ApiError::UnexpectedStatus {
        url: request.url.clone(),
        body: request.body.clone(),
        status: response.status,
        reason: response.reason,
    })
}

fn decode_json(response: &HttpResponse) -> Result<Value, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Percent-encode `id` as one path segment. Ids are the opaque UUIDs the
/// service hands out; anything outside the unreserved set (including `/`
/// and `.`) is escaped so an id can never address a different endpoint.
fn path_segment(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'~' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

fn non_negative(name: &'static str, value: Option<i64>) -> Result<Option<i64>, ApiError> {
    match value {
        Some(v) if v < 0 => Err(ApiError::InvalidArgument { name, value: v }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::types::PatchOp;

    const BASE: &str = "http://localhost:8070/weaviate/v1";

    /// Replays one canned response and remembers the request it was given.
    struct Canned {
        response: HttpResponse,
        seen: RefCell<Option<HttpRequest>>,
    }

    impl Canned {
        fn new(status: u16, reason: &str, body: &str) -> Self {
            Self {
                response: HttpResponse {
                    status,
                    reason: reason.to_string(),
                    body: body.to_string(),
                },
                seen: RefCell::new(None),
            }
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            *self.seen.borrow_mut() = Some(request.clone());
            Ok(self.response.clone())
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("secret-key", "localhost")
    }

    fn client() -> ApiClient<Canned> {
        ApiClient::with_transport(&config(), Canned::new(200, "OK", "{}"))
    }

    fn client_answering(status: u16, reason: &str, body: &str) -> ApiClient<Canned> {
        ApiClient::with_transport(&config(), Canned::new(status, reason, body))
    }

    #[test]
    fn every_request_carries_fixed_headers() {
        let req = client().build_things_get("abc");
        assert_eq!(req.header("x-api-key"), Some("secret-key"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.headers.len(), 3);
    }

    #[test]
    fn things_list_with_max_results_only_defaults_page() {
        let req = client().build_things_list(Some(5), None).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.url.ends_with("/things?maxResults=5&page=0"), "{}", req.url);
    }

    #[test]
    fn things_list_drops_page_without_max_results() {
        let req = client().build_things_list(None, Some(3)).unwrap();
        assert_eq!(req.url, format!("{BASE}/things?maxResults=0"));
    }

    #[test]
    fn things_list_with_both_arguments() {
        let req = client().build_things_list(Some(10), Some(2)).unwrap();
        assert_eq!(req.url, format!("{BASE}/things?maxResults=10&page=2"));
    }

    #[test]
    fn things_list_without_arguments() {
        let req = client().build_things_list(None, None).unwrap();
        assert_eq!(req.url, format!("{BASE}/things?maxResults=0&page=0"));
        assert!(req.body.is_none());
    }

    #[test]
    fn things_list_rejects_negative_arguments() {
        let err = client().build_things_list(Some(-1), None).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument { name: "maxResults", value: -1 }));
        let err = client().build_things_list(Some(1), Some(-4)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument { name: "page", value: -4 }));
    }

    #[test]
    fn things_list_rejects_before_sending() {
        let c = client();
        assert!(c.things_list(None, Some(-1)).is_err());
        assert!(c.transport.seen.borrow().is_none());
    }

    #[test]
    fn endpoint_paths_and_methods() {
        let c = client();
        let ops = [PatchOperation::replace("/schema", json!({}))];
        let cases = [
            (c.build_things_create(&json!({})).unwrap(), HttpMethod::Post, "/things"),
            (c.build_things_validate(&json!({})).unwrap(), HttpMethod::Post, "/things/validate"),
            (c.build_things_get("t1"), HttpMethod::Get, "/things/t1"),
            (c.build_things_patch("t1", &ops).unwrap(), HttpMethod::Patch, "/things/t1"),
            (c.build_things_put("t1", &json!({})).unwrap(), HttpMethod::Put, "/things/t1"),
            (c.build_things_delete("t1"), HttpMethod::Delete, "/things/t1"),
            (c.build_things_actions_list("t1"), HttpMethod::Get, "/things/t1/actions"),
            (c.build_actions_create(&json!({})).unwrap(), HttpMethod::Post, "/actions"),
            (c.build_actions_get("a1"), HttpMethod::Get, "/actions/a1"),
            (c.build_actions_patch("a1", &ops).unwrap(), HttpMethod::Patch, "/action/a1"),
            (c.build_actions_delete("a1"), HttpMethod::Delete, "/actions/a1"),
            (c.build_actions_validate(&json!({})).unwrap(), HttpMethod::Post, "/actions/validate"),
            (
                c.build_graphql_post(&GraphQLQuery { query: "{}".to_string() }).unwrap(),
                HttpMethod::Post,
                "/graphql",
            ),
            (c.build_meta(), HttpMethod::Post, "/meta"),
            (c.build_keys_create(&json!({})).unwrap(), HttpMethod::Post, "/keys"),
            (c.build_keys_get("k1"), HttpMethod::Get, "/keys/k1"),
            (c.build_keys_delete("k1"), HttpMethod::Delete, "/keys/k1"),
            (c.build_keys_children("k1"), HttpMethod::Get, "/keys/k1/children"),
            (c.build_keys_me(), HttpMethod::Get, "/keys/me"),
            (c.build_keys_me_children(), HttpMethod::Get, "/keys/me/children"),
        ];
        for (req, method, path) in cases {
            assert_eq!(req.method, method, "{path}");
            assert_eq!(req.url, format!("{BASE}{path}"));
        }
    }

    #[test]
    fn ids_are_encoded_as_one_path_segment() {
        let c = client();
        assert_eq!(c.build_keys_get("../keys/me").url, format!("{BASE}/keys/%2E%2E%2Fkeys%2Fme"));
        assert_eq!(
            c.build_things_actions_list("a b?c").url,
            format!("{BASE}/things/a%20b%3Fc/actions")
        );
        let uuid = "f81bfe5e-16ba-4615-a516-46c2ae2e5a80";
        assert_eq!(c.build_things_get(uuid).url, format!("{BASE}/things/{uuid}"));
    }

    #[test]
    fn meta_is_posted_without_body() {
        let req = client().build_meta();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.body.is_none());
    }

    #[test]
    fn patch_body_is_operation_list() {
        let ops = [PatchOperation {
            op: PatchOp::Add,
            path: "/schema/population".to_string(),
            value: json!(900000),
        }];
        let req = client().build_things_patch("t1", &ops).unwrap();
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!([{"op": "add", "path": "/schema/population", "value": 900000}]));
    }

    #[test]
    fn create_with_wrong_status_reports_request() {
        let c = client_answering(201, "Created", r#"{"thingId":"abc"}"#);
        let err = c.things_create(&json!({"@class": "City"})).unwrap_err();
        match err {
            ApiError::UnexpectedStatus { url, body, status, reason } => {
                assert_eq!(url, format!("{BASE}/things"));
                assert_eq!(body.as_deref(), Some(r#"{"@class":"City"}"#));
                assert_eq!(status, 201);
                assert_eq!(reason, "Created");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[test]
    fn create_accepted_returns_decoded_body() {
        let c = client_answering(202, "Accepted", r#"{"thingId":"abc","@class":"City"}"#);
        let created = c.things_create(&json!({"@class": "City"})).unwrap();
        assert_eq!(created["thingId"], "abc");
    }

    #[test]
    fn get_not_found_is_not_found_class() {
        let c = client_answering(404, "Not Found", "");
        let err = c.things_get("missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, ApiError::UnexpectedStatus { body: None, .. }));
    }

    #[test]
    fn delete_expects_no_content() {
        assert!(client_answering(204, "No Content", "").things_delete("t1").unwrap());
        assert!(client_answering(204, "No Content", "").actions_delete("a1").unwrap());
        assert!(client_answering(204, "No Content", "").keys_delete("k1").unwrap());
        let err = client_answering(200, "OK", "{}").things_delete("t1").unwrap_err();
        assert_eq!(err.status(), Some(200));
    }

    #[test]
    fn validate_returns_true_without_decoding() {
        assert!(client_answering(200, "OK", "").things_validate(&json!({})).unwrap());
        assert!(client_answering(200, "OK", "").actions_validate(&json!({})).unwrap());
        let err = client_answering(422, "Unprocessable Entity", "").things_validate(&json!({})).unwrap_err();
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn keys_create_expects_accepted() {
        let c = client_answering(202, "Accepted", r#"{"keyId":"k2"}"#);
        assert_eq!(c.keys_create(&json!({"read": true})).unwrap()["keyId"], "k2");
        let err = client_answering(200, "OK", "{}").keys_create(&json!({})).unwrap_err();
        assert_eq!(err.status(), Some(200));
    }

    #[test]
    fn graphql_projections() {
        let empty = r#"{"data":{"listThings":{"things":[]}}}"#;
        let one = r#"{"data":{"listThings":{"things":[{"uuid":"abc"}]}}}"#;
        let q = GraphQLQuery { query: "{}".to_string() };

        assert_eq!(client_answering(200, "OK", empty).graphql_post_first_uuid(&q).unwrap(), None);
        assert_eq!(
            client_answering(200, "OK", one).graphql_post_first_uuid(&q).unwrap().as_deref(),
            Some("abc")
        );
        assert!(client_answering(200, "OK", empty).graphql_post_all_things(&q).unwrap().is_none());
        assert_eq!(
            client_answering(200, "OK", one).graphql_post_all_things(&q).unwrap().unwrap(),
            vec![json!({"uuid": "abc"})]
        );
    }

    #[test]
    fn bad_json_is_deserialization_error() {
        let err = client_answering(200, "OK", "not json").meta().unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn executed_request_matches_builder() {
        let c = client();
        c.keys_me_children().unwrap();
        let seen = c.transport.seen.borrow().clone().unwrap();
        assert_eq!(seen, c.build_keys_me_children());
    }
}
