//! Blocking client for the Weaviate REST and GraphQL API.
//!
//! # Overview
//! Two layers, the upper one built on the lower:
//! - [`ApiClient`] maps each (resource, verb) pair of `/weaviate/v1` onto one
//!   method, attaches the API key headers, and checks the single status code
//!   each endpoint is expected to answer with.
//! - [`ThingRepository`] shapes thing-level bodies (creation envelopes,
//!   cross-references, schema patches, first-match GraphQL lookups) on top of
//!   it.
//!
//! # Design
//! - Requests are built as plain [`HttpRequest`] values and executed by a
//!   [`Transport`]; [`UreqTransport`] is the default.
//! - Responses stay loosely typed (`serde_json::Value`).
//! - An unexpected status never aborts anything: it comes back as
//!   [`ApiError::UnexpectedStatus`] with the URL, request body and status line.

pub mod client;
pub mod config;
pub mod error;
pub mod graphql;
pub mod http;
pub mod things;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use config::ConnectionConfig;
pub use error::ApiError;
pub use graphql::FirstThingQuery;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use things::ThingRepository;
pub use transport::{Transport, UreqTransport};
pub use types::{CreateThing, CrossReference, GraphQLQuery, PatchOp, PatchOperation, Schema};
