//! # orrery-jsonapi
//!
//! The remote JSON:API adapter: a serializer between records and resource
//! objects, a request processor that drives a pluggable fetch transport and
//! maps the response status taxonomy, URL construction following the
//! JSON:API conventions, and the concrete remote source implementing the
//! query, update, push, and pull pipelines.
//!
//! The transport itself stays outside the core: hosts supply a [`Fetch`]
//! implementation whose contract mirrors a standard HTTP fetch.

#![warn(missing_docs)]

pub mod request;
pub mod serializer;
pub mod source;
pub mod url;

pub use request::{
    Fetch, FetchRejection, FetchRequest, FetchResponse, FetchSettings, HttpMethod,
    RequestProcessor, JSON_API_MEDIA_TYPE,
};
pub use serializer::{JsonApiSerializer, StandardSerializer};
pub use source::{JsonApiSource, JsonApiSourceSettings};
pub use url::UrlBuilder;
