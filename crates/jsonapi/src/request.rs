//! Request processing: the transport boundary
//!
//! The core never talks HTTP directly. A host supplies a [`Fetch`]
//! implementation (the request envelope mirrors a standard HTTP fetch); the
//! [`RequestProcessor`] drives it, enforces the timeout, and maps the
//! response status taxonomy:
//!
//! - 2xx with a body answers the document; 204 answers nothing
//! - 304 answers nothing (the caller resolves `undefined` data)
//! - 4xx raises `ClientError`, 5xx raises `ServerError`
//! - a transport rejection raises `NetworkError` with the rejection reason
//! - an elapsed timeout raises `NetworkError` with the literal description
//!   `"No fetch response within <timeout>ms."`

use orrery_core::{Error, Result};
use serde_json::Value;
use std::time::{Duration, Instant};

/// JSON:API media type used for write bodies
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// HTTP methods used by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Reads
    Get,
    /// Resource creation
    Post,
    /// Resource and relationship updates
    Patch,
    /// Resource and relationship removal
    Delete,
}

impl HttpMethod {
    /// The method's wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One outbound request envelope
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// JSON body, present for writes
    pub body: Option<Value>,
}

impl FetchRequest {
    /// A GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A write request with a JSON:API body
    pub fn write(method: HttpMethod, url: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), JSON_API_MEDIA_TYPE.to_string())],
            body: Some(body),
        }
    }
}

/// One inbound response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body, if any
    pub body: Option<Value>,
}

impl FetchResponse {
    /// A response with a body
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }
}

/// A rejected fetch: the transport failed before producing a response
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRejection {
    /// The rejection reason, carried into `NetworkError`
    pub reason: String,
}

impl FetchRejection {
    /// Create a rejection
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The pluggable transport; contract mirrors a standard HTTP fetch
pub trait Fetch: Send + Sync {
    /// Execute one request
    fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, FetchRejection>;
}

/// Transport settings applied to every request
#[derive(Debug, Clone, Default)]
pub struct FetchSettings {
    /// Deadline for obtaining a response
    pub timeout: Option<Duration>,
    /// Headers merged into every request
    pub headers: Vec<(String, String)>,
}

/// Optional hook rewriting response documents before deserialization
pub type ResponsePreprocessor = Box<dyn Fn(Value, &FetchRequest) -> Result<Value> + Send + Sync>;

/// Drives the transport and maps the response taxonomy
pub struct RequestProcessor {
    fetch: Box<dyn Fetch>,
    settings: FetchSettings,
    preprocessor: Option<ResponsePreprocessor>,
}

impl RequestProcessor {
    /// Create a processor over a transport
    pub fn new(fetch: Box<dyn Fetch>, settings: FetchSettings) -> Self {
        Self {
            fetch,
            settings,
            preprocessor: None,
        }
    }

    /// Install a response-document preprocessor, builder style
    pub fn with_preprocessor(mut self, preprocessor: ResponsePreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// The transport settings
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Execute a request and answer the response document
    ///
    /// `Ok(None)` means the backend answered without a document (204 or
    /// 304); a 304 caller resolves its data as absent.
    pub fn execute(&self, mut request: FetchRequest) -> Result<Option<Value>> {
        for (name, value) in &self.settings.headers {
            request.headers.push((name.clone(), value.clone()));
        }

        let started = Instant::now();
        let outcome = self.fetch.fetch(&request);

        // The synchronous transport cannot be aborted mid-flight; an overdue
        // completion is indistinguishable from an abort to the caller.
        if let Some(timeout) = self.settings.timeout {
            if started.elapsed() >= timeout {
                return Err(Error::network(format!(
                    "No fetch response within {}ms.",
                    timeout.as_millis()
                )));
            }
        }

        let response = match outcome {
            Ok(response) => response,
            Err(rejection) => return Err(Error::network(rejection.reason)),
        };

        let document = self.map_status(response)?;
        match (document, &self.preprocessor) {
            (Some(document), Some(preprocessor)) => Ok(Some(preprocessor(document, &request)?)),
            (document, _) => Ok(document),
        }
    }

    fn map_status(&self, response: FetchResponse) -> Result<Option<Value>> {
        match response.status {
            200..=299 => Ok(response.body),
            304 => Ok(None),
            status @ 400..=499 => Err(Error::client(status, describe(status, &response.body))),
            status @ 500..=599 => Err(Error::server(status, describe(status, &response.body))),
            status => Err(Error::network(format!(
                "unexpected response status {}",
                status
            ))),
        }
    }
}

fn describe(status: u16, body: &Option<Value>) -> String {
    let detail = body
        .as_ref()
        .and_then(|body| body.get("errors"))
        .and_then(|errors| errors.get(0))
        .and_then(|error| error.get("detail").or_else(|| error.get("title")))
        .and_then(Value::as_str);
    match detail {
        Some(detail) => format!("{}: {}", status, detail),
        None => status.to_string(),
    }
}
