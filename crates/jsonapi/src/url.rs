//! URL construction
//!
//! Resource URLs take the shape `/(<type-path>)[/<remote-id>][/<rel-path>]`
//! under a host and optional namespace. Query parameters follow the JSON:API
//! conventions: `include`, `filter[attr]`, `filter[rel]` with comma-joined
//! ids, `sort` with `-` prefixing descending fields, and
//! `page[offset]`/`page[limit]`.

use std::collections::HashMap;
use std::fmt::Write;

/// Builds resource and relationship URLs for one backend
#[derive(Debug, Clone, Default)]
pub struct UrlBuilder {
    host: String,
    namespace: Option<String>,
    resource_paths: HashMap<String, String>,
}

impl UrlBuilder {
    /// Create a builder rooted at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            namespace: None,
            resource_paths: HashMap::new(),
        }
    }

    /// Nest every path under a namespace, builder style
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Override the path segment for one type, builder style
    ///
    /// Defaults to the type name itself.
    pub fn with_resource_path(
        mut self,
        kind: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.resource_paths.insert(kind.into(), path.into());
        self
    }

    /// The path segment for a type
    pub fn resource_path<'a>(&'a self, kind: &'a str) -> &'a str {
        self.resource_paths
            .get(kind)
            .map(String::as_str)
            .unwrap_or(kind)
    }

    /// `<host>[/<namespace>]/<type-path>`
    pub fn collection_url(&self, kind: &str) -> String {
        let mut url = self.base();
        url.push('/');
        url.push_str(self.resource_path(kind));
        url
    }

    /// `<host>[/<namespace>]/<type-path>/<remote-id>`
    pub fn resource_url(&self, kind: &str, remote_id: &str) -> String {
        let mut url = self.collection_url(kind);
        url.push('/');
        url.push_str(&encode(remote_id));
        url
    }

    /// `.../<type-path>/<remote-id>/<rel-path>` for fetching related data
    pub fn related_url(&self, kind: &str, remote_id: &str, relationship: &str) -> String {
        let mut url = self.resource_url(kind, remote_id);
        url.push('/');
        url.push_str(relationship);
        url
    }

    /// `.../<type-path>/<remote-id>/relationships/<rel-path>` for editing linkage
    pub fn relationship_url(&self, kind: &str, remote_id: &str, relationship: &str) -> String {
        let mut url = self.resource_url(kind, remote_id);
        url.push_str("/relationships/");
        url.push_str(relationship);
        url
    }

    /// Append query parameters to a URL
    pub fn with_params(&self, url: String, params: &[(String, String)]) -> String {
        if params.is_empty() {
            return url;
        }
        let mut result = url;
        for (index, (name, value)) in params.iter().enumerate() {
            result.push(if index == 0 { '?' } else { '&' });
            let _ = write!(result, "{}={}", encode(name), encode(value));
        }
        result
    }

    fn base(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}/{}", self.host, namespace),
            None => self.host.clone(),
        }
    }
}

/// Percent-encode everything outside the unreserved set, plus the
/// characters JSON:API params legitimately carry (`[`, `]`, `,`).
fn encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'[' | b']'
            | b',' | b':' => encoded.push(byte as char),
            _ => {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        }
    }
    encoded
}
