//! HTTP search backend.
//!
//! The search store's REST API is spoken through the [`HttpClient`] trait so
//! that the transport can be swapped out. [`ReqwestClient`] is the default
//! blocking implementation; tests plug in a canned client.

use crate::backend::{SearchBackend, SearchHit};
use caes_model::{StoreError, StoreResult, Timestamp};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; only transport failures are errors.
pub trait HttpClient: Send + Sync {
    /// Sends a request with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or `Unavailable` if no response arrived.
    fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> StoreResult<HttpResponse>;
}

/// Blocking [`HttpClient`] built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    auth: Option<(String, String)>,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, auth: None })
    }

    /// Sends basic authentication with every request.
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> StoreResult<HttpResponse> {
        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Put => self.client.put(url),
            Method::Post => self.client.post(url),
        };
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, Some(password));
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

/// Maps a non-success status onto a store error.
fn status_error(context: &str, response: &HttpResponse) -> StoreError {
    let detail = format!(
        "{context}: HTTP {}: {}",
        response.status,
        String::from_utf8_lossy(&response.body)
    );
    match response.status {
        408 | 504 => StoreError::Timeout(detail),
        429 | 500..=599 => StoreError::Unavailable(detail),
        _ => StoreError::InvalidRequest(detail),
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: i64,
    #[serde(rename = "_source", default)]
    source: Map<String, JsonValue>,
}

/// [`SearchBackend`] talking to a search cluster over HTTP.
pub struct HttpSearchBackend<C: HttpClient> {
    base_url: String,
    client: C,
    closed: AtomicBool,
}

impl<C: HttpClient> HttpSearchBackend<C> {
    /// Creates a backend for the cluster at `base_url` (e.g. `http://localhost:9200`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> StoreResult<HttpResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        debug!(?method, url, "search store request");
        self.client.send(method, url, body)
    }
}

fn encode_body(body: &JsonValue) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| StoreError::Codec(e.to_string()))
}

impl<C: HttpClient> SearchBackend for HttpSearchBackend<C> {
    fn search_since(
        &self,
        index: &str,
        field: &str,
        since: Timestamp,
        from: usize,
        size: usize,
    ) -> StoreResult<Vec<SearchHit>> {
        let query = json!({
            "query": { "range": { field: { "gte": since } } },
            "from": from,
            "size": size,
            "version": true,
            // Ties on the timestamp need a stable order or offset paging
            // can skip or repeat a hit at a page boundary.
            "sort": [
                { field: { "order": "asc" } },
                { "_id": { "order": "asc" } },
            ],
        });
        let url = format!("{}/{index}/_search", self.base_url);
        let response = self.send(Method::Post, &url, Some(encode_body(&query)?))?;
        if !response.is_success() {
            return Err(status_error("search", &response));
        }

        let parsed: SearchResponse = serde_json::from_slice(&response.body)
            .map_err(|e| StoreError::Codec(format!("search response: {e}")))?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                version: hit.version,
                source: hit.source,
            })
            .collect())
    }

    fn index_versioned(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, JsonValue>,
        version: i64,
    ) -> StoreResult<()> {
        let url = format!(
            "{}/{index}/{doc_type}/{id}?version={version}&version_type=external",
            self.base_url
        );
        let body = serde_json::to_vec(source).map_err(|e| StoreError::Codec(e.to_string()))?;
        let response = self.send(Method::Put, &url, Some(body))?;

        match response.status {
            409 => Err(StoreError::VersionConflict {
                id: id.to_string(),
                attempted: version,
            }),
            _ if response.is_success() => Ok(()),
            _ => Err(status_error("index", &response)),
        }
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        let url = format!("{}/{index}/_refresh", self.base_url);
        let response = self.send(Method::Post, &url, None)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(status_error("refresh", &response))
        }
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone)]
    struct Sent {
        method: Method,
        url: String,
        body: Option<JsonValue>,
    }

    struct TestClient {
        response: Mutex<StoreResult<HttpResponse>>,
        sent: Mutex<Vec<Sent>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(Ok(HttpResponse {
                    status: 200,
                    body: b"{}".to_vec(),
                })),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn set_response(&self, status: u16, body: JsonValue) {
            *self.response.lock() = Ok(HttpResponse {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            });
        }

        fn set_error(&self, error: StoreError) {
            *self.response.lock() = Err(error);
        }

        fn last(&self) -> Sent {
            self.sent.lock().last().cloned().unwrap()
        }
    }

    impl HttpClient for &TestClient {
        fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>) -> StoreResult<HttpResponse> {
            self.sent.lock().push(Sent {
                method,
                url: url.to_string(),
                body: body.map(|b| serde_json::from_slice(&b).unwrap()),
            });
            match &*self.response.lock() {
                Ok(response) => Ok(response.clone()),
                Err(StoreError::Timeout(m)) => Err(StoreError::Timeout(m.clone())),
                Err(e) => Err(StoreError::Unavailable(e.to_string())),
            }
        }
    }

    fn source() -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("vint".into(), json!(1));
        map.insert("timestamp".into(), json!(10));
        map
    }

    #[test]
    fn index_uses_external_version() {
        let client = TestClient::new();
        client.set_response(201, json!({ "result": "created" }));
        let backend = HttpSearchBackend::new("http://localhost:9200/", &client);

        backend.index_versioned("test", "_doc", "abc", &source(), 10).unwrap();
        let sent = client.last();
        assert_eq!(sent.method, Method::Put);
        assert_eq!(
            sent.url,
            "http://localhost:9200/test/_doc/abc?version=10&version_type=external"
        );
        assert_eq!(sent.body.unwrap()["vint"], 1);
    }

    #[test]
    fn conflict_status_maps_to_version_conflict() {
        let client = TestClient::new();
        client.set_response(409, json!({ "error": "version_conflict_engine_exception" }));
        let backend = HttpSearchBackend::new("http://es", &client);

        let err = backend.index_versioned("test", "_doc", "abc", &source(), 9).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { attempted: 9, .. }));
    }

    #[test]
    fn status_classification() {
        let client = TestClient::new();
        let backend = HttpSearchBackend::new("http://es", &client);

        client.set_response(400, json!({}));
        assert!(matches!(backend.refresh("t"), Err(StoreError::InvalidRequest(_))));
        client.set_response(504, json!({}));
        assert!(matches!(backend.refresh("t"), Err(StoreError::Timeout(_))));
        client.set_response(429, json!({}));
        assert!(matches!(backend.refresh("t"), Err(StoreError::Unavailable(_))));
        client.set_response(503, json!({}));
        assert!(backend.refresh("t").unwrap_err().is_transient());
    }

    #[test]
    fn search_builds_range_query_and_parses_hits() {
        let client = TestClient::new();
        client.set_response(
            200,
            json!({
                "hits": { "hits": [
                    { "_id": "a", "_version": 10, "_source": { "vint": 1, "timestamp": 10 } },
                    { "_id": "b", "_version": 11, "_source": { "vint": 2, "timestamp": 11 } }
                ] }
            }),
        );
        let backend = HttpSearchBackend::new("http://es", &client);

        let hits = backend.search_since("test", "timestamp", 9, 100, 50).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[1].version, 11);
        assert_eq!(hits[1].source["vint"], 2);

        let sent = client.last();
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "http://es/test/_search");
        let body = sent.body.unwrap();
        assert_eq!(body["query"]["range"]["timestamp"]["gte"], 9);
        assert_eq!(body["from"], 100);
        assert_eq!(body["size"], 50);
        assert_eq!(body["version"], true);
        assert_eq!(body["sort"][0]["timestamp"]["order"], "asc");
        assert_eq!(body["sort"][1]["_id"]["order"], "asc");
        assert_eq!(body["sort"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn malformed_search_response_is_codec_error() {
        let client = TestClient::new();
        client.set_response(200, json!({ "unexpected": true }));
        let backend = HttpSearchBackend::new("http://es", &client);

        let err = backend.search_since("test", "timestamp", 0, 0, 10).unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[test]
    fn transport_failure_propagates() {
        let client = TestClient::new();
        client.set_error(StoreError::Timeout("slow".into()));
        let backend = HttpSearchBackend::new("http://es", &client);
        assert!(backend.refresh("t").unwrap_err().is_transient());
    }

    #[test]
    fn refresh_endpoint_and_close() {
        let client = TestClient::new();
        let backend = HttpSearchBackend::new("http://es", &client);
        backend.refresh("test").unwrap();
        assert_eq!(client.last().url, "http://es/test/_refresh");
        assert!(client.last().body.is_none());

        backend.close().unwrap();
        assert!(matches!(backend.refresh("test"), Err(StoreError::Closed)));
    }

    #[test]
    fn reqwest_client_builds() {
        let client = ReqwestClient::new(Duration::from_secs(1))
            .unwrap()
            .with_basic_auth("elastic", "changeme");
        assert!(client.auth.is_some());
    }
}
