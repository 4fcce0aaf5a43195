//! Typed JSON request helpers over a pluggable [`Transport`].
//!
//! # Design
//! `HttpClient` holds a `base_url` and a transport, and carries no mutable
//! state between calls. Each helper is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`; `get`/`post`/`put`/`delete` compose build, execute and
//! parse. Every call ends in the parsed body or exactly one `ApiError`
//! variant. A non-2xx status is never treated as success, whether or not the
//! error body parses.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::types::ErrorBody;

#[derive(Debug, Clone)]
pub struct HttpClient<T> {
    base_url: String,
    transport: T,
}

impl<T> HttpClient<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_get(&self, endpoint: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.url(endpoint),
            headers: vec![("accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn build_post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.build_with_body(HttpMethod::Post, endpoint, body)
    }

    pub fn build_put<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.build_with_body(HttpMethod::Put, endpoint, body)
    }

    pub fn build_delete(&self, endpoint: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            url: self.url(endpoint),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Decode a JSON response as `R`, or classify the failure.
    ///
    /// `request` is only used to attach the target URL to decode failures.
    pub fn parse_json<R: DeserializeOwned>(&self, request: &HttpRequest, response: HttpResponse) -> Result<R, ApiError> {
        check_status(&response, true)?;
        serde_json::from_str(&response.body).map_err(|e| {
            ApiError::network(format!("invalid response body: {e}"), request.url.clone())
        })
    }

    /// Accept any 2xx response and ignore its body. Non-2xx bodies are not
    /// inspected; the message comes from the status line only.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, false)
    }

    fn build_with_body<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body)
            .map_err(|e| ApiError::validation(format!("request body could not be serialized: {e}")))?;
        Ok(HttpRequest {
            method,
            url: self.url(endpoint),
            headers: vec![
                ("accept".to_string(), "application/json".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }
}

impl<T: Transport> HttpClient<T> {
    /// Execute a request, mapping transport failures to `ApiError::Network`.
    /// The response is returned whatever its status.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.clone();
        debug!(method = request.method.as_str(), %url, "sending request");
        self.transport
            .execute(request)
            .await
            .map_err(|e| ApiError::network(e.message, url))
    }

    pub async fn get<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R, ApiError> {
        let request = self.build_get(endpoint);
        let response = self.send(request.clone()).await?;
        self.parse_json(&request, response)
    }

    pub async fn post<R: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<R, ApiError> {
        let request = self.build_post(endpoint, body)?;
        let response = self.send(request.clone()).await?;
        self.parse_json(&request, response)
    }

    pub async fn put<R: DeserializeOwned, B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<R, ApiError> {
        let request = self.build_put(endpoint, body)?;
        let response = self.send(request.clone()).await?;
        self.parse_json(&request, response)
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
        let request = self.build_delete(endpoint);
        let response = self.send(request).await?;
        self.parse_empty(response)
    }
}

/// Map a non-2xx status to `ApiError::HttpStatus`.
fn check_status(response: &HttpResponse, read_body: bool) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let body = if read_body {
        ErrorBody::parse(&response.body)
    } else {
        ErrorBody::default()
    };
    let message = body
        .message
        .filter(|m| !m.is_empty())
        .or_else(|| Some(response.status_text.clone()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| format!("HTTP {}", response.status));
    Err(ApiError::HttpStatus {
        status: response.status,
        code: body.code,
        message,
        details: body.details,
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{response, ScriptedTransport};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
    }

    fn client() -> HttpClient<ScriptedTransport> {
        HttpClient::new("http://localhost:8080/api", ScriptedTransport::default())
    }

    #[test]
    fn build_get_produces_correct_request() {
        let req = client().build_get("/worklogs/3/summary");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:8080/api/worklogs/3/summary");
        assert!(req.body.is_none());
    }

    #[test]
    fn build_post_serializes_body() {
        let req = client()
            .build_post("/worklogs", &serde_json::json!({"title": "Thesis"}))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req
            .headers
            .contains(&("content-type".to_string(), "application/json".to_string())));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Thesis");
    }

    #[test]
    fn build_delete_has_no_body() {
        let req = client().build_delete("/worklogs/9");
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = HttpClient::new("http://localhost:8080/api/", ScriptedTransport::default());
        assert_eq!(client.build_get("/worklogs").url, "http://localhost:8080/api/worklogs");
    }

    #[test]
    fn parse_json_success() {
        let c = client();
        let req = c.build_get("/x");
        let item: Item = c.parse_json(&req, response(200, r#"{"id":5}"#)).unwrap();
        assert_eq!(item, Item { id: 5 });
    }

    #[test]
    fn parse_json_structured_error_body() {
        let c = client();
        let req = c.build_get("/x");
        let err = c
            .parse_json::<Item>(
                &req,
                response(409, r#"{"message":"Timer already running","code":1001,"details":["a"]}"#),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::HttpStatus {
                status: 409,
                code: Some(1001),
                message: "Timer already running".to_string(),
                details: Some(serde_json::json!(["a"])),
            }
        );
    }

    #[test]
    fn parse_json_error_without_body_uses_status_text() {
        let c = client();
        let req = c.build_get("/x");
        let err = c.parse_json::<Item>(&req, response(500, "")).unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.message(), "Internal Server Error");
    }

    #[test]
    fn parse_json_error_with_parseable_body_still_fails() {
        // A body that happens to decode as `R` must not turn an error into success.
        let c = client();
        let req = c.build_get("/x");
        let err = c.parse_json::<Item>(&req, response(400, r#"{"id":5}"#)).unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.message(), "Bad Request");
    }

    #[test]
    fn parse_json_error_with_unknown_status_and_no_text() {
        let c = client();
        let req = c.build_get("/x");
        let mut resp = response(599, "not json");
        resp.status_text.clear();
        let err = c.parse_json::<Item>(&req, resp).unwrap_err();
        assert_eq!(err.message(), "HTTP 599");
    }

    #[test]
    fn parse_json_bad_success_body_is_network_error() {
        let c = client();
        let req = c.build_get("/x");
        let err = c.parse_json::<Item>(&req, response(200, "not json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(matches!(err, ApiError::Network { ref url, .. } if url == "http://localhost:8080/api/x"));
    }

    #[test]
    fn parse_empty_ignores_error_body() {
        let err = client()
            .parse_empty(response(404, r#"{"message":"gone","code":7}"#))
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::HttpStatus {
                status: 404,
                code: None,
                message: "Not Found".to_string(),
                details: None,
            }
        );
        assert!(client().parse_empty(response(204, "")).is_ok());
    }

    #[tokio::test]
    async fn transport_failure_becomes_network_error() {
        let c = client();
        c.transport().push_failure("connection refused");
        let err = c.get::<Item>("/worklogs/1/summary").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::network("connection refused", "http://localhost:8080/api/worklogs/1/summary")
        );
    }

    #[tokio::test]
    async fn post_and_put_send_json_and_decode_reply() {
        let c = client();
        c.transport().push(response(201, r#"{"id":1}"#));
        c.transport().push(response(200, r#"{"id":2}"#));

        let created: Item = c.post("/worklogs", &serde_json::json!({"title": "a"})).await.unwrap();
        let updated: Item = c.put("/worklogs/1", &serde_json::json!({"title": "b"})).await.unwrap();
        assert_eq!((created.id, updated.id), (1, 2));

        let sent = c.transport().requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[1].method, HttpMethod::Put);
        assert_eq!(sent[1].body.as_deref(), Some(r#"{"title":"b"}"#));
    }

    #[tokio::test]
    async fn delete_maps_status_only() {
        let c = client();
        c.transport().push(response(204, ""));
        c.transport().push(response(403, r#"{"message":"nope"}"#));
        assert!(c.delete("/worklogs/1").await.is_ok());
        let err = c.delete("/worklogs/2").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.message(), "Forbidden");
    }
}
