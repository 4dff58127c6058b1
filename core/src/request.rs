//! Request construction and execution.
//!
//! # Design
//! `RequestFactory` is pure: base URL + path, auth header, encoded body. It
//! never performs I/O, so request shapes are tested without a server.
//! `Executor` sends one request through the configured transport and turns
//! the response into either raw body text or a `MeiliError`. There is no
//! retry here; a failed response is surfaced on the first attempt.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::{ApiError, MeiliError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

const AUTHORIZATION: &str = "Authorization";
const CONTENT_TYPE: &str = "content-type";
const JSON: &str = "application/json";

/// Builds transport-ready requests from a `Config`.
#[derive(Debug)]
pub struct RequestFactory<'a, T, C> {
    config: &'a Config<T, C>,
}

impl<'a, T: Transport, C: Codec> RequestFactory<'a, T, C> {
    pub fn new(config: &'a Config<T, C>) -> Self {
        Self { config }
    }

    /// Build a request whose body is already JSON text; the text is sent
    /// unchanged.
    pub fn create(
        &self,
        method: HttpMethod,
        path: &str,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> HttpRequest {
        let mut headers = self.authorize(headers);
        if body.is_some() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE)) {
            headers.push((CONTENT_TYPE.to_string(), JSON.to_string()));
        }
        HttpRequest {
            method,
            path: format!("{}{}", self.config.host_url(), path),
            headers,
            body,
        }
    }

    /// Build a request, encoding `content` through the configured codec.
    pub fn create_json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        headers: Vec<(String, String)>,
        content: Option<&B>,
    ) -> Result<HttpRequest> {
        let body = self.config.codec().encode(content)?;
        Ok(self.create(method, path, headers, body))
    }

    /// Caller headers are kept in order; any caller `Authorization` header is
    /// replaced by the configured bearer key so exactly one is sent.
    fn authorize(&self, mut headers: Vec<(String, String)>) -> Vec<(String, String)> {
        let key = self.config.api_key();
        if key.is_empty() {
            return headers;
        }
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(AUTHORIZATION));
        headers.push((AUTHORIZATION.to_string(), format!("Bearer {key}")));
        headers
    }
}

/// Sends requests and maps status codes to results.
#[derive(Debug)]
pub struct Executor<'a, T, C> {
    config: &'a Config<T, C>,
}

impl<'a, T: Transport, C: Codec> Executor<'a, T, C> {
    pub fn new(config: &'a Config<T, C>) -> Self {
        Self { config }
    }

    pub fn factory(&self) -> RequestFactory<'a, T, C> {
        RequestFactory::new(self.config)
    }

    pub fn codec(&self) -> &'a C {
        self.config.codec()
    }

    /// Send `request` and return the body text of a successful response.
    pub fn execute(&self, request: HttpRequest) -> Result<String> {
        let method = request.method;
        let path = request.path.clone();
        let transport = self.config.transport();
        let response = match method {
            HttpMethod::Get => transport.get(request),
            HttpMethod::Post => transport.post(request),
            HttpMethod::Put => transport.put(request),
            HttpMethod::Delete => transport.delete(request),
            HttpMethod::Patch => transport.patch(request),
        }?;
        debug!(%method, %path, status = response.status, "request completed");
        self.check(response)
    }

    fn check(&self, response: HttpResponse) -> Result<String> {
        if !response.is_error() {
            return Ok(response.body);
        }
        let error: ApiError = self.codec().decode(Some(&response.body))?;
        Err(MeiliError::Api(error))
    }

    pub fn get(&self, path: &str) -> Result<String> {
        self.execute(self.factory().create(HttpMethod::Get, path, Vec::new(), None))
    }

    pub fn delete(&self, path: &str) -> Result<String> {
        self.execute(self.factory().create(HttpMethod::Delete, path, Vec::new(), None))
    }

    pub fn post(&self, path: &str, body: Option<String>) -> Result<String> {
        self.execute(self.factory().create(HttpMethod::Post, path, Vec::new(), body))
    }

    pub fn put(&self, path: &str, body: Option<String>) -> Result<String> {
        self.execute(self.factory().create(HttpMethod::Put, path, Vec::new(), body))
    }

    pub fn patch(&self, path: &str, body: Option<String>) -> Result<String> {
        self.execute(self.factory().create(HttpMethod::Patch, path, Vec::new(), body))
    }

    /// Send a request with a codec-encoded body and decode the response.
    pub fn send_json<B, R>(&self, method: HttpMethod, path: &str, content: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.factory().create_json(method, path, Vec::new(), content)?;
        let body = self.execute(request)?;
        self.codec().decode(Some(&body))
    }

    pub fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let body = self.get(path)?;
        self.codec().decode(Some(&body))
    }

    pub fn delete_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let body = self.delete(path)?;
        self.codec().decode(Some(&body))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::codec::JsonCodec;

    /// Replays canned responses and records every request it receives.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub responses: Mutex<VecDeque<HttpResponse>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn with(responses: Vec<(u16, &str)>) -> Self {
            let responses = responses
                .into_iter()
                .map(|(status, body)| HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.to_string(),
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn sent(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| MeiliError::Transport("no canned response left".to_string()))
        }
    }

    pub(crate) fn config(key: &str, transport: FakeTransport) -> Config<FakeTransport, JsonCodec> {
        Config::builder("http://localhost:7700", key).transport(transport).build()
    }

    #[test]
    fn no_key_means_no_authorization_header() {
        let config = config("", FakeTransport::default());
        let req = RequestFactory::new(&config).create(HttpMethod::Get, "/indexes", Vec::new(), None);
        assert_eq!(req.path, "http://localhost:7700/indexes");
        assert!(req.header("authorization").is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn key_adds_exactly_one_bearer_header() {
        let config = config("masterKey", FakeTransport::default());
        let headers = vec![
            ("X-Trace".to_string(), "1".to_string()),
            ("authorization".to_string(), "Bearer other".to_string()),
        ];
        let req = RequestFactory::new(&config).create(HttpMethod::Get, "/keys", headers, None);
        let auth: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].1, "Bearer masterKey");
        assert_eq!(req.header("x-trace"), Some("1"));
    }

    #[test]
    fn raw_body_passes_through_and_gets_content_type() {
        let config = config("", FakeTransport::default());
        let raw = r#"[{"id":1,"title":"Carol"}]"#.to_string();
        let req = RequestFactory::new(&config).create(
            HttpMethod::Post,
            "/indexes/movies/documents",
            Vec::new(),
            Some(raw.clone()),
        );
        assert_eq!(req.body.as_deref(), Some(raw.as_str()));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn create_json_encodes_content() {
        let config = config("", FakeTransport::default());
        let req = RequestFactory::new(&config)
            .create_json(HttpMethod::Post, "/indexes", Vec::new(), Some(&serde_json::json!({"uid": "movies"})))
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(r#"{"uid":"movies"}"#));
        let req = RequestFactory::new(&config)
            .create_json::<()>(HttpMethod::Delete, "/indexes/movies", Vec::new(), None)
            .unwrap();
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn error_status_surfaces_api_error_fields() {
        let body = r#"{"message":"not found","code":"index_not_found","type":"invalid_request","link":"https://docs.meilisearch.com/errors#index_not_found"}"#;
        let config = config("", FakeTransport::with(vec![(404, body)]));
        let err = Executor::new(&config).get("/indexes/missing").unwrap_err();
        let api = err.api_error().expect("api error");
        assert_eq!(api.message, "not found");
        assert_eq!(api.code, "index_not_found");
        assert_eq!(api.error_type, "invalid_request");
        assert_eq!(api.link, "https://docs.meilisearch.com/errors#index_not_found");
    }

    #[test]
    fn undecodable_error_body_is_decode_failure() {
        let config = config("", FakeTransport::with(vec![(502, "<html>bad gateway</html>")]));
        let err = Executor::new(&config).get("/health").unwrap_err();
        assert!(matches!(err, MeiliError::Decode(_)));
    }

    #[test]
    fn success_returns_raw_body() {
        let config = config("", FakeTransport::with(vec![(200, r#"{"status":"available"}"#)]));
        let body = Executor::new(&config).get("/health").unwrap();
        assert_eq!(body, r#"{"status":"available"}"#);
    }

    #[test]
    fn repeated_get_decodes_equal_values() {
        let body = r#"{"uid":"movies","primaryKey":"id"}"#;
        let config = config("", FakeTransport::with(vec![(200, body), (200, body)]));
        let executor = Executor::new(&config);
        let first: serde_json::Value = executor.get_json("/indexes/movies").unwrap();
        let second: serde_json::Value = executor.get_json("/indexes/movies").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn verb_helpers_send_matching_methods() {
        let config = config("", FakeTransport::with(vec![(202, "{}"), (202, "{}"), (202, "{}")]));
        let executor = Executor::new(&config);
        executor.put("/a", Some("[]".to_string())).unwrap();
        executor.patch("/b", Some("{}".to_string())).unwrap();
        executor.delete("/c").unwrap();
        let methods: Vec<_> = config.transport().sent().iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete]);
    }
}
