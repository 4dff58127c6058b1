//! HTTP request/response values and the transport seam.
//!
//! # Design
//! Requests and responses are plain owned data, built fresh for every call
//! and never shared. `Transport` is the only place the client touches the
//! network: implementations move bytes and report status, they never
//! interpret it. A 404 or 500 is a successful transport call; deciding what
//! it means is the executor's job.

use std::fmt;

use crate::error::Result;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `path` is the absolute URL (base URL already joined). `body` is encoded
/// JSON text, sent as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Executes HTTP requests.
///
/// Implementations must be safe to call from several threads at once; a
/// single client is shared freely between callers. Non-2xx statuses are
/// returned as `Ok`; only failures that produce no response at all are
/// `Err(MeiliError::Transport)`.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request)
    }

    fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request)
    }

    fn put(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request)
    }

    fn delete(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request)
    }

    fn patch(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}
