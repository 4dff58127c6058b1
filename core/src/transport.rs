//! Concrete `Transport` implementations.
//!
//! # Design
//! - `UreqTransport` is the default: blocking sockets, no runtime, nothing to
//!   shut down.
//! - `ReqwestTransport` runs a pooled async client on a small runtime it owns.
//!   Each exchange is spawned onto that runtime and the caller blocks on a
//!   channel until it completes, so the public API stays synchronous and is
//!   safe to call from inside a host application's own tokio runtime. It can
//!   be tied to a `CancellationToken`; cancelling the token abandons whatever
//!   call is in flight.
//!
//! Response bodies are read in full with no size cap on either transport.
//!
//! Both disable status-as-error handling: a 4xx/5xx comes back as an
//! `HttpResponse` for the executor to interpret.

use std::sync::mpsc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use ureq::typestate::WithBody;

use crate::error::{MeiliError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// Tuning knobs shared by the bundled transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Upper bound for one complete exchange.
    pub timeout: Duration,
    /// Idle connections kept per host (pooled transport only).
    pub pool_max_idle_per_host: usize,
    /// Runtime threads driving the pooled transport.
    pub worker_threads: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 8,
            worker_threads: 2,
        }
    }
}

/// Blocking transport built on `ureq`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(options: &TransportOptions) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(options.timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&TransportOptions::default())
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<WithBody>,
    body: Option<&str>,
) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.path.as_str();
        let headers = request.headers.as_slice();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), headers).call(),
            HttpMethod::Post => send_body(with_headers(self.agent.post(url), headers), body),
            HttpMethod::Put => send_body(with_headers(self.agent.put(url), headers), body),
            HttpMethod::Patch => send_body(with_headers(self.agent.patch(url), headers), body),
        };
        let mut response = result.map_err(|e| MeiliError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_string()
            .map_err(|e| MeiliError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Pooled async transport built on `reqwest`, exposed through the blocking
/// `Transport` contract.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    // `None` only while dropping.
    runtime: Option<tokio::runtime::Runtime>,
    handle: tokio::runtime::Handle,
    cancel: Option<CancellationToken>,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(|e| MeiliError::Transport(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name("meili-transport")
            .enable_all()
            .build()
            .map_err(|e| MeiliError::Transport(e.to_string()))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            client,
            runtime: Some(runtime),
            handle,
            cancel: None,
        })
    }

    /// Abandon in-flight and future calls once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), &request.path);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async move {
            let response = builder
                .send()
                .await
                .map_err(|e| MeiliError::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| MeiliError::Transport(e.to_string()))?;
            Ok::<_, MeiliError>(HttpResponse {
                status,
                headers,
                body,
            })
        };

        let cancel = self.cancel.clone();
        let (tx, rx) = mpsc::channel();
        self.handle.spawn(async move {
            let result = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        Err(MeiliError::Transport("request cancelled".to_string()))
                    }
                    result = exchange => result,
                },
                None => exchange.await,
            };
            let _ = tx.send(result);
        });
        rx.recv()
            .map_err(|_| MeiliError::Transport("transport runtime stopped".to_string()))?
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        // dropping a runtime from inside an async context panics
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
