//! Synchronous client for a Meilisearch-style search service.
//!
//! # Overview
//! `Client` talks to the service over HTTP: indexes, documents, search,
//! settings, tasks, API keys and dumps. Writes are asynchronous on the
//! server; they return a `Task` that `wait_for_task` polls to completion.
//! Tenant tokens are signed locally.
//!
//! # Design
//! - The HTTP round-trip sits behind the `Transport` trait and JSON behind
//!   the `Codec` trait. Both are type parameters of `Config` and `Client`,
//!   with `UreqTransport` and `JsonCodec` as defaults.
//! - `RequestFactory` builds requests without I/O; `Executor` sends them and
//!   maps error statuses to `MeiliError::Api`.
//! - Records are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod index;
pub mod request;
pub mod task;
pub mod tenant_token;
pub mod transport;
pub mod types;

pub use client::Client;
pub use codec::{Codec, JsonCodec, TreeCodec};
pub use config::{Config, ConfigBuilder};
pub use error::{ApiError, MeiliError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use index::Index;
pub use task::{poll_task, Details, Task, TaskStatus, WaitOptions};
pub use tenant_token::TenantTokenOptions;
pub use transport::{ReqwestTransport, TransportOptions, UreqTransport};
pub use types::{
    DocumentsQuery, Dump, Filter, IndexInfo, Key, Results, SearchRequest, SearchResult, Settings,
    TypoTolerance,
};
