//! Client configuration.
//!
//! `Config` is built once and never mutated. Everything a client creates
//! borrows it, so a single client can be shared across threads without
//! locking as long as the chosen `Transport` is itself thread-safe.

use crate::codec::{Codec, JsonCodec};
use crate::http::Transport;
use crate::transport::UreqTransport;

pub const DEFAULT_HOST: &str = "http://localhost:7700";

#[derive(Debug, Clone)]
pub struct Config<T = UreqTransport, C = JsonCodec> {
    host_url: String,
    api_key: String,
    transport: T,
    codec: C,
}

impl Config {
    /// Start a builder with the default transport and codec.
    pub fn builder(host_url: &str, api_key: &str) -> ConfigBuilder {
        ConfigBuilder {
            host_url: host_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            transport: UreqTransport::default(),
            codec: JsonCodec,
        }
    }

    /// Shorthand for `Config::builder(host_url, api_key).build()`.
    pub fn new(host_url: &str, api_key: &str) -> Self {
        Self::builder(host_url, api_key).build()
    }

    /// Reads `MEILI_HOST` and `MEILI_MASTER_KEY`, falling back to
    /// [`DEFAULT_HOST`] and an empty key.
    pub fn from_env() -> Self {
        let host = std::env::var("MEILI_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let key = std::env::var("MEILI_MASTER_KEY").unwrap_or_default();
        Self::new(&host, &key)
    }
}

impl<T: Transport, C: Codec> Config<T, C> {
    pub fn host_url(&self) -> &str {
        &self.host_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

#[derive(Debug)]
pub struct ConfigBuilder<T = UreqTransport, C = JsonCodec> {
    host_url: String,
    api_key: String,
    transport: T,
    codec: C,
}

impl<T: Transport, C: Codec> ConfigBuilder<T, C> {
    pub fn transport<U: Transport>(self, transport: U) -> ConfigBuilder<U, C> {
        ConfigBuilder {
            host_url: self.host_url,
            api_key: self.api_key,
            transport,
            codec: self.codec,
        }
    }

    pub fn codec<D: Codec>(self, codec: D) -> ConfigBuilder<T, D> {
        ConfigBuilder {
            host_url: self.host_url,
            api_key: self.api_key,
            transport: self.transport,
            codec,
        }
    }

    pub fn build(self) -> Config<T, C> {
        Config {
            host_url: self.host_url,
            api_key: self.api_key,
            transport: self.transport,
            codec: self.codec,
        }
    }
}
