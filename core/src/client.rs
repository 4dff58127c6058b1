//! Synchronous client for the search service.
//!
//! # Design
//! `Client` owns its `Config` and nothing else; it holds no mutable state, so
//! `&Client` can be shared across threads. Every operation builds a request,
//! sends it through the `Executor`, and decodes the answer. Index-scoped
//! operations live on the [`Index`] handle borrowed from the client.

use serde::Serialize;
use serde_json::Value;

use crate::codec::{Codec, JsonCodec};
use crate::config::Config;
use crate::error::Result;
use crate::http::{HttpMethod, Transport};
use crate::index::Index;
use crate::request::Executor;
use crate::task::{poll_task, Task, WaitOptions};
use crate::tenant_token::{generate_tenant_token, TenantTokenOptions};
use crate::transport::UreqTransport;
use crate::types::{Dump, IndexInfo, Key, Results};

#[derive(Debug)]
pub struct Client<T = UreqTransport, C = JsonCodec> {
    config: Config<T, C>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndex<'a> {
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_key: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateIndex<'a> {
    primary_key: Option<&'a str>,
}

impl Client {
    /// Client with the default blocking transport and streaming codec.
    pub fn new(host_url: &str, api_key: &str) -> Self {
        Self::with_config(Config::new(host_url, api_key))
    }

    pub fn from_env() -> Self {
        Self::with_config(Config::from_env())
    }
}

impl<T: Transport, C: Codec> Client<T, C> {
    pub fn with_config(config: Config<T, C>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config<T, C> {
        &self.config
    }

    pub(crate) fn executor(&self) -> Executor<'_, T, C> {
        Executor::new(&self.config)
    }

    // ---------------------------------------------------------------------
    // Indexes
    // ---------------------------------------------------------------------

    pub fn create_index(&self, uid: &str, primary_key: Option<&str>) -> Result<Task> {
        let body = CreateIndex { uid, primary_key };
        self.executor().send_json(HttpMethod::Post, "/indexes", Some(&body))
    }

    /// Local handle to an index; no request is made.
    pub fn index(&self, uid: &str) -> Index<'_, T, C> {
        Index::new(self, uid)
    }

    pub fn get_index(&self, uid: &str) -> Result<Index<'_, T, C>> {
        let info: IndexInfo = self.executor().get_json(&format!("/indexes/{uid}"))?;
        Ok(Index::from_info(self, info))
    }

    pub fn get_raw_index(&self, uid: &str) -> Result<String> {
        self.executor().get(&format!("/indexes/{uid}"))
    }

    pub fn get_indexes(&self) -> Result<Vec<Index<'_, T, C>>> {
        let list: Results<IndexInfo> = self.executor().get_json("/indexes")?;
        Ok(list
            .results
            .into_iter()
            .map(|info| Index::from_info(self, info))
            .collect())
    }

    pub fn get_raw_indexes(&self) -> Result<String> {
        self.executor().get("/indexes")
    }

    pub fn update_index(&self, uid: &str, primary_key: Option<&str>) -> Result<Task> {
        let body = UpdateIndex { primary_key };
        self.executor()
            .send_json(HttpMethod::Put, &format!("/indexes/{uid}"), Some(&body))
    }

    pub fn delete_index(&self, uid: &str) -> Result<Task> {
        self.executor().delete_json(&format!("/indexes/{uid}"))
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub fn get_task(&self, task_uid: u64) -> Result<Task> {
        self.executor().get_json(&format!("/tasks/{task_uid}"))
    }

    pub fn get_tasks(&self) -> Result<Vec<Task>> {
        let list: Results<Task> = self.executor().get_json("/tasks")?;
        Ok(list.results)
    }

    /// Poll `/tasks/{uid}` until the task is terminal. See [`poll_task`].
    pub fn wait_for_task(&self, task_uid: u64, options: &WaitOptions) -> Result<Task> {
        poll_task(task_uid, options, || self.get_task(task_uid))
    }

    // ---------------------------------------------------------------------
    // Keys
    // ---------------------------------------------------------------------

    pub fn get_key(&self, key: &str) -> Result<Key> {
        self.executor().get_json(&format!("/keys/{key}"))
    }

    pub fn get_keys(&self) -> Result<Vec<Key>> {
        let list: Results<Key> = self.executor().get_json("/keys")?;
        Ok(list.results)
    }

    pub fn create_key(&self, options: &Key) -> Result<Key> {
        self.executor().send_json(HttpMethod::Post, "/keys", Some(options))
    }

    pub fn delete_key(&self, key: &str) -> Result<()> {
        self.executor().delete(&format!("/keys/{key}"))?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Dumps
    // ---------------------------------------------------------------------

    pub fn create_dump(&self) -> Result<Dump> {
        let body = self.executor().post("/dumps", None)?;
        self.config.codec().decode(Some(&body))
    }

    pub fn get_dump_status(&self, uid: &str) -> Result<Dump> {
        self.executor().get_json(&format!("/dumps/{uid}/status"))
    }

    // ---------------------------------------------------------------------
    // Tenant tokens
    // ---------------------------------------------------------------------

    /// Sign a tenant token with `options.api_key`, or this client's key when
    /// none is given. No request is made.
    pub fn generate_tenant_token(
        &self,
        search_rules: Option<&Value>,
        options: &TenantTokenOptions,
    ) -> Result<String> {
        generate_tenant_token(self.config.api_key(), search_rules, options)
    }
}
