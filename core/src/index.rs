//! Index handle: documents, search, settings and index-scoped tasks.
//!
//! An `Index` borrows its `Client` and carries the metadata it was created
//! with. `Client::index` builds one without any request; `Client::get_index`
//! fills the metadata from the server.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::Client;
use crate::codec::{Codec, JsonCodec};
use crate::error::{MeiliError, Result};
use crate::http::{HttpMethod, Transport};
use crate::task::{Task, WaitOptions};
use crate::transport::UreqTransport;
use crate::types::{
    DocumentsQuery, IndexInfo, Results, SearchRequest, SearchResult, Settings, TypoTolerance,
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug)]
pub struct Index<'a, T = UreqTransport, C = JsonCodec> {
    client: &'a Client<T, C>,
    pub uid: String,
    pub primary_key: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<'a, T: Transport, C: Codec> Index<'a, T, C> {
    pub(crate) fn new(client: &'a Client<T, C>, uid: &str) -> Self {
        Self {
            client,
            uid: uid.to_string(),
            primary_key: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub(crate) fn from_info(client: &'a Client<T, C>, info: IndexInfo) -> Self {
        Self {
            client,
            uid: info.uid,
            primary_key: info.primary_key,
            created_at: info.created_at,
            updated_at: info.updated_at,
        }
    }

    fn path(&self, suffix: &str) -> String {
        format!("/indexes/{}{}", self.uid, suffix)
    }

    fn documents_path(&self, primary_key: Option<&str>) -> String {
        match primary_key {
            Some(pk) => self.path(&format!("/documents?primaryKey={pk}")),
            None => self.path("/documents"),
        }
    }

    fn decode<R: DeserializeOwned>(&self, body: &str) -> Result<R> {
        self.client.config().codec().decode(Some(body))
    }

    /// Refresh `primary_key` from the server.
    pub fn fetch_primary_key(&mut self) -> Result<()> {
        let info: IndexInfo = self.client.executor().get_json(&self.path(""))?;
        self.primary_key = info.primary_key;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------------

    pub fn get_document<R: DeserializeOwned>(&self, id: &str) -> Result<R> {
        let body = self.get_raw_document(id)?;
        self.decode(&body)
    }

    pub fn get_raw_document(&self, id: &str) -> Result<String> {
        self.client
            .executor()
            .get(&self.path(&format!("/documents/{id}")))
    }

    pub fn get_documents<R: DeserializeOwned>(&self, query: &DocumentsQuery) -> Result<Vec<R>> {
        let body = self.get_raw_documents(query)?;
        self.decode(&body)
    }

    pub fn get_raw_documents(&self, query: &DocumentsQuery) -> Result<String> {
        let path = format!("{}{}", self.path("/documents"), query.to_query_string());
        self.client.executor().get(&path)
    }

    pub fn add_documents<D: Serialize>(&self, documents: &[D], primary_key: Option<&str>) -> Result<Task> {
        self.client
            .executor()
            .send_json(HttpMethod::Post, &self.documents_path(primary_key), Some(documents))
    }

    /// Add documents given as JSON array text; the text is sent unchanged.
    pub fn add_raw_documents(&self, json: &str, primary_key: Option<&str>) -> Result<Task> {
        let body = self
            .client
            .executor()
            .post(&self.documents_path(primary_key), Some(json.to_string()))?;
        self.decode(&body)
    }

    pub fn update_documents<D: Serialize>(&self, documents: &[D], primary_key: Option<&str>) -> Result<Task> {
        self.client
            .executor()
            .send_json(HttpMethod::Put, &self.documents_path(primary_key), Some(documents))
    }

    pub fn update_raw_documents(&self, json: &str, primary_key: Option<&str>) -> Result<Task> {
        let body = self
            .client
            .executor()
            .put(&self.documents_path(primary_key), Some(json.to_string()))?;
        self.decode(&body)
    }

    /// Add `documents` in consecutive chunks of `batch_size`, one request per
    /// chunk, preserving order. Returns one task per chunk.
    pub fn add_documents_in_batches<D: Serialize>(
        &self,
        documents: &[D],
        batch_size: Option<usize>,
        primary_key: Option<&str>,
    ) -> Result<Vec<Task>> {
        self.in_batches(documents, batch_size, |batch| self.add_documents(batch, primary_key))
    }

    pub fn update_documents_in_batches<D: Serialize>(
        &self,
        documents: &[D],
        batch_size: Option<usize>,
        primary_key: Option<&str>,
    ) -> Result<Vec<Task>> {
        self.in_batches(documents, batch_size, |batch| self.update_documents(batch, primary_key))
    }

    fn in_batches<D, F>(&self, documents: &[D], batch_size: Option<usize>, mut send: F) -> Result<Vec<Task>>
    where
        F: FnMut(&[D]) -> Result<Task>,
    {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(MeiliError::Encode("batch size must be greater than zero".to_string()));
        }
        let mut tasks = Vec::with_capacity(documents.len().div_ceil(batch_size));
        for (i, batch) in documents.chunks(batch_size).enumerate() {
            debug!(index = %self.uid, batch = i, size = batch.len(), "sending document batch");
            tasks.push(send(batch)?);
        }
        Ok(tasks)
    }

    pub fn delete_document(&self, id: &str) -> Result<Task> {
        self.client
            .executor()
            .delete_json(&self.path(&format!("/documents/{id}")))
    }

    pub fn delete_documents<I: Serialize>(&self, ids: &[I]) -> Result<Task> {
        self.client.executor().send_json(
            HttpMethod::Post,
            &self.path("/documents/delete-batch"),
            Some(ids),
        )
    }

    pub fn delete_all_documents(&self) -> Result<Task> {
        self.client.executor().delete_json(&self.path("/documents"))
    }

    // ---------------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------------

    pub fn search<R: DeserializeOwned>(&self, request: &SearchRequest) -> Result<SearchResult<R>> {
        let body = self.raw_search(request)?;
        self.decode(&body)
    }

    pub fn raw_search(&self, request: &SearchRequest) -> Result<String> {
        let executor = self.client.executor();
        let req = executor
            .factory()
            .create_json(HttpMethod::Post, &self.path("/search"), Vec::new(), Some(request))?;
        executor.execute(req)
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    fn get_setting<R: DeserializeOwned>(&self, name: &str) -> Result<R> {
        self.client
            .executor()
            .get_json(&self.path(&format!("/settings/{name}")))
    }

    fn update_setting<B: Serialize + ?Sized>(&self, name: &str, method: HttpMethod, value: &B) -> Result<Task> {
        self.client
            .executor()
            .send_json(method, &self.path(&format!("/settings/{name}")), Some(value))
    }

    fn reset_setting(&self, name: &str) -> Result<Task> {
        self.client
            .executor()
            .delete_json(&self.path(&format!("/settings/{name}")))
    }

    pub fn get_settings(&self) -> Result<Settings> {
        self.client.executor().get_json(&self.path("/settings"))
    }

    pub fn update_settings(&self, settings: &Settings) -> Result<Task> {
        self.client
            .executor()
            .send_json(HttpMethod::Post, &self.path("/settings"), Some(settings))
    }

    pub fn reset_settings(&self) -> Result<Task> {
        self.client.executor().delete_json(&self.path("/settings"))
    }

    pub fn get_ranking_rules(&self) -> Result<Vec<String>> {
        self.get_setting("ranking-rules")
    }

    pub fn update_ranking_rules(&self, rules: &[String]) -> Result<Task> {
        self.update_setting("ranking-rules", HttpMethod::Post, rules)
    }

    pub fn reset_ranking_rules(&self) -> Result<Task> {
        self.reset_setting("ranking-rules")
    }

    pub fn get_synonyms(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.get_setting("synonyms")
    }

    pub fn update_synonyms(&self, synonyms: &BTreeMap<String, Vec<String>>) -> Result<Task> {
        self.update_setting("synonyms", HttpMethod::Post, synonyms)
    }

    pub fn reset_synonyms(&self) -> Result<Task> {
        self.reset_setting("synonyms")
    }

    pub fn get_stop_words(&self) -> Result<Vec<String>> {
        self.get_setting("stop-words")
    }

    pub fn update_stop_words(&self, stop_words: &[String]) -> Result<Task> {
        self.update_setting("stop-words", HttpMethod::Post, stop_words)
    }

    pub fn reset_stop_words(&self) -> Result<Task> {
        self.reset_setting("stop-words")
    }

    pub fn get_searchable_attributes(&self) -> Result<Vec<String>> {
        self.get_setting("searchable-attributes")
    }

    pub fn update_searchable_attributes(&self, attributes: &[String]) -> Result<Task> {
        self.update_setting("searchable-attributes", HttpMethod::Put, attributes)
    }

    pub fn reset_searchable_attributes(&self) -> Result<Task> {
        self.reset_setting("searchable-attributes")
    }

    pub fn get_displayed_attributes(&self) -> Result<Vec<String>> {
        self.get_setting("displayed-attributes")
    }

    pub fn update_displayed_attributes(&self, attributes: &[String]) -> Result<Task> {
        self.update_setting("displayed-attributes", HttpMethod::Put, attributes)
    }

    pub fn reset_displayed_attributes(&self) -> Result<Task> {
        self.reset_setting("displayed-attributes")
    }

    pub fn get_filterable_attributes(&self) -> Result<Vec<String>> {
        self.get_setting("filterable-attributes")
    }

    pub fn update_filterable_attributes(&self, attributes: &[String]) -> Result<Task> {
        self.update_setting("filterable-attributes", HttpMethod::Put, attributes)
    }

    pub fn reset_filterable_attributes(&self) -> Result<Task> {
        self.reset_setting("filterable-attributes")
    }

    pub fn get_sortable_attributes(&self) -> Result<Vec<String>> {
        self.get_setting("sortable-attributes")
    }

    pub fn update_sortable_attributes(&self, attributes: &[String]) -> Result<Task> {
        self.update_setting("sortable-attributes", HttpMethod::Put, attributes)
    }

    pub fn reset_sortable_attributes(&self) -> Result<Task> {
        self.reset_setting("sortable-attributes")
    }

    /// `None` when no distinct attribute is set.
    pub fn get_distinct_attribute(&self) -> Result<Option<String>> {
        self.get_setting("distinct-attribute")
    }

    pub fn update_distinct_attribute(&self, attribute: &str) -> Result<Task> {
        self.update_setting("distinct-attribute", HttpMethod::Put, attribute)
    }

    pub fn reset_distinct_attribute(&self) -> Result<Task> {
        self.reset_setting("distinct-attribute")
    }

    pub fn get_typo_tolerance(&self) -> Result<TypoTolerance> {
        self.get_setting("typo-tolerance")
    }

    pub fn update_typo_tolerance(&self, typo_tolerance: &TypoTolerance) -> Result<Task> {
        self.update_setting("typo-tolerance", HttpMethod::Post, typo_tolerance)
    }

    pub fn reset_typo_tolerance(&self) -> Result<Task> {
        self.reset_setting("typo-tolerance")
    }

    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub fn get_task(&self, task_uid: u64) -> Result<Task> {
        self.client
            .executor()
            .get_json(&self.path(&format!("/tasks/{task_uid}")))
    }

    pub fn get_tasks(&self) -> Result<Vec<Task>> {
        let list: Results<Task> = self.client.executor().get_json(&self.path("/tasks"))?;
        Ok(list.results)
    }

    pub fn wait_for_task(&self, task_uid: u64, options: &WaitOptions) -> Result<Task> {
        self.client.wait_for_task(task_uid, options)
    }
}
