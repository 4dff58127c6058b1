//! In-memory stand-in for the search service, used by the client's tests.
//!
//! # Design
//! All state lives in one `Store` behind `Arc<RwLock<..>>`. Writes are applied
//! as soon as they are received, but the task that records them is reported
//! as `enqueued` on creation, `processing` on its first lookup and finished
//! on the next one. Clients therefore have to poll, as they would against
//! the real service.
//!
//! Error bodies use the service's `{message, code, type, link}` shape. Request
//! bodies are parsed by hand so a malformed payload gets that shape too.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub type Document = Map<String, Value>;
pub type Db = Arc<RwLock<Store>>;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_DOCUMENTS_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub link: String,
}

impl ErrorBody {
    fn new(message: impl Into<String>, code: &str, error_type: &str) -> Self {
        Self {
            message: message.into(),
            code: code.to_string(),
            error_type: error_type.to_string(),
            link: format!("https://docs.meilisearch.com/errors#{code}"),
        }
    }

    fn index_not_found(uid: &str) -> Self {
        Self::new(format!("Index `{uid}` not found."), "index_not_found", "invalid_request")
    }
}

#[derive(Debug)]
pub struct MockError {
    status: StatusCode,
    body: ErrorBody,
}

impl MockError {
    fn new(status: StatusCode, body: ErrorBody) -> Self {
        Self { status, body }
    }

    fn not_found(body: ErrorBody) -> Self {
        Self::new(StatusCode::NOT_FOUND, body)
    }

    fn bad_request(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorBody::new(message, code, "invalid_request"))
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, MockError>;

fn parse_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| MockError::bad_request(format!("malformed payload: {e}"), "bad_request"))
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct IndexState {
    pub uid: String,
    pub primary_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub documents: Vec<Document>,
    pub settings: Map<String, Value>,
}

impl IndexState {
    fn new(uid: &str, primary_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.to_string(),
            primary_key,
            created_at: now,
            updated_at: now,
            documents: Vec::new(),
            settings: default_settings(),
        }
    }

    fn info(&self) -> Value {
        json!({
            "uid": self.uid,
            "primaryKey": self.primary_key,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }

    fn position(&self, id: &str) -> Option<usize> {
        let pk = self.primary_key.as_deref()?;
        self.documents.iter().position(|d| document_id(d, pk).as_deref() == Some(id))
    }
}

#[derive(Debug)]
pub struct TaskRecord {
    pub uid: u64,
    pub index_uid: Option<String>,
    pub task_type: String,
    pub enqueued_at: DateTime<Utc>,
    pub details: Value,
    pub error: Option<ErrorBody>,
    /// Lookups so far; drives the reported status.
    pub polls: u32,
}

impl TaskRecord {
    fn status(&self) -> &'static str {
        match (self.polls, &self.error) {
            (0, _) => "enqueued",
            (1, _) => "processing",
            (_, None) => "succeeded",
            (_, Some(_)) => "failed",
        }
    }

    fn summary(&self) -> Value {
        json!({
            "taskUid": self.uid,
            "indexUid": self.index_uid,
            "status": "enqueued",
            "type": self.task_type,
            "enqueuedAt": self.enqueued_at,
        })
    }

    fn view(&self) -> Value {
        let status = self.status();
        let mut view = json!({
            "uid": self.uid,
            "indexUid": self.index_uid,
            "status": status,
            "type": self.task_type,
            "details": self.details,
            "enqueuedAt": self.enqueued_at,
        });
        if self.polls >= 1 {
            view["startedAt"] = json!(self.enqueued_at);
        }
        if self.polls >= 2 {
            view["duration"] = json!("PT0.001S");
            view["finishedAt"] = json!(self.enqueued_at);
        }
        if let (Some(error), "failed") = (&self.error, status) {
            view["error"] = json!(error);
        }
        view
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub description: Option<String>,
    pub key: String,
    pub actions: Vec<String>,
    pub indexes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKey {
    description: Option<String>,
    actions: Option<Vec<String>>,
    indexes: Option<Vec<String>>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct DumpRecord {
    pub uid: String,
    pub started_at: DateTime<Utc>,
    pub polls: u32,
}

/// Everything the fake service knows.
#[derive(Debug, Default)]
pub struct Store {
    pub master_key: Option<String>,
    pub indexes: BTreeMap<String, IndexState>,
    pub tasks: Vec<TaskRecord>,
    pub keys: Vec<KeyRecord>,
    pub dumps: HashMap<String, DumpRecord>,
}

impl Store {
    fn enqueue(&mut self, index_uid: Option<&str>, task_type: &str, details: Value, error: Option<ErrorBody>) -> Value {
        let uid = self.tasks.len() as u64;
        info!(task_uid = uid, task_type, failed = error.is_some(), "task enqueued");
        let task = TaskRecord {
            uid,
            index_uid: index_uid.map(str::to_string),
            task_type: task_type.to_string(),
            enqueued_at: Utc::now(),
            details,
            error,
            polls: 0,
        };
        let summary = task.summary();
        self.tasks.push(task);
        summary
    }

    fn index(&self, uid: &str) -> ApiResult<&IndexState> {
        self.indexes
            .get(uid)
            .ok_or_else(|| MockError::not_found(ErrorBody::index_not_found(uid)))
    }

    fn index_or_create(&mut self, uid: &str) -> &mut IndexState {
        self.indexes
            .entry(uid.to_string())
            .or_insert_with(|| IndexState::new(uid, None))
    }

    fn is_authorized(&self, token: &str) -> bool {
        self.master_key.as_deref() == Some(token) || self.keys.iter().any(|k| k.key == token)
    }
}

fn accepted(summary: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::ACCEPTED, Json(summary))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Service without a master key: every request is accepted.
pub fn app() -> Router {
    app_with_key(None)
}

/// Service that requires `Authorization: Bearer <key>` when a key is given.
pub fn app_with_key(master_key: Option<String>) -> Router {
    let db: Db = Arc::new(RwLock::new(Store {
        master_key,
        ..Store::default()
    }));
    Router::new()
        .route("/indexes", get(list_indexes).post(create_index))
        .route("/indexes/{uid}", get(get_index).put(update_index).delete(delete_index))
        .route(
            "/indexes/{uid}/documents",
            get(list_documents)
                .post(add_documents)
                .put(update_documents)
                .delete(delete_all_documents),
        )
        .route("/indexes/{uid}/documents/delete-batch", post(delete_documents))
        .route("/indexes/{uid}/documents/{id}", get(get_document).delete(delete_document))
        .route("/indexes/{uid}/search", post(search))
        .route(
            "/indexes/{uid}/settings",
            get(get_settings).post(update_settings).patch(update_settings).delete(reset_settings),
        )
        .route(
            "/indexes/{uid}/settings/{name}",
            get(get_setting).post(update_setting).put(update_setting).delete(reset_setting),
        )
        .route("/indexes/{uid}/tasks", get(list_index_tasks))
        .route("/indexes/{uid}/tasks/{task_uid}", get(get_index_task))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{task_uid}", get(get_task))
        .route("/keys", get(list_keys).post(create_key))
        .route("/keys/{key}", get(get_key).delete(delete_key))
        .route("/dumps", post(create_dump))
        .route("/dumps/{uid}/status", get(get_dump_status))
        .route_layer(middleware::from_fn_with_state(db.clone(), authorize))
        .route("/health", get(health))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_key(listener, None).await
}

pub async fn run_with_key(listener: TcpListener, master_key: Option<String>) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_key(master_key)).await
}

async fn authorize(State(db): State<Db>, request: Request, next: Next) -> Response {
    let rejection = {
        let store = db.read().await;
        match store.master_key {
            None => None,
            Some(_) => {
                let token = request
                    .headers()
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string());
                match token {
                    None => Some(MockError::new(
                        StatusCode::UNAUTHORIZED,
                        ErrorBody::new(
                            "The Authorization header is missing. It must use the bearer authorization method.",
                            "missing_authorization_header",
                            "auth",
                        ),
                    )),
                    Some(token) if !store.is_authorized(&token) => Some(MockError::new(
                        StatusCode::FORBIDDEN,
                        ErrorBody::new("The provided API key is invalid.", "invalid_api_key", "auth"),
                    )),
                    Some(_) => None,
                }
            }
        }
    };
    match rejection {
        Some(error) => {
            debug!(path = %request.uri().path(), code = %error.body.code, "request rejected");
            error.into_response()
        }
        None => next.run(request).await,
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "available" }))
}

// ---------------------------------------------------------------------------
// Indexes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndex {
    uid: String,
    primary_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateIndex {
    primary_key: Option<String>,
}

async fn list_indexes(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let results: Vec<Value> = store.indexes.values().map(IndexState::info).collect();
    Json(json!({ "results": results }))
}

async fn create_index(State(db): State<Db>, body: String) -> ApiResult<(StatusCode, Json<Value>)> {
    let input: CreateIndex = parse_body(&body)?;
    let mut store = db.write().await;
    let details = json!({ "primaryKey": input.primary_key });
    let error = if store.indexes.contains_key(&input.uid) {
        Some(ErrorBody::new(
            format!("Index `{}` already exists.", input.uid),
            "index_already_exists",
            "invalid_request",
        ))
    } else {
        let index = IndexState::new(&input.uid, input.primary_key);
        store.indexes.insert(input.uid.clone(), index);
        None
    };
    Ok(accepted(store.enqueue(Some(&input.uid), "indexCreation", details, error)))
}

async fn get_index(State(db): State<Db>, Path(uid): Path<String>) -> ApiResult<Json<Value>> {
    let store = db.read().await;
    Ok(Json(store.index(&uid)?.info()))
}

async fn update_index(
    State(db): State<Db>,
    Path(uid): Path<String>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let input: UpdateIndex = parse_body(&body)?;
    let mut store = db.write().await;
    let details = json!({ "primaryKey": input.primary_key });
    let error = match store.indexes.get_mut(&uid) {
        None => Some(ErrorBody::index_not_found(&uid)),
        Some(index) if index.primary_key.is_some() && !index.documents.is_empty() => Some(ErrorBody::new(
            format!("Index `{uid}` already has a primary key."),
            "index_primary_key_already_exists",
            "invalid_request",
        )),
        Some(index) => {
            index.primary_key = input.primary_key;
            index.updated_at = Utc::now();
            None
        }
    };
    Ok(accepted(store.enqueue(Some(&uid), "indexUpdate", details, error)))
}

async fn delete_index(State(db): State<Db>, Path(uid): Path<String>) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    let (details, error) = match store.indexes.remove(&uid) {
        Some(index) => (json!({ "deletedDocuments": index.documents.len() }), None),
        None => (json!({}), Some(ErrorBody::index_not_found(&uid))),
    };
    accepted(store.enqueue(Some(&uid), "indexDeletion", details, error))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsParams {
    limit: Option<usize>,
    offset: Option<usize>,
    attributes_to_retrieve: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteParams {
    primary_key: Option<String>,
}

/// String form of a document's identifier; only strings and integers qualify.
pub fn document_id(document: &Document, primary_key: &str) -> Option<String> {
    match document.get(primary_key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

/// First top-level field whose name ends in `id`, case-insensitively.
pub fn infer_primary_key(document: &Document) -> Option<String> {
    document
        .keys()
        .find(|k| k.to_ascii_lowercase().ends_with("id"))
        .cloned()
}

fn project(document: &Document, attributes: Option<&[String]>) -> Document {
    match attributes {
        Some(attrs) if !attrs.iter().any(|a| a == "*") => document
            .iter()
            .filter(|(k, _)| attrs.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => document.clone(),
    }
}

async fn list_documents(
    State(db): State<Db>,
    Path(uid): Path<String>,
    Query(params): Query<DocumentsParams>,
) -> ApiResult<Json<Vec<Document>>> {
    let store = db.read().await;
    let index = store.index(&uid)?;
    let attributes: Option<Vec<String>> = params
        .attributes_to_retrieve
        .map(|a| a.split(',').map(str::to_string).collect());
    let documents = index
        .documents
        .iter()
        .skip(params.offset.unwrap_or(0))
        .take(params.limit.unwrap_or(DEFAULT_DOCUMENTS_LIMIT))
        .map(|d| project(d, attributes.as_deref()))
        .collect();
    Ok(Json(documents))
}

async fn get_document(
    State(db): State<Db>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Json<Document>> {
    let store = db.read().await;
    let index = store.index(&uid)?;
    index
        .position(&id)
        .map(|i| Json(index.documents[i].clone()))
        .ok_or_else(|| {
            MockError::not_found(ErrorBody::new(
                format!("Document `{id}` not found."),
                "document_not_found",
                "invalid_request",
            ))
        })
}

async fn add_documents(
    State(db): State<Db>,
    Path(uid): Path<String>,
    Query(params): Query<WriteParams>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    write_documents(db, uid, params, body, false).await
}

async fn update_documents(
    State(db): State<Db>,
    Path(uid): Path<String>,
    Query(params): Query<WriteParams>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    write_documents(db, uid, params, body, true).await
}

/// Upsert by primary key. With `merge`, fields of an existing document are
/// updated in place; otherwise the document is replaced.
async fn write_documents(
    db: Db,
    uid: String,
    params: WriteParams,
    body: String,
    merge: bool,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let documents: Vec<Document> = parse_body(&body)?;
    let mut store = db.write().await;
    let received = documents.len();
    let index = store.index_or_create(&uid);
    let error = apply_documents(index, documents, params.primary_key, merge).err();
    let indexed = if error.is_some() { 0 } else { received };
    let details = json!({ "receivedDocuments": received, "indexedDocuments": indexed });
    Ok(accepted(store.enqueue(Some(&uid), "documentAdditionOrUpdate", details, error)))
}

fn apply_documents(
    index: &mut IndexState,
    documents: Vec<Document>,
    requested_key: Option<String>,
    merge: bool,
) -> Result<(), ErrorBody> {
    if index.primary_key.is_none() {
        index.primary_key = requested_key.or_else(|| documents.first().and_then(infer_primary_key));
    }
    let Some(pk) = index.primary_key.clone() else {
        return Err(ErrorBody::new(
            "The primary key inference failed as no field ends with `id`.",
            "index_primary_key_no_candidate_found",
            "invalid_request",
        ));
    };
    if let Some(bad) = documents.iter().find(|d| document_id(d, &pk).is_none()) {
        return Err(ErrorBody::new(
            format!("Document doesn't have a `{pk}` attribute: `{}`.", Value::Object(bad.clone())),
            "missing_document_id",
            "invalid_request",
        ));
    }
    for document in documents {
        let id = document_id(&document, &pk).unwrap_or_default();
        match index.position(&id) {
            Some(i) if merge => index.documents[i].extend(document),
            Some(i) => index.documents[i] = document,
            None => index.documents.push(document),
        }
    }
    index.updated_at = Utc::now();
    Ok(())
}

async fn delete_document(
    State(db): State<Db>,
    Path((uid, id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    let (details, error) = match store.indexes.get_mut(&uid) {
        None => (json!({}), Some(ErrorBody::index_not_found(&uid))),
        Some(index) => {
            let deleted = match index.position(&id) {
                Some(i) => {
                    index.documents.remove(i);
                    1
                }
                None => 0,
            };
            (json!({ "deletedDocuments": deleted }), None)
        }
    };
    accepted(store.enqueue(Some(&uid), "documentDeletion", details, error))
}

async fn delete_documents(
    State(db): State<Db>,
    Path(uid): Path<String>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let ids: Vec<Value> = parse_body(&body)?;
    let ids: Vec<String> = ids
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    let mut store = db.write().await;
    let (details, error) = match store.indexes.get_mut(&uid) {
        None => (json!({}), Some(ErrorBody::index_not_found(&uid))),
        Some(index) => {
            let before = index.documents.len();
            if let Some(pk) = index.primary_key.clone() {
                index
                    .documents
                    .retain(|d| document_id(d, &pk).map_or(true, |id| !ids.contains(&id)));
            }
            let deleted = before - index.documents.len();
            (json!({ "providedIds": ids.len(), "deletedDocuments": deleted }), None)
        }
    };
    Ok(accepted(store.enqueue(Some(&uid), "documentDeletion", details, error)))
}

async fn delete_all_documents(State(db): State<Db>, Path(uid): Path<String>) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    let (details, error) = match store.indexes.get_mut(&uid) {
        None => (json!({}), Some(ErrorBody::index_not_found(&uid))),
        Some(index) => {
            let deleted = index.documents.len();
            index.documents.clear();
            (json!({ "deletedDocuments": deleted }), None)
        }
    };
    accepted(store.enqueue(Some(&uid), "documentDeletion", details, error))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    q: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
    attributes_to_retrieve: Option<Vec<String>>,
}

/// Case-insensitive substring match over top-level string fields. An empty
/// query matches everything.
pub fn matches(document: &Document, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    document
        .values()
        .filter_map(Value::as_str)
        .any(|s| s.to_lowercase().contains(&needle))
}

async fn search(State(db): State<Db>, Path(uid): Path<String>, body: String) -> ApiResult<Json<Value>> {
    let query: SearchQuery = if body.trim().is_empty() {
        SearchQuery::default()
    } else {
        parse_body(&body)?
    };
    let store = db.read().await;
    let index = store.index(&uid)?;
    let q = query.q.unwrap_or_default();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let matched: Vec<&Document> = index.documents.iter().filter(|d| matches(d, &q)).collect();
    let hits: Vec<Document> = matched
        .iter()
        .skip(offset)
        .take(limit)
        .map(|d| project(d, query.attributes_to_retrieve.as_deref()))
        .collect();
    Ok(Json(json!({
        "hits": hits,
        "offset": offset,
        "limit": limit,
        "estimatedTotalHits": matched.len(),
        "processingTimeMs": 0,
        "query": q,
    })))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        "rankingRules": ["words", "typo", "proximity", "attribute", "sort", "exactness"],
        "distinctAttribute": null,
        "searchableAttributes": ["*"],
        "displayedAttributes": ["*"],
        "stopWords": [],
        "synonyms": {},
        "filterableAttributes": [],
        "sortableAttributes": [],
        "typoTolerance": {
            "enabled": true,
            "minWordSizeForTypos": { "oneTypo": 5, "twoTypos": 9 },
            "disableOnWords": [],
            "disableOnAttributes": [],
        },
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Settings field for a `/settings/{name}` route segment.
pub fn setting_field(name: &str) -> Option<&'static str> {
    Some(match name {
        "ranking-rules" => "rankingRules",
        "distinct-attribute" => "distinctAttribute",
        "searchable-attributes" => "searchableAttributes",
        "displayed-attributes" => "displayedAttributes",
        "stop-words" => "stopWords",
        "synonyms" => "synonyms",
        "filterable-attributes" => "filterableAttributes",
        "sortable-attributes" => "sortableAttributes",
        "typo-tolerance" => "typoTolerance",
        _ => return None,
    })
}

fn unknown_setting(name: &str) -> MockError {
    MockError::not_found(ErrorBody::new(format!("Unknown setting `{name}`."), "not_found", "invalid_request"))
}

async fn get_settings(State(db): State<Db>, Path(uid): Path<String>) -> ApiResult<Json<Value>> {
    let store = db.read().await;
    Ok(Json(Value::Object(store.index(&uid)?.settings.clone())))
}

async fn update_settings(
    State(db): State<Db>,
    Path(uid): Path<String>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let changes: Map<String, Value> = parse_body(&body)?;
    let defaults = default_settings();
    if let Some(unknown) = changes.keys().find(|k| !defaults.contains_key(*k)) {
        return Err(MockError::bad_request(format!("Unknown field `{unknown}`."), "bad_request"));
    }
    let mut store = db.write().await;
    let index = store.index_or_create(&uid);
    for (field, value) in &changes {
        let value = if value.is_null() {
            defaults.get(field).cloned().unwrap_or(Value::Null)
        } else {
            value.clone()
        };
        index.settings.insert(field.clone(), value);
    }
    Ok(accepted(store.enqueue(Some(&uid), "settingsUpdate", Value::Object(changes), None)))
}

async fn reset_settings(State(db): State<Db>, Path(uid): Path<String>) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    let error = match store.indexes.get_mut(&uid) {
        Some(index) => {
            index.settings = default_settings();
            None
        }
        None => Some(ErrorBody::index_not_found(&uid)),
    };
    accepted(store.enqueue(Some(&uid), "settingsUpdate", json!({}), error))
}

async fn get_setting(State(db): State<Db>, Path((uid, name)): Path<(String, String)>) -> ApiResult<Json<Value>> {
    let field = setting_field(&name).ok_or_else(|| unknown_setting(&name))?;
    let store = db.read().await;
    let index = store.index(&uid)?;
    Ok(Json(index.settings.get(field).cloned().unwrap_or(Value::Null)))
}

async fn update_setting(
    State(db): State<Db>,
    Path((uid, name)): Path<(String, String)>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let field = setting_field(&name).ok_or_else(|| unknown_setting(&name))?;
    let value: Value = parse_body(&body)?;
    let mut store = db.write().await;
    let stored = if value.is_null() {
        default_settings().remove(field).unwrap_or(Value::Null)
    } else {
        value.clone()
    };
    store.index_or_create(&uid).settings.insert(field.to_string(), stored);
    let mut details = Map::new();
    details.insert(field.to_string(), value);
    Ok(accepted(store.enqueue(Some(&uid), "settingsUpdate", Value::Object(details), None)))
}

async fn reset_setting(
    State(db): State<Db>,
    Path((uid, name)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let field = setting_field(&name).ok_or_else(|| unknown_setting(&name))?;
    let mut store = db.write().await;
    let error = match store.indexes.get_mut(&uid) {
        Some(index) => {
            let default = default_settings().remove(field).unwrap_or(Value::Null);
            index.settings.insert(field.to_string(), default);
            None
        }
        None => Some(ErrorBody::index_not_found(&uid)),
    };
    Ok(accepted(store.enqueue(Some(&uid), "settingsUpdate", json!({}), error)))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn task_not_found(task_uid: u64) -> MockError {
    MockError::not_found(ErrorBody::new(
        format!("Task `{task_uid}` not found."),
        "task_not_found",
        "invalid_request",
    ))
}

/// Each lookup moves the task one step towards its outcome.
fn poll(store: &mut Store, task_uid: u64, index_uid: Option<&str>) -> ApiResult<Value> {
    let task = store
        .tasks
        .iter_mut()
        .find(|t| t.uid == task_uid && index_uid.map_or(true, |uid| t.index_uid.as_deref() == Some(uid)))
        .ok_or_else(|| task_not_found(task_uid))?;
    task.polls = task.polls.saturating_add(1);
    debug!(task_uid, status = task.status(), "task polled");
    Ok(task.view())
}

async fn list_tasks(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let results: Vec<Value> = store.tasks.iter().rev().map(TaskRecord::view).collect();
    Json(json!({ "results": results }))
}

async fn get_task(State(db): State<Db>, Path(task_uid): Path<u64>) -> ApiResult<Json<Value>> {
    let mut store = db.write().await;
    poll(&mut store, task_uid, None).map(Json)
}

async fn list_index_tasks(State(db): State<Db>, Path(uid): Path<String>) -> ApiResult<Json<Value>> {
    let store = db.read().await;
    store.index(&uid)?;
    let results: Vec<Value> = store
        .tasks
        .iter()
        .rev()
        .filter(|t| t.index_uid.as_deref() == Some(uid.as_str()))
        .map(TaskRecord::view)
        .collect();
    Ok(Json(json!({ "results": results })))
}

async fn get_index_task(
    State(db): State<Db>,
    Path((uid, task_uid)): Path<(String, u64)>,
) -> ApiResult<Json<Value>> {
    let mut store = db.write().await;
    poll(&mut store, task_uid, Some(&uid)).map(Json)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn key_not_found(key: &str) -> MockError {
    MockError::not_found(ErrorBody::new(
        format!("API key `{key}` not found."),
        "api_key_not_found",
        "invalid_request",
    ))
}

async fn list_keys(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({ "results": store.keys }))
}

async fn create_key(State(db): State<Db>, body: String) -> ApiResult<(StatusCode, Json<KeyRecord>)> {
    let input: CreateKey = parse_body(&body)?;
    let actions = input
        .actions
        .ok_or_else(|| MockError::bad_request("`actions` field is mandatory.", "missing_parameter"))?;
    let indexes = input
        .indexes
        .ok_or_else(|| MockError::bad_request("`indexes` field is mandatory.", "missing_parameter"))?;
    let now = Utc::now();
    let record = KeyRecord {
        description: input.description,
        key: Uuid::new_v4().simple().to_string(),
        actions,
        indexes,
        expires_at: input.expires_at,
        created_at: now,
        updated_at: now,
    };
    db.write().await.keys.push(record.clone());
    info!(actions = ?record.actions, "api key created");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_key(State(db): State<Db>, Path(key): Path<String>) -> ApiResult<Json<KeyRecord>> {
    let store = db.read().await;
    store
        .keys
        .iter()
        .find(|k| k.key == key)
        .cloned()
        .map(Json)
        .ok_or_else(|| key_not_found(&key))
}

async fn delete_key(State(db): State<Db>, Path(key): Path<String>) -> ApiResult<StatusCode> {
    let mut store = db.write().await;
    let position = store
        .keys
        .iter()
        .position(|k| k.key == key)
        .ok_or_else(|| key_not_found(&key))?;
    store.keys.remove(position);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Dumps
// ---------------------------------------------------------------------------

async fn create_dump(State(db): State<Db>) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    let now = Utc::now();
    let uid = format!("{}-{}", now.format("%Y%m%d-%H%M%S%3f"), store.dumps.len());
    store.dumps.insert(
        uid.clone(),
        DumpRecord {
            uid: uid.clone(),
            started_at: now,
            polls: 0,
        },
    );
    info!(%uid, "dump started");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "uid": uid, "status": "in_progress", "startedAt": now })),
    )
}

async fn get_dump_status(State(db): State<Db>, Path(uid): Path<String>) -> ApiResult<Json<Value>> {
    let mut store = db.write().await;
    let dump = store.dumps.get_mut(&uid).ok_or_else(|| {
        MockError::not_found(ErrorBody::new(
            format!("Dump `{uid}` not found."),
            "dump_not_found",
            "invalid_request",
        ))
    })?;
    dump.polls = dump.polls.saturating_add(1);
    let mut view = json!({ "uid": dump.uid, "status": "in_progress", "startedAt": dump.started_at });
    if dump.polls >= 2 {
        view["status"] = json!("done");
        view["finishedAt"] = json!(Utc::now());
    }
    Ok(Json(view))
}
