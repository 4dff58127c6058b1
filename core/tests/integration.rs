//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port on a background thread, then
//! drives the client over real HTTP with both transports. Validates that
//! request construction, error mapping and task polling agree with an
//! actual server.

use std::net::SocketAddr;
use std::time::Duration;

use meili_core::{
    Client, Codec, Config, DocumentsQuery, Key, MeiliError, ReqwestTransport, SearchRequest,
    SearchResult, TaskStatus, Transport, TransportOptions, TreeCodec, WaitOptions,
};
use serde::{Deserialize, Serialize};

const MASTER_KEY: &str = "integrationMasterKey";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Movie {
    id: u32,
    title: String,
    genre: String,
}

fn movies() -> Vec<Movie> {
    [
        (1, "Carol", "romance"),
        (2, "Wonder Woman", "action"),
        (3, "Life of Pi", "adventure"),
        (4, "Mad Max: Fury Road", "action"),
        (5, "Moana", "animation"),
    ]
    .into_iter()
    .map(|(id, title, genre)| Movie {
        id,
        title: title.to_string(),
        genre: genre.to_string(),
    })
    .collect()
}

/// Start the mock server on a random port and return its address.
fn start_server(master_key: Option<&str>) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let master_key = master_key.map(str::to_string);

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_meili::run_with_key(listener, master_key).await
        })
        .unwrap();
    });

    addr
}

fn wait() -> WaitOptions {
    WaitOptions {
        interval: Duration::from_millis(10),
        ..WaitOptions::default()
    }
}

/// Index, document, search and settings round-trip shared by every
/// transport/codec combination.
fn lifecycle<T: Transport, C: Codec>(client: &Client<T, C>) {
    // indexes
    let task = client.create_index("movies", Some("id")).unwrap();
    assert_eq!(task.status, TaskStatus::Enqueued);
    let done = client.wait_for_task(task.task_uid, &wait()).unwrap();
    assert!(done.is_success(), "{done:?}");

    let index = client.get_index("movies").unwrap();
    assert_eq!(index.primary_key.as_deref(), Some("id"));

    // documents, in batches
    let tasks = index.add_documents_in_batches(&movies(), Some(2), None).unwrap();
    assert_eq!(tasks.len(), 3);
    for task in &tasks {
        assert!(index.wait_for_task(task.task_uid, &wait()).unwrap().is_success());
    }

    let carol: Movie = index.get_document("1").unwrap();
    assert_eq!(carol.title, "Carol");

    let query = DocumentsQuery {
        limit: Some(2),
        offset: Some(1),
        attributes_to_retrieve: None,
    };
    let page: Vec<Movie> = index.get_documents(&query).unwrap();
    assert_eq!(page, movies()[1..3].to_vec());

    // search
    let result: SearchResult<Movie> = index.search(&SearchRequest::new("wonder")).unwrap();
    assert_eq!(result.hits.len(), 1);
    assert_eq!(result.hits[0].id, 2);
    assert_eq!(result.estimated_total_hits, Some(1));

    let paged = SearchRequest {
        limit: Some(2),
        ..SearchRequest::new("")
    };
    let result: SearchResult<Movie> = index.search(&paged).unwrap();
    assert_eq!(result.hits.len(), 2);
    assert_eq!(result.estimated_total_hits, Some(5));

    // settings
    let genre = vec!["genre".to_string()];
    let task = index.update_filterable_attributes(&genre).unwrap();
    index.wait_for_task(task.task_uid, &wait()).unwrap();
    assert_eq!(index.get_filterable_attributes().unwrap(), genre);
    assert_eq!(index.get_distinct_attribute().unwrap(), None);

    let task = index.reset_filterable_attributes().unwrap();
    index.wait_for_task(task.task_uid, &wait()).unwrap();
    assert!(index.get_filterable_attributes().unwrap().is_empty());

    // deletes
    let task = index.delete_documents(&[1, 2]).unwrap();
    index.wait_for_task(task.task_uid, &wait()).unwrap();
    let err = index.get_document::<Movie>("1").unwrap_err();
    assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("document_not_found"));

    let task = client.delete_index("movies").unwrap();
    client.wait_for_task(task.task_uid, &wait()).unwrap();
    let err = client.get_raw_index("movies").unwrap_err();
    assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("index_not_found"));
}

#[test]
fn lifecycle_over_ureq() {
    let addr = start_server(None);
    let client = Client::new(&format!("http://{addr}"), "");
    lifecycle(&client);
}

#[test]
fn lifecycle_over_reqwest_with_tree_codec() {
    let addr = start_server(None);
    let transport = ReqwestTransport::new(&TransportOptions::default()).unwrap();
    let config = Config::builder(&format!("http://{addr}"), "")
        .transport(transport)
        .codec(TreeCodec)
        .build();
    lifecycle(&Client::with_config(config));
}

#[test]
fn lifecycle_with_master_key() {
    let addr = start_server(Some(MASTER_KEY));
    let client = Client::new(&format!("http://{addr}"), MASTER_KEY);
    lifecycle(&client);
}

#[tokio::test(flavor = "multi_thread")]
async fn reqwest_client_inside_host_runtime() {
    let addr = start_server(None);
    let transport = ReqwestTransport::new(&TransportOptions::default()).unwrap();
    let client = Client::with_config(
        Config::builder(&format!("http://{addr}"), "")
            .transport(transport)
            .build(),
    );
    let raw = client.get_raw_indexes().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(value["results"].as_array().unwrap().is_empty());
    drop(client);
}

#[test]
fn duplicate_index_task_fails_with_error() {
    let addr = start_server(None);
    let client = Client::new(&format!("http://{addr}"), "");
    let first = client.create_index("books", None).unwrap();
    client.wait_for_task(first.task_uid, &wait()).unwrap();

    let second = client.create_index("books", None).unwrap();
    let task = client.wait_for_task(second.task_uid, &wait()).unwrap();
    assert!(task.is_failure());
    let error = task.error.unwrap();
    assert_eq!(error.code, "index_already_exists");
    assert_eq!(error.error_type, "invalid_request");
}

#[test]
fn missing_or_wrong_key_is_rejected() {
    let addr = start_server(Some(MASTER_KEY));

    let anonymous = Client::new(&format!("http://{addr}"), "");
    let err = anonymous.get_indexes().unwrap_err();
    assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("missing_authorization_header"));

    let wrong = Client::new(&format!("http://{addr}"), "not-the-key");
    let err = wrong.get_indexes().unwrap_err();
    assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("invalid_api_key"));
}

#[test]
fn key_lifecycle() {
    let addr = start_server(Some(MASTER_KEY));
    let client = Client::new(&format!("http://{addr}"), MASTER_KEY);

    let request = Key {
        description: Some("search only".to_string()),
        actions: Some(vec!["search".to_string()]),
        indexes: Some(vec!["*".to_string()]),
        ..Key::default()
    };
    let created = client.create_key(&request).unwrap();
    assert!(!created.key.is_empty());
    assert_eq!(created.expires_at, None);

    let fetched = client.get_key(&created.key).unwrap();
    assert_eq!(fetched.description.as_deref(), Some("search only"));
    assert_eq!(client.get_keys().unwrap().len(), 1);

    // the new key can authenticate on its own
    let scoped = Client::new(&format!("http://{addr}"), &created.key);
    assert!(scoped.get_indexes().unwrap().is_empty());

    client.delete_key(&created.key).unwrap();
    let err = client.get_key(&created.key).unwrap_err();
    assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("api_key_not_found"));
}

#[test]
fn dump_status_progresses() {
    let addr = start_server(None);
    let client = Client::new(&format!("http://{addr}"), "");
    let dump = client.create_dump().unwrap();
    assert_eq!(dump.status, "in_progress");
    let mut status = client.get_dump_status(&dump.uid).unwrap();
    for _ in 0..5 {
        if status.status == "done" {
            break;
        }
        status = client.get_dump_status(&dump.uid).unwrap();
    }
    assert_eq!(status.status, "done");
}

#[test]
fn raw_documents_and_search_pass_through() {
    let addr = start_server(None);
    let client = Client::new(&format!("http://{addr}"), "");
    let index = client.index("raw");
    let task = index
        .add_raw_documents(r#"[{"sku":"a1","name":"Red Shirt"},{"sku":"b2","name":"Blue Jeans"}]"#, Some("sku"))
        .unwrap();
    client.wait_for_task(task.task_uid, &wait()).unwrap();

    let body = index.raw_search(&SearchRequest::new("shirt")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["hits"][0]["sku"], "a1");

    let raw = client.get_raw_index("raw").unwrap();
    assert!(raw.contains(r#""primaryKey":"sku""#));
}

#[test]
fn wait_times_out_against_slow_task() {
    let addr = start_server(None);
    let client = Client::new(&format!("http://{addr}"), "");
    let task = client.create_index("slow", None).unwrap();
    // the first lookup reports `processing`, so a budget that allows one
    // fetch must time out
    let options = WaitOptions {
        timeout: Duration::from_millis(20),
        interval: Duration::from_millis(50),
        cancelled_is_terminal: false,
    };
    let err = client.wait_for_task(task.task_uid, &options).unwrap_err();
    assert!(matches!(err, MeiliError::Timeout { .. }), "{err:?}");
}

#[test]
fn unreachable_server_is_transport_error() {
    let client = Client::new("http://127.0.0.1:9", "");
    let err = client.get_indexes().unwrap_err();
    assert!(matches!(err, MeiliError::Transport(_)), "{err:?}");
}
