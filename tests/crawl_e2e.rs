//! End-to-end crawl against a mock API server.
//!
//! Drives the full path - planning probes, page fetches, extraction, the
//! pipeline stages and the CSV backend - and checks the run-level
//! accounting: every expected listing fetched, duplicates dropped exactly
//! once, and the reconciliation verdict matching the delivery.

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sreality_crawler::store::CsvStore;
use sreality_crawler::{
    AutoThrottle, CategoryPartition, Crawler, FetchClient, Pipeline, RetryPolicy, RunStats,
    RunVerdict, StorageBackend, report_run,
};

fn estate(hash_id: i64, name: &str) -> Value {
    json!({
        "hash_id": hash_id,
        "name": name,
        "locality": "Praha 4",
        "price": 5_000_000,
        "labels_all": [["new_building"]],
        "gps": {"lat": 50.05, "lon": 14.42},
        "_links": {"self": {"href": format!("/cs/v2/estates/{hash_id}")}}
    })
}

fn envelope(result_size: u64, estates: Vec<Value>) -> Value {
    json!({"result_size": result_size, "_embedded": {"estates": estates}})
}

async fn mount(server: &MockServer, main_cb: u32, per_page: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/estates"))
        .and(query_param("category_main_cb", main_cb.to_string()))
        .and(query_param("per_page", per_page))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_into_csv_with_duplicates_and_empty_partition() {
    let server = MockServer::start().await;

    // Partition 1: five expected listings, one of them listed twice
    mount(&server, 1, "1", envelope(5, vec![])).await;
    mount(
        &server,
        1,
        "999",
        envelope(
            5,
            vec![
                estate(101, "Flat A"),
                estate(102, "Flat B"),
                estate(103, "Flat C"),
                estate(104, "Flat D"),
                estate(101, "Flat A"),
            ],
        ),
    )
    .await;
    // Partition 2: empty, skipped at planning
    mount(&server, 2, "1", envelope(0, vec![])).await;

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("export.csv");
    let backend: Arc<dyn StorageBackend> = Arc::new(CsvStore::create(&csv_path).unwrap());

    let stats = Arc::new(RunStats::new());
    let required = vec!["hash_id".to_string(), "name".to_string()];
    let pipeline = Arc::new(Pipeline::new(&required, Arc::clone(&stats), Arc::clone(&backend)));
    let client = Arc::new(
        FetchClient::new(
            RetryPolicy::with_max_attempts(2),
            Arc::new(AutoThrottle::disabled()),
        )
        .unwrap(),
    );
    let crawler = Crawler::new(
        client,
        pipeline,
        Arc::clone(&stats),
        format!("{}/estates", server.uri()),
        10,
        999,
        4,
    );

    let snapshot = crawler
        .run(&[
            CategoryPartition::new("flats-sale", 1, 1),
            CategoryPartition::new("houses-sale", 2, 1),
        ])
        .await;
    backend.close().await.unwrap();

    // Run accounting
    assert_eq!(snapshot.pages_fetched, 1);
    assert_eq!(snapshot.records_fetched, 5);
    assert_eq!(snapshot.valid, 5);
    assert_eq!(snapshot.duplicates, 1);
    assert_eq!(snapshot.persisted, 4);
    assert!(snapshot.failures.is_empty());

    // The empty partition never made it into the plan
    assert_eq!(snapshot.categories.len(), 1);
    assert_eq!(snapshot.categories[0].0, "flats-sale");
    assert_eq!(snapshot.categories[0].1.expected, 5);
    assert_eq!(snapshot.categories[0].1.fetched, 5);

    assert_eq!(report_run(&snapshot), RunVerdict::Success);

    // The export holds a header and one row per distinct listing
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&csv_path)
        .unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert!(headers.contains(&"hash_id".to_string()));
    assert!(headers.contains(&"gps_lat".to_string()));
    assert!(headers.contains(&"source_category".to_string()));

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 4);

    let id_column = headers.iter().position(|h| h == "hash_id").unwrap();
    let mut ids: Vec<&str> = rows.iter().map(|row| &row[id_column]).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["101", "102", "103", "104"]);
}

#[tokio::test]
async fn test_partition_shortfall_yields_missing_records_verdict() {
    let server = MockServer::start().await;

    // The probe promises three listings but the page only delivers two
    mount(&server, 1, "1", envelope(3, vec![])).await;
    mount(
        &server,
        1,
        "999",
        envelope(3, vec![estate(1, "a"), estate(2, "b")]),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn StorageBackend> =
        Arc::new(CsvStore::create(dir.path().join("export.csv")).unwrap());

    let stats = Arc::new(RunStats::new());
    let required = vec!["hash_id".to_string(), "name".to_string()];
    let pipeline = Arc::new(Pipeline::new(&required, Arc::clone(&stats), Arc::clone(&backend)));
    let client = Arc::new(
        FetchClient::new(
            RetryPolicy::with_max_attempts(1),
            Arc::new(AutoThrottle::disabled()),
        )
        .unwrap(),
    );
    let crawler = Crawler::new(
        client,
        pipeline,
        Arc::clone(&stats),
        format!("{}/estates", server.uri()),
        10,
        999,
        2,
    );

    let snapshot = crawler
        .run(&[CategoryPartition::new("flats-sale", 1, 1)])
        .await;
    backend.close().await.unwrap();

    assert_eq!(snapshot.records_fetched, 2);
    assert_eq!(report_run(&snapshot), RunVerdict::MissingRecords(1));
}
