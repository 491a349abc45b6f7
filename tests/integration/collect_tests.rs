//! Integration tests for the collector
//!
//! These tests use wiremock to stand in for both the ranking site and the
//! detail API, and exercise the fetcher, the ranking scan, the batched
//! detail collection and a complete run end-to-end.

use bangumi_collector::config::{Config, RequestConfig};
use bangumi_collector::crawler::{
    build_http_client, collect, DetailCollector, FetchFailure, Fetcher, RankScanner, RetryPolicy,
};
use bangumi_collector::storage::{CheckpointKey, IdentifierStore, MemoryFailureSink};
use bangumi_collector::{Coordinator, EntityType, SubjectId};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Creates a test configuration pointing both endpoints at the mock server
fn create_test_config(server_uri: &str, data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.entity_type = "anime".to_string();
    config.crawler.start = 1;
    config.crawler.end = 2;
    config.crawler.batch_size = 2;
    config.crawler.concurrency = 4;
    config.crawler.max_retries = 3;
    config.crawler.retry_base_delay_ms = 0; // No backoff in tests
    config.crawler.retry_jitter_ms = 0;
    config.crawler.timeout_secs = 5;
    config.endpoints.site_url = server_uri.to_string();
    config.endpoints.api_url = server_uri.to_string();
    config.output.data_dir = data_dir.to_path_buf();
    config
}

fn test_fetcher(max_attempts: u32, sink: Arc<MemoryFailureSink>) -> Arc<Fetcher> {
    fetcher_with_policy(RetryPolicy::immediate(max_attempts), sink)
}

fn fetcher_with_policy(policy: RetryPolicy, sink: Arc<MemoryFailureSink>) -> Arc<Fetcher> {
    let client = build_http_client(&RequestConfig::default(), Duration::from_secs(5))
        .expect("Failed to build client");
    Arc::new(Fetcher::new(client, policy, 4, sink))
}

/// Serves a fixed body and records what the table file held when the
/// request arrived
struct SnapshotTable {
    table: PathBuf,
    body: String,
    snapshot: Arc<Mutex<Option<String>>>,
}

impl Respond for SnapshotTable {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let contents = std::fs::read_to_string(&self.table).ok();
        *self.snapshot.lock().unwrap() = contents;
        ResponseTemplate::new(200).set_body_string(self.body.clone())
    }
}

/// A ranking page listing the given subject ids
fn ranking_page(ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<li class="item"><a href="/subject/{id}" class="subjectCover cover ll"><img src="x.jpg"></a>
                <h3><a href="/subject/{id}" class="l">Title {id}</a></h3></li>"#
            )
        })
        .collect();
    format!(
        r#"<html><head><title>Ranking</title></head><body><ul id="browserItemList">{}</ul></body></html>"#,
        items
    )
}

/// A detail record with one infobox entry
fn detail_body(id: u32, infobox_key: &str) -> String {
    format!(
        r#"{{
            "id": {id},
            "name": "Subject {id}",
            "images": {{"large": "https://img.example/l/{id}.jpg", "small": "https://img.example/s/{id}.jpg"}},
            "infobox": [{{"key": "{infobox_key}", "value": "v{id}"}}],
            "tags": [{{"name": "rock", "count": 3}}],
            "rating": {{"rank": {id}, "total": 2, "count": {{"8": 1, "10": 1}}}}
        }}"#
    )
}

async fn mount_ranking(server: &MockServer, page: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/anime/browser"))
        .and(query_param("sort", "rank"))
        .and(query_param("page", page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ranking_page(ids))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: u32, infobox_key: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/subjects/{}", id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_body(id, infobox_key))
                .insert_header("content-type", "application/json"),
        )
        .mount(server)
        .await;
}

/// Reads a CSV file back as (header, rows)
fn read_table(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open table");
    let header = reader
        .headers()
        .expect("Failed to read header")
        .iter()
        .map(String::from)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .expect("Failed to read row")
                .iter()
                .map(String::from)
                .collect()
        })
        .collect();
    (header, rows)
}

fn non_empty_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn ranking_requests(requests: &[Request]) -> usize {
    requests
        .iter()
        .filter(|r| r.url.path() == "/anime/browser")
        .count()
}

#[tokio::test]
async fn test_fetch_retries_until_success() {
    let mock_server = MockServer::start().await;

    // Two transient failures, then success
    Mock::given(method("GET"))
        .and(path("/subjects/7"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subjects/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = test_fetcher(3, Arc::clone(&sink));

    let outcome = fetcher
        .fetch(&format!("{}/subjects/7", mock_server.uri()))
        .await;

    assert_eq!(outcome.body(), Some("{}"));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.retries(), 2);
    assert!(sink.urls().is_empty());
}

#[tokio::test]
async fn test_backoff_sleeps_only_between_attempts() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(200);

    Mock::given(method("GET"))
        .and(path("/subjects/7"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subjects/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = fetcher_with_policy(RetryPolicy::new(3, delay, Duration::ZERO), sink);

    let started = Instant::now();
    let outcome = fetcher
        .fetch(&format!("{}/subjects/7", mock_server.uri()))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.body(), Some("{}"));
    // Two sleeps, not three
    assert!(elapsed >= delay * 2, "elapsed {:?}", elapsed);
    assert!(elapsed < delay * 3, "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_not_found_never_sleeps() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(200);

    Mock::given(method("GET"))
        .and(path("/subjects/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = fetcher_with_policy(RetryPolicy::new(3, delay, Duration::ZERO), sink);

    let started = Instant::now();
    let outcome = fetcher
        .fetch(&format!("{}/subjects/404", mock_server.uri()))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.result, Err(FetchFailure::NotFound));
    assert!(elapsed < delay, "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_fetch_gives_up_after_retry_budget() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/subjects/7"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = test_fetcher(3, Arc::clone(&sink));
    let url = format!("{}/subjects/7", mock_server.uri());

    let outcome = fetcher.fetch(&url).await;

    assert_eq!(outcome.result, Err(FetchFailure::Status(503)));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(sink.urls(), vec![url]);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/subjects/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = test_fetcher(5, Arc::clone(&sink));
    let url = format!("{}/subjects/404", mock_server.uri());

    let outcome = fetcher.fetch(&url).await;

    assert_eq!(outcome.result, Err(FetchFailure::NotFound));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(sink.urls(), vec![url]);
}

#[tokio::test]
async fn test_fetch_all_isolates_failures() {
    let mock_server = MockServer::start().await;

    for id in [1, 2, 4] {
        mount_detail(&mock_server, id, "k").await;
    }
    Mock::given(method("GET"))
        .and(path("/subjects/3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let fetcher = test_fetcher(2, Arc::clone(&sink));
    let urls: Vec<String> = (1..=4)
        .map(|id| format!("{}/subjects/{}", mock_server.uri(), id))
        .collect();

    let mut outcomes = fetcher.fetch_all(urls.clone()).await;
    outcomes.sort_by_key(|outcome| outcome.index);

    assert_eq!(outcomes.len(), 4);
    for (outcome, url) in outcomes.iter().zip(&urls) {
        assert_eq!(&outcome.url, url);
    }
    assert!(outcomes[0].body().is_some());
    assert!(outcomes[1].body().is_some());
    assert!(outcomes[2].body().is_none());
    assert!(outcomes[3].body().is_some());
    assert_eq!(sink.urls(), vec![urls[2].clone()]);
}

#[tokio::test]
async fn test_rank_scan_deduplicates_and_checkpoints() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_ranking(&mock_server, "1", &["12", "7", "12"]).await;
    mount_ranking(&mock_server, "2", &["7", "30"]).await;

    let sink = Arc::new(MemoryFailureSink::new());
    let store = IdentifierStore::new(dir.path());
    let scanner = RankScanner::new(test_fetcher(1, sink), &mock_server.uri(), store.clone())
        .expect("Failed to create scanner");

    let identifiers = scanner.scan(EntityType::Anime, 1, 2).await.unwrap();

    let tokens: Vec<&str> = identifiers.iter().map(SubjectId::as_str).collect();
    assert_eq!(tokens, vec!["12", "30", "7"]);

    let key = CheckpointKey::new(EntityType::Anime, 1, 2);
    assert!(dir.path().join("anime_subject_codes_1_2.csv").exists());
    let reloaded = store.load(&key).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(
        reloaded.into_iter().collect::<std::collections::BTreeSet<_>>(),
        identifiers
    );
}

#[tokio::test]
async fn test_rank_scan_stops_at_unreachable_page() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_ranking(&mock_server, "1", &["1", "2"]).await;
    Mock::given(method("GET"))
        .and(path("/anime/browser"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    // Page 3 must never be requested
    Mock::given(method("GET"))
        .and(path("/anime/browser"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ranking_page(&["3"])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let store = IdentifierStore::new(dir.path());
    let scanner = RankScanner::new(
        test_fetcher(2, Arc::clone(&sink)),
        &mock_server.uri(),
        store.clone(),
    )
    .unwrap();

    let identifiers = scanner.scan(EntityType::Anime, 1, 3).await.unwrap();

    assert_eq!(identifiers.len(), 2);
    assert_eq!(sink.urls().len(), 1);
    let saved = store.load(&CheckpointKey::new(EntityType::Anime, 1, 3)).unwrap();
    assert_eq!(saved, vec![SubjectId::from("1"), SubjectId::from("2")]);
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_rows() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    for id in [1, 3, 5] {
        mount_detail(&mock_server, id, "k").await;
    }
    Mock::given(method("GET"))
        .and(path("/subjects/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subjects/4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), dir.path());
    let store = IdentifierStore::new(dir.path());
    let ids: Vec<SubjectId> = (1..=5).map(|id| SubjectId::new(id.to_string())).collect();
    store
        .save(&CheckpointKey::new(EntityType::Anime, 1, 2), &ids)
        .unwrap();

    let summary = Coordinator::new(config).unwrap().run(false).await.unwrap();

    assert!(summary.checkpoint_reused);
    assert_eq!(summary.identifiers, 5);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.failures, 2);

    let (_, rows) = read_table(&dir.path().join("anime_infos.csv"));
    let row_ids: Vec<&str> = rows.iter().map(|row| row[0].as_str()).collect();
    assert_eq!(row_ids, vec!["1", "3", "5"]);

    let failed = non_empty_lines(&dir.path().join("failed_urls.txt"));
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().any(|url| url.ends_with("/subjects/2")));
    assert!(failed.iter().any(|url| url.ends_with("/subjects/4")));
}

#[tokio::test]
async fn test_table_is_union_of_record_columns() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_detail(&mock_server, 1, "Artist").await;
    mount_detail(&mock_server, 2, "Label").await;

    let sink = Arc::new(MemoryFailureSink::new());
    let output = dir.path().join("music_infos.csv");
    let collector = DetailCollector::new(test_fetcher(1, sink), &mock_server.uri(), 1, &output)
        .expect("Failed to create collector");

    let ids = vec![SubjectId::from("1"), SubjectId::from("2")];
    let table = collector.collect(&ids).await.unwrap();
    assert_eq!(table.len(), 2);

    let (header, rows) = read_table(&output);
    assert_eq!(
        header,
        vec![
            "id",
            "name",
            "tags",
            "large_cover",
            "small_cover",
            "Artist",
            "rank",
            "votes",
            "ratings",
            "rating_score",
            "Label"
        ]
    );

    let artist = header.iter().position(|c| c == "Artist").unwrap();
    let label = header.iter().position(|c| c == "Label").unwrap();
    assert_eq!(rows[0][artist], "v1");
    assert_eq!(rows[0][label], "");
    assert_eq!(rows[1][artist], "");
    assert_eq!(rows[1][label], "v2");
}

#[tokio::test]
async fn test_batch_is_on_disk_before_next_batch_fetch() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let output = dir.path().join("anime_infos.csv");
    let snapshot = Arc::new(Mutex::new(None));

    mount_detail(&mock_server, 1, "k").await;
    Mock::given(method("GET"))
        .and(path("/subjects/2"))
        .respond_with(SnapshotTable {
            table: output.clone(),
            body: detail_body(2, "k"),
            snapshot: Arc::clone(&snapshot),
        })
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let collector = DetailCollector::new(test_fetcher(1, sink), &mock_server.uri(), 1, &output)
        .expect("Failed to create collector");

    let table = collector
        .collect(&[SubjectId::from("1"), SubjectId::from("2")])
        .await
        .unwrap();
    assert_eq!(table.len(), 2);

    let seen = snapshot
        .lock()
        .unwrap()
        .clone()
        .expect("Table was not written before the second batch");
    let mut reader = csv::Reader::from_reader(seen.as_bytes());
    assert_eq!(reader.headers().unwrap().get(0), Some("id"));
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some("1"));
}

#[tokio::test]
async fn test_flattened_cells_in_table() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/subjects/9"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "id": 9,
                "images": {"large": "L"},
                "infobox": [{"key": "k", "value": "v"}],
                "tags": [{"name": "a", "count": 1}],
                "rating": {"rank": 5, "total": 2, "count": {"8": 1, "10": 1}}
            }"#,
        ))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let output = dir.path().join("out.csv");
    let collector =
        DetailCollector::new(test_fetcher(1, sink), &mock_server.uri(), 10, &output).unwrap();

    collector.collect(&[SubjectId::from("9")]).await.unwrap();

    let (header, rows) = read_table(&output);
    assert_eq!(
        header,
        vec!["id", "tags", "large_cover", "k", "rank", "votes", "ratings", "rating_score"]
    );
    assert_eq!(
        rows[0],
        vec!["9", r#"{"a":1}"#, "L", "v", "5", "2", r#"{"8":1,"10":1}"#, "9.0"]
    );
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_detail(&mock_server, 1, "k").await;
    Mock::given(method("GET"))
        .and(path("/subjects/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(MemoryFailureSink::new());
    let output = dir.path().join("out.csv");
    let collector = DetailCollector::new(
        test_fetcher(1, Arc::clone(&sink)),
        &mock_server.uri(),
        10,
        &output,
    )
    .unwrap();

    let table = collector
        .collect(&[SubjectId::from("1"), SubjectId::from("2")])
        .await
        .unwrap();

    assert_eq!(table.len(), 1);
    // The fetch itself succeeded, so nothing is logged as failed
    assert!(sink.urls().is_empty());
}

#[tokio::test]
async fn test_empty_identifier_list_writes_empty_table() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    let sink = Arc::new(MemoryFailureSink::new());
    let output = dir.path().join("out.csv");
    let collector =
        DetailCollector::new(test_fetcher(1, sink), &mock_server.uri(), 10, &output).unwrap();

    let table = collector.collect(&[]).await.unwrap();

    assert!(table.is_empty());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
}

#[tokio::test]
async fn test_full_run_scans_then_reuses_checkpoint() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_ranking(&mock_server, "1", &["1", "2"]).await;
    mount_ranking(&mock_server, "2", &["3"]).await;
    for id in 1..=3 {
        mount_detail(&mock_server, id, "k").await;
    }

    let config = create_test_config(&mock_server.uri(), dir.path());

    let first = collect(config.clone(), false).await.expect("First run failed");
    assert!(!first.checkpoint_reused);
    assert_eq!(first.identifiers, 3);
    assert_eq!(first.records, 3);
    assert_eq!(first.failures, 0);
    assert_eq!(first.table_path, dir.path().join("anime_infos.csv"));
    assert!(dir.path().join("anime_subject_codes_1_2.csv").exists());
    assert!(!dir.path().join("failed_urls.txt").exists());

    let after_first = mock_server.received_requests().await.unwrap();
    assert_eq!(ranking_requests(&after_first), 2);

    let second = collect(config.clone(), false).await.expect("Second run failed");
    assert!(second.checkpoint_reused);
    assert_eq!(second.records, 3);
    let after_second = mock_server.received_requests().await.unwrap();
    assert_eq!(ranking_requests(&after_second), 2);

    let third = collect(config, true).await.expect("Fresh run failed");
    assert!(!third.checkpoint_reused);
    let after_third = mock_server.received_requests().await.unwrap();
    assert_eq!(ranking_requests(&after_third), 4);
}

#[tokio::test]
async fn test_rerun_produces_identical_table() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_ranking(&mock_server, "1", &["5", "4", "3"]).await;
    mount_ranking(&mock_server, "2", &["2", "1"]).await;
    for id in 1..=5 {
        mount_detail(&mock_server, id, if id % 2 == 0 { "even" } else { "odd" }).await;
    }

    let config = create_test_config(&mock_server.uri(), dir.path());
    let table = dir.path().join("anime_infos.csv");

    collect(config.clone(), false).await.unwrap();
    let first = std::fs::read(&table).unwrap();

    collect(config, false).await.unwrap();
    let second = std::fs::read(&table).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unknown_entity_type_is_fatal() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().unwrap();

    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.crawler.entity_type = "podcast".to_string();

    let result = collect(config, false).await;

    assert!(result.is_err());
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}
