//! HTTP API tests against a server bound to an ephemeral port.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use logsift::config::Config;
use logsift::{db, migrate, server};

struct TestServer {
    base: String,
    logs_dir: PathBuf,
    _tmp: TempDir,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("data/logsift.sqlite"));
    config.ingest.batch_size = 3;
    config.ingest.progress_interval = 2;

    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    pool.close().await;

    let logs_dir = tmp.path().join("logs");
    fs::create_dir_all(&logs_dir).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, &config).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        logs_dir,
        _tmp: tmp,
    }
}

fn write_access_log(server: &TestServer, name: &str) -> PathBuf {
    let lines = [
        r#"172.16.0.1 - - [11/Oct/2023:08:00:01 +0000] "GET /home HTTP/1.1" 200 512 "-" "curl/8.0" 0.010"#,
        r#"172.16.0.2 - - [11/Oct/2023:08:00:02 +0000] "GET /home HTTP/1.1" 200 512 "-" "curl/8.0" 0.011"#,
        r#"172.16.0.2 - - [11/Oct/2023:08:00:03 +0000] "DELETE /item/9 HTTP/1.1" 403 - "-" "curl/8.0" 0.002"#,
        r#"172.16.0.3 - - [11/Oct/2023:08:00:04 +0000] "GET /boom HTTP/1.1" 500 0 "-" "curl/8.0" 1.250"#,
        r#"172.16.0.3 - - [11/Oct/2023:08:00:04 +0000] "GET /boom HTTP/1.1" 500 0 "-" "curl/8.0" 1.250"#,
        "truncated line",
    ];
    let path = server.logs_dir.join(name);
    fs::write(&path, lines.join("\n") + "\n").unwrap();
    path
}

async fn submit(client: &reqwest::Client, server: &TestServer, body: Value) -> reqwest::Response {
    client
        .post(format!("{}/ingest", server.base))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn wait_for_terminal(client: &reqwest::Client, server: &TestServer, name: &str) -> Value {
    for _ in 0..500 {
        let v: Value = client
            .get(format!("{}/status/{}", server.base, name))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if v["status"] != "processing" {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", name);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_version() {
    let server = start_server().await;
    let v: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_then_poll_until_completed() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "edge.log");

    let resp = submit(&client, &server, json!({ "path": path })).await;
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["file_name"], "edge.log");

    let status = wait_for_terminal(&client, &server, "edge.log").await;
    assert_eq!(
        status,
        json!({
            "status": "completed",
            "progress": 100,
            "total": 6,
            "processed": 6,
            "accepted": 4
        })
    );

    let files: Value = client
        .get(format!("{}/files", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(files["files"][0]["file_name"], "edge.log");
    assert_eq!(files["files"][0]["record_count"], 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_endpoint_filters_and_paginates() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "q.log");
    submit(&client, &server, json!({ "path": path, "name": "q.log" })).await;
    wait_for_terminal(&client, &server, "q.log").await;

    let page: Value = client
        .get(format!("{}/logs?file_name=q.log&status_code=403", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["logs"][0]["request_type"], "DELETE");
    assert_eq!(page["logs"][0]["bytes"], "-");

    let page: Value = client
        .get(format!("{}/logs?ip=172.16.0.2&page=2", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["page"], 2);
    assert_eq!(page["logs"].as_array().unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_endpoint_handles_out_of_range_page() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "p.log");
    submit(&client, &server, json!({ "path": path })).await;
    wait_for_terminal(&client, &server, "p.log").await;

    let resp = client
        .get(format!("{}/logs?page={}", server.base, i64::MAX))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["total_count"], 4);
    assert_eq!(page["logs"].as_array().unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_filter_params_are_ignored() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "f.log");
    submit(&client, &server, json!({ "path": path })).await;
    wait_for_terminal(&client, &server, "f.log").await;

    let resp = client
        .get(format!(
            "{}/logs?file_name=&status_code=&ip=&request_type=&page=",
            server.base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["total_count"], 4);
    assert_eq!(page["page"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_requests_use_json_error_body() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/logs?status_code=abc", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    let resp = client
        .post(format!("{}/ingest", server.base))
        .header("content-type", "application/json")
        .body("{\"path\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = submit(&client, &server, json!({ "name": "no-path.log" })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats_summarize_runs() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "s.log");
    submit(&client, &server, json!({ "path": path })).await;
    wait_for_terminal(&client, &server, "s.log").await;

    let stats: Value = client
        .get(format!("{}/stats", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_logs"], 4);
    assert_eq!(stats["unique_ips"], 3);
    assert_eq!(stats["error_count"], 2);
    assert_eq!(stats["files"][0]["file_name"], "s.log");
    assert_eq!(stats["files"][0]["error_count"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_file_and_unknown_status() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let path = write_access_log(&server, "d.log");
    submit(&client, &server, json!({ "path": path })).await;
    wait_for_terminal(&client, &server, "d.log").await;

    let resp = client
        .delete(format!("{}/files/missing.log", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .delete(format!("{}/files/d.log", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let status: Value = client
        .get(format!("{}/status/never.log", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status, json!({ "status": "unknown" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_rejects_missing_path() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = submit(&client, &server, json!({ "path": "/nonexistent/logsift/x.log" })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("/nonexistent/logsift/x.log"));
}
