//! Google Drive publishing against a mock Drive API

use m365ops::M365Error;
use m365ops::ops::drive::{DriveAction, DriveClient, local_files};
use m365ops::retry::RetryExecutor;
use std::fs;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn drive(server: &MockServer, attempts: u32) -> DriveClient {
    DriveClient::new("drive-token".into())
        .with_base_url(&server.uri())
        .with_retry(RetryExecutor::immediate(attempts))
}

fn report_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("report.html"), "<html>new</html>").unwrap();
    fs::write(dir.path().join("users.csv"), "a,b\n").unwrap();
    fs::write(dir.path().join("summary.csv"), "x").unwrap();
    dir
}

#[tokio::test]
async fn test_sync_uploads_updates_and_skips() {
    let server = MockServer::start().await;
    let dir = report_dir();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer drive-token"))
        .and(query_param("q", "'folder-1' in parents and trashed=false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                { "id": "f-html", "name": "report.html", "size": "3" },
                { "id": "f-summary", "name": "summary.csv", "size": "1" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"name\":\"users.csv\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "f-users" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f-html"))
        .and(query_param("uploadType", "media"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "f-html" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut seen = Vec::new();
    let summary = drive(&server, 1)
        .sync_dir(dir.path(), "folder-1", false, |action| {
            let tag = match action {
                DriveAction::Upload(f) => format!("+{}", f.name),
                DriveAction::Update { file, .. } => format!("~{}", file.name),
                DriveAction::Skip(f) => format!("={}", f.name),
            };
            seen.push(tag);
        })
        .await
        .unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);
    seen.sort();
    assert_eq!(seen, vec!["+users.csv", "=summary.csv", "~report.html"]);
}

#[tokio::test]
async fn test_dry_run_only_lists() {
    let server = MockServer::start().await;
    let dir = report_dir();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = drive(&server, 1)
        .sync_dir(dir.path(), "folder-1", true, |_| {})
        .await
        .unwrap();
    assert_eq!(summary.uploaded, 3);
    // No upload mock is mounted; any write would have failed with a 404
}

#[tokio::test]
async fn test_listing_follows_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "next-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "2", "name": "b.csv" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "next-1",
            "files": [{ "id": "1", "name": "a.csv", "size": "10" }]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let files = drive(&server, 1).list_folder("folder-1").await.unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
    assert_eq!(files[0].size, Some(10));
    assert_eq!(files[1].size, None);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let files = drive(&server, 3).list_folder("folder-1").await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "code": 401, "message": "Invalid Credentials" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = drive(&server, 5).list_folder("folder-1").await.unwrap_err();
    assert!(matches!(err, M365Error::DriveApiError { status: 401, .. }));
}

#[tokio::test]
async fn test_upload_retry_reuses_file_created_by_failed_attempt() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("users.csv"), "a,b\n").unwrap();
    let file = local_files(dir.path()).unwrap().remove(0);

    // The create reached Drive but the response was lost
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "f-users", "name": "users.csv", "size": "4" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = drive(&server, 3).upload("folder-1", &file).await.unwrap();
    assert_eq!(id, "f-users");
}

#[tokio::test]
async fn test_upload_without_id_is_an_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("users.csv"), "a,b\n").unwrap();
    let file = local_files(dir.path()).unwrap().remove(0);

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let err = drive(&server, 1).upload("folder-1", &file).await.unwrap_err();
    assert!(err.to_string().contains("no file id"), "{err}");
}
