use std::time::Duration;

use feishu_core::FeishuClient;
use feishu_dl::downloader::{DownloadError, DownloadReport, FolderDownloader};
use feishu_dl::export::ExportPoller;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILES: &str = "/open-apis/drive/v1/files";
const EXPORT_TASKS: &str = "/open-apis/drive/v1/export_tasks";

fn downloader(server: &MockServer) -> FolderDownloader {
    let client = FeishuClient::with_base_url(&server.uri(), "tenant-token").unwrap();
    FolderDownloader::new(client).with_poller(ExportPoller::new(
        Duration::from_millis(10),
        Duration::from_secs(5),
    ))
}

async fn mount_listing(server: &MockServer, folder_token: &str, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("folder_token", folder_token))
        .and(header("authorization", "Bearer tenant-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "files": files, "has_more": false }
        })))
        .mount(server)
        .await;
}

async fn mount_direct(server: &MockServer, file_token: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(format!("{FILES}/{file_token}/download")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "url": format!("{}/blob/{file_token}", server.uri()) }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/blob/{file_token}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

async fn mount_export(
    server: &MockServer,
    file_token: &str,
    file_type: &str,
    extension: &str,
    body: &'static [u8],
) {
    let ticket = format!("ticket-{file_token}");
    let exported = format!("exported-{file_token}");
    Mock::given(method("POST"))
        .and(path(EXPORT_TASKS))
        .and(body_partial_json(json!({
            "token": file_token,
            "type": file_type,
            "file_extension": extension
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "ticket": ticket }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{EXPORT_TASKS}/{ticket}")))
        .and(query_param("token", file_token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "result": { "job_status": 0, "file_token": exported } }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{EXPORT_TASKS}/file/{exported}/download")))
        .and(header("authorization", "Bearer tenant-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn downloads_tree_using_route_per_file_type() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        "fldRoot",
        json!([
            { "token": "doxPlan", "name": "Plan", "type": "docx" },
            { "token": "boxLogo", "name": "logo", "type": "png" },
            { "token": "fldSub", "name": "Sub/Dir", "type": "folder" },
            { "token": "boxNotes", "name": "notes.md", "type": "file" },
            { "token": "shtBudget", "name": "Budget", "type": "sheet" }
        ]),
    )
    .await;
    mount_listing(
        &server,
        "fldSub",
        json!([{ "token": "boxBundle", "name": "bundle", "type": "zip" }]),
    )
    .await;

    mount_export(&server, "doxPlan", "docx", "docx", b"plan-bytes").await;
    mount_export(&server, "shtBudget", "sheet", "xlsx", b"budget-bytes").await;
    mount_direct(&server, "boxLogo", b"\x89PNG").await;
    mount_direct(&server, "boxBundle", b"PK").await;

    // unknown type: direct download is refused, the export task is used instead
    Mock::given(method("GET"))
        .and(path(format!("{FILES}/boxNotes/download")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1061045,
            "msg": "not downloadable"
        })))
        .mount(&server)
        .await;
    mount_export(&server, "boxNotes", "file", "md", b"# notes").await;

    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    let report = downloader(&server)
        .download_folder("fldRoot", &out)
        .await
        .unwrap();

    assert_eq!(
        report,
        DownloadReport {
            folders: 1,
            downloaded: 2,
            exported: 3,
            failed: 0,
        }
    );
    assert_eq!(std::fs::read(out.join("Plan.docx")).unwrap(), b"plan-bytes");
    assert_eq!(std::fs::read(out.join("logo.png")).unwrap(), b"\x89PNG");
    assert_eq!(std::fs::read(out.join("notes.md")).unwrap(), b"# notes");
    assert_eq!(std::fs::read(out.join("Budget.xlsx")).unwrap(), b"budget-bytes");
    assert_eq!(
        std::fs::read(out.join("Sub_Dir").join("bundle.zip")).unwrap(),
        b"PK"
    );
}

#[tokio::test]
async fn failures_are_counted_and_the_walk_continues() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        "fldRoot",
        json!([
            { "token": "fldLocked", "name": "Locked", "type": "folder" },
            { "token": "boxBroken", "name": "clip", "type": "mp4" },
            { "token": "boxOk", "name": "song.mp3", "type": "mp3" }
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(FILES))
        .and(query_param("folder_token", "fldLocked"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FILES}/boxBroken/download")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_direct(&server, "boxOk", b"ID3").await;

    let dir = tempdir().unwrap();
    let report = downloader(&server)
        .download_folder("fldRoot", dir.path())
        .await
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.folders, 0);
    assert!(dir.path().join("Locked").is_dir());
    assert!(!dir.path().join("clip.mp4").exists());
    assert_eq!(std::fs::read(dir.path().join("song.mp3")).unwrap(), b"ID3");

    // a direct-only type never falls back to export
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != EXPORT_TASKS));
}

#[tokio::test]
async fn root_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 99991663,
            "msg": "invalid access token"
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let err = downloader(&server)
        .download_folder("fldRoot", dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Api(_)));
}

#[tokio::test]
async fn unnamed_entries_fall_back_to_token_based_names() {
    let server = MockServer::start().await;
    mount_listing(&server, "fldRoot", json!([{ "token": "boxAnon", "type": "gif" }])).await;
    mount_direct(&server, "boxAnon", b"GIF89a").await;

    let dir = tempdir().unwrap();
    let report = downloader(&server)
        .download_folder("fldRoot", dir.path())
        .await
        .unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(
        std::fs::read(dir.path().join("file_boxAnon.gif")).unwrap(),
        b"GIF89a"
    );
}

#[tokio::test]
async fn dot_named_folders_stay_inside_output_dir() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "fldRoot",
        json!([
            { "token": "fldUp", "name": "..", "type": "folder" },
            { "token": "fldHere", "name": ".", "type": "folder" }
        ]),
    )
    .await;
    mount_listing(
        &server,
        "fldUp",
        json!([{ "token": "boxEscape", "name": "escape", "type": "png" }]),
    )
    .await;
    mount_listing(
        &server,
        "fldHere",
        json!([{ "token": "boxStay", "name": "stay", "type": "png" }]),
    )
    .await;
    mount_direct(&server, "boxEscape", b"up").await;
    mount_direct(&server, "boxStay", b"here").await;

    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    let report = downloader(&server)
        .download_folder("fldRoot", &out)
        .await
        .unwrap();

    assert_eq!(report.folders, 2);
    assert_eq!(report.downloaded, 2);
    assert!(!dir.path().join("escape.png").exists());
    assert!(!out.join("stay.png").exists());
    assert_eq!(std::fs::read(out.join("_..").join("escape.png")).unwrap(), b"up");
    assert_eq!(std::fs::read(out.join("_.").join("stay.png")).unwrap(), b"here");
}
