// RPC-surface tests: authorization gating, response shapes and the download
// sandbox, driven through the axum router.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::fs;
use tower::ServiceExt;

use backupcenter::server::build_state;
use common::{test_site, TestSite};

const ADMIN_TOKEN: &str = "test-admin-token";

fn app_for(site: &TestSite) -> Router {
    backupcenter::server::router(build_state(&site.cfg).expect("build state"))
}

fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
    request.header("x-admin-token", ADMIN_TOKEN)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json body")
}

#[tokio::test]
async fn every_method_requires_the_admin_role() {
    let site = test_site();
    let app = app_for(&site);

    let calls = [
        ("POST", "/api/backup", Some("{}")),
        ("GET", "/api/archives", None),
        ("POST", "/api/restore/upload", Some("{}")),
        (
            "POST",
            "/api/restore/archive",
            Some(r#"{"archive_name":"bk-x"}"#),
        ),
        ("GET", "/api/download?path=whatever", None),
    ];
    for (method, uri, body) in calls {
        // Missing token, then wrong token: both must fail closed without
        // leaking whether the resource exists.
        for token in [None, Some("wrong-token")] {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("x-admin-token", token);
            }
            if body.is_some() {
                builder = builder.header("content-type", "application/json");
            }
            let request = builder
                .body(body.map_or_else(Body::empty, Body::from))
                .expect("build request");
            let response = app.clone().oneshot(request).await.expect("request");
            assert_eq!(
                response.status(),
                StatusCode::FORBIDDEN,
                "{method} {uri} must be gated"
            );
            let body = json_body(response).await;
            assert_eq!(body["error"], "forbidden");
        }
    }
}

#[tokio::test]
async fn db_only_backup_response_has_db_url_and_no_bundle() {
    let site = test_site();
    let app = app_for(&site);

    let response = app
        .clone()
        .oneshot(
            authed(Request::builder().method("POST").uri("/api/backup"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"include_files": false, "bundle": false}"#))
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert!(body["files"]["db"]["url"].is_string());
    assert!(body["files"]["db"]["size"].is_u64());
    assert!(body["files"]["bundle"].is_null());
    assert!(body["files"]["public"].is_null());
    assert!(body["files"]["private"].is_null());

    // The catalog agrees with the response shape.
    let response = app
        .oneshot(
            authed(Request::builder().method("GET").uri("/api/archives"))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let archives = json_body(response).await;
    let listed = archives.as_array().expect("array");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "success");
    assert_eq!(listed[0]["source"], "manual");
    assert!(listed[0]["db_file_path"].is_string());
    assert!(listed[0]["public_file_path"].is_null());
    assert!(listed[0]["bundle_file_path"].is_null());
    assert!(listed[0]["downloads"]["db"].is_string());
    assert!(listed[0]["downloads"]["bundle"].is_null());
}

#[tokio::test]
async fn download_serves_registered_artifacts_byte_exact() {
    let site = test_site();
    let app = app_for(&site);

    let response = app
        .clone()
        .oneshot(
            authed(Request::builder().method("POST").uri("/api/backup"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let url = body["files"]["bundle"]["url"].as_str().expect("bundle url");

    let response = app
        .oneshot(
            authed(Request::builder().method("GET").uri(url))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().expect("header"),
        "application/gzip"
    );
    let expected_len: u64 = response.headers()["content-length"]
        .to_str()
        .expect("header")
        .parse()
        .expect("length");

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    assert_eq!(bytes.len() as u64, expected_len);

    // Byte-for-byte what was written at backup time.
    let mut bundles = Vec::new();
    for entry in walk(&site.cfg.archive_root) {
        if entry.file_name() == Some(std::ffi::OsStr::new("bundle.tar.gz")) {
            bundles.push(entry);
        }
    }
    assert_eq!(bundles.len(), 1);
    assert_eq!(fs::read(&bundles[0]).expect("read bundle"), bytes);
}

fn walk(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[tokio::test]
async fn download_rejects_traversal_and_unregistered_paths() {
    let site = test_site();
    let app = app_for(&site);

    // Traversal attempts answer 403.
    for path in ["..%2F..%2Fetc%2Fpasswd", "%2Fetc%2Fpasswd"] {
        let response = app
            .clone()
            .oneshot(
                authed(
                    Request::builder()
                        .method("GET")
                        .uri(format!("/api/download?path={path}")),
                )
                .body(Body::empty())
                .expect("build request"),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // Existing but unregistered file answers 404.
    fs::create_dir_all(&site.cfg.archive_root).expect("mkdir");
    fs::write(site.cfg.archive_root.join("stray.bin"), b"stray").expect("write");
    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("GET")
                    .uri("/api/download?path=stray.bin"),
            )
            .body(Body::empty())
            .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn restore_upload_without_db_file_is_a_validation_error() {
    let site = test_site();
    let app = app_for(&site);

    let response = app
        .oneshot(
            authed(Request::builder().method("POST").uri("/api/restore/upload"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "missing_db_file");
}

#[tokio::test]
async fn restore_from_unknown_archive_is_not_found() {
    let site = test_site();
    let app = app_for(&site);

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/api/restore/archive"),
            )
            .header("content-type", "application/json")
            .body(Body::from(r#"{"archive_name":"bk-does-not-exist"}"#))
            .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn restore_from_archive_returns_a_restore_log_url() {
    let site = test_site();
    let app = app_for(&site);

    let response = app
        .clone()
        .oneshot(
            authed(Request::builder().method("POST").uri("/api/backup"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let name = json_body(response).await["name"]
        .as_str()
        .expect("archive name")
        .to_string();

    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/api/restore/archive"),
            )
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"archive_name":"{name}"}}"#)))
            .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let log_url = body["restore_log_url"].as_str().expect("log url");

    // The log is itself downloadable through the sandbox.
    let response = app
        .oneshot(
            authed(Request::builder().method("GET").uri(log_url))
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let log = String::from_utf8(bytes.to_vec()).expect("utf8 log");
    assert!(log.contains("result: success"));
}
