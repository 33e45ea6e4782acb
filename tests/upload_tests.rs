mod common;

use axum::http::StatusCode;
use common::*;
use shareport::session::{Mode, Phase};
use tower::ServiceExt;

#[tokio::test]
async fn test_upload_writes_file_and_completes() {
    let temp_dir = setup_temp_dir();
    let (app, session) = create_app(Mode::Recv, temp_dir.path());

    let response = app
        .oneshot(upload_request(PEER_A, "hello.txt", b"hello", Some(5)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["size"], 5);
    assert!(body["path"].as_str().unwrap().ends_with("hello.txt"));

    let written = std::fs::read(temp_dir.path().join("hello.txt")).unwrap();
    assert_eq!(written, b"hello");

    let snap = session.snapshot();
    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!(snap.total_size, 5);
    assert_eq!(snap.transferred_bytes, 5);
    assert_eq!(snap.progress_percent, 100.0);
    assert!(session.active_peer().is_none());

    let log = session.log_entries();
    assert!(log
        .iter()
        .any(|e| e.ends_with("Upload completed from 192.168.1.20: hello.txt (5 B)")));
}

#[tokio::test]
async fn test_upload_without_size_field_uses_actual_size() {
    let temp_dir = setup_temp_dir();
    let (app, session) = create_app(Mode::Recv, temp_dir.path());

    let response = app
        .oneshot(upload_request(PEER_A, "data.bin", &[9u8; 3000], None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let snap = session.snapshot();
    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!(snap.total_size, 3000);
    assert_eq!(snap.transferred_bytes, 3000);
}

#[tokio::test]
async fn test_existing_file_conflicts_and_is_untouched() {
    let temp_dir = setup_temp_dir();
    write_file(temp_dir.path(), "report.pdf", b"original");
    let (app, session) = create_app(Mode::Recv, temp_dir.path());

    let response = app
        .oneshot(upload_request(PEER_A, "report.pdf", b"replacement", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["error"], "file_exists");
    assert_eq!(body["message"], "File 'report.pdf' already exists");
    assert!(body["path"].as_str().unwrap().ends_with("report.pdf"));

    let on_disk = std::fs::read(temp_dir.path().join("report.pdf")).unwrap();
    assert_eq!(on_disk, b"original");
    assert_eq!(session.phase(), Phase::Waiting);
    assert!(session.active_peer().is_none());
}

#[tokio::test]
async fn test_upload_rejected_in_send_mode() {
    let temp_dir = setup_temp_dir();
    let path = write_file(temp_dir.path(), "a.txt", b"a");
    let (app, _session) = create_app(Mode::Send, &path);

    let response = app
        .oneshot(upload_request(PEER_A, "b.txt", b"b", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!temp_dir.path().join("b.txt").exists());
}

#[tokio::test]
async fn test_interrupted_upload_fails_and_keeps_partial_file() {
    let temp_dir = setup_temp_dir();
    let (app, session) = create_app(Mode::Recv, temp_dir.path());

    // Body ends mid-file: no closing boundary ever arrives
    let mut body = multipart_body("partial.bin", &vec![9u8; 200_000], Some(200_000));
    let closing = format!("\r\n--{}--\r\n", BOUNDARY);
    body.truncate(body.len() - closing.len());

    let request = request(axum::http::Method::POST, "/api/upload", PEER_A)
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let snap = session.snapshot();
    assert_eq!(snap.phase, Phase::Error);
    assert!(snap.last_error.is_some());
    assert!(session.active_peer().is_none());
    assert!(session
        .log_entries()
        .iter()
        .any(|e| e.contains("Transfer failed:")));

    let partial = temp_dir.path().join("partial.bin");
    assert!(partial.exists());
    assert!(std::fs::metadata(&partial).unwrap().len() <= 200_000);
}

#[tokio::test]
async fn test_upload_without_file_field_is_bad_request() {
    let temp_dir = setup_temp_dir();
    let (app, session) = create_app(Mode::Recv, temp_dir.path());

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = request(axum::http::Method::POST, "/api/upload", PEER_A)
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(session.active_peer().is_none());
}

#[tokio::test]
async fn test_traversal_filename_is_rejected() {
    let temp_dir = setup_temp_dir();
    let inbox = temp_dir.path().join("inbox");
    std::fs::create_dir(&inbox).unwrap();
    let (app, _session) = create_app(Mode::Recv, &inbox);

    let response = app
        .oneshot(upload_request(PEER_A, "../escape.txt", b"x", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_upload_endpoint_requires_post() {
    let temp_dir = setup_temp_dir();
    let (app, _session) = create_app(Mode::Recv, temp_dir.path());

    let response = app.oneshot(get("/api/upload", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
