#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use shareport::common::AppConfig;
use shareport::server::{routes, AppState};
use shareport::session::{Mode, Session};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PEER_A: &str = "192.168.1.20:50000";
pub const PEER_B: &str = "192.168.1.30:50001";
pub const BOUNDARY: &str = "----shareport-test-boundary";

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        chunk_size: 1024,
        heartbeat_ms: 50,
        show_qr: false,
        ..AppConfig::default()
    }
}

/// Router and session for `mode` serving `target`.
pub fn create_app(mode: Mode, target: &Path) -> (Router, Session) {
    let config = test_config();
    let session = Session::new(mode, target, config.session_limits());
    let state = AppState::new(session.clone(), config);
    (routes::create_router(&state), session)
}

pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Request as if sent from `peer`; the router normally gets this from the listener.
pub fn request(method: Method, uri: &str, peer: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = peer.parse().expect("valid socket address");
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(addr))
}

pub fn get(uri: &str, peer: &str) -> Request<Body> {
    request(Method::GET, uri, peer)
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str, peer: &str) -> Request<Body> {
    request(Method::POST, uri, peer)
        .body(Body::empty())
        .unwrap()
}

/// Multipart upload with an optional leading `size` field.
pub fn upload_request(peer: &str, filename: &str, content: &[u8], size: Option<u64>) -> Request<Body> {
    let body = multipart_body(filename, content, size);
    request(Method::POST, "/api/upload", peer)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn multipart_body(filename: &str, content: &[u8], size: Option<u64>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(size) = size {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"size\"\r\n\r\n{}\r\n",
                BOUNDARY, size
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
