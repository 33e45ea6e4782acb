use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use std::io;
use tokio::fs::OpenOptions;

use super::storage::{copy_chunks, resolve_destination, CopyError};
use crate::common::AppError;
use crate::server::peer::Peer;
use crate::server::AppState;
use crate::session::Mode;
use crate::utils::fs::format_size;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub path: String,
    pub size: u64,
}

/// Accept one file from a multipart form. An optional `size` field sent
/// before `file` gives the expected length for progress reporting.
pub async fn upload(
    State(state): State<AppState>,
    Peer(peer): Peer,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session = &state.session;
    if session.mode() != Mode::Recv {
        return Err(AppError::BadRequest(
            "Server is not in receive mode".to_string(),
        ));
    }

    let mut lease = session
        .admit(&peer)
        .ok_or_else(|| AppError::Busy("Another client is already connected".to_string()))?;
    session.log(format!("Client {} connected", peer));

    let mut declared_size: Option<u64> = None;
    let field = loop {
        let next = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to get file: {}", e)))?;

        let Some(field) = next else {
            return Err(AppError::BadRequest("Failed to get file".to_string()));
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => break field,
            Some("size") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid size field: {}", e)))?;
                declared_size = text.trim().parse().ok();
            }
            _ => continue,
        }
    };

    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("Failed to get file".to_string()))?;
    let destination = resolve_destination(session.target(), &filename)
        .map_err(|e| AppError::BadRequest(format!("Invalid filename: {}", e)))?;

    // Refuse before any payload bytes are consumed
    if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
        session.log(format!("Upload rejected: {} already exists", filename));
        return Err(AppError::FileExists {
            filename,
            path: destination,
        });
    }

    let total = declared_size.unwrap_or_else(|| content_length(&headers));
    lease.begin(total);
    session.log(format!("Started upload from {}: {}", peer, filename));

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&destination)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            lease.fail(&format!("File '{}' already exists", filename));
            return Err(AppError::FileExists {
                filename,
                path: destination,
            });
        }
        Err(err) => {
            lease.fail(&format!("Failed to create file: {}", err));
            return Err(anyhow::Error::new(err)
                .context(format!("create {}", destination.display()))
                .into());
        }
    };

    let written = match copy_chunks(field, &mut file, &lease).await {
        Ok(written) => written,
        Err(err) => {
            drop(file);
            if !matches!(err, CopyError::Cancelled) {
                lease.fail(&err.to_string());
            }
            // Bytes already written stay on disk
            tracing::warn!(path = %destination.display(), error = %err, "upload stopped, partial file left in place");
            return Err(match err {
                CopyError::Read(msg) => AppError::BadRequest(format!("Upload interrupted: {}", msg)),
                CopyError::Cancelled => AppError::Cancelled("Transfer was cancelled".to_string()),
                CopyError::Write(io_err) => AppError::Internal(
                    anyhow::Error::new(io_err).context(format!("write {}", destination.display())),
                ),
            });
        }
    };

    if let Err(err) = file.sync_all().await {
        lease.fail(&format!("Failed to write file: {}", err));
        return Err(anyhow::Error::new(err)
            .context(format!("sync {}", destination.display()))
            .into());
    }

    lease.complete(Some(written));
    session.log(format!(
        "Upload completed from {}: {} ({})",
        peer,
        filename,
        format_size(written)
    ));

    Ok(Json(UploadResponse {
        status: "success",
        path: destination.display().to_string(),
        size: written,
    }))
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
