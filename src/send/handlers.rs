//! HTTP handler for the download endpoint.

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    response::Response,
};
use futures::{stream, StreamExt};
use std::path::Path;
use tokio::fs::File;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::common::AppError;
use crate::send::{archive, file_stream};
use crate::server::peer::Peer;
use crate::server::AppState;
use crate::session::{Mode, PeerLease};
use crate::utils::fs::dir_size;

/// Serve the target: a plain file (chunked, or range-aware when the peer asks
/// for a range) or a tar archive of a directory.
pub async fn download(
    State(state): State<AppState>,
    Peer(peer): Peer,
    request: Request,
) -> Result<Response, AppError> {
    let session = &state.session;
    if session.mode() != Mode::Send {
        return Err(AppError::BadRequest(
            "Server is not in send mode".to_string(),
        ));
    }

    let mut lease = session
        .admit(&peer)
        .ok_or_else(|| AppError::Busy("Another client is already connected".to_string()))?;
    session.log(format!("Client {} connected", peer));

    let target = session.target().to_path_buf();
    let metadata = tokio::fs::metadata(&target)
        .await
        .map_err(|_| AppError::NotFound("File not found".to_string()))?;
    let name = session.snapshot().target_name;

    if metadata.is_dir() {
        // Sized lazily: walking a large tree is only worth it once someone downloads
        let walk_root = target.clone();
        let total = tokio::task::spawn_blocking(move || dir_size(&walk_root))
            .await
            .context("directory size task failed")?
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "could not size directory, progress will be approximate");
                0
            });

        lease.begin(total);
        session.log(format!("Started download from {}", peer));

        let body = archive::archive_body(target, lease, state.config.chunk_size);
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "application/x-tar")
            .header(
                header::CONTENT_DISPOSITION,
                super::content_disposition(&format!("{}.tar", name)),
            )
            .body(body)
            .context("build response")?;
        return Ok(response);
    }

    if request.headers().contains_key(header::RANGE) {
        // Range responses bypass progress tracking; the body holds the slot until it ends
        tracing::debug!(peer = %peer, "serving range request");
        return serve_range(&target, request, &name, lease).await;
    }

    let file = File::open(&target)
        .await
        .with_context(|| format!("Failed to open {}", target.display()))?;

    lease.begin(metadata.len());
    session.log(format!("Started download from {}", peer));

    let body = file_stream::file_body(file, lease, state.config.chunk_size);
    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, super::content_disposition(&name))
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(body)
        .context("build response")?;
    Ok(response)
}

async fn serve_range(
    target: &Path,
    request: Request,
    name: &str,
    lease: PeerLease,
) -> Result<Response, AppError> {
    let response = match ServeFile::new(target).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let (parts, body) = response.into_parts();
    let data = Body::new(body).into_data_stream();
    // The lease rides along with the body and is dropped when it ends or is abandoned
    let body = stream::unfold((data, lease), |(mut data, lease)| async move {
        let chunk = data.next().await?;
        Some((chunk, (data, lease)))
    });

    let mut response = Response::from_parts(parts, Body::from_stream(body));
    let disposition: HeaderValue = super::content_disposition(name);
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
