//! Writing an incoming upload to the destination directory.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::session::PeerLease;
use crate::utils::security::{validate_filename, ValidationError};

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("failed to read upload: {0}")]
    Read(String),
    #[error("failed to write upload: {0}")]
    Write(#[from] io::Error),
    #[error("transfer cancelled")]
    Cancelled,
}

/// Destination for `filename` inside `dir`, rejecting names that would
/// escape it.
pub fn resolve_destination(dir: &Path, filename: &str) -> Result<PathBuf, ValidationError> {
    validate_filename(filename)?;
    Ok(dir.join(filename))
}

/// Copy `source` into `dest` chunk by chunk, reporting the running total on
/// the lease. Returns the number of bytes written.
pub async fn copy_chunks<S, E, W>(source: S, dest: &mut W, lease: &PeerLease) -> Result<u64, CopyError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let mut source = std::pin::pin!(source);
    let mut written = 0u64;

    while let Some(chunk) = source.next().await {
        if lease.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        let chunk = chunk.map_err(|e| CopyError::Read(e.to_string()))?;
        dest.write_all(&chunk).await?;
        written += chunk.len() as u64;
        lease.progress(written);
    }

    dest.flush().await?;
    Ok(written)
}
