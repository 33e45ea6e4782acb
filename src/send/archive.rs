//! On-the-fly tar archive of a directory.
//!
//! The archive is written straight into the response body from a blocking
//! task; nothing is staged on disk or held in memory beyond one chunk.

use axum::body::Body;
use bytes::Bytes;
use futures::stream;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::session::PeerLease;

// Chunks in flight between the archiver and the response
const ARCHIVE_QUEUE_DEPTH: usize = 4;

type Chunk = io::Result<Bytes>;

/// Start archiving `root` and return the body that carries the archive.
pub fn archive_body(root: PathBuf, lease: PeerLease, chunk_size: usize) -> Body {
    let (tx, rx) = mpsc::channel::<Chunk>(ARCHIVE_QUEUE_DEPTH);

    tokio::task::spawn_blocking(move || write_archive(&root, lease, tx, chunk_size));

    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Body::from_stream(stream)
}

fn write_archive(root: &Path, mut lease: PeerLease, tx: mpsc::Sender<Chunk>, chunk_size: usize) {
    let writer = BufWriter::with_capacity(chunk_size.max(1), ChannelWriter::new(tx.clone()));

    match stream_tar(root, &lease, writer) {
        Ok(()) => {
            lease.complete(None);
            let peer = lease.peer().to_string();
            lease
                .session()
                .log(format!("Download completed for {}", peer));
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(root = %root.display(), error = %message, "archive aborted");
            lease.fail(&message);
            // Abort the body instead of ending it cleanly
            let _ = tx.blocking_send(Err(io::Error::new(err.kind(), message)));
        }
    }

    // Free the peer slot before the body sees end-of-stream
    drop(lease);
    drop(tx);
}

/// Write a tar of everything under `root` (paths relative to `root`) into
/// `writer`, reporting cumulative file bytes after each file.
fn stream_tar(
    root: &Path,
    lease: &PeerLease,
    writer: BufWriter<ChannelWriter>,
) -> io::Result<()> {
    let mut builder = tar::Builder::new(writer);

    let appended = append_tree(
        &mut builder,
        root,
        |bytes| lease.progress(bytes),
        || lease.is_cancelled(),
    );

    match appended {
        Ok(()) => {
            let mut writer = builder.into_inner()?;
            writer.flush()
        }
        Err(err) => {
            // Builder writes the end-of-archive marker on drop; keep it out of the stream
            builder.get_mut().get_mut().abandon();
            Err(err)
        }
    }
}

pub(crate) fn append_tree<W, P, C>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    mut on_progress: P,
    is_cancelled: C,
) -> io::Result<()>
where
    W: Write,
    P: FnMut(u64),
    C: Fn() -> bool,
{
    let mut transferred = 0u64;

    for entry in WalkDir::new(root).min_depth(1) {
        if is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }

        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(relative, entry.path())?;
        } else if file_type.is_file() {
            let mut file = File::open(entry.path())?;
            let len = file.metadata()?.len();
            builder.append_file(relative, &mut file)?;
            transferred += len;
            on_progress(transferred);
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping non-regular entry");
        }
    }

    Ok(())
}

/// Blocking `Write` that hands each buffer to the response body.
struct ChannelWriter {
    tx: Option<mpsc::Sender<Chunk>>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Discard everything written from now on.
    fn abandon(&mut self) {
        self.tx = None;
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "archive stream abandoned"))?;

        // Fails once the response body is gone, i.e. the peer disconnected
        tx.blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
