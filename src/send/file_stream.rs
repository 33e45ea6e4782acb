//! Chunked response body for a single file, reporting progress per chunk.

use axum::body::Body;
use bytes::Bytes;
use futures::stream;
use std::io;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::session::PeerLease;

struct FileStreamState {
    file: File,
    buf: Vec<u8>,
    transferred: u64,
    lease: PeerLease,
    done: bool,
}

/// Stream `file` in `chunk_size` pieces. The lease travels with the body, so
/// the peer slot is released once the body finishes or is dropped.
pub fn file_body(file: File, lease: PeerLease, chunk_size: usize) -> Body {
    let state = FileStreamState {
        file,
        buf: vec![0u8; chunk_size.max(1)],
        transferred: 0,
        lease,
        done: false,
    };

    let stream = stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        if state.lease.is_cancelled() {
            state.done = true;
            let err = io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled");
            return Some((Err(err), state));
        }

        match state.file.read(&mut state.buf).await {
            Ok(0) => {
                state.lease.complete(None);
                let peer = state.lease.peer().to_string();
                state
                    .lease
                    .session()
                    .log(format!("Download completed for {}", peer));
                None
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&state.buf[..n]);
                // Counts bytes handed to the response body, not bytes the peer has acknowledged
                state.transferred += n as u64;
                state.lease.progress(state.transferred);
                Some((Ok(chunk), state))
            }
            Err(err) => {
                state.lease.fail(&err.to_string());
                state.done = true;
                // Err item aborts the response so the peer sees a truncated body
                Some((Err(err), state))
            }
        }
    });

    Body::from_stream(stream)
}
