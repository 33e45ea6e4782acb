//! Session coordinator: the one status record, admission gate, transfer log
//! and observer fan-out shared by every request handler.
//!
//! Each of the four pieces sits behind its own lock and no method here holds
//! two of them at once.

pub mod events;
pub mod gate;
pub mod lease;
pub mod log;
pub mod status;

pub use events::{EventBroadcaster, Subscription};
pub use gate::AdmissionGate;
pub use lease::PeerLease;
pub use log::TransferLog;
pub use status::{Mode, Phase, Snapshot, TransferStatus};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

/// Capacities for the bounded parts of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub log_capacity: usize,
    pub subscriber_buffer: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            log_capacity: log::DEFAULT_LOG_CAPACITY,
            subscriber_buffer: events::DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Handle to one transfer attempt, issued by `Session::begin_transfer`.
#[derive(Debug, Clone)]
pub struct TransferTicket {
    attempt: u64,
    cancel: CancellationToken,
}

impl TransferTicket {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Cheaply cloneable handle shared by all handlers.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    mode: Mode,
    target: PathBuf,
    status: RwLock<TransferStatus>,
    gate: AdmissionGate,
    log: TransferLog,
    events: Arc<EventBroadcaster>,
    // Replaced on every cancel so later attempts start with a fresh token
    cancel: Mutex<CancellationToken>,
}

impl Session {
    pub fn new(mode: Mode, target: impl Into<PathBuf>, limits: SessionLimits) -> Self {
        let target = target.into();
        let target_name = display_name(&target);

        Self {
            inner: Arc::new(SessionInner {
                mode,
                status: RwLock::new(TransferStatus::new(mode, target_name)),
                target,
                gate: AdmissionGate::new(),
                log: TransferLog::new(limits.log_capacity),
                events: Arc::new(EventBroadcaster::new(limits.subscriber_buffer)),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// File or directory being served (send) or the destination directory (recv).
    pub fn target(&self) -> &Path {
        &self.inner.target
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read_status().snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.read_status().phase()
    }

    pub fn active_peer(&self) -> Option<String> {
        self.inner.gate.holder()
    }

    //===========
    // Admission
    //===========

    /// Claim the single peer slot. The returned lease releases it on drop.
    pub fn admit(&self, peer: &str) -> Option<PeerLease> {
        let Some(epoch) = self.inner.gate.try_acquire(peer) else {
            tracing::info!(peer, "rejected peer, another client is active");
            return None;
        };
        self.write_status().set_active_peer(Some(peer.to_string()));
        self.publish();
        Some(PeerLease::new(self.clone(), peer, epoch))
    }

    /// Give back one admission. The slot frees (and the disconnect is logged)
    /// once the peer's last admission from `epoch` is released.
    pub(crate) fn release(&self, peer: &str, epoch: u64) {
        if self.inner.gate.release(peer, epoch) {
            self.write_status().clear_active_peer_if(peer);
            self.log(format!("Client {} disconnected", peer));
        }
    }

    /// Cancel whatever is in flight, free the slot and move to `cancelled`.
    /// Not scoped to the caller: any peer may cancel.
    pub fn cancel(&self, requested_by: &str) -> Phase {
        let previous_holder = self.inner.gate.force_release();

        {
            let mut token = self
                .inner
                .cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let old = std::mem::replace(&mut *token, CancellationToken::new());
            old.cancel();
        }

        let phase = {
            let mut status = self.write_status();
            status.cancel();
            status.phase()
        };

        if let Some(holder) = previous_holder {
            self.log(format!("Client {} disconnected", holder));
        }
        self.publish();
        self.log(format!("Transfer cancelled by {}", requested_by));
        phase
    }

    //=====================
    // Transfer lifecycle
    //=====================

    /// Enter `transferring` for `peer` with the given expected size.
    pub fn begin_transfer(&self, peer: &str, total_size: u64) -> TransferTicket {
        let cancel = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        let attempt = self.write_status().begin(peer, total_size);
        self.publish();

        TransferTicket { attempt, cancel }
    }

    pub fn record_progress(&self, ticket: &TransferTicket, transferred: u64) -> bool {
        let applied = self
            .write_status()
            .record_progress(ticket.attempt, transferred);
        if applied {
            self.publish();
        }
        applied
    }

    pub fn complete(&self, ticket: &TransferTicket, final_size: Option<u64>) -> bool {
        let applied = self.write_status().complete(ticket.attempt, final_size);
        if applied {
            self.publish();
        }
        applied
    }

    pub fn fail(&self, ticket: &TransferTicket, message: &str) -> bool {
        let applied = self.write_status().fail(ticket.attempt, message);
        if applied {
            tracing::warn!(error = message, "transfer failed");
            self.publish();
            self.log(format!("Transfer failed: {}", message));
        }
        applied
    }

    //==================
    // Log and observers
    //==================

    /// Append to the transfer log and notify observers.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.inner.log.push(message);
        self.publish();
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.inner.log.entries()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.events.subscriber_count()
    }

    pub fn snapshot_json(&self) -> Option<String> {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => Some(json),
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize status snapshot");
                None
            }
        }
    }

    /// Push the current snapshot to every observer.
    pub fn publish(&self) {
        // Snapshot is built (and the status lock dropped) before touching subscribers
        if let Some(json) = self.snapshot_json() {
            self.inner.events.publish(&json);
        }
    }

    fn read_status(&self) -> RwLockReadGuard<'_, TransferStatus> {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_status(&self) -> RwLockWriteGuard<'_, TransferStatus> {
        self.inner
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
