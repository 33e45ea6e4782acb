//! The single transfer status record and its state machine.
//!
//! `TransferStatus` is plain data. The coordinator wraps it in one lock and
//! every mutation below runs while that lock is held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the session, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Send,
    Recv,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Send => "send",
            Mode::Recv => "recv",
        }
    }
}

/// Lifecycle stage of the current transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Transferring,
    Completed,
    Cancelled,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled | Phase::Error)
    }
}

/// Point-in-time copy of the status, as served by `/api/info` and pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: Mode,
    #[serde(rename = "path")]
    pub target_name: String,
    #[serde(rename = "size")]
    pub total_size: u64,
    #[serde(rename = "transferred")]
    pub transferred_bytes: u64,
    #[serde(rename = "progress")]
    pub progress_percent: f64,
    #[serde(rename = "status")]
    pub phase: Phase,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    #[serde(rename = "client_ip", skip_serializing_if = "Option::is_none", default)]
    pub active_peer: Option<String>,
    #[serde(rename = "start_time")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "last_update_time")]
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TransferStatus {
    mode: Mode,
    target_name: String,
    total_size: u64,
    transferred_bytes: u64,
    progress_percent: f64,
    phase: Phase,
    last_error: Option<String>,
    active_peer: Option<String>,
    started_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    // Bumped by every `begin`; updates carrying an older attempt are ignored
    attempt: u64,
}

impl TransferStatus {
    pub fn new(mode: Mode, target_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            mode,
            target_name: target_name.into(),
            total_size: 0,
            transferred_bytes: 0,
            progress_percent: 0.0,
            phase: Phase::Waiting,
            last_error: None,
            active_peer: None,
            started_at: now,
            last_updated_at: now,
            attempt: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Start a new attempt for `peer`. Returns the attempt number that later
    /// progress and terminal updates must present.
    pub fn begin(&mut self, peer: &str, total_size: u64) -> u64 {
        self.attempt += 1;
        self.phase = Phase::Transferring;
        self.total_size = total_size;
        self.transferred_bytes = 0;
        self.progress_percent = 0.0;
        self.last_error = None;
        self.active_peer = Some(peer.to_string());
        self.started_at = Utc::now();
        self.touch();
        self.attempt
    }

    /// Advance the byte counter. Stale attempts, finished attempts and
    /// decreasing counts are rejected so observers never see a step back.
    pub fn record_progress(&mut self, attempt: u64, transferred: u64) -> bool {
        if !self.is_live(attempt) || transferred < self.transferred_bytes {
            return false;
        }
        self.transferred_bytes = transferred;
        if self.total_size > 0 && transferred > self.total_size {
            // Sources can grow while streaming; keep transferred <= total
            self.total_size = transferred;
        }
        self.progress_percent = percent(self.transferred_bytes, self.total_size);
        self.touch();
        true
    }

    /// Mark the attempt completed. `final_size` replaces the total when the
    /// declared size was only an estimate.
    pub fn complete(&mut self, attempt: u64, final_size: Option<u64>) -> bool {
        if !self.is_live(attempt) {
            return false;
        }
        if let Some(size) = final_size {
            self.total_size = size;
            self.transferred_bytes = size;
        }
        self.phase = Phase::Completed;
        self.progress_percent = 100.0;
        self.touch();
        true
    }

    pub fn fail(&mut self, attempt: u64, message: impl Into<String>) -> bool {
        if !self.is_live(attempt) {
            return false;
        }
        self.phase = Phase::Error;
        self.last_error = Some(message.into());
        self.touch();
        true
    }

    /// Explicit cancellation applies from any phase.
    pub fn cancel(&mut self) {
        self.phase = Phase::Cancelled;
        self.active_peer = None;
        self.touch();
    }

    pub fn set_active_peer(&mut self, peer: Option<String>) {
        self.active_peer = peer;
        self.touch();
    }

    pub fn clear_active_peer_if(&mut self, peer: &str) {
        if self.active_peer.as_deref() == Some(peer) {
            self.set_active_peer(None);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            target_name: self.target_name.clone(),
            total_size: self.total_size,
            transferred_bytes: self.transferred_bytes,
            progress_percent: self.progress_percent,
            phase: self.phase,
            last_error: self.last_error.clone(),
            active_peer: self.active_peer.clone(),
            started_at: self.started_at,
            last_updated_at: self.last_updated_at,
        }
    }

    fn is_live(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.phase == Phase::Transferring
    }

    fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }
}

fn percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (transferred as f64 / total as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_status_is_waiting_with_zero_progress() {
        let status = TransferStatus::new(Mode::Send, "report.pdf");
        let snap = status.snapshot();

        assert_eq!(snap.phase, Phase::Waiting);
        assert_eq!(snap.transferred_bytes, 0);
        assert_eq!(snap.progress_percent, 0.0);
        assert_eq!(snap.target_name, "report.pdf");
        assert!(snap.active_peer.is_none());
    }

    #[test]
    fn progress_is_derived_from_total() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let attempt = status.begin("10.0.0.2", 1000);

        assert!(status.record_progress(attempt, 500));
        assert_eq!(status.snapshot().progress_percent, 50.0);

        assert!(status.record_progress(attempt, 1000));
        assert_eq!(status.snapshot().progress_percent, 100.0);
    }

    #[test]
    fn unknown_total_holds_progress_at_zero() {
        let mut status = TransferStatus::new(Mode::Recv, "inbox");
        let attempt = status.begin("10.0.0.2", 0);

        assert!(status.record_progress(attempt, 4096));
        let snap = status.snapshot();
        assert_eq!(snap.transferred_bytes, 4096);
        assert_eq!(snap.progress_percent, 0.0);
    }

    #[test]
    fn transferred_never_decreases() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let attempt = status.begin("10.0.0.2", 100);

        assert!(status.record_progress(attempt, 60));
        assert!(!status.record_progress(attempt, 40));
        assert_eq!(status.snapshot().transferred_bytes, 60);
    }

    #[test]
    fn growth_past_total_raises_total() {
        let mut status = TransferStatus::new(Mode::Send, "dir");
        let attempt = status.begin("10.0.0.2", 100);

        assert!(status.record_progress(attempt, 150));
        let snap = status.snapshot();
        assert_eq!(snap.total_size, 150);
        assert_eq!(snap.progress_percent, 100.0);
    }

    #[test]
    fn complete_forces_full_progress() {
        let mut status = TransferStatus::new(Mode::Send, "dir");
        let attempt = status.begin("10.0.0.2", 0);
        status.record_progress(attempt, 10);

        assert!(status.complete(attempt, None));
        let snap = status.snapshot();
        assert_eq!(snap.phase, Phase::Completed);
        assert_eq!(snap.progress_percent, 100.0);
    }

    #[test]
    fn complete_with_final_size_replaces_estimate() {
        let mut status = TransferStatus::new(Mode::Recv, "inbox");
        let attempt = status.begin("10.0.0.2", 300);
        status.record_progress(attempt, 5);

        assert!(status.complete(attempt, Some(5)));
        let snap = status.snapshot();
        assert_eq!(snap.total_size, 5);
        assert_eq!(snap.transferred_bytes, 5);
    }

    #[test]
    fn fail_records_message() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let attempt = status.begin("10.0.0.2", 100);

        assert!(status.fail(attempt, "broken pipe"));
        let snap = status.snapshot();
        assert_eq!(snap.phase, Phase::Error);
        assert_eq!(snap.last_error.as_deref(), Some("broken pipe"));
    }

    #[test]
    fn cancelled_attempt_cannot_complete_or_fail() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let attempt = status.begin("10.0.0.2", 100);
        status.cancel();

        assert!(!status.complete(attempt, None));
        assert!(!status.fail(attempt, "late error"));
        assert!(!status.record_progress(attempt, 50));
        assert_eq!(status.phase(), Phase::Cancelled);
    }

    #[test]
    fn stale_attempt_is_ignored() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let first = status.begin("10.0.0.2", 100);
        let second = status.begin("10.0.0.2", 100);

        assert!(!status.record_progress(first, 90));
        assert!(status.record_progress(second, 10));
        assert!(!status.complete(first, None));
        assert_eq!(status.snapshot().transferred_bytes, 10);
    }

    #[test]
    fn begin_clears_previous_error() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let first = status.begin("10.0.0.2", 100);
        status.fail(first, "reset");

        status.begin("10.0.0.3", 100);
        let snap = status.snapshot();
        assert_eq!(snap.phase, Phase::Transferring);
        assert!(snap.last_error.is_none());
        assert_eq!(snap.active_peer.as_deref(), Some("10.0.0.3"));
    }

    #[test]
    fn snapshot_uses_wire_field_names() {
        let mut status = TransferStatus::new(Mode::Send, "a.bin");
        let attempt = status.begin("10.0.0.2", 4);
        status.complete(attempt, None);

        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["mode"], "send");
        assert_eq!(json["path"], "a.bin");
        assert_eq!(json["size"], 4);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["client_ip"], "10.0.0.2");
        assert!(json.get("error").is_none());
    }
}
