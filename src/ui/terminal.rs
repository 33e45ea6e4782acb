//! Console output: startup banner, QR code and a live progress bar.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use qrcode::render::unicode;
use qrcode::QrCode;
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::common::AppConfig;
use crate::session::{Mode, Phase, Session, Snapshot};
use crate::utils::fs::{format_size, local_ips, target_size};

const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

pub fn generate_qr(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).context("Failed to generate QR code")?;

    Ok(code
        .render::<unicode::Dense1x2>()
        // colors are inverted for better visibility in terminal
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

/// Startup text: what is shared (or where uploads land) and how to reach it.
pub fn banner(mode: Mode, target: &Path, urls: &[String], auto_exit: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "shareport - {} mode", mode.as_str());

    match mode {
        Mode::Send => {
            let kind = if target.is_dir() { "directory" } else { "file" };
            let size = target_size(target)
                .map(format_size)
                .unwrap_or_else(|_| "unknown size".to_string());
            let _ = writeln!(out, "  Sharing {}: {} ({})", kind, target.display(), size);
        }
        Mode::Recv => {
            let _ = writeln!(out, "  Saving uploads to: {}", target.display());
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  Open in a browser:");
    for url in urls {
        let _ = writeln!(out, "    {}", url);
    }
    let _ = writeln!(out);

    if auto_exit {
        let _ = writeln!(out, "  Will exit once the transfer finishes");
    }
    let _ = write!(out, "  Press Ctrl+C to stop");
    out
}

/// Print the banner for a server listening on `port`, with a QR code for the
/// LAN address when enabled.
pub fn print_banner(session: &Session, port: u16, config: &AppConfig) {
    let urls: Vec<String> = local_ips()
        .into_iter()
        .map(|ip| format!("http://{}:{}", ip, port))
        .collect();

    println!(
        "{}",
        banner(session.mode(), session.target(), &urls, config.auto_exit)
    );

    if config.show_qr {
        if let Some(url) = urls.last() {
            match generate_qr(url) {
                Ok(qr) => println!("\n{}", qr),
                Err(err) => tracing::warn!(error = %err, "could not render QR code"),
            }
        }
    }
}

/// Console progress bar following the session status.
#[derive(Default)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
    attempt_started: Option<DateTime<Utc>>,
    last_message: Option<String>,
    hidden: bool,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress that tracks state without drawing anything.
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn update(&mut self, snap: &Snapshot) {
        match snap.phase {
            Phase::Waiting => {}
            Phase::Transferring => {
                if self.attempt_started != Some(snap.started_at) {
                    if let Some(old) = self.bar.take() {
                        old.finish_and_clear();
                    }
                    self.bar = Some(self.new_bar(snap));
                    self.attempt_started = Some(snap.started_at);
                }
                if let Some(bar) = &self.bar {
                    bar.set_length(snap.total_size.max(snap.transferred_bytes));
                    bar.set_position(snap.transferred_bytes);
                }
            }
            phase => {
                // Only the attempt we drew gets a closing line
                if self.attempt_started != Some(snap.started_at) {
                    return;
                }
                if let Some(bar) = self.bar.take() {
                    bar.set_position(snap.transferred_bytes);
                    let message = finish_message(phase, snap);
                    bar.finish_with_message(message.clone());
                    self.last_message = Some(message);
                }
            }
        }
    }

    fn new_bar(&self, snap: &Snapshot) -> ProgressBar {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(snap.total_size)
        };
        bar.set_length(snap.total_size);
        bar.set_style(bar_style());
        bar.set_message(match &snap.active_peer {
            Some(peer) => format!("{} ({})", snap.target_name, peer),
            None => snap.target_name.clone(),
        });
        bar
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn finish_message(phase: Phase, snap: &Snapshot) -> String {
    match phase {
        Phase::Completed => format!(
            "✓ Transfer complete: {} ({})",
            snap.target_name,
            format_size(snap.transferred_bytes)
        ),
        Phase::Cancelled => "✗ Transfer cancelled".to_string(),
        _ => format!(
            "✗ Transfer failed: {}",
            snap.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Redraw the progress bar on every status change, and periodically so the
/// rate estimate stays fresh.
pub fn spawn_progress(session: Session) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = session.subscribe();
        let mut ticker = tokio::time::interval(REDRAW_INTERVAL);
        let mut progress = TransferProgress::new();

        loop {
            tokio::select! {
                update = subscription.recv() => {
                    if update.is_none() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }
            progress.update(&session.snapshot());
        }
    })
}
