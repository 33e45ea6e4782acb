use anyhow::{Context, Result};
use std::net::UdpSocket;
use std::path::Path;
use walkdir::WalkDir;

/// Sum of regular file sizes under `path` (recursive). Fails on the first
/// unreadable entry.
pub fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() {
            let metadata = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Size of a file, or of a directory's contents.
pub fn target_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if metadata.is_dir() {
        dir_size(path)
    } else {
        Ok(metadata.len())
    }
}

/// Human-readable size: "512 B", "1.50 KB", "2.00 MB", "1.00 GB".
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    match size {
        s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{} B", s),
    }
}

/// Loopback first, then the LAN address if one can be determined.
pub fn local_ips() -> Vec<String> {
    let mut ips = vec!["127.0.0.1".to_string()];
    if let Ok(ip) = get_local_ip() {
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

/// Best-effort local non-loopback IP discovery. No packets are sent;
/// connecting a UDP socket only selects the outbound interface.
pub fn get_local_ip() -> Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind socket for IP detection")?;

    socket
        .connect("8.8.8.8:80")
        .context("Failed to connect socket for IP detection")?;

    let local_addr = socket.local_addr().context("Failed to get local address")?;

    Ok(local_addr.ip().to_string())
}
