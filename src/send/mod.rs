pub mod archive;
pub mod file_stream;
pub mod handlers;

use axum::http::HeaderValue;
use std::fmt::Write;

/// `attachment` disposition carrying an ASCII fallback name and the exact
/// UTF-8 name for clients that understand `filename*`.
pub fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
