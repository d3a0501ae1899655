//! Payload validation by file signature.
//!
//! Providers lie: a 200 response for a "PDF" URL is frequently an HTML
//! error or paywall page. Validation happens on the buffered payload before
//! anything touches the artifact store, so an invalid payload can never be
//! written or reported as success.

/// Detected payload signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSignature {
    Pdf,
    Html,
    Gzip,
    Zip,
    Unknown,
}

/// Minimum plausible size for a real PDF; anything smaller is an error
/// page or a truncated transfer.
pub const MIN_PDF_SIZE: usize = 1024;

/// Sniff the leading bytes of a payload.
pub fn sniff(bytes: &[u8]) -> FileSignature {
    if bytes.starts_with(b"%PDF-") {
        return FileSignature::Pdf;
    }
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return FileSignature::Gzip;
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return FileSignature::Zip;
    }
    if looks_like_html(bytes) {
        return FileSignature::Html;
    }
    FileSignature::Unknown
}

/// HTML detection over the first 512 bytes, case-insensitive, tolerant of
/// leading whitespace and byte-order marks.
fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let lowered: Vec<u8> = head.iter().map(u8::to_ascii_lowercase).collect();
    let window = String::from_utf8_lossy(&lowered);
    let trimmed = window.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<!doctype")
        || trimmed.starts_with("<html")
        || window.contains("<html")
        || window.contains("<head")
}

/// Hex rendering of the first bytes, for the invalid-content log.
pub fn signature_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

/// Validate a payload that is expected to be a PDF.
///
/// Returns the offending description on failure; the caller wraps it into
/// the attempt log and the InvalidContent error.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < MIN_PDF_SIZE {
        return Err(format!(
            "payload too small to be a PDF ({} bytes)",
            bytes.len()
        ));
    }
    match sniff(bytes) {
        FileSignature::Pdf => Ok(()),
        FileSignature::Html => Err("HTML page masquerading as PDF".to_string()),
        other => Err(format!("unexpected payload signature: {other:?}")),
    }
}
