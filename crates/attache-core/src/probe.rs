//! Content hashing and probing.
//!
//! Everything here is a function of the file bytes alone: the content hash,
//! the sniffed MIME type, the coarse media type derived from it, and the
//! declared or encoded media dimensions.
//!
//! MIME detection layers:
//! 1. SVG markup (magic-byte matchers only see generic XML)
//! 2. Magic bytes via `infer`
//! 3. XML prolog, JSON, then UTF-8 text
//! 4. `application/octet-stream`

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::defaults::{
    HASH_BUFFER_LEN, IMAGE_HEADER_LEN, MIME_EMPTY, MIME_OCTET_STREAM, SNIFF_LEN,
};
use crate::error::Result;
use crate::models::MediaType;

/// `application/*` subtype tokens classified as documents.
const DOCUMENT_TOKENS: &[&str] = &[
    "pdf",
    "officedocument",
    "opendocument",
    "word",
    "powerpoint",
    "excel",
    "xml",
    "rtf",
];

/// `application/*` subtype tokens classified as archives.
const ARCHIVE_TOKENS: &[&str] = &["zip", "rar", "tar", "compressed"];

static SVG_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<svg\b([^>]*)>").unwrap());

static SVG_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)width\s*=\s*["']?\s*([0-9]*)"#).unwrap());

static SVG_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)height\s*=\s*["']?\s*([0-9]*)"#).unwrap());

/// Probe result for a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub mime_type: String,
    pub media_type: MediaType,
    pub byte_size: i64,
    pub width: i32,
    pub height: i32,
}

/// Compute the BLAKE3 content hash of in-memory data.
///
/// Returns 64 lowercase hex characters with no prefix, so the leading
/// characters can shard storage directories directly.
pub fn compute_content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Compute the BLAKE3 content hash of a file, streaming its contents.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_BUFFER_LEN];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Probe a file: MIME type, media type, size, and dimensions.
///
/// Fails with `Error::Io` when the path cannot be read.
pub async fn probe_file(path: &Path) -> Result<Probe> {
    let metadata = tokio::fs::metadata(path).await?;
    let mime_type = detect_mime(path).await?;
    let media_type = classify_media_type(&mime_type);
    let (width, height) = probe_dimensions(path, media_type).await?;

    debug!(
        subsystem = "storage",
        component = "probe",
        path = %path.display(),
        mime = %mime_type,
        media_type = %media_type,
        width,
        height,
        "probe: complete"
    );

    Ok(Probe {
        mime_type,
        media_type,
        byte_size: metadata.len() as i64,
        width,
        height,
    })
}

/// Sniff the MIME type of a file from its leading bytes.
pub async fn detect_mime(path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    let complete = head.len() < SNIFF_LEN;
    Ok(sniff_mime(&head, complete))
}

/// Sniff a MIME type from the head of a file.
///
/// `complete` tells whether `head` holds the entire file, which is required
/// before trusting a JSON parse.
pub fn sniff_mime(head: &[u8], complete: bool) -> String {
    if head.is_empty() {
        return MIME_EMPTY.to_string();
    }

    let text = text_prefix(head, complete);
    let trimmed = text.map(|t| t.trim_start_matches('\u{feff}').trim_start());

    // SVG first: magic-byte matchers would report it as generic XML.
    if trimmed.is_some_and(looks_like_svg) {
        return "image/svg+xml".to_string();
    }

    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    let Some(trimmed) = trimmed.filter(|t| !t.contains('\0')) else {
        return MIME_OCTET_STREAM.to_string();
    };
    if trimmed.starts_with("<?xml") {
        return "text/xml".to_string();
    }
    if complete
        && (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return "application/json".to_string();
    }

    "text/plain".to_string()
}

/// The head as UTF-8, tolerating a character cut off by truncation.
fn text_prefix(head: &[u8], complete: bool) -> Option<&str> {
    match std::str::from_utf8(head) {
        Ok(text) => Some(text),
        Err(e) if !complete && e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).ok()
        }
        Err(_) => None,
    }
}

fn looks_like_svg(text: &str) -> bool {
    if text.starts_with("<svg") {
        return true;
    }
    let prolog =
        text.starts_with("<?xml") || text.starts_with("<!DOCTYPE") || text.starts_with("<!--");
    prolog && SVG_ROOT.is_match(text)
}

/// Classify a MIME type into a coarse media type.
pub fn classify_media_type(mime: &str) -> MediaType {
    let Some((kind, detail)) = mime.split_once('/') else {
        return MediaType::File;
    };
    let detail = detail.to_lowercase();

    match kind.to_lowercase().as_str() {
        "image" => match (detail.find("icon"), detail.find("svg")) {
            (Some(icon), Some(svg)) if svg < icon => MediaType::Svg,
            (Some(_), _) => MediaType::Icon,
            (None, Some(_)) => MediaType::Svg,
            (None, None) => MediaType::Image,
        },
        "application" => {
            if DOCUMENT_TOKENS.iter().any(|t| detail.contains(t)) {
                MediaType::Document
            } else if ARCHIVE_TOKENS.iter().any(|t| detail.contains(t)) {
                MediaType::Archive
            } else if detail.contains("json") {
                MediaType::Text
            } else {
                MediaType::File
            }
        }
        "video" => MediaType::Video,
        "audio" => MediaType::Audio,
        "text" => MediaType::Text,
        _ => MediaType::File,
    }
}

/// Media dimensions for a file of the given media type; `(0, 0)` when the
/// type has none or the header cannot be decoded.
pub async fn probe_dimensions(path: &Path, media_type: MediaType) -> Result<(i32, i32)> {
    match media_type {
        MediaType::Svg => {
            let bytes = tokio::fs::read(path).await?;
            Ok(parse_svg_dimensions(&String::from_utf8_lossy(&bytes)))
        }
        MediaType::Image | MediaType::Icon => {
            let file = tokio::fs::File::open(path).await?;
            let mut head = Vec::with_capacity(IMAGE_HEADER_LEN);
            file.take(IMAGE_HEADER_LEN as u64)
                .read_to_end(&mut head)
                .await?;
            match image_header_dimensions(&head) {
                Some((width, height)) => Ok((clamp_dimension(width), clamp_dimension(height))),
                None => {
                    debug!(path = %path.display(), "probe: unreadable image header");
                    Ok((0, 0))
                }
            }
        }
        _ => Ok((0, 0)),
    }
}

fn clamp_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn be16(data: &[u8], at: usize) -> u32 {
    u16::from_be_bytes([data[at], data[at + 1]]) as u32
}

fn le16(data: &[u8], at: usize) -> u32 {
    u16::from_le_bytes([data[at], data[at + 1]]) as u32
}

fn le24(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], 0])
}

/// Width and height from the header of a PNG, GIF, BMP, ICO, WebP, or JPEG
/// image. `None` when the format is unknown or the header is truncated.
pub fn image_header_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    // PNG: IHDR is the first chunk, width at 16..20, height at 20..24
    if data.len() >= 24 && data.starts_with(b"\x89PNG\r\n\x1a\n") {
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Some((width, height));
    }

    // GIF: logical screen size at 6..10
    if data.len() >= 10 && data.starts_with(b"GIF8") {
        return Some((le16(data, 6), le16(data, 8)));
    }

    // BMP: BITMAPINFOHEADER width/height at 18..26; negative height is top-down
    if data.len() >= 26 && data.starts_with(b"BM") {
        let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
        let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        return Some((width.unsigned_abs(), height.unsigned_abs()));
    }

    // ICO: first directory entry; 0 means 256
    if data.len() >= 8 && data.starts_with(&[0, 0, 1, 0]) {
        let side = |b: u8| if b == 0 { 256 } else { b as u32 };
        return Some((side(data[6]), side(data[7])));
    }

    if data.len() >= 30 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return match &data[12..16] {
            b"VP8 " => Some((le16(data, 26) & 0x3FFF, le16(data, 28) & 0x3FFF)),
            b"VP8L" => {
                let bits = u32::from_le_bytes([data[21], data[22], data[23], data[24]]);
                Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
            }
            b"VP8X" => Some((le24(data, 24) + 1, le24(data, 27) + 1)),
            _ => None,
        };
    }

    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(data);
    }

    None
}

/// Walk JPEG segments up to the first start-of-frame marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            // Fill byte
            0xFF => i += 1,
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD9 => i += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if i + 8 >= data.len() {
                    return None;
                }
                return Some((be16(data, i + 7), be16(data, i + 5)));
            }
            _ => i += 2 + be16(data, i + 2) as usize,
        }
    }
    None
}

/// Declared `width`/`height` of the root `<svg>` element.
///
/// Values keep only their leading digits (`"120px"` is 120, `"auto"` is 0).
pub fn parse_svg_dimensions(markup: &str) -> (i32, i32) {
    let Some(root) = SVG_ROOT.captures(markup) else {
        return (0, 0);
    };
    let attributes = root.get(1).map(|m| m.as_str()).unwrap_or_default();
    let read = |re: &Regex| {
        re.captures(attributes)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(0)
    };
    (read(&SVG_WIDTH), read(&SVG_HEIGHT))
}

/// Lowercased extension of a file name, with common aliases folded.
pub fn normalize_extension(name: &str) -> String {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match extension.as_str() {
        "jpeg" => "jpg".to_string(),
        "htm" => "html".to_string(),
        _ => extension,
    }
}
