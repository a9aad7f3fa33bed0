//! Text decoding, reference normalisation and media-type helpers.

use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left as-is when canonicalising a file name for comparison
/// (the `application/x-www-form-urlencoded` unreserved set).
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode a document using the encoding named by its XML declaration as hint.
pub fn decode_document(bytes: &[u8]) -> String {
    decode_text(bytes, extract_xml_encoding(bytes)).into_owned()
}

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

// ============================================================================
// Reference Normalisation
// ============================================================================

/// Last path segment of an archive entry name or href.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of a file name, without the dot.
pub fn file_extension(name: &str) -> Option<&str> {
    let name = file_name(name);
    name.rfind('.').map(|i| &name[i + 1..]).filter(|ext| !ext.is_empty())
}

/// Percent-decode a reference.
///
/// Undecodable input is logged and returned unchanged.
pub fn decode_ref(reference: &str) -> Cow<'_, str> {
    match percent_decode_str(reference).decode_utf8() {
        Ok(decoded) => decoded,
        Err(e) => {
            log::warn!("Could not decode reference {reference:?}: {e}; using it as-is");
            Cow::Borrowed(reference)
        }
    }
}

/// Canonical percent-encoded form of a file name, used for comparisons.
///
/// Already-encoded input is decoded first so `a%20b.xhtml` and `a b.xhtml`
/// compare equal.
pub fn canonical_name(name: &str) -> String {
    utf8_percent_encode(&decode_ref(name), NAME_ENCODE_SET).to_string()
}

/// Split an href into its path and optional fragment.
///
/// Both the literal `#` and its encoded form `%23` are accepted as the
/// fragment marker.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    if let Some(i) = href.find('#') {
        return (&href[..i], Some(&href[i + 1..]));
    }
    let lower = href.to_ascii_lowercase();
    if let Some(i) = lower.find("%23") {
        return (&href[..i], Some(&href[i + 3..]));
    }
    (href, None)
}

/// Join a base directory (may be empty) and a relative href.
pub fn resolve_path(base: &str, href: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut parts: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').collect()
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    parts.join("/")
}

/// Directory part of an archive entry name (empty for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

// ============================================================================
// Media Types
// ============================================================================

/// Guess a MIME type from a file name, falling back to magic bytes.
pub fn guess_media_type(path: &str, data: &[u8]) -> Option<&'static str> {
    let ext = file_extension(path).map(|e| e.to_ascii_lowercase());

    let by_ext = match ext.as_deref() {
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        Some("gif") => Some("image/gif"),
        Some("svg") => Some("image/svg+xml"),
        Some("webp") => Some("image/webp"),
        Some("css") => Some("text/css"),
        Some("xhtml" | "xht") => Some("application/xhtml+xml"),
        Some("html" | "htm") => Some("text/html"),
        _ => None,
    };
    if by_ext.is_some() {
        return by_ext;
    }

    if data.len() >= 4 {
        if data[0] == 0xFF && data[1] == 0xD8 {
            return Some("image/jpeg");
        }
        if data[..4] == [0x89, 0x50, 0x4E, 0x47] {
            return Some("image/png");
        }
        if data[..3] == [0x47, 0x49, 0x46] {
            return Some("image/gif");
        }
    }

    None
}
