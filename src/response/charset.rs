//! Charset-decoding chain for the Response Assembler (spec §4.D).
//!
//! Preference order: HTML `<meta charset>` / `meta[http-equiv=Content-Type]`
//! → `Content-Type` header charset → UTF-8 → unknown (empty text).

use encoding_rs::Encoding;

/// Find `<meta charset="...">` or `<meta http-equiv="Content-Type" content="...; charset=...">`
/// in the first chunk of an HTML document. Case-insensitive, tolerant of
/// whitespace; scans only the first 2048 bytes the way browsers sniff.
pub fn sniff_html_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(2048)];
    let text = String::from_utf8_lossy(head);
    let lower = text.to_ascii_lowercase();

    if let Some(pos) = lower.find("charset=") {
        // Could be `<meta charset="x">` or inside a content= attribute; either
        // way grab the token right after `charset=`.
        let rest = &text[pos + "charset=".len()..];
        let rest = rest.trim_start_matches(['"', '\'']);
        let end = rest
            .find(|c: char| c == '"' || c == '\'' || c == ';' || c == '>' || c.is_whitespace())
            .unwrap_or(rest.len());
        let candidate = rest[..end].trim();
        if !candidate.is_empty() {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Parse the `charset=` parameter out of a `Content-Type` header value.
pub fn content_type_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let pos = lower.find("charset=")?;
    let rest = &content_type[pos + "charset=".len()..];
    let rest = rest.trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| c == '"' || c == '\'' || c == ';' || c.is_whitespace())
        .unwrap_or(rest.len());
    let candidate = rest[..end].trim();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

/// Decode `bytes` using the declared-encoding chain. Returns `(text, encoding_label)`.
/// When every candidate fails, returns `("", "unknown")` — the raw buffer
/// remains available on the `Response` for callers that need it.
pub fn decode_with_chain(bytes: &[u8], content_type: Option<&str>) -> (String, String) {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(meta_charset) = sniff_html_meta_charset(bytes) {
        candidates.push(meta_charset);
    }
    if let Some(ct) = content_type {
        if let Some(cs) = content_type_charset(ct) {
            candidates.push(cs);
        }
    }
    candidates.push("utf-8".to_string());

    for label in &candidates {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            let (text, _, had_errors) = encoding.decode(bytes);
            if !had_errors || label.eq_ignore_ascii_case("utf-8") {
                return (text.into_owned(), label.to_ascii_lowercase());
            }
        }
    }

    (String::new(), "unknown".to_string())
}
