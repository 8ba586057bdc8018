//! Text cleanup shared by sheet lookups, asset names and attachment filenames.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// NFC-normalize, collapse whitespace runs to one space and trim.
/// Used as the matching key between asset names and attachment filenames.
pub fn normalize_key(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let composed: String = raw.nfc().collect();
    whitespace_re()
        .replace_all(&composed, " ")
        .trim()
        .to_string()
}

/// Undo UTF-8 text that was decoded as Latin-1 during upload
/// (e.g. "Ø¯ Ù Øµ 1220.pdf" -> "د م ص 1220.pdf").
///
/// Returns the input unchanged when it cannot be mojibake: a char above U+00FF
/// means it was never squeezed through a single-byte mapping, and bytes that
/// are not valid UTF-8 mean there is nothing to recover.
pub fn repair_misdecoded_text(raw: &str) -> String {
    if raw.is_ascii() {
        return raw.to_string();
    }
    let mut bytes = Vec::with_capacity(raw.len());
    for c in raw.chars() {
        let code = c as u32;
        if code > 0xFF {
            return raw.to_string();
        }
        bytes.push(code as u8);
    }
    match String::from_utf8(bytes) {
        Ok(repaired) => repaired,
        Err(_) => raw.to_string(),
    }
}

/// Map Arabic-Indic (U+0660..U+0669) and extended Persian (U+06F0..U+06F9) digits to ASCII.
pub fn convert_arabic_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

/// Canonical form for tolerant header lookup: "Valued At", " valued_at\n" -> "valued_at".
pub(crate) fn header_key(raw: &str) -> String {
    whitespace_re()
        .replace_all(raw.trim(), "_")
        .to_lowercase()
}
