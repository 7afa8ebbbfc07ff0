//! Reversible mapping between portal labels and file-system names.
//!
//! Labels keep their letters, including non-Latin scripts, so folders stay
//! readable. Only characters a file name cannot carry are written as `%XX`
//! escapes of their UTF-8 bytes: `%` itself, path separators and other
//! reserved punctuation, control characters, whitespace at either end, and
//! the dots of an all-dot label. Because `%` is always escaped, distinct
//! labels never share a name.

use std::fmt::Write;

fn is_forbidden(c: char) -> bool {
    matches!(c, '%' | '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

fn push_escaped(stem: &mut String, c: char) {
    let mut utf8 = [0u8; 4];
    let encoded = urlencoding::encode(c.encode_utf8(&mut utf8));
    if encoded.starts_with('%') {
        stem.push_str(&encoded);
    } else {
        // unreserved ASCII, i.e. a dot
        let _ = write!(stem, "%{:02X}", u32::from(c));
    }
}

/// File-system name for a portal label.
#[must_use]
pub fn file_stem(label: &str) -> String {
    let body_start = label.len() - label.trim_start().len();
    let body_end = label.trim_end().len();
    let all_dots = !label.is_empty() && label.chars().all(|c| c == '.');

    let mut stem = String::with_capacity(label.len());
    for (at, c) in label.char_indices() {
        let at_edge = at < body_start || at >= body_end;
        if at_edge || all_dots || is_forbidden(c) {
            push_escaped(&mut stem, c);
        } else {
            stem.push(c);
        }
    }
    stem
}

/// Portal label a file-system name was made from.
///
/// Malformed escapes are kept literally.
#[must_use]
pub fn label_of(stem: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(stem.as_bytes())).into_owned()
}
