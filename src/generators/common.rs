//! Common utilities for document generation.
//!
//! Filename helpers, plus the engine's Spanish calendar helpers re-exported for
//! the document builders.

pub use crate::engine::calendar::{
    fold_accents, format_date, format_spanish_date, format_time, month_name, weekday_name,
};

/// Sanitize a string for use in filenames.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let mut result = String::new();
    let mut last_dash = false;

    for ch in fold_accents(name.trim()).chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch);
            last_dash = false;
        } else if (ch.is_whitespace() || matches!(ch, '-' | '_' | '.' | '/'))
            && !last_dash
            && !result.is_empty()
        {
            result.push('-');
            last_dash = true;
        }
    }

    let result = result.trim_matches('-');
    if result.is_empty() {
        return fallback.to_string();
    }
    result.to_string()
}

/// `<prefix>-<part>-<part>.<ext>`, skipping parts that sanitize to nothing.
pub fn document_filename(prefix: &str, parts: &[&str], extension: &str) -> String {
    let mut name = prefix.to_string();
    for part in parts {
        let clean = sanitize_filename(part, "");
        if !clean.is_empty() {
            name.push('-');
            name.push_str(&clean);
        }
    }
    format!("{}.{}", name, extension)
}
