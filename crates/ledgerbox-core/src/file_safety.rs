//! Filename sanitization and content-type verification for stored
//! attachments.
//!
//! Storage paths embed the sanitized filename, so the character policy here
//! is strict: directory components are stripped and everything outside
//! `[A-Za-z0-9._-]` is replaced. Claimed MIME types from providers are
//! cross-checked against magic bytes before classification.

use crate::defaults::FILENAME_MAX_LENGTH;

/// Sanitize a filename for safe storage path embedding.
///
/// Strips directory components (both separators), maps every character
/// outside `[A-Za-z0-9._-]` to `_`, collapses leading dots so `..` can never
/// survive, bounds the length, and falls back to a placeholder for empty
/// input. Idempotent: sanitizing twice yields the same result.
pub fn sanitize_filename(filename: &str) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let mut sanitized: String = name
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    // A name of only dots/underscores carries no information and a leading
    // dot run would allow "..".
    while sanitized.starts_with('.') {
        sanitized.remove(0);
    }
    if sanitized.chars().all(|c| c == '_' || c == '.') {
        sanitized.clear();
    }

    if sanitized.is_empty() {
        return "unnamed_file".to_string();
    }

    // Truncate if too long (preserve extension)
    if sanitized.len() > FILENAME_MAX_LENGTH {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let ext = &sanitized[dot_pos..];
            if ext.len() < FILENAME_MAX_LENGTH {
                let name = &sanitized[..FILENAME_MAX_LENGTH - ext.len()];
                return format!("{}{}", name, ext);
            }
        }
        return sanitized[..FILENAME_MAX_LENGTH].to_string();
    }

    sanitized
}

/// Extract a lowercase extension from a filename, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

/// Detect the actual content type from magic bytes, falling back to the
/// claimed type when the format has no signature.
///
/// Providers occasionally mislabel attachments (a PDF claimed as
/// octet-stream); classification keys off the MIME type, so the corrected
/// value is what gets persisted.
pub fn detect_content_type(data: &[u8], claimed: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    claimed.to_string()
}
