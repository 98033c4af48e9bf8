//! Input validation and sanitization.

/// Maximum title length.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

/// Maximum length of a stored upload file name, extension included.
const MAX_FILENAME_LENGTH: usize = 100;

/// Trim and cap a user-provided text field, dropping control characters
/// other than newlines and tabs.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let kept: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let capped: String = kept.trim().chars().take(max_len).collect();
    capped.trim_end().to_string()
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Directory parts and leading dots are dropped.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "upload".to_string();
    }

    // Keep the extension when truncating
    if cleaned.len() > MAX_FILENAME_LENGTH {
        if let Some((stem, ext)) = cleaned.rsplit_once('.') {
            if ext.len() < 10 {
                let keep = MAX_FILENAME_LENGTH.saturating_sub(ext.len() + 1);
                return format!("{}.{}", &stem[..keep.min(stem.len())], ext);
            }
        }
        return cleaned[..MAX_FILENAME_LENGTH].to_string();
    }
    cleaned.to_string()
}

/// Validate video ID format.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_video_id(id: &str) -> bool {
    if id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
