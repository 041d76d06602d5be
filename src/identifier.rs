//! Pairing code extraction
//!
//! Original and printer files share a short code at the start of their file
//! names (e.g. `ABC12345_v1.pdf` / `ABC12345_v2.pdf`).

use std::path::Path;

/// Number of leading characters that form a pairing code
pub const CODE_LENGTH: usize = 8;

/// Extract the pairing code from a file name or path.
///
/// Returns the first [`CODE_LENGTH`] characters of the base name, extension
/// included, or the whole base name when it is shorter. Case and whitespace
/// are kept as-is.
pub fn extract_code(file_name: &str) -> String {
    let base = base_name(file_name);
    base.chars().take(CODE_LENGTH).collect()
}

/// Same as [`extract_code`], for a path.
pub fn extract_code_from_path(path: &Path) -> String {
    extract_code(&path.to_string_lossy())
}

fn base_name(file_name: &str) -> &str {
    // Accept both separators so codes are stable across platforms
    file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
}
