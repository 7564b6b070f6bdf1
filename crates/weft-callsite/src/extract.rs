//! Extraction of operator and call-site segments from pre-rendered stack
//! text.
//!
//! This is the compatibility path: it produces the same result as a live
//! capture walk, but from a newline-separated stack string (each line
//! optionally padded with whitespace or tabs). Used when no capture backend
//! is available or when the caller already holds rendered text.

use crate::config::{CALL_SITE_GLUE, NO_ASSEMBLY_INFORMATION};
use crate::line_view::trimmed_nonempty_lines;

/// Extracts zero, one, or two label segments from `source`.
///
/// The top of the stack is inspected for weft API references and the deepest
/// one is kept, since consecutive API references denote operator aliases.
/// The next line is considered user code and becomes the second segment with
/// an `"at "` marker. When no user code follows the API lines, the deepest
/// API line alone is returned, prefix-stripped; when the first line is
/// already user code, it is returned verbatim as the only segment.
pub fn extract_parts(source: &str) -> Vec<String> {
    let mut lines = trimmed_nonempty_lines(source);

    let Some(first) = lines.next() else {
        return Vec::new();
    };

    if first.is_user_code() {
        // No line is a weft API line.
        return vec![first.to_text()];
    }

    let mut previous = first;
    for line in lines {
        if line.is_user_code() {
            // Current line is user code, the previous one is the API
            // boundary.
            let api = previous.without_location_suffix().without_internal_prefix();
            return vec![api.to_text(), format!("at {}", line.as_str())];
        }
        previous = line;
    }

    // Every line was a weft API line; fully display the deepest one.
    vec![previous.without_internal_prefix().to_text()]
}

/// Joins the extracted segments into the final label; an empty extraction
/// renders the no-information label.
pub fn extract_label(source: &str) -> String {
    let parts = extract_parts(source);
    if parts.is_empty() {
        NO_ASSEMBLY_INFORMATION.to_string()
    } else {
        parts.join(CALL_SITE_GLUE)
    }
}
