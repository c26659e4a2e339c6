//! Completion marker scanning.
//!
//! The model signals that research is done by wrapping its summary in
//! `<research_complete>` tags.

/// Tag that opens the final summary.
pub const OPEN_TAG: &str = "<research_complete>";
/// Tag that closes the final summary.
pub const CLOSE_TAG: &str = "</research_complete>";

/// Extract the summary from text carrying a completion marker.
///
/// Returns `None` when the open tag is absent. When it is present the result
/// is the trimmed text between the open tag and the first close tag after
/// it, or everything after the open tag if no close tag follows.
pub fn extract_completion(text: &str) -> Option<String> {
    let start = text.find(OPEN_TAG)? + OPEN_TAG.len();
    let rest = &text[start..];
    let body = match rest.find(CLOSE_TAG) {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(body.trim().to_string())
}
