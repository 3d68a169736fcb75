use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    // A language tag only counts as one when the line ends after it
    Regex::new(r"(?s)```(?:\w+[ \t]*\r?\n)?\s*(.*?)\s*```").expect("fence pattern is a valid regex")
});

/// Strips Markdown code fences (with or without a language tag) from a
/// model reply, keeping their contents in place.
///
/// Unfenced text passes through trimmed. Text with no complete fence pair
/// is returned as-is, so a reply the model failed to wrap still reaches the
/// executor, which reports it as an `ExecutionError` if it is not SQL.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    FENCED_BLOCK.replace_all(trimmed, "$1").trim().to_string()
}
