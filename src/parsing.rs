//! Cleanup of raw model text.
//!
//! Reasoning models may prefix their answer with a `<think>` block, and chat
//! models like to wrap a whole markdown answer in a code fence. Stage outputs
//! are passed through [`extract_thinking`]; the finished article through
//! [`unwrap_markdown_fence`].

/// Extract a `<think>...</think>` block from a response (DeepSeek R1 style).
///
/// Returns `(thinking_content, cleaned_text)` where `cleaned_text` has the
/// thinking block removed and is trimmed. Text without a closed block is
/// returned unchanged.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let think_start = "<think>";
    let think_end = "</think>";

    if let Some(start_idx) = text.find(think_start) {
        if let Some(rel_end) = text[start_idx..].find(think_end) {
            let end_idx = start_idx + rel_end;
            let thinking = text[start_idx + think_start.len()..end_idx]
                .trim()
                .to_string();
            let mut cleaned = String::new();
            cleaned.push_str(&text[..start_idx]);
            cleaned.push_str(&text[end_idx + think_end.len()..]);
            let cleaned = cleaned.trim().to_string();
            let thinking = if thinking.is_empty() {
                None
            } else {
                Some(thinking)
            };
            return (thinking, cleaned);
        }
    }

    (None, text.to_string())
}

/// Remove a fence that wraps the entire text.
///
/// Recognizes `` ```markdown ``, `` ```md `` and plain `` ``` `` openers. Text
/// with fences only in the middle (code samples in the article) is returned
/// trimmed but otherwise unchanged, as is text whose first fence closes
/// before the end.
pub fn unwrap_markdown_fence(text: &str) -> String {
    let trimmed = text.trim();
    for marker in ["```markdown", "```md", "```"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            let Some(body_start) = rest.find('\n') else {
                continue;
            };
            // the opener line must carry nothing but the marker
            if !rest[..body_start].trim().is_empty() {
                continue;
            }
            if let Some(body) = rest[body_start + 1..].strip_suffix("```") {
                if body.lines().any(|line| line.trim() == "```") {
                    break;
                }
                return body.trim().to_string();
            }
        }
    }
    trimmed.to_string()
}
