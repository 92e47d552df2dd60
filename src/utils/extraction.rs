//! Extraction utilities for parsing LLM responses.
//!
//! LLM replies arrive as free text that may wrap the payload in markdown
//! fences or surround it with commentary. These helpers pull out labeled
//! fenced sections (for code synthesis) and bare JSON objects (for spec
//! synthesis) without assuming the model followed the format exactly.

use regex::Regex;

/// Extract the body of a fenced code block labeled `label`.
///
/// Matches ```` ```<label> ... ``` ```` where the label must be followed by a
/// newline, so that `python` does not swallow a `python test` block. Returns
/// an empty string when no such block exists; absent sections are handled by
/// the caller, not here.
pub fn extract_fenced_block(response: &str, label: &str) -> String {
    let pattern = format!(r"(?s)```{}[ \t]*\r?\n(.*?)```", regex::escape(label));
    let re = Regex::new(&pattern).expect("static fence pattern is valid");
    re.captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Extract the first complete JSON object from a response.
///
/// Strategies, in order: the content itself if it starts with `{`, a fenced
/// ```` ```json ```` block, then brace matching from the first `{` (string
/// literals and escapes respected). Returns `None` if no balanced object is
/// found.
pub fn extract_json_object(response: &str) -> Option<String> {
    let trimmed = response.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let fenced = extract_fenced_block(response, "json");
    if fenced.starts_with('{') {
        return Some(fenced);
    }

    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate a string to at most `max` bytes on a char boundary, appending
/// `...` when anything was cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
