//! Best-effort structured extraction from unreliable model output.
//!
//! An ordered list of parser strategies is tried in sequence; each returns
//! success or failure rather than raising, so the chain reads as data instead
//! of nested error handling.

use serde_json::Value;

type Strategy = fn(&str) -> Option<Value>;

/// Strategies in priority order: balanced brace span, lenient repair of that
/// span, strict parse after stripping code fences.
const STRATEGIES: &[Strategy] = &[balanced_span, repaired_span, strict_unfenced];

/// Run the full parse chain over a raw response body.
pub fn parse_structured(raw: &str) -> Option<Value> {
    STRATEGIES.iter().find_map(|strategy| strategy(raw))
}

fn balanced_span(raw: &str) -> Option<Value> {
    serde_json::from_str(extract_balanced(raw)?).ok()
}

fn repaired_span(raw: &str) -> Option<Value> {
    serde_json::from_str(&lenient_repair(extract_balanced(raw)?)).ok()
}

fn strict_unfenced(raw: &str) -> Option<Value> {
    serde_json::from_str(strip_code_fences(raw)).ok()
}

/// Extract the first balanced brace-delimited span, respecting string
/// literals and escapes.
pub fn extract_balanced(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fault-tolerant cleanup of a near-JSON span: straighten smart quotes, drop
/// line comments, drop trailing commas. Intentionally conservative: anything
/// it can't fix falls through to the next strategy.
pub fn lenient_repair(span: &str) -> String {
    let straightened: String = span
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            c => c,
        })
        .collect();

    let uncommented = strip_line_comments(&straightened);
    strip_trailing_commas(&uncommented)
}

fn strip_line_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = s.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Strip markdown code-fence markers from a response.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}
