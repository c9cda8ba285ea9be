//! Best-effort repair of almost-JSON text, as produced by chat models
//!
//! Each step is tried in order and the first text `serde_json` accepts wins.

use serde_json::Value;
use tracing::debug;

use crate::error::ImportError;

/// Parse `text` as JSON, repairing it on the way if needed
pub fn repair_json(text: &str) -> Result<Value, ImportError> {
    let mut last_error = String::from("empty input");

    let mut attempt = |candidate: &str, step: &str| -> Option<Value> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                debug!("JSON accepted after step: {}", step);
                Some(value)
            }
            Err(e) => {
                last_error = e.to_string();
                None
            }
        }
    };

    if let Some(v) = attempt(text, "as is") {
        return Ok(v);
    }

    let unfenced = normalize_quotes(&strip_code_fences(text));
    if let Some(v) = attempt(&unfenced, "fences and quotes") {
        return Ok(v);
    }

    let cleaned = remove_trailing_commas(&strip_line_comments(&unfenced));
    if let Some(v) = attempt(&cleaned, "trailing commas") {
        return Ok(v);
    }

    if let Some(span) = extract_json_span(&cleaned)
        && let Some(v) = attempt(span, "substring extraction")
    {
        return Ok(v);
    }

    if let Some(start) = cleaned.find(['{', '[']) {
        for candidate in complete_brackets(&cleaned[start..]) {
            if let Some(v) = attempt(&remove_trailing_commas(&candidate), "bracket completion") {
                return Ok(v);
            }
        }
    }

    Err(ImportError::Parse(last_error))
}

/// Content of the first ``` fenced block. An unterminated fence (truncated
/// output) yields everything after the opening line.
pub fn strip_code_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.to_string();
    };
    let after_open = &text[open + 3..];
    // Skip the info string (```json)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].to_string(),
        None => body.to_string(),
    }
}

/// Typographic quotes and odd spaces to their ASCII form
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            _ => c,
        })
        .filter(|c| *c != '\u{FEFF}')
        .collect()
}

/// Drop `,` directly before a closing bracket, outside of strings
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Remove `// ...` comments that sit outside strings
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '/' && chars.peek() == Some(&'/') {
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

/// From the first `{`/`[` to the last matching closer, dropping prose around it
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Candidates for truncated JSON: first close everything that is open, then
/// fall back to cutting at the last complete value.
pub fn complete_brackets(text: &str) -> Vec<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    // (byte offset to cut at, open containers at that point)
    let mut safe_cut: Option<(usize, Vec<char>)> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                stack.push('}');
                safe_cut = Some((i + 1, stack.clone()));
            }
            '[' => {
                stack.push(']');
                safe_cut = Some((i + 1, stack.clone()));
            }
            '}' | ']' => {
                stack.pop();
                safe_cut = Some((i + 1, stack.clone()));
            }
            ',' => safe_cut = Some((i, stack.clone())),
            _ => {}
        }
    }

    let close = |mut s: String, open: &[char]| -> String {
        s.extend(open.iter().rev());
        s
    };

    let mut candidates = Vec::new();

    let mut naive = text.to_string();
    if in_string {
        if escape {
            naive.pop();
        }
        naive.push('"');
    }
    let mut naive = naive.trim_end().to_string();
    while naive.ends_with(',') {
        naive.pop();
        naive = naive.trim_end().to_string();
    }
    if naive.ends_with(':') {
        naive.push_str(" null");
    }
    candidates.push(close(naive, &stack));

    if let Some((offset, open)) = safe_cut {
        let mut cut = text[..offset].trim_end().to_string();
        while cut.ends_with(',') {
            cut.pop();
        }
        candidates.push(close(cut, &open));
    }

    candidates
}
