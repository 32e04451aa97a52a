//! Tolerant parsing of raw generator text into a wire value.
//!
//! Generators wrap JSON in fences or tags, use Python literals, leave
//! trailing commas and stop mid-document. We undo the common cases and
//! otherwise report the first, unrepaired parse error.
use serde_json::Value;
use tracing::debug;

use crate::error::WireError;

const RESULT_OPEN: &str = "<RESULT>";
const RESULT_CLOSE: &str = "</RESULT>";

pub fn parse_wire(text: &str) -> Result<Value, WireError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    let body = unwrap_envelope(text);
    let original = match serde_json::from_str::<Value>(body) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if !looks_like_json(body) {
        debug!(len = body.len(), "taking non-JSON response as a bare string");
        return Ok(Value::String(body.to_string()));
    }

    let repaired = repair(body);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!(%original, "repaired malformed response");
            Ok(value)
        }
        // a quoted string with broken escapes: keep the text whole
        Err(_) if is_quoted(body) => Ok(Value::String(body.to_string())),
        Err(_) => Err(WireError::Malformed { source: original }),
    }
}

/// Strip surrounding whitespace, a `<RESULT>…</RESULT>` region and code fences.
pub fn unwrap_envelope(text: &str) -> &str {
    let mut body = text.trim();
    // markers inside a JSON document are string content, not an envelope
    if body.starts_with(['{', '[', '"']) {
        return body;
    }
    if let Some(start) = body.find(RESULT_OPEN) {
        let rest = &body[start + RESULT_OPEN.len()..];
        body = match rest.find(RESULT_CLOSE) {
            Some(end) => &rest[..end],
            None => rest,
        }
        .trim();
    }
    if body.starts_with(['{', '[', '"']) {
        return body;
    }
    if let Some(start) = body.find("```") {
        let fenced = &body[start + 3..];
        // drop the info string (`json`, `JSON`, ...) up to the first newline
        let fenced = match fenced.find('\n') {
            Some(nl) if fenced[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &fenced[nl + 1..],
            _ => fenced.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        body = match fenced.find("```") {
            Some(end) => &fenced[..end],
            None => fenced,
        }
        .trim();
    }
    body
}

fn is_quoted(body: &str) -> bool {
    body.len() >= 2 && body.starts_with('"') && body.ends_with('"')
}

fn looks_like_json(body: &str) -> bool {
    // brackets need not balance; truncated documents are repaired
    body.starts_with(['{', '['])
        || is_quoted(body)
        || matches!(body, "true" | "false" | "null" | "True" | "False" | "None")
        || body.parse::<f64>().is_ok()
}

// ————————————————————————————————————————————————————————————————————————————
// REPAIR PASS
// ————————————————————————————————————————————————————————————————————————————

/// Single quotes → double quotes, Python literals → JSON literals, trailing
/// commas dropped, unterminated strings and brackets closed.
fn repair(src: &str) -> String {
    let chars = src.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(src.len() + 8);
    let mut open = Vec::<char>::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            match c {
                '\\' if i + 1 < chars.len() => {
                    let next = chars[i + 1];
                    // `\'` is not a JSON escape
                    if next == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(next);
                    }
                    i += 2;
                    continue;
                }
                '"' if q == '\'' => out.push_str("\\\""),
                c if c == q => {
                    out.push('"');
                    quote = None;
                }
                c => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                out.push('"');
                quote = Some(c);
            }
            '{' => {
                open.push('}');
                out.push(c);
            }
            '[' => {
                open.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if open.last() == Some(&c) {
                    open.pop();
                }
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, None | Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word = chars[start..i].iter().collect::<String>();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            c => out.push(c),
        }
        i += 1;
    }

    if quote.is_some() {
        out.push('"');
    }
    let trimmed = out.trim_end().trim_end_matches(',').len();
    out.truncate(trimmed);
    while let Some(close) = open.pop() {
        out.push(close);
    }
    out
}
