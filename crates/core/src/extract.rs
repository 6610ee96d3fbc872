//! Pulls the first well-formed JSON value out of free-form model output.
//!
//! Models wrap their JSON in prose or code fences often enough that parsing the
//! whole reply is not an option. We scan for a balanced bracket span (ignoring
//! brackets inside string literals), try to parse it, and move on to the next
//! opening bracket if it does not parse.

use serde_json::Value;

pub fn first_json_array(text: &str) -> Option<Value> {
    first_balanced(text, b'[', b']')
}

pub fn first_json_object(text: &str) -> Option<Value> {
    first_balanced(text, b'{', b'}')
}

fn first_balanced(text: &str, open: u8, close: u8) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(offset) = bytes[from..].iter().position(|&b| b == open) {
        let start = from + offset;
        if let Some(end) = matching_close(bytes, start, open, close) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(value);
            }
        }
        from = start + 1;
    }
    None
}

fn matching_close(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}
