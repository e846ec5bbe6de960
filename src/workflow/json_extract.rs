//! Permissive extraction of a JSON object from free-form model output.
//!
//! Models wrap their structured replies in prose or markdown code fences
//! more often than not. Rather than demanding strict JSON-only output,
//! this strips common fences and then scans for the first balanced
//! `{...}` span, tolerating braces inside string literals.

pub fn extract_json_object(text: &str) -> Option<&str> {
    let stripped = strip_code_fences(text);
    let bytes = stripped.as_bytes();
    let start = stripped.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(&stripped[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start();
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest;
    }
    trimmed
}
