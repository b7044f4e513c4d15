//! Best-effort JSON extraction from free-form model output.

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// Parse `text` as JSON, or failing that, the first complete `{...}` value
/// embedded in it. A `[...]` is taken instead only when it encloses that
/// object (a bare proposal list) or when the text holds no object at all, so
/// prose such as `see [1]` does not shadow the payload.
///
/// Models wrap JSON in prose or markdown fences and sometimes emit trailing
/// content. Bracket balancing (outside strings) finds the end of the value;
/// `rfind('}')` would happily pick an inner brace.
pub fn parse_llm_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let object_start = trimmed.find('{');
    let array_start = trimmed.find('[');
    let start = match (object_start, array_start) {
        (Some(obj), Some(arr)) if arr < obj => {
            let encloses = balanced_end(&trimmed[arr..]).is_some_and(|end| arr + end > obj);
            if encloses {
                arr
            } else {
                obj
            }
        }
        (Some(obj), _) => obj,
        (None, Some(arr)) => arr,
        (None, None) => {
            return Err(anyhow!("model output contains no JSON (no '{{' or '[' found)"));
        }
    };
    let rest = &trimmed[start..];

    let Some(end) = balanced_end(rest) else {
        return Err(anyhow!("model output contains an unterminated JSON value"));
    };

    serde_json::from_str(&rest[..=end]).map_err(|e| anyhow!("model output is not valid JSON: {e}"))
}

/// Byte offset of the bracket closing the value that opens `s`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}
