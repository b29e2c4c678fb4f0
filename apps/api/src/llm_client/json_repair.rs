//! Heuristics that turn "almost JSON" model output into parseable JSON.
//!
//! Local models routinely wrap answers in markdown fences, prepend prose,
//! leave trailing commas, or stop mid-object. `clean_json_response` undoes
//! the common cases; anything it cannot fix still fails `serde_json` and the
//! caller falls back to a canned payload.

/// Strips fences and prose around the JSON payload, then repairs it.
pub fn clean_json_response(text: &str) -> String {
    let mut cleaned = strip_code_fences(text.trim()).trim().to_string();

    if !cleaned.starts_with('{') && !cleaned.starts_with('[') {
        if let Some(extracted) = extract_json_span(&cleaned) {
            cleaned = extracted.to_string();
        }
    }

    repair_json(&cleaned)
}

/// Returns the contents of the first ```json (or bare ```) block, if any.
fn strip_code_fences(text: &str) -> &str {
    let (start, fence_len) = match text.find("```json") {
        Some(i) => (i, "```json".len()),
        None => match text.find("```") {
            Some(i) => (i, "```".len()),
            None => return text,
        },
    };
    let body = &text[start + fence_len..];
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Slice from the first `{`/`[` to the last `}`/`]`.
fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find(&['{', '['][..])?;
    match text.rfind(&['}', ']'][..]) {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Single pass over the text, tracking string state:
/// drops trailing commas, inserts missing commas between adjacent
/// containers, replaces raw control characters inside strings, and closes
/// any string or container left open at the end.
fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                c if c.is_control() => out.push(' '),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' | '[' => {
                if matches!(last_significant(&out), Some('}') | Some(']')) {
                    out.push(',');
                }
                stack.push(c);
                out.push(c);
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                stack.pop();
                out.push(c);
            }
            '\n' | '\r' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(open) = stack.pop() {
        drop_trailing_comma(&mut out);
        out.push(if open == '{' { '}' } else { ']' });
    }

    out
}

fn last_significant(out: &str) -> Option<char> {
    out.trim_end().chars().last()
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}
