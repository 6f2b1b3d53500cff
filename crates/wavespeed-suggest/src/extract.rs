//! Best-effort JSON recovery from free text. Only used after a strict decode
//! of the whole reply has failed.

/// Byte index of the bracket closing the one at `start`, skipping brackets
/// inside string literals. `None` if the span never closes or is mismatched.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced `{...}` / `[...]` spans in the order they appear. Once a span is
/// taken, scanning resumes after it, so nested spans of a closed block are not
/// repeated. An unclosed block (truncated reply) is skipped over, which lets
/// the complete objects inside it surface on their own.
pub fn balanced_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'{' | b'[') {
            if let Some(end) = balanced_end(bytes, i) {
                blocks.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    blocks
}
