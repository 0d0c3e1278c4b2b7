//! Telegram HTML helpers.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Group plain-text lines into `<pre>` blocks that each stay under `limit` bytes.
///
/// Lines are escaped first. A single line that cannot fit is cut on a char boundary.
pub fn pre_chunks(lines: &[String], limit: usize) -> Vec<String> {
    const OPEN: &str = "<pre>";
    const CLOSE: &str = "</pre>";
    let room = limit.saturating_sub(OPEN.len() + CLOSE.len()).max(1);

    let mut out = Vec::new();
    let mut body = String::new();

    for line in lines {
        let escaped = escape_html(line);
        let escaped = truncate_utf8(&escaped, room);
        let needed = if body.is_empty() {
            escaped.len()
        } else {
            escaped.len() + 1
        };
        if !body.is_empty() && body.len() + needed > room {
            out.push(format!("{OPEN}{body}{CLOSE}"));
            body.clear();
        }
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(escaped);
    }

    if !body.is_empty() {
        out.push(format!("{OPEN}{body}{CLOSE}"));
    }
    out
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    &s[..idx]
}
