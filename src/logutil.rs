//! Logging helpers for user-supplied text (search strings, geocoded
//! addresses) so log lines stay single-line and bounded.

/// Render a short, single-line preview of free-form text for logging:
/// control characters are escaped and anything past `max` characters is
/// truncated with an ellipsis.
pub fn text_preview(s: &str, max: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= max {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Preview with the default width used for search-text logging.
pub fn search_preview(s: &str) -> String {
    text_preview(s, 80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_and_truncates() {
        assert_eq!(text_preview("muse\num", 80), "muse\\num");
        let long = "x".repeat(100);
        let preview = text_preview(&long, 10);
        assert_eq!(preview.chars().count(), 11);
        assert!(preview.ends_with('…'));
    }
}
