//! Text normalization applied to extracted document text before chunking.
//!
//! [`normalize_text`] is pure: it performs no I/O and the same input always
//! yields the same output. The result contains only printable ASCII and
//! `\n`.
//!
//! # Rules
//!
//! 1. `\r\n` and lone `\r` become `\n`.
//! 2. Typographic punctuation is mapped to ASCII (curly quotes, dashes,
//!    ellipsis); other horizontal whitespace (tabs, NBSP) becomes a space.
//! 3. Remaining characters outside printable ASCII are removed.
//! 4. Runs of spaces collapse to one; lines are trimmed.
//! 5. Lines consisting only of digits (page numbers) are dropped.
//! 6. Three or more consecutive newlines collapse to exactly two.
//! 7. Leading and trailing whitespace is trimmed.

/// Normalize raw extracted text. Empty input yields an empty string.
pub fn normalize_text(raw: &str) -> String {
    let mut mapped = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    mapped.push('\n');
                }
            }
            '\n' => mapped.push('\n'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => mapped.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => mapped.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => mapped.push('-'),
            '\u{2026}' => mapped.push_str("..."),
            c if c.is_whitespace() => mapped.push(' '),
            ' '..='~' => mapped.push(c),
            _ => {}
        }
    }

    let mut out = String::with_capacity(mapped.len());
    let mut blank_run = 0usize;
    for line in mapped.split('\n') {
        let collapsed = line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
        if is_page_number(&collapsed) {
            continue;
        }
        if collapsed.is_empty() {
            blank_run += 1;
            // A single blank line survives; anything longer collapses into it.
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() || !collapsed.is_empty() {
            out.push_str(&collapsed);
            out.push('\n');
        }
    }

    out.trim().to_string()
}

fn is_page_number(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   \n\t \n"), "");
    }

    #[test]
    fn collapses_horizontal_whitespace() {
        assert_eq!(normalize_text("a  b\t\tc \u{00A0} d"), "a b c d");
    }

    #[test]
    fn preserves_single_line_breaks() {
        assert_eq!(normalize_text("first line\nsecond line"), "first line\nsecond line");
    }

    #[test]
    fn collapses_many_newlines_to_two() {
        assert_eq!(normalize_text("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize_text("a\n  \n \n\nb"), "a\n\nb");
    }

    #[test]
    fn strips_non_printable() {
        assert_eq!(normalize_text("caf\u{e9} \u{0007}bell \u{1F600}"), "caf bell");
    }

    #[test]
    fn normalizes_punctuation() {
        assert_eq!(
            normalize_text("\u{201C}quoted\u{201D} \u{2014} it\u{2019}s\u{2026}"),
            "\"quoted\" - it's..."
        );
    }

    #[test]
    fn windows_line_endings() {
        assert_eq!(normalize_text("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn drops_page_number_lines() {
        assert_eq!(
            normalize_text("end of page one.\n12\nstart of page two."),
            "end of page one.\nstart of page two."
        );
    }

    #[test]
    fn trims_edges() {
        assert_eq!(normalize_text("\n\n  hello world  \n\n"), "hello world");
    }

    #[test]
    fn idempotent() {
        let raw = "  Some \u{201C}text\u{201D}\n\n\n\nwith\tgaps  \r\n3\r\nend ";
        let once = normalize_text(raw);
        assert_eq!(normalize_text(&once), once);
    }
}
