//! HTML entity escaping.

use std::borrow::Cow;

/// Escape `&`, `<` and `>` for use in element content.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    escape(input, false)
}

/// Escape text for use inside a double-quoted attribute value.
///
/// Quotes are escaped in addition to the content set.
pub fn escape_attribute(input: &str) -> Cow<'_, str> {
    escape(input, true)
}

fn escape(input: &str, quotes: bool) -> Cow<'_, str> {
    let needs_escape = input
        .bytes()
        .any(|b| matches!(b, b'&' | b'<' | b'>') || (quotes && matches!(b, b'"' | b'\'')));
    if !needs_escape {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    let mut last = 0;
    for (i, b) in input.bytes().enumerate() {
        let replacement = match b {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'"' if quotes => "&quot;",
            b'\'' if quotes => "&#x27;",
            _ => continue,
        };
        out.push_str(&input[last..i]);
        out.push_str(replacement);
        last = i + 1;
    }
    out.push_str(&input[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("plain"), "plain");
        assert!(matches!(escape_text("plain"), Cow::Borrowed(_)));
        assert_eq!(escape_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_text("say \"hi\""), "say \"hi\"");
    }

    #[test]
    fn test_escape_attribute() {
        assert_eq!(escape_attribute("a\"b'c"), "a&quot;b&#x27;c");
        assert_eq!(escape_attribute("x<y"), "x&lt;y");
    }

    #[test]
    fn test_escape_multibyte() {
        assert_eq!(escape_text("héllo <wörld>"), "héllo &lt;wörld&gt;");
    }
}
