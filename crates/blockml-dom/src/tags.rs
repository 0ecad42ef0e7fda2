//! Tag categories that change how an element is written.

/// Elements that never have content or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose content is emitted without escaping.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements whose content is plain text but still escaped.
pub const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    Void,
    RawText,
    EscapableRawText,
    Normal,
}

impl TagCategory {
    /// Categorize a tag name, ignoring ASCII case.
    pub fn of(tag: &str) -> Self {
        let matches = |set: &[&str]| set.iter().any(|t| t.eq_ignore_ascii_case(tag));
        if matches(VOID_ELEMENTS) {
            TagCategory::Void
        } else if matches(RAW_TEXT_ELEMENTS) {
            TagCategory::RawText
        } else if matches(ESCAPABLE_RAW_TEXT_ELEMENTS) {
            TagCategory::EscapableRawText
        } else {
            TagCategory::Normal
        }
    }
}

pub fn is_void(tag: &str) -> bool {
    TagCategory::of(tag) == TagCategory::Void
}

pub fn is_raw_text(tag: &str) -> bool {
    TagCategory::of(tag) == TagCategory::RawText
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_category() {
        assert_eq!(TagCategory::of("br"), TagCategory::Void);
        assert_eq!(TagCategory::of("IMG"), TagCategory::Void);
        assert_eq!(TagCategory::of("script"), TagCategory::RawText);
        assert_eq!(TagCategory::of("title"), TagCategory::EscapableRawText);
        assert_eq!(TagCategory::of("my-widget"), TagCategory::Normal);
        assert!(is_void("wbr"));
        assert!(!is_raw_text("textarea"));
    }
}
