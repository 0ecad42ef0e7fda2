//! HTML serialization.
//!
//! Depth-first and read-only: text and tails were escaped when appended and
//! are written verbatim. Text produced by deferred thunks is escaped here,
//! unless a `script` or `style` encloses it through fragments. Flattening
//! children may run deferred thunks, which is the only way rendering can fail.

use crate::element::{AttrValue, Element};
use crate::error::{RenderError, RenderResult};
use crate::escape::escape_attribute;
use crate::tags::TagCategory;

/// Render `root` and its descendants to HTML text.
pub fn render(root: &Element) -> RenderResult<String> {
    let mut serializer = Serializer {
        out: String::new(),
        ancestors: Vec::new(),
    };
    serializer.element(root, false)?;
    Ok(serializer.out)
}

struct Serializer {
    out: String,
    ancestors: Vec<*const ()>,
}

impl Serializer {
    /// `raw` is whether the nearest tagged ancestor is a raw text element.
    fn element(&mut self, element: &Element, raw: bool) -> RenderResult<()> {
        let id = element.id();
        if self.ancestors.contains(&id) {
            return Err(RenderError::Cycle(
                element.tag().map(|t| t.to_string()).unwrap_or_default(),
            ));
        }

        let tag = {
            let data = element.data();
            match &data.tag {
                Some(tag) => {
                    self.out.push('<');
                    self.out.push_str(tag);
                    for (name, value) in &data.attributes {
                        self.attribute(name, value);
                    }
                    self.out.push('>');
                }
                None => {
                    if let Some(AttrValue::Text(doctype)) = data.attributes.get("doctype") {
                        self.out.push_str("<!DOCTYPE ");
                        self.out.push_str(doctype);
                        self.out.push('>');
                    }
                }
            }
            data.tag.clone()
        };

        if element.category() == Some(TagCategory::Void) {
            self.out.push_str(&element.data().tail);
            return Ok(());
        }

        let raw = match &tag {
            Some(tag) => TagCategory::of(tag) == TagCategory::RawText,
            None => raw,
        };
        self.out.push_str(&element.data().text);
        self.ancestors.push(id);
        for child in element.flatten_in(raw)? {
            self.element(&child, raw)?;
        }
        self.ancestors.pop();

        if let Some(tag) = tag {
            self.out.push_str("</");
            self.out.push_str(&tag);
            self.out.push('>');
        }
        self.out.push_str(&element.data().tail);
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &AttrValue) {
        match value {
            AttrValue::Bool(false) => {}
            AttrValue::Bool(true) => {
                self.out.push(' ');
                self.out.push_str(name);
            }
            AttrValue::Text(text) => {
                self.out.push(' ');
                self.out.push_str(name);
                self.out.push_str("=\"");
                self.out.push_str(&escape_attribute(text));
                self.out.push('"');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Child, Content};
    use crate::tags::VOID_ELEMENTS;
    use pretty_assertions::assert_eq;

    fn el(tag: &str) -> Element {
        Element::with_tag(tag)
    }

    #[test]
    fn test_render_nested() {
        let root = el("root");
        let child = el("child");
        for item in ["A", "B", "C"] {
            let li = el("item");
            li.append(item);
            child.append(li);
        }
        root.append(child);
        assert_eq!(
            render(&root).unwrap(),
            "<root><child><item>A</item><item>B</item><item>C</item></child></root>"
        );
    }

    #[test]
    fn test_render_attributes() {
        let input = el("input");
        input.set("type", "checkbox");
        input.set("checked", true);
        input.set("disabled", false);
        input.set("data_label", "say \"hi\" & <bye>");
        assert_eq!(
            render(&input).unwrap(),
            "<input type=\"checkbox\" checked data_label=\"say &quot;hi&quot; &amp; &lt;bye&gt;\">"
        );
    }

    #[test]
    fn test_void_elements_drop_content() {
        for tag in VOID_ELEMENTS {
            for n in 0..3 {
                let node = el(tag);
                node.set("id", "x");
                for _ in 0..n {
                    node.append(el("span"));
                    node.append("text");
                }
                assert_eq!(render(&node).unwrap(), format!("<{} id=\"x\">", tag));
            }
        }
    }

    #[test]
    fn test_void_element_keeps_tail() {
        let p = el("p");
        p.append("one");
        p.append(el("br"));
        p.append("two");
        assert_eq!(render(&p).unwrap(), "<p>one<br>two</p>");
    }

    #[test]
    fn test_fragment_doctype() {
        let doc = Element::fragment();
        doc.set("doctype", "html");
        doc.append(el("html"));
        assert_eq!(render(&doc).unwrap(), "<!DOCTYPE html><html></html>");
    }

    #[test]
    fn test_fragment_has_no_wrapping_tag() {
        let frag = Element::fragment();
        frag.append("a");
        frag.append(el("b"));
        frag.append("c");
        assert_eq!(render(&frag).unwrap(), "a<b></b>c");
    }

    #[test]
    fn test_deferred_children_render_in_place() {
        let ul = el("ul");
        ul.append("[");
        ul.append(Child::deferred(|| {
            let li = Element::with_tag("li");
            li.append("lazy");
            Ok(Child::Sequence(vec![li.into(), Child::text("<tail>")]))
        }));
        ul.append("]");
        assert_eq!(
            render(&ul).unwrap(),
            "<ul>[<li>lazy</li>&lt;tail&gt;]</ul>"
        );
    }

    #[test]
    fn test_raw_text_rendering() {
        let style = el("style");
        style.append("a > b { color: red }");
        assert_eq!(render(&style).unwrap(), "<style>a > b { color: red }</style>");
        let textarea = el("textarea");
        textarea.append(Content::Text("<b>".into()));
        assert_eq!(render(&textarea).unwrap(), "<textarea>&lt;b&gt;</textarea>");
    }

    #[test]
    fn test_deferred_text_follows_raw_text_parent() {
        let script = el("script");
        script.append(Child::deferred(|| Ok(Child::text("a < b"))));
        script.append(Child::Sequence(vec![Child::text(" && c")]));
        assert_eq!(render(&script).unwrap(), "<script>a < b && c</script>");

        let title = el("title");
        title.append(Child::deferred(|| Ok(Child::text("a < b"))));
        assert_eq!(render(&title).unwrap(), "<title>a &lt; b</title>");

        let p = el("p");
        let inner = el("script");
        inner.append(Child::deferred(|| {
            let em = Element::with_tag("em");
            em.append(Child::text("<x>"));
            Ok(em.into())
        }));
        p.append(inner);
        assert_eq!(render(&p).unwrap(), "<p><script><em>&lt;x&gt;</em></script></p>");
    }

    #[test]
    fn test_cycle_is_an_error() {
        let div = el("div");
        div.append(div.clone());
        assert!(matches!(render(&div), Err(RenderError::Cycle(_))));
    }

    #[test]
    fn test_render_is_repeatable() {
        let div = el("div");
        div.append(Child::deferred(|| Ok(Child::text("x"))));
        let first = render(&div).unwrap();
        assert_eq!(first, render(&div).unwrap());
        insta::assert_snapshot!(first, @"<div>x</div>");
    }
}
