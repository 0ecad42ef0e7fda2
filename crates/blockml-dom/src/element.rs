//! The document tree.
//!
//! An [`Element`] is a shared handle: cloning it aliases the same node, which
//! is how a template keeps a reference to a block element while appending into
//! it. Children are [`Child`] entries resolved lazily by [`Element::flatten`].

use crate::error::{RenderError, RenderResult};
use crate::escape::escape_text;
use crate::tags::{TagCategory, is_raw_text};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// `true` renders the bare name, `false` omits the attribute.
    Bool(bool),
    Text(String),
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

/// A zero-argument callable invoked when the tree is flattened.
///
/// Thunks run once per flatten and are never memoized.
pub trait Thunk {
    fn invoke(&self) -> RenderResult<Child>;
}

impl<F> Thunk for F
where
    F: Fn() -> RenderResult<Child>,
{
    fn invoke(&self) -> RenderResult<Child> {
        self()
    }
}

/// A compiled unit embedded in another tree.
pub trait EmbeddedUnit {
    /// The unit's root fragment.
    fn fragment(&self) -> Element;
}

/// One child-slot entry.
#[derive(Clone)]
pub enum Child {
    Element(Element),
    Deferred(Rc<dyn Thunk>),
    Sequence(Vec<Child>),
    Unit(Rc<dyn EmbeddedUnit>),
    /// Plain text, escaped unless it lands in a raw text element.
    Text(String),
}

impl Child {
    pub fn text(text: &str) -> Self {
        Child::Text(text.to_string())
    }

    pub fn deferred<F>(thunk: F) -> Self
    where
        F: Fn() -> RenderResult<Child> + 'static,
    {
        Child::Deferred(Rc::new(thunk))
    }

    fn flatten_into(&self, out: &mut Vec<Element>, raw: bool) -> RenderResult<()> {
        match self {
            Child::Element(element) => out.push(element.clone()),
            Child::Deferred(thunk) => thunk.invoke()?.flatten_into(out, raw)?,
            Child::Sequence(items) => {
                for item in items {
                    item.flatten_into(out, raw)?;
                }
            }
            Child::Unit(unit) => out.push(unit.fragment()),
            Child::Text(text) if raw => out.push(Element::from_markup(text.as_str())),
            Child::Text(text) => out.push(Element::from_markup(escape_text(text))),
        }
        Ok(())
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Element(element) => fmt::Debug::fmt(element, f),
            Child::Deferred(_) => f.write_str("Deferred"),
            Child::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
            Child::Unit(_) => f.write_str("Unit"),
            Child::Text(text) => f.debug_tuple("Text").field(text).finish(),
        }
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

/// Content accepted by [`Element::append`].
#[derive(Debug, Clone)]
pub enum Content {
    /// Plain text, escaped unless the element is raw text.
    Text(String),
    /// Pre-escaped markup, stored verbatim.
    Markup(String),
    Child(Child),
    /// Spread recursively.
    Many(Vec<Content>),
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Element> for Content {
    fn from(element: Element) -> Self {
        Content::Child(Child::Element(element))
    }
}

impl From<Child> for Content {
    fn from(child: Child) -> Self {
        Content::Child(child)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ElementData {
    pub(crate) tag: Option<SmolStr>,
    pub(crate) text: String,
    pub(crate) tail: String,
    pub(crate) attributes: IndexMap<SmolStr, AttrValue>,
    pub(crate) children: Vec<Child>,
}

/// A shared handle to a document node.
#[derive(Clone, Default)]
pub struct Element(Rc<RefCell<ElementData>>);

/// Attribute names drop leading and trailing underscores, so `class_` is `class`.
pub fn normalize_attribute_name(name: &str) -> SmolStr {
    SmolStr::new(name.trim_matches('_'))
}

impl Element {
    pub fn new(tag: Option<&str>) -> Self {
        Element(Rc::new(RefCell::new(ElementData {
            tag: tag.map(SmolStr::new),
            ..ElementData::default()
        })))
    }

    pub fn with_tag(tag: &str) -> Self {
        Self::new(Some(tag))
    }

    /// An anonymous grouping node.
    pub fn fragment() -> Self {
        Self::new(None)
    }

    /// A fragment whose text is `markup`, stored verbatim.
    pub fn from_markup(markup: impl Into<String>) -> Self {
        let element = Self::fragment();
        element.0.borrow_mut().text = markup.into();
        element
    }

    /// Construct with initial content and attributes.
    pub fn build<A>(tag: Option<&str>, content: impl IntoIterator<Item = Content>, attrs: A) -> Self
    where
        A: IntoIterator<Item = (SmolStr, Option<AttrValue>)>,
    {
        Self::new(tag).call(content, attrs)
    }

    /// Append `content`, merge `attrs`, and return this same handle.
    pub fn call<A>(&self, content: impl IntoIterator<Item = Content>, attrs: A) -> Self
    where
        A: IntoIterator<Item = (SmolStr, Option<AttrValue>)>,
    {
        self.extend(content);
        for (name, value) in attrs {
            self.set_attr(&name, value);
        }
        self.clone()
    }

    pub(crate) fn data(&self) -> Ref<'_, ElementData> {
        self.0.borrow()
    }

    pub fn tag(&self) -> Option<SmolStr> {
        self.0.borrow().tag.clone()
    }

    pub fn is_fragment(&self) -> bool {
        self.0.borrow().tag.is_none()
    }

    pub fn text(&self) -> String {
        self.0.borrow().text.clone()
    }

    pub fn tail(&self) -> String {
        self.0.borrow().tail.clone()
    }

    /// Replace the text. The value is written as-is when serialized.
    pub fn set_text(&self, text: impl Into<String>) {
        self.0.borrow_mut().text = text.into();
    }

    /// Replace the tail. The value is written as-is when serialized.
    pub fn set_tail(&self, tail: impl Into<String>) {
        self.0.borrow_mut().tail = tail.into();
    }

    pub fn get(&self, name: &str) -> Option<AttrValue> {
        self.0
            .borrow()
            .attributes
            .get(&normalize_attribute_name(name))
            .cloned()
    }

    pub fn get_or(&self, name: &str, default: AttrValue) -> AttrValue {
        self.get(name).unwrap_or(default)
    }

    pub fn set(&self, name: &str, value: impl Into<AttrValue>) {
        self.set_attr(name, Some(value.into()));
    }

    /// Set an attribute; `None` removes it.
    pub fn set_attr(&self, name: &str, value: Option<AttrValue>) {
        let name = normalize_attribute_name(name);
        let mut data = self.0.borrow_mut();
        match value {
            Some(value) => {
                data.attributes.insert(name, value);
            }
            None => {
                data.attributes.shift_remove(&name);
            }
        }
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> Vec<(SmolStr, AttrValue)> {
        self.0
            .borrow()
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Direct child-slot entries, unresolved.
    pub fn children(&self) -> Vec<Child> {
        self.0.borrow().children.clone()
    }

    /// Number of direct child-slot entries.
    pub fn len(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub fn append(&self, content: impl Into<Content>) {
        match content.into() {
            Content::Text(text) => {
                if self.is_raw_text() {
                    self.append_markup(&text);
                } else {
                    self.append_markup(&escape_text(&text));
                }
            }
            Content::Markup(markup) => self.append_markup(&markup),
            Content::Child(child) => self.append_child(child),
            Content::Many(items) => {
                for item in items {
                    self.append(item);
                }
            }
        }
    }

    pub fn extend(&self, content: impl IntoIterator<Item = Content>) {
        for item in content {
            self.append(item);
        }
    }

    /// Insert a child entry at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, child: impl Into<Child>) {
        let child = self.wrap(child.into());
        let mut data = self.0.borrow_mut();
        let index = index.min(data.children.len());
        data.children.insert(index, child);
    }

    /// Resolve children into realized elements, invoking thunks.
    pub fn flatten(&self) -> RenderResult<Vec<Element>> {
        self.flatten_in(self.is_raw_text())
    }

    /// Like [`flatten`](Self::flatten), with text left unescaped when `raw`.
    pub(crate) fn flatten_in(&self, raw: bool) -> RenderResult<Vec<Element>> {
        // Thunks may touch this element, so no borrow is held while they run.
        let children = self.children();
        let mut out = Vec::with_capacity(children.len());
        for child in &children {
            child.flatten_into(&mut out, raw)?;
        }
        Ok(out)
    }

    fn is_raw_text(&self) -> bool {
        self.0.borrow().tag.as_deref().is_some_and(is_raw_text)
    }

    fn append_child(&self, child: Child) {
        let child = self.wrap(child);
        self.0.borrow_mut().children.push(child);
    }

    /// Non-element entries sit inside a fragment so later text has a tail to join.
    fn wrap(&self, child: Child) -> Child {
        match child {
            Child::Element(element) => Child::Element(element),
            other => {
                let wrapper = Element::fragment();
                wrapper.0.borrow_mut().children.push(other);
                Child::Element(wrapper)
            }
        }
    }

    /// Merge escaped text into the trailing text slot.
    fn append_markup(&self, markup: &str) {
        if markup.is_empty() {
            return;
        }
        let last = {
            let mut data = self.0.borrow_mut();
            match data.children.last() {
                None => {
                    data.text.push_str(markup);
                    return;
                }
                Some(Child::Element(last)) => last.clone(),
                Some(_) => {
                    data.children
                        .push(Child::Element(Element::from_markup(markup)));
                    return;
                }
            }
        };
        last.0.borrow_mut().tail.push_str(markup);
    }

    pub(crate) fn category(&self) -> Option<TagCategory> {
        self.0.borrow().tag.as_deref().map(TagCategory::of)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("Element")
                .field("tag", &data.tag)
                .field("text", &data.text)
                .field("tail", &data.tail)
                .field("attributes", &data.attributes)
                .field("children", &data.children.len())
                .finish(),
            Err(_) => f.write_str("Element(<borrowed>)"),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let html = crate::serialize::render(self).map_err(|_| fmt::Error)?;
        f.write_str(&html)
    }
}

/// Wrap an error raised by a thunk.
pub fn thunk_error(err: impl std::error::Error + Send + Sync + 'static) -> RenderError {
    RenderError::deferred(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn test_text_coalescing_into_text() {
        let el = Element::with_tag("p");
        el.append("a < b");
        el.append(" & c");
        assert_eq!(el.text(), "a &lt; b &amp; c");
        assert_eq!(el.len(), 0);
    }

    #[test]
    fn test_text_coalescing_into_tail() {
        let el = Element::with_tag("p");
        el.append("before");
        el.append(Element::with_tag("br"));
        el.append("after ");
        el.append("<more>");
        assert_eq!(el.len(), 1);
        let br = el.flatten().unwrap().remove(0);
        assert_eq!(br.tail(), "after &lt;more&gt;");
        assert_eq!(el.text(), "before");
    }

    #[test]
    fn test_text_after_deferred_joins_wrapper_tail() {
        let el = Element::fragment();
        el.append(Child::deferred(|| Ok(Child::text("x"))));
        el.append("y");
        el.append("z");
        assert_eq!(el.len(), 1);
        let wrapper = &el.children()[0];
        let Child::Element(wrapper) = wrapper else {
            panic!("expected wrapper element");
        };
        assert!(wrapper.is_fragment());
        assert_eq!(wrapper.tail(), "yz");
    }

    #[test]
    fn test_sequences_are_spread() {
        let el = Element::with_tag("ul");
        el.append(Content::Many(vec![
            Element::with_tag("li").into(),
            Content::Many(vec![Element::with_tag("li").into()]),
        ]));
        assert_eq!(el.len(), 2);
    }

    #[test]
    fn test_markup_is_not_escaped() {
        let el = Element::with_tag("div");
        el.append(Content::Markup("<b>bold</b>".into()));
        assert_eq!(el.text(), "<b>bold</b>");
    }

    #[test]
    fn test_raw_text_elements_skip_escaping() {
        let script = Element::with_tag("script");
        script.append("if (a < b && c) {}");
        assert_eq!(script.text(), "if (a < b && c) {}");

        let title = Element::with_tag("title");
        title.append("Tom & Jerry");
        assert_eq!(title.text(), "Tom &amp; Jerry");
    }

    #[test]
    fn test_attributes() {
        let el = Element::build(
            Some("input"),
            Vec::new(),
            vec![
                ("type".into(), Some(AttrValue::from("text"))),
                ("class_".into(), Some(AttrValue::from("wide"))),
                ("hidden".into(), Some(AttrValue::Bool(true))),
            ],
        );
        assert_eq!(el.get("class"), Some(AttrValue::from("wide")));
        assert_eq!(el.get_or("missing", AttrValue::Bool(false)), AttrValue::Bool(false));
        el.set_attr("type", None);
        let names: Vec<_> = el.attributes().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["class", "hidden"]);
    }

    #[test]
    fn test_call_returns_same_handle() {
        let el = Element::with_tag("div");
        let returned = el.call(vec!["hi".into()], vec![("id".into(), Some("main".into()))]);
        assert!(returned.ptr_eq(&el));
        assert_eq!(el.text(), "hi");
        assert_eq!(el.get("id"), Some(AttrValue::from("main")));
    }

    #[test]
    fn test_insert_clamps_index() {
        let el = Element::with_tag("ol");
        el.append(Element::with_tag("a"));
        el.insert(0, Element::with_tag("b"));
        el.insert(99, Element::with_tag("c"));
        let tags: Vec<_> = el
            .flatten()
            .unwrap()
            .iter()
            .map(|e| e.tag().unwrap_or_default())
            .collect();
        assert_eq!(tags, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_len_and_truthiness_are_pre_resolution() {
        let el = Element::fragment();
        assert!(el.is_empty());
        el.append(Child::Sequence(vec![
            Element::with_tag("a").into(),
            Element::with_tag("b").into(),
        ]));
        assert_eq!(el.len(), 1);
        assert_eq!(el.flatten().unwrap().len(), 2);
    }

    #[test]
    fn test_thunks_run_on_every_flatten() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let el = Element::fragment();
        el.append(Child::deferred(move || {
            counter.set(counter.get() + 1);
            Ok(Child::Element(Element::with_tag("span")))
        }));
        el.flatten().unwrap();
        el.flatten().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_thunk_error_propagates() {
        #[derive(Debug)]
        struct Boom;
        impl fmt::Display for Boom {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("boom")
            }
        }
        impl std::error::Error for Boom {}

        let el = Element::fragment();
        el.append(Child::deferred(|| Err(thunk_error(Boom))));
        let err = el.flatten().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
