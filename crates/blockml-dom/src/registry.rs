//! Tag builder registry.
//!
//! Maps a tag name to the [`TagBuilder`] that constructs elements with that
//! tag. Any name is accepted. Entries are never removed, and building a
//! builder twice yields an equivalent one, so racing inserts are harmless.

use crate::element::{AttrValue, Content, Element};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::{Arc, RwLock};

/// Constructs elements with a fixed tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagBuilder {
    tag: SmolStr,
}

impl TagBuilder {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: SmolStr::new(tag),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn build<A>(&self, content: impl IntoIterator<Item = Content>, attrs: A) -> Element
    where
        A: IntoIterator<Item = (SmolStr, Option<AttrValue>)>,
    {
        Element::build(Some(&self.tag), content, attrs)
    }
}

#[derive(Debug, Default)]
pub struct TagRegistry {
    builders: RwLock<FxHashMap<SmolStr, Arc<TagBuilder>>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the builder for `name`, trimmed of `_`.
    pub fn builder(&self, name: &str) -> Arc<TagBuilder> {
        let tag = name.trim_matches('_');
        if let Ok(builders) = self.builders.read() {
            if let Some(builder) = builders.get(tag) {
                return builder.clone();
            }
        }

        let builder = Arc::new(TagBuilder::new(tag));
        match self.builders.write() {
            Ok(mut builders) => builders
                .entry(SmolStr::new(tag))
                .or_insert(builder)
                .clone(),
            // A poisoned map still answers correctly with a fresh builder.
            Err(_) => builder,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders
            .read()
            .map(|builders| builders.contains_key(name.trim_matches('_')))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.builders.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
