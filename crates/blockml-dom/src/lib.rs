//! Element tree, serializer and tag builder registry for blockml.
//!
//! Templates build an [`Element`] tree through a [`TagRegistry`]; [`render`]
//! turns the tree into HTML text.

pub mod element;
pub mod error;
pub mod escape;
pub mod registry;
pub mod serialize;
pub mod tags;

pub use element::{
    AttrValue, Child, Content, Element, EmbeddedUnit, Thunk, normalize_attribute_name,
    thunk_error,
};
pub use error::{RenderError, RenderResult};
pub use escape::{escape_attribute, escape_text};
pub use registry::{TagBuilder, TagRegistry};
pub use serialize::render;
pub use tags::{TagCategory, is_raw_text, is_void};
