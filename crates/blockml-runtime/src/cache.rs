//! On-disk format of compiled units.
//!
//! A cache file is a version header line followed by the printed rewritten
//! program. Files written by another version are ignored.

use blockml_syntax::{Module, print_module};

const HEADER_PREFIX: &str = "# blockml-compiled v";

/// Header line for this build.
pub fn header() -> String {
    format!("{}{}", HEADER_PREFIX, env!("CARGO_PKG_VERSION"))
}

pub fn encode(program: &Module) -> String {
    format!("{}\n{}", header(), print_module(program))
}

/// Program text of a cache file, if it was written by this version.
pub fn decode(text: &str) -> Option<&str> {
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    (first.trim_end() == header()).then_some(rest)
}
