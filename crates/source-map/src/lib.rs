//! Source positions for blockml templates.
//!
//! Tokens and syntax nodes carry a [`Span`]. Diagnostics turn span offsets
//! into line/column pairs through a [`LineIndex`], and the printer writes
//! indented template source with a [`CodeBuilder`].

use std::fmt;
use std::ops::Range;

/// Byte range `[start, end)` in a template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Zero-width span, used for synthesized tokens such as `Dedent`.
    #[inline]
    pub const fn empty(offset: u32) -> Self {
        Self::new(offset, offset)
    }

    /// From a lexer's `usize` range.
    #[inline]
    pub fn from_range(range: Range<usize>) -> Self {
        Self::new(range.start as u32, range.end as u32)
    }

    /// The covered slice of `source`; `None` when out of bounds.
    pub fn text(self, source: &str) -> Option<&str> {
        source.get(self.start as usize..self.end as usize)
    }
}

/// Line starts of a source, for offset to line/column lookups.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i as u32 + 1))
            .collect();
        Self {
            starts,
            len: text.len() as u32,
        }
    }

    /// Offsets past the end clamp to the last position.
    pub fn line_col(&self, offset: u32) -> LineCol {
        let offset = offset.min(self.len);
        let line = self.line_of(offset);
        LineCol::new(line as u32, offset - self.starts[line])
    }

    /// Offset of the first byte on the line holding `offset`.
    pub fn line_start_of(&self, offset: u32) -> u32 {
        self.starts[self.line_of(offset.min(self.len))]
    }

    fn line_of(&self, offset: u32) -> usize {
        self.starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }
}

/// Zero-based line and byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl LineCol {
    #[inline]
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Shown one-based, `line:col`.
impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

const INDENT: &str = "    ";

/// Writes source text line by line at a block nesting level.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: String,
    level: usize,
    mid_line: bool,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the current line, indenting it first if it is new.
    pub fn push_str(&mut self, code: &str) {
        if code.is_empty() {
            return;
        }
        if !self.mid_line {
            self.code.push_str(&INDENT.repeat(self.level));
            self.mid_line = true;
        }
        self.code.push_str(code);
    }

    pub fn line(&mut self, code: &str) {
        self.push_str(code);
        self.newline();
    }

    pub fn newline(&mut self) {
        self.code.push('\n');
        self.mid_line = false;
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        self.code
    }
}
