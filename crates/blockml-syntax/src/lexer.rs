//! Lexer for blockml templates.
//!
//! Raw tokens come from a logos-derived scanner. [`tokenize`] then runs the
//! layout pass: it turns line breaks into `Newline` tokens, compares each
//! line's leading column against an indentation stack to emit `Indent` and
//! `Dedent`, and suppresses both inside brackets.

use crate::error::{ParseError, ParseResult};
use logos::Logos;
use source_map::{LineIndex, Span};
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\f\r]+")]
#[logos(skip(r"#[^\r\n]*", allow_greedy = true))]
#[logos(skip r"\\\r?\n")]
pub enum TokenKind {
    #[token("\n")]
    Newline,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r"[0-9]+\.[0-9]+")]
    Float,
    #[regex(r#""([^"\\\r\n]|\\[^\r\n])*""#)]
    #[regex(r#"'([^'\\\r\n]|\\[^\r\n])*'"#)]
    Str,
    #[regex(r#"m"([^"\\\r\n]|\\[^\r\n])*""#)]
    #[regex(r#"m'([^'\\\r\n]|\\[^\r\n])*'"#)]
    Markup,

    // Keywords
    #[token("and")]
    And,
    #[token("as")]
    As,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("def")]
    Def,
    #[token("del")]
    Del,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("False")]
    False,
    #[token("for")]
    For,
    #[token("from")]
    From,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("is")]
    Is,
    #[token("lambda")]
    Lambda,
    #[token("None")]
    None,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("pass")]
    Pass,
    #[token("return")]
    Return,
    #[token("True")]
    True,
    #[token("with")]
    With,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,

    // Produced by the layout pass.
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Human-readable description used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Newline => "newline",
            TokenKind::Name => "name",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::Str => "string",
            TokenKind::Markup => "markup literal",
            TokenKind::And => "'and'",
            TokenKind::As => "'as'",
            TokenKind::Break => "'break'",
            TokenKind::Continue => "'continue'",
            TokenKind::Def => "'def'",
            TokenKind::Del => "'del'",
            TokenKind::Elif => "'elif'",
            TokenKind::Else => "'else'",
            TokenKind::False => "'False'",
            TokenKind::For => "'for'",
            TokenKind::From => "'from'",
            TokenKind::If => "'if'",
            TokenKind::Import => "'import'",
            TokenKind::In => "'in'",
            TokenKind::Is => "'is'",
            TokenKind::Lambda => "'lambda'",
            TokenKind::None => "'None'",
            TokenKind::Not => "'not'",
            TokenKind::Or => "'or'",
            TokenKind::Pass => "'pass'",
            TokenKind::Return => "'return'",
            TokenKind::True => "'True'",
            TokenKind::With => "'with'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Assign => "'='",
            TokenKind::PlusAssign => "'+='",
            TokenKind::MinusAssign => "'-='",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::DoubleSlash => "'//'",
            TokenKind::Percent => "'%'",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of file",
        }
    }

    fn opens_bracket(self) -> bool {
        matches!(
            self,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace
        )
    }

    fn closes_bracket(self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A token with its location in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Tokenize `source`, including layout tokens. The result always ends with `Eof`.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let lines = LineIndex::new(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut indents: Vec<u32> = vec![0];
    let mut depth = 0usize;
    let mut at_line_start = true;

    while let Some(result) = lexer.next() {
        let span = Span::from_range(lexer.span());
        let kind = match result {
            Ok(kind) => kind,
            Err(()) => {
                let text = lexer.slice();
                if text.starts_with('"') || text.starts_with('\'') {
                    return Err(ParseError::unterminated_string(span));
                }
                return Err(ParseError::unexpected_character(text, span));
            }
        };

        if kind == TokenKind::Newline {
            if depth == 0 && !at_line_start {
                tokens.push(Token::new(TokenKind::Newline, span));
                at_line_start = true;
            }
            continue;
        }

        if at_line_start && depth == 0 {
            let col = span.start - lines.line_start_of(span.start);
            let top = indents.last().copied().unwrap_or(0);
            if col > top {
                indents.push(col);
                tokens.push(Token::new(TokenKind::Indent, Span::empty(span.start)));
            } else {
                while col < indents.last().copied().unwrap_or(0) {
                    indents.pop();
                    tokens.push(Token::new(TokenKind::Dedent, Span::empty(span.start)));
                }
                if col != indents.last().copied().unwrap_or(0) {
                    return Err(ParseError::inconsistent_dedent(span));
                }
            }
            at_line_start = false;
        }

        if kind.opens_bracket() {
            depth += 1;
        } else if kind.closes_bracket() {
            depth = depth.saturating_sub(1);
        }
        tokens.push(Token::new(kind, span));
    }

    let end = Span::empty(source.len() as u32);
    if !at_line_start {
        tokens.push(Token::new(TokenKind::Newline, end));
    }
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token::new(TokenKind::Dedent, end));
    }
    tokens.push(Token::new(TokenKind::Eof, end));
    Ok(tokens)
}
