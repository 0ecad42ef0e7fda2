//! AST types for blockml templates.
//!
//! Function bodies, lambdas and comprehensions sit behind `Arc` so a runtime
//! can capture them in closures without copying subtrees, and so a parsed
//! module can be shared between threads.

use smol_str::SmolStr;
use source_map::Span;
use std::sync::Arc;

/// A parsed template unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An expression statement.
    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Expr(expr), span)
    }

    /// `target = value`
    pub fn assign(target: Expr, value: Expr, span: Span) -> Self {
        Self::new(
            StmtKind::Assign {
                targets: vec![target],
                value,
            },
            span,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`; several targets when chained.
    Assign { targets: Vec<Expr>, value: Expr },
    /// `target += value`
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    /// Scope-entry block: `with CALL [as VAR], ...: BODY`.
    With { items: Vec<WithItem>, body: Vec<Stmt> },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    FunctionDef(Arc<FunctionDef>),
    Return(Option<Expr>),
    Import(Vec<Alias>),
    /// `from module import names`; a wildcard is a single alias named `*`.
    ImportFrom { module: SmolStr, names: Vec<Alias> },
    Delete(Vec<Expr>),
    Pass,
    Break,
    Continue,
}

/// One `CALL as VAR` item of a `with` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
}

/// A name bound by an import directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    /// Imported name; dotted for `import a.b`.
    pub name: SmolStr,
    pub asname: Option<SmolStr>,
    pub span: Span,
}

impl Alias {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            asname: None,
            span: Span::default(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// The name this alias binds: the `as` name, else the last dotted segment.
    pub fn binding(&self) -> &str {
        match &self.asname {
            Some(asname) => asname,
            None => self.name.rsplit('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: SmolStr,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: SmolStr,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(SmolStr),
    Constant(Constant),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: SmolStr,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// Lazy sequence: `(element for target in iter if cond)`.
    Generator(Arc<Comprehension>),
    ListComp(Arc<Comprehension>),
    Lambda(Arc<Lambda>),
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Chained comparison `a < b <= c`.
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    /// Pre-escaped text emitted verbatim.
    Markup(SmolStr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: SmolStr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub element: Expr,
    pub clauses: Vec<ComprehensionClause>,
}

/// `for target in iter if cond...`
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub target: Expr,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

impl BoolOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
        }
    }
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn name(name: impl Into<SmolStr>, span: Span) -> Self {
        Self::new(ExprKind::Name(name.into()), span)
    }

    pub fn constant(value: Constant, span: Span) -> Self {
        Self::new(ExprKind::Constant(value), span)
    }

    pub fn string(value: impl Into<SmolStr>, span: Span) -> Self {
        Self::constant(Constant::Str(value.into()), span)
    }

    pub fn call(func: Expr, args: Vec<Expr>, span: Span) -> Self {
        Self::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                keywords: Vec::new(),
            },
            span,
        )
    }

    /// `value.attr`
    pub fn attribute(value: Expr, attr: impl Into<SmolStr>, span: Span) -> Self {
        Self::new(
            ExprKind::Attribute {
                value: Box::new(value),
                attr: attr.into(),
            },
            span,
        )
    }

    /// A zero-parameter lambda around `body`.
    pub fn thunk(body: Expr) -> Self {
        let span = body.span;
        Self::new(
            ExprKind::Lambda(Arc::new(Lambda {
                params: Vec::new(),
                body,
            })),
            span,
        )
    }

    pub fn as_name(&self) -> Option<&SmolStr> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }

    /// Collect the names a binding target introduces, in source order.
    ///
    /// Attribute and subscript targets bind nothing.
    pub fn binding_names(&self, out: &mut Vec<SmolStr>) {
        match &self.kind {
            ExprKind::Name(name) => out.push(name.clone()),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    item.binding_names(out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_binding_names_nested() {
        let span = Span::default();
        let target = Expr::new(
            ExprKind::Tuple(vec![
                Expr::name("a", span),
                Expr::new(
                    ExprKind::List(vec![Expr::name("b", span), Expr::name("c", span)]),
                    span,
                ),
                Expr::attribute(Expr::name("obj", span), "field", span),
            ]),
            span,
        );
        let mut names = Vec::new();
        target.binding_names(&mut names);
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_alias_binding() {
        let mut alias = Alias::new("pages.header");
        assert_eq!(alias.binding(), "header");
        alias.asname = Some("top".into());
        assert_eq!(alias.binding(), "top");
        assert!(Alias::new("*").is_wildcard());
    }
}
