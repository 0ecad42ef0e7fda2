//! Call target classification and deferral analysis.

use crate::context::CompileContext;
use crate::helpers::is_builtin;
use blockml_syntax::{Expr, ExprKind};
use indexmap::IndexSet;
use smol_str::SmolStr;

/// What a bare-name call resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// Declared earlier in the unit.
    Local,
    /// Provided by the host.
    Builtin,
    /// Undeclared; becomes a tag builder import.
    ImplicitTag,
}

/// Classify a call to `name` with what has been declared so far.
pub fn classify(name: &str, ctx: &CompileContext) -> CallTarget {
    if ctx.has_var(name) {
        CallTarget::Local
    } else if is_builtin(name) {
        CallTarget::Builtin
    } else {
        CallTarget::ImplicitTag
    }
}

/// Conditional and lazy-sequence expressions are evaluated at render time.
pub fn is_deferrable(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::IfExp { .. } | ExprKind::Generator(_))
}

/// Whether an appended expression statement must become a thunk.
pub fn needs_deferral(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { func, .. } => reaches_string_literal(func),
        _ => is_deferrable(expr),
    }
}

/// Follow a callee chain (`"".join`, `"{}".format(x).upper`) down to its root.
pub fn reaches_string_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Constant(blockml_syntax::Constant::Str(_)) => true,
        ExprKind::Attribute { value, .. } | ExprKind::Subscript { value, .. } => {
            reaches_string_literal(value)
        }
        ExprKind::Call { func, .. } => reaches_string_literal(func),
        _ => false,
    }
}

/// Names read by `expr` that are not bound inside it, in first-use order.
pub fn free_names(expr: &Expr) -> IndexSet<SmolStr> {
    let mut out = IndexSet::new();
    let mut bound = Vec::new();
    collect(expr, &mut bound, &mut out);
    out
}

fn collect(expr: &Expr, bound: &mut Vec<SmolStr>, out: &mut IndexSet<SmolStr>) {
    match &expr.kind {
        ExprKind::Name(name) => {
            if !bound.contains(name) {
                out.insert(name.clone());
            }
        }
        ExprKind::Constant(_) => {}
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items {
                collect(item, bound, out);
            }
        }
        ExprKind::Dict(entries) => {
            for (key, value) in entries {
                collect(key, bound, out);
                collect(value, bound, out);
            }
        }
        ExprKind::Attribute { value, .. } => collect(value, bound, out),
        ExprKind::Subscript { value, index } => {
            collect(value, bound, out);
            collect(index, bound, out);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            collect(func, bound, out);
            for arg in args {
                collect(arg, bound, out);
            }
            for keyword in keywords {
                collect(&keyword.value, bound, out);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            collect(test, bound, out);
            collect(body, bound, out);
            collect(orelse, bound, out);
        }
        ExprKind::Generator(comp) | ExprKind::ListComp(comp) => {
            let marker = bound.len();
            for clause in &comp.clauses {
                collect(&clause.iter, bound, out);
                clause.target.binding_names(bound);
                for condition in &clause.conditions {
                    collect(condition, bound, out);
                }
            }
            collect(&comp.element, bound, out);
            bound.truncate(marker);
        }
        ExprKind::Lambda(lambda) => {
            for param in &lambda.params {
                if let Some(default) = &param.default {
                    collect(default, bound, out);
                }
            }
            let marker = bound.len();
            bound.extend(lambda.params.iter().map(|p| p.name.clone()));
            collect(&lambda.body, bound, out);
            bound.truncate(marker);
        }
        ExprKind::BoolOp { values, .. } => {
            for value in values {
                collect(value, bound, out);
            }
        }
        ExprKind::UnaryOp { operand, .. } => collect(operand, bound, out),
        ExprKind::BinOp { left, right, .. } => {
            collect(left, bound, out);
            collect(right, bound, out);
        }
        ExprKind::Compare {
            left, comparators, ..
        } => {
            collect(left, bound, out);
            for comparator in comparators {
                collect(comparator, bound, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VarSource;
    use blockml_syntax::parse_expression;

    fn expr(source: &str) -> Expr {
        parse_expression(source).unwrap()
    }

    #[test]
    fn test_classify() {
        let mut ctx = CompileContext::new("page");
        assert_eq!(classify("div", &ctx), CallTarget::ImplicitTag);
        assert_eq!(classify("len", &ctx), CallTarget::Builtin);
        ctx.add_var("len", VarSource::Assign);
        assert_eq!(classify("len", &ctx), CallTarget::Local);
    }

    #[test]
    fn test_needs_deferral() {
        assert!(needs_deferral(&expr("a if b else c")));
        assert!(needs_deferral(&expr("(x for x in xs)")));
        assert!(needs_deferral(&expr("\", \".join(names)")));
        assert!(needs_deferral(&expr("\"{}\".format(x).upper()")));
        assert!(!needs_deferral(&expr("p(x)")));
        assert!(!needs_deferral(&expr("[x for x in xs]")));
        assert!(!needs_deferral(&expr("sep.join(names)")));
    }

    #[test]
    fn test_free_names() {
        let names = free_names(&expr("f(x, lambda y: y + z, [w for w in ws if w > k])"));
        let names: Vec<_> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["f", "x", "z", "ws", "k"]);
    }
}
