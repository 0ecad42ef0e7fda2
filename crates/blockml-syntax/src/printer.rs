//! Source printer.
//!
//! Output re-parses to an equivalent tree. Compound expressions are always
//! parenthesized so no precedence bookkeeping is needed.

use crate::ast::*;
use source_map::CodeBuilder;

/// Print a module back to template source.
pub fn print_module(module: &Module) -> String {
    let mut printer = Printer {
        out: CodeBuilder::new(),
    };
    for stmt in &module.body {
        printer.stmt(stmt);
    }
    printer.out.finish()
}

/// Print a single expression.
pub fn print_expr(expr: &Expr) -> String {
    expression(expr)
}

struct Printer {
    out: CodeBuilder,
}

impl Printer {
    fn block(&mut self, body: &[Stmt]) {
        self.out.push_str(":");
        self.out.newline();
        self.out.indent();
        if body.is_empty() {
            self.out.line("pass");
        }
        for stmt in body {
            self.stmt(stmt);
        }
        self.out.dedent();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.out.line(&expression(expr)),
            StmtKind::Assign { targets, value } => {
                let mut line = String::new();
                for target in targets {
                    line.push_str(&expression(target));
                    line.push_str(" = ");
                }
                line.push_str(&expression(value));
                self.out.line(&line);
            }
            StmtKind::AugAssign { target, op, value } => {
                self.out.line(&format!(
                    "{} {}= {}",
                    expression(target),
                    op.as_str(),
                    expression(value)
                ));
            }
            StmtKind::With { items, body } => {
                let items = items
                    .iter()
                    .map(|item| match &item.target {
                        Some(target) => {
                            format!("{} as {}", expression(&item.context), expression(target))
                        }
                        None => expression(&item.context),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                self.out.push_str(&format!("with {}", items));
                self.block(body);
            }
            StmtKind::If { .. } => self.if_chain(stmt, "if"),
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.out.push_str(&format!(
                    "for {} in {}",
                    expression(target),
                    expression(iter)
                ));
                self.block(body);
                if !orelse.is_empty() {
                    self.out.push_str("else");
                    self.block(orelse);
                }
            }
            StmtKind::FunctionDef(def) => {
                self.out
                    .push_str(&format!("def {}({})", def.name, params(&def.params)));
                self.block(&def.body);
            }
            StmtKind::Return(None) => self.out.line("return"),
            StmtKind::Return(Some(value)) => {
                self.out.line(&format!("return {}", expression(value)))
            }
            StmtKind::Import(names) => {
                self.out.line(&format!("import {}", aliases(names)));
            }
            StmtKind::ImportFrom { module, names } => {
                self.out
                    .line(&format!("from {} import {}", module, aliases(names)));
            }
            StmtKind::Delete(targets) => {
                self.out.line(&format!("del {}", join(targets)));
            }
            StmtKind::Pass => self.out.line("pass"),
            StmtKind::Break => self.out.line("break"),
            StmtKind::Continue => self.out.line("continue"),
        }
    }

    fn if_chain(&mut self, stmt: &Stmt, keyword: &str) {
        let StmtKind::If { test, body, orelse } = &stmt.kind else {
            return;
        };
        self.out
            .push_str(&format!("{} {}", keyword, expression(test)));
        self.block(body);
        match orelse.as_slice() {
            [] => {}
            [nested @ Stmt {
                kind: StmtKind::If { .. },
                ..
            }] => self.if_chain(nested, "elif"),
            _ => {
                self.out.push_str("else");
                self.block(orelse);
            }
        }
    }
}

fn join(items: &[Expr]) -> String {
    items.iter().map(expression).collect::<Vec<_>>().join(", ")
}

fn aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {}", alias.name, asname),
            None => alias.name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn params(params: &[Param]) -> String {
    params
        .iter()
        .map(|param| match &param.default {
            Some(default) => format!("{}={}", param.name, expression(default)),
            None => param.name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn comprehension(comp: &Comprehension) -> String {
    let mut out = expression(&comp.element);
    for clause in &comp.clauses {
        out.push_str(&format!(
            " for {} in {}",
            expression(&clause.target),
            expression(&clause.iter)
        ));
        for condition in &clause.conditions {
            out.push_str(" if ");
            out.push_str(&expression(condition));
        }
    }
    out
}

fn expression(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Name(name) => name.to_string(),
        ExprKind::Constant(value) => constant(value),
        ExprKind::List(items) => format!("[{}]", join(items)),
        ExprKind::Tuple(items) => match items.as_slice() {
            [single] => format!("({},)", expression(single)),
            _ => format!("({})", join(items)),
        },
        ExprKind::Dict(entries) => {
            let entries = entries
                .iter()
                .map(|(key, value)| format!("{}: {}", expression(key), expression(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", entries)
        }
        ExprKind::Attribute { value, attr } => format!("{}.{}", expression(value), attr),
        ExprKind::Subscript { value, index } => {
            format!("{}[{}]", expression(value), expression(index))
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            let mut parts: Vec<String> = args.iter().map(expression).collect();
            parts.extend(
                keywords
                    .iter()
                    .map(|kw| format!("{}={}", kw.name, expression(&kw.value))),
            );
            format!("{}({})", expression(func), parts.join(", "))
        }
        ExprKind::IfExp { test, body, orelse } => format!(
            "({} if {} else {})",
            expression(body),
            expression(test),
            expression(orelse)
        ),
        ExprKind::Generator(comp) => format!("({})", comprehension(comp)),
        ExprKind::ListComp(comp) => format!("[{}]", comprehension(comp)),
        ExprKind::Lambda(lambda) => {
            if lambda.params.is_empty() {
                format!("(lambda: {})", expression(&lambda.body))
            } else {
                format!(
                    "(lambda {}: {})",
                    params(&lambda.params),
                    expression(&lambda.body)
                )
            }
        }
        ExprKind::BoolOp { op, values } => {
            let sep = format!(" {} ", op.as_str());
            format!(
                "({})",
                values.iter().map(expression).collect::<Vec<_>>().join(&sep)
            )
        }
        ExprKind::UnaryOp { op, operand } => match op {
            UnaryOp::Not => format!("(not {})", expression(operand)),
            UnaryOp::Neg => format!("(-{})", expression(operand)),
            UnaryOp::Pos => format!("(+{})", expression(operand)),
        },
        ExprKind::BinOp { left, op, right } => format!(
            "({} {} {})",
            expression(left),
            op.as_str(),
            expression(right)
        ),
        ExprKind::Compare {
            left,
            ops,
            comparators,
        } => {
            let mut out = format!("({}", expression(left));
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push_str(&format!(" {} {}", op.as_str(), expression(comparator)));
            }
            out.push(')');
            out
        }
    }
}

fn constant(value: &Constant) -> String {
    match value {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(value) => value.to_string(),
        Constant::Float(value) => {
            let text = value.to_string();
            if text.contains('.') {
                text
            } else {
                format!("{}.0", text)
            }
        }
        Constant::Str(value) => quote(value),
        Constant::Markup(value) => format!("m{}", quote(value)),
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
