//! The template rewrite.
//!
//! One pass over the module. Each statement is rewritten against a [`Frame`]
//! naming the element that new content is appended to; entering a tag block
//! or a wrapped `if`/`for` passes a new frame down instead of mutating
//! shared state.

use crate::classify::{CallTarget, classify, free_names, is_deferrable, needs_deferral};
use crate::context::{CompileContext, VarSource};
use crate::error::{CompileError, CompileResult};
use crate::helpers::names;
use blockml_syntax::{
    Alias, CmpOp, Comprehension, ComprehensionClause, Constant, Expr, ExprKind, FunctionDef,
    Keyword, Lambda, Module, Param, Stmt, StmtKind, WithItem,
};
use smol_str::SmolStr;
use source_map::Span;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Frame<'a> {
    /// Element receiving appended content; `None` in plain function bodies.
    current: Option<&'a str>,
    /// Inside an author `def`, where assignments are local and unguarded.
    in_function: bool,
    /// A loop encloses this statement within the same function body.
    in_loop: bool,
    /// Inside a synthesized `__block_n__` function.
    in_block: bool,
}

/// Rewrite a module into an element-building program.
pub fn transform_module(ctx: &mut CompileContext, module: &Module) -> CompileResult<Module> {
    let frame = Frame {
        current: Some(names::DOCUMENT),
        in_function: false,
        in_loop: false,
        in_block: false,
    };
    let mut body = transform_body(ctx, &module.body, frame)?;
    if !ctx.implicit_tags.is_empty() {
        body.insert(0, preamble(ctx));
    }
    Ok(Module::new(body))
}

/// `from blockml import <tags>, Element`
fn preamble(ctx: &CompileContext) -> Stmt {
    let mut aliases: Vec<Alias> = ctx.implicit_tags.iter().map(|tag| Alias::new(tag.clone())).collect();
    aliases.push(Alias::new(names::ELEMENT));
    Stmt::new(
        StmtKind::ImportFrom {
            module: SmolStr::new_static(names::RUNTIME_MODULE),
            names: aliases,
        },
        Span::default(),
    )
}

fn transform_body(ctx: &mut CompileContext, body: &[Stmt], frame: Frame<'_>) -> CompileResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        transform_stmt(ctx, stmt, frame, &mut out)?;
    }
    Ok(out)
}

fn transform_stmt(
    ctx: &mut CompileContext,
    stmt: &Stmt,
    frame: Frame<'_>,
    out: &mut Vec<Stmt>,
) -> CompileResult<()> {
    let span = stmt.span;
    match &stmt.kind {
        StmtKind::With { items, body } => transform_with(ctx, items, body, span, frame, out)?,
        StmtKind::Expr(expr) => {
            let expr = transform_expr(ctx, expr);
            match frame.current {
                Some(current) => {
                    let value = if needs_deferral(&expr) {
                        make_thunk(ctx, expr)
                    } else {
                        expr
                    };
                    out.push(append(current, value, span));
                }
                None => out.push(Stmt::expr(expr)),
            }
        }
        StmtKind::Assign { targets, value } => {
            let value = transform_expr(ctx, value);
            let targets: Vec<Expr> = targets.iter().map(|t| transform_expr(ctx, t)).collect();
            for target in &targets {
                ctx.add_target(target, VarSource::Assign);
            }
            if frame.in_function || frame.current.is_none() {
                out.push(Stmt::new(StmtKind::Assign { targets, value }, span));
            } else {
                guarded_assign(ctx, targets, value, span, out);
            }
        }
        StmtKind::AugAssign { target, op, value } => {
            let value = transform_expr(ctx, value);
            let target = transform_expr(ctx, target);
            ctx.add_target(&target, VarSource::Assign);
            out.push(Stmt::new(
                StmtKind::AugAssign {
                    target,
                    op: *op,
                    value,
                },
                span,
            ));
        }
        StmtKind::If { .. } | StmtKind::For { .. } => match frame.current {
            Some(current) => wrap_block(ctx, stmt, current, frame, out)?,
            None => out.push(transform_branches(ctx, stmt, frame)?),
        },
        StmtKind::FunctionDef(def) => out.push(transform_def(ctx, def, span)?),
        StmtKind::Return(value) => {
            if frame.in_block {
                return Err(CompileError::return_in_block(&ctx.unit, span));
            }
            if !frame.in_function {
                return Err(CompileError::return_outside_function(&ctx.unit, span));
            }
            let value = value.as_ref().map(|v| transform_expr(ctx, v));
            out.push(Stmt::new(StmtKind::Return(value), span));
        }
        StmtKind::Import(aliases) => {
            for alias in aliases {
                ctx.add_var(alias.binding(), VarSource::Import);
            }
            out.push(stmt.clone());
        }
        StmtKind::ImportFrom { module, names: aliases } => {
            if let Some(wildcard) = aliases.iter().find(|a| a.is_wildcard()) {
                return Err(CompileError::wildcard_import(&ctx.unit, module, wildcard.span));
            }
            for alias in aliases {
                ctx.add_var(alias.binding(), VarSource::Import);
                if module == names::RUNTIME_MODULE {
                    ctx.add_builder(alias.binding());
                }
            }
            out.push(stmt.clone());
        }
        StmtKind::Delete(targets) => {
            let targets = targets.iter().map(|t| transform_expr(ctx, t)).collect();
            out.push(Stmt::new(StmtKind::Delete(targets), span));
        }
        StmtKind::Break | StmtKind::Continue if !frame.in_loop => {
            let keyword = if matches!(stmt.kind, StmtKind::Break) {
                "break"
            } else {
                "continue"
            };
            return Err(CompileError::loop_control_outside_loop(&ctx.unit, keyword, span));
        }
        StmtKind::Pass | StmtKind::Break | StmtKind::Continue => out.push(stmt.clone()),
    }
    Ok(())
}

/// `with CALL [as VAR]: BODY`
fn transform_with(
    ctx: &mut CompileContext,
    items: &[WithItem],
    body: &[Stmt],
    span: Span,
    frame: Frame<'_>,
    out: &mut Vec<Stmt>,
) -> CompileResult<()> {
    let [item] = items else {
        return Err(CompileError::multiple_scope_targets(&ctx.unit, items.len(), span));
    };
    let ExprKind::Call {
        func,
        args,
        keywords,
    } = &item.context.kind
    else {
        return Err(CompileError::scope_target_not_call(&ctx.unit, item.context.span));
    };
    let var = match &item.target {
        None => None,
        Some(target) => match target.as_name() {
            Some(name) => Some(name.clone()),
            None => return Err(CompileError::invalid_scope_variable(&ctx.unit, target.span)),
        },
    };

    let is_root = !frame.in_function
        && frame.current == Some(names::DOCUMENT)
        && func.as_name().is_some_and(|name| name == names::ELEMENT);
    if is_root {
        // The root arguments land on the unit's own fragment.
        let root = Expr::name(names::DOCUMENT, func.span);
        let call = transform_call(ctx, &root, args, keywords, item.context.span);
        if let Some(var) = &var {
            ctx.add_var(var.clone(), VarSource::ScopeTarget);
        }
        let current = var.as_deref().unwrap_or(names::DOCUMENT);
        let body = transform_body(
            ctx,
            body,
            Frame {
                current: Some(current),
                ..frame
            },
        )?;
        out.push(with_stmt(call, item.target.clone(), body, span));
        return Ok(());
    }

    let call = transform_expr(ctx, &item.context);
    let (name, synthesized) = match var {
        Some(var) => (var, false),
        None => (ctx.unique_name(&callee_label(func)), true),
    };
    let source = if synthesized {
        VarSource::Synthesized
    } else {
        VarSource::ScopeTarget
    };
    ctx.add_var(name.clone(), source);
    let body = transform_body(
        ctx,
        body,
        Frame {
            current: Some(name.as_str()),
            ..frame
        },
    )?;

    let target = Expr::name(name.clone(), span);
    out.push(with_stmt(call, Some(target.clone()), body, span));
    if let Some(current) = frame.current {
        out.push(append(current, target.clone(), span));
    }
    if synthesized {
        out.push(Stmt::new(StmtKind::Delete(vec![target]), span));
        ctx.remove_var(&name);
    }
    Ok(())
}

/// Label used in a synthesized block variable name.
fn callee_label(func: &Expr) -> SmolStr {
    let label = match &func.kind {
        ExprKind::Name(name) => name.clone(),
        ExprKind::Attribute { attr, .. } => attr.clone(),
        _ => SmolStr::new_static("el"),
    };
    let label = label.trim_matches('_');
    if label.is_empty() {
        SmolStr::new_static("el")
    } else {
        SmolStr::new(label)
    }
}

fn with_stmt(context: Expr, target: Option<Expr>, body: Vec<Stmt>, span: Span) -> Stmt {
    Stmt::new(
        StmtKind::With {
            items: vec![WithItem { context, target }],
            body,
        },
        span,
    )
}

/// Wrap an `if`/`for` in a function building a fresh fragment, appended once.
fn wrap_block(
    ctx: &mut CompileContext,
    stmt: &Stmt,
    current: &str,
    frame: Frame<'_>,
    out: &mut Vec<Stmt>,
) -> CompileResult<()> {
    let span = stmt.span;
    let id = ctx.next_id();
    let func = SmolStr::from(format!("__block_{}__", id));
    let el = SmolStr::from(format!("__block_{}_el__", id));

    let marker = ctx.enter_scope();
    let previous = ctx.enter_function(marker);
    ctx.add_var(el.clone(), VarSource::Synthesized);
    // The wrapper is a function: loops and returns outside it are unreachable.
    let inner = Frame {
        current: Some(el.as_str()),
        in_loop: false,
        in_block: true,
        ..frame
    };
    let result = transform_branches(ctx, stmt, inner);
    ctx.exit_function(previous);
    ctx.exit_scope(marker);
    let branches = result?;

    let fragment = Expr::call(
        Expr::name(names::ELEMENT, span),
        vec![Expr::constant(Constant::None, span)],
        span,
    );
    let body = vec![
        Stmt::assign(Expr::name(el.clone(), span), fragment, span),
        branches,
        Stmt::new(StmtKind::Return(Some(Expr::name(el, span))), span),
    ];
    out.push(Stmt::new(
        StmtKind::FunctionDef(Arc::new(FunctionDef {
            name: func.clone(),
            params: Vec::new(),
            body,
            span,
        })),
        span,
    ));
    let invoke = Expr::call(Expr::name(func, span), Vec::new(), span);
    out.push(append(current, invoke, span));
    Ok(())
}

/// Rewrite the bodies of an `if` or `for` against `frame`.
fn transform_branches(ctx: &mut CompileContext, stmt: &Stmt, frame: Frame<'_>) -> CompileResult<Stmt> {
    let kind = match &stmt.kind {
        StmtKind::If { test, body, orelse } => {
            let test = transform_expr(ctx, test);
            let body = transform_body(ctx, body, frame)?;
            let orelse = match orelse.as_slice() {
                [
                    nested @ Stmt {
                        kind: StmtKind::If { .. },
                        ..
                    },
                ] => vec![transform_branches(ctx, nested, frame)?],
                _ => transform_body(ctx, orelse, frame)?,
            };
            StmtKind::If { test, body, orelse }
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            let iter = transform_expr(ctx, iter);
            let target = transform_expr(ctx, target);
            ctx.add_target(&target, VarSource::Loop);
            let body = transform_body(
                ctx,
                body,
                Frame {
                    in_loop: true,
                    ..frame
                },
            )?;
            let orelse = transform_body(ctx, orelse, frame)?;
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            }
        }
        _ => return Ok(stmt.clone()),
    };
    Ok(Stmt::new(kind, stmt.span))
}

/// Author functions: only scope blocks are rewritten inside.
fn transform_def(ctx: &mut CompileContext, def: &FunctionDef, span: Span) -> CompileResult<Stmt> {
    let params = transform_params(ctx, &def.params);
    ctx.add_var(def.name.clone(), VarSource::Function);

    let marker = ctx.enter_scope();
    let previous = ctx.enter_function(marker);
    for param in &params {
        ctx.add_var(param.name.clone(), VarSource::Param);
    }
    let frame = Frame {
        current: None,
        in_function: true,
        in_loop: false,
        in_block: false,
    };
    let body = transform_body(ctx, &def.body, frame);
    ctx.exit_function(previous);
    ctx.exit_scope(marker);

    Ok(Stmt::new(
        StmtKind::FunctionDef(Arc::new(FunctionDef {
            name: def.name.clone(),
            params,
            body: body?,
            span: def.span,
        })),
        span,
    ))
}

fn transform_params(ctx: &mut CompileContext, params: &[Param]) -> Vec<Param> {
    params
        .iter()
        .map(|param| Param {
            name: param.name.clone(),
            default: param.default.as_ref().map(|d| transform_expr(ctx, d)),
        })
        .collect()
}

/// First writer wins: every bound name is assigned only if not yet global.
fn guarded_assign(
    ctx: &mut CompileContext,
    targets: Vec<Expr>,
    value: Expr,
    span: Span,
    out: &mut Vec<Stmt>,
) {
    if targets.len() == 1 {
        let target = &targets[0];
        if let Some(name) = target.as_name() {
            let name = name.clone();
            out.push(guard(&name, Stmt::assign(target.clone(), value, span), span));
            return;
        }
        if matches!(target.kind, ExprKind::Attribute { .. } | ExprKind::Subscript { .. }) {
            out.push(Stmt::new(StmtKind::Assign { targets, value }, span));
            return;
        }
    }

    let id = ctx.next_id();
    let unpack = Expr::name(format!("__unpack_{}__", id), span);
    let mut temps = vec![unpack.clone()];
    out.push(Stmt::assign(unpack.clone(), value, span));
    for target in targets {
        if let Some(name) = target.as_name().cloned() {
            out.push(guard(&name, Stmt::assign(target, unpack.clone(), span), span));
            continue;
        }
        match target.kind {
            ExprKind::Tuple(_) | ExprKind::List(_) => {
                let mut leaves = Vec::new();
                let renamed = rename_leaves(&target, id, &mut leaves);
                out.push(Stmt::assign(renamed, unpack.clone(), span));
                for (name, temp) in leaves {
                    let assign = Stmt::assign(Expr::name(name.clone(), span), temp.clone(), span);
                    out.push(guard(&name, assign, span));
                    temps.push(temp);
                }
            }
            _ => out.push(Stmt::assign(target, unpack.clone(), span)),
        }
    }
    out.push(Stmt::new(StmtKind::Delete(temps), span));
}

/// Replace each name in a destructuring target with a temporary.
fn rename_leaves(target: &Expr, id: u32, leaves: &mut Vec<(SmolStr, Expr)>) -> Expr {
    let kind = match &target.kind {
        ExprKind::Name(name) => {
            let temp = Expr::name(format!("__unpack_{}_{}__", id, leaves.len()), target.span);
            leaves.push((name.clone(), temp.clone()));
            return temp;
        }
        ExprKind::Tuple(items) => {
            ExprKind::Tuple(items.iter().map(|i| rename_leaves(i, id, leaves)).collect())
        }
        ExprKind::List(items) => {
            ExprKind::List(items.iter().map(|i| rename_leaves(i, id, leaves)).collect())
        }
        _ => return target.clone(),
    };
    Expr::new(kind, target.span)
}

/// `if "name" not in globals(): STMT`
fn guard(name: &str, stmt: Stmt, span: Span) -> Stmt {
    let globals = Expr::call(Expr::name(names::GLOBALS, span), Vec::new(), span);
    let test = Expr::new(
        ExprKind::Compare {
            left: Box::new(Expr::string(name, span)),
            ops: vec![CmpOp::NotIn],
            comparators: vec![globals],
        },
        span,
    );
    Stmt::new(
        StmtKind::If {
            test,
            body: vec![stmt],
            orelse: Vec::new(),
        },
        span,
    )
}

/// `current.append(value)`
fn append(current: &str, value: Expr, span: Span) -> Stmt {
    let method = Expr::attribute(Expr::name(current, span), names::APPEND, span);
    Stmt::expr(Expr::call(method, vec![value], span))
}

/// Wrap `expr` in a zero-argument lambda.
///
/// Function-local names it reads are bound as parameter defaults so each
/// loop iteration keeps its own values.
fn make_thunk(ctx: &CompileContext, expr: Expr) -> Expr {
    let span = expr.span;
    let params: Vec<Param> = free_names(&expr)
        .into_iter()
        .filter(|name| ctx.is_function_local(name))
        .map(|name| Param {
            default: Some(Expr::name(name.clone(), span)),
            name,
        })
        .collect();
    Expr::new(ExprKind::Lambda(Arc::new(Lambda { params, body: expr })), span)
}

fn transform_call(
    ctx: &mut CompileContext,
    func: &Expr,
    args: &[Expr],
    keywords: &[Keyword],
    span: Span,
) -> Expr {
    let builds = match func.as_name() {
        Some(name) => {
            if classify(name, ctx) == CallTarget::ImplicitTag {
                ctx.use_tag(name.clone());
            }
            ctx.builds_elements(name)
        }
        None => false,
    };
    let func = transform_expr(ctx, func);
    let args = args
        .iter()
        .map(|arg| {
            let arg = transform_expr(ctx, arg);
            if builds && is_deferrable(&arg) {
                make_thunk(ctx, arg)
            } else {
                arg
            }
        })
        .collect();
    let keywords = keywords
        .iter()
        .map(|kw| Keyword {
            name: kw.name.clone(),
            value: transform_expr(ctx, &kw.value),
        })
        .collect();
    Expr::new(
        ExprKind::Call {
            func: Box::new(func),
            args,
            keywords,
        },
        span,
    )
}

fn transform_exprs(ctx: &mut CompileContext, exprs: &[Expr]) -> Vec<Expr> {
    exprs.iter().map(|e| transform_expr(ctx, e)).collect()
}

fn transform_expr(ctx: &mut CompileContext, expr: &Expr) -> Expr {
    let span = expr.span;
    let kind = match &expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) => return expr.clone(),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => return transform_call(ctx, func, args, keywords, span),
        ExprKind::List(items) => ExprKind::List(transform_exprs(ctx, items)),
        ExprKind::Tuple(items) => ExprKind::Tuple(transform_exprs(ctx, items)),
        ExprKind::Dict(entries) => ExprKind::Dict(
            entries
                .iter()
                .map(|(k, v)| (transform_expr(ctx, k), transform_expr(ctx, v)))
                .collect(),
        ),
        ExprKind::Attribute { value, attr } => ExprKind::Attribute {
            value: Box::new(transform_expr(ctx, value)),
            attr: attr.clone(),
        },
        ExprKind::Subscript { value, index } => ExprKind::Subscript {
            value: Box::new(transform_expr(ctx, value)),
            index: Box::new(transform_expr(ctx, index)),
        },
        ExprKind::IfExp { test, body, orelse } => ExprKind::IfExp {
            test: Box::new(transform_expr(ctx, test)),
            body: Box::new(transform_expr(ctx, body)),
            orelse: Box::new(transform_expr(ctx, orelse)),
        },
        ExprKind::Generator(comp) => ExprKind::Generator(Arc::new(transform_comprehension(ctx, comp))),
        ExprKind::ListComp(comp) => ExprKind::ListComp(Arc::new(transform_comprehension(ctx, comp))),
        ExprKind::Lambda(lambda) => {
            let params = transform_params(ctx, &lambda.params);
            let marker = ctx.enter_scope();
            let previous = ctx.enter_function(marker);
            for param in &params {
                ctx.add_var(param.name.clone(), VarSource::Param);
            }
            let body = transform_expr(ctx, &lambda.body);
            ctx.exit_function(previous);
            ctx.exit_scope(marker);
            ExprKind::Lambda(Arc::new(Lambda { params, body }))
        }
        ExprKind::BoolOp { op, values } => ExprKind::BoolOp {
            op: *op,
            values: transform_exprs(ctx, values),
        },
        ExprKind::UnaryOp { op, operand } => ExprKind::UnaryOp {
            op: *op,
            operand: Box::new(transform_expr(ctx, operand)),
        },
        ExprKind::BinOp { left, op, right } => ExprKind::BinOp {
            left: Box::new(transform_expr(ctx, left)),
            op: *op,
            right: Box::new(transform_expr(ctx, right)),
        },
        ExprKind::Compare {
            left,
            ops,
            comparators,
        } => ExprKind::Compare {
            left: Box::new(transform_expr(ctx, left)),
            ops: ops.clone(),
            comparators: transform_exprs(ctx, comparators),
        },
    };
    Expr::new(kind, span)
}

fn transform_comprehension(ctx: &mut CompileContext, comp: &Comprehension) -> Comprehension {
    let marker = ctx.enter_scope();
    let clauses = comp
        .clauses
        .iter()
        .map(|clause| {
            let iter = transform_expr(ctx, &clause.iter);
            ctx.add_target(&clause.target, VarSource::Comprehension);
            let conditions = transform_exprs(ctx, &clause.conditions);
            ComprehensionClause {
                target: clause.target.clone(),
                iter,
                conditions,
            }
        })
        .collect();
    let element = transform_expr(ctx, &comp.element);
    ctx.exit_scope(marker);
    Comprehension { element, clauses }
}
