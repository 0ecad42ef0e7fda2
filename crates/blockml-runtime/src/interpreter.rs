//! Tree-walking evaluator for compiled programs.
//!
//! Each unit execution owns one [`Interpreter`]. Functions and generators keep
//! a handle to the interpreter that created them, so a function imported from
//! another unit still resolves names against that unit's globals.

use crate::builtins::Builtin;
use crate::engine::Engine;
use crate::error::{Error, Result, RuntimeError, RuntimeErrorKind};
use crate::methods;
use crate::scope::Scope;
use crate::unit::UnitResult;
use crate::value::{
    BoundMethod, Function, FunctionBody, Generator, Key, Value, compare_values, values_equal,
    values_identical,
};
use blockml_dom::{AttrValue, Child, Content, EmbeddedUnit, RenderError, escape_text};
use blockml_syntax::{
    BinOp, BoolOp, CmpOp, Comprehension, Constant, Expr, ExprKind, Module, Param, Stmt,
    StmtKind, UnaryOp,
};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use source_map::Span;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

/// Nested function calls allowed before a `RecursionError`.
pub const MAX_CALL_DEPTH: usize = 200;

/// Longest string or list that repetition and `range()` may build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Control flow out of a statement.
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Units imported during one top-level execution.
#[derive(Default)]
pub(crate) struct ImportState {
    loading: RefCell<Vec<SmolStr>>,
    loaded: RefCell<FxHashMap<SmolStr, Rc<UnitResult>>>,
}

impl ImportState {
    /// Mark `unit` as executing; fails when it is already on the import stack.
    pub(crate) fn enter(&self, unit: &str) -> Result<()> {
        let mut loading = self.loading.borrow_mut();
        if loading.iter().any(|name| name == unit) {
            let chain = loading
                .iter()
                .map(SmolStr::as_str)
                .chain(std::iter::once(unit))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(RuntimeError::import(format!("circular import: {}", chain)).into());
        }
        loading.push(SmolStr::new(unit));
        Ok(())
    }

    pub(crate) fn leave(&self) {
        self.loading.borrow_mut().pop();
    }
}

pub struct Interpreter {
    engine: Engine,
    unit: SmolStr,
    globals: Rc<Scope>,
    imports: Rc<ImportState>,
    depth: Cell<usize>,
}

impl Interpreter {
    pub(crate) fn new(
        engine: Engine,
        unit: impl Into<SmolStr>,
        globals: Rc<Scope>,
        imports: Rc<ImportState>,
    ) -> Rc<Self> {
        Rc::new(Self {
            engine,
            unit: unit.into(),
            globals,
            imports,
            depth: Cell::new(0),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    /// Execute a compiled program against the unit globals.
    pub(crate) fn run(self: &Rc<Self>, module: &Module) -> Result<()> {
        let globals = self.globals.clone();
        self.exec_block(&module.body, &globals)?;
        Ok(())
    }

    fn locate(&self, err: Error, span: Span) -> Error {
        match err {
            Error::Runtime(err) => Error::Runtime(err.at(&self.unit, span)),
            other => other,
        }
    }

    fn exec_block(self: &Rc<Self>, body: &[Stmt], scope: &Rc<Scope>) -> Result<Flow> {
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(self: &Rc<Self>, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow> {
        self.exec_inner(stmt, scope)
            .map_err(|err| self.locate(err, stmt.span))
    }

    fn exec_inner(self: &Rc<Self>, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target, scope)?;
                let value = self.eval(value, scope)?;
                let result = binary(*op, &current, &value)?;
                self.assign(target, result, scope)?;
            }
            StmtKind::With { items, body } => {
                for item in items {
                    let value = self.eval(&item.context, scope)?;
                    if let Some(target) = &item.target {
                        self.assign(target, value, scope)?;
                    }
                }
                return self.exec_block(body, scope);
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = self.iterate(&self.eval(iter, scope)?)?;
                for item in items {
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse, scope);
            }
            StmtKind::FunctionDef(def) => {
                let defaults = self.defaults(&def.params, scope)?;
                let function = Function {
                    name: def.name.clone(),
                    params: def.params.iter().map(|p| p.name.clone()).collect(),
                    defaults,
                    body: FunctionBody::Block(def.clone()),
                    closure: scope.clone(),
                    interp: self.clone(),
                };
                scope.set(def.name.clone(), Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(names) => {
                for alias in names {
                    let value = if alias.name == blockml_compiler::names::RUNTIME_MODULE {
                        Value::RuntimeModule
                    } else {
                        Value::Unit(self.import_unit(&alias.name)?)
                    };
                    scope.set(alias.binding(), value);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                if module == blockml_compiler::names::RUNTIME_MODULE {
                    for alias in names {
                        scope.set(alias.binding(), self.runtime_attr(&alias.name));
                    }
                } else {
                    let unit = self.import_unit(module)?;
                    for alias in names {
                        let value = unit.get(&alias.name).ok_or_else(|| {
                            RuntimeError::import(format!(
                                "cannot import name '{}' from '{}'",
                                alias.name, module
                            ))
                        })?;
                        scope.set(alias.binding(), value);
                    }
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn defaults(self: &Rc<Self>, params: &[Param], scope: &Rc<Scope>) -> Result<Vec<Option<Value>>> {
        params
            .iter()
            .map(|param| {
                param
                    .default
                    .as_ref()
                    .map(|default| self.eval(default, scope))
                    .transpose()
            })
            .collect()
    }

    fn import_unit(self: &Rc<Self>, name: &str) -> Result<Rc<UnitResult>> {
        if let Some(unit) = self.imports.loaded.borrow().get(name) {
            return Ok(unit.clone());
        }
        let compiled = self.engine.load(name)?;
        let result = Rc::new(compiled.execute(&self.engine, Vec::new(), self.imports.clone())?);
        self.imports
            .loaded
            .borrow_mut()
            .insert(SmolStr::new(name), result.clone());
        Ok(result)
    }

    /// A name exported by the `blockml` runtime module.
    pub(crate) fn runtime_attr(&self, name: &str) -> Value {
        match name {
            blockml_compiler::names::ELEMENT => Value::Builtin(Builtin::Element),
            "markup" => Value::Builtin(Builtin::Markup),
            _ => Value::Builder(self.engine.registry().builder(name)),
        }
    }

    fn assign(self: &Rc<Self>, target: &Expr, value: Value, scope: &Rc<Scope>) -> Result<()> {
        match &target.kind {
            ExprKind::Name(name) => scope.set(name.clone(), value),
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let items = self.iterate(&value)?;
                match items.len().cmp(&targets.len()) {
                    Ordering::Less => {
                        return Err(RuntimeError::value(format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ))
                        .into());
                    }
                    Ordering::Greater => {
                        return Err(RuntimeError::value(format!(
                            "too many values to unpack (expected {})",
                            targets.len()
                        ))
                        .into());
                    }
                    Ordering::Equal => {}
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                methods::set_attribute(&object, attr, value)?;
            }
            ExprKind::Subscript { value: object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                set_item(&object, &index, value)?;
            }
            _ => {
                return Err(RuntimeError::new(
                    "cannot assign to expression",
                    RuntimeErrorKind::Syntax,
                )
                .into());
            }
        }
        Ok(())
    }

    fn delete(self: &Rc<Self>, target: &Expr, scope: &Rc<Scope>) -> Result<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                if scope.remove(name).is_none() {
                    return Err(RuntimeError::name(name).into());
                }
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                del_item(&object, &index)?;
            }
            _ => {
                return Err(
                    RuntimeError::new("cannot delete expression", RuntimeErrorKind::Syntax).into(),
                );
            }
        }
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str, scope: &Scope) -> Result<Value> {
        if let Some(value) = scope.get(name) {
            return Ok(value);
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::name(name).into())
    }

    pub(crate) fn eval(self: &Rc<Self>, expr: &Expr, scope: &Rc<Scope>) -> Result<Value> {
        self.eval_inner(expr, scope)
            .map_err(|err| self.locate(err, expr.span))
    }

    fn eval_inner(self: &Rc<Self>, expr: &Expr, scope: &Rc<Scope>) -> Result<Value> {
        Ok(match &expr.kind {
            ExprKind::Name(name) => self.lookup(name, scope)?,
            ExprKind::Constant(constant) => match constant {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::str(s),
                Constant::Markup(s) => Value::markup(s),
            },
            ExprKind::List(items) => Value::list(self.eval_all(items, scope)?),
            ExprKind::Tuple(items) => Value::tuple(self.eval_all(items, scope)?),
            ExprKind::Dict(entries) => {
                let mut dict = crate::value::Dict::default();
                for (key, value) in entries {
                    let key = Key::from_value(&self.eval(key, scope)?)?;
                    dict.insert(key, self.eval(value, scope)?);
                }
                Value::dict(dict)
            }
            ExprKind::Attribute { value, attr } => {
                let value = self.eval(value, scope)?;
                methods::get_attribute(self, &value, attr)?
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                get_item(&value, &index)?
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let callee = self.eval(func, scope)?;
                let args = self.eval_all(args, scope)?;
                let kwargs = keywords
                    .iter()
                    .map(|kw| Ok((kw.name.clone(), self.eval(&kw.value, scope)?)))
                    .collect::<Result<Vec<_>>>()?;
                self.call(&callee, args, kwargs)?
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(body, scope)?
                } else {
                    self.eval(orelse, scope)?
                }
            }
            ExprKind::Generator(comp) => Value::Generator(Rc::new(Generator {
                comp: comp.clone(),
                scope: scope.clone(),
                interp: self.clone(),
            })),
            ExprKind::ListComp(comp) => Value::list(self.comprehension(comp, scope)?),
            ExprKind::Lambda(lambda) => {
                let defaults = self.defaults(&lambda.params, scope)?;
                Value::Function(Rc::new(Function {
                    name: SmolStr::new_static("<lambda>"),
                    params: lambda.params.iter().map(|p| p.name.clone()).collect(),
                    defaults,
                    body: FunctionBody::Expr(lambda.clone()),
                    closure: scope.clone(),
                    interp: self.clone(),
                }))
            }
            ExprKind::BoolOp { op, values } => {
                let mut result = Value::None;
                for value in values {
                    result = self.eval(value, scope)?;
                    let stop = match op {
                        BoolOp::And => !result.is_truthy(),
                        BoolOp::Or => result.is_truthy(),
                    };
                    if stop {
                        break;
                    }
                }
                result
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand, scope)?;
                unary(*op, &operand)?
            }
            ExprKind::BinOp { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right)?
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut left = self.eval(left, scope)?;
                for (op, right) in ops.iter().zip(comparators) {
                    let right = self.eval(right, scope)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
        })
    }

    fn eval_all(self: &Rc<Self>, items: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>> {
        items.iter().map(|item| self.eval(item, scope)).collect()
    }

    fn compare(self: &Rc<Self>, op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
        Ok(match op {
            CmpOp::Eq => values_equal(left, right),
            CmpOp::NotEq => !values_equal(left, right),
            CmpOp::Lt => compare_values(left, right)? == Ordering::Less,
            CmpOp::LtEq => compare_values(left, right)? != Ordering::Greater,
            CmpOp::Gt => compare_values(left, right)? == Ordering::Greater,
            CmpOp::GtEq => compare_values(left, right)? != Ordering::Less,
            CmpOp::In => self.contains(right, left)?,
            CmpOp::NotIn => !self.contains(right, left)?,
            CmpOp::Is => values_identical(left, right),
            CmpOp::IsNot => !values_identical(left, right),
        })
    }

    fn contains(self: &Rc<Self>, container: &Value, item: &Value) -> Result<bool> {
        match container {
            Value::Str(haystack) | Value::Markup(haystack) => match item.as_str() {
                Some(needle) => Ok(haystack.contains(needle)),
                None => Err(RuntimeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.type_name()
                ))
                .into()),
            },
            Value::Dict(entries) => Ok(entries.borrow().contains_key(&Key::from_value(item)?)),
            other => Ok(self
                .iterate(other)?
                .iter()
                .any(|candidate| values_equal(candidate, item))),
        }
    }

    /// Evaluate a comprehension's elements in order.
    pub(crate) fn comprehension(
        self: &Rc<Self>,
        comp: &Comprehension,
        scope: &Rc<Scope>,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        self.comprehension_clause(comp, 0, scope, &mut out)?;
        Ok(out)
    }

    fn comprehension_clause(
        self: &Rc<Self>,
        comp: &Comprehension,
        index: usize,
        scope: &Rc<Scope>,
        out: &mut Vec<Value>,
    ) -> Result<()> {
        let Some(clause) = comp.clauses.get(index) else {
            out.push(self.eval(&comp.element, scope)?);
            return Ok(());
        };
        for item in self.iterate(&self.eval(&clause.iter, scope)?)? {
            // Fresh frame per iteration so lambdas in the element capture this item.
            let inner = Scope::child(scope);
            self.assign(&clause.target, item, &inner)?;
            let mut keep = true;
            for condition in &clause.conditions {
                if !self.eval(condition, &inner)?.is_truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.comprehension_clause(comp, index + 1, &inner, out)?;
            }
        }
        Ok(())
    }

    /// Materialize an iterable value.
    pub(crate) fn iterate(self: &Rc<Self>, value: &Value) -> Result<Vec<Value>> {
        Ok(match value {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Dict(entries) => entries.borrow().keys().map(Key::to_value).collect(),
            Value::Generator(generator) => {
                generator
                    .interp
                    .comprehension(&generator.comp, &generator.scope)?
            }
            Value::Element(element) => element
                .flatten()
                .map_err(Error::from_render)?
                .into_iter()
                .map(Value::Element)
                .collect(),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                ))
                .into());
            }
        })
    }

    /// Call any callable value.
    pub(crate) fn call(
        self: &Rc<Self>,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(SmolStr, Value)>,
    ) -> Result<Value> {
        match callee {
            Value::Function(function) => function.interp.call_function(function, args, kwargs),
            Value::Builtin(builtin) => builtin.call(self, args, kwargs),
            Value::Method(method) => {
                methods::call_method(self, &method.receiver, &method.name, args, kwargs)
            }
            Value::Builder(builder) => {
                let (content, attrs) = self.element_args(args, kwargs)?;
                Ok(Value::Element(builder.build(content, attrs)))
            }
            Value::Element(element) => {
                let (content, attrs) = self.element_args(args, kwargs)?;
                Ok(Value::Element(element.call(content, attrs)))
            }
            Value::Unit(unit) => {
                if !args.is_empty() {
                    return Err(RuntimeError::type_error(
                        "units accept keyword overrides only",
                    )
                    .into());
                }
                Ok(Value::Unit(Rc::new(unit.call(kwargs)?)))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }

    fn call_function(
        self: &Rc<Self>,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(SmolStr, Value)>,
    ) -> Result<Value> {
        let scope = Scope::child(&function.closure);
        bind_params(function, args, kwargs, &scope)?;

        let depth = self.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new(
                "maximum recursion depth exceeded",
                RuntimeErrorKind::Recursion,
            )
            .into());
        }
        self.depth.set(depth + 1);
        let result = match &function.body {
            FunctionBody::Block(def) => match self.exec_block(&def.body, &scope) {
                Ok(Flow::Return(value)) => Ok(value),
                Ok(Flow::Normal) => Ok(Value::None),
                Ok(Flow::Break | Flow::Continue) => Err(RuntimeError::new(
                    format!("loop control escaped the body of {}()", function.name),
                    RuntimeErrorKind::Syntax,
                )
                .into()),
                Err(err) => Err(err),
            },
            FunctionBody::Expr(lambda) => self.eval(&lambda.body, &scope),
        };
        self.depth.set(depth);
        result
    }

    /// Split call arguments into element content and attributes.
    pub(crate) fn element_args(
        self: &Rc<Self>,
        args: Vec<Value>,
        kwargs: Vec<(SmolStr, Value)>,
    ) -> Result<(Vec<Content>, Vec<(SmolStr, Option<AttrValue>)>)> {
        let content = args
            .iter()
            .map(|arg| self.to_content(arg))
            .collect::<Result<Vec<_>>>()?;
        let attrs = kwargs
            .into_iter()
            .map(|(name, value)| Ok((name, value.to_attr()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok((content, attrs))
    }

    /// How a value is appended to an element.
    pub(crate) fn to_content(self: &Rc<Self>, value: &Value) -> Result<Content> {
        Ok(match value {
            Value::None => Content::Many(Vec::new()),
            Value::Str(s) => Content::Text(s.to_string()),
            Value::Markup(s) => Content::Markup(s.to_string()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => Content::Text(value.display()?),
            Value::List(items) => Content::Many(
                items
                    .borrow()
                    .iter()
                    .map(|item| self.to_content(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Tuple(items) => Content::Many(
                items
                    .iter()
                    .map(|item| self.to_content(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Element(element) => Content::Child(Child::Element(element.clone())),
            Value::Unit(unit) => Content::Child(Child::Unit(unit.clone() as Rc<dyn EmbeddedUnit>)),
            Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Builder(_) => {
                let interp = self.clone();
                let callee = value.clone();
                Content::Child(Child::deferred(move || {
                    let result = interp.call(&callee, Vec::new(), Vec::new())?;
                    Ok(interp.to_child(&result)?)
                }))
            }
            Value::Generator(_) => {
                let interp = self.clone();
                let generator = value.clone();
                Content::Child(Child::deferred(move || {
                    let items = interp.iterate(&generator)?;
                    let children = items
                        .iter()
                        .map(|item| interp.to_child(item))
                        .collect::<Result<Vec<_>>>()?;
                    Ok::<_, RenderError>(Child::Sequence(children))
                }))
            }
            Value::Dict(_) | Value::RuntimeModule => {
                return Err(RuntimeError::type_error(format!(
                    "cannot append '{}' to an element",
                    value.type_name()
                ))
                .into());
            }
        })
    }

    /// A value as one child-slot entry; text is escaped where it lands.
    pub(crate) fn to_child(self: &Rc<Self>, value: &Value) -> Result<Child> {
        Ok(content_to_child(self.to_content(value)?))
    }
}

fn content_to_child(content: Content) -> Child {
    match content {
        Content::Text(text) => Child::text(&text),
        Content::Markup(markup) => Child::Element(blockml_dom::Element::from_markup(markup)),
        Content::Child(child) => child,
        Content::Many(items) => Child::Sequence(items.into_iter().map(content_to_child).collect()),
    }
}

fn bind_params(
    function: &Function,
    args: Vec<Value>,
    kwargs: Vec<(SmolStr, Value)>,
    scope: &Scope,
) -> Result<()> {
    let params = &function.params;
    if args.len() > params.len() {
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            function.name,
            params.len(),
            args.len()
        ))
        .into());
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    for (name, value) in kwargs {
        let Some(index) = params.iter().position(|param| *param == name) else {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                function.name, name
            ))
            .into());
        };
        if slots[index].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                function.name, name
            ))
            .into());
        }
        slots[index] = Some(value);
    }
    for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => scope.set(param.clone(), value),
            None => {
                return Err(RuntimeError::type_error(format!(
                    "{}() missing required argument '{}'",
                    function.name, param
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
    Ok(match (op, operand) {
        (UnaryOp::Not, value) => Value::Bool(!value.is_truthy()),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Pos, Value::Float(f)) => Value::Float(*f),
        (op, value) => match value.as_int() {
            Some(i) if op == UnaryOp::Neg => Value::Int(i.checked_neg().ok_or_else(overflow)?),
            Some(i) => Value::Int(i),
            None => {
                let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
                return Err(RuntimeError::type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    symbol,
                    value.type_name()
                ))
                .into());
            }
        },
    })
}

fn overflow() -> RuntimeError {
    RuntimeError::value("integer overflow")
}

pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    let unsupported = || -> Error {
        RuntimeError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.as_str(),
            left.type_name(),
            right.type_name()
        ))
        .into()
    };

    let result = match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::str(format!("{}{}", a, b)),
        (BinOp::Add, Value::Markup(a), Value::Markup(b)) => Value::markup(format!("{}{}", a, b)),
        (BinOp::Add, Value::Markup(a), Value::Str(b)) => {
            Value::markup(format!("{}{}", a, escape_text(b)))
        }
        (BinOp::Add, Value::Str(a), Value::Markup(b)) => {
            Value::markup(format!("{}{}", escape_text(a), b))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Value::list(items)
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Value::tuple(a.iter().chain(b.iter()).cloned().collect())
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s))
            if n.as_int().is_some() =>
        {
            let count = repeat_count(s.len(), n)?;
            Value::str(s.repeat(count))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(items.len(), n)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Value::list(out)
        }
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => int_binary(op, a, b)?,
            _ => match (left.as_float(), right.as_float()) {
                (Some(a), Some(b)) => float_binary(op, a, b)?,
                _ => return Err(unsupported()),
            },
        },
    };
    Ok(result)
}

/// Times a sequence of `len` items may be repeated by `n`.
fn repeat_count(len: usize, n: &Value) -> Result<usize> {
    let count = usize::try_from(n.as_int().unwrap_or(0).max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(count),
        _ => Err(RuntimeError::value("repeated sequence is too long").into()),
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value> {
    Ok(match op {
        BinOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinOp::Div => return float_binary(op, a as f64, b as f64),
        BinOp::FloorDiv | BinOp::Mod if b == 0 => {
            return Err(RuntimeError::zero_division().into());
        }
        BinOp::FloorDiv => {
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Value::Int(quotient - 1)
            } else {
                Value::Int(quotient)
            }
        }
        BinOp::Mod => {
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                Value::Int(remainder + b)
            } else {
                Value::Int(remainder)
            }
        }
    })
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value> {
    if b == 0.0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        return Err(RuntimeError::zero_division().into());
    }
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
    }))
}

fn normalize_index(index: &Value, len: usize) -> Result<usize> {
    let Some(raw) = index.as_int() else {
        return Err(RuntimeError::type_error(format!(
            "indices must be integers, not {}",
            index.type_name()
        ))
        .into());
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuntimeError::index("index out of range").into());
    }
    Ok(resolved as usize)
}

fn get_item(value: &Value, index: &Value) -> Result<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[normalize_index(index, items.len())?].clone())
        }
        Value::Tuple(items) => Ok(items[normalize_index(index, items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let c = chars[normalize_index(index, chars.len())?];
            Ok(Value::str(c.to_string()))
        }
        Value::Dict(entries) => {
            let key = Key::from_value(index)?;
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::key(&key).into())
        }
        Value::Element(element) if matches!(index, Value::Int(_)) => {
            let children = element.children();
            Ok(match &children[normalize_index(index, children.len())?] {
                Child::Element(child) => Value::Element(child.clone()),
                other => {
                    let fragment = blockml_dom::Element::fragment();
                    fragment.append(other.clone());
                    Value::Element(fragment)
                }
            })
        }
        Value::Element(element) => {
            let name = index.display()?;
            Ok(match element.get(&name) {
                Some(AttrValue::Text(text)) => Value::str(text),
                Some(AttrValue::Bool(b)) => Value::Bool(b),
                None => Value::None,
            })
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))
        .into()),
    }
}

fn set_item(value: &Value, index: &Value, item: Value) -> Result<()> {
    match value {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let slot = normalize_index(index, items.len())?;
            items[slot] = item;
        }
        Value::Dict(entries) => {
            entries.borrow_mut().insert(Key::from_value(index)?, item);
        }
        Value::Element(_) if matches!(index, Value::Int(_)) => {
            return Err(RuntimeError::type_error(
                "element children do not support item assignment",
            )
            .into());
        }
        Value::Element(element) => element.set_attr(&index.display()?, item.to_attr()?),
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))
            .into());
        }
    }
    Ok(())
}

fn del_item(value: &Value, index: &Value) -> Result<()> {
    match value {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let slot = normalize_index(index, items.len())?;
            items.remove(slot);
        }
        Value::Dict(entries) => {
            let key = Key::from_value(index)?;
            if entries.borrow_mut().shift_remove(&key).is_none() {
                return Err(RuntimeError::key(&key).into());
            }
        }
        Value::Element(element) => element.set_attr(&index.display()?, None),
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))
            .into());
        }
    }
    Ok(())
}

/// Wrap a value as a bound method when `name` is one of its methods.
pub(crate) fn bind_method(receiver: &Value, name: &str) -> Option<Value> {
    methods::has_method(receiver, name).then(|| {
        Value::Method(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            name: SmolStr::new(name),
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval_source(expr: &str) -> Result<Value> {
        let engine = Engine::new();
        let interp = Interpreter::new(engine, "test", Scope::root(), Rc::default());
        let expr = blockml_syntax::parse_expression(expr).unwrap();
        let globals = interp.globals().clone();
        interp.eval(&expr, &globals)
    }

    fn display(expr: &str) -> String {
        eval_source(expr).unwrap().display().unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(display("1 + 2 * 3"), "7");
        assert_eq!(display("7 // 2"), "3");
        assert_eq!(display("-7 // 2"), "-4");
        assert_eq!(display("-7 % 3"), "2");
        assert_eq!(display("7 / 2"), "3.5");
        assert_eq!(display("'ab' * 2"), "abab");
        assert_eq!(display("[1] + [2]"), "[1, 2]");
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval_source("1 // 0").unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError {
                kind: RuntimeErrorKind::ZeroDivision,
                ..
            })
        ));
    }

    #[test]
    fn test_comparisons_and_boolean_ops() {
        assert_eq!(display("1 < 2 <= 2"), "True");
        assert_eq!(display("1 < 2 > 3"), "False");
        assert_eq!(display("'a' in 'cat'"), "True");
        assert_eq!(display("3 not in [1, 2]"), "True");
        assert_eq!(display("None is None"), "True");
        assert_eq!(display("0 or 'x'"), "x");
        assert_eq!(display("1 and 0"), "0");
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(display("[x * x for x in range(4) if x]"), "[1, 4, 9]");
        assert_eq!(
            display("[(a, b) for a in 'ab' for b in [1, 2]]"),
            "[('a', 1), ('a', 2), ('b', 1), ('b', 2)]"
        );
        assert_eq!(display("list(x for x in [3, 4])"), "[3, 4]");
    }

    #[test]
    fn test_lambda_defaults_capture() {
        assert_eq!(
            display("[f() for f in [(lambda i=i: i * 10) for i in range(3)]]"),
            "[0, 10, 20]"
        );
    }

    #[test]
    fn test_undefined_name_is_located() {
        let err = eval_source("1 + missing").unwrap_err();
        let Error::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.kind, RuntimeErrorKind::Name);
        assert_eq!(err.unit.as_deref(), Some("test"));
        assert_eq!(err.span, Some(Span::new(4, 11)));
    }

    #[test]
    fn test_subscripts() {
        assert_eq!(display("[1, 2, 3][-1]"), "3");
        assert_eq!(display("{'a': 1}['a']"), "1");
        assert_eq!(display("'abc'[1]"), "b");
        assert!(eval_source("[1][5]").is_err());
        assert!(eval_source("{'a': 1}['b']").is_err());
    }

    #[test]
    fn test_repetition_is_bounded() {
        assert_eq!(display("3 * 'x'"), "xxx");
        assert_eq!(display("[1] * -3"), "[]");
        let err = eval_source("'ab' * 9223372036854775807").unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError {
                kind: RuntimeErrorKind::Value,
                ..
            })
        ));
        assert!(eval_source("[1, 2] * 4611686018427387904").is_err());
    }
}
