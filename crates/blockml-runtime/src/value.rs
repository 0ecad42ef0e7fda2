//! Runtime values.
//!
//! Mutable containers and elements are shared handles, so assignment aliases
//! rather than copies, as template authors expect.

use crate::builtins::Builtin;
use crate::error::{Result, RuntimeError};
use crate::interpreter::Interpreter;
use crate::scope::Scope;
use crate::unit::UnitResult;
use blockml_dom::{AttrValue, Element, TagBuilder};
use blockml_syntax::{Comprehension, FunctionDef, Lambda};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type Dict = IndexMap<Key, Value>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Pre-escaped text.
    Markup(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Element(Element),
    Builder(Arc<TagBuilder>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Generator(Rc<Generator>),
    Unit(Rc<UnitResult>),
    /// The `blockml` namespace.
    RuntimeModule,
}

/// A user function or lambda with its defining scope.
pub struct Function {
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    /// Evaluated when the function was defined.
    pub defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    pub closure: Rc<Scope>,
    pub interp: Rc<Interpreter>,
}

pub enum FunctionBody {
    Block(Arc<FunctionDef>),
    Expr(Arc<Lambda>),
}

/// `receiver.name`, ready to call.
pub struct BoundMethod {
    pub receiver: Value,
    pub name: SmolStr,
}

/// A comprehension evaluated each time it is iterated.
pub struct Generator {
    pub comp: Arc<Comprehension>,
    pub scope: Rc<Scope>,
    pub interp: Rc<Interpreter>,
}

/// Hashable dictionary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Tuple(Rc<[Key]>),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Key::Int(*f as i64),
            Value::Str(s) | Value::Markup(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                ))
                .into());
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value().repr() {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn markup(text: impl AsRef<str>) -> Value {
        Value::Markup(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn dict(entries: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Type name for diagnostic messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Markup(_) => "Markup",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Element(_) => "Element",
            Value::Builder(_) => "TagBuilder",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Method(_) => "method",
            Value::Generator(_) => "generator",
            Value::Unit(_) => "unit",
            Value::RuntimeModule => "module",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Markup(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Element(element) => !element.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Builder(_)
                | Value::Function(_)
                | Value::Builtin(_)
                | Value::Method(_)
                | Value::Element(_)
                | Value::Unit(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Markup(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, accepting booleans.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    /// Text as produced by `str()`.
    pub fn display(&self) -> Result<String> {
        Ok(match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) | Value::Markup(s) => s.to_string(),
            Value::Element(element) => {
                blockml_dom::render(element).map_err(crate::error::Error::from_render)?
            }
            Value::Unit(unit) => unit.render()?,
            _ => self.repr()?,
        })
    }

    /// Text as produced by `repr()`, used inside containers.
    pub fn repr(&self) -> Result<String> {
        Ok(match self {
            Value::Str(s) => quote(s),
            Value::Markup(s) => format!("Markup({})", quote(s)),
            Value::List(items) => format!("[{}]", repr_items(&items.borrow())?),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()?),
            Value::Tuple(items) => format!("({})", repr_items(items)?),
            Value::Dict(entries) => {
                let entries = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Ok(format!("{}: {}", k.to_value().repr()?, v.repr()?)))
                    .collect::<Result<Vec<_>>>()?;
                format!("{{{}}}", entries.join(", "))
            }
            Value::Element(element) => match element.tag() {
                Some(tag) => format!("<Element {}>", tag),
                None => "<Element fragment>".to_string(),
            },
            Value::Builder(builder) => format!("<tag builder {}>", builder.tag()),
            Value::Function(function) => format!("<function {}>", function.name),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Value::Method(method) => format!(
                "<method {}.{}>",
                method.receiver.type_name(),
                method.name
            ),
            Value::Generator(_) => "<generator>".to_string(),
            Value::Unit(unit) => format!("<unit {}>", unit.name()),
            Value::RuntimeModule => "<module blockml>".to_string(),
            other => other.display()?,
        })
    }

    /// Attribute value; `None` removes the attribute.
    pub fn to_attr(&self) -> Result<Option<AttrValue>> {
        Ok(match self {
            Value::None => None,
            Value::Bool(b) => Some(AttrValue::Bool(*b)),
            Value::List(items) => Some(AttrValue::Text(join_words(&items.borrow())?)),
            Value::Tuple(items) => Some(AttrValue::Text(join_words(items)?)),
            other => Some(AttrValue::Text(other.display()?)),
        })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

impl From<Element> for Value {
    fn from(element: Element) -> Self {
        Value::Element(element)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into).collect())
    }
}

/// Python-style float text: integral values keep a trailing `.0`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

fn repr_items(items: &[Value]) -> Result<String> {
    Ok(items
        .iter()
        .map(Value::repr)
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// `["a", None, "b"]` as an attribute is `"a b"`.
fn join_words(items: &[Value]) -> Result<String> {
    Ok(items
        .iter()
        .filter(|item| !matches!(item, Value::None | Value::Bool(false)))
        .map(Value::display)
        .collect::<Result<Vec<_>>>()?
        .join(" "))
}

/// Equality as `==` sees it.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x) | Value::Markup(x), Value::Str(y) | Value::Markup(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || items_equal(&x.borrow(), &y.borrow())
        }
        (Value::Tuple(x), Value::Tuple(y)) => items_equal(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::Element(x), Value::Element(y)) => x.ptr_eq(y),
        (Value::Builder(x), Value::Builder(y)) => x.tag() == y.tag(),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Unit(x), Value::Unit(y)) => Rc::ptr_eq(x, y),
        (Value::RuntimeModule, Value::RuntimeModule) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn items_equal(x: &[Value], y: &[Value]) -> bool {
    x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
}

/// Identity as `is` sees it.
pub fn values_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Element(x), Value::Element(y)) => x.ptr_eq(y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Unit(x), Value::Unit(y)) => Rc::ptr_eq(x, y),
        (Value::Builder(x), Value::Builder(y)) => Arc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::RuntimeModule, Value::RuntimeModule) => true,
        _ => false,
    }
}

/// Ordering for `<`, `sorted`, `min` and `max`.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Str(x) | Value::Markup(x), Value::Str(y) | Value::Markup(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => compare_items(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => compare_items(x, y),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                RuntimeError::value("cannot order NaN").into()
            }),
            _ => Err(RuntimeError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))
            .into()),
        },
    }
}

fn compare_items(x: &[Value], y: &[Value]) -> Result<Ordering> {
    for (a, b) in x.iter().zip(y) {
        if values_equal(a, b) {
            continue;
        }
        return compare_values(a, b);
    }
    Ok(x.len().cmp(&y.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_and_repr() {
        assert_eq!(Value::Float(3.0).display().unwrap(), "3.0");
        assert_eq!(Value::Float(0.25).display().unwrap(), "0.25");
        assert_eq!(Value::Bool(true).display().unwrap(), "True");
        let list = Value::from(vec![Value::Int(1), Value::str("a'b"), Value::None]);
        assert_eq!(list.display().unwrap(), "[1, \"a'b\", None]");
        assert_eq!(Value::tuple(vec![Value::str("x")]).repr().unwrap(), "('x',)");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::list(Vec::new()).is_truthy());
        let element = Element::with_tag("div");
        assert!(!Value::Element(element.clone()).is_truthy());
        element.append(Element::with_tag("p"));
        assert!(Value::Element(element).is_truthy());
    }

    #[test]
    fn test_equality_and_ordering() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(values_equal(
            &Value::from(vec![1i64, 2]),
            &Value::from(vec![1i64, 2])
        ));
        assert!(!values_identical(
            &Value::from(vec![1i64]),
            &Value::from(vec![1i64])
        ));
        assert_eq!(
            compare_values(&Value::str("a"), &Value::str("b")).unwrap(),
            Ordering::Less
        );
        assert!(compare_values(&Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(Value::None.to_attr().unwrap(), None);
        assert_eq!(
            Value::from(vec![Value::str("a"), Value::None, Value::str("b")])
                .to_attr()
                .unwrap(),
            Some(AttrValue::Text("a b".into()))
        );
        assert_eq!(
            Value::Int(3).to_attr().unwrap(),
            Some(AttrValue::Text("3".into()))
        );
    }

    #[test]
    fn test_keys() {
        let key = Key::from_value(&Value::tuple(vec![Value::Int(1), Value::str("a")])).unwrap();
        assert_eq!(key.to_string(), "(1, 'a')");
        assert!(Key::from_value(&Value::list(Vec::new())).is_err());
    }
}
