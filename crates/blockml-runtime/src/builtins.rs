//! Host builtins available to every unit.

use crate::error::{Error, Result, RuntimeError};
use crate::interpreter::{Interpreter, MAX_SEQUENCE_LEN, binary};
use crate::value::{Dict, Key, Value, compare_values, format_float};
use blockml_dom::Element;
use blockml_syntax::BinOp;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Element,
    Abs,
    All,
    Any,
    Bool,
    Dict,
    Enumerate,
    Float,
    Globals,
    Int,
    Len,
    List,
    Markup,
    Max,
    Min,
    Print,
    Range,
    Reversed,
    Sorted,
    Str,
    Sum,
    Tuple,
    Zip,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Element" => Self::Element,
            "abs" => Self::Abs,
            "all" => Self::All,
            "any" => Self::Any,
            "bool" => Self::Bool,
            "dict" => Self::Dict,
            "enumerate" => Self::Enumerate,
            "float" => Self::Float,
            "globals" => Self::Globals,
            "int" => Self::Int,
            "len" => Self::Len,
            "list" => Self::List,
            "markup" => Self::Markup,
            "max" => Self::Max,
            "min" => Self::Min,
            "print" => Self::Print,
            "range" => Self::Range,
            "reversed" => Self::Reversed,
            "sorted" => Self::Sorted,
            "str" => Self::Str,
            "sum" => Self::Sum,
            "tuple" => Self::Tuple,
            "zip" => Self::Zip,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Element => "Element",
            Self::Abs => "abs",
            Self::All => "all",
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Dict => "dict",
            Self::Enumerate => "enumerate",
            Self::Float => "float",
            Self::Globals => "globals",
            Self::Int => "int",
            Self::Len => "len",
            Self::List => "list",
            Self::Markup => "markup",
            Self::Max => "max",
            Self::Min => "min",
            Self::Print => "print",
            Self::Range => "range",
            Self::Reversed => "reversed",
            Self::Sorted => "sorted",
            Self::Str => "str",
            Self::Sum => "sum",
            Self::Tuple => "tuple",
            Self::Zip => "zip",
        }
    }

    pub(crate) fn call(
        self,
        interp: &Rc<Interpreter>,
        args: Vec<Value>,
        kwargs: Vec<(SmolStr, Value)>,
    ) -> Result<Value> {
        let mut args = Args::new(self.name(), args, kwargs);
        match self {
            Self::Element => {
                let tag = match args.keyword("tag") {
                    Some(tag) => tag,
                    None if args.positional.is_empty() => Value::None,
                    None => args.positional.remove(0),
                };
                let tag = match tag {
                    Value::None => None,
                    Value::Str(tag) => Some(tag),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "Element() tag must be a string or None, not {}",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                let (content, attrs) = interp.element_args(args.positional, args.keywords)?;
                Ok(Value::Element(Element::build(tag.as_deref(), content, attrs)))
            }
            Self::Abs => {
                args.finish(1, 1)?;
                match &args.positional[0] {
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    value => match value.as_int() {
                        Some(i) => Ok(Value::Int(i.checked_abs().ok_or_else(|| {
                            RuntimeError::value("integer overflow")
                        })?)),
                        None => Err(args.bad_type(value)),
                    },
                }
            }
            Self::All | Self::Any => {
                args.finish(1, 1)?;
                let items = interp.iterate(&args.positional[0])?;
                Ok(Value::Bool(if self == Self::All {
                    items.iter().all(Value::is_truthy)
                } else {
                    items.iter().any(Value::is_truthy)
                }))
            }
            Self::Bool => {
                args.finish(0, 1)?;
                Ok(Value::Bool(
                    args.positional.first().is_some_and(Value::is_truthy),
                ))
            }
            Self::Dict => {
                let mut dict = Dict::default();
                if let Some(source) = args.positional.first() {
                    match source {
                        Value::Dict(entries) => dict.extend(
                            entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())),
                        ),
                        other => {
                            for pair in interp.iterate(other)? {
                                let pair = interp.iterate(&pair)?;
                                let [key, value] = <[Value; 2]>::try_from(pair).map_err(|_| {
                                    RuntimeError::value(
                                        "dictionary update sequence element has wrong length",
                                    )
                                })?;
                                dict.insert(Key::from_value(&key)?, value);
                            }
                        }
                    }
                }
                args.expect_positional(0, 1)?;
                for (name, value) in std::mem::take(&mut args.keywords) {
                    dict.insert(Key::Str(Rc::from(name.as_str())), value);
                }
                Ok(Value::dict(dict))
            }
            Self::Enumerate => {
                let start = args.keyword("start");
                args.finish(1, 2)?;
                let start = match start.as_ref().or(args.positional.get(1)) {
                    Some(value) => value.as_int().ok_or_else(|| args.bad_type(value))?,
                    None => 0,
                };
                let items = interp.iterate(&args.positional[0])?;
                Ok(Value::list(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| Value::tuple(vec![Value::Int(start + i as i64), item]))
                        .collect(),
                ))
            }
            Self::Float => {
                args.finish(0, 1)?;
                Ok(Value::Float(match args.positional.first() {
                    None => 0.0,
                    Some(Value::Str(s)) => s.trim().parse::<f64>().map_err(|_| {
                        RuntimeError::value(format!("could not convert string to float: '{}'", s))
                    })?,
                    Some(value) => value.as_float().ok_or_else(|| args.bad_type(value))?,
                }))
            }
            Self::Globals => {
                args.finish(0, 0)?;
                let dict = interp
                    .globals()
                    .snapshot()
                    .into_iter()
                    .map(|(name, value)| (Key::Str(Rc::from(name.as_str())), value))
                    .collect();
                Ok(Value::dict(dict))
            }
            Self::Int => {
                args.finish(0, 1)?;
                Ok(Value::Int(match args.positional.first() {
                    None => 0,
                    Some(Value::Float(f)) if f.is_finite() => f.trunc() as i64,
                    Some(Value::Str(s)) => s.trim().parse::<i64>().map_err(|_| {
                        RuntimeError::value(format!(
                            "invalid literal for int() with base 10: '{}'",
                            s
                        ))
                    })?,
                    Some(value) => value.as_int().ok_or_else(|| args.bad_type(value))?,
                }))
            }
            Self::Len => {
                args.finish(1, 1)?;
                let len = match &args.positional[0] {
                    Value::Str(s) | Value::Markup(s) => s.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    Value::Tuple(items) => items.len(),
                    Value::Dict(entries) => entries.borrow().len(),
                    Value::Element(element) => element.len(),
                    value => return Err(args.bad_type(value)),
                };
                Ok(Value::Int(len as i64))
            }
            Self::List | Self::Tuple => {
                args.finish(0, 1)?;
                let items = match args.positional.first() {
                    Some(value) => interp.iterate(value)?,
                    None => Vec::new(),
                };
                Ok(if self == Self::List {
                    Value::list(items)
                } else {
                    Value::tuple(items)
                })
            }
            Self::Markup => {
                args.finish(0, 1)?;
                Ok(match args.positional.first() {
                    None => Value::markup(""),
                    Some(Value::Markup(text)) => Value::Markup(text.clone()),
                    Some(value) => Value::markup(value.display()?),
                })
            }
            Self::Max | Self::Min => {
                let key = args.keyword("key");
                let default = args.keyword("default");
                args.expect_keywords()?;
                let items = match args.positional.len() {
                    0 => return Err(args.arity(1, usize::MAX)),
                    1 => interp.iterate(&args.positional[0])?,
                    _ => std::mem::take(&mut args.positional),
                };
                let wanted = if self == Self::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                let mut best: Option<(Value, Value)> = None;
                for item in items {
                    let rank = rank(interp, key.as_ref(), &item)?;
                    let better = match &best {
                        None => true,
                        Some((best_rank, _)) => compare_values(&rank, best_rank)? == wanted,
                    };
                    if better {
                        best = Some((rank, item));
                    }
                }
                match (best, default) {
                    (Some((_, item)), _) => Ok(item),
                    (None, Some(default)) => Ok(default),
                    (None, None) => Err(RuntimeError::value(format!(
                        "{}() arg is an empty sequence",
                        self.name()
                    ))
                    .into()),
                }
            }
            Self::Print => {
                let sep = args.keyword("sep");
                let end = args.keyword("end");
                args.expect_keywords()?;
                let sep = sep.map(|s| s.display()).transpose()?;
                let end = end.map(|s| s.display()).transpose()?;
                let parts = args
                    .positional
                    .iter()
                    .map(Value::display)
                    .collect::<Result<Vec<_>>>()?;
                let mut stdout = std::io::stdout().lock();
                write!(
                    stdout,
                    "{}{}",
                    parts.join(sep.as_deref().unwrap_or(" ")),
                    end.as_deref().unwrap_or("\n")
                )
                .map_err(|err| Error::io("<stdout>", err))?;
                Ok(Value::None)
            }
            Self::Range => {
                args.finish(1, 3)?;
                let mut bounds = Vec::with_capacity(3);
                for value in &args.positional {
                    bounds.push(value.as_int().ok_or_else(|| args.bad_type(value))?);
                }
                let (start, stop, step) = match bounds.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(args.arity(1, 3)),
                };
                if step == 0 {
                    return Err(RuntimeError::value("range() arg 3 must not be zero").into());
                }
                let mut items = Vec::new();
                let mut current = Some(start);
                while let Some(value) = current {
                    if !((step > 0 && value < stop) || (step < 0 && value > stop)) {
                        break;
                    }
                    if items.len() == MAX_SEQUENCE_LEN {
                        return Err(RuntimeError::value("range() is too long").into());
                    }
                    items.push(Value::Int(value));
                    current = value.checked_add(step);
                }
                Ok(Value::list(items))
            }
            Self::Reversed => {
                args.finish(1, 1)?;
                let mut items = interp.iterate(&args.positional[0])?;
                items.reverse();
                Ok(Value::list(items))
            }
            Self::Sorted => {
                let key = args.keyword("key");
                let reverse = args.keyword("reverse").is_some_and(|r| r.is_truthy());
                args.finish(1, 1)?;
                let items = interp.iterate(&args.positional[0])?;
                let mut ranked = items
                    .into_iter()
                    .map(|item| Ok((rank(interp, key.as_ref(), &item)?, item)))
                    .collect::<Result<Vec<_>>>()?;
                let mut failure = None;
                ranked.sort_by(|(a, _), (b, _)| match compare_values(a, b) {
                    Ok(ordering) => ordering,
                    Err(err) => {
                        failure.get_or_insert(err);
                        Ordering::Equal
                    }
                });
                if let Some(err) = failure {
                    return Err(err);
                }
                if reverse {
                    ranked.reverse();
                }
                Ok(Value::list(ranked.into_iter().map(|(_, item)| item).collect()))
            }
            Self::Str => {
                args.finish(0, 1)?;
                Ok(match args.positional.first() {
                    None => Value::str(""),
                    Some(value) => Value::str(value.display()?),
                })
            }
            Self::Sum => {
                let start = args.keyword("start");
                args.finish(1, 2)?;
                let mut total = start
                    .or_else(|| args.positional.get(1).cloned())
                    .unwrap_or(Value::Int(0));
                for item in interp.iterate(&args.positional[0])? {
                    total = binary(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            Self::Zip => {
                args.expect_keywords()?;
                let columns = args
                    .positional
                    .iter()
                    .map(|value| interp.iterate(value))
                    .collect::<Result<Vec<_>>>()?;
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Value::list(
                    (0..rows)
                        .map(|row| {
                            Value::tuple(columns.iter().map(|column| column[row].clone()).collect())
                        })
                        .collect(),
                ))
            }
        }
    }
}

/// Sort/compare key for `item`.
fn rank(interp: &Rc<Interpreter>, key: Option<&Value>, item: &Value) -> Result<Value> {
    match key {
        None | Some(Value::None) => Ok(item.clone()),
        Some(key) => interp.call(key, vec![item.clone()], Vec::new()),
    }
}

/// Arguments of a builtin or method call.
pub(crate) struct Args {
    name: &'static str,
    pub(crate) positional: Vec<Value>,
    pub(crate) keywords: Vec<(SmolStr, Value)>,
}

impl Args {
    pub(crate) fn new(
        name: &'static str,
        positional: Vec<Value>,
        keywords: Vec<(SmolStr, Value)>,
    ) -> Self {
        Self {
            name,
            positional,
            keywords,
        }
    }

    /// Take the keyword argument `name`, if given.
    pub(crate) fn keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    pub(crate) fn expect_keywords(&self) -> Result<()> {
        match self.keywords.first() {
            Some((name, _)) => Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.name, name
            ))
            .into()),
            None => Ok(()),
        }
    }

    pub(crate) fn expect_positional(&self, min: usize, max: usize) -> Result<()> {
        if self.positional.len() < min || self.positional.len() > max {
            return Err(self.arity(min, max));
        }
        Ok(())
    }

    /// No keywords left and `min..=max` positional arguments.
    pub(crate) fn finish(&self, min: usize, max: usize) -> Result<()> {
        self.expect_keywords()?;
        self.expect_positional(min, max)
    }

    pub(crate) fn arity(&self, min: usize, max: usize) -> Error {
        let expected = if min == max {
            format!("exactly {}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("from {} to {}", min, max)
        };
        RuntimeError::type_error(format!(
            "{}() takes {} arguments ({} given)",
            self.name,
            expected,
            self.positional.len()
        ))
        .into()
    }

    pub(crate) fn bad_type(&self, value: &Value) -> Error {
        RuntimeError::type_error(format!(
            "{}() got an argument of unsupported type '{}'",
            self.name,
            value.type_name()
        ))
        .into()
    }

    pub(crate) fn text(&self, index: usize) -> Result<String> {
        match self.positional.get(index) {
            Some(Value::Str(s)) | Some(Value::Markup(s)) => Ok(s.to_string()),
            Some(value) => Err(self.bad_type(value)),
            None => Err(self.arity(index + 1, index + 1)),
        }
    }
}

/// `str.format` with `{}`, `{0}`, `{name}`, `{:.2f}` and doubled braces.
pub(crate) fn format_string(
    template: &str,
    positional: &[Value],
    keywords: &[(SmolStr, Value)],
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(RuntimeError::value(
                                "single '{' encountered in format string",
                            )
                            .into());
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (field.as_str(), None),
                };
                let value = if name.is_empty() {
                    let value = positional.get(auto_index);
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    positional.get(index)
                } else {
                    keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
                };
                let Some(value) = value else {
                    return Err(RuntimeError::key(format!("'{}'", name)).into());
                };
                out.push_str(&format_field(value, spec)?);
            }
            '}' => {
                return Err(
                    RuntimeError::value("single '}' encountered in format string").into(),
                );
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn format_field(value: &Value, spec: Option<&str>) -> Result<String> {
    let Some(spec) = spec.filter(|spec| !spec.is_empty()) else {
        return value.display();
    };
    let precision = spec
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix('f'))
        .and_then(|digits| digits.parse::<usize>().ok());
    match (precision, value.as_float()) {
        (Some(precision), Some(f)) => Ok(format!("{:.*}", precision, f)),
        (None, Some(f)) if spec == "f" => Ok(format!("{:.6}", f)),
        (None, Some(_)) if spec == "d" => match value.as_int() {
            Some(i) => Ok(i.to_string()),
            None => Ok(format_float(value.as_float().unwrap_or_default())),
        },
        _ => Err(RuntimeError::value(format!("unsupported format spec '{}'", spec)).into()),
    }
}
