//! Attribute access and methods on runtime values.

use crate::builtins::{Args, format_string};
use crate::error::{Result, RuntimeError};
use crate::interpreter::{Interpreter, bind_method};
use crate::value::{Key, Value};
use blockml_dom::{AttrValue, Content, escape_text};
use smol_str::SmolStr;
use std::rc::Rc;

const STR_METHODS: &[&str] = &[
    "endswith",
    "format",
    "join",
    "lower",
    "replace",
    "split",
    "startswith",
    "strip",
    "title",
    "upper",
];
const MARKUP_METHODS: &[&str] = &["join"];
const LIST_METHODS: &[&str] = &["append", "extend", "pop"];
const DICT_METHODS: &[&str] = &["get", "items", "keys", "pop", "values"];
const ELEMENT_METHODS: &[&str] = &["append", "extend", "get", "insert", "set"];

pub(crate) fn has_method(receiver: &Value, name: &str) -> bool {
    let methods = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::Markup(_) => MARKUP_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Element(_) => ELEMENT_METHODS,
        _ => return false,
    };
    methods.contains(&name)
}

/// `value.attr`
pub(crate) fn get_attribute(interp: &Rc<Interpreter>, value: &Value, attr: &str) -> Result<Value> {
    match value {
        Value::Element(element) => match attr {
            "tag" => {
                return Ok(element.tag().map(Value::str).unwrap_or(Value::None));
            }
            "text" => return Ok(Value::markup(element.text())),
            "tail" => return Ok(Value::markup(element.tail())),
            _ => {}
        },
        Value::Unit(unit) => {
            if attr == "fragment" {
                return Ok(Value::Element(unit.fragment()));
            }
            if let Some(value) = unit.get(attr) {
                return Ok(value);
            }
        }
        Value::RuntimeModule => return Ok(interp.runtime_attr(attr)),
        Value::Builder(builder) if attr == "tag" => return Ok(Value::str(builder.tag())),
        _ => {}
    }
    bind_method(value, attr).ok_or_else(|| RuntimeError::attribute(value.type_name(), attr).into())
}

/// `value.attr = new`
pub(crate) fn set_attribute(value: &Value, attr: &str, new: Value) -> Result<()> {
    if let Value::Element(element) = value {
        let escaped = match &new {
            Value::None => String::new(),
            Value::Markup(markup) => markup.to_string(),
            other => escape_text(&other.display()?).into_owned(),
        };
        match attr {
            "text" => {
                element.set_text(escaped);
                return Ok(());
            }
            "tail" => {
                element.set_tail(escaped);
                return Ok(());
            }
            _ => {}
        }
    }
    Err(RuntimeError::attribute(value.type_name(), attr).into())
}

pub(crate) fn call_method(
    interp: &Rc<Interpreter>,
    receiver: &Value,
    name: &str,
    positional: Vec<Value>,
    keywords: Vec<(SmolStr, Value)>,
) -> Result<Value> {
    let mut args = Args::new(method_label(receiver), positional, keywords);
    match receiver {
        Value::Str(s) => str_method(interp, s, name, &mut args),
        Value::Markup(s) => {
            args.finish(1, 1)?;
            let parts = interp
                .iterate(&args.positional[0])?
                .iter()
                .map(|item| match item {
                    Value::Markup(markup) => Ok(markup.to_string()),
                    other => Ok(escape_text(&other.display()?).into_owned()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::markup(parts.join(s)))
        }
        Value::List(items) => match name {
            "append" => {
                args.finish(1, 1)?;
                items.borrow_mut().push(args.positional.remove(0));
                Ok(Value::None)
            }
            "extend" => {
                args.finish(1, 1)?;
                let more = interp.iterate(&args.positional[0])?;
                items.borrow_mut().extend(more);
                Ok(Value::None)
            }
            "pop" => {
                args.finish(0, 1)?;
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    return Err(RuntimeError::index("pop from empty list").into());
                }
                let len = items.len() as i64;
                let index = match args.positional.first() {
                    Some(value) => value.as_int().ok_or_else(|| args.bad_type(value))?,
                    None => len - 1,
                };
                let index = if index < 0 { index + len } else { index };
                if !(0..len).contains(&index) {
                    return Err(RuntimeError::index("pop index out of range").into());
                }
                Ok(items.remove(index as usize))
            }
            _ => Err(RuntimeError::attribute("list", name).into()),
        },
        Value::Dict(entries) => match name {
            "keys" => {
                args.finish(0, 0)?;
                Ok(Value::list(entries.borrow().keys().map(Key::to_value).collect()))
            }
            "values" => {
                args.finish(0, 0)?;
                Ok(Value::list(entries.borrow().values().cloned().collect()))
            }
            "items" => {
                args.finish(0, 0)?;
                Ok(Value::list(
                    entries
                        .borrow()
                        .iter()
                        .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                        .collect(),
                ))
            }
            "get" => {
                args.finish(1, 2)?;
                let key = Key::from_value(&args.positional[0])?;
                Ok(entries
                    .borrow()
                    .get(&key)
                    .cloned()
                    .or_else(|| args.positional.get(1).cloned())
                    .unwrap_or(Value::None))
            }
            "pop" => {
                args.finish(1, 2)?;
                let key = Key::from_value(&args.positional[0])?;
                let removed = entries.borrow_mut().shift_remove(&key);
                match (removed, args.positional.get(1)) {
                    (Some(value), _) => Ok(value),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(RuntimeError::key(&key).into()),
                }
            }
            _ => Err(RuntimeError::attribute("dict", name).into()),
        },
        Value::Element(element) => match name {
            "append" => {
                args.finish(1, 1)?;
                element.append(interp.to_content(&args.positional[0])?);
                Ok(Value::None)
            }
            "extend" => {
                args.finish(1, 1)?;
                let items = interp
                    .iterate(&args.positional[0])?
                    .iter()
                    .map(|item| interp.to_content(item))
                    .collect::<Result<Vec<Content>>>()?;
                element.extend(items);
                Ok(Value::None)
            }
            "insert" => {
                args.finish(2, 2)?;
                let index = args.positional[0]
                    .as_int()
                    .ok_or_else(|| args.bad_type(&args.positional[0]))?;
                let len = element.len() as i64;
                let index = if index < 0 { (index + len).max(0) } else { index };
                element.insert(index as usize, interp.to_child(&args.positional[1])?);
                Ok(Value::None)
            }
            "set" => {
                args.finish(2, 2)?;
                let attr = args.text(0)?;
                element.set_attr(&attr, args.positional[1].to_attr()?);
                Ok(Value::None)
            }
            "get" => {
                args.finish(1, 2)?;
                let attr = args.text(0)?;
                Ok(match element.get(&attr) {
                    Some(AttrValue::Text(text)) => Value::str(text),
                    Some(AttrValue::Bool(b)) => Value::Bool(b),
                    None => args.positional.get(1).cloned().unwrap_or(Value::None),
                })
            }
            _ => Err(RuntimeError::attribute("Element", name).into()),
        },
        other => Err(RuntimeError::attribute(other.type_name(), name).into()),
    }
}

fn method_label(receiver: &Value) -> &'static str {
    match receiver {
        Value::Str(_) => "str method",
        Value::Markup(_) => "Markup.join",
        Value::List(_) => "list method",
        Value::Dict(_) => "dict method",
        Value::Element(_) => "Element method",
        _ => "method",
    }
}

fn str_method(interp: &Rc<Interpreter>, s: &str, name: &str, args: &mut Args) -> Result<Value> {
    match name {
        "format" => {
            let keywords = std::mem::take(&mut args.keywords);
            Ok(Value::str(format_string(s, &args.positional, &keywords)?))
        }
        "join" => {
            args.finish(1, 1)?;
            let parts = interp
                .iterate(&args.positional[0])?
                .iter()
                .map(|item| match item {
                    Value::Str(text) | Value::Markup(text) => Ok(text.to_string()),
                    other => Err(RuntimeError::type_error(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))
                    .into()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::str(parts.join(s)))
        }
        "upper" => {
            args.finish(0, 0)?;
            Ok(Value::str(s.to_uppercase()))
        }
        "lower" => {
            args.finish(0, 0)?;
            Ok(Value::str(s.to_lowercase()))
        }
        "title" => {
            args.finish(0, 0)?;
            Ok(Value::str(title_case(s)))
        }
        "strip" => {
            args.finish(0, 1)?;
            Ok(Value::str(match args.positional.first() {
                Some(_) => {
                    let chars: Vec<char> = args.text(0)?.chars().collect();
                    s.trim_matches(chars.as_slice()).to_string()
                }
                None => s.trim().to_string(),
            }))
        }
        "split" => {
            args.finish(0, 1)?;
            let parts: Vec<Value> = match args.positional.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::str).collect(),
                Some(_) => {
                    let sep = args.text(0)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::value("empty separator").into());
                    }
                    s.split(sep.as_str()).map(Value::str).collect()
                }
            };
            Ok(Value::list(parts))
        }
        "replace" => {
            args.finish(2, 2)?;
            Ok(Value::str(s.replace(&args.text(0)?, &args.text(1)?)))
        }
        "startswith" | "endswith" => {
            args.finish(1, 1)?;
            let affix = args.text(0)?;
            Ok(Value::Bool(if name == "startswith" {
                s.starts_with(&affix)
            } else {
                s.ends_with(&affix)
            }))
        }
        _ => Err(RuntimeError::attribute("str", name).into()),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::scope::Scope;
    use blockml_dom::Element;
    use pretty_assertions::assert_eq;

    fn interp() -> Rc<Interpreter> {
        Interpreter::new(Engine::new(), "test", Scope::root(), Rc::default())
    }

    fn method(receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value> {
        call_method(&interp(), receiver, name, args, Vec::new())
    }

    #[test]
    fn test_string_methods() {
        let s = Value::str("  hello world ");
        assert_eq!(method(&s, "strip", vec![]).unwrap().display().unwrap(), "hello world");
        assert_eq!(
            method(&s, "split", vec![]).unwrap().repr().unwrap(),
            "['hello', 'world']"
        );
        assert_eq!(
            method(&Value::str("a-b"), "replace", vec!["-".into(), "+".into()])
                .unwrap()
                .display()
                .unwrap(),
            "a+b"
        );
        assert_eq!(
            method(&Value::str("hello wORLD"), "title", vec![])
                .unwrap()
                .display()
                .unwrap(),
            "Hello World"
        );
        assert!(method(&Value::str(", "), "join", vec![Value::from(vec![1i64])]).is_err());
    }

    #[test]
    fn test_markup_join_escapes_plain_text() {
        let joined = method(
            &Value::markup("<br>"),
            "join",
            vec![Value::from(vec![Value::str("a&b"), Value::markup("<i>c</i>")])],
        )
        .unwrap();
        assert!(matches!(&joined, Value::Markup(_)));
        assert_eq!(joined.display().unwrap(), "a&amp;b<br><i>c</i>");
    }

    #[test]
    fn test_list_and_dict_methods() {
        let list = Value::from(vec![1i64, 2]);
        method(&list, "append", vec![Value::Int(3)]).unwrap();
        assert_eq!(method(&list, "pop", vec![Value::Int(0)]).unwrap().repr().unwrap(), "1");
        assert_eq!(list.repr().unwrap(), "[2, 3]");

        let dict = Value::dict(
            [(Key::Str("a".into()), Value::Int(1))]
                .into_iter()
                .collect(),
        );
        let missing = method(&dict, "get", vec!["b".into(), Value::Int(0)]).unwrap();
        assert_eq!(missing.repr().unwrap(), "0");
        let items = method(&dict, "items", vec![]).unwrap();
        assert_eq!(items.repr().unwrap(), "[('a', 1)]");
        assert!(method(&dict, "pop", vec!["missing".into()]).is_err());
    }

    #[test]
    fn test_element_methods_and_properties() {
        let element = Value::Element(Element::with_tag("ul"));
        method(&element, "set", vec!["class_".into(), Value::from(vec!["a", "b"])]).unwrap();
        method(&element, "append", vec![Value::Element(Element::with_tag("li"))]).unwrap();
        method(&element, "insert", vec![Value::Int(0), "first".into()]).unwrap();
        assert_eq!(
            element.display().unwrap(),
            "<ul class=\"a b\">first<li></li></ul>"
        );
        assert_eq!(
            method(&element, "get", vec!["class".into()]).unwrap().display().unwrap(),
            "a b"
        );
        let tag = get_attribute(&interp(), &element, "tag").unwrap();
        assert_eq!(tag.display().unwrap(), "ul");

        set_attribute(&element, "text", Value::str("<b>")).unwrap();
        let text = get_attribute(&interp(), &element, "text").unwrap();
        assert_eq!(text.display().unwrap(), "&lt;b&gt;");
        assert!(get_attribute(&interp(), &element, "missing").is_err());
    }
}
