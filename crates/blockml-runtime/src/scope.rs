//! Lexical binding scopes.

use crate::value::Value;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::cell::RefCell;
use std::rc::Rc;

/// One frame of bindings. Lookups walk outward through `parent`.
#[derive(Default)]
pub struct Scope {
    vars: RefCell<IndexMap<SmolStr, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    /// Bind in this frame, shadowing any outer binding.
    pub fn set(&self, name: impl Into<SmolStr>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// This frame's bindings in definition order.
    pub fn snapshot(&self) -> Vec<(SmolStr, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.vars.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let globals = Scope::root();
        globals.set("x", Value::Int(1));
        let local = Scope::child(&globals);
        local.set("y", Value::Int(2));

        assert!(matches!(local.get("x"), Some(Value::Int(1))));
        assert!(local.get_local("x").is_none());
        assert!(globals.get("y").is_none());

        local.set("x", Value::Int(3));
        assert!(matches!(local.get("x"), Some(Value::Int(3))));
        assert!(matches!(globals.get("x"), Some(Value::Int(1))));
    }

    #[test]
    fn test_remove_and_snapshot_order() {
        let scope = Scope::root();
        scope.set("b", Value::None);
        scope.set("a", Value::None);
        scope.set("c", Value::None);
        scope.remove("a");
        let names: Vec<_> = scope.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
