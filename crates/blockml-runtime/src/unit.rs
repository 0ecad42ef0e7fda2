//! Compiled units and their execution results.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::interpreter::{ImportState, Interpreter};
use crate::scope::Scope;
use crate::value::Value;
use blockml_compiler::names;
use blockml_dom::{Element, EmbeddedUnit};
use blockml_syntax::Module;
use camino::{Utf8Path, Utf8PathBuf};
use smol_str::SmolStr;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// External names bound before a unit body runs.
pub type Overrides = Vec<(SmolStr, Value)>;

/// A template rewritten into a tree-building program.
///
/// Cheap to clone and shareable across threads; every [`run`](Self::run)
/// executes in fresh globals and yields an independent fragment.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    name: SmolStr,
    origin: Option<Utf8PathBuf>,
    program: Arc<Module>,
}

impl CompiledUnit {
    /// Parse and compile `source`.
    pub fn compile(name: &str, source: &str, origin: Option<Utf8PathBuf>) -> Result<Self> {
        let module = blockml_syntax::parse(source).map_err(|err| Error::parse(name, source, err))?;
        let program = blockml_compiler::compile(name, &module)?;
        Ok(Self::from_program(name, program, origin))
    }

    /// Wrap an already rewritten program, such as one read from the cache.
    pub fn from_program(name: &str, program: Module, origin: Option<Utf8PathBuf>) -> Self {
        Self {
            name: SmolStr::new(name),
            origin,
            program: Arc::new(program),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&Utf8Path> {
        self.origin.as_deref()
    }

    pub fn program(&self) -> &Module {
        &self.program
    }

    /// The rewritten program as source text.
    pub fn program_source(&self) -> String {
        blockml_syntax::print_module(&self.program)
    }

    /// Execute with `overrides` pre-bound.
    pub fn run(&self, engine: &Engine, overrides: Overrides) -> Result<UnitResult> {
        self.execute(engine, overrides, Rc::default())
    }

    pub(crate) fn execute(
        &self,
        engine: &Engine,
        overrides: Overrides,
        imports: Rc<ImportState>,
    ) -> Result<UnitResult> {
        imports.enter(&self.name)?;
        let result = self.execute_in(engine, overrides, imports.clone());
        imports.leave();
        result
    }

    fn execute_in(
        &self,
        engine: &Engine,
        overrides: Overrides,
        imports: Rc<ImportState>,
    ) -> Result<UnitResult> {
        tracing::debug!(unit = %self.name, overrides = overrides.len(), "executing unit");

        let globals = Scope::root();
        for (name, value) in overrides {
            globals.set(name, value);
        }
        let fragment = Element::fragment();
        globals.set(names::UNIT_NAME, Value::str(&self.name));
        globals.set(names::DOCUMENT, Value::Element(fragment.clone()));

        let interp = Interpreter::new(engine.clone(), self.name.clone(), globals.clone(), imports);
        interp.run(&self.program)?;

        if let Some(doctype) = globals.get_local(names::DOCTYPE) {
            fragment.set_attr("doctype", doctype.to_attr()?);
        }

        Ok(UnitResult {
            unit: self.clone(),
            engine: engine.clone(),
            globals,
            fragment,
        })
    }
}

/// One execution of a [`CompiledUnit`].
pub struct UnitResult {
    unit: CompiledUnit,
    engine: Engine,
    globals: Rc<Scope>,
    fragment: Element,
}

impl UnitResult {
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    /// The root fragment the unit populated.
    pub fn fragment(&self) -> Element {
        self.fragment.clone()
    }

    pub fn render(&self) -> Result<String> {
        blockml_dom::render(&self.fragment).map_err(Error::from_render)
    }

    /// A top-level binding of the unit.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.get_local(name)
    }

    /// Top-level bindings in definition order.
    pub fn globals(&self) -> Vec<(SmolStr, Value)> {
        self.globals.snapshot()
    }

    /// Re-execute the same program with fresh overrides.
    pub fn call(&self, overrides: Overrides) -> Result<UnitResult> {
        self.unit.run(&self.engine, overrides)
    }
}

impl EmbeddedUnit for UnitResult {
    fn fragment(&self) -> Element {
        self.fragment.clone()
    }
}

impl fmt::Display for UnitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let html = self.render().map_err(|_| fmt::Error)?;
        f.write_str(&html)
    }
}

impl fmt::Debug for UnitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitResult")
            .field("name", &self.unit.name)
            .field("fragment", &self.fragment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompiledUnit {
        CompiledUnit::compile("page", source, None).unwrap()
    }

    #[test]
    fn test_run_renders_fragment() {
        let unit = compile("with Element():\n    p(\"hi\")\n");
        let result = unit.run(&Engine::new(), Vec::new()).unwrap();
        assert_eq!(result.render().unwrap(), "<p>hi</p>");
        assert_eq!(result.to_string(), "<p>hi</p>");
    }

    #[test]
    fn test_doctype_global_moves_onto_fragment() {
        let unit = compile("__doctype__ = \"html\"\nhtml()\n");
        let result = unit.run(&Engine::new(), Vec::new()).unwrap();
        assert_eq!(result.render().unwrap(), "<!DOCTYPE html><html></html>");
    }

    #[test]
    fn test_globals_and_reserved_names() {
        let unit = compile("x = 1\ndef double(n):\n    return n * 2\n");
        let result = unit.run(&Engine::new(), Vec::new()).unwrap();
        assert!(matches!(result.get("x"), Some(Value::Int(1))));
        assert!(matches!(result.get("__name__"), Some(Value::Str(name)) if &*name == "page"));
        assert!(matches!(result.get("double"), Some(Value::Function(_))));
        assert!(result.get("missing").is_none());
    }

    #[test]
    fn test_call_reexecutes_independently() {
        let unit = compile("name = \"world\"\np(\"hello \" + name)\n");
        let first = unit.run(&Engine::new(), Vec::new()).unwrap();
        let second = first.call(vec![("name".into(), Value::str("you"))]).unwrap();
        assert_eq!(first.render().unwrap(), "<p>hello world</p>");
        assert_eq!(second.render().unwrap(), "<p>hello you</p>");
        assert!(!first.fragment().ptr_eq(&second.fragment()));
    }

    #[test]
    fn test_parse_error_names_unit_and_location() {
        let err = CompiledUnit::compile("broken", "x = (\n", None).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().starts_with("broken:"));
    }

    #[test]
    fn test_loop_control_cannot_leave_a_function() {
        // Only reachable through a cached program; the compiler rejects it.
        let program = blockml_syntax::parse("def f():\n    break\nfor i in [1]:\n    f()\n").unwrap();
        let unit = CompiledUnit::from_program("page", program, None);
        match unit.run(&Engine::new(), Vec::new()) {
            Err(Error::Runtime(err)) => {
                assert_eq!(err.kind, crate::RuntimeErrorKind::Syntax);
                assert!(err.message.contains("f()"), "{}", err.message);
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }
}
