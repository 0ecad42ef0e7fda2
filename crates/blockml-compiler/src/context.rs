//! Compilation context.

use crate::helpers::{RESERVED_NAMES, names};
use indexmap::IndexSet;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;

/// State threaded through one unit's compilation.
#[derive(Debug, Clone)]
pub struct CompileContext {
    /// Name of the unit, reported in errors.
    pub unit: SmolStr,
    /// Names declared so far, innermost last.
    pub scope_vars: Vec<ScopeVar>,
    /// Free call targets treated as tags, in first-use order.
    pub implicit_tags: IndexSet<SmolStr>,
    /// Names imported from the runtime module.
    pub builders: FxHashSet<SmolStr>,
    /// Counter for synthesized names.
    pub counter: u32,
    /// Scope marker where the innermost function body starts.
    local_start: Option<usize>,
}

/// A declared name.
#[derive(Debug, Clone)]
pub struct ScopeVar {
    pub name: SmolStr,
    pub source: VarSource,
}

/// How a name was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    Reserved,
    Assign,
    Import,
    Function,
    Param,
    Loop,
    /// `with ... as name`
    ScopeTarget,
    Comprehension,
    Synthesized,
}

impl CompileContext {
    pub fn new(unit: impl Into<SmolStr>) -> Self {
        let mut ctx = Self {
            unit: unit.into(),
            scope_vars: Vec::new(),
            implicit_tags: IndexSet::new(),
            builders: FxHashSet::default(),
            counter: 0,
            local_start: None,
        };
        for name in RESERVED_NAMES {
            ctx.add_var(*name, VarSource::Reserved);
        }
        ctx
    }

    /// Next value of the per-unit counter.
    pub fn next_id(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    /// Generate a unique `__{prefix}_{n}__` name.
    pub fn unique_name(&mut self, prefix: &str) -> SmolStr {
        let id = self.next_id();
        SmolStr::from(format!("__{}_{}__", prefix, id))
    }

    pub fn add_var(&mut self, name: impl Into<SmolStr>, source: VarSource) {
        self.scope_vars.push(ScopeVar {
            name: name.into(),
            source,
        });
    }

    /// Declare every name a binding target introduces.
    pub fn add_target(&mut self, target: &blockml_syntax::Expr, source: VarSource) {
        let mut bound = Vec::new();
        target.binding_names(&mut bound);
        for name in bound {
            self.add_var(name, source);
        }
    }

    /// Drop the most recent declaration of `name`.
    pub fn remove_var(&mut self, name: &str) {
        if let Some(index) = self.scope_vars.iter().rposition(|v| v.name == name) {
            self.scope_vars.remove(index);
        }
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.scope_vars.iter().any(|v| v.name == name)
    }

    pub fn var_source(&self, name: &str) -> Option<VarSource> {
        self.scope_vars
            .iter()
            .rev()
            .find(|v| v.name == name)
            .map(|v| v.source)
    }

    /// Enter a new scope, returning a marker.
    pub fn enter_scope(&mut self) -> usize {
        self.scope_vars.len()
    }

    /// Exit a scope, removing variables added since the marker.
    pub fn exit_scope(&mut self, marker: usize) {
        self.scope_vars.truncate(marker);
    }

    /// Mark `marker` as the start of a function body. Returns the previous start.
    pub fn enter_function(&mut self, marker: usize) -> Option<usize> {
        self.local_start.replace(marker)
    }

    pub fn exit_function(&mut self, previous: Option<usize>) {
        self.local_start = previous;
    }

    /// Whether `name` is bound in the innermost function body.
    ///
    /// Comprehension variables are excluded: each iteration gets its own scope.
    pub fn is_function_local(&self, name: &str) -> bool {
        let Some(start) = self.local_start else {
            return false;
        };
        self.scope_vars
            .get(start..)
            .unwrap_or_default()
            .iter()
            .any(|v| v.name == name && v.source != VarSource::Comprehension)
    }

    /// Record an implicit tag usage.
    pub fn use_tag(&mut self, name: impl Into<SmolStr>) {
        self.implicit_tags.insert(name.into());
    }

    pub fn add_builder(&mut self, name: impl Into<SmolStr>) {
        self.builders.insert(name.into());
    }

    /// Whether `name` constructs elements, so its arguments may be deferred.
    pub fn builds_elements(&self, name: &str) -> bool {
        name == names::ELEMENT
            || name == names::DOCUMENT
            || self.implicit_tags.contains(name)
            || (self.builders.contains(name)
                && self.var_source(name) == Some(VarSource::Import))
    }
}
