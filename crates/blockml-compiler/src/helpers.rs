//! Reserved names shared by the compiler and the runtime.

/// Names the compiler emits and the runtime pre-binds.
pub mod names {
    /// Root fragment of the unit being executed.
    pub const DOCUMENT: &str = "__document__";
    /// Element constructor; `with Element(...)` marks the document root.
    pub const ELEMENT: &str = "Element";
    /// Module exposing tag builders.
    pub const RUNTIME_MODULE: &str = "blockml";
    /// Author-declared doctype, copied onto the root fragment after execution.
    pub const DOCTYPE: &str = "__doctype__";
    /// Unit name, bound before execution.
    pub const UNIT_NAME: &str = "__name__";
    pub const GLOBALS: &str = "globals";
    pub const APPEND: &str = "append";
}

/// Host builtins; calls to these are never implicit tags.
pub const BUILTIN_NAMES: &[&str] = &[
    "Element", "abs", "all", "any", "bool", "dict", "enumerate", "float", "globals", "int", "len",
    "list", "markup", "max", "min", "print", "range", "reversed", "sorted", "str", "sum", "tuple",
    "zip",
];

/// Check if a name is a host builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Names bound before any template statement runs.
pub const RESERVED_NAMES: &[&str] = &[names::DOCUMENT, names::UNIT_NAME];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("len"));
        assert!(is_builtin("Element"));
        assert!(!is_builtin("div"));
    }

    #[test]
    fn test_builtins_sorted() {
        let mut sorted = BUILTIN_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, BUILTIN_NAMES);
    }
}
