//! blockml template compiler.
//!
//! Rewrites a parsed template into a program that builds an element tree:
//! tag blocks become nested element constructions appended to their parent,
//! bare expressions are appended to the enclosing element, and calls to
//! undeclared names become tag builders imported from the runtime module.

pub mod classify;
pub mod context;
pub mod error;
pub mod helpers;
pub mod transform;

pub use classify::{CallTarget, classify};
pub use context::{CompileContext, VarSource};
pub use error::{CompileError, CompileErrorCode, CompileResult};
pub use helpers::{BUILTIN_NAMES, names};

use blockml_syntax::Module;

/// Compile the template `module` of the unit named `unit`.
pub fn compile(unit: &str, module: &Module) -> CompileResult<Module> {
    let mut ctx = CompileContext::new(unit);
    transform::transform_module(&mut ctx, module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockml_syntax::{parse, print_module};
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> CompileResult<String> {
        let module = parse(source).unwrap();
        compile("page", &module).map(|m| print_module(&m))
    }

    fn compiled(source: &str) -> String {
        compile_source(source).unwrap()
    }

    #[test]
    fn test_compile_nested_blocks_and_loop() {
        let output = compiled(
            r#"with Element():
    with root():
        with child():
            for x in ["A", "B", "C"]:
                item(x)
"#,
        );
        insta::assert_snapshot!(output.trim_end(), @r#"
        from blockml import root, child, item, Element
        with __document__():
            with root() as __root_1__:
                with child() as __child_2__:
                    def __block_3__():
                        __block_3_el__ = Element(None)
                        for x in ["A", "B", "C"]:
                            __block_3_el__.append(item(x))
                        return __block_3_el__
                    __child_2__.append(__block_3__())
                __root_1__.append(__child_2__)
                del __child_2__
            __document__.append(__root_1__)
            del __root_1__
        "#);
    }

    #[test]
    fn test_compile_guarded_assignments() {
        let output = compiled("title = \"Home\"\na, b = 1, 2\nh1(title)\n");
        assert_eq!(
            output,
            r#"from blockml import h1, Element
if ("title" not in globals()):
    title = "Home"
__unpack_1__ = (1, 2)
(__unpack_1_0__, __unpack_1_1__) = __unpack_1__
if ("a" not in globals()):
    a = __unpack_1_0__
if ("b" not in globals()):
    b = __unpack_1_1__
del __unpack_1__, __unpack_1_0__, __unpack_1_1__
__document__.append(h1(title))
"#
        );
    }

    #[test]
    fn test_compile_chained_assignment_guards_each_target() {
        let output = compiled("a = b = 1\n");
        assert_eq!(
            output,
            r#"__unpack_1__ = 1
if ("a" not in globals()):
    a = __unpack_1__
if ("b" not in globals()):
    b = __unpack_1__
del __unpack_1__
"#
        );
    }

    #[test]
    fn test_compile_defers_conditional_and_text_calls() {
        let output = compiled(
            r#"with ul():
    for item in items:
        li(item if item else "-")
    ", ".join(items)
"#,
        );
        insta::assert_snapshot!(output.trim_end(), @r#"
        from blockml import ul, li, Element
        with ul() as __ul_1__:
            def __block_2__():
                __block_2_el__ = Element(None)
                for item in items:
                    __block_2_el__.append(li((lambda item=item: (item if item else "-"))))
                return __block_2_el__
            __ul_1__.append(__block_2__())
            __ul_1__.append((lambda: ", ".join(items)))
        __document__.append(__ul_1__)
        del __ul_1__
        "#);
    }

    #[test]
    fn test_compile_root_with_doctype_and_branches() {
        let output = compiled(
            r#"with Element(doctype="html") as doc:
    if show:
        p("a")
    elif other:
        p("b")
    else:
        br()
"#,
        );
        assert_eq!(
            output,
            r#"from blockml import p, br, Element
with __document__(doctype="html") as doc:
    def __block_1__():
        __block_1_el__ = Element(None)
        if show:
            __block_1_el__.append(p("a"))
        elif other:
            __block_1_el__.append(p("b"))
        else:
            __block_1_el__.append(br())
        return __block_1_el__
    doc.append(__block_1__())
"#
        );
    }

    #[test]
    fn test_compile_declared_names_are_not_tags() {
        let output = compiled(
            r#"from blockml import div
def card(t):
    with div(class_="card") as c:
        p(t)
    return c
card("x")
len("abc")
"#,
        );
        assert_eq!(
            output,
            r#"from blockml import p, Element
from blockml import div
def card(t):
    with div(class_="card") as c:
        c.append(p(t))
    return c
__document__.append(card("x"))
__document__.append(len("abc"))
"#
        );
    }

    #[test]
    fn test_compile_without_tags_has_no_preamble() {
        assert_eq!(compiled("x = 1\n"), "if (\"x\" not in globals()):\n    x = 1\n");
    }

    #[test]
    fn test_compile_output_reparses() {
        let output = compiled(
            r#"with Element():
    with div(class_="x"):
        for i, name in enumerate(names):
            span(name if i else name.upper())
"#,
        );
        let reparsed = print_module(&parse(&output).unwrap());
        assert_eq!(output, reparsed);
    }

    #[test]
    fn test_reject_multiple_scope_targets() {
        let err = compile_source("with Element():\n    with div() as a, span() as b:\n        pass\n")
            .unwrap_err();
        assert_eq!(err.code, CompileErrorCode::MultipleScopeTargets);
        assert_eq!(err.unit, "page");
        assert!(err.to_string().starts_with("page: "));
    }

    #[test]
    fn test_reject_non_call_scope_target() {
        let err = compile_source("with section:\n    pass\n").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::ScopeTargetNotCall);
    }

    #[test]
    fn test_reject_wildcard_import() {
        let err = compile_source("from blockml import *\n").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::WildcardImport);
        assert_eq!(err.code.as_str(), "wildcard-import");
    }

    #[test]
    fn test_reject_loop_control_inside_wrapped_if() {
        let source = r#"with ul():
    for x in ["a", "stop", "b"]:
        if x == "stop":
            break
        li(x)
"#;
        let err = compile_source(source).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::LoopControlOutsideLoop);
        assert!(err.message.starts_with("'break' outside loop"), "{}", err.message);

        let err = compile_source(&source.replace("break", "continue")).unwrap_err();
        assert!(err.message.starts_with("'continue' outside loop"), "{}", err.message);
    }

    #[test]
    fn test_loop_control_in_plain_loops() {
        compiled("with ul():\n    for x in xs:\n        break\n");
        compiled("def f(xs):\n    for x in xs:\n        if x:\n            continue\n        return x\n");
        let err = compile_source("break\n").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::LoopControlOutsideLoop);
    }

    #[test]
    fn test_reject_return_inside_wrapped_block() {
        let err = compile_source(
            r#"def card(t):
    with div() as c:
        if not t:
            return c
        p(t)
    return c
"#,
        )
        .unwrap_err();
        assert_eq!(err.code, CompileErrorCode::MisplacedReturn);
        assert_eq!(err.code.as_str(), "misplaced-return");

        let err = compile_source("return 1\n").unwrap_err();
        assert_eq!(err.code, CompileErrorCode::MisplacedReturn);
        assert_eq!(err.message, "'return' outside function");
    }
}
