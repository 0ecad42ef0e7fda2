//! End-to-end rendering of template sources.

use blockml_runtime::{
    CompiledUnit, Engine, EngineConfig, Error, MemoryLoader, RuntimeError, RuntimeErrorKind,
    Value,
};
use pretty_assertions::assert_eq;

fn engine() -> Engine {
    Engine::with_loader(EngineConfig::default(), MemoryLoader::new())
}

fn render(source: &str) -> String {
    let engine = engine();
    let unit = engine.compile_source("page", source).unwrap();
    unit.run(&engine, Vec::new()).unwrap().render().unwrap()
}

fn runtime_error(source: &str) -> RuntimeError {
    let engine = engine();
    let unit = engine.compile_source("page", source).unwrap();
    match unit.run(&engine, Vec::new()) {
        Err(Error::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {:?}", other.map(|r| r.render())),
    }
}

#[test]
fn test_nested_blocks_with_loop() {
    let html = render(
        r#"with Element():
    with root():
        with child():
            for x in ["A", "B", "C"]:
                item(x)
"#,
    );
    assert_eq!(
        html,
        "<root><child><item>A</item><item>B</item><item>C</item></child></root>"
    );
}

#[test]
fn test_doctype_and_attributes() {
    let html = render(
        r#"with Element(doctype="html"):
    with html(lang="en"):
        with body(class_="home", hidden=False):
            input(type="checkbox", checked=True)
            p("a < b & c", title='say "hi"')
"#,
    );
    assert_eq!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><body class=\"home\"><input type=\"checkbox\" checked>\
<p title=\"say &quot;hi&quot;\">a &lt; b &amp; c</p></body></html>"
    );
}

#[test]
fn test_overrides_win_over_defaults() {
    let engine = engine();
    let unit = engine
        .compile_source(
            "page",
            "title = \"Default\"\na, b = 1, 2\nwith Element():\n    h1(title)\n    p(a)\n    p(b)\n",
        )
        .unwrap();

    let overrides = vec![
        ("title".into(), Value::str("Custom")),
        ("a".into(), Value::Int(9)),
    ];
    let first = unit.run(&engine, overrides.clone()).unwrap().render().unwrap();
    let second = unit.run(&engine, overrides).unwrap().render().unwrap();
    assert_eq!(first, "<h1>Custom</h1><p>9</p><p>2</p>");
    assert_eq!(first, second);

    let defaults = unit.run(&engine, Vec::new()).unwrap().render().unwrap();
    assert_eq!(defaults, "<h1>Default</h1><p>1</p><p>2</p>");
}

#[test]
fn test_conditional_content_is_deferred_per_item() {
    let html = render(
        r#"items = ["a", "", "c"]
with ul():
    for item in items:
        li(item if item else "-")
"#,
    );
    assert_eq!(html, "<ul><li>a</li><li>-</li><li>c</li></ul>");
}

#[test]
fn test_generator_argument() {
    let html = render("names = [\"x\", \"y\"]\nul(li(n) for n in names)\n");
    assert_eq!(html, "<ul><li>x</li><li>y</li></ul>");
}

#[test]
fn test_branches_contribute_variable_content() {
    let source = r#"with Element():
    with div():
        if count == 0:
            p("none")
        elif count == 1:
            p("one")
        else:
            for i in range(count):
                span(i)
"#;
    let engine = engine();
    let unit = engine.compile_source("page", source).unwrap();
    let run = |count: i64| {
        unit.run(&engine, vec![("count".into(), Value::Int(count))])
            .unwrap()
            .render()
            .unwrap()
    };
    assert_eq!(run(0), "<div><p>none</p></div>");
    assert_eq!(run(1), "<div><p>one</p></div>");
    assert_eq!(run(3), "<div><span>0</span><span>1</span><span>2</span></div>");
}

#[test]
fn test_functions_build_components() {
    let html = render(
        r#"def card(title, body="..."):
    with div(class_="card") as c:
        h2(title)
        p(body)
    return c

with Element():
    card("One", body="first")
    card("Two")
"#,
    );
    assert_eq!(
        html,
        "<div class=\"card\"><h2>One</h2><p>first</p></div>\
<div class=\"card\"><h2>Two</h2><p>...</p></div>"
    );
}

#[test]
fn test_text_markup_and_raw_text() {
    let html = render(
        r#"with Element():
    p("<b>bold</b>")
    div(m"<em>raw</em>")
    script("if (a < b) {}")
    br("dropped")
    "tail & text"
"#,
    );
    assert_eq!(
        html,
        "<p>&lt;b&gt;bold&lt;/b&gt;</p><div><em>raw</em></div>\
<script>if (a < b) {}</script><br>tail &amp; text"
    );
}

#[test]
fn test_deferred_text_in_raw_text_elements() {
    let html = render(
        r#"flag = True
with Element():
    script("a < b" if flag else "")
    style("".join(["p > a", " {}"]))
    p("a < b" if flag else "")
"#,
    );
    assert_eq!(
        html,
        "<script>a < b</script><style>p > a {}</style><p>a &lt; b</p>"
    );
}

#[test]
fn test_thunks_rerun_on_every_render() {
    let engine = engine();
    let unit = engine
        .compile_source(
            "page",
            r#"counter = []
def bump():
    counter.append(1)
    return str(len(counter))
with Element():
    p(bump)
"#,
        )
        .unwrap();
    let result = unit.run(&engine, Vec::new()).unwrap();
    assert_eq!(result.render().unwrap(), "<p>1</p>");
    assert_eq!(result.render().unwrap(), "<p>2</p>");
}

#[test]
fn test_element_methods_from_templates() {
    let html = render(
        r#"with Element():
    with ul() as menu:
        li("b")
    menu.insert(0, li("a"))
    menu.set("id", "nav")
    footer(", ".join(["x", "y"]))
"#,
    );
    assert_eq!(
        html,
        "<ul id=\"nav\"><li>a</li><li>b</li></ul><footer>x, y</footer>"
    );
}

#[test]
fn test_element_subscripts() {
    let html = render(
        r#"with Element():
    with ul(id="menu") as menu:
        li("a")
        li("b")
    p(menu[-1].text, title=menu["id"])
"#,
    );
    assert_eq!(
        html,
        "<ul id=\"menu\"><li>a</li><li>b</li></ul><p title=\"menu\">b</p>"
    );
    let err = runtime_error("with ul() as menu:\n    li(\"a\")\nx = menu[1]\n");
    assert_eq!(err.kind, RuntimeErrorKind::Index);
}

#[test]
fn test_name_error_is_located() {
    let source = "x = 1\np(missing)\n";
    let err = runtime_error(source);
    assert_eq!(err.kind, RuntimeErrorKind::Name);
    assert_eq!(err.unit.as_deref(), Some("page"));
    let span = err.span.unwrap();
    assert_eq!(span.text(source), Some("missing"));
    assert_eq!(
        err.located(source),
        "page:2:3: NameError: name 'missing' is not defined"
    );
}

#[test]
fn test_runtime_failures() {
    assert_eq!(runtime_error("p(1 // 0)\n").kind, RuntimeErrorKind::ZeroDivision);
    assert_eq!(runtime_error("x = [1][3]\n").kind, RuntimeErrorKind::Index);
    assert_eq!(runtime_error("x = {}[\"k\"]\n").kind, RuntimeErrorKind::Key);
    assert_eq!(runtime_error("x = 1 + \"a\"\n").kind, RuntimeErrorKind::Type);
    assert_eq!(runtime_error("x = (1).nope\n").kind, RuntimeErrorKind::Attribute);
}

#[test]
fn test_unbounded_recursion_is_an_error() {
    // Debug builds need more than the default test thread stack for the full depth.
    let kind = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| runtime_error("def f(n):\n    return f(n)\nf(1)\n").kind)
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(kind, RuntimeErrorKind::Recursion);
}

#[test]
fn test_deferred_failure_surfaces_at_render() {
    let engine = engine();
    let unit = engine
        .compile_source("page", "with Element():\n    p(\"x\" if boom() else \"y\")\n")
        .unwrap();
    let result = unit.run(&engine, Vec::new()).unwrap();
    let err = result.render().unwrap_err();
    assert!(matches!(
        err,
        Error::Runtime(RuntimeError {
            kind: RuntimeErrorKind::Name,
            ..
        })
    ));
}

#[test]
fn test_compile_errors_reject_before_running() {
    let err = CompiledUnit::compile(
        "page",
        "with Element():\n    with div() as a, span() as b:\n        pass\n",
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
    assert!(err.to_string().starts_with("page: "));
}

#[test]
fn test_loop_control_across_wrapped_blocks_is_rejected() {
    let engine = engine();
    for source in [
        "with ul():\n    for x in [\"a\", \"stop\", \"b\"]:\n        if x == \"stop\":\n            break\n        li(x)\n",
        "with ul():\n    for x in [\"skip\", \"b\"]:\n        if x == \"skip\":\n            continue\n        li(x)\n",
        "def card(t):\n    with div() as c:\n        if not t:\n            return c\n        p(t)\n    return c\ncard(\"\")\n",
    ] {
        let err = engine.compile_source("page", source).unwrap_err();
        assert!(matches!(err, Error::Compile(_)), "{}", err);
    }
}

#[test]
fn test_loop_control_inside_functions() {
    let html = render(
        r#"def upto(items, stop):
    kept = []
    for x in items:
        if x == stop:
            break
        kept.append(x)
    return kept
with ul():
    for x in upto(["a", "stop", "b"], "stop"):
        li(x)
"#,
    );
    assert_eq!(html, "<ul><li>a</li></ul>");
}

