//! Unit discovery, imports and the compiled cache.

use blockml_runtime::{Engine, EngineConfig, Error, FsLoader, MemoryLoader, RuntimeErrorKind, cache};
use camino::Utf8PathBuf;
use pretty_assertions::assert_eq;

const NAV: &str = r#"def link(href, label):
    return a(label, href=href)

with nav():
    link("/", "Home")
"#;

const PAGE: &str = r#"import parts.nav as menu
from parts.nav import link

with Element():
    menu
    link("/about", "About")
"#;

fn memory_engine(units: &[(&str, &str)]) -> Engine {
    let loader = units
        .iter()
        .fold(MemoryLoader::new(), |loader, (name, text)| loader.with(name, text));
    Engine::with_loader(EngineConfig::default(), loader)
}

#[test]
fn test_imported_units_embed_and_export() {
    let engine = memory_engine(&[("parts.nav", NAV), ("page", PAGE)]);
    assert_eq!(
        engine.render("page", Vec::new()).unwrap(),
        "<nav><a href=\"/\">Home</a></nav><a href=\"/about\">About</a>"
    );
}

#[test]
fn test_unit_result_exposes_globals() {
    let engine = memory_engine(&[("parts.nav", NAV)]);
    let result = engine.load("parts.nav").unwrap().run(&engine, Vec::new()).unwrap();
    assert_eq!(result.name(), "parts.nav");
    assert!(result.get("link").is_some_and(|v| v.is_callable()));
    assert!(result.get("missing").is_none());
}

#[test]
fn test_circular_import_fails() {
    let engine = memory_engine(&[("a", "import b\np()\n"), ("b", "import a\np()\n")]);
    match engine.render("a", Vec::new()) {
        Err(Error::Runtime(err)) => {
            assert_eq!(err.kind, RuntimeErrorKind::Import);
            assert!(err.message.contains("a -> b -> a"), "{}", err.message);
        }
        other => panic!("expected an import error, got {:?}", other),
    }
}

#[test]
fn test_missing_import_is_not_found() {
    let engine = memory_engine(&[("page", "import nowhere\np()\n")]);
    let err = engine.render("page", Vec::new()).unwrap_err();
    assert!(err.is_not_found(), "{}", err);
}

#[test]
fn test_import_of_unknown_name() {
    let engine = memory_engine(&[("lib", "x = 1\n"), ("page", "from lib import y\n")]);
    match engine.render("page", Vec::new()) {
        Err(Error::Runtime(err)) => assert_eq!(err.kind, RuntimeErrorKind::Import),
        other => panic!("expected an import error, got {:?}", other),
    }
}

fn site() -> (tempfile::TempDir, Utf8PathBuf, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    std::fs::create_dir(root.join("parts")).unwrap();
    std::fs::write(root.join("parts/nav.bml"), NAV).unwrap();
    std::fs::write(root.join("page.bml"), PAGE).unwrap();
    let config = EngineConfig {
        search_paths: vec![root.clone()],
        ..EngineConfig::default()
    };
    (dir, root, Engine::with_loader(config, FsLoader))
}

#[test]
fn test_file_units_write_and_reuse_cache() {
    let (_dir, root, engine) = site();
    let expected = "<nav><a href=\"/\">Home</a></nav><a href=\"/about\">About</a>";
    assert_eq!(engine.render("page", Vec::new()).unwrap(), expected);

    let cached = std::fs::read_to_string(root.join("page.bmlc")).unwrap();
    assert!(cached.starts_with(&cache::header()));
    assert!(root.join("parts/nav.bmlc").exists());

    engine.clear_units();
    assert_eq!(engine.render("page", Vec::new()).unwrap(), expected);
}

#[test]
fn test_cache_holds_rewritten_program() {
    let (_dir, root, engine) = site();
    engine.load("parts.nav").unwrap();
    let cached = std::fs::read_to_string(root.join("parts/nav.bmlc")).unwrap();
    let program = cache::decode(&cached).unwrap();
    insta::assert_snapshot!(program.trim_end(), @r#"
    from blockml import a, nav, Element
    def link(href, label):
        return a(label, href=href)
    with nav() as __nav_1__:
        __nav_1__.append(link("/", "Home"))
    __document__.append(__nav_1__)
    del __nav_1__
    "#);
}

#[test]
fn test_foreign_cache_is_recompiled() {
    let (_dir, root, engine) = site();
    std::fs::write(root.join("page.bmlc"), "# blockml-compiled v0.0.0\nraise()\n").unwrap();
    assert_eq!(
        engine.render("page", Vec::new()).unwrap(),
        "<nav><a href=\"/\">Home</a></nav><a href=\"/about\">About</a>"
    );
    let cached = std::fs::read_to_string(root.join("page.bmlc")).unwrap();
    assert!(cached.starts_with(&cache::header()));
}

#[test]
fn test_cache_writes_can_be_disabled() {
    let (_dir, root, engine) = site();
    engine.update_config(|config| config.write_cache = false);
    engine.render("page", Vec::new()).unwrap();
    assert!(!root.join("page.bmlc").exists());
}

#[test]
fn test_compile_file() {
    let (_dir, root, engine) = site();
    let unit = engine.compile_file(&root.join("parts/nav.bml")).unwrap();
    assert_eq!(unit.name(), "nav");
    assert_eq!(unit.origin(), Some(root.join("parts/nav.bml").as_path()));
    assert_eq!(
        unit.run(&engine, Vec::new()).unwrap().render().unwrap(),
        "<nav><a href=\"/\">Home</a></nav>"
    );

    let err = engine.compile_file(&root.join("missing.bml")).unwrap_err();
    assert!(err.is_not_found());
}
