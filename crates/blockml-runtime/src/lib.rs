//! Executes compiled blockml units.
//!
//! [`Engine`] finds and compiles units, [`CompiledUnit::run`] executes the
//! rewritten program against a fresh root fragment, and [`UnitResult`]
//! exposes that fragment for rendering or embedding in another tree.
//!
//! ```no_run
//! use blockml_runtime::{Engine, Value};
//!
//! let engine = Engine::global();
//! let unit = engine.compile_source("page", "with Element():\n    h1(title)\n")?;
//! let html = unit.run(engine, vec![("title".into(), Value::str("Hello"))])?.render()?;
//! assert_eq!(html, "<h1>Hello</h1>");
//! # Ok::<(), blockml_runtime::Error>(())
//! ```

pub mod builtins;
pub mod cache;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod loader;
mod methods;
pub mod scope;
pub mod unit;
pub mod value;

pub use builtins::Builtin;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result, RuntimeError, RuntimeErrorKind};
pub use loader::{FsLoader, Loader, MemoryLoader, Source};
pub use unit::{CompiledUnit, Overrides, UnitResult};
pub use value::{Key, Value};
