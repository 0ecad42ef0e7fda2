//! Compilation context shared by every unit.
//!
//! An [`Engine`] holds the tag registry, the discovery settings and the
//! loader. Pass one explicitly, or use [`Engine::global`] for the lazily
//! created process default.

use crate::cache;
use crate::error::{Error, Result};
use crate::loader::{FsLoader, Loader, Source};
use crate::unit::{CompiledUnit, Overrides};
use blockml_dom::TagRegistry;
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::sync::{Arc, Mutex, RwLock};

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// When off, no unit can be loaded by name.
    pub discovery_enabled: bool,
    pub source_suffix: String,
    pub cache_suffix: String,
    /// Roots searched in order for `a/b<source suffix>`.
    pub search_paths: Vec<Utf8PathBuf>,
    pub write_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_enabled: true,
            source_suffix: ".bml".to_string(),
            cache_suffix: ".bmlc".to_string(),
            search_paths: vec![Utf8PathBuf::from(".")],
            write_cache: true,
        }
    }
}

static GLOBAL: Lazy<Engine> = Lazy::new(Engine::new);

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: TagRegistry,
    config: RwLock<EngineConfig>,
    loader: Box<dyn Loader>,
    units: Mutex<FxHashMap<SmolStr, CompiledUnit>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine loading from the file system with default settings.
    pub fn new() -> Self {
        Self::with_loader(EngineConfig::default(), FsLoader)
    }

    pub fn with_loader(config: EngineConfig, loader: impl Loader + 'static) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry: TagRegistry::new(),
                config: RwLock::new(config),
                loader: Box::new(loader),
                units: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// The process-default engine.
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.inner.registry
    }

    /// A snapshot of the current settings.
    pub fn config(&self) -> EngineConfig {
        match self.inner.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Change settings. Units already compiled are unaffected.
    pub fn update_config(&self, update: impl FnOnce(&mut EngineConfig)) {
        let mut config = match self.inner.config.write() {
            Ok(config) => config,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut config);
    }

    /// Forget units compiled by [`load`](Self::load).
    pub fn clear_units(&self) {
        if let Ok(mut units) = self.inner.units.lock() {
            units.clear();
        }
    }

    /// Find, compile and remember the unit `name`.
    pub fn load(&self, name: &str) -> Result<CompiledUnit> {
        let config = self.config();
        if !config.discovery_enabled {
            tracing::debug!(unit = name, "discovery disabled");
            return Err(Error::not_found(name));
        }
        if let Some(unit) = self.cached_unit(name) {
            return Ok(unit);
        }

        let source = self
            .inner
            .loader
            .find(name, &config)?
            .ok_or_else(|| Error::not_found(name))?;
        tracing::debug!(unit = name, origin = ?source.origin, "loaded source");

        let unit = self.compile_cached(&source, &config)?;
        if let Ok(mut units) = self.inner.units.lock() {
            units.insert(SmolStr::new(name), unit.clone());
        }
        Ok(unit)
    }

    /// Compile `source` without touching the loader or cache.
    pub fn compile_source(&self, name: &str, source: &str) -> Result<CompiledUnit> {
        tracing::debug!(unit = name, "compiling source");
        CompiledUnit::compile(name, source, None)
    }

    /// Compile a template file, reusing its cache entry when current.
    ///
    /// The unit is named after the file stem.
    pub fn compile_file(&self, path: &Utf8Path) -> Result<CompiledUnit> {
        let text = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path.as_str()),
            _ => Error::io(path, err),
        })?;
        let config = self.config();
        let name = path
            .file_name()
            .map(|file| file.strip_suffix(config.source_suffix.as_str()).unwrap_or(file))
            .unwrap_or(path.as_str());
        let source = Source {
            name: SmolStr::new(name),
            text,
            origin: Some(path.to_path_buf()),
        };
        self.compile_cached(&source, &config)
    }

    /// Load, run and render the unit `name`.
    pub fn render(&self, name: &str, overrides: Overrides) -> Result<String> {
        self.load(name)?.run(self, overrides)?.render()
    }

    fn cached_unit(&self, name: &str) -> Option<CompiledUnit> {
        self.inner
            .units
            .lock()
            .ok()
            .and_then(|units| units.get(name).cloned())
    }

    fn compile_cached(&self, source: &Source, config: &EngineConfig) -> Result<CompiledUnit> {
        match self.inner.loader.read_cache(source, config) {
            Ok(Some(text)) => match cache::decode(&text).map(blockml_syntax::parse) {
                Some(Ok(program)) => {
                    tracing::debug!(unit = %source.name, "compiled cache hit");
                    return Ok(CompiledUnit::from_program(
                        &source.name,
                        program,
                        source.origin.clone(),
                    ));
                }
                Some(Err(err)) => {
                    tracing::warn!(unit = %source.name, error = %err, "ignoring unreadable compiled cache");
                }
                None => tracing::debug!(unit = %source.name, "compiled cache is stale"),
            },
            Ok(None) => tracing::debug!(unit = %source.name, "compiled cache miss"),
            Err(err) => {
                tracing::warn!(unit = %source.name, error = %err, "failed to read compiled cache");
            }
        }

        tracing::debug!(unit = %source.name, "compiling unit");
        let unit = CompiledUnit::compile(&source.name, &source.text, source.origin.clone())?;

        if config.write_cache {
            let encoded = cache::encode(unit.program());
            match self.inner.loader.write_cache(source, &encoded, config) {
                Ok(()) => tracing::debug!(unit = %source.name, "wrote compiled cache"),
                Err(err) => {
                    tracing::warn!(unit = %source.name, error = %err, "failed to write compiled cache");
                }
            }
        }
        Ok(unit)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config())
            .field("tags", &self.inner.registry.len())
            .finish()
    }
}
