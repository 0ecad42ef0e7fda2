//! Unit discovery.
//!
//! A [`Loader`] maps a dotted unit name to its source and optionally keeps a
//! cached copy of the compiled program next to it.

use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::io;
use std::sync::RwLock;

/// Source text backing a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: SmolStr,
    pub text: String,
    /// Where the text came from, when it has a file.
    pub origin: Option<Utf8PathBuf>,
}

pub trait Loader: Send + Sync {
    /// Find the source of `name`; `None` when no source exists.
    fn find(&self, name: &str, config: &EngineConfig) -> Result<Option<Source>>;

    /// Raw contents of a cache entry that is at least as new as `source`.
    fn read_cache(&self, _source: &Source, _config: &EngineConfig) -> Result<Option<String>> {
        Ok(None)
    }

    fn write_cache(&self, _source: &Source, _encoded: &str, _config: &EngineConfig) -> Result<()> {
        Ok(())
    }
}

/// Resolves `a.b` to `<search path>/a/b<source suffix>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }

    /// Path of `name` relative to a search path.
    pub fn relative_path(name: &str, config: &EngineConfig) -> Utf8PathBuf {
        let mut path: Utf8PathBuf = name.split('.').collect();
        let file = format!(
            "{}{}",
            path.file_name().unwrap_or(name),
            config.source_suffix
        );
        path.set_file_name(file);
        path
    }

    /// Cache file for a source file: the source suffix swapped for the cache suffix.
    pub fn cache_path(origin: &Utf8Path, config: &EngineConfig) -> Utf8PathBuf {
        let text = origin.as_str();
        let stem = text.strip_suffix(config.source_suffix.as_str()).unwrap_or(text);
        Utf8PathBuf::from(format!("{}{}", stem, config.cache_suffix))
    }
}

impl Loader for FsLoader {
    fn find(&self, name: &str, config: &EngineConfig) -> Result<Option<Source>> {
        let relative = Self::relative_path(name, config);
        for root in &config.search_paths {
            let path = root.join(&relative);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    return Ok(Some(Source {
                        name: SmolStr::new(name),
                        text,
                        origin: Some(path),
                    }));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::io(path, err)),
            }
        }
        Ok(None)
    }

    fn read_cache(&self, source: &Source, config: &EngineConfig) -> Result<Option<String>> {
        let Some(origin) = &source.origin else {
            return Ok(None);
        };
        let cache = Self::cache_path(origin, config);
        let modified = |path: &Utf8Path| std::fs::metadata(path).and_then(|m| m.modified());
        match (modified(origin), modified(&cache)) {
            (Ok(source_time), Ok(cache_time)) if cache_time >= source_time => {}
            _ => return Ok(None),
        }
        match std::fs::read_to_string(&cache) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(cache, err)),
        }
    }

    fn write_cache(&self, source: &Source, encoded: &str, config: &EngineConfig) -> Result<()> {
        let Some(origin) = &source.origin else {
            return Ok(());
        };
        let cache = Self::cache_path(origin, config);
        std::fs::write(&cache, encoded).map_err(|err| Error::io(cache, err))
    }
}

/// Sources held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    sources: RwLock<FxHashMap<SmolStr, String>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, builder style.
    pub fn with(self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&self, name: &str, text: &str) {
        if let Ok(mut sources) = self.sources.write() {
            sources.insert(SmolStr::new(name), text.to_string());
        }
    }
}

impl Loader for MemoryLoader {
    fn find(&self, name: &str, _config: &EngineConfig) -> Result<Option<Source>> {
        let sources = self.sources.read().map_err(|_| {
            Error::io("<memory>", io::Error::other("source map lock poisoned"))
        })?;
        Ok(sources.get(name).map(|text| Source {
            name: SmolStr::new(name),
            text: text.clone(),
            origin: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_and_cache_paths() {
        let config = EngineConfig::default();
        assert_eq!(
            FsLoader::relative_path("pages.home", &config),
            Utf8PathBuf::from("pages/home.bml")
        );
        assert_eq!(
            FsLoader::cache_path(Utf8Path::new("site/pages/home.bml"), &config),
            Utf8PathBuf::from("site/pages/home.bmlc")
        );
    }

    #[test]
    fn test_fs_loader_searches_paths_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_root = Utf8PathBuf::from_path_buf(first.path().to_path_buf()).unwrap();
        let second_root = Utf8PathBuf::from_path_buf(second.path().to_path_buf()).unwrap();
        std::fs::create_dir(second_root.join("parts")).unwrap();
        std::fs::write(second_root.join("parts/nav.bml"), "nav()\n").unwrap();

        let config = EngineConfig {
            search_paths: vec![first_root, second_root.clone()],
            ..EngineConfig::default()
        };
        let source = FsLoader.find("parts.nav", &config).unwrap().unwrap();
        assert_eq!(source.text, "nav()\n");
        assert_eq!(source.origin, Some(second_root.join("parts/nav.bml")));
        assert!(FsLoader.find("parts.missing", &config).unwrap().is_none());
    }

    #[test]
    fn test_fs_loader_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("page.bml"), "p()\n").unwrap();
        let config = EngineConfig {
            search_paths: vec![root.clone()],
            ..EngineConfig::default()
        };

        let source = FsLoader.find("page", &config).unwrap().unwrap();
        assert_eq!(FsLoader.read_cache(&source, &config).unwrap(), None);
        FsLoader.write_cache(&source, "cached", &config).unwrap();
        assert!(root.join("page.bmlc").exists());
        assert_eq!(
            FsLoader.read_cache(&source, &config).unwrap().as_deref(),
            Some("cached")
        );
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with("a", "x = 1\n");
        let config = EngineConfig::default();
        assert_eq!(loader.find("a", &config).unwrap().unwrap().text, "x = 1\n");
        assert!(loader.find("b", &config).unwrap().is_none());
    }
}
