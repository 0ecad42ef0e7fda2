//! Configuration loading and management.

use blockml_runtime::EngineConfig;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "blockml.json";

/// Contents of `blockml.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub source_suffix: Option<String>,
    pub cache_suffix: Option<String>,
    /// Whether imports may load other units by name.
    pub discovery: Option<bool>,
    pub write_cache: Option<bool>,
    /// Import roots, relative to the configuration file.
    pub search_paths: Vec<Utf8PathBuf>,
    pub ignore: Vec<String>,
    /// Variables pre-bound in every rendered template.
    pub overrides: IndexMap<String, serde_json::Value>,
}

impl FileConfig {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {}", path))?;
        serde_json::from_str(&content)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to parse {}", path))
    }

    /// Find blockml.json in a directory or its parents.
    pub fn find(dir: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = dir;
        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the configuration file, or the working directory.
    pub root: Utf8PathBuf,
    pub engine: EngineConfig,
    pub ignore_patterns: Vec<String>,
    /// Configured overrides followed by command-line ones; later entries win.
    pub overrides: Vec<(String, serde_json::Value)>,
}

impl Config {
    /// Resolve settings from an explicit or discovered `blockml.json`.
    pub fn load(cwd: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(cwd.join(path)),
            None => FileConfig::find(cwd),
        };
        match path {
            Some(path) => {
                tracing::debug!(config = %path, "loading configuration");
                let file = FileConfig::load(&path)?;
                let root = path.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
                Ok(Self::from_file(root, file))
            }
            None => Ok(Self::from_file(cwd.to_path_buf(), FileConfig::default())),
        }
    }

    pub fn from_file(root: Utf8PathBuf, file: FileConfig) -> Self {
        let defaults = EngineConfig::default();
        let search_paths = if file.search_paths.is_empty() {
            vec![root.clone()]
        } else {
            file.search_paths.iter().map(|path| root.join(path)).collect()
        };
        let engine = EngineConfig {
            discovery_enabled: file.discovery.unwrap_or(defaults.discovery_enabled),
            source_suffix: file.source_suffix.unwrap_or(defaults.source_suffix),
            cache_suffix: file.cache_suffix.unwrap_or(defaults.cache_suffix),
            search_paths,
            write_cache: file.write_cache.unwrap_or(defaults.write_cache),
        };

        let mut ignore_patterns = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
        ignore_patterns.extend(file.ignore);

        Self {
            root,
            engine,
            ignore_patterns,
            overrides: file.overrides.into_iter().collect(),
        }
    }

    /// Compile the ignore patterns together with `extra`.
    pub fn ignore_set(&self, extra: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in self.ignore_patterns.iter().chain(extra) {
            let glob = Glob::new(pattern)
                .into_diagnostic()
                .wrap_err_with(|| format!("Invalid ignore pattern '{}'", pattern))?;
            builder.add(glob);
        }
        builder.build().into_diagnostic()
    }

    /// Whether `path` names a template source.
    pub fn is_source(&self, path: &Utf8Path) -> bool {
        path.as_str().ends_with(self.engine.source_suffix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_file_config_is_camel_case() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "sourceSuffix": ".tpl",
                "writeCache": false,
                "searchPaths": ["templates"],
                "ignore": ["**/drafts/**"],
                "overrides": {"site": "Example", "year": 2026}
            }"#,
        )
        .unwrap();
        let config = Config::from_file(Utf8PathBuf::from("/site"), file);
        assert_eq!(config.engine.source_suffix, ".tpl");
        assert_eq!(config.engine.cache_suffix, ".bmlc");
        assert!(config.engine.discovery_enabled);
        assert!(!config.engine.write_cache);
        assert_eq!(config.engine.search_paths, vec![Utf8PathBuf::from("/site/templates")]);
        assert_eq!(
            config.overrides,
            vec![
                ("site".to_string(), json!("Example")),
                ("year".to_string(), json!(2026)),
            ]
        );
        assert!(config.is_source(Utf8Path::new("a/page.tpl")));
        assert!(!config.is_source(Utf8Path::new("a/page.bml")));
    }

    #[test]
    fn test_defaults_search_the_root() {
        let config = Config::from_file(Utf8PathBuf::from("/work"), FileConfig::default());
        assert_eq!(config.engine.search_paths, vec![Utf8PathBuf::from("/work")]);
        assert_eq!(config.engine.source_suffix, ".bml");
    }

    #[test]
    fn test_find_searches_parents() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("pages/blog")).unwrap();
        std::fs::write(root.join(CONFIG_FILE), r#"{"discovery": false}"#).unwrap();

        assert_eq!(FileConfig::find(&root.join("pages/blog")), Some(root.join(CONFIG_FILE)));
        let config = Config::load(&root.join("pages/blog"), None).unwrap();
        assert_eq!(config.root, root);
        assert!(!config.engine.discovery_enabled);
    }

    #[test]
    fn test_ignore_set() {
        let config = Config::from_file(Utf8PathBuf::from("/work"), FileConfig::default());
        let set = config.ignore_set(&["**/drafts/**".to_string()]).unwrap();
        assert!(set.is_match("/work/drafts/a.bml"));
        assert!(set.is_match("/work/.git/x.bml"));
        assert!(!set.is_match("/work/pages/a.bml"));
        assert!(config.ignore_set(&["[".to_string()]).is_err());
    }
}
