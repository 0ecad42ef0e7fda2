//! Rendering of the templates named on the command line.

use crate::cli::{OutputFormat, RenderArgs};
use crate::config::Config;
use crate::output::{Failure, OutputFormatter};
use blockml_runtime::value::Dict;
use blockml_runtime::{Engine, Error, FsLoader, Key, Overrides, Value};
use camino::{Utf8Path, Utf8PathBuf};
use miette::{IntoDiagnostic, Result};
use rayon::prelude::*;
use std::io::Write;
use std::time::Instant;

/// Result of a render run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub file_count: usize,
    pub error_count: usize,
    /// Templates, or units they import, that do not exist.
    pub missing_count: usize,
    pub duration_ms: u64,
}

impl RenderSummary {
    pub fn failed(&self) -> usize {
        self.error_count + self.missing_count
    }
}

/// A template file and the directory its output path is relative to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Template {
    path: Utf8PathBuf,
    base: Utf8PathBuf,
}

pub struct Renderer {
    config: Config,
    args: RenderArgs,
    engine: Engine,
    formatter: OutputFormatter,
}

impl Renderer {
    pub fn new(config: Config, args: RenderArgs, format: OutputFormat) -> Self {
        let mut engine_config = config.engine.clone();
        if args.no_cache {
            engine_config.write_cache = false;
        }
        Self {
            engine: Engine::with_loader(engine_config, FsLoader),
            config,
            args,
            formatter: OutputFormatter::new(format),
        }
    }

    pub fn run(&self) -> Result<RenderSummary> {
        let start = Instant::now();
        let templates = self.find_templates()?;
        if self.args.output.is_some() && templates.len() != 1 {
            miette::bail!("--output needs exactly one template, found {}", templates.len());
        }
        tracing::debug!(count = templates.len(), "found templates");

        let overrides: Vec<(String, serde_json::Value)> = self
            .config
            .overrides
            .iter()
            .chain(&self.args.overrides)
            .cloned()
            .collect();

        let failures: Vec<Failure> = templates
            .par_iter()
            .filter_map(|template| self.render_template(template, &overrides).err())
            .collect();

        let mut summary = RenderSummary {
            file_count: templates.len(),
            ..RenderSummary::default()
        };
        for failure in &failures {
            self.formatter.print_failure(failure);
            if failure.missing {
                summary.missing_count += 1;
            } else {
                summary.error_count += 1;
            }
        }
        summary.duration_ms = start.elapsed().as_millis() as u64;
        self.formatter.print_summary(&summary);
        Ok(summary)
    }

    /// Files named directly, plus every source found under named directories.
    fn find_templates(&self) -> Result<Vec<Template>> {
        let ignore = self.config.ignore_set(&self.args.ignore)?;
        let mut templates = Vec::new();

        for path in &self.args.paths {
            let path = Utf8PathBuf::try_from(path.clone()).into_diagnostic()?;
            if !path.is_dir() {
                let base = path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
                templates.push(Template { path, base });
                continue;
            }

            for entry in walkdir::WalkDir::new(&path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_dir() {
                    continue;
                }
                let Some(file) = Utf8Path::from_path(entry.path()) else {
                    tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 path");
                    continue;
                };
                if !self.config.is_source(file) || ignore.is_match(file) {
                    continue;
                }
                templates.push(Template {
                    path: file.to_path_buf(),
                    base: path.clone(),
                });
            }
        }

        templates.sort();
        templates.dedup_by(|a, b| a.path == b.path);
        Ok(templates)
    }

    fn render_template(
        &self,
        template: &Template,
        overrides: &[(String, serde_json::Value)],
    ) -> Result<(), Failure> {
        let path = &template.path;
        let unit = self.unit_name(path);
        let rendered = self
            .engine
            .compile_file(path)
            .and_then(|compiled| compiled.run(&self.engine, to_overrides(overrides)))
            .and_then(|result| result.render());

        let outcome = rendered.and_then(|html| self.write_output(template, &html));
        outcome.map_err(|err| {
            let source = std::fs::read_to_string(path).ok();
            Failure::new(path, unit, source.as_deref(), err)
        })
    }

    fn unit_name<'a>(&self, path: &'a Utf8Path) -> &'a str {
        let file = path.file_name().unwrap_or(path.as_str());
        file.strip_suffix(self.config.engine.source_suffix.as_str())
            .unwrap_or(file)
    }

    /// Where the HTML for `template` goes; `None` is stdout.
    fn output_path(&self, template: &Template) -> Option<Utf8PathBuf> {
        if let Some(output) = &self.args.output {
            if output.as_os_str() == "-" {
                return None;
            }
            return Some(Utf8PathBuf::from(output.to_string_lossy().as_ref()));
        }
        let file = format!("{}.html", self.unit_name(&template.path));
        match &self.args.out_dir {
            Some(dir) => {
                let dir = Utf8PathBuf::from(dir.to_string_lossy().as_ref());
                let nested = template
                    .path
                    .strip_prefix(&template.base)
                    .ok()
                    .and_then(Utf8Path::parent)
                    .unwrap_or(Utf8Path::new(""));
                Some(dir.join(nested).join(file))
            }
            None => Some(template.path.with_file_name(file)),
        }
    }

    fn write_output(&self, template: &Template, html: &str) -> blockml_runtime::Result<()> {
        let Some(target) = self.output_path(template) else {
            let mut stdout = std::io::stdout().lock();
            return stdout
                .write_all(html.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|err| Error::io("<stdout>", err));
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        std::fs::write(&target, html).map_err(|err| Error::io(&target, err))?;
        tracing::info!(template = %template.path, output = %target, "rendered");
        Ok(())
    }
}

/// Bind JSON values as template variables.
pub fn to_overrides(values: &[(String, serde_json::Value)]) -> Overrides {
    values
        .iter()
        .map(|(name, value)| (name.as_str().into(), json_to_value(value)))
        .collect()
}

pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(entries) => Value::dict(
            entries
                .iter()
                .map(|(key, value)| (Key::Str(key.as_str().into()), json_to_value(value)))
                .collect::<Dict>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;

    fn render_args(paths: Vec<PathBuf>) -> RenderArgs {
        RenderArgs {
            paths,
            overrides: Vec::new(),
            output: None,
            out_dir: None,
            ignore: Vec::new(),
            no_cache: true,
        }
    }

    fn site() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("pages/drafts")).unwrap();
        std::fs::create_dir_all(root.join("parts")).unwrap();
        std::fs::write(root.join("parts/nav.bml"), "with nav():\n    a(\"Home\", href=\"/\")\n").unwrap();
        std::fs::write(
            root.join("pages/home.bml"),
            "import parts.nav as menu\nwith Element(doctype=\"html\"):\n    menu\n    h1(title)\n",
        )
        .unwrap();
        std::fs::write(root.join("pages/drafts/wip.bml"), "p(undefined_name)\n").unwrap();
        std::fs::write(root.join("pages/notes.txt"), "not a template").unwrap();
        (dir, root)
    }

    fn config(root: &Utf8Path) -> Config {
        let mut file = FileConfig::default();
        file.overrides.insert("title".to_string(), json!("Welcome"));
        Config::from_file(root.to_path_buf(), file)
    }

    #[test]
    fn test_json_to_value() {
        let value = json_to_value(&json!({"n": 1, "x": 1.5, "tags": ["a", null, true]}));
        assert_eq!(
            value.repr().unwrap(),
            "{'n': 1, 'tags': ['a', None, True], 'x': 1.5}"
        );
    }

    #[test]
    fn test_renders_directory_next_to_sources() {
        let (_dir, root) = site();
        let mut args = render_args(vec![root.join("pages").into_std_path_buf()]);
        args.ignore.push("**/drafts/**".to_string());
        let summary = Renderer::new(config(&root), args, OutputFormat::Human).run().unwrap();

        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.failed(), 0);
        assert_eq!(
            std::fs::read_to_string(root.join("pages/home.html")).unwrap(),
            "<!DOCTYPE html><nav><a href=\"/\">Home</a></nav><h1>Welcome</h1>"
        );
        assert!(!root.join("pages/home.bmlc").exists());
    }

    #[test]
    fn test_out_dir_keeps_layout_and_counts_failures() {
        let (_dir, root) = site();
        let mut args = render_args(vec![root.join("pages").into_std_path_buf()]);
        args.out_dir = Some(root.join("dist").into_std_path_buf());
        args.overrides.push(("title".to_string(), json!("Override")));
        let summary = Renderer::new(config(&root), args, OutputFormat::Json).run().unwrap();

        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.missing_count, 0);
        assert!(
            std::fs::read_to_string(root.join("dist/home.html"))
                .unwrap()
                .ends_with("<h1>Override</h1>")
        );
        assert!(!root.join("dist/drafts/wip.html").exists());
    }

    #[test]
    fn test_missing_template() {
        let (_dir, root) = site();
        let args = render_args(vec![root.join("pages/absent.bml").into_std_path_buf()]);
        let summary = Renderer::new(config(&root), args, OutputFormat::Human).run().unwrap();
        assert_eq!(summary.missing_count, 1);
        assert_eq!(summary.error_count, 0);
    }

    #[test]
    fn test_output_requires_single_template() {
        let (_dir, root) = site();
        let mut args = render_args(vec![root.join("pages").into_std_path_buf()]);
        args.output = Some(PathBuf::from("-"));
        assert!(Renderer::new(config(&root), args, OutputFormat::Human).run().is_err());
    }

    #[test]
    fn test_explicit_output_file() {
        let (_dir, root) = site();
        let mut args = render_args(vec![root.join("parts/nav.bml").into_std_path_buf()]);
        args.output = Some(root.join("out/menu.html").into_std_path_buf());
        let summary = Renderer::new(config(&root), args, OutputFormat::Human).run().unwrap();
        assert_eq!(summary.failed(), 0);
        assert_eq!(
            std::fs::read_to_string(root.join("out/menu.html")).unwrap(),
            "<nav><a href=\"/\">Home</a></nav>"
        );
    }
}
