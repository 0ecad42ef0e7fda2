//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Render block-structured HTML templates
#[derive(Parser, Debug, Clone)]
#[command(name = "blockml")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to blockml.json (searched upward from the working directory by default)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render templates to HTML
    Render(RenderArgs),
    /// Print the rewritten program of a template
    Compile(CompileArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// Template files or directories to walk
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Pre-bind a template variable, the value parsed as JSON (bare words are strings)
    #[arg(long = "set", value_name = "KEY=JSON", value_parser = parse_override)]
    pub overrides: Vec<(String, serde_json::Value)>,

    /// Write a single rendered template here (`-` for stdout)
    #[arg(short, long, conflicts_with = "out_dir")]
    pub output: Option<PathBuf>,

    /// Directory receiving `<name>.html` files instead of the source directories
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Ignore patterns (glob)
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Do not write compiled caches
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompileArgs {
    /// Template file
    pub file: PathBuf,
}

/// Output format for failures and the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// One JSON object per line
    Json,
}

/// Parse `KEY=JSON`.
pub fn parse_override(arg: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in '{}'", arg));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("n=3").unwrap(), ("n".to_string(), json!(3)));
        assert_eq!(
            parse_override("items=[\"a\", \"b\"]").unwrap(),
            ("items".to_string(), json!(["a", "b"]))
        );
        assert_eq!(
            parse_override("title=Hello world").unwrap(),
            ("title".to_string(), json!("Hello world"))
        );
        assert_eq!(parse_override("eq=a=b").unwrap().1, json!("a=b"));
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=1").is_err());
    }

    #[test]
    fn test_parse_render_command() {
        let args = Args::parse_from([
            "blockml", "render", "site", "--set", "title=\"Home\"", "--out-dir", "dist", "-v",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::Render(render) => {
                assert_eq!(render.paths, vec![PathBuf::from("site")]);
                assert_eq!(render.overrides, vec![("title".to_string(), json!("Home"))]);
                assert_eq!(render.out_dir, Some(PathBuf::from("dist")));
            }
            other => panic!("expected render, got {:?}", other),
        }
    }

    #[test]
    fn test_output_conflicts_with_out_dir() {
        let result = Args::try_parse_from(["blockml", "render", "a.bml", "-o", "-", "--out-dir", "d"]);
        assert!(result.is_err());
    }
}
