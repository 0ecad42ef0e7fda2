//! blockml - render block-structured HTML templates.

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod cli;
mod config;
mod output;
mod render;

use camino::Utf8PathBuf;
use cli::{Args, Command, CompileArgs};
use config::Config;
use render::{RenderSummary, Renderer};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "BLOCKML_LOG";

fn main() -> ExitCode {
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    init_tracing(args.verbose);

    match run(args) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    let cwd = Utf8PathBuf::try_from(cwd).into_diagnostic()?;
    let explicit = args
        .config
        .clone()
        .map(Utf8PathBuf::try_from)
        .transpose()
        .into_diagnostic()?;
    let config = Config::load(&cwd, explicit.as_deref())?;
    tracing::debug!(root = %config.root, search_paths = ?config.engine.search_paths, "resolved configuration");

    match args.command {
        Command::Render(render_args) => {
            let summary = Renderer::new(config, render_args, args.format).run()?;
            Ok(ExitCode::from(exit_status(&summary)))
        }
        Command::Compile(compile_args) => compile(config, compile_args),
    }
}

fn compile(config: Config, args: CompileArgs) -> Result<ExitCode> {
    let path = Utf8PathBuf::try_from(args.file).into_diagnostic()?;
    let engine = blockml_runtime::Engine::with_loader(config.engine, blockml_runtime::FsLoader);
    match engine.compile_file(&path) {
        Ok(unit) => {
            print!("{}", unit.program_source());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_not_found() => {
            eprintln!("{}", err);
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err).into_diagnostic(),
    }
}

/// `2` when anything was missing, `1` for other failures.
fn exit_status(summary: &RenderSummary) -> u8 {
    if summary.missing_count > 0 {
        2
    } else if summary.error_count > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        let mut summary = RenderSummary::default();
        assert_eq!(exit_status(&summary), 0);
        summary.error_count = 2;
        assert_eq!(exit_status(&summary), 1);
        summary.missing_count = 1;
        assert_eq!(exit_status(&summary), 2);
    }
}
