use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod acquire;
mod cli;
mod config;
mod error;
mod input;
mod layout;
mod oracle;
mod pipeline;
mod processing;
mod runner;
mod sanitize;
mod song;
mod summary;
#[cfg(test)]
mod testing;
mod util;
mod validation;

use crate::acquire::YtDlp;
use crate::cli::RootArgs;
use crate::config::{
    default_config, load_config, resolve_oracle_command, resolve_paste_command, resolve_root,
    SongprepConfig,
};
use crate::error::ValidationError;
use crate::input::{parse_song_list, read_input, InputSource};
use crate::layout::LibraryPaths;
use crate::oracle::log::OracleLog;
use crate::oracle::{CommandOracle, HttpOracle, Oracle};
use crate::pipeline::{run_pipeline, Collaborators, PipelineOptions, RunOutcome};
use crate::processing::{Ffmpeg, LoftyProbe};

/// Environment variable holding the tracing filter.
const LOG_ENV: &str = "SONGPREP_LOG";

const EXIT_ERROR: u8 = 1;
const EXIT_EMPTY_INPUT: u8 = 2;
const EXIT_VALIDATION_UNAVAILABLE: u8 = 3;
const EXIT_NOTHING_VALID: u8 = 4;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            if err.downcast_ref::<ValidationError>().is_some() {
                tracing::error!(error = %err, "oracle validation unavailable; aborting run");
                eprintln!("error: {err}");
                return ExitCode::from(EXIT_VALIDATION_UNAVAILABLE);
            }
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn run(args: &RootArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config(),
    };

    if !args.skip_preflight {
        preflight(&config)?;
    }

    let source = input_source(args, &config);
    tracing::info!(source = %source.describe(), "reading song list");
    let entries = parse_song_list(&read_input(&source)?);

    let paths = LibraryPaths::new(resolve_root(args.root.as_deref(), &config));
    tracing::info!(root = %paths.root().display(), "library root");

    let oracle = build_oracle(args, &config)?;
    let media = YtDlp::from_command_line(
        &config.tools.downloader,
        config.timeouts.search(),
        config.timeouts.download(),
    )?;
    let transcoder =
        Ffmpeg::from_command_line(&config.tools.transcoder, config.timeouts.transcode())?;
    let probe = LoftyProbe;
    let collaborators = Collaborators {
        oracle: oracle.as_ref(),
        media: &media,
        transcoder: &transcoder,
        probe: &probe,
    };
    let options = PipelineOptions {
        retry_backoff: config.oracle.retry_backoff(),
        oracle_log: OracleLog::at(paths.oracle_log_path()),
    };

    match run_pipeline(&entries, &paths, &collaborators, &options)? {
        RunOutcome::EmptyInput => {
            eprintln!("No songs to process: the song list from {} is empty.", source.describe());
            Ok(ExitCode::from(EXIT_EMPTY_INPUT))
        }
        RunOutcome::NothingValid(summary) => {
            print!("{}", summary.render());
            println!("\nNo song passed validation; nothing was downloaded.");
            summary.write_report(&paths.run_report_path())?;
            Ok(ExitCode::from(EXIT_NOTHING_VALID))
        }
        RunOutcome::Completed(summary) => {
            print!("{}", summary.render());
            let report = paths.run_report_path();
            summary.write_report(&report)?;
            tracing::info!(report = %report.display(), "run report written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Fail early when the download or transcode tool is missing.
fn preflight(config: &SongprepConfig) -> Result<()> {
    for (label, command) in [
        ("tools.downloader", &config.tools.downloader),
        ("tools.transcoder", &config.tools.transcoder),
    ] {
        let argv = runner::split_command(command).with_context(|| format!("parse {label}"))?;
        let program = &argv[0];
        let resolved = which::which(program).map_err(|err| {
            anyhow!(
                "{program} not found on PATH ({label}): {err}; \
                 install it or pass --skip-preflight"
            )
        })?;
        tracing::debug!(program = %program, path = %resolved.display(), "preflight ok");
    }
    Ok(())
}

fn input_source(args: &RootArgs, config: &SongprepConfig) -> InputSource {
    match &args.input {
        Some(path) if path.as_os_str() == "-" => InputSource::Stdin,
        Some(path) => InputSource::File(path.clone()),
        None if args.clipboard => InputSource::Clipboard {
            paste_command: resolve_paste_command(config),
        },
        None if !config.songs.is_empty() => InputSource::Listed(config.songs.clone()),
        None => InputSource::Clipboard {
            paste_command: resolve_paste_command(config),
        },
    }
}

/// `--oracle` wins; otherwise the configured HTTP endpoint, otherwise a command.
fn build_oracle(args: &RootArgs, config: &SongprepConfig) -> Result<Box<dyn Oracle>> {
    let timeout = config.timeouts.oracle();
    if args.oracle.is_none() {
        if let Some(http) = &config.oracle.http {
            let oracle = HttpOracle::new(http, timeout);
            tracing::info!(endpoint = oracle.endpoint(), "using HTTP oracle");
            return Ok(Box::new(oracle));
        }
        if args.oracle_http {
            return Err(anyhow!(
                "--oracle-http needs an oracle.http section in the config file"
            ));
        }
    }
    let command = resolve_oracle_command(args.oracle.as_deref(), config);
    let oracle = CommandOracle::from_command_line(&command, timeout)?;
    tracing::info!(program = oracle.program(), "using command oracle");
    Ok(Box::new(oracle))
}
