//! CLI argument parsing for the batch pipeline.
use clap::Parser;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "songprep",
    version,
    about = "Validate a song list, fetch each song and normalize it into a review-aware library",
    after_help = "Input (first match wins):\n  --input <file>   one song per line ('-' reads stdin)\n  --clipboard      read the list through the paste command\n  config `songs`   fallback list from --config\n\nA line may pin its source: `Hey Jude | https://youtu.be/A_MjCqQoLLA`.\n\nExit codes:\n  0  run completed (per-song failures are listed in the summary)\n  1  configuration or I/O error\n  2  empty song list\n  3  validation unavailable\n  4  no song passed validation\n\nExamples:\n  songprep --input songs.txt\n  pbpaste | songprep --input -\n  songprep --clipboard --root ~/Music/incoming --oracle 'llm -m gpt-4o-mini'"
)]
pub struct RootArgs {
    /// Library root (default: <downloads>/youtube_songs)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Song list file, or '-' for stdin
    #[arg(long, value_name = "PATH", conflicts_with = "clipboard")]
    pub input: Option<PathBuf>,

    /// Read the song list from the clipboard
    #[arg(long)]
    pub clipboard: bool,

    /// Oracle command line; the prompt is written to its stdin
    #[arg(long, value_name = "CMD", conflicts_with = "oracle_http")]
    pub oracle: Option<String>,

    /// Use the HTTP oracle from the config instead of a command
    #[arg(long)]
    pub oracle_http: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Do not check that the download and transcode tools are on PATH
    #[arg(long)]
    pub skip_preflight: bool,
}
