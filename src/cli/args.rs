//! CLI argument definitions using clap
//!
//! Every command operates on one store file:
//! - tagstore tags --file <path>
//! - tagstore get --file <path> --tag <tag>
//! - tagstore put --file <path> --tag <tag> (--value <text> | --input <path>)
//! - tagstore delete --file <path> --tag <tag>
//! - tagstore length --file <path>
//! - tagstore verify --file <path>
//! - tagstore export --file <path> --output <path>
//! - tagstore import --file <path> --input <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tagstore - a tag-indexed chunk store
#[derive(Parser, Debug)]
#[command(name = "tagstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every event, including per-entry cache activity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List live tags in insertion order
    Tags {
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the value stored under a tag
    Get {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        tag: String,
    },

    /// Store a value under a tag, replacing any previous value
    Put {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        tag: String,
        /// Value given as UTF-8 text
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        value: Option<String>,
        /// Read the value from a file
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Remove the entry for a tag
    Delete {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        tag: String,
    },

    /// Count live entries
    Length {
        #[arg(long)]
        file: PathBuf,
    },

    /// Check the store for a malformed tail and duplicate tags
    Verify {
        #[arg(long)]
        file: PathBuf,
    },

    /// Write the raw store image to a file
    Export {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Replace the store content with a raw image
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
