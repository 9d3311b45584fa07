use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_CONFIG_PATH: &str = "config/quarry.toml";

#[derive(Debug, Parser)]
#[command(
    name = "quarry",
    version,
    about = "Metadata-aware chunking and multi-stage retrieval over document collections"
)]
pub struct Cli {
    /// Path to the TOML configuration file (also read from QUARRY_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// `--config`, then `QUARRY_CONFIG`, then `config/quarry.toml`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        if let Ok(path) = std::env::var("QUARRY_CONFIG") {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed, and index a file or directory
    Index {
        /// File or directory to index
        path: PathBuf,
        /// Job identifier; generated from the current time when omitted
        #[arg(long)]
        job_id: Option<String>,
        /// Where to write the job memory (default: job_memory_<job_id>.json)
        #[arg(long)]
        memory_out: Option<PathBuf>,
    },
    /// Index the input, then retrieve context for a query
    Query {
        /// Natural-language query
        text: String,
        /// File or directory to index before querying
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long)]
        memory_out: Option<PathBuf>,
        /// Print the assembled context as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the compressed digest of a saved job memory
    Memory {
        /// Job memory JSON file
        file: PathBuf,
        /// Token budget for the digest
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}
