use std::path::PathBuf;

use clap::{Parser, Subcommand};
use guardian_core::Priority;

#[derive(Parser)]
#[command(name = "guardian", about = "Guardian: spoken scene awareness for blind and low-vision users")]
pub struct Cli {
    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline against a synthetic camera and simulated detectors.
    /// Voice commands are read from stdin, one per line.
    Simulate {
        /// Stop after this many seconds (runs until Ctrl-C or "exit" otherwise)
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Comma-separated names the simulated face recognizer knows
        #[arg(long, value_delimiter = ',', default_value = "Alice,Bob")]
        seed_faces: Vec<String>,
    },

    /// Speak a single announcement through the configured engine
    Say {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "high")]
        priority: Priority,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,

    /// List the recognized voice commands
    Commands,
}
