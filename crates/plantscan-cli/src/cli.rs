//! CLI definition using clap

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use plantscan_types::{OutputFormat, Season, UserRole};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plantscan")]
#[command(version)]
#[command(about = "Invasive plant identification from photos using LLM vision models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Model name override
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Provider endpoint override
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Output format (json, table). Uses config value if not specified.
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Observation context shared by analyze and batch
#[derive(Args, Debug, Clone, Default)]
pub struct ObservationArgs {
    /// Region to assess invasiveness against (e.g. "Texas"). Uses config default if not specified.
    #[arg(long, short = 'r')]
    pub region: Option<String>,

    /// Observation date (YYYY-MM-DD). Read from EXIF if not specified.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Season (spring, summer, fall, winter). Derived from the date if not specified.
    #[arg(long, value_enum)]
    pub season: Option<Season>,

    /// Do not read the capture date from EXIF
    #[arg(long)]
    pub no_exif: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a single plant photo
    Analyze {
        /// Path to image file
        image: PathBuf,

        #[command(flatten)]
        observation: ObservationArgs,

        /// Image MIME type. Detected from the file if not specified.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Batch analyze images in a folder
    Batch {
        /// Path to folder containing images
        folder: PathBuf,

        #[command(flatten)]
        observation: ObservationArgs,

        /// Output file for results (JSON)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Number of parallel analyses. 0 or unset = CPU count.
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
    },

    /// Ask a question about plants or invasive species
    Chat {
        /// The question
        question: String,

        /// Species identified earlier
        #[arg(long)]
        species: Option<String>,

        /// Your region
        #[arg(long, short = 'r')]
        region: Option<String>,

        /// Whether the species was found invasive (true, false)
        #[arg(long)]
        invasive: Option<bool>,

        /// Who is asking (student, homeowner, land-manager, general)
        #[arg(long, value_enum)]
        role: Option<UserRole>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set provider endpoint
        #[arg(long)]
        set_endpoint: Option<String>,

        /// Set model
        #[arg(long)]
        set_model: Option<String>,

        /// Set API key (stored in the config file; LLM_KEY takes precedence)
        #[arg(long)]
        set_key: Option<String>,

        /// Set wire dialect (chat-completions, generate-content, auto)
        #[arg(long)]
        set_dialect: Option<String>,

        /// Set default region
        #[arg(long)]
        set_region: Option<String>,

        /// Set default output format
        #[arg(long)]
        set_output: Option<OutputFormat>,

        /// Ask for confidence score and reasoning
        #[arg(long)]
        set_confidence: Option<bool>,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}
