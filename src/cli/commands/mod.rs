//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod init;
mod jobs;
mod pages;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Settings;
use crate::jobs::JobType;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Concurrent AI transcription for historical documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ~/.config/folio/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Job type as given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum JobArg {
    /// Transcribe page images
    Htr,
    /// Correct existing transcriptions
    Correct,
    /// Translate the best available text
    Translate,
    /// Extract metadata headers
    Metadata,
}

impl From<JobArg> for JobType {
    fn from(arg: JobArg) -> Self {
        match arg {
            JobArg::Htr => JobType::Htr,
            JobArg::Correct => JobType::Correct,
            JobArg::Translate => JobType::Translate,
            JobArg::Metadata => JobType::Metadata,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project directory
    Init {
        /// Project directory (created if missing)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Append every image in a directory as a new page
    AddImages {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
        /// Directory containing page images
        dir: PathBuf,
    },

    /// Import a PDF, one page per image
    Import {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
        /// PDF file to import
        pdf: PathBuf,
    },

    /// Run a transcription job over the project's pages
    Run {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
        /// Job to run
        #[arg(value_enum)]
        job: JobArg,
        /// Page numbers to process, e.g. 1,3,5 (default: all pages)
        #[arg(long, value_delimiter = ',')]
        pages: Vec<u32>,
        /// Preset to use instead of the job's default
        #[arg(long)]
        preset: Option<String>,
    },

    /// List pages and which text fields they hold
    Pages {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// List the preset catalog
    Presets,

    /// Report backend credentials and PDF tool availability
    Check,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { dir } => init::cmd_init(&dir),
        Commands::AddImages { project, dir } => {
            jobs::cmd_add_images(&settings, &project, &dir).await
        }
        Commands::Import { project, pdf } => jobs::cmd_import(&settings, &project, &pdf).await,
        Commands::Run {
            project,
            job,
            pages,
            preset,
        } => jobs::cmd_run(&settings, &project, job.into(), &pages, preset).await,
        Commands::Pages { project } => pages::cmd_pages(&project),
        Commands::Presets => pages::cmd_presets(&settings),
        Commands::Check => check::cmd_check(&settings),
    }
}
