use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// d1flow - Cloudflare D1 + Prisma migration workbench
#[derive(Parser, Debug)]
#[command(name = "d1flow")]
#[command(about = "Sequence wrangler D1 and Prisma migration commands, carrying the new migration file between steps")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./d1flow.json when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Project directory the commands run in (overrides config)
    #[arg(short = 'C', long, global = true)]
    pub workdir: Option<PathBuf>,

    /// D1 database name (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the current step list
    Steps {
        /// Name for the migration the create step makes
        #[arg(short, long)]
        migration_name: Option<String>,
        /// Migration file already created (e.g. 0001_init.sql)
        #[arg(short, long)]
        artifact: Option<String>,
        /// Print the steps as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one step by its number (1-5) and print its output
    Run {
        /// Step number as listed by `steps`
        step: usize,
        /// Name for the migration the create step makes
        #[arg(short, long)]
        migration_name: Option<String>,
        /// Migration file already created (e.g. 0001_init.sql)
        #[arg(short, long)]
        artifact: Option<String>,
    },
    /// Interactive session on stdin
    Interactive,
    /// Serve the workbench over HTTP
    Serve {
        /// Listen address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
