//! depwatch CLI - dependency-aware file watching from the command line
//!
//! Watches groups of TypeScript/JavaScript files and reports which groups
//! a change affects through the import graph.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::{GroupConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "depwatch")]
#[command(author = "Depwatch Contributors")]
#[command(version)]
#[command(about = "Dependency-aware file watcher for TypeScript and JavaScript", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter depwatch.json
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Watch groups and report affected ones as files change
    Watch {
        /// Project config file
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Extra group as ID=PATTERN[,PATTERN...]
        #[arg(short, long = "group", value_name = "ID=PATTERNS")]
        groups: Vec<GroupConfig>,

        /// Print one JSON object per notification
        #[arg(long)]
        json: bool,
    },

    /// Build the dependency graph once and print it
    Graph {
        /// Glob patterns selecting the files to analyze
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show which files and groups a change to FILE would affect
    Impact {
        /// The changed file
        file: PathBuf,

        /// Glob patterns selecting the files to analyze
        #[arg(short, long, required = true, num_args = 1..)]
        patterns: Vec<String>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Watch {
            config,
            groups,
            json,
        } => commands::watch(&config, groups, json).await,
        Commands::Graph { patterns, json } => commands::graph(&patterns, json).await,
        Commands::Impact {
            file,
            patterns,
            json,
        } => commands::impact(&file, &patterns, json).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
