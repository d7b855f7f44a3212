//! Edgeguard CLI.
//!
//! Loads a declarative policy model into an in-memory engine and answers
//! questions about the relationships it derives.
//!
//! # Quick Start
//!
//! ```bash
//! # Can alice dial the web service, and through which routers?
//! edgeguard --model model.toml advise --identity alice --service web
//!
//! # Every derived dial link
//! edgeguard links --relation service-dial-identities
//!
//! # Recompute all links from scratch and compare
//! edgeguard check
//! ```

mod commands;
mod model;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgeguard::Relation;
use edgeguard_config::ConfigLoader;
use tracing_subscriber::EnvFilter;

/// Edgeguard - attribute-based relationships for zero-trust networks.
#[derive(Parser)]
#[command(name = "edgeguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding edgeguard.toml.
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Model file, overriding `advisor.model` from the configuration.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain whether an identity can reach a service.
    Advise {
        /// Identity id.
        #[arg(short, long)]
        identity: String,

        /// Service id.
        #[arg(short, long)]
        service: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List derived links with their policy counts.
    Links {
        /// Only this relation (e.g. service-dial-identities).
        #[arg(short, long)]
        relation: Option<Relation>,
    },

    /// Recompute every relation and compare with the stored links.
    Check,

    /// Print the effective configuration.
    Config {
        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .with_project_dir(&cli.project_dir)
        .load()
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.filter))
                .context("Invalid logging filter")?,
        )
        .with_writer(std::io::stderr)
        .init();

    let model_path = cli.model.unwrap_or_else(|| config.advisor.model.clone());

    match cli.command {
        Commands::Advise {
            identity,
            service,
            json,
        } => commands::advise::run(&config, &model_path, &identity, &service, json),
        Commands::Links { relation } => commands::links::run(&config, &model_path, relation),
        Commands::Check => commands::check::run(&config, &model_path),
        Commands::Config { format } => commands::config::show(&config, &format),
    }
}
