//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod bump;
mod watch;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::loader::{default_config, find_config, load_config, project_root};
use crate::config::schema::ForgeConfig;

pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Asset build orchestrator for theme projects
#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Compile, watch and live-reload front-end theme assets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task and its prerequisites once
    Build {
        /// Task to run (defaults to the full build)
        #[arg(default_value = "build")]
        task: String,

        /// Explicit forge.toml path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override output directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Watch sources, rebuild on change and live-reload browsers
    Watch {
        /// Explicit forge.toml path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Upstream origin for the reflecting proxy
        #[arg(long)]
        proxy: Option<String>,

        /// Port for the live-reload server
        #[arg(long)]
        port: Option<u16>,

        /// Open a browser once the server is up
        #[arg(long)]
        open: bool,

        /// Rebuild on change without serving live reload
        #[arg(long)]
        no_serve: bool,
    },
    /// Bump the project version across manifests and style headers
    Bump {
        /// Bump the major component
        #[arg(long)]
        major: bool,

        /// Bump the minor component
        #[arg(long)]
        minor: bool,

        /// Bump the patch component
        #[arg(long)]
        patch: bool,

        /// Explicit forge.toml path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Locate and load configuration plus the project root it applies to.
pub(crate) fn load_project(
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<(ForgeConfig, PathBuf), ExitCode> {
    let config_path = match config_path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(path) => {
            if verbose {
                println!("Using config: {}", path.display());
            }
            let config = load_config(Some(&path)).map_err(|e| {
                eprintln!("Error loading config: {}", e);
                ExitCode::from(EXIT_ERROR)
            })?;
            let root = project_root(&path)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            Ok((config, root))
        }
        None => {
            if verbose {
                println!("No forge.toml found, using defaults");
            }
            let root = std::env::current_dir().unwrap_or_default();
            Ok((default_config(), root))
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { task, config, out, verbose } => {
            build::run_build(&task, config.as_deref(), out.as_deref(), verbose)
        }
        Commands::Watch { config, proxy, port, open, no_serve } => {
            watch::run_watch(config.as_deref(), proxy, port, open, no_serve)
        }
        Commands::Bump { major, minor, patch, config } => {
            bump::run_bump(major, minor, patch, config.as_deref())
        }
    }
}
