//! Bump command implementation

use std::path::Path;
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::version::{resolve_level, VersionBumper, VersionError};

/// Run the bump command
pub fn run_bump(
    major: bool,
    minor: bool,
    patch: bool,
    config_path: Option<&Path>,
) -> ExitCode {
    let level = match resolve_level(major, minor, patch) {
        Ok(level) => level,
        Err(e @ VersionError::AmbiguousBumpLevel) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let (config, project_root) = match super::load_project(config_path, false) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let bumper = VersionBumper::new(
        project_root,
        config.version.manifests.clone(),
        config.version.styles.clone(),
    );

    match bumper.bump(level) {
        Ok(report) => {
            println!("Version {} -> {}", report.previous, report.next);
            for file in &report.files {
                println!("  updated {}", file.display());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
