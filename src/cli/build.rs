//! Build command implementation

use std::path::Path;
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::config::loader::{merge_cli_overrides, CliOverrides};
use crate::orchestrator::build_task_graph;
use crate::report::ErrorReporter;

/// Run the build command
pub fn run_build(
    task: &str,
    config_path: Option<&Path>,
    out: Option<&Path>,
    verbose: bool,
) -> ExitCode {
    let (mut config, project_root) = match super::load_project(config_path, verbose) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let overrides = CliOverrides { out: out.map(|p| p.to_path_buf()), ..Default::default() };
    merge_cli_overrides(&mut config, &overrides);

    let graph = match build_task_graph(&project_root, &config) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error building task graph: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if !graph.contains(task) {
        eprintln!("Unknown task: {}", task);
        eprintln!("Available tasks:");
        for name in graph.task_names() {
            eprintln!("  {}", name);
        }
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    match graph.run(task) {
        Ok(report) => {
            if verbose {
                for name in &report.executed {
                    println!("  {}", name);
                }
            }
            println!("Ran {} task(s)", report.executed.len());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            ErrorReporter::console().task_failed(task, &e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
