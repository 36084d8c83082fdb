//! Watch command implementation

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::config::loader::{merge_cli_overrides, CliOverrides};
use crate::orchestrator::{build_dispatch_table, build_task_graph};
use crate::reload::{LiveReloadChannel, ServeOptions};
use crate::report::ErrorReporter;
use crate::watch::{watch_loop, WatchOptions};

/// Run the watch command
pub fn run_watch(
    config_path: Option<&Path>,
    proxy: Option<String>,
    port: Option<u16>,
    open: bool,
    no_serve: bool,
) -> ExitCode {
    let (mut config, project_root) = match super::load_project(config_path, false) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let overrides =
        CliOverrides { proxy, port, open: open.then_some(true), ..Default::default() };
    merge_cli_overrides(&mut config, &overrides);

    let graph = match build_task_graph(&project_root, &config) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error building task graph: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let table = match build_dispatch_table(&project_root, &config) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error building watch routes: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let reporter = ErrorReporter::console();

    // Initial full build; a failure is reported but does not stop the watch
    println!("Building...");
    match graph.run("build") {
        Ok(report) => println!("Ran {} task(s)", report.executed.len()),
        Err(e) => reporter.task_failed("build", &e),
    }

    let channel = if no_serve {
        None
    } else {
        let channel = LiveReloadChannel::new();
        let options = ServeOptions {
            proxy: config.serve.proxy.clone(),
            host: config.serve.host.clone(),
            port: config.serve.port,
            open: config.serve.open,
        };
        if let Err(e) = channel.start(&options) {
            eprintln!("Error starting live-reload server: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
        Some(channel)
    };

    println!("Press Ctrl+C to stop");

    let options = WatchOptions {
        base_dir: project_root,
        debounce: Duration::from_millis(config.watch.debounce_ms),
    };
    match watch_loop(&options, &table, &graph, channel.as_ref(), &reporter) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
