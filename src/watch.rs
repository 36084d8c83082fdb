//! Watch mode: debounced file events routed to tasks
//!
//! A [`DispatchTable`] maps glob patterns to targets. Changed paths are
//! matched against routes in registration order; the first matching route
//! decides whether a task runs or the browsers get a bare full reload (used
//! for backend files the pipeline never processes). Task failures are
//! reported and the loop keeps watching.

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant, SystemTime};

use crate::reload::{LiveReloadChannel, ReloadMessage};
use crate::report::ErrorReporter;
use crate::tasks::TaskGraph;

/// Error during watch mode
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    ChannelError(String),
    /// Watch root not found
    #[error("Watch root not found: {}", .0.display())]
    BaseNotFound(PathBuf),
    /// Invalid route pattern
    #[error("Invalid watch pattern `{0}`: {1}")]
    InvalidPattern(String, #[source] glob::PatternError),
}

/// How a watched path changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// A single observed change
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

/// Where a matched change goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Run a registered task
    Task(String),
    /// Push a full page reload without running anything
    FullReload,
}

struct CompiledRoute {
    positive: Vec<glob::Pattern>,
    negative: Vec<glob::Pattern>,
    target: DispatchTarget,
}

/// Ordered pattern-to-target routing for changed paths
pub struct DispatchTable {
    base_dir: PathBuf,
    routes: Vec<CompiledRoute>,
}

fn match_options() -> glob::MatchOptions {
    glob::MatchOptions { require_literal_separator: true, ..Default::default() }
}

impl DispatchTable {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), routes: Vec::new() }
    }

    /// Add a route. Patterns are relative to the base directory; a leading
    /// `!` excludes paths from this route regardless of pattern order.
    pub fn route(&mut self, patterns: &[&str], target: DispatchTarget) -> Result<(), WatchError> {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for pattern in patterns {
            let (bucket, text) = match pattern.strip_prefix('!') {
                Some(rest) => (&mut negative, rest),
                None => (&mut positive, *pattern),
            };
            let compiled = glob::Pattern::new(text)
                .map_err(|e| WatchError::InvalidPattern((*pattern).to_string(), e))?;
            bucket.push(compiled);
        }
        self.routes.push(CompiledRoute { positive, negative, target });
        Ok(())
    }

    /// First route matching the path, if any. A path matches a route when at
    /// least one positive pattern matches and no negative pattern does.
    pub fn dispatch(&self, path: &Path) -> Option<&DispatchTarget> {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        let options = match_options();
        self.routes.iter().find_map(|route| {
            let hit = route.positive.iter().any(|p| p.matches_path_with(relative, options))
                && !route.negative.iter().any(|p| p.matches_path_with(relative, options));
            hit.then_some(&route.target)
        })
    }
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Root directory to watch recursively
    pub base_dir: PathBuf,
    /// Quiet period before a change batch is delivered
    pub debounce: Duration,
}

/// Snapshot the files under the watch root, so a change to a pre-existing
/// file classifies as `Changed` rather than `Added`.
fn seed_known(base_dir: &Path) -> HashSet<PathBuf> {
    let pattern = base_dir.join("**/*");
    glob::glob(&pattern.to_string_lossy())
        .map(|paths| paths.flatten().filter(|p| p.is_file()).collect())
        .unwrap_or_default()
}

/// Classify a path against the set of paths seen so far, updating the set.
fn classify(path: &Path, known: &mut HashSet<PathBuf>) -> ChangeKind {
    if !path.exists() {
        known.remove(path);
        ChangeKind::Removed
    } else if known.insert(path.to_path_buf()) {
        ChangeKind::Added
    } else {
        ChangeKind::Changed
    }
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Watch for file changes and dispatch them to tasks.
///
/// Blocks until the event channel closes (normally never). Failed task runs
/// are reported through `reporter` and watching continues.
pub fn watch_loop(
    options: &WatchOptions,
    table: &DispatchTable,
    graph: &TaskGraph,
    reload: Option<&LiveReloadChannel>,
    reporter: &ErrorReporter,
) -> Result<(), WatchError> {
    if !options.base_dir.exists() {
        return Err(WatchError::BaseNotFound(options.base_dir.clone()));
    }

    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(options.debounce, tx).map_err(WatchError::WatcherInit)?;
    debouncer
        .watcher()
        .watch(&options.base_dir, RecursiveMode::Recursive)
        .map_err(WatchError::WatchPath)?;

    println!("[{}] Watching {} for changes...", timestamp(), options.base_dir.display());

    let mut known = seed_known(&options.base_dir);

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let batch: Vec<WatchEvent> = events
                    .iter()
                    .map(|e| WatchEvent {
                        kind: classify(&e.path, &mut known),
                        path: e.path.clone(),
                        timestamp: SystemTime::now(),
                    })
                    .collect();
                run_batch(&batch, table, graph, reload, reporter);
            }
            Ok(Err(error)) => {
                // Watch error (non-fatal) - log but continue watching
                eprintln!("[{}] Watch error: {:?}", timestamp(), error);
                eprintln!("[{}] Continuing to watch...", timestamp());
            }
            Err(e) => {
                return Err(WatchError::ChannelError(e.to_string()));
            }
        }
    }
}

/// Dispatch one debounced batch. Each task runs at most once per batch even
/// when several changed paths route to it.
fn run_batch(
    batch: &[WatchEvent],
    table: &DispatchTable,
    graph: &TaskGraph,
    reload: Option<&LiveReloadChannel>,
    reporter: &ErrorReporter,
) {
    let mut tasks: BTreeSet<String> = BTreeSet::new();
    let mut bare_reload_paths: Vec<String> = Vec::new();

    for event in batch {
        let Some(target) = table.dispatch(&event.path) else { continue };
        if let Some(name) = event.path.file_name() {
            println!("[{}] {:?}: {}", timestamp(), event.kind, name.to_string_lossy());
        }
        match target {
            DispatchTarget::Task(name) => {
                if graph.is_watchable(name) {
                    tasks.insert(name.clone());
                }
            }
            DispatchTarget::FullReload => {
                bare_reload_paths.push(event.path.display().to_string());
            }
        }
    }

    for name in tasks {
        let start = Instant::now();
        match graph.run(&name) {
            Ok(report) => {
                println!("[{}] {} ({})", timestamp(), name, format_duration(start.elapsed()));
                if let Some(reload) = reload {
                    for message in report.reloads {
                        reload.notify(message);
                    }
                }
            }
            Err(e) => reporter.task_failed(&name, &e),
        }
    }

    if !bare_reload_paths.is_empty() {
        if let Some(reload) = reload {
            reload.notify(ReloadMessage::full_reload(bare_reload_paths));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn table(routes: &[(&[&str], DispatchTarget)]) -> DispatchTable {
        let mut t = DispatchTable::new("/project");
        for (patterns, target) in routes {
            t.route(patterns, target.clone()).unwrap();
        }
        t
    }

    #[test]
    fn test_dispatch_matches_relative_to_base() {
        let t = table(&[(&["scss/**/*.scss"], DispatchTarget::Task("styles".into()))]);
        assert_eq!(
            t.dispatch(Path::new("/project/scss/base/_grid.scss")),
            Some(&DispatchTarget::Task("styles".into()))
        );
        assert_eq!(t.dispatch(Path::new("/project/js/app.js")), None);
    }

    #[test]
    fn test_dispatch_negation_excludes() {
        let t = table(&[(&["js/*.js", "!js/*.min.js"], DispatchTarget::Task("scripts".into()))]);
        assert!(t.dispatch(Path::new("/project/js/app.js")).is_some());
        assert!(t.dispatch(Path::new("/project/js/app.min.js")).is_none());
    }

    #[test]
    fn test_dispatch_negation_order_independent() {
        let t = table(&[(&["!js/*.min.js", "js/*.js"], DispatchTarget::Task("scripts".into()))]);
        assert!(t.dispatch(Path::new("/project/js/app.js")).is_some());
        assert!(t.dispatch(Path::new("/project/js/app.min.js")).is_none());
    }

    #[test]
    fn test_dispatch_first_route_wins() {
        let t = table(&[
            (&["**/*.php"], DispatchTarget::FullReload),
            (&["woocommerce/**/*.php"], DispatchTarget::Task("plugin".into())),
        ]);
        assert_eq!(
            t.dispatch(Path::new("/project/woocommerce/cart.php")),
            Some(&DispatchTarget::FullReload)
        );
    }

    #[test]
    fn test_dispatch_star_does_not_cross_separators() {
        let t = table(&[(&["js/*.js"], DispatchTarget::Task("scripts".into()))]);
        assert!(t.dispatch(Path::new("/project/js/vendor/lib.js")).is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut t = DispatchTable::new("/project");
        let result = t.route(&["js/[oops"], DispatchTarget::FullReload);
        assert!(matches!(result, Err(WatchError::InvalidPattern(_, _))));
    }

    #[test]
    fn test_classify_tracks_lifecycle() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("style.scss");
        let mut known = HashSet::new();

        std::fs::write(&file, "a {}").unwrap();
        assert_eq!(classify(&file, &mut known), ChangeKind::Added);
        assert_eq!(classify(&file, &mut known), ChangeKind::Changed);

        std::fs::remove_file(&file).unwrap();
        assert_eq!(classify(&file, &mut known), ChangeKind::Removed);

        std::fs::write(&file, "a {}").unwrap();
        assert_eq!(classify(&file, &mut known), ChangeKind::Added);
    }

    #[test]
    fn test_seeded_set_classifies_existing_file_as_changed() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("scss").join("style.scss");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, "a {}").unwrap();

        let mut known = seed_known(temp.path());
        assert_eq!(classify(&existing, &mut known), ChangeKind::Changed);

        // A file created after the snapshot is still an addition
        let fresh = temp.path().join("scss").join("_new.scss");
        std::fs::write(&fresh, "b {}").unwrap();
        assert_eq!(classify(&fresh, &mut known), ChangeKind::Added);
    }

    #[test]
    fn test_run_batch_runs_each_task_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        {
            let runs = runs.clone();
            graph
                .register(
                    "styles",
                    &[],
                    true,
                    Box::new(move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(TaskOutcome::default())
                    }),
                )
                .unwrap();
        }

        let t = table(&[(&["scss/**/*.scss"], DispatchTarget::Task("styles".into()))]);
        let batch = vec![
            WatchEvent {
                path: PathBuf::from("/project/scss/style.scss"),
                kind: ChangeKind::Changed,
                timestamp: SystemTime::now(),
            },
            WatchEvent {
                path: PathBuf::from("/project/scss/base/_grid.scss"),
                kind: ChangeKind::Changed,
                timestamp: SystemTime::now(),
            },
        ];

        run_batch(&batch, &t, &graph, None, &ErrorReporter::console());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_batch_survives_task_failure() {
        let mut graph = TaskGraph::new();
        graph
            .register("styles", &[], true, Box::new(|| Err("compile error".into())))
            .unwrap();

        let t = table(&[(&["scss/**/*.scss"], DispatchTarget::Task("styles".into()))]);
        let batch = vec![WatchEvent {
            path: PathBuf::from("/project/scss/style.scss"),
            kind: ChangeKind::Changed,
            timestamp: SystemTime::now(),
        }];

        // must not panic or propagate
        run_batch(&batch, &t, &graph, None, &ErrorReporter::console());
    }

    #[test]
    fn test_run_batch_skips_non_watchable_tasks() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        {
            let runs = runs.clone();
            graph
                .register(
                    "bump",
                    &[],
                    false,
                    Box::new(move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(TaskOutcome::default())
                    }),
                )
                .unwrap();
        }

        let t = table(&[(&["package.json"], DispatchTarget::Task("bump".into()))]);
        let batch = vec![WatchEvent {
            path: PathBuf::from("/project/package.json"),
            kind: ChangeKind::Changed,
            timestamp: SystemTime::now(),
        }];

        run_batch(&batch, &t, &graph, None, &ErrorReporter::console());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reload_message_for_backend_files() {
        let graph = TaskGraph::new();
        let t = table(&[(&["**/*.php"], DispatchTarget::FullReload)]);
        let channel = LiveReloadChannel::new();
        let mut rx = channel.subscribe();

        let batch = vec![WatchEvent {
            path: PathBuf::from("/project/header.php"),
            kind: ChangeKind::Changed,
            timestamp: SystemTime::now(),
        }];
        run_batch(&batch, &t, &graph, Some(&channel), &ErrorReporter::console());

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, crate::reload::ReloadKind::FullReload);
        assert!(msg.paths[0].ends_with("header.php"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_watch_error_base_not_found() {
        let options = WatchOptions {
            base_dir: PathBuf::from("/nonexistent/path"),
            debounce: Duration::from_millis(100),
        };
        let t = DispatchTable::new("/nonexistent/path");
        let graph = TaskGraph::new();
        let result = watch_loop(&options, &t, &graph, None, &ErrorReporter::console());
        assert!(matches!(result, Err(WatchError::BaseNotFound(_))));
    }
}
