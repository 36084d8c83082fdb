//! Wires configuration into a runnable task graph.
//!
//! Task naming follows the `group:step` convention: each stylesheet pipeline
//! gets `<name>:compile`, `<name>:minify`, an optional `<name>:lint`, and an
//! umbrella `<name>` task running the whole chain. `styles:all` runs every
//! stylesheet pipeline and is what the watcher routes stylesheet changes to.
//! `build` runs everything.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::cache::IncrementalCache;
use crate::config::schema::{ForgeConfig, StylePipelineConfig};
use crate::pipeline::css::{
    GroupMediaQueries, LintAutofix, MinifyCss, PixelFallback, SourceMapEmit, StyleCompile,
    VendorPrefix,
};
use crate::pipeline::image::OptimizeImages;
use crate::pipeline::script::{ScriptFormat, ScriptMinify};
use crate::pipeline::stage::TransformStage;
use crate::pipeline::TransformPipeline;
use crate::reload::ReloadMessage;
use crate::tasks::{TaskAction, TaskError, TaskGraph, TaskOutcome};
use crate::watch::{DispatchTable, DispatchTarget, WatchError};

/// Stage chain for one stylesheet pipeline, entry file to annotated CSS.
fn style_stages(base_dir: &Path, config: &StylePipelineConfig) -> Vec<Box<dyn TransformStage>> {
    // px fallbacks go in after the prefixer pass, which would otherwise fold
    // duplicate declarations back into one
    vec![
        Box::new(StyleCompile::new(base_dir.join(&config.include_dir))),
        Box::new(VendorPrefix::new()),
        Box::new(PixelFallback::with_root(config.pixel_root)),
        Box::new(GroupMediaQueries::new(config.media_order)),
        Box::new(LintAutofix::fix()),
        Box::new(SourceMapEmit),
    ]
}

/// Entry stylesheet output names, e.g. `scss/style.scss` -> `style.css`.
fn entry_css_names(config: &StylePipelineConfig) -> Vec<String> {
    config
        .sources
        .iter()
        .filter(|s| !s.starts_with('!'))
        .filter_map(|s| {
            Path::new(s).file_stem().map(|stem| format!("{}.css", stem.to_string_lossy()))
        })
        .collect()
}

fn register_style_pipeline(
    graph: &mut TaskGraph,
    base_dir: &Path,
    out_root: &Path,
    config: &StylePipelineConfig,
) -> Result<(), TaskError> {
    let out_dir = out_root.join(&config.out);

    let compile_name = format!("{}:compile", config.name);
    {
        let base = base_dir.to_path_buf();
        let out = out_dir.clone();
        let config = config.clone();
        let action: TaskAction = Box::new(move || {
            let pipeline = TransformPipeline::new(&base, &out);
            let stages = style_stages(&base, &config);
            let run = pipeline.apply(&config.sources, &stages, None)?;
            for diagnostic in &run.diagnostics {
                tracing::warn!("{}", diagnostic);
            }
            Ok(TaskOutcome::new(format!("compiled {} stylesheet(s)", run.processed())))
        });
        graph.register(&compile_name, &[], true, action)?;
    }

    let minify_name = format!("{}:minify", config.name);
    {
        let out = out_dir.clone();
        let action: TaskAction = Box::new(move || {
            let pipeline = TransformPipeline::new(&out, &out);
            let stages: Vec<Box<dyn TransformStage>> = vec![Box::new(MinifyCss)];
            let patterns = vec!["*.css".to_string(), "!*.min.css".to_string()];
            let run = pipeline.apply(&patterns, &stages, None)?;
            Ok(TaskOutcome::new(format!("minified {} stylesheet(s)", run.processed())))
        });
        graph.register(&minify_name, &[compile_name.as_str()], true, action)?;
    }

    let lint_name = format!("{}:lint", config.name);
    let has_lint = !config.lint.is_empty();
    if has_lint {
        let base = base_dir.to_path_buf();
        let out = out_dir.clone();
        let patterns = config.lint.clone();
        let action: TaskAction = Box::new(move || {
            let pipeline = TransformPipeline::new(&base, &out).with_check_only(true);
            let stages: Vec<Box<dyn TransformStage>> = vec![Box::new(LintAutofix::strict())];
            let run = pipeline.apply(&patterns, &stages, None)?;
            for diagnostic in &run.diagnostics {
                tracing::warn!("{}", diagnostic);
            }
            Ok(TaskOutcome::new(format!("linted {} file(s)", run.processed())))
        });
        graph.register(&lint_name, &[minify_name.as_str()], true, action)?;
    }

    let final_step = if has_lint { lint_name.as_str() } else { minify_name.as_str() };
    let css_names = entry_css_names(config);
    let action: TaskAction = Box::new(move || {
        Ok(TaskOutcome::default().with_reload(ReloadMessage::style_inject(css_names.clone())))
    });
    graph.register(&config.name, &[final_step], true, action)
}

/// Build the full task graph for a project.
pub fn build_task_graph(base_dir: &Path, config: &ForgeConfig) -> Result<TaskGraph, TaskError> {
    let mut graph = TaskGraph::new();
    let cache = Rc::new(RefCell::new(IncrementalCache::new()));
    let out_root = base_dir.join(&config.project.out);

    for pipeline in &config.styles {
        register_style_pipeline(&mut graph, base_dir, &out_root, pipeline)?;
    }

    let style_names: Vec<String> = config.styles.iter().map(|p| p.name.clone()).collect();
    {
        let prereqs: Vec<&str> = style_names.iter().map(String::as_str).collect();
        graph.register("styles:all", &prereqs, true, Box::new(|| Ok(TaskOutcome::default())))?;
    }

    {
        let base = base_dir.to_path_buf();
        let out = out_root.join(&config.scripts.out);
        let sources = config.scripts.sources.clone();
        let cache = cache.clone();
        let action: TaskAction = Box::new(move || {
            let pipeline = TransformPipeline::new(&base, &out).with_cache_namespace("scripts");
            let stages: Vec<Box<dyn TransformStage>> =
                vec![Box::new(ScriptFormat), Box::new(ScriptMinify)];
            let mut cache = cache.borrow_mut();
            let run = pipeline.apply(&sources, &stages, Some(&mut cache))?;
            for diagnostic in &run.diagnostics {
                tracing::warn!("{}", diagnostic);
            }
            let written: Vec<String> = run.written().map(|p| p.display().to_string()).collect();
            let mut outcome = TaskOutcome::new(format!(
                "{} script(s), {} unchanged",
                run.processed(),
                run.skipped
            ));
            if !written.is_empty() {
                outcome = outcome.with_reload(ReloadMessage::full_reload(written));
            }
            Ok(outcome)
        });
        graph.register("scripts", &[], true, action)?;
    }

    {
        let base = base_dir.to_path_buf();
        let sources = config.images.sources.clone();
        let cache = cache.clone();
        let action: TaskAction = Box::new(move || {
            // Images are rewritten where they live, not copied to the out dir
            let pipeline = TransformPipeline::new(&base, &base)
                .with_in_place(true)
                .with_cache_namespace("images");
            let stages: Vec<Box<dyn TransformStage>> = vec![Box::new(OptimizeImages)];
            let mut cache = cache.borrow_mut();
            let run = pipeline.apply(&sources, &stages, Some(&mut cache))?;
            for diagnostic in &run.diagnostics {
                tracing::warn!("{}", diagnostic);
            }
            let written: Vec<String> = run.written().map(|p| p.display().to_string()).collect();
            let mut outcome = TaskOutcome::new(format!(
                "{} image(s), {} unchanged",
                run.processed(),
                run.skipped
            ));
            if !written.is_empty() {
                outcome = outcome.with_reload(ReloadMessage::full_reload(written));
            }
            Ok(outcome)
        });
        graph.register("images", &[], true, action)?;
    }

    {
        graph.register(
            "build",
            &["styles:all", "scripts", "images"],
            false,
            Box::new(|| Ok(TaskOutcome::new("build complete"))),
        )?;
    }

    Ok(graph)
}

fn as_refs(patterns: &[String]) -> Vec<&str> {
    patterns.iter().map(String::as_str).collect()
}

/// Route table for watch mode, mirroring the configured watch groups.
pub fn build_dispatch_table(
    base_dir: &Path,
    config: &ForgeConfig,
) -> Result<DispatchTable, WatchError> {
    let mut table = DispatchTable::new(base_dir);

    // order matters: later, broader patterns must not shadow earlier ones
    table.route(
        &as_refs(&config.watch.styles),
        DispatchTarget::Task("styles:all".to_string()),
    )?;
    table.route(&as_refs(&config.watch.scripts), DispatchTarget::Task("scripts".to_string()))?;
    table.route(&as_refs(&config.watch.images), DispatchTarget::Task("images".to_string()))?;
    table.route(&as_refs(&config.watch.backend), DispatchTarget::FullReload)?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::default_config;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn project(temp: &TempDir) -> PathBuf {
        let root = temp.path().to_path_buf();
        fs::create_dir_all(root.join("scss/woocommerce")).unwrap();
        fs::create_dir_all(root.join("js")).unwrap();
        fs::create_dir_all(root.join("images")).unwrap();
        fs::write(
            root.join("scss/style.scss"),
            "@import \"base\";\nbody { margin: 1rem; }\n",
        )
        .unwrap();
        fs::write(root.join("scss/_base.scss"), "p { padding: 0; }\n").unwrap();
        fs::write(
            root.join("scss/woocommerce/woocommerce.scss"),
            ".cart { width: 2rem; }\n",
        )
        .unwrap();
        fs::write(root.join("js/app.js"), "function hi() {\n  return 1;\n}\n").unwrap();
        root
    }

    #[test]
    fn test_graph_has_expected_tasks() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let graph = build_task_graph(&root, &config).unwrap();

        for name in [
            "styles:compile",
            "styles:minify",
            "styles:lint",
            "styles",
            "plugin:compile",
            "plugin:minify",
            "plugin",
            "styles:all",
            "scripts",
            "images",
            "build",
        ] {
            assert!(graph.contains(name), "missing task {name}");
        }
        // the plugin pipeline has no lint patterns configured
        assert!(!graph.contains("plugin:lint"));
    }

    #[test]
    fn test_style_chain_order() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let graph = build_task_graph(&root, &config).unwrap();

        let order = graph.execution_order("styles").unwrap();
        assert_eq!(order, vec!["styles:compile", "styles:minify", "styles:lint", "styles"]);
    }

    #[test]
    fn test_scripts_task_writes_minified_output() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let graph = build_task_graph(&root, &config).unwrap();

        let report = graph.run("scripts").unwrap();
        assert_eq!(report.executed, vec!["scripts"]);
        assert!(root.join("dist/js/app.min.js").exists());
        assert_eq!(report.reloads.len(), 1);
    }

    #[test]
    fn test_styles_run_produces_css_min_and_map() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let graph = build_task_graph(&root, &config).unwrap();

        let report = graph.run("styles").unwrap();
        assert!(root.join("dist/css/style.css").exists());
        assert!(root.join("dist/css/style.min.css").exists());
        assert!(root.join("dist/css/style.css.map").exists());

        let css = fs::read_to_string(root.join("dist/css/style.css")).unwrap();
        assert!(css.contains("padding"), "partial content should be inlined");

        // umbrella task asks for a style injection
        assert!(report
            .reloads
            .iter()
            .any(|r| r.kind == crate::reload::ReloadKind::StyleInject));
    }

    #[test]
    fn test_build_runs_everything() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let graph = build_task_graph(&root, &config).unwrap();

        let report = graph.run("build").unwrap();
        assert!(report.executed.contains(&"styles".to_string()));
        assert!(report.executed.contains(&"plugin".to_string()));
        assert!(report.executed.contains(&"scripts".to_string()));
        assert!(report.executed.contains(&"images".to_string()));
        assert!(!graph.is_watchable("build"));
    }

    #[test]
    fn test_dispatch_table_routes_match_config() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let config = default_config();
        let table = build_dispatch_table(&root, &config).unwrap();

        assert_eq!(
            table.dispatch(&root.join("scss/_base.scss")),
            Some(&DispatchTarget::Task("styles:all".to_string()))
        );
        assert_eq!(
            table.dispatch(&root.join("js/app.js")),
            Some(&DispatchTarget::Task("scripts".to_string()))
        );
        assert_eq!(table.dispatch(&root.join("js/app.min.js")), None);
        assert_eq!(
            table.dispatch(&root.join("header.php")),
            Some(&DispatchTarget::FullReload)
        );
    }
}
