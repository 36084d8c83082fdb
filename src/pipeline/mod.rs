//! Transform pipeline: glob resolution, stage execution, output writing.
//!
//! A pipeline run resolves glob patterns into a file set, filters it through
//! the incremental cache when a namespace is configured, and passes each
//! surviving file through an ordered stage sequence. The run succeeds only if
//! every stage for every file completed without an error.

pub mod css;
pub mod image;
pub mod script;
pub mod stage;

pub use stage::{
    compose_line_maps, identity_line_map, Diagnostic, LineMap, Severity, StageContext,
    StageError, StageOutcome, TransformStage,
};

use crate::cache::IncrementalCache;
use glob::{glob, Pattern};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Error during a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, #[source] glob::PatternError),
    /// A stage failed for a file
    #[error("Stage '{stage}' failed for {}: {source}", .file.display())]
    Stage {
        file: PathBuf,
        stage: String,
        #[source]
        source: StageError,
    },
    /// IO error outside any stage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve glob patterns into a sorted file set.
///
/// Patterns prefixed with `!` remove matching paths from the inclusion set.
/// Negations apply regardless of where they appear relative to the positive
/// patterns, so `["!a/*.min.js", "a/*.js"]` and `["a/*.js", "!a/*.min.js"]`
/// resolve identically.
pub fn resolve_patterns(base_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut included: BTreeSet<PathBuf> = BTreeSet::new();
    let mut negations: Vec<Pattern> = Vec::new();

    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            let full = base_dir.join(negated);
            let compiled = Pattern::new(&full.to_string_lossy())
                .map_err(|e| PipelineError::InvalidPattern(pattern.clone(), e))?;
            negations.push(compiled);
        } else {
            let full = base_dir.join(pattern);
            let paths = glob(&full.to_string_lossy())
                .map_err(|e| PipelineError::InvalidPattern(pattern.clone(), e))?;
            for entry in paths.flatten() {
                if entry.is_file() {
                    included.insert(entry);
                }
            }
        }
    }

    Ok(included
        .into_iter()
        .filter(|path| !negations.iter().any(|n| n.matches_path(path)))
        .collect())
}

/// Outcome of one file passing through the stage sequence.
#[derive(Debug)]
pub struct FileResult {
    /// Source path
    pub source: PathBuf,
    /// Outputs written (main output plus forks), empty in check-only mode
    pub written: Vec<PathBuf>,
}

/// Result of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineRun {
    /// Files that went through the stages
    pub files: Vec<FileResult>,
    /// Files excluded by the incremental cache
    pub skipped: usize,
    /// Diagnostics collected from all stages
    pub diagnostics: Vec<Diagnostic>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl PipelineRun {
    /// All output paths written by the run.
    pub fn written(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().flat_map(|f| f.written.iter())
    }

    /// Number of files processed.
    pub fn processed(&self) -> usize {
        self.files.len()
    }
}

/// Applies an ordered stage sequence to a glob-matched file set.
pub struct TransformPipeline {
    /// Directory glob patterns resolve against
    base_dir: PathBuf,
    /// Directory outputs are written into
    out_dir: PathBuf,
    /// Cache namespace; `None` disables incremental filtering
    namespace: Option<String>,
    /// Check-only mode: run stages, write nothing
    check_only: bool,
    /// Write each output next to its source instead of into `out_dir`
    in_place: bool,
}

impl TransformPipeline {
    /// Create a pipeline rooted at `base_dir`, writing into `out_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            out_dir: out_dir.into(),
            namespace: None,
            check_only: false,
            in_place: false,
        }
    }

    /// Enable incremental filtering under the given cache namespace.
    pub fn with_cache_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Run stages without writing any output (lint-style usage).
    pub fn with_check_only(mut self, check_only: bool) -> Self {
        self.check_only = check_only;
        self
    }

    /// Write outputs back into each source file's own directory. Nested
    /// directories keep their structure; `out_dir` is ignored.
    pub fn with_in_place(mut self, in_place: bool) -> Self {
        self.in_place = in_place;
        self
    }

    /// Apply `stages` in declared order to every file matched by `patterns`.
    ///
    /// Files proceed independently; within one file, stages execute in order.
    /// The first stage error aborts the run.
    pub fn apply(
        &self,
        patterns: &[String],
        stages: &[Box<dyn TransformStage>],
        cache: Option<&mut IncrementalCache>,
    ) -> Result<PipelineRun, PipelineError> {
        let start = Instant::now();
        let files = resolve_patterns(&self.base_dir, patterns)?;

        let mut run = PipelineRun::default();
        let mut cache = cache;

        for source in files {
            let original = fs::read(&source)?;

            if let (Some(namespace), Some(cache)) = (self.namespace.as_deref(), cache.as_deref_mut())
            {
                if !cache.should_process(namespace, &source, &original) {
                    run.skipped += 1;
                    continue;
                }
            }

            let result = self.apply_to_file(&source, &original, stages, &mut run.diagnostics)?;

            // Fingerprint recorded only after the stages succeeded, so a
            // failed file is retried on the next run
            if let (Some(namespace), Some(cache)) = (self.namespace.as_deref(), cache.as_deref_mut())
            {
                cache.record(namespace, &source, &original);
            }
            run.files.push(result);
        }

        run.duration = start.elapsed();
        Ok(run)
    }

    /// Run the stage sequence over a single file and write its outputs.
    fn apply_to_file(
        &self,
        source: &Path,
        original: &[u8],
        stages: &[Box<dyn TransformStage>],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<FileResult, PipelineError> {
        let mut contents = original.to_vec();
        let mut file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let mut line_map: Option<LineMap> = None;
        let mut forks: Vec<(String, Vec<u8>)> = Vec::new();

        for stage in stages {
            let current_path = PathBuf::from(&file_name);
            let ctx = StageContext {
                path: &current_path,
                source_path: source,
                original,
                line_map: line_map.as_ref(),
            };

            let outcome = stage.transform(&contents, &ctx).map_err(|e| PipelineError::Stage {
                file: source.to_path_buf(),
                stage: stage.name().to_string(),
                source: e,
            })?;

            // A mutating stage that reports no line map loses the mapping:
            // later positions can no longer be traced to original lines, so
            // every subsequent composition yields unmapped entries. A stage
            // that left the content untouched preserves the mapping.
            line_map = match outcome.line_map {
                Some(next) => Some(compose_line_maps(line_map.as_ref(), &next)),
                None if outcome.contents == contents => line_map,
                None => {
                    let lines = outcome.contents.iter().filter(|b| **b == b'\n').count() + 1;
                    Some(vec![None; lines])
                }
            };
            contents = outcome.contents;
            if let Some(rename) = outcome.rename {
                file_name = rename;
            }
            forks.extend(outcome.forks);
            diagnostics.extend(outcome.diagnostics);
        }

        let mut written = Vec::new();
        if !self.check_only {
            let out_dir = if self.in_place {
                source.parent().unwrap_or(Path::new(".")).to_path_buf()
            } else {
                self.out_dir.clone()
            };
            fs::create_dir_all(&out_dir)?;

            let out_path = out_dir.join(&file_name);
            fs::write(&out_path, &contents)?;
            written.push(out_path);

            for (fork_name, bytes) in forks {
                let fork_path = out_dir.join(fork_name);
                fs::write(&fork_path, bytes)?;
                written.push(fork_path);
            }
        }

        Ok(FileResult { source: source.to_path_buf(), written })
    }
}
