//! The uniform transform contract every pipeline stage implements.
//!
//! A stage takes input bytes plus its own configuration and produces output
//! bytes plus diagnostics. Beyond mutating content, an outcome may rename the
//! output file or fork derived outputs written alongside the original, which
//! is how minified copies and source-map artifacts come into being without
//! the pipeline knowing anything about the concrete backend.

use std::path::{Path, PathBuf};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational, build continues
    Warning,
    /// Rule violation surfaced as an error by strict stages
    Error,
}

/// A single finding emitted by a stage.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stage that produced the finding
    pub stage: String,
    /// File the finding refers to
    pub path: PathBuf,
    /// Line number (1-indexed) if known
    pub line: Option<usize>,
    /// Human-readable message
    pub message: String,
    /// Severity
    pub severity: Severity,
}

impl Diagnostic {
    /// Create a warning diagnostic.
    pub fn warning(stage: &str, path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            path: path.to_path_buf(),
            line,
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.stage, self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Error raised by a stage.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StageError {
    /// Transform syntax or semantic failure
    #[error("compile error in {}: {message}", .path.display())]
    Compile { path: PathBuf, message: String },
    /// Style or script rule violation under strict linting
    #[error("lint violation in {}: {message}", .path.display())]
    LintViolation { path: PathBuf, message: String },
    /// Missing path, permission denial, read failure
    #[error("filesystem error: {0}")]
    FileSystem(#[from] std::io::Error),
}

impl StageError {
    /// Compile error for a file.
    pub fn compile(path: &Path, message: impl Into<String>) -> Self {
        StageError::Compile { path: path.to_path_buf(), message: message.into() }
    }

    /// Lint violation for a file.
    pub fn lint(path: &Path, message: impl Into<String>) -> Self {
        StageError::LintViolation { path: path.to_path_buf(), message: message.into() }
    }
}

/// A line mapping from output lines back to input lines.
///
/// Index = output line (0-based), value = input line, or `None` when the
/// output line has no counterpart in the input (injected content).
pub type LineMap = Vec<Option<usize>>;

/// Context handed to a stage alongside the input bytes.
#[derive(Debug)]
pub struct StageContext<'a> {
    /// Current output file name, after any renames by earlier stages
    pub path: &'a Path,
    /// Original source path on disk
    pub source_path: &'a Path,
    /// Original bytes, before any stage ran
    pub original: &'a [u8],
    /// Accumulated mapping from current content lines to original lines
    pub line_map: Option<&'a LineMap>,
}

/// What a stage produced.
#[derive(Debug, Default)]
pub struct StageOutcome {
    /// Transformed content
    pub contents: Vec<u8>,
    /// New file name for the output (same directory), if the stage renames
    pub rename: Option<String>,
    /// Derived outputs written alongside the main output: (file name, bytes)
    pub forks: Vec<(String, Vec<u8>)>,
    /// Findings to surface
    pub diagnostics: Vec<Diagnostic>,
    /// Mapping from this stage's output lines to its input lines
    pub line_map: Option<LineMap>,
}

impl StageOutcome {
    /// Pass the input through untouched.
    pub fn passthrough(input: &[u8]) -> Self {
        Self { contents: input.to_vec(), ..Default::default() }
    }

    /// Replace the content.
    pub fn replace(contents: Vec<u8>) -> Self {
        Self { contents, ..Default::default() }
    }

    /// Rename the output file.
    pub fn with_rename(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// Add a derived output.
    pub fn with_fork(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.forks.push((name.into(), bytes));
        self
    }

    /// Attach a line map.
    pub fn with_line_map(mut self, map: LineMap) -> Self {
        self.line_map = Some(map);
        self
    }
}

/// Uniform transform contract: (input bytes, configuration) -> (output bytes,
/// diagnostics). Configuration lives in the implementing struct.
pub trait TransformStage {
    /// Stage name, used in diagnostics and error messages.
    fn name(&self) -> &str;

    /// Apply the transform to one file.
    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError>;
}

/// Compose an accumulated original-line map with a stage's own line map.
///
/// `accumulated` maps previous-content lines to original lines; `next` maps
/// new-content lines to previous-content lines. The result maps new-content
/// lines to original lines. A `None` accumulated map is treated as identity.
pub fn compose_line_maps(accumulated: Option<&LineMap>, next: &LineMap) -> LineMap {
    next.iter()
        .map(|prev_line| {
            prev_line.and_then(|p| match accumulated {
                Some(acc) => acc.get(p).copied().flatten(),
                None => Some(p),
            })
        })
        .collect()
}

/// Identity line map for `n` lines.
pub fn identity_line_map(n: usize) -> LineMap {
    (0..n).map(Some).collect()
}
