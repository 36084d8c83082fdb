//! Semantic version sync across project manifests and style headers.
//!
//! The bump level comes from command-line flags, the highest selected
//! component winning; selecting none is rejected outright. All rewrites are
//! prepared in memory before the first write, so a missing version field in
//! any target leaves every file untouched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionSpec {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for VersionSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut next = |label: &str| -> Result<u64, String> {
            parts
                .next()
                .ok_or_else(|| format!("missing {} component in `{}`", label, s))?
                .parse::<u64>()
                .map_err(|_| format!("invalid {} component in `{}`", label, s))
        };
        Ok(Self { major: next("major")?, minor: next("minor")?, patch: next("patch")? })
    }
}

/// Which component to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpLevel {
    Major,
    Minor,
    Patch,
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("pass one of --major, --minor, --patch")]
    AmbiguousBumpLevel,

    #[error("could not read `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no version field found in `{}`", .path.display())]
    MissingVersionField { path: PathBuf },

    #[error("unparsable version `{value}` in `{}`", .path.display())]
    InvalidVersion { path: PathBuf, value: String },
}

/// Map flag selection to a bump level. Flags are checked in precedence order
/// major, minor, patch; selecting none is an error rather than a silent
/// default.
pub fn resolve_level(major: bool, minor: bool, patch: bool) -> Result<BumpLevel, VersionError> {
    if major {
        Ok(BumpLevel::Major)
    } else if minor {
        Ok(BumpLevel::Minor)
    } else if patch {
        Ok(BumpLevel::Patch)
    } else {
        Err(VersionError::AmbiguousBumpLevel)
    }
}

/// The version after a bump. Lower components reset to zero.
pub fn compute_next(current: VersionSpec, level: BumpLevel) -> VersionSpec {
    match level {
        BumpLevel::Major => VersionSpec { major: current.major + 1, minor: 0, patch: 0 },
        BumpLevel::Minor => VersionSpec { major: current.major, minor: current.minor + 1, patch: 0 },
        BumpLevel::Patch => VersionSpec { patch: current.patch + 1, ..current },
    }
}

fn manifest_version_re() -> Regex {
    Regex::new(r#"("version"\s*:\s*")([^"]+)(")"#).expect("static regex")
}

fn style_header_re() -> Regex {
    Regex::new(r"(?m)^(\s*\*?\s*Version:\s*)(\d+\.\d+\.\d+)").expect("static regex")
}

/// What a bump changed.
#[derive(Debug)]
pub struct BumpReport {
    pub previous: VersionSpec,
    pub next: VersionSpec,
    /// Files rewritten, in configuration order
    pub files: Vec<PathBuf>,
}

/// Rewrites version fields across a set of JSON manifests and style-header
/// files, keeping them in lockstep.
pub struct VersionBumper {
    base_dir: PathBuf,
    manifests: Vec<PathBuf>,
    styles: Vec<PathBuf>,
}

impl VersionBumper {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        manifests: Vec<PathBuf>,
        styles: Vec<PathBuf>,
    ) -> Self {
        Self { base_dir: base_dir.into(), manifests, styles }
    }

    /// Current version, read from the first manifest.
    pub fn current_version(&self) -> Result<VersionSpec, VersionError> {
        let path = self
            .manifests
            .first()
            .map(|p| self.base_dir.join(p))
            .ok_or(VersionError::MissingVersionField { path: self.base_dir.clone() })?;
        let content = fs::read_to_string(&path)
            .map_err(|source| VersionError::Read { path: path.clone(), source })?;
        let re = manifest_version_re();
        let caps = re
            .captures(&content)
            .ok_or_else(|| VersionError::MissingVersionField { path: path.clone() })?;
        let value = caps[2].to_string();
        value
            .parse()
            .map_err(|_| VersionError::InvalidVersion { path, value })
    }

    /// Bump every target. Rewrites are prepared for all files before any file
    /// is written, so a failure in one target changes nothing.
    pub fn bump(&self, level: BumpLevel) -> Result<BumpReport, VersionError> {
        let previous = self.current_version()?;
        let next = compute_next(previous, level);

        let mut prepared: Vec<(PathBuf, String)> = Vec::new();
        let manifest_re = manifest_version_re();
        let style_re = style_header_re();

        for relative in &self.manifests {
            let path = self.base_dir.join(relative);
            prepared.push(self.prepare(&path, &manifest_re, &next)?);
        }
        for relative in &self.styles {
            let path = self.base_dir.join(relative);
            prepared.push(self.prepare(&path, &style_re, &next)?);
        }

        let mut files = Vec::with_capacity(prepared.len());
        for (path, content) in prepared {
            fs::write(&path, content)
                .map_err(|source| VersionError::Write { path: path.clone(), source })?;
            files.push(path);
        }

        Ok(BumpReport { previous, next, files })
    }

    fn prepare(
        &self,
        path: &Path,
        re: &Regex,
        next: &VersionSpec,
    ) -> Result<(PathBuf, String), VersionError> {
        let content = fs::read_to_string(path)
            .map_err(|source| VersionError::Read { path: path.to_path_buf(), source })?;
        if !re.is_match(&content) {
            return Err(VersionError::MissingVersionField { path: path.to_path_buf() });
        }
        // Group 3 restores the closing quote of manifest fields; the style
        // header pattern has no third group and expands it to nothing
        let rewritten = re.replace(&content, format!("${{1}}{}${{3}}", next)).into_owned();
        Ok((path.to_path_buf(), rewritten))
    }
}
