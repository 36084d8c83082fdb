//! Style pipeline stages.
//!
//! The fixed ordering contract for style pipelines: vendor-prefixing runs
//! before media-query grouping, which runs before lint-autofix. Grouping must
//! see fully expanded and prefixed rules, and autofix runs last so the
//! emitted text is canonical. The source-map stage, when present, runs after
//! the mutating stages and serializes the accumulated line mapping.

use super::stage::{
    identity_line_map, Diagnostic, LineMap, StageContext, StageError, StageOutcome,
    TransformStage,
};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Media-query ordering for the grouping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MediaOrder {
    /// Ascending min-width groups
    #[default]
    MobileFirst,
    /// Descending groups (reverse of mobile-first)
    DesktopFirst,
}

/// Browser targets used for vendor prefixing.
pub fn default_browsers() -> Browsers {
    Browsers {
        chrome: Some(80 << 16),
        edge: Some(80 << 16),
        firefox: Some(75 << 16),
        ios_saf: Some(12 << 16),
        safari: Some(12 << 16),
        ..Browsers::default()
    }
}

/// Preprocessor stage: inlines `@import "partial";` directives.
///
/// Partials resolve relative to the importing file's directory, trying
/// `name.scss` then `_name.scss`. Inlining is recursive; an import cycle is a
/// compile error. Whole-line `//` comments are dropped. The output file is
/// renamed from `.scss` to `.css`.
pub struct StyleCompile {
    /// Directory partial paths resolve against
    pub include_dir: PathBuf,
}

impl StyleCompile {
    /// Create a compile stage resolving partials under `include_dir`.
    pub fn new(include_dir: impl Into<PathBuf>) -> Self {
        Self { include_dir: include_dir.into() }
    }

    fn inline(
        &self,
        source: &str,
        dir: &Path,
        origin: &Path,
        visiting: &mut HashSet<PathBuf>,
        out: &mut Vec<String>,
        map: &mut Vec<Option<usize>>,
        top_level: bool,
    ) -> Result<(), StageError> {
        let import_re = import_regex();

        for (idx, line) in source.lines().enumerate() {
            if line.trim_start().starts_with("//") {
                continue;
            }

            if let Some(caps) = import_re.captures(line) {
                let name = &caps[1];
                let partial = self.resolve_partial(dir, name).ok_or_else(|| {
                    StageError::compile(origin, format!("cannot resolve @import \"{}\"", name))
                })?;

                let canonical = partial.canonicalize().unwrap_or_else(|_| partial.clone());
                if !visiting.insert(canonical.clone()) {
                    return Err(StageError::compile(
                        origin,
                        format!("import cycle through {}", partial.display()),
                    ));
                }

                let nested = std::fs::read_to_string(&partial)?;
                let nested_dir = partial.parent().unwrap_or(dir).to_path_buf();
                self.inline(&nested, &nested_dir, origin, visiting, out, map, false)?;
                visiting.remove(&canonical);
            } else {
                out.push(line.to_string());
                map.push(if top_level { Some(idx) } else { None });
            }
        }

        Ok(())
    }

    fn resolve_partial(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        for base in [dir, self.include_dir.as_path()] {
            candidates.push(base.join(format!("{}.scss", name)));
            if let Some((parent, stem)) = name.rsplit_once('/') {
                candidates.push(base.join(parent).join(format!("_{}.scss", stem)));
            } else {
                candidates.push(base.join(format!("_{}.scss", name)));
            }
        }
        candidates.into_iter().find(|c| c.is_file())
    }
}

fn import_regex() -> Regex {
    Regex::new(r#"^\s*@import\s+["']([^"']+)["']\s*;\s*$"#).expect("static regex")
}

impl TransformStage for StyleCompile {
    fn name(&self) -> &str {
        "compile"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);
        let dir = ctx
            .source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.include_dir.clone());

        let mut out = Vec::new();
        let mut map = Vec::new();
        let mut visiting = HashSet::new();
        self.inline(&source, &dir, ctx.source_path, &mut visiting, &mut out, &mut map, true)?;

        let mut contents = out.join("\n");
        contents.push('\n');

        let stem = ctx
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "style".to_string());

        Ok(StageOutcome::replace(contents.into_bytes())
            .with_rename(format!("{}.css", stem))
            .with_line_map(map))
    }
}

/// Inserts a `px` fallback declaration before each `rem`-valued declaration.
pub struct PixelFallback {
    /// Root font size the fallback is computed from
    pub root_value: f64,
}

impl PixelFallback {
    /// Default 16px root.
    pub fn new() -> Self {
        Self { root_value: 16.0 }
    }

    /// Alternate root base (the plugin pipeline uses 10px).
    pub fn with_root(root_value: f64) -> Self {
        Self { root_value }
    }
}

impl Default for PixelFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStage for PixelFallback {
    fn name(&self) -> &str {
        "pixel-fallback"
    }

    fn transform(&self, input: &[u8], _ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);
        let decl_re = Regex::new(r"^(\s*)([a-zA-Z-]+)\s*:\s*([^;{}]*);\s*$").expect("static regex");
        let rem_re = Regex::new(r"(\d*\.?\d+)rem").expect("static regex");

        let mut out = Vec::new();
        let mut map = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            if let Some(caps) = decl_re.captures(line) {
                if rem_re.is_match(&caps[3]) {
                    let fallback_value = rem_re.replace_all(&caps[3], |c: &regex::Captures| {
                        let rems: f64 = c[1].parse().unwrap_or(0.0);
                        format_px(rems * self.root_value)
                    });
                    out.push(format!("{}{}: {};", &caps[1], &caps[2], fallback_value));
                    map.push(Some(idx));
                }
            }
            out.push(line.to_string());
            map.push(Some(idx));
        }

        let mut contents = out.join("\n");
        contents.push('\n');
        Ok(StageOutcome::replace(contents.into_bytes()).with_line_map(map))
    }
}

fn format_px(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}px", value.round() as i64)
    } else {
        format!("{}px", value)
    }
}

/// Vendor prefixing through lightningcss with browser targets.
pub struct VendorPrefix {
    targets: Targets,
}

impl VendorPrefix {
    /// Prefix for the default browser set.
    pub fn new() -> Self {
        Self { targets: Targets::from(default_browsers()) }
    }

    /// Prefix for explicit browser targets.
    pub fn with_browsers(browsers: Browsers) -> Self {
        Self { targets: Targets::from(browsers) }
    }
}

impl Default for VendorPrefix {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStage for VendorPrefix {
    fn name(&self) -> &str {
        "vendor-prefix"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input).into_owned();

        let mut sheet = StyleSheet::parse(&source, ParserOptions::default())
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;
        sheet
            .minify(MinifyOptions { targets: self.targets.clone(), ..MinifyOptions::default() })
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;
        let result = sheet
            .to_css(PrinterOptions { targets: self.targets.clone(), ..PrinterOptions::default() })
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;

        // Rules are rewritten wholesale; the line mapping does not survive.
        Ok(StageOutcome::replace(result.code.into_bytes()))
    }
}

/// One top-level chunk of a stylesheet.
enum Segment {
    /// Content outside any `@media` block
    Base(String),
    /// An `@media` block: (normalized query, body)
    Media(String, String),
}

/// Merges duplicate `@media` blocks and orders the groups.
///
/// Mobile-first ordering puts query-less rules first, then min-width groups
/// ascending; desktop-first reverses the group order so the widest min-width
/// comes first.
pub struct GroupMediaQueries {
    /// Group ordering
    pub order: MediaOrder,
}

impl GroupMediaQueries {
    /// Create a grouping stage with the given ordering.
    pub fn new(order: MediaOrder) -> Self {
        Self { order }
    }

    fn split_segments(source: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut base = String::new();
        let bytes = source.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if source[i..].starts_with("@media") {
                // Find the opening brace, then the matching close
                if let Some(open_rel) = source[i..].find('{') {
                    let open = i + open_rel;
                    let query = source[i + "@media".len()..open].trim().to_string();
                    let mut depth = 1usize;
                    let mut j = open + 1;
                    while j < bytes.len() && depth > 0 {
                        match bytes[j] {
                            b'{' => depth += 1,
                            b'}' => depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    let body = source[open + 1..j.saturating_sub(1)].trim_matches('\n').to_string();
                    segments.push(Segment::Media(normalize_query(&query), body));
                    i = j;
                    continue;
                }
            }
            // Accumulate one byte of base content; cheap because of the
            // substring check above firing rarely
            let ch_len = source[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            base.push_str(&source[i..i + ch_len]);
            i += ch_len;
        }

        if !base.trim().is_empty() {
            segments.insert(0, Segment::Base(base));
        }
        segments
    }
}

/// Sort key for a media query group: width class plus pixel value.
fn query_sort_key(query: &str) -> (u8, i64) {
    let width_re = Regex::new(r"(min|max)-width\s*:\s*(\d*\.?\d+)(px|em|rem)").expect("static regex");
    if let Some(caps) = width_re.captures(query) {
        let value: f64 = caps[2].parse().unwrap_or(0.0);
        let px = match &caps[3] {
            "px" => value,
            _ => value * 16.0,
        };
        match &caps[1] {
            "min" => (0, px as i64),
            _ => (1, -(px as i64)),
        }
    } else {
        (2, 0)
    }
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl TransformStage for GroupMediaQueries {
    fn name(&self) -> &str {
        "group-media-queries"
    }

    fn transform(&self, input: &[u8], _ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);
        let segments = Self::split_segments(&source);

        let mut base = String::new();
        // Preserve first-seen order for groups that compare equal
        let mut queries: Vec<String> = Vec::new();
        let mut bodies: Vec<String> = Vec::new();

        for segment in segments {
            match segment {
                Segment::Base(content) => base.push_str(content.trim_end()),
                Segment::Media(query, body) => {
                    if let Some(pos) = queries.iter().position(|q| *q == query) {
                        bodies[pos].push('\n');
                        bodies[pos].push_str(&body);
                    } else {
                        queries.push(query);
                        bodies.push(body);
                    }
                }
            }
        }

        let mut order: Vec<usize> = (0..queries.len()).collect();
        order.sort_by(|&a, &b| {
            let ka = query_sort_key(&queries[a]);
            let kb = query_sort_key(&queries[b]);
            match self.order {
                MediaOrder::MobileFirst => ka.cmp(&kb),
                MediaOrder::DesktopFirst => kb.cmp(&ka),
            }
            .then(a.cmp(&b))
        });
        // Groups without a width feature keep a stable tail position
        if self.order == MediaOrder::DesktopFirst {
            order.sort_by_key(|&i| u8::from(query_sort_key(&queries[i]).0 == 2));
        }

        let mut out = String::new();
        out.push_str(&base);
        if !base.is_empty() {
            out.push('\n');
        }
        for &i in &order {
            out.push_str(&format!("@media {} {{\n{}\n}}\n", queries[i], bodies[i]));
        }

        Ok(StageOutcome::replace(out.into_bytes()))
    }
}

impl GroupMediaQueries {
    /// Compare two queries under this stage's ordering; exposed for tests.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let cmp = query_sort_key(a).cmp(&query_sort_key(b));
        match self.order {
            MediaOrder::MobileFirst => cmp,
            MediaOrder::DesktopFirst => cmp.reverse(),
        }
    }
}

/// Lint-autofix stage: canonical quotes and whitespace.
///
/// In fix mode violations are corrected and reported as warnings. In strict
/// mode the first violation fails the stage, mirroring a lint task that gates
/// the build.
pub struct LintAutofix {
    /// Fail on first violation instead of fixing
    pub strict: bool,
}

impl LintAutofix {
    /// Autofix mode.
    pub fn fix() -> Self {
        Self { strict: false }
    }

    /// Strict check mode.
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl TransformStage for LintAutofix {
    fn name(&self) -> &str {
        "lint"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);
        let quote_re = Regex::new(r"'([^'\n]*)'").expect("static regex");

        let mut out: Vec<String> = Vec::new();
        let mut map = Vec::new();
        let mut diagnostics = Vec::new();
        let mut blank_run = 0usize;

        for (idx, line) in source.lines().enumerate() {
            let mut fixed = line.trim_end().to_string();

            if fixed.len() != line.len() {
                if self.strict {
                    return Err(StageError::lint(
                        ctx.source_path,
                        format!("trailing whitespace on line {}", idx + 1),
                    ));
                }
                diagnostics.push(Diagnostic::warning(
                    self.name(),
                    ctx.source_path,
                    Some(idx + 1),
                    "trailing whitespace",
                ));
            }

            if quote_re.is_match(&fixed) && !fixed.contains('"') {
                if self.strict {
                    return Err(StageError::lint(
                        ctx.source_path,
                        format!("single-quoted string on line {} (expected double)", idx + 1),
                    ));
                }
                diagnostics.push(Diagnostic::warning(
                    self.name(),
                    ctx.source_path,
                    Some(idx + 1),
                    "single-quoted string rewritten to double quotes",
                ));
                fixed = quote_re.replace_all(&fixed, "\"$1\"").into_owned();
            }

            if fixed.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue; // collapse consecutive blank lines
                }
            } else {
                blank_run = 0;
            }

            out.push(fixed);
            map.push(Some(idx));
        }

        // Exactly one trailing newline
        while out.last().map(|l| l.is_empty()).unwrap_or(false) {
            out.pop();
            map.pop();
        }
        let mut contents = out.join("\n");
        contents.push('\n');

        let mut outcome = StageOutcome::replace(contents.into_bytes()).with_line_map(map);
        outcome.diagnostics = diagnostics;
        Ok(outcome)
    }
}

/// Forks a minified copy (`<stem>.min.css`) alongside the original output.
pub struct MinifyCss;

impl TransformStage for MinifyCss {
    fn name(&self) -> &str {
        "minify"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input).into_owned();

        let mut sheet = StyleSheet::parse(&source, ParserOptions::default())
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;
        sheet
            .minify(MinifyOptions::default())
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;
        let result = sheet
            .to_css(PrinterOptions { minify: true, ..PrinterOptions::default() })
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;

        let stem = ctx
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "style".to_string());

        Ok(StageOutcome::passthrough(input)
            .with_fork(format!("{}.min.css", stem), result.code.into_bytes()))
    }
}

/// Serializes the accumulated line mapping as a companion `.map` artifact
/// and appends the reference comment to the output.
///
/// Mappings are explicit 1-indexed `[output, source]` line pairs; source
/// content is referenced by path only, never embedded.
pub struct SourceMapEmit;

impl TransformStage for SourceMapEmit {
    fn name(&self) -> &str {
        "source-map"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let file = ctx.path.to_string_lossy().into_owned();
        let map_name = format!("{}.map", file);

        let empty: LineMap = identity_line_map(0);
        let line_map = ctx.line_map.unwrap_or(&empty);
        let mappings: Vec<[usize; 2]> = line_map
            .iter()
            .enumerate()
            .filter_map(|(out_line, src)| src.map(|s| [out_line + 1, s + 1]))
            .collect();

        let map = serde_json::json!({
            "version": 3,
            "file": file,
            "sources": [ctx.source_path.to_string_lossy()],
            "lineMappings": mappings,
        });
        let map_bytes = serde_json::to_vec_pretty(&map)
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;

        let mut contents = input.to_vec();
        if !contents.ends_with(b"\n") {
            contents.push(b'\n');
        }
        contents.extend_from_slice(format!("/*# sourceMappingURL={} */\n", map_name).as_bytes());

        let map_len = String::from_utf8_lossy(&contents).lines().count();
        let mut padded: LineMap = line_map.clone();
        while padded.len() < map_len {
            padded.push(None); // the appended reference comment
        }

        Ok(StageOutcome::replace(contents).with_fork(map_name, map_bytes).with_line_map(padded))
    }
}
