//! Script pipeline stages: formatting and whitespace minification.

use super::stage::{Diagnostic, StageContext, StageError, StageOutcome, TransformStage};
use regex::Regex;

/// Format normalization for scripts: trailing whitespace, blank-line runs,
/// final newline. Fixes are applied and reported as warnings.
pub struct ScriptFormat;

impl TransformStage for ScriptFormat {
    fn name(&self) -> &str {
        "format"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);

        let mut out: Vec<String> = Vec::new();
        let mut map = Vec::new();
        let mut diagnostics = Vec::new();
        let mut blank_run = 0usize;

        for (idx, line) in source.lines().enumerate() {
            let fixed = line.trim_end();
            if fixed.len() != line.len() {
                diagnostics.push(Diagnostic::warning(
                    self.name(),
                    ctx.source_path,
                    Some(idx + 1),
                    "trailing whitespace",
                ));
            }

            if fixed.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }

            out.push(fixed.to_string());
            map.push(Some(idx));
        }

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

/// Conservative whitespace minifier for scripts.
///
/// Strips whole-line and block comments, blank lines, and indentation, then
/// renames the output to `<stem>.min.js`. No unminified copy is kept; the
/// source tree already holds the readable original.
pub struct ScriptMinify;

impl TransformStage for ScriptMinify {
    fn name(&self) -> &str {
        "minify"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let source = String::from_utf8_lossy(input);
        let block_re = Regex::new(r"(?s)/\*.*?\*/").expect("static regex");
        let without_blocks = block_re.replace_all(&source, "");

        let mut out = String::new();
        for line in without_blocks.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            out.push_str(trimmed);
            out.push('\n');
        }

        let stem = ctx
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());

        Ok(StageOutcome::replace(out.into_bytes()).with_rename(format!("{}.min.js", stem)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn run(stage: &dyn TransformStage, input: &str, name: &str) -> StageOutcome {
        let path = PathBuf::from(name);
        let context = StageContext {
            path: &path,
            source_path: &path,
            original: input.as_bytes(),
            line_map: None,
        };
        stage.transform(input.as_bytes(), &context).unwrap()
    }

    #[test]
    fn test_format_trims_and_warns() {
        let outcome = run(&ScriptFormat, "var a = 1;   \nvar b = 2;\n", "app.js");
        let out = String::from_utf8(outcome.contents).unwrap();
        assert_eq!(out, "var a = 1;\nvar b = 2;\n");
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_minify_strips_comments_and_renames() {
        let input = "/* banner\n * comment */\n// setup\nfunction go() {\n    return 1;\n}\n";
        let outcome = run(&ScriptMinify, input, "app.js");
        let out = String::from_utf8(outcome.contents).unwrap();
        assert!(!out.contains("banner"));
        assert!(!out.contains("setup"));
        assert!(out.contains("function go() {"));
        assert!(out.contains("return 1;"));
        assert_eq!(outcome.rename.as_deref(), Some("app.min.js"));
    }

    #[test]
    fn test_minify_keeps_statement_order() {
        let outcome = run(&ScriptMinify, "var a = 1;\n\nvar b = 2;\n", "app.js");
        let out = String::from_utf8(outcome.contents).unwrap();
        assert_eq!(out, "var a = 1;\nvar b = 2;\n");
    }
}
