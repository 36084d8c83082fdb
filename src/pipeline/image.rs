//! Image optimization stage.
//!
//! Decodes and re-encodes raster images; the smaller of the two encodings
//! wins, so the stage never grows a file. Formats the decoder does not
//! recognize (SVG in particular) pass through untouched.

use super::stage::{Diagnostic, StageContext, StageError, StageOutcome, TransformStage};
use image::ImageOutputFormat;
use std::io::Cursor;

/// Re-encode raster images in place.
pub struct OptimizeImages;

fn output_format(extension: &str) -> Option<ImageOutputFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some(ImageOutputFormat::Png),
        "jpg" | "jpeg" => Some(ImageOutputFormat::Jpeg(82)),
        "gif" => Some(ImageOutputFormat::Gif),
        "bmp" => Some(ImageOutputFormat::Bmp),
        _ => None,
    }
}

impl TransformStage for OptimizeImages {
    fn name(&self) -> &str {
        "optimize"
    }

    fn transform(&self, input: &[u8], ctx: &StageContext<'_>) -> Result<StageOutcome, StageError> {
        let extension = ctx
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        let Some(format) = output_format(&extension) else {
            return Ok(StageOutcome::passthrough(input));
        };

        let decoded = match image::load_from_memory(input) {
            Ok(img) => img,
            Err(e) => {
                // Undecodable files pass through with a warning instead of
                // failing the whole run
                let mut outcome = StageOutcome::passthrough(input);
                outcome.diagnostics.push(Diagnostic::warning(
                    self.name(),
                    ctx.source_path,
                    None,
                    format!("could not decode: {}", e),
                ));
                return Ok(outcome);
            }
        };

        let mut encoded = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut encoded), format)
            .map_err(|e| StageError::compile(ctx.source_path, e.to_string()))?;

        if encoded.len() < input.len() {
            Ok(StageOutcome::replace(encoded))
        } else {
            Ok(StageOutcome::passthrough(input))
        }
    }
}
