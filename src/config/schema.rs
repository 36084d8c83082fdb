//! Configuration schema types for `forge.toml`
//!
//! Defines the structure and validation rules for project configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::css::MediaOrder;

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Output directory for processed assets
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

/// One stylesheet pipeline: an entry file compiled, prefixed, grouped and
/// minified into the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylePipelineConfig {
    /// Pipeline name, used as the task name
    pub name: String,
    /// Glob patterns for entry stylesheets
    pub sources: Vec<String>,
    /// Directory searched for `@import` partials
    #[serde(default = "default_include_dir")]
    pub include_dir: PathBuf,
    /// Output subdirectory (relative to project.out)
    #[serde(default = "default_style_out")]
    pub out: PathBuf,
    /// Media query ordering strategy
    #[serde(default)]
    pub media_order: MediaOrder,
    /// Root font size in px for rem-to-px fallbacks
    #[serde(default = "default_pixel_root")]
    pub pixel_root: f64,
    /// Glob patterns linted strictly; empty disables the lint task
    #[serde(default)]
    pub lint: Vec<String>,
}

fn default_include_dir() -> PathBuf {
    PathBuf::from("scss")
}

fn default_style_out() -> PathBuf {
    PathBuf::from("css")
}

fn default_pixel_root() -> f64 {
    16.0
}

/// Script pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob patterns for source scripts
    #[serde(default = "default_script_sources")]
    pub sources: Vec<String>,
    /// Output subdirectory (relative to project.out)
    #[serde(default = "default_script_out")]
    pub out: PathBuf,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { sources: default_script_sources(), out: default_script_out() }
    }
}

fn default_script_sources() -> Vec<String> {
    vec!["js/*.js".to_string(), "!js/*.min.js".to_string()]
}

fn default_script_out() -> PathBuf {
    PathBuf::from("js")
}

/// Image pipeline configuration. Images are optimized in place, so there is
/// no output directory to configure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Glob patterns for source images
    #[serde(default = "default_image_sources")]
    pub sources: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { sources: default_image_sources() }
    }
}

fn default_image_sources() -> Vec<String> {
    vec!["images/**/*".to_string()]
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Patterns routed to the style tasks
    #[serde(default = "default_watch_styles")]
    pub styles: Vec<String>,
    /// Patterns routed to the script task
    #[serde(default = "default_script_sources")]
    pub scripts: Vec<String>,
    /// Patterns routed to the image task
    #[serde(default = "default_image_sources")]
    pub images: Vec<String>,
    /// Patterns that trigger a bare full reload (templates, backend code)
    #[serde(default = "default_watch_backend")]
    pub backend: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_watch_styles() -> Vec<String> {
    vec!["scss/**/*.scss".to_string()]
}

fn default_watch_backend() -> Vec<String> {
    vec!["**/*.php".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            styles: default_watch_styles(),
            scripts: default_script_sources(),
            images: default_image_sources(),
            backend: default_watch_backend(),
        }
    }
}

/// Live-reload server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Upstream origin the proxy reflects
    #[serde(default = "default_proxy")]
    pub proxy: String,
    /// Host to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Open a browser after the server starts
    #[serde(default)]
    pub open: bool,
}

fn default_proxy() -> String {
    "http://localhost:8080".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { proxy: default_proxy(), host: default_host(), port: default_port(), open: false }
    }
}

/// Version sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
    /// JSON manifests carrying a "version" field
    #[serde(default = "default_manifests")]
    pub manifests: Vec<PathBuf>,
    /// Files carrying a `Version:` header line
    #[serde(default = "default_version_styles")]
    pub styles: Vec<PathBuf>,
}

fn default_manifests() -> Vec<PathBuf> {
    vec![PathBuf::from("package.json"), PathBuf::from("composer.json")]
}

fn default_version_styles() -> Vec<PathBuf> {
    vec![PathBuf::from("style.css"), PathBuf::from("scss/style.scss")]
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self { manifests: default_manifests(), styles: default_version_styles() }
    }
}

/// Complete forge.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Stylesheet pipelines
    #[serde(default = "default_style_pipelines")]
    pub styles: Vec<StylePipelineConfig>,
    /// Script pipeline
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Image pipeline
    #[serde(default)]
    pub images: ImagesConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Live-reload server settings
    #[serde(default)]
    pub serve: ServeConfig,
    /// Version sync settings
    #[serde(default)]
    pub version: VersionConfig,
}

/// Built-in pipelines: a mobile-first primary stylesheet and a desktop-first
/// plugin stylesheet with a 10px rem root.
pub fn default_style_pipelines() -> Vec<StylePipelineConfig> {
    vec![
        StylePipelineConfig {
            name: "styles".to_string(),
            sources: vec!["scss/style.scss".to_string()],
            include_dir: PathBuf::from("scss"),
            out: PathBuf::from("css"),
            media_order: MediaOrder::MobileFirst,
            pixel_root: 16.0,
            lint: vec!["scss/**/*.scss".to_string(), "!scss/vendors/**/*.scss".to_string()],
        },
        StylePipelineConfig {
            name: "plugin".to_string(),
            sources: vec!["scss/woocommerce/woocommerce.scss".to_string()],
            include_dir: PathBuf::from("scss/woocommerce"),
            out: PathBuf::from("css"),
            media_order: MediaOrder::DesktopFirst,
            pixel_root: 10.0,
            lint: vec![],
        },
    ]
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "styles.plugin.sources")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "forge.toml: '{}' {}", self.field, self.message)
    }
}

impl ForgeConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        for pipeline in &self.styles {
            if pipeline.name.is_empty() {
                errors.push(ConfigValidationError {
                    field: "styles.name".to_string(),
                    message: "must be a non-empty string".to_string(),
                });
                continue;
            }
            if pipeline.sources.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("styles.{}.sources", pipeline.name),
                    message: "must contain at least one glob pattern".to_string(),
                });
            }
            if pipeline.pixel_root <= 0.0 {
                errors.push(ConfigValidationError {
                    field: format!("styles.{}.pixel_root", pipeline.name),
                    message: "must be a positive number".to_string(),
                });
            }
        }

        if self.watch.debounce_ms == 0 {
            errors.push(ConfigValidationError {
                field: "watch.debounce_ms".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if self.version.manifests.is_empty() {
            errors.push(ConfigValidationError {
                field: "version.manifests".to_string(),
                message: "must name at least one manifest".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
