//! Configuration loading and discovery for `forge.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{default_style_pipelines, ForgeConfig, ProjectConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse forge.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override proxy upstream
    pub proxy: Option<String>,
    /// Override server port
    pub port: Option<u16>,
    /// Override browser auto-open
    pub open: Option<bool>,
    /// Override output directory
    pub out: Option<PathBuf>,
}

/// Find forge.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for forge.toml
/// 2. Check XDG_CONFIG_HOME/assetforge/forge.toml (or ~/.config/assetforge/forge.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find forge.toml in XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("assetforge").join("forge.toml");
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find forge.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join("forge.toml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a forge.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
pub fn load_config(path: Option<&Path>) -> Result<ForgeConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<ForgeConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: ForgeConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no forge.toml is found.
///
/// Returns a minimal valid configuration with the project name set to
/// the current directory name.
pub fn default_config() -> ForgeConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    ForgeConfig {
        project: ProjectConfig { name: project_name, out: PathBuf::from("dist") },
        styles: default_style_pipelines(),
        scripts: Default::default(),
        images: Default::default(),
        watch: Default::default(),
        serve: Default::default(),
        version: Default::default(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut ForgeConfig, overrides: &CliOverrides) {
    if let Some(ref proxy) = overrides.proxy {
        config.serve.proxy = proxy.clone();
    }

    if let Some(port) = overrides.port {
        config.serve.port = port;
    }

    if let Some(open) = overrides.open {
        config.serve.open = open;
    }

    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("forge.toml");
        File::create(&config_path)
            .expect("should create config file")
            .write_all(b"[project]\nname = \"theme\"")
            .expect("should write config content");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("forge.toml");
        File::create(&config_path)
            .expect("should create config file")
            .write_all(b"[project]\nname = \"theme\"")
            .expect("should write config content");

        let subdir = temp.path().join("scss").join("base");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, None);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("forge.toml");
        File::create(&config_path)
            .expect("should create config file")
            .write_all(
                br#"
[project]
name = "storefront"
out = "public"

[serve]
port = 3000
"#,
            )
            .expect("should write config content");

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.project.name, "storefront");
        assert_eq!(config.project.out, PathBuf::from("public"));
        assert_eq!(config.serve.port, 3000);
    }

    #[test]
    fn test_load_config_missing_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("nonexistent.toml");

        let result = load_config(Some(&config_path));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("forge.toml");
        File::create(&config_path)
            .expect("should create config file")
            .write_all(b"this is not valid toml {{{")
            .expect("should write invalid config");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("forge.toml");
        File::create(&config_path)
            .expect("should create config file")
            .write_all(
                br#"
[project]
name = ""

[watch]
debounce_ms = 0
"#,
            )
            .expect("should write invalid config");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert!(!config.project.name.is_empty());
        assert_eq!(config.project.out, PathBuf::from("dist"));
        assert_eq!(config.styles.len(), 2);
        assert!(config.is_valid());
    }

    #[test]
    fn test_merge_cli_overrides() {
        let mut config = default_config();
        let overrides = CliOverrides {
            proxy: Some("http://localhost:9999".to_string()),
            port: Some(3001),
            open: Some(true),
            out: Some(PathBuf::from("public")),
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.serve.proxy, "http://localhost:9999");
        assert_eq!(config.serve.port, 3001);
        assert!(config.serve.open);
        assert_eq!(config.project.out, PathBuf::from("public"));
    }

    #[test]
    fn test_project_root() {
        let config_path = Path::new("/project/forge.toml");
        assert_eq!(project_root(config_path), Some(Path::new("/project")));
    }
}
