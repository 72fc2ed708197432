//! Configuration file parsing for steep.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use steep_loader::LoaderConfig;

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Loader settings
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl Config {
    /// Loader settings with command-line overrides applied
    pub fn loader_with_base(&self, base: Option<&str>) -> LoaderConfig {
        let mut loader = self.loader.clone();
        if let Some(base) = base {
            loader.base_url = Some(base.to_string());
        }
        loader
    }
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        _ => Ok(Config::default()),
    }
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_ancestors(&cwd)
}

fn find_config_in_ancestors(start: &Path) -> Option<PathBuf> {
    const CONFIG_NAMES: &[&str] = &["steep.toml", ".steeprc.toml"];

    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.loader.base_url.is_none());
        assert_eq!(config.loader.default_extension, "js");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[loader]
base_url = "https://example.com/app/js"
main = "main"
markup_extensions = ["html", "htm"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.loader.base_url.as_deref(),
            Some("https://example.com/app/js")
        );
        assert_eq!(config.loader.main.as_deref(), Some("main"));
        assert!(config.loader.is_markup("view.htm"));
        // unspecified fields keep their defaults
        assert_eq!(config.loader.default_extension, "js");
    }

    #[test]
    fn test_base_override() {
        let config: Config = toml::from_str("[loader]\nbase_url = \"http://a/\"").unwrap();
        assert_eq!(
            config.loader_with_base(Some("http://b/")).base_url.as_deref(),
            Some("http://b/")
        );
        assert_eq!(
            config.loader_with_base(None).base_url.as_deref(),
            Some("http://a/")
        );
    }

    #[test]
    fn test_find_config_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("steep.toml"), "[loader]\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_in_ancestors(&nested),
            Some(dir.path().join("steep.toml"))
        );
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[loader]\ndefault_extension = \"mjs\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.loader.default_extension, "mjs");
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steep.toml");
        std::fs::write(&path, "[loader]\nmarkup_extensions = 3\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse"));
    }
}
