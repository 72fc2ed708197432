//! Loader configuration.

use serde::{Deserialize, Serialize};

/// Module loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Default base URL for bare specifiers. Treated as a directory.
    pub base_url: Option<String>,

    /// Main resource, resolved against `base_url` and loaded as a script
    pub main: Option<String>,

    /// Extension appended to resource names that have none
    pub default_extension: String,

    /// Extensions that mark a resource as a markup fragment
    pub markup_extensions: Vec<String>,

    /// Schemes whose specifiers are used as-is
    pub network_schemes: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            main: None,
            default_extension: "js".into(),
            markup_extensions: vec!["html".into()],
            network_schemes: vec!["http".into(), "https".into(), "file".into()],
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the main resource.
    pub fn main(mut self, main: impl Into<String>) -> Self {
        self.main = Some(main.into());
        self
    }

    /// Check whether a resource name carries a markup extension
    pub fn is_markup(&self, name: &str) -> bool {
        name.rsplit_once('.').is_some_and(|(_, ext)| {
            self.markup_extensions
                .iter()
                .any(|m| m.eq_ignore_ascii_case(ext))
        })
    }

    /// Check whether a scheme makes a specifier fully qualified
    pub fn is_network_scheme(&self, scheme: &str) -> bool {
        self.network_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.default_extension, "js");
        assert!(config.base_url.is_none());
        assert!(config.is_markup("view.html"));
        assert!(config.is_markup("VIEW.HTML"));
        assert!(!config.is_markup("view.js"));
        assert!(!config.is_markup("html"));
    }

    #[test]
    fn test_network_schemes() {
        let config = LoaderConfig::default();
        assert!(config.is_network_scheme("https"));
        assert!(config.is_network_scheme("FILE"));
        assert!(!config.is_network_scheme("data"));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{ "base_url": "http://example.com/app/" }"#).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://example.com/app/"));
        assert_eq!(config.markup_extensions, vec!["html".to_string()]);
    }
}
