//! Error types for steep-loader

use thiserror::Error;

/// Loader error type
///
/// Errors are cloned into every request that is waiting on a failed module,
/// so they carry rendered messages rather than boxed sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Specifier could not be classified or turned into a URL
    #[error("Cannot resolve '{specifier}': {reason}")]
    Unresolved { specifier: String, reason: String },

    /// Fetching the resource failed
    #[error("Failed to load '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Executing a fetched code unit failed
    #[error("Failed to execute '{url}': {reason}")]
    Execution { url: String, reason: String },

    /// Module body produced no value
    #[error("Module '{url}' did not produce a value")]
    NonConforming { url: String },

    /// Callback or factory returned an error
    #[error("Factory failed: {reason}")]
    Factory { reason: String },

    /// A definition transitively waits on its own module
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A dependency failed to become ready
    #[error("Dependency '{url}' failed: {source}")]
    Dependency {
        url: String,
        #[source]
        source: Box<LoadError>,
    },
}

impl LoadError {
    /// Create a resolution error
    pub fn unresolved(specifier: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unresolved {
            specifier: specifier.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a fetch error
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an execution error
    pub fn execution(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Execution {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn factory(err: &anyhow::Error) -> Self {
        Self::Factory {
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn dependency(url: impl Into<String>, source: LoadError) -> Self {
        Self::Dependency {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping `Dependency` wrappers
    pub fn root_cause(&self) -> &LoadError {
        let mut current = self;
        while let LoadError::Dependency { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Result type using LoadError
pub type LoaderResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = LoadError::Cycle {
            chain: vec!["a.js".into(), "b.js".into(), "a.js".into()],
        };
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: a.js -> b.js -> a.js"
        );
    }

    #[test]
    fn test_root_cause_skips_dependency_chain() {
        let root = LoadError::fetch("http://x/c.js", "HTTP 404");
        let err = LoadError::dependency(
            "http://x/a.js",
            LoadError::dependency("http://x/b.js", root.clone()),
        );
        assert_eq!(err.root_cause(), &root);
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_factory_error_keeps_context() {
        let err = anyhow::anyhow!("bad input").context("building view");
        let load = LoadError::factory(&err);
        assert_eq!(load.to_string(), "Factory failed: building view: bad input");
    }
}
