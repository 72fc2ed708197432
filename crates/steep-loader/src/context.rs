//! Resolution contexts and specifier resolution.
//!
//! Specifiers are classified in order:
//! 1. Fully qualified (`https://...`) - used as-is
//! 2. Root-absolute (`/lib/x`) - resolved against the context's root URL
//! 3. Relative (`./x`, `../x`) - resolved against the context's base URL
//! 4. Bare (`x`) - resolved against the loader's default base URL
//!
//! The canonical URL is the resolved directory plus the resource name, so
//! different spellings of the same location share one registry entry.

use tracing::debug;
use url::Url;

use crate::config::LoaderConfig;
use crate::error::{LoadError, LoaderResult};
use crate::resource::{ResourceKind, ResourceTarget};

/// Base/root URL pair anchoring relative and root-absolute specifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    base_url: Url,
    root_url: Url,
}

impl Context {
    /// Context for a resource at `url`: its directory and its origin root
    pub fn for_url(url: &Url) -> LoaderResult<Self> {
        Ok(Self {
            base_url: directory_of(url)?,
            root_url: url
                .join("/")
                .map_err(|e| LoadError::unresolved(url.as_str(), e))?,
        })
    }

    pub fn parse(url: &str) -> LoaderResult<Self> {
        let url = Url::parse(url.trim()).map_err(|e| LoadError::unresolved(url, e))?;
        Self::for_url(&url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn root_url(&self) -> &Url {
        &self.root_url
    }
}

/// Directory containing `url`, with query and fragment dropped
pub fn directory_of(url: &Url) -> LoaderResult<Url> {
    url.join("./")
        .map_err(|e| LoadError::unresolved(url.as_str(), e))
}

/// Interpret `url` as a directory, appending a trailing slash if missing
pub fn as_directory(url: &str) -> LoaderResult<Url> {
    let mut parsed = Url::parse(url.trim()).map_err(|e| LoadError::unresolved(url, e))?;
    if parsed.cannot_be_a_base() {
        return Err(LoadError::unresolved(url, "URL cannot be used as a base"));
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed)
}

/// Maps specifiers to canonical resource targets
#[derive(Debug, Clone)]
pub struct Resolver {
    default_base: Option<Url>,
    config: LoaderConfig,
}

impl Resolver {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            default_base: None,
            config,
        }
    }

    /// Default base URL used for bare specifiers
    pub fn default_base(&self) -> Option<&Url> {
        self.default_base.as_ref()
    }

    pub fn set_default_base(&mut self, base: Url) {
        debug!(base = %base, "default base URL set");
        self.default_base = Some(base);
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Resolve a specifier within `ctx`
    pub fn resolve(&self, specifier: &str, ctx: &Context) -> LoaderResult<ResourceTarget> {
        let spec = specifier.trim();
        if spec.is_empty() {
            return Err(LoadError::unresolved(specifier, "empty specifier"));
        }

        let absolute = if self.is_fully_qualified(spec) {
            Url::parse(spec)
        } else if spec.starts_with('/') {
            ctx.root_url.join(spec)
        } else if spec.starts_with('.') {
            ctx.base_url.join(spec)
        } else {
            let base = self
                .default_base
                .as_ref()
                .ok_or_else(|| LoadError::unresolved(spec, "no default base URL configured"))?;
            base.join(spec)
        }
        .map_err(|e| LoadError::unresolved(spec, e))?;

        let last = absolute
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        if last.is_empty() {
            return Err(LoadError::unresolved(spec, "does not name a resource"));
        }

        let name = if last.contains('.') {
            last.to_string()
        } else {
            format!("{}.{}", last, self.config.default_extension)
        };

        let mut url = directory_of(&absolute)?;
        let path = format!("{}{}", url.path(), name);
        url.set_path(&path);

        let kind = if self.config.is_markup(&name) {
            ResourceKind::MarkupFragment
        } else {
            ResourceKind::CodeUnit
        };

        Ok(ResourceTarget { url, name, kind })
    }

    fn is_fully_qualified(&self, spec: &str) -> bool {
        spec.split_once("://")
            .is_some_and(|(scheme, _)| self.config.is_network_scheme(scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        let mut resolver = Resolver::new(LoaderConfig::default());
        resolver.set_default_base(Url::parse("http://example.com/app/js/").unwrap());
        resolver
    }

    fn ctx() -> Context {
        Context::parse("http://example.com/app/views/main.js").unwrap()
    }

    fn resolve(spec: &str) -> String {
        resolver().resolve(spec, &ctx()).unwrap().url.to_string()
    }

    #[test]
    fn test_context_for_url() {
        let ctx = ctx();
        assert_eq!(ctx.base_url().as_str(), "http://example.com/app/views/");
        assert_eq!(ctx.root_url().as_str(), "http://example.com/");
    }

    #[test]
    fn test_context_for_directory_url() {
        let ctx = Context::parse("http://example.com/app/").unwrap();
        assert_eq!(ctx.base_url().as_str(), "http://example.com/app/");
    }

    #[test]
    fn test_resolve_fully_qualified() {
        assert_eq!(
            resolve("https://cdn.example.org/lib/util.js"),
            "https://cdn.example.org/lib/util.js"
        );
    }

    #[test]
    fn test_resolve_root_absolute() {
        assert_eq!(resolve("/common/utils"), "http://example.com/common/utils.js");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve("./ux"), "http://example.com/app/views/ux.js");
        assert_eq!(
            resolve("../common/fileTea.js"),
            "http://example.com/app/common/fileTea.js"
        );
    }

    #[test]
    fn test_resolve_bare_uses_default_base() {
        assert_eq!(resolve("transfers"), "http://example.com/app/js/transfers.js");
        assert_eq!(
            resolve("common/utils"),
            "http://example.com/app/js/common/utils.js"
        );
    }

    #[test]
    fn test_resolve_bare_without_default_base() {
        let resolver = Resolver::new(LoaderConfig::default());
        let err = resolver.resolve("transfers", &ctx()).unwrap_err();
        assert!(matches!(err, LoadError::Unresolved { .. }));
    }

    #[test]
    fn test_resolve_trims_whitespace() {
        assert_eq!(resolve("  ./ux \n"), "http://example.com/app/views/ux.js");
    }

    #[test]
    fn test_resolve_empty_is_error() {
        let err = resolver().resolve("   ", &ctx()).unwrap_err();
        assert!(matches!(err, LoadError::Unresolved { .. }));
    }

    #[test]
    fn test_resolve_directory_is_error() {
        assert!(resolver().resolve("./lib/", &ctx()).is_err());
    }

    #[test]
    fn test_spellings_collapse_to_one_url() {
        let a = resolve("./ux");
        let b = resolve("../views/ux.js");
        let c = resolve("/app/views/./ux");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let r = resolver();
        let first = r.resolve("../common/contentManager", &ctx()).unwrap();
        let second = r.resolve("../common/contentManager", &ctx()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_query_is_dropped() {
        assert_eq!(resolve("./ux.js?v=3"), "http://example.com/app/views/ux.js");
    }

    #[test]
    fn test_markup_kind() {
        let target = resolver()
            .resolve("../default/shared-files-view.html", &ctx())
            .unwrap();
        assert_eq!(target.kind, ResourceKind::MarkupFragment);
        assert_eq!(target.name, "shared-files-view.html");

        let code = resolver().resolve("./ux", &ctx()).unwrap();
        assert_eq!(code.kind, ResourceKind::CodeUnit);
        assert_eq!(code.name, "ux.js");
    }

    #[test]
    fn test_as_directory() {
        assert_eq!(
            as_directory("http://example.com/app").unwrap().as_str(),
            "http://example.com/app/"
        );
        assert_eq!(
            as_directory("http://example.com/app/?x=1").unwrap().as_str(),
            "http://example.com/app/"
        );
        assert!(as_directory("mailto:someone@example.com").is_err());
    }
}
