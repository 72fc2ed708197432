//! Host resource loader
//!
//! Supports loading:
//! - Code units from a table the host registers by canonical URL
//! - Markup fragments from `file://` paths and `http(s)://` URLs

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;
use url::Url;

use crate::error::{LoadError, LoaderResult};
use crate::resource::{
    CodeUnit, Fragment, LoadFuture, LoadedResource, ResourceKind, ResourceLoader, ResourceTarget,
};

type UnitFactory = Rc<dyn Fn() -> CodeUnit>;

/// Resource loader backed by host-registered code units and real I/O
#[derive(Clone, Default)]
pub struct HostLoader {
    units: HashMap<String, UnitFactory>,
    client: reqwest::Client,
}

impl HostLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the code unit served for `url`.
    ///
    /// Registering under a markup URL attaches the unit as the fragment's
    /// embedded script.
    pub fn register(
        &mut self,
        url: &str,
        factory: impl Fn() -> CodeUnit + 'static,
    ) -> LoaderResult<()> {
        let url = Url::parse(url.trim()).map_err(|e| LoadError::unresolved(url, e))?;
        debug!(url = %url, "code unit registered");
        self.units.insert(url.to_string(), Rc::new(factory));
        Ok(())
    }

    /// Builder form of [`HostLoader::register`]
    pub fn with_unit(
        mut self,
        url: &str,
        factory: impl Fn() -> CodeUnit + 'static,
    ) -> LoaderResult<Self> {
        self.register(url, factory)?;
        Ok(self)
    }

    pub fn has_unit(&self, url: &str) -> bool {
        self.units.contains_key(url)
    }
}

impl ResourceLoader for HostLoader {
    fn load(&self, target: &ResourceTarget) -> LoadFuture {
        let unit = self.units.get(target.key()).map(|factory| factory());
        let client = self.client.clone();
        let target = target.clone();

        Box::pin(async move {
            match target.kind {
                ResourceKind::CodeUnit => unit.map(LoadedResource::Code).ok_or_else(|| {
                    LoadError::fetch(target.key(), "no code unit registered for this URL")
                }),
                ResourceKind::MarkupFragment => {
                    let content = fetch_text(&client, &target.url).await?;
                    Ok(LoadedResource::Markup {
                        fragment: Fragment::new(&target, content),
                        script: unit,
                    })
                }
            }
        })
    }
}

async fn fetch_text(client: &reqwest::Client, url: &Url) -> LoaderResult<String> {
    match url.scheme() {
        "file" => load_file(url).await,
        "http" | "https" => load_remote(client, url).await,
        other => Err(LoadError::fetch(
            url.as_str(),
            format!("unsupported URL scheme '{other}'"),
        )),
    }
}

/// Read a local file
async fn load_file(url: &Url) -> LoaderResult<String> {
    let path = url
        .to_file_path()
        .map_err(|()| LoadError::fetch(url.as_str(), "not a local file path"))?;

    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| LoadError::fetch(url.as_str(), format!("{}: {}", path.display(), e)))
}

/// Fetch over the network
async fn load_remote(client: &reqwest::Client, url: &Url) -> LoaderResult<String> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| LoadError::fetch(url.as_str(), e))?;

    if !response.status().is_success() {
        return Err(LoadError::fetch(
            url.as_str(),
            format!("HTTP {}", response.status()),
        ));
    }

    response
        .text()
        .await
        .map_err(|e| LoadError::fetch(url.as_str(), format!("failed to read response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn target(url: &Url, kind: ResourceKind) -> ResourceTarget {
        let name = url.path_segments().unwrap().next_back().unwrap().to_string();
        ResourceTarget {
            url: url.clone(),
            name,
            kind,
        }
    }

    #[tokio::test]
    async fn test_load_markup_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("privacy-policy.html");
        std::fs::write(&path, "<section>policy</section>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let loaded = HostLoader::new()
            .load(&target(&url, ResourceKind::MarkupFragment))
            .await
            .unwrap();

        match loaded {
            LoadedResource::Markup { fragment, script } => {
                assert_eq!(fragment.name, "privacy-policy");
                assert_eq!(fragment.content, "<section>policy</section>");
                assert_eq!(fragment.url, url.to_string());
                assert!(script.is_none());
            }
            other => panic!("expected markup, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let dir = tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.html")).unwrap();

        let err = HostLoader::new()
            .load(&target(&url, ResourceKind::MarkupFragment))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_registered_code_unit() {
        let host = HostLoader::new()
            .with_unit("http://x/app/a.js", || CodeUnit::new(|_| Ok(())))
            .unwrap();
        assert!(host.has_unit("http://x/app/a.js"));

        let url = Url::parse("http://x/app/a.js").unwrap();
        let loaded = host
            .load(&target(&url, ResourceKind::CodeUnit))
            .await
            .unwrap();
        assert!(matches!(loaded, LoadedResource::Code(_)));
    }

    #[tokio::test]
    async fn test_unregistered_code_unit_is_fetch_error() {
        let url = Url::parse("http://x/app/b.js").unwrap();
        let err = HostLoader::new()
            .load(&target(&url, ResourceKind::CodeUnit))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::fetch("http://x/app/b.js", "no code unit registered for this URL")
        );
    }

    #[tokio::test]
    async fn test_markup_with_registered_script() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("view.html");
        std::fs::write(&path, "<div></div>").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let host = HostLoader::new()
            .with_unit(url.as_str(), || CodeUnit::new(|_| Ok(())))
            .unwrap();
        let loaded = host
            .load(&target(&url, ResourceKind::MarkupFragment))
            .await
            .unwrap();
        assert!(matches!(
            loaded,
            LoadedResource::Markup {
                script: Some(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let url = Url::parse("ftp://x/view.html").unwrap();
        let err = HostLoader::new()
            .load(&target(&url, ResourceKind::MarkupFragment))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));
    }
}
