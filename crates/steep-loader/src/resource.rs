//! Resource kinds and the abstract fetch capability.

use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use url::Url;

use crate::error::LoaderResult;
use crate::runtime::Loader;

/// What a resource is, decided once when its canonical URL is assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Executable unit that may define a module
    CodeUnit,
    /// Markup whose value is the fragment itself
    MarkupFragment,
}

impl ResourceKind {
    pub fn is_markup(&self) -> bool {
        matches!(self, ResourceKind::MarkupFragment)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::CodeUnit => f.write_str("code"),
            ResourceKind::MarkupFragment => f.write_str("markup"),
        }
    }
}

/// A resolved dependency: canonical URL plus deduced name and kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTarget {
    pub url: Url,
    /// Final path segment, with the default extension applied
    pub name: String,
    pub kind: ResourceKind,
}

impl ResourceTarget {
    /// Registry key
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    /// Resource name without its extension
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }
}

type UnitFn = Box<dyn FnOnce(&mut Loader) -> anyhow::Result<()>>;

/// A fetched code unit, executed on the loader's thread.
///
/// Calling [`Loader::define`] while the unit runs binds the definition to
/// the unit's canonical URL.
pub struct CodeUnit(UnitFn);

impl CodeUnit {
    pub fn new(body: impl FnOnce(&mut Loader) -> anyhow::Result<()> + 'static) -> Self {
        Self(Box::new(body))
    }

    pub(crate) fn execute(self, loader: &mut Loader) -> anyhow::Result<()> {
        (self.0)(loader)
    }
}

impl fmt::Debug for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeUnit")
    }
}

/// Markup fragment value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Resource name without extension, used as the fragment's element name
    pub name: String,
    pub url: String,
    pub content: String,
}

impl Fragment {
    pub fn new(target: &ResourceTarget, content: impl Into<String>) -> Self {
        Self {
            name: target.stem().to_string(),
            url: target.url.to_string(),
            content: content.into(),
        }
    }
}

/// Outcome of a successful fetch
#[derive(Debug)]
pub enum LoadedResource {
    Code(CodeUnit),
    Markup {
        fragment: Fragment,
        /// Script embedded in the fragment, run before the fragment is ready
        script: Option<CodeUnit>,
    },
}

impl LoadedResource {
    pub fn code(body: impl FnOnce(&mut Loader) -> anyhow::Result<()> + 'static) -> Self {
        Self::Code(CodeUnit::new(body))
    }

    pub fn markup(fragment: Fragment) -> Self {
        Self::Markup {
            fragment,
            script: None,
        }
    }
}

/// Future returned by [`ResourceLoader::load`]
pub type LoadFuture = LocalBoxFuture<'static, LoaderResult<LoadedResource>>;

/// Fetch capability used by the loader.
///
/// `load` is called at most once per canonical URL.
pub trait ResourceLoader {
    fn load(&self, target: &ResourceTarget) -> LoadFuture;
}

impl<T: ResourceLoader + ?Sized> ResourceLoader for Rc<T> {
    fn load(&self, target: &ResourceTarget) -> LoadFuture {
        (**self).load(target)
    }
}

impl<T: ResourceLoader + ?Sized> ResourceLoader for Box<T> {
    fn load(&self, target: &ResourceTarget) -> LoadFuture {
        (**self).load(target)
    }
}
