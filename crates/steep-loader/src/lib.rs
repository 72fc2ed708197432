//! Steep module loader core.
//!
//! This crate provides an asynchronous module-dependency loader: callers
//! declare dependencies by specifier, the loader resolves them to canonical
//! URLs, fetches each at most once, and runs callbacks once every dependency
//! of a request is ready.
//!
//! # Features
//!
//! - **Resolution**: Fully qualified, root-absolute, relative and bare specifiers
//! - **Single-flight**: One fetch per canonical URL, shared by all waiters
//! - **Definitions**: Code units define their module with further dependencies
//! - **Bootstrap**: Top-level requests wait for the root context
//! - **Failures**: Per-request errbacks, cycle detection, no re-fetching
//!
//! # Example
//!
//! ```no_run
//! use steep_loader::{CodeUnit, HostLoader, Loader, ModuleValue};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = HostLoader::new().with_unit("https://example.com/app/answer.js", || {
//!         CodeUnit::new(|loader| {
//!             loader.define(Vec::<&str>::new(), |_, _| Ok(Some(ModuleValue::new(42))));
//!             Ok(())
//!         })
//!     })?;
//!
//!     let mut loader = Loader::new(host);
//!     loader.configure("https://example.com/app/")?;
//!     loader.require(["answer"], |_, values| {
//!         println!("answer = {:?}", values[0].downcast_ref::<i32>());
//!         Ok(())
//!     });
//!     loader.run_until_idle().await;
//!
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod loader;
mod request;
pub mod resource;
pub mod runtime;
pub mod value;

pub use bootstrap::BootstrapState;
pub use config::LoaderConfig;
pub use context::{Context, Resolver};
pub use error::{LoadError, LoaderResult};
pub use graph::ModuleStatus;
pub use loader::HostLoader;
pub use request::RequestId;
pub use resource::{
    CodeUnit, Fragment, LoadFuture, LoadedResource, ResourceKind, ResourceLoader, ResourceTarget,
};
pub use runtime::Loader;
pub use value::ModuleValue;
