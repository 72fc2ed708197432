//! CLI command implementations.

pub mod fetch;
pub mod resolve;

use anyhow::Result;
use url::Url;

/// Current directory as a `file://` base URL
pub(crate) fn current_dir_url() -> Result<Url> {
    let cwd = std::env::current_dir()?;
    Url::from_directory_path(&cwd)
        .map_err(|()| anyhow::anyhow!("Cannot use '{}' as a base URL", cwd.display()))
}
