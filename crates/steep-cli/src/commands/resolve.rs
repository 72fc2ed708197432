//! Resolve command - print canonical URLs without loading anything.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use steep_loader::context::{Context, Resolver, as_directory};
use steep_loader::ResourceTarget;

use super::current_dir_url;
use crate::config::Config;

#[derive(Args)]
pub struct ResolveCommand {
    /// Specifiers to resolve
    #[arg(required = true)]
    pub specifiers: Vec<String>,

    /// Default base URL for bare specifiers (defaults to the current directory)
    #[arg(long)]
    pub base: Option<String>,

    /// URL of the resource the specifiers appear in
    #[arg(long)]
    pub from: Option<String>,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Resolved<'a> {
    specifier: &'a str,
    url: &'a str,
    kind: String,
}

impl ResolveCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let loader_config = config.loader_with_base(self.base.as_deref());
        let base = match &loader_config.base_url {
            Some(base) => as_directory(base)?,
            None => current_dir_url()?,
        };

        let ctx = match &self.from {
            Some(from) => Context::parse(from)?,
            None => Context::for_url(&base)?,
        };
        let mut resolver = Resolver::new(loader_config);
        resolver.set_default_base(base);

        let mut failed = 0;
        for specifier in &self.specifiers {
            match resolver.resolve(specifier, &ctx) {
                Ok(target) => self.print(specifier, &target)?,
                Err(err) => {
                    eprintln!("error: {err}");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            anyhow::bail!(
                "{} of {} specifiers failed to resolve",
                failed,
                self.specifiers.len()
            );
        }
        Ok(())
    }

    fn print(&self, specifier: &str, target: &ResourceTarget) -> Result<()> {
        if self.json {
            let line = serde_json::to_string(&Resolved {
                specifier,
                url: target.key(),
                kind: target.kind.to_string(),
            })?;
            println!("{line}");
        } else {
            println!("{}\t{}", target.kind, target.url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(specifiers: &[&str]) -> ResolveCommand {
        ResolveCommand {
            specifiers: specifiers.iter().map(|s| s.to_string()).collect(),
            base: Some("http://example.com/app/js".into()),
            from: Some("http://example.com/app/views/main.js".into()),
            json: true,
        }
    }

    #[test]
    fn test_resolve_all_ok() {
        let cmd = command(&["transfers", "./ux", "/common/utils", "../default/view.html"]);
        assert!(cmd.run(&Config::default()).is_ok());
    }

    #[test]
    fn test_any_failure_is_error() {
        let cmd = command(&["transfers", "  ", "./lib/"]);
        let err = cmd.run(&Config::default()).unwrap_err();
        assert_eq!(err.to_string(), "2 of 3 specifiers failed to resolve");
    }
}
