//! Fetch command - load specifiers through the host loader and report results.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use clap::Args;
use steep_loader::{Fragment, HostLoader, LoadError, Loader, ModuleValue};

use super::current_dir_url;
use crate::config::Config;

#[derive(Args)]
pub struct FetchCommand {
    /// Specifiers to load
    #[arg(required = true)]
    pub specifiers: Vec<String>,

    /// Default base URL for bare specifiers (defaults to the current directory)
    #[arg(long)]
    pub base: Option<String>,
}

type Outcomes = Rc<RefCell<Vec<Option<Result<String, LoadError>>>>>;

impl FetchCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let mut loader_config = config.loader_with_base(self.base.as_deref());
        if loader_config.base_url.is_none() {
            loader_config.base_url = Some(current_dir_url()?.to_string());
        }
        let mut loader = Loader::with_config(loader_config, HostLoader::new())?;

        let outcomes: Outcomes = Rc::new(RefCell::new(vec![None; self.specifiers.len()]));
        for (index, specifier) in self.specifiers.iter().enumerate() {
            let ready = outcomes.clone();
            let failed = outcomes.clone();
            loader.require_with_errback(
                [specifier.as_str()],
                move |_, values| {
                    ready.borrow_mut()[index] = Some(Ok(describe(&values[0])));
                    Ok(())
                },
                move |_, err| failed.borrow_mut()[index] = Some(Err(err)),
            );
        }

        loader.run_until_idle().await;
        tracing::debug!(modules = loader.module_count(), "fetch finished");

        let mut failures = 0;
        for (specifier, outcome) in self.specifiers.iter().zip(outcomes.borrow().iter()) {
            match outcome {
                Some(Ok(line)) => println!("{line}"),
                Some(Err(err)) => {
                    eprintln!("error: {specifier}: {err}");
                    failures += 1;
                }
                None => {
                    eprintln!("error: {specifier}: request never completed");
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            anyhow::bail!(
                "{} of {} requests failed",
                failures,
                self.specifiers.len()
            );
        }
        Ok(())
    }
}

fn describe(value: &ModuleValue) -> String {
    match value.downcast_ref::<Fragment>() {
        Some(fragment) => format!(
            "{}\t{}\t{} bytes",
            fragment.name,
            fragment.url,
            fragment.content.len()
        ),
        None => "module".to_string(),
    }
}
