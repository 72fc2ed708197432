//! Module registry with cycle detection
//!
//! Maps canonical URLs to module records. A record is created on first
//! reference and kept for the loader's lifetime, so every URL is fetched
//! at most once.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::LoadError;
use crate::request::{RequestId, Requests};
use crate::resource::ResourceTarget;
use crate::value::ModuleValue;

/// Observable state of a module record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Known but not requested from the resource loader yet
    None,
    /// Fetch or definition in progress
    Loading,
    /// Value available
    Ready,
    /// Load, execution, or definition failed
    Failed,
}

#[derive(Debug)]
pub(crate) enum ModuleState {
    None,
    Loading,
    Ready(ModuleValue),
    Failed(LoadError),
}

/// A (request, slot) pair waiting on a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Waiter {
    pub request: RequestId,
    pub slot: usize,
}

#[derive(Debug)]
pub(crate) struct ModuleRecord {
    pub target: ResourceTarget,
    pub state: ModuleState,
    pub waiters: Vec<Waiter>,
    /// Definition request that will produce this module's value
    pub definition: Option<RequestId>,
}

impl ModuleRecord {
    fn new(target: ResourceTarget) -> Self {
        Self {
            target,
            state: ModuleState::None,
            waiters: Vec::new(),
            definition: None,
        }
    }

    pub fn status(&self) -> ModuleStatus {
        match self.state {
            ModuleState::None => ModuleStatus::None,
            ModuleState::Loading => ModuleStatus::Loading,
            ModuleState::Ready(_) => ModuleStatus::Ready,
            ModuleState::Failed(_) => ModuleStatus::Failed,
        }
    }

    pub fn value(&self) -> Option<&ModuleValue> {
        match &self.state {
            ModuleState::Ready(value) => Some(value),
            _ => None,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self.state, ModuleState::Ready(_) | ModuleState::Failed(_))
    }
}

/// Canonical URL -> module record
#[derive(Debug, Default)]
pub(crate) struct Registry {
    records: HashMap<String, ModuleRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `target`, creating it on first reference
    pub fn get_or_create(&mut self, target: &ResourceTarget) -> &mut ModuleRecord {
        self.records
            .entry(target.key().to_string())
            .or_insert_with(|| {
                debug!(url = %target.url, kind = %target.kind, "module record created");
                ModuleRecord::new(target.clone())
            })
    }

    pub fn get(&self, url: &str) -> Option<&ModuleRecord> {
        self.records.get(url)
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut ModuleRecord> {
        self.records.get_mut(url)
    }

    /// Transition to READY, handing back the waiters to notify.
    ///
    /// Settled records never change again; a late value is dropped.
    pub fn mark_ready(&mut self, url: &str, value: ModuleValue) -> Vec<Waiter> {
        let Some(record) = self.records.get_mut(url) else {
            return Vec::new();
        };
        if record.is_settled() {
            debug!(url, "ignoring value for settled module");
            return Vec::new();
        }
        debug!(url, kind = %record.target.kind, waiters = record.waiters.len(), "module ready");
        record.state = ModuleState::Ready(value);
        record.definition = None;
        std::mem::take(&mut record.waiters)
    }

    /// Transition to FAILED, handing back the waiters to notify
    pub fn mark_failed(&mut self, url: &str, error: LoadError) -> Vec<Waiter> {
        let Some(record) = self.records.get_mut(url) else {
            return Vec::new();
        };
        if record.is_settled() {
            return Vec::new();
        }
        debug!(url, error = %error, waiters = record.waiters.len(), "module failed");
        record.state = ModuleState::Failed(error);
        std::mem::take(&mut record.waiters)
    }

    /// Check whether `definer` waiting on `dependency` closes a cycle.
    ///
    /// Follows pending definition requests from `dependency`; returns the
    /// chain `definer -> dependency -> ... -> definer` if one exists.
    pub fn find_cycle(
        &self,
        requests: &Requests,
        definer: &str,
        dependency: &str,
    ) -> Option<Vec<String>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![dependency];
        seen.insert(dependency);

        while let Some(current) = stack.pop() {
            if current == definer {
                let mut chain = vec![current.to_string()];
                let mut node = current;
                while let Some(&parent) = parents.get(node) {
                    chain.push(parent.to_string());
                    node = parent;
                }
                chain.push(definer.to_string());
                chain.reverse();
                return Some(chain);
            }

            let Some(request) = self
                .records
                .get(current)
                .and_then(|record| record.definition)
                .and_then(|id| requests.get(id))
            else {
                continue;
            };

            for next in request.pending_modules() {
                if seen.insert(next) {
                    parents.insert(next, current);
                    stack.push(next);
                }
            }
        }

        None
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
