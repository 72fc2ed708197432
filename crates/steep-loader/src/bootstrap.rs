//! Root context bootstrap and the deferred request queue.
//!
//! Relative resolution needs a base location. Until the root context is
//! established, and while a context-establishing load (the main resource)
//! is in flight, top-level requests are queued. They are linked in
//! submission order once the context becomes available.

use std::collections::VecDeque;

use tracing::debug;

use crate::context::Context;
use crate::request::RequestId;

/// Bootstrap state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// No context exists yet
    Uninitialized,
    /// A context-establishing load is in flight
    Resolving,
    /// Ambient context available; top-level requests resolve eagerly
    Established,
}

#[derive(Debug)]
pub(crate) struct ContextManager {
    state: BootstrapState,
    in_flight: usize,
    root: Option<Context>,
    ambient: Option<Context>,
    deferred: VecDeque<RequestId>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Uninitialized,
            in_flight: 0,
            root: None,
            ambient: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub fn root(&self) -> Option<&Context> {
        self.root.as_ref()
    }

    /// Context for top-level requests, only once established
    pub fn ambient(&self) -> Option<&Context> {
        match self.state {
            BootstrapState::Established => self.ambient.as_ref(),
            _ => None,
        }
    }

    /// Install the root context. Returns true if the deferred queue should drain now.
    pub fn establish(&mut self, ctx: Context) -> bool {
        debug!(base = %ctx.base_url(), root = %ctx.root_url(), "root context set");
        self.root = Some(ctx.clone());
        self.ambient = Some(ctx);
        if self.in_flight == 0 {
            self.state = BootstrapState::Established;
            true
        } else {
            false
        }
    }

    /// A context-establishing load started
    pub fn begin_establishing(&mut self, root: Context) {
        self.in_flight += 1;
        self.root = Some(root);
        self.state = BootstrapState::Resolving;
    }

    /// A context-establishing load finished; `ctx` is the context it resolved in.
    ///
    /// Returns true when the counter reached zero and the queue should drain.
    pub fn finish_establishing(&mut self, ctx: Context) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.ambient = Some(ctx);
        if self.in_flight == 0 {
            self.state = BootstrapState::Established;
            true
        } else {
            false
        }
    }

    pub fn defer(&mut self, id: RequestId) {
        debug!(queued = self.deferred.len() + 1, state = ?self.state, "request deferred");
        self.deferred.push_back(id);
    }

    pub fn take_deferred(&mut self) -> VecDeque<RequestId> {
        std::mem::take(&mut self.deferred)
    }

    pub fn forget(&mut self, id: RequestId) {
        self.deferred.retain(|queued| *queued != id);
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}
