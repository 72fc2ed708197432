//! The loader: `require`/`define`, dependency linking, and completion dispatch.
//!
//! Everything runs on one thread. Fetches are futures held by the loader;
//! [`Loader::turn`] waits for the next one to finish and dispatches its
//! effects. Dispatch goes through a FIFO worklist rather than recursion, so a
//! long dependency chain settles without growing the stack, and callbacks may
//! issue new requests while dispatch is running.

use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::future::LocalBoxFuture;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::bootstrap::{BootstrapState, ContextManager};
use crate::config::LoaderConfig;
use crate::context::{Context, Resolver, as_directory, directory_of};
use crate::error::{LoadError, LoaderResult};
use crate::graph::{ModuleState, ModuleStatus, Registry, Waiter};
use crate::request::{Callback, Errback, Request, RequestId, RequestKind, Requests};
use crate::resource::{CodeUnit, LoadedResource, ResourceLoader, ResourceTarget};
use crate::value::ModuleValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadRole {
    /// Dependency of some request; its value goes into the registry
    Module,
    /// Main resource executed as a plain script during bootstrap
    Main,
}

struct Completion {
    target: ResourceTarget,
    role: LoadRole,
    result: LoaderResult<LoadedResource>,
}

/// What is executing right now
#[derive(Debug)]
enum Frame {
    Unit {
        url: String,
        ctx: Context,
        /// Whether a `define` here supplies the unit's module value
        binds: bool,
        defined: bool,
    },
    Factory {
        ctx: Option<Context>,
    },
}

#[derive(Debug)]
enum Step {
    Fill {
        request: RequestId,
        slot: usize,
        value: ModuleValue,
    },
    Fire(RequestId),
    Fail {
        request: RequestId,
        error: LoadError,
    },
}

/// Asynchronous module-dependency loader
pub struct Loader {
    resolver: Resolver,
    registry: Registry,
    requests: Requests,
    contexts: ContextManager,
    resources: Box<dyn ResourceLoader>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    worklist: VecDeque<Step>,
    dispatching: bool,
    frames: Vec<Frame>,
}

impl Loader {
    /// Create an uninitialized loader with the default configuration.
    ///
    /// Top-level requests are deferred until [`Loader::bootstrap`] or
    /// [`Loader::configure`] establishes a context.
    pub fn new(resources: impl ResourceLoader + 'static) -> Self {
        Self::build(LoaderConfig::default(), resources)
    }

    /// Create a loader, applying `base_url` and `main` from the config
    pub fn with_config(
        config: LoaderConfig,
        resources: impl ResourceLoader + 'static,
    ) -> LoaderResult<Self> {
        let base = config.base_url.clone();
        let main = config.main.clone();
        let mut loader = Self::build(config, resources);

        match (base, main) {
            (Some(base), Some(main)) => {
                let entry = as_directory(&base)?;
                loader.bootstrap(entry.as_str(), Some(main.as_str()))?;
            }
            (Some(base), None) => loader.configure(&base)?,
            (None, Some(main)) => {
                return Err(LoadError::unresolved(
                    main,
                    "a main resource needs a base URL",
                ));
            }
            (None, None) => {}
        }

        Ok(loader)
    }

    fn build(config: LoaderConfig, resources: impl ResourceLoader + 'static) -> Self {
        Self {
            resolver: Resolver::new(config),
            registry: Registry::new(),
            requests: Requests::default(),
            contexts: ContextManager::new(),
            resources: Box::new(resources),
            in_flight: FuturesUnordered::new(),
            worklist: VecDeque::new(),
            dispatching: false,
            frames: Vec::new(),
        }
    }

    /// Establish the root context from the hosting entry point.
    ///
    /// Without `main`, the entry's directory becomes the default base and the
    /// context is established at once. With `main`, the main resource's
    /// directory becomes the default base and the main code unit is loaded;
    /// top-level requests stay queued until it has executed.
    pub fn bootstrap(&mut self, entry: &str, main: Option<&str>) -> LoaderResult<()> {
        let entry_ctx = Context::parse(entry)?;
        self.resolver.set_default_base(entry_ctx.base_url().clone());

        let Some(main) = main else {
            if self.contexts.establish(entry_ctx) {
                self.drain_deferred();
            }
            return Ok(());
        };

        let target = self.resolver.resolve(main, &entry_ctx)?;
        let main_dir = directory_of(&target.url)?;
        self.resolver.set_default_base(main_dir.clone());
        self.contexts.begin_establishing(Context::for_url(&main_dir)?);

        debug!(main = %target.url, "loading main resource");
        self.start_load(target, LoadRole::Main);
        Ok(())
    }

    /// Set the default base URL (the config-object form of `require`).
    ///
    /// `base_url` is treated as a directory.
    pub fn configure(&mut self, base_url: &str) -> LoaderResult<()> {
        let base = as_directory(base_url)?;
        let ctx = Context::for_url(&base)?;
        self.resolver.set_default_base(base);
        if self.contexts.establish(ctx) {
            self.drain_deferred();
        }
        Ok(())
    }

    /// Request dependencies; `callback` runs once all of them are ready.
    ///
    /// Values arrive in declaration order. Failures are logged.
    pub fn require<I, S, F>(&mut self, dependencies: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<()> + 'static,
    {
        self.submit(
            RequestKind::Require,
            collect(dependencies),
            Box::new(move |loader, values| callback(loader, values).map(|()| None)),
            None,
        );
    }

    /// Like [`Loader::require`], with `errback` invoked instead of the
    /// callback if any dependency fails.
    pub fn require_with_errback<I, S, F, E>(&mut self, dependencies: I, callback: F, errback: E)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<()> + 'static,
        E: FnOnce(&mut Loader, LoadError) + 'static,
    {
        self.submit(
            RequestKind::Require,
            collect(dependencies),
            Box::new(move |loader, values| callback(loader, values).map(|()| None)),
            Some(Box::new(errback)),
        );
    }

    /// Configure the default base URL, then require.
    pub fn require_with_config<I, S, F>(
        &mut self,
        base_url: &str,
        dependencies: I,
        callback: F,
    ) -> LoaderResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<()> + 'static,
    {
        self.configure(base_url)?;
        self.require(dependencies, callback);
        Ok(())
    }

    /// Define a module.
    ///
    /// Called while a code unit executes, the factory's value becomes that
    /// unit's module value. `Ok(None)` marks the module as non-conforming.
    pub fn define<I, S, F>(&mut self, dependencies: I, factory: F)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<Option<ModuleValue>> + 'static,
    {
        self.submit(
            RequestKind::Define,
            collect(dependencies),
            Box::new(factory),
            None,
        );
    }

    /// Like [`Loader::define`], with `errback` invoked instead of the
    /// factory when the definition cannot complete.
    ///
    /// That covers a failed dependency, a failing factory and a defining
    /// unit that fails after calling this.
    pub fn define_with_errback<I, S, F, E>(&mut self, dependencies: I, factory: F, errback: E)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<Option<ModuleValue>> + 'static,
        E: FnOnce(&mut Loader, LoadError) + 'static,
    {
        self.submit(
            RequestKind::Define,
            collect(dependencies),
            Box::new(factory),
            Some(Box::new(errback)),
        );
    }

    /// Wait for the next fetch to finish and dispatch its effects.
    ///
    /// Returns false if nothing is in flight.
    pub async fn turn(&mut self) -> bool {
        match self.in_flight.next().await {
            Some(completion) => {
                self.complete(completion);
                true
            }
            None => false,
        }
    }

    /// Process completions until no fetch is in flight
    pub async fn run_until_idle(&mut self) {
        while self.turn().await {}
    }

    /// Resolve a specifier against the current context
    pub fn resolve(&self, specifier: &str) -> LoaderResult<ResourceTarget> {
        let ctx = self
            .current_context()
            .or_else(|| self.contexts.root().cloned())
            .ok_or_else(|| {
                LoadError::unresolved(specifier, "no resolution context established")
            })?;
        self.resolver.resolve(specifier, &ctx)
    }

    /// Default base URL for bare specifiers
    pub fn base_url(&self) -> Option<&Url> {
        self.resolver.default_base()
    }

    /// Base URL of the code unit or factory currently executing
    pub fn local_url(&self) -> Option<&Url> {
        match self.frames.last() {
            Some(Frame::Unit { ctx, .. }) | Some(Frame::Factory { ctx: Some(ctx) }) => {
                Some(ctx.base_url())
            }
            _ => None,
        }
    }

    /// True while a code unit that some request is waiting on executes
    pub fn is_defining(&self) -> bool {
        match self.frames.last() {
            Some(Frame::Unit {
                url, binds: true, ..
            }) => self
                .registry
                .get(url)
                .is_some_and(|record| record.status() == ModuleStatus::Loading),
            _ => false,
        }
    }

    /// Status of the module at a canonical URL
    pub fn status(&self, url: &str) -> Option<ModuleStatus> {
        self.registry.get(url).map(|record| record.status())
    }

    /// Value of a ready module at a canonical URL
    pub fn value(&self, url: &str) -> Option<ModuleValue> {
        self.registry
            .get(url)
            .and_then(|record| record.value().cloned())
    }

    pub fn state(&self) -> BootstrapState {
        self.contexts.state()
    }

    pub fn config(&self) -> &LoaderConfig {
        self.resolver.config()
    }

    /// Requests not yet completed or failed
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn deferred_requests(&self) -> usize {
        self.contexts.deferred_len()
    }

    /// Fetches not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn module_count(&self) -> usize {
        self.registry.len()
    }

    fn submit(
        &mut self,
        kind: RequestKind,
        dependencies: Vec<String>,
        callback: Callback,
        errback: Option<Errback>,
    ) {
        let ctx = self.current_context();
        let mut request = Request::new(kind, dependencies, callback, errback);
        request.ctx = ctx.clone();
        if kind == RequestKind::Define {
            request.definition_url = self.bind_definition();
        }

        let empty = request.dependencies.is_empty();
        let definition_url = request.definition_url.clone();
        let id = self.requests.insert(request);

        if let Some(url) = &definition_url
            && let Some(record) = self.registry.get_mut(url)
        {
            record.definition = Some(id);
        }

        if empty {
            self.worklist.push_back(Step::Fire(id));
        } else if let Some(ctx) = ctx {
            self.link(id, ctx);
        } else {
            self.contexts.defer(id);
        }

        self.dispatch();
    }

    fn bind_definition(&mut self) -> Option<String> {
        match self.frames.last_mut() {
            Some(Frame::Unit {
                url,
                binds: true,
                defined,
                ..
            }) => {
                if *defined {
                    warn!(url = %url, "code unit defined more than once; extra definition is anonymous");
                    None
                } else {
                    *defined = true;
                    Some(url.clone())
                }
            }
            _ => None,
        }
    }

    fn current_context(&self) -> Option<Context> {
        match self.frames.last() {
            Some(Frame::Unit { ctx, .. }) | Some(Frame::Factory { ctx: Some(ctx) }) => {
                Some(ctx.clone())
            }
            _ => self.contexts.ambient().cloned(),
        }
    }

    /// Resolve every dependency of a request and register it as a waiter
    fn link(&mut self, id: RequestId, ctx: Context) {
        let Some(request) = self.requests.get_mut(id) else {
            return;
        };
        request.ctx = Some(ctx.clone());
        let dependencies = request.dependencies.clone();
        let definer = request.definition_url.clone();

        for (slot, specifier) in dependencies.iter().enumerate() {
            let target = match self.resolver.resolve(specifier, &ctx) {
                Ok(target) => target,
                Err(error) => {
                    self.worklist.push_back(Step::Fail { request: id, error });
                    return;
                }
            };
            let key = target.key().to_string();
            trace!(specifier = %specifier, url = %key, slot, "dependency resolved");

            if let Some(definer) = &definer
                && let Some(chain) = self.registry.find_cycle(&self.requests, definer, &key)
            {
                self.worklist.push_back(Step::Fail {
                    request: id,
                    error: LoadError::Cycle { chain },
                });
                return;
            }

            if let Some(request) = self.requests.get_mut(id) {
                request.modules[slot] = Some(key.clone());
            }

            let waiter = Waiter { request: id, slot };
            let record = self.registry.get_or_create(&target);
            if matches!(record.state, ModuleState::None) {
                record.state = ModuleState::Loading;
                record.waiters.push(waiter);
                self.start_load(target, LoadRole::Module);
                continue;
            }

            match &record.state {
                ModuleState::Ready(value) => self.worklist.push_back(Step::Fill {
                    request: id,
                    slot,
                    value: value.clone(),
                }),
                ModuleState::Failed(error) => self.worklist.push_back(Step::Fail {
                    request: id,
                    error: LoadError::dependency(&key, error.clone()),
                }),
                _ => record.waiters.push(waiter),
            }
        }
    }

    fn start_load(&mut self, target: ResourceTarget, role: LoadRole) {
        debug!(url = %target.url, kind = %target.kind, ?role, "loading resource");
        let load = self.resources.load(&target);
        self.in_flight.push(Box::pin(async move {
            let result = load.await;
            Completion {
                target,
                role,
                result,
            }
        }));
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            target,
            role,
            result,
        } = completion;
        debug!(url = %target.url, ok = result.is_ok(), "resource load finished");

        match role {
            LoadRole::Module => self.complete_module(&target, result),
            LoadRole::Main => self.complete_main(&target, result),
        }
        self.dispatch();
    }

    fn complete_module(&mut self, target: &ResourceTarget, result: LoaderResult<LoadedResource>) {
        let url = target.key();
        match result {
            Ok(LoadedResource::Code(unit)) => match self.execute(target, unit, true) {
                Ok(true) => {}
                Ok(false) => self.fail_module(
                    url,
                    LoadError::NonConforming {
                        url: url.to_string(),
                    },
                ),
                Err(error) => self.fail_module(url, error),
            },
            Ok(LoadedResource::Markup { fragment, script }) => {
                if let Some(script) = script
                    && let Err(error) = self.execute(target, script, false)
                {
                    self.fail_module(url, error);
                    return;
                }
                self.ready_module(url, ModuleValue::new(fragment));
            }
            Err(error) => self.fail_module(url, error),
        }
    }

    fn complete_main(&mut self, target: &ResourceTarget, result: LoaderResult<LoadedResource>) {
        match result {
            Ok(LoadedResource::Code(unit)) => {
                if let Err(error) = self.execute(target, unit, false) {
                    error!(error = %error, "main resource failed");
                }
            }
            Ok(LoadedResource::Markup { .. }) => {
                warn!(url = %target.url, "main resource is a markup fragment; nothing to execute");
            }
            Err(error) => error!(error = %error, "main resource failed to load"),
        }

        let ctx = match Context::for_url(&target.url) {
            Ok(ctx) => Some(ctx),
            Err(_) => self.contexts.root().cloned(),
        };
        if let Some(ctx) = ctx
            && self.contexts.finish_establishing(ctx)
        {
            self.drain_deferred();
        }
    }

    /// Run a code unit in its own context. Returns whether it defined a module.
    fn execute(
        &mut self,
        target: &ResourceTarget,
        unit: CodeUnit,
        binds: bool,
    ) -> LoaderResult<bool> {
        let ctx = Context::for_url(&target.url)?;
        self.frames.push(Frame::Unit {
            url: target.key().to_string(),
            ctx,
            binds,
            defined: false,
        });
        let result = unit.execute(self);
        let defined = matches!(self.frames.pop(), Some(Frame::Unit { defined: true, .. }));

        result.map_err(|e| LoadError::execution(target.key(), format!("{e:#}")))?;
        Ok(defined)
    }

    fn ready_module(&mut self, url: &str, value: ModuleValue) {
        for waiter in self.registry.mark_ready(url, value.clone()) {
            self.worklist.push_back(Step::Fill {
                request: waiter.request,
                slot: waiter.slot,
                value: value.clone(),
            });
        }
    }

    fn fail_module(&mut self, url: &str, error: LoadError) {
        let definition = self
            .registry
            .get_mut(url)
            .and_then(|record| record.definition.take());

        for waiter in self.registry.mark_failed(url, error.clone()) {
            self.worklist.push_back(Step::Fail {
                request: waiter.request,
                error: LoadError::dependency(url, error.clone()),
            });
        }

        // A definition still waiting on its own dependencies is moot now
        if let Some(id) = definition
            && let Some(mut request) = self.requests.remove(id)
        {
            debug!(url, "dropping definition of failed module");
            self.detach(id, &request);
            self.report(&mut request, error);
        }
    }

    /// Remove a request's waiter entries and queue position
    fn detach(&mut self, id: RequestId, request: &Request) {
        for url in request.modules.iter().flatten() {
            if let Some(record) = self.registry.get_mut(url) {
                record.waiters.retain(|waiter| waiter.request != id);
            }
        }
        self.contexts.forget(id);
    }

    fn dispatch(&mut self) {
        if self.dispatching {
            return;
        }
        self.dispatching = true;

        while let Some(step) = self.worklist.pop_front() {
            trace!(?step, "dispatch");
            match step {
                Step::Fill {
                    request,
                    slot,
                    value,
                } => {
                    let satisfied = self
                        .requests
                        .get_mut(request)
                        .is_some_and(|r| r.fill(slot, value));
                    if satisfied {
                        self.fire(request);
                    }
                }
                Step::Fire(request) => self.fire(request),
                Step::Fail { request, error } => self.fail_request(request, error),
            }
        }

        self.dispatching = false;
    }

    fn fire(&mut self, id: RequestId) {
        let Some(mut request) = self.requests.remove(id) else {
            return;
        };
        let Some(callback) = request.callback.take() else {
            return;
        };
        let values = request.take_values();
        trace!(kind = ?request.kind, dependencies = values.len(), "request satisfied");

        self.frames.push(Frame::Factory {
            ctx: request.ctx.clone(),
        });
        let outcome = callback(self, values);
        self.frames.pop();

        let error = match outcome {
            Ok(value) => match (request.definition_url.clone(), value) {
                (Some(url), Some(value)) => {
                    self.ready_module(&url, value);
                    return;
                }
                (Some(url), None) => LoadError::NonConforming { url },
                (None, _) => return,
            },
            Err(err) => LoadError::factory(&err),
        };

        self.report(&mut request, error.clone());
        if let Some(url) = request.definition_url.take() {
            self.fail_module(&url, error);
        }
    }

    fn fail_request(&mut self, id: RequestId, error: LoadError) {
        let Some(mut request) = self.requests.remove(id) else {
            return;
        };
        self.detach(id, &request);
        self.report(&mut request, error.clone());
        if let Some(url) = request.definition_url.take() {
            self.fail_module(&url, error);
        }
    }

    /// Hand a failure to the request's errback
    fn report(&mut self, request: &mut Request, error: LoadError) {
        match request.errback.take() {
            Some(errback) => {
                self.frames.push(Frame::Factory {
                    ctx: request.ctx.clone(),
                });
                errback(self, error);
                self.frames.pop();
            }
            // Definition failures reach their module's waiters instead
            None if request.definition_url.is_some() => {
                debug!(error = %error, "definition failed");
            }
            None => {
                warn!(error = %error, dependencies = ?request.dependencies, "request failed with no error handler");
            }
        }
    }

    fn drain_deferred(&mut self) {
        let Some(ctx) = self.contexts.ambient().cloned() else {
            return;
        };
        let queued = self.contexts.take_deferred();
        if !queued.is_empty() {
            debug!(count = queued.len(), base = %ctx.base_url(), "draining deferred requests");
        }
        for id in queued {
            self.link(id, ctx.clone());
        }
        self.dispatch();
    }
}

fn collect<I, S>(dependencies: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dependencies
        .into_iter()
        .map(|d| d.as_ref().to_string())
        .collect()
}
