//! Requests: one `require`/`define` call tracked until its dependencies resolve.

use slab::Slab;

use crate::context::Context;
use crate::error::LoadError;
use crate::runtime::Loader;
use crate::value::ModuleValue;

/// Handle to a live request.
///
/// Slab keys are reused once a request finishes, so the serial keeps a stale
/// handle from reaching a newer request stored under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    key: usize,
    serial: u64,
}

pub(crate) type Callback =
    Box<dyn FnOnce(&mut Loader, Vec<ModuleValue>) -> anyhow::Result<Option<ModuleValue>>>;

pub(crate) type Errback = Box<dyn FnOnce(&mut Loader, LoadError)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Require,
    Define,
}

pub(crate) struct Request {
    serial: u64,
    pub kind: RequestKind,
    pub dependencies: Vec<String>,
    /// Canonical URL per dependency, filled while linking
    pub modules: Vec<Option<String>>,
    pub slots: Vec<Option<ModuleValue>>,
    pub resolved: usize,
    pub callback: Option<Callback>,
    pub errback: Option<Errback>,
    pub ctx: Option<Context>,
    /// Module whose value this request's factory produces
    pub definition_url: Option<String>,
}

impl Request {
    pub fn new(
        kind: RequestKind,
        dependencies: Vec<String>,
        callback: Callback,
        errback: Option<Errback>,
    ) -> Self {
        let len = dependencies.len();
        Self {
            serial: 0,
            kind,
            dependencies,
            modules: vec![None; len],
            slots: vec![None; len],
            resolved: 0,
            callback: Some(callback),
            errback,
            ctx: None,
            definition_url: None,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.resolved == self.dependencies.len()
    }

    /// Store a module value in its slot. Returns true once every slot is filled.
    pub fn fill(&mut self, slot: usize, value: ModuleValue) -> bool {
        if let Some(entry) = self.slots.get_mut(slot)
            && entry.is_none()
        {
            *entry = Some(value);
            self.resolved += 1;
        }
        self.is_satisfied()
    }

    /// Slot values in declaration order
    pub fn take_values(&mut self) -> Vec<ModuleValue> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    /// Modules this request is still waiting on
    pub fn pending_modules(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_none())
            .filter_map(|(module, _)| module.as_deref())
    }
}

/// Storage for live requests
#[derive(Default)]
pub(crate) struct Requests {
    slab: Slab<Request>,
    next_serial: u64,
}

impl Requests {
    pub fn insert(&mut self, mut request: Request) -> RequestId {
        self.next_serial += 1;
        request.serial = self.next_serial;
        let key = self.slab.insert(request);
        RequestId {
            key,
            serial: self.next_serial,
        }
    }

    pub fn get(&self, id: RequestId) -> Option<&Request> {
        self.slab.get(id.key).filter(|r| r.serial == id.serial)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut Request> {
        self.slab.get_mut(id.key).filter(|r| r.serial == id.serial)
    }

    pub fn remove(&mut self, id: RequestId) -> Option<Request> {
        self.get(id)?;
        Some(self.slab.remove(id.key))
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(deps: &[&str]) -> Request {
        Request::new(
            RequestKind::Require,
            deps.iter().map(|d| d.to_string()).collect(),
            Box::new(|_, _| Ok(None)),
            None,
        )
    }

    #[test]
    fn test_fill_out_of_order_keeps_declaration_order() {
        let mut req = request(&["a", "b", "c"]);
        assert!(!req.fill(2, ModuleValue::new(3)));
        assert!(!req.fill(0, ModuleValue::new(1)));
        assert!(req.fill(1, ModuleValue::new(2)));

        let values: Vec<i32> = req
            .take_values()
            .iter()
            .map(|v| *v.downcast_ref::<i32>().unwrap())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_fill_same_slot_twice_counts_once() {
        let mut req = request(&["a", "b"]);
        req.fill(0, ModuleValue::new(1));
        assert!(!req.fill(0, ModuleValue::new(1)));
        assert_eq!(req.resolved, 1);
    }

    #[test]
    fn test_empty_request_is_satisfied() {
        assert!(request(&[]).is_satisfied());
    }

    #[test]
    fn test_pending_modules() {
        let mut req = request(&["a", "b"]);
        req.modules = vec![Some("http://x/a.js".into()), Some("http://x/b.js".into())];
        req.fill(0, ModuleValue::new(()));
        assert_eq!(req.pending_modules().collect::<Vec<_>>(), vec!["http://x/b.js"]);
    }

    #[test]
    fn test_stale_id_does_not_reach_reused_key() {
        let mut requests = Requests::default();
        let first = requests.insert(request(&["a"]));
        assert!(requests.remove(first).is_some());

        let second = requests.insert(request(&["b"]));
        assert!(requests.get(first).is_none());
        assert!(requests.remove(first).is_none());
        assert_eq!(requests.get(second).unwrap().dependencies, vec!["b"]);
        assert_eq!(requests.len(), 1);
    }
}
