//! Values produced by modules.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Shared handle to the value a module exposes.
///
/// Every requester of a module receives a clone of the same handle, so
/// [`ModuleValue::ptr_eq`] holds across all of them.
#[derive(Clone)]
pub struct ModuleValue(Rc<dyn Any>);

impl ModuleValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrow the value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Get a shared handle to the value as `T`
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.0).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Check whether two handles point at the same value
    pub fn ptr_eq(&self, other: &ModuleValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleValue({:p})", Rc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let value = ModuleValue::new(42_i32);
        assert!(value.is::<i32>());
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        assert!(value.downcast_ref::<String>().is_none());
        assert_eq!(*value.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_clones_share_identity() {
        let value = ModuleValue::new(String::from("shared"));
        let clone = value.clone();
        assert!(value.ptr_eq(&clone));
        assert!(!value.ptr_eq(&ModuleValue::new(String::from("shared"))));
    }
}
