//! Observable variables.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::operand::{Operand, Reactive};
use crate::sim::ids::SourceId;
use crate::sim::kernel::{Kernel, WeakKernel};

struct ValueCore<T> {
    id: SourceId,
    name: String,
    current: RefCell<T>,
    kernel: WeakKernel,
}

/// A variable whose writes wake waits and re-check invariants that read it.
///
/// Clones share the same storage.
pub struct Value<T> {
    core: Rc<ValueCore<T>>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> Value<T> {
    pub(crate) fn new(kernel: &Kernel, name: &str, initial: T) -> Self {
        Self {
            core: Rc::new(ValueCore {
                id: kernel.next_source_id(),
                name: name.to_string(),
                current: RefCell::new(initial),
                kernel: kernel.downgrade(),
            }),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.core.current.borrow().clone()
    }

    /// Stores `value` and propagates the change.
    pub fn set(&self, value: T) {
        *self.core.current.borrow_mut() = value;
        self.changed();
    }

    /// Modifies the value in place and propagates the change.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.core.current.borrow_mut());
        self.changed();
    }

    /// Name given at creation, used when rendering conditions.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    fn changed(&self) {
        if let Ok(kernel) = self.core.kernel.upgrade() {
            kernel.notify_changed(self.core.id);
        }
    }
}

impl<T: PartialOrd + Clone + fmt::Debug + 'static> Reactive<T> for Value<T> {
    fn operand(&self) -> Operand<T> {
        let core = self.core.clone();
        Operand::new(self.core.name.clone(), vec![self.core.id], move || {
            Some(core.current.borrow().clone())
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("name", &self.core.name)
            .field("current", &*self.core.current.borrow())
            .finish()
    }
}
