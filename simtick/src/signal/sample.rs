use std::fmt;
use std::rc::Rc;

use super::port::{FilterHandle, ListenerHandle, PortCore, Storage};
use super::channel::Signal;
use crate::error::usage_error;
use crate::reactive::condition::Condition;
use crate::reactive::operand::{Operand, Reactive};
use crate::sim::ids::RunnerId;
use crate::sim::kernel::Kernel;

/// A port that keeps only the latest value pushed into its signal.
///
/// Clones share the same port.
pub struct SamplePort<T> {
    core: Rc<PortCore<T>>,
}

impl<T> Clone for SamplePort<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> SamplePort<T> {
    pub(crate) fn attach(kernel: &Kernel, owner: Option<RunnerId>, signal: &Signal<T>) -> Self {
        let core = Rc::new(PortCore::new(
            kernel.next_source_id(),
            owner,
            signal.name(),
            Storage::Sample(None),
            kernel.downgrade(),
        ));
        signal.attach(&core);
        Self { core }
    }

    fn current(&self) -> Option<T> {
        match &*self.core.storage.borrow() {
            Storage::Sample(slot) => slot.clone(),
            Storage::Queue(_) => unreachable!("sample port over queue storage"),
        }
    }

    /// Returns the latest value.
    ///
    /// # Panics
    ///
    /// Panics if nothing has been received yet.
    #[track_caller]
    pub fn get(&self) -> T {
        match self.current() {
            Some(value) => value,
            None => usage_error(&format!(
                "sample port of '{}' read before any value arrived",
                self.core.signal
            )),
        }
    }

    /// Returns the latest value, if any.
    pub fn value(&self) -> Option<T> {
        self.current()
    }

    /// Returns `true` once a value has been received.
    pub fn has_value(&self) -> bool {
        self.current().is_some()
    }

    /// Condition that holds once a value has been received.
    pub fn available(&self) -> Condition {
        let core = self.core.clone();
        Condition::leaf(
            format!("{} available", self.core.signal),
            vec![self.core.id],
            move || matches!(&*core.storage.borrow(), Storage::Sample(Some(_))),
        )
    }

    /// Name of the signal this port is attached to.
    pub fn signal_name(&self) -> &str {
        &self.core.signal
    }

    /// Registers a callback invoked with every accepted value.
    pub fn add_listener(&self, listener: impl FnMut(&T) + 'static) -> ListenerHandle {
        self.core.add_listener(listener)
    }

    /// Registers a callback invoked on every accepted value, without it.
    pub fn add_notifier(&self, mut notifier: impl FnMut() + 'static) -> ListenerHandle {
        self.core.add_listener(move |_: &T| notifier())
    }

    /// Registers a predicate every pushed value must satisfy to be stored.
    pub fn add_filter(&self, filter: impl Fn(&T) -> bool + 'static) -> FilterHandle {
        self.core.add_filter(filter)
    }

    /// Unregisters a listener.
    pub fn remove_listener(&self, handle: ListenerHandle) {
        handle.remove();
    }

    /// Unregisters a filter.
    pub fn remove_filter(&self, handle: FilterHandle) {
        handle.remove();
    }

    /// Sets how values of this port are rendered in log lines.
    pub fn set_printer(&self, printer: impl Fn(&T) -> String + 'static) {
        self.core.set_printer(printer);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.core.listener_count()
    }

    /// Number of registered filters.
    pub fn filter_count(&self) -> usize {
        self.core.filter_count()
    }
}

impl<T: PartialOrd + Clone + fmt::Debug + 'static> Reactive<T> for SamplePort<T> {
    fn operand(&self) -> Operand<T> {
        let port = self.clone();
        Operand::new(self.core.signal.clone(), vec![self.core.id], move || {
            port.current()
        })
    }
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for SamplePort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePort")
            .field("signal", &self.core.signal)
            .field("value", &self.current())
            .finish()
    }
}
