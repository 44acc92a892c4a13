use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

use super::port::{FilterHandle, ListenerHandle, PortCore, Storage};
use super::channel::Signal;
use crate::error::usage_error;
use crate::journal::LogLevel;
use crate::reactive::condition::Condition;
use crate::reactive::operand::Operand;
use crate::sim::ids::RunnerId;
use crate::sim::kernel::Kernel;

/// A port that keeps every value pushed into its signal, in FIFO order.
///
/// Values are stored as clones, so pushing the same value again is always
/// safe. Popping and clearing are changes too: waits on
/// [`size_operand`](Self::size_operand) or [`available`](Self::available)
/// observe them. Clones share the same port.
pub struct QueuePort<T> {
    core: Rc<PortCore<T>>,
}

impl<T> Clone for QueuePort<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> QueuePort<T> {
    pub(crate) fn attach(kernel: &Kernel, owner: Option<RunnerId>, signal: &Signal<T>) -> Self {
        let core = Rc::new(PortCore::new(
            kernel.next_source_id(),
            owner,
            signal.name(),
            Storage::Queue(VecDeque::new()),
            kernel.downgrade(),
        ));
        signal.attach(&core);
        Self { core }
    }

    fn with_queue<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
        match &mut *self.core.storage.borrow_mut() {
            Storage::Queue(queue) => f(queue),
            Storage::Sample(_) => unreachable!("queue port over sample storage"),
        }
    }

    /// Removes and returns the oldest value.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty.
    #[track_caller]
    pub fn pop(&self) -> T {
        let location = Location::caller();
        match self.take_front(Some(location)) {
            Some(value) => value,
            None => usage_error(&format!("pop on empty queue port of '{}'", self.core.signal)),
        }
    }

    /// Removes and returns the oldest value, if any.
    #[track_caller]
    pub fn try_pop(&self) -> Option<T> {
        self.take_front(Some(Location::caller()))
    }

    fn take_front(&self, location: Option<&'static Location<'static>>) -> Option<T> {
        let value = self.with_queue(VecDeque::pop_front)?;
        if let Ok(kernel) = self.core.kernel.upgrade() {
            kernel.log(
                LogLevel::Pop,
                location.map(Into::into),
                format!("Pop {} from '{}'", self.core.render(&value), self.core.signal),
            );
        }
        self.core.changed();
        Some(value)
    }

    /// Returns a copy of the oldest value without removing it.
    pub fn front(&self) -> Option<T> {
        self.with_queue(|queue| queue.front().cloned())
    }

    /// Number of queued values.
    pub fn size(&self) -> usize {
        self.with_queue(|queue| queue.len())
    }

    /// Returns `true` when at least one value is queued.
    pub fn is_available(&self) -> bool {
        self.size() > 0
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Discards every queued value.
    pub fn clear(&self) {
        let dropped = self.with_queue(std::mem::take);
        if !dropped.is_empty() {
            self.core.changed();
        }
    }

    /// Reactive reading of the queue length.
    pub fn size_operand(&self) -> Operand<usize> {
        let port = self.clone();
        Operand::new(
            format!("size({})", self.core.signal),
            vec![self.core.id],
            move || Some(port.size()),
        )
    }

    /// Condition that holds while at least one value is queued.
    pub fn available(&self) -> Condition {
        let port = self.clone();
        Condition::leaf(
            format!("{} available", self.core.signal),
            vec![self.core.id],
            move || port.is_available(),
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

    /// Registers a predicate every pushed value must satisfy to be queued.
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
}

impl<T: fmt::Debug + Clone + 'static> fmt::Debug for QueuePort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuePort")
            .field("signal", &self.core.signal)
            .field("size", &self.size())
            .finish()
    }
}
