//! State shared by sample and queue ports: storage, listeners, filters.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::journal::LogLevel;
use crate::sim::ids::{RunnerId, SourceId};
use crate::sim::kernel::WeakKernel;

type Listener<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;
type Filter<T> = Rc<dyn Fn(&T) -> bool>;
type Printer<T> = Rc<dyn Fn(&T) -> String>;

pub(crate) enum Storage<T> {
    Sample(Option<T>),
    Queue(VecDeque<T>),
}

pub(crate) struct PortCore<T> {
    pub(crate) id: SourceId,
    pub(crate) owner: Option<RunnerId>,
    pub(crate) signal: String,
    pub(crate) storage: RefCell<Storage<T>>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
    filters: RefCell<Vec<(u64, Filter<T>)>>,
    printer: RefCell<Option<Printer<T>>>,
    pending: RefCell<VecDeque<T>>,
    notifying: Cell<bool>,
    next_registration: Cell<u64>,
    pub(crate) kernel: WeakKernel,
}

impl<T: Clone + fmt::Debug + 'static> PortCore<T> {
    pub(crate) fn new(
        id: SourceId,
        owner: Option<RunnerId>,
        signal: &str,
        storage: Storage<T>,
        kernel: WeakKernel,
    ) -> Self {
        Self {
            id,
            owner,
            signal: signal.to_string(),
            storage: RefCell::new(storage),
            listeners: RefCell::new(Vec::new()),
            filters: RefCell::new(Vec::new()),
            printer: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            notifying: Cell::new(false),
            next_registration: Cell::new(0),
            kernel,
        }
    }

    fn next_registration(&self) -> u64 {
        let id = self.next_registration.get();
        self.next_registration.set(id + 1);
        id
    }

    /// Renders a value for log lines.
    pub(crate) fn render(&self, value: &T) -> String {
        let printer = self.printer.borrow().clone();
        match printer {
            Some(printer) => printer(value),
            None => format!("{value:?}"),
        }
    }

    pub(crate) fn set_printer(&self, printer: impl Fn(&T) -> String + 'static) {
        *self.printer.borrow_mut() = Some(Rc::new(printer));
    }

    /// Propagates a change of the stored contents.
    pub(crate) fn changed(&self) {
        if let Ok(kernel) = self.kernel.upgrade() {
            kernel.notify_changed(self.id);
        }
    }

    /// Filters, stores and announces a pushed value.
    ///
    /// Listeners run after waits and invariants have seen the new contents.
    /// Values pushed from inside a listener reach the listeners after the
    /// current notification finishes, in push order.
    pub(crate) fn deliver(&self, value: &T) {
        let filters: Vec<Filter<T>> = self
            .filters
            .borrow()
            .iter()
            .map(|(_, filter)| filter.clone())
            .collect();
        if !filters.iter().all(|accept| accept(value)) {
            trace!(signal = %self.signal, port = ?self.id, "value rejected by filter");
            return;
        }

        match &mut *self.storage.borrow_mut() {
            Storage::Sample(slot) => *slot = Some(value.clone()),
            Storage::Queue(queue) => queue.push_back(value.clone()),
        }
        self.changed();

        // A listener pushing to its own signal lands here while the outer
        // notification is still running: queue the value and let the
        // outer call hand it to the listeners once the current one returns.
        self.pending.borrow_mut().push_back(value.clone());
        if self.notifying.replace(true) {
            return;
        }
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(value) = next else {
                break;
            };
            self.notify_listeners(&value);
        }
        self.notifying.set(false);
    }

    /// Hands an accepted value to every listener, in registration order, on
    /// behalf of the port's owner.
    fn notify_listeners(&self, value: &T) {
        let listeners: Vec<(u64, Listener<T>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let Ok(kernel) = self.kernel.upgrade() else {
            return;
        };

        if let Some(owner) = self.owner {
            kernel.push_virtual(owner);
        }
        let rendered = self.render(value);
        for (id, listener) in listeners {
            let still_registered = self.listeners.borrow().iter().any(|(other, _)| *other == id);
            if !still_registered {
                continue;
            }
            kernel.log(
                LogLevel::Handle,
                None,
                format!("Handle {} from '{}'", rendered, self.signal),
            );
            let mut callback = listener.borrow_mut();
            callback(value);
        }
        if self.owner.is_some() {
            kernel.pop_virtual();
        }
    }

    pub(crate) fn add_listener(
        self: &Rc<Self>,
        listener: impl FnMut(&T) + 'static,
    ) -> ListenerHandle {
        let id = self.next_registration();
        let boxed: Box<dyn FnMut(&T)> = Box::new(listener);
        self.listeners
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(boxed))));
        ListenerHandle(Registration::new(self, Kind::Listener, id))
    }

    pub(crate) fn add_filter(self: &Rc<Self>, filter: impl Fn(&T) -> bool + 'static) -> FilterHandle {
        let id = self.next_registration();
        self.filters.borrow_mut().push((id, Rc::new(filter)));
        FilterHandle(Registration::new(self, Kind::Filter, id))
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn filter_count(&self) -> usize {
        self.filters.borrow().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Listener,
    Filter,
}

trait Registrations {
    fn revoke(&self, kind: Kind, id: u64);
}

impl<T: 'static> Registrations for PortCore<T> {
    fn revoke(&self, kind: Kind, id: u64) {
        // Removed entries are dropped after the borrow ends: a callback may
        // own other handles of this port.
        match kind {
            Kind::Listener => {
                let removed = {
                    let mut listeners = self.listeners.borrow_mut();
                    listeners
                        .iter()
                        .position(|(other, _)| *other == id)
                        .map(|index| listeners.remove(index))
                };
                drop(removed);
            }
            Kind::Filter => {
                let removed = {
                    let mut filters = self.filters.borrow_mut();
                    filters
                        .iter()
                        .position(|(other, _)| *other == id)
                        .map(|index| filters.remove(index))
                };
                drop(removed);
            }
        }
    }
}

struct Registration {
    port: Option<Weak<dyn Registrations>>,
    kind: Kind,
    id: u64,
}

impl Registration {
    fn new<T: 'static>(port: &Rc<PortCore<T>>, kind: Kind, id: u64) -> Self {
        let weak: Weak<PortCore<T>> = Rc::downgrade(port);
        Self {
            port: Some(weak as Weak<dyn Registrations>),
            kind,
            id,
        }
    }

    fn revoke(&mut self) {
        if let Some(port) = self.port.take().and_then(|weak| weak.upgrade()) {
            port.revoke(self.kind, self.id);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("armed", &self.port.is_some())
            .finish()
    }
}

/// Keeps a port listener registered. Dropping it unregisters the listener.
#[derive(Debug)]
#[must_use = "the listener is removed when the handle is dropped"]
pub struct ListenerHandle(Registration);

impl ListenerHandle {
    /// Unregisters the listener now.
    pub fn remove(mut self) {
        self.0.revoke();
    }

    /// Keeps the listener for as long as the port exists.
    pub fn persist(mut self) {
        self.0.port = None;
    }
}

/// Keeps a port filter registered. Dropping it unregisters the filter.
#[derive(Debug)]
#[must_use = "the filter is removed when the handle is dropped"]
pub struct FilterHandle(Registration);

impl FilterHandle {
    /// Unregisters the filter now.
    pub fn remove(mut self) {
        self.0.revoke();
    }

    /// Keeps the filter for as long as the port exists.
    pub fn persist(mut self) {
        self.0.port = None;
    }
}
