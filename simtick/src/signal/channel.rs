use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::rc::{Rc, Weak};

use crate::journal::LogLevel;
use crate::signal::port::PortCore;
use crate::sim::kernel::{Kernel, WeakKernel};

struct SignalInner<T> {
    name: String,
    ports: RefCell<Vec<Weak<PortCore<T>>>>,
    kernel: WeakKernel,
}

/// A named, typed channel that fans pushed values out to its ports.
///
/// A push reaches every attached port in attachment order. Each port stores
/// the value (subject to its filters), wakes waits and re-checks invariants
/// that read it, then runs its listeners, all before `push` returns.
/// Ports whose handles are all gone are detached.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> Signal<T> {
    pub(crate) fn new(kernel: &Kernel, name: &str) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                name: name.to_string(),
                ports: RefCell::new(Vec::new()),
                kernel: kernel.downgrade(),
            }),
        }
    }

    /// Name given at creation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn attach(&self, port: &Rc<PortCore<T>>) {
        self.inner.ports.borrow_mut().push(Rc::downgrade(port));
    }

    /// Number of ports currently attached.
    pub fn port_count(&self) -> usize {
        self.live_ports().len()
    }

    fn live_ports(&self) -> Vec<Rc<PortCore<T>>> {
        let mut ports = self.inner.ports.borrow_mut();
        ports.retain(|port| port.strong_count() > 0);
        ports.iter().filter_map(Weak::upgrade).collect()
    }

    /// Delivers `value` to every attached port.
    #[track_caller]
    pub fn push(&self, value: T) {
        let location = Location::caller();
        let ports = self.live_ports();
        if let Ok(kernel) = self.inner.kernel.upgrade() {
            kernel.log(
                LogLevel::Push,
                Some(location.into()),
                format!("Push {:?} to '{}'", value, self.inner.name),
            );
        }
        for port in ports {
            port.deliver(&value);
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .field("ports", &self.inner.ports.borrow().len())
            .finish()
    }
}
