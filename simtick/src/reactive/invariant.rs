//! Continuously monitored conditions.

use std::fmt;

use tracing::debug;

use crate::journal::SourceLocation;
use crate::reactive::condition::Condition;
use crate::sim::ids::{InvariantId, RunnerId};
use crate::sim::kernel::{Kernel, WeakKernel};

pub(crate) struct InvariantEntry {
    pub(crate) condition: Condition,
    pub(crate) active: bool,
    /// Value at the latest evaluation while active.
    pub(crate) held: bool,
    pub(crate) owner: Option<RunnerId>,
    pub(crate) location: SourceLocation,
}

/// A condition the kernel re-evaluates whenever one of its leaves changes.
///
/// Each transition from holding to not holding while active counts one
/// invariant failure and logs the creation site. An invariant that is false
/// when created fails immediately. Dropping the handle removes the
/// invariant without a final check.
#[must_use = "an invariant stops being monitored when dropped"]
pub struct Invariant {
    kernel: WeakKernel,
    id: InvariantId,
}

impl Invariant {
    pub(crate) fn create(
        kernel: &Kernel,
        owner: Option<RunnerId>,
        site: Option<&str>,
        condition: Condition,
        location: SourceLocation,
    ) -> Self {
        let holds = condition.evaluate();

        let mut state = kernel.state();
        let id = InvariantId(state.next_id());
        state.tests.invariant_created(site);
        debug!(invariant = ?id, %condition, holds, "invariant created");
        state.invariants.insert(
            id,
            InvariantEntry {
                condition: condition.clone(),
                active: true,
                held: holds,
                owner,
                location,
            },
        );
        if !holds {
            state.report_invariant(owner, location, &condition);
        }
        state.refresh_thresholds(&condition);

        Self {
            kernel: kernel.downgrade(),
            id,
        }
    }

    /// Returns the value of the latest evaluation. Stopping preserves it.
    pub fn holds(&self) -> bool {
        self.kernel
            .upgrade()
            .ok()
            .and_then(|kernel| kernel.invariant(self.id))
            .map(|(held, _)| held)
            .unwrap_or(false)
    }

    /// Returns `true` while the invariant is monitored.
    pub fn is_active(&self) -> bool {
        self.kernel
            .upgrade()
            .ok()
            .and_then(|kernel| kernel.invariant(self.id))
            .map(|(_, active)| active)
            .unwrap_or(false)
    }

    /// Resumes monitoring. Nothing is evaluated until a leaf changes, so
    /// changes made while stopped are not reported retroactively.
    pub fn start(&self) {
        self.set_active(true);
    }

    /// Suspends monitoring.
    pub fn stop(&self) {
        self.set_active(false);
    }

    fn set_active(&self, active: bool) {
        let Ok(kernel) = self.kernel.upgrade() else {
            return;
        };
        let mut state = kernel.state();
        let Some(entry) = state.invariants.get_mut(&self.id) else {
            return;
        };
        if entry.active == active {
            return;
        }
        entry.active = active;
        let condition = entry.condition.clone();
        state.refresh_thresholds(&condition);
    }
}

impl Drop for Invariant {
    fn drop(&mut self) {
        let Ok(kernel) = self.kernel.upgrade() else {
            return;
        };
        let Ok(mut state) = kernel.try_state() else {
            return;
        };
        if let Some(entry) = state.invariants.remove(&self.id) {
            state.refresh_thresholds(&entry.condition);
        }
    }
}

impl fmt::Debug for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invariant")
            .field("id", &self.id)
            .field("holds", &self.holds())
            .field("active", &self.is_active())
            .finish()
    }
}
