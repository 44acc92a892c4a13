use std::{collections::BTreeMap, time::Duration};

use super::ids::{RunnerId, SourceId, TimerId};

/// Events that can be scheduled on the virtual timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The timeout of a runner's pending wait elapsed.
    WaitTimeout {
        /// The suspended runner.
        runner: RunnerId,
    },
    /// A running timer reached its expiry.
    TimerExpired {
        /// The expiring timer.
        timer: TimerId,
    },
    /// A running stopwatch crossed a threshold some live condition watches.
    StopwatchEdge {
        /// The stopwatch leaf whose comparisons may have flipped.
        stopwatch: SourceId,
    },
}

/// Position of an event in the queue, usable to cancel it.
///
/// Keys order by time first and by scheduling sequence second, which gives
/// events at the same instant a stable FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    time: Duration,
    sequence: u64,
}

impl EventKey {
    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.time
    }
}

/// An event scheduled for execution at a specific virtual time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    time: Duration,
    event: Event,
    sequence: u64, // For deterministic ordering
}

impl ScheduledEvent {
    /// Creates a new scheduled event.
    pub fn new(time: Duration, event: Event, sequence: u64) -> Self {
        Self {
            time,
            event,
            sequence,
        }
    }

    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Returns a reference to the event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Returns the key under which this event is queued.
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.time,
            sequence: self.sequence,
        }
    }

    /// Consumes the scheduled event and returns the event.
    pub fn into_event(self) -> Event {
        self.event
    }
}

/// A priority queue of events in chronological order.
///
/// Unlike a heap, entries can be cancelled by key, which timers and
/// wait timeouts rely on.
#[derive(Debug, Default)]
pub struct EventQueue {
    entries: BTreeMap<EventKey, Event>,
}

impl EventQueue {
    /// Creates a new empty event queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event for execution and returns its key.
    pub fn schedule(&mut self, event: ScheduledEvent) -> EventKey {
        let key = event.key();
        self.entries.insert(key, event.into_event());
        key
    }

    /// Removes a pending event. Returns `None` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, key: EventKey) -> Option<Event> {
        self.entries.remove(&key)
    }

    /// Removes and returns the earliest scheduled event.
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.entries
            .pop_first()
            .map(|(key, event)| ScheduledEvent::new(key.time, event, key.sequence))
    }

    /// Returns the time of the earliest scheduled event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.entries.keys().next().map(|key| key.time)
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of events in the queue.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(id: u64) -> Event {
        Event::TimerExpired { timer: TimerId(id) }
    }

    #[test]
    fn event_queue_ordering() {
        let mut queue = EventQueue::new();

        queue.schedule(ScheduledEvent::new(Duration::from_millis(300), timer(3), 2));
        queue.schedule(ScheduledEvent::new(Duration::from_millis(100), timer(1), 0));
        queue.schedule(ScheduledEvent::new(Duration::from_millis(200), timer(2), 1));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek_time(), Some(Duration::from_millis(100)));

        let order: Vec<Event> = std::iter::from_fn(|| queue.pop_earliest())
            .map(ScheduledEvent::into_event)
            .collect();
        assert_eq!(order, vec![timer(1), timer(2), timer(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn same_time_deterministic_ordering() {
        let mut queue = EventQueue::new();
        let same_time = Duration::from_millis(100);

        queue.schedule(ScheduledEvent::new(same_time, timer(3), 2));
        queue.schedule(ScheduledEvent::new(same_time, timer(1), 0));
        queue.schedule(ScheduledEvent::new(same_time, timer(2), 1));

        let first = queue.pop_earliest().map(ScheduledEvent::into_event);
        let second = queue.pop_earliest().map(ScheduledEvent::into_event);
        let third = queue.pop_earliest().map(ScheduledEvent::into_event);

        assert_eq!(first, Some(timer(1)));
        assert_eq!(second, Some(timer(2)));
        assert_eq!(third, Some(timer(3)));
    }

    #[test]
    fn cancelled_events_never_fire() {
        let mut queue = EventQueue::new();
        let keep = queue.schedule(ScheduledEvent::new(Duration::from_millis(5), timer(1), 0));
        let drop = queue.schedule(ScheduledEvent::new(Duration::from_millis(1), timer(2), 1));

        assert_eq!(queue.cancel(drop), Some(timer(2)));
        assert_eq!(queue.cancel(drop), None);

        let next = queue.pop_earliest().expect("one event left");
        assert_eq!(next.key(), keep);
        assert!(queue.pop_earliest().is_none());
    }
}
