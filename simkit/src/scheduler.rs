use std::any::{Any, TypeId};
use std::cell::Cell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::{Clock, ComponentId, Error, Result};

/// Entry type stored in the scheduler, including the event value, component ID, and the time when
/// it is supposed to occur.
///
/// Entries are ordered by time, and then by the sequence number assigned at scheduling, so that
/// events scheduled for the same time are popped in the order they were scheduled.
#[derive(Debug)]
pub struct EventEntry {
    time: Duration,
    sequence: u64,
    component: usize,
    inner: Box<dyn Any>,
    event_type: TypeId,
    event_name: &'static str,
}

impl EventEntry {
    /// Tries to downcast the event entry to one holding an event of type `E`.
    /// If fails, returns `None`.
    #[must_use]
    pub fn downcast<E: fmt::Debug + 'static>(&self) -> Option<EventEntryTyped<'_, E>> {
        if self.event_type == TypeId::of::<E>() {
            self.inner
                .downcast_ref::<E>()
                .map(|event| EventEntryTyped {
                    time: self.time,
                    component_id: ComponentId::new(self.component),
                    event,
                })
        } else {
            None
        }
    }

    /// The time at which the event occurs.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// The position of this event in the global scheduling order.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Index of the component the event is addressed to.
    #[must_use]
    pub fn component_idx(&self) -> usize {
        self.component
    }

    /// Name of the type of the event.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    fn key(&self) -> Reverse<(Duration, u64)> {
        Reverse((self.time, self.sequence))
    }
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Typed view of an [`EventEntry`].
#[derive(Debug)]
pub struct EventEntryTyped<'e, E: fmt::Debug> {
    /// The time at which the event occurs.
    pub time: Duration,
    /// The component the event is addressed to.
    pub component_id: ComponentId<E>,
    /// The event value.
    pub event: &'e E,
}

/// This struct has only immutable access to the simulation clock exposed.
#[derive(Debug, Clone)]
pub struct ClockRef {
    clock: Clock,
}

impl From<Clock> for ClockRef {
    fn from(clock: Clock) -> Self {
        Self { clock }
    }
}

impl ClockRef {
    /// Return the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.clock.get()
    }
}

/// Scheduler is used to keep the current time and information about the upcoming events.
pub struct Scheduler {
    events: BinaryHeap<EventEntry>,
    clock: Clock,
    next_sequence: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            events: BinaryHeap::new(),
            clock: Rc::new(Cell::new(Duration::default())),
            next_sequence: 0,
        }
    }
}

impl Scheduler {
    /// Schedules `event` to be executed for `component` at `self.time() + delay`, where `delay`
    /// is expressed in simulation time units.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDelay`] if `delay` is negative, infinite, or NaN. Nothing is
    /// scheduled in that case.
    pub fn schedule<E: fmt::Debug + 'static>(
        &mut self,
        delay: f64,
        component: ComponentId<E>,
        event: E,
    ) -> Result<()> {
        let delay = Duration::try_from_secs_f64(delay).map_err(|_| Error::InvalidDelay(delay))?;
        self.push(delay, component, event);
        Ok(())
    }

    /// Schedules `event` to be executed for `component` at `self.time()`.
    pub fn schedule_immediately<E: fmt::Debug + 'static>(
        &mut self,
        component: ComponentId<E>,
        event: E,
    ) {
        self.push(Duration::default(), component, event);
    }

    fn push<E: fmt::Debug + 'static>(&mut self, delay: Duration, component: ComponentId<E>, event: E) {
        let time = self.time() + delay;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        log::trace!(
            "[{:?}] Scheduling {:?} (#{}) for component {} at {:?}",
            self.time(),
            event,
            sequence,
            component.id(),
            time
        );
        self.events.push(EventEntry {
            time,
            sequence,
            component: component.id(),
            inner: Box::new(event),
            event_type: TypeId::of::<E>(),
            event_name: std::any::type_name::<E>(),
        });
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.clock.get()
    }

    /// Returns a structure with immutable access to the simulation time.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        ClockRef {
            clock: Rc::clone(&self.clock),
        }
    }

    /// Returns the time of the next scheduled event, or `None` if none are left.
    #[must_use]
    pub fn peek_time(&self) -> Option<Duration> {
        self.events.peek().map(EventEntry::time)
    }

    /// Number of events waiting to be executed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Removes and returns the next scheduled event or `None` if none are left.
    /// The clock is moved forward to the time of the returned event.
    pub fn pop(&mut self) -> Option<EventEntry> {
        self.events.pop().map(|e| {
            debug_assert!(e.time >= self.clock.get(), "time must not go backwards");
            self.clock.replace(e.time);
            e
        })
    }

    /// Moves the clock forward to `time` without executing anything. Has no effect if the clock
    /// is already past `time`.
    pub(crate) fn advance_to(&mut self, time: Duration) {
        if time > self.clock.get() {
            self.clock.replace(time);
        }
    }

    /// Drops all events that are still pending, returning how many there were.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.events.len();
        self.events.clear();
        discarded
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Eq, PartialEq)]
    struct EventA;
    #[derive(Debug, Clone, Eq, PartialEq)]
    struct EventB(usize);

    fn make_entry(secs: u64, sequence: u64) -> EventEntry {
        EventEntry {
            time: Duration::from_secs(secs),
            sequence,
            component: 2,
            event_type: TypeId::of::<String>(),
            event_name: "String",
            inner: Box::new(String::from("inner")),
        }
    }

    #[test]
    fn test_event_entry_downcast() {
        let entry = make_entry(1, 0);
        assert!(entry.downcast::<String>().is_some());
        assert!(entry.downcast::<i32>().is_none());
    }

    #[test]
    fn test_event_entry_cmp() {
        assert_eq!(make_entry(1, 0), make_entry(1, 0));
        assert_eq!(make_entry(0, 5).cmp(&make_entry(1, 0)), Ordering::Greater);
        assert_eq!(make_entry(2, 0).cmp(&make_entry(1, 5)), Ordering::Less);
        assert_eq!(make_entry(1, 0).cmp(&make_entry(1, 1)), Ordering::Greater);
    }

    #[test]
    fn test_scheduler() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.time(), Duration::new(0, 0));
        assert_eq!(scheduler.pending(), 0);

        let component_a = ComponentId::<EventA>::new(0);
        let component_b = ComponentId::<EventB>::new(1);

        scheduler.schedule(1.0, component_a, EventA).unwrap();
        scheduler.schedule(0.0, component_b, EventB(0)).unwrap();
        scheduler.schedule(2.0, component_b, EventB(1)).unwrap();

        assert_eq!(scheduler.time(), Duration::from_secs(0));
        assert_eq!(scheduler.peek_time(), Some(Duration::from_secs(0)));

        let entry = scheduler.pop().unwrap();
        let entry = entry.downcast::<EventB>().unwrap();
        assert_eq!(entry.time, Duration::from_secs(0));
        assert_eq!(entry.component_id, component_b);
        assert_eq!(entry.event, &EventB(0));
        assert_eq!(scheduler.time(), Duration::from_secs(0));

        let entry = scheduler.pop().unwrap();
        assert_eq!(entry.component_idx(), 0);
        let entry = entry.downcast::<EventA>().unwrap();
        assert_eq!(entry.time, Duration::from_secs(1));
        assert_eq!(entry.event, &EventA);
        assert_eq!(scheduler.time(), Duration::from_secs(1));

        let entry = scheduler.pop().unwrap();
        let entry = entry.downcast::<EventB>().unwrap();
        assert_eq!(entry.time, Duration::from_secs(2));
        assert_eq!(entry.event, &EventB(1));
        assert_eq!(scheduler.time(), Duration::from_secs(2));

        assert!(scheduler.pop().is_none());
    }

    #[test]
    fn test_same_time_events_pop_in_scheduling_order() {
        let mut scheduler = Scheduler::default();
        let component = ComponentId::<EventB>::new(0);
        for i in 0..100 {
            scheduler.schedule(1.0, component, EventB(i)).unwrap();
        }
        scheduler.schedule_immediately(component, EventB(100));
        let order: Vec<usize> = std::iter::from_fn(|| scheduler.pop())
            .map(|e| e.downcast::<EventB>().unwrap().event.0)
            .collect();
        let mut expected = vec![100];
        expected.extend(0..100);
        assert_eq!(order, expected);
    }

    #[test]
    fn test_invalid_delay_is_rejected() {
        let mut scheduler = Scheduler::default();
        let component = ComponentId::<EventA>::new(0);
        assert_eq!(
            scheduler.schedule(-0.5, component, EventA),
            Err(Error::InvalidDelay(-0.5))
        );
        assert!(scheduler.schedule(f64::INFINITY, component, EventA).is_err());
        assert!(scheduler.schedule(f64::NAN, component, EventA).is_err());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_discard_and_advance() {
        let mut scheduler = Scheduler::default();
        let component = ComponentId::<EventA>::new(0);
        scheduler.schedule(3.0, component, EventA).unwrap();
        scheduler.schedule(4.0, component, EventA).unwrap();
        scheduler.advance_to(Duration::from_secs(2));
        assert_eq!(scheduler.time(), Duration::from_secs(2));
        scheduler.advance_to(Duration::from_secs(1));
        assert_eq!(scheduler.time(), Duration::from_secs(2));
        assert_eq!(scheduler.discard_pending(), 2);
        assert!(scheduler.peek_time().is_none());
    }
}
