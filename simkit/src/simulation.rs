use std::fmt;
use std::time::Duration;

use crate::{Component, ComponentId, Components, Result, Scheduler, State};

/// Condition that ends [`Simulation::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCondition {
    /// Runs all events scheduled strictly before the given time. Once finished, the clock is
    /// moved to that time, even if the last event occurred earlier.
    Time(Duration),
    /// Runs until no events are left.
    NoEvents,
    /// Executes exactly this many events, unless we run out of events.
    Steps(usize),
}

/// Simulation struct that puts different parts of the simulation together.
///
/// Each run should construct its own simulation: nothing is shared between instances.
#[derive(Default)]
pub struct Simulation {
    /// Current state of the simulation meant to be mutated by the components.
    pub state: State,
    /// Schedules events and maintains the clock.
    pub scheduler: Scheduler,
    components: Components,
}

impl Simulation {
    /// Registers a new component and returns its ID.
    #[must_use]
    pub fn add_component<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(
        &mut self,
        component: C,
    ) -> ComponentId<E> {
        let id = self.components.add_component(component);
        log::debug!(
            "Registered component {} ({})",
            id.id(),
            std::any::type_name::<C>()
        );
        id
    }

    /// Schedules a new event to be executed after `delay` from now.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::schedule`].
    pub fn schedule<E: fmt::Debug + 'static>(
        &mut self,
        delay: f64,
        component: ComponentId<E>,
        event: E,
    ) -> Result<()> {
        self.scheduler.schedule(delay, component, event)
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.scheduler.time()
    }

    /// Performs one step of the simulation. Returns `true` if there was in fact an event
    /// available to process, and `false` otherwise, which signifies that the simulation
    /// ended.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the component processing the event.
    pub fn step(&mut self) -> Result<bool> {
        if let Some(entry) = self.scheduler.pop() {
            log::trace!(
                "[{:?}] Processing event #{} for component {}",
                entry.time(),
                entry.sequence(),
                entry.component_idx()
            );
            self.components
                .process_event_entry(&entry, &mut self.scheduler, &mut self.state)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Runs the simulation until `end` is reached. Returns the number of executed events.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by a component.
    pub fn run(&mut self, end: EndCondition) -> Result<usize> {
        self.run_until(end, |_| false)
    }

    /// Runs the simulation until either `end` is reached or `stop` returns `true`.
    /// The `stop` predicate is checked after each executed event.
    /// Returns the number of executed events.
    ///
    /// When `stop` ends the run early, the clock stays at the time of the last executed event.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by a component.
    pub fn run_until<F>(&mut self, end: EndCondition, mut stop: F) -> Result<usize>
    where
        F: FnMut(&State) -> bool,
    {
        let mut steps = 0;
        loop {
            let can_continue = match end {
                EndCondition::Time(time) => self.scheduler.peek_time().map_or(false, |t| t < time),
                EndCondition::NoEvents => self.scheduler.peek_time().is_some(),
                EndCondition::Steps(max) => steps < max,
            };
            if !can_continue || !self.step()? {
                break;
            }
            steps += 1;
            if stop(&self.state) {
                return Ok(steps);
            }
        }
        if let EndCondition::Time(time) = end {
            self.scheduler.advance_to(time);
        }
        Ok(steps)
    }
}
