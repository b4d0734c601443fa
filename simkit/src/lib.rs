#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

//! This is a general purpose discrete-event simulation engine that provides the mechanisms such
//! as: scheduler, clock, state, queues, components, etc.
//!
//! Components receive typed events from the [`Scheduler`]. Events are executed in the order of
//! their scheduled time; events scheduled for the same time are executed in the order in which
//! they were scheduled, which makes every run with the same inputs replay identically.
//!
//! # Examples
//!
//! ```
//! # use simkit::{Component, ComponentId, EndCondition, Key, Scheduler, Simulation, State};
//! #[derive(Debug)]
//! struct Tick;
//!
//! struct Counter {
//!     ticks: Key<usize>,
//! }
//!
//! impl Component for Counter {
//!     type Event = Tick;
//!
//!     fn process_event(
//!         &mut self,
//!         self_id: ComponentId<Tick>,
//!         _event: &Tick,
//!         scheduler: &mut Scheduler,
//!         state: &mut State,
//!     ) -> simkit::Result<()> {
//!         *state.try_get_mut(self.ticks)? += 1;
//!         scheduler.schedule(1.5, self_id, Tick)
//!     }
//! }
//!
//! # fn main() -> simkit::Result<()> {
//! let mut sim = Simulation::default();
//! let ticks = sim.state.insert(0_usize);
//! let counter = sim.add_component(Counter { ticks });
//! sim.schedule(0.0, counter, Tick)?;
//! sim.run(EndCondition::Time(std::time::Duration::from_secs(6)))?;
//! assert_eq!(sim.state.get(ticks), Some(&4));
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Simulation clock.
pub type Clock = Rc<Cell<Duration>>;

pub use component::{Component, ComponentId, Components};
pub use error::{Error, Result};
pub use queue::Queue;
pub use scheduler::{ClockRef, EventEntry, EventEntryTyped, Scheduler};
pub use simulation::{EndCondition, Simulation};
pub use state::{Key, QueueId, State};

mod component;
mod error;
mod queue;
mod scheduler;
mod simulation;
mod state;
