use std::fmt;
use std::marker::PhantomData;

use crate::{Error, EventEntry, Result, Scheduler, State};

/// Identifies a simulation component.
///
/// The ID is typed by the event the component accepts, therefore it is impossible to schedule an
/// event for a component that does not handle it.
pub struct ComponentId<E> {
    id: usize,
    _marker: PhantomData<E>,
}

impl<E> ComponentId<E> {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Index of the component in the order of registration.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<E> Clone for ComponentId<E> {
    fn clone(&self) -> Self {
        Self::new(self.id)
    }
}

impl<E> Copy for ComponentId<E> {}

impl<E> PartialEq for ComponentId<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for ComponentId<E> {}

impl<E> fmt::Debug for ComponentId<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentId").field(&self.id).finish()
    }
}

/// Interface of a simulation component.
///
/// A component reacts to its events by mutating the state and scheduling new events.
/// It can only be accessed by the simulation through these events.
pub trait Component {
    /// Type of event the component handles.
    type Event: fmt::Debug + 'static;

    /// Processes a single event.
    ///
    /// # Errors
    ///
    /// Any error aborts the simulation run, and is returned from [`crate::Simulation::step`].
    fn process_event(
        &mut self,
        self_id: ComponentId<Self::Event>,
        event: &Self::Event,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> Result<()>;
}

/// Type-erased component, unpacking event entries before handing them over.
trait ProcessEventEntry {
    fn process_event_entry(
        &mut self,
        entry: &EventEntry,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> Result<()>;
}

impl<E, C> ProcessEventEntry for C
where
    E: fmt::Debug + 'static,
    C: Component<Event = E>,
{
    fn process_event_entry(
        &mut self,
        entry: &EventEntry,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> Result<()> {
        let typed = entry
            .downcast::<E>()
            .ok_or_else(|| Error::UnexpectedEvent {
                component: entry.component_idx(),
                event: entry.event_name(),
            })?;
        self.process_event(typed.component_id, typed.event, scheduler, state)
    }
}

/// Container holding type-erased components.
#[derive(Default)]
pub struct Components {
    components: Vec<Box<dyn ProcessEventEntry>>,
}

impl Components {
    /// Process the event on the component given by the event entry.
    ///
    /// # Errors
    ///
    /// Fails if the component does not exist or does not accept the event type, or if the
    /// component itself fails processing the event.
    pub fn process_event_entry(
        &mut self,
        entry: &EventEntry,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> Result<()> {
        let idx = entry.component_idx();
        self.components
            .get_mut(idx)
            .ok_or(Error::UnknownComponent(idx))?
            .process_event_entry(entry, scheduler, state)
    }

    /// Registers a new component and returns its ID.
    #[must_use]
    pub fn add_component<E: fmt::Debug + 'static, C: Component<Event = E> + 'static>(
        &mut self,
        component: C,
    ) -> ComponentId<E> {
        let id = self.components.len();
        self.components.push(Box::new(component));
        ComponentId::new(id)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if no components are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
