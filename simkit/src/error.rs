/// Errors that abort a simulation run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An event was scheduled with a negative, infinite, or NaN delay.
    #[error("invalid delay {0}: delays must be finite and non-negative")]
    InvalidDelay(f64),

    /// A component could not find a value it expected in the state.
    #[error("missing value in simulation state: {0}")]
    MissingValue(&'static str),

    /// A value could not be sent to a full queue.
    #[error("queue of {0} is full")]
    QueueFull(&'static str),

    /// An event was delivered to a component that does not handle its type.
    #[error("component {component} does not handle events of type {event}")]
    UnexpectedEvent {
        /// Index of the receiving component.
        component: usize,
        /// Name of the event type that failed to downcast.
        event: &'static str,
    },

    /// An event was addressed to a component that was never registered.
    #[error("unknown component: {0}")]
    UnknownComponent(usize),
}

/// Result type returned by simulation operations.
pub type Result<T> = std::result::Result<T, Error>;
