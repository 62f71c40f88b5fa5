use thiserror::Error;

use crate::dispatch::DispatchId;

/// A message could not be decoded into one of the known envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("component at index {index} has no id")]
    MissingComponentId { index: usize },

    #[error("component '{id}' does not name a component type")]
    MissingComponentType { id: String },
}

/// Failure to address or write a data model path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataPathError {
    #[error("invalid escape ~{escape} in path token")]
    InvalidEscape { escape: char },

    #[error("trailing ~ in path token")]
    TrailingEscape,

    #[error("invalid array index '{token}' at path {path}")]
    InvalidIndex { token: String, path: String },

    #[error("array index out of bounds '{token}' at path {path}")]
    IndexOutOfBounds { token: String, path: String },
}

/// A well-formed message that the processor could not apply.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("surface '{0}' has been deleted")]
    SurfaceDeleted(String),

    #[error("surface '{0}' does not exist")]
    UnknownSurface(String),

    #[error("component '{component_id}' does not exist on surface '{surface_id}'")]
    UnknownComponent {
        surface_id: String,
        component_id: String,
    },

    #[error("component '{0}' has no action")]
    MissingAction(String),

    #[error("data model update on surface '{surface_id}' failed: {source}")]
    DataPath {
        surface_id: String,
        #[source]
        source: DataPathError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch {0} is not pending")]
    UnknownDispatch(DispatchId),

    #[error("dispatch {id} timed out after {millis}ms")]
    TimedOut { id: DispatchId, millis: u128 },

    #[error("dispatcher dropped before dispatch {0} completed")]
    Closed(DispatchId),

    #[error("no event consumer is attached")]
    NoConsumer,
}
