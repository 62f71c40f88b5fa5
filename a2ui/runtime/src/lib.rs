pub mod binding;
pub mod catalog;
pub mod config;
pub mod data_model;
pub mod dispatch;
pub mod error;
pub mod pointer;
pub mod processor;
pub mod protocol;
pub mod surface;
pub mod text;
pub mod validator;

pub use crate::binding::{
    BoundValue, DataContext, ITEM_ALIAS, Resolved, Resolver, TemplateBinding, TemplateInstance,
    TemplateInstances, ValueKind,
};
pub use crate::catalog::{Catalog, ChildSlot, ComponentDescriptor};
pub use crate::config::RuntimeConfig;
pub use crate::data_model::DataModel;
pub use crate::dispatch::{
    Completion, DispatchId, DispatchedEvent, Dispatcher, EventStream, PendingResponse,
};
pub use crate::error::{DataPathError, DispatchError, ProcessError, ProtocolError};
pub use crate::processor::MessageProcessor;
pub use crate::protocol::{ClientEvent, ComponentDef, ServerMessage, UserAction};
pub use crate::surface::{ComponentNode, Surface, SurfaceState, TreeChild, TreeNode};
pub use crate::text::MarkdownRenderer;
pub use crate::validator::{validate_messages, validate_with_catalog};
pub use serde_json;
