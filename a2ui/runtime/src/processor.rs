//! Applies server messages to surfaces.
//!
//! The processor is permissive: it applies whatever parses and leaves
//! conformance checks to [`crate::validator`]. Messages are applied in
//! arrival order and every mutation happens synchronously inside
//! [`MessageProcessor::process_message`].

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binding::{DataContext, absolute_path};
use crate::catalog::Catalog;
use crate::config::RuntimeConfig;
use crate::data_model::typed_entries_to_object;
use crate::error::ProcessError;
use crate::protocol::{ClientEvent, ServerMessage, UpdateComponents, UpdateDataModel, UserAction};
use crate::surface::{Surface, TreeNode};

#[derive(Debug, Clone)]
pub struct MessageProcessor {
    surfaces: BTreeMap<String, Surface>,
    deleted: HashSet<String>,
    catalog: Catalog,
    config: RuntimeConfig,
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::new(Catalog::with_extensions(), RuntimeConfig::default())
    }
}

impl MessageProcessor {
    pub fn new(catalog: Catalog, config: RuntimeConfig) -> Self {
        Self {
            surfaces: BTreeMap::new(),
            deleted: HashSet::new(),
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Decodes and applies one raw JSON message.
    pub fn process_value(&mut self, value: Value) -> Result<(), ProcessError> {
        let message = ServerMessage::from_value(value)?;
        self.process_message(message)
    }

    /// Applies every message in order. A failing message is reported and
    /// skipped; it never stops the rest of the batch.
    pub fn process_messages(
        &mut self,
        messages: impl IntoIterator<Item = ServerMessage>,
    ) -> Vec<ProcessError> {
        messages
            .into_iter()
            .filter_map(|message| self.process_message(message).err())
            .collect()
    }

    pub fn process_message(&mut self, message: ServerMessage) -> Result<(), ProcessError> {
        let surface_id = message.surface_id().to_string();
        if self.deleted.contains(&surface_id) {
            warn!(surface = %surface_id, kind = message.kind(), "message for deleted surface");
            return Err(ProcessError::SurfaceDeleted(surface_id));
        }
        debug!(surface = %surface_id, kind = message.kind(), "applying message");

        match message {
            ServerMessage::BeginRendering(begin) => {
                self.surface_entry(&surface_id)
                    .begin_rendering(begin.root, begin.styles);
                Ok(())
            }
            ServerMessage::UpdateComponents(update) => self.update_components(update),
            ServerMessage::UpdateDataModel(update) => self.update_data_model(update),
            ServerMessage::DeleteSurface(_) => {
                self.surfaces.remove(&surface_id);
                debug!(surface = %surface_id, "surface deleted");
                self.deleted.insert(surface_id);
                Ok(())
            }
        }
    }

    /// Well-formed components are applied even when a sibling in the same
    /// batch is not; the first malformed one is returned as the error.
    fn update_components(&mut self, update: UpdateComponents) -> Result<(), ProcessError> {
        let UpdateComponents {
            surface_id,
            catalog_id,
            components,
        } = update;

        let mut nodes = Vec::with_capacity(components.len());
        let mut first_error = None;
        for (index, def) in components.iter().enumerate() {
            match def.normalize(index) {
                Ok(node) => nodes.push(node),
                Err(err) => {
                    warn!(surface = %surface_id, error = %err, "skipping component");
                    first_error.get_or_insert(err);
                }
            }
        }

        debug!(surface = %surface_id, count = nodes.len(), "upserting components");
        self.surface_entry(&surface_id)
            .upsert_components(nodes, catalog_id);

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn update_data_model(&mut self, update: UpdateDataModel) -> Result<(), ProcessError> {
        let UpdateDataModel {
            surface_id,
            path,
            contents,
        } = update;
        let path = path.unwrap_or_else(|| "/".to_string());
        let contents = typed_entries_to_object(&contents).unwrap_or(contents);

        self.surface_entry(&surface_id)
            .data_model_mut()
            .merge(&path, contents)
            .map_err(|source| {
                warn!(surface = %surface_id, path = %path, error = %source, "data model update failed");
                ProcessError::DataPath { surface_id, source }
            })
    }

    fn surface_entry(&mut self, surface_id: &str) -> &mut Surface {
        self.surfaces
            .entry(surface_id.to_string())
            .or_insert_with(|| {
                debug!(surface = %surface_id, "surface created");
                Surface::new(surface_id)
            })
    }

    pub fn surface(&self, surface_id: &str) -> Option<&Surface> {
        self.surfaces.get(surface_id)
    }

    /// Live surfaces in id order.
    pub fn surfaces(&self) -> impl Iterator<Item = &Surface> {
        self.surfaces.values()
    }

    pub fn is_deleted(&self, surface_id: &str) -> bool {
        self.deleted.contains(surface_id)
    }

    pub fn component_tree(&self, surface_id: &str) -> Option<TreeNode> {
        self.surface(surface_id)?
            .component_tree(&self.catalog, &self.config)
    }

    pub fn snapshot(&self, surface_id: &str) -> Option<Value> {
        self.surface(surface_id)
            .map(|surface| surface.snapshot(&self.catalog, &self.config))
    }

    /// Reads a data model value. `path` may be relative to `ctx`.
    pub fn get_data<'a>(
        &'a self,
        surface_id: &str,
        path: &str,
        ctx: Option<&'a DataContext>,
    ) -> Option<&'a Value> {
        self.surface(surface_id)?
            .resolver()
            .lookup(path, ctx)
    }

    /// Client-originated write, e.g. a text field edit. Replaces the value at
    /// `path` (relative to `ctx` when given).
    pub fn set_data(
        &mut self,
        surface_id: &str,
        path: &str,
        value: Value,
        ctx: Option<&DataContext>,
    ) -> Result<(), ProcessError> {
        if self.deleted.contains(surface_id) {
            return Err(ProcessError::SurfaceDeleted(surface_id.to_string()));
        }
        let surface = self
            .surfaces
            .get_mut(surface_id)
            .ok_or_else(|| ProcessError::UnknownSurface(surface_id.to_string()))?;

        let path = absolute_path(path, ctx);
        debug!(surface = %surface_id, path = %path, "client data write");
        surface
            .data_model_mut()
            .set(&path, value)
            .map_err(|source| ProcessError::DataPath {
                surface_id: surface_id.to_string(),
                source,
            })
    }

    /// Drops every surface, including tombstones.
    pub fn clear_surfaces(&mut self) {
        self.surfaces.clear();
        self.deleted.clear();
    }

    /// Builds the `userAction` event for a component's `action`. Context
    /// values are resolved against the data model at the time of the call;
    /// both `[{ key, value }]` and plain object contexts are accepted.
    pub fn user_action(
        &self,
        surface_id: &str,
        component_id: &str,
        ctx: Option<&DataContext>,
    ) -> Result<ClientEvent, ProcessError> {
        if self.deleted.contains(surface_id) {
            return Err(ProcessError::SurfaceDeleted(surface_id.to_string()));
        }
        let surface = self
            .surface(surface_id)
            .ok_or_else(|| ProcessError::UnknownSurface(surface_id.to_string()))?;
        let component =
            surface
                .component(component_id)
                .ok_or_else(|| ProcessError::UnknownComponent {
                    surface_id: surface_id.to_string(),
                    component_id: component_id.to_string(),
                })?;

        let action = component.properties.get("action");
        let name = action
            .and_then(|action| action.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessError::MissingAction(component_id.to_string()))?;

        let resolver = surface.resolver();
        let mut context = Map::new();
        match action.and_then(|action| action.get("context")) {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let Some(key) = entry.get("key").and_then(Value::as_str) else {
                        continue;
                    };
                    let value = entry
                        .get("value")
                        .and_then(|raw| resolver.resolve_optional(raw, ctx))
                        .unwrap_or(Value::Null);
                    context.insert(key.to_string(), value);
                }
            }
            Some(Value::Object(entries)) => {
                for (key, raw) in entries {
                    let value = resolver.resolve_optional(raw, ctx).unwrap_or(Value::Null);
                    context.insert(key.clone(), value);
                }
            }
            _ => {}
        }

        Ok(ClientEvent::UserAction(UserAction {
            name: name.to_string(),
            surface_id: surface_id.to_string(),
            source_component_id: component_id.to_string(),
            timestamp: Utc::now(),
            context,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChildSlot, ComponentDescriptor};
    use crate::surface::SurfaceState;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn apply(processor: &mut MessageProcessor, messages: Value) -> Vec<ProcessError> {
        let messages: Vec<ServerMessage> =
            serde_json::from_value(messages).expect("decode messages");
        processor.process_messages(messages)
    }

    #[test]
    fn begin_rendering_activates_surface() {
        let mut processor = MessageProcessor::default();
        let errors = apply(
            &mut processor,
            json!([{"beginRendering": {"surfaceId": "main", "root": "page"}}]),
        );
        assert!(errors.is_empty());

        let surface = processor.surface("main").unwrap();
        assert_eq!(surface.state(), SurfaceState::Active);
        assert_eq!(surface.root_id(), "page");
    }

    #[test]
    fn data_before_components_leaves_surface_uninitialized() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([{"updateDataModel": {"surfaceId": "s", "contents": {"a": 1}}}]),
        );
        assert_eq!(
            processor.surface("s").unwrap().state(),
            SurfaceState::Uninitialized
        );
        assert_eq!(processor.get_data("s", "/a", None), Some(&json!(1)));
    }

    #[test]
    fn deleted_surface_rejects_later_messages() {
        let mut processor = MessageProcessor::default();
        let errors = apply(
            &mut processor,
            json!([
                {"updateComponents": {"surfaceId": "s", "components": [
                    {"id": "root", "component": {"Text": {"text": "x"}}}
                ]}},
                {"deleteSurface": {"surfaceId": "s"}},
                {"updateDataModel": {"surfaceId": "s", "contents": {"a": 1}}},
                {"beginRendering": {"surfaceId": "s", "root": "root"}}
            ]),
        );

        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|err| matches!(err, ProcessError::SurfaceDeleted(id) if id == "s")));
        assert!(processor.surface("s").is_none());
        assert!(processor.is_deleted("s"));
        assert!(matches!(
            processor.set_data("s", "/a", json!(1), None),
            Err(ProcessError::SurfaceDeleted(_))
        ));
    }

    #[test]
    fn typed_entry_contents_merge_like_objects() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([
                {"dataModelUpdate": {"surfaceId": "s", "contents": {"keep": true}}},
                {"dataModelUpdate": {"surfaceId": "s", "path": "/", "contents": [
                    {"key": "title", "valueString": "Flights"}
                ]}}
            ]),
        );

        let root = processor.surface("s").unwrap().data_model().root().clone();
        assert_eq!(root, json!({"keep": true, "title": "Flights"}));
    }

    #[test]
    fn registered_types_expose_their_slots() {
        let mut processor = MessageProcessor::default();
        processor
            .catalog_mut()
            .register(ComponentDescriptor::new("Panel").slot(ChildSlot::single("body")));
        apply(
            &mut processor,
            json!([{"updateComponents": {"surfaceId": "s", "components": [
                {"id": "root", "component": {"Panel": {"body": "text"}}},
                {"id": "text", "component": {"Text": {"text": "inside"}}}
            ]}}]),
        );

        let tree = processor.component_tree("s").unwrap();
        let body = tree.children_of("body").next().unwrap();
        assert_eq!(body.component_type, "Text");
    }

    #[test]
    fn data_update_without_contents_is_rejected() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([{"updateDataModel": {"surfaceId": "s", "contents": {"keep": true}}}]),
        );

        let err = processor
            .process_value(json!({"updateDataModel": {"surfaceId": "s"}}))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Protocol(_)));
        assert!(err.to_string().contains("contents"));
        assert_eq!(
            processor.surface("s").unwrap().data_model().root(),
            &json!({"keep": true})
        );
    }

    #[test]
    fn nested_empty_typed_map_keeps_the_model() {
        let mut processor = MessageProcessor::default();
        let errors = apply(
            &mut processor,
            json!([
                {"updateDataModel": {"surfaceId": "s", "contents": {"keep": true}}},
                {"updateDataModel": {"surfaceId": "s", "contents": [
                    {"key": "title", "valueString": "Flights"},
                    {"key": "filters", "valueMap": []}
                ]}}
            ]),
        );

        assert!(errors.is_empty());
        assert_eq!(
            processor.surface("s").unwrap().data_model().root(),
            &json!({"keep": true, "title": "Flights", "filters": {}})
        );
    }

    #[test]
    fn malformed_component_does_not_block_batch() {
        let mut processor = MessageProcessor::default();
        let errors = apply(
            &mut processor,
            json!([{"updateComponents": {"surfaceId": "s", "components": [
                {"component": {"Text": {"text": "no id"}}},
                {"id": "root", "component": {"Text": {"text": "ok"}}}
            ]}}]),
        );

        assert_eq!(errors.len(), 1);
        assert!(processor.surface("s").unwrap().component("root").is_some());
    }

    #[test]
    fn set_data_is_relative_to_context() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([{"updateDataModel": {"surfaceId": "s", "contents": {"rows": [{"n": 1}]}}}]),
        );

        let ctx = DataContext::new("/rows/0", json!({"n": 1}));
        processor
            .set_data("s", "n", json!(5), Some(&ctx))
            .unwrap();
        assert_eq!(processor.get_data("s", "/rows/0/n", None), Some(&json!(5)));
        assert_eq!(processor.get_data("s", "n", Some(&ctx)), Some(&json!(5)));
        assert_eq!(processor.get_data("s", "item/n", Some(&ctx)), Some(&json!(1)));
        assert!(matches!(
            processor.set_data("nope", "/a", json!(1), None),
            Err(ProcessError::UnknownSurface(_))
        ));
    }

    #[test]
    fn user_action_resolves_context() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([
                {"updateDataModel": {"surfaceId": "s", "contents": {
                    "form": {"email": "a@b.c"},
                    "flights": [{"id": "F1"}, {"id": "F2"}]
                }}},
                {"updateComponents": {"surfaceId": "s", "components": [
                    {"id": "submit", "component": {"Button": {
                        "child": "label",
                        "action": {"name": "book", "context": [
                            {"key": "email", "value": {"path": "/form/email"}},
                            {"key": "flight", "value": {"path": "id"}},
                            {"key": "source", "value": "web"}
                        ]}
                    }}},
                    {"id": "label", "component": {"Text": {"text": "Book"}}}
                ]}}
            ]),
        );

        let ctx = DataContext::new("/flights/1", json!({"id": "F2"}));
        let ClientEvent::UserAction(action) = processor.user_action("s", "submit", Some(&ctx)).unwrap()
        else {
            panic!("expected userAction");
        };

        assert_eq!(action.name, "book");
        assert_eq!(action.source_component_id, "submit");
        assert_eq!(
            Value::Object(action.context),
            json!({"email": "a@b.c", "flight": "F2", "source": "web"})
        );

        assert!(matches!(
            processor.user_action("s", "label", None),
            Err(ProcessError::MissingAction(_))
        ));
        assert!(matches!(
            processor.user_action("s", "ghost", None),
            Err(ProcessError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn clear_surfaces_forgets_tombstones() {
        let mut processor = MessageProcessor::default();
        apply(
            &mut processor,
            json!([{"deleteSurface": {"surfaceId": "s"}}]),
        );
        processor.clear_surfaces();
        assert!(!processor.is_deleted("s"));
        assert_eq!(processor.surfaces().count(), 0);
    }
}
