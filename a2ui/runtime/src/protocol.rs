use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::surface::ComponentNode;

/// Server-to-client messages. The 0.8 names `surfaceUpdate` and
/// `dataModelUpdate` are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    BeginRendering(BeginRendering),
    #[serde(alias = "surfaceUpdate")]
    UpdateComponents(UpdateComponents),
    #[serde(alias = "dataModelUpdate")]
    UpdateDataModel(UpdateDataModel),
    DeleteSurface(DeleteSurface),
}

impl ServerMessage {
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn surface_id(&self) -> &str {
        match self {
            ServerMessage::BeginRendering(msg) => &msg.surface_id,
            ServerMessage::UpdateComponents(msg) => &msg.surface_id,
            ServerMessage::UpdateDataModel(msg) => &msg.surface_id,
            ServerMessage::DeleteSurface(msg) => &msg.surface_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::BeginRendering(_) => "beginRendering",
            ServerMessage::UpdateComponents(_) => "updateComponents",
            ServerMessage::UpdateDataModel(_) => "updateDataModel",
            ServerMessage::DeleteSurface(_) => "deleteSurface",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRendering {
    pub surface_id: String,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComponents {
    pub surface_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    pub components: Vec<ComponentDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataModel {
    pub surface_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub contents: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSurface {
    pub surface_id: String,
}

/// A component definition as it appears on the wire. Three shapes are in
/// circulation:
///
/// * `{ id, component: { Type: { ..props } } }`
/// * `{ id, props: { component: "Type", ..props } }`
/// * `{ id, component: "Type", ..props }`
///
/// [`ComponentDef::normalize`] folds all of them into a [`ComponentNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentDef {
    pub fn normalize(&self, index: usize) -> Result<ComponentNode, ProtocolError> {
        let id = self
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(ProtocolError::MissingComponentId { index })?;

        let (component_type, properties) =
            self.type_and_properties()
                .ok_or_else(|| ProtocolError::MissingComponentType { id: id.clone() })?;

        Ok(ComponentNode {
            id,
            component_type,
            properties,
            weight: self.weight,
        })
    }

    fn type_and_properties(&self) -> Option<(String, Map<String, Value>)> {
        match &self.component {
            Some(Value::Object(keyed)) if keyed.len() == 1 => {
                let (component_type, props) = keyed.iter().next()?;
                let properties = props.as_object().cloned().unwrap_or_default();
                Some((component_type.clone(), properties))
            }
            Some(Value::String(component_type)) => {
                Some((component_type.clone(), self.extra.clone()))
            }
            _ => {
                let mut properties = self.props.clone()?;
                let component_type = match properties.remove("component") {
                    Some(Value::String(component_type)) => component_type,
                    _ => return None,
                };
                Some((component_type, properties))
            }
        }
    }
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    UserAction(UserAction),
    Error(ClientError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub name: String,
    pub surface_id: String,
    pub source_component_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_registry_keyed_components() {
        let message = ServerMessage::from_value(json!({
            "updateComponents": {
                "surfaceId": "@default",
                "components": [
                    {"id": "root", "component": {"Text": {"text": {"path": "/msg"}}}}
                ]
            }
        }))
        .expect("decode updateComponents");

        let ServerMessage::UpdateComponents(update) = message else {
            panic!("expected updateComponents");
        };
        let node = update.components[0].normalize(0).expect("normalize");
        assert_eq!(node.id, "root");
        assert_eq!(node.component_type, "Text");
        assert_eq!(node.properties["text"], json!({"path": "/msg"}));
    }

    #[test]
    fn decodes_props_and_flat_components() {
        let props: ComponentDef = serde_json::from_value(json!({
            "id": "title",
            "props": {"component": "Text", "text": "Hi"}
        }))
        .unwrap();
        let node = props.normalize(0).unwrap();
        assert_eq!(node.component_type, "Text");
        assert!(!node.properties.contains_key("component"));
        assert_eq!(node.properties["text"], json!("Hi"));

        let flat: ComponentDef = serde_json::from_value(json!({
            "id": "img",
            "component": "Image",
            "url": "https://example.com/a.png",
            "weight": 2
        }))
        .unwrap();
        let node = flat.normalize(1).unwrap();
        assert_eq!(node.component_type, "Image");
        assert_eq!(node.properties["url"], json!("https://example.com/a.png"));
        assert_eq!(node.weight, Some(2.0));
    }

    #[test]
    fn rejects_components_without_id_or_type() {
        let no_id: ComponentDef =
            serde_json::from_value(json!({"component": {"Text": {}}})).unwrap();
        assert!(matches!(
            no_id.normalize(3),
            Err(ProtocolError::MissingComponentId { index: 3 })
        ));

        let no_type: ComponentDef = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert!(matches!(
            no_type.normalize(0),
            Err(ProtocolError::MissingComponentType { .. })
        ));
    }

    #[test]
    fn legacy_names_are_aliases() {
        let message = ServerMessage::from_value(json!({
            "surfaceUpdate": {"surfaceId": "s", "components": []}
        }))
        .unwrap();
        assert_eq!(message.kind(), "updateComponents");

        let message = ServerMessage::from_value(json!({
            "dataModelUpdate": {"surfaceId": "s", "contents": []}
        }))
        .unwrap();
        assert_eq!(message.kind(), "updateDataModel");
        assert_eq!(message.surface_id(), "s");
    }

    #[test]
    fn unknown_envelope_is_a_decode_error() {
        let err = ServerMessage::from_value(json!({"launchRocket": {}})).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn encodes_user_action() {
        let event = ClientEvent::UserAction(UserAction {
            name: "book".to_string(),
            surface_id: "@default".to_string(),
            source_component_id: "submit".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            context: Map::new(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["userAction"]["name"], "book");
        assert_eq!(value["userAction"]["sourceComponentId"], "submit");
        assert_eq!(value["userAction"]["timestamp"], "2025-01-02T03:04:05Z");
    }
}
