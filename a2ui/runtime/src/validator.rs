//! Advisory protocol validation.
//!
//! Checks raw JSON messages without touching any processor state. Every
//! problem becomes one human-readable string; nothing here fails early, so a
//! single call reports everything wrong with a batch.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::catalog::Catalog;

const ENVELOPE_KEYS: [&str; 4] = [
    "beginRendering",
    "updateComponents",
    "updateDataModel",
    "deleteSurface",
];

/// Validates one message or an array of messages against the standard
/// catalog.
pub fn validate_messages(input: &Value) -> Vec<String> {
    validate_with_catalog(input, &Catalog::standard())
}

/// Like [`validate_messages`] but with a caller-supplied type allowlist.
pub fn validate_with_catalog(input: &Value, catalog: &Catalog) -> Vec<String> {
    let messages = match input {
        Value::Array(messages) => messages.as_slice(),
        single => std::slice::from_ref(single),
    };

    let mut errors = Vec::new();
    for (index, message) in messages.iter().enumerate() {
        let mut report = Report {
            prefix: format!("[Message {index}]"),
            errors: &mut errors,
        };
        validate_message(message, catalog, &mut report);
    }
    errors
}

struct Report<'e> {
    prefix: String,
    errors: &'e mut Vec<String>,
}

impl Report<'_> {
    fn push(&mut self, message: impl AsRef<str>) {
        self.errors
            .push(format!("{} {}", self.prefix, message.as_ref()));
    }
}

fn validate_message(message: &Value, catalog: &Catalog, report: &mut Report<'_>) {
    let Some(envelope) = message.as_object() else {
        report.push("A2UI Protocol message must be a JSON object.");
        return;
    };

    let present: Vec<&str> = ENVELOPE_KEYS
        .iter()
        .copied()
        .filter(|key| envelope.contains_key(*key))
        .collect();
    for key in envelope.keys() {
        if !ENVELOPE_KEYS.contains(&key.as_str()) {
            report.push(format!("A2UI Protocol message has unexpected property: {key}"));
        }
    }

    match present.as_slice() {
        [] => report.push(format!(
            "A2UI Protocol message must have one of: {}.",
            ENVELOPE_KEYS.join(", ")
        )),
        [kind] => {
            let body = &envelope[*kind];
            match *kind {
                "beginRendering" => validate_begin_rendering(body, report),
                "updateComponents" => validate_update_components(body, catalog, report),
                "updateDataModel" => validate_update_data_model(body, report),
                _ => validate_delete_surface(body, report),
            }
        }
        many => report.push(format!(
            "A2UI Protocol message must have exactly one of: {}. Found: {}",
            ENVELOPE_KEYS.join(", "),
            many.join(", ")
        )),
    }
}

/// Shared envelope body checks: object shape, allowed keys, string fields.
fn body<'v>(
    name: &str,
    value: &'v Value,
    allowed: &[&str],
    report: &mut Report<'_>,
) -> Option<&'v Map<String, Value>> {
    let Some(body) = value.as_object() else {
        report.push(format!("{name} must be an object."));
        return None;
    };
    for key in body.keys() {
        if !allowed.contains(&key.as_str()) {
            report.push(format!("{name} has unexpected property: {key}"));
        }
    }
    Some(body)
}

fn require_string(name: &str, body: &Map<String, Value>, field: &str, report: &mut Report<'_>) {
    match body.get(field) {
        None => report.push(format!("{name} must have a '{field}' property.")),
        Some(Value::String(_)) => {}
        Some(_) => report.push(format!("{name} '{field}' property must be a string.")),
    }
}

fn validate_begin_rendering(value: &Value, report: &mut Report<'_>) {
    const NAME: &str = "BeginRendering";
    let Some(body) = body(NAME, value, &["surfaceId", "root", "styles"], report) else {
        return;
    };
    require_string(NAME, body, "surfaceId", report);
    require_string(NAME, body, "root", report);
    if body.get("styles").is_some_and(|styles| !styles.is_object()) {
        report.push(format!("{NAME} 'styles' property must be an object."));
    }
}

fn validate_delete_surface(value: &Value, report: &mut Report<'_>) {
    const NAME: &str = "DeleteSurface";
    if let Some(body) = body(NAME, value, &["surfaceId"], report) {
        require_string(NAME, body, "surfaceId", report);
    }
}

/// `contents` must be an object when it targets the model root; below the
/// root any JSON value is a valid replacement.
fn validate_update_data_model(value: &Value, report: &mut Report<'_>) {
    const NAME: &str = "updateDataModel";
    let Some(body) = body(NAME, value, &["surfaceId", "path", "contents"], report) else {
        return;
    };
    require_string(NAME, body, "surfaceId", report);

    let path = match body.get("path") {
        None => None,
        Some(Value::String(path)) => Some(path.as_str()),
        Some(_) => {
            report.push(format!("{NAME} 'path' property must be a string."));
            None
        }
    };
    let targets_root = path.is_none_or(|path| path.is_empty() || path == "/");

    match body.get("contents") {
        None => report.push(format!("{NAME} must have a 'contents' property.")),
        Some(contents) if targets_root && !contents.is_object() => {
            report.push(format!("{NAME} 'contents' property must be an object."))
        }
        Some(_) => {}
    }
}

fn validate_update_components(value: &Value, catalog: &Catalog, report: &mut Report<'_>) {
    const NAME: &str = "UpdateComponents";
    let Some(body) = body(NAME, value, &["surfaceId", "catalogId", "components"], report) else {
        return;
    };
    require_string(NAME, body, "surfaceId", report);
    if body.get("catalogId").is_some_and(|id| !id.is_string()) {
        report.push(format!("{NAME} 'catalogId' property must be a string."));
    }

    let Some(components) = body.get("components").and_then(Value::as_array) else {
        report.push(format!("{NAME} must have a 'components' array."));
        return;
    };

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for component in components {
        if let Some(id) = component.get("id").and_then(Value::as_str) {
            let count = seen.entry(id).or_default();
            *count += 1;
            if *count > 1 {
                report.push(format!("Duplicate component ID found: {id}"));
            }
        }
    }
    let ids: HashSet<&str> = seen.into_keys().collect();

    for component in components {
        ComponentCheck::run(component, &ids, catalog, report);
    }
}

struct ComponentCheck<'a, 'r, 'e> {
    id: &'a str,
    component_type: &'a str,
    properties: Map<String, Value>,
    ids: &'a HashSet<&'a str>,
    report: &'r mut Report<'e>,
}

impl<'a, 'r, 'e> ComponentCheck<'a, 'r, 'e> {
    fn run(
        component: &'a Value,
        ids: &'a HashSet<&'a str>,
        catalog: &Catalog,
        report: &'r mut Report<'e>,
    ) {
        let Some(id) = component
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            report.push("Component is missing an 'id'.");
            return;
        };
        let Some((component_type, properties)) = type_and_properties(component) else {
            report.push(format!("Component '{id}' is missing a component type."));
            return;
        };

        let Some(descriptor) = catalog.get(component_type) else {
            report.push(format!(
                "Unknown component type '{component_type}' in component '{id}'."
            ));
            return;
        };

        let mut check = ComponentCheck {
            id,
            component_type,
            properties,
            ids,
            report,
        };
        for name in &descriptor.required {
            check.require(name);
        }
        for (name, _) in &descriptor.bound {
            if name == "selections" {
                continue;
            }
            check.bound_property(name);
        }
        check.type_specific();
    }

    fn require(&mut self, name: &str) {
        if !self.properties.contains_key(name) {
            self.missing(name);
        }
    }

    fn missing(&mut self, name: &str) {
        self.report.push(format!(
            "Component '{}' of type '{}' is missing required property '{}'.",
            self.id, self.component_type, name
        ));
    }

    fn bound_property(&mut self, name: &str) {
        if let Some(value) = self.properties.get(name).filter(|value| !value.is_null()) {
            if let Some(problem) = bound_value_problem(value) {
                self.bound_error(name, &problem);
            }
        }
    }

    fn bound_error(&mut self, name: &str, problem: &str) {
        self.report.push(format!(
            "Component '{}' of type '{}' property '{}' {}",
            self.id, self.component_type, name, problem
        ));
    }

    fn reference(&mut self, target: Option<&Value>) {
        let Some(target) = target.and_then(Value::as_str) else {
            return;
        };
        if !self.ids.contains(target) {
            self.report.push(format!(
                "Component '{}' references non-existent component ID '{}'.",
                self.id, target
            ));
        }
    }

    fn type_specific(&mut self) {
        let properties = std::mem::take(&mut self.properties);
        let component_type = self.component_type;
        match component_type {
            "MultipleChoice" => self.multiple_choice(&properties),
            "Row" | "Column" | "List" => self.children(properties.get("children")),
            "Card" => self.reference(properties.get("child")),
            "Tabs" => self.tabs(properties.get("tabItems")),
            "Modal" => {
                self.reference(properties.get("entryPointChild"));
                self.reference(properties.get("contentChild"));
            }
            "Button" => {
                self.reference(properties.get("child"));
                if let Some(action) = properties.get("action") {
                    let named = action
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| !name.is_empty());
                    if !named {
                        self.missing("action.name");
                    }
                }
            }
            _ => {}
        }
        self.properties = properties;
    }

    fn multiple_choice(&mut self, properties: &Map<String, Value>) {
        if let Some(selections) = properties.get("selections") {
            let valid = match selections {
                Value::Array(_) => true,
                Value::Object(map) => map.get("path").is_some_and(Value::is_string),
                _ => false,
            };
            if !valid {
                self.bound_error(
                    "selections",
                    "must be an array of strings or an object with 'path'.",
                );
            }
        }

        let Some(options) = properties.get("options").and_then(Value::as_array) else {
            return;
        };
        for (index, option) in options.iter().enumerate() {
            match option.get("label") {
                Some(label) if !label.is_null() => {
                    if let Some(problem) = bound_value_problem(label) {
                        self.bound_error("label", &problem);
                    }
                }
                _ => self.report.push(format!(
                    "Component '{}' option at index {index} missing 'label'.",
                    self.id
                )),
            }
            if option.get("value").is_none_or(Value::is_null) {
                self.report.push(format!(
                    "Component '{}' option at index {index} missing 'value'.",
                    self.id
                ));
            }
        }
    }

    /// Accepts an id array, `{ explicitList: [..] }`, a `{ componentId, path }`
    /// template or the legacy `{ template: { componentId, dataBinding } }`.
    fn children(&mut self, children: Option<&Value>) {
        match children {
            None => {}
            Some(Value::Array(items)) => self.references(items),
            Some(Value::Object(list)) if list.contains_key("explicitList") => {
                match list.get("explicitList") {
                    Some(Value::Array(items)) => self.references(items),
                    _ => self.report.push(format!(
                        "Component '{}' explicitList must be an array of strings.",
                        self.id
                    )),
                }
            }
            Some(Value::Object(list)) if list.contains_key("template") => {
                let template = list.get("template").and_then(Value::as_object);
                let component_id = template
                    .and_then(|template| template.get("componentId"))
                    .filter(|v| v.is_string());
                let binding = template
                    .and_then(|template| template.get("dataBinding"))
                    .filter(|v| v.is_string());
                if component_id.is_none() || binding.is_none() {
                    self.report.push(format!(
                        "Component '{}' children template must have 'componentId' and 'dataBinding'.",
                        self.id
                    ));
                }
                self.reference(component_id);
            }
            Some(Value::Object(template)) => {
                let component_id = template.get("componentId").filter(|v| v.is_string());
                let path = template.get("path").filter(|v| v.is_string());
                if component_id.is_none() || path.is_none() {
                    self.report.push(format!(
                        "Component '{}' children template must have 'componentId' and 'path'.",
                        self.id
                    ));
                }
                self.reference(component_id);
            }
            Some(_) => self.report.push(format!(
                "Component '{}' children must be an array of strings or a template object.",
                self.id
            )),
        }
    }

    fn references(&mut self, items: &[Value]) {
        for item in items {
            self.reference(Some(item));
        }
    }

    fn tabs(&mut self, tab_items: Option<&Value>) {
        let Some(tab_items) = tab_items.and_then(Value::as_array) else {
            return;
        };
        for tab in tab_items {
            let title = tab.get("title").filter(|title| !title.is_null());
            if title.is_none() {
                self.report.push(format!(
                    "Tab item in component '{}' is missing a 'title'.",
                    self.id
                ));
            }
            if tab.get("child").is_none_or(Value::is_null) {
                self.report.push(format!(
                    "Tab item in component '{}' is missing a 'child'.",
                    self.id
                ));
            }
            self.reference(tab.get("child"));
            if let Some(problem) = title.and_then(bound_value_problem) {
                self.bound_error("title", &problem);
            }
        }
    }
}

/// Type name and properties for any of the three component shapes.
fn type_and_properties(component: &Value) -> Option<(&str, Map<String, Value>)> {
    match component.get("component") {
        Some(Value::Object(keyed)) if keyed.len() == 1 => {
            let (component_type, props) = keyed.iter().next()?;
            Some((
                component_type.as_str(),
                props.as_object().cloned().unwrap_or_default(),
            ))
        }
        Some(Value::String(component_type)) => {
            let mut properties = component.as_object()?.clone();
            for key in ["id", "component", "weight"] {
                properties.remove(key);
            }
            Some((component_type.as_str(), properties))
        }
        _ => {
            let props = component.get("props")?.as_object()?;
            let component_type = props.get("component")?.as_str()?;
            let mut properties = props.clone();
            properties.remove("component");
            Some((component_type, properties))
        }
    }
}

/// Literals pass; objects must be exactly `{ path }`.
fn bound_value_problem(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Array(_) => None,
        Value::Null => Some("must be a primitive or an object.".to_string()),
        Value::Object(map) => {
            if map.len() == 1 && map.contains_key("path") {
                None
            } else {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                Some(format!(
                    "object must have exactly one key: 'path'. Found: {}",
                    keys.join(", ")
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn components(components: Value) -> Vec<String> {
        validate_messages(&json!({
            "updateComponents": {"surfaceId": "main", "components": components}
        }))
    }

    #[test]
    fn valid_batch_has_no_errors() {
        let errors = components(json!([
            {"id": "root", "component": {"Column": {"children": ["title", "go"]}}},
            {"id": "title", "component": {"Text": {"text": {"path": "/title"}, "usageHint": "h1"}}},
            {"id": "go", "component": {"Button": {"child": "label", "action": {"name": "submit"}}}},
            {"id": "label", "component": {"Text": {"text": "Go"}}}
        ]));
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn all_component_shapes_are_checked() {
        let errors = components(json!([
            {"id": "a", "props": {"component": "Text"}},
            {"id": "b", "component": "Image"},
            {"id": "c", "component": {"Icon": {}}}
        ]));
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("'a' of type 'Text' is missing required property 'text'"));
        assert!(errors[1].contains("'b' of type 'Image' is missing required property 'url'"));
        assert!(errors[2].contains("'c' of type 'Icon' is missing required property 'name'"));
    }

    #[test]
    fn one_duplicate_error_per_excess_occurrence() {
        let errors = components(json!([
            {"id": "x", "component": {"Divider": {}}},
            {"id": "x", "component": {"Divider": {}}},
            {"id": "x", "component": {"Divider": {}}},
            {"id": "y", "component": {"Divider": {}}}
        ]));
        let duplicates: Vec<_> = errors
            .iter()
            .filter(|err| err.contains("Duplicate component ID found: x"))
            .collect();
        assert_eq!(duplicates.len(), 2);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn button_without_action_name() {
        let errors = components(json!([
            {"id": "b", "component": {"Button": {"child": "t", "action": {}}}},
            {"id": "t", "component": {"Text": {"text": "ok"}}}
        ]));
        assert_eq!(
            errors,
            vec![
                "[Message 0] Component 'b' of type 'Button' is missing required property 'action.name'."
                    .to_string()
            ]
        );
    }

    #[test]
    fn explicit_list_and_legacy_template_children() {
        let errors = components(json!([
            {"id": "root", "component": {"Column": {"children": {"explicitList": ["head", "gone"]}}}},
            {"id": "head", "component": {"Text": {"text": "Rows"}}},
            {"id": "rows", "component": {"List": {"children": {
                "template": {"componentId": "head", "dataBinding": "/rows"}
            }}}},
            {"id": "bad", "component": {"Row": {"children": {"template": {"componentId": "head"}}}}}
        ]));
        assert_eq!(
            errors,
            vec![
                "[Message 0] Component 'root' references non-existent component ID 'gone'.".to_string(),
                "[Message 0] Component 'bad' children template must have 'componentId' and 'dataBinding'."
                    .to_string(),
            ]
        );
    }

    #[test]
    fn dangling_references_are_reported() {
        let errors = components(json!([
            {"id": "card", "component": {"Card": {"child": "ghost"}}},
            {"id": "tabs", "component": {"Tabs": {"tabItems": [{"title": "A", "child": "nope"}]}}},
            {"id": "modal", "component": {"Modal": {"entryPointChild": "card", "contentChild": "gone"}}}
        ]));
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Component 'card' references non-existent component ID 'ghost'"));
        assert!(errors[1].contains("'nope'"));
        assert!(errors[2].contains("'gone'"));
    }

    #[test]
    fn bound_values_must_be_path_only() {
        let errors = components(json!([
            {"id": "t", "component": {"Text": {"text": {"path": "/a", "literalString": "x"}}}},
            {"id": "c", "component": {"CheckBox": {"label": "ok", "value": {"path": "/on"}}}}
        ]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("property 'text' object must have exactly one key: 'path'"));
    }

    #[test]
    fn unknown_types_are_errors() {
        let errors = components(json!([
            {"id": "x", "component": {"Hologram": {}}},
            {"id": "m", "component": {"McpUi": {"resource": {}}}}
        ]));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Unknown component type 'Hologram' in component 'x'"));

        let errors = validate_with_catalog(
            &json!({"updateComponents": {"surfaceId": "s", "components": [
                {"id": "m", "component": {"McpUi": {"resource": {"uri": "ui://x"}}}}
            ]}}),
            &Catalog::with_extensions(),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn list_templates_and_choices() {
        let errors = components(json!([
            {"id": "list", "component": {"List": {"children": {"componentId": "row"}}}},
            {"id": "row", "component": {"Text": {"text": {"path": "name"}}}},
            {"id": "bad", "component": {"Row": {"children": "row"}}},
            {"id": "pick", "component": {"MultipleChoice": {
                "selections": {"literalArray": []},
                "options": [{"label": "A", "value": "a"}, {"value": "b"}]
            }}}
        ]));
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("children template must have 'componentId' and 'path'"));
        assert!(errors[1].contains("children must be an array of strings or a template object"));
        assert!(errors[2].contains("'selections' must be an array of strings or an object with 'path'"));
        assert!(errors[3].contains("option at index 1 missing 'label'"));
    }

    #[test]
    fn envelope_structure() {
        let errors = validate_messages(&json!([
            {"launch": {}},
            {"deleteSurface": {"surfaceId": "s", "force": true}},
            {"updateDataModel": {"surfaceId": "s", "contents": [1, 2]}},
            {"updateDataModel": {"surfaceId": "s", "path": "/n", "contents": 3}},
            {"beginRendering": {"root": "root"}},
            {"updateComponents": {"surfaceId": "s"}},
            "text"
        ]));

        assert_eq!(
            errors,
            vec![
                "[Message 0] A2UI Protocol message has unexpected property: launch",
                "[Message 0] A2UI Protocol message must have one of: beginRendering, updateComponents, updateDataModel, deleteSurface.",
                "[Message 1] DeleteSurface has unexpected property: force",
                "[Message 2] updateDataModel 'contents' property must be an object.",
                "[Message 4] BeginRendering must have a 'surfaceId' property.",
                "[Message 5] UpdateComponents must have a 'components' array.",
                "[Message 6] A2UI Protocol message must be a JSON object.",
            ]
        );
    }

    #[test]
    fn two_envelopes_in_one_message() {
        let errors = validate_messages(&json!({
            "deleteSurface": {"surfaceId": "a"},
            "beginRendering": {"surfaceId": "a", "root": "r"}
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must have exactly one of"));
    }
}
