//! Bound property values and their resolution against a data model.
//!
//! A raw property is either a literal, a `{ path }` reference into the data
//! model, or a `{ componentId, path }` template that repeats a component for
//! every element found under `path`. Resolution never fails: gaps and
//! malformed shapes collapse to a type-appropriate default so that a render
//! pass over a partially streamed surface always succeeds.

use serde_json::{Value, map};

use crate::data_model::{self, DataModel};
use crate::pointer;

/// Reserved leading path segment naming the current template item.
pub const ITEM_ALIAS: &str = "item";

const LITERAL_KEYS: [&str; 4] = [
    "literalString",
    "literalNumber",
    "literalBoolean",
    "literalArray",
];

/// The item a component instance was stamped out for.
#[derive(Debug, Clone, PartialEq)]
pub struct DataContext {
    /// Absolute data model path of the item, e.g. `/items/1`.
    pub path: String,
    pub item: Value,
}

impl DataContext {
    pub fn new(path: impl Into<String>, item: Value) -> Self {
        Self {
            path: path.into(),
            item,
        }
    }

    /// Context anchored at `path` with the item read from `model`.
    pub fn at(model: &DataModel, path: &str) -> Self {
        let path = pointer::join("/", path);
        let item = model.get(&path).cloned().unwrap_or(Value::Null);
        Self { path, item }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Any,
}

impl ValueKind {
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::String => Value::String(String::new()),
            ValueKind::Number => Value::from(0),
            ValueKind::Boolean => Value::Bool(false),
            ValueKind::Array => Value::Array(Vec::new()),
            ValueKind::Any => Value::Null,
        }
    }

    /// Coerces a resolved value into this kind, falling back to the default.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (ValueKind::Any, value) => value,
            (ValueKind::String, Value::String(text)) => Value::String(text),
            (ValueKind::String, Value::Number(number)) => Value::String(number.to_string()),
            (ValueKind::String, Value::Bool(flag)) => Value::String(flag.to_string()),
            (ValueKind::Number, Value::Number(number)) => Value::Number(number),
            (ValueKind::Number, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| self.default_value()),
            (ValueKind::Boolean, Value::Bool(flag)) => Value::Bool(flag),
            (ValueKind::Array, Value::Array(items)) => Value::Array(items),
            (kind, _) => kind.default_value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateBinding<'a> {
    pub component_id: &'a str,
    pub path: &'a str,
}

/// Classification of a raw property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundValue<'a> {
    Literal(&'a Value),
    Path(&'a str),
    Template(TemplateBinding<'a>),
    Malformed,
}

impl<'a> BoundValue<'a> {
    pub fn parse(raw: &'a Value) -> Self {
        match raw {
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Array(_) => {
                BoundValue::Literal(raw)
            }
            Value::Null => BoundValue::Malformed,
            Value::Object(map) => {
                let path = map.get("path").and_then(Value::as_str);
                let component_id = map.get("componentId").and_then(Value::as_str);

                match (map.len(), path, component_id) {
                    (1, Some(path), None) => BoundValue::Path(path),
                    (2, Some(path), Some(component_id)) => {
                        BoundValue::Template(TemplateBinding { component_id, path })
                    }
                    (1, None, None) => LITERAL_KEYS
                        .iter()
                        .find_map(|key| map.get(*key))
                        .map(BoundValue::Literal)
                        .unwrap_or(BoundValue::Malformed),
                    _ => BoundValue::Malformed,
                }
            }
        }
    }
}

/// Outcome of resolving one bound value.
#[derive(Debug, Clone)]
pub enum Resolved<'r> {
    Value(Value),
    Template(TemplateInstances<'r>),
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    model: &'a DataModel,
}

impl<'a> Resolver<'a> {
    pub fn new(model: &'a DataModel) -> Self {
        Self { model }
    }

    pub fn resolve<'r>(&self, raw: &'r Value, ctx: Option<&'r DataContext>) -> Resolved<'r>
    where
        'a: 'r,
    {
        match BoundValue::parse(raw) {
            BoundValue::Literal(value) => Resolved::Value(value.clone()),
            BoundValue::Path(path) => {
                Resolved::Value(self.lookup(path, ctx).cloned().unwrap_or(Value::Null))
            }
            BoundValue::Template(template) => Resolved::Template(self.template(template, ctx)),
            BoundValue::Malformed => Resolved::Value(Value::Null),
        }
    }

    /// Resolves to a concrete value, `None` on any gap.
    pub fn resolve_optional(&self, raw: &Value, ctx: Option<&DataContext>) -> Option<Value> {
        match BoundValue::parse(raw) {
            BoundValue::Literal(value) => Some(value.clone()),
            BoundValue::Path(path) => self.lookup(path, ctx).filter(|v| !v.is_null()).cloned(),
            BoundValue::Template(_) | BoundValue::Malformed => None,
        }
    }

    pub fn resolve_as(&self, raw: &Value, kind: ValueKind, ctx: Option<&DataContext>) -> Value {
        match self.resolve_optional(raw, ctx) {
            Some(value) => kind.coerce(value),
            None => kind.default_value(),
        }
    }

    pub fn resolve_string(&self, raw: &Value, ctx: Option<&DataContext>) -> String {
        match self.resolve_as(raw, ValueKind::String, ctx) {
            Value::String(text) => text,
            _ => String::new(),
        }
    }

    pub fn resolve_number(&self, raw: &Value, ctx: Option<&DataContext>) -> f64 {
        self.resolve_as(raw, ValueKind::Number, ctx)
            .as_f64()
            .unwrap_or(0.0)
    }

    pub fn resolve_bool(&self, raw: &Value, ctx: Option<&DataContext>) -> bool {
        self.resolve_as(raw, ValueKind::Boolean, ctx)
            .as_bool()
            .unwrap_or(false)
    }

    /// Looks a path up, honouring the item alias and relative paths.
    pub fn lookup<'r>(&self, path: &str, ctx: Option<&'r DataContext>) -> Option<&'r Value>
    where
        'a: 'r,
    {
        if let (Some(ctx), Some(rest)) = (ctx, strip_item_alias(path)) {
            return data_model::lookup(&ctx.item, rest);
        }
        let model: &'r DataModel = self.model;
        model.get(&absolute_path(path, ctx))
    }

    /// Expands a template against the live collection under its path. The
    /// returned iterator borrows the model, so it always reflects the current
    /// contents and can be cloned to restart.
    pub fn template<'r>(
        &self,
        template: TemplateBinding<'r>,
        ctx: Option<&DataContext>,
    ) -> TemplateInstances<'r>
    where
        'a: 'r,
    {
        let base_path = absolute_path(template.path, ctx);
        let model: &'r DataModel = self.model;
        let entries = match model.get(&base_path) {
            Some(Value::Array(items)) => Entries::Array(items.iter().enumerate()),
            Some(Value::Object(map)) => Entries::Object(map.iter()),
            _ => Entries::Empty,
        };

        TemplateInstances {
            component_id: template.component_id,
            base_path,
            entries,
        }
    }
}

fn strip_item_alias(path: &str) -> Option<&str> {
    let path = path.trim_start_matches("./");
    if path == ITEM_ALIAS {
        Some("")
    } else {
        path.strip_prefix(ITEM_ALIAS)?.strip_prefix('/')
    }
}

/// Absolute data path for `path` seen from `ctx`.
pub fn absolute_path(path: &str, ctx: Option<&DataContext>) -> String {
    let base = ctx.map(|ctx| ctx.path.as_str()).unwrap_or("/");
    match strip_item_alias(path) {
        Some(rest) => pointer::join(base, if rest.is_empty() { "." } else { rest }),
        None => pointer::join(base, path),
    }
}

/// One component stamped out by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInstance {
    pub component_id: String,
    /// Unique id of the stamped copy: `<componentId>:<item path>`.
    pub instance_id: String,
    pub context: DataContext,
}

#[derive(Debug, Clone)]
enum Entries<'r> {
    Array(std::iter::Enumerate<std::slice::Iter<'r, Value>>),
    Object(map::Iter<'r>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct TemplateInstances<'r> {
    component_id: &'r str,
    base_path: String,
    entries: Entries<'r>,
}

impl Iterator for TemplateInstances<'_> {
    type Item = TemplateInstance;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match &mut self.entries {
            Entries::Array(items) => {
                let (index, value) = items.next()?;
                (index.to_string(), value)
            }
            Entries::Object(map) => {
                let (key, value) = map.next()?;
                (key.clone(), value)
            }
            Entries::Empty => return None,
        };

        let path = pointer::child(&self.base_path, &key);
        Some(TemplateInstance {
            component_id: self.component_id.to_string(),
            instance_id: format!("{}:{}", self.component_id, path),
            context: DataContext::new(path, value.clone()),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.entries {
            Entries::Array(items) => items.size_hint(),
            Entries::Object(map) => map.size_hint(),
            Entries::Empty => (0, Some(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model(contents: Value) -> DataModel {
        let mut model = DataModel::new();
        model.merge("/", contents).unwrap();
        model
    }

    #[test]
    fn classifies_shapes() {
        assert_eq!(BoundValue::parse(&json!("x")), BoundValue::Literal(&json!("x")));
        assert_eq!(BoundValue::parse(&json!([1])), BoundValue::Literal(&json!([1])));
        assert_eq!(BoundValue::parse(&json!({"path": "/a"})), BoundValue::Path("/a"));
        assert_eq!(
            BoundValue::parse(&json!({"componentId": "row", "path": "/items"})),
            BoundValue::Template(TemplateBinding {
                component_id: "row",
                path: "/items"
            })
        );
        assert_eq!(
            BoundValue::parse(&json!({"literalString": "hi"})),
            BoundValue::Literal(&json!("hi"))
        );
        assert_eq!(
            BoundValue::parse(&json!({"path": "/a", "extra": 1})),
            BoundValue::Malformed
        );
        assert_eq!(BoundValue::parse(&json!({})), BoundValue::Malformed);
        assert_eq!(BoundValue::parse(&Value::Null), BoundValue::Malformed);
    }

    #[test]
    fn literals_resolve_unchanged() {
        let model = DataModel::new();
        let resolver = Resolver::new(&model);
        for literal in [json!("text"), json!(4.5), json!(true), json!(["a", "b"])] {
            match resolver.resolve(&literal, None) {
                Resolved::Value(value) => assert_eq!(value, literal),
                Resolved::Template(_) => panic!("literal resolved as template"),
            }
        }
    }

    #[test]
    fn unset_paths_resolve_to_kind_defaults() {
        let model = DataModel::new();
        let resolver = Resolver::new(&model);
        let raw = json!({"path": "/x"});

        assert_eq!(resolver.resolve_as(&raw, ValueKind::String, None), json!(""));
        assert_eq!(resolver.resolve_as(&raw, ValueKind::Boolean, None), json!(false));
        assert_eq!(resolver.resolve_as(&raw, ValueKind::Number, None), json!(0));
        assert_eq!(resolver.resolve_as(&raw, ValueKind::Array, None), json!([]));
        assert_eq!(resolver.resolve_string(&raw, None), "");
        assert_eq!(resolver.resolve_optional(&raw, None), None);
    }

    #[test]
    fn malformed_shapes_use_defaults() {
        let model = model(json!({"x": "set"}));
        let resolver = Resolver::new(&model);
        let raw = json!({"path": "/x", "literalString": "fallback"});
        assert_eq!(resolver.resolve_string(&raw, None), "");
    }

    #[test]
    fn path_values_are_coerced_for_text() {
        let model = model(json!({"count": 3, "on": true}));
        let resolver = Resolver::new(&model);
        assert_eq!(resolver.resolve_string(&json!({"path": "/count"}), None), "3");
        assert_eq!(resolver.resolve_string(&json!({"path": "/on"}), None), "true");
        assert!(resolver.resolve_bool(&json!({"path": "/on"}), None));
        assert_eq!(resolver.resolve_number(&json!({"path": "/count"}), None), 3.0);
    }

    #[test]
    fn relative_and_item_paths_use_context() {
        let model = model(json!({"items": [{"v": 1}, {"v": 2}]}));
        let resolver = Resolver::new(&model);
        let ctx = DataContext::at(&model, "/items/1");

        assert_eq!(resolver.lookup("v", Some(&ctx)), Some(&json!(2)));
        assert_eq!(resolver.lookup("./v", Some(&ctx)), Some(&json!(2)));
        assert_eq!(resolver.lookup("item/v", Some(&ctx)), Some(&json!(2)));
        assert_eq!(resolver.lookup("item", Some(&ctx)), Some(&json!({"v": 2})));
        assert_eq!(resolver.lookup("/items/0/v", Some(&ctx)), Some(&json!(1)));
        assert_eq!(resolver.lookup("v", None), None);
    }

    #[test]
    fn template_over_array_yields_one_instance_per_element() {
        let model = model(json!({"items": [{"v": 1}, {"v": 2}, {"v": 3}]}));
        let resolver = Resolver::new(&model);
        let raw = json!({"componentId": "T", "path": "/items"});

        let Resolved::Template(instances) = resolver.resolve(&raw, None) else {
            panic!("expected template");
        };
        let instances: Vec<_> = instances.collect();

        assert_eq!(instances.len(), 3);
        for (index, instance) in instances.iter().enumerate() {
            assert_eq!(instance.component_id, "T");
            assert_eq!(instance.context.path, format!("/items/{index}"));
            assert_eq!(instance.context.item, json!({"v": index + 1}));
            assert_eq!(instance.instance_id, format!("T:/items/{index}"));
        }
    }

    #[test]
    fn template_over_object_follows_insertion_order() {
        let model = model(json!({"people": {"zed": {"n": "Z"}, "amy": {"n": "A"}}}));
        let resolver = Resolver::new(&model);
        let template = TemplateBinding {
            component_id: "card",
            path: "/people",
        };

        let paths: Vec<_> = resolver
            .template(template, None)
            .map(|instance| instance.context.path)
            .collect();
        assert_eq!(paths, vec!["/people/zed", "/people/amy"]);
    }

    #[test]
    fn template_is_recomputed_from_live_data() {
        let mut model = model(json!({"items": [1]}));
        let template = TemplateBinding {
            component_id: "T",
            path: "/items",
        };

        assert_eq!(Resolver::new(&model).template(template, None).count(), 1);
        model.set("/items", json!([1, 2, 3, 4])).unwrap();
        assert_eq!(Resolver::new(&model).template(template, None).count(), 4);
        model.set("/items", json!("not a list")).unwrap();
        assert_eq!(Resolver::new(&model).template(template, None).count(), 0);
    }

    #[test]
    fn nested_template_paths_are_relative_to_item() {
        let model = model(json!({"groups": [{"members": ["a", "b"]}]}));
        let resolver = Resolver::new(&model);
        let ctx = DataContext::at(&model, "/groups/0");
        let template = TemplateBinding {
            component_id: "member",
            path: "members",
        };

        let instances: Vec<_> = resolver.template(template, Some(&ctx)).collect();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].context.path, "/groups/0/members/1");
        assert_eq!(instances[1].context.item, json!("b"));
    }
}
