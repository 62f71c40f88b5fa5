//! Surfaces: a component registry, a data model and the tree view derived
//! from them.
//!
//! Components reference each other by id only. The tree is never stored; it
//! is rebuilt from the root id and the registry on every read, so components
//! may arrive in any order and a reference to a component that has not
//! arrived yet simply shows up as [`TreeChild::Dangling`] until it does.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::binding::{BoundValue, DataContext, Resolver, TemplateBinding, ValueKind};
use crate::catalog::{Catalog, ChildSlot};
use crate::config::RuntimeConfig;
use crate::data_model::DataModel;
use crate::text;

/// Root component id used when no `beginRendering` named one.
pub const DEFAULT_ROOT_ID: &str = "root";

/// One registered component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub id: String,
    pub component_type: String,
    pub properties: Map<String, Value>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Known only through data model writes.
    Uninitialized,
    Active,
}

#[derive(Debug, Clone)]
pub struct Surface {
    id: String,
    state: SurfaceState,
    root_component_id: Option<String>,
    catalog_id: Option<String>,
    styles: Option<Value>,
    components: HashMap<String, ComponentNode>,
    data_model: DataModel,
}

impl Surface {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SurfaceState::Uninitialized,
            root_component_id: None,
            catalog_id: None,
            styles: None,
            components: HashMap::new(),
            data_model: DataModel::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn root_id(&self) -> &str {
        self.root_component_id.as_deref().unwrap_or(DEFAULT_ROOT_ID)
    }

    pub fn catalog_id(&self) -> Option<&str> {
        self.catalog_id.as_deref()
    }

    pub fn styles(&self) -> Option<&Value> {
        self.styles.as_ref()
    }

    pub fn component(&self, id: &str) -> Option<&ComponentNode> {
        self.components.get(id)
    }

    pub fn components(&self) -> &HashMap<String, ComponentNode> {
        &self.components
    }

    pub fn data_model(&self) -> &DataModel {
        &self.data_model
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.data_model)
    }

    pub(crate) fn data_model_mut(&mut self) -> &mut DataModel {
        &mut self.data_model
    }

    pub(crate) fn begin_rendering(&mut self, root: String, styles: Option<Value>) {
        self.root_component_id = Some(root);
        if styles.is_some() {
            self.styles = styles;
        }
        self.state = SurfaceState::Active;
    }

    /// Inserts or fully replaces each component by id.
    pub(crate) fn upsert_components(
        &mut self,
        nodes: impl IntoIterator<Item = ComponentNode>,
        catalog_id: Option<String>,
    ) {
        for node in nodes {
            self.components.insert(node.id.clone(), node);
        }
        if catalog_id.is_some() {
            self.catalog_id = catalog_id;
        }
        self.state = SurfaceState::Active;
    }

    /// Materialises the tree below the root. `None` until the root component
    /// itself has been registered.
    pub fn component_tree(&self, catalog: &Catalog, config: &RuntimeConfig) -> Option<TreeNode> {
        let root = self.components.get(self.root_id())?;
        let mut builder = TreeBuilder {
            surface: self,
            catalog,
            resolver: self.resolver(),
            max_depth: config.max_tree_depth,
            nodes_left: config.max_tree_nodes.saturating_sub(1),
            ancestors: Vec::new(),
        };
        Some(builder.build(root, root.id.clone(), None, 0))
    }

    /// Render-ready JSON view of the tree with every bound property resolved.
    pub fn snapshot(&self, catalog: &Catalog, config: &RuntimeConfig) -> Value {
        let tree = self
            .component_tree(catalog, config)
            .map(|tree| tree.snapshot(&self.resolver(), catalog))
            .unwrap_or(Value::Null);

        json!({
            "surfaceId": self.id,
            "root": self.root_id(),
            "catalogId": self.catalog_id,
            "styles": self.styles,
            "tree": tree,
        })
    }
}

/// A materialised component, possibly a template copy.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Registry id, or `<componentId>:<item path>` for template copies.
    pub id: String,
    pub component_id: String,
    pub component_type: String,
    pub properties: Map<String, Value>,
    pub weight: Option<f64>,
    pub context: Option<DataContext>,
    pub slots: Vec<TreeSlot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeSlot {
    pub property: String,
    pub children: Vec<TreeChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChild {
    Node(TreeNode),
    /// Referenced id is not (yet) registered.
    Dangling(String),
    /// Referenced id is already an ancestor.
    Cycle(String),
    /// Nesting exceeded the configured depth.
    Truncated(String),
}

impl TreeNode {
    pub fn slot(&self, property: &str) -> Option<&TreeSlot> {
        self.slots.iter().find(|slot| slot.property == property)
    }

    /// Child nodes of a slot, skipping unresolved references.
    pub fn children_of(&self, property: &str) -> impl Iterator<Item = &TreeNode> {
        self.slot(property)
            .into_iter()
            .flat_map(|slot| slot.children.iter())
            .filter_map(|child| match child {
                TreeChild::Node(node) => Some(node),
                _ => None,
            })
    }

    pub fn resolve(&self, resolver: &Resolver<'_>, property: &str, kind: ValueKind) -> Value {
        match self.properties.get(property) {
            Some(raw) => resolver.resolve_as(raw, kind, self.context.as_ref()),
            None => kind.default_value(),
        }
    }

    pub fn snapshot(&self, resolver: &Resolver<'_>, catalog: &Catalog) -> Value {
        let mut properties = self.properties.clone();
        let descriptor = catalog.get(&self.component_type);

        for slot in descriptor.map(|d| d.child_slots.as_slice()).unwrap_or_default() {
            properties.remove(slot.property());
        }
        for (name, kind) in descriptor.map(|d| d.bound.as_slice()).unwrap_or_default() {
            properties.insert(name.clone(), self.resolve(resolver, name, *kind));
        }

        let mut out = Map::new();
        out.insert("id".to_string(), json!(self.id));
        out.insert("type".to_string(), json!(self.component_type));
        if self.id != self.component_id {
            out.insert("componentId".to_string(), json!(self.component_id));
        }
        if let Some(context) = &self.context {
            out.insert("dataContextPath".to_string(), json!(context.path));
        }
        if let Some(weight) = self.weight {
            out.insert("weight".to_string(), json!(weight));
        }
        if self.component_type == "Text" {
            let text = self.properties.get("text").and_then(|raw| {
                resolver
                    .resolve_optional(raw, self.context.as_ref())
                    .map(|value| ValueKind::String.coerce(value))
            });
            let hint = self.properties.get("usageHint").and_then(Value::as_str);
            out.insert(
                "markup".to_string(),
                json!(text::markup(text.as_ref().and_then(Value::as_str), hint)),
            );
        }
        out.insert("properties".to_string(), Value::Object(properties));

        if !self.slots.is_empty() {
            let slots: Map<String, Value> = self
                .slots
                .iter()
                .map(|slot| {
                    let children = slot
                        .children
                        .iter()
                        .map(|child| child.snapshot(resolver, catalog))
                        .collect();
                    (slot.property.clone(), Value::Array(children))
                })
                .collect();
            out.insert("slots".to_string(), Value::Object(slots));
        }

        Value::Object(out)
    }
}

impl TreeChild {
    fn snapshot(&self, resolver: &Resolver<'_>, catalog: &Catalog) -> Value {
        match self {
            TreeChild::Node(node) => node.snapshot(resolver, catalog),
            TreeChild::Dangling(id) => json!({"id": id, "status": "dangling"}),
            TreeChild::Cycle(id) => json!({"id": id, "status": "cycle"}),
            TreeChild::Truncated(id) => json!({"id": id, "status": "truncated"}),
        }
    }
}

struct TreeBuilder<'s> {
    surface: &'s Surface,
    catalog: &'s Catalog,
    resolver: Resolver<'s>,
    max_depth: usize,
    nodes_left: usize,
    ancestors: Vec<&'s str>,
}

impl<'s> TreeBuilder<'s> {
    fn build(
        &mut self,
        node: &'s ComponentNode,
        instance_id: String,
        context: Option<DataContext>,
        depth: usize,
    ) -> TreeNode {
        let mut slots = Vec::new();

        if let Some(descriptor) = self.catalog.get(&node.component_type) {
            self.ancestors.push(&node.id);
            for slot in &descriptor.child_slots {
                let children = self.build_slot(node, slot, context.as_ref(), depth);
                slots.push(TreeSlot {
                    property: slot.property().to_string(),
                    children,
                });
            }
            self.ancestors.pop();
        }

        TreeNode {
            id: instance_id,
            component_id: node.id.clone(),
            component_type: node.component_type.clone(),
            properties: node.properties.clone(),
            weight: node.weight,
            context,
            slots,
        }
    }

    fn build_slot(
        &mut self,
        node: &'s ComponentNode,
        slot: &ChildSlot,
        context: Option<&DataContext>,
        depth: usize,
    ) -> Vec<TreeChild> {
        match slot {
            ChildSlot::Single(name) => node
                .properties
                .get(name)
                .and_then(Value::as_str)
                .map(|id| vec![self.child(id, id.to_string(), context.cloned(), depth + 1)])
                .unwrap_or_default(),
            ChildSlot::List(name) => match node.properties.get(name) {
                Some(raw) => self.build_list(raw, context, depth),
                None => Vec::new(),
            },
            ChildSlot::Nested { list, field } => node
                .properties
                .get(list)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get(field.as_str()).and_then(Value::as_str))
                        .map(|id| self.child(id, id.to_string(), context.cloned(), depth + 1))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// `children` is an id array, `{ explicitList: [..] }`, a
    /// `{ componentId, path }` template or `{ template: { componentId,
    /// dataBinding } }`.
    fn build_list(
        &mut self,
        raw: &'s Value,
        context: Option<&DataContext>,
        depth: usize,
    ) -> Vec<TreeChild> {
        if let Some(ids) = raw
            .as_array()
            .or_else(|| raw.get("explicitList").and_then(Value::as_array))
        {
            return ids
                .iter()
                .filter_map(Value::as_str)
                .map(|id| self.child(id, id.to_string(), context.cloned(), depth + 1))
                .collect();
        }

        let template = match BoundValue::parse(raw) {
            BoundValue::Template(template) => Some(template),
            _ => raw.get("template").and_then(|template| {
                Some(TemplateBinding {
                    component_id: template.get("componentId")?.as_str()?,
                    path: template.get("dataBinding")?.as_str()?,
                })
            }),
        };
        let Some(template) = template else {
            return Vec::new();
        };

        let instances: Vec<_> = self.resolver.template(template, context).collect();
        instances
            .into_iter()
            .map(|instance| {
                self.child(
                    template.component_id,
                    instance.instance_id,
                    Some(instance.context),
                    depth + 1,
                )
            })
            .collect()
    }

    fn child(
        &mut self,
        component_id: &str,
        instance_id: String,
        context: Option<DataContext>,
        depth: usize,
    ) -> TreeChild {
        if self.ancestors.iter().any(|ancestor| *ancestor == component_id) {
            return TreeChild::Cycle(component_id.to_string());
        }
        if depth > self.max_depth {
            return TreeChild::Truncated(component_id.to_string());
        }

        let surface = self.surface;
        let Some(node) = surface.components.get(component_id) else {
            return TreeChild::Dangling(component_id.to_string());
        };
        if self.nodes_left == 0 {
            return TreeChild::Truncated(component_id.to_string());
        }
        self.nodes_left -= 1;
        TreeChild::Node(self.build(node, instance_id, context, depth))
    }
}
