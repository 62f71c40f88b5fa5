//! Component catalog: what the engine knows about each component type.
//!
//! The catalog is keyed by type name and open for extension, so hosts can
//! teach the engine about custom components without touching the core. The
//! descriptor says which properties reference other components (and how),
//! which properties are required, and which are bound values to resolve at
//! render time.

use std::collections::HashMap;

use crate::binding::ValueKind;

/// A property holding references to other components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSlot {
    /// One component id, e.g. `child`.
    Single(String),
    /// An id list or a `{ componentId, path }` template, e.g. `children`.
    List(String),
    /// A list of objects each referencing one component, e.g. `tabItems[].child`.
    Nested { list: String, field: String },
}

impl ChildSlot {
    pub fn single(name: &str) -> Self {
        ChildSlot::Single(name.to_string())
    }

    pub fn list(name: &str) -> Self {
        ChildSlot::List(name.to_string())
    }

    pub fn nested(list: &str, field: &str) -> Self {
        ChildSlot::Nested {
            list: list.to_string(),
            field: field.to_string(),
        }
    }

    pub fn property(&self) -> &str {
        match self {
            ChildSlot::Single(name) | ChildSlot::List(name) => name,
            ChildSlot::Nested { list, .. } => list,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub type_name: String,
    pub child_slots: Vec<ChildSlot>,
    pub required: Vec<String>,
    pub bound: Vec<(String, ValueKind)>,
}

impl ComponentDescriptor {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            child_slots: Vec::new(),
            required: Vec::new(),
            bound: Vec::new(),
        }
    }

    pub fn required<const N: usize>(mut self, names: [&str; N]) -> Self {
        self.required
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn bound(mut self, name: &str, kind: ValueKind) -> Self {
        self.bound.push((name.to_string(), kind));
        self
    }

    pub fn slot(mut self, slot: ChildSlot) -> Self {
        self.child_slots.push(slot);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, ComponentDescriptor>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard component set. This is also the validator's allowlist.
    pub fn standard() -> Self {
        use ValueKind as K;

        let mut catalog = Self::empty();
        for descriptor in [
            ComponentDescriptor::new("Text")
                .required(["text"])
                .bound("text", K::String),
            ComponentDescriptor::new("Image")
                .required(["url"])
                .bound("url", K::String),
            ComponentDescriptor::new("Video")
                .required(["url"])
                .bound("url", K::String),
            ComponentDescriptor::new("AudioPlayer")
                .required(["url"])
                .bound("url", K::String)
                .bound("description", K::String),
            ComponentDescriptor::new("TextField")
                .required(["label"])
                .bound("label", K::String)
                .bound("text", K::String),
            ComponentDescriptor::new("DateTimeInput")
                .required(["value"])
                .bound("value", K::String),
            ComponentDescriptor::new("MultipleChoice")
                .required(["selections", "options"])
                .bound("selections", K::Array),
            ComponentDescriptor::new("Slider")
                .required(["value"])
                .bound("value", K::Number),
            ComponentDescriptor::new("CheckBox")
                .required(["value", "label"])
                .bound("value", K::Boolean)
                .bound("label", K::String),
            ComponentDescriptor::new("Row")
                .required(["children"])
                .slot(ChildSlot::list("children")),
            ComponentDescriptor::new("Column")
                .required(["children"])
                .slot(ChildSlot::list("children")),
            ComponentDescriptor::new("List")
                .required(["children"])
                .slot(ChildSlot::list("children")),
            ComponentDescriptor::new("Card")
                .required(["child"])
                .slot(ChildSlot::single("child")),
            ComponentDescriptor::new("Tabs")
                .required(["tabItems"])
                .slot(ChildSlot::nested("tabItems", "child")),
            ComponentDescriptor::new("Modal")
                .required(["entryPointChild", "contentChild"])
                .slot(ChildSlot::single("entryPointChild"))
                .slot(ChildSlot::single("contentChild")),
            ComponentDescriptor::new("Button")
                .required(["child", "action"])
                .slot(ChildSlot::single("child")),
            ComponentDescriptor::new("Divider"),
            ComponentDescriptor::new("Icon")
                .required(["name"])
                .bound("name", K::String),
        ] {
            catalog.register(descriptor);
        }
        catalog
    }

    /// Standard set plus the components renderers ship beyond it.
    pub fn with_extensions() -> Self {
        let mut catalog = Self::standard();
        catalog.register(ComponentDescriptor::new("McpUi").required(["resource"]));
        catalog
    }

    /// Adds or replaces the descriptor for its type name.
    pub fn register(&mut self, descriptor: ComponentDescriptor) {
        self.entries
            .insert(descriptor.type_name.clone(), descriptor);
    }

    pub fn get(&self, type_name: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
