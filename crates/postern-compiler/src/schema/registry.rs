use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::SchemaNode;

/// One registered schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSchema {
    pub id: String,
    /// Declared type name, for named registrations.
    pub name: Option<String>,
    pub node: SchemaNode,
}

impl RegisteredSchema {
    /// Registration document: the node's JSON plus `$id`.
    pub fn document(&self) -> Value {
        let mut doc = self.node.to_json();
        if let Value::Object(obj) = &mut doc {
            obj.insert("$id".to_string(), Value::String(self.id.clone()));
        }
        doc
    }
}

/// Content-addressed schema registry for one compilation.
///
/// Anonymous nodes are keyed by [`SchemaNode::content_id`], so identical
/// shapes collapse into one entry whatever order they arrive in. Named
/// nodes are keyed by name; the first registration of a name wins.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, RegisteredSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an anonymous node; returns its content id.
    pub fn register_anonymous(&mut self, node: SchemaNode) -> String {
        let id = node.content_id();
        self.schemas
            .entry(id.clone())
            .or_insert_with(|| RegisteredSchema {
                id: id.clone(),
                name: None,
                node,
            });
        id
    }

    /// Register a named node.
    ///
    /// Returns the id to reference and whether the name was already taken
    /// by a different shape (in which case the node is registered under its
    /// content id instead).
    pub fn register_named(&mut self, name: &str, node: SchemaNode) -> (String, bool) {
        match self.schemas.get(name) {
            None => {
                self.schemas.insert(
                    name.to_string(),
                    RegisteredSchema {
                        id: name.to_string(),
                        name: Some(name.to_string()),
                        node,
                    },
                );
                (name.to_string(), false)
            }
            Some(existing) if existing.node == node => (name.to_string(), false),
            Some(_) => (self.register_anonymous(node), true),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredSchema> {
        self.schemas.get(id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Stop accepting registrations.
    pub fn freeze(self) -> FrozenRegistry {
        FrozenRegistry {
            schemas: self.schemas,
        }
    }

    /// Maximum nesting depth and total property count of `node`, following
    /// `$ref`s into the registry. Each schema is entered at most once per
    /// path, so recursive types terminate.
    pub fn measure(&self, node: &SchemaNode) -> (usize, usize) {
        let mut visiting = BTreeSet::new();
        self.measure_inner(node, 0, &mut visiting)
    }

    fn measure_inner<'a>(
        &'a self,
        node: &'a SchemaNode,
        depth: usize,
        visiting: &mut BTreeSet<&'a str>,
    ) -> (usize, usize) {
        let mut max_depth = depth;
        let mut total = 0;
        let mut visit = |child: &'a SchemaNode, visiting: &mut BTreeSet<&'a str>| {
            let (d, p) = self.measure_inner(child, depth + 1, visiting);
            max_depth = max_depth.max(d);
            total += p;
        };

        match node {
            SchemaNode::Ref(id) => {
                if let Some(target) = self.schemas.get(id.as_str()) {
                    if visiting.insert(id.as_str()) {
                        let (d, p) = self.measure_inner(&target.node, depth, visiting);
                        visiting.remove(id.as_str());
                        return (d, p);
                    }
                }
                (depth, 0)
            }
            SchemaNode::Object {
                properties,
                additional,
                ..
            } => {
                for (_, child) in properties {
                    visit(child, visiting);
                }
                if let super::Additional::Schema(child) = additional {
                    visit(child, visiting);
                }
                (max_depth, total + properties.len())
            }
            SchemaNode::Array { items, .. } => {
                visit(items, visiting);
                (max_depth, total)
            }
            SchemaNode::Union(members) => {
                for member in members {
                    visit(member, visiting);
                }
                (max_depth, total)
            }
            SchemaNode::Any | SchemaNode::Primitive(_) | SchemaNode::Const { .. } => (depth, 0),
        }
    }
}

/// A registry that no longer changes; what the emitter renders.
#[derive(Debug, Clone, Default)]
pub struct FrozenRegistry {
    schemas: BTreeMap<String, RegisteredSchema>,
}

impl FrozenRegistry {
    pub fn get(&self, id: &str) -> Option<&RegisteredSchema> {
        self.schemas.get(id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSchema> {
        self.schemas.values()
    }

    /// Dependencies first; ties (and schemas on a reference cycle) ordered
    /// by id.
    pub fn topological_order(&self) -> Vec<&RegisteredSchema> {
        let mut pending: BTreeMap<&str, BTreeSet<&str>> = self
            .schemas
            .iter()
            .map(|(id, schema)| {
                let deps = schema
                    .node
                    .references()
                    .into_iter()
                    .filter(|dep| *dep != id.as_str() && self.schemas.contains_key(*dep))
                    .collect();
                (id.as_str(), deps)
            })
            .collect();

        let mut ordered = Vec::with_capacity(self.schemas.len());
        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .collect();
            // On a cycle, release the smallest id to keep going.
            let batch = if ready.is_empty() {
                pending.keys().next().map(|id| vec![*id]).unwrap_or_default()
            } else {
                ready
            };
            for id in batch {
                pending.remove(id);
                for deps in pending.values_mut() {
                    deps.remove(id);
                }
                if let Some(schema) = self.schemas.get(id) {
                    ordered.push(schema);
                }
            }
        }
        ordered
    }

    /// Registration documents in topological order.
    pub fn documents(&self) -> Vec<Value> {
        self.topological_order()
            .into_iter()
            .map(RegisteredSchema::document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Additional;
    use crate::signature::Primitive;

    fn object(field: &str, node: SchemaNode) -> SchemaNode {
        SchemaNode::object(vec![(field.to_string(), node, false)], Additional::Forbid)
    }

    fn string() -> SchemaNode {
        SchemaNode::Primitive(Primitive::String)
    }

    #[test]
    fn identical_anonymous_nodes_collapse() {
        let mut registry = SchemaRegistry::new();
        let a = registry.register_anonymous(object("name", string()));
        let b = registry.register_anonymous(object("name", string()));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn named_first_writer_wins() {
        let mut registry = SchemaRegistry::new();
        let (id, collided) = registry.register_named("User", object("name", string()));
        assert_eq!(id, "User");
        assert!(!collided);

        let (id, collided) = registry.register_named("User", object("name", string()));
        assert_eq!(id, "User");
        assert!(!collided);

        let other = object("id", SchemaNode::Primitive(Primitive::Integer));
        let (id, collided) = registry.register_named("User", other.clone());
        assert!(collided);
        assert_eq!(id, other.content_id());
        assert_eq!(registry.get("User").unwrap().node, object("name", string()));
    }

    #[test]
    fn anonymous_duplicate_of_named_gets_own_id() {
        let mut registry = SchemaRegistry::new();
        registry.register_named("User", object("name", string()));
        let id = registry.register_anonymous(object("name", string()));
        assert_ne!(id, "User");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let mut registry = SchemaRegistry::new();
        registry.register_named("A", object("b", SchemaNode::Ref("B".into())));
        registry.register_named("B", object("c", SchemaNode::Ref("C".into())));
        registry.register_named("C", object("x", string()));
        let frozen = registry.freeze();
        let order: Vec<&str> = frozen
            .topological_order()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn topological_order_survives_cycles() {
        let mut registry = SchemaRegistry::new();
        registry.register_named("Node", object("next", SchemaNode::Ref("Node".into())));
        registry.register_named("A", object("b", SchemaNode::Ref("B".into())));
        registry.register_named("B", object("a", SchemaNode::Ref("A".into())));
        let frozen = registry.freeze();
        assert_eq!(frozen.topological_order().len(), 3);
        let docs = frozen.documents();
        assert_eq!(docs[0]["$id"], "Node");
        assert_eq!(docs[1]["$id"], "A");
        assert_eq!(docs[2]["$id"], "B");
    }

    #[test]
    fn measure_follows_refs_and_stops_on_cycles() {
        let mut registry = SchemaRegistry::new();
        registry.register_named("Node", object("next", SchemaNode::Ref("Node".into())));
        let (depth, props) = registry.measure(&SchemaNode::Ref("Node".into()));
        assert_eq!(depth, 1);
        assert_eq!(props, 1);

        let nested = object("a", object("b", object("c", string())));
        assert_eq!(registry.measure(&nested), (3, 3));
    }
}
