//! Schema synthesis.
//!
//! Type expressions are lowered into [`SchemaNode`]s. Objects and named
//! types are registered in a content-addressed [`SchemaRegistry`] and
//! referenced by `$ref`; everything else is inlined.

mod registry;
mod synth;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::signature::Primitive;

pub use registry::{FrozenRegistry, RegisteredSchema, SchemaRegistry};
pub use synth::{SchemaError, SchemaSynthesizer, SynthOptions};

/// Structural schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Any,
    Primitive(Primitive),
    Const {
        primitive: Primitive,
        value: Value,
    },
    Array {
        items: Box<SchemaNode>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        /// Declaration order; the canonical JSON sorts keys anyway.
        properties: Vec<(String, SchemaNode)>,
        /// Sorted.
        required: Vec<String>,
        additional: Additional,
    },
    Union(Vec<SchemaNode>),
    Ref(String),
}

/// `additionalProperties` of an object node.
#[derive(Debug, Clone, PartialEq)]
pub enum Additional {
    Forbid,
    Allow,
    Schema(Box<SchemaNode>),
}

impl SchemaNode {
    /// Object node from `(name, schema, optional)` triples.
    pub fn object(fields: Vec<(String, SchemaNode, bool)>, additional: Additional) -> Self {
        let mut required: Vec<String> = fields
            .iter()
            .filter(|(_, _, optional)| !optional)
            .map(|(name, _, _)| name.clone())
            .collect();
        required.sort();
        required.dedup();
        SchemaNode::Object {
            properties: fields
                .into_iter()
                .map(|(name, node, _)| (name, node))
                .collect(),
            required,
            additional,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, SchemaNode::Object { .. })
    }

    /// JSON-Schema rendering. Object keys are sorted (serde_json's default
    /// map), which makes the output canonical.
    pub fn to_json(&self) -> Value {
        match self {
            SchemaNode::Any => json!({}),
            SchemaNode::Primitive(p) => json!({ "type": p.as_str() }),
            SchemaNode::Const { primitive, value } => {
                json!({ "type": primitive.as_str(), "const": value })
            }
            SchemaNode::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut obj = Map::new();
                obj.insert("type".into(), json!("array"));
                obj.insert("items".into(), items.to_json());
                if let Some(min) = min_items {
                    obj.insert("minItems".into(), json!(min));
                }
                if let Some(max) = max_items {
                    obj.insert("maxItems".into(), json!(max));
                }
                Value::Object(obj)
            }
            SchemaNode::Object {
                properties,
                required,
                additional,
            } => {
                let mut obj = Map::new();
                obj.insert("type".into(), json!("object"));
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, node)| (name.clone(), node.to_json()))
                    .collect();
                obj.insert("properties".into(), Value::Object(props));
                if !required.is_empty() {
                    obj.insert("required".into(), json!(required));
                }
                let additional = match additional {
                    Additional::Forbid => json!(false),
                    Additional::Allow => json!(true),
                    Additional::Schema(node) => node.to_json(),
                };
                obj.insert("additionalProperties".into(), additional);
                Value::Object(obj)
            }
            SchemaNode::Union(members) => {
                json!({ "anyOf": members.iter().map(SchemaNode::to_json).collect::<Vec<_>>() })
            }
            SchemaNode::Ref(id) => json!({ "$ref": id }),
        }
    }

    /// `def-` + the first 16 hex chars of the SHA-256 of the canonical JSON.
    pub fn content_id(&self) -> String {
        let canonical = self.to_json().to_string();
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        format!("def-{}", &digest[..16])
    }

    /// Ids of every schema this node references directly.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SchemaNode::Ref(id) => out.push(id),
            SchemaNode::Array { items, .. } => items.collect_refs(out),
            SchemaNode::Object {
                properties,
                additional,
                ..
            } => {
                for (_, node) in properties {
                    node.collect_refs(out);
                }
                if let Additional::Schema(node) = additional {
                    node.collect_refs(out);
                }
            }
            SchemaNode::Union(members) => {
                for member in members {
                    member.collect_refs(out);
                }
            }
            SchemaNode::Any | SchemaNode::Primitive(_) | SchemaNode::Const { .. } => {}
        }
    }
}

/// Primitive kind of a literal value.
pub fn literal_primitive(value: &Value) -> Primitive {
    match value {
        Value::String(_) => Primitive::String,
        Value::Bool(_) => Primitive::Boolean,
        Value::Number(n) if n.is_f64() => Primitive::Number,
        Value::Number(_) => Primitive::Integer,
        _ => Primitive::Null,
    }
}
