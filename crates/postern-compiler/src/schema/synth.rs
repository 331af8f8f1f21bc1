use std::collections::BTreeMap;

use thiserror::Error;

use super::{literal_primitive, Additional, SchemaNode, SchemaRegistry};
use crate::config::SchemaConfig;
use crate::diagnostics::{codes, Category, Diagnostic, Location};
use crate::signature::{FieldDecl, TypeDecl, TypeDeclKind, TypeExpr, TypeTable, VariantShape};

/// Why a type could not be lowered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("type `{0}` is not declared in any controller")]
    Unresolved(String),

    #[error("type `{name}` is not supported: {reason}")]
    Unsupported { name: String, reason: String },

    #[error("type alias `{0}` refers to itself without a struct or enum in between")]
    AliasCycle(String),
}

impl SchemaError {
    pub fn into_diagnostic(self, location: Location) -> Diagnostic {
        let (category, code) = match &self {
            SchemaError::Unresolved(_) => (Category::Analysis, codes::UNRESOLVED_TYPE),
            SchemaError::Unsupported { .. } => (Category::Schema, codes::UNSUPPORTED_TYPE),
            SchemaError::AliasCycle(_) => (Category::Schema, codes::SELF_REFERENCE),
        };
        Diagnostic::error(category, code, self.to_string(), location)
    }
}

/// Synthesis options taken from the `schema` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthOptions {
    pub additional_properties: bool,
    pub max_depth: usize,
    pub max_properties: usize,
}

impl From<&SchemaConfig> for SynthOptions {
    fn from(config: &SchemaConfig) -> Self {
        Self {
            additional_properties: config.additional_properties,
            max_depth: config.max_depth,
            max_properties: config.max_properties,
        }
    }
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self::from(&SchemaConfig::default())
    }
}

/// Lowers type expressions into schema nodes, registering objects and
/// named types as it goes.
///
/// One synthesizer serves a whole compilation; named types are lowered once
/// and cached by name.
pub struct SchemaSynthesizer<'a> {
    types: &'a TypeTable,
    options: SynthOptions,
    registry: SchemaRegistry,
    /// Named structs/enums currently being lowered (recursion break points).
    in_progress: Vec<String>,
    /// Aliases currently being expanded.
    alias_stack: Vec<String>,
    named: BTreeMap<String, String>,
    warnings: Vec<Diagnostic>,
}

impl<'a> SchemaSynthesizer<'a> {
    pub fn new(types: &'a TypeTable, options: SynthOptions) -> Self {
        Self {
            types,
            options,
            registry: SchemaRegistry::new(),
            in_progress: Vec::new(),
            alias_stack: Vec::new(),
            named: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn options(&self) -> SynthOptions {
        self.options
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Finish: the populated registry and collected warnings.
    pub fn finish(self) -> (SchemaRegistry, Vec<Diagnostic>) {
        (self.registry, self.warnings)
    }

    /// Lower a type expression. `Option` layers are unwrapped; callers that
    /// care about optionality inspect the expression themselves.
    pub fn lower(&mut self, ty: &TypeExpr) -> Result<SchemaNode, SchemaError> {
        match ty {
            TypeExpr::Any => Ok(SchemaNode::Any),
            TypeExpr::Primitive { primitive } => Ok(SchemaNode::Primitive(*primitive)),
            TypeExpr::Literal { value } => Ok(SchemaNode::Const {
                primitive: literal_primitive(value),
                value: value.clone(),
            }),
            TypeExpr::Array { items } => Ok(SchemaNode::Array {
                items: Box::new(self.lower(items)?),
                min_items: None,
                max_items: None,
            }),
            TypeExpr::Tuple { elements } => {
                let mut members: Vec<SchemaNode> = Vec::new();
                for element in elements {
                    let node = self.lower(element)?;
                    if !members.contains(&node) {
                        members.push(node);
                    }
                }
                let items = if members.len() == 1 {
                    members.remove(0)
                } else {
                    SchemaNode::Union(members)
                };
                Ok(SchemaNode::Array {
                    items: Box::new(items),
                    min_items: Some(elements.len()),
                    max_items: Some(elements.len()),
                })
            }
            TypeExpr::Map { values } => Ok(SchemaNode::Object {
                properties: Vec::new(),
                required: Vec::new(),
                additional: Additional::Schema(Box::new(self.lower(values)?)),
            }),
            TypeExpr::Optional { inner } => self.lower(inner),
            TypeExpr::Named { name } => self.lower_named(name),
        }
    }

    /// Register an anonymous object built from `(name, schema, optional)`
    /// fields and return a reference to it.
    pub fn object(&mut self, fields: Vec<(String, SchemaNode, bool)>) -> SchemaNode {
        let node = SchemaNode::object(fields, self.additional());
        SchemaNode::Ref(self.registry.register_anonymous(node))
    }

    /// Register `node` under `name` and return a reference to it.
    ///
    /// A name already taken by a different shape falls back to the node's
    /// content id, with a warning at `location`.
    pub fn register_as(&mut self, name: &str, node: SchemaNode, location: Location) -> SchemaNode {
        SchemaNode::Ref(self.register_named(name, node, location))
    }

    fn register_named(&mut self, name: &str, node: SchemaNode, location: Location) -> String {
        let (id, collided) = self.registry.register_named(name, node);
        if collided {
            self.warnings.push(Diagnostic::warning(
                Category::Schema,
                codes::SCHEMA_NAME_COLLISION,
                format!(
                    "schema name `{}` is already registered with a different shape; registered as `{}`",
                    name, id
                ),
                location,
            ));
        }
        tracing::trace!(schema = %id, "named schema registered");
        id
    }

    /// The object node behind a named struct, following aliases, without
    /// registering anything new beyond what lowering registers anyway.
    pub fn resolve_object(&mut self, ty: &TypeExpr) -> Result<Option<SchemaNode>, SchemaError> {
        let node = self.lower(ty)?;
        Ok(match node {
            SchemaNode::Ref(id) => self
                .registry
                .get(&id)
                .map(|schema| schema.node.clone())
                .filter(SchemaNode::is_object),
            node if node.is_object() => Some(node),
            _ => None,
        })
    }

    /// `(depth, properties)` of a node, following references.
    pub fn measure(&self, node: &SchemaNode) -> (usize, usize) {
        self.registry.measure(node)
    }

    fn additional(&self) -> Additional {
        if self.options.additional_properties {
            Additional::Allow
        } else {
            Additional::Forbid
        }
    }

    fn lower_named(&mut self, name: &str) -> Result<SchemaNode, SchemaError> {
        if let Some(id) = self.named.get(name) {
            return Ok(SchemaNode::Ref(id.clone()));
        }
        let types = self.types;
        let decl = types
            .get(name)
            .ok_or_else(|| SchemaError::Unresolved(name.to_string()))?;

        match &decl.kind {
            TypeDeclKind::Alias { target } => {
                if self.alias_stack.iter().any(|n| n == name) {
                    return Err(SchemaError::AliasCycle(name.to_string()));
                }
                self.alias_stack.push(name.to_string());
                let result = self.lower(target);
                self.alias_stack.pop();
                result
            }
            TypeDeclKind::Unsupported { reason } => Err(SchemaError::Unsupported {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            TypeDeclKind::Struct { .. } | TypeDeclKind::Enum { .. } => {
                if self.in_progress.iter().any(|n| n == name) {
                    return Ok(SchemaNode::Ref(name.to_string()));
                }
                // A struct reached through an alias starts a fresh alias scope.
                let aliases = std::mem::take(&mut self.alias_stack);
                self.in_progress.push(name.to_string());
                let result = self.lower_decl(decl);
                self.in_progress.pop();
                self.alias_stack = aliases;
                let node = result?;

                let location = Location::file(&decl.file)
                    .at_line(decl.line)
                    .with_symbol(name);
                let id = self.register_named(name, node, location);
                self.named.insert(name.to_string(), id.clone());
                Ok(SchemaNode::Ref(id))
            }
        }
    }

    fn lower_decl(&mut self, decl: &TypeDecl) -> Result<SchemaNode, SchemaError> {
        match &decl.kind {
            TypeDeclKind::Struct { fields } => self.lower_fields(fields),
            TypeDeclKind::Enum { variants } => {
                let mut members = Vec::with_capacity(variants.len());
                for variant in variants {
                    let node = match &variant.shape {
                        VariantShape::Unit => SchemaNode::Const {
                            primitive: crate::signature::Primitive::String,
                            value: serde_json::Value::String(variant.name.clone()),
                        },
                        VariantShape::Single { ty } => self.lower(ty)?,
                        VariantShape::Fields { fields } => {
                            let node = self.lower_fields(fields)?;
                            SchemaNode::Ref(self.registry.register_anonymous(node))
                        }
                    };
                    if !members.contains(&node) {
                        members.push(node);
                    }
                }
                Ok(SchemaNode::Union(members))
            }
            TypeDeclKind::Alias { target } => self.lower(target),
            TypeDeclKind::Unsupported { reason } => Err(SchemaError::Unsupported {
                name: decl.name.clone(),
                reason: reason.clone(),
            }),
        }
    }

    fn lower_fields(&mut self, fields: &[FieldDecl]) -> Result<SchemaNode, SchemaError> {
        let mut lowered = Vec::with_capacity(fields.len());
        for field in fields {
            let (inner, optional) = field.ty.unwrap_optional();
            lowered.push((field.name.clone(), self.lower(inner)?, field.optional || optional));
        }
        Ok(SchemaNode::object(lowered, self.additional()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PREFIX;
    use crate::signature::{parse_controller, ParseOptions, ParsedController, Primitive};
    use regex_lite::Regex;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn controller(path: &str, src: &str) -> ParsedController {
        let options = ParseOptions {
            prefix: Regex::new(DEFAULT_PREFIX).unwrap(),
            resolvers: BTreeSet::new(),
        };
        parse_controller(path, src, &options).0
    }

    fn table(src: &str) -> TypeTable {
        TypeTable::build([&controller("routes/a.rs", src)]).0
    }

    #[test]
    fn struct_lowering_and_registration() {
        let types = table(
            "pub struct User { name: String, age: Option<u8>, #[serde(default)] tags: Vec<String> }",
        );
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let node = synth.lower(&TypeExpr::named("User")).unwrap();
        assert_eq!(node, SchemaNode::Ref("User".to_string()));
        let (registry, warnings) = synth.finish();
        assert!(warnings.is_empty());
        assert_eq!(
            registry.get("User").unwrap().node.to_json(),
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "age": {"type": "integer"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["name"],
                "additionalProperties": false
            })
        );
    }

    #[test]
    fn additional_properties_option() {
        let types = table("pub struct User { name: String }");
        let options = SynthOptions {
            additional_properties: true,
            ..SynthOptions::default()
        };
        let mut synth = SchemaSynthesizer::new(&types, options);
        synth.lower(&TypeExpr::named("User")).unwrap();
        let json = synth.registry().get("User").unwrap().node.to_json();
        assert_eq!(json["additionalProperties"], json!(true));
    }

    #[test]
    fn enum_lowering() {
        let types = table(
            "pub enum Shape { Empty, Named(String), Sized { w: u32, h: u32 } }",
        );
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        synth.lower(&TypeExpr::named("Shape")).unwrap();
        let json = synth.registry().get("Shape").unwrap().node.to_json();
        let any_of = json["anyOf"].as_array().unwrap();
        assert_eq!(any_of.len(), 3);
        assert_eq!(any_of[0], json!({"type": "string", "const": "Empty"}));
        assert_eq!(any_of[1], json!({"type": "string"}));
        assert!(any_of[2]["$ref"].as_str().unwrap().starts_with("def-"));
    }

    #[test]
    fn tuple_lowering() {
        let types = TypeTable::default();
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let node = synth
            .lower(&TypeExpr::Tuple {
                elements: vec![
                    TypeExpr::string(),
                    TypeExpr::primitive(Primitive::Integer),
                    TypeExpr::string(),
                ],
            })
            .unwrap();
        assert_eq!(
            node.to_json(),
            json!({
                "type": "array",
                "items": {"anyOf": [{"type": "string"}, {"type": "integer"}]},
                "minItems": 3,
                "maxItems": 3
            })
        );
    }

    #[test]
    fn recursive_struct_uses_named_break_point() {
        let types = table("pub struct Tree { value: u8, children: Vec<Tree> }");
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        synth.lower(&TypeExpr::named("Tree")).unwrap();
        let json = synth.registry().get("Tree").unwrap().node.to_json();
        assert_eq!(json["properties"]["children"]["items"], json!({"$ref": "Tree"}));
    }

    #[test]
    fn alias_cycle_is_an_error() {
        let types = table("pub type A = Vec<B>;\npub type B = Option<A>;");
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let err = synth.lower(&TypeExpr::named("A")).unwrap_err();
        assert!(matches!(err, SchemaError::AliasCycle(_)));
        let diag = err.into_diagnostic(Location::file("routes/a.rs"));
        assert_eq!(diag.code, codes::SELF_REFERENCE);
        assert_eq!(diag.category, Category::Schema);
    }

    #[test]
    fn aliases_are_transparent() {
        let types = table("pub type Ids = Vec<u64>;");
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let node = synth.lower(&TypeExpr::named("Ids")).unwrap();
        assert_eq!(node.to_json(), json!({"type": "array", "items": {"type": "integer"}}));
        assert!(synth.registry().is_empty());
    }

    #[test]
    fn unresolved_and_unsupported() {
        let types = table("pub struct Wrapper<T> { inner: T }");
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        assert!(matches!(
            synth.lower(&TypeExpr::named("Missing")),
            Err(SchemaError::Unresolved(_))
        ));
        assert!(matches!(
            synth.lower(&TypeExpr::named("Wrapper")),
            Err(SchemaError::Unsupported { .. })
        ));
    }

    #[test]
    fn register_as_keeps_names_distinct() {
        let types = TypeTable::default();
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let list = || SchemaNode::Array {
            items: Box::new(SchemaNode::Primitive(Primitive::String)),
            min_items: None,
            max_items: None,
        };
        let at = || Location::file("routes/a.rs").at_line(1);

        let get = synth.register_as("ListGetResponse", list(), at());
        let post = synth.register_as("ListPostResponse", list(), at());
        assert_eq!(get, SchemaNode::Ref("ListGetResponse".to_string()));
        assert_eq!(post, SchemaNode::Ref("ListPostResponse".to_string()));

        let clash = synth.register_as("ListGetResponse", SchemaNode::Primitive(Primitive::Boolean), at());
        assert!(matches!(clash, SchemaNode::Ref(ref id) if id.starts_with("def-")));

        let (registry, warnings) = synth.finish();
        assert_eq!(registry.len(), 3);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, codes::SCHEMA_NAME_COLLISION);
        assert_eq!(warnings[0].location.line, Some(1));
    }

    #[test]
    fn anonymous_objects_collapse() {
        let types = TypeTable::default();
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let field = || ("q".to_string(), SchemaNode::Primitive(Primitive::String), false);
        let a = synth.object(vec![field()]);
        let b = synth.object(vec![field()]);
        assert_eq!(a, b);
        assert_eq!(synth.registry().len(), 1);
    }

    #[test]
    fn resolve_object_follows_aliases() {
        let types = table("pub struct Q { a: u8 }\npub type Alias = Q;");
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::default());
        let object = synth.resolve_object(&TypeExpr::named("Alias")).unwrap();
        assert!(object.unwrap().is_object());
        assert!(synth
            .resolve_object(&TypeExpr::string())
            .unwrap()
            .is_none());
    }
}
