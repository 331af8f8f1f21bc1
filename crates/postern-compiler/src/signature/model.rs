use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema-level primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl Primitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::Boolean => "boolean",
            Primitive::Null => "null",
        }
    }
}

/// A semantic type expression as written in a controller.
///
/// Transparent wrappers (`Box`, `Arc`, `Result`, futures) are already
/// stripped by the parser. `Option` is kept so that optionality survives
/// until the schema synthesizer decides what it means in context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    Any,
    Primitive { primitive: Primitive },
    Literal { value: serde_json::Value },
    Array { items: Box<TypeExpr> },
    Tuple { elements: Vec<TypeExpr> },
    Map { values: Box<TypeExpr> },
    Optional { inner: Box<TypeExpr> },
    Named { name: String },
}

impl TypeExpr {
    pub fn primitive(primitive: Primitive) -> Self {
        TypeExpr::Primitive { primitive }
    }

    pub fn string() -> Self {
        Self::primitive(Primitive::String)
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named { name: name.into() }
    }

    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::Optional {
            inner: Box::new(inner),
        }
    }

    /// Strip any number of `Option` layers; returns the inner type and
    /// whether any layer was present.
    pub fn unwrap_optional(&self) -> (&TypeExpr, bool) {
        let mut current = self;
        let mut optional = false;
        while let TypeExpr::Optional { inner } = current {
            current = inner;
            optional = true;
        }
        (current, optional)
    }

    /// Visit every named reference in this expression.
    pub fn for_each_named<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            TypeExpr::Named { name } => f(name),
            TypeExpr::Array { items } => items.for_each_named(f),
            TypeExpr::Map { values } => values.for_each_named(f),
            TypeExpr::Optional { inner } => inner.for_each_named(f),
            TypeExpr::Tuple { elements } => {
                for element in elements {
                    element.for_each_named(f);
                }
            }
            TypeExpr::Any | TypeExpr::Primitive { .. } | TypeExpr::Literal { .. } => {}
        }
    }
}

/// How the "this" context merges controller hooks with the handler's own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Handler hooks first, then the controller config's hooks.
    #[default]
    Append,
    /// Controller config's hooks replace the handler's own when non-empty.
    Replace,
}

/// Binding intent declared by a parameter's marker type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum Marker {
    Path {
        name: Option<String>,
    },
    Query {
        ty: TypeExpr,
        name: Option<String>,
    },
    Header {
        name: Option<String>,
    },
    Cookie {
        name: Option<String>,
    },
    Body {
        ty: TypeExpr,
    },
    BodyProp {
        ty: TypeExpr,
        path: Option<String>,
    },
    CustomParameter {
        resolver: String,
        args: Vec<serde_json::Value>,
    },
    Connection,
    Socket,
    RawRequest,
    RawReply,
    ThisContext {
        operation_id: Option<String>,
        config: Option<String>,
        merge: MergeMode,
    },
}

impl Marker {
    pub fn name(&self) -> &'static str {
        match self {
            Marker::Path { .. } => "Path",
            Marker::Query { .. } => "Query",
            Marker::Header { .. } => "Header",
            Marker::Cookie { .. } => "Cookie",
            Marker::Body { .. } => "Body",
            Marker::BodyProp { .. } => "BodyProp",
            Marker::CustomParameter { .. } => "CustomParameter",
            Marker::Connection => "Conn",
            Marker::Socket => "Sock",
            Marker::RawRequest => "Req",
            Marker::RawReply => "Rep",
            Marker::ThisContext { .. } => "This",
        }
    }
}

/// One parameter of a handler, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSlot {
    pub name: String,
    /// Declared semantic type (the value the handler receives).
    pub ty: TypeExpr,
    pub marker: Marker,
    pub optional: bool,
    pub line: usize,
}

/// Ordered parameter list of one handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSignature {
    pub parameters: Vec<ParameterSlot>,
}

/// One `@security scheme scope..` requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRequirement {
    pub scheme: String,
    pub scopes: Vec<String>,
}

/// Metadata read from a handler's doc comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub security: Vec<SecurityRequirement>,
    pub operation_id: Option<String>,
    pub hide: bool,
    pub offload: bool,
    pub deprecated: bool,
    pub on_request: Vec<String>,
    pub pre_handler: Vec<String>,
}

/// What kind of route a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Http,
    WebSocket,
}

/// Handler role derived from the exported function's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRole {
    /// Uppercase HTTP method.
    pub method: String,
    pub kind: RouteKind,
}

/// A normalized exported handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerExport {
    pub role: HandlerRole,
    pub signature: TypeSignature,
    pub response: TypeExpr,
    pub docs: DocMetadata,
    /// Operation id derived from controller path and function name.
    pub default_operation_id: String,
    pub is_async: bool,
}

/// Hook chains attached to a route, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookChains {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_request: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_handler: Vec<String>,
}

impl HookChains {
    pub fn is_empty(&self) -> bool {
        self.on_request.is_empty() && self.pre_handler.is_empty()
    }
}

/// A controller-exported `RouteConfig` constant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub hooks: HookChains,
    /// Non-hook fields, as literal values.
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Discriminated record for everything a controller exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportKind {
    Handler(HandlerExport),
    Config(RouteConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerExport {
    pub symbol: String,
    pub line: usize,
    pub kind: ExportKind,
}

/// A field of a declared struct (or struct variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Serialized name (after `#[serde(rename)]`).
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum VariantShape {
    Unit,
    Single { ty: TypeExpr },
    Fields { fields: Vec<FieldDecl> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    pub shape: VariantShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum TypeDeclKind {
    Struct { fields: Vec<FieldDecl> },
    Enum { variants: Vec<VariantDecl> },
    /// Type aliases, newtypes and tuple structs: no name of their own.
    Alias { target: TypeExpr },
    Unsupported { reason: String },
}

/// A type declared in some controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub kind: TypeDeclKind,
}

/// Everything the resolver extracted from one controller file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedController {
    /// Controller path relative to the project root, `/`-separated.
    pub path: String,
    pub sha256: String,
    pub exports: Vec<ControllerExport>,
    pub types: Vec<TypeDecl>,
}

impl ParsedController {
    /// Named config exports of this controller.
    pub fn config(&self, name: &str) -> Option<&RouteConfig> {
        self.exports.iter().find_map(|export| match &export.kind {
            ExportKind::Config(config) if export.symbol == name => Some(config),
            _ => None,
        })
    }
}
