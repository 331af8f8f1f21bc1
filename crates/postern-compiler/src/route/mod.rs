//! Route descriptors.
//!
//! One [`RouteDescriptor`] per qualifying handler: method and url from the
//! handler's identity, bindings from the classifier, schema references from
//! the synthesizer, plus doc metadata and hook chains.

pub mod url;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::{classify, Binding, BoundParameter, ClassifyContext};
use crate::config::ProjectConfig;
use crate::diagnostics::{codes, Category, Diagnostic, Location};
use crate::schema::{SchemaError, SchemaNode, SchemaSynthesizer};
use crate::signature::{
    check_references, HandlerExport, HookChains, ParsedController, Primitive, RouteKind, TypeExpr,
    TypeTable,
};

use url::{dynamic_names, url_template, wildcard_name, Segment};

/// How the handler is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Inline,
    Offloaded,
}

/// Schema references of one route, as JSON-Schema fragments (`$ref`s for
/// objects, inline for everything else).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querystring: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    /// Keyed by status class (`default`, `2xx`, ...).
    pub response: BTreeMap<String, Value>,
}

/// Where a route came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

/// Everything needed to register and dispatch one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub method: String,
    pub url: String,
    pub operation_id: String,
    /// `<controller path>#<function>`.
    pub handler: String,
    pub bindings: Vec<BoundParameter>,
    pub schema: RouteSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// `[{scheme: [scopes]}]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    pub hooks: HookChains,
    /// Remaining literal options from a merged `RouteConfig`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub websocket: bool,
    pub source: SourceLocation,
}

/// Shared inputs for building every route of a compilation.
pub struct BuildContext<'a> {
    pub config: &'a ProjectConfig,
    pub resolvers: &'a BTreeSet<String>,
    pub types: &'a TypeTable,
}

/// Build the descriptor for one handler of `controller`.
///
/// `segments` are the controller's url segments. Returns `None` when any
/// error diagnostic was produced for this handler.
pub fn build_route(
    controller: &ParsedController,
    segments: &[Segment],
    symbol: &str,
    line: usize,
    handler: &HandlerExport,
    cx: &BuildContext<'_>,
    synth: &mut SchemaSynthesizer<'_>,
) -> (Option<RouteDescriptor>, Vec<Diagnostic>) {
    let location = Location::file(&controller.path)
        .at_line(line)
        .with_symbol(symbol);

    let mut diagnostics = check_references(&controller.path, symbol, line, handler, cx.types);
    if !diagnostics.is_empty() {
        return (None, diagnostics);
    }

    let url_params = dynamic_names(segments);
    let classify_cx = ClassifyContext {
        controller,
        symbol,
        line,
        url_params: &url_params,
        wildcard: wildcard_name(segments),
        capabilities: cx.config.capabilities,
        resolvers: cx.resolvers,
        types: cx.types,
    };
    let (classification, classify_diags) = classify(handler, &classify_cx);
    diagnostics.extend(classify_diags);
    let Some(classification) = classification else {
        return (None, diagnostics);
    };

    let operation_id = handler
        .docs
        .operation_id
        .clone()
        .or_else(|| classification.operation_id.clone())
        .unwrap_or_else(|| handler.default_operation_id.clone());

    let schemas = match route_schemas(
        &classification.bindings,
        handler,
        &operation_id,
        &location,
        cx.config,
        synth,
    ) {
        Ok(schemas) => schemas,
        Err((err, parameter)) => {
            let location = match parameter {
                Some(parameter) => location.with_parameter(parameter),
                None => location,
            };
            diagnostics.push(err.into_diagnostic(location));
            return (None, diagnostics);
        }
    };

    let options = synth.options();
    let (depth, properties) = schemas
        .nodes
        .iter()
        .map(|node| synth.measure(node))
        .fold((0, 0), |(d, p), (nd, np)| (d.max(nd), p + np));
    if depth > options.max_depth {
        diagnostics.push(Diagnostic::error(
            Category::Schema,
            codes::SCHEMA_TOO_DEEP,
            format!(
                "schema depth {} exceeds limit {}",
                depth, options.max_depth
            ),
            location.clone(),
        ));
    }
    if properties > options.max_properties {
        diagnostics.push(Diagnostic::error(
            Category::Schema,
            codes::SCHEMA_TOO_COMPLEX,
            format!(
                "{} schema properties exceed limit {}",
                properties, options.max_properties
            ),
            location.clone(),
        ));
    }
    if diagnostics.iter().any(Diagnostic::is_error) {
        return (None, diagnostics);
    }

    let docs = &handler.docs;

    let mut config = classification.options;
    let summary = take_string(&mut config, "summary");
    let description = take_string(&mut config, "description");
    let tags = match config.remove("tags") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(tag)) => vec![tag],
        _ => Vec::new(),
    };
    let hide = take_bool(&mut config, "hide");
    let deprecated = take_bool(&mut config, "deprecated");

    let security = docs
        .security
        .iter()
        .map(|req| {
            let mut entry = BTreeMap::new();
            entry.insert(req.scheme.clone(), req.scopes.clone());
            entry
        })
        .collect();

    let route = RouteDescriptor {
        method: handler.role.method.clone(),
        url: url_template(segments),
        operation_id,
        handler: format!("{}#{}", controller.path, symbol),
        bindings: classification.bindings,
        schema: schemas.schema,
        summary,
        description,
        tags,
        security,
        hide,
        deprecated,
        hooks: classification.hooks,
        config,
        mode: if classification.offloaded {
            ExecutionMode::Offloaded
        } else {
            ExecutionMode::Inline
        },
        websocket: handler.role.kind == RouteKind::WebSocket,
        source: SourceLocation {
            file: controller.path.clone(),
            line,
        },
    };
    tracing::debug!(
        method = %route.method,
        url = %route.url,
        operation_id = %route.operation_id,
        "route built"
    );
    (Some(route), diagnostics)
}

struct RouteSchemas {
    schema: RouteSchema,
    /// Every node referenced by the route, for complexity checks.
    nodes: Vec<SchemaNode>,
}

type SchemaFailure = (SchemaError, Option<String>);

fn route_schemas(
    bindings: &[BoundParameter],
    handler: &HandlerExport,
    operation_id: &str,
    location: &Location,
    config: &ProjectConfig,
    synth: &mut SchemaSynthesizer<'_>,
) -> Result<RouteSchemas, SchemaFailure> {
    let mut params = Vec::new();
    let mut query = Vec::new();
    let mut query_extended = None;
    let mut body_fields = Vec::new();
    let mut body_whole = None;
    let mut headers = Vec::new();

    for bound in bindings {
        match &bound.binding {
            Binding::PathParam { name } => {
                params.push((name.clone(), string_node(), bound.optional));
            }
            Binding::QueryParam { name, ty } => {
                let node = lower_param(synth, ty, &bound.parameter)?;
                query.push((name.clone(), node, bound.optional));
            }
            Binding::QueryExtended { ty } => {
                query_extended = Some(lower_param(synth, ty, &bound.parameter)?);
            }
            Binding::BodyWhole { ty } => {
                body_whole = Some(lower_param(synth, ty, &bound.parameter)?);
            }
            Binding::BodyField { name, ty } => {
                let node = lower_param(synth, ty, &bound.parameter)?;
                body_fields.push((name.clone(), node, bound.optional));
            }
            Binding::HeaderParam { name } => {
                headers.push((name.clone(), string_node(), bound.optional));
            }
            Binding::CookieParam { .. }
            | Binding::CustomResolved { .. }
            | Binding::RawRequest
            | Binding::RawReply
            | Binding::Connection
            | Binding::Socket
            | Binding::ThisContext => {}
        }
    }

    let params = object_ref(synth, params);
    let querystring = query_extended.or_else(|| object_ref(synth, query));
    let body = body_whole.or_else(|| object_ref(synth, body_fields));
    let headers = object_ref(synth, headers);
    // Every route owns its response schema, named after the operation.
    let response = synth
        .lower(&handler.response)
        .map_err(|err| (err, None))?;
    let response = synth.register_as(
        &format!("{}Response", operation_id),
        response,
        location.clone(),
    );

    let mut nodes = Vec::new();
    let mut schema = RouteSchema::default();
    for (slot, node) in [
        (&mut schema.params, params),
        (&mut schema.querystring, querystring),
        (&mut schema.body, body),
        (&mut schema.headers, headers),
    ] {
        if let Some(node) = node {
            *slot = Some(node.to_json());
            nodes.push(node);
        }
    }

    for (status, value) in &config.schema.responses {
        schema.response.insert(status.clone(), value.clone());
    }
    schema
        .response
        .insert(config.schema.default_response.clone(), response.to_json());
    nodes.push(response);

    Ok(RouteSchemas { schema, nodes })
}

fn lower_param(
    synth: &mut SchemaSynthesizer<'_>,
    ty: &TypeExpr,
    parameter: &str,
) -> Result<SchemaNode, SchemaFailure> {
    synth
        .lower(ty)
        .map_err(|err| (err, Some(parameter.to_string())))
}

fn string_node() -> SchemaNode {
    SchemaNode::Primitive(Primitive::String)
}

/// Register the fields as an anonymous object; `None` when there are none.
fn object_ref(
    synth: &mut SchemaSynthesizer<'_>,
    fields: Vec<(String, SchemaNode, bool)>,
) -> Option<SchemaNode> {
    if fields.is_empty() {
        None
    } else {
        Some(synth.object(fields))
    }
}

fn take_string(options: &mut BTreeMap<String, Value>, key: &str) -> Option<String> {
    match options.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            options.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn take_bool(options: &mut BTreeMap<String, Value>, key: &str) -> bool {
    match options.remove(key) {
        Some(Value::Bool(b)) => b,
        Some(other) => {
            options.insert(key.to_string(), other);
            false
        }
        None => false,
    }
}

/// Report duplicate `(method, url)` pairs and duplicate operation ids.
pub fn check_duplicates(routes: &[RouteDescriptor]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut by_route: BTreeMap<(&str, &str), &RouteDescriptor> = BTreeMap::new();
    let mut by_id: BTreeMap<&str, &RouteDescriptor> = BTreeMap::new();

    for route in routes {
        let location = Location::file(&route.source.file)
            .at_line(route.source.line)
            .with_symbol(route.handler.rsplit('#').next().unwrap_or_default());

        if let Some(first) = by_route.get(&(route.method.as_str(), route.url.as_str())) {
            diagnostics.push(Diagnostic::error(
                Category::Build,
                codes::DUPLICATE_ROUTE,
                format!(
                    "duplicate route {} {} (also declared by {})",
                    route.method, route.url, first.handler
                ),
                location.clone(),
            ));
        } else {
            by_route.insert((route.method.as_str(), route.url.as_str()), route);
        }

        if let Some(first) = by_id.get(route.operation_id.as_str()) {
            diagnostics.push(Diagnostic::error(
                Category::Build,
                codes::DUPLICATE_OPERATION_ID,
                format!(
                    "duplicate operation id '{}' (also used by {})",
                    route.operation_id, first.handler
                ),
                location,
            ));
        } else {
            by_id.insert(route.operation_id.as_str(), route);
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PREFIX;
    use crate::schema::SynthOptions;
    use crate::signature::{parse_controller, ExportKind, ParseOptions};
    use regex_lite::Regex;
    use serde_json::json;

    struct Built {
        routes: Vec<RouteDescriptor>,
        diagnostics: Vec<Diagnostic>,
    }

    fn build(config: &ProjectConfig, sources: &[(&str, &str)]) -> Built {
        let options = ParseOptions::from_config(config).unwrap();
        let controllers: Vec<ParsedController> = sources
            .iter()
            .map(|(path, src)| parse_controller(path, src, &options).0)
            .collect();
        let (types, _) = TypeTable::build(&controllers);
        let resolvers = config.resolver_names();
        let cx = BuildContext {
            config,
            resolvers: &resolvers,
            types: &types,
        };
        let mut synth = SchemaSynthesizer::new(&types, SynthOptions::from(&config.schema));
        let mut routes = Vec::new();
        let mut diagnostics = Vec::new();
        for controller in &controllers {
            let prefix = Regex::new(DEFAULT_PREFIX).unwrap();
            let segments = url::controller_segments(&controller.path, &prefix).unwrap();
            for export in &controller.exports {
                if let ExportKind::Handler(handler) = &export.kind {
                    let (route, diags) = build_route(
                        controller,
                        &segments,
                        &export.symbol,
                        export.line,
                        handler,
                        &cx,
                        &mut synth,
                    );
                    routes.extend(route);
                    diagnostics.extend(diags);
                }
            }
        }
        Built {
            routes,
            diagnostics,
        }
    }

    #[test]
    fn scenario_a_route() {
        let config = ProjectConfig {
            capabilities: crate::config::Capabilities {
                cookies: true,
                websocket: false,
            },
            ..ProjectConfig::default()
        };
        let built = build(
            &config,
            &[(
                "src/routes/[name].rs",
                "pub fn put(name: Path, cookie: Cookie, path: BodyProp<f64>) -> String {}",
            )],
        );
        assert!(built.diagnostics.is_empty(), "{:?}", built.diagnostics);
        let route = &built.routes[0];
        assert_eq!(route.method, "PUT");
        assert_eq!(route.url, "/:name");
        assert_eq!(route.operation_id, "NameControllerPut");
        assert_eq!(route.handler, "src/routes/[name].rs#put");
        assert_eq!(route.mode, ExecutionMode::Inline);
        assert!(route.schema.params.as_ref().unwrap()["$ref"]
            .as_str()
            .unwrap()
            .starts_with("def-"));
        assert!(route.schema.body.is_some());
        assert!(route.schema.querystring.is_none());
        assert_eq!(
            route.schema.response["default"],
            json!({"$ref": "NameControllerPutResponse"})
        );
    }

    #[test]
    fn wildcard_route_binds_rest() {
        let built = build(
            &ProjectConfig::default(),
            &[("src/routes/files/[...rest].rs", "pub fn get(rest: Path) -> String {}")],
        );
        assert!(built.diagnostics.is_empty(), "{:?}", built.diagnostics);
        let route = &built.routes[0];
        assert_eq!(route.url, "/files/*");
        assert_eq!(route.operation_id, "FilesWildcardControllerGet");
        assert!(matches!(
            &route.bindings[0].binding,
            Binding::PathParam { name } if name == "*"
        ));
        assert!(route.schema.params.is_some());
    }

    #[test]
    fn response_keys_follow_config() {
        let config = ProjectConfig::from_yaml(
            "schema:\n  default_response: \"2xx\"\n  responses:\n    \"3xx\":\n      description: Redirect\n",
        )
        .unwrap();
        let built = build(&config, &[("routes/ping.rs", "pub fn get() -> u8 {}")]);
        let response = &built.routes[0].schema.response;
        assert_eq!(response["2xx"], json!({"$ref": "PingControllerGetResponse"}));
        assert_eq!(response["3xx"], json!({"description": "Redirect"}));
        assert!(!response.contains_key("default"));
    }

    #[test]
    fn doc_metadata_flows_into_descriptor() {
        let src = r#"
/// Route description
///
/// @summary route summary
/// @tag users
/// @security admin read-user write-user
/// @operationId listUsers
/// @deprecated
/// @offload
pub fn get(page: Query<u32>) -> Vec<String> {}
"#;
        let built = build(&ProjectConfig::default(), &[("routes/users.rs", src)]);
        let route = &built.routes[0];
        assert_eq!(route.operation_id, "listUsers");
        assert_eq!(route.summary.as_deref(), Some("route summary"));
        assert_eq!(route.description.as_deref(), Some("Route description"));
        assert_eq!(route.tags, vec!["users"]);
        assert_eq!(
            route.security[0]["admin"],
            vec!["read-user".to_string(), "write-user".to_string()]
        );
        assert!(route.deprecated);
        assert_eq!(route.mode, ExecutionMode::Offloaded);
    }

    #[test]
    fn this_operation_id_and_config_options() {
        let src = r#"
pub const CONF: RouteConfig = RouteConfig { on_request: &[auth], summary: "configured", rate_limit: 5 };
pub fn get(this: This<"getIt", CONF>) {}
"#;
        let built = build(&ProjectConfig::default(), &[("routes/it.rs", src)]);
        let route = &built.routes[0];
        assert_eq!(route.operation_id, "getIt");
        assert_eq!(route.summary.as_deref(), Some("configured"));
        assert_eq!(route.hooks.on_request, vec!["auth"]);
        assert_eq!(route.config["rate_limit"], json!(5));
        assert!(!route.config.contains_key("summary"));
    }

    #[test]
    fn extended_query_references_named_schema() {
        let src = r#"
pub struct HelloWorldQuery { name: String }
pub fn get(query: Query<HelloWorldQuery>) {}
"#;
        let built = build(&ProjectConfig::default(), &[("routes/response-types.rs", src)]);
        assert_eq!(
            built.routes[0].schema.querystring,
            Some(json!({"$ref": "HelloWorldQuery"}))
        );
    }

    #[test]
    fn schema_limits() {
        let config = ProjectConfig::from_yaml("schema:\n  max_properties: 2\n").unwrap();
        let built = build(
            &config,
            &[(
                "routes/big.rs",
                "pub struct Big { a: u8, b: u8, c: u8 }\npub fn post(body: Body<Big>) {}",
            )],
        );
        assert!(built.routes.is_empty());
        assert_eq!(built.diagnostics[0].code, codes::SCHEMA_TOO_COMPLEX);

        let config = ProjectConfig::from_yaml("schema:\n  max_depth: 1\n").unwrap();
        let built = build(
            &config,
            &[(
                "routes/deep.rs",
                "pub struct Inner { x: u8 }\npub struct Outer { inner: Inner }\npub fn post(body: Body<Outer>) {}",
            )],
        );
        assert_eq!(built.diagnostics[0].code, codes::SCHEMA_TOO_DEEP);
    }

    #[test]
    fn unsupported_type_reports_parameter() {
        let built = build(
            &ProjectConfig::default(),
            &[(
                "routes/a.rs",
                "pub struct W<T> { t: T }\npub fn post(body: Body<W>) {}",
            )],
        );
        assert!(built.routes.is_empty());
        assert_eq!(built.diagnostics[0].code, codes::UNSUPPORTED_TYPE);
        assert_eq!(built.diagnostics[0].location.parameter.as_deref(), Some("body"));
    }

    #[test]
    fn duplicates_are_reported() {
        let built = build(
            &ProjectConfig::default(),
            &[
                ("routes/users/index.rs", "pub fn get() {}"),
                ("routes/users.rs", "/// @operationId UsersControllerGet\npub fn get() {}"),
            ],
        );
        assert_eq!(built.routes.len(), 2);
        let diags = check_duplicates(&built.routes);
        let codes_found: Vec<&str> = diags.iter().map(|d| d.code.as_str()).collect();
        assert!(codes_found.contains(&codes::DUPLICATE_ROUTE));
        assert!(codes_found.contains(&codes::DUPLICATE_OPERATION_ID));
    }
}
