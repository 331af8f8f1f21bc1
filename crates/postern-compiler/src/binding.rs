//! Parameter-binding classification.
//!
//! Maps every handler parameter to exactly one [`Binding`], rejects illegal
//! marker combinations, and composes the route's hook chains with a
//! controller `RouteConfig` when the handler asks for one through `This`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Capabilities;
use crate::diagnostics::{codes, Category, Diagnostic, Location};
use crate::route::url::WILDCARD_PARAM;
use crate::signature::{
    HandlerExport, HookChains, Marker, MergeMode, ParsedController, RouteConfig, RouteKind,
    TypeDeclKind, TypeExpr, TypeTable,
};

/// Where a parameter's value comes from at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    PathParam { name: String },
    QueryParam { name: String, ty: TypeExpr },
    /// An object type whose properties are the whole query string.
    QueryExtended { ty: TypeExpr },
    BodyWhole { ty: TypeExpr },
    BodyField { name: String, ty: TypeExpr },
    /// Lowercased header name.
    HeaderParam { name: String },
    CookieParam { name: String },
    CustomResolved { resolver: String, args: Vec<Value> },
    RawRequest,
    RawReply,
    Connection,
    Socket,
    ThisContext,
}

impl Binding {
    /// Extraction expression against the request context, for every
    /// binding that is not resolver-driven.
    pub fn extract_expression(&self) -> Option<String> {
        let expr = match self {
            Binding::PathParam { name } => format!("params.{}", name),
            Binding::QueryParam { name, .. } => format!("query.{}", name),
            Binding::QueryExtended { .. } => "query".to_string(),
            Binding::BodyWhole { .. } => "body".to_string(),
            Binding::BodyField { name, .. } => format!("body.{}", name),
            Binding::HeaderParam { name } => format!("headers.{}", name),
            Binding::CookieParam { name } => format!("cookies.{}", name),
            Binding::RawRequest => "request".to_string(),
            Binding::RawReply => "reply".to_string(),
            Binding::Connection => "connection".to_string(),
            Binding::Socket => "socket".to_string(),
            Binding::ThisContext => "context".to_string(),
            Binding::CustomResolved { .. } => return None,
        };
        Some(expr)
    }

    /// Plain data that can cross a worker-pool boundary.
    pub fn is_value(&self) -> bool {
        !matches!(
            self,
            Binding::RawRequest
                | Binding::RawReply
                | Binding::Connection
                | Binding::Socket
                | Binding::ThisContext
        )
    }
}

/// One classified parameter, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    pub parameter: String,
    pub optional: bool,
    pub binding: Binding,
}

/// Hooks and literal options attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    pub hooks: HookChains,
    pub options: BTreeMap<String, Value>,
}

/// Result of [`merge_route_options`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedOptions {
    pub hooks: HookChains,
    pub options: BTreeMap<String, Value>,
    /// Controller keys shadowed by a wrapper value.
    pub overridden: Vec<String>,
}

/// Shallow merge of the handler's own options (the wrapper) with a
/// controller-exported config.
///
/// - `Append`: wrapper hooks, then the controller's.
/// - `Replace`: the controller's hooks when non-empty, else the wrapper's.
/// - other keys: union; the wrapper wins on collision.
pub fn merge_route_options(
    wrapper: &RouteOptions,
    controller: &RouteConfig,
    mode: MergeMode,
) -> MergedOptions {
    let chain = |own: &[String], theirs: &[String]| -> Vec<String> {
        match mode {
            MergeMode::Append => own.iter().chain(theirs).cloned().collect(),
            MergeMode::Replace if theirs.is_empty() => own.to_vec(),
            MergeMode::Replace => theirs.to_vec(),
        }
    };
    let hooks = HookChains {
        on_request: chain(&wrapper.hooks.on_request, &controller.hooks.on_request),
        pre_handler: chain(&wrapper.hooks.pre_handler, &controller.hooks.pre_handler),
    };

    let mut options = controller.options.clone();
    let mut overridden = Vec::new();
    for (key, value) in &wrapper.options {
        if let Some(previous) = options.insert(key.clone(), value.clone()) {
            if &previous != value {
                overridden.push(key.clone());
            }
        }
    }

    MergedOptions {
        hooks,
        options,
        overridden,
    }
}

/// Everything classification needs besides the handler itself.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub controller: &'a ParsedController,
    pub symbol: &'a str,
    pub line: usize,
    /// Request parameter names of the route url's dynamic segments.
    pub url_params: &'a [String],
    /// Declared name of the url's wildcard segment.
    pub wildcard: Option<&'a str>,
    pub capabilities: Capabilities,
    pub resolvers: &'a BTreeSet<String>,
    pub types: &'a TypeTable,
}

/// A classified handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub bindings: Vec<BoundParameter>,
    /// Operation id given through `This<"id">`.
    pub operation_id: Option<String>,
    pub hooks: HookChains,
    pub options: BTreeMap<String, Value>,
    pub offloaded: bool,
}

/// Classify one handler. Returns `None` if any error was found; the
/// diagnostics hold every problem, not only the first.
pub fn classify(
    handler: &HandlerExport,
    cx: &ClassifyContext<'_>,
) -> (Option<Classification>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let file = cx.controller.path.as_str();
    let handler_location = Location::file(file).at_line(cx.line).with_symbol(cx.symbol);
    let error = |code: &str, message: String, location: Location| {
        Diagnostic::error(Category::Classifier, code, message, location)
    };

    let websocket = handler.role.kind == RouteKind::WebSocket;
    let offloaded = handler.docs.offload;

    if websocket && !cx.capabilities.websocket {
        diagnostics.push(error(
            codes::WEBSOCKET_CAPABILITY,
            "websocket handler requires the `websocket` capability".to_string(),
            handler_location.clone(),
        ));
    }
    if websocket && offloaded {
        diagnostics.push(error(
            codes::OFFLOAD_ISOLATION,
            "websocket handlers cannot be offloaded".to_string(),
            handler_location.clone(),
        ));
    }

    let mut bindings = Vec::with_capacity(handler.signature.parameters.len());
    let mut this_marker = None;

    for slot in &handler.signature.parameters {
        let location = handler_location
            .clone()
            .at_line(slot.line)
            .with_parameter(&slot.name);

        let binding = match &slot.marker {
            Marker::Path { name } => {
                let mut name = name.clone().unwrap_or_else(|| slot.name.clone());
                if cx.wildcard == Some(name.as_str()) {
                    name = WILDCARD_PARAM.to_string();
                }
                if !cx.url_params.contains(&name) {
                    diagnostics.push(error(
                        codes::PATH_NOT_IN_URL,
                        format!("path parameter `{}` is not a dynamic segment of the route url", name),
                        location.clone(),
                    ));
                }
                Binding::PathParam { name }
            }
            Marker::Query { ty, name: None } if is_object(ty, cx.types) => {
                Binding::QueryExtended { ty: ty.clone() }
            }
            Marker::Query { ty, name } => Binding::QueryParam {
                name: name.clone().unwrap_or_else(|| slot.name.clone()),
                ty: ty.clone(),
            },
            Marker::Header { name } => Binding::HeaderParam {
                name: name
                    .clone()
                    .unwrap_or_else(|| slot.name.replace('_', "-"))
                    .to_ascii_lowercase(),
            },
            Marker::Cookie { name } => {
                if !cx.capabilities.cookies {
                    diagnostics.push(error(
                        codes::COOKIE_CAPABILITY,
                        "`Cookie` parameters require the `cookies` capability".to_string(),
                        location.clone(),
                    ));
                }
                Binding::CookieParam {
                    name: name.clone().unwrap_or_else(|| slot.name.clone()),
                }
            }
            Marker::Body { ty } => Binding::BodyWhole { ty: ty.clone() },
            Marker::BodyProp { ty, path } => Binding::BodyField {
                name: path.clone().unwrap_or_else(|| slot.name.clone()),
                ty: ty.clone(),
            },
            Marker::CustomParameter { resolver, args } => {
                if !cx.resolvers.contains(resolver) {
                    diagnostics.push(error(
                        codes::UNKNOWN_RESOLVER,
                        format!("resolver `{}` is not declared in `params`", resolver),
                        location.clone(),
                    ));
                }
                Binding::CustomResolved {
                    resolver: resolver.clone(),
                    args: args.clone(),
                }
            }
            Marker::Connection | Marker::Socket => {
                if !websocket {
                    diagnostics.push(error(
                        codes::STREAMING_ONLY,
                        format!(
                            "`{}` is only available on websocket routes",
                            slot.marker.name()
                        ),
                        location.clone(),
                    ));
                }
                if matches!(slot.marker, Marker::Connection) {
                    Binding::Connection
                } else {
                    Binding::Socket
                }
            }
            Marker::RawRequest => Binding::RawRequest,
            Marker::RawReply => Binding::RawReply,
            Marker::ThisContext {
                operation_id,
                config,
                merge,
            } => {
                if this_marker.is_some() {
                    diagnostics.push(error(
                        codes::MULTIPLE_THIS,
                        "only one `This` parameter is allowed".to_string(),
                        location.clone(),
                    ));
                } else {
                    this_marker = Some((operation_id.clone(), config.clone(), *merge, location.clone()));
                }
                Binding::ThisContext
            }
        };

        if offloaded && !binding.is_value() {
            diagnostics.push(error(
                codes::OFFLOAD_ISOLATION,
                format!(
                    "`{}` cannot cross the worker boundary of an offloaded handler",
                    slot.marker.name()
                ),
                location,
            ));
        }

        bindings.push(BoundParameter {
            parameter: slot.name.clone(),
            optional: slot.optional,
            binding,
        });
    }

    check_query_conflicts(&bindings, &handler_location, &mut diagnostics);
    check_body_conflicts(&bindings, &handler_location, &mut diagnostics);

    let wrapper = RouteOptions {
        hooks: HookChains {
            on_request: handler.docs.on_request.clone(),
            pre_handler: handler.docs.pre_handler.clone(),
        },
        options: doc_options(handler),
    };

    let mut operation_id = None;
    let merged = match this_marker {
        Some((id, config, mode, location)) => {
            operation_id = id;
            match config {
                Some(name) => match cx.controller.config(&name) {
                    Some(config) => {
                        let merged = merge_route_options(&wrapper, config, mode);
                        for key in &merged.overridden {
                            diagnostics.push(Diagnostic::warning(
                                Category::Classifier,
                                codes::CONFIG_OVERRIDDEN,
                                format!(
                                    "`{}` from config `{}` is overridden by the handler",
                                    key, name
                                ),
                                location.clone(),
                            ));
                        }
                        Some(merged)
                    }
                    None => {
                        diagnostics.push(error(
                            codes::UNKNOWN_ROUTE_CONFIG,
                            format!("controller exports no `RouteConfig` named `{}`", name),
                            location,
                        ));
                        None
                    }
                },
                None => None,
            }
        }
        None => None,
    };
    let (hooks, options) = match merged {
        Some(merged) => (merged.hooks, merged.options),
        None => (wrapper.hooks, wrapper.options),
    };

    if diagnostics.iter().any(Diagnostic::is_error) {
        return (None, diagnostics);
    }

    (
        Some(Classification {
            bindings,
            operation_id,
            hooks,
            options,
            offloaded,
        }),
        diagnostics,
    )
}

/// Descriptor fields the handler states itself, as mergeable options.
fn doc_options(handler: &HandlerExport) -> BTreeMap<String, Value> {
    let docs = &handler.docs;
    let mut options = BTreeMap::new();
    if let Some(summary) = &docs.summary {
        options.insert("summary".to_string(), Value::from(summary.clone()));
    }
    if let Some(description) = &docs.description {
        options.insert("description".to_string(), Value::from(description.clone()));
    }
    if !docs.tags.is_empty() {
        options.insert("tags".to_string(), Value::from(docs.tags.clone()));
    }
    if docs.hide {
        options.insert("hide".to_string(), Value::Bool(true));
    }
    if docs.deprecated {
        options.insert("deprecated".to_string(), Value::Bool(true));
    }
    options
}

/// Does `ty` name a struct, possibly through aliases?
fn is_object(ty: &TypeExpr, types: &TypeTable) -> bool {
    let mut current = ty;
    // Alias chains are short; the bound stops alias cycles.
    for _ in 0..16 {
        let TypeExpr::Named { name } = current else {
            return false;
        };
        match types.get(name).map(|decl| &decl.kind) {
            Some(TypeDeclKind::Struct { .. }) => return true,
            Some(TypeDeclKind::Alias { target }) => current = target,
            _ => return false,
        }
    }
    false
}

fn check_query_conflicts(
    bindings: &[BoundParameter],
    location: &Location,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let extended: Vec<&BoundParameter> = bindings
        .iter()
        .filter(|b| matches!(b.binding, Binding::QueryExtended { .. }))
        .collect();
    let query_count = bindings
        .iter()
        .filter(|b| {
            matches!(
                b.binding,
                Binding::QueryExtended { .. } | Binding::QueryParam { .. }
            )
        })
        .count();

    if let Some(first) = extended.first() {
        if query_count > 1 {
            diagnostics.push(Diagnostic::error(
                Category::Classifier,
                codes::QUERY_EXTENDED_CONFLICT,
                format!(
                    "object query `{}` binds the whole query string and cannot be combined with other query parameters",
                    first.parameter
                ),
                location.clone().with_parameter(&first.parameter),
            ));
        }
    }

    let mut seen = BTreeSet::new();
    for bound in bindings {
        if let Binding::QueryParam { name, .. } = &bound.binding {
            if !seen.insert(name.as_str()) {
                diagnostics.push(Diagnostic::error(
                    Category::Classifier,
                    codes::QUERY_EXTENDED_CONFLICT,
                    format!("query field `{}` is bound twice", name),
                    location.clone().with_parameter(&bound.parameter),
                ));
            }
        }
    }
}

fn check_body_conflicts(
    bindings: &[BoundParameter],
    location: &Location,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let whole: Vec<&BoundParameter> = bindings
        .iter()
        .filter(|b| matches!(b.binding, Binding::BodyWhole { .. }))
        .collect();
    let fields: Vec<&BoundParameter> = bindings
        .iter()
        .filter(|b| matches!(b.binding, Binding::BodyField { .. }))
        .collect();

    if whole.len() > 1 {
        diagnostics.push(Diagnostic::error(
            Category::Classifier,
            codes::BODY_CONFLICT,
            "only one `Body` parameter is allowed".to_string(),
            location.clone().with_parameter(&whole[1].parameter),
        ));
    }
    if let (Some(body), Some(field)) = (whole.first(), fields.first()) {
        diagnostics.push(Diagnostic::error(
            Category::Classifier,
            codes::BODY_CONFLICT,
            format!(
                "`Body` parameter `{}` cannot be combined with `BodyProp` parameter `{}`",
                body.parameter, field.parameter
            ),
            location.clone().with_parameter(&field.parameter),
        ));
    }

    let mut seen = BTreeSet::new();
    for field in fields {
        if let Binding::BodyField { name, .. } = &field.binding {
            if !seen.insert(name.as_str()) {
                diagnostics.push(Diagnostic::error(
                    Category::Classifier,
                    codes::BODY_CONFLICT,
                    format!("body field `{}` is bound twice", name),
                    location.clone().with_parameter(&field.parameter),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PREFIX;
    use crate::route::url::{controller_segments, wildcard_name};
    use crate::signature::{parse_controller, ExportKind, ParseOptions};
    use regex_lite::Regex;

    struct Fixture {
        controller: ParsedController,
        types: TypeTable,
        resolvers: BTreeSet<String>,
    }

    impl Fixture {
        fn new(path: &str, src: &str) -> Self {
            let resolvers: BTreeSet<String> = ["AuthParam".to_string()].into_iter().collect();
            let options = ParseOptions {
                prefix: Regex::new(DEFAULT_PREFIX).unwrap(),
                resolvers: resolvers.clone(),
            };
            let (controller, diags) = parse_controller(path, src, &options);
            assert!(diags.iter().all(|d| !d.is_error()), "{:?}", diags);
            let (types, _) = TypeTable::build([&controller]);
            Self {
                controller,
                types,
                resolvers,
            }
        }

        fn classify(
            &self,
            symbol: &str,
            url_params: &[&str],
            capabilities: Capabilities,
        ) -> (Option<Classification>, Vec<Diagnostic>) {
            let export = self
                .controller
                .exports
                .iter()
                .find(|e| e.symbol == symbol)
                .unwrap();
            let ExportKind::Handler(handler) = &export.kind else {
                panic!("not a handler");
            };
            let url_params: Vec<String> = url_params.iter().map(|s| s.to_string()).collect();
            let prefix = Regex::new(DEFAULT_PREFIX).unwrap();
            let segments = controller_segments(&self.controller.path, &prefix).unwrap();
            let cx = ClassifyContext {
                controller: &self.controller,
                symbol,
                line: export.line,
                url_params: &url_params,
                wildcard: wildcard_name(&segments),
                capabilities,
                resolvers: &self.resolvers,
                types: &self.types,
            };
            classify(handler, &cx)
        }
    }

    fn cookies() -> Capabilities {
        Capabilities {
            cookies: true,
            websocket: false,
        }
    }

    #[test]
    fn scenario_a_binds_in_declaration_order() {
        let f = Fixture::new(
            "src/routes/[name].rs",
            "pub fn put(name: Path, cookie: Cookie, path: BodyProp<f64>) {}",
        );
        let (classified, diags) = f.classify("put", &["name"], cookies());
        assert!(diags.is_empty(), "{:?}", diags);
        let bindings = classified.unwrap().bindings;
        assert_eq!(
            bindings[0].binding,
            Binding::PathParam {
                name: "name".to_string()
            }
        );
        assert_eq!(
            bindings[1].binding,
            Binding::CookieParam {
                name: "cookie".to_string()
            }
        );
        assert!(matches!(&bindings[2].binding, Binding::BodyField { name, .. } if name == "path"));
        assert_eq!(
            bindings[2].binding.extract_expression().as_deref(),
            Some("body.path")
        );
    }

    #[test]
    fn scenario_c_cookie_requires_capability() {
        let f = Fixture::new("src/routes/[name].rs", "pub fn put(name: Path, cookie: Cookie) {}");
        let (classified, diags) = f.classify("put", &["name"], Capabilities::default());
        assert!(classified.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::COOKIE_CAPABILITY);
        assert_eq!(diags[0].category, Category::Classifier);
        assert_eq!(diags[0].location.parameter.as_deref(), Some("cookie"));
    }

    #[test]
    fn object_query_is_extended() {
        let f = Fixture::new(
            "routes/items.rs",
            "pub struct Filter { page: u32 }\npub type F = Filter;\npub fn get(q: Query<F>) {}",
        );
        let (classified, diags) = f.classify("get", &[], Capabilities::default());
        assert!(diags.is_empty());
        let bindings = classified.unwrap().bindings;
        assert!(matches!(bindings[0].binding, Binding::QueryExtended { .. }));
        assert_eq!(bindings[0].binding.extract_expression().as_deref(), Some("query"));
    }

    #[test]
    fn extended_query_conflicts_with_other_query() {
        let f = Fixture::new(
            "routes/items.rs",
            "pub struct Filter { page: u32 }\npub fn get(q: Query<Filter>, sort: Query) {}",
        );
        let (classified, diags) = f.classify("get", &[], Capabilities::default());
        assert!(classified.is_none());
        assert_eq!(diags[0].code, codes::QUERY_EXTENDED_CONFLICT);
    }

    #[test]
    fn named_object_query_is_a_single_field() {
        let f = Fixture::new(
            "routes/items.rs",
            "pub struct Filter { page: u32 }\npub fn get(q: Query<Filter, \"filter\">, sort: Query) {}",
        );
        let (classified, diags) = f.classify("get", &[], Capabilities::default());
        assert!(diags.is_empty());
        assert!(matches!(
            &classified.unwrap().bindings[0].binding,
            Binding::QueryParam { name, .. } if name == "filter"
        ));
    }

    #[test]
    fn body_and_body_prop_conflict() {
        let f = Fixture::new(
            "routes/items.rs",
            "pub struct Item { a: u8 }\npub fn post(item: Body<Item>, a: BodyProp<u8>) {}",
        );
        let (classified, diags) = f.classify("post", &[], Capabilities::default());
        assert!(classified.is_none());
        assert_eq!(diags[0].code, codes::BODY_CONFLICT);
    }

    #[test]
    fn path_must_be_in_url() {
        let f = Fixture::new("routes/items.rs", "pub fn get(id: Path) {}");
        let (_, diags) = f.classify("get", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::PATH_NOT_IN_URL);
    }

    #[test]
    fn wildcard_binds_by_declared_name() {
        let f = Fixture::new(
            "src/routes/files/[...rest].rs",
            "pub fn get(rest: Path) {}\npub fn put(_rest: Path<\"*\">) {}\npub fn delete(other: Path) {}",
        );
        let wildcard = Binding::PathParam {
            name: "*".to_string(),
        };
        for symbol in ["get", "put"] {
            let (classified, diags) = f.classify(symbol, &["*"], Capabilities::default());
            assert!(diags.is_empty(), "{}: {:?}", symbol, diags);
            assert_eq!(classified.unwrap().bindings[0].binding, wildcard);
        }
        let (_, diags) = f.classify("delete", &["*"], Capabilities::default());
        assert_eq!(diags[0].code, codes::PATH_NOT_IN_URL);
    }

    #[test]
    fn headers_are_lowercased() {
        let f = Fixture::new(
            "routes/items.rs",
            "pub fn get(cache: Header<\"Cache-Control\">, x_request_id: Header) {}",
        );
        let (classified, _) = f.classify("get", &[], Capabilities::default());
        let bindings = classified.unwrap().bindings;
        assert_eq!(
            bindings[0].binding,
            Binding::HeaderParam {
                name: "cache-control".to_string()
            }
        );
        assert_eq!(
            bindings[1].binding,
            Binding::HeaderParam {
                name: "x-request-id".to_string()
            }
        );
    }

    #[test]
    fn streaming_markers_only_on_websocket() {
        let f = Fixture::new(
            "routes/chat.rs",
            "pub fn get(conn: Conn) {}\npub fn ws(conn: Conn, sock: Sock) {}",
        );
        let (_, diags) = f.classify("get", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::STREAMING_ONLY);

        let ws = Capabilities {
            cookies: false,
            websocket: true,
        };
        let (classified, diags) = f.classify("ws", &[], ws);
        assert!(diags.is_empty());
        assert_eq!(classified.unwrap().bindings.len(), 2);

        let (_, diags) = f.classify("ws", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::WEBSOCKET_CAPABILITY);
    }

    #[test]
    fn offloaded_handlers_take_values_only() {
        let f = Fixture::new(
            "routes/work.rs",
            "/// @offload\npub fn post(n: BodyProp<u32>, req: Req) {}",
        );
        let (classified, diags) = f.classify("post", &[], Capabilities::default());
        assert!(classified.is_none());
        assert_eq!(diags[0].code, codes::OFFLOAD_ISOLATION);
        assert_eq!(diags[0].location.parameter.as_deref(), Some("req"));
    }

    #[test]
    fn unknown_resolver_is_rejected() {
        let f = Fixture::new(
            "routes/a.rs",
            "pub fn get(x: CustomParameter<Missing, \"a\">) {}",
        );
        let (_, diags) = f.classify("get", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::UNKNOWN_RESOLVER);
    }

    #[test]
    fn this_merges_controller_config() {
        let src = r#"
pub const AUTH: RouteConfig = RouteConfig {
    on_request: &[auth2],
    pre_handler: &[check],
    summary: "from config",
    rate_limit: 5,
};

/// @summary from docs
/// @onRequest auth
pub fn get(this: This<"getThing", AUTH>) {}

pub fn post(a: This, b: This) {}

pub fn put(this: This<"putThing", MISSING>) {}
"#;
        let f = Fixture::new("routes/thing.rs", src);
        let (classified, diags) = f.classify("get", &[], Capabilities::default());
        let classified = classified.unwrap();
        assert_eq!(classified.operation_id.as_deref(), Some("getThing"));
        assert_eq!(classified.hooks.on_request, vec!["auth", "auth2"]);
        assert_eq!(classified.hooks.pre_handler, vec!["check"]);
        assert_eq!(classified.options["summary"], Value::from("from docs"));
        assert_eq!(classified.options["rate_limit"], Value::from(5));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::CONFIG_OVERRIDDEN);

        let (_, diags) = f.classify("post", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::MULTIPLE_THIS);

        let (_, diags) = f.classify("put", &[], Capabilities::default());
        assert_eq!(diags[0].code, codes::UNKNOWN_ROUTE_CONFIG);
    }

    #[test]
    fn merge_modes() {
        let wrapper = RouteOptions {
            hooks: HookChains {
                on_request: vec!["a".to_string()],
                pre_handler: vec!["p".to_string()],
            },
            options: BTreeMap::new(),
        };
        let controller = RouteConfig {
            hooks: HookChains {
                on_request: vec!["b".to_string()],
                pre_handler: vec![],
            },
            options: BTreeMap::new(),
        };

        let append = merge_route_options(&wrapper, &controller, MergeMode::Append);
        assert_eq!(append.hooks.on_request, vec!["a", "b"]);
        assert_eq!(append.hooks.pre_handler, vec!["p"]);

        let replace = merge_route_options(&wrapper, &controller, MergeMode::Replace);
        assert_eq!(replace.hooks.on_request, vec!["b"]);
        assert_eq!(replace.hooks.pre_handler, vec!["p"]);
        assert!(replace.overridden.is_empty());
    }
}
