//! Controller source analysis.
//!
//! Reads the item-level declarations of one controller file: verb-named
//! handlers, `RouteConfig` constants and the types they refer to. Function
//! bodies are never inspected.

use std::collections::BTreeSet;

use regex_lite::Regex;
use serde_json::Value;
use syn::spanned::Spanned;
use syn::{
    Expr, Fields, FnArg, Generics, GenericParam, Item, ItemConst, ItemEnum, ItemFn, ItemStruct,
    ItemType, Member, Pat, ReturnType, Type, Visibility,
};

use super::docs::parse_doc_lines;
use super::model::{
    ControllerExport, ExportKind, FieldDecl, HandlerExport, HandlerRole, Marker,
    MergeMode, ParameterSlot, ParsedController, Primitive, RouteConfig, RouteKind, TypeDecl,
    TypeDeclKind, TypeExpr, TypeSignature, VariantDecl, VariantShape,
};
use super::syntax::{
    apply_rename_rule, doc_lines, generic_args, literal_value, lower_type, serde_attrs,
    strip_reference, type_text, GenericArg,
};
use crate::artifact::compute_sha256;
use crate::config::{ConfigError, ProjectConfig};
use crate::diagnostics::{codes, Category, Diagnostic, Location};
use crate::route::url::{controller_segments, default_operation_id, Segment};

/// Inputs to controller analysis that come from project configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub prefix: Regex,
    /// Declared custom resolver names.
    pub resolvers: BTreeSet<String>,
}

impl ParseOptions {
    pub fn from_config(config: &ProjectConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            prefix: config.prefix_regex()?,
            resolvers: config.resolver_names(),
        })
    }
}

/// Role of a function named after an HTTP verb (or `ws`).
pub fn handler_role(name: &str) -> Option<HandlerRole> {
    let lower = name.to_ascii_lowercase();
    let (method, kind) = match lower.as_str() {
        "get" | "post" | "put" | "delete" | "patch" | "head" | "options" => {
            (lower.to_ascii_uppercase(), RouteKind::Http)
        }
        "ws" => ("GET".to_string(), RouteKind::WebSocket),
        _ => return None,
    };
    Some(HandlerRole { method, kind })
}

/// Analyze one controller.
///
/// Never fails: problems are returned as diagnostics and the offending
/// export is left out of the result.
pub fn parse_controller(
    path: &str,
    content: &str,
    options: &ParseOptions,
) -> (ParsedController, Vec<Diagnostic>) {
    let mut parsed = ParsedController {
        path: path.to_string(),
        sha256: compute_sha256(content.as_bytes()),
        ..ParsedController::default()
    };
    let mut diagnostics = Vec::new();

    let file = match syn::parse_file(content) {
        Ok(file) => file,
        Err(e) => {
            diagnostics.push(Diagnostic::error(
                Category::Analysis,
                codes::SOURCE_PARSE,
                format!("failed to parse controller: {}", e),
                Location::file(path).at_line(e.span().start().line),
            ));
            return (parsed, diagnostics);
        }
    };

    // Path errors are reported by the route builder.
    let segments = controller_segments(path, &options.prefix).unwrap_or_default();
    let mut analyzer = Analyzer {
        path,
        options,
        segments,
        diagnostics: &mut diagnostics,
    };

    for item in &file.items {
        match item {
            Item::Fn(f) => {
                if let Some(export) = analyzer.handler(f) {
                    parsed.exports.push(export);
                }
            }
            Item::Const(c) => {
                if let Some(export) = analyzer.route_config(c) {
                    parsed.exports.push(export);
                }
            }
            Item::Struct(s) => parsed.types.push(analyzer.struct_decl(s)),
            Item::Enum(e) => parsed.types.push(analyzer.enum_decl(e)),
            Item::Type(t) => parsed.types.push(analyzer.alias_decl(t)),
            _ => {}
        }
    }

    tracing::debug!(
        controller = %path,
        exports = parsed.exports.len(),
        types = parsed.types.len(),
        "controller parsed"
    );
    (parsed, diagnostics)
}

struct Analyzer<'a> {
    path: &'a str,
    options: &'a ParseOptions,
    segments: Vec<Segment>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

/// A parameter type resolved to its marker.
#[derive(Debug)]
struct MarkerSlot {
    marker: Marker,
    ty: TypeExpr,
    optional: bool,
}

#[derive(Debug)]
enum MarkerError {
    Unresolved(String),
    Malformed(String),
    Unsupported(String),
}

impl MarkerError {
    fn into_diagnostic(self, location: Location) -> Diagnostic {
        match self {
            MarkerError::Unresolved(msg) => Diagnostic::error(
                Category::Analysis,
                codes::UNRESOLVED_PARAMETER,
                msg,
                location,
            ),
            MarkerError::Malformed(msg) => {
                Diagnostic::error(Category::Analysis, codes::MALFORMED_MARKER, msg, location)
            }
            MarkerError::Unsupported(msg) => {
                Diagnostic::error(Category::Schema, codes::UNSUPPORTED_TYPE, msg, location)
            }
        }
    }
}

impl Analyzer<'_> {
    fn handler(&mut self, f: &ItemFn) -> Option<ControllerExport> {
        let symbol = f.sig.ident.to_string();
        let role = handler_role(&symbol)?;
        let line = f.sig.ident.span().start().line;
        let location = Location::file(self.path)
            .at_line(line)
            .with_symbol(symbol.as_str());

        if !matches!(f.vis, Visibility::Public(_)) {
            self.diagnostics.push(Diagnostic::warning(
                Category::Analysis,
                codes::UNEXPORTED_HANDLER,
                format!("`{}` is named like a handler but is not `pub`; no route is generated", symbol),
                location,
            ));
            return None;
        }

        let (docs, unknown_tags) = parse_doc_lines(&doc_lines(&f.attrs));
        for tag in unknown_tags {
            self.diagnostics.push(Diagnostic::warning(
                Category::Analysis,
                codes::UNKNOWN_DOC_TAG,
                format!("unknown doc tag `@{}`", tag),
                location.clone(),
            ));
        }

        let mut failed = false;
        let mut parameters = Vec::new();
        for (index, input) in f.sig.inputs.iter().enumerate() {
            let FnArg::Typed(pat_type) = input else {
                self.diagnostics.push(Diagnostic::error(
                    Category::Analysis,
                    codes::UNRESOLVED_PARAMETER,
                    "handlers cannot take `self`",
                    location.clone(),
                ));
                failed = true;
                continue;
            };
            let name = parameter_name(&pat_type.pat, index);
            let param_line = pat_type.span().start().line;
            match resolve_marker(&pat_type.ty, &self.options.resolvers) {
                Ok(slot) => parameters.push(ParameterSlot {
                    name,
                    ty: slot.ty,
                    marker: slot.marker,
                    optional: slot.optional,
                    line: param_line,
                }),
                Err(err) => {
                    self.diagnostics.push(err.into_diagnostic(
                        location.clone().at_line(param_line).with_parameter(name),
                    ));
                    failed = true;
                }
            }
        }

        let response = match &f.sig.output {
            ReturnType::Default => TypeExpr::primitive(Primitive::Null),
            ReturnType::Type(_, ty) => match lower_type(ty) {
                Ok(ty) => ty,
                Err(reason) => {
                    self.diagnostics.push(Diagnostic::error(
                        Category::Schema,
                        codes::UNSUPPORTED_TYPE,
                        format!("unsupported return type: {}", reason),
                        location.clone(),
                    ));
                    failed = true;
                    TypeExpr::Any
                }
            },
        };

        if failed {
            return None;
        }

        Some(ControllerExport {
            symbol: symbol.clone(),
            line,
            kind: ExportKind::Handler(HandlerExport {
                role,
                signature: TypeSignature { parameters },
                response,
                docs,
                default_operation_id: default_operation_id(&self.segments, &symbol),
                is_async: f.sig.asyncness.is_some(),
            }),
        })
    }

    fn route_config(&mut self, c: &ItemConst) -> Option<ControllerExport> {
        if !matches!(c.vis, Visibility::Public(_)) {
            return None;
        }
        let Type::Path(ty) = strip_reference(&c.ty) else {
            return None;
        };
        if !ty.path.segments.last().is_some_and(|s| s.ident == "RouteConfig") {
            return None;
        }

        let symbol = c.ident.to_string();
        let line = c.ident.span().start().line;
        let location = Location::file(self.path)
            .at_line(line)
            .with_symbol(symbol.as_str());

        let Expr::Struct(literal) = &*c.expr else {
            self.diagnostics.push(Diagnostic::error(
                Category::Analysis,
                codes::MALFORMED_MARKER,
                "`RouteConfig` constants must be written as a struct literal",
                location,
            ));
            return None;
        };

        let mut config = RouteConfig::default();
        let mut failed = false;
        for field in &literal.fields {
            let Member::Named(ident) = &field.member else {
                continue;
            };
            let key = ident.to_string();
            let result = match key.as_str() {
                "on_request" => hook_list(&field.expr).map(|h| config.hooks.on_request = h),
                "pre_handler" => hook_list(&field.expr).map(|h| config.hooks.pre_handler = h),
                _ => config_value(&field.expr)
                    .map(|value| {
                        config.options.insert(key.clone(), value);
                    })
                    .ok_or_else(|| format!("field `{}` must be a literal value", key)),
            };
            if let Err(msg) = result {
                self.diagnostics.push(Diagnostic::error(
                    Category::Analysis,
                    codes::MALFORMED_MARKER,
                    msg,
                    location.clone(),
                ));
                failed = true;
            }
        }

        if failed {
            return None;
        }
        Some(ControllerExport {
            symbol,
            line,
            kind: ExportKind::Config(config),
        })
    }

    fn struct_decl(&self, s: &ItemStruct) -> TypeDecl {
        let kind = if has_type_params(&s.generics) {
            generic_unsupported()
        } else {
            let rename_all = serde_attrs(&s.attrs).rename_all;
            match &s.fields {
                Fields::Named(named) => match lower_fields(&named.named, rename_all.as_deref()) {
                    Ok(fields) => TypeDeclKind::Struct { fields },
                    Err(reason) => TypeDeclKind::Unsupported { reason },
                },
                Fields::Unnamed(unnamed) => {
                    let elements: Result<Vec<TypeExpr>, String> =
                        unnamed.unnamed.iter().map(|f| lower_type(&f.ty)).collect();
                    match elements {
                        Ok(mut elements) if elements.len() == 1 => TypeDeclKind::Alias {
                            target: elements.remove(0),
                        },
                        Ok(elements) => TypeDeclKind::Alias {
                            target: TypeExpr::Tuple { elements },
                        },
                        Err(reason) => TypeDeclKind::Unsupported { reason },
                    }
                }
                Fields::Unit => TypeDeclKind::Alias {
                    target: TypeExpr::primitive(Primitive::Null),
                },
            }
        };
        self.decl(&s.ident, kind)
    }

    fn enum_decl(&self, e: &ItemEnum) -> TypeDecl {
        if has_type_params(&e.generics) {
            return self.decl(&e.ident, generic_unsupported());
        }
        let rename_all = serde_attrs(&e.attrs).rename_all;

        let mut variants = Vec::new();
        for variant in &e.variants {
            let attrs = serde_attrs(&variant.attrs);
            if attrs.skip {
                continue;
            }
            let ident = variant.ident.to_string();
            let name = match (&attrs.rename, &rename_all) {
                (Some(rename), _) => rename.clone(),
                (None, Some(rule)) => apply_rename_rule(&ident, rule),
                (None, None) => ident,
            };
            let shape = match &variant.fields {
                Fields::Unit => Ok(VariantShape::Unit),
                Fields::Unnamed(unnamed) => {
                    let elements: Result<Vec<TypeExpr>, String> =
                        unnamed.unnamed.iter().map(|f| lower_type(&f.ty)).collect();
                    elements.map(|mut elements| {
                        if elements.len() == 1 {
                            VariantShape::Single {
                                ty: elements.remove(0),
                            }
                        } else {
                            VariantShape::Single {
                                ty: TypeExpr::Tuple { elements },
                            }
                        }
                    })
                }
                Fields::Named(named) => {
                    lower_fields(&named.named, None).map(|fields| VariantShape::Fields { fields })
                }
            };
            match shape {
                Ok(shape) => variants.push(VariantDecl { name, shape }),
                Err(reason) => {
                    return self.decl(&e.ident, TypeDeclKind::Unsupported { reason });
                }
            }
        }
        self.decl(&e.ident, TypeDeclKind::Enum { variants })
    }

    fn alias_decl(&self, t: &ItemType) -> TypeDecl {
        let kind = if has_type_params(&t.generics) {
            generic_unsupported()
        } else {
            match lower_type(&t.ty) {
                Ok(target) => TypeDeclKind::Alias { target },
                Err(reason) => TypeDeclKind::Unsupported { reason },
            }
        };
        self.decl(&t.ident, kind)
    }

    fn decl(&self, ident: &syn::Ident, kind: TypeDeclKind) -> TypeDecl {
        TypeDecl {
            name: ident.to_string(),
            file: self.path.to_string(),
            line: ident.span().start().line,
            kind,
        }
    }
}

/// Parameter name from its pattern: `name`, `_name`, `Path(name)`.
fn parameter_name(pat: &Pat, index: usize) -> String {
    match pat {
        Pat::Ident(ident) => ident.ident.to_string().trim_start_matches('_').to_string(),
        Pat::TupleStruct(tuple) if tuple.elems.len() == 1 => match tuple.elems.first() {
            Some(inner) => parameter_name(inner, index),
            None => format!("arg{}", index),
        },
        Pat::Reference(reference) => parameter_name(&reference.pat, index),
        Pat::Type(typed) => parameter_name(&typed.pat, index),
        _ => format!("arg{}", index),
    }
}

fn resolve_marker(ty: &Type, resolvers: &BTreeSet<String>) -> Result<MarkerSlot, MarkerError> {
    let ty = strip_reference(ty);
    let Type::Path(type_path) = ty else {
        return Err(MarkerError::Unresolved(format!(
            "`{}` is not a parameter marker",
            type_text(ty)
        )));
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Err(MarkerError::Unresolved("empty parameter type".to_string()));
    };
    let ident = segment.ident.to_string();
    let args = generic_args(&segment.arguments).map_err(MarkerError::Malformed)?;

    let value = |marker: Marker| MarkerSlot {
        marker,
        ty: TypeExpr::string(),
        optional: false,
    };
    let raw = |marker: Marker| -> Result<MarkerSlot, MarkerError> {
        if !args.is_empty() {
            return Err(MarkerError::Malformed(format!(
                "`{}` takes no type arguments",
                ident
            )));
        }
        Ok(MarkerSlot {
            marker,
            ty: TypeExpr::Any,
            optional: false,
        })
    };

    match ident.as_str() {
        "Option" => match args.as_slice() {
            [GenericArg::Type(inner)] => {
                let mut slot = resolve_marker(inner, resolvers)?;
                slot.optional = true;
                Ok(slot)
            }
            _ => Err(MarkerError::Malformed(
                "`Option` around a marker expects one type argument".to_string(),
            )),
        },
        "Path" => Ok(value(Marker::Path {
            name: name_only(&ident, &args)?,
        })),
        "Header" => Ok(value(Marker::Header {
            name: name_only(&ident, &args)?,
        })),
        "Cookie" => Ok(value(Marker::Cookie {
            name: name_only(&ident, &args)?,
        })),
        "Query" => {
            let (ty, name) = typed_with_name(&ident, &args, Some(TypeExpr::string()))?;
            let (inner, optional) = split_optional(ty);
            Ok(MarkerSlot {
                marker: Marker::Query {
                    ty: inner.clone(),
                    name,
                },
                ty: inner,
                optional,
            })
        }
        "Body" => {
            let (ty, name) = typed_with_name(&ident, &args, None)?;
            if name.is_some() {
                return Err(MarkerError::Malformed(
                    "`Body` takes only a type; use `BodyProp` for a single field".to_string(),
                ));
            }
            let (inner, optional) = split_optional(ty);
            Ok(MarkerSlot {
                marker: Marker::Body { ty: inner.clone() },
                ty: inner,
                optional,
            })
        }
        "BodyProp" => {
            let (ty, path) = typed_with_name(&ident, &args, None)?;
            let (inner, optional) = split_optional(ty);
            Ok(MarkerSlot {
                marker: Marker::BodyProp {
                    ty: inner.clone(),
                    path,
                },
                ty: inner,
                optional,
            })
        }
        "Req" => raw(Marker::RawRequest),
        "Rep" => raw(Marker::RawReply),
        "Conn" => raw(Marker::Connection),
        "Sock" => raw(Marker::Socket),
        "This" => this_marker(&args).map(|marker| MarkerSlot {
            marker,
            ty: TypeExpr::Any,
            optional: false,
        }),
        "CustomParameter" => {
            let Some((GenericArg::Type(resolver), rest)) = args.split_first() else {
                return Err(MarkerError::Malformed(
                    "`CustomParameter` expects a resolver type first".to_string(),
                ));
            };
            let resolver = match strip_reference(resolver) {
                Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
                _ => None,
            }
            .ok_or_else(|| {
                MarkerError::Malformed(format!(
                    "`{}` is not a resolver name",
                    type_text(resolver)
                ))
            })?;
            custom(resolver, rest)
        }
        name if resolvers.contains(name) => custom(name.to_string(), &args),
        _ => Err(MarkerError::Unresolved(format!(
            "`{}` is not a parameter marker or a configured resolver",
            type_text(ty)
        ))),
    }
}

fn custom(resolver: String, args: &[GenericArg<'_>]) -> Result<MarkerSlot, MarkerError> {
    let args = args
        .iter()
        .map(|arg| match arg {
            GenericArg::Literal(value) => Ok(value.clone()),
            GenericArg::Type(ty) => Err(MarkerError::Malformed(format!(
                "static resolver argument `{}` must be a literal",
                type_text(ty)
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MarkerSlot {
        marker: Marker::CustomParameter { resolver, args },
        ty: TypeExpr::Any,
        optional: false,
    })
}

/// `Path`, `Path<"seg">`.
fn name_only(ident: &str, args: &[GenericArg<'_>]) -> Result<Option<String>, MarkerError> {
    match args {
        [] => Ok(None),
        [GenericArg::Literal(Value::String(name))] => Ok(Some(name.clone())),
        _ => Err(MarkerError::Malformed(format!(
            "`{}` accepts only a name literal, e.g. `{}<\"name\">`",
            ident, ident
        ))),
    }
}

/// `Query`, `Query<T>`, `Query<"n">`, `Query<T, "n">`.
fn typed_with_name(
    ident: &str,
    args: &[GenericArg<'_>],
    default: Option<TypeExpr>,
) -> Result<(TypeExpr, Option<String>), MarkerError> {
    let lower = |ty: &Type| lower_type(ty).map_err(MarkerError::Unsupported);
    let missing_type = || MarkerError::Malformed(format!("`{}` requires a type argument", ident));
    match args {
        [] => default.map(|ty| (ty, None)).ok_or_else(missing_type),
        [GenericArg::Literal(Value::String(name))] => default
            .map(|ty| (ty, Some(name.clone())))
            .ok_or_else(missing_type),
        [GenericArg::Type(ty)] => Ok((lower(ty)?, None)),
        [GenericArg::Type(ty), GenericArg::Literal(Value::String(name))] => {
            Ok((lower(ty)?, Some(name.clone())))
        }
        _ => Err(MarkerError::Malformed(format!(
            "`{}` expects `{}<Type>`, `{}<\"name\">` or `{}<Type, \"name\">`",
            ident, ident, ident, ident
        ))),
    }
}

/// `This`, `This<"opId">`, `This<"opId", CONFIG>`, `This<"opId", CONFIG, Replace>`.
fn this_marker(args: &[GenericArg<'_>]) -> Result<Marker, MarkerError> {
    let mut operation_id = None;
    let mut config = None;
    let mut merge = None;

    for arg in args {
        match arg {
            GenericArg::Literal(Value::String(id)) if operation_id.is_none() => {
                operation_id = Some(id.clone());
            }
            GenericArg::Type(ty) => {
                let name = match strip_reference(ty) {
                    Type::Path(p) if p.path.segments.len() == 1 => {
                        p.path.segments.last().map(|s| s.ident.to_string())
                    }
                    _ => None,
                };
                match name.as_deref() {
                    Some("Append") if merge.is_none() => merge = Some(MergeMode::Append),
                    Some("Replace") if merge.is_none() => merge = Some(MergeMode::Replace),
                    Some(name) if config.is_none() && !matches!(name, "Append" | "Replace") => {
                        config = Some(name.to_string())
                    }
                    _ => {
                        return Err(MarkerError::Malformed(format!(
                            "unexpected `This` argument `{}`",
                            type_text(ty)
                        )))
                    }
                }
            }
            GenericArg::Literal(other) => {
                return Err(MarkerError::Malformed(format!(
                    "unexpected `This` argument `{}`",
                    other
                )))
            }
        }
    }

    Ok(Marker::ThisContext {
        operation_id,
        config,
        merge: merge.unwrap_or_default(),
    })
}

fn split_optional(ty: TypeExpr) -> (TypeExpr, bool) {
    let (inner, optional) = ty.unwrap_optional();
    (inner.clone(), optional)
}

fn has_type_params(generics: &Generics) -> bool {
    generics
        .params
        .iter()
        .any(|param| !matches!(param, GenericParam::Lifetime(_)))
}

fn generic_unsupported() -> TypeDeclKind {
    TypeDeclKind::Unsupported {
        reason: "generic type declarations are not supported".to_string(),
    }
}

fn lower_fields<'a>(
    fields: impl IntoIterator<Item = &'a syn::Field>,
    rename_all: Option<&str>,
) -> Result<Vec<FieldDecl>, String> {
    let mut out = Vec::new();
    for field in fields {
        let attrs = serde_attrs(&field.attrs);
        if attrs.skip {
            continue;
        }
        let ident = field
            .ident
            .as_ref()
            .map(|i| i.to_string().trim_start_matches("r#").to_string())
            .unwrap_or_default();
        if attrs.flatten {
            return Err(format!("`#[serde(flatten)]` on field `{}` is not supported", ident));
        }
        let name = match (attrs.rename, rename_all) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => apply_rename_rule(&ident, rule),
            (None, None) => ident,
        };
        let (ty, optional) = split_optional(lower_type(&field.ty)?);
        out.push(FieldDecl {
            name,
            ty,
            optional: optional || attrs.default || attrs.skip_serializing_if,
        });
    }
    Ok(out)
}

/// `&[a, b]`, `&["a"]`, `&[hooks::auth]` → hook names.
fn hook_list(expr: &Expr) -> Result<Vec<String>, String> {
    let inner = match expr {
        Expr::Reference(reference) => &*reference.expr,
        other => other,
    };
    let Expr::Array(array) = inner else {
        return Err("hook lists must be array literals such as `&[auth]`".to_string());
    };
    array
        .elems
        .iter()
        .map(|elem| match elem {
            Expr::Path(path) => Ok(path
                .path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect::<Vec<_>>()
                .join("::")),
            other => match literal_value(other) {
                Some(Value::String(name)) => Ok(name),
                _ => Err("hook entries must be paths or string literals".to_string()),
            },
        })
        .collect()
}

/// Literal config values: literals, `None`, and (nested) arrays of them.
fn config_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Reference(reference) => config_value(&reference.expr),
        Expr::Array(array) => array
            .elems
            .iter()
            .map(config_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expr::Path(path) if path.path.is_ident("None") => Some(Value::Null),
        other => literal_value(other),
    }
}
