//! Lowering of `syn` syntax trees into [`TypeExpr`] and literal values.

use quote::ToTokens;
use serde_json::Value;
use syn::{
    Attribute, Expr, ExprLit, GenericArgument, Lit, LitStr, Meta, PathArguments, Type,
    TypeParamBound, UnOp,
};

use super::model::{Primitive, TypeExpr};

/// Source text of a type, for diagnostics.
pub(crate) fn type_text(ty: &Type) -> String {
    ty.to_token_stream().to_string()
}

/// One generic argument of a marker or wrapper type.
#[derive(Debug)]
pub(crate) enum GenericArg<'a> {
    Type(&'a Type),
    Literal(Value),
}

/// Generic arguments of a path segment, lifetimes dropped.
pub(crate) fn generic_args(arguments: &PathArguments) -> Result<Vec<GenericArg<'_>>, String> {
    let PathArguments::AngleBracketed(angle) = arguments else {
        return match arguments {
            PathArguments::None => Ok(Vec::new()),
            _ => Err("parenthesized type arguments are not supported".to_string()),
        };
    };

    let mut args = Vec::new();
    for arg in &angle.args {
        match arg {
            GenericArgument::Lifetime(_) => {}
            GenericArgument::Type(ty) => args.push(GenericArg::Type(ty)),
            GenericArgument::Const(expr) => match literal_value(expr) {
                Some(value) => args.push(GenericArg::Literal(value)),
                None => {
                    return Err(format!(
                        "generic argument `{}` is not a literal",
                        expr.to_token_stream()
                    ))
                }
            },
            other => {
                return Err(format!(
                    "unsupported generic argument `{}`",
                    other.to_token_stream()
                ))
            }
        }
    }
    Ok(args)
}

/// Literal value of an expression: string, integer, float, bool, negated
/// number, or a braced/parenthesized literal.
pub(crate) fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => lit_value(lit),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            match literal_value(&unary.expr)? {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(Value::from(-i))
                    } else if n.as_u64() == Some(i64::MIN.unsigned_abs()) {
                        Some(Value::from(i64::MIN))
                    } else {
                        n.as_f64().and_then(|f| serde_json::Number::from_f64(-f)).map(Value::Number)
                    }
                }
                _ => None,
            }
        }
        Expr::Paren(paren) => literal_value(&paren.expr),
        Expr::Group(group) => literal_value(&group.expr),
        Expr::Block(block) => match block.block.stmts.as_slice() {
            [syn::Stmt::Expr(inner, None)] => literal_value(inner),
            _ => None,
        },
        _ => None,
    }
}

fn lit_value(lit: &Lit) -> Option<Value> {
    match lit {
        Lit::Str(s) => Some(Value::String(s.value())),
        Lit::Char(c) => Some(Value::String(c.value().to_string())),
        Lit::Bool(b) => Some(Value::Bool(b.value)),
        Lit::Int(i) => i
            .base10_parse::<i64>()
            .map(Value::from)
            .or_else(|_| i.base10_parse::<u64>().map(Value::from))
            .or_else(|_| i.base10_parse::<f64>().map(Value::from))
            .ok(),
        Lit::Float(f) => f
            .base10_parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

/// Strip `&`, `&mut`, parentheses and invisible groups.
pub(crate) fn strip_reference(ty: &Type) -> &Type {
    match ty {
        Type::Reference(r) => strip_reference(&r.elem),
        Type::Paren(p) => strip_reference(&p.elem),
        Type::Group(g) => strip_reference(&g.elem),
        other => other,
    }
}

/// Lower a type into a [`TypeExpr`].
pub(crate) fn lower_type(ty: &Type) -> Result<TypeExpr, String> {
    match strip_reference(ty) {
        Type::Slice(slice) => Ok(TypeExpr::Array {
            items: Box::new(lower_type(&slice.elem)?),
        }),
        Type::Array(array) => Ok(TypeExpr::Array {
            items: Box::new(lower_type(&array.elem)?),
        }),
        Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(TypeExpr::primitive(Primitive::Null)),
        Type::Tuple(tuple) => Ok(TypeExpr::Tuple {
            elements: tuple.elems.iter().map(lower_type).collect::<Result<_, _>>()?,
        }),
        Type::ImplTrait(bounds) => future_output(bounds.bounds.iter())
            .ok_or_else(|| format!("`{}` is not a future", type_text(ty)))?,
        Type::TraitObject(object) => future_output(object.bounds.iter())
            .ok_or_else(|| format!("`{}` is not a future", type_text(ty)))?,
        Type::Path(path) if path.qself.is_none() => lower_path(&path.path, ty),
        other => Err(format!("unsupported type syntax `{}`", type_text(other))),
    }
}

/// `Output` of an `impl Future<Output = T>` / `dyn Future<Output = T>` bound.
fn future_output<'a>(
    mut bounds: impl Iterator<Item = &'a TypeParamBound>,
) -> Option<Result<TypeExpr, String>> {
    bounds.find_map(|bound| {
        let TypeParamBound::Trait(trait_bound) = bound else {
            return None;
        };
        let segment = trait_bound.path.segments.last()?;
        if segment.ident != "Future" {
            return None;
        }
        let PathArguments::AngleBracketed(angle) = &segment.arguments else {
            return Some(Ok(TypeExpr::primitive(Primitive::Null)));
        };
        angle.args.iter().find_map(|arg| match arg {
            GenericArgument::AssocType(assoc) if assoc.ident == "Output" => {
                Some(lower_type(&assoc.ty))
            }
            _ => None,
        })
    })
}

fn lower_path(path: &syn::Path, ty: &Type) -> Result<TypeExpr, String> {
    let segment = path
        .segments
        .last()
        .ok_or_else(|| "empty type path".to_string())?;
    let ident = segment.ident.to_string();
    let args = generic_args(&segment.arguments)?;
    let types: Vec<&Type> = args
        .iter()
        .filter_map(|arg| match arg {
            GenericArg::Type(ty) => Some(*ty),
            GenericArg::Literal(_) => None,
        })
        .collect();

    let single = |what: &str| -> Result<TypeExpr, String> {
        match types.as_slice() {
            [inner] => lower_type(inner),
            _ => Err(format!("`{}` expects one type argument {}", ident, what)),
        }
    };

    match ident.as_str() {
        "String" | "str" | "char" if args.is_empty() => Ok(TypeExpr::string()),
        "bool" if args.is_empty() => Ok(TypeExpr::primitive(Primitive::Boolean)),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize"
            if args.is_empty() =>
        {
            Ok(TypeExpr::primitive(Primitive::Integer))
        }
        "f32" | "f64" if args.is_empty() => Ok(TypeExpr::primitive(Primitive::Number)),
        "Value" if args.is_empty() => Ok(TypeExpr::Any),
        "Cow" => single("(the borrowed type)"),
        "Option" => Ok(TypeExpr::optional(single("")?)),
        "Box" | "Arc" | "Rc" | "Pin" => single(""),
        "Result" => match types.first() {
            Some(ok) => lower_type(ok),
            None => Err("`Result` expects a success type".to_string()),
        },
        "Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "BinaryHeap" => {
            Ok(TypeExpr::Array {
                items: Box::new(single("(the element type)")?),
            })
        }
        "HashMap" | "BTreeMap" => match types.as_slice() {
            [_, values] => Ok(TypeExpr::Map {
                values: Box::new(lower_type(values)?),
            }),
            _ => Err(format!("`{}` expects key and value types", ident)),
        },
        "Literal" => match args.as_slice() {
            [GenericArg::Literal(value)] => Ok(TypeExpr::Literal {
                value: value.clone(),
            }),
            _ => Err("`Literal` expects one literal argument".to_string()),
        },
        _ if args.is_empty() => Ok(TypeExpr::named(ident)),
        _ => Err(format!(
            "generic type `{}` is not supported",
            type_text(ty)
        )),
    }
}

/// Contents of `#[doc = "..."]` attributes, in order.
pub(crate) fn doc_lines(attrs: &[Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// The `#[serde(...)]` attributes that affect a schema.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SerdeAttrs {
    pub rename: Option<String>,
    pub rename_all: Option<String>,
    pub default: bool,
    pub skip: bool,
    pub skip_serializing_if: bool,
    pub flatten: bool,
}

pub(crate) fn serde_attrs(attrs: &[Attribute]) -> SerdeAttrs {
    let mut out = SerdeAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        // Unparseable serde attributes are left for rustc to report.
        let _ = attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .map(|ident| ident.to_string())
                .unwrap_or_default();
            match key.as_str() {
                "rename" | "rename_all" => {
                    let value = if meta.input.peek(syn::Token![=]) {
                        let lit: LitStr = meta.value()?.parse()?;
                        Some(lit.value())
                    } else {
                        let mut deserialize = None;
                        meta.parse_nested_meta(|inner| {
                            let lit: LitStr = inner.value()?.parse()?;
                            if inner.path.is_ident("deserialize") {
                                deserialize = Some(lit.value());
                            }
                            Ok(())
                        })?;
                        deserialize
                    };
                    if key == "rename" {
                        out.rename = value;
                    } else {
                        out.rename_all = value;
                    }
                }
                "default" => {
                    out.default = true;
                    if meta.input.peek(syn::Token![=]) {
                        let _: LitStr = meta.value()?.parse()?;
                    }
                }
                "skip" | "skip_deserializing" => out.skip = true,
                "skip_serializing_if" => {
                    out.skip_serializing_if = true;
                    let _: LitStr = meta.value()?.parse()?;
                }
                "flatten" => out.flatten = true,
                _ => {
                    if meta.input.peek(syn::Token![=]) {
                        let _: Expr = meta.value()?.parse()?;
                    } else if meta.input.peek(syn::token::Paren) {
                        meta.parse_nested_meta(|inner| {
                            if inner.input.peek(syn::Token![=]) {
                                let _: Expr = inner.value()?.parse()?;
                            }
                            Ok(())
                        })?;
                    }
                }
            }
            Ok(())
        });
    }
    out
}

/// Apply a serde `rename_all` rule to a field or variant name.
pub(crate) fn apply_rename_rule(name: &str, rule: &str) -> String {
    let words = split_words(name);
    let capitalize = |word: &str| {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase(),
            None => String::new(),
        }
    };
    match rule {
        "lowercase" => name.to_lowercase(),
        "UPPERCASE" => name.to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
            .collect(),
        "snake_case" => join_words(&words, "_", false),
        "SCREAMING_SNAKE_CASE" => join_words(&words, "_", true),
        "kebab-case" => join_words(&words, "-", false),
        "SCREAMING-KEBAB-CASE" => join_words(&words, "-", true),
        _ => name.to_string(),
    }
}

fn join_words(words: &[String], separator: &str, upper: bool) -> String {
    words
        .iter()
        .map(|w| if upper { w.to_uppercase() } else { w.to_lowercase() })
        .collect::<Vec<_>>()
        .join(separator)
}

/// `user_name` and `UserName` both split into `["user", "name"]`-like words.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for part in name.split('_').filter(|p| !p.is_empty()) {
        let mut current = String::new();
        for c in part.chars() {
            if c.is_ascii_uppercase() && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str) -> Result<TypeExpr, String> {
        let ty: Type = syn::parse_str(src).unwrap();
        lower_type(&ty)
    }

    #[test]
    fn integer_literals_beyond_i64() {
        let value = |src: &str| literal_value(&syn::parse_str::<Expr>(src).unwrap());
        assert_eq!(value("42"), Some(Value::from(42)));
        assert_eq!(value("-7"), Some(Value::from(-7)));
        assert_eq!(value("18446744073709551615"), Some(Value::from(u64::MAX)));
        assert_eq!(value("-9223372036854775808"), Some(Value::from(i64::MIN)));
        assert_eq!(value("100000000000000000000").and_then(|v| v.as_f64()), Some(1e20));
        assert_eq!(value("1_000u64"), Some(Value::from(1000)));
    }

    #[test]
    fn lower_primitives() {
        assert_eq!(lower("String").unwrap(), TypeExpr::string());
        assert_eq!(lower("&'static str").unwrap(), TypeExpr::string());
        assert_eq!(
            lower("u64").unwrap(),
            TypeExpr::primitive(Primitive::Integer)
        );
        assert_eq!(lower("f32").unwrap(), TypeExpr::primitive(Primitive::Number));
        assert_eq!(lower("bool").unwrap(), TypeExpr::primitive(Primitive::Boolean));
        assert_eq!(lower("()").unwrap(), TypeExpr::primitive(Primitive::Null));
        assert_eq!(lower("serde_json::Value").unwrap(), TypeExpr::Any);
        assert_eq!(lower("Cow<'a, str>").unwrap(), TypeExpr::string());
    }

    #[test]
    fn unwrap_transparent_wrappers() {
        assert_eq!(lower("Box<Arc<u8>>").unwrap(), TypeExpr::primitive(Primitive::Integer));
        assert_eq!(
            lower("Result<String, MyError>").unwrap(),
            TypeExpr::string()
        );
        assert_eq!(
            lower("impl Future<Output = Greeting>").unwrap(),
            TypeExpr::named("Greeting")
        );
        assert_eq!(
            lower("Pin<Box<dyn Future<Output = u8> + Send>>").unwrap(),
            TypeExpr::primitive(Primitive::Integer)
        );
        assert_eq!(
            lower("Option<String>").unwrap(),
            TypeExpr::optional(TypeExpr::string())
        );
    }

    #[test]
    fn lower_collections() {
        assert_eq!(
            lower("Vec<String>").unwrap(),
            TypeExpr::Array {
                items: Box::new(TypeExpr::string())
            }
        );
        assert_eq!(
            lower("[u8; 4]").unwrap(),
            TypeExpr::Array {
                items: Box::new(TypeExpr::primitive(Primitive::Integer))
            }
        );
        assert_eq!(
            lower("BTreeMap<String, f64>").unwrap(),
            TypeExpr::Map {
                values: Box::new(TypeExpr::primitive(Primitive::Number))
            }
        );
        assert_eq!(
            lower("(String, u8)").unwrap(),
            TypeExpr::Tuple {
                elements: vec![TypeExpr::string(), TypeExpr::primitive(Primitive::Integer)]
            }
        );
    }

    #[test]
    fn lower_literals() {
        assert_eq!(
            lower(r#"Literal<"admin">"#).unwrap(),
            TypeExpr::Literal {
                value: Value::from("admin")
            }
        );
        assert_eq!(
            lower("Literal<{ -3 }>").unwrap(),
            TypeExpr::Literal {
                value: Value::from(-3)
            }
        );
        assert_eq!(
            lower("Literal<true>").unwrap(),
            TypeExpr::Literal {
                value: Value::Bool(true)
            }
        );
    }

    #[test]
    fn reject_unsupported_types() {
        assert!(lower("Wrapper<String>").is_err());
        assert!(lower("fn(u8) -> u8").is_err());
        assert!(lower("impl Iterator<Item = u8>").is_err());
        assert!(lower("<T as Trait>::Assoc").is_err());
    }

    #[test]
    fn serde_field_attributes() {
        let item: syn::ItemStruct = syn::parse_quote! {
            struct S {
                #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
                user_name: Option<String>,
            }
        };
        let attrs = serde_attrs(&item.fields.iter().next().unwrap().attrs);
        assert_eq!(attrs.rename.as_deref(), Some("userName"));
        assert!(attrs.default);
        assert!(attrs.skip_serializing_if);
        assert!(!attrs.skip);
    }

    #[test]
    fn serde_attributes_after_unknown_keys() {
        let item: syn::ItemStruct = syn::parse_quote! {
            struct S {
                #[serde(with = "my_module", skip)]
                internal: u8,
            }
        };
        assert!(serde_attrs(&item.fields.iter().next().unwrap().attrs).skip);
    }

    #[test]
    fn rename_rules() {
        assert_eq!(apply_rename_rule("user_name", "camelCase"), "userName");
        assert_eq!(apply_rename_rule("user_name", "PascalCase"), "UserName");
        assert_eq!(apply_rename_rule("user_name", "kebab-case"), "user-name");
        assert_eq!(apply_rename_rule("NotFound", "snake_case"), "not_found");
        assert_eq!(apply_rename_rule("NotFound", "SCREAMING_SNAKE_CASE"), "NOT_FOUND");
        assert_eq!(apply_rename_rule("NotFound", "lowercase"), "notfound");
    }

    #[test]
    fn doc_attribute_lines() {
        let item: syn::ItemFn = syn::parse_quote! {
            /// first
            /// @tag x
            pub fn get() {}
        };
        assert_eq!(doc_lines(&item.attrs), vec![" first", " @tag x"]);
    }
}
