//! Signature analysis.
//!
//! Turns controller sources into [`ParsedController`] records and builds the
//! project-wide [`TypeTable`] the later stages resolve names against.

mod docs;
pub mod model;
mod parser;
mod syntax;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

pub use docs::parse_doc_lines;
pub use model::*;
pub use parser::{handler_role, parse_controller, ParseOptions};

use crate::diagnostics::{codes, Category, Diagnostic, Location};

/// Every type declared across the compiled controllers, by name.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    decls: BTreeMap<String, TypeDecl>,
}

impl TypeTable {
    /// Build the table. Duplicate names resolve to the declaration in the
    /// first controller by path; a differing duplicate is reported.
    pub fn build<'a>(
        controllers: impl IntoIterator<Item = &'a ParsedController>,
    ) -> (Self, Vec<Diagnostic>) {
        let mut sorted: Vec<&ParsedController> = controllers.into_iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut decls: BTreeMap<String, TypeDecl> = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for controller in sorted {
            for decl in &controller.types {
                match decls.entry(decl.name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(decl.clone());
                    }
                    Entry::Occupied(existing) => {
                        let existing = existing.get();
                        if existing.kind != decl.kind {
                            diagnostics.push(Diagnostic::warning(
                                Category::Analysis,
                                codes::SHADOWED_TYPE,
                                format!(
                                    "type `{}` is also declared in {}:{}; this declaration is ignored",
                                    decl.name, existing.file, existing.line
                                ),
                                Location::file(&decl.file)
                                    .at_line(decl.line)
                                    .with_symbol(&decl.name),
                            ));
                        }
                    }
                }
            }
        }
        (Self { decls }, diagnostics)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.decls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// Report every name a handler mentions that no controller declares.
pub fn check_references(
    file: &str,
    symbol: &str,
    line: usize,
    handler: &HandlerExport,
    table: &TypeTable,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let location = Location::file(file).at_line(line).with_symbol(symbol);

    for slot in &handler.signature.parameters {
        let mut missing = BTreeSet::new();
        slot.ty.for_each_named(&mut |name| {
            if !table.contains(name) {
                missing.insert(name);
            }
        });
        for name in missing {
            diagnostics.push(Diagnostic::error(
                Category::Analysis,
                codes::UNRESOLVED_TYPE,
                format!("type `{}` is not declared in any controller", name),
                location
                    .clone()
                    .at_line(slot.line)
                    .with_parameter(&slot.name),
            ));
        }
    }

    let mut missing = BTreeSet::new();
    handler.response.for_each_named(&mut |name| {
        if !table.contains(name) {
            missing.insert(name);
        }
    });
    for name in missing {
        diagnostics.push(Diagnostic::error(
            Category::Analysis,
            codes::UNRESOLVED_TYPE,
            format!(
                "return type `{}` is not declared in any controller",
                name
            ),
            location.clone(),
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PREFIX;
    use regex_lite::Regex;

    fn parse(path: &str, src: &str) -> ParsedController {
        let options = ParseOptions {
            prefix: Regex::new(DEFAULT_PREFIX).unwrap(),
            resolvers: BTreeSet::new(),
        };
        parse_controller(path, src, &options).0
    }

    #[test]
    fn first_declaration_by_path_wins() {
        let b = parse("routes/b.rs", "pub struct User { name: String }");
        let a = parse("routes/a.rs", "pub struct User { id: u64 }");
        let (table, diags) = TypeTable::build([&b, &a]);
        assert_eq!(table.get("User").unwrap().file, "routes/a.rs");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::SHADOWED_TYPE);
        assert_eq!(diags[0].location.file, "routes/b.rs");
    }

    #[test]
    fn identical_duplicates_are_silent() {
        let a = parse("routes/a.rs", "pub struct User { id: u64 }");
        let b = parse("routes/b.rs", "pub struct User { id: u64 }");
        let (table, diags) = TypeTable::build([&a, &b]);
        assert_eq!(table.len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn unresolved_references_are_reported_per_parameter() {
        let c = parse(
            "routes/a.rs",
            "pub struct Known { x: u8 }\npub fn post(body: Body<Missing>, q: Query<Known>) -> Vec<Other> {}",
        );
        let (table, _) = TypeTable::build([&c]);
        let export = &c.exports[0];
        let ExportKind::Handler(handler) = &export.kind else {
            panic!("expected handler");
        };
        let diags = check_references(&c.path, &export.symbol, export.line, handler, &table);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.code == codes::UNRESOLVED_TYPE));
        assert_eq!(diags[0].location.parameter.as_deref(), Some("body"));
        assert!(diags[1].message.contains("Other"));
    }
}
