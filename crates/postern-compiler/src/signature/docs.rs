//! Handler doc-comment metadata.
//!
//! Free text becomes the description; `@tag value` lines carry the rest.

use super::model::{DocMetadata, SecurityRequirement};

/// Parse doc lines (the contents of `#[doc = "..."]` attributes).
///
/// Returns the metadata and the names of unrecognized tags.
pub fn parse_doc_lines(lines: &[String]) -> (DocMetadata, Vec<String>) {
    let mut docs = DocMetadata::default();
    let mut unknown = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for raw in lines {
        let line = raw.trim();

        if let Some(tag_line) = line.strip_prefix('@') {
            flush_paragraph(&mut current, &mut paragraphs);
            let (tag, value) = match tag_line.split_once(char::is_whitespace) {
                Some((tag, value)) => (tag, value.trim()),
                None => (tag_line, ""),
            };
            if !apply_tag(&mut docs, tag, value) {
                unknown.push(tag.to_string());
            }
            continue;
        }

        if line.is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }
    flush_paragraph(&mut current, &mut paragraphs);

    if docs.description.is_none() && !paragraphs.is_empty() {
        docs.description = Some(paragraphs.join("\n\n"));
    }

    (docs, unknown)
}

fn flush_paragraph(current: &mut String, paragraphs: &mut Vec<String>) {
    if !current.is_empty() {
        paragraphs.push(std::mem::take(current));
    }
}

/// Returns false for unknown tags.
fn apply_tag(docs: &mut DocMetadata, tag: &str, value: &str) -> bool {
    match tag {
        "summary" => docs.summary = non_empty(value),
        "description" => docs.description = non_empty(value),
        "tag" => {
            if let Some(tag) = non_empty(value) {
                docs.tags.push(tag);
            }
        }
        "security" => {
            let mut words = value.split_whitespace();
            if let Some(scheme) = words.next() {
                docs.security.push(SecurityRequirement {
                    scheme: scheme.to_string(),
                    scopes: words.map(str::to_string).collect(),
                });
            }
        }
        "operationId" => docs.operation_id = non_empty(value),
        "hide" => docs.hide = true,
        "offload" => docs.offload = true,
        "deprecated" => docs.deprecated = true,
        "onRequest" => docs.on_request.extend(value.split_whitespace().map(str::to_string)),
        "preHandler" => docs
            .pre_handler
            .extend(value.split_whitespace().map(str::to_string)),
        _ => return false,
    }
    true
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
