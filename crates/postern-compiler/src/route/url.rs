//! Url templates derived from controller paths.
//!
//! `src/routes/users/[id].rs` → `/users/:id`. Folder segments form the
//! prefix, the file stem is split on `.`, `index`/`mod` map to the folder
//! itself, `[name]` is a dynamic segment and `[...rest]` a wildcard.

use regex_lite::Regex;

/// Request parameter the runtime stores a wildcard match under.
pub const WILDCARD_PARAM: &str = "*";

/// One segment of a url template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    /// `[...name]`; matched by the runtime under `*`.
    Wildcard(String),
}

/// Split a controller path into url segments.
pub fn controller_segments(path: &str, prefix: &Regex) -> Result<Vec<Segment>, String> {
    let normalized = path.replace('\\', "/");
    let relative = match prefix.find(&normalized) {
        Some(m) if m.start() == 0 => &normalized[m.end()..],
        _ => normalized.as_str(),
    };

    let without_ext = relative
        .strip_suffix(".rs")
        .ok_or_else(|| format!("controller '{}' is not a .rs file", path))?;

    let mut parts: Vec<&str> = without_ext.split('/').filter(|p| !p.is_empty()).collect();
    let stem = parts.pop().unwrap_or("index");
    let mut stem_parts: Vec<&str> = stem.split('.').filter(|p| !p.is_empty()).collect();
    if matches!(stem_parts.last(), Some(&"index") | Some(&"mod")) {
        stem_parts.pop();
    }
    parts.extend(stem_parts);

    parts.into_iter().map(|part| parse_segment(part, path)).collect()
}

fn parse_segment(part: &str, path: &str) -> Result<Segment, String> {
    if let Some(inner) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
        let (wildcard, inner) = match inner.strip_prefix("...") {
            Some(rest) => (true, rest),
            None => (false, inner),
        };
        if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "invalid dynamic segment '[{}]' in controller '{}'",
                inner, path
            ));
        }
        if wildcard {
            return Ok(Segment::Wildcard(inner.to_string()));
        }
        return Ok(Segment::Dynamic(inner.to_string()));
    }

    let valid = part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '~'));
    if !valid {
        return Err(format!(
            "invalid character in segment '{}' of controller '{}'",
            part, path
        ));
    }
    Ok(Segment::Static(part.to_string()))
}

/// Render segments as a url template (`/users/:id`).
pub fn url_template(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut url = String::new();
    for segment in segments {
        url.push('/');
        match segment {
            Segment::Static(s) => url.push_str(s),
            Segment::Dynamic(name) => {
                url.push(':');
                url.push_str(name);
            }
            Segment::Wildcard(_) => url.push('*'),
        }
    }
    url
}

/// Request parameter names of the dynamic segments, in order. A wildcard
/// is reported as `*`.
pub fn dynamic_names(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::Dynamic(name) => Some(name.clone()),
            Segment::Wildcard(_) => Some(WILDCARD_PARAM.to_string()),
            Segment::Static(_) => None,
        })
        .collect()
}

/// Declared name of the wildcard segment, if the url has one.
pub fn wildcard_name(segments: &[Segment]) -> Option<&str> {
    segments.iter().find_map(|s| match s {
        Segment::Wildcard(name) => Some(name.as_str()),
        _ => None,
    })
}

/// `HelloWorldControllerGet` for `hello-world.rs` + `get`.
pub fn default_operation_id(segments: &[Segment], function: &str) -> String {
    let mut id = String::new();
    if segments.is_empty() {
        id.push_str("Index");
    }
    for segment in segments {
        match segment {
            Segment::Static(s) | Segment::Dynamic(s) => id.push_str(&pascal_case(s)),
            Segment::Wildcard(_) => id.push_str("Wildcard"),
        }
    }
    id.push_str("Controller");
    id.push_str(&pascal_case(function));
    id
}

pub(crate) fn pascal_case(input: &str) -> String {
    input
        .split(|c: char| c == '-' || c == '_' || c == '~' || c == '.')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
