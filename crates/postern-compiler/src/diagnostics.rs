//! Diagnostics collected across every pipeline stage.
//!
//! Nothing in the pipeline returns early on a bad controller: each stage
//! records a [`Diagnostic`] and moves on to the next handler. Emission is
//! gated on [`Diagnostics::has_errors`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Signature analysis: unresolved types, malformed markers.
    Analysis,
    /// Binding classification: illegal marker combinations, missing capabilities.
    Classifier,
    /// Schema synthesis: unsupported or unresolvable shapes.
    Schema,
    /// Route building: duplicate routes, bad controller paths.
    Build,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Analysis => "AnalysisError",
            Category::Classifier => "ClassifierError",
            Category::Schema => "SchemaError",
            Category::Build => "BuildError",
        };
        f.write_str(name)
    }
}

/// Diagnostic codes.
///
/// E2xxx codes are errors, W24xx codes are warnings.
pub mod codes {
    pub const SOURCE_PARSE: &str = "E2000";
    pub const UNRESOLVED_PARAMETER: &str = "E2001";
    pub const MALFORMED_MARKER: &str = "E2002";
    pub const UNRESOLVED_TYPE: &str = "E2003";

    pub const QUERY_EXTENDED_CONFLICT: &str = "E2101";
    pub const BODY_CONFLICT: &str = "E2102";
    pub const COOKIE_CAPABILITY: &str = "E2103";
    pub const STREAMING_ONLY: &str = "E2104";
    pub const PATH_NOT_IN_URL: &str = "E2105";
    pub const OFFLOAD_ISOLATION: &str = "E2106";
    pub const UNKNOWN_ROUTE_CONFIG: &str = "E2107";
    pub const MULTIPLE_THIS: &str = "E2108";
    pub const WEBSOCKET_CAPABILITY: &str = "E2109";
    pub const UNKNOWN_RESOLVER: &str = "E2110";

    pub const UNSUPPORTED_TYPE: &str = "E2201";
    pub const SELF_REFERENCE: &str = "E2202";
    pub const SCHEMA_TOO_DEEP: &str = "E2203";
    pub const SCHEMA_TOO_COMPLEX: &str = "E2204";

    pub const DUPLICATE_ROUTE: &str = "E2301";
    pub const DUPLICATE_OPERATION_ID: &str = "E2302";
    pub const INVALID_CONTROLLER_PATH: &str = "E2303";

    pub const UNKNOWN_DOC_TAG: &str = "W2401";
    pub const UNEXPORTED_HANDLER: &str = "W2402";
    pub const SHADOWED_TYPE: &str = "W2403";
    pub const SCHEMA_NAME_COLLISION: &str = "W2404";
    pub const CONFIG_OVERRIDDEN: &str = "W2405";
}

/// Where a diagnostic points: file, line, exported symbol, parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl Location {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " `{}`", symbol)?;
        }
        if let Some(parameter) = &self.parameter {
            write!(f, " parameter `{}`", parameter)?;
        }
        Ok(())
    }
}

/// One problem found during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub code: String,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(
        category: Category,
        code: &str,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            severity: Severity::Error,
            category,
            code: code.to_string(),
            message: message.into(),
            location,
        }
    }

    pub fn warning(
        category: Category,
        code: &str,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            code: code.to_string(),
            message: message.into(),
            location,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}[{}] {}: {} ({})",
            level, self.code, self.category, self.message, self.location
        )
    }
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::debug!(code = %diagnostic.code, "{}", diagnostic),
            Severity::Warning => tracing::warn!(code = %diagnostic.code, "{}", diagnostic),
        }
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in other {
            self.push(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| !d.is_error())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sorted copy, for deterministic reporting.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| {
            (&a.location, &a.code, &a.message).cmp(&(&b.location, &b.code, &b.message))
        });
        items
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
