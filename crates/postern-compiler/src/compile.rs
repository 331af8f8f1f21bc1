//! The compilation driver.
//!
//! Per-file analysis runs in parallel; everything after it (type table,
//! classification, schema registry, route building) is a serial pass over
//! controllers in sorted path order, so the output never depends on the
//! order files were discovered in.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::artifact::{Artifact, Manifest, SourceController};
use crate::config::ProjectConfig;
use crate::diagnostics::{codes, Category, Diagnostic, Diagnostics, Location};
use crate::error::CompileError;
use crate::route::url::controller_segments;
use crate::route::{build_route, check_duplicates, BuildContext, RouteDescriptor};
use crate::schema::{FrozenRegistry, SchemaSynthesizer, SynthOptions};
use crate::signature::{parse_controller, ExportKind, ParseOptions, ParsedController, TypeTable};

/// One controller file handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSource {
    /// Project-relative path with `/` separators.
    pub path: String,
    pub content: String,
}

impl ControllerSource {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read `path`, recording it relative to `base`.
    pub fn read(path: &Path, base: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path)?;
        let relative = path.strip_prefix(base).unwrap_or(path);
        let path = relative
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        Ok(Self { path, content })
    }
}

/// Everything one compilation produced, before emission.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub diagnostics: Diagnostics,
    /// Ordered by (url, method).
    pub routes: Vec<RouteDescriptor>,
    pub registry: FrozenRegistry,
    /// Sorted by file.
    pub sources: Vec<SourceController>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// Render the artifact. Refused while any error diagnostic exists.
    pub fn emit(&self) -> Result<Artifact, CompileError> {
        if self.has_errors() {
            let errors = self.diagnostics.error_count();
            tracing::warn!(errors, "emission blocked");
            return Err(CompileError::EmissionBlocked { errors });
        }
        Artifact::render(&self.routes, &self.registry, self.sources.clone())
    }
}

/// Result of [`compile`].
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub manifest: Manifest,
    /// Warnings only; errors block emission.
    pub warnings: Vec<Diagnostic>,
}

/// Run the pipeline over in-memory controller sources.
pub fn compile_sources(
    sources: &[ControllerSource],
    config: &ProjectConfig,
) -> Result<Compilation, CompileError> {
    let options = ParseOptions::from_config(config)?;

    let mut ordered: Vec<&ControllerSource> = sources.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));
    ordered.dedup_by(|a, b| a.path == b.path);

    postern_telemetry::log_compile_started!(controllers = ordered.len(), "compile started");

    let analyzed: Vec<(ParsedController, Vec<Diagnostic>)> = ordered
        .par_iter()
        .map(|source| parse_controller(&source.path, &source.content, &options))
        .collect();

    let mut diagnostics = Diagnostics::new();
    let mut controllers = Vec::with_capacity(analyzed.len());
    for (controller, diags) in analyzed {
        postern_telemetry::log_controller_analyzed!(
            file = %controller.path,
            exports = controller.exports.len(),
            types = controller.types.len(),
            "controller analyzed"
        );
        diagnostics.extend(diags);
        controllers.push(controller);
    }

    let (types, shadowed) = TypeTable::build(&controllers);
    diagnostics.extend(shadowed);

    let resolvers = config.resolver_names();
    let cx = BuildContext {
        config,
        resolvers: &resolvers,
        types: &types,
    };
    let mut synth = SchemaSynthesizer::new(&types, SynthOptions::from(&config.schema));
    let mut routes = Vec::new();

    for controller in &controllers {
        let segments = match controller_segments(&controller.path, &options.prefix) {
            Ok(segments) => segments,
            Err(message) => {
                diagnostics.push(Diagnostic::error(
                    Category::Build,
                    codes::INVALID_CONTROLLER_PATH,
                    message,
                    Location::file(&controller.path),
                ));
                continue;
            }
        };
        for export in &controller.exports {
            let ExportKind::Handler(handler) = &export.kind else {
                continue;
            };
            let (route, diags) = build_route(
                controller,
                &segments,
                &export.symbol,
                export.line,
                handler,
                &cx,
                &mut synth,
            );
            diagnostics.extend(diags);
            routes.extend(route);
        }
    }

    let (registry, schema_warnings) = synth.finish();
    diagnostics.extend(schema_warnings);

    routes.sort_by(|a, b| (&a.url, &a.method).cmp(&(&b.url, &b.method)));
    diagnostics.extend(check_duplicates(&routes));

    let sources = controllers
        .iter()
        .map(|c| SourceController {
            file: c.path.clone(),
            sha256: c.sha256.clone(),
        })
        .collect();

    Ok(Compilation {
        diagnostics,
        routes,
        registry: registry.freeze(),
        sources,
    })
}

/// Compile controller files into a .pta artifact at `output`.
///
/// Paths are recorded relative to `base`.
pub fn compile(
    paths: &[PathBuf],
    base: &Path,
    config: &ProjectConfig,
    output: &Path,
) -> Result<CompileResult, CompileError> {
    let sources = paths
        .iter()
        .map(|path| ControllerSource::read(path, base))
        .collect::<Result<Vec<_>, _>>()?;
    let compilation = compile_sources(&sources, config)?;
    let artifact = compilation.emit()?;
    artifact.write(output)?;

    Ok(CompileResult {
        manifest: artifact.manifest,
        warnings: compilation.diagnostics.sorted(),
    })
}
