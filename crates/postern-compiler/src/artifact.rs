use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tar::Builder;

use crate::binding::Binding;
use crate::error::CompileError;
use crate::route::{ExecutionMode, RouteDescriptor};
use crate::schema::FrozenRegistry;

/// Current artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Compiler version (from Cargo.toml).
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

const MANIFEST_ENTRY: &str = "manifest.json";
const SCHEMAS_ENTRY: &str = "schemas.json";
const ROUTES_ENTRY: &str = "routes.json";

/// The manifest.json embedded in a .pta artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub postern_artifact_version: u32,
    pub compiler_version: String,
    /// Sorted by file.
    pub sources: Vec<SourceController>,
    pub routes_count: usize,
    pub schemas_count: usize,
    /// Checksums use BTreeMap for deterministic JSON serialization order.
    pub checksums: BTreeMap<String, String>,
}

/// A controller file that went into the artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceController {
    pub file: String,
    pub sha256: String,
}

/// Compiled route data stored in routes.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRoutes {
    pub routes: Vec<CompiledRoute>,
}

/// A route descriptor plus its dispatch thunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRoute {
    pub index: usize,
    #[serde(flatten)]
    pub descriptor: RouteDescriptor,
    pub dispatch: Vec<DispatchStep>,
}

/// One step of a per-request dispatch thunk.
///
/// Steps run in order. Every `Resolve` is followed by an implicit check
/// whether the reply was already sent; if so the thunk stops there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DispatchStep {
    /// Pull an argument out of the request.
    Extract {
        /// Argument position.
        index: usize,
        parameter: String,
        /// Human-readable source, e.g. `params.name`.
        expression: String,
        optional: bool,
        binding: Binding,
    },
    /// Run a custom resolver; it may answer the request itself.
    Resolve {
        index: usize,
        parameter: String,
        resolver: String,
        args: Vec<Value>,
    },
    /// Call the handler with the collected arguments.
    Invoke { target: Invocation },
}

/// How the final step reaches the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Invocation {
    /// In-process call to `<controller path>#<function>`.
    Inline { handler: String },
    /// One task on the worker pool, named by the route's operation id.
    Offload { task: String },
}

/// Dispatch thunk for one route: extraction and resolver steps in
/// declaration order, then the invocation.
pub fn dispatch_plan(route: &RouteDescriptor) -> Vec<DispatchStep> {
    let mut steps = Vec::with_capacity(route.bindings.len() + 1);
    for (index, bound) in route.bindings.iter().enumerate() {
        let step = match &bound.binding {
            Binding::CustomResolved { resolver, args } => DispatchStep::Resolve {
                index,
                parameter: bound.parameter.clone(),
                resolver: resolver.clone(),
                args: args.clone(),
            },
            binding => DispatchStep::Extract {
                index,
                parameter: bound.parameter.clone(),
                expression: binding.extract_expression().unwrap_or_default(),
                optional: bound.optional,
                binding: binding.clone(),
            },
        };
        steps.push(step);
    }
    let target = match route.mode {
        ExecutionMode::Inline => Invocation::Inline {
            handler: route.handler.clone(),
        },
        ExecutionMode::Offloaded => Invocation::Offload {
            task: route.operation_id.clone(),
        },
    };
    steps.push(DispatchStep::Invoke { target });
    steps
}

/// An emitted artifact, held in memory.
///
/// The JSON entries are rendered once; writing the same artifact twice
/// produces identical bytes.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub manifest: Manifest,
    pub schemas: Vec<Value>,
    pub routes: CompiledRoutes,
    manifest_json: String,
    schemas_json: String,
    routes_json: String,
}

impl Artifact {
    /// Render descriptors and the frozen registry.
    ///
    /// `routes` must already be in manifest order.
    pub fn render(
        routes: &[RouteDescriptor],
        registry: &FrozenRegistry,
        mut sources: Vec<SourceController>,
    ) -> Result<Self, CompileError> {
        let schemas = registry.documents();
        let routes = CompiledRoutes {
            routes: routes
                .iter()
                .enumerate()
                .map(|(index, descriptor)| CompiledRoute {
                    index,
                    descriptor: descriptor.clone(),
                    dispatch: dispatch_plan(descriptor),
                })
                .collect(),
        };

        let schemas_json = serde_json::to_string_pretty(&schemas)?;
        let routes_json = serde_json::to_string_pretty(&routes)?;

        let mut checksums = BTreeMap::new();
        checksums.insert(
            SCHEMAS_ENTRY.to_string(),
            format!("sha256:{}", compute_sha256(schemas_json.as_bytes())),
        );
        checksums.insert(
            ROUTES_ENTRY.to_string(),
            format!("sha256:{}", compute_sha256(routes_json.as_bytes())),
        );

        sources.sort();
        sources.dedup();
        let manifest = Manifest {
            postern_artifact_version: ARTIFACT_VERSION,
            compiler_version: COMPILER_VERSION.to_string(),
            sources,
            routes_count: routes.routes.len(),
            schemas_count: schemas.len(),
            checksums,
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)?;

        Ok(Self {
            manifest,
            schemas,
            routes,
            manifest_json,
            schemas_json,
            routes_json,
        })
    }

    /// `(entry name, content)` in archive order.
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            (MANIFEST_ENTRY, self.manifest_json.as_str()),
            (SCHEMAS_ENTRY, self.schemas_json.as_str()),
            (ROUTES_ENTRY, self.routes_json.as_str()),
        ]
    }

    /// The .pta archive (tar.gz) as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CompileError> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut archive = Builder::new(encoder);
        for (name, content) in self.entries() {
            add_file_to_tar(&mut archive, name, content.as_bytes())?;
        }
        let encoder = archive.into_inner()?;
        Ok(encoder.finish()?)
    }

    /// Write the archive to `output`.
    pub fn write(&self, output: &Path) -> Result<(), CompileError> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(output)?;
        file.write_all(&bytes)?;
        tracing::info!(
            path = %output.display(),
            routes = self.manifest.routes_count,
            schemas = self.manifest.schemas_count,
            "artifact written"
        );
        Ok(())
    }
}

/// Load a manifest from a .pta artifact.
pub fn load_manifest(artifact_path: &Path) -> Result<Manifest, CompileError> {
    let content = read_entry(artifact_path, MANIFEST_ENTRY)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load the schema registration list from a .pta artifact.
pub fn load_schemas(artifact_path: &Path) -> Result<Vec<Value>, CompileError> {
    let content = read_entry(artifact_path, SCHEMAS_ENTRY)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load compiled routes from a .pta artifact.
pub fn load_routes(artifact_path: &Path) -> Result<CompiledRoutes, CompileError> {
    let content = read_entry(artifact_path, ROUTES_ENTRY)?;
    Ok(serde_json::from_str(&content)?)
}

fn read_entry(artifact_path: &Path, name: &str) -> Result<String, CompileError> {
    let file = File::open(artifact_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some(name) {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(content);
        }
    }

    Err(CompileError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} not found in artifact", name),
    )))
}

/// Hex SHA-256 of `content`.
pub(crate) fn compute_sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn add_file_to_tar<W: Write>(
    archive: &mut Builder<W>,
    name: &str,
    content: &[u8],
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    archive.append_data(&mut header, name, content)
}
