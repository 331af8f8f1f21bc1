//! Compiles typed handler signatures into a `.pta` (Postern Compiled Artifact).
//!
//! Reads controller sources, classifies every handler parameter into a
//! binding, synthesizes deduplicated JSON-Schemas, builds route descriptors
//! and emits a deterministic archive for the serving runtime.

pub mod artifact;
pub mod binding;
pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod route;
pub mod schema;
pub mod signature;

pub use artifact::{
    dispatch_plan, load_manifest, load_routes, load_schemas, Artifact, CompiledRoute,
    CompiledRoutes, DispatchStep, Invocation, Manifest, SourceController, ARTIFACT_VERSION,
    COMPILER_VERSION,
};
pub use binding::{merge_route_options, Binding, BoundParameter, MergedOptions, RouteOptions};
pub use compile::{compile, compile_sources, Compilation, CompileResult, ControllerSource};
pub use config::{Capabilities, ConfigError, ProjectConfig, SchemaConfig};
pub use diagnostics::{Category, Diagnostic, Diagnostics, Location, Severity};
pub use error::CompileError;
pub use route::{ExecutionMode, RouteDescriptor, RouteSchema, SourceLocation};
pub use schema::{FrozenRegistry, SchemaNode, SchemaRegistry};
pub use signature::HookChains;
