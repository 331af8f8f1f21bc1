//! TestProject: on-disk project harness.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;

use postern_compiler::{
    compile, load_routes, load_schemas, CompiledRoute, CompiledRoutes, Diagnostic, Manifest,
    ProjectConfig,
};
use postern_runtime::{mount, Environment, MountError, ServingRuntime};

/// Errors from TestProject operations.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("compilation failed: {0}")]
    Compile(#[from] postern_compiler::CompileError),

    #[error("invalid config: {0}")]
    Config(#[from] postern_compiler::ConfigError),

    #[error("mount failed: {0}")]
    Mount(#[from] MountError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fixture not found: {0}")]
    FixtureNotFound(String),
}

/// Absolute path to the shared fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    // CARGO_MANIFEST_DIR = .../crates/postern-test
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures")
}

/// A throwaway project directory with a `postern.yaml` and controllers.
///
/// Compiles in-process through the same entry point as the CLI and keeps
/// the artifact inside the temp directory.
pub struct TestProject {
    dir: TempDir,
    controllers: Vec<PathBuf>,
}

impl TestProject {
    /// An empty project with the given configuration.
    pub fn new(config: &str) -> Result<Self, TestError> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("postern.yaml"), config)?;
        Ok(Self {
            dir,
            controllers: Vec::new(),
        })
    }

    /// A copy of `tests/fixtures/<name>`.
    pub fn from_fixture(name: &str) -> Result<Self, TestError> {
        let source = fixtures_dir().join(name);
        if !source.is_dir() {
            return Err(TestError::FixtureNotFound(name.to_string()));
        }

        let dir = TempDir::new()?;
        let mut controllers = Vec::new();
        let pattern = source.join("**").join("*");
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| TestError::FixtureNotFound(e.to_string()))?;
        for path in entries.flatten().filter(|p| p.is_file()) {
            let Ok(relative) = path.strip_prefix(&source) else {
                continue;
            };
            let target = dir.path().join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)?;
            if target.extension().is_some_and(|ext| ext == "rs") {
                controllers.push(target);
            }
        }
        controllers.sort();
        Ok(Self { dir, controllers })
    }

    /// Add a controller at `path`, relative to the project root.
    pub fn controller(&mut self, path: &str, source: &str) -> Result<&mut Self, TestError> {
        let target = self.dir.path().join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, source)?;
        self.controllers.push(target);
        self.controllers.sort();
        self.controllers.dedup();
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("postern.yaml")
    }

    /// Compile every controller into `<root>/app.pta` and load it back.
    pub fn compile(&self) -> Result<CompiledProject, TestError> {
        let config = ProjectConfig::load(&self.config_path())?;
        let artifact = self.dir.path().join("app.pta");
        let result = compile(&self.controllers, self.dir.path(), &config, &artifact)?;

        Ok(CompiledProject {
            schemas: load_schemas(&artifact)?,
            routes: load_routes(&artifact)?,
            manifest: result.manifest,
            warnings: result.warnings,
            artifact,
        })
    }
}

/// A successfully compiled project.
#[derive(Debug)]
pub struct CompiledProject {
    pub artifact: PathBuf,
    pub manifest: Manifest,
    pub schemas: Vec<Value>,
    pub routes: CompiledRoutes,
    pub warnings: Vec<Diagnostic>,
}

impl CompiledProject {
    /// Look up a route by method and url template.
    pub fn route(&self, method: &str, url: &str) -> Option<&CompiledRoute> {
        self.routes
            .routes
            .iter()
            .find(|r| r.descriptor.method == method && r.descriptor.url == url)
    }

    /// Schema document registered under `id`.
    pub fn schema(&self, id: &str) -> Option<&Value> {
        self.schemas
            .iter()
            .find(|s| s.get("$id").and_then(Value::as_str) == Some(id))
    }

    /// Mount every route into `server`.
    pub fn mount<S: ServingRuntime>(&self, server: &mut S, env: &Environment) -> Result<usize, TestError> {
        Ok(mount(server, &self.schemas, &self.routes, env)?)
    }
}
