//! Postern CLI.
//!
//! Compiles typed handler signatures into `.pta` artifacts, validates
//! controllers without emitting, and inspects existing artifacts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use postern_compiler::{
    compile_sources, load_manifest, Compilation, ControllerSource, Diagnostic, ProjectConfig,
};
use postern_telemetry::{LogFormat, TelemetryConfig};

const DEFAULT_CONFIG: &str = "postern.yaml";

#[derive(Parser, Debug)]
#[command(name = "postern", about = "Compile typed handler signatures into route artifacts", version)]
struct Cli {
    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn", env = "POSTERN_LOG_LEVEL")]
    log_level: String,

    /// Log format (json or pretty).
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile controllers into a .pta artifact.
    Compile {
        /// Project configuration (default: ./postern.yaml when present).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Controller file(s); overrides discovery via `controllers.glob`.
        #[arg(long, num_args = 1..)]
        controllers: Vec<PathBuf>,

        /// Output artifact path; falls back to `output` in the config.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check controllers and report diagnostics without emitting.
    Validate {
        /// Project configuration (default: ./postern.yaml when present).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Controller file(s); overrides discovery via `controllers.glob`.
        #[arg(long, num_args = 1..)]
        controllers: Vec<PathBuf>,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the manifest of an artifact.
    Inspect {
        /// Path to the .pta artifact.
        artifact: PathBuf,
    },
}

/// A loaded project: its configuration and the directory paths are
/// relative to.
struct Project {
    config: ProjectConfig,
    base: PathBuf,
}

impl Project {
    fn load(config: Option<&Path>) -> Result<Self, String> {
        let path = match config {
            Some(path) => {
                if !path.exists() {
                    return Err(format!("config file not found: {}", path.display()));
                }
                Some(path.to_path_buf())
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let config = ProjectConfig::load(&path).map_err(|e| e.to_string())?;
                let base = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok(Self { config, base })
            }
            None => Ok(Self {
                config: ProjectConfig::default(),
                base: PathBuf::from("."),
            }),
        }
    }

    /// Explicit controllers, or everything matched by `controllers.glob`.
    fn controllers(&self, explicit: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
        if !explicit.is_empty() {
            for path in explicit {
                if !path.exists() {
                    return Err(format!("controller not found: {}", path.display()));
                }
            }
            return Ok(explicit.to_vec());
        }

        let mut found = Vec::new();
        for pattern in &self.config.controllers.glob {
            let full = self.base.join(pattern);
            let entries = glob::glob(&full.to_string_lossy())
                .map_err(|e| format!("invalid glob '{}': {}", pattern, e))?;
            for entry in entries {
                let path = entry.map_err(|e| format!("failed to read {}", e.path().display()))?;
                if path.is_file() {
                    found.push(path);
                }
            }
        }
        found.sort();
        found.dedup();
        tracing::debug!(count = found.len(), "controllers discovered");
        Ok(found)
    }

    fn compile(&self, explicit: &[PathBuf]) -> Result<Compilation, String> {
        let paths = self.controllers(explicit)?;
        let base = if explicit.is_empty() {
            self.base.as_path()
        } else {
            Path::new(".")
        };
        let sources = paths
            .iter()
            .map(|path| ControllerSource::read(strip_dot(path), strip_dot(base)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        compile_sources(&sources, &self.config).map_err(|e| e.to_string())
    }
}

/// `./x` and `x` record the same controller path.
fn strip_dot(path: &Path) -> &Path {
    if path == Path::new(".") {
        return Path::new("");
    }
    path.strip_prefix(".").unwrap_or(path)
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic);
    }
}

/// Run the compile command.
fn run_compile(config: Option<&Path>, controllers: &[PathBuf], output: Option<&Path>) -> ExitCode {
    let project = match Project::load(config) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let output = match output
        .map(Path::to_path_buf)
        .or_else(|| project.config.output.as_ref().map(|o| project.base.join(o)))
    {
        Some(output) => output,
        None => {
            eprintln!("error: no output path; pass --output or set `output` in the config");
            return ExitCode::from(1);
        }
    };

    let compilation = match project.compile(controllers) {
        Ok(compilation) => compilation,
        Err(e) => {
            eprintln!("error: compilation failed: {}", e);
            return ExitCode::from(1);
        }
    };
    print_diagnostics(&compilation.diagnostics.sorted());

    if compilation.has_errors() {
        let errors = compilation.diagnostics.error_count();
        postern_telemetry::log_emission_blocked!(errors, "artifact not emitted");
        eprintln!("error: {} error(s); artifact not emitted", errors);
        return ExitCode::from(1);
    }

    let artifact = match compilation.emit() {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };
    if let Err(e) = artifact.write(&output) {
        eprintln!("error: failed to write {}: {}", output.display(), e);
        return ExitCode::from(1);
    }

    postern_telemetry::log_artifact_emitted!(
        path = %output.display(),
        routes = artifact.manifest.routes_count,
        schemas = artifact.manifest.schemas_count,
        "artifact emitted"
    );
    eprintln!(
        "compiled {} controller(s) to {} ({} routes, {} schemas)",
        artifact.manifest.sources.len(),
        output.display(),
        artifact.manifest.routes_count,
        artifact.manifest.schemas_count
    );
    ExitCode::SUCCESS
}

/// Run the validate command.
fn run_validate(config: Option<&Path>, controllers: &[PathBuf], format: &str) -> ExitCode {
    let compilation = Project::load(config).and_then(|project| project.compile(controllers));
    let compilation = match compilation {
        Ok(compilation) => compilation,
        Err(e) => {
            if format == "json" {
                println!("{}", serde_json::json!({ "valid": false, "error": e }));
            } else {
                eprintln!("error: {}", e);
            }
            return ExitCode::from(1);
        }
    };

    let diagnostics = compilation.diagnostics.sorted();
    let errors = compilation.diagnostics.error_count();
    let warnings = diagnostics.len() - errors;

    if format == "json" {
        let output = serde_json::json!({
            "valid": errors == 0,
            "diagnostics": diagnostics,
            "summary": {
                "controllers": compilation.sources.len(),
                "routes": compilation.routes.len(),
                "errors": errors,
                "warnings": warnings,
            }
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        print_diagnostics(&diagnostics);
        if errors == 0 {
            eprintln!(
                "✓ {} controller(s) valid: {} route(s), {} warning(s)",
                compilation.sources.len(),
                compilation.routes.len(),
                warnings
            );
        } else {
            eprintln!(
                "✗ {} error(s), {} warning(s) in {} controller(s)",
                errors,
                warnings,
                compilation.sources.len()
            );
        }
    }

    if errors > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Run the inspect command.
fn run_inspect(artifact: &Path) -> ExitCode {
    if !artifact.exists() {
        eprintln!("error: artifact not found: {}", artifact.display());
        return ExitCode::from(1);
    }

    let manifest = match load_manifest(artifact) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("error: failed to load manifest: {}", e);
            return ExitCode::from(1);
        }
    };
    match serde_json::to_string_pretty(&manifest) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = match cli.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };
    let telemetry = TelemetryConfig::new()
        .with_log_level(&cli.log_level)
        .with_log_format(format);
    if let Err(e) = postern_telemetry::init(&telemetry) {
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }

    match cli.command {
        Commands::Compile {
            config,
            controllers,
            output,
        } => run_compile(config.as_deref(), &controllers, output.as_deref()),
        Commands::Validate {
            config,
            controllers,
            format,
        } => run_validate(config.as_deref(), &controllers, &format),
        Commands::Inspect { artifact } => run_inspect(&artifact),
    }
}
