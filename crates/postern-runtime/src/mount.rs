//! Mounting compiled routes into a serving runtime.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use postern_compiler::{load_routes, load_schemas, CompiledRoutes, HookChains, RouteSchema};

use crate::error::MountError;
use crate::thunk::{Environment, Thunk};

/// One route as handed to the serving runtime.
pub struct MountedRoute {
    pub method: String,
    /// Url template, e.g. `/users/:id`.
    pub url: String,
    pub schema: RouteSchema,
    pub hooks: HookChains,
    pub websocket: bool,
    /// Called once per request after validation and hooks.
    pub thunk: Arc<Thunk>,
}

/// The host server the artifact is mounted into.
///
/// Implementations own routing, validation against the registered schemas
/// and response serialization.
pub trait ServingRuntime {
    /// Register every schema document; called once, before any route.
    fn register_schemas(&mut self, schemas: &[Value]) -> Result<(), MountError>;

    /// Register one route.
    fn route(&mut self, route: MountedRoute) -> Result<(), MountError>;
}

/// Mount `routes` into `server`, returning how many routes were registered.
///
/// Every thunk is built before the server sees anything, so a missing
/// handler, resolver or pool leaves the server untouched.
pub fn mount<S: ServingRuntime + ?Sized>(
    server: &mut S,
    schemas: &[Value],
    routes: &CompiledRoutes,
    env: &Environment,
) -> Result<usize, MountError> {
    let thunks = routes
        .routes
        .iter()
        .map(|compiled| Thunk::from_route(compiled, env).map(|thunk| (compiled, Arc::new(thunk))))
        .collect::<Result<Vec<_>, _>>()?;

    server.register_schemas(schemas)?;
    tracing::debug!(count = schemas.len(), "schemas registered");

    for (compiled, thunk) in thunks {
        let descriptor = &compiled.descriptor;
        tracing::debug!(
            method = %descriptor.method,
            url = %descriptor.url,
            operation_id = %descriptor.operation_id,
            "mounting route"
        );
        server.route(MountedRoute {
            method: descriptor.method.clone(),
            url: descriptor.url.clone(),
            schema: descriptor.schema.clone(),
            hooks: descriptor.hooks.clone(),
            websocket: descriptor.websocket,
            thunk,
        })?;
    }

    tracing::info!(routes = routes.routes.len(), "routes mounted");
    Ok(routes.routes.len())
}

/// Load a `.pta` from disk and mount it.
pub fn mount_artifact<S: ServingRuntime + ?Sized>(
    server: &mut S,
    artifact: &Path,
    env: &Environment,
) -> Result<usize, MountError> {
    let schemas = load_schemas(artifact)?;
    let routes = load_routes(artifact)?;
    mount(server, &schemas, &routes, env)
}
