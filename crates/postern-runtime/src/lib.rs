//! Serving-side counterpart of the Postern compiler.
//!
//! Turns the `dispatch` steps of a compiled route into a [`Thunk`] and
//! mounts every route of an artifact into a host [`ServingRuntime`].
//! Resolvers, handlers and worker pools are supplied by the application
//! through an [`Environment`].

pub mod error;
pub mod flow;
pub mod handler;
pub mod mount;
pub mod pool;
pub mod request;
pub mod resolver;
pub mod thunk;

pub use error::{DispatchError, MountError};
pub use flow::Flow;
pub use handler::{Handler, HandlerRegistry};
pub use mount::{mount, mount_artifact, MountedRoute, ServingRuntime};
pub use pool::{BoundedPool, WorkerPool};
pub use request::{Argument, Reply, RequestContext, RouteContext};
pub use resolver::{CustomResolver, ResolverRegistry};
pub use thunk::{Environment, Thunk};
