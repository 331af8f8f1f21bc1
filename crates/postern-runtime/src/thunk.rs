//! Per-route dispatch thunks.
//!
//! A [`Thunk`] is the executable form of a compiled route's `dispatch`
//! steps, with every resolver, handler and pool reference looked up once at
//! mount time.

use std::sync::Arc;

use serde_json::Value;

use postern_compiler::{Binding, CompiledRoute, DispatchStep, Invocation};

use crate::error::{DispatchError, MountError};
use crate::flow::Flow;
use crate::handler::{Handler, HandlerRegistry};
use crate::pool::WorkerPool;
use crate::request::{Argument, Reply, RequestContext, RouteContext};
use crate::resolver::{CustomResolver, ResolverRegistry};

/// Everything a thunk may need to reach at serving time.
#[derive(Clone, Default)]
pub struct Environment {
    pub handlers: HandlerRegistry,
    pub resolvers: ResolverRegistry,
    pub pool: Option<Arc<dyn WorkerPool>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn with_pool(mut self, pool: impl WorkerPool + 'static) -> Self {
        self.pool = Some(Arc::new(pool));
        self
    }
}

enum Step {
    Extract {
        parameter: String,
        expression: String,
        optional: bool,
        binding: Binding,
    },
    Resolve {
        parameter: String,
        name: String,
        resolver: Arc<dyn CustomResolver>,
        args: Vec<Value>,
    },
}

enum Target {
    Inline {
        reference: String,
        handler: Arc<dyn Handler>,
    },
    Offload {
        task: String,
        pool: Arc<dyn WorkerPool>,
    },
}

/// Executable dispatch logic of one route.
pub struct Thunk {
    route: RouteContext,
    steps: Vec<Step>,
    target: Target,
}

impl Thunk {
    /// Resolve a compiled route's references against `env`.
    pub fn from_route(compiled: &CompiledRoute, env: &Environment) -> Result<Self, MountError> {
        let descriptor = &compiled.descriptor;
        let label = format!("{} {}", descriptor.method, descriptor.url);
        let mut steps = Vec::with_capacity(compiled.dispatch.len());
        let mut target = None;

        for step in &compiled.dispatch {
            match step {
                DispatchStep::Extract {
                    parameter,
                    expression,
                    optional,
                    binding,
                    ..
                } => steps.push(Step::Extract {
                    parameter: parameter.clone(),
                    expression: expression.clone(),
                    optional: *optional,
                    binding: binding.clone(),
                }),
                DispatchStep::Resolve {
                    parameter,
                    resolver,
                    args,
                    ..
                } => {
                    let found =
                        env.resolvers
                            .get(resolver)
                            .ok_or_else(|| MountError::MissingResolver {
                                route: label.clone(),
                                resolver: resolver.clone(),
                            })?;
                    steps.push(Step::Resolve {
                        parameter: parameter.clone(),
                        name: resolver.clone(),
                        resolver: found,
                        args: args.clone(),
                    });
                }
                DispatchStep::Invoke { target: invocation } => {
                    target = Some(match invocation {
                        Invocation::Inline { handler } => Target::Inline {
                            reference: handler.clone(),
                            handler: env
                                .handlers
                                .get(handler)
                                .ok_or_else(|| MountError::MissingHandler(handler.clone()))?,
                        },
                        Invocation::Offload { task } => {
                            let pool = env.pool.clone().ok_or_else(|| MountError::MissingPool {
                                route: label.clone(),
                            })?;
                            if !pool.has_task(task) {
                                return Err(MountError::MissingTask {
                                    route: label.clone(),
                                    task: task.clone(),
                                });
                            }
                            Target::Offload {
                                task: task.clone(),
                                pool,
                            }
                        }
                    });
                }
            }
        }

        // Compiled routes always end in an invoke step; fall back to the
        // descriptor's handler reference for hand-built ones.
        let target = match target {
            Some(target) => target,
            None => Target::Inline {
                reference: descriptor.handler.clone(),
                handler: env
                    .handlers
                    .get(&descriptor.handler)
                    .ok_or_else(|| MountError::MissingHandler(descriptor.handler.clone()))?,
            },
        };

        Ok(Self {
            route: RouteContext {
                method: descriptor.method.clone(),
                url: descriptor.url.clone(),
                operation_id: descriptor.operation_id.clone(),
                config: descriptor.config.clone(),
            },
            steps,
            target,
        })
    }

    pub fn route(&self) -> &RouteContext {
        &self.route
    }

    /// Run the thunk for one request.
    ///
    /// Steps run in declaration order; each resolver is awaited before the
    /// next step. If a resolver answered the request, no later step and no
    /// handler runs and the result is [`Flow::Responded`].
    pub async fn dispatch(
        &self,
        request: &RequestContext,
        reply: &mut Reply,
    ) -> Result<Flow<Value>, DispatchError> {
        let mut args = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                Step::Extract {
                    parameter,
                    expression,
                    optional,
                    binding,
                } => {
                    let argument = extract(binding, request).unwrap_or(Argument::Value(Value::Null));
                    if !optional && argument == Argument::Value(Value::Null) && binding.is_value() {
                        let err = DispatchError::Extraction {
                            parameter: parameter.clone(),
                            expression: expression.clone(),
                        };
                        postern_telemetry::log_dispatch_error!(
                            operation_id = %self.route.operation_id,
                            error = %err,
                            "extraction failed"
                        );
                        return Err(err);
                    }
                    tracing::trace!(index, parameter = %parameter, "extracted");
                    args.push(argument);
                }
                Step::Resolve {
                    parameter,
                    name,
                    resolver,
                    args: static_args,
                } => {
                    let flow = resolver
                        .resolve(&self.route, request, reply, static_args)
                        .await
                        .map_err(|source| DispatchError::Resolver {
                            resolver: name.clone(),
                            parameter: parameter.clone(),
                            source,
                        })
                        .inspect_err(|err| {
                            postern_telemetry::log_dispatch_error!(
                                operation_id = %self.route.operation_id,
                                error = %err,
                                "resolver failed"
                            );
                        })?;

                    match flow {
                        Flow::Continue(value) if !reply.is_sent() => {
                            args.push(Argument::Value(value));
                        }
                        _ => {
                            postern_telemetry::log_dispatch_short_circuit!(
                                operation_id = %self.route.operation_id,
                                step = index,
                                resolver = %name,
                                "request answered by resolver"
                            );
                            return Ok(Flow::Responded);
                        }
                    }
                }
            }
        }

        let result = match &self.target {
            Target::Inline { reference, handler } => handler
                .call(args, &self.route, request, reply)
                .await
                .map_err(|source| DispatchError::Handler {
                    handler: reference.clone(),
                    source,
                }),
            Target::Offload { task, pool } => {
                let values = args
                    .into_iter()
                    .map(|arg| match arg {
                        Argument::Value(value) => value,
                        _ => Value::Null,
                    })
                    .collect();
                pool.run(task, values)
                    .await
                    .map_err(|source| DispatchError::Offload {
                        task: task.clone(),
                        source,
                    })
            }
        };

        match result {
            Ok(value) => Ok(Flow::Continue(value)),
            Err(err) => {
                postern_telemetry::log_dispatch_error!(
                    operation_id = %self.route.operation_id,
                    error = %err,
                    "invocation failed"
                );
                Err(err)
            }
        }
    }
}

/// Pull one binding's argument out of the request; `None` when absent.
fn extract(binding: &Binding, request: &RequestContext) -> Option<Argument> {
    let value = match binding {
        Binding::PathParam { name } => request.params.get(name).cloned().map(Value::String),
        Binding::QueryParam { name, .. } => request.query.get(name).cloned(),
        Binding::QueryExtended { .. } => Some(Value::Object(request.query.clone())),
        Binding::BodyWhole { .. } => request.body.clone(),
        Binding::BodyField { name, .. } => request.body.as_ref().and_then(|b| b.get(name)).cloned(),
        Binding::HeaderParam { name } => request.header(name).map(|h| Value::String(h.to_string())),
        Binding::CookieParam { name } => request.cookies.get(name).cloned().map(Value::String),
        Binding::RawRequest => return Some(Argument::Request),
        Binding::RawReply => return Some(Argument::Reply),
        Binding::Connection => return Some(Argument::Connection),
        Binding::Socket => return Some(Argument::Socket),
        Binding::ThisContext => return Some(Argument::Context),
        // Resolver-driven bindings never reach extraction.
        Binding::CustomResolved { .. } => None,
    };
    value.map(Argument::Value)
}
