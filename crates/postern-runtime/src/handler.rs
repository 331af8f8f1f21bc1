//! Inline handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::request::{Argument, Reply, RequestContext, RouteContext};

/// The code behind one route.
#[async_trait]
pub trait Handler: Send + Sync {
    /// `args` follow the handler's parameter order. Raw arguments
    /// ([`Argument::Request`] and friends) point at `request`, `reply` and
    /// `route`.
    async fn call(
        &self,
        args: Vec<Argument>,
        route: &RouteContext,
        request: &RequestContext,
        reply: &mut Reply,
    ) -> anyhow::Result<Value>;
}

/// Handlers keyed by handler reference (`<controller path>#<function>`).
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reference: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(reference.into(), Arc::new(handler));
    }

    pub fn get(&self, reference: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
