//! Custom parameter resolvers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::flow::Flow;
use crate::request::{Reply, RequestContext, RouteContext};

/// Produces the value of a `CustomParameter` binding.
///
/// A resolver may answer the request itself (for example an auth check
/// that rejects): it sends on `reply` and returns [`Flow::Responded`], or
/// just sends; the thunk checks the reply either way.
#[async_trait]
pub trait CustomResolver: Send + Sync {
    async fn resolve(
        &self,
        route: &RouteContext,
        request: &RequestContext,
        reply: &mut Reply,
        args: &[Value],
    ) -> anyhow::Result<Flow<Value>>;
}

/// Resolvers by configured name.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn CustomResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, resolver: impl CustomResolver + 'static) {
        self.resolvers.insert(name.into(), Arc::new(resolver));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomResolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}
