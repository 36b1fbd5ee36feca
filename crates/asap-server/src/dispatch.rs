//! Skill registry: the table `task.request` and `mcp.tool_call` dispatch
//! through, keyed by the declared `skill_id`/`tool_name`.
//!
//! Two distinct handler kinds are recorded at registration time. Sync
//! handlers run on Tokio's blocking pool via [`tokio::task::spawn_blocking`]
//! so CPU-bound work never blocks the async scheduler; async handlers are
//! awaited directly. The split is enforced by the type of closure each
//! `register_*` method accepts, not by inspecting the handler at call
//! time: a sync handler's closure type cannot itself return a future, so
//! there is no runtime path where a sync slot holds an awaitable that
//! needs to be driven to completion and dropped before reporting a type
//! error.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use asap_error::{AsapError, ErrorCode};
use serde_json::Value;

type SyncFn = dyn Fn(Value) -> Result<Value, AsapError> + Send + Sync;
type AsyncFn = dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, AsapError>> + Send>> + Send + Sync;

enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// Registry of skill handlers, looked up by skill id at dispatch time.
#[derive(Clone, Default)]
pub struct SkillRegistry {
    handlers: HashMap<String, Handler>,
}

impl SkillRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous (CPU-bound) handler.
    pub fn register_sync(
        &mut self,
        skill_id: impl Into<String>,
        handler: impl Fn(Value) -> Result<Value, AsapError> + Send + Sync + 'static,
    ) {
        self.handlers.insert(skill_id.into(), Handler::Sync(Arc::new(handler)));
    }

    /// Register an asynchronous handler.
    pub fn register_async<F, Fut>(&mut self, skill_id: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AsapError>> + Send + 'static,
    {
        self.handlers.insert(skill_id.into(), Handler::Async(Arc::new(move |input| Box::pin(handler(input)))));
    }

    /// Whether a handler is registered for `skill_id`.
    #[must_use]
    pub fn contains(&self, skill_id: &str) -> bool {
        self.handlers.contains_key(skill_id)
    }

    /// Invoke the handler registered for `skill_id`.
    pub async fn dispatch(&self, skill_id: &str, input: Value) -> Result<Value, AsapError> {
        match self.handlers.get(skill_id) {
            None => Err(AsapError::new(ErrorCode::SkillNotFound, format!("no handler registered for {skill_id:?}"))
                .with_context("skill_id", skill_id)),
            Some(Handler::Async(handler)) => handler(input).await,
            Some(Handler::Sync(handler)) => {
                let handler = handler.clone();
                tokio::task::spawn_blocking(move || handler(input))
                    .await
                    .map_err(|e| AsapError::new(ErrorCode::InternalError, "skill handler task panicked").with_source(e))?
            }
        }
    }
}

/// The `echo` skill: returns its input unchanged. Registered by default
/// so a fresh server satisfies the happy-path round trip without any
/// operator configuration.
pub fn register_builtin_skills(registry: &mut SkillRegistry) {
    registry.register_sync("echo", |input| Ok(input));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echo_skill_returns_its_input() {
        let mut registry = SkillRegistry::new();
        register_builtin_skills(&mut registry);
        let result = registry.dispatch("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_skill_is_skill_not_found() {
        let registry = SkillRegistry::new();
        let err = registry.dispatch("nonexistent", json!({})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SkillNotFound);
    }

    #[tokio::test]
    async fn async_handler_is_awaited_directly() {
        let mut registry = SkillRegistry::new();
        registry.register_async("double", |input| async move {
            let n = input.as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        });
        let result = registry.dispatch("double", json!(21)).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn contains_reflects_registration() {
        let mut registry = SkillRegistry::new();
        assert!(!registry.contains("echo"));
        register_builtin_skills(&mut registry);
        assert!(registry.contains("echo"));
    }
}
