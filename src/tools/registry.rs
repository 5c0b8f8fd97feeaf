//! Provider catalog: looks tools up by name, validates required
//! parameters before any handler runs, and dispatches the call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AgentError, Result};

use super::provider::{validate_required, ToolContext, ToolProvider, ToolResult};

pub struct ToolRegistry {
    providers: BTreeMap<String, Arc<dyn ToolProvider>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("names", &self.providers.keys().collect::<Vec<_>>()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { providers: BTreeMap::new() }
    }

    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn ToolProvider>> {
        self.providers.values().cloned().collect()
    }

    #[tracing::instrument(skip(self, input, ctx))]
    pub async fn call(&self, name: &str, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let provider = self
            .get(name)
            .ok_or_else(|| AgentError::invalid_params(format!("unknown tool: {name}")))?;
        validate_required(&input, provider.required_params())?;
        provider.call(input, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Stub;

    #[async_trait]
    impl ToolProvider for Stub {
        fn name(&self) -> &str {
            "stub"
        }
        fn description(&self) -> &str {
            "a stub tool"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn kind(&self) -> super::super::types::ToolKind {
            super::super::types::ToolKind::Other
        }
        fn required_params(&self) -> &[&str] {
            &["thing"]
        }
        async fn call(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success(input))
        }
    }

    #[tokio::test]
    async fn unknown_tool_errors_before_dispatch() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::new("s1", "/tmp");
        let err = registry.call("missing", json!({}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_param_is_rejected_before_handler_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Stub));
        let ctx = ToolContext::new("s1", "/tmp");
        let err = registry.call("stub", json!({}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("thing"));
    }

    #[tokio::test]
    async fn valid_call_dispatches_to_provider() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Stub));
        let ctx = ToolContext::new("s1", "/tmp");
        let result = registry.call("stub", json!({"thing": 1}), &ctx).await.unwrap();
        assert!(!result.is_error);
    }
}
