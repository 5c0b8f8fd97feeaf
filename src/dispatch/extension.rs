//! `_namespace/method` extension router: anything beginning with `_`
//! dispatches here, and requires object-shaped params.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::{AgentError, Result};

pub type ExtensionHandler = Box<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Holds registered `_namespace/method` handlers. Empty by default; a
/// concrete build wires handlers in before `Dispatcher::run`.
pub struct ExtensionRegistry {
    handlers: BTreeMap<String, ExtensionHandler>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry").field("methods", &self.handlers.keys().collect::<Vec<_>>()).finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Register a handler for `method`, which must start with `_`.
    pub fn register(&mut self, method: impl Into<String>, handler: ExtensionHandler) -> Result<()> {
        let method = method.into();
        if !method.starts_with('_') {
            return Err(AgentError::InvalidExtensionName(method));
        }
        self.handlers.insert(method, handler);
        Ok(())
    }

    pub fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let params = match params {
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => return Err(AgentError::invalid_params("extension params must be an object")),
            None => Value::Object(serde_json::Map::new()),
        };
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| AgentError::MethodNotFound(method.to_string()))?;
        handler(params)
    }

    /// Group registered method names by namespace (the segment before the
    /// first `/`) for the `initialize` response's extension `_meta` map.
    pub fn namespace_meta(&self) -> Value {
        let mut namespaces: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for method in self.handlers.keys() {
            let namespace = method.split('/').next().unwrap_or(method.as_str());
            namespaces.entry(namespace).or_default().push(method.as_str());
        }
        json!(namespaces)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_registration_without_leading_underscore() {
        let mut registry = ExtensionRegistry::new();
        let err = registry.register("telemetry/ping", Box::new(|p| Ok(p))).unwrap_err();
        assert!(err.to_string().contains("must start with"));
    }

    #[test]
    fn dispatch_rejects_non_object_params() {
        let mut registry = ExtensionRegistry::new();
        registry.register("_telemetry/ping", Box::new(|p| Ok(p))).unwrap();
        let err = registry.dispatch("_telemetry/ping", Some(json!([1, 2]))).unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn dispatch_routes_to_registered_handler() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register("_telemetry/ping", Box::new(|p| Ok(json!({"echo": p}))))
            .unwrap();
        let result = registry.dispatch("_telemetry/ping", Some(json!({"a": 1}))).unwrap();
        assert_eq!(result, json!({"echo": {"a": 1}}));
    }

    #[test]
    fn unknown_method_is_not_found() {
        let registry = ExtensionRegistry::new();
        let err = registry.dispatch("_telemetry/ping", None).unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }

    #[test]
    fn namespace_meta_groups_by_leading_segment() {
        let mut registry = ExtensionRegistry::new();
        registry.register("_telemetry/ping", Box::new(|p| Ok(p))).unwrap();
        registry.register("_telemetry/flush", Box::new(|p| Ok(p))).unwrap();
        registry.register("_billing/usage", Box::new(|p| Ok(p))).unwrap();
        let meta = registry.namespace_meta();
        assert_eq!(meta["_telemetry"].as_array().unwrap().len(), 2);
        assert_eq!(meta["_billing"].as_array().unwrap().len(), 1);
    }
}
