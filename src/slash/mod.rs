//! Slash-command registry.
//!
//! An ordered list behind a lock plus a single boxed callback, rather than
//! a per-event, fire-once callback: this registry keeps one persistent
//! `onChange` callback that fires on every mutation with the full ordered
//! snapshot, since there is exactly one listener (the dispatcher) for the
//! whole process lifetime rather than one per invocation.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub type ChangeCallback = Box<dyn Fn(Vec<SlashCommand>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashCommand {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
}

impl SlashCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let description = description.into();
        if name.is_empty() {
            return Err(AgentError::invalid_params("slash command name must be non-empty"));
        }
        if description.is_empty() {
            return Err(AgentError::invalid_params("slash command description must be non-empty"));
        }
        Ok(Self { name, description, input_hint: None })
    }

    pub fn with_input_hint(mut self, hint: impl Into<String>) -> Result<Self> {
        let hint = hint.into();
        if hint.is_empty() {
            return Err(AgentError::invalid_params("slash command input hint must be non-empty when present"));
        }
        self.input_hint = Some(hint);
        Ok(self)
    }
}

/// Plain `Vec` under a lock keeps registration order as the natural
/// iteration order; the catalog is small enough (a handful of commands)
/// that linear lookup costs nothing compared to the bookkeeping a map
/// keyed alongside an order index would need.
pub struct SlashRegistry {
    ordered: RwLock<Vec<SlashCommand>>,
    callback: RwLock<Option<ChangeCallback>>,
}

impl SlashRegistry {
    pub fn new() -> Self {
        Self {
            ordered: RwLock::new(Vec::new()),
            callback: RwLock::new(None),
        }
    }

    pub fn on_change(&self, cb: ChangeCallback) {
        *self.callback.write().unwrap() = Some(cb);
    }

    fn fire(&self) {
        let snapshot = self.snapshot();
        if let Some(cb) = self.callback.read().unwrap().as_ref() {
            cb(snapshot);
        }
    }

    pub fn register(&self, command: SlashCommand) {
        let mut guard = self.ordered.write().unwrap();
        if let Some(existing) = guard.iter_mut().find(|c| c.name == command.name) {
            *existing = command;
        } else {
            guard.push(command);
        }
        drop(guard);
        self.fire();
    }

    pub fn bulk_update(&self, commands: Vec<SlashCommand>) {
        *self.ordered.write().unwrap() = commands;
        self.fire();
    }

    pub fn remove(&self, name: &str) {
        self.ordered.write().unwrap().retain(|c| c.name != name);
        self.fire();
    }

    pub fn clear(&self) {
        self.ordered.write().unwrap().clear();
        self.fire();
    }

    /// Re-invoke the callback with the current snapshot without mutating state.
    pub fn trigger(&self) {
        self.fire();
    }

    pub fn get(&self, name: &str) -> Option<SlashCommand> {
        self.ordered.read().unwrap().iter().find(|c| c.name == name).cloned()
    }

    pub fn snapshot(&self) -> Vec<SlashCommand> {
        self.ordered.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.ordered.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SlashRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SlashRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlashRegistry").field("count", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn rejects_empty_name_and_description() {
        assert!(SlashCommand::new("", "desc").is_err());
        assert!(SlashCommand::new("model", "").is_err());
    }

    #[test]
    fn register_preserves_insertion_order() {
        let registry = SlashRegistry::new();
        registry.register(SlashCommand::new("model", "switch model").unwrap());
        registry.register(SlashCommand::new("mode", "switch mode").unwrap());
        let names: Vec<_> = registry.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["model", "mode"]);
    }

    #[test]
    fn every_mutation_fires_callback_once() {
        let registry = SlashRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        registry.on_change(Box::new(move |_snapshot| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.register(SlashCommand::new("model", "switch model").unwrap());
        registry.remove("model");
        registry.bulk_update(vec![]);
        registry.clear();
        registry.trigger();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn remove_preserves_order_of_remaining_entries() {
        let registry = SlashRegistry::new();
        registry.register(SlashCommand::new("a", "a").unwrap());
        registry.register(SlashCommand::new("b", "b").unwrap());
        registry.register(SlashCommand::new("c", "c").unwrap());
        registry.remove("b");
        let names: Vec<_> = registry.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
