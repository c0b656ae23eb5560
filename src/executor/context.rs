//! Command context for executors
//!
//! One `CommandContext` exists per request. It carries the request identity,
//! the engine configuration and the data manager every access node talks to,
//! plus the variable bindings that procedures and correlated criteria read.
//! All nodes of a plan instance share it through an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::datamgr::DataManager;

use super::datum::Datum;

/// Read access to variable bindings
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<Datum>;
}

/// Scoped variable bindings
///
/// Names are case-insensitive. Lookups search from the innermost scope
/// outwards.
#[derive(Debug, Clone)]
pub struct VariableContext {
    scopes: Vec<HashMap<String, Datum>>,
}

impl Default for VariableContext {
    fn default() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope; the outermost scope is never removed
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the innermost scope
    pub fn declare(&mut self, name: &str, value: Datum) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_lowercase(), value);
        }
    }

    /// Update the nearest existing binding of `name`, or declare it
    pub fn set(&mut self, name: &str, value: Datum) {
        let key = name.to_lowercase();
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(&key) {
                *slot = value;
                return;
            }
        }
        self.declare(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        let key = name.to_lowercase();
        self.scopes.iter().rev().find_map(|s| s.get(&key))
    }

    /// Remove every binding whose name starts with `prefix` from all scopes
    pub fn remove_prefixed(&mut self, prefix: &str) {
        let prefix = prefix.to_lowercase();
        for scope in &mut self.scopes {
            scope.retain(|k, _| !k.starts_with(&prefix));
        }
    }
}

impl VariableLookup for VariableContext {
    fn lookup(&self, name: &str) -> Option<Datum> {
        self.get(name).cloned()
    }
}

/// Per-request context shared by every node of one plan instance
pub struct CommandContext {
    request_id: String,
    part_id: String,
    user: String,
    config: Arc<EngineConfig>,
    data_manager: Arc<dyn DataManager>,
    variables: RwLock<VariableContext>,
    work_available: Arc<Notify>,
}

impl CommandContext {
    pub fn new(
        request_id: impl Into<String>,
        user: impl Into<String>,
        data_manager: Arc<dyn DataManager>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            part_id: "0".to_string(),
            user: user.into(),
            config: Arc::new(EngineConfig::default()),
            data_manager,
            variables: RwLock::new(VariableContext::new()),
            work_available: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub fn with_part_id(mut self, part_id: impl Into<String>) -> Self {
        self.part_id = part_id.into();
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn part_id(&self) -> &str {
        &self.part_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.processor_batch_size
    }

    pub fn data_manager(&self) -> &Arc<dyn DataManager> {
        &self.data_manager
    }

    pub fn variables(&self) -> RwLockReadGuard<'_, VariableContext> {
        self.variables.read()
    }

    pub fn variables_mut(&self) -> RwLockWriteGuard<'_, VariableContext> {
        self.variables.write()
    }

    /// Signalled whenever an outstanding source request makes progress
    pub fn work_notifier(&self) -> Arc<Notify> {
        self.work_available.clone()
    }
}

impl VariableLookup for CommandContext {
    fn lookup(&self, name: &str) -> Option<Datum> {
        self.variables.read().get(name).cloned()
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("request_id", &self.request_id)
            .field("part_id", &self.part_id)
            .field("user", &self.user)
            .finish()
    }
}
