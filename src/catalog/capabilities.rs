//! Source capabilities
//!
//! Describes which operations a physical source accepts in pushed-down
//! commands. Rules consult capabilities before moving work into an access.

use std::collections::HashMap;

/// Pushdown operations supported by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// WHERE criteria of any kind
    pub supports_criteria: bool,
    /// LIKE predicates inside criteria
    pub supports_like: bool,
    /// IN (list) predicates inside criteria
    pub supports_in_criteria: bool,
    /// Row limit on queries
    pub supports_row_limit: bool,
    /// Multiple update commands in one request
    pub supports_batched_updates: bool,
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self {
            supports_criteria: true,
            supports_like: true,
            supports_in_criteria: true,
            supports_row_limit: true,
            supports_batched_updates: true,
        }
    }
}

impl SourceCapabilities {
    /// A source that accepts only plain scans and single updates
    pub fn minimal() -> Self {
        Self {
            supports_criteria: false,
            supports_like: false,
            supports_in_criteria: false,
            supports_row_limit: false,
            supports_batched_updates: false,
        }
    }
}

/// Looks up the capabilities of the source(s) bound to a model
pub trait CapabilitiesFinder: Send + Sync {
    fn find_capabilities(&self, model: &str) -> SourceCapabilities;
}

/// Capabilities finder backed by a map, with a fallback for unknown models
#[derive(Debug, Clone, Default)]
pub struct BasicCapabilitiesFinder {
    by_model: HashMap<String, SourceCapabilities>,
    fallback: SourceCapabilities,
}

impl BasicCapabilitiesFinder {
    pub fn new(fallback: SourceCapabilities) -> Self {
        Self {
            by_model: HashMap::new(),
            fallback,
        }
    }

    /// Register capabilities for a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, caps: SourceCapabilities) -> Self {
        self.by_model.insert(model.into().to_lowercase(), caps);
        self
    }
}

impl CapabilitiesFinder for BasicCapabilitiesFinder {
    fn find_capabilities(&self, model: &str) -> SourceCapabilities {
        self.by_model
            .get(&model.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_and_override() {
        let finder = BasicCapabilitiesFinder::default()
            .with_model("Legacy", SourceCapabilities::minimal());
        assert!(!finder.find_capabilities("legacy").supports_criteria);
        assert!(finder.find_capabilities("other").supports_criteria);
    }
}
