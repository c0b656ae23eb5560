//! Catalog - read-only metadata for the optimizer and processors
//!
//! The catalog describes the logical groups (tables) that commands refer to,
//! the physical models those groups belong to, and the source bindings that
//! connect each model to one or more physical sources.
//!
//! Planning only ever reads metadata through the [`Metadata`] trait; the
//! in-memory [`Catalog`] is the implementation used by embedders and tests.

pub mod capabilities;

use std::collections::HashMap;
use std::fmt;

pub use capabilities::{BasicCapabilitiesFinder, CapabilitiesFinder, SourceCapabilities};

/// Data types of group elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// Boolean (true/false)
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    BigInt,
    /// 64-bit floating point
    Double,
    /// Variable-length string with max length
    Varchar(u32),
    /// Unlimited text
    Text,
    /// Binary data
    Blob,
    /// Timestamp (date and time)
    Timestamp,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::BigInt | DataType::Double)
    }

    /// Check if this type is a string type
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar(_) | DataType::Text)
    }
}

/// Element (column) definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Element name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Whether NULL values are allowed
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Set nullable
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A minimal set of elements that must appear in the criteria pushed to a
/// source before the source can be queried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPattern {
    pub columns: Vec<String>,
}

impl AccessPattern {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.columns.join(", "))
    }
}

/// Group (table) definition
#[derive(Debug, Clone)]
pub struct GroupDef {
    /// Fully qualified group name
    pub name: String,
    /// Model the group belongs to
    pub model: String,
    /// Element definitions in positional order
    pub columns: Vec<ColumnDef>,
    /// Declared access patterns; empty means unrestricted
    pub access_patterns: Vec<AccessPattern>,
}

impl GroupDef {
    /// Create a new group definition
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            columns: Vec::new(),
            access_patterns: Vec::new(),
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add an access pattern
    #[must_use]
    pub fn access_pattern(mut self, pattern: AccessPattern) -> Self {
        self.access_patterns.push(pattern);
        self
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Binding of a model to one physical source instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBinding {
    /// Source name, also the value of the discriminator element
    pub name: String,
    /// Connector that services the source
    pub connector: String,
}

impl SourceBinding {
    pub fn new(name: impl Into<String>, connector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector: connector.into(),
        }
    }
}

/// Physical model definition
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Model name
    pub name: String,
    /// Source bindings in declaration order
    pub sources: Vec<SourceBinding>,
    /// Whether every access is fanned out to all sources
    pub multi_source: bool,
    /// Discriminator element override; the engine default applies when unset
    pub discriminator: Option<String>,
}

impl ModelDef {
    /// Create a single-source model bound to `connector`
    pub fn new(name: impl Into<String>, connector: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sources: vec![SourceBinding::new(name.clone(), connector)],
            name,
            multi_source: false,
            discriminator: None,
        }
    }

    /// Create a multi-source model with the given bindings
    pub fn multi_source(name: impl Into<String>, sources: Vec<SourceBinding>) -> Self {
        Self {
            name: name.into(),
            sources,
            multi_source: true,
            discriminator: None,
        }
    }

    /// Override the discriminator element name
    #[must_use]
    pub fn discriminator(mut self, element: impl Into<String>) -> Self {
        self.discriminator = Some(element.into());
        self
    }

    /// First (or only) source binding
    pub fn primary_source(&self) -> Option<&SourceBinding> {
        self.sources.first()
    }
}

/// Catalog error
#[derive(Debug, Clone)]
pub enum CatalogError {
    /// Group already exists
    GroupExists(String),
    /// Model already exists
    ModelExists(String),
    /// Model not found
    ModelNotFound(String),
    /// Model declared without any source binding
    NoSources(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::GroupExists(name) => write!(f, "Group '{}' already exists", name),
            CatalogError::ModelExists(name) => write!(f, "Model '{}' already exists", name),
            CatalogError::ModelNotFound(name) => write!(f, "Model '{}' not found", name),
            CatalogError::NoSources(name) => write!(f, "Model '{}' has no source bindings", name),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Read-only metadata lookups used during planning
pub trait Metadata: Send + Sync {
    /// Look up a group by name
    fn group(&self, name: &str) -> Option<&GroupDef>;

    /// Look up a model by name
    fn model(&self, name: &str) -> Option<&ModelDef>;

    /// Model that owns `group`
    fn model_for_group(&self, group: &str) -> Option<&ModelDef> {
        self.group(group).and_then(|g| self.model(&g.model))
    }

    /// Access patterns declared on `group`
    fn access_patterns(&self, group: &str) -> &[AccessPattern] {
        self.group(group)
            .map(|g| g.access_patterns.as_slice())
            .unwrap_or(&[])
    }
}

/// In-memory metadata catalog
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// Groups by lowercase name
    groups: HashMap<String, GroupDef>,
    /// Models by lowercase name
    models: HashMap<String, ModelDef>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model
    pub fn create_model(&mut self, def: ModelDef) -> CatalogResult<()> {
        let key = def.name.to_lowercase();
        if self.models.contains_key(&key) {
            return Err(CatalogError::ModelExists(def.name));
        }
        if def.sources.is_empty() {
            return Err(CatalogError::NoSources(def.name));
        }
        self.models.insert(key, def);
        Ok(())
    }

    /// Register a group; its model must already exist
    pub fn create_group(&mut self, def: GroupDef) -> CatalogResult<()> {
        let key = def.name.to_lowercase();
        if self.groups.contains_key(&key) {
            return Err(CatalogError::GroupExists(def.name));
        }
        if !self.models.contains_key(&def.model.to_lowercase()) {
            return Err(CatalogError::ModelNotFound(def.model));
        }
        self.groups.insert(key, def);
        Ok(())
    }

    /// List all group names
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.values().map(|g| g.name.as_str()).collect()
    }
}

impl Metadata for Catalog {
    fn group(&self, name: &str) -> Option<&GroupDef> {
        self.groups.get(&name.to_lowercase())
    }

    fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(&name.to_lowercase())
    }
}
