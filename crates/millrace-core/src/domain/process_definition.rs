use crate::types::{SortKey, Sortable};
use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Value object: Process Definition ID (assigned at deployment time)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessDefinitionId(pub String);

impl fmt::Display for ProcessDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessDefinitionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProcessDefinitionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A deployed process definition. Immutable once deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Deployment-assigned ID, unique across all versions
    pub id: ProcessDefinitionId,

    /// Key shared by all versions of the same process
    pub key: String,

    /// Human-readable name
    pub name: String,

    /// Version within the key, starting at 1
    pub version: u32,

    /// Description of the process
    #[serde(default)]
    pub description: Option<String>,

    /// Form attached to the start event, if any
    #[serde(default)]
    pub form_key: Option<String>,

    /// Version of the application the definition was deployed with
    #[serde(default)]
    pub app_version: Option<String>,

    /// Whether instances stay CREATED after start and are activated in the background
    #[serde(default)]
    pub async_start: bool,

    /// Free-form deployment metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ProcessDefinition {
    /// Create a definition with the mandatory fields
    pub fn new(
        id: impl Into<ProcessDefinitionId>,
        key: impl Into<String>,
        name: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            name: name.into(),
            version,
            description: None,
            form_key: None,
            app_version: None,
            async_start: false,
            metadata: HashMap::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare an asynchronous start
    pub fn with_async_start(mut self, async_start: bool) -> Self {
        self.async_start = async_start;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate the structural fields of the definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.0.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Process definition id must not be empty".to_string(),
            ));
        }

        if self.key.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Process definition {} has an empty key",
                self.id
            )));
        }

        if self.version == 0 {
            return Err(CoreError::ValidationError(format!(
                "Process definition {} must have a version of at least 1",
                self.id
            )));
        }

        Ok(())
    }
}

impl Sortable for ProcessDefinition {
    fn is_sortable_by(property: &str) -> bool {
        matches!(property, "id" | "key" | "name" | "version")
    }

    fn sort_key(&self, property: &str) -> Option<SortKey> {
        match property {
            "id" => Some(SortKey::Text(self.id.0.clone())),
            "key" => Some(SortKey::Text(self.key.clone())),
            "name" => Some(SortKey::Text(self.name.clone())),
            "version" => Some(SortKey::Int(i64::from(self.version))),
            _ => None,
        }
    }
}

/// Descriptive information about the latest version of a definition key,
/// computed from the live instance set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinitionMeta {
    /// ID of the latest version
    pub id: ProcessDefinitionId,

    /// Definition key
    pub key: String,

    /// Name of the latest version
    pub name: String,

    /// Latest version number
    pub version: u32,

    /// Description of the latest version
    pub description: Option<String>,

    /// Live instances of any version still waiting for async activation
    pub created_instances: usize,

    /// Live instances of any version currently running
    pub running_instances: usize,

    /// Live instances of any version currently suspended
    pub suspended_instances: usize,
}
