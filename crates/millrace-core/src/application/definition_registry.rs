use crate::{
    domain::payloads::{GetProcessDefinitionsPayload, StartProcessPayload},
    domain::process_definition::{ProcessDefinition, ProcessDefinitionId},
    domain::repository::ProcessDefinitionRepository,
    CoreError,
};
use std::sync::Arc;
use tracing::debug;

/// Read-only lookup over deployed definitions
#[derive(Clone)]
pub struct DefinitionRegistry {
    repository: Arc<dyn ProcessDefinitionRepository>,
}

impl DefinitionRegistry {
    /// Create a registry backed by `repository`
    pub fn new(repository: Arc<dyn ProcessDefinitionRepository>) -> Self {
        Self { repository }
    }

    /// Exact lookup by ID, falling back to the latest version of a key
    pub async fn find(&self, id_or_key: &str) -> Result<ProcessDefinition, CoreError> {
        if let Some(definition) = self
            .repository
            .find_by_id(&ProcessDefinitionId::from(id_or_key))
            .await?
        {
            return Ok(definition);
        }

        self.repository
            .find_latest_by_key(id_or_key)
            .await?
            .ok_or_else(|| CoreError::DefinitionNotFound(id_or_key.to_string()))
    }

    /// Latest version of `key`
    pub async fn latest(&self, key: &str) -> Result<ProcessDefinition, CoreError> {
        self.repository
            .find_latest_by_key(key)
            .await?
            .ok_or_else(|| CoreError::DefinitionNotFound(key.to_string()))
    }

    /// Definition a start payload refers to. An explicit ID wins over the key;
    /// when both are given they must agree.
    pub async fn resolve_for_start(
        &self,
        payload: &StartProcessPayload,
    ) -> Result<ProcessDefinition, CoreError> {
        let key = payload
            .process_definition_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());

        match &payload.process_definition_id {
            Some(id) if !id.0.trim().is_empty() => {
                let definition = self
                    .repository
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| CoreError::DefinitionNotFound(id.0.clone()))?;

                if let Some(key) = key {
                    if definition.key != key {
                        return Err(CoreError::ValidationError(format!(
                            "Process definition {} does not belong to key {}",
                            id, key
                        )));
                    }
                }

                Ok(definition)
            }
            _ => match key {
                Some(key) => self.latest(key).await,
                None => Err(CoreError::ValidationError(
                    "Either process_definition_id or process_definition_key is required"
                        .to_string(),
                )),
            },
        }
    }

    /// Deployed definitions in deployment order, optionally filtered
    pub async fn list(
        &self,
        filter: Option<&GetProcessDefinitionsPayload>,
    ) -> Result<Vec<ProcessDefinition>, CoreError> {
        let definitions = self.repository.find_all().await?;
        let total = definitions.len();

        let definitions: Vec<_> = match filter {
            Some(filter) => definitions
                .into_iter()
                .filter(|d| filter.matches(d))
                .collect(),
            None => definitions,
        };

        debug!(
            total = total,
            matched = definitions.len(),
            "Listed process definitions"
        );
        Ok(definitions)
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::repository::memory::MemoryProcessDefinitionRepository;

    fn registry() -> DefinitionRegistry {
        let repository = MemoryProcessDefinitionRepository::with_definitions([
            ProcessDefinition::new("order:1", "order", "Order", 1),
            ProcessDefinition::new("order:2", "order", "Order", 2),
            ProcessDefinition::new("invoice:1", "invoice", "Invoice", 1),
        ])
        .unwrap();
        DefinitionRegistry::new(Arc::new(repository))
    }

    #[tokio::test]
    async fn test_find_by_id_then_key() {
        let registry = registry();
        assert_eq!(registry.find("order:1").await.unwrap().version, 1);
        assert_eq!(registry.find("order").await.unwrap().version, 2);
        assert!(matches!(
            registry.find("missing").await,
            Err(CoreError::DefinitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_for_start() {
        let registry = registry();

        let by_key = registry
            .resolve_for_start(&StartProcessPayload::by_key("order"))
            .await
            .unwrap();
        assert_eq!(by_key.id.0, "order:2");

        let by_id = registry
            .resolve_for_start(&StartProcessPayload::by_id("order:1"))
            .await
            .unwrap();
        assert_eq!(by_id.version, 1);

        let mismatch = StartProcessPayload {
            process_definition_key: Some("invoice".to_string()),
            ..StartProcessPayload::by_id("order:1")
        };
        assert!(matches!(
            registry.resolve_for_start(&mismatch).await,
            Err(CoreError::ValidationError(_))
        ));

        assert!(matches!(
            registry
                .resolve_for_start(&StartProcessPayload::by_id("order:9"))
                .await,
            Err(CoreError::DefinitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_with_filter() {
        let registry = registry();
        let filter = GetProcessDefinitionsPayload {
            process_definition_keys: vec!["invoice".to_string()],
            ..GetProcessDefinitionsPayload::default()
        };

        let all = registry.list(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let invoices = registry.list(Some(&filter)).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].key, "invoice");
    }
}
