use anyhow::Result;
use dashmap::DashMap;

use super::provider::ContextStore;
use crate::services::conversation::SessionContext;

/// Process-local context store. Used when no context service is configured.
#[derive(Default)]
pub struct InMemoryContextStore {
    contexts: DashMap<String, SessionContext>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[async_trait::async_trait]
impl ContextStore for InMemoryContextStore {
    async fn save(&self, session_id: &str, context: &SessionContext) -> Result<()> {
        self.contexts.insert(session_id.to_string(), context.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        Ok(self.contexts.get(session_id).map(|c| c.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryContextStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        let ctx = SessionContext::new("s1", Utc::now());
        store.save("s1", &ctx).await.unwrap();

        assert_eq!(store.load("s1").await.unwrap(), Some(ctx));
        assert_eq!(store.len(), 1);
    }
}
