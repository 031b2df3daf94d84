//! Named registry of externally managed connection sources.

use std::collections::HashMap;

use parking_lot::RwLock;
use sea_orm::DatabaseConnection;
use tracing::debug;

/// Resolves a connection source registered under a name.
pub trait ResourceDirectory: Send + Sync {
    fn lookup(&self, name: &str) -> Option<DatabaseConnection>;
}

/// In-process directory; the owner binds connections before bootstrap.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<HashMap<String, DatabaseConnection>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` under `name`, replacing any previous binding.
    pub fn bind(&self, name: impl Into<String>, conn: DatabaseConnection) {
        let name = name.into();
        debug!(name = %name, "resource=bind");
        self.entries.write().insert(name, conn);
    }

    pub fn unbind(&self, name: &str) -> Option<DatabaseConnection> {
        self.entries.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ResourceDirectory for ResourceRegistry {
    fn lookup(&self, name: &str) -> Option<DatabaseConnection> {
        self.entries.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ConnectionTrait, Database, DatabaseBackend};

    use super::*;

    #[tokio::test]
    async fn bind_lookup_unbind() {
        let registry = ResourceRegistry::new();
        assert!(registry.lookup("jdbc/modeler").is_none());

        let conn = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        registry.bind("jdbc/modeler", conn);
        let conn = registry.lookup("jdbc/modeler").expect("bound");
        assert_eq!(conn.get_database_backend(), DatabaseBackend::Sqlite);
        assert_eq!(registry.names(), vec!["jdbc/modeler".to_string()]);

        assert!(registry.unbind("jdbc/modeler").is_some());
        assert!(registry.lookup("jdbc/modeler").is_none());
    }
}
