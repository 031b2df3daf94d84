//! Names of the tables the migrator uses to track its own state.
//!
//! The modeler shares its database with other engines that run their own
//! migrators, so both bookkeeping tables are prefixed with `ACT_DE_`.

use sea_orm::DbBackend;

/// Prefix applied to both bookkeeping tables.
pub const BOOKKEEPING_PREFIX: &str = "ACT_DE_";

/// Unprefixed name of the applied-migrations table.
pub const CHANGELOG_TABLE: &str = "seaql_migrations";

/// Unprefixed name of the changelog lock table.
pub const CHANGELOG_LOCK_TABLE: &str = "seaql_migrations_lock";

/// Resolved names of the changelog and changelog-lock tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookkeepingTables {
    pub changelog: String,
    pub changelog_lock: String,
}

impl BookkeepingTables {
    /// Default names the migrator would use on `backend` without a prefix.
    pub fn defaults_for(backend: DbBackend) -> Self {
        // sea-orm-migration uses the same names on every backend
        match backend {
            DbBackend::Postgres | DbBackend::MySql | DbBackend::Sqlite => Self {
                changelog: CHANGELOG_TABLE.to_string(),
                changelog_lock: CHANGELOG_LOCK_TABLE.to_string(),
            },
        }
    }

    /// Prepend `prefix` to both table names.
    pub fn prefixed_with(self, prefix: &str) -> Self {
        Self {
            changelog: format!("{prefix}{}", self.changelog),
            changelog_lock: format!("{prefix}{}", self.changelog_lock),
        }
    }

    /// The tables actually used against `backend`.
    pub fn for_backend(backend: DbBackend) -> Self {
        Self::defaults_for(backend).prefixed_with(BOOKKEEPING_PREFIX)
    }
}

/// Name of the prefixed applied-migrations table.
pub fn changelog_table_name() -> String {
    format!("{BOOKKEEPING_PREFIX}{CHANGELOG_TABLE}")
}

/// Name of the prefixed changelog lock table.
pub fn changelog_lock_table_name() -> String {
    format!("{BOOKKEEPING_PREFIX}{CHANGELOG_LOCK_TABLE}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_backend_gets_prefixed_tables() {
        for backend in [DbBackend::Postgres, DbBackend::MySql, DbBackend::Sqlite] {
            let tables = BookkeepingTables::for_backend(backend);
            assert_eq!(tables.changelog, "ACT_DE_seaql_migrations");
            assert_eq!(tables.changelog_lock, "ACT_DE_seaql_migrations_lock");
        }
    }

    #[test]
    fn migrator_table_matches_resolved_tables() {
        let tables = BookkeepingTables::for_backend(DbBackend::Sqlite);
        assert_eq!(tables.changelog, changelog_table_name());
        assert_eq!(tables.changelog_lock, changelog_lock_table_name());
    }

    #[test]
    fn prefix_is_prepended_not_appended() {
        let tables = BookkeepingTables::defaults_for(DbBackend::Postgres).prefixed_with("X_");
        assert!(tables.changelog.starts_with("X_"));
        assert!(tables.changelog_lock.starts_with("X_"));
    }
}
