//! Database dialect detection.

use std::fmt;

use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Parse a configured dialect name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn from_backend(backend: DatabaseBackend) -> Self {
        match backend {
            DatabaseBackend::Postgres => Self::Postgres,
            DatabaseBackend::MySql => Self::MySql,
            DatabaseBackend::Sqlite => Self::Sqlite,
        }
    }

    pub fn backend(self) -> DatabaseBackend {
        match self {
            Self::Postgres => DatabaseBackend::Postgres,
            Self::MySql => DatabaseBackend::MySql,
            Self::Sqlite => DatabaseBackend::Sqlite,
        }
    }

    fn version_query(self) -> &'static str {
        match self {
            Self::Postgres | Self::MySql => "SELECT version() AS version",
            Self::Sqlite => "SELECT sqlite_version() AS version",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Dialect plus the server version string reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectInfo {
    pub dialect: Dialect,
    pub version: String,
}

/// Detect the dialect of `conn` and ask the server for its version.
pub async fn detect<C: ConnectionTrait>(conn: &C) -> Result<DialectInfo, DbErr> {
    let backend = conn.get_database_backend();
    let dialect = Dialect::from_backend(backend);

    let row = conn
        .query_one(Statement::from_string(backend, dialect.version_query()))
        .await?
        .ok_or_else(|| DbErr::Custom("version query returned no row".to_string()))?;
    let version: String = row.try_get("", "version")?;

    Ok(DialectInfo { dialect, version })
}
