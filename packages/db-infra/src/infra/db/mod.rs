pub mod core;
pub mod diagnostics;
pub mod dialect;
pub mod locking;
pub mod migrate;
pub mod registry;
pub mod session;
pub mod source;
pub mod txn;

pub use self::core::{sanitize_db_url, PersistenceContext};
pub use diagnostics::{RunOutcome, RunStats};
pub use dialect::{Dialect, DialectInfo};
pub use locking::{BootstrapLock, ChangelogLockTable, Guard};
pub use migrate::{force_release_lock, run_migrations, MigrationReport};
pub use registry::{ResourceDirectory, ResourceRegistry};
pub use session::{build_session_factory, SessionFactory, Statistics, StatisticsSnapshot};
pub use source::{build_connection_source, ConnectionSource};
pub use txn::{TransactionManager, TxnPolicy};
