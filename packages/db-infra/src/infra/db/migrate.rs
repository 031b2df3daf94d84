//! Changelog runner: applies the modeler changelog under the prefixed
//! changelog lock.

use std::time::{Duration, Instant};

use migration::{
    changelog_state, migrate, BookkeepingTables, ChangelogState, MigrationCommand, Migrator,
    MigratorTrait,
};
use rand::Rng;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::dialect::{self, Dialect};
use super::diagnostics::{RunOutcome, RunStats};
use super::locking::{self, BootstrapLock, ChangelogLockTable, Guard};
use super::source::ConnectionSource;
use crate::config::db::MigrationPlan;
use crate::error::{DbInfraError, MigrationError};

/// Outcome of a successful changelog run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub changelog: &'static str,
    pub command: MigrationCommand,
    pub dialect: Dialect,
    pub version: String,
    pub tables: BookkeepingTables,
    pub applied_before: usize,
    pub applied_after: usize,
    /// Migrations still unapplied once the run finished.
    pub pending: Vec<String>,
    /// The schema was already current and nothing was applied.
    pub skipped: bool,
    pub stats: RunStats,
}

impl MigrationReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.skipped {
            RunOutcome::UpToDate
        } else if matches!(self.command, MigrationCommand::Status) {
            RunOutcome::StatusOnly
        } else {
            RunOutcome::Applied
        }
    }
}

enum Acquired {
    Lock(Guard),
    UpToDate,
}

/// Run `plan` against `source`.
///
/// Every failure is reported as [`DbInfraError::Migration`] with the
/// underlying cause kept as its source.
pub async fn run_migrations(
    source: &ConnectionSource,
    plan: &MigrationPlan,
    cancellation: &CancellationToken,
) -> Result<MigrationReport, DbInfraError> {
    let mut stats = RunStats::default();
    let result = run_plan(source, plan, cancellation, &mut stats).await;

    match result {
        Ok(mut report) => {
            report.stats = stats;
            stats.log(plan.changelog, report.outcome());
            Ok(report)
        }
        Err(cause) => {
            stats.log(plan.changelog, RunOutcome::from_error(&cause));
            error!(changelog = plan.changelog, error = %cause, "migrate=failed");
            Err(DbInfraError::Migration {
                changelog: plan.changelog,
                source: cause,
            })
        }
    }
}

/// Clear the changelog lock of the database behind `source`, whoever
/// holds it. Returns whether a held lock was cleared.
pub async fn force_release_lock(source: &ConnectionSource) -> Result<bool, DbInfraError> {
    let wrap = |cause| DbInfraError::Migration {
        changelog: migration::CHANGELOG,
        source: cause,
    };

    let conn = changelog_connection(source).map_err(wrap)?;
    let tables = BookkeepingTables::for_backend(conn.get_database_backend());
    let lock = ChangelogLockTable::new(conn.clone(), tables.changelog_lock.clone(), "release-lock");
    lock.ensure().await.map_err(wrap)?;

    if let Some(holder) = lock.holder().await.map_err(wrap)? {
        info!(table = %tables.changelog_lock, holder = %holder, "lock=force_release");
    }
    locking::force_release(&conn, &tables.changelog_lock)
        .await
        .map_err(wrap)
}

fn changelog_connection(source: &ConnectionSource) -> Result<DatabaseConnection, MigrationError> {
    source
        .connection()
        .map_err(|e| MigrationError::SourceUnavailable {
            reason: e.to_string(),
        })
}

async fn run_plan(
    source: &ConnectionSource,
    plan: &MigrationPlan,
    cancellation: &CancellationToken,
    stats: &mut RunStats,
) -> Result<MigrationReport, MigrationError> {
    let conn = changelog_connection(source)?;

    let info = dialect::detect(&conn)
        .await
        .map_err(MigrationError::Dialect)?;
    let tables = BookkeepingTables::for_backend(conn.get_database_backend());

    info!(
        "migrate=start changelog={} context={} cmd={:?} source={}",
        plan.changelog,
        plan.context,
        plan.command,
        source.kind()
    );
    info!(
        dialect = %info.dialect,
        version = %info.version,
        changelog_table = %tables.changelog,
        lock_table = %tables.changelog_lock,
        "changelog=tables"
    );

    let owner = format!("{}:pid-{}", plan.context, std::process::id());
    let mut lock = ChangelogLockTable::new(conn.clone(), tables.changelog_lock.clone(), owner);
    lock.ensure().await?;

    let before = changelog_state(&conn)
        .await
        .map_err(MigrationError::SchemaCheck)?;

    let mut report = MigrationReport {
        changelog: plan.changelog,
        command: plan.command,
        dialect: info.dialect,
        version: info.version,
        tables,
        applied_before: before.applied,
        applied_after: before.applied,
        pending: before.pending,
        skipped: false,
        stats: RunStats::default(),
    };

    if matches!(plan.command, MigrationCommand::Status) {
        migrate(&conn, plan.command)
            .await
            .map_err(MigrationError::Apply)?;
        info!("migrate=done pending={}", report.pending.len());
        return Ok(report);
    }

    let guard = match acquire_with_backoff(&conn, &mut lock, plan, cancellation, stats).await? {
        Acquired::Lock(guard) => guard,
        Acquired::UpToDate => {
            info!("migrate=skipped up_to_date=true");
            report.skipped = true;
            return Ok(report);
        }
    };

    let outcome = apply_under_guard(&conn, plan, cancellation, stats).await;

    match guard.release().await {
        Ok(()) => {}
        Err(release_err) if outcome.is_ok() => return Err(release_err),
        Err(release_err) => {
            warn!(error = %release_err, "Failed to release changelog lock after error");
        }
    }

    let after = outcome?;
    report.applied_after = after.applied;
    report.pending = after.pending;
    info!(
        "migrate=done applied_before={} applied_after={}",
        report.applied_before, report.applied_after
    );
    Ok(report)
}

/// Current-schema check used to skip `Up` without taking the lock.
async fn fast_path_schema_check(
    conn: &DatabaseConnection,
    stats: &mut RunStats,
) -> Result<bool, MigrationError> {
    stats.schema_checks += 1;

    let expected = Migrator::migrations();
    let expected_count = expected.len();
    let expected_last = expected
        .last()
        .map(|m| m.name().to_string())
        .unwrap_or_default();

    let applied = Migrator::get_applied_migrations(conn)
        .await
        .map_err(MigrationError::SchemaCheck)?;
    let current_count = applied.len();
    let current_last = applied.last().map(|m| m.name().to_string());

    let is_up_to_date = current_count == expected_count
        && !expected_last.is_empty()
        && current_last.as_deref() == Some(expected_last.as_str());

    if is_up_to_date {
        trace!(fastpath = "hit", current_count, expected_count);
    } else {
        trace!(
            fastpath = "miss",
            current_count,
            expected_count,
            current_last = %current_last.as_deref().unwrap_or(""),
            expected_last = %expected_last,
            reason = "count_or_version_mismatch"
        );
    }

    Ok(is_up_to_date)
}

async fn acquire_with_backoff<L>(
    conn: &DatabaseConnection,
    lock: &mut L,
    plan: &MigrationPlan,
    cancellation: &CancellationToken,
    stats: &mut RunStats,
) -> Result<Acquired, MigrationError>
where
    L: BootstrapLock,
{
    info!(
        acquire_ms = plan.lock_timeout.as_millis(),
        body_ms = plan.body_timeout.as_millis(),
        "migration timeouts configured"
    );

    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if matches!(plan.command, MigrationCommand::Up)
            && fast_path_schema_check(conn, stats).await?
        {
            stats.lock_wait = start.elapsed();
            return Ok(Acquired::UpToDate);
        }

        attempts += 1;
        stats.lock_attempts = attempts;

        if let Some(guard) = lock.try_acquire().await? {
            stats.lock_wait = start.elapsed();
            trace!(
                lock = "won",
                attempts,
                elapsed_ms = start.elapsed().as_millis()
            );
            return Ok(Acquired::Lock(guard));
        }

        let base_delay_ms = (5u64 << attempts.saturating_sub(1).min(16)).min(80);
        let jitter_ms = rand::rng().random::<u64>() % 4;
        let delay_ms = base_delay_ms + jitter_ms;

        trace!(
            lock = "backoff",
            attempts,
            delay_ms,
            elapsed_ms = start.elapsed().as_millis()
        );
        stats.backoff_events += 1;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                if start.elapsed() >= plan.lock_timeout {
                    stats.lock_wait = start.elapsed();
                    return Err(MigrationError::LockTimeout {
                        table: lock_table_name(conn),
                        elapsed_ms: start.elapsed().as_millis(),
                        attempts,
                    });
                }
            }
            _ = cancellation.cancelled() => {
                stats.lock_wait = start.elapsed();
                info!(
                    elapsed_ms = start.elapsed().as_millis(),
                    attempts,
                    "Migration cancelled during acquire backoff"
                );
                return Err(MigrationError::Cancelled {
                    elapsed_ms: start.elapsed().as_millis(),
                });
            }
        }
    }
}

fn lock_table_name(conn: &DatabaseConnection) -> String {
    BookkeepingTables::for_backend(conn.get_database_backend()).changelog_lock
}

/// Apply the changelog and verify the result.
async fn apply_under_guard(
    conn: &DatabaseConnection,
    plan: &MigrationPlan,
    cancellation: &CancellationToken,
    stats: &mut RunStats,
) -> Result<ChangelogState, MigrationError> {
    let start = Instant::now();
    let command = plan.command;

    let task_conn = conn.clone();
    let mut migration_task = tokio::spawn(async move { migrate(&task_conn, command).await });

    let finished = tokio::select! {
        biased;

        task_result = &mut migration_task => {
            match task_result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(MigrationError::Apply(e)),
                Err(join_err) if join_err.is_panic() => Err(MigrationError::TaskAborted {
                    reason: "migration task panicked during execution",
                }),
                Err(_) => Err(MigrationError::TaskAborted {
                    reason: "migration task was aborted before completion",
                }),
            }
        }
        _ = tokio::time::sleep(plan.body_timeout) => {
            migration_task.abort();
            let _ = migration_task.await;
            info!(
                elapsed_ms = start.elapsed().as_millis(),
                "Migration body timeout - task aborted"
            );
            Err(MigrationError::BodyTimeout {
                timeout_ms: plan.body_timeout.as_millis(),
            })
        }
        _ = cancellation.cancelled() => {
            migration_task.abort();
            let _ = migration_task.await;
            info!(
                elapsed_ms = start.elapsed().as_millis(),
                "Migration cancelled during body execution - task aborted"
            );
            Err(MigrationError::Cancelled {
                elapsed_ms: start.elapsed().as_millis(),
            })
        }
    };
    stats.body_time = start.elapsed();
    finished?;

    info!(
        migrator = "ran",
        context = %plan.context,
        elapsed_ms = start.elapsed().as_millis()
    );

    let state = changelog_state(conn)
        .await
        .map_err(MigrationError::SchemaCheck)?;
    info!(
        migrate = "counts",
        expected_count = state.defined,
        applied_count = state.applied
    );

    let expected = match command {
        MigrationCommand::Reset => Some(0),
        MigrationCommand::Up | MigrationCommand::Fresh | MigrationCommand::Refresh => {
            Some(state.defined)
        }
        MigrationCommand::Down | MigrationCommand::Status => None,
    };
    if let Some(expected) = expected {
        if state.applied != expected {
            return Err(MigrationError::Verification {
                expected,
                applied: state.applied,
            });
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use db_test_support::LogCapture;
    use sea_orm::Database;

    use super::*;

    async fn external_source() -> ConnectionSource {
        let conn = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        ConnectionSource::External {
            name: "test".to_string(),
            conn,
        }
    }

    fn quick_plan(command: MigrationCommand) -> MigrationPlan {
        MigrationPlan::default()
            .with_command(command)
            .with_lock_timeout(Duration::from_millis(60))
    }

    async fn hold_lock(source: &ConnectionSource, owner: &str) -> Guard {
        let conn = source.connection().expect("usable");
        let mut lock = ChangelogLockTable::new(conn, "ACT_DE_seaql_migrations_lock", owner);
        lock.ensure().await.expect("ensure");
        lock.try_acquire().await.expect("acquire").expect("won")
    }

    #[tokio::test]
    async fn up_applies_then_takes_fast_path() {
        let source = external_source().await;
        let token = CancellationToken::new();

        let first = run_migrations(&source, &quick_plan(MigrationCommand::Up), &token)
            .await
            .expect("first run");
        assert!(!first.skipped);
        assert_eq!(first.applied_before, 0);
        assert_eq!(first.applied_after, Migrator::migrations().len());
        assert_eq!(first.dialect, Dialect::Sqlite);
        assert_eq!(first.tables.changelog, "ACT_DE_seaql_migrations");
        assert!(first.pending.is_empty());
        assert_eq!(first.outcome(), RunOutcome::Applied);
        assert_eq!(first.stats.lock_attempts, 1);
        assert_eq!(first.stats.backoff_events, 0);

        let second = run_migrations(&source, &quick_plan(MigrationCommand::Up), &token)
            .await
            .expect("second run");
        assert!(second.skipped);
        assert_eq!(second.outcome(), RunOutcome::UpToDate);
        assert_eq!(second.stats.lock_attempts, 0);
        assert_eq!(second.stats.schema_checks, 1);
    }

    #[tokio::test]
    async fn status_lists_pending_without_locking() {
        let source = external_source().await;
        let _held = hold_lock(&source, "other-node").await;

        let report = run_migrations(
            &source,
            &quick_plan(MigrationCommand::Status),
            &CancellationToken::new(),
        )
        .await
        .expect("status ignores the lock");
        assert_eq!(report.outcome(), RunOutcome::StatusOnly);
        assert_eq!(report.pending, vec!["m20240315_000001_modeler_init".to_string()]);
        assert_eq!(report.stats.lock_attempts, 0);
    }

    #[tokio::test]
    async fn fresh_rebuilds_only_modeler_tables() {
        let source = external_source().await;
        let conn = source.connection().expect("usable");
        conn.execute_unprepared("CREATE TABLE ACT_RU_TASK (id INTEGER PRIMARY KEY)")
            .await
            .expect("co-tenant table");
        let token = CancellationToken::new();
        run_migrations(&source, &quick_plan(MigrationCommand::Up), &token)
            .await
            .expect("up");

        let report = run_migrations(&source, &quick_plan(MigrationCommand::Fresh), &token)
            .await
            .expect("fresh");
        assert_eq!(report.applied_after, Migrator::migrations().len());

        conn.execute_unprepared("SELECT id FROM ACT_RU_TASK")
            .await
            .expect("co-tenant table survives");
        let lock = ChangelogLockTable::new(conn, "ACT_DE_seaql_migrations_lock", "checker");
        assert_eq!(lock.holder().await.expect("lock table survives"), None);
    }

    #[tokio::test]
    async fn lock_is_released_after_success() {
        let source = external_source().await;
        run_migrations(
            &source,
            &quick_plan(MigrationCommand::Up),
            &CancellationToken::new(),
        )
        .await
        .expect("run");

        let lock = ChangelogLockTable::new(
            source.connection().expect("usable"),
            "ACT_DE_seaql_migrations_lock",
            "checker",
        );
        assert_eq!(lock.holder().await.expect("holder"), None);
    }

    #[tokio::test]
    async fn contended_lock_times_out_with_cause() {
        let capture = LogCapture::new();
        let source = external_source().await;
        let _held = hold_lock(&source, "other-node").await;
        let _guard = capture.install();

        let err = run_migrations(
            &source,
            &quick_plan(MigrationCommand::Up),
            &CancellationToken::new(),
        )
        .await
        .expect_err("lock is held elsewhere");

        match &err {
            DbInfraError::Migration { changelog, source } => {
                assert_eq!(*changelog, "modeler-db-changelog");
                assert!(matches!(source, MigrationError::LockTimeout { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.source().is_some());
        assert!(capture.contents().contains("outcome=lock_timeout"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let source = external_source().await;
        let _held = hold_lock(&source, "other-node").await;
        let token = CancellationToken::new();
        token.cancel();

        let plan = quick_plan(MigrationCommand::Up).with_lock_timeout(Duration::from_secs(30));
        let err = run_migrations(&source, &plan, &token)
            .await
            .expect_err("cancelled");
        assert!(matches!(
            err,
            DbInfraError::Migration {
                source: MigrationError::Cancelled { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unusable_source_is_wrapped_as_migration_error() {
        let source = ConnectionSource::Unavailable {
            reason: "no driver".to_string(),
        };
        let err = run_migrations(
            &source,
            &MigrationPlan::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("unusable");

        assert!(err.to_string().contains("modeler-db-changelog"));
        let cause = err.source().expect("cause kept");
        assert!(cause.to_string().contains("no driver"));
    }

    #[tokio::test]
    async fn reset_leaves_nothing_applied() {
        let source = external_source().await;
        let token = CancellationToken::new();
        run_migrations(&source, &quick_plan(MigrationCommand::Up), &token)
            .await
            .expect("up");

        let report = run_migrations(&source, &quick_plan(MigrationCommand::Reset), &token)
            .await
            .expect("reset");
        assert_eq!(report.applied_after, 0);

        let status = run_migrations(&source, &quick_plan(MigrationCommand::Status), &token)
            .await
            .expect("status");
        assert_eq!(status.applied_before, 0);
    }

    #[tokio::test]
    async fn force_release_clears_a_stuck_lock() {
        let source = external_source().await;
        let held = hold_lock(&source, "crashed-node").await;
        std::mem::forget(held);

        assert!(force_release_lock(&source).await.expect("release"));
        run_migrations(
            &source,
            &quick_plan(MigrationCommand::Up),
            &CancellationToken::new(),
        )
        .await
        .expect("lock free again");
    }
}
