use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, DbErr, TransactionTrait};
use tracing::debug;

use super::session::SessionFactory;

/// Transaction policy that determines whether transactions should be committed or rolled back on success
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxnPolicy {
    /// Commit the transaction when the operation succeeds (default behavior)
    #[default]
    CommitOnOk,
    /// Rollback the transaction when the operation succeeds (for testing)
    RollbackOnOk,
}

/// Transaction demarcation over a [`SessionFactory`].
#[derive(Debug, Clone)]
pub struct TransactionManager {
    factory: SessionFactory,
    policy: TxnPolicy,
}

impl TransactionManager {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            policy: TxnPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TxnPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> TxnPolicy {
        self.policy
    }

    pub fn session_factory(&self) -> &SessionFactory {
        &self.factory
    }

    /// Open a session and begin a transaction on it. The caller owns
    /// commit and rollback.
    pub async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        self.factory.open_session().begin().await
    }

    /// Run `f` in a new transaction.
    ///
    /// On `Ok` the transaction is committed, or rolled back under
    /// [`TxnPolicy::RollbackOnOk`]. On `Err` it is rolled back and the
    /// original error returned.
    pub async fn with_txn<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbErr>,
    {
        let txn = self.begin().await?;
        let out = f(&txn).await;
        let stats = self.factory.statistics_handle();

        match out {
            Ok(val) => match self.policy {
                TxnPolicy::CommitOnOk => {
                    txn.commit().await?;
                    if let Some(stats) = stats {
                        stats.transaction_committed();
                    }
                    Ok(val)
                }
                TxnPolicy::RollbackOnOk => {
                    txn.rollback().await?;
                    if let Some(stats) = stats {
                        stats.transaction_rolled_back();
                    }
                    Ok(val)
                }
            },
            Err(err) => {
                // Best-effort rollback; preserve original error
                if let Err(rollback_err) = txn.rollback().await {
                    debug!(error = %rollback_err, "txn=rollback_failed");
                }
                if let Some(stats) = stats {
                    stats.transaction_rolled_back();
                }
                Err(err)
            }
        }
    }
}
