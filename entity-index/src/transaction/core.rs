use crate::errors::{ErrorKind, IndexError};

/// Lifecycle of an [`crate::transaction::EntityTransaction`].
///
/// ```text
/// Active ──commit──▶ Committed
///   │  └──commit fails──▶ Failed ──rollback──▶ RolledBack
///   └──rollback──▶ RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Accepting reads and writes
    Active,
    /// Changes were flushed to the store
    Committed,
    /// Changes were discarded
    RolledBack,
    /// A commit or a tree operation failed; only rollback is allowed
    Failed,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        *self == TransactionState::Active
    }
}

pub(crate) fn not_active_error(state: TransactionState) -> IndexError {
    log::error!("Transaction is not active, state is {:?}", state);
    IndexError::new(
        &format!("Transaction is not active, state is {:?}", state),
        ErrorKind::InvalidOperation,
    )
}

pub(crate) fn stale_error(started_at: u64, live_version: u64) -> IndexError {
    log::error!(
        "Index moved from version {} to {} underneath the transaction",
        started_at,
        live_version
    );
    IndexError::new(
        &format!(
            "Index is at version {} but the transaction started at version {}",
            live_version, started_at
        ),
        ErrorKind::StaleTransaction,
    )
}
