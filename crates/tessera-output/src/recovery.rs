//! Finishing transactions left in doubt.
//!
//! A transaction is in doubt while its commit marker exists. `apply` pushes
//! every data source forward (staging → production), `abort` throws the
//! uncommitted work away. Both are safe to re-run after a partial failure:
//! the marker stays until every data source has finished.

use std::sync::Arc;

use tessera_config::{log_recovery_error, log_recovery_info, log_recovery_warn, ErrorKind};
use tessera_store::{CancelToken, StoreError};
use tracing::field::display;
use tracing::instrument;

use crate::context::TransactionContext;
use crate::error::InstanceFailure;
use crate::marker::{CommitMarkerStore, TransactionInfo};
use crate::repository::DataSourceRepository;
use crate::staged::StagedOutput;
use crate::{OutputError, Result};

#[derive(Debug, Clone, Copy)]
enum Action {
    Apply,
    Abort,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Action::Apply => "apply",
            Action::Abort => "abort",
        }
    }
}

#[derive(Debug)]
pub struct TransactionRecoveryCoordinator {
    repository: Arc<DataSourceRepository>,
    markers: CommitMarkerStore,
    cancel: CancelToken,
}

impl TransactionRecoveryCoordinator {
    pub fn new(repository: Arc<DataSourceRepository>, markers: CommitMarkerStore) -> Self {
        Self {
            repository,
            markers,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Transactions whose marker still exists, oldest first
    pub fn list_in_doubt(&self) -> Result<Vec<TransactionInfo>> {
        self.markers.list()
    }

    pub fn get(&self, transaction_id: &str) -> Result<Option<TransactionInfo>> {
        self.markers.get(transaction_id)
    }

    /// Commit the staged output of every data source, then drop the marker.
    ///
    /// Returns false if the transaction has no marker.
    #[instrument(skip(self))]
    pub fn apply(&self, transaction_id: &str) -> Result<bool> {
        self.run(transaction_id, Action::Apply)
    }

    /// Discard the uncommitted output of every data source, then drop the
    /// marker.
    ///
    /// Returns false if the transaction has no marker.
    #[instrument(skip(self))]
    pub fn abort(&self, transaction_id: &str) -> Result<bool> {
        self.run(transaction_id, Action::Abort)
    }

    fn run(&self, transaction_id: &str, action: Action) -> Result<bool> {
        let Some(info) = self.markers.get(transaction_id)? else {
            log_recovery_info!(
                "Transaction is not in doubt",
                transaction_id = transaction_id,
                action = action.name()
            );
            return Ok(false);
        };
        log_recovery_info!(
            "Start finishing transaction",
            transaction_id = transaction_id,
            action = action.name()
        );

        let mut failures = Vec::new();
        for container_path in self.repository.container_paths() {
            if self.cancel.is_cancelled() {
                return Err(StoreError::Cancelled.into());
            }
            let (data_source_id, result) =
                match self.repository.related_data_source(&container_path) {
                    Ok(instance) => (
                        instance.profile().id.clone(),
                        self.finish(&instance, transaction_id, action),
                    ),
                    // the provider is still known when its instance cannot be built
                    Err(e) => (self.repository.related_id(&container_path)?, Err(e)),
                };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Cancelled => return Err(e),
                Err(e) => {
                    log_recovery_warn!(
                        "Failed to finish data source",
                        transaction_id = transaction_id,
                        id = data_source_id.as_str(),
                        path = container_path.as_str(),
                        error = display(&e)
                    );
                    failures.push(InstanceFailure {
                        container_path,
                        data_source_id,
                        error: Box::new(e),
                    });
                }
            }
        }

        if !failures.is_empty() {
            log_recovery_error!(
                "Transaction left in doubt",
                transaction_id = transaction_id,
                action = action.name(),
                failures = failures.len(),
                marker = display(info.marker_path.display())
            );
            return Err(OutputError::PartialFailure {
                transaction_id: transaction_id.to_string(),
                operation: action.name(),
                marker: info.marker_path,
                failures,
            });
        }

        self.markers.delete(transaction_id)?;
        log_recovery_info!(
            "Finish finishing transaction",
            transaction_id = transaction_id,
            action = action.name()
        );
        Ok(true)
    }

    fn finish(&self, instance: &StagedOutput, transaction_id: &str, action: Action) -> Result<()> {
        let ctx = TransactionContext::new(transaction_id, instance.profile().id.as_str())
            .with_cancel(self.cancel.clone());
        match action {
            Action::Apply => {
                instance.commit_transaction(&ctx)?;
            }
            Action::Abort => {
                instance.cleanup_attempts(&ctx)?;
            }
        }
        instance.cleanup_transaction(&ctx)
    }
}
