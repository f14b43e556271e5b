//! Transaction and attempt identities passed through the output protocol.

use std::fmt;
use std::sync::Arc;

use tessera_store::{CancelToken, Counter, NoopCounter};

/// Identity of one transaction on one data source.
#[derive(Clone)]
pub struct TransactionContext {
    transaction_id: String,
    data_source_id: String,
    counter: Arc<dyn Counter>,
    cancel: CancelToken,
}

impl TransactionContext {
    pub fn new(transaction_id: impl Into<String>, data_source_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            data_source_id: data_source_id.into(),
            counter: Arc::new(NoopCounter),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn Counter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn data_source_id(&self) -> &str {
        &self.data_source_id
    }

    pub fn counter(&self) -> &Arc<dyn Counter> {
        &self.counter
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("transaction_id", &self.transaction_id)
            .field("data_source_id", &self.data_source_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Identity of one attempt within a transaction.
#[derive(Clone)]
pub struct AttemptContext {
    transaction_id: String,
    attempt_id: String,
    data_source_id: String,
    counter: Arc<dyn Counter>,
    cancel: CancelToken,
}

impl AttemptContext {
    pub fn new(
        transaction_id: impl Into<String>,
        attempt_id: impl Into<String>,
        data_source_id: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            attempt_id: attempt_id.into(),
            data_source_id: data_source_id.into(),
            counter: Arc::new(NoopCounter),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn Counter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn data_source_id(&self) -> &str {
        &self.data_source_id
    }

    pub fn counter(&self) -> &Arc<dyn Counter> {
        &self.counter
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// The enclosing transaction, sharing this attempt's counter and token
    pub fn transaction(&self) -> TransactionContext {
        TransactionContext {
            transaction_id: self.transaction_id.clone(),
            data_source_id: self.data_source_id.clone(),
            counter: Arc::clone(&self.counter),
            cancel: self.cancel.clone(),
        }
    }
}

impl fmt::Debug for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptContext")
            .field("transaction_id", &self.transaction_id)
            .field("attempt_id", &self.attempt_id)
            .field("data_source_id", &self.data_source_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
