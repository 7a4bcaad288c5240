//! Background task queue seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;

/// Non-critical side effects handed to the task runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Subscribe the account to the mailing list.
    MailingListSync { account_id: i64 },
}

/// Queue for background work. Enqueue failures are never fatal to the
/// caller; they are logged and dropped.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue rejects the task.
    async fn enqueue(&self, task: Task) -> AuthResult<()>;
}
