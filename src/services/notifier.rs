//! Outbound notification contract used by the reminder sweep

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LoanNotice, OverdueItem, ReminderKind};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("email service not configured")]
    NotConfigured,

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Transport(String),
}

/// Delivers reminders. Each call either fully succeeds or fails; there is no retry here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a single-loan reminder
    async fn send_single(
        &self,
        to: &str,
        kind: ReminderKind,
        notice: &LoanNotice,
    ) -> Result<(), NotifyError>;

    /// Send one digest listing all of an owner's overdue loans
    async fn send_digest(&self, to: &str, items: &[OverdueItem]) -> Result<(), NotifyError>;
}
