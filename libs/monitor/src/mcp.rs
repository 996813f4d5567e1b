//! External MCP-layer collaborator contracts consumed by the core
//! (SPEC_FULL.md §6). The monitor never talks to a transport directly; it
//! calls these traits, which the embedding MCP server implements.

use async_trait::async_trait;
use regex::Regex;

use crate::model::ProgressUpdate;

/// Whether an MCP notifier error should be retried (C5) or the update
/// dropped outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyErrorKind {
    Retryable,
    NonRetryable,
}

#[derive(Debug)]
pub struct NotifyError {
    pub kind: NotifyErrorKind,
    pub message: String,
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NotifyError {}

/// One connected MCP session: identity plus the namespace allow-list that
/// `Subscribe` enforces.
pub trait Session: Send + Sync {
    fn session_id(&self) -> &str;

    /// `None` means `DEV_ALLOW_ANY`: every namespace is permitted.
    fn namespace_filter(&self) -> Option<&Regex>;

    fn namespace_allowed(&self, namespace: &str) -> bool {
        match self.namespace_filter() {
            Some(re) => re.is_match(namespace),
            None => true,
        }
    }
}

/// Delivery of a `ProgressUpdate` to one subscription handle's MCP client.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, subscription_handle: &str, payload: &ProgressUpdate) -> Result<(), NotifyError>;
}
