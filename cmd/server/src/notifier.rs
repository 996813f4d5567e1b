//! Default `Notifier` (SPEC_FULL.md §6): logs every delivery. Standing in
//! for the embedding MCP transport, which is out of scope here — a real
//! deployment wires its own `Notifier` that pushes onto the live MCP session.

use async_trait::async_trait;

use k0rdent_mcp_monitor::mcp::{NotifyError, Notifier};
use k0rdent_mcp_monitor::model::ProgressUpdate;

pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, subscription_handle: &str, payload: &ProgressUpdate) -> Result<(), NotifyError> {
        tracing::info!(
            subscription = subscription_handle,
            phase = %payload.phase,
            terminal = payload.terminal,
            message = %payload.message,
            "progress update"
        );
        Ok(())
    }
}
