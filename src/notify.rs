//! Outbound notification seam.
//!
//! Delivery transport is an external collaborator; the pipeline only needs
//! a best-effort "tell this address about these links" call. Failures are
//! logged by callers and never fail the upload that triggered them.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// A download link paired with its user-facing label.
#[derive(Debug, Clone)]
pub struct DownloadLink {
    pub url: String,
    pub label: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_links(&self, recipient: &str, links: &[DownloadLink]) -> Result<(), NotifyError>;
}

/// Default notifier: records the notification in the log stream. Stands in
/// wherever no delivery transport is wired up, including tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_links(&self, recipient: &str, links: &[DownloadLink]) -> Result<(), NotifyError> {
        for link in links {
            tracing::info!(recipient, url = %link.url, label = %link.label, "Download link ready");
        }
        Ok(())
    }
}
