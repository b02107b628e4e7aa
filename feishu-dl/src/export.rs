use std::path::Path;
use std::time::Duration;

use feishu_core::{ExportStatus, FeishuClient, FeishuError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::transfer::{TransferClient, TransferError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] FeishuError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("export task failed: {0}")]
    Failed(String),
    #[error("export task timed out after {0:?}")]
    TimedOut(Duration),
}

/// Waits for server-side export jobs at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct ExportPoller {
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for ExportPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_EXPORT_TIMEOUT)
    }
}

impl ExportPoller {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Returns the token of the exported file once the job finishes.
    pub async fn wait_for_file(
        &self,
        client: &FeishuClient,
        ticket: &str,
        file_token: &str,
    ) -> Result<String, ExportError> {
        let started = Instant::now();
        let mut attempt = 0u32;
        while started.elapsed() < self.timeout {
            attempt += 1;
            match client.query_export_task(ticket, file_token).await? {
                ExportStatus::Ready { file_token } => return Ok(file_token),
                ExportStatus::Failed { message } => return Err(ExportError::Failed(message)),
                ExportStatus::Processing => {
                    debug!(ticket, attempt, "export still processing");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Err(ExportError::TimedOut(self.timeout))
    }

    /// Create, poll, download.
    pub async fn export_to_path(
        &self,
        client: &FeishuClient,
        transfer: &TransferClient,
        file_token: &str,
        file_type: &str,
        file_extension: &str,
        target: &Path,
    ) -> Result<u64, ExportError> {
        let ticket = client
            .create_export_task(file_token, file_type, file_extension)
            .await?;
        debug!(file_token, ticket = %ticket, "export task created");
        let export_token = self.wait_for_file(client, &ticket, file_token).await?;
        let response = client.open_export_download(&export_token).await?;
        Ok(transfer.save_response(response, target).await?)
    }
}
