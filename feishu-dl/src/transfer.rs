use std::{
    io,
    path::{Path, PathBuf},
};

use futures_util::StreamExt;
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Streams response bodies to disk through a `.partial` file that is renamed on success.
#[derive(Clone, Default)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a pre-signed URL. No authorization header is sent.
    pub async fn download_to_path(&self, href: &Url, target: &Path) -> Result<u64, TransferError> {
        let response = self
            .http
            .get(href.clone())
            .send()
            .await?
            .error_for_status()?;
        self.save_response(response, target).await
    }

    pub async fn save_response(
        &self,
        response: Response,
        target: &Path,
    ) -> Result<u64, TransferError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let result = match write_stream(response, &partial).await {
            Ok(written) => tokio::fs::rename(&partial, target)
                .await
                .map(|()| written)
                .map_err(TransferError::from),
            Err(err) => Err(err),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

async fn write_stream(response: Response, partial: &Path) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
