use std::io;
use std::path::{Path, PathBuf};

use feishu_core::{DriveFile, FeishuClient, FeishuError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::export::{ExportError, ExportPoller};
use crate::file_kind::{
    DownloadRoute, FileRoute, export_extension, local_file_name, resolve_extension, sanitize_filename,
};
use crate::transfer::{TransferClient, TransferError};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Api(#[from] FeishuError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub folders: usize,
    pub downloaded: usize,
    pub exported: usize,
    pub failed: usize,
}

enum Outcome {
    Downloaded,
    Exported,
}

/// Mirrors a remote folder tree into a local directory, one request at a time.
pub struct FolderDownloader {
    client: FeishuClient,
    transfer: TransferClient,
    poller: ExportPoller,
    page_size: u32,
}

impl FolderDownloader {
    pub fn new(client: FeishuClient) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            poller: ExportPoller::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_poller(mut self, poller: ExportPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn client(&self) -> &FeishuClient {
        &self.client
    }

    pub async fn list(&self, folder_token: &str) -> Result<Vec<DriveFile>, FeishuError> {
        self.client.list_folder_all(folder_token, self.page_size).await
    }

    /// Lists `folder_token` and downloads everything below it. Only the root listing is fatal.
    pub async fn download_folder(
        &self,
        folder_token: &str,
        output_dir: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        let entries = self.list(folder_token).await?;
        self.download_entries(entries, output_dir).await
    }

    /// Downloads already-listed entries into `output_dir`, descending into folders depth-first.
    pub async fn download_entries(
        &self,
        entries: Vec<DriveFile>,
        output_dir: &Path,
    ) -> Result<DownloadReport, DownloadError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut report = DownloadReport::default();
        let mut pending: Vec<(DriveFile, PathBuf)> = Vec::new();
        push_children(&mut pending, entries, output_dir);

        while let Some((entry, dir)) = pending.pop() {
            let name = sanitize_filename(&entry.display_name());
            info!("processing {name} (type: {})", entry.file_type);

            let route = match DownloadRoute::for_type(&entry.file_type) {
                DownloadRoute::File(route) => route,
                DownloadRoute::Folder => {
                    let sub_dir = dir.join(&name);
                    match self.enter_folder(&entry, &sub_dir).await {
                        Ok(children) => {
                            report.folders += 1;
                            push_children(&mut pending, children, &sub_dir);
                        }
                        Err(err) => {
                            warn!("error processing folder {}: {err}", sub_dir.display());
                            report.failed += 1;
                        }
                    }
                    continue;
                }
            };

            match self.fetch_file(&entry, &name, &dir, route).await {
                Ok(Outcome::Downloaded) => report.downloaded += 1,
                Ok(Outcome::Exported) => report.exported += 1,
                Err(err) => {
                    warn!("error processing {name}: {err}");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn enter_folder(
        &self,
        entry: &DriveFile,
        sub_dir: &Path,
    ) -> Result<Vec<DriveFile>, DownloadError> {
        tokio::fs::create_dir_all(sub_dir).await?;
        info!("entering folder {}", sub_dir.display());
        Ok(self.list(&entry.token).await?)
    }

    async fn fetch_file(
        &self,
        entry: &DriveFile,
        name: &str,
        dir: &Path,
        route: FileRoute,
    ) -> Result<Outcome, DownloadError> {
        let extension = resolve_extension(&entry.file_type, name);
        let target = dir.join(local_file_name(name, &extension));
        let api_extension = export_extension(&extension, &entry.file_type);

        match route {
            FileRoute::Export => {
                info!("using export task for {} file", entry.file_type);
                self.export(entry, api_extension, &target).await?;
                Ok(Outcome::Exported)
            }
            FileRoute::Direct => {
                self.direct(entry, &target).await?;
                Ok(Outcome::Downloaded)
            }
            FileRoute::DirectThenExport => match self.direct(entry, &target).await {
                Ok(()) => Ok(Outcome::Downloaded),
                Err(err) => {
                    warn!("direct download of {name} failed: {err}; trying export task");
                    self.export(entry, api_extension, &target).await?;
                    Ok(Outcome::Exported)
                }
            },
        }
    }

    async fn direct(&self, entry: &DriveFile, target: &Path) -> Result<(), DownloadError> {
        let url = self.client.get_download_url(&entry.token).await?;
        let bytes = self.transfer.download_to_path(&url, target).await?;
        info!(bytes, "downloaded to {}", target.display());
        Ok(())
    }

    async fn export(
        &self,
        entry: &DriveFile,
        extension: &str,
        target: &Path,
    ) -> Result<(), DownloadError> {
        let bytes = self
            .poller
            .export_to_path(
                &self.client,
                &self.transfer,
                &entry.token,
                &entry.file_type,
                extension,
                target,
            )
            .await?;
        info!(bytes, "exported and downloaded to {}", target.display());
        Ok(())
    }
}

// Reversed so that popping yields listing order.
fn push_children(pending: &mut Vec<(DriveFile, PathBuf)>, children: Vec<DriveFile>, dir: &Path) {
    pending.extend(
        children
            .into_iter()
            .rev()
            .map(|child| (child, dir.to_path_buf())),
    );
}
