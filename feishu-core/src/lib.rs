mod auth;
mod client;

pub use auth::{AuthClient, AuthError, TenantToken};
pub use client::{DriveFile, ExportStatus, FeishuClient, FeishuError, FileList, FileMetadata};
