pub mod config;
pub mod downloader;
pub mod export;
pub mod file_kind;
pub mod transfer;
