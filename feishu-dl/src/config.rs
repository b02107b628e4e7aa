use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

use crate::export::ExportPoller;

pub const DEFAULT_API_BASE: &str = "https://open.feishu.cn";
pub const DEFAULT_OUTPUT_DIR: &str = "./feishu-download-file";
const DEFAULT_PAGE_SIZE: u64 = 50;
const DEFAULT_EXPORT_POLL_MS: u64 = 1000;
const DEFAULT_EXPORT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct DownloaderConfig {
    pub app_id: String,
    pub app_secret: String,
    pub api_base: String,
    pub page_size: u32,
    pub export_poll_interval: Duration,
    pub export_timeout: Duration,
}

impl DownloaderConfig {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source, `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = read_string(&lookup, "FEISHU_APP_ID");
        let app_secret = read_string(&lookup, "FEISHU_APP_SECRET");
        let (Some(app_id), Some(app_secret)) = (app_id, app_secret) else {
            bail!("FEISHU_APP_ID and FEISHU_APP_SECRET must be set in the environment or .env file");
        };
        let api_base = read_string(&lookup, "FEISHU_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let page_size = read_u64(&lookup, "FEISHU_PAGE_SIZE", DEFAULT_PAGE_SIZE)
            .min(u64::from(u32::MAX)) as u32;
        let export_poll_interval = Duration::from_millis(read_u64(
            &lookup,
            "FEISHU_EXPORT_POLL_MS",
            DEFAULT_EXPORT_POLL_MS,
        ));
        let export_timeout = Duration::from_secs(read_u64(
            &lookup,
            "FEISHU_EXPORT_TIMEOUT_SECS",
            DEFAULT_EXPORT_TIMEOUT_SECS,
        ));

        Ok(Self {
            app_id,
            app_secret,
            api_base,
            page_size,
            export_poll_interval,
            export_timeout,
        })
    }

    pub fn export_poller(&self) -> ExportPoller {
        ExportPoller::new(self.export_poll_interval, self.export_timeout)
    }
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn read_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
