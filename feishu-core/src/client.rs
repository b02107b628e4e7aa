use std::collections::BTreeMap;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::DEFAULT_BASE_URL;

const FILES_PATH: &str = "/open-apis/drive/v1/files";
const EXPORT_TASKS_PATH: &str = "/open-apis/drive/v1/export_tasks";

#[derive(Debug, Error)]
pub enum FeishuError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("api error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("api response missing data")]
    MissingData,
    #[error("api response missing download url")]
    MissingDownloadUrl,
    #[error("export task finished without a result file token")]
    MissingExportFile,
}

/// Authorized client for the drive endpoints, bound to one tenant access token.
#[derive(Clone)]
pub struct FeishuClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl FeishuClient {
    pub fn new(token: impl Into<String>) -> Result<Self, FeishuError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, FeishuError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn list_folder(
        &self,
        folder_token: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, FeishuError> {
        let mut url = self.endpoint(FILES_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("folder_token", folder_token);
            query.append_pair("page_size", &page_size.max(1).to_string());
            if let Some(page_token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("page_token", page_token);
            }
        }
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder_all(
        &self,
        folder_token: &str,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, FeishuError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_folder(folder_token, page_size, page_token.as_deref())
                .await?;
            files.extend(page.files);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if page.has_more => page_token = Some(next),
                _ => break,
            }
        }
        Ok(files)
    }

    pub async fn get_file_metadata(&self, file_token: &str) -> Result<FileMetadata, FeishuError> {
        let url = self.endpoint(&format!("{FILES_PATH}/{file_token}"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn get_download_url(&self, file_token: &str) -> Result<Url, FeishuError> {
        let url = self.endpoint(&format!("{FILES_PATH}/{file_token}/download"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let payload: DownloadUrlData = Self::handle_response(response).await?;
        let href = payload
            .url
            .filter(|u| !u.is_empty())
            .ok_or(FeishuError::MissingDownloadUrl)?;
        Ok(Url::parse(&href)?)
    }

    pub async fn create_export_task(
        &self,
        file_token: &str,
        file_type: &str,
        file_extension: &str,
    ) -> Result<String, FeishuError> {
        let url = self.endpoint(EXPORT_TASKS_PATH)?;
        let request = CreateExportRequest {
            token: file_token,
            file_type,
            file_extension: Some(file_extension).filter(|ext| !ext.is_empty()),
        };
        let response = self
            .authorized(self.http.post(url))
            .json(&request)
            .send()
            .await?;
        let payload: CreateExportData = Self::handle_response(response).await?;
        Ok(payload.ticket)
    }

    pub async fn query_export_task(
        &self,
        ticket: &str,
        file_token: &str,
    ) -> Result<ExportStatus, FeishuError> {
        let mut url = self.endpoint(&format!("{EXPORT_TASKS_PATH}/{ticket}"))?;
        url.query_pairs_mut().append_pair("token", file_token);
        let response = self.authorized(self.http.get(url)).send().await?;
        let payload: ExportTaskData = Self::handle_response(response).await?;
        payload.status()
    }

    /// Starts the download of an exported file. The caller consumes the body.
    pub async fn open_export_download(
        &self,
        export_file_token: &str,
    ) -> Result<reqwest::Response, FeishuError> {
        let url = self.endpoint(&format!(
            "{EXPORT_TASKS_PATH}/file/{export_file_token}/download"
        ))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FeishuError::Http { status, body })
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeishuError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FeishuError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FeishuError::Http { status, body });
        }
        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != 0 {
            return Err(FeishuError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        envelope.data.ok_or(FeishuError::MissingData)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DriveFile {
    pub token: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub file_type: String,
    #[serde(default)]
    pub parent_token: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.file_type.eq_ignore_ascii_case("folder")
    }

    /// Listed name, or a placeholder derived from the token when the server sent none.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("file_{}", self.token))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, alias = "page_token")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Processing,
    Ready { file_token: String },
    Failed { message: String },
}

#[derive(Deserialize)]
struct DownloadUrlData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct CreateExportRequest<'a> {
    token: &'a str,
    #[serde(rename = "type")]
    file_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_extension: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateExportData {
    ticket: String,
}

#[derive(Deserialize)]
struct ExportTaskData {
    #[serde(default)]
    result: Option<ExportJobResult>,
    #[serde(default)]
    task_status: Option<String>,
}

#[derive(Deserialize)]
struct ExportJobResult {
    #[serde(default)]
    job_status: Option<i64>,
    #[serde(default)]
    job_error_msg: Option<String>,
    #[serde(default)]
    file_token: Option<String>,
}

impl ExportTaskData {
    fn status(self) -> Result<ExportStatus, FeishuError> {
        let (job_status, job_error_msg, file_token) = match self.result {
            Some(result) => (result.job_status, result.job_error_msg, result.file_token),
            None => (None, None, None),
        };
        let ready = |file_token: Option<String>| {
            file_token
                .filter(|t| !t.is_empty())
                .map(|file_token| ExportStatus::Ready { file_token })
                .ok_or(FeishuError::MissingExportFile)
        };

        match job_status {
            Some(0) => ready(file_token),
            Some(2) => Ok(ExportStatus::Failed {
                message: job_error_msg.unwrap_or_else(|| "unknown error".to_string()),
            }),
            Some(_) => Ok(ExportStatus::Processing),
            // older responses report progress through `task_status`
            None => match self.task_status.as_deref() {
                Some("done") => ready(file_token),
                Some("failed") => Ok(ExportStatus::Failed {
                    message: job_error_msg.unwrap_or_else(|| "export task failed".to_string()),
                }),
                _ => Ok(ExportStatus::Processing),
            },
        }
    }
}
