use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub(crate) const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
const TENANT_TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("auth endpoint returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("failed to get access token: {msg} (code {code})")]
    Api { code: i64, msg: String },
    #[error("auth response did not contain a tenant access token")]
    MissingToken,
}

/// Exchanges app credentials for a tenant access token.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Url,
    app_id: String,
    app_secret: String,
}

impl AuthClient {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Self::with_base_url(DEFAULT_BASE_URL, app_id, app_secret)
    }

    pub fn with_base_url(
        base_url: &str,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }

    pub async fn tenant_access_token(&self) -> Result<TenantToken, AuthError> {
        let url = self.base_url.join(TENANT_TOKEN_PATH)?;
        let request = TenantTokenRequest {
            app_id: &self.app_id,
            app_secret: &self.app_secret,
        };

        let response = self.http.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Http { status, body });
        }

        let payload: TenantTokenResponse = response.json().await?;
        if payload.code != 0 {
            return Err(AuthError::Api {
                code: payload.code,
                msg: payload.msg,
            });
        }
        let access_token = payload
            .tenant_access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        Ok(TenantToken {
            access_token,
            expire: payload.expire,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantToken {
    pub access_token: String,
    /// Lifetime in seconds, as reported by the server.
    #[serde(default)]
    pub expire: Option<u64>,
}

impl TenantToken {
    /// Short prefix of the token that is safe to show in logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.access_token.chars().take(20).collect();
        format!("{prefix}...")
    }
}

#[derive(Serialize)]
struct TenantTokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: Option<u64>,
}
