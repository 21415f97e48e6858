use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::rate_limit::{RATE_LIMIT_HEADER, RateLimit};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("asset {key} has neither a value nor an attachment")]
    EmptyAsset { key: String },
    #[error("invalid attachment for {key}: {source}")]
    Attachment {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Response payload plus the call budget reported alongside it.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub body: T,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Clone)]
pub struct ThemeClient {
    http: Client,
    base_url: Url,
    theme_id: u64,
    token: String,
}

impl ThemeClient {
    pub fn new(
        store: &str,
        api_version: &str,
        theme_id: u64,
        token: impl Into<String>,
    ) -> Result<Self, ThemeError> {
        let base_url = format!("https://{store}/admin/api/{api_version}/");
        Self::with_base_url(&base_url, theme_id, token)
    }

    pub fn with_base_url(
        base_url: &str,
        theme_id: u64,
        token: impl Into<String>,
    ) -> Result<Self, ThemeError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            theme_id,
            token: token.into(),
        })
    }

    pub fn theme_id(&self) -> u64 {
        self.theme_id
    }

    pub async fn list_assets(&self) -> Result<ApiResponse<Vec<AssetSummary>>, ThemeError> {
        let url = self.assets_endpoint()?;
        let response = self
            .http
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        let response: ApiResponse<AssetListResponse> = Self::handle_response(response).await?;
        Ok(ApiResponse {
            body: response.body.assets,
            rate_limit: response.rate_limit,
        })
    }

    pub async fn get_asset(&self, key: &str) -> Result<ApiResponse<Asset>, ThemeError> {
        let mut url = self.assets_endpoint()?;
        url.query_pairs_mut().append_pair("asset[key]", key);
        let response = self
            .http
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        let response: ApiResponse<AssetEnvelope<Asset>> = Self::handle_response(response).await?;
        Ok(ApiResponse {
            body: response.body.asset,
            rate_limit: response.rate_limit,
        })
    }

    pub async fn update_asset(
        &self,
        upload: &AssetUpload,
    ) -> Result<ApiResponse<AssetSummary>, ThemeError> {
        let url = self.assets_endpoint()?;
        let response = self
            .http
            .put(url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .json(&AssetEnvelope { asset: upload })
            .send()
            .await?;
        let response: ApiResponse<AssetEnvelope<AssetSummary>> =
            Self::handle_response(response).await?;
        Ok(ApiResponse {
            body: response.body.asset,
            rate_limit: response.rate_limit,
        })
    }

    pub async fn delete_asset(&self, key: &str) -> Result<ApiResponse<()>, ThemeError> {
        let url = self.assets_endpoint()?;
        let response = self
            .http
            .delete(url)
            .header(ACCESS_TOKEN_HEADER, &self.token)
            .json(&AssetEnvelope {
                asset: AssetKey { key },
            })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(ApiResponse {
                body: (),
                rate_limit: rate_limit_from(response.headers()),
            })
        } else {
            Err(Self::api_error(response).await)
        }
    }

    fn assets_endpoint(&self) -> Result<Url, ThemeError> {
        Ok(self
            .base_url
            .join(&format!("themes/{}/assets.json", self.theme_id))?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, ThemeError> {
        if response.status().is_success() {
            let rate_limit = rate_limit_from(response.headers());
            Ok(ApiResponse {
                body: response.json::<T>().await?,
                rate_limit,
            })
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> ThemeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ThemeError::Api { status, body }
    }
}

impl ThemeError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            ThemeError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.classification(), Some(ApiErrorClass::RateLimit))
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn rate_limit_from(headers: &HeaderMap) -> Option<RateLimit> {
    headers
        .get(RATE_LIMIT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Listing entry: the key and the checksum the store computed for it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AssetSummary {
    pub key: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Asset {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl Asset {
    /// Raw file content, decoding binary attachments.
    pub fn content(&self) -> Result<Vec<u8>, ThemeError> {
        if let Some(value) = &self.value {
            return Ok(value.clone().into_bytes());
        }
        let Some(attachment) = &self.attachment else {
            return Err(ThemeError::EmptyAsset {
                key: self.key.clone(),
            });
        };
        STANDARD
            .decode(attachment)
            .map_err(|source| ThemeError::Attachment {
                key: self.key.clone(),
                source,
            })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssetUpload {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl AssetUpload {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            attachment: None,
        }
    }

    pub fn binary(key: impl Into<String>, content: &[u8]) -> Self {
        Self {
            key: key.into(),
            value: None,
            attachment: Some(STANDARD.encode(content)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct AssetEnvelope<T> {
    asset: T,
}

#[derive(Debug, Serialize)]
struct AssetKey<'a> {
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssetListResponse {
    #[serde(default)]
    assets: Vec<AssetSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        let err = |status| ThemeError::Api {
            status,
            body: String::new(),
        };
        assert_eq!(
            err(StatusCode::TOO_MANY_REQUESTS).classification(),
            Some(ApiErrorClass::RateLimit)
        );
        assert_eq!(
            err(StatusCode::UNAUTHORIZED).classification(),
            Some(ApiErrorClass::Auth)
        );
        assert_eq!(
            err(StatusCode::BAD_GATEWAY).classification(),
            Some(ApiErrorClass::Transient)
        );
        assert_eq!(
            err(StatusCode::UNPROCESSABLE_ENTITY).classification(),
            Some(ApiErrorClass::Permanent)
        );
        assert!(err(StatusCode::TOO_MANY_REQUESTS).is_rate_limited());
    }

    #[test]
    fn binary_upload_is_base64_encoded() {
        let upload = AssetUpload::binary("assets/logo.png", &[0x89, b'P', b'N', b'G']);
        assert_eq!(upload.attachment.as_deref(), Some("iVBORw=="));
        assert!(upload.value.is_none());
    }

    #[test]
    fn asset_content_prefers_value_then_attachment() {
        let text = Asset {
            key: "layout/theme.liquid".into(),
            value: Some("<html>".into()),
            attachment: None,
            checksum: None,
        };
        assert_eq!(text.content().unwrap(), b"<html>");

        let binary = Asset {
            key: "assets/logo.png".into(),
            value: None,
            attachment: Some("iVBORw==".into()),
            checksum: None,
        };
        assert_eq!(binary.content().unwrap(), vec![0x89, b'P', b'N', b'G']);

        let broken = Asset {
            key: "assets/bad.png".into(),
            value: None,
            attachment: Some("***".into()),
            checksum: None,
        };
        assert!(matches!(
            broken.content(),
            Err(ThemeError::Attachment { .. })
        ));
    }
}
