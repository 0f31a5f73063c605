//! HTTP client for the locker REST API
//!
//! Every call returns `Result<T, LockerError>`; HTTP status codes are mapped
//! to the tagged variants in one place ([`error_from_status`]).

use crate::config::ClientConfig;
use crate::error::{LockerError, Result};
use crate::otp::{ProfileData, RegistrationApi};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Error payload the backend sends alongside 4xx responses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Join a base URL and an endpoint with exactly one slash.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Map a non-success status and its body to a tagged error.
pub fn error_from_status(status: u16, body: &str) -> LockerError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.error.or(parsed.message);

    match status {
        429 => LockerError::RateLimited,
        401 => LockerError::Unauthorized(message.unwrap_or_else(|| "session expired".into())),
        400..=499 => LockerError::Validation {
            status,
            message: message.unwrap_or_else(|| format!("Request failed with status {}", status)),
        },
        _ => LockerError::Network(match message {
            Some(m) => format!("HTTP {}: {}", status, m),
            None => format!("HTTP {}", status),
        }),
    }
}

/// Pull the file name out of a `Content-Disposition` header.
pub fn filename_from_disposition(value: Option<&str>) -> String {
    value
        .and_then(|v| v.split("filename=").nth(1))
        .map(|rest| rest.split(';').next().unwrap_or(rest))
        .map(|name| name.trim().replace('"', ""))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// HTTP client for the locker API
///
/// # Example
///
/// ```rust,no_run
/// use locker_client::{ApiClient, ClientConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let api = ApiClient::new(&ClientConfig::default())?;
/// let auth = api.login("S-100", "hunter2").await?;
/// let listing = api.list_documents(&auth.token).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| LockerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_base_url.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    // ==================== Auth API ====================

    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({
            "identifier": identifier,
            "password": password,
        });
        let request = self.http.post(self.url("api/auth/login")).json(&body);
        self.json(request).await
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });
        let request = self.http.post(self.url("api/auth/admin/login")).json(&body);
        self.json(request).await
    }

    pub async fn register_initiate(&self, profile: &ProfileData) -> Result<()> {
        let request = self
            .http
            .post(self.url("api/auth/register/initiate"))
            .json(profile);
        self.send(request).await?;
        Ok(())
    }

    pub async fn register_verify(&self, profile: &ProfileData, otp: &str) -> Result<AuthResponse> {
        let mut body = serde_json::to_value(profile)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("otp".into(), serde_json::Value::String(otp.to_string()));
        }
        let request = self
            .http
            .post(self.url("api/auth/register/verify"))
            .json(&body);
        self.json(request).await
    }

    // ==================== Documents API ====================

    pub async fn list_documents(&self, token: &str) -> Result<DocumentListing> {
        let request = self.http.get(self.url("api/documents")).bearer_auth(token);
        self.json(request).await
    }

    pub async fn search_documents(&self, token: &str, query: &str) -> Result<Vec<Document>> {
        let url = format!(
            "{}?query={}",
            self.url("api/documents/search"),
            urlencoding::encode(query)
        );
        let request = self.http.get(url).bearer_auth(token);
        self.json(request).await
    }

    pub async fn upload_document(&self, token: &str, upload: &FileUpload) -> Result<UploadResponse> {
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| LockerError::Validation {
                status: 0,
                message: format!("Invalid content type {}: {}", upload.content_type, e),
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        debug!(file = %upload.file_name, size = upload.size(), "Uploading document");
        let request = self
            .http
            .post(self.url("api/documents/upload"))
            .bearer_auth(token)
            .multipart(form);
        self.json(request).await
    }

    pub async fn view_document(&self, token: &str, id: &str) -> Result<DocumentBlob> {
        let endpoint = format!("api/documents/view/{}", urlencoding::encode(id));
        self.blob(self.http.get(self.url(&endpoint)).bearer_auth(token)).await
    }

    pub async fn download_document(&self, token: &str, id: &str) -> Result<DocumentBlob> {
        let endpoint = format!("api/documents/download/{}", urlencoding::encode(id));
        self.blob(self.http.get(self.url(&endpoint)).bearer_auth(token)).await
    }

    pub async fn delete_document(&self, token: &str, id: &str) -> Result<MutationResponse> {
        let endpoint = format!("api/documents/{}", urlencoding::encode(id));
        let request = self.http.delete(self.url(&endpoint)).bearer_auth(token);
        self.lenient_json(request).await
    }

    pub async fn toggle_favorite(&self, token: &str, id: &str) -> Result<()> {
        let endpoint = format!("api/documents/{}/favorite", urlencoding::encode(id));
        let request = self
            .http
            .patch(self.url(&endpoint))
            .bearer_auth(token)
            .json(&serde_json::json!({}));
        self.send(request).await?;
        Ok(())
    }

    // ==================== Admin API ====================

    pub async fn list_users(&self, token: &str) -> Result<Vec<User>> {
        let request = self.http.get(self.url("api/admin/users")).bearer_auth(token);
        self.json(request).await
    }

    pub async fn delete_user(&self, token: &str, id: &str) -> Result<()> {
        let endpoint = format!("api/admin/users/{}", urlencoding::encode(id));
        let request = self.http.delete(self.url(&endpoint)).bearer_auth(token);
        self.send(request).await?;
        Ok(())
    }

    // ==================== Helper Methods ====================

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "API response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_status(status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Decode a body that may be empty or not JSON at all.
    async fn lenient_json<T: DeserializeOwned + Default>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
    }

    async fn blob(&self, request: RequestBuilder) -> Result<DocumentBlob> {
        let response = self.send(request).await?;
        let headers = response.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = filename_from_disposition(
            headers
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response.bytes().await?.to_vec();

        Ok(DocumentBlob {
            bytes,
            content_type,
            file_name,
        })
    }
}

#[async_trait]
impl RegistrationApi for ApiClient {
    async fn initiate(&self, profile: &ProfileData) -> Result<()> {
        self.register_initiate(profile).await
    }

    async fn verify(&self, profile: &ProfileData, otp: &str) -> Result<AuthResponse> {
        self.register_verify(profile, otp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_single_slash() {
        assert_eq!(
            join_url("http://localhost:3000/", "/api/documents"),
            "http://localhost:3000/api/documents"
        );
        assert_eq!(
            join_url("https://locker.example.edu", "api/auth/login"),
            "https://locker.example.edu/api/auth/login"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(error_from_status(429, ""), LockerError::RateLimited));
        assert!(matches!(
            error_from_status(401, r#"{"error":"Token expired"}"#),
            LockerError::Unauthorized(m) if m == "Token expired"
        ));
        assert!(matches!(
            error_from_status(400, r#"{"error":"Invalid OTP"}"#),
            LockerError::Validation { status: 400, message } if message == "Invalid OTP"
        ));
        assert!(matches!(
            error_from_status(413, r#"{"message":"File too large"}"#),
            LockerError::Validation { status: 413, message } if message == "File too large"
        ));
        assert!(matches!(error_from_status(502, "<html>"), LockerError::Network(_)));
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(Some(r#"attachment; filename="transcript.pdf""#)),
            "transcript.pdf"
        );
        assert_eq!(
            filename_from_disposition(Some("attachment; filename=id-card.png; size=10")),
            "id-card.png"
        );
        assert_eq!(filename_from_disposition(Some("inline")), "document");
        assert_eq!(filename_from_disposition(None), "document");
    }
}
