//! Wire types for the locker API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LockerError, Result};

/// Account record as returned by the auth and admin endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Empty when the server echoes a partial record
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Bytes used, as last reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_used: Option<u64>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Response from login, admin login and OTP verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Document metadata; the server owns the list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

/// `GET api/documents` answers either a bare list or a list with the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentListing {
    Plain(Vec<Document>),
    WithUser {
        #[serde(default)]
        user: Option<User>,
        documents: Vec<Document>,
    },
}

impl DocumentListing {
    pub fn into_parts(self) -> (Vec<Document>, Option<User>) {
        match self {
            DocumentListing::Plain(documents) => (documents, None),
            DocumentListing::WithUser { user, documents } => (documents, user),
        }
    }
}

/// Response from `POST api/documents/upload`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub document: Option<Document>,
}

/// Response from mutations that may echo the updated user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub user: Option<User>,
}

/// Binary payload from the view and download endpoints
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

/// Extensions the upload picker accepts
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// A file ready to be sent as multipart `file`
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Build an upload from in-memory bytes, checking the extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).ok_or_else(|| LockerError::Validation {
            status: 0,
            message: format!(
                "Unsupported file type for {}; accepted: {}",
                file_name,
                ACCEPTED_EXTENSIONS.join(", ")
            ),
        })?;

        Ok(Self {
            file_name,
            content_type: content_type.to_string(),
            bytes,
        })
    }

    /// Read a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LockerError::Validation {
                status: 0,
                message: format!("Not a file path: {}", path.display()),
            })?
            .to_string();

        // Reject before reading the whole file
        content_type_for(&file_name).ok_or_else(|| LockerError::Validation {
            status: 0,
            message: format!("Unsupported file type for {}", file_name),
        })?;

        let bytes = tokio::fs::read(path).await?;
        Self::new(file_name, bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}
