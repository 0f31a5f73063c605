//! Document repository
//!
//! Thin façade over the documents API. The server owns the list: every
//! mutation is followed by a full re-fetch, and only upload/delete (plus the
//! initial load) feed the [`StorageAccountant`].

use crate::accounting::{StorageAccount, StorageAccountant};
use crate::api::ApiClient;
use crate::error::Result;
use crate::navigation::SessionGuard;
use crate::types::{Document, DocumentBlob, FileUpload, User};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::info;

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub document: Option<Document>,
    pub account: StorageAccount,
}

pub struct DocumentRepository {
    api: Arc<ApiClient>,
    guard: Arc<SessionGuard>,
    accountant: Mutex<StorageAccountant>,
    documents: RwLock<Vec<Document>>,
}

impl DocumentRepository {
    pub fn new(api: Arc<ApiClient>, guard: Arc<SessionGuard>, quota_bytes: u64) -> Self {
        let last_known = guard.session().user();
        Self {
            api,
            guard,
            accountant: Mutex::new(StorageAccountant::new(quota_bytes, last_known)),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Documents from the last list or search
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    pub async fn storage_account(&self) -> StorageAccount {
        self.accountant().await.account()
    }

    /// Last-known user with the reconciled storage figure
    pub async fn user(&self) -> Option<User> {
        self.accountant().await.user().cloned()
    }

    /// Initial load: fetch the list and reconcile the storage figure.
    pub async fn load(&self) -> Result<StorageAccount> {
        let listing_user = self.refresh().await?;
        Ok(self.reconcile(listing_user).await)
    }

    /// Replace the local list with the server's. Returns the user object if
    /// the server embedded one.
    pub async fn refresh(&self) -> Result<Option<User>> {
        let token = self.guard.require_token()?;
        let listing = self.guard.check(self.api.list_documents(&token).await)?;
        let (documents, user) = listing.into_parts();
        *self.documents.write().await = documents;
        Ok(user)
    }

    /// Server-side search; the storage figure is untouched.
    pub async fn search(&self, query: &str) -> Result<Vec<Document>> {
        let token = self.guard.require_token()?;
        let found = self
            .guard
            .check(self.api.search_documents(&token, query).await)?;
        *self.documents.write().await = found.clone();
        Ok(found)
    }

    pub async fn upload(&self, upload: FileUpload) -> Result<UploadOutcome> {
        let token = self.guard.require_token()?;
        let response = self
            .guard
            .check(self.api.upload_document(&token, &upload).await)?;
        info!(file = %upload.file_name, "Document uploaded");

        let account = self.settle(response.user).await?;
        Ok(UploadOutcome {
            document: response.document,
            account,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<StorageAccount> {
        let token = self.guard.require_token()?;
        let response = self
            .guard
            .check(self.api.delete_document(&token, id).await)?;
        info!(document_id = id, "Document deleted");

        self.settle(response.user).await
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<()> {
        let token = self.guard.require_token()?;
        self.guard
            .check(self.api.toggle_favorite(&token, id).await)?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn view(&self, id: &str) -> Result<DocumentBlob> {
        let token = self.guard.require_token()?;
        self.guard.check(self.api.view_document(&token, id).await)
    }

    pub async fn download(&self, id: &str) -> Result<DocumentBlob> {
        let token = self.guard.require_token()?;
        self.guard.check(self.api.download_document(&token, id).await)
    }

    /// After a mutation: take the server's figure first, then re-fetch the
    /// list. The local sum is only used when neither the mutation response
    /// nor the listing reported `storageUsed`.
    async fn settle(&self, mutation_user: Option<User>) -> Result<StorageAccount> {
        let applied = match mutation_user.as_ref() {
            Some(user) => self.accountant().await.apply_server(user),
            None => false,
        };

        let listing_user = self.refresh().await?;
        if applied {
            return Ok(self.storage_account().await);
        }

        let listing_has_figure = listing_user
            .as_ref()
            .is_some_and(|u| u.storage_used.is_some());
        let server_user = if listing_has_figure {
            listing_user
        } else {
            mutation_user.or(listing_user)
        };
        Ok(self.reconcile(server_user).await)
    }

    async fn reconcile(&self, server_user: Option<User>) -> StorageAccount {
        let documents = self.documents.read().await;
        self.accountant().await.reconcile(server_user, &documents)
    }

    /// Accountant aligned with whoever is logged in right now
    async fn accountant(&self) -> MutexGuard<'_, StorageAccountant> {
        let mut accountant = self.accountant.lock().await;
        accountant.track(self.guard.session().user().as_ref());
        accountant
    }
}
