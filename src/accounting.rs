//! Storage quota reconciliation
//!
//! The backend does not always echo the updated user after a mutation, so
//! the "bytes used" figure has two sources. [`StorageAccountant::reconcile`]
//! folds them into one with a fixed priority: a server-reported
//! `storageUsed` wins, otherwise the sum of known document sizes is used.

use crate::types::{Document, User};
use serde::Serialize;
use tracing::debug;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Per-student quota
pub const STUDENT_QUOTA_BYTES: u64 = GIB;

/// Pool shown on the admin dashboard
pub const ADMIN_POOL_QUOTA_BYTES: u64 = 500 * GIB;

/// Display band for a usage percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// Normal below 70%, warning from 70% to 90%, critical above 90%.
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage > 90.0 {
            Severity::Critical
        } else if percentage >= 70.0 {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }
}

/// Where the current figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureSource {
    Server,
    LocalSum,
}

/// Used vs. available bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageAccount {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl StorageAccount {
    pub fn new(used_bytes: u64, quota_bytes: u64) -> Self {
        Self {
            used_bytes,
            quota_bytes,
        }
    }

    /// Share of the quota in use; 0 when there is no quota.
    pub fn percentage(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.quota_bytes as f64 * 100.0
    }

    pub fn severity(&self) -> Severity {
        Severity::for_percentage(self.percentage())
    }

    /// Used space in MiB with two decimals
    pub fn used_mb(&self) -> String {
        format!("{:.2}", self.used_bytes as f64 / MIB as f64)
    }

    /// Used space in whole GiB
    pub fn used_gb_rounded(&self) -> u64 {
        (self.used_bytes as f64 / GIB as f64).round() as u64
    }
}

/// Sum of `fileSize` over `documents`
pub fn local_total(documents: &[Document]) -> u64 {
    documents.iter().map(|d| d.file_size).sum()
}

/// Holds the last-known user and the reconciled figure.
#[derive(Debug, Clone)]
pub struct StorageAccountant {
    quota_bytes: u64,
    /// Id of the session user the figure belongs to
    tracked_id: Option<String>,
    user: Option<User>,
    account: StorageAccount,
    source: FigureSource,
}

impl StorageAccountant {
    /// Start from the user known at login, trusting its figure if present.
    pub fn new(quota_bytes: u64, last_known: Option<User>) -> Self {
        let used = last_known
            .as_ref()
            .and_then(|u| u.storage_used)
            .unwrap_or(0);
        Self {
            quota_bytes,
            tracked_id: last_known.as_ref().map(|u| u.id.clone()),
            user: last_known,
            account: StorageAccount::new(used, quota_bytes),
            source: FigureSource::Server,
        }
    }

    /// Follow the session's user.
    ///
    /// A different (or no) user resets the figure to what that user carries;
    /// the same user keeps the reconciled figure.
    pub fn track(&mut self, session_user: Option<&User>) {
        let next_id = session_user.map(|u| u.id.clone());
        if self.tracked_id == next_id {
            return;
        }

        self.tracked_id = next_id;
        self.user = session_user.cloned();
        self.account.used_bytes = session_user.and_then(|u| u.storage_used).unwrap_or(0);
        self.source = FigureSource::Server;
        debug!(
            user_id = session_user.map(|u| u.id.as_str()),
            used_bytes = self.account.used_bytes,
            "Storage figure follows session user"
        );
    }

    /// Take a server-reported figure. Returns `false` (and changes nothing)
    /// when the user carries no `storageUsed`.
    pub fn apply_server(&mut self, server_user: &User) -> bool {
        let Some(used) = server_user.storage_used else {
            return false;
        };
        self.account.used_bytes = used;
        self.source = FigureSource::Server;
        self.user = Some(self.merge(server_user.clone()));
        debug!(used_bytes = used, "Storage figure taken from server");
        true
    }

    /// Fold a server response and the current document list into the figure.
    pub fn reconcile(&mut self, server_user: Option<User>, documents: &[Document]) -> StorageAccount {
        match server_user {
            Some(user) if self.apply_server(&user) => {}
            server_user => {
                let total = local_total(documents);
                let mut merged = match server_user {
                    Some(user) => Some(self.merge(user)),
                    None => self.user.clone(),
                };
                if let Some(user) = merged.as_mut() {
                    user.storage_used = Some(total);
                }
                self.account.used_bytes = total;
                self.source = FigureSource::LocalSum;
                self.user = merged;
                debug!(used_bytes = total, "Storage figure summed from documents");
            }
        }
        self.account
    }

    /// A record without an id is a partial echo: keep the known user and
    /// only take its figure.
    fn merge(&self, server_user: User) -> User {
        match self.user.as_ref() {
            Some(known) if server_user.id.is_empty() => User {
                storage_used: server_user.storage_used,
                ..known.clone()
            },
            _ => server_user,
        }
    }

    pub fn account(&self) -> StorageAccount {
        self.account
    }

    pub fn source(&self) -> FigureSource {
        self.source
    }

    /// Last-known user with the reconciled figure merged in
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }
}
