//! Admin user table
//!
//! Lists every account, filters it client-side and shows the aggregate
//! storage against the shared pool.

use crate::accounting::{StorageAccount, ADMIN_POOL_QUOTA_BYTES};
use crate::api::ApiClient;
use crate::clock::{Timer, TokioTimer};
use crate::error::Result;
use crate::navigation::SessionGuard;
use crate::types::User;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default period for the dashboard auto refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Search box + department dropdown
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub query: String,
    /// Empty matches every department
    pub department: String,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        let query = self.query.to_lowercase();
        let contains = |field: &Option<String>| {
            field
                .as_deref()
                .map(|v| v.to_lowercase().contains(&query))
                .unwrap_or(false)
        };

        let matches_search = query.is_empty()
            || user.name.to_lowercase().contains(&query)
            || contains(&user.student_id)
            || contains(&user.email)
            || user
                .phone
                .as_deref()
                .map(|p| p.contains(self.query.as_str()))
                .unwrap_or(false);

        let matches_department = self.department.is_empty()
            || user.department.as_deref() == Some(self.department.as_str());

        matches_search && matches_department
    }
}

pub struct AdminConsole {
    api: Arc<ApiClient>,
    guard: Arc<SessionGuard>,
    timer: Arc<dyn Timer>,
    users: RwLock<Vec<User>>,
}

impl AdminConsole {
    pub fn new(api: Arc<ApiClient>, guard: Arc<SessionGuard>) -> Self {
        Self {
            api,
            guard,
            timer: Arc::new(TokioTimer),
            users: RwLock::new(Vec::new()),
        }
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub async fn users(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn refresh(&self) -> Result<Vec<User>> {
        let token = self.guard.require_token()?;
        let users = self.guard.check(self.api.list_users(&token).await)?;
        *self.users.write().await = users.clone();
        Ok(users)
    }

    /// Delete an account, then re-fetch the table.
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        let token = self.guard.require_token()?;
        self.guard.check(self.api.delete_user(&token, id).await)?;
        info!(user_id = id, "User deleted");
        self.refresh().await?;
        Ok(())
    }

    pub async fn filtered(&self, filter: &UserFilter) -> Vec<User> {
        self.users
            .read()
            .await
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect()
    }

    /// Sum of every user's `storageUsed` against the shared pool
    pub async fn total_storage(&self) -> StorageAccount {
        let used = self
            .users
            .read()
            .await
            .iter()
            .map(|u| u.storage_used.unwrap_or(0))
            .sum();
        StorageAccount::new(used, ADMIN_POOL_QUOTA_BYTES)
    }

    /// Refresh now and then every `period` until the session is gone.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let console = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match console.refresh().await {
                    Ok(users) => debug!(count = users.len(), "Admin table refreshed"),
                    Err(e) if e.is_unauthorized() => break,
                    Err(e) => warn!("Failed to fetch data: {}", e),
                }
                console.timer.sleep(period).await;
            }
        })
    }
}
