//! Student and admin login

use crate::api::ApiClient;
use crate::error::Result;
use crate::session::{Session, SessionStore};
use std::sync::Arc;
use tracing::info;

pub struct AuthClient {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
}

impl AuthClient {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>) -> Self {
        Self { api, session }
    }

    /// Log a student in by student ID (or email) and password.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session> {
        let auth = self.api.login(identifier, password).await?;
        let session = self.session.set(auth.token, auth.user)?;
        info!(user_id = %session.user.id, "Student logged in");
        Ok(session)
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> Result<Session> {
        let auth = self.api.admin_login(email, password).await?;
        let session = self.session.set(auth.token, auth.user)?;
        info!(user_id = %session.user.id, "Admin logged in");
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.clear()
    }
}
