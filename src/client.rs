//! Wiring for one client context (one browser tab, one CLI process)

use crate::admin::AdminConsole;
use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::clock::{Timer, TokioTimer};
use crate::config::ClientConfig;
use crate::documents::DocumentRepository;
use crate::error::Result;
use crate::navigation::{Navigator, Route, SessionGuard, TracingNavigator};
use crate::otp::{OtpFlow, RegistrationApi};
use crate::queue::TaskQueue;
use crate::session::{FileStorage, SessionBus, SessionStorage, SessionStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct LockerClient {
    config: ClientConfig,
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    student_guard: Arc<SessionGuard>,
    admin_guard: Arc<SessionGuard>,
    auth: AuthClient,
    registration: OtpFlow,
    documents: DocumentRepository,
    admin: Arc<AdminConsole>,
}

impl LockerClient {
    /// File-backed session under `config.session_dir`, logging navigator.
    pub fn open(config: ClientConfig) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(config.session_dir.clone()));
        Self::with_parts(
            config,
            storage,
            SessionBus::new(),
            Arc::new(TracingNavigator),
            Arc::new(TokioTimer),
        )
    }

    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        bus: SessionBus,
        navigator: Arc<dyn Navigator>,
        timer: Arc<dyn Timer>,
    ) -> Result<Self> {
        config.validate()?;

        let api = Arc::new(ApiClient::new(&config)?);
        let session = Arc::new(SessionStore::open(storage, bus));
        debug!(context_id = %session.context_id(), "Client context opened");

        let guard_for = |route: Route| {
            Arc::new(
                SessionGuard::new(session.clone(), navigator.clone(), route)
                    .with_redirect_delay(config.redirect_delay())
                    .with_timer(timer.clone()),
            )
        };
        let student_guard = guard_for(Route::StudentLogin);
        let admin_guard = guard_for(Route::AdminLogin);

        let queue = TaskQueue::with_timer(timer.clone(), config.queue_spacing());
        let registration = OtpFlow::new(
            api.clone() as Arc<dyn RegistrationApi>,
            queue,
            config.retry_policy(),
            timer.clone(),
            session.clone(),
        );

        Ok(Self {
            auth: AuthClient::new(api.clone(), session.clone()),
            documents: DocumentRepository::new(
                api.clone(),
                student_guard.clone(),
                config.storage_quota_bytes,
            ),
            admin: Arc::new(
                AdminConsole::new(api.clone(), admin_guard.clone()).with_timer(timer.clone()),
            ),
            registration,
            student_guard,
            admin_guard,
            session,
            api,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn registration(&self) -> &OtpFlow {
        &self.registration
    }

    pub fn documents(&self) -> &DocumentRepository {
        &self.documents
    }

    pub fn admin(&self) -> &Arc<AdminConsole> {
        &self.admin
    }

    pub fn student_guard(&self) -> &Arc<SessionGuard> {
        &self.student_guard
    }

    pub fn admin_guard(&self) -> &Arc<SessionGuard> {
        &self.admin_guard
    }

    /// Show an authenticated view and follow session changes from other
    /// contexts while it is up. Admin views redirect to the admin login.
    pub fn enter_view(&self, route: Route) -> JoinHandle<()> {
        let guard = match route {
            Route::AdminDashboard | Route::AdminLogin => &self.admin_guard,
            Route::Dashboard | Route::StudentLogin => &self.student_guard,
        };
        guard.enter_view(route);
        guard.watch()
    }
}
