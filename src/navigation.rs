//! Login redirects and unauthorized teardown
//!
//! [`SessionGuard`] is the single place that reacts to a lost session:
//! an `Unauthorized` result, a missing token, or another context logging
//! out while this one shows an authenticated view.

use crate::clock::{Timer, TokioTimer};
use crate::error::{LockerError, Result};
use crate::session::{SessionEvent, SessionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default pause before redirecting after a teardown
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(1000);

/// Entry points the client can send the user to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    StudentLogin,
    AdminLogin,
    Dashboard,
    AdminDashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::StudentLogin => "/login",
            Route::AdminLogin => "/admin",
            Route::Dashboard => "/dashboard",
            Route::AdminDashboard => "/admin/dashboard",
        }
    }

    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Dashboard | Route::AdminDashboard)
    }
}

/// Whatever renders routes (router, CLI prompt, test recorder)
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only logs; used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        info!(route = route.path(), "Navigation requested");
    }
}

/// Tears the session down and redirects to a login entry point.
pub struct SessionGuard {
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    login_route: Route,
    redirect_delay: Duration,
    timer: Arc<dyn Timer>,
    authenticated_view: AtomicBool,
}

impl SessionGuard {
    pub fn new(session: Arc<SessionStore>, navigator: Arc<dyn Navigator>, login_route: Route) -> Self {
        Self {
            session,
            navigator,
            login_route,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            timer: Arc::new(TokioTimer),
            authenticated_view: AtomicBool::new(false),
        }
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn login_route(&self) -> Route {
        self.login_route
    }

    /// Record which kind of view is on screen.
    pub fn enter_view(&self, route: Route) {
        self.authenticated_view
            .store(route.requires_session(), Ordering::SeqCst);
    }

    pub fn in_authenticated_view(&self) -> bool {
        self.authenticated_view.load(Ordering::SeqCst)
    }

    /// Current token, or teardown + `Unauthorized` when there is none.
    pub fn require_token(&self) -> Result<String> {
        match self.session.token() {
            Some(token) => Ok(token),
            None => {
                self.expire();
                Err(LockerError::Unauthorized("no active session".into()))
            }
        }
    }

    /// Pass a result through, tearing the session down on `Unauthorized`.
    pub fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                self.expire();
            }
        }
        result
    }

    /// Clear the session and schedule the login redirect.
    pub fn expire(&self) {
        if let Err(e) = self.session.clear() {
            error!("Failed to clear session storage: {}", e);
        }
        self.schedule_redirect();
    }

    fn schedule_redirect(&self) {
        self.authenticated_view.store(false, Ordering::SeqCst);
        let navigator = self.navigator.clone();
        let timer = self.timer.clone();
        let delay = self.redirect_delay;
        let route = self.login_route;

        tokio::spawn(async move {
            timer.sleep(delay).await;
            navigator.navigate(route);
        });
    }

    /// Follow session changes from other contexts.
    ///
    /// Remote updates are applied to this context's store. A remote clear
    /// while an authenticated view is showing redirects to login.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        let mut rx = guard.session.subscribe();

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events; durable storage is the tie-breaker
                        warn!(skipped, "Session watcher lagged, reloading");
                        if guard.session.reload().is_none() && guard.in_authenticated_view() {
                            guard.authenticated_view.store(false, Ordering::SeqCst);
                            guard.navigator.navigate(guard.login_route);
                        }
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if !guard.session.apply(&event) {
                    continue;
                }

                if matches!(event, SessionEvent::Cleared { .. }) && guard.in_authenticated_view() {
                    debug!("Session cleared elsewhere, leaving authenticated view");
                    guard.authenticated_view.store(false, Ordering::SeqCst);
                    guard.navigator.navigate(guard.login_route);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingTimer;
    use crate::session::{MemoryStorage, SessionBus, SessionStorage};
    use crate::types::User;
    use tokio::sync::mpsc;

    struct ChannelNavigator(mpsc::UnboundedSender<Route>);

    impl Navigator for ChannelNavigator {
        fn navigate(&self, route: Route) {
            let _ = self.0.send(route);
        }
    }

    fn user() -> User {
        serde_json::from_value(serde_json::json!({"_id": "u1", "name": "Asha"})).unwrap()
    }

    fn guard_for(session: Arc<SessionStore>) -> (Arc<SessionGuard>, mpsc::UnboundedReceiver<Route>, Arc<RecordingTimer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = Arc::new(RecordingTimer::new());
        let guard = SessionGuard::new(session, Arc::new(ChannelNavigator(tx)), Route::StudentLogin)
            .with_timer(timer.clone());
        (Arc::new(guard), rx, timer)
    }

    #[tokio::test]
    async fn test_unauthorized_clears_and_redirects() {
        let session = Arc::new(SessionStore::in_memory());
        session.set("tok", user()).unwrap();
        let (guard, mut routes, timer) = guard_for(session.clone());

        let result: Result<()> = guard.check(Err(LockerError::Unauthorized("expired".into())));

        assert!(result.unwrap_err().is_unauthorized());
        assert!(session.get().is_none());
        assert_eq!(routes.recv().await, Some(Route::StudentLogin));
        assert_eq!(timer.requested(), vec![DEFAULT_REDIRECT_DELAY]);
    }

    #[tokio::test]
    async fn test_other_errors_leave_session_alone() {
        let session = Arc::new(SessionStore::in_memory());
        session.set("tok", user()).unwrap();
        let (guard, _routes, _timer) = guard_for(session.clone());

        let _ = guard.check::<()>(Err(LockerError::Network("reset".into())));
        assert!(session.get().is_some());
    }

    #[tokio::test]
    async fn test_missing_token_fails_fast() {
        let session = Arc::new(SessionStore::in_memory());
        let (guard, mut routes, _timer) = guard_for(session);

        let err = guard.require_token().unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(routes.recv().await, Some(Route::StudentLogin));
    }

    #[tokio::test]
    async fn test_remote_clear_redirects_authenticated_view() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let bus = SessionBus::new();
        let tab_a = Arc::new(SessionStore::open(storage.clone(), bus.clone()));
        tab_a.set("tok", user()).unwrap();
        let tab_b = Arc::new(SessionStore::open(storage, bus));
        assert!(tab_b.get().is_some());

        let (guard, mut routes, _timer) = guard_for(tab_b.clone());
        guard.enter_view(Route::Dashboard);
        let handle = guard.watch();

        tab_a.clear().unwrap();

        assert_eq!(routes.recv().await, Some(Route::StudentLogin));
        assert!(tab_b.get().is_none());
        assert!(!guard.in_authenticated_view());
        handle.abort();
    }

    #[tokio::test]
    async fn test_remote_clear_on_public_view_does_not_redirect() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let bus = SessionBus::new();
        let tab_a = Arc::new(SessionStore::open(storage.clone(), bus.clone()));
        tab_a.set("tok", user()).unwrap();
        let tab_b = Arc::new(SessionStore::open(storage, bus));

        let (guard, mut routes, _timer) = guard_for(tab_b.clone());
        guard.enter_view(Route::StudentLogin);
        let handle = guard.watch();

        tab_a.clear().unwrap();
        tab_a.set("tok-2", user()).unwrap();

        // wait until the update lands, then make sure no redirect was issued
        for _ in 0..100 {
            if tab_b.token().as_deref() == Some("tok-2") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tab_b.token().as_deref(), Some("tok-2"));
        assert!(routes.try_recv().is_err());
        handle.abort();
    }
}
