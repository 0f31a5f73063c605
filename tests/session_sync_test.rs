//! Session changes propagating between client contexts

use std::sync::Arc;
use std::time::Duration;

use locker_client::clock::RecordingTimer;
use locker_client::navigation::{Navigator, Route};
use locker_client::session::{FileStorage, SessionBus, SessionStore};
use locker_client::types::User;
use locker_client::{ClientConfig, LockerClient};
use serde_json::json;
use tokio::sync::mpsc;

struct ChannelNavigator(mpsc::UnboundedSender<Route>);

impl Navigator for ChannelNavigator {
    fn navigate(&self, route: Route) {
        let _ = self.0.send(route);
    }
}

fn user() -> User {
    serde_json::from_value(json!({"_id": "u1", "name": "Asha", "storageUsed": 2048})).unwrap()
}

fn context(dir: &std::path::Path, bus: &SessionBus) -> (LockerClient, mpsc::UnboundedReceiver<Route>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = LockerClient::with_parts(
        ClientConfig::default(),
        Arc::new(FileStorage::new(dir)),
        bus.clone(),
        Arc::new(ChannelNavigator(tx)),
        Arc::new(RecordingTimer::new()),
    )
    .unwrap();
    (client, rx)
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_logout_in_one_context_redirects_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let bus = SessionBus::new();
    let (first, _first_routes) = context(dir.path(), &bus);
    let (second, mut second_routes) = context(dir.path(), &bus);

    let watcher = second.enter_view(Route::Dashboard);

    first.session().set("tok", user()).unwrap();
    wait_for(|| second.session().token().is_some()).await;

    first.auth().logout().unwrap();

    let route = tokio::time::timeout(Duration::from_secs(1), second_routes.recv())
        .await
        .expect("redirect");
    assert_eq!(route, Some(Route::StudentLogin));
    assert!(second.session().get().is_none());
    assert!(!second.student_guard().in_authenticated_view());
    watcher.abort();
}

#[tokio::test]
async fn test_admin_view_redirects_to_admin_login() {
    let dir = tempfile::tempdir().unwrap();
    let bus = SessionBus::new();
    let (first, _first_routes) = context(dir.path(), &bus);
    let (second, mut second_routes) = context(dir.path(), &bus);

    let watcher = second.enter_view(Route::AdminDashboard);
    first.session().set("tok", user()).unwrap();
    wait_for(|| second.session().token().is_some()).await;

    first.session().clear().unwrap();

    let route = tokio::time::timeout(Duration::from_secs(1), second_routes.recv())
        .await
        .expect("redirect");
    assert_eq!(route, Some(Route::AdminLogin));
    watcher.abort();
}

#[tokio::test]
async fn test_new_context_sees_persisted_session() {
    let dir = tempfile::tempdir().unwrap();
    let bus = SessionBus::new();
    let (first, _routes) = context(dir.path(), &bus);
    first.session().set("tok", user()).unwrap();

    let reopened = SessionStore::open(Arc::new(FileStorage::new(dir.path())), SessionBus::new());
    assert_eq!(reopened.token().as_deref(), Some("tok"));

    let (third, _routes) = context(dir.path(), &bus);
    assert_eq!(
        third.documents().storage_account().await.used_bytes,
        2048
    );
}
