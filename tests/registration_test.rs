//! OTP registration through the queue and retry policy

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use locker_client::clock::{RecordingTimer, Timer};
use locker_client::navigation::{Navigator, Route};
use locker_client::otp::{OtpFlow, OtpPhase, ProfileData, RegistrationApi};
use locker_client::queue::TaskQueue;
use locker_client::retry::RetryPolicy;
use locker_client::session::{MemoryStorage, SessionBus, SessionStore};
use locker_client::types::{AuthResponse, User};
use locker_client::{ClientConfig, LockerClient, LockerError, Result};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Registration backend that replays a per-student script of outcomes
#[derive(Default)]
struct ScriptedApi {
    scripts: Mutex<HashMap<String, VecDeque<Result<()>>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    overlapped: AtomicUsize,
}

impl ScriptedApi {
    fn script(&self, student_id: &str, outcomes: Vec<Result<()>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(student_id.to_string(), outcomes.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistrationApi for ScriptedApi {
    async fn initiate(&self, profile: &ProfileData) -> Result<()> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(profile.student_id.clone());
        tokio::task::yield_now().await;

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&profile.student_id)
            .and_then(|script| script.pop_front())
            .unwrap_or(Ok(()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn verify(&self, profile: &ProfileData, otp: &str) -> Result<AuthResponse> {
        if otp != "123456" {
            return Err(LockerError::Validation {
                status: 400,
                message: "Invalid or expired OTP".into(),
            });
        }
        let user: User = serde_json::from_value(json!({
            "_id": format!("id-{}", profile.student_id),
            "name": profile.name,
            "studentId": profile.student_id,
        }))
        .unwrap();
        Ok(AuthResponse {
            token: "fresh-token".into(),
            user,
        })
    }
}

fn profile(student_id: &str) -> ProfileData {
    ProfileData {
        name: format!("Student {}", student_id),
        email: format!("{}@example.edu", student_id.to_lowercase()),
        phone: "5550100".into(),
        student_id: student_id.into(),
        password: "secret123".into(),
        department: "Physics".into(),
    }
}

fn flow_with(api: Arc<ScriptedApi>, timer: Arc<RecordingTimer>) -> (OtpFlow, Arc<SessionStore>) {
    let session = Arc::new(SessionStore::in_memory());
    let shared: Arc<dyn Timer> = timer;
    let flow = OtpFlow::new(
        api,
        TaskQueue::with_timer(shared.clone(), Duration::from_millis(1000)),
        RetryPolicy::default(),
        shared,
        session.clone(),
    );
    (flow, session)
}

#[tokio::test]
async fn test_rapid_submissions_are_serialized_and_backed_off() {
    let api = Arc::new(ScriptedApi::default());
    api.script(
        "A",
        vec![Err(LockerError::RateLimited), Err(LockerError::RateLimited), Ok(())],
    );
    let timer = Arc::new(RecordingTimer::new());
    let (flow, _session) = flow_with(api.clone(), timer.clone());

    let (a, b, c) = tokio::join!(
        flow.submit_profile(profile("A")),
        flow.submit_profile(profile("B")),
        flow.submit_profile(profile("C")),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);

    assert_eq!(api.calls(), vec!["A", "A", "A", "B", "C"]);
    assert_eq!(api.overlapped.load(Ordering::SeqCst), 0);

    let delays: Vec<u64> = timer
        .requested()
        .iter()
        .map(|d| d.as_millis() as u64)
        .collect();
    assert!(delays.len() >= 4, "delays: {:?}", delays);
    assert_eq!(delays[..4], [1000, 2000, 1000, 1000]);

    // First success moved the flow on; later completions left it alone
    assert_eq!(flow.phase().await, OtpPhase::AwaitingOtp);
}

#[tokio::test]
async fn test_persistent_rate_limit_reports_busy() {
    let api = Arc::new(ScriptedApi::default());
    api.script("A", (0..4).map(|_| Err(LockerError::RateLimited)).collect());
    let timer = Arc::new(RecordingTimer::new());
    let (flow, _session) = flow_with(api.clone(), timer.clone());

    let err = flow.submit_profile(profile("A")).await.unwrap_err();

    assert!(matches!(err, LockerError::ServerBusy { attempts: 4 }));
    assert_eq!(api.calls().len(), 4);
    assert_eq!(
        timer.requested()[..3],
        [
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000)
        ]
    );
    assert_eq!(flow.phase().await, OtpPhase::CollectingProfile);
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let api = Arc::new(ScriptedApi::default());
    api.script(
        "A",
        vec![Err(LockerError::Validation {
            status: 400,
            message: "Student ID already registered".into(),
        })],
    );
    let timer = Arc::new(RecordingTimer::new());
    let (flow, _session) = flow_with(api.clone(), timer.clone());

    let err = flow.submit_profile(profile("A")).await.unwrap_err();

    assert_eq!(err.to_string(), "Student ID already registered");
    assert_eq!(api.calls().len(), 1);
    assert_eq!(flow.phase().await, OtpPhase::CollectingProfile);
}

#[tokio::test]
async fn test_otp_verification_creates_session() {
    let api = Arc::new(ScriptedApi::default());
    let timer = Arc::new(RecordingTimer::new());
    let (flow, session) = flow_with(api, timer);

    assert!(matches!(
        flow.submit_otp("123456").await,
        Err(LockerError::Precondition(_))
    ));

    assert_ok!(flow.submit_profile(profile("A")).await);
    assert!(matches!(
        flow.submit_otp("  ").await,
        Err(LockerError::Validation { .. })
    ));
    assert!(flow.submit_otp("000000").await.is_err());
    assert_eq!(flow.phase().await, OtpPhase::AwaitingOtp);

    let created = flow.submit_otp("123456").await.unwrap();
    assert_eq!(created.token, "fresh-token");
    assert_eq!(session.token().as_deref(), Some("fresh-token"));
    assert_eq!(flow.phase().await, OtpPhase::Verified);
}

struct NullNavigator;

impl Navigator for NullNavigator {
    fn navigate(&self, _route: Route) {}
}

#[tokio::test]
async fn test_registration_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register/initiate"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "Too many requests"})))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register/initiate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "OTP sent"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register/verify"))
        .and(body_partial_json(json!({"studentId": "CS-042", "otp": "654321"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": "jwt-token",
            "user": {"_id": "u42", "name": "Student CS-042", "studentId": "CS-042", "storageUsed": 0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let timer = Arc::new(RecordingTimer::new());
    let config = ClientConfig {
        api_base_url: server.uri(),
        ..Default::default()
    };
    let client = LockerClient::with_parts(
        config,
        Arc::new(MemoryStorage::new()),
        SessionBus::new(),
        Arc::new(NullNavigator),
        timer.clone(),
    )
    .unwrap();

    assert_ok!(client.registration().submit_profile(profile("CS-042")).await);
    let session = client.registration().submit_otp("654321").await.unwrap();

    assert_eq!(session.user.id, "u42");
    assert_eq!(client.session().token().as_deref(), Some("jwt-token"));
    assert_eq!(
        timer.requested()[..2],
        [Duration::from_millis(1000), Duration::from_millis(2000)]
    );
}
