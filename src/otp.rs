//! Two-phase OTP registration
//!
//! ```text
//! collecting-profile --submit_profile--> awaiting-otp --submit_otp--> verified
//!                                          |    ^
//!                                          +----+ resend
//! ```
//!
//! Initiation calls go through the shared [`TaskQueue`] and the
//! [`RetryPolicy`]. Verification is a single call: an OTP is single-use, so
//! a failed verification is never retried automatically.

use crate::clock::Timer;
use crate::error::{LockerError, Result};
use crate::queue::TaskQueue;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionStore};
use crate::types::AuthResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Registration form contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub student_id: String,
    pub password: String,
    pub department: String,
}

/// Backend calls used by the registration flow
#[async_trait]
pub trait RegistrationApi: Send + Sync {
    /// Send the profile and have the server issue an OTP.
    async fn initiate(&self, profile: &ProfileData) -> Result<()>;

    /// Confirm the OTP and receive a session.
    async fn verify(&self, profile: &ProfileData, otp: &str) -> Result<AuthResponse>;
}

/// Where the flow currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OtpPhase {
    CollectingProfile,
    AwaitingOtp,
    Verified,
}

/// In-progress registration
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub profile: Option<ProfileData>,
    pub otp_code: Option<String>,
    pub phase: OtpPhase,
}

impl Default for OtpChallenge {
    fn default() -> Self {
        Self {
            profile: None,
            otp_code: None,
            phase: OtpPhase::CollectingProfile,
        }
    }
}

/// Registration state machine
pub struct OtpFlow {
    api: Arc<dyn RegistrationApi>,
    queue: TaskQueue,
    policy: RetryPolicy,
    timer: Arc<dyn Timer>,
    session: Arc<SessionStore>,
    challenge: Mutex<OtpChallenge>,
}

impl OtpFlow {
    pub fn new(
        api: Arc<dyn RegistrationApi>,
        queue: TaskQueue,
        policy: RetryPolicy,
        timer: Arc<dyn Timer>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            api,
            queue,
            policy,
            timer,
            session,
            challenge: Mutex::new(OtpChallenge::default()),
        }
    }

    pub async fn phase(&self) -> OtpPhase {
        self.challenge.lock().await.phase
    }

    /// Submit the registration form and request an OTP.
    pub async fn submit_profile(&self, profile: ProfileData) -> Result<()> {
        let phase = self.phase().await;
        if phase != OtpPhase::CollectingProfile {
            return Err(LockerError::Precondition(format!(
                "profile already submitted (phase {:?})",
                phase
            )));
        }

        self.initiate(profile.clone()).await?;

        let mut challenge = self.challenge.lock().await;
        if challenge.phase == OtpPhase::CollectingProfile {
            info!(student_id = %profile.student_id, "OTP issued, awaiting code");
            challenge.phase = OtpPhase::AwaitingOtp;
            challenge.profile = Some(profile);
            challenge.otp_code = None;
        }
        Ok(())
    }

    /// Verify the OTP. Creates the session on success.
    pub async fn submit_otp(&self, code: &str) -> Result<Session> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LockerError::Validation {
                status: 0,
                message: "Please enter the OTP sent to you".into(),
            });
        }

        // Held across the call so concurrent submissions cannot verify twice
        let mut challenge = self.challenge.lock().await;
        let profile = match (&challenge.phase, &challenge.profile) {
            (OtpPhase::AwaitingOtp, Some(profile)) => profile.clone(),
            (phase, _) => {
                return Err(LockerError::Precondition(format!(
                    "no OTP has been issued (phase {:?})",
                    phase
                )))
            }
        };
        challenge.otp_code = Some(code.to_string());

        let auth = self.api.verify(&profile, code).await?;
        let session = self.session.set(auth.token, auth.user)?;

        challenge.phase = OtpPhase::Verified;
        challenge.profile = None;
        challenge.otp_code = None;
        info!(user_id = %session.user.id, "Registration verified");
        Ok(session)
    }

    /// Ask the server for a fresh OTP for the same profile.
    pub async fn resend(&self) -> Result<()> {
        let profile = {
            let challenge = self.challenge.lock().await;
            match (&challenge.phase, &challenge.profile) {
                (OtpPhase::AwaitingOtp, Some(profile)) => profile.clone(),
                (phase, _) => {
                    return Err(LockerError::Precondition(format!(
                        "nothing to resend (phase {:?})",
                        phase
                    )))
                }
            }
        };

        self.initiate(profile).await?;
        info!("OTP re-sent");
        Ok(())
    }

    /// Drop the in-progress registration (user navigated away).
    pub async fn reset(&self) {
        *self.challenge.lock().await = OtpChallenge::default();
    }

    async fn initiate(&self, profile: ProfileData) -> Result<()> {
        let api = self.api.clone();
        let policy = self.policy;
        let timer = self.timer.clone();

        self.queue
            .run(async move {
                let api = api.as_ref();
                let profile = &profile;
                policy.execute(timer.as_ref(), || api.initiate(profile)).await
            })
            .await
    }
}
