//! Locker client - session and request orchestration for the student
//! document locker
//!
//! Talks to the locker REST API on behalf of one client context (a browser
//! tab or a CLI process) and keeps the local view consistent with the
//! server.
//!
//! ## Modules
//!
//! - **Retry**: exponential backoff for rate-limited requests
//! - **Queue**: strictly serial, spaced execution of registration calls
//! - **OTP**: two-phase registration state machine
//! - **Session**: durable token + user pair with cross-context sync
//! - **Navigation**: teardown and login redirect on session loss
//! - **Accounting**: storage figure reconciliation and severity bands
//! - **Documents**: list, search, upload, delete, favorite, view, download
//! - **Admin**: user table, filtering and pool usage

pub mod accounting;
pub mod admin;
pub mod api;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod documents;
pub mod error;
pub mod navigation;
pub mod otp;
pub mod queue;
pub mod retry;
pub mod session;
pub mod types;

pub use api::ApiClient;
pub use client::LockerClient;
pub use config::{ClientArgs, ClientConfig};
pub use error::{FailureKind, LockerError, Result};
