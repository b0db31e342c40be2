// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Casegate: authenticated request pipeline for the case-management API.
//!
//! Attaches bearer credentials, refreshes expired sessions with a single
//! shared refresh call, and parks requests behind an interactive
//! re-authentication step when the session cannot be renewed silently.

pub mod client;
pub mod config;
pub mod error;
pub mod persist;
pub mod queue;
pub mod reauth;
pub mod redact;
pub mod refresh;
pub mod request;
pub mod session;
pub mod token_store;

pub use client::AuthClient;
pub use config::ClientConfig;
pub use error::{ErrorKind, PipelineError};
pub use reauth::{ReauthBridge, ReauthEvent};
pub use request::{OutgoingRequest, Response};
pub use session::Session;
pub use token_store::{Credential, TokenStore};
