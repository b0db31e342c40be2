// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::StatusCode;
use std::fmt;

use crate::request::Response;

/// Errors surfaced by the authenticated request pipeline.
///
/// `AuthFailure` on first occurrence and `RefreshFailure` are handled inside
/// the pipeline; callers only see them when recovery is impossible.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Connection failure or timeout, passed through untouched.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 5xx response, passed through untouched.
    #[error("server error ({status})")]
    Server { status: StatusCode, response: Response },

    /// Any other non-success response the auth path does not handle.
    #[error("request rejected ({status})")]
    Rejected { status: StatusCode, response: Response },

    /// 401/403 that was already retried or is outside the refresh policy.
    #[error("authentication failed ({status})")]
    AuthFailure { status: StatusCode, response: Response },

    /// The refresh call itself failed.
    #[error("session refresh failed: {0}")]
    RefreshFailure(String),

    /// The queued request was abandoned or outlived its TTL.
    #[error("authentication expired: {reason}")]
    AuthExpired { reason: String },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Classify a final non-success response.
    pub fn from_response(response: Response) -> Self {
        let status = response.status;
        match status.as_u16() {
            401 | 403 => Self::AuthFailure { status, response },
            500..=599 => Self::Server { status, response },
            _ => Self::Rejected { status, response },
        }
    }

    pub fn auth_expired(reason: impl Into<String>) -> Self {
        Self::AuthExpired { reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::AuthFailure { .. } => ErrorKind::AuthFailure,
            Self::RefreshFailure(_) => ErrorKind::RefreshFailure,
            Self::AuthExpired { .. } => ErrorKind::AuthExpired,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP status of the response behind this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|r| r.status)
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Server { response, .. }
            | Self::Rejected { response, .. }
            | Self::AuthFailure { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Machine-readable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Server,
    Rejected,
    AuthFailure,
    RefreshFailure,
    AuthExpired,
    Cancelled,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Server => "SERVER",
            Self::Rejected => "REJECTED",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::RefreshFailure => "REFRESH_FAILURE",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
