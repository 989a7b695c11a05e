//! Core error taxonomy for the authorization and cache engine.
//!
//! Every fallible operation in this crate returns a [`CoreError`]. Variants
//! map directly onto the incident kinds the orchestrator and audit pipeline
//! reason about; they are a closed enumeration by design (see `spec.md` §7
//! and §9 — no duck-typed "security incident" strings).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::authorization::ThreatLevel;

/// Severity assigned to an error when it is recorded by the audit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Subcategory recorded alongside an [`CoreError::Unauthorized`] denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    NotOwner,
    InsufficientTeamPermissions,
    PrivateProject,
    InheritanceExhausted,
    ProjectVisibilityRestricted,
    InputMalformed,
    RateLimited,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::NotOwner => "not_owner",
            DenialReason::InsufficientTeamPermissions => "insufficient_team_permissions",
            DenialReason::PrivateProject => "private_project",
            DenialReason::InheritanceExhausted => "inheritance_exhausted",
            DenialReason::ProjectVisibilityRestricted => "project_visibility_restricted",
            DenialReason::InputMalformed => "input_malformed",
            DenialReason::RateLimited => "rate_limited",
        };
        write!(f, "{s}")
    }
}

/// The closed taxonomy of kinds this crate can fail with.
///
/// This is intentionally a *kind* taxonomy, not an exception hierarchy:
/// every variant carries a correlation id so that detailed context can be
/// routed to audit sinks while callers only ever see the kind.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("input malformed: {detail}")]
    InputMalformed {
        detail: String,
        correlation_id: Uuid,
        repeated_offense: bool,
    },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        correlation_id: Uuid,
    },

    #[error("unauthorized: {reason}")]
    Unauthorized {
        reason: DenialReason,
        correlation_id: Uuid,
    },

    #[error("context suspicious, threat level {threat_level:?}")]
    ContextSuspicious {
        threat_level: ThreatLevel,
        correlation_id: Uuid,
    },

    #[error("cache degraded: {detail}")]
    CacheDegraded {
        detail: String,
        correlation_id: Uuid,
    },

    #[error("dependency unavailable: {dependency}")]
    DependencyUnavailable {
        dependency: String,
        correlation_id: Uuid,
    },

    #[error("integrity violation: {detail}")]
    IntegrityViolation {
        detail: String,
        correlation_id: Uuid,
    },

    #[error("internal error (correlation_id={correlation_id})")]
    InternalError { correlation_id: Uuid },
}

impl CoreError {
    /// Correlation id carried by every variant, used to join audit records
    /// back to the response the caller received.
    pub fn correlation_id(&self) -> Uuid {
        match self {
            CoreError::InputMalformed { correlation_id, .. }
            | CoreError::RateLimited { correlation_id, .. }
            | CoreError::Unauthorized { correlation_id, .. }
            | CoreError::ContextSuspicious { correlation_id, .. }
            | CoreError::CacheDegraded { correlation_id, .. }
            | CoreError::DependencyUnavailable { correlation_id, .. }
            | CoreError::IntegrityViolation { correlation_id, .. }
            | CoreError::InternalError { correlation_id } => *correlation_id,
        }
    }

    /// Severity this error is recorded at, per `spec.md` §7. Repeated
    /// offenses escalate `InputMalformed` from `WARNING` to `ERROR`.
    pub fn severity(&self) -> Severity {
        match self {
            CoreError::InputMalformed {
                repeated_offense, ..
            } => {
                if *repeated_offense {
                    Severity::Error
                } else {
                    Severity::Warning
                }
            }
            CoreError::RateLimited { .. } => Severity::Warning,
            CoreError::Unauthorized { .. } => Severity::Warning,
            CoreError::ContextSuspicious { threat_level, .. } => {
                if *threat_level >= ThreatLevel::Red {
                    Severity::Critical
                } else {
                    Severity::Error
                }
            }
            CoreError::CacheDegraded { .. } => Severity::Warning,
            CoreError::DependencyUnavailable { .. } => Severity::Critical,
            CoreError::IntegrityViolation { .. } => Severity::Critical,
            CoreError::InternalError { .. } => Severity::Error,
        }
    }

    /// Whether this error, on its own, must deny the request.
    pub fn denies(&self) -> bool {
        !matches!(self, CoreError::CacheDegraded { .. })
    }

    pub fn internal(correlation_id: Uuid) -> Self {
        CoreError::InternalError { correlation_id }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
