//! The ten ordered layers of the authorization chain.
//!
//! Each layer is a plain async function rather than a trait object: the
//! dependencies a layer needs (the store, the limiter, the audit pipeline,
//! ...) differ enough from layer to layer that a shared `Layer` trait would
//! mostly be an unused abstraction over a single call site in
//! `crate::auth::orchestrator`.

pub mod access_control;
pub mod anomaly_correlation;
pub mod audit_emission;
pub mod context_validation;
pub mod inheritance_depth;
pub mod input_validation;
pub mod media_grant;
pub mod rate_limit;
pub mod recovery;
pub mod team_inheritance;

use crate::domain::authorization::AuthorizationMethod;
use crate::domain::role::Role;
use crate::error::DenialReason;

/// The shared result of the access-control resolution,
/// computed once by [`access_control::run`] and read by
/// [`team_inheritance::run`] and [`inheritance_depth::run`] so the three
/// layers can each report their own [`crate::domain::authorization::LayerResult`]
/// without re-running the resolution three times.
#[derive(Debug, Clone, Default)]
pub struct AccessTrace {
    pub granted: bool,
    pub method: Option<AuthorizationMethod>,
    pub effective_role: Option<Role>,
    pub depth_used: u32,
    pub cycle_detected: bool,
    pub denial_reason: Option<DenialReason>,
    /// True once the walk has considered any resource beyond the original
    /// one (used by `team_inheritance` to decide whether it applies).
    pub used_team_path: bool,
}
