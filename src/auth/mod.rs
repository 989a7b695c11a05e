//! The authorization core: ten ordered layers driven by
//! [`orchestrator::AuthorizationCore`].

pub mod layers;
pub mod orchestrator;

pub use orchestrator::{AuthorizationCore, CachedDecision};
