//! # velro-core
//!
//! The Authorization Core and the Hierarchical Cache Core for the Velro
//! generation platform's request path.
//!
//! ## Architecture
//!
//! - `domain`: the shared data model (principals, resources, roles,
//!   visibility, security context, authorization request/response).
//! - `cache`: the two-tier (L1 in-process + L2 shared) cache engine, its
//!   adaptive TTL manager, tag-based invalidation, and warming planner.
//! - `auth`: the ten ordered authorization layers and the orchestrator
//!   that drives them.
//! - `audit`: tamper-evident audit events, SIEM export, and background
//!   anomaly correlation.
//! - `gate`: the Request Pipeline Gate — fast-lane classification and the
//!   at-most-once request body cache.
//! - `ratelimit`: fixed-window rate limiting, shared (L2-backed) and
//!   in-memory (fast-lane only).
//! - `external`: the trait interfaces this crate consumes from
//!   surrounding systems (identity provider, relational store, shared
//!   cache store, storage URL signer, SSRF allow-list, audit sinks) plus
//!   minimal in-memory reference implementations used by tests and the
//!   demo binary.
//! - `config`: the single immutable configuration value built once at
//!   startup and threaded through every component.
//! - `error`: the closed error-kind taxonomy shared by every fallible
//!   operation in this crate.
//!
//! None of the business logic that surrounds this request path — project
//! and generation CRUD, billing, media synthesis, the HTTP framework
//! itself — is in scope here; this crate only decides, for a given
//! request, whether it is allowed, and serves that decision fast.

#![warn(clippy::all)]

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod external;
pub mod gate;
pub mod ratelimit;

pub use auth::AuthorizationCore;
pub use cache::CacheEngine;
pub use config::CoreConfig;
pub use domain::{
    AccessType, AuthorizationRequest, AuthorizationResponse, Principal, PrincipalId, ResourceRef,
    ResourceType, Role, SecurityContext, ThreatLevel,
};
pub use error::{CoreError, CoreResult};
pub use gate::{GateRequest, GateResponse, PipelineGate};

/// Crate version, re-exported for health/status endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, re-exported for health/status endpoints.
pub const NAME: &str = env!("CARGO_PKG_NAME");
