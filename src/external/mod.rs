//! Interfaces the authorization and cache core consumes from surrounding
//! systems. Everything in this module is a trait plus, where
//! useful for tests and the demo binary, a minimal in-memory reference
//! implementation. Production callers supply their own implementations
//! (a real identity provider, the relational store, Redis, a real signer).

pub mod audit_sinks;
pub mod cache_store;
pub mod identity;
pub mod signer;
pub mod ssrf;
pub mod store;

pub use audit_sinks::{LongTermAuditStore, SiemSink};
pub use cache_store::{InMemorySharedStore, SharedCacheStore};
pub use identity::{Claims, IdentityProvider};
pub use signer::{SignedUrl, StorageSigner};
pub use ssrf::SsrfGuard;
pub use store::{GenerationParent, PersistentStore, ProjectRecord, ResourceRecord, TeamLink};
