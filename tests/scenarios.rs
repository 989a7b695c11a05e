//! End-to-end scenarios against the public `AuthorizationCore` surface,
//! wired the same way `main.rs` wires the demo binary: one shared L2 store,
//! one `GenerationRegistry`, one `AuditPipeline`. Each test stands in for
//! one of the request shapes the orchestrator's ten-layer chain and the
//! two-tier cache engine are built to resolve.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use velro_core::audit::AuditPipeline;
use velro_core::auth::AuthorizationCore;
use velro_core::cache::GenerationRegistry;
use velro_core::config::CoreConfig;
use velro_core::domain::access::AccessType;
use velro_core::domain::authorization::AuthorizationRequest;
use velro_core::domain::principal::{PrincipalId, TeamId};
use velro_core::domain::resource::{GenerationId, ProjectId, ResourceId, ResourceRef, ResourceType};
use velro_core::domain::role::Role;
use velro_core::domain::security_context::SecurityContext;
use velro_core::domain::visibility::ProjectVisibility;
use velro_core::error::{CoreError, CoreResult, Severity};
use velro_core::external::audit_sinks::InMemoryAuditBackend;
use velro_core::external::cache_store::{InMemorySharedStore, SharedCacheStore};
use velro_core::external::signer::HmacUrlSigner;
use velro_core::external::ssrf::SsrfGuard;
use velro_core::external::store::{GenerationParent, Page, PersistentStore, ProjectRecord, ResourceRecord, TeamLink};

/// Relational-store double. Mirrors the `FakeStore` pattern used throughout
/// the layer unit tests, widened to hold the resources/projects/team data a
/// full end-to-end scenario needs rather than a single layer's slice of it.
#[derive(Default)]
struct ScenarioStore {
    resources: Mutex<HashMap<ResourceId, ResourceRecord>>,
    projects: Mutex<HashMap<ProjectId, ProjectRecord>>,
    memberships: Mutex<HashMap<PrincipalId, Vec<(TeamId, Role)>>>,
    links: Mutex<HashMap<ProjectId, Vec<TeamLink>>>,
}

#[async_trait]
impl PersistentStore for ScenarioStore {
    async fn fetch_resource(&self, id: ResourceId) -> CoreResult<Option<ResourceRecord>> {
        Ok(self.resources.lock().get(&id).cloned())
    }
    async fn fetch_project(&self, id: ProjectId) -> CoreResult<Option<ProjectRecord>> {
        Ok(self.projects.lock().get(&id).cloned())
    }
    async fn fetch_team_memberships(&self, principal: PrincipalId) -> CoreResult<Vec<(TeamId, Role)>> {
        Ok(self.memberships.lock().get(&principal).cloned().unwrap_or_default())
    }
    async fn fetch_team_project_links(&self, project: ProjectId) -> CoreResult<Vec<TeamLink>> {
        Ok(self.links.lock().get(&project).cloned().unwrap_or_default())
    }
    async fn fetch_generation_parent(&self, _id: GenerationId) -> CoreResult<GenerationParent> {
        Ok(GenerationParent { parent_id: None })
    }
    async fn fetch_recent_generations(
        &self,
        _principal: PrincipalId,
        _limit: usize,
        _cursor: Option<String>,
    ) -> CoreResult<Page<GenerationId>> {
        Ok(Page { items: Vec::new(), next_cursor: None })
    }
}

/// An L2 store that can be flipped into "unreachable" on demand, so the
/// degraded-mode scenario can exercise a real L1/L2 split instead of
/// asserting against a store that was simply never populated. Streams and
/// the rate-limit sorted set stay reachable even while "down" — this models
/// the decision cache's backing store losing connectivity, not the whole
/// Redis-shaped dependency.
#[derive(Default)]
struct FlakyStore {
    inner: InMemorySharedStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn unavailable(&self) -> CoreError {
        CoreError::DependencyUnavailable {
            dependency: "l2_cache".into(),
            correlation_id: Uuid::new_v4(),
        }
    }
}

#[async_trait]
impl SharedCacheStore for FlakyStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.set(key, value, ttl).await
    }
    async fn del(&self, key: &str) -> CoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.del(key).await
    }
    async fn sadd(&self, set_key: &str, member: &str) -> CoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.sadd(set_key, member).await
    }
    async fn smembers(&self, set_key: &str) -> CoreResult<HashSet<String>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.smembers(set_key).await
    }
    async fn srem(&self, set_key: &str, member: &str) -> CoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        self.inner.srem(set_key, member).await
    }
    async fn stream_append(&self, stream_key: &str, value: Vec<u8>, cap: usize) -> CoreResult<()> {
        self.inner.stream_append(stream_key, value, cap).await
    }
    async fn stream_recent(&self, stream_key: &str, count: usize) -> CoreResult<Vec<Vec<u8>>> {
        self.inner.stream_recent(stream_key, count).await
    }
    async fn zincrby(&self, zset_key: &str, member: &str, delta: i64, ttl: Duration) -> CoreResult<i64> {
        self.inner.zincrby(zset_key, member, delta, ttl).await
    }
}

fn signer() -> Arc<HmacUrlSigner> {
    Arc::new(HmacUrlSigner::new(
        "https://storage.example.com",
        b"scenario-secret".to_vec(),
        SsrfGuard::new(vec!["storage.example.com".to_string()]),
    ))
}

/// Wires an `AuthorizationCore` the way `main.rs` wires the demo binary,
/// over a caller-supplied store and L2 so each scenario can reuse the same
/// generation registry or L2 instance across multiple `authorize()` calls.
fn core_with(
    store: Arc<dyn PersistentStore>,
    l2: Arc<dyn SharedCacheStore>,
    generations: Arc<GenerationRegistry>,
) -> AuthorizationCore {
    let audit_backend = Arc::new(InMemoryAuditBackend::new());
    let audit = Arc::new(AuditPipeline::new(l2.clone(), audit_backend.clone(), audit_backend));
    AuthorizationCore::new(
        Arc::new(CoreConfig::default()),
        store,
        l2,
        generations,
        signer(),
        vec!["storage.example.com".to_string()],
        audit,
    )
}

fn request(
    principal: PrincipalId,
    resource: ResourceRef,
    access: AccessType,
    context: SecurityContext,
) -> AuthorizationRequest {
    AuthorizationRequest::new(principal, resource, ResourceType::Generation, access, context)
}

fn plain_context(ip: &str) -> SecurityContext {
    SecurityContext::new(ip.parse().unwrap(), "integration-suite/1.0")
}

/// Decodes every `AuditEvent` currently sitting in the L2 store's real-time
/// stream, in append order. The audit pipeline's long-term and SIEM sinks
/// have no public read-back API; the capped stream does, via
/// `SharedCacheStore::stream_recent`, matching the encoding
/// `audit/logger.rs` writes with.
async fn recent_audit_events(l2: &InMemorySharedStore, count: usize) -> Vec<velro_core::audit::AuditEvent> {
    l2.stream_recent("audit:stream:realtime", count)
        .await
        .unwrap()
        .iter()
        .map(|raw| bincode::deserialize(raw).expect("audit stream entries must decode as AuditEvent"))
        .collect()
}

/// Scenario 1: a resource's direct owner reads it. Granted on the first
/// call (a fresh resolution), and served from the decision cache on an
/// identical second call.
#[tokio::test]
async fn direct_owner_read_then_cache_hit() {
    let store = Arc::new(ScenarioStore::default());
    let l2 = Arc::new(InMemorySharedStore::new());
    let core = core_with(store, l2, Arc::new(GenerationRegistry::new()));

    let owner = PrincipalId(Uuid::new_v4());
    let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);
    let req = request(owner, resource, AccessType::Read, plain_context("203.0.113.10"));

    let first = core.authorize(req.clone()).await;
    assert!(first.granted);
    assert!(!first.cache_hit);

    let second = core.authorize(req).await;
    assert!(second.granted);
    assert!(second.cache_hit, "an identical second request must resolve from the decision cache");
}

/// Scenario 2: a team editor can write a project's generation but cannot
/// administer it — the team-role ceiling (`Editor`) sits below the role
/// `Admin` access requires, even though the resource itself grants editors
/// write.
#[tokio::test]
async fn team_editor_writes_but_cannot_administer() {
    let store = Arc::new(ScenarioStore::default());
    let owner = PrincipalId(Uuid::new_v4());
    let editor = PrincipalId(Uuid::new_v4());
    let team = TeamId(Uuid::new_v4());
    let project_id = ProjectId(Uuid::new_v4());
    let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner).with_project(project_id);

    store.projects.lock().insert(
        project_id,
        ProjectRecord { id: project_id, owner, visibility: ProjectVisibility::TeamRestricted },
    );
    store.links.lock().insert(project_id, vec![TeamLink { team_id: team, role: Role::Editor }]);
    store.memberships.lock().insert(editor, vec![(team, Role::Editor)]);

    let l2 = Arc::new(InMemorySharedStore::new());
    let core = core_with(store, l2, Arc::new(GenerationRegistry::new()));

    let write = core
        .authorize(request(editor, resource.clone(), AccessType::Write, plain_context("203.0.113.20")))
        .await;
    assert!(write.granted);

    let admin = core
        .authorize(request(editor, resource, AccessType::Admin, plain_context("203.0.113.20")))
        .await;
    assert!(!admin.granted);
    assert_eq!(admin.denial_reason.as_deref(), Some("insufficient_team_permissions"));
}

/// Scenario 3: bumping a principal's generation counter invalidates every
/// decision cached under it, so a request that was granted and cached
/// re-runs the full chain on the very next call instead of replaying the
/// stale decision.
#[tokio::test]
async fn generation_bump_invalidates_the_cached_decision() {
    let store = Arc::new(ScenarioStore::default());
    let l2 = Arc::new(InMemorySharedStore::new());
    let generations = Arc::new(GenerationRegistry::new());
    let core = core_with(store, l2, generations.clone());

    let owner = PrincipalId(Uuid::new_v4());
    let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);
    let req = request(owner, resource, AccessType::Read, plain_context("203.0.113.30"));

    let first = core.authorize(req.clone()).await;
    assert!(first.granted);
    assert!(!first.cache_hit);

    let cached = core.authorize(req.clone()).await;
    assert!(cached.cache_hit);

    generations.bump(owner);

    let after_bump = core.authorize(req).await;
    assert!(after_bump.granted);
    assert!(
        !after_bump.cache_hit,
        "bumping the principal's generation must invalidate its previously cached decisions"
    );
}

/// Scenario 4: a principal logs in from New York, then moments later from
/// Tokyo behind a VPN. Geographic anomaly (0.2) plus VPN/Tor (0.3) weigh in
/// at exactly 0.5, crossing into `Orange` without reaching the `Red`
/// hard-deny threshold or the 0.9 explicit-failure threshold — access is
/// still granted, but the elevated threat level is visible on the response.
#[tokio::test]
async fn impossible_travel_raises_threat_level_but_still_grants() {
    let store = Arc::new(ScenarioStore::default());
    let l2 = Arc::new(InMemorySharedStore::new());
    let core = core_with(store, l2, Arc::new(GenerationRegistry::new()));

    let owner = PrincipalId(Uuid::new_v4());
    let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);

    let mut first_context = plain_context("198.51.100.1");
    first_context.headers.insert("geo-lat".into(), "40.7128".into());
    first_context.headers.insert("geo-lon".into(), "-74.0060".into());
    let first = core
        .authorize(request(owner, resource.clone(), AccessType::Read, first_context))
        .await;
    assert!(first.granted);

    let mut second_context = plain_context("198.51.100.2");
    second_context.headers.insert("anonymized".into(), "true".into());
    second_context.headers.insert("geo-lat".into(), "35.6762".into());
    second_context.headers.insert("geo-lon".into(), "139.6503".into());
    let second = core
        .authorize(request(owner, resource, AccessType::Read, second_context))
        .await;

    assert!(second.granted, "Orange threat level is still below the hard-deny threshold");
    assert_eq!(second.threat_level, velro_core::ThreatLevel::Orange);
}

/// Scenario 5: a request carries an SSRF-guarded URL (the cloud metadata
/// endpoint) in its metadata. Layer 1 rejects it before the access-control
/// resolution ever runs, the denial reason is `input_malformed`, and the
/// audit record is raised to `CRITICAL` regardless of the (still-`Green`)
/// aggregated threat level.
#[tokio::test]
async fn ssrf_attempt_is_denied_with_critical_audit_severity() {
    let store = Arc::new(ScenarioStore::default());
    let l2 = Arc::new(InMemorySharedStore::new());
    let core = core_with(store, l2.clone(), Arc::new(GenerationRegistry::new()));

    let owner = PrincipalId(Uuid::new_v4());
    let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);
    let mut req = request(owner, resource, AccessType::Read, plain_context("203.0.113.40"));
    req.metadata
        .insert("callback_url".into(), "http://169.254.169.254/latest/meta-data/".into());

    let response = core.authorize(req).await;
    assert!(!response.granted);
    assert_eq!(response.denial_reason.as_deref(), Some("input_malformed"));

    let events = recent_audit_events(&l2, 5).await;
    let last = events.last().expect("the denied request must still have produced an audit event");
    assert_eq!(last.severity, Severity::Critical);
}

/// Scenario 6: the decision cache's L2 backing goes unreachable. A decision
/// already resolved while L2 was healthy still serves from L1, and a brand
/// new request that was never cached still runs the full chain and grants
/// — degraded mode narrows the cache to L1 instead of failing the request,
/// and the audit trail records the degradation.
#[tokio::test]
async fn l2_outage_degrades_to_l1_only_without_denying_requests() {
    let store = Arc::new(ScenarioStore::default());
    let l2 = Arc::new(FlakyStore::default());
    let core = core_with(store, l2.clone(), Arc::new(GenerationRegistry::new()));

    let owner = PrincipalId(Uuid::new_v4());
    let cached_resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);
    let fresh_resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);

    let cached_request = request(owner, cached_resource, AccessType::Read, plain_context("203.0.113.50"));
    let warm = core.authorize(cached_request.clone()).await;
    assert!(warm.granted);

    l2.set_down(true);

    let served_from_l1 = core.authorize(cached_request).await;
    assert!(served_from_l1.granted);
    assert!(served_from_l1.cache_hit, "an already-resolved decision must still serve from L1 while L2 is down");

    let fresh_request = request(owner, fresh_resource, AccessType::Read, plain_context("203.0.113.51"));
    let fresh_response = core.authorize(fresh_request).await;
    assert!(fresh_response.granted, "an uncached request must still run the full chain and grant");
    assert!(!fresh_response.cache_hit);

    let events = recent_audit_events(&l2.inner, 10).await;
    let last = events.last().expect("the fresh request must have produced an audit event");
    assert_eq!(
        last.security_context_summary.get("cache_degraded").map(String::as_str),
        Some("true"),
        "audit must record that the decision was made with the cache in degraded mode"
    );
}
