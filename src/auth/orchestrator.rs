//! Drives the ten ordered authorization layers into a single
//! [`AuthorizationResponse`], running each in sequence and failing fast
//! on the first hard denial.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheEngine, GenerationRegistry, KeyKind, Tags};
use crate::config::{CoreConfig, Volatility};
use crate::domain::authorization::{
    AuthorizationMethod, AuthorizationRequest, AuthorizationResponse, LayerResult, LayerType, MediaGrant,
    ThreatLevel,
};
use crate::domain::resource::ResourceId;
use crate::domain::role::Role;
use crate::error::{CoreError, DenialReason};
use crate::external::cache_store::SharedCacheStore;
use crate::external::signer::StorageSigner;
use crate::external::ssrf::SsrfGuard;
use crate::external::store::PersistentStore;
use crate::audit::{AuditPipeline, CorrelationEngine};
use crate::ratelimit::FixedWindowLimiter;

use super::layers::{
    access_control, anomaly_correlation, audit_emission, context_validation::ContextValidator, inheritance_depth,
    input_validation, media_grant, rate_limit, recovery, team_inheritance,
};

/// The cached shape of a resolved decision, keyed so
/// a principal's generation bump invalidates it automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDecision {
    pub granted: bool,
    pub method: Option<AuthorizationMethod>,
    pub effective_role: Option<Role>,
    pub denial_reason: Option<DenialReason>,
    pub media_grant: Option<MediaGrant>,
}

/// Identity hash of the inputs that determine a decision, folded into a
/// synthetic [`ResourceId`] so the existing `resolve_key`/generation-counter
/// machinery applies to decisions without widening [`CacheEngine`]'s API
///.
fn decision_resource_id(resource: ResourceId, access: crate::domain::access::AccessType, context_hash: u64) -> ResourceId {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    resource.0.hash(&mut hasher);
    access.hash(&mut hasher);
    context_hash.hash(&mut hasher);
    let h = hasher.finish();
    ResourceId(Uuid::from_u64_pair(h, h))
}

pub struct AuthorizationCore {
    config: Arc<CoreConfig>,
    store: Arc<dyn PersistentStore>,
    decision_cache: CacheEngine<CachedDecision>,
    limiter: FixedWindowLimiter,
    context_validator: ContextValidator,
    signer: Arc<dyn StorageSigner>,
    ssrf_guard: SsrfGuard,
    audit: Arc<AuditPipeline>,
    correlation: CorrelationEngine,
}

impl AuthorizationCore {
    pub fn new(
        config: Arc<CoreConfig>,
        store: Arc<dyn PersistentStore>,
        l2: Arc<dyn SharedCacheStore>,
        generations: Arc<GenerationRegistry>,
        signer: Arc<dyn StorageSigner>,
        ssrf_allow_list: Vec<String>,
        audit: Arc<AuditPipeline>,
    ) -> Self {
        Self {
            decision_cache: CacheEngine::new(config.clone(), l2.clone(), generations),
            limiter: FixedWindowLimiter::new(l2),
            context_validator: ContextValidator::new(),
            ssrf_guard: SsrfGuard::new(ssrf_allow_list),
            correlation: CorrelationEngine::new(),
            config,
            store,
            signer,
            audit,
        }
    }

    /// Runs the ordered chain for a single request,
    /// bounded by the configured chain deadline. A deadline overrun is
    /// treated the same as any other unexpected failure of a required
    /// layer: it falls through to emergency recovery rather than hanging.
    pub async fn authorize(&self, mut request: AuthorizationRequest) -> AuthorizationResponse {
        let total_started = Instant::now();
        let correlation_id = Uuid::new_v4();

        let outcome = tokio::time::timeout(
            self.config.chain_deadline,
            self.run_chain(&mut request, correlation_id),
        )
        .await;

        let (layer_results, threat_level, decision, cache_hit) = match outcome {
            Ok(result) => result,
            Err(_) => {
                let err = CoreError::DependencyUnavailable {
                    dependency: "authorization_chain".into(),
                    correlation_id,
                };
                let (recovery_result, recovery_outcome) =
                    recovery::run(&request, correlation_id, &err, &self.audit, &*self.store).await;
                (
                    vec![recovery_result],
                    ThreatLevel::Red,
                    CachedDecision {
                        granted: recovery_outcome.granted,
                        method: recovery_outcome.method,
                        effective_role: None,
                        denial_reason: (!recovery_outcome.granted).then_some(DenialReason::NotOwner),
                        media_grant: None,
                    },
                    false,
                )
            }
        };

        request.security_context.push_history(crate::domain::security_context::RequestSummary {
            timestamp: chrono::Utc::now(),
            ip: request.security_context.client_ip,
            endpoint_category: request.access.as_str().to_string(),
            granted: decision.granted,
        });

        AuthorizationResponse {
            granted: decision.granted,
            threat_level,
            layer_results,
            execution_time: total_started.elapsed(),
            media_grant: decision.media_grant,
            audit_correlation_id: correlation_id,
            cache_hit,
            system_used: "authorization_core",
            access_method: decision.method,
            denial_reason: decision.denial_reason.map(|r| r.to_string()),
        }
    }

    /// The Pipeline Gate's stripped chain for fast-lane requests: input validation, the access-control resolution itself, and
    /// required audit emission — no context scoring, no team/inheritance
    /// reporting, no media grants, no anomaly correlation. Rate limiting is
    /// the Gate's responsibility before this is ever called.
    ///
    /// Never grants `AccessType::Admin`, regardless of the principal's
    /// underlying role — the reduced chain never issues admin grants,
    /// enforced unconditionally here rather than left to the resolution
    /// engine.
    pub async fn authorize_fast_lane(&self, request: AuthorizationRequest) -> AuthorizationResponse {
        let started = Instant::now();
        let correlation_id = Uuid::new_v4();
        let mut results = Vec::new();

        let input_result = input_validation::run(&request, &self.config.validation, &self.ssrf_guard);
        let input_ok = input_result.success;
        results.push(input_result);

        if !input_ok {
            return self.finish_fast_lane(request, correlation_id, started, results, false, None, None).await;
        }

        if request.access == crate::domain::access::AccessType::Admin {
            results.push(
                LayerResult::ok(LayerType::AccessControl, std::time::Duration::from_micros(1))
                    .with_cache_hit(false)
                    .with_metadata("fast_lane_admin_denied", "true"),
            );
            return self
                .finish_fast_lane(
                    request,
                    correlation_id,
                    started,
                    results,
                    false,
                    None,
                    Some(DenialReason::InsufficientTeamPermissions),
                )
                .await;
        }

        let (access_result, trace) = access_control::run(&request, &self.config, &*self.store).await;
        let granted = access_result.success;
        let method = trace.method;
        let denial_reason = trace.denial_reason;
        results.push(access_result);

        self.finish_fast_lane(request, correlation_id, started, results, granted, method, denial_reason)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_fast_lane(
        &self,
        request: AuthorizationRequest,
        correlation_id: Uuid,
        started: Instant,
        mut results: Vec<LayerResult>,
        granted: bool,
        method: Option<AuthorizationMethod>,
        denial_reason: Option<DenialReason>,
    ) -> AuthorizationResponse {
        let threat_level = if granted { ThreatLevel::Green } else { ThreatLevel::Yellow };
        let audit_result = audit_emission::run(
            &request,
            correlation_id,
            granted,
            threat_level,
            results.clone(),
            &self.audit,
            false,
        )
        .await;
        results.push(audit_result);

        AuthorizationResponse {
            granted,
            threat_level,
            layer_results: results,
            execution_time: started.elapsed(),
            media_grant: None,
            audit_correlation_id: correlation_id,
            cache_hit: false,
            system_used: "fast_lane",
            access_method: method,
            denial_reason: denial_reason.map(|r| r.to_string()),
        }
    }

    async fn run_chain(
        &self,
        request: &mut AuthorizationRequest,
        correlation_id: Uuid,
    ) -> (Vec<LayerResult>, ThreatLevel, CachedDecision, bool) {
        let mut results = Vec::new();
        let mut threat_level = ThreatLevel::Green;

        let input_result = input_validation::run(request, &self.config.validation, &self.ssrf_guard);
        let input_ok = input_result.success;
        results.push(input_result);
        if !input_ok {
            return self
                .deny_and_close(request, correlation_id, results, threat_level, DenialReason::InputMalformed)
                .await;
        }

        let rate_result = rate_limit::run(request, &self.config.rate_limits, &self.limiter).await;
        let rate_ok = rate_result.success;
        results.push(rate_result);
        if !rate_ok {
            return self
                .deny_and_close(request, correlation_id, results, threat_level, DenialReason::RateLimited)
                .await;
        }

        let context_result = self.context_validator.run(request);
        threat_level = threat_level.max(context_result.threat_level);
        if !context_result.success {
            threat_level = threat_level.escalate_one_step();
        }
        results.push(context_result);

        let context_hash = request.security_context.decision_hash();
        let synthetic_id = decision_resource_id(request.resource.id, request.access, context_hash);
        let resolution_results: Arc<Mutex<Vec<LayerResult>>> = Arc::new(Mutex::new(Vec::new()));
        let key = self
            .decision_cache
            .resolve_key(request.principal, KeyKind::Resource, synthetic_id, request.access);

        let mut tags = HashSet::new();
        tags.insert(Tags::user(request.principal));
        tags.insert(Tags::resource(request.resource.id));
        if let Some(project) = request.resource.project_id {
            tags.insert(Tags::project(project));
        }

        let captured = resolution_results.clone();
        let populate_request = request.clone();
        let config = self.config.clone();
        let store = self.store.clone();
        let signer = self.signer.clone();
        let decision = self
            .decision_cache
            .get_or_populate(&key, request.principal, synthetic_id, Volatility::High, tags, move || {
                let captured = captured.clone();
                let request = populate_request.clone();
                let config = config.clone();
                let store = store.clone();
                let signer = signer.clone();
                async move {
                    let (access_result, trace) = access_control::run(&request, &config, &*store).await;
                    let team_result = team_inheritance::run(&trace);
                    let depth_result = inheritance_depth::run(&trace, &config);
                    let (media_result, media_grant) =
                        media_grant::run(&request, &trace, &config, &*signer).await;

                    let mut batch = captured.lock();
                    batch.push(access_result.clone());
                    batch.push(team_result.clone());
                    batch.push(depth_result.clone());
                    batch.push(media_result.clone());
                    drop(batch);

                    Ok(CachedDecision {
                        granted: access_result.success && depth_result.success,
                        method: trace.method,
                        effective_role: trace.effective_role,
                        denial_reason: trace.denial_reason,
                        media_grant,
                    })
                }
            })
            .await;

        let decision = match decision {
            Ok(d) => d,
            Err(_) => CachedDecision {
                granted: false,
                method: None,
                effective_role: None,
                denial_reason: Some(DenialReason::NotOwner),
                media_grant: None,
            },
        };

        let ran_fresh = !resolution_results.lock().is_empty();
        let cache_hit = !ran_fresh;
        if ran_fresh {
            results.extend(resolution_results.lock().drain(..));
        } else {
            for layer in [
                LayerType::AccessControl,
                LayerType::TeamRoleInheritance,
                LayerType::InheritanceDepthGuard,
                LayerType::MediaAccessAuthorization,
            ] {
                let mut r = LayerResult::ok(layer, std::time::Duration::from_micros(1)).with_cache_hit(true);
                if !decision.granted && layer == LayerType::AccessControl {
                    r.success = false;
                }
                results.push(r);
            }
        }

        let audit_result = audit_emission::run(
            request,
            correlation_id,
            decision.granted,
            threat_level,
            results.clone(),
            &self.audit,
            self.decision_cache.metrics().is_l2_degraded(),
        )
        .await;
        results.push(audit_result);

        let correlation_result = anomaly_correlation::run(&self.audit, &self.correlation).await;
        if !correlation_result.anomalies.is_empty() {
            threat_level = threat_level.escalate_one_step();
        }
        results.push(correlation_result);

        // Deny by default: the response is granted only if the resolved
        // access decision succeeded AND the final aggregated threat level
        // stays below RED, per the orchestrator's hard invariant.
        let mut decision = decision;
        if threat_level >= ThreatLevel::Red {
            decision.granted = false;
        }

        (results, threat_level, decision, cache_hit)
    }

    async fn deny_and_close(
        &self,
        request: &AuthorizationRequest,
        correlation_id: Uuid,
        mut results: Vec<LayerResult>,
        threat_level: ThreatLevel,
        reason: DenialReason,
    ) -> (Vec<LayerResult>, ThreatLevel, CachedDecision, bool) {
        let audit_result = audit_emission::run(
            request,
            correlation_id,
            false,
            threat_level,
            results.clone(),
            &self.audit,
            false,
        )
        .await;
        results.push(audit_result);

        (
            results,
            threat_level,
            CachedDecision {
                granted: false,
                method: None,
                effective_role: None,
                denial_reason: Some(reason),
                media_grant: None,
            },
            false,
        )
    }
}
