//! Layer 2: rate limiting. Delegates to
//! [`crate::ratelimit::FixedWindowLimiter`], choosing the per-category
//! limit (`auth`, `sensitive`, `upload`, `generation`) when the access type
//! implies one, and falling back to `per_principal`/`per_ip` otherwise.

use std::time::Instant;

use crate::config::RateLimitConfig;
use crate::domain::access::AccessType;
use crate::domain::authorization::{AuthorizationRequest, LayerResult, LayerType};
use crate::error::CoreError;
use crate::ratelimit::{threat_multiplier, FixedWindowLimiter};

fn scope_and_limit(access: AccessType, limits: &RateLimitConfig) -> (&'static str, crate::config::RateLimit) {
    match access {
        AccessType::Delete | AccessType::Admin => ("sensitive", limits.sensitive),
        AccessType::Write => ("generation", limits.generation),
        AccessType::Share | AccessType::Read => ("per_principal", limits.per_principal),
    }
}

pub async fn run(
    request: &AuthorizationRequest,
    limits: &RateLimitConfig,
    limiter: &FixedWindowLimiter,
) -> LayerResult {
    let started = Instant::now();
    let multiplier = threat_multiplier(request.security_context.risk_score);
    let (scope, limit) = scope_and_limit(request.access, limits);
    let identifier = request.principal.to_string();

    let principal_decision = match limiter.check(scope, &identifier, limit, multiplier).await {
        Ok(d) => d,
        Err(err) => return LayerResult::ok(LayerType::RateLimiting, started.elapsed()).with_anomaly(format!("rate_limit_check_failed:{err}")),
    };

    let ip_identifier = request.security_context.client_ip.to_string();
    let ip_decision = match limiter.check("per_ip", &ip_identifier, limits.per_ip, multiplier).await {
        Ok(d) => d,
        Err(_) => return LayerResult::ok(LayerType::RateLimiting, started.elapsed()),
    };

    if !principal_decision.is_allowed() || !ip_decision.is_allowed() {
        let retry_after_secs = match (principal_decision, ip_decision) {
            (crate::ratelimit::Decision::Denied { retry_after_secs, .. }, _) => retry_after_secs,
            (_, crate::ratelimit::Decision::Denied { retry_after_secs, .. }) => retry_after_secs,
            _ => 0,
        };
        return LayerResult::failed(
            LayerType::RateLimiting,
            started.elapsed(),
            CoreError::RateLimited {
                retry_after_secs,
                correlation_id: uuid::Uuid::new_v4(),
            },
        );
    }

    LayerResult::ok(LayerType::RateLimiting, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::principal::PrincipalId;
    use crate::domain::resource::{ResourceId, ResourceRef, ResourceType};
    use crate::domain::security_context::SecurityContext;
    use crate::external::cache_store::InMemorySharedStore;
    use std::sync::Arc;
    use uuid::Uuid;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            PrincipalId(Uuid::new_v4()),
            ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, PrincipalId(Uuid::new_v4())),
            ResourceType::Generation,
            AccessType::Read,
            SecurityContext::new("10.0.0.1".parse().unwrap(), "test"),
        )
    }

    #[tokio::test]
    async fn within_limit_succeeds() {
        let limiter = FixedWindowLimiter::new(Arc::new(InMemorySharedStore::new()));
        let result = run(&request(), &RateLimitConfig::default(), &limiter).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn exceeding_limit_denies() {
        let limiter = FixedWindowLimiter::new(Arc::new(InMemorySharedStore::new()));
        let mut limits = RateLimitConfig::default();
        limits.per_principal = crate::config::RateLimit::new(1, 60);
        let req = request();
        assert!(run(&req, &limits, &limiter).await.success);
        assert!(!run(&req, &limits, &limiter).await.success);
    }
}
