//! Identity provider interface. The core never mints
//! tokens; it only validates them and caches the result for
//! `min(token_exp, configured_ttl)`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::principal::PrincipalId;
use crate::error::CoreResult;

/// Claims carried by a validated token, beyond the bare principal id.
#[derive(Debug, Clone)]
pub struct Claims {
    pub principal: PrincipalId,
    pub attributes: HashMap<String, String>,
}

/// `Validate(token) -> (principal_id, claims, expiry)` per `spec.md` §6.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn validate(&self, token: &str) -> CoreResult<(PrincipalId, Claims, DateTime<Utc>)>;
}

/// Wraps an [`IdentityProvider`] with a TTL-bounded validation cache, so
/// repeated requests bearing the same bearer token within a short window
/// don't re-hit the external provider. The cache TTL is
/// `min(token_exp - now, configured_ttl)`, as specified.
pub struct CachedIdentityProvider<P: IdentityProvider> {
    inner: P,
    configured_ttl: Duration,
    cache: dashmap::DashMap<String, CachedValidation>,
}

struct CachedValidation {
    principal: PrincipalId,
    claims: Claims,
    expiry: DateTime<Utc>,
    cached_until: DateTime<Utc>,
}

impl<P: IdentityProvider> CachedIdentityProvider<P> {
    pub fn new(inner: P, configured_ttl: Duration) -> Self {
        Self {
            inner,
            configured_ttl,
            cache: dashmap::DashMap::new(),
        }
    }

    pub async fn validate(&self, token: &str) -> CoreResult<(PrincipalId, Claims, DateTime<Utc>)> {
        let now = Utc::now();
        if let Some(entry) = self.cache.get(token) {
            if entry.cached_until > now {
                return Ok((entry.principal, entry.claims.clone(), entry.expiry));
            }
        }

        let (principal, claims, expiry) = self.inner.validate(token).await?;
        let ttl = self.configured_ttl.min(
            (expiry - now)
                .to_std()
                .unwrap_or(Duration::from_secs(0)),
        );
        let cached_until = now + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.cache.insert(
            token.to_string(),
            CachedValidation {
                principal,
                claims: claims.clone(),
                expiry,
                cached_until,
            },
        );
        Ok((principal, claims, expiry))
    }
}
