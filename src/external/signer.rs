//! External storage URL signer: `Sign(resource_ref,
//! operation, ttl) -> signed_url`, SSRF-guarded at the call site.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::access::AccessType;
use crate::domain::resource::ResourceId;
use crate::error::CoreResult;
use crate::external::ssrf::SsrfGuard;

#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait StorageSigner: Send + Sync {
    async fn sign(
        &self,
        resource: ResourceId,
        operation: AccessType,
        ttl: Duration,
    ) -> CoreResult<SignedUrl>;
}

/// HMAC-SHA256 query-string signer over a fixed base URL, guarded by an
/// [`SsrfGuard`] so a misconfigured base URL can never point at a
/// non-allow-listed or private host.
pub struct HmacUrlSigner {
    base_url: String,
    secret: Vec<u8>,
    guard: SsrfGuard,
}

impl HmacUrlSigner {
    pub fn new(base_url: impl Into<String>, secret: impl Into<Vec<u8>>, guard: SsrfGuard) -> Self {
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
            guard,
        }
    }
}

#[async_trait]
impl StorageSigner for HmacUrlSigner {
    async fn sign(
        &self,
        resource: ResourceId,
        operation: AccessType,
        ttl: Duration,
    ) -> CoreResult<SignedUrl> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let payload = format!(
            "{}/{}/{}",
            resource,
            operation.as_str(),
            expires_at.timestamp()
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|_| crate::error::CoreError::internal(uuid::Uuid::new_v4()))?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let url = format!(
            "{}/{}?op={}&exp={}&sig={}",
            self.base_url,
            resource,
            operation.as_str(),
            expires_at.timestamp(),
            signature
        );

        let parsed = reqwest::Url::parse(&url)
            .map_err(|_| crate::error::CoreError::internal(uuid::Uuid::new_v4()))?;
        self.guard.check_url(&parsed).map_err(|_| {
            crate::error::CoreError::InternalError {
                correlation_id: uuid::Uuid::new_v4(),
            }
        })?;

        Ok(SignedUrl { url, expires_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new(
            "https://storage.example.com/sign",
            b"test-secret".to_vec(),
            SsrfGuard::new(vec!["storage.example.com".to_string()]),
        )
    }

    #[tokio::test]
    async fn sign_produces_a_signature_bound_url() {
        let signer = signer();
        let signed = signer
            .sign(
                ResourceId(Uuid::new_v4()),
                AccessType::Read,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(signed.url.contains("sig="));
        assert!(signed.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn disallowed_base_url_is_rejected() {
        let signer = HmacUrlSigner::new(
            "http://169.254.169.254/sign",
            b"secret".to_vec(),
            SsrfGuard::new(vec!["storage.example.com".to_string()]),
        );
        let result = signer
            .sign(ResourceId(Uuid::new_v4()), AccessType::Read, Duration::from_secs(60))
            .await;
        assert!(result.is_err());
    }
}
