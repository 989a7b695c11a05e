//! Layer 7: media access authorization. Required layer —
//! when a caller asks for a signed media grant on an already-granted
//! request, failing to sign one denies the whole request rather than
//! silently degrading to an unsigned response.

use std::time::Instant;

use crate::config::CoreConfig;
use crate::domain::access::AccessType;
use crate::domain::authorization::{AuthorizationRequest, LayerResult, LayerType, MediaGrant};
use crate::error::CoreError;
use crate::external::signer::StorageSigner;

use super::AccessTrace;

/// Operations the grant permits, derived from the access actually
/// requested — `read` is always included since any grant implies the
/// caller may fetch the underlying bytes.
fn permitted_operations(access: AccessType) -> Vec<AccessType> {
    if access == AccessType::Read {
        vec![AccessType::Read]
    } else {
        vec![AccessType::Read, access]
    }
}

pub async fn run(
    request: &AuthorizationRequest,
    trace: &AccessTrace,
    config: &CoreConfig,
    signer: &dyn StorageSigner,
) -> (LayerResult, Option<MediaGrant>) {
    let started = Instant::now();

    if !request.media_grant_requested || !trace.granted {
        return (LayerResult::ok(LayerType::MediaAccessAuthorization, started.elapsed()), None);
    }

    let ttl = request
        .media_grant_expires_in
        .unwrap_or(config.media_grant_default_ttl);
    let operations = permitted_operations(request.access);

    let mut signed_urls = Vec::with_capacity(operations.len());
    for op in &operations {
        match signer.sign(request.resource.id, *op, ttl).await {
            Ok(signed) => signed_urls.push(signed.url),
            Err(err) => {
                return (
                    LayerResult::failed(LayerType::MediaAccessAuthorization, started.elapsed(), err),
                    None,
                )
            }
        }
    }

    let expires_at = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
    let grant = MediaGrant {
        grant_id: uuid::Uuid::new_v4(),
        principal: request.principal,
        resource: request.resource.id,
        operations,
        expires_at,
        signed_urls,
    };

    (LayerResult::ok(LayerType::MediaAccessAuthorization, started.elapsed()), Some(grant))
}
