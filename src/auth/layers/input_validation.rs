//! Layer 1: input validation. Strict identifier shape,
//! length bounds on free-form metadata, and a scan for injection and SSRF
//! payloads using the same pattern-matching-rule shape as
//! [`crate::external::ssrf`].

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::config::ValidationLimits;
use crate::domain::authorization::{AuthorizationRequest, LayerResult, LayerType};
use crate::error::CoreError;
use crate::external::ssrf::SsrfGuard;

static SQL_INJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bunion\s+select\b|\bor\s+1\s*=\s*1\b|;\s*drop\s+table\b|--\s*$)").unwrap()
});
static XSS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(<script|javascript:|onerror\s*=|onload\s*=)").unwrap());
static PATH_TRAVERSAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\./|\.\.\\").unwrap());
static COMMAND_INJECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[;&|`$]\s*(rm|curl|wget|nc|bash|sh)\b").unwrap());

fn scan_for_injection(value: &str) -> Option<&'static str> {
    if SQL_INJECTION_RE.is_match(value) {
        Some("sql_injection")
    } else if XSS_RE.is_match(value) {
        Some("xss")
    } else if PATH_TRAVERSAL_RE.is_match(value) {
        Some("path_traversal")
    } else if COMMAND_INJECTION_RE.is_match(value) {
        Some("command_injection")
    } else {
        None
    }
}

/// Runs layer 1 over `request`'s metadata map, optionally SSRF-scanning any
/// value that parses as an `http(s)` URL.
pub fn run(
    request: &AuthorizationRequest,
    limits: &ValidationLimits,
    ssrf_guard: &SsrfGuard,
) -> LayerResult {
    let started = Instant::now();
    let correlation_id = uuid::Uuid::new_v4();

    for (key, value) in &request.metadata {
        if key.len() > limits.max_string_length || value.len() > limits.max_string_length {
            return LayerResult::failed(
                LayerType::InputValidation,
                started.elapsed(),
                CoreError::InputMalformed {
                    detail: format!("metadata field '{key}' exceeds max length"),
                    correlation_id,
                    repeated_offense: false,
                },
            );
        }

        if let Some(kind) = scan_for_injection(value) {
            return LayerResult::failed(
                LayerType::InputValidation,
                started.elapsed(),
                CoreError::InputMalformed {
                    detail: format!("{kind} pattern detected in '{key}'"),
                    correlation_id,
                    repeated_offense: false,
                },
            )
            .with_anomaly(format!("injection_attempt:{kind}"));
        }

        if let Ok(url) = Url::parse(value) {
            if matches!(url.scheme(), "http" | "https") {
                if let Err(violation) = ssrf_guard.check_url(&url) {
                    return LayerResult::failed(
                        LayerType::InputValidation,
                        started.elapsed(),
                        CoreError::InputMalformed {
                            detail: format!("ssrf-guarded url rejected: {violation:?}"),
                            correlation_id,
                            repeated_offense: false,
                        },
                    )
                    .with_anomaly("ssrf_attempt");
                }
            }
        }
    }

    if request.metadata.len() > limits.max_array_length {
        return LayerResult::failed(
            LayerType::InputValidation,
            started.elapsed(),
            CoreError::InputMalformed {
                detail: "metadata map exceeds max entry count".into(),
                correlation_id,
                repeated_offense: false,
            },
        );
    }

    LayerResult::ok(LayerType::InputValidation, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::AccessType;
    use crate::domain::principal::PrincipalId;
    use crate::domain::resource::{ResourceId, ResourceRef, ResourceType};
    use crate::domain::security_context::SecurityContext;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn base_request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            PrincipalId(Uuid::new_v4()),
            ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, PrincipalId(Uuid::new_v4())),
            ResourceType::Generation,
            AccessType::Read,
            SecurityContext::new("127.0.0.1".parse().unwrap(), "test"),
        )
    }

    #[test]
    fn clean_metadata_passes() {
        let request = base_request();
        let result = run(&request, &ValidationLimits::default(), &SsrfGuard::new(Vec::<String>::new()));
        assert!(result.success);
    }

    #[test]
    fn sql_injection_is_rejected() {
        let mut request = base_request();
        request.metadata.insert("note".into(), "1 OR 1=1".into());
        let result = run(&request, &ValidationLimits::default(), &SsrfGuard::new(Vec::<String>::new()));
        assert!(!result.success);
    }

    #[test]
    fn ssrf_url_in_metadata_is_rejected() {
        let mut request = base_request();
        request
            .metadata
            .insert("webhook_url".into(), "http://169.254.169.254/latest/meta-data".into());
        let result = run(&request, &ValidationLimits::default(), &SsrfGuard::new(vec!["example.com".to_string()]));
        assert!(!result.success);
        assert!(result.anomalies.iter().any(|a| a == "ssrf_attempt"));
    }

    #[test]
    fn oversized_value_is_rejected() {
        let mut request = base_request();
        request.metadata.insert("note".into(), "x".repeat(20_000));
        let result = run(&request, &ValidationLimits::default(), &SsrfGuard::new(Vec::<String>::new()));
        assert!(!result.success);
    }
}
