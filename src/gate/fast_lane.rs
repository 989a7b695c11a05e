//! Fast-lane path classification. Grounded on the
//! teacher's `api/middleware.rs` `AuthConfig::is_excluded` prefix-match
//! exclusion list, generalized from a single bypass set into the
//! fast-lane/standard split the Pipeline Gate requires.
//!
//! Classification is conservative by construction: the fast lane is a
//! fixed, explicitly-configured prefix list (authentication endpoints,
//! health, metrics, the e2e test harness) and nothing else ever matches
//! it. There is no wildcard or regex form, precisely so a mutation
//! endpoint can never land in the fast lane by accident.

/// Path prefixes that must never appear in a fast-lane configuration.
/// `FastLaneClassifier::new` strips them defensively — a misconfigured
/// deployment should degrade to "slower but safe", not the reverse.
const NEVER_FAST_LANE: &[&str] = &["/api/generations", "/api/projects", "/api/admin", "/api/teams"];

/// Classifies a request path as fast-lane or standard.
pub struct FastLaneClassifier {
    prefixes: Vec<String>,
}

impl FastLaneClassifier {
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .filter(|p| !NEVER_FAST_LANE.iter().any(|blocked| p.starts_with(blocked)))
            .collect();
        Self { prefixes }
    }

    pub fn is_fast_lane(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_configured_prefixes() {
        let classifier = FastLaneClassifier::new(vec!["/health".into(), "/api/auth".into()]);
        assert!(classifier.is_fast_lane("/health"));
        assert!(classifier.is_fast_lane("/health/live"));
        assert!(classifier.is_fast_lane("/api/auth/login"));
        assert!(!classifier.is_fast_lane("/api/generations/123"));
    }

    #[test]
    fn never_admits_mutation_endpoints_even_if_misconfigured() {
        let classifier = FastLaneClassifier::new(vec!["/api/generations".into(), "/api/admin".into()]);
        assert!(!classifier.is_fast_lane("/api/generations/123"));
        assert!(!classifier.is_fast_lane("/api/admin/users"));
    }
}
