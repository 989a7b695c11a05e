//! Layer 3: security context validation, advisory — a
//! failure here escalates the aggregated threat level by one step rather
//! than denying. The weighted risk score combines five signals: IP
//! reputation (0.3), geographic anomaly (0.2), user-agent analysis (0.2),
//! behavioral pattern (0.2), threat intel (0.1).

use std::time::Instant;

use dashmap::DashMap;

use crate::domain::authorization::{AuthorizationRequest, LayerResult, LayerType, ThreatLevel};
use crate::domain::principal::PrincipalId;
use crate::domain::security_context::{GeoInfo, SecurityFlag, UserAgentInfo};
use crate::error::CoreError;

/// Prior request's coordinates and observation time, kept per principal so
/// an impossible-travel check has something to compare against. Lives
/// outside `SecurityContext` so a stateless per-request struct doesn't need
/// to carry cross-request memory of its own.
struct LastSeen {
    lat: f64,
    lon: f64,
    at: chrono::DateTime<chrono::Utc>,
}

/// Speed, in km/h, above which two consecutive logins from different
/// coordinates are treated as impossible to have traveled between.
const IMPOSSIBLE_TRAVEL_KMH: f64 = 900.0;

pub struct ContextValidator {
    geo_history: DashMap<PrincipalId, LastSeen>,
}

impl ContextValidator {
    pub fn new() -> Self {
        Self {
            geo_history: DashMap::new(),
        }
    }

    pub fn run(&self, request: &mut AuthorizationRequest) -> LayerResult {
        let started = Instant::now();
        let ctx = &mut request.security_context;

        let ua_lower = ctx.user_agent.to_lowercase();
        let is_bot = ["bot", "crawler", "spider", "curl/", "python-requests"]
            .iter()
            .any(|needle| ua_lower.contains(needle));
        ctx.user_agent_info = Some(UserAgentInfo {
            raw: ctx.user_agent.clone(),
            is_bot,
            is_known_client: !is_bot,
        });
        if is_bot {
            ctx.add_flag(SecurityFlag::BotUserAgent);
        }

        let is_anonymized = ctx
            .headers
            .get("anonymized")
            .map(|v| v == "true")
            .unwrap_or(false);
        if is_anonymized {
            ctx.add_flag(SecurityFlag::VpnOrTor);
        }

        let geo_anomaly = self.check_geography(request.principal, &mut request.security_context);

        let distinct_ips = request
            .security_context
            .history
            .iter()
            .map(|h| h.ip)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let rapid_ip_churn = distinct_ips >= 4 && request.security_context.history.len() <= 6;
        if rapid_ip_churn {
            request.security_context.add_flag(SecurityFlag::RapidIpChurn);
        }

        let periodic_timing = is_periodic(&request.security_context.history);
        if periodic_timing {
            request
                .security_context
                .add_flag(SecurityFlag::PeriodicRequestTiming);
        }

        let admin_ratio = admin_request_ratio(&request.security_context.history);
        let excessive_admin = admin_ratio > 0.5;
        if excessive_admin {
            request
                .security_context
                .add_flag(SecurityFlag::ExcessiveAdminRatio);
        }

        let ip_reputation_score = if is_anonymized { 1.0 } else { 0.0 };
        let geo_score = if geo_anomaly { 1.0 } else { 0.0 };
        let ua_score = if is_bot { 1.0 } else { 0.0 };
        let behavioral_score = [rapid_ip_churn, periodic_timing, excessive_admin]
            .iter()
            .filter(|f| **f)
            .count() as f64
            / 3.0;
        let threat_intel_score = 0.0;

        let risk_score = 0.3 * ip_reputation_score
            + 0.2 * geo_score
            + 0.2 * ua_score
            + 0.2 * behavioral_score
            + 0.1 * threat_intel_score;
        request.security_context.risk_score = risk_score;

        let threat_level = if risk_score >= 0.8 {
            ThreatLevel::Red
        } else if risk_score >= 0.5 {
            ThreatLevel::Orange
        } else if risk_score >= 0.2 {
            ThreatLevel::Yellow
        } else {
            ThreatLevel::Green
        };

        if risk_score >= 0.9 {
            return LayerResult::failed(
                LayerType::SecurityContextValidation,
                started.elapsed(),
                CoreError::ContextSuspicious {
                    threat_level,
                    correlation_id: uuid::Uuid::new_v4(),
                },
            )
            .with_threat_level(threat_level);
        }

        LayerResult::ok(LayerType::SecurityContextValidation, started.elapsed())
            .with_threat_level(threat_level)
    }

    /// Updates the principal's last-known location and flags impossible
    /// travel if a new one is present in the request headers and implies a
    /// speed beyond [`IMPOSSIBLE_TRAVEL_KMH`].
    fn check_geography(&self, principal: PrincipalId, ctx: &mut crate::domain::security_context::SecurityContext) -> bool {
        let (Some(lat), Some(lon)) = (
            ctx.headers.get("geo-lat").and_then(|v| v.parse::<f64>().ok()),
            ctx.headers.get("geo-lon").and_then(|v| v.parse::<f64>().ok()),
        ) else {
            return false;
        };

        ctx.geo = Some(GeoInfo {
            country: ctx.headers.get("geo-country").cloned(),
            latitude: Some(lat),
            longitude: Some(lon),
            is_vpn_or_tor: ctx.flags.contains(&SecurityFlag::VpnOrTor),
        });

        let now = ctx.timestamp;
        let anomaly = if let Some(prev) = self.geo_history.get(&principal) {
            let hours = (now - prev.at).num_seconds().max(1) as f64 / 3600.0;
            let km = haversine_km(prev.lat, prev.lon, lat, lon);
            km / hours > IMPOSSIBLE_TRAVEL_KMH
        } else {
            false
        };

        if anomaly {
            ctx.add_flag(SecurityFlag::ImpossibleTravel);
            ctx.add_flag(SecurityFlag::GeographicAnomaly);
        }

        self.geo_history.insert(principal, LastSeen { lat, lon, at: now });
        anomaly
    }
}

impl Default for ContextValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lon1, lat2, lon2) = (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

fn is_periodic(history: &std::collections::VecDeque<crate::domain::security_context::RequestSummary>) -> bool {
    if history.len() < 4 {
        return false;
    }
    let intervals: Vec<i64> = history
        .iter()
        .zip(history.iter().skip(1))
        .map(|(a, b)| (b.timestamp - a.timestamp).num_seconds().abs())
        .collect();
    let Some(&first) = intervals.first() else { return false };
    if first == 0 {
        return false;
    }
    intervals.iter().all(|i| (*i - first).abs() <= 2)
}

fn admin_request_ratio(history: &std::collections::VecDeque<crate::domain::security_context::RequestSummary>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let admin = history.iter().filter(|h| h.endpoint_category == "admin").count();
    admin as f64 / history.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::AccessType;
    use crate::domain::principal::PrincipalId;
    use crate::domain::resource::{ResourceId, ResourceRef, ResourceType};
    use crate::domain::security_context::SecurityContext;
    use uuid::Uuid;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            PrincipalId(Uuid::new_v4()),
            ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, PrincipalId(Uuid::new_v4())),
            ResourceType::Generation,
            AccessType::Read,
            SecurityContext::new("10.0.0.1".parse().unwrap(), "Mozilla/5.0"),
        )
    }

    #[test]
    fn clean_request_scores_low_risk() {
        let validator = ContextValidator::new();
        let mut req = request();
        let result = validator.run(&mut req);
        assert!(result.success);
        assert_eq!(result.threat_level, ThreatLevel::Green);
    }

    #[test]
    fn bot_user_agent_raises_risk() {
        let validator = ContextValidator::new();
        let mut req = request();
        req.security_context.user_agent = "curl/8.0".into();
        let result = validator.run(&mut req);
        assert!(req.security_context.flags.contains(&SecurityFlag::BotUserAgent));
        assert!(result.threat_level >= ThreatLevel::Yellow);
    }

    #[test]
    fn impossible_travel_between_two_logins_is_flagged() {
        let validator = ContextValidator::new();
        let principal = PrincipalId(Uuid::new_v4());

        let mut first = request();
        first.principal = principal;
        first.security_context.headers.insert("geo-lat".into(), "40.7128".into());
        first.security_context.headers.insert("geo-lon".into(), "-74.0060".into());
        validator.run(&mut first);

        let mut second = request();
        second.principal = principal;
        second.security_context.headers.insert("geo-lat".into(), "35.6762".into());
        second.security_context.headers.insert("geo-lon".into(), "139.6503".into());
        let result = validator.run(&mut second);

        assert!(second.security_context.flags.contains(&SecurityFlag::ImpossibleTravel));
        assert!(result.threat_level >= ThreatLevel::Orange);
    }
}
