//! Per-request security context, carrying the signal the
//! context-validation layer (§4.2, layer 3) scores and the history the
//! anomaly-correlation layer (layer 9) inspects.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Security flags raised by advisory layers. A closed enumeration per
/// `spec.md` §9 ("duck-typed security incident types" is the pattern to
/// avoid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityFlag {
    VpnOrTor,
    ImpossibleTravel,
    BotUserAgent,
    RapidIpChurn,
    PeriodicRequestTiming,
    ExcessiveAdminRatio,
    GeographicAnomaly,
    SsrfAttempt,
    InjectionAttempt,
}

/// Geolocation summary attached by the context validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_vpn_or_tor: bool,
}

/// User-agent analysis summary attached by the context validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub raw: String,
    pub is_bot: bool,
    pub is_known_client: bool,
}

/// A compact summary of a prior request, retained in the principal's
/// bounded request history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub timestamp: DateTime<Utc>,
    pub ip: IpAddr,
    pub endpoint_category: String,
    pub granted: bool,
}

/// Maximum entries retained in a security context's request history.
pub const MAX_REQUEST_HISTORY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub session_data: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub history: VecDeque<RequestSummary>,
    pub risk_score: f64,
    pub flags: Vec<SecurityFlag>,
    pub geo: Option<GeoInfo>,
    pub user_agent_info: Option<UserAgentInfo>,
}

impl SecurityContext {
    pub fn new(client_ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            client_ip,
            user_agent: user_agent.into(),
            timestamp: Utc::now(),
            session_data: HashMap::new(),
            headers: HashMap::new(),
            history: VecDeque::with_capacity(MAX_REQUEST_HISTORY),
            risk_score: 0.0,
            flags: Vec::new(),
            geo: None,
            user_agent_info: None,
        }
    }

    pub fn push_history(&mut self, summary: RequestSummary) {
        if self.history.len() == MAX_REQUEST_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    pub fn add_flag(&mut self, flag: SecurityFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// A stable hash of the parts of the context that affect an
    /// authorization decision, used for idempotence keying
    ///.
    pub fn decision_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.client_ip.hash(&mut hasher);
        self.user_agent.hash(&mut hasher);
        let mut flags = self.flags.clone();
        flags.sort_by_key(|f| *f as u32 as u64);
        for flag in &flags {
            (*flag as u32).hash(&mut hasher);
        }
        hasher.finish()
    }
}
