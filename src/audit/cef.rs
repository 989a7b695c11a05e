//! Common Event Format rendering for the SIEM sink:
//! `CEF:0|Velro|AuthorizationSystem|1.0|<event_type>|<action>|<severity>`.

use super::event::AuditEvent;

const CEF_VENDOR: &str = "Velro";
const CEF_PRODUCT: &str = "AuthorizationSystem";
const CEF_VERSION: &str = "1.0";

/// Numeric CEF severity (0-10), mapped from our four-level enum.
fn cef_severity(severity: crate::error::Severity) -> u8 {
    use crate::error::Severity::*;
    match severity {
        Info => 2,
        Warning => 5,
        Error => 7,
        Critical => 10,
    }
}

pub fn to_cef(event: &AuditEvent) -> String {
    format!(
        "CEF:0|{CEF_VENDOR}|{CEF_PRODUCT}|{CEF_VERSION}|{}|{}|{}|suser={} src={} cs1={} outcome={}",
        event.event_type,
        event.action,
        cef_severity(event.severity),
        event.principal,
        event.client_ip,
        event.correlation_id,
        event.outcome,
    )
}
