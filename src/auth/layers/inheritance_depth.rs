//! Layer 6: inheritance depth guard.
//!
//! Reports on the depth/cycle portion of the shared [`super::AccessTrace`]
//! computed by layer 4. A cycle is always a hard failure regardless of
//! whether layer 4 ultimately granted access through some other path —
//! a cyclic parent chain is evidence of a data integrity problem worth
//! surfacing on its own.

use std::time::Instant;

use crate::config::CoreConfig;
use crate::domain::authorization::{LayerResult, LayerType};
use crate::error::CoreError;

use super::AccessTrace;

pub fn run(trace: &AccessTrace, config: &CoreConfig) -> LayerResult {
    let started = Instant::now();

    if trace.cycle_detected {
        return LayerResult::failed(
            LayerType::InheritanceDepthGuard,
            started.elapsed(),
            CoreError::IntegrityViolation {
                detail: "generation parent chain contains a cycle".into(),
                correlation_id: uuid::Uuid::new_v4(),
            },
        )
        .with_anomaly("inheritance_cycle");
    }

    if trace.depth_used > config.inheritance_max_depth {
        return LayerResult::failed(
            LayerType::InheritanceDepthGuard,
            started.elapsed(),
            CoreError::Unauthorized {
                reason: crate::error::DenialReason::InheritanceExhausted,
                correlation_id: uuid::Uuid::new_v4(),
            },
        );
    }

    LayerResult::ok(LayerType::InheritanceDepthGuard, started.elapsed())
        .with_metadata("depth_used", trace.depth_used.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_within_bound_passes() {
        let mut trace = AccessTrace::default();
        trace.depth_used = 10;
        let result = run(&trace, &CoreConfig::default());
        assert!(result.success);
    }

    #[test]
    fn cycle_always_fails() {
        let mut trace = AccessTrace::default();
        trace.cycle_detected = true;
        let result = run(&trace, &CoreConfig::default());
        assert!(!result.success);
    }

    #[test]
    fn depth_beyond_bound_fails() {
        let mut trace = AccessTrace::default();
        trace.depth_used = 11;
        let result = run(&trace, &CoreConfig::default());
        assert!(!result.success);
    }
}
