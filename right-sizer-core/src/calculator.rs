//! C2 — the resource calculator.
//!
//! Turns a per-container usage share and a scaling decision into a target
//! [`ResourceRequirements`], honoring minima, maxima, the 20% measured-usage
//! buffer, and the Guaranteed-QoS preservation rule.

use crate::config::Config;
use crate::quantity::MIB;
use crate::types::{ResourceAmount, ResourceRequirements, ScaleDirection, ScalingDecision, UsageSample};

/// A smaller multiplier is used on scale-down so requests shrink gradually
/// rather than snapping straight to measured usage.
const SCALE_DOWN_REQUEST_MULTIPLIER: f64 = 1.1;

/// The buffer enforced over measured usage whenever usage is non-zero.
const USAGE_BUFFER_MULTIPLIER: f64 = 1.2;

/// Memory fallback limit (256Mi) used when no other limit can be derived.
const FALLBACK_MEMORY_LIMIT_BYTES: i64 = 256 * MIB;

/// Usage below this many millicores is treated as "essentially zero" for
/// the purpose of applying the configured minimum request.
const CPU_ZERO_THRESHOLD_MILLICORES: f64 = 0.1;

/// Usage below this many MiB is treated as "essentially zero".
const MEMORY_ZERO_THRESHOLD_MIB: f64 = 1.0;

/// Compute the target resource requirements for one container.
///
/// `usage_share` is this container's slice of the pod-level usage sample
/// (see [`UsageSample::per_container`]). `is_critical` reflects an
/// out-of-scope criticality classification (e.g. from a policy CRD) that
/// forces Guaranteed QoS regardless of `preserveGuaranteedQoS`.
pub fn calculate(usage_share: UsageSample, decision: ScalingDecision, config: &Config, is_critical: bool) -> ResourceRequirements {
    let cpu_request = size_request(
        usage_share.cpu_millicores,
        decision.cpu,
        config.sizing.cpu_request_multiplier,
        config.sizing.cpu_request_addition,
        CPU_ZERO_THRESHOLD_MILLICORES,
        config.limits.min_cpu_request,
    );
    let memory_request_mib = size_request(
        usage_share.memory_mib,
        decision.memory,
        config.sizing.memory_request_multiplier,
        0, // addition applied below in byte units, after mib->byte conversion
        MEMORY_ZERO_THRESHOLD_MIB,
        0,
    );
    let memory_request =
        (memory_request_mib * MIB as f64).round() as i64 + config.sizing.memory_request_addition;
    let memory_request = memory_request.max(if usage_share.memory_mib < MEMORY_ZERO_THRESHOLD_MIB {
        config.limits.min_memory_request
    } else {
        0
    });

    let cpu_limit = size_limit(cpu_request, config.sizing.cpu_limit_multiplier, config.sizing.cpu_limit_addition, config.limits.max_cpu_limit, false);
    let memory_limit = size_limit(
        memory_request,
        config.sizing.memory_limit_multiplier,
        config.sizing.memory_limit_addition,
        config.limits.max_memory_limit,
        true,
    );

    let (cpu_request, cpu_limit, memory_request, memory_limit) = if should_force_guaranteed(config, is_critical) {
        (cpu_request, cpu_request, memory_request, memory_request)
    } else {
        (cpu_request, cpu_limit, memory_request, memory_limit)
    };

    ResourceRequirements {
        cpu: ResourceAmount {
            request: Some(crate::quantity::Millicores(cpu_request)),
            limit: Some(crate::quantity::Millicores(cpu_limit)),
        },
        memory: ResourceAmount {
            request: Some(crate::quantity::Bytes(memory_request)),
            limit: Some(crate::quantity::Bytes(memory_limit)),
        },
    }
}

/// §4.2 request sizing, parameterized over the resource's native unit
/// (millicores for CPU, MiB for memory — memory's byte addition and
/// minimum are folded in by the caller since the minimum there is
/// expressed in bytes while usage arrives in MiB).
fn size_request(
    usage: f64,
    direction: ScaleDirection,
    multiplier: f64,
    addition: i64,
    zero_threshold: f64,
    min_when_zero: i64,
) -> f64 {
    let multiplier = if direction == ScaleDirection::ScaleDown { SCALE_DOWN_REQUEST_MULTIPLIER } else { multiplier };
    let mut req = (usage * multiplier).floor() + addition as f64;

    if usage < zero_threshold {
        req = req.max(min_when_zero as f64);
    } else {
        req = req.max((usage * USAGE_BUFFER_MULTIPLIER).ceil());
    }
    req
}

/// §4.2 limit sizing: `lim = floor(req * multiplier) + addition`, capped,
/// with the fallbacks for a non-positive result.
fn size_limit(request: i64, multiplier: f64, addition: i64, max_limit: i64, is_memory: bool) -> i64 {
    let mut lim = (request as f64 * multiplier).floor() as i64 + addition;
    if lim > max_limit {
        lim = max_limit;
    }
    if lim < request {
        lim = request;
    }
    if lim <= 0 {
        lim = if is_memory {
            let doubled = request.saturating_mul(2);
            if doubled > 0 { doubled } else { FALLBACK_MEMORY_LIMIT_BYTES }
        } else {
            request
        };
    }
    lim
}

fn should_force_guaranteed(config: &Config, is_critical: bool) -> bool {
    let identity_multipliers = config.preserve_guaranteed_qos
        && config.sizing.cpu_limit_multiplier == 1.0
        && config.sizing.cpu_limit_addition == 0
        && config.sizing.memory_limit_multiplier == 1.0
        && config.sizing.memory_limit_addition == 0;
    identity_multipliers || (config.force_guaranteed_for_critical && is_critical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScaleDirection;

    fn decision(cpu: ScaleDirection, memory: ScaleDirection) -> ScalingDecision {
        ScalingDecision { cpu, memory }
    }

    #[test]
    fn scenario_1_memory_scale_up_buffers_over_usage() {
        let config = Config::default();
        let usage = UsageSample { cpu_millicores: 500.0, memory_mib: 1700.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleNone, ScaleDirection::ScaleUp), &config, false);
        // ceil(1700 * 1.2) = 2040 MiB
        assert_eq!(result.memory.request.unwrap().0, 2040 * MIB);
    }

    #[test]
    fn zero_usage_applies_configured_minimum() {
        let config = Config::default();
        let usage = UsageSample { cpu_millicores: 0.0, memory_mib: 0.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleUp, ScaleDirection::ScaleUp), &config, false);
        assert_eq!(result.cpu.request.unwrap().0, config.limits.min_cpu_request);
        assert_eq!(result.memory.request.unwrap().0, config.limits.min_memory_request);
    }

    #[test]
    fn nonzero_usage_does_not_force_minimum() {
        let mut config = Config::default();
        config.limits.min_cpu_request = 10_000; // an absurdly high floor
        let usage = UsageSample { cpu_millicores: 50.0, memory_mib: 50.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleNone, ScaleDirection::ScaleNone), &config, false);
        assert!(result.cpu.request.unwrap().0 < 10_000);
    }

    #[test]
    fn scenario_3_guaranteed_preservation_forces_limit_to_request() {
        let mut config = Config::default();
        config.preserve_guaranteed_qos = true;
        config.sizing.cpu_limit_multiplier = 2.0; // non-identity: this alone should not force
        let usage = UsageSample { cpu_millicores: 291.0, memory_mib: 0.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleUp, ScaleDirection::ScaleNone), &config, false);
        assert_ne!(result.cpu.request, result.cpu.limit, "non-identity multiplier alone must not force Guaranteed");

        config.sizing.cpu_limit_multiplier = 1.0;
        config.sizing.memory_limit_multiplier = 1.0;
        let result = calculate(usage, decision(ScaleDirection::ScaleUp, ScaleDirection::ScaleNone), &config, false);
        assert_eq!(result.cpu.request, result.cpu.limit);
    }

    #[test]
    fn force_guaranteed_for_critical_overrides_non_identity_multipliers() {
        let mut config = Config::default();
        config.preserve_guaranteed_qos = false;
        config.force_guaranteed_for_critical = true;
        let usage = UsageSample { cpu_millicores: 200.0, memory_mib: 200.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleUp, ScaleDirection::ScaleUp), &config, true);
        assert_eq!(result.cpu.request, result.cpu.limit);
        assert_eq!(result.memory.request, result.memory.limit);
    }

    #[test]
    fn limit_never_below_request_and_capped_at_max() {
        let mut config = Config::default();
        config.limits.max_memory_limit = 100 * MIB;
        let usage = UsageSample { cpu_millicores: 10.0, memory_mib: 90.0 };
        let result = calculate(usage, decision(ScaleDirection::ScaleUp, ScaleDirection::ScaleUp), &config, false);
        assert!(result.memory.limit.unwrap().0 >= result.memory.request.unwrap().0);
        assert!(result.memory.limit.unwrap().0 <= 100 * MIB);
    }
}
