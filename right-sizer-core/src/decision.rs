//! C1 — the scaling decision engine.
//!
//! Maps a pod's aggregate usage and current requests/limits to an
//! independent per-resource scaling direction. Usage is reported per pod
//! (not per container, see [`crate::types::UsageSample`]), so the decision
//! is computed once per pod, against the pod's aggregate CPU/memory base,
//! and then shared by every container in that pod.

use crate::config::Thresholds;
use crate::types::{ResourceRequirements, ScaleDirection, ScalingDecision, UsageSample};

/// Compute the pod-wide scaling decision.
///
/// `containers` is the current `ResourceRequirements` of every container in
/// the pod, used to derive the aggregate CPU/memory base that `usage` is
/// measured against.
pub fn decide(usage: UsageSample, containers: &[ResourceRequirements], thresholds: &Thresholds) -> ScalingDecision {
    let cpu_base = aggregate_cpu_base(containers);
    let mem_base = aggregate_memory_base(containers);

    if cpu_base == 0 && mem_base == 0 {
        return ScalingDecision {
            cpu: ScaleDirection::ScaleUp,
            memory: ScaleDirection::ScaleUp,
        };
    }

    let cpu_ratio = if cpu_base > 0 {
        usage.cpu_millicores / cpu_base as f64
    } else {
        0.0
    };
    let mem_ratio = if mem_base > 0 {
        (usage.memory_mib * crate::quantity::MIB as f64) / mem_base as f64
    } else {
        0.0
    };

    ScalingDecision {
        cpu: classify(cpu_ratio, thresholds.cpu_scale_up, thresholds.cpu_scale_down),
        memory: classify(mem_ratio, thresholds.mem_scale_up, thresholds.mem_scale_down),
    }
}

/// Strict-inequality threshold classification; ties (`ratio == threshold`)
/// yield `ScaleNone` (§4.1 tie-break policy).
fn classify(ratio: f64, scale_up: f64, scale_down: f64) -> ScaleDirection {
    if ratio > scale_up {
        ScaleDirection::ScaleUp
    } else if ratio < scale_down {
        ScaleDirection::ScaleDown
    } else {
        ScaleDirection::ScaleNone
    }
}

fn aggregate_cpu_base(containers: &[ResourceRequirements]) -> i64 {
    let from_limits: i64 = containers.iter().filter_map(|c| c.cpu.limit).map(|m| m.0).sum();
    if from_limits > 0 {
        return from_limits;
    }
    containers.iter().filter_map(|c| c.cpu.request).map(|m| m.0).sum()
}

fn aggregate_memory_base(containers: &[ResourceRequirements]) -> i64 {
    let from_limits: i64 = containers.iter().filter_map(|c| c.memory.limit).map(|b| b.0).sum();
    if from_limits > 0 {
        return from_limits;
    }
    containers.iter().filter_map(|c| c.memory.request).map(|b| b.0).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{Bytes, Millicores};
    use crate::types::ResourceAmount;

    fn container(req_cpu: i64, lim_cpu: i64, req_mem_mib: i64, lim_mem_mib: i64) -> ResourceRequirements {
        ResourceRequirements {
            cpu: ResourceAmount {
                request: Some(Millicores(req_cpu)),
                limit: Some(Millicores(lim_cpu)),
            },
            memory: ResourceAmount {
                request: Some(Bytes(req_mem_mib * crate::quantity::MIB)),
                limit: Some(Bytes(lim_mem_mib * crate::quantity::MIB)),
            },
        }
    }

    #[test]
    fn scales_up_from_nothing_when_pod_has_no_base() {
        let decision = decide(
            UsageSample { cpu_millicores: 10.0, memory_mib: 10.0 },
            &[ResourceRequirements::default()],
            &Thresholds::default(),
        );
        assert_eq!(decision.cpu, ScaleDirection::ScaleUp);
        assert_eq!(decision.memory, ScaleDirection::ScaleUp);
    }

    #[test]
    fn scenario_1_scale_up_on_memory_pressure() {
        // requests 200m/256Mi, limits 1000m/2Gi; usage 500m/1700MiB
        let containers = [container(200, 1000, 256, 2048)];
        let usage = UsageSample { cpu_millicores: 500.0, memory_mib: 1700.0 };
        let thresholds = Thresholds { cpu_scale_up: 0.8, cpu_scale_down: 0.3, mem_scale_up: 0.8, mem_scale_down: 0.3 };
        let decision = decide(usage, &containers, &thresholds);
        assert_eq!(decision.cpu, ScaleDirection::ScaleNone);
        assert_eq!(decision.memory, ScaleDirection::ScaleUp);
    }

    #[test]
    fn scenario_2_scale_down_both() {
        let containers = [container(500, 1000, 1024, 2048)];
        let usage = UsageSample { cpu_millicores: 200.0, memory_mib: 400.0 };
        let decision = decide(usage, &containers, &Thresholds::default());
        assert_eq!(decision.cpu, ScaleDirection::ScaleDown);
        assert_eq!(decision.memory, ScaleDirection::ScaleDown);
    }

    #[test]
    fn equality_at_threshold_is_none() {
        // base 1000m, usage exactly 800m -> ratio == scale_up threshold (0.8)
        let containers = [container(1000, 1000, 1024, 1024)];
        let usage = UsageSample { cpu_millicores: 800.0, memory_mib: 819.2 };
        let decision = decide(usage, &containers, &Thresholds::default());
        assert_eq!(decision.cpu, ScaleDirection::ScaleNone);
    }

    #[test]
    fn suppression_rule_flags_cpu_none_mem_down() {
        let decision = ScalingDecision { cpu: ScaleDirection::ScaleNone, memory: ScaleDirection::ScaleDown };
        assert!(decision.is_suppressed());
        let decision = ScalingDecision { cpu: ScaleDirection::ScaleUp, memory: ScaleDirection::ScaleDown };
        assert!(!decision.is_suppressed());
    }
}
