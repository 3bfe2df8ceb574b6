//! Quality-of-Service class derivation, shared by the resource calculator
//! and the in-place resize executor's preflight step.

use crate::types::{QosClass, ResourceRequirements};

/// Derive the pod's QoS class from the CPU/memory requests and limits of
/// every container.
///
/// *Guaranteed*: every container specifies CPU and memory requests equal
/// to their limits. *BestEffort*: no container specifies any request or
/// limit. *Burstable*: anything in between.
pub fn derive(containers: &[ResourceRequirements]) -> QosClass {
    if containers.is_empty() {
        return QosClass::BestEffort;
    }

    let any_set = containers.iter().any(|c| c.cpu.present() || c.memory.present());
    if !any_set {
        return QosClass::BestEffort;
    }

    let all_guaranteed = containers.iter().all(|c| {
        let cpu_guaranteed = match (c.cpu.request, c.cpu.limit) {
            (Some(r), Some(l)) => r == l,
            _ => false,
        };
        let memory_guaranteed = match (c.memory.request, c.memory.limit) {
            (Some(r), Some(l)) => r == l,
            _ => false,
        };
        cpu_guaranteed && memory_guaranteed
    });

    if all_guaranteed {
        QosClass::Guaranteed
    } else {
        QosClass::Burstable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{Bytes, Millicores};
    use crate::types::ResourceAmount;

    fn guaranteed_container() -> ResourceRequirements {
        ResourceRequirements {
            cpu: ResourceAmount { request: Some(Millicores(200)), limit: Some(Millicores(200)) },
            memory: ResourceAmount { request: Some(Bytes(256)), limit: Some(Bytes(256)) },
        }
    }

    #[test]
    fn empty_pod_is_best_effort() {
        assert_eq!(derive(&[]), QosClass::BestEffort);
    }

    #[test]
    fn unset_resources_are_best_effort() {
        assert_eq!(derive(&[ResourceRequirements::default()]), QosClass::BestEffort);
    }

    #[test]
    fn equal_request_and_limit_is_guaranteed() {
        assert_eq!(derive(&[guaranteed_container()]), QosClass::Guaranteed);
    }

    #[test]
    fn mismatched_request_and_limit_is_burstable() {
        let mut c = guaranteed_container();
        c.cpu.limit = Some(Millicores(400));
        assert_eq!(derive(&[c]), QosClass::Burstable);
    }

    #[test]
    fn one_guaranteed_one_burstable_container_is_burstable_pod() {
        let mut burstable = guaranteed_container();
        burstable.memory.limit = Some(Bytes(512));
        assert_eq!(derive(&[guaranteed_container(), burstable]), QosClass::Burstable);
    }
}
