//! C3 — the safe-patch synthesizer.
//!
//! Reduces a desired [`ResourceRequirements`] to the subset of resource
//! types that are actually present on the live container, since the resize
//! subresource rejects patches that add or remove a resource field (I2).
//! Other resource types on the container (GPU, ephemeral-storage, ...) are
//! represented generically and always copied through verbatim.

use crate::quantity::{parse_cpu, parse_memory, Bytes, Millicores};
use crate::types::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// The raw, container-spec-shaped view of a container's resources: every
/// resource name the platform knows about, not just CPU/memory. This is
/// the type the patch synthesizer reads and writes; `ResourceRequirements`
/// (CPU/memory only, canonical units) is what the decision engine and
/// calculator reason about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResources {
    pub requests: BTreeMap<String, Quantity>,
    pub limits: BTreeMap<String, Quantity>,
}

impl RawResources {
    pub fn cpu_requirements(&self) -> ResourceRequirements {
        ResourceRequirements {
            cpu: crate::types::ResourceAmount {
                request: self.requests.get(CPU).map(parse_cpu),
                limit: self.limits.get(CPU).map(parse_cpu),
            },
            memory: crate::types::ResourceAmount {
                request: self.requests.get(MEMORY).map(parse_memory),
                limit: self.limits.get(MEMORY).map(parse_memory),
            },
        }
    }
}

/// Sanitize `desired` against `current`, producing a patch-ready
/// [`RawResources`] that:
/// - never introduces a resource field absent from `current` (I2, L2),
/// - only overwrites CPU/memory fields that are present in `current`,
/// - guarantees `request <= limit` for every resource it touches (I1, L1).
pub fn sanitize(current: &RawResources, desired: &ResourceRequirements) -> RawResources {
    let mut target = current.clone();

    replace_if_present(&mut target, CPU, desired.cpu.request.map(Quantity::from), desired.cpu.limit.map(Quantity::from));
    replace_if_present(&mut target, MEMORY, desired.memory.request.map(Quantity::from), desired.memory.limit.map(Quantity::from));

    enforce_request_le_limit(&mut target, CPU, |q| parse_cpu(q).0, |v| Quantity::from(Millicores(v)));
    enforce_request_le_limit(&mut target, MEMORY, |q| parse_memory(q).0, |v| Quantity::from(Bytes(v)));

    target
}

fn replace_if_present(target: &mut RawResources, resource: &str, request: Option<Quantity>, limit: Option<Quantity>) {
    if let Some(req) = request {
        if target.requests.contains_key(resource) {
            target.requests.insert(resource.to_string(), req);
        }
    }
    if let Some(lim) = limit {
        if target.limits.contains_key(resource) {
            target.limits.insert(resource.to_string(), lim);
        }
    }
}

/// If both a request and a limit are present for `resource` and the
/// request now exceeds the limit, clamp the request down to the limit
/// rather than emitting an invalid patch. This only ever tightens the
/// request, never loosens the limit, so it cannot violate I3.
fn enforce_request_le_limit(
    target: &mut RawResources,
    resource: &str,
    parse: impl Fn(&Quantity) -> i64,
    format: impl Fn(i64) -> Quantity,
) {
    let (request, limit) = match (target.requests.get(resource), target.limits.get(resource)) {
        (Some(r), Some(l)) => (parse(r), parse(l)),
        _ => return,
    };
    if request > limit {
        tracing::warn!(resource, request, limit, "clamping request down to limit to preserve request <= limit");
        target.requests.insert(resource.to_string(), format(limit));
    }
}
