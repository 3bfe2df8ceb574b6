//! C10 — self-protection and eligibility filtering.
//!
//! Applied by the orchestration loop (C6) immediately after listing
//! candidate pods, before any metrics are fetched or decisions computed.

use crate::client::{PodPhase, PodSnapshot};
use right_sizer_core::config::Config;

const SELF_LABEL_KEY: &str = "app.kubernetes.io/name";
const SELF_LABEL_VALUE: &str = "right-sizer";
const SELF_NAME_MARKER: &str = "right-sizer";
const SKIP_ANNOTATION: &str = "rightsizer.io/skip";

const SYSTEM_COMPONENT_LABELS: &[(&str, &str)] = &[("component", "control-plane"), ("component", "etcd")];
const SYSTEM_TIER_VALUES: &[&str] = &["control-plane", "etcd", "kube-scheduler", "kube-controller-manager"];

/// Why a pod was excluded from this tick's candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    SystemNamespace,
    NotIncluded,
    ExplicitlyExcluded,
    IsSelf,
    SystemComponent,
    OptedOut,
    Terminating,
    NotRunning,
}

impl Ineligible {
    pub fn as_str(self) -> &'static str {
        match self {
            Ineligible::SystemNamespace => "system namespace",
            Ineligible::NotIncluded => "not in namespaceInclude",
            Ineligible::ExplicitlyExcluded => "in namespaceExclude",
            Ineligible::IsSelf => "is the right-sizer operator's own pod",
            Ineligible::SystemComponent => "system control-plane component",
            Ineligible::OptedOut => "opted out via rightsizer.io/skip=true",
            Ineligible::Terminating => "terminating",
            Ineligible::NotRunning => "not Running",
        }
    }
}

/// Check whether `pod` is eligible for right-sizing this tick.
///
/// `operator_namespace` is read from the `OPERATOR_NAMESPACE` environment
/// variable by the caller (§6); it is passed explicitly here rather than
/// read directly so the check stays pure and testable.
pub fn check(pod: &PodSnapshot, config: &Config, operator_namespace: &str) -> Result<(), Ineligible> {
    if pod.deleting {
        return Err(Ineligible::Terminating);
    }
    if pod.phase != PodPhase::Running {
        return Err(Ineligible::NotRunning);
    }

    if config.system_namespaces.contains(&pod.id.namespace) {
        return Err(Ineligible::SystemNamespace);
    }
    if !config.namespace_include.is_empty() && !config.namespace_include.contains(&pod.id.namespace) {
        return Err(Ineligible::NotIncluded);
    }
    if config.namespace_exclude.contains(&pod.id.namespace) {
        return Err(Ineligible::ExplicitlyExcluded);
    }

    if pod.labels.get(SELF_LABEL_KEY).map(String::as_str) == Some(SELF_LABEL_VALUE) {
        return Err(Ineligible::IsSelf);
    }
    if pod.id.name.contains(SELF_NAME_MARKER) && pod.id.namespace == operator_namespace {
        return Err(Ineligible::IsSelf);
    }

    for (key, value) in SYSTEM_COMPONENT_LABELS {
        if pod.labels.get(*key).map(String::as_str) == Some(*value) {
            return Err(Ineligible::SystemComponent);
        }
    }
    for tier_key in ["component", "tier"] {
        if let Some(value) = pod.labels.get(tier_key) {
            if SYSTEM_TIER_VALUES.contains(&value.as_str()) {
                return Err(Ineligible::SystemComponent);
            }
        }
    }
    if pod.labels.get("k8s-app").map(String::as_str) == Some("metrics-server") {
        return Err(Ineligible::SystemComponent);
    }

    if pod.annotations.get(SKIP_ANNOTATION).map(String::as_str) == Some("true") {
        return Err(Ineligible::OptedOut);
    }

    Ok(())
}

pub fn is_eligible(pod: &PodSnapshot, config: &Config, operator_namespace: &str) -> bool {
    check(pod, config, operator_namespace).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PodId;
    use std::collections::BTreeMap;

    fn pod(namespace: &str, name: &str) -> PodSnapshot {
        PodSnapshot {
            id: PodId::new(namespace, name),
            generation: 1,
            phase: PodPhase::Running,
            deleting: false,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner: None,
            containers: Vec::new(),
        }
    }

    #[test]
    fn system_namespace_is_ineligible() {
        let config = Config::default();
        let p = pod("kube-system", "coredns-1");
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::SystemNamespace));
    }

    #[test]
    fn namespace_include_restricts_to_listed_namespaces() {
        let mut config = Config::default();
        config.namespace_include.insert("payments".into());
        let p = pod("checkout", "api-1");
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::NotIncluded));
        let p = pod("payments", "api-1");
        assert_eq!(check(&p, &config, "right-sizer-system"), Ok(()));
    }

    #[test]
    fn self_pod_excluded_by_label() {
        let config = Config::default();
        let mut p = pod("right-sizer-system", "right-sizer-7d4-abcde");
        p.labels.insert("app.kubernetes.io/name".into(), "right-sizer".into());
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::IsSelf));
    }

    #[test]
    fn self_pod_excluded_by_name_and_namespace() {
        let config = Config::default();
        let p = pod("right-sizer-system", "right-sizer-7d4-abcde");
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::IsSelf));
    }

    #[test]
    fn same_name_marker_in_other_namespace_is_not_self() {
        let config = Config::default();
        let p = pod("tenant-a", "right-sizer-lookalike");
        assert_eq!(check(&p, &config, "right-sizer-system"), Ok(()));
    }

    #[test]
    fn opted_out_annotation_excludes_pod() {
        let config = Config::default();
        let mut p = pod("payments", "api-1");
        p.annotations.insert("rightsizer.io/skip".into(), "true".into());
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::OptedOut));
    }

    #[test]
    fn terminating_pod_is_ineligible_even_if_running() {
        let config = Config::default();
        let mut p = pod("payments", "api-1");
        p.deleting = true;
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::Terminating));
    }

    #[test]
    fn control_plane_tier_label_excludes_pod() {
        let config = Config::default();
        let mut p = pod("kube-system-alt", "custom-scheduler-1");
        p.labels.insert("tier".into(), "control-plane".into());
        assert_eq!(check(&p, &config, "right-sizer-system"), Err(Ineligible::SystemComponent));
    }

    #[test]
    fn ordinary_eligible_pod_passes() {
        let config = Config::default();
        let p = pod("payments", "api-1");
        assert!(is_eligible(&p, &config, "right-sizer-system"));
    }
}
