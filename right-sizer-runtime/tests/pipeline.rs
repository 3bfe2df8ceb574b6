//! End-to-end exercise of the full pipeline against fake collaborators:
//! eligibility -> decision -> calculation -> sanitization -> apply ->
//! defer -> retry, matching scenario 4 of the acceptance scenarios.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use parking_lot::Mutex;
use right_sizer_core::patch::RawResources;
use right_sizer_core::types::ContainerRef;
use right_sizer_core::{calculator, decision, Config, ResizePlan};
use right_sizer_runtime::client::{
    ClusterClient, ContainerSnapshot, PodId, PodPhase, PodSnapshot, ResizePolicy, RestartPolicy, WorkloadTemplate,
};
use right_sizer_runtime::{ApplyGuard, ApplyOutcome, ClientError, DeferCause, RetryManager};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

struct FlakyClient {
    fail_next: Mutex<bool>,
}

#[async_trait]
impl ClusterClient for FlakyClient {
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, ClientError> {
        Ok(vec![])
    }
    async fn get_pod(&self, _id: &PodId) -> Result<PodSnapshot, ClientError> {
        Err(ClientError::NotFound)
    }
    async fn patch_pod(&self, _id: &PodId, _patch: json_patch::Patch) -> Result<(), ClientError> {
        Ok(())
    }
    async fn patch_pod_resize(&self, _id: &PodId, _patch: json_patch::Patch) -> Result<(), ClientError> {
        let mut fail_next = self.fail_next.lock();
        if *fail_next {
            *fail_next = false;
            return Err(ClientError::NodeResourceConstraint);
        }
        Ok(())
    }
    async fn get_workload_template(&self, _owner: &right_sizer_runtime::client::WorkloadRef) -> Result<Option<WorkloadTemplate>, ClientError> {
        Ok(None)
    }
    async fn patch_workload_template(&self, _workload: &right_sizer_runtime::client::WorkloadRef, _patch: json_patch::Patch) -> Result<(), ClientError> {
        Ok(())
    }
    async fn server_minor_version(&self) -> Result<u32, ClientError> {
        Ok(33)
    }
}

fn pod() -> PodSnapshot {
    PodSnapshot {
        id: PodId::new("payments", "api-7d4"),
        generation: 3,
        phase: PodPhase::Running,
        deleting: false,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        owner: None,
        containers: vec![ContainerSnapshot {
            name: "web".into(),
            resources: RawResources {
                requests: BTreeMap::from([
                    ("cpu".to_string(), Quantity("200m".into())),
                    ("memory".to_string(), Quantity("256Mi".into())),
                ]),
                limits: BTreeMap::from([
                    ("cpu".to_string(), Quantity("1".into())),
                    ("memory".to_string(), Quantity("512Mi".into())),
                ]),
            },
            resize_policy: ResizePolicy { cpu: RestartPolicy::NotRequired, memory: RestartPolicy::NotRequired },
        }],
    }
}

#[tokio::test]
async fn scenario_4_eligible_pod_defers_then_retries_successfully() {
    let config = Config::default();
    let pod = pod();

    assert!(right_sizer_runtime::eligibility::is_eligible(&pod, &config, "right-sizer-system"));

    let usage = right_sizer_core::UsageSample { cpu_millicores: 900.0, memory_mib: 200.0 };
    let containers = pod.container_resources();
    let pod_decision = decision::decide(usage, &containers, &config.thresholds);
    assert!(!pod_decision.is_none());

    let target = calculator::calculate(usage.per_container(1), pod_decision, &config, false);
    let container = &pod.containers[0];
    let sanitized = right_sizer_core::patch::sanitize(&container.resources, &target);
    let new_resources = sanitized.cpu_requirements();
    assert_ne!(new_resources, container.resources.cpu_requirements());

    let plan = ResizePlan {
        container: ContainerRef { namespace: "payments".into(), pod_name: "api-7d4".into(), container_name: "web".into(), container_index: 0 },
        old_resources: container.resources.cpu_requirements(),
        new_resources,
        reason: format!("cpu={}, memory={}", pod_decision.cpu, pod_decision.memory),
    };

    let client = FlakyClient { fail_next: Mutex::new(true) };
    let guard = ApplyGuard::default();

    let first = right_sizer_runtime::executor::apply(
        &client,
        &guard,
        &pod.id,
        0,
        &container.resources,
        container.resize_policy,
        &plan,
        &config,
    )
    .await;
    assert!(matches!(first, ApplyOutcome::Deferred { reason: DeferCause::NodeResourceConstraint, .. }));

    let retry = RetryManager::new(config.max_retries, config.max_deferral_time, config.retry_interval);
    let ApplyOutcome::Deferred { reason, error } = first else { unreachable!() };
    let attempts = retry.enqueue(plan.container.pod_key(), plan.clone(), reason, error, 0, Instant::now());
    assert_eq!(attempts, 1);
    assert!(retry.is_deferred(&plan.container.pod_key()));

    let too_soon = retry.snapshot_due(Instant::now());
    assert!(too_soon.ready.is_empty(), "backoff gate should not be due yet");

    let due_at = Instant::now() + Duration::from_secs(config.retry_interval.as_secs() / 2 + 1);
    let batch = retry.snapshot_due(due_at);
    assert_eq!(batch.ready.len(), 1);

    let second = right_sizer_runtime::executor::apply(
        &client,
        &guard,
        &pod.id,
        0,
        &container.resources,
        container.resize_policy,
        &plan,
        &config,
    )
    .await;
    assert_eq!(second, ApplyOutcome::Applied);

    retry.remove(&plan.container.pod_key());
    assert!(!retry.is_deferred(&plan.container.pod_key()));
}

#[tokio::test]
async fn ineligible_pod_is_filtered_before_any_decision_is_made() {
    let config = Config::default();
    let mut system_pod = pod();
    system_pod.id = PodId::new("kube-system", "coredns-1");
    assert!(!right_sizer_runtime::eligibility::is_eligible(&system_pod, &config, "right-sizer-system"));
}
