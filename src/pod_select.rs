use k8s_openapi::api::core::v1::Pod;

/// Coarse pod readiness classes, ordered best-first. Mirrors the standard
/// Kubernetes tooling's "active pods" classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PodClass {
    RunningReady,
    Running,
    Pending,
    Other,
}

fn classify(pod: &Pod) -> PodClass {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("");
    match phase {
        "Running" if is_ready(pod) => PodClass::RunningReady,
        "Running" => PodClass::Running,
        "Pending" => PodClass::Pending,
        _ => PodClass::Other,
    }
}

fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn creation_timestamp(pod: &Pod) -> i64 {
    pod.metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0.timestamp())
        .unwrap_or(0)
}

/// Pick the first pod under "active pods, reverse": running-ready preferred,
/// then running, then pending, then other; within a class, newer
/// `creationTimestamp` first, ties broken by name ascending.
pub fn pick<'p>(pods: &'p [Pod]) -> Option<&'p Pod> {
    pods.iter().min_by(|a, b| {
        classify(a)
            .cmp(&classify(b))
            .then_with(|| creation_timestamp(b).cmp(&creation_timestamp(a)))
            .then_with(|| pod_name(a).cmp(pod_name(b)))
    })
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    use super::*;

    fn pod(name: &str, phase: &str, ready: bool, ts: i64) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(
                    k8s_openapi::chrono::DateTime::from_timestamp(ts, 0).unwrap(),
                )),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: if ready {
                    Some(vec![PodCondition {
                        type_: "Ready".into(),
                        status: "True".into(),
                        ..Default::default()
                    }])
                } else {
                    None
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn running_ready_beats_running() {
        let pods = vec![pod("a", "Running", false, 10), pod("b", "Running", true, 5)];
        assert_eq!(pod_name(pick(&pods).unwrap()), "b");
    }

    #[test]
    fn newer_creation_timestamp_wins_within_class() {
        let pods = vec![pod("old", "Running", true, 1), pod("new", "Running", true, 100)];
        assert_eq!(pod_name(pick(&pods).unwrap()), "new");
    }

    #[test]
    fn ties_broken_by_name_ascending() {
        let pods = vec![pod("zeta", "Running", true, 10), pod("alpha", "Running", true, 10)];
        assert_eq!(pod_name(pick(&pods).unwrap()), "alpha");
    }

    #[test]
    fn pending_beats_other() {
        let pods = vec![pod("failed", "Failed", false, 10), pod("pending", "Pending", false, 10)];
        assert_eq!(pod_name(pick(&pods).unwrap()), "pending");
    }

    #[test]
    fn empty_list_yields_none() {
        let pods: Vec<Pod> = vec![];
        assert!(pick(&pods).is_none());
    }
}
