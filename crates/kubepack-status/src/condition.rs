//! Kind-specific readiness rules

use std::collections::HashMap;

use kubepack_model::Resource;

/// A resource's evaluated readiness. Equality is structural; the emitter
/// relies on it to suppress repeated observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionStatus {
    pub ready: bool,
    pub description: String,
}

impl ConditionStatus {
    fn ready(description: String) -> Self {
        Self {
            ready: true,
            description,
        }
    }

    fn not_ready(description: String) -> Self {
        Self {
            ready: false,
            description,
        }
    }
}

/// The closed set of readiness rules. Unknown kinds fall back to `Generic`,
/// which requires every reported condition to be true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A single named condition must be true (e.g. `ready`, `available`)
    Named(String),
    /// Deployment rollout: available condition, observed generation and
    /// replica counters must all line up
    DeploymentRollout,
    /// DaemonSet rollout: all conditions true, nothing misscheduled, ready
    /// count matches the desired count
    DaemonSetRollout,
    /// Every condition the resource exposes must report true
    Generic,
}

const GENERIC: Condition = Condition::Generic;

/// Registry from kind name to its readiness rule
pub type ConditionMap = HashMap<String, Condition>;

/// The default rule set used while awaiting a package rollout
pub fn rollout_conditions() -> ConditionMap {
    HashMap::from([
        ("Deployment".to_string(), Condition::DeploymentRollout),
        ("DaemonSet".to_string(), Condition::DaemonSetRollout),
        ("Pod".to_string(), Condition::Named("ready".to_string())),
        ("Job".to_string(), Condition::Named("ready".to_string())),
        (
            "Certificate".to_string(),
            Condition::Named("ready".to_string()),
        ),
        (
            "APIService".to_string(),
            Condition::Named("available".to_string()),
        ),
    ])
}

/// The rule registered for a kind, or the generic fallback
pub fn condition_for<'a>(kind: &str, conditions: &'a ConditionMap) -> &'a Condition {
    conditions.get(kind).unwrap_or(&GENERIC)
}

impl Condition {
    /// Evaluates the rule against one resource observation
    pub fn status(&self, resource: &Resource) -> ConditionStatus {
        match self {
            Condition::Named(name) => named_status(resource, name),
            Condition::DeploymentRollout => deployment_status(resource),
            Condition::DaemonSetRollout => daemonset_status(resource),
            Condition::Generic => generic_status(resource),
        }
    }
}

fn named_status(resource: &Resource, name: &str) -> ConditionStatus {
    for cond in resource.conditions() {
        if cond.condition_type == name {
            let mut description = if cond.reason.is_empty() {
                cond.condition_type.clone()
            } else {
                cond.reason.clone()
            };
            if !cond.message.is_empty() {
                description = format!("{description}: {}", cond.message);
            }
            return ConditionStatus {
                ready: cond.status,
                description,
            };
        }
    }
    ConditionStatus::not_ready(format!("condition {name} not present"))
}

fn generic_status(resource: &Resource) -> ConditionStatus {
    let mut met = Vec::with_capacity(resource.conditions().len());
    for cond in resource.conditions() {
        if !cond.status {
            return ConditionStatus::not_ready(format!(
                "{}:{}: {}",
                cond.condition_type, cond.reason, cond.message
            ));
        }
        met.push(cond.condition_type.as_str());
    }
    if met.is_empty() {
        ConditionStatus::ready("is present".to_string())
    } else {
        ConditionStatus::ready(met.join(", "))
    }
}

fn deployment_status(resource: &Resource) -> ConditionStatus {
    let desired = resource.int_at("spec.replicas");
    let (replicas, ready_replicas) = resource.rollout_counters("replicas", "readyReplicas");
    let updated = resource.int_at("status.updatedReplicas");
    let counters_match = resource.generation() == resource.observed_generation()
        && updated == desired
        && ready_replicas == replicas
        && replicas == desired;
    let available = named_status(resource, "available");
    if counters_match && available.ready {
        ConditionStatus::ready(format!("{updated}/{desired} ready"))
    } else if !counters_match {
        ConditionStatus::not_ready(format!("{updated}/{desired} updated"))
    } else {
        ConditionStatus::not_ready(format!("updated, {}", available.description))
    }
}

fn daemonset_status(resource: &Resource) -> ConditionStatus {
    let conditions = generic_status(resource);
    if !conditions.ready {
        return conditions;
    }
    let (desired, ready) = resource.rollout_counters("desiredNumberScheduled", "numberReady");
    let settled = resource.int_at("status.numberMisscheduled") == 0
        && ready == desired
        && resource.generation() == resource.observed_generation();
    ConditionStatus {
        ready: settled,
        description: format!("{ready}/{desired} ready"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubepack_model::parse_resources;

    fn resource(yaml: &str) -> Resource {
        parse_resources(yaml.as_bytes()).unwrap().remove(0)
    }

    fn deployment(updated_replicas: i64) -> Resource {
        resource(&format!(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mydeployment
  generation: 3
spec:
  replicas: 2
status:
  observedGeneration: 3
  replicas: 2
  readyReplicas: 2
  updatedReplicas: {updated_replicas}
  conditions:
    - type: Available
      status: "True"
      reason: MinimumReplicasAvailable
"#
        ))
    }

    #[test]
    fn test_deployment_rollout_ready() {
        let status = Condition::DeploymentRollout.status(&deployment(2));
        assert_eq!(
            status,
            ConditionStatus {
                ready: true,
                description: "2/2 ready".to_string()
            }
        );
    }

    #[test]
    fn test_deployment_rollout_behind() {
        let status = Condition::DeploymentRollout.status(&deployment(1));
        assert_eq!(
            status,
            ConditionStatus {
                ready: false,
                description: "1/2 updated".to_string()
            }
        );
    }

    #[test]
    fn test_deployment_counters_match_but_unavailable() {
        let r = resource(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mydeployment
  generation: 3
spec:
  replicas: 2
status:
  observedGeneration: 3
  replicas: 2
  readyReplicas: 2
  updatedReplicas: 2
  conditions:
    - type: Available
      status: "False"
      reason: MinimumReplicasUnavailable
"#,
        );
        let status = Condition::DeploymentRollout.status(&r);
        assert!(!status.ready);
        assert_eq!(status.description, "updated, MinimumReplicasUnavailable");
    }

    #[test]
    fn test_daemonset_rollout() {
        let r = resource(
            r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: myds
  generation: 2
status:
  observedGeneration: 2
  desiredNumberScheduled: 3
  numberReady: 3
  numberMisscheduled: 0
"#,
        );
        let status = Condition::DaemonSetRollout.status(&r);
        assert_eq!(
            status,
            ConditionStatus {
                ready: true,
                description: "3/3 ready".to_string()
            }
        );
    }

    #[test]
    fn test_daemonset_rollout_incomplete() {
        let r = resource(
            r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: myds
  generation: 2
status:
  observedGeneration: 2
  desiredNumberScheduled: 3
  numberReady: 1
  numberMisscheduled: 0
"#,
        );
        let status = Condition::DaemonSetRollout.status(&r);
        assert!(!status.ready);
        assert_eq!(status.description, "1/3 ready");
    }

    #[test]
    fn test_named_condition_with_message() {
        let r = resource(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: mypod
status:
  conditions:
    - type: Ready
      status: "True"
      reason: PodReady
      message: Pod is ready
"#,
        );
        let status = Condition::Named("ready".to_string()).status(&r);
        assert!(status.ready);
        assert_eq!(status.description, "PodReady: Pod is ready");
    }

    #[test]
    fn test_named_condition_missing() {
        let r = resource("apiVersion: v1\nkind: Pod\nmetadata:\n  name: mypod\n");
        let status = Condition::Named("ready".to_string()).status(&r);
        assert!(!status.ready);
        assert_eq!(status.description, "condition ready not present");
    }

    #[test]
    fn test_generic_without_conditions() {
        let r = resource("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n");
        let status = Condition::Generic.status(&r);
        assert!(status.ready);
        assert_eq!(status.description, "is present");
    }

    #[test]
    fn test_generic_joins_met_conditions() {
        let r = resource(
            r#"
apiVersion: example.org/v1
kind: Custom
metadata:
  name: c
status:
  conditions:
    - type: Initialized
      status: "True"
    - type: Settled
      status: "True"
"#,
        );
        let status = Condition::Generic.status(&r);
        assert!(status.ready);
        assert_eq!(status.description, "initialized, settled");
    }

    #[test]
    fn test_condition_registry_fallback() {
        let conditions = rollout_conditions();
        assert_eq!(
            condition_for("Deployment", &conditions),
            &Condition::DeploymentRollout
        );
        assert_eq!(condition_for("ConfigMap", &conditions), &Condition::Generic);
    }
}
