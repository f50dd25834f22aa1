//! Status change emission
//!
//! Consumes a resource observation stream and emits only genuine status
//! changes per resource identity. Errors pass through unchanged; the output
//! closes with the input.

use std::collections::HashMap;

use tokio::sync::mpsc;

use kubepack_model::{Resource, ResourceRef};

use crate::condition::{ConditionMap, ConditionStatus, condition_for};

/// A resource identity paired with its evaluated status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub resource: ResourceRef,
    pub status: ConditionStatus,
}

/// One element of a status change stream
pub type StatusEvent<E> = Result<ResourceStatus, E>;

/// Spawns the emitter task over the given observation stream
pub fn emit_changes<E: Send + 'static>(
    mut input: mpsc::Receiver<Result<Resource, E>>,
    conditions: ConditionMap,
) -> mpsc::Receiver<StatusEvent<E>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut last: HashMap<String, ConditionStatus> = HashMap::new();
        while let Some(event) = input.recv().await {
            let out = match event {
                Ok(resource) => {
                    let status = condition_for(resource.kind(), &conditions).status(&resource);
                    if last.get(&resource.id()) == Some(&status) {
                        continue;
                    }
                    last.insert(resource.id(), status.clone());
                    Ok(ResourceStatus {
                        resource: resource.reference().clone(),
                        status,
                    })
                }
                Err(e) => Err(e),
            };
            if tx.send(out).await.is_err() {
                return;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::rollout_conditions;
    use kubepack_model::parse_resources;

    fn deployment(ready_replicas: i64) -> Resource {
        parse_resources(
            format!(
                r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mydeployment
  namespace: myns
  generation: 1
spec:
  replicas: 1
status:
  observedGeneration: 1
  replicas: 1
  readyReplicas: {ready_replicas}
  updatedReplicas: 1
  conditions:
    - type: Available
      status: "True"
"#
            )
            .as_bytes(),
        )
        .unwrap()
        .remove(0)
    }

    #[tokio::test]
    async fn test_emits_only_changes_per_identity() {
        let (tx, rx) = mpsc::channel::<Result<Resource, String>>(1);
        let mut changes = emit_changes(rx, rollout_conditions());

        tokio::spawn(async move {
            tx.send(Ok(deployment(0))).await.unwrap();
            tx.send(Ok(deployment(0))).await.unwrap();
            tx.send(Ok(deployment(1))).await.unwrap();
            tx.send(Err("mock error".to_string())).await.unwrap();
        });

        let mut received = Vec::new();
        while let Some(event) = changes.recv().await {
            received.push(match event {
                Ok(s) => format!("{}: {} {}", s.resource.name(), s.status.ready, s.status.description),
                Err(e) => format!("err {e}"),
            });
        }
        assert_eq!(
            received,
            vec![
                "mydeployment: false 1/1 updated",
                "mydeployment: true 1/1 ready",
                "err mock error",
            ]
        );
    }
}
