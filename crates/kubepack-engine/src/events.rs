//! Cluster event correlation
//!
//! Watches `Event` resources in every namespace a package touches and emits
//! the deduplicated ones whose involved object belongs to the package,
//! either directly or transitively through generated pod/replicaset names.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use kubepack_kubectl::{Context, Kubectl};
use kubepack_model::{Resource, ResourceRef, group_by_namespace, merge};

/// A cluster event correlated to a package resource
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub involved: ResourceRef,
    pub field_path: String,
}

impl Event {
    /// The container a pod `BackOff` event points at via its fieldPath
    /// (`spec.containers{<name>}`)
    pub fn backoff_container(&self) -> Option<&str> {
        if self.event_type == "Normal" || self.reason != "BackOff" || self.involved.kind() != "Pod"
        {
            return None;
        }
        container_from_field_path(&self.field_path)
    }
}

/// Starts the correlator over every namespace the refs touch
pub fn watch_events<C: Kubectl + 'static>(
    ctx: &Context,
    client: &Arc<C>,
    refs: &[ResourceRef],
) -> mpsc::Receiver<Event> {
    let mut known = HashSet::new();
    for r in refs {
        known.insert(r.id());
        known.insert(r.name().to_string());
    }

    let mut streams = Vec::new();
    for group in group_by_namespace(refs) {
        if !group.key.is_empty() {
            streams.push(client.watch(ctx, "Event", &group.key, &[], true));
        }
    }
    let mut merged = merge(streams);

    let (tx, rx) = mpsc::channel(1);
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let mut seen = HashSet::new();
        while let Some(observed) = merged.recv().await {
            match observed {
                Err(e) => {
                    if ctx.error().is_none() {
                        tracing::warn!("watch events: {e}");
                    }
                }
                Ok(resource) => {
                    let event = parse_event(&resource);
                    if !involves_known(&known, &event.involved) {
                        continue;
                    }
                    if !seen.insert(dedup_key(&event)) {
                        continue;
                    }
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}

fn parse_event(resource: &Resource) -> Event {
    let involved = ResourceRef::new(
        resource.string_at("involvedObject.apiVersion"),
        resource.string_at("involvedObject.kind"),
        resource.string_at("involvedObject.namespace"),
        resource.string_at("involvedObject.name"),
    );
    Event {
        event_type: resource.string_at("type"),
        reason: resource.string_at("reason"),
        message: resource.string_at("message"),
        field_path: resource.string_at("involvedObject.fieldPath"),
        involved,
    }
}

/// Membership test: the involved identity is known directly, or its name
/// shortened by one or two generated `-<suffix>` segments matches a known
/// name. The latter catches pods of a deployment's replicaset.
fn involves_known(known: &HashSet<String>, involved: &ResourceRef) -> bool {
    if known.contains(&involved.id()) {
        return true;
    }
    if !matches!(involved.kind(), "Pod" | "ReplicaSet" | "StatefulSet") {
        return false;
    }
    let parts: Vec<&str> = involved.name().split('-').collect();
    if parts.len() <= 2 {
        return false;
    }
    known.contains(&parts[..parts.len() - 1].join("-"))
        || known.contains(&parts[..parts.len() - 2].join("-"))
}

fn dedup_key(event: &Event) -> String {
    format!(
        "{}/{}:{}:{}:{}",
        event.involved.qualified_kind(),
        event.involved.name(),
        event.field_path,
        event.reason,
        event.message
    )
}

fn container_from_field_path(field_path: &str) -> Option<&str> {
    field_path
        .strip_prefix("spec.containers{")?
        .strip_suffix('}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_generated_pod_name_matches_known_deployment() {
        let known = known(&["cert-manager-webhook"]);
        let pod = ResourceRef::new("v1", "Pod", "myns", "cert-manager-webhook-7444b58c45-9cfgh");
        assert!(involves_known(&known, &pod));

        let replicaset = ResourceRef::new("apps/v1", "ReplicaSet", "myns", "cert-manager-webhook-7444b58c45");
        assert!(involves_known(&known, &replicaset));
    }

    #[test]
    fn test_unrelated_pod_does_not_match() {
        let known = known(&["cert-manager-webhook"]);
        let pod = ResourceRef::new("v1", "Pod", "myns", "unrelated-7444b58c45-9cfgh");
        assert!(!involves_known(&known, &pod));
    }

    #[test]
    fn test_suffix_stripping_only_applies_to_generated_kinds() {
        let known = known(&["my-service"]);
        let service = ResourceRef::new("v1", "Service", "myns", "my-service-suffix-x");
        assert!(!involves_known(&known, &service));
    }

    #[test]
    fn test_direct_identity_match() {
        let deployment = ResourceRef::new("apps/v1", "Deployment", "myns", "d1");
        let known: HashSet<String> = [deployment.id()].into_iter().collect();
        assert!(involves_known(&known, &deployment));
    }

    #[test]
    fn test_backoff_container_extraction() {
        let event = Event {
            event_type: "Warning".to_string(),
            reason: "BackOff".to_string(),
            message: "Back-off restarting failed container".to_string(),
            involved: ResourceRef::new("v1", "Pod", "myns", "mypod-abc12-x9y8z"),
            field_path: "spec.containers{app}".to_string(),
        };
        assert_eq!(event.backoff_container(), Some("app"));

        let normal = Event {
            event_type: "Normal".to_string(),
            ..event.clone()
        };
        assert_eq!(normal.backoff_container(), None);

        let elsewhere = Event {
            field_path: "spec.initContainers{init}".to_string(),
            ..event
        };
        assert_eq!(elsewhere.backoff_container(), None);
    }
}
