//! The package manager: the apply/delete orchestrator
//!
//! Owns cancellation, failure diagnosis and teardown ordering. The await
//! protocol merges one watch per (kind, namespace) group into the status
//! emitter and readiness tracker while the event correlator runs alongside;
//! a single select loop serializes all observations.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use kubepack_kubectl::{Context, Kubectl};
use kubepack_model::{Resource, ResourceRef, filter, group_by_kind, group_by_namespace, merge};
use kubepack_status::{StatusReport, emit_changes, rollout_conditions, track};

use crate::error::{EngineError, Result};
use crate::events::{Event, watch_events};
use crate::package::{PKG_NAME_LABEL, Package};
use crate::registry::{InstalledPackage, Registry};

/// Subtracted from the command deadline for the inner watch context so
/// watches close gracefully before the outer deadline fires
const WATCH_CLOSE_GRACE: Duration = Duration::from_secs(7);

/// Reconciles packages against the cluster through the client
pub struct PackageManager<C> {
    client: Arc<C>,
    registry: Registry<C>,
    namespace: String,
}

impl<C: Kubectl + 'static> PackageManager<C> {
    pub fn new(client: C, namespace: impl Into<String>) -> Self {
        let client = Arc::new(client);
        Self {
            registry: Registry::new(client.clone()),
            client,
            namespace: namespace.into(),
        }
    }

    /// Installs or updates a package: records it in the registry, applies
    /// the manifest and waits until the cluster converged on it.
    pub async fn apply(&self, ctx: &Context, pkg: &Package, prune: bool) -> Result<()> {
        let run = async {
            info!("Applying package {}...", pkg.name);
            let record = InstalledPackage {
                name: pkg.name.clone(),
                namespace: self.namespace.clone(),
                resources: pkg.refs(),
            };
            self.registry.put(ctx, &record).await?;
            let selector = vec![format!("{PKG_NAME_LABEL}={}", pkg.name)];
            let applied = self
                .client
                .apply(ctx, &self.namespace, &pkg.resources, prune, &selector)
                .await?;
            let refs: Vec<ResourceRef> = applied.iter().map(|r| r.reference().clone()).collect();
            self.await_ready(ctx, &pkg.name, &refs).await?;
            info!("Applied {} successfully", pkg.name);
            Ok(())
        };
        run.await.map_err(|e| EngineError::apply(&pkg.name, e))
    }

    /// Waits for an already applied package to become ready
    pub async fn status(&self, ctx: &Context, pkg: &Package) -> Result<()> {
        self.await_ready(ctx, &pkg.name, &pkg.refs()).await
    }

    /// The await protocol: watch every required resource until the whole
    /// package is ready, the stream ends or the context is cancelled.
    async fn await_ready(&self, ctx: &Context, name: &str, refs: &[ResourceRef]) -> Result<()> {
        let conditions = rollout_conditions();
        let required = filter(refs, |r| conditions.contains_key(r.kind()));

        // Watches close before the outer deadline so the final report is
        // still delivered within budget.
        let sub = match ctx.deadline() {
            Some(deadline) => ctx.child_with_deadline(
                deadline
                    .checked_sub(WATCH_CLOSE_GRACE)
                    .unwrap_or_else(Instant::now),
            ),
            None => ctx.child(),
        };

        let selector = vec![format!("{PKG_NAME_LABEL}={name}")];
        let mut streams = Vec::new();
        for ns_group in group_by_namespace(&required) {
            let ns = if ns_group.key.is_empty() {
                self.namespace.clone()
            } else {
                ns_group.key.clone()
            };
            for kind_group in group_by_kind(&ns_group.resources) {
                streams.push(self.client.watch(&sub, &kind_group.key, &ns, &selector, false));
            }
        }
        let status_events = emit_changes(merge(streams), conditions);
        let mut tracker = track(required, status_events);
        let mut events = watch_events(&sub, &self.client, refs);

        let mut first_err: Option<EngineError> = None;
        let mut is_ready = false;
        let mut events_open = true;
        let mut ready_open = true;
        loop {
            tokio::select! {
                change = tracker.changes.recv() => match change {
                    None => break,
                    Some(Ok(change)) => {
                        let line = format!(
                            "{}/{}: {}",
                            change.resource.kind().to_lowercase(),
                            change.resource.name(),
                            change.status.description
                        );
                        if change.status.ready {
                            info!("{line}");
                        } else {
                            warn!("{line}");
                        }
                    }
                    Some(Err(e)) => {
                        if first_err.is_none() && !is_ready {
                            first_err = Some(e.into());
                            sub.cancel();
                        }
                    }
                },
                event = events.recv(), if events_open => match event {
                    None => events_open = false,
                    Some(event) => self.handle_event(&sub, &event).await,
                },
                ready = tracker.ready.recv(), if ready_open => {
                    ready_open = false;
                    if ready.is_some() {
                        is_ready = true;
                        sub.cancel();
                    }
                },
            }
        }

        // Whatever ended the loop, no watch must outlive the protocol
        sub.cancel();
        let failed = match tracker.result.recv().await {
            Some(report) => log_not_ready(&report),
            None => 0,
        };
        if let Some(e) = ctx.error() {
            return Err(e.into());
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        if failed > 0 {
            return Err(EngineError::NotReady { count: failed });
        }
        Ok(())
    }

    /// Logs a correlated non-Normal event and extracts container logs on a
    /// pod back-off
    async fn handle_event(&self, ctx: &Context, event: &Event) {
        if event.event_type == "Normal" {
            return;
        }
        warn!(
            "{}/{}: {}: {}",
            event.involved.qualified_kind(),
            event.involved.name(),
            event.reason,
            event.message
        );
        let Some(container) = event.backoff_container() else {
            return;
        };
        let logs = self
            .client
            .container_logs(
                ctx,
                event.involved.namespace(),
                event.involved.name(),
                container,
            )
            .await;
        match logs {
            Ok(lines) => {
                for line in lines {
                    info!("{}/{} {container}: {line}", event.involved.qualified_kind(), event.involved.name());
                }
            }
            Err(e) => {
                if ctx.error().is_none() {
                    warn!("fetch container logs: {e}");
                }
            }
        }
    }

    /// Deletes an installed package by name and removes its record
    pub async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        let run = async {
            let record = self.registry.get(ctx, &self.namespace, name).await?;
            info!("Deleting {name}...");
            let mut refs = record.resources.clone();
            refs.reverse();
            self.delete_refs(ctx, &refs).await?;
            self.registry.delete(ctx, &record).await?;
            info!("Deleted {name}");
            Ok(())
        };
        run.await.map_err(|e| EngineError::delete(name, e))
    }

    /// Deletes loaded resources in a safe order. CRD instances are
    /// recognized by the qualified kind their definition registers; owned
    /// resources are left to their owner's cascade but still awaited.
    pub async fn delete_resources(&self, ctx: &Context, resources: &[Resource]) -> Result<()> {
        let crd_kinds: HashSet<String> = resources
            .iter()
            .filter(|r| is_crd(r.reference()))
            .map(|r| r.crd_qualified_kind())
            .collect();
        let owned: HashSet<String> = resources
            .iter()
            .filter(|r| !r.owner_references().is_empty())
            .map(|r| r.id())
            .collect();
        let refs: Vec<ResourceRef> = resources.iter().map(|r| r.reference().clone()).collect();
        let classes = classify(&refs, |r| crd_kinds.contains(&r.qualified_kind()));
        self.delete_in_order(ctx, classes, &owned).await
    }

    /// Deletes referenced resources in a safe order. With only refs at hand
    /// a CRD instance is recognized by its API group matching the group
    /// suffix of a CRD name in the same input.
    pub async fn delete_refs(&self, ctx: &Context, refs: &[ResourceRef]) -> Result<()> {
        let crd_groups: HashSet<String> = refs
            .iter()
            .filter(|r| is_crd(r))
            .filter_map(|r| r.name().split_once('.').map(|(_, group)| group.to_string()))
            .collect();
        let classes = classify(refs, |r| {
            !r.api_group().is_empty() && crd_groups.contains(r.api_group())
        });
        self.delete_in_order(ctx, classes, &HashSet::new()).await
    }

    async fn delete_in_order(
        &self,
        ctx: &Context,
        classes: [Vec<ResourceRef>; 4],
        owned: &HashSet<String>,
    ) -> Result<()> {
        for awaited in classes {
            if awaited.is_empty() {
                continue;
            }
            let to_delete = filter(&awaited, |r| !owned.contains(&r.id()));
            if !to_delete.is_empty() {
                self.client.delete(ctx, &self.namespace, &to_delete).await?;
            }
            if let Err(e) = self.client.await_deletion(ctx, &self.namespace, &awaited).await {
                // kubectl wait fails for resources that disappeared before
                // it started; a state query decides whether that happened
                if !self.resources_gone(ctx, &awaited).await {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn resources_gone(&self, ctx: &Context, refs: &[ResourceRef]) -> bool {
        for r in refs {
            let ns = if r.namespace().is_empty() {
                &self.namespace
            } else {
                r.namespace()
            };
            match self
                .client
                .get_resource(ctx, &r.qualified_kind(), ns, r.name())
                .await
            {
                Err(e) if e.is_not_found() => {}
                _ => return false,
            }
        }
        true
    }

    /// Returns the installed package with its resources re-read from the
    /// cluster
    pub async fn state(&self, ctx: &Context, name: &str) -> Result<Package> {
        let record = self.registry.get(ctx, &self.namespace, name).await?;
        let selector = vec![format!("{PKG_NAME_LABEL}={name}")];
        let mut resources = Vec::new();
        for group in group_by_namespace(&record.resources) {
            let mut kinds: Vec<String> = Vec::new();
            for r in &group.resources {
                let kind = r.qualified_kind();
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            let ns = if group.key.is_empty() {
                self.namespace.clone()
            } else {
                group.key.clone()
            };
            let found = self.client.get(ctx, &kinds, Some(&ns), &selector).await?;
            resources.extend(found);
        }
        Ok(Package {
            name: record.name,
            namespace: record.namespace,
            resources,
        })
    }

    /// Streams the installed packages of the configured namespace, or of
    /// all namespaces
    pub fn list(&self, ctx: &Context, all_namespaces: bool) -> mpsc::Receiver<Result<InstalledPackage>> {
        let namespace = if all_namespaces {
            None
        } else {
            Some(self.namespace.as_str())
        };
        self.registry.get_all(ctx, namespace)
    }
}

fn is_crd(r: &ResourceRef) -> bool {
    r.kind().eq_ignore_ascii_case("customresourcedefinition")
}

/// Splits refs into the four deletion classes: CRD instances, namespaced,
/// cluster-scoped, and the CRDs themselves
fn classify(
    refs: &[ResourceRef],
    is_crd_instance: impl Fn(&ResourceRef) -> bool,
) -> [Vec<ResourceRef>; 4] {
    let mut instances = Vec::new();
    let mut namespaced = Vec::new();
    let mut cluster = Vec::new();
    let mut crds = Vec::new();
    for r in refs {
        if is_crd(r) {
            crds.push(r.clone());
        } else if is_crd_instance(r) {
            instances.push(r.clone());
        } else if !r.namespace().is_empty() {
            namespaced.push(r.clone());
        } else {
            cluster.push(r.clone());
        }
    }
    [instances, namespaced, cluster, crds]
}

fn log_not_ready(report: &StatusReport) -> usize {
    let mut failed = 0;
    for r in &report.resources {
        if !r.status.ready {
            failed += 1;
            error!(
                "{}/{}: {}",
                r.resource.kind().to_lowercase(),
                r.resource.name(),
                r.status.description
            );
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_(api_version: &str, kind: &str, ns: &str, name: &str) -> ResourceRef {
        ResourceRef::new(api_version, kind, ns, name)
    }

    #[test]
    fn test_classification_order() {
        let refs = vec![
            ref_(
                "apiextensions.k8s.io/v1beta1",
                "CustomResourceDefinition",
                "",
                "certificates.group",
            ),
            ref_("group/v1", "Certificate", "a", "c1"),
            ref_("apps/v1", "Deployment", "a", "d1"),
            ref_("apiregistration.k8s.io/v1", "APIService", "", "s1"),
        ];
        let crd_groups: HashSet<String> = ["group".to_string()].into_iter().collect();
        let classes = classify(&refs, |r| crd_groups.contains(r.api_group()));
        let names: Vec<Vec<&str>> = classes
            .iter()
            .map(|class| class.iter().map(|r| r.name()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["c1"],
                vec!["d1"],
                vec!["s1"],
                vec!["certificates.group"]
            ]
        );
    }
}
