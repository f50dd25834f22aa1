//! The cluster client interface and its kubectl-backed implementation

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use kubepack_model::{Resource, ResourceRef, group_by_namespace, names, parse_resources, to_yaml_stream};

use crate::apiresources::{ApiResourceType, parse_resource_type_table};
use crate::context::Context;
use crate::error::{ClientError, Result};
use crate::exec;

/// One element of a resource snapshot or change stream
pub type ResourceEvent = std::result::Result<Resource, ClientError>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Stderr marker of a lookup that yielded nothing
const NOT_FOUND_PREFIX: &str = "Error from server (NotFound):";

/// The capability set the reconciliation engine operates on. The production
/// implementation drives the platform CLI; tests substitute their own.
#[async_trait]
pub trait Kubectl: Send + Sync {
    /// Applies the resources and returns the applied state as reported by
    /// the cluster. With `prune` and a label selector, resources carrying
    /// the labels but absent from the input are deleted.
    async fn apply(
        &self,
        ctx: &Context,
        namespace: &str,
        resources: &[Resource],
        prune: bool,
        labels: &[String],
    ) -> Result<Vec<Resource>>;

    /// Deletes the referenced resources, one child invocation per namespace
    /// group. Errors are collected; the first one is returned.
    async fn delete(&self, ctx: &Context, namespace: &str, refs: &[ResourceRef]) -> Result<()>;

    /// Blocks until the referenced resources are gone. A child failure whose
    /// stderr consists solely of not-found lines counts as success.
    async fn await_deletion(&self, ctx: &Context, namespace: &str, refs: &[ResourceRef])
    -> Result<()>;

    /// Reads a single resource; `NotFound` when the lookup yields nothing
    async fn get_resource(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Resource>;

    /// Snapshot of the currently matching resources. `namespace: None`
    /// queries all namespaces, an empty namespace the connection default.
    async fn get(
        &self,
        ctx: &Context,
        kinds: &[String],
        namespace: Option<&str>,
        labels: &[String],
    ) -> Result<Vec<Resource>>;

    /// Unbounded change stream for one kind/namespace/selector. The channel
    /// closes when the child exits or the context is cancelled; `watch_only`
    /// suppresses the initial snapshot.
    fn watch(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: &str,
        labels: &[String],
        watch_only: bool,
    ) -> mpsc::Receiver<ResourceEvent>;

    /// The deletable resource types the cluster knows
    async fn resource_types(&self, ctx: &Context) -> Result<Vec<ApiResourceType>>;

    /// Log lines of one container of a pod
    async fn container_logs(
        &self,
        ctx: &Context,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<String>>;
}

/// Production client spawning the platform CLI as a child process
pub struct KubectlClient {
    program: String,
    kubeconfig: Option<String>,
}

impl KubectlClient {
    pub fn new(kubeconfig: Option<String>) -> Self {
        Self {
            program: "kubectl".to_string(),
            kubeconfig,
        }
    }

    /// Overrides the invoked program, used by tests to substitute a recorded
    /// kubectl
    pub fn with_program(program: impl Into<String>, kubeconfig: Option<String>) -> Self {
        Self {
            program: program.into(),
            kubeconfig,
        }
    }

    fn final_args(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.clone());
        }
        args
    }

    async fn run(&self, ctx: &Context, args: Vec<String>, stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
        exec::run(ctx, &self.program, &self.final_args(args), stdin).await
    }
}

#[async_trait]
impl Kubectl for KubectlClient {
    async fn apply(
        &self,
        ctx: &Context,
        namespace: &str,
        resources: &[Resource],
        prune: bool,
        labels: &[String],
    ) -> Result<Vec<Resource>> {
        let mut args = str_args(&["apply", "-o", "json", "--wait"]);
        args.push(timeout_flag(ctx));
        args.extend(str_args(&["-f", "-", "--record"]));
        if !labels.is_empty() {
            args.push("-l".to_string());
            args.push(labels.join(","));
        }
        if prune {
            args.push("--prune".to_string());
        }
        if !namespace.is_empty() {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        let stdin = to_yaml_stream(resources)?;
        let stdout = self.run(ctx, args, Some(stdin.into_bytes())).await?;
        Ok(parse_resources(&stdout)?)
    }

    async fn delete(&self, ctx: &Context, namespace: &str, refs: &[ResourceRef]) -> Result<()> {
        let mut first_err = None;
        for group in group_by_namespace(refs) {
            let mut args = str_args(&["delete", "--wait"]);
            args.push(timeout_flag(ctx));
            args.extend(str_args(&["--cascade", "--ignore-not-found"]));
            args.extend(names(&group.resources));
            let ns = if group.key.is_empty() {
                namespace
            } else {
                &group.key
            };
            if !ns.is_empty() {
                args.push("-n".to_string());
                args.push(ns.to_string());
            }
            if let Err(e) = self.run(ctx, args, None).await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn await_deletion(
        &self,
        ctx: &Context,
        namespace: &str,
        refs: &[ResourceRef],
    ) -> Result<()> {
        let mut first_err = None;
        for group in group_by_namespace(refs) {
            let mut args = str_args(&["wait", "--for", "delete"]);
            args.push(timeout_flag(ctx));
            args.extend(names(&group.resources));
            let ns = if group.key.is_empty() {
                namespace
            } else {
                &group.key
            };
            if !ns.is_empty() {
                args.push("-n".to_string());
                args.push(ns.to_string());
            }
            match self.run(ctx, args, None).await {
                Ok(_) => {}
                // The resources are already gone, which is what we wait for
                Err(ClientError::Exec { stderr, .. }) if only_not_found(&stderr) => {}
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        if let Some(err) = ctx.error() {
            return Err(err);
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn get_resource(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Resource> {
        let mut args = str_args(&["get", "-o", "json", "--ignore-not-found"]);
        args.push(kind.to_lowercase());
        args.push(name.to_string());
        if !namespace.is_empty() {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        let stdout = self.run(ctx, args, None).await?;
        let not_found = || ClientError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        if stdout.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(not_found());
        }
        parse_resources(&stdout)?.into_iter().next().ok_or_else(not_found)
    }

    async fn get(
        &self,
        ctx: &Context,
        kinds: &[String],
        namespace: Option<&str>,
        labels: &[String],
    ) -> Result<Vec<Resource>> {
        let mut args = str_args(&["get", "-o", "json", "--ignore-not-found"]);
        args.push(kinds.join(",").to_lowercase());
        if !labels.is_empty() {
            args.push("-l".to_string());
            args.push(labels.join(","));
        }
        match namespace {
            Some(ns) if !ns.is_empty() => {
                args.push("-n".to_string());
                args.push(ns.to_string());
            }
            Some(_) => {}
            None => args.push("--all-namespaces".to_string()),
        }
        let stdout = self.run(ctx, args, None).await?;
        if stdout.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        Ok(parse_resources(&stdout)?)
    }

    fn watch(
        &self,
        ctx: &Context,
        kind: &str,
        namespace: &str,
        labels: &[String],
        watch_only: bool,
    ) -> mpsc::Receiver<ResourceEvent> {
        let mut args = str_args(&["get", "-o", "json", "-w"]);
        if watch_only {
            args.push("--watch-only".to_string());
        }
        args.push(kind.to_lowercase());
        if !labels.is_empty() {
            args.push("-l".to_string());
            args.push(labels.join(","));
        }
        if !namespace.is_empty() {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        exec::stream(ctx.clone(), self.program.clone(), self.final_args(args))
    }

    async fn resource_types(&self, ctx: &Context) -> Result<Vec<ApiResourceType>> {
        let args = str_args(&["api-resources", "--verbs", "delete"]);
        let stdout = self.run(ctx, args, None).await?;
        parse_resource_type_table(&String::from_utf8_lossy(&stdout))
    }

    async fn container_logs(
        &self,
        ctx: &Context,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<String>> {
        let mut args = str_args(&["logs", pod, "-c", container]);
        if !namespace.is_empty() {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        let stdout = self.run(ctx, args, None).await?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// The duration flag forwarded to the child: the remaining context budget
/// minus a one second buffer so the child fails before the context does, or
/// two minutes without a deadline.
fn timeout_flag(ctx: &Context) -> String {
    let remaining = match ctx.deadline() {
        Some(deadline) => deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(Duration::from_secs(1)),
        None => DEFAULT_TIMEOUT,
    };
    format!("--timeout={}s", remaining.as_secs())
}

fn only_not_found(stderr: &[String]) -> bool {
    !stderr.is_empty()
        && stderr
            .iter()
            .all(|line| line.trim_start().starts_with(NOT_FOUND_PREFIX))
}

fn str_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_flag_without_deadline() {
        let ctx = Context::background();
        assert_eq!(timeout_flag(&ctx), "--timeout=120s");
    }

    #[tokio::test]
    async fn test_timeout_flag_keeps_buffer_before_deadline() {
        let ctx = Context::with_timeout(Some(Duration::from_secs(61)));
        let flag = timeout_flag(&ctx);
        let secs: u64 = flag
            .trim_start_matches("--timeout=")
            .trim_end_matches('s')
            .parse()
            .unwrap();
        assert!(secs <= 60, "expected at least 1s buffer, got {flag}");
        assert!(secs >= 58, "unexpectedly small budget: {flag}");
    }

    #[test]
    fn test_only_not_found_filter() {
        let gone = vec![r#"Error from server (NotFound): pods "p1" not found"#.to_string()];
        assert!(only_not_found(&gone));

        let mixed = vec![
            r#"Error from server (NotFound): pods "p1" not found"#.to_string(),
            "Error: timed out waiting".to_string(),
        ];
        assert!(!only_not_found(&mixed));

        assert!(!only_not_found(&[]));
    }
}
