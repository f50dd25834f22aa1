//! Engine tests against a scripted mock client

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use kubepack_engine::{EngineError, Package, PackageManager, package_from_manifest};
use kubepack_kubectl::{ApiResourceType, ClientError, Context, Kubectl, ResourceEvent};
use kubepack_model::{Resource, ResourceRef, names, parse_resources};

type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct MockClient {
    calls: CallLog,
    /// Response for `get_resource`, keyed by resource name
    resources: HashMap<String, Resource>,
    /// Watch documents per kind
    watch_docs: HashMap<String, Vec<Resource>>,
    /// Response for `get`
    list_docs: Vec<Resource>,
}

impl MockClient {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Kubectl for MockClient {
    async fn apply(
        &self,
        _ctx: &Context,
        namespace: &str,
        resources: &[Resource],
        prune: bool,
        labels: &[String],
    ) -> Result<Vec<Resource>, ClientError> {
        let applied: Vec<String> = resources.iter().map(|r| r.id()).collect();
        self.record(format!(
            "apply ns={namespace} prune={prune} labels={} {}",
            labels.join(","),
            applied.join(" ")
        ));
        Ok(resources.to_vec())
    }

    async fn delete(
        &self,
        _ctx: &Context,
        _namespace: &str,
        refs: &[ResourceRef],
    ) -> Result<(), ClientError> {
        self.record(format!("delete {}", names(refs).join(" ")));
        Ok(())
    }

    async fn await_deletion(
        &self,
        _ctx: &Context,
        _namespace: &str,
        refs: &[ResourceRef],
    ) -> Result<(), ClientError> {
        self.record(format!("await {}", names(refs).join(" ")));
        Ok(())
    }

    async fn get_resource(
        &self,
        _ctx: &Context,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError> {
        self.record(format!("get_resource {kind} {name}"));
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn get(
        &self,
        _ctx: &Context,
        kinds: &[String],
        namespace: Option<&str>,
        labels: &[String],
    ) -> Result<Vec<Resource>, ClientError> {
        self.record(format!(
            "get {} ns={} labels={}",
            kinds.join(","),
            namespace.unwrap_or("*"),
            labels.join(",")
        ));
        Ok(self.list_docs.clone())
    }

    fn watch(
        &self,
        _ctx: &Context,
        kind: &str,
        namespace: &str,
        labels: &[String],
        watch_only: bool,
    ) -> mpsc::Receiver<ResourceEvent> {
        self.record(format!(
            "watch {kind} ns={namespace} labels={} watch_only={watch_only}",
            labels.join(",")
        ));
        let docs = self.watch_docs.get(kind).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(docs.len().max(1));
        for doc in docs {
            let _ = tx.try_send(Ok(doc));
        }
        rx
    }

    async fn resource_types(&self, _ctx: &Context) -> Result<Vec<ApiResourceType>, ClientError> {
        Ok(Vec::new())
    }

    async fn container_logs(
        &self,
        _ctx: &Context,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<String>, ClientError> {
        self.record(format!("logs {namespace}/{pod} {container}"));
        Ok(Vec::new())
    }
}

fn resource(yaml: &str) -> Resource {
    parse_resources(yaml.as_bytes()).unwrap().remove(0)
}

fn app_record(name: &str, refs_yaml: &str) -> Resource {
    resource(&format!(
        "apiVersion: k8spkg.kubepack.dev/v1alpha1\nkind: Application\nmetadata:\n  name: {name}\nspec:\n  resources:\n{refs_yaml}"
    ))
}

fn ready_deployment() -> Resource {
    resource(
        r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mydeployment
  namespace: myns
  generation: 1
  labels:
    app.kubernetes.io/part-of: mypkg
spec:
  replicas: 1
status:
  observedGeneration: 1
  replicas: 1
  readyReplicas: 1
  updatedReplicas: 1
  conditions:
    - type: Available
      status: "True"
"#,
    )
}

fn load_package(manifest: &str, name: &str) -> Package {
    package_from_manifest(manifest.as_bytes(), "", name).unwrap()
}

#[tokio::test]
async fn test_apply_records_package_applies_and_awaits_readiness() {
    let mut client = MockClient::default();
    client
        .watch_docs
        .insert("Deployment".to_string(), vec![ready_deployment()]);
    let calls = client.calls.clone();
    let manager = PackageManager::new(client, "myns");

    let pkg = load_package(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: mydeployment\n  namespace: myns\n",
        "mypkg",
    );
    manager.apply(&Context::background(), &pkg, true).await.unwrap();

    assert_eq!(
        calls.lock().unwrap().clone(),
        vec![
            // the registry record is written first
            "apply ns=myns prune=false labels= application.k8spkg.kubepack.dev:myns:mypkg",
            // then the package itself, pruned by selector
            "apply ns=myns prune=true labels=app.kubernetes.io/part-of=mypkg \
             deployment.apps:myns:mydeployment",
            // one watch per (kind, namespace) group of the required refs
            "watch Deployment ns=myns labels=app.kubernetes.io/part-of=mypkg watch_only=false",
            // the event correlator joins for every namespace the refs touch
            "watch Event ns=myns labels= watch_only=true",
        ]
    );
}

#[tokio::test]
async fn test_apply_fails_when_resources_stay_unready() {
    let pending = resource(
        r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mydeployment
  namespace: myns
  generation: 1
spec:
  replicas: 2
status:
  observedGeneration: 1
  replicas: 1
  readyReplicas: 1
  updatedReplicas: 1
"#,
    );
    let mut client = MockClient::default();
    client
        .watch_docs
        .insert("Deployment".to_string(), vec![pending]);
    let manager = PackageManager::new(client, "myns");

    let pkg = load_package(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: mydeployment\n  namespace: myns\n",
        "mypkg",
    );
    let err = manager
        .apply(&Context::background(), &pkg, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("apply package mypkg"), "got: {err}");
    assert!(
        err.to_string().contains("1 resources did not meet condition"),
        "got: {err}"
    );
}

#[tokio::test]
async fn test_delete_classifies_and_orders_teardown() {
    let record = app_record(
        "mypkg",
        r#"    - apiVersion: apiextensions.k8s.io/v1beta1
      kind: CustomResourceDefinition
      name: certificates.group
    - apiVersion: group/v1
      kind: Certificate
      namespace: a
      name: c1
    - apiVersion: apps/v1
      kind: Deployment
      namespace: a
      name: d1
    - apiVersion: apiregistration.k8s.io/v1
      kind: APIService
      name: s1
"#,
    );
    let mut client = MockClient::default();
    client.resources.insert("mypkg".to_string(), record);
    let calls = client.calls.clone();
    let manager = PackageManager::new(client, "");

    manager.delete(&Context::background(), "mypkg").await.unwrap();

    assert_eq!(
        calls.lock().unwrap().clone(),
        vec![
            "get_resource application.k8spkg.kubepack.dev mypkg",
            // CRD instances go first, then namespaced, then cluster-scoped,
            // then the CRDs themselves; each class is awaited before the next
            "delete certificate.group/c1",
            "await certificate.group/c1",
            "delete deployment.apps/d1",
            "await deployment.apps/d1",
            "delete apiservice.apiregistration.k8s.io/s1",
            "await apiservice.apiregistration.k8s.io/s1",
            "delete customresourcedefinition.apiextensions.k8s.io/certificates.group",
            "await customresourcedefinition.apiextensions.k8s.io/certificates.group",
            // finally the registry record is removed
            "delete application.k8spkg.kubepack.dev/mypkg",
        ]
    );
}

#[tokio::test]
async fn test_delete_of_unknown_package_fails() {
    let manager = PackageManager::new(MockClient::default(), "myns");
    let err = manager
        .delete(&Context::background(), "missing")
        .await
        .unwrap_err();
    assert!(err.is_app_not_found(), "got: {err}");
}

#[tokio::test]
async fn test_delete_resources_skips_owned_but_awaits_them() {
    let owned_pod = resource(
        r#"
apiVersion: v1
kind: Pod
metadata:
  name: mypod
  namespace: a
  ownerReferences:
    - apiVersion: apps/v1
      kind: ReplicaSet
      name: myreplicaset
      uid: some-uid
"#,
    );
    let deployment = resource(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: d1\n  namespace: a\n",
    );
    let client = MockClient::default();
    let calls = client.calls.clone();
    let manager = PackageManager::new(client, "");

    manager
        .delete_resources(&Context::background(), &[owned_pod, deployment])
        .await
        .unwrap();

    assert_eq!(
        calls.lock().unwrap().clone(),
        vec![
            "delete deployment.apps/d1",
            "await pod/mypod deployment.apps/d1",
        ]
    );
}

#[tokio::test]
async fn test_state_reads_record_resources_back() {
    let record = app_record(
        "mypkg",
        "    - apiVersion: apps/v1\n      kind: Deployment\n      namespace: myns\n      name: mydeployment\n",
    );
    let mut client = MockClient::default();
    client.resources.insert("mypkg".to_string(), record);
    client.list_docs = vec![ready_deployment()];
    let calls = client.calls.clone();
    let manager = PackageManager::new(client, "myns");

    let pkg = manager.state(&Context::background(), "mypkg").await.unwrap();
    assert_eq!(pkg.name, "mypkg");
    assert_eq!(pkg.resources.len(), 1);
    assert_eq!(pkg.resources[0].name(), "mydeployment");
    assert_eq!(
        calls.lock().unwrap().clone(),
        vec![
            "get_resource application.k8spkg.kubepack.dev mypkg",
            "get deployment.apps ns=myns labels=app.kubernetes.io/part-of=mypkg",
        ]
    );
}

#[tokio::test]
async fn test_list_streams_records() {
    let mut client = MockClient::default();
    client.list_docs = vec![
        app_record(
            "pkg1",
            "    - apiVersion: v1\n      kind: ConfigMap\n      namespace: a\n      name: cm\n",
        ),
        app_record("broken", "    - kind: Invalid\n"),
    ];
    let manager = PackageManager::new(client, "myns");

    let mut records = manager.list(&Context::background(), false);
    let mut ok = Vec::new();
    let mut errs = Vec::new();
    while let Some(record) = records.recv().await {
        match record {
            Ok(r) => ok.push(r.name),
            Err(e) => errs.push(e),
        }
    }
    assert_eq!(ok, ["pkg1"]);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], EngineError::InvalidRecord { .. }));
}
