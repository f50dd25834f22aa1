//! The installed-package registry
//!
//! One custom cluster resource per installed package records its member
//! resource refs, enabling later list/delete/state by name. Concurrency
//! between tool instances is governed by the cluster's own write semantics.

use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use tokio::sync::mpsc;

use kubepack_kubectl::{Context, Kubectl};
use kubepack_model::{Resource, ResourceRef, tree};

use crate::error::{EngineError, Result};

pub const CRD_API_GROUP: &str = "k8spkg.kubepack.dev";
pub const CRD_API_VERSION: &str = "v1alpha1";
pub const CRD_KIND: &str = "Application";

/// An installed-package record as stored in the cluster
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub namespace: String,
    pub resources: Vec<ResourceRef>,
}

impl InstalledPackage {
    fn reference(&self) -> ResourceRef {
        ResourceRef::new(
            format!("{CRD_API_GROUP}/{CRD_API_VERSION}"),
            CRD_KIND,
            self.namespace.clone(),
            self.name.clone(),
        )
    }
}

/// Stores one `Application` resource per package
pub struct Registry<C> {
    client: Arc<C>,
}

impl<C: Kubectl + 'static> Registry<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Overwrite-applies the record for a package
    pub async fn put(&self, ctx: &Context, record: &InstalledPackage) -> Result<()> {
        let resource = record_resource(record);
        self.client
            .apply(ctx, &record.namespace, &[resource], false, &[])
            .await
            .map_err(|e| {
                EngineError::record("put", &record.namespace, &record.name, e.into())
            })?;
        Ok(())
    }

    /// Reads and materializes the record stored under `(namespace, name)`
    pub async fn get(&self, ctx: &Context, namespace: &str, name: &str) -> Result<InstalledPackage> {
        match self
            .client
            .get_resource(ctx, &record_kind(), namespace, name)
            .await
        {
            Ok(resource) => parse_record(&resource),
            Err(e) if e.is_not_found() => Err(EngineError::AppNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(EngineError::record("read", namespace, name, e.into())),
        }
    }

    /// Streams the records of a namespace; `None` streams all namespaces
    pub fn get_all(
        &self,
        ctx: &Context,
        namespace: Option<&str>,
    ) -> mpsc::Receiver<Result<InstalledPackage>> {
        let (tx, rx) = mpsc::channel(1);
        let client = self.client.clone();
        let ctx = ctx.clone();
        let namespace = namespace.map(str::to_string);
        tokio::spawn(async move {
            match client
                .get(&ctx, &[record_kind()], namespace.as_deref(), &[])
                .await
            {
                Ok(resources) => {
                    for resource in resources {
                        if tx.send(parse_record(&resource)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                }
            }
        });
        rx
    }

    /// Removes the record, to be called only after its member resources are
    /// gone
    pub async fn delete(&self, ctx: &Context, record: &InstalledPackage) -> Result<()> {
        self.client
            .delete(ctx, &record.namespace, &[record.reference()])
            .await
            .map_err(|e| {
                EngineError::record("delete", &record.namespace, &record.name, e.into())
            })?;
        Ok(())
    }
}

fn record_kind() -> String {
    format!("{}.{}", CRD_KIND.to_lowercase(), CRD_API_GROUP)
}

fn record_resource(record: &InstalledPackage) -> Resource {
    let mut refs = Vec::with_capacity(record.resources.len());
    for r in &record.resources {
        let mut entry = Mapping::new();
        entry.insert(Value::from("apiVersion"), Value::from(r.api_version()));
        entry.insert(Value::from("kind"), Value::from(r.kind()));
        entry.insert(Value::from("namespace"), Value::from(r.namespace()));
        entry.insert(Value::from("name"), Value::from(r.name()));
        refs.push(Value::Mapping(entry));
    }

    let mut metadata = Mapping::new();
    metadata.insert(Value::from("name"), Value::from(record.name.as_str()));
    if !record.namespace.is_empty() {
        metadata.insert(Value::from("namespace"), Value::from(record.namespace.as_str()));
    }
    let mut spec = Mapping::new();
    spec.insert(Value::from("resources"), Value::Sequence(refs));

    let mut root = Mapping::new();
    root.insert(
        Value::from("apiVersion"),
        Value::from(format!("{CRD_API_GROUP}/{CRD_API_VERSION}")),
    );
    root.insert(Value::from("kind"), Value::from(CRD_KIND));
    root.insert(Value::from("metadata"), Value::Mapping(metadata));
    root.insert(Value::from("spec"), Value::Mapping(spec));
    Resource::from_value(Value::Mapping(root))
}

/// Materializes a record resource. Malformed refs are skipped with a
/// warning; a record without any valid ref is an error.
fn parse_record(resource: &Resource) -> Result<InstalledPackage> {
    let entries = tree::list_at(resource.raw(), "spec.resources");
    let mut refs = Vec::with_capacity(entries.len());
    for entry in entries {
        let api_version = tree::string_at(entry, "apiVersion");
        let kind = tree::string_at(entry, "kind");
        let name = tree::string_at(entry, "name");
        if api_version.is_empty() || kind.is_empty() || name.is_empty() {
            tracing::warn!(
                "skipping invalid resource ref in app record {}",
                resource.name()
            );
            continue;
        }
        refs.push(ResourceRef::new(
            api_version,
            kind,
            tree::string_at(entry, "namespace"),
            name,
        ));
    }
    if refs.is_empty() {
        return Err(EngineError::InvalidRecord {
            name: resource.name().to_string(),
            message: "spec does not specify any valid resources".to_string(),
        });
    }
    Ok(InstalledPackage {
        name: resource.name().to_string(),
        namespace: resource.namespace().to_string(),
        resources: refs,
    })
}
