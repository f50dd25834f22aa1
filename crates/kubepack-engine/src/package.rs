//! Package identity and manifest labelling
//!
//! A package is declared by two labels on each member resource: `part-of`
//! carrying the package name and `namespaces` carrying the period-joined set
//! of namespaces the package spans. Loading a manifest either validates the
//! labels or, when a name is supplied, injects them.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_yaml::{Mapping, Value};

use kubepack_model::{Resource, ResourceRef, parse_resources};

use crate::error::{EngineError, Result};

/// See https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const PKG_NAME_LABEL: &str = "app.kubernetes.io/part-of";
pub const PKG_MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const PKG_NS_LABEL: &str = "kubepack.dev/namespaces";

/// Value of the managed-by label on every applied resource
pub const MANAGER_NAME: &str = "kubepack";

/// A named collection of cluster resources applied and managed together
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub namespace: String,
    pub resources: Vec<Resource>,
}

impl Package {
    pub fn refs(&self) -> Vec<ResourceRef> {
        self.resources.iter().map(|r| r.reference().clone()).collect()
    }
}

/// Builds a package from a loaded manifest.
///
/// With an empty `name` every resource must already carry a consistent
/// `part-of` label. With a name the manifest is transformed: the package
/// labels are injected into each document.
pub fn package_from_manifest(manifest: &[u8], namespace: &str, name: &str) -> Result<Package> {
    let mut resources = parse_resources(manifest)?;
    if resources.is_empty() {
        return Err(EngineError::NoObjects);
    }
    let pkg_name = if name.is_empty() {
        declared_name(&resources)?
    } else {
        resources = inject_package_labels(resources, name, namespace);
        name.to_string()
    };

    let mut seen = HashSet::new();
    for r in &resources {
        if !seen.insert(r.id()) {
            return Err(EngineError::DuplicateResource { id: r.id() });
        }
    }
    Ok(Package {
        name: pkg_name,
        namespace: namespace.to_string(),
        resources,
    })
}

/// The package name the resources already agree on
fn declared_name(resources: &[Resource]) -> Result<String> {
    let mut name = String::new();
    for r in resources {
        let declared = r.labels().get(PKG_NAME_LABEL).cloned().unwrap_or_default();
        if declared.is_empty() {
            return Err(EngineError::MissingNameLabel {
                id: r.id(),
                label: PKG_NAME_LABEL.to_string(),
            });
        }
        if !name.is_empty() && name != declared {
            return Err(EngineError::ConflictingNames {
                label: PKG_NAME_LABEL.to_string(),
            });
        }
        name = declared;
    }
    Ok(name)
}

/// Injects part-of, managed-by and the namespaces label into each document
fn inject_package_labels(resources: Vec<Resource>, name: &str, namespace: &str) -> Vec<Resource> {
    let mut namespaces: BTreeSet<String> = resources
        .iter()
        .map(|r| r.namespace().to_string())
        .filter(|ns| !ns.is_empty())
        .collect();
    if !namespace.is_empty() {
        namespaces.insert(namespace.to_string());
    }
    let ns_label = namespaces.into_iter().collect::<Vec<_>>().join(".");

    let mut labels = BTreeMap::new();
    labels.insert(PKG_NAME_LABEL.to_string(), name.to_string());
    labels.insert(PKG_MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string());
    if !ns_label.is_empty() {
        labels.insert(PKG_NS_LABEL.to_string(), ns_label);
    }

    resources
        .into_iter()
        .map(|r| {
            let mut raw = r.raw().clone();
            set_labels(&mut raw, &labels);
            Resource::from_value(raw)
        })
        .collect()
}

fn set_labels(root: &mut Value, labels: &BTreeMap<String, String>) {
    let Value::Mapping(map) = root else { return };
    let metadata_key = Value::from("metadata");
    if !map.contains_key(&metadata_key) {
        map.insert(metadata_key.clone(), Value::Mapping(Mapping::new()));
    }
    let Some(Value::Mapping(metadata)) = map.get_mut(&metadata_key) else {
        return;
    };
    let labels_key = Value::from("labels");
    if !metadata.contains_key(&labels_key) {
        metadata.insert(labels_key.clone(), Value::Mapping(Mapping::new()));
    }
    let Some(Value::Mapping(label_map)) = metadata.get_mut(&labels_key) else {
        return;
    };
    for (k, v) in labels {
        label_map.insert(Value::from(k.clone()), Value::from(v.clone()));
    }
}

/// The package name and namespace set declared by a set of resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub namespaces: Vec<String>,
}

/// Lists the packages declared within the provided resources by their
/// labels. Warns when a package has cluster-scoped members without the
/// namespaces label, as those cannot be retrieved completely later.
pub fn package_infos(resources: &[Resource]) -> Result<Vec<PackageInfo>> {
    let mut by_name: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut ns_label_missing: BTreeSet<String> = BTreeSet::new();
    for r in resources {
        let labels = r.labels();
        let name = labels.get(PKG_NAME_LABEL).cloned().unwrap_or_default();
        if name.is_empty() {
            return Err(EngineError::MissingNameLabel {
                id: r.id(),
                label: PKG_NAME_LABEL.to_string(),
            });
        }
        let namespaces = by_name.entry(name.clone()).or_default();
        let ns_label = labels.get(PKG_NS_LABEL).cloned().unwrap_or_default();
        if r.namespace().is_empty() && ns_label.is_empty() {
            ns_label_missing.insert(name);
        }
        for ns in ns_label.split('.').filter(|ns| !ns.is_empty()) {
            namespaces.insert(ns.to_string());
        }
        if !r.namespace().is_empty() {
            namespaces.insert(r.namespace().to_string());
        }
    }
    Ok(by_name
        .into_iter()
        .map(|(name, namespaces)| {
            if ns_label_missing.contains(&name) && !namespaces.is_empty() {
                tracing::warn!(
                    "package {name} has cluster-scoped resources without the {PKG_NS_LABEL} label \
                     but namespaced resources as well"
                );
            }
            PackageInfo {
                name,
                namespaces: namespaces.into_iter().collect(),
            }
        })
        .collect())
}
