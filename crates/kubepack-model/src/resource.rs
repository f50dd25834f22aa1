//! Decoded cluster resources and their typed accessors

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::error::{ModelError, Result};
use crate::reference::ResourceRef;
use crate::tree;

/// An entry of a resource's `status.conditions` array. The type is
/// lowercased on extraction so condition lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub condition_type: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
}

/// An entry of `metadata.ownerReferences`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// An entry of `status.containerStatuses`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub exit_code: i64,
    pub restart_count: i64,
}

/// A decoded API document: identity plus the raw attribute tree.
/// Resources are produced by decoders and never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    raw: Value,
    reference: ResourceRef,
    conditions: Vec<Condition>,
}

impl Resource {
    /// Builds a resource view over a decoded document. Identity fields and
    /// conditions are derived eagerly; everything else is read on demand.
    pub fn from_value(raw: Value) -> Self {
        let reference = ResourceRef::new(
            tree::string_at(&raw, "apiVersion"),
            tree::string_at(&raw, "kind"),
            tree::string_at(&raw, "metadata.namespace"),
            tree::string_at(&raw, "metadata.name"),
        );
        let conditions = tree::list_at(&raw, "status.conditions")
            .iter()
            .filter_map(|entry| {
                let condition_type = tree::string_at(entry, "type");
                if condition_type.is_empty() {
                    return None;
                }
                Some(Condition {
                    condition_type: condition_type.to_lowercase(),
                    status: tree::string_at(entry, "status").eq_ignore_ascii_case("true"),
                    reason: tree::string_at(entry, "reason"),
                    message: tree::string_at(entry, "message"),
                })
            })
            .collect();
        Self {
            raw,
            reference,
            conditions,
        }
    }

    /// Fails unless apiVersion, kind and metadata.name are all non-empty
    pub fn validate(&self) -> Result<()> {
        if self.api_version().is_empty() || self.kind().is_empty() || self.name().is_empty() {
            let doc = serde_yaml::to_string(&self.raw).unwrap_or_default();
            return Err(ModelError::InvalidObject(doc.trim().to_string()));
        }
        Ok(())
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    pub fn api_version(&self) -> &str {
        self.reference.api_version()
    }

    pub fn kind(&self) -> &str {
        self.reference.kind()
    }

    pub fn namespace(&self) -> &str {
        self.reference.namespace()
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn uid(&self) -> String {
        tree::string_at(&self.raw, "metadata.uid")
    }

    pub fn id(&self) -> String {
        self.reference.id()
    }

    pub fn qualified_kind(&self) -> String {
        self.reference.qualified_kind()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// The string-to-string map at `metadata.labels`
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        if let Some(Value::Mapping(m)) = tree::lookup(&self.raw, "metadata.labels") {
            for (k, v) in m {
                labels.insert(tree::as_string(k), tree::as_string(v));
            }
        }
        labels
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        tree::list_at(&self.raw, "metadata.ownerReferences")
            .iter()
            .map(|entry| OwnerReference {
                api_version: tree::string_at(entry, "apiVersion"),
                kind: tree::string_at(entry, "kind"),
                name: tree::string_at(entry, "name"),
                uid: tree::string_at(entry, "uid"),
            })
            .collect()
    }

    /// The qualified kind a custom resource definition registers, composed
    /// from `spec.names.kind` and `spec.group`. Used to recognize instances
    /// of a CRD during deletion.
    pub fn crd_qualified_kind(&self) -> String {
        let kind = tree::string_at(&self.raw, "spec.names.kind").to_lowercase();
        match self.crd_group().as_str() {
            "" => kind,
            group => format!("{kind}.{group}"),
        }
    }

    /// `spec.group` of a custom resource definition
    pub fn crd_group(&self) -> String {
        tree::string_at(&self.raw, "spec.group")
    }

    /// Integer counters below `status.`, used by rollout conditions
    pub fn rollout_counters(&self, desired_field: &str, ready_field: &str) -> (i64, i64) {
        (
            tree::int_at(&self.raw, &format!("status.{desired_field}")),
            tree::int_at(&self.raw, &format!("status.{ready_field}")),
        )
    }

    pub fn generation(&self) -> i64 {
        tree::int_at(&self.raw, "metadata.generation")
    }

    pub fn observed_generation(&self) -> i64 {
        tree::int_at(&self.raw, "status.observedGeneration")
    }

    pub fn container_statuses(&self) -> Vec<ContainerStatus> {
        tree::list_at(&self.raw, "status.containerStatuses")
            .iter()
            .map(|entry| ContainerStatus {
                name: tree::string_at(entry, "name"),
                ready: tree::bool_at(entry, "ready"),
                exit_code: tree::int_at(entry, "lastState.terminated.exitCode"),
                restart_count: tree::int_at(entry, "restartCount"),
            })
            .collect()
    }

    /// `spec.selector.matchLabels` formatted as `k=v` selector terms
    pub fn selector_match_labels(&self) -> Vec<String> {
        let mut terms = Vec::new();
        if let Some(Value::Mapping(m)) = tree::lookup(&self.raw, "spec.selector.matchLabels") {
            for (k, v) in m {
                terms.push(format!("{}={}", tree::as_string(k), tree::as_string(v)));
            }
        }
        terms
    }

    pub fn string_at(&self, path: &str) -> String {
        tree::string_at(&self.raw, path)
    }

    pub fn int_at(&self, path: &str) -> i64 {
        tree::int_at(&self.raw, path)
    }

    /// Encodes the resource back to YAML, prefixed with a `---` document
    /// separator. Key order of the raw tree is preserved.
    pub fn to_yaml(&self) -> Result<String> {
        let body = serde_yaml::to_string(&self.raw).map_err(|e| ModelError::Encode {
            kind: self.kind().to_string(),
            name: self.name().to_string(),
            message: e.to_string(),
        })?;
        Ok(format!("---\n{body}"))
    }
}

/// Encodes a resource list as one YAML stream
pub fn to_yaml_stream(resources: &[Resource]) -> Result<String> {
    let mut out = String::new();
    for r in resources {
        out.push_str(&r.to_yaml()?);
    }
    Ok(out)
}
