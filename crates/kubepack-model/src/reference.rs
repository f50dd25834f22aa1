//! Resource identity and grouping
//!
//! A `ResourceRef` is the immutable identity of a cluster resource. Its
//! identity key is `qualifiedKind:namespace:name` where the qualified kind
//! carries the API group suffix so that kinds from different groups never
//! collide.

use std::fmt;

/// Immutable identity of a cluster resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

impl ResourceRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Namespace, empty for cluster-scoped resources
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The part of the apiVersion before `/`, or `""` for the core group
    pub fn api_group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// Lowercased kind, suffixed with `.<apiGroup>` when the group is
    /// non-empty (e.g. `deployment.apps`, `pod`)
    pub fn qualified_kind(&self) -> String {
        let kind = self.kind.to_lowercase();
        match self.api_group() {
            "" => kind,
            group => format!("{kind}.{group}"),
        }
    }

    /// Identity key, unique within a package: `qualifiedKind:namespace:name`
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.qualified_kind(), self.namespace, self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// A group of refs sharing one key (namespace or kind)
#[derive(Debug, Clone)]
pub struct RefGroup {
    pub key: String,
    pub resources: Vec<ResourceRef>,
}

/// Groups refs by namespace, preserving first-seen group order
pub fn group_by_namespace(refs: &[ResourceRef]) -> Vec<RefGroup> {
    group_by(refs, |r| r.namespace().to_string())
}

/// Groups refs by kind, preserving first-seen group order
pub fn group_by_kind(refs: &[ResourceRef]) -> Vec<RefGroup> {
    group_by(refs, |r| r.kind().to_string())
}

fn group_by(refs: &[ResourceRef], key_fn: impl Fn(&ResourceRef) -> String) -> Vec<RefGroup> {
    let mut groups: Vec<RefGroup> = Vec::new();
    for r in refs {
        let key = key_fn(r);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.resources.push(r.clone()),
            None => groups.push(RefGroup {
                key,
                resources: vec![r.clone()],
            }),
        }
    }
    groups
}

/// `qualifiedKind/name` for each ref, the form kubectl takes on its
/// command line
pub fn names(refs: &[ResourceRef]) -> Vec<String> {
    refs.iter()
        .map(|r| format!("{}/{}", r.qualified_kind(), r.name()))
        .collect()
}

/// The refs satisfying the predicate, in input order
pub fn filter(refs: &[ResourceRef], predicate: impl Fn(&ResourceRef) -> bool) -> Vec<ResourceRef> {
    refs.iter().filter(|r| predicate(r)).cloned().collect()
}
