//! Kubepack Engine - the reconciliation core
//!
//! This crate composes the resource model, the cluster client and the status
//! layer into the apply/delete orchestrator:
//! - **Package identity**: the labels that declare a package and the
//!   transform injecting them into a loaded manifest
//! - **Installed-package registry**: one cluster record per installed
//!   package, enabling later list/delete/state by name
//! - **Event correlator**: cluster events filtered down to the package's
//!   resources, deduplicated, with container-log extraction on `BackOff`
//! - **Package manager**: apply with readiness await, safely ordered
//!   teardown, state and list

pub mod error;
pub mod events;
pub mod manager;
pub mod package;
pub mod registry;

pub use error::{EngineError, Result};
pub use events::{Event, watch_events};
pub use manager::PackageManager;
pub use package::{
    MANAGER_NAME, PKG_MANAGED_BY_LABEL, PKG_NAME_LABEL, PKG_NS_LABEL, Package, PackageInfo,
    package_from_manifest, package_infos,
};
pub use registry::{InstalledPackage, Registry};
