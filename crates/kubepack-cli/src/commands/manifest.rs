//! The `manifest` command (aka `build`)

use kubepack_engine::{PackageManager, package_infos};
use kubepack_kubectl::{Context, Kubectl};
use kubepack_model::to_yaml_stream;

use super::{SourceArgs, load_package};
use crate::error::{CliError, Result};

pub async fn run<C: Kubectl + 'static>(
    ctx: &Context,
    manager: &PackageManager<C>,
    source: &SourceArgs,
    namespace: &str,
    name: &str,
    package: Option<&str>,
) -> Result<()> {
    let pkg = match package {
        Some(pkg_name) => {
            if !source.is_empty() {
                return Err(CliError::args(
                    "package name argument and -f or -k option are mutually exclusive but both provided",
                ));
            }
            if pkg_name.is_empty() {
                return Err(CliError::args("empty package name argument provided"));
            }
            manager.state(ctx, pkg_name).await?
        }
        None => load_package(source, namespace, name).await?,
    };

    if let Ok(infos) = package_infos(&pkg.resources) {
        for info in infos {
            tracing::debug!(
                "manifest declares package {} spanning namespaces [{}]",
                info.name,
                info.namespaces.join(", ")
            );
        }
    }
    print!("{}", to_yaml_stream(&pkg.resources)?);
    Ok(())
}
