//! The `apply` command

use kubepack_engine::PackageManager;
use kubepack_kubectl::{Context, Kubectl};

use super::{SourceArgs, load_package};
use crate::error::Result;

pub async fn run<C: Kubectl + 'static>(
    ctx: &Context,
    manager: &PackageManager<C>,
    source: &SourceArgs,
    namespace: &str,
    name: &str,
    prune: bool,
) -> Result<()> {
    let pkg = load_package(source, namespace, name).await?;
    manager.apply(ctx, &pkg, prune).await?;
    Ok(())
}
