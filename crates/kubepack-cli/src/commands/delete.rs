//! The `delete` command

use kubepack_engine::{EngineError, PackageManager};
use kubepack_kubectl::{Context, Kubectl};
use kubepack_model::parse_resources;

use super::{SourceArgs, source_bytes};
use crate::error::{CliError, Result};

pub async fn run<C: Kubectl + 'static>(
    ctx: &Context,
    manager: &PackageManager<C>,
    source: &SourceArgs,
    package: Option<&str>,
) -> Result<()> {
    match package {
        Some(name) => {
            if !source.is_empty() {
                return Err(CliError::args(
                    "package name argument and -f or -k option are mutually exclusive but both provided",
                ));
            }
            if name.is_empty() {
                return Err(CliError::args("empty package name argument provided"));
            }
            manager.delete(ctx, name).await?;
        }
        None => {
            let manifest = source_bytes(source).await?;
            let resources = parse_resources(&manifest)?;
            if resources.is_empty() {
                return Err(EngineError::NoObjects.into());
            }
            manager.delete_resources(ctx, &resources).await?;
        }
    }
    Ok(())
}
