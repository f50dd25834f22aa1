//! CLI commands

use std::process::Stdio;

use clap::Args;

use kubepack_engine::{Package, package_from_manifest};
use kubepack_model::read_source;

use crate::error::{CliError, Result};

pub mod apply;
pub mod delete;
pub mod list;
pub mod manifest;
pub mod status;
pub mod version;

/// Manifest source selection, mutually exclusive
#[derive(Args, Default)]
pub struct SourceArgs {
    /// Load manifest from file, directory or URL ("-" reads stdin)
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,

    /// Load manifest from a rendered overlay source
    #[arg(short = 'k', long = "kustomize", conflicts_with = "file")]
    pub kustomize: Option<String>,
}

impl SourceArgs {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.kustomize.is_none()
    }
}

/// Reads the raw manifest bytes the selected source provides
pub(crate) async fn source_bytes(source: &SourceArgs) -> Result<Vec<u8>> {
    match (&source.file, &source.kustomize) {
        (Some(_), Some(_)) => Err(CliError::args(
            "options -f and -k are mutually exclusive but both provided",
        )),
        (Some(file), None) => Ok(read_source(file).await?),
        (None, Some(overlay)) => render_overlay(overlay).await,
        (None, None) => Err(CliError::args("no source: none of option -f or -k provided")),
    }
}

/// Loads and labels a package from the selected source
pub(crate) async fn load_package(
    source: &SourceArgs,
    namespace: &str,
    name: &str,
) -> Result<Package> {
    let manifest = source_bytes(source).await?;
    Ok(package_from_manifest(&manifest, namespace, name)?)
}

/// Renders an overlay source through the external renderer
async fn render_overlay(source: &str) -> Result<Vec<u8>> {
    let output = tokio::process::Command::new("kubectl")
        .arg("kustomize")
        .arg(source)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(CliError::Overlay {
            source_path: source.to_string(),
            message: format!(
                "{}. {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(output.stdout)
}
