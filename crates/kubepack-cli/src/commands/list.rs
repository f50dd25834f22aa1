//! The `list` command

use kubepack_engine::PackageManager;
use kubepack_kubectl::{Context, Kubectl};

use crate::error::Result;

pub async fn run<C: Kubectl + 'static>(
    ctx: &Context,
    manager: &PackageManager<C>,
    all_namespaces: bool,
) -> Result<()> {
    let mut records = manager.list(ctx, all_namespaces);
    let mut apps = Vec::new();
    let mut first_err = None;
    while let Some(record) = records.recv().await {
        match record {
            Ok(app) => apps.push(app),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }

    let name_width = apps
        .iter()
        .map(|a| a.name.len())
        .max()
        .unwrap_or(0)
        .max("APP".len());
    println!("{:<name_width$}    {}", "APP", "NAMESPACE");
    for app in &apps {
        println!("{:<name_width$}    {}", app.name, app.namespace);
    }

    first_err.map_or(Ok(()), |e| Err(e.into()))
}
