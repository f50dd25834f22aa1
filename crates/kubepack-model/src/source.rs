//! Manifest source loading
//!
//! A manifest source is a local file, a directory of `*.yaml` files, an
//! HTTP(S) URL or `-` for standard input. The loader returns the raw bytes;
//! decoding happens separately.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::{ModelError, Result};

/// Reads the manifest bytes the given source points at
pub async fn read_source(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        return Ok(buf);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return download(source).await;
    }
    read_path(Path::new(source), source).await
}

async fn download(source: &str) -> Result<Vec<u8>> {
    let url = url::Url::parse(source).map_err(|e| ModelError::source(source, e))?;
    let response = reqwest::get(url)
        .await
        .map_err(|e| ModelError::source(source, e))?;
    if !response.status().is_success() {
        return Err(ModelError::source(
            source,
            format!("server responded with status {}", response.status()),
        ));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| ModelError::source(source, e))?;
    if body.is_empty() {
        return Err(ModelError::source(source, "0 bytes received"));
    }
    Ok(body.to_vec())
}

async fn read_path(path: &Path, source: &str) -> Result<Vec<u8>> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ModelError::source(source, e))?;
    if !meta.is_dir() {
        return tokio::fs::read(path)
            .await
            .map_err(|e| ModelError::source(source, e));
    }
    // Directory source: concatenate its yaml files in name order
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| ModelError::source(source, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ModelError::source(source, e))?
    {
        let entry_path = entry.path();
        if entry_path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            files.push(entry_path);
        }
    }
    if files.is_empty() {
        return Err(ModelError::source(
            source,
            "no yaml files contained within dir",
        ));
    }
    files.sort();
    let mut buf = Vec::new();
    for file in files {
        if !buf.is_empty() {
            buf.extend_from_slice(b"\n---\n");
        }
        let content = tokio::fs::read(&file)
            .await
            .map_err(|e| ModelError::source(source, e))?;
        buf.extend_from_slice(&content);
    }
    Ok(buf)
}
