//! SortAndCopy (§4.4): rebuild a pak with its keys written in
//! lexicographic order, alongside a CSV manifest of what went in. Used
//! to produce deterministic, diffable pak builds.

use std::path::Path;

use ddc_backend::{Backend, BackendResult};
use tracing::debug;

use crate::read::ReadPak;
use crate::write::WritePak;

/// Read every entry out of `input_path`, write it back in key-sorted
/// order to `output_path`, and drop a `<output_path>.csv` manifest of
/// `asset,size` rows next to it.
pub async fn sort_and_copy(input_path: &Path, output_path: &Path) -> BackendResult<usize> {
    let source = ReadPak::open(input_path)?;
    let mut keys: Vec<_> = source.keys().cloned().collect();
    keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    let destination = WritePak::create(output_path)?;
    let mut manifest = String::from("asset,size\n");
    for key in &keys {
        let Some(payload) = source.get(key).await? else {
            continue;
        };
        manifest.push_str(&format!("{},{}\n", key.as_str(), payload.len()));
        destination.put(key, payload, false).await?;
    }
    destination.close().await?;

    let manifest_path = output_path.with_extension("csv");
    tokio::fs::write(&manifest_path, manifest).await?;

    debug!(input = ?input_path, output = ?output_path, entries = keys.len(), "sort-and-copy: done");
    Ok(keys.len())
}
