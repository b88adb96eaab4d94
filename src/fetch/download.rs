use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{fetch::select::ExportName, history::LocalArchive, store::ObjectStoreClient};

#[derive(Debug, Default)]
pub struct DownloadOutcome {
    /// `(key, local path)` for each completed download.
    pub downloaded: Vec<(String, PathBuf)>,
    /// `(key, error)` for each download that failed.
    pub failed: Vec<(String, String)>,
}

/// Download each selected export into the archive, one at a time.
/// A failed download is logged and recorded; the rest still run.
pub async fn download_selected(
    store: &ObjectStoreClient,
    selected: &[ExportName],
    archive: &LocalArchive,
) -> DownloadOutcome {
    let mut out = DownloadOutcome::default();
    for export in selected {
        let dest = archive.path_for(&export.name);
        info!(key = %export.key, "downloading");
        let start = Instant::now();
        match store.download_object(&export.key, &dest).await {
            Ok(bytes) => {
                info!(key = %export.key, bytes, elapsed = ?start.elapsed(), "downloaded");
                out.downloaded.push((export.key.clone(), dest));
            }
            Err(err) => {
                error!(bucket = %store.bucket(), key = %export.key, "download failed: {:#}", err);
                out.failed.push((export.key.clone(), format!("{:#}", err)));
            }
        }
    }
    out
}
