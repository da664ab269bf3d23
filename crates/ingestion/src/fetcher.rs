//! Archive fetching and extraction.
//!
//! One job downloads one date's archive and unpacks its data files into the
//! instrument/market directory. Files are first written to a staging
//! directory inside the destination and renamed into place only after the
//! whole archive extracted cleanly, so a corrupt payload never leaves a file
//! the local inventory would mistake for a complete date.

use async_trait::async_trait;
use liquidation_core::naming::has_extension;
use liquidation_core::{ArchiveNaming, DownloadJob, Error, FailureReason, JobOutcome, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::inventory::LocalInventory;
use crate::store::ObjectStore;

/// Prefix of per-job staging directories. Hidden from the inventory scan.
pub const STAGING_PREFIX: &str = ".staging-";

/// Something that can run one download job to an outcome.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    /// Run the job. Never fails: errors are captured in the outcome.
    async fn fetch(&self, job: &DownloadJob) -> JobOutcome;
}

/// Fetches archives from an object store into the local store.
pub struct ArchiveFetcher<S: ObjectStore> {
    store: Arc<S>,
    naming: ArchiveNaming,
    root: PathBuf,
    data_extension: String,
}

impl<S: ObjectStore> ArchiveFetcher<S> {
    /// Create a fetcher writing below `root`.
    pub fn new(
        store: Arc<S>,
        naming: ArchiveNaming,
        root: impl Into<PathBuf>,
        data_extension: impl Into<String>,
    ) -> Self {
        Self {
            store,
            naming,
            root: root.into(),
            data_extension: data_extension.into(),
        }
    }

    async fn extract(&self, job: &DownloadJob, payload: bytes::Bytes) -> Result<usize> {
        let dest = LocalInventory::market_dir(&self.root, &job.instrument, &job.market);
        let naming = self.naming.clone();
        let job = job.clone();
        let ext = self.data_extension.clone();
        tokio::task::spawn_blocking(move || extract_archive(&payload, &dest, &naming, &job, &ext))
            .await
            .map_err(|e| Error::extract(format!("extraction task failed: {}", e)))?
    }
}

#[async_trait]
impl<S: ObjectStore> Fetch for ArchiveFetcher<S> {
    async fn fetch(&self, job: &DownloadJob) -> JobOutcome {
        let key = self
            .naming
            .archive_key(&job.instrument, &job.market, job.date);

        let payload = match self.store.get_object(&key).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job = %job, error = %e, "Archive download failed");
                return JobOutcome::failure(FailureReason::Download, e.to_string());
            }
        };
        debug!(job = %job, bytes = payload.len(), "Archive downloaded");

        match self.extract(job, payload).await {
            Ok(files) => {
                info!(job = %job, files = files, "Archive extracted");
                JobOutcome::Success { files }
            }
            Err(e) => {
                warn!(job = %job, error = %e, "Archive extraction failed");
                JobOutcome::failure(FailureReason::Extract, e.to_string())
            }
        }
    }
}

/// Unpack the data files of a zip payload into `dest`.
///
/// Entries are flattened to their file names; entries without the data
/// extension are ignored. At least one promoted file must carry the job's
/// date under the naming convention, otherwise the local inventory would
/// never see the date: a lone data file with some other name is promoted
/// under the conventional name, anything else is an extract failure.
/// Returns the number of files promoted.
pub fn extract_archive(
    payload: &[u8],
    dest: &Path,
    naming: &ArchiveNaming,
    job: &DownloadJob,
    data_extension: &str,
) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(payload))
        .map_err(|e| Error::extract(format!("not a zip archive: {}", e)))?;

    std::fs::create_dir_all(dest)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dest)?;

    let mut staged = BTreeSet::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::extract(format!("unreadable entry {}: {}", i, e)))?;

        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::extract(format!("unsafe entry path '{}'", entry.name())));
        };
        let Some(file_name) = relative.file_name().and_then(|n| n.to_str()).map(str::to_string)
        else {
            continue;
        };

        if !has_extension(&file_name, data_extension) {
            debug!(entry = %file_name, "Skipping non-data archive entry");
            continue;
        }
        if !staged.insert(file_name.clone()) {
            return Err(Error::extract(format!("duplicate entry '{}'", file_name)));
        }

        let mut out = File::create(staging.path().join(&file_name))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| Error::extract(format!("corrupt entry '{}': {}", file_name, e)))?;
        out.sync_all()?;
    }

    if staged.is_empty() {
        return Err(Error::extract("archive contains no data files"));
    }

    let carries_date =
        |name: &str| naming.extract_symbol_date(name, &job.instrument) == Some(job.date);
    let mut promotions: Vec<(String, String)> =
        staged.iter().map(|name| (name.clone(), name.clone())).collect();

    if !staged.iter().any(|name| carries_date(name.as_str())) {
        if promotions.len() != 1 {
            return Err(Error::extract(format!(
                "none of {} data files is named for {}",
                promotions.len(),
                job.date
            )));
        }
        let conventional = naming.file_name(&job.instrument, job.date, data_extension);
        debug!(entry = %promotions[0].0, target = %conventional, "Renaming undated data file");
        promotions[0].1 = conventional;
    }

    // Dated files go last: the date becomes visible only once the rest is in place.
    promotions.sort_by_key(|(_, target)| carries_date(target.as_str()));
    promote(staging.path(), dest, &promotions)?;

    Ok(promotions.len())
}

/// Rename staged files into `dest`. On failure, files already promoted are
/// removed again.
fn promote(staging: &Path, dest: &Path, promotions: &[(String, String)]) -> Result<()> {
    let mut promoted: Vec<PathBuf> = Vec::with_capacity(promotions.len());
    for (staged, target) in promotions {
        let final_path = dest.join(target);
        if let Err(e) = std::fs::rename(staging.join(staged), &final_path) {
            for path in &promoted {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!(
                        file = %path.display(),
                        error = %remove_err,
                        "Failed to roll back promoted file"
                    );
                }
            }
            return Err(Error::extract(format!("promoting '{}' failed: {}", target, e)));
        }
        promoted.push(final_path);
    }
    Ok(())
}
