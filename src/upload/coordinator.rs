//! Enumerate → filter by ledger → upload → record.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, error, info, instrument, warn};

use super::{ContentHasher, FileEnumerator, UploadError, Uploader};
use crate::{
    config::Config,
    ledger::{Fingerprint, Ledger},
    lock::ExclusiveLock,
    Error, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Matched case-insensitively against the end of each file name.
    pub extension: String,
    pub lock_dir: PathBuf,
    pub lock_name: String,
    pub lock_timeout: Duration,
}

impl CoordinatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extension: config.extension().to_string(),
            lock_dir: config.lock_dir(),
            lock_name: config.lock_name.clone(),
            lock_timeout: config.lock_timeout(),
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            extension: "jpg".into(),
            lock_dir: std::env::temp_dir(),
            lock_name: "flupload".into(),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one [`UploadCoordinator::upload_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the run stopped early because credentials were refused.
    pub auth_failure: Option<String>,
}

pub struct UploadCoordinator<H, E, U> {
    ledger: Ledger,
    hasher: H,
    enumerator: E,
    uploader: U,
    options: CoordinatorOptions,
}

impl<H, E, U> UploadCoordinator<H, E, U>
where
    H: ContentHasher,
    E: FileEnumerator,
    U: Uploader,
{
    pub fn new(
        ledger: Ledger,
        hasher: H,
        enumerator: E,
        uploader: U,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            ledger,
            hasher,
            enumerator,
            uploader,
            options,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Upload every new image under `root`, one at a time.
    ///
    /// An authentication failure ends the run with `Ok`, carrying the message
    /// in [`UploadReport::auth_failure`]. Every other error aborts the run.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub fn upload_all(&mut self, root: &Path) -> Result<UploadReport> {
        let mut report = UploadReport::default();
        match self.process_tree(root, &mut report) {
            Ok(()) => Ok(report),
            Err(err) => match err.downcast_ref::<Error>() {
                Some(Error::Authentication(msg)) => {
                    error!(reason = %msg, "authentication failed; stopping, rerun after fixing credentials");
                    report.auth_failure = Some(msg.clone());
                    Ok(report)
                }
                _ => Err(err),
            },
        }
    }

    fn process_tree(&mut self, root: &Path, report: &mut UploadReport) -> Result<()> {
        for path in self.enumerator.files(root)? {
            let path = path?;
            if !self.is_candidate(&path) {
                continue;
            }

            let fingerprint = self.hasher.fingerprint(&path)?;
            if self.ledger.contains(&fingerprint) {
                debug!(path = %path.display(), "already uploaded");
                report.skipped += 1;
                continue;
            }

            info!(path = %path.display(), "uploading");
            match self.uploader.upload(&path) {
                Ok(()) => {
                    self.mark_processed(&path, &fingerprint)?;
                    report.uploaded += 1;
                }
                Err(UploadError::Authentication(msg)) => {
                    return Err(Error::Authentication(msg).into());
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "upload failed; will retry next run");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// ASCII case-insensitive suffix match on the raw file name bytes, so
    /// names that are not valid UTF-8 still qualify.
    fn is_candidate(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.as_encoded_bytes();
        let suffix = format!(".{}", self.options.extension);
        let suffix = suffix.as_bytes();
        name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }

    fn mark_processed(&mut self, path: &Path, fingerprint: &Fingerprint) -> Result<()> {
        let annotation = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let lock = ExclusiveLock::named_in(&self.options.lock_dir, &self.options.lock_name)?;
        let guard = lock.acquire(self.options.lock_timeout)?;
        self.ledger.record(&guard, fingerprint, &annotation)?;
        guard.release()
    }
}
