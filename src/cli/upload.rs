//! Implementation of the upload run behind `flupload <TARGET>`.

use std::path::Path;

use tracing::info;

use crate::{
    config::{self, Config},
    ledger::Ledger,
    logging,
    upload::{
        Blake3Hasher, CoordinatorOptions, HttpUploader, UploadCoordinator, UploadReport,
        WalkDirEnumerator,
    },
    Error, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArgs {
    /// Directory path or the `auto` keyword.
    pub target: String,
}

pub fn execute(args: UploadArgs) -> Result<()> {
    let config = config::load()?;
    let root = config.resolve_target(&args.target);
    let report = upload_dir(&config, &root)?;

    // Credentials refused or uploads left for a retry: the run itself ended
    // cleanly, but the exit status must not report success.
    if let Some(reason) = report.auth_failure {
        return Err(Error::Authentication(reason).into());
    }
    if report.failed > 0 {
        return Err(Error::UploadsFailed {
            failed: report.failed,
        }
        .into());
    }
    Ok(())
}

/// Run one pass over `root` with the default collaborators.
pub fn upload_dir(config: &Config, root: &Path) -> Result<UploadReport> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(root.display().to_string()).into());
    }
    let root = root
        .canonicalize()
        .map_err(|e| Error::InvalidRoot(format!("{}: {e}", root.display())))?;

    let ledger = Ledger::open(config.ledger_path()?)?;
    info!(
        root = %root.display(),
        ledger = %ledger.path().display(),
        known = ledger.len(),
        "starting upload run"
    );

    let uploader = HttpUploader::from_config(config)?;
    let mut coordinator = UploadCoordinator::new(
        ledger,
        Blake3Hasher,
        WalkDirEnumerator,
        uploader,
        CoordinatorOptions::from_config(config),
    );
    let report = coordinator.upload_all(&root)?;
    logging::log_upload_report(&root, &report);
    Ok(report)
}
