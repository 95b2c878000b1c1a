//! Logging initialization using `tracing` and `tracing-subscriber`.

use tracing::info;
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::{upload::UploadReport, Result};

/// Environment variable selecting the log output format (`human` or `json`).
pub const LOG_FORMAT_ENV: &str = "FLUPLOAD_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Human,
        }
    }
}

/// Initialize global tracing subscriber. Safe to call multiple times; subsequent
/// calls will no-op.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

/// Emit the end-of-run summary for an upload pass.
pub fn log_upload_report(root: &std::path::Path, report: &UploadReport) {
    info!(
        target = "flupload::coordinator",
        root = %root.display(),
        uploaded = report.uploaded,
        skipped = report.skipped,
        failed = report.failed,
        auth_failed = report.auth_failure.is_some(),
        "upload_run_finished"
    );
}
