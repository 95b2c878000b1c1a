use thiserror::Error;

pub mod cli;
pub mod config;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod upload;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("credentials file not found: {0}")]
    MissingCredentials(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid upload root: {0}")]
    InvalidRoot(String),
    #[error("no such file: {0}")]
    NoSuchFile(String),
    #[error("lock already held by this handle: {0}")]
    AlreadyLocked(String),
    #[error("lock is not held: {0}")]
    NotLocked(String),
    #[error("could not acquire lock {path} within {timeout_ms}ms")]
    LockTimeout { path: String, timeout_ms: u128 },
    #[error("invalid lock name: {0}")]
    InvalidLockName(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("{failed} upload(s) failed; rerun to retry them")]
    UploadsFailed { failed: usize },
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    logging::init_logging(logging::LogFormat::from_env())?;

    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    cli::dispatch(cli_args)
}
