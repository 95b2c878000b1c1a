//! Command-line surface: `flupload <DIR|auto>`.

use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::info;

use crate::{Error, Result};

pub mod upload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(upload::UploadArgs),
    None,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            command: Command::None,
        }
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Upload(u) => upload::execute(u),
        Command::None => Ok(()),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "flupload",
    version,
    about = "Upload new photos from a directory exactly once"
)]
struct Cli {
    /// Directory to upload, or `auto` for the configured removable-media path
    target: Option<String>,
}

/// Parse CLI arguments into internal representation.
///
/// `--help` and `--version` print and yield [`Command::None`].
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print()?;
            return Ok(CliArgs::default());
        }
        Err(err) => return Err(Error::Cli(err.render().to_string().trim().to_string()).into()),
    };

    let command = match cli.target {
        Some(target) => Command::Upload(upload::UploadArgs { target }),
        None => {
            info!("no target given; nothing to upload");
            Command::None
        }
    };
    Ok(CliArgs { command })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
