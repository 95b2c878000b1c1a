use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use anyhow::Context;

use super::ContentHasher;
use crate::{ledger::Fingerprint, Error, Result};

/// Lowercase hex BLAKE3 digest of the file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NoSuchFile(path.display().to_string()).into());
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to open {}", path.display())));
            }
        };

        let mut hasher = blake3::Hasher::new();
        io::copy(&mut BufReader::new(file), &mut hasher)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Fingerprint::new(hasher.finalize().to_hex().to_string()))
    }
}
