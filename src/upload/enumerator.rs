use std::path::Path;

use walkdir::WalkDir;

use super::{FileEnumerator, FileStream};
use crate::Result;

/// Depth-first walk yielding regular files; symlinks are not followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkDirEnumerator;

impl FileEnumerator for WalkDirEnumerator {
    fn files(&self, root: &Path) -> Result<FileStream> {
        let root_display = root.display().to_string();
        let iter = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
                Ok(_) => None,
                Err(err) => Some(Err(anyhow::Error::new(err)
                    .context(format!("failed to walk {root_display}")))),
            });
        Ok(Box::new(iter))
    }
}
