//! Whole-directory snapshots of a run, used around backend invocations.
//!
//! The backend mutates the run directory in place through the shared mount,
//! so the only way to undo a failed execution is to put the old tree back.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A copy of a run directory living next to it.
#[derive(Debug)]
pub struct RunSnapshot {
    original: PathBuf,
    copy: PathBuf,
}

impl RunSnapshot {
    /// Copy `original` to `copy`, replacing any stale copy left by a crash.
    pub fn capture(original: &Path, copy: &Path) -> Result<Self> {
        if copy.exists() {
            warn!(path = %copy.display(), "removing stale run snapshot");
            remove_dir(copy)?;
        }
        copy_dir(original, copy)?;
        debug!(run_dir = %original.display(), "run snapshot captured");
        Ok(Self {
            original: original.to_path_buf(),
            copy: copy.to_path_buf(),
        })
    }

    /// Put the captured tree back, discarding whatever the backend wrote.
    pub fn restore(self) -> Result<()> {
        if self.original.exists() {
            remove_dir(&self.original)?;
        }
        fs::rename(&self.copy, &self.original)
            .map_err(|err| Error::io("restore run snapshot", &self.original, err))?;
        debug!(run_dir = %self.original.display(), "run snapshot restored");
        Ok(())
    }

    /// Drop the copy, keeping the current tree.
    pub fn discard(self) -> Result<()> {
        remove_dir(&self.copy)
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|err| Error::io("remove directory", path, err))
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|err| Error::io("create directory", to, err))?;
    let entries = fs::read_dir(from).map_err(|err| Error::io("read directory", from, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("read directory", from, err))?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| Error::io("stat", &source, err))?;
        if file_type.is_dir() {
            copy_dir(&source, &dest)?;
        } else {
            fs::copy(&source, &dest).map_err(|err| Error::io("copy", &source, err))?;
        }
    }
    Ok(())
}
