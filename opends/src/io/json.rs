//! JSON file helpers: strict reads and atomic (temp file + rename) writes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Read and decode a JSON file.
///
/// A missing file is `NotFound { kind }`; a decode failure is a `Validation`
/// error naming the file.
pub fn read_json<T: DeserializeOwned>(path: &Path, kind: &'static str) -> Result<T> {
    debug!(path = %path.display(), kind, "reading json");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(kind, path.display().to_string()));
        }
        Err(err) => return Err(Error::io("read", path, err)),
    };
    serde_json::from_str(&contents)
        .map_err(|err| Error::Validation(format!("parse {} {}: {err}", kind, path.display())))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(value)
        .map_err(|err| Error::Validation(format!("serialize json: {err}")))?;
    buf.push('\n');
    Ok(buf)
}

/// Atomically write `value` as JSON (temp file + rename).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut staged = StagedWrite::default();
    staged.add_json(path, value)?;
    staged.commit()
}

/// Atomically write raw text (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut staged = StagedWrite::default();
    staged.add(path, contents.to_string());
    staged.commit()
}

/// A set of file writes committed together.
///
/// Every temp file is written, and every file about to be replaced is backed
/// up, before any rename happens. If staging fails, the temp files are removed
/// and the existing files are left untouched. If a rename fails partway, the
/// files already replaced are rolled back from their backups (best effort:
/// a failure during rollback is logged and the original error returned).
#[derive(Debug, Default)]
pub struct StagedWrite {
    files: Vec<(PathBuf, String)>,
}

/// One staged file: its temp copy and, when it already existed, a backup.
struct Staged {
    path: PathBuf,
    tmp_path: PathBuf,
    backup: Option<PathBuf>,
}

impl StagedWrite {
    pub fn add(&mut self, path: &Path, contents: String) {
        self.files.push((path.to_path_buf(), contents));
    }

    pub fn add_json<T: Serialize>(&mut self, path: &Path, value: &T) -> Result<()> {
        let buf = to_pretty_json(value)?;
        self.add(path, buf);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn commit(self) -> Result<()> {
        let mut staged: Vec<Staged> = Vec::with_capacity(self.files.len());
        for (path, contents) in &self.files {
            match stage_file(path, contents) {
                Ok(entry) => staged.push(entry),
                Err(err) => {
                    for entry in &staged {
                        remove_quietly(&entry.tmp_path);
                        if let Some(backup) = &entry.backup {
                            remove_quietly(backup);
                        }
                    }
                    return Err(err);
                }
            }
        }

        for (index, entry) in staged.iter().enumerate() {
            debug!(path = %entry.path.display(), "replacing file");
            if let Err(err) = fs::rename(&entry.tmp_path, &entry.path) {
                warn!(path = %entry.path.display(), err = %err, "rename failed; rolling back");
                roll_back(&staged[..index]);
                for pending in &staged[index..] {
                    remove_quietly(&pending.tmp_path);
                    if let Some(backup) = &pending.backup {
                        remove_quietly(backup);
                    }
                }
                return Err(Error::io("replace", &entry.path, err));
            }
        }

        for entry in &staged {
            if let Some(backup) = &entry.backup {
                remove_quietly(backup);
            }
        }
        Ok(())
    }
}

fn roll_back(applied: &[Staged]) {
    for entry in applied.iter().rev() {
        let restored = match &entry.backup {
            Some(backup) => fs::rename(backup, &entry.path),
            None => fs::remove_file(&entry.path),
        };
        if let Err(err) = restored {
            warn!(path = %entry.path.display(), err = %err, "failed to roll back file");
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), err = %err, "failed to remove temp file");
    }
}

fn stage_file(path: &Path, contents: &str) -> Result<Staged> {
    let parent = path.parent().ok_or_else(|| {
        Error::Validation(format!("path missing parent {}", path.display()))
    })?;
    fs::create_dir_all(parent).map_err(|err| Error::io("create directory", parent, err))?;
    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).map_err(|err| Error::io("write temp file", &tmp_path, err))?;

    let backup = if path.is_file() {
        let mut backup_name = file_name.to_os_string();
        backup_name.push(".bak");
        let backup_path = parent.join(backup_name);
        if let Err(err) = fs::copy(path, &backup_path) {
            remove_quietly(&tmp_path);
            return Err(Error::io("back up", path, err));
        }
        Some(backup_path)
    } else {
        None
    };

    Ok(Staged {
        path: path.to_path_buf(),
        tmp_path,
        backup,
    })
}
