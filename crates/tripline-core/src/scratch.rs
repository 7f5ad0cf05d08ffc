//! Scratch files scoped to one unit of work.
//!
//! A [`ScratchScope`] owns every path it hands out and removes them when it
//! is swept or dropped, whichever comes first. A path marked with
//! [`ScratchScope::retain`] survives the sweep and is reported back to the
//! caller instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::sink::{cleanup_tmp_files, tmp_sibling};

/// What a scratch file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchRole {
    /// Bytes exactly as downloaded
    Raw,
    /// Re-encoded columnar output
    Converted,
}

impl ScratchRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Converted => "converted",
        }
    }
}

/// Directory holding all scratch files of a run. Not touched until
/// [`ScratchSpace::prepare`].
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and sweep `.tmp` leftovers of a killed run.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let removed = cleanup_tmp_files(&self.dir)?;
        if removed > 0 {
            log::warn!(
                "Removed {removed} stale tmp file(s) from {}",
                self.dir.display()
            );
        }
        Ok(())
    }

    /// Open a scope for one unit of work.
    pub fn scope(&self, label: &str) -> ScratchScope<'_> {
        ScratchScope {
            space: self,
            label: label.to_string(),
            files: Vec::new(),
        }
    }

    /// Files currently present in the scratch directory, sorted.
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[derive(Debug)]
struct ScratchFile {
    role: ScratchRole,
    path: PathBuf,
    retained: bool,
}

/// Scratch paths acquired by one unit of work. At most one path per role.
#[derive(Debug)]
pub struct ScratchScope<'a> {
    space: &'a ScratchSpace,
    label: String,
    files: Vec<ScratchFile>,
}

impl ScratchScope<'_> {
    /// Reserve `file_name` in the scratch directory for `role`.
    ///
    /// Any previous path of the same role is removed first, as is a stale file
    /// already sitting at the new path.
    pub fn acquire(&mut self, role: ScratchRole, file_name: &str) -> io::Result<PathBuf> {
        self.release(role)?;
        let path = self.space.dir.join(file_name);
        remove_artifacts(&path)?;
        log::debug!(
            "{}: {} scratch file {}",
            self.label,
            role.as_str(),
            path.display()
        );
        self.files.push(ScratchFile {
            role,
            path: path.clone(),
            retained: false,
        });
        Ok(path)
    }

    pub fn path(&self, role: ScratchRole) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| f.role == role)
            .map(|f| f.path.as_path())
    }

    /// Remove the file for `role` now instead of at sweep time.
    ///
    /// On failure the file stays tracked and the sweep tries again.
    pub fn release(&mut self, role: ScratchRole) -> io::Result<()> {
        let Some(idx) = self.files.iter().position(|f| f.role == role) else {
            return Ok(());
        };
        remove_artifacts(&self.files[idx].path)?;
        self.files.remove(idx);
        Ok(())
    }

    /// Exempt the file for `role` from removal. Returns its path.
    pub fn retain(&mut self, role: ScratchRole) -> Option<PathBuf> {
        let file = self.files.iter_mut().find(|f| f.role == role)?;
        file.retained = true;
        Some(file.path.clone())
    }

    /// Remove every tracked file that is not retained.
    ///
    /// Removal failures are logged, never returned. Returns the retained paths.
    pub fn sweep(&mut self) -> Vec<PathBuf> {
        let mut retained = Vec::new();
        for file in self.files.drain(..) {
            if file.retained {
                retained.push(file.path);
                continue;
            }
            if let Err(e) = remove_artifacts(&file.path) {
                log::error!(
                    "{}: failed to remove {}: {e}",
                    self.label,
                    file.path.display()
                );
            }
        }
        retained
    }
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        self.sweep();
    }
}

/// Remove `path` and its `.tmp` sibling; absent files are fine.
fn remove_artifacts(path: &Path) -> io::Result<()> {
    for p in [path.to_path_buf(), tmp_sibling(path)] {
        match fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
