//! Data directory layout: store generations, the `CURRENT` pointer and the
//! build lock.
//!
//! ```text
//! <data_dir>/
//!   CURRENT                 name of the active generation
//!   build.lock              present only while a build runs
//!   generations/<name>/     one complete store per build
//! ```
//!
//! Readers resolve the store only through `CURRENT`, which is replaced by an
//! atomic rename after the new generation is fully written.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::utils::write_atomic;

pub const CURRENT_FILE: &str = "CURRENT";
pub const LOCK_FILE: &str = "build.lock";
pub const GENERATIONS_DIR: &str = "generations";

const GENERATION_PREFIX: &str = "gen-";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    pub fn generation_path(&self, name: &str) -> PathBuf {
        self.generations_dir().join(name)
    }

    /// Name of the active generation, or `None` before the first publish.
    pub fn current(&self) -> io::Result<Option<String>> {
        let content = match fs::read_to_string(self.root.join(CURRENT_FILE)) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let name = content.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if !is_valid_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid generation name in {CURRENT_FILE}: {name:?}"),
            ));
        }
        Ok(Some(name.to_string()))
    }

    /// Take the single-writer build lock.
    pub fn lock(&self) -> Result<BuildLock, BuildError> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(BuildError::Locked(path));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "build lock acquired");
        Ok(BuildLock { path })
    }

    /// Create a fresh, empty generation directory. The name embeds the UTC
    /// build time and the corpus checksum prefix.
    pub fn allocate(&self, checksum: Option<&str>) -> io::Result<(String, PathBuf)> {
        fs::create_dir_all(self.generations_dir())?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let base = match checksum {
            Some(c) if c.len() >= 8 => format!("{GENERATION_PREFIX}{stamp}-{}", &c[..8]),
            _ => format!("{GENERATION_PREFIX}{stamp}"),
        };

        let mut attempt = 1usize;
        loop {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.generation_path(&name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok((name, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Point `CURRENT` at `name`.
    pub fn publish(&self, name: &str) -> io::Result<()> {
        write_atomic(&self.root.join(CURRENT_FILE), format!("{name}\n").as_bytes())?;
        info!(generation = name, "generation published");
        Ok(())
    }

    /// Generation names, oldest first.
    pub fn list(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.generations_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(GENERATION_PREFIX) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete the oldest generations so that at most `keep` remain. The active
    /// generation is never deleted. Returns the removed names.
    pub fn prune(&self, keep: usize) -> io::Result<Vec<String>> {
        let keep = keep.max(1);
        let current = self.current()?;
        let names = self.list()?;
        if names.len() <= keep {
            return Ok(Vec::new());
        }

        let excess = names.len() - keep;
        let mut removed = Vec::new();
        for name in names {
            if removed.len() == excess {
                break;
            }
            if current.as_deref() == Some(name.as_str()) {
                continue;
            }
            match fs::remove_dir_all(self.generation_path(&name)) {
                Ok(()) => {
                    debug!(generation = %name, "pruned generation");
                    removed.push(name);
                }
                Err(e) => warn!(generation = %name, error = %e, "failed to prune generation"),
            }
        }
        Ok(removed)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// Held for the duration of a build; removes `build.lock` on drop.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove build lock");
        }
    }
}
