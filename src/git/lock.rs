//! Exclusive per-mirror lock so two runs never mutate the same mirror

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Advisory lock held on `<mirror>.lock` for the lifetime of the value
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
    path: PathBuf,
}

impl MirrorLock {
    /// Take the lock for `mirror_path` without blocking
    pub fn acquire(mirror_path: &Path) -> Result<Self> {
        let path = lock_path(mirror_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|_| Error::Lock { path: path.clone() })?;
        debug!("Locked {}", path.display());

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(mirror_path: &Path) -> PathBuf {
    let mut name = mirror_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    mirror_path.with_file_name(name)
}
