//! On-disk cache of compiled templates
//!
//! Artifacts live at `<dir>/<dev|prod>/<h>/<hash>.compiled`, where `hash` is
//! the SHA-256 of the template name and `h` its first hex digit. Writes go
//! through a temporary file in the same directory and an atomic rename, under
//! an exclusive lock on `<artifact>.lock`, so readers never observe a partly
//! written artifact and concurrent renders compile a stale template once.
//!
//! `<dir>/.touch` is the global invalidation marker: every artifact older
//! than it is stale.

mod lock;

pub use lock::LockGuard;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

/// File name of the global invalidation marker
pub const MARKER_FILE: &str = ".touch";

/// Mode of stored artifacts on unix
#[cfg(unix)]
pub const ARTIFACT_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write cache artifact {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to acquire cache lock {path}: {source}")]
    LockAcquisitionFailed { path: PathBuf, source: io::Error },

    #[error("failed to read cache artifact {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub directory: PathBuf,
    /// Debug artifacts live apart from production ones and also go stale
    /// when their source changes
    pub debug: bool,
    pub enabled: bool,
}

impl CacheOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            debug: false,
            enabled: true,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Compiled code handed back by [`CacheManager::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: String,
    /// Where the code is stored; `None` when caching is disabled
    pub path: Option<PathBuf>,
    /// Whether the code was compiled by this call
    pub rebuilt: bool,
}

#[derive(Debug, Clone)]
pub struct CacheManager {
    options: CacheOptions,
}

impl CacheManager {
    pub fn new(options: CacheOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn directory(&self) -> &Path {
        &self.options.directory
    }

    pub fn marker_path(&self) -> PathBuf {
        self.options.directory.join(MARKER_FILE)
    }

    /// Location of the artifact for a template name
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(name.as_bytes()));
        let mode = if self.options.debug { "dev" } else { "prod" };
        self.options
            .directory
            .join(mode)
            .join(&hash[..1])
            .join(format!("{}.compiled", hash))
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        let mut path = self.artifact_path(name).into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Whether the artifact for `name` must be compiled again
    ///
    /// `source_modified` is the modification time of the template source; it
    /// only matters in debug mode.
    pub fn needs_rebuild(&self, name: &str, source_modified: Option<SystemTime>) -> bool {
        if !self.options.enabled {
            return true;
        }

        let artifact = match modified(&self.artifact_path(name)) {
            Some(time) => time,
            None => return true,
        };

        if let Some(marker) = modified(&self.marker_path()) {
            if marker >= artifact {
                return true;
            }
        }

        if self.options.debug {
            if let Some(source) = source_modified {
                return source > artifact;
            }
        }

        false
    }

    /// Read a stored artifact, if there is one
    pub fn read(&self, name: &str) -> Result<Option<String>, CacheError> {
        let path = self.artifact_path(name);
        match fs::read_to_string(&path) {
            Ok(code) => Ok(Some(code)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read { path, source }),
        }
    }

    /// Atomically replace the artifact for `name`
    pub fn store(&self, name: &str, code: &str) -> Result<PathBuf, CacheError> {
        let path = self.artifact_path(name);
        let failed = |source| CacheError::Write {
            path: path.clone(),
            source,
        };

        let parent = path.parent().unwrap_or(&self.options.directory);
        fs::create_dir_all(parent).map_err(failed)?;

        let mut temp = NamedTempFile::new_in(parent).map_err(failed)?;
        temp.write_all(code.as_bytes()).map_err(failed)?;
        temp.as_file().sync_all().map_err(failed)?;
        temp.as_file()
            .set_modified(SystemTime::now())
            .map_err(failed)?;
        // Temp files are created 0600; artifacts stay readable by other users.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(ARTIFACT_MODE))
                .map_err(failed)?;
        }
        temp.persist(&path).map_err(|err| failed(err.error))?;

        debug!("stored artifact {}", path.display());
        Ok(path)
    }

    /// Hold the exclusive lock for one artifact
    pub fn lock(&self, name: &str) -> Result<LockGuard, CacheError> {
        lock::acquire(&self.lock_path(name))
    }

    /// Return fresh cached code, compiling and storing it if stale
    pub fn load<F, E>(
        &self,
        name: &str,
        source_modified: Option<SystemTime>,
        compile: F,
    ) -> Result<Artifact, E>
    where
        F: FnOnce() -> Result<String, E>,
        E: From<CacheError>,
    {
        if !self.options.enabled {
            return Ok(Artifact {
                code: compile()?,
                path: None,
                rebuilt: true,
            });
        }

        if !self.needs_rebuild(name, source_modified) {
            if let Some(code) = self.read(name)? {
                debug!("cache hit for '{}'", name);
                return Ok(Artifact {
                    code,
                    path: Some(self.artifact_path(name)),
                    rebuilt: false,
                });
            }
        }

        self.rebuild(name, source_modified, compile)
    }

    /// Compile and store under the artifact lock
    ///
    /// Staleness is checked again once the lock is held: a caller that lost
    /// the race reads the artifact the winner just stored.
    pub fn rebuild<F, E>(
        &self,
        name: &str,
        source_modified: Option<SystemTime>,
        compile: F,
    ) -> Result<Artifact, E>
    where
        F: FnOnce() -> Result<String, E>,
        E: From<CacheError>,
    {
        let _guard = self.lock(name)?;

        if !self.needs_rebuild(name, source_modified) {
            if let Some(code) = self.read(name)? {
                debug!("'{}' was rebuilt while waiting for the lock", name);
                return Ok(Artifact {
                    code,
                    path: Some(self.artifact_path(name)),
                    rebuilt: false,
                });
            }
        }

        debug!("compiling '{}'", name);
        let code = compile()?;
        let path = self.store(name, &code)?;
        Ok(Artifact {
            code,
            path: Some(path),
            rebuilt: true,
        })
    }

    /// Invalidate every artifact by touching the marker
    pub fn flush(&self) -> Result<(), CacheError> {
        let marker = self.marker_path();
        let failed = |source| CacheError::Write {
            path: marker.clone(),
            source,
        };

        fs::create_dir_all(&self.options.directory).map_err(failed)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&marker)
            .map_err(failed)?;
        file.set_modified(SystemTime::now()).map_err(failed)?;

        debug!("flushed cache at {}", self.options.directory.display());
        Ok(())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
