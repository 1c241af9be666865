use super::{validate_key, Error, Store};
use crate::Key;
use bytes::Bytes;
use commonware_utils::{from_hex, hex};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::warn;

/// Suffix of files holding a write that has not yet been renamed into place.
const TEMPORARY_SUFFIX: &str = ".tmp";

/// Syncs a directory to ensure directory entry changes are durable.
/// On Unix, directory metadata (file creation/deletion) must be explicitly
/// fsynced.
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<(), Error> {
    fs::File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<(), Error> {
    Ok(())
}

/// Write `value` to `temporary`, sync it, and rename it over `path`.
fn replace(temporary: &Path, path: &Path, value: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temporary)?;
    file.write_all(value)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temporary, path)
}

/// Configuration for [Disk] storage.
#[derive(Clone)]
pub struct Config {
    /// The directory holding one file per stored key.
    pub directory: PathBuf,
}

impl Config {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

/// Filesystem implementation of [Store].
///
/// Each value lives in `<directory>/<hex(key)>`. Writes go to a temporary file that is synced
/// and then renamed over the destination, so readers never observe a partial value.
#[derive(Clone)]
pub struct Disk {
    lock: Arc<Mutex<()>>,
    cfg: Config,
}

impl Disk {
    /// Open (creating if needed) the directory in `cfg`.
    ///
    /// Temporary files left behind by writes that never completed are removed.
    pub fn init(cfg: Config) -> Result<Self, Error> {
        fs::create_dir_all(&cfg.directory)?;

        let mut removed = false;
        for entry in fs::read_dir(&cfg.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(TEMPORARY_SUFFIX) {
                warn!(name, "removing incomplete write");
                fs::remove_file(entry.path())?;
                removed = true;
            }
        }
        if removed {
            sync_dir(&cfg.directory)?;
        }

        Ok(Self {
            lock: Arc::new(Mutex::new(())),
            cfg,
        })
    }

    /// Remove the directory and everything in it.
    pub fn destroy(self) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::remove_dir_all(&self.cfg.directory)?;
        Ok(())
    }

    fn path(&self, key: &Key) -> PathBuf {
        self.cfg.directory.join(hex(key.as_bytes()))
    }
}

impl Store for Disk {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        validate_key(key)?;
        let path = self.path(key);
        let mut temporary = path.clone().into_os_string();
        temporary.push(TEMPORARY_SUFFIX);

        // Acquire the filesystem lock
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Write the full value to a temporary file before exposing it
        if let Err(err) = replace(Path::new(&temporary), &path, &value) {
            if let Err(cleanup) = fs::remove_file(&temporary) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(?cleanup, "unable to remove incomplete write");
                }
            }
            return Err(err.into());
        }

        // Make the rename durable
        sync_dir(&self.cfg.directory)
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        match fs::read(self.path(key)) {
            Ok(value) => Ok(Some(Bytes::from(value))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove(&self, key: &Key) -> Result<bool, Error> {
        if validate_key(key).is_err() {
            return Ok(false);
        }

        // Acquire the filesystem lock
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(self.path(key)) {
            Ok(()) => {
                sync_dir(&self.cfg.directory)?;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn stat(&self, key: &Key) -> Result<Option<u64>, Error> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        match fs::metadata(self.path(key)) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn scan(&self) -> Result<Vec<Key>, Error> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.cfg.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name
                .to_str()
                .ok_or_else(|| Error::DirectoryCorrupt(name.to_string_lossy().into()))?;
            if name.ends_with(TEMPORARY_SUFFIX) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                return Err(Error::DirectoryCorrupt(name.into()));
            }
            let key = from_hex(name).ok_or_else(|| Error::DirectoryCorrupt(name.into()))?;
            keys.push(Key::new(key));
        }
        keys.sort();
        Ok(keys)
    }
}
