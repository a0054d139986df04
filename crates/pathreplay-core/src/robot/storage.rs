//! Durable storage for recordings
//!
//! A recording is always committed as one complete byte buffer. The file
//! backend writes it to a sibling temp file, syncs, then renames over the
//! destination, so a power loss mid-save leaves the previous recording intact.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Storage medium holding recording files
pub trait Storage {
    /// Whether the medium is present and usable (e.g. SD card inserted)
    fn is_available(&self) -> bool;

    /// Whether a file exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Open `path` for sequential reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;

    /// Atomically replace the contents of `path` with `bytes`
    fn commit(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Filesystem-backed storage rooted at a mount point
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `root`. Relative recording paths resolve
    /// against it; availability means the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The mount point
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl Storage for FileStorage {
    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn commit(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        let temp = Self::temp_path(&target);

        let result = (|| {
            let mut file = File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }
}

/// In-memory storage, used by the simulator and tests
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    files: HashMap<PathBuf, Vec<u8>>,
    available: bool,
    fail_writes: bool,
    commits: usize,
}

impl MemoryStorage {
    /// Create an empty, available medium
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            available: true,
            fail_writes: false,
            commits: 0,
        }
    }

    /// Simulate inserting or removing the medium
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Make every subsequent commit fail with an I/O error
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Place raw bytes at `path`, bypassing `commit`
    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    /// Raw bytes stored at `path`
    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn is_available(&self) -> bool {
        self.available
    }

    fn exists(&self, path: &Path) -> bool {
        self.available && self.files.contains_key(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        if !self.available {
            return Err(io::Error::new(io::ErrorKind::NotFound, "medium not present"));
        }
        let bytes = self.files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
        })?;
        Ok(Box::new(Cursor::new(bytes.as_slice())))
    }

    fn commit(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if !self.available {
            return Err(io::Error::new(io::ErrorKind::NotFound, "medium not present"));
        }
        if self.fail_writes {
            return Err(io::Error::other("simulated write failure"));
        }
        self.files.insert(path.to_path_buf(), bytes.to_vec());
        self.commits += 1;
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        (**self).open_read(path)
    }

    fn commit(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        (**self).commit(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_commit_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let path = Path::new("recording.bin");

        assert!(storage.is_available());
        assert!(!storage.exists(path));

        storage.commit(path, b"first").unwrap();
        storage.commit(path, b"second").unwrap();

        let mut contents = Vec::new();
        storage
            .open_read(path)
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, b"second");
        assert!(!dir.path().join("recording.bin.tmp").exists());
    }

    #[test]
    fn test_file_storage_missing_root() {
        let storage = FileStorage::new("/definitely/not/a/mount/point");
        assert!(!storage.is_available());
    }

    #[test]
    fn test_memory_storage_failures() {
        let mut storage = MemoryStorage::new();
        let path = Path::new("a.bin");

        storage.set_fail_writes(true);
        assert!(storage.commit(path, b"x").is_err());
        assert_eq!(storage.commit_count(), 0);

        storage.set_fail_writes(false);
        storage.commit(path, b"x").unwrap();
        assert_eq!(storage.commit_count(), 1);

        storage.set_available(false);
        assert!(!storage.exists(path));
        assert!(storage.open_read(path).is_err());
    }
}
