//! Durable key → bytes store the device persists into.

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File { size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

pub trait Storage: Send + Sync {
    /// Backend name reported on `/status`.
    fn name(&self) -> &'static str;

    /// `None` when the backend failed to initialise.
    fn info(&self) -> Option<StorageInfo>;

    /// Names the backend found but cannot represent.
    fn unsupported_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn exists(&self, path: &str) -> bool;

    /// `Ok(None)` when nothing is stored at `path`.
    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>>;

    /// Replaces whatever was stored at `path`.
    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &str) -> io::Result<()>;

    fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    fn is_available(&self) -> bool {
        self.info().is_some()
    }
}

/// Storage kept in RAM; contents live as long as the last clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    capacity: u64,
    fail_writes: Arc<Mutex<bool>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MemoryStorage {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Makes every subsequent write fail, for exercising persistence errors.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// Simulates a backend that failed to initialise: `info` reports nothing
    /// and every operation errors.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = !available;
        }
    }

    fn files(&self) -> io::Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        if self.unavailable.lock().map(|flag| *flag).unwrap_or(true) {
            return Err(io::Error::other("memory storage not available"));
        }
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory storage poisoned"))
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "Memory"
    }

    fn info(&self) -> Option<StorageInfo> {
        let files = self.files().ok()?;
        let used_bytes = files.values().map(|bytes| bytes.len() as u64).sum();
        Some(StorageInfo {
            total_bytes: self.capacity,
            used_bytes,
        })
    }

    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        let Ok(files) = self.files() else {
            return false;
        };
        if path == "/" || files.contains_key(&path) {
            return true;
        }
        let prefix = format!("{path}/");
        files.keys().any(|key| key.starts_with(&prefix))
    }

    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.files()?.get(&normalize(path)).cloned())
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.lock().map(|flag| *flag).unwrap_or(true) {
            return Err(io::Error::other("write rejected"));
        }
        self.files()?.insert(normalize(path), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        match self.files()?.remove(&normalize(path)) {
            Some(_) => Ok(()),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = normalize(path);
        let prefix = if path == "/" {
            path.clone()
        } else {
            format!("{path}/")
        };

        let files = self.files()?;
        let mut entries: Vec<DirEntry> = Vec::new();
        for (key, bytes) in files.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.split_once('/') {
                Some((dir, _)) => DirEntry {
                    name: dir.to_string(),
                    kind: EntryKind::Dir,
                },
                None => DirEntry {
                    name: rest.to_string(),
                    kind: EntryKind::File {
                        size: bytes.len() as u64,
                    },
                },
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }

        if entries.is_empty() && path != "/" && !files.contains_key(&path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lists_files_and_nested_directories() {
        let storage = MemoryStorage::new(1024);
        storage.write("/pwm", &[42]).unwrap();
        storage.write("/www/index.htm", b"<html>").unwrap();
        storage.write("/www/app.js", b"x").unwrap();

        let root = storage.list_dir("/").unwrap();
        assert_eq!(
            root,
            vec![
                DirEntry {
                    name: "pwm".to_string(),
                    kind: EntryKind::File { size: 1 },
                },
                DirEntry {
                    name: "www".to_string(),
                    kind: EntryKind::Dir,
                },
            ]
        );
        assert!(storage.exists("/www"));
        assert!(storage.exists("www/app.js"));
        assert!(!storage.exists("/missing"));
        assert!(storage.list_dir("/missing").is_err());
    }

    #[test]
    fn reports_usage_and_rejects_writes_on_demand() {
        let storage = MemoryStorage::new(100);
        storage.write("/a", b"1234").unwrap();
        assert_eq!(
            storage.info(),
            Some(StorageInfo {
                total_bytes: 100,
                used_bytes: 4
            })
        );

        storage.set_fail_writes(true);
        assert!(storage.write("/a", b"x").is_err());
        assert_eq!(storage.read("/a").unwrap(), Some(b"1234".to_vec()));

        storage.remove("/a").unwrap();
        assert_eq!(storage.read("/a").unwrap(), None);
    }

    #[test]
    fn unavailable_storage_reports_nothing() {
        let storage = MemoryStorage::new(100);
        storage.write("/a", b"1234").unwrap();

        storage.set_available(false);
        assert_eq!(storage.info(), None);
        assert!(!storage.is_available());
        assert!(!storage.exists("/a"));
        assert!(storage.read("/a").is_err());
        assert!(storage.list_dir("/").is_err());

        storage.set_available(true);
        assert_eq!(storage.read("/a").unwrap(), Some(b"1234".to_vec()));
    }
}
