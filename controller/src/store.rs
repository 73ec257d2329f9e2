//! Storage backed by a directory on the host filesystem.
//!
//! Calls block; async callers run them through `spawn_blocking`.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::warn;

use fanpilot_common::{DirEntry, EntryKind, Storage, StorageInfo};

pub struct FsStorage {
    root: PathBuf,
    capacity_bytes: u64,
    available: bool,
    unsupported: Vec<String>,
    used_bytes: AtomicU64,
}

impl FsStorage {
    /// Opens (creating if needed) `root`. Failure leaves the storage in an
    /// unavailable state instead of aborting boot.
    pub fn open(root: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        let root = root.into();
        let available = match fs::create_dir_all(&root) {
            Ok(()) => true,
            Err(err) => {
                warn!("storage init failed at {}: {err}", root.display());
                false
            }
        };

        let mut unsupported = Vec::new();
        let mut used_bytes = 0;
        if available {
            used_bytes = dir_size(&root);
            collect_unsupported(&root, &root, &mut unsupported);
            for name in &unsupported {
                warn!("unsupported file name in storage: {name}");
            }
        }

        Self {
            root,
            capacity_bytes,
            available,
            unsupported,
            used_bytes: AtomicU64::new(used_bytes),
        }
    }

    /// Adjusts the cached usage after a file of `old` bytes became `new` bytes.
    fn account(&self, old: u64, new: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(old).saturating_add(new))
            });
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(ErrorKind::InvalidInput, "path escapes storage root"));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_available(&self) -> io::Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(io::Error::other("storage not available"))
        }
    }
}

fn collect_unsupported(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_name().to_str().is_none() {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push(relative.to_string_lossy().into_owned());
            continue;
        }
        if path.is_dir() {
            collect_unsupported(root, &path, out);
        }
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map_or(0, |meta| meta.len())
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

impl Storage for FsStorage {
    fn name(&self) -> &'static str {
        "HostFS"
    }

    fn info(&self) -> Option<StorageInfo> {
        self.available.then(|| StorageInfo {
            total_bytes: self.capacity_bytes,
            used_bytes: self.used_bytes.load(Ordering::Relaxed),
        })
    }

    fn unsupported_files(&self) -> Vec<String> {
        self.unsupported.clone()
    }

    fn exists(&self, path: &str) -> bool {
        self.available
            && self
                .resolve(path)
                .map(|resolved| resolved.exists())
                .unwrap_or(false)
    }

    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        self.ensure_available()?;
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            return Ok(None);
        }
        match fs::read(resolved) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.ensure_available()?;
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        let old = file_len(&resolved);
        fs::write(&resolved, bytes)?;
        self.account(old, bytes.len() as u64);
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.ensure_available()?;
        let resolved = self.resolve(path)?;
        let old = file_len(&resolved);
        fs::remove_file(resolved)?;
        self.account(old, 0);
        Ok(())
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.ensure_available()?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let meta = entry.metadata()?;
            let kind = if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File { size: meta.len() }
            };
            entries.push(DirEntry { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
