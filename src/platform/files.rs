use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Raw bytes for a named file. Shared with the resource loader thread.
pub trait FileSource: Send + Sync {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Files under a root directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFiles {
    root: PathBuf,
}

impl DiskFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for DiskFiles {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(path))
    }
}

/// In-memory file table, used by tests and embedders that pack their assets.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.into(), bytes.into());
    }
}

impl FileSource for MemoryFiles {
    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_files_lookup() {
        let files = MemoryFiles::new().with("a.lua", "x = 1");
        assert_eq!(files.load(Path::new("a.lua")).unwrap(), b"x = 1");

        let err = files.load(Path::new("b.lua")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_disk_files_resolve_against_root() {
        let root = std::env::temp_dir().join(format!("script-host-files-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.lua"), "return 1").unwrap();

        let files = DiskFiles::new(&root);
        assert_eq!(files.load(Path::new("main.lua")).unwrap(), b"return 1");
        assert!(files.load(Path::new("missing.lua")).is_err());

        let _ = fs::remove_dir_all(&root);
    }
}
