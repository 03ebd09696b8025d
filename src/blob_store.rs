use std::path::{Path, PathBuf};

use crate::error::CatalogError;

/// Content-addressed file storage: every image lives at `<root>/<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(BlobStore { root })
    }

    pub fn path_for(&self, id: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{id}.{ext}"))
    }

    /// Writes fresh bytes into the store and returns the path written to.
    pub fn write(&self, id: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf, CatalogError> {
        let path = self.path_for(id, ext);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Moves a file already on disk into the store. Tries a plain rename
    /// first; falls back to copy-then-remove when `src` lives on a different
    /// filesystem (rename across devices fails on most platforms).
    pub fn move_in(&self, id: &str, ext: &str, src: &Path) -> Result<PathBuf, CatalogError> {
        let dest = self.path_for(id, ext);
        if std::fs::rename(src, &dest).is_err() {
            std::fs::copy(src, &dest)?;
            std::fs::remove_file(src)?;
        }
        Ok(dest)
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, CatalogError> {
        Ok(std::fs::read(path)?)
    }

    pub fn delete(&self, path: &Path) -> Result<(), CatalogError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let path = store.write("abc", "png", b"hello").unwrap();
        assert_eq!(store.read(&path).unwrap(), b"hello");
    }

    #[test]
    fn move_in_removes_source() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().join("store")).unwrap();
        let src_dir = TempDir::new().unwrap();
        let src_path = src_dir.path().join("upload.png");
        std::fs::write(&src_path, b"content").unwrap();

        let dest = store.move_in("img1", "png", &src_path).unwrap();
        assert!(!src_path.exists());
        assert_eq!(store.read(&dest).unwrap(), b"content");
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let path = store.write("x", "png", b"data").unwrap();
        store.delete(&path).unwrap();
        store.delete(&path).unwrap();
    }
}
