//! Transient storage for the downloaded archive and the extracted tree.
//!
//! Both resources are RAII guards from `tempfile`: dropping them deletes the
//! file or directory, so every exit path out of the pipeline (success, `?`
//! early return, or unwinding) releases them without explicit cleanup.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

/// Name prefix of the temporary archive file.
pub const ARTIFACT_PREFIX: &str = "droot_gzip";
/// Name prefix of the temporary extraction directory.
pub const TREE_PREFIX: &str = "droot_raw";

/// Allocates transient resources beneath a root directory.
#[derive(Debug, Clone)]
pub struct TransientStorage {
    root: Utf8PathBuf,
}

impl TransientStorage {
    /// Allocate beneath `root`.
    #[must_use]
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Allocate beneath the system temporary directory.
    ///
    /// Falls back to `/tmp` if the system directory is not valid UTF-8.
    #[must_use]
    pub fn system() -> Self {
        let root = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
        Self::new(root)
    }

    /// The directory new resources are created in.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Create an empty uniquely named file to receive the archive.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while creating the file.
    pub fn artifact(&self) -> io::Result<TransientArtifact> {
        let file = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .tempfile_in(&self.root)?;
        Ok(TransientArtifact { file })
    }

    /// Create an empty uniquely named directory with mode `0755` to receive
    /// the extracted tree.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while creating the directory, setting its
    /// mode, or if its path is not valid UTF-8.
    pub fn tree(&self) -> io::Result<TransientTree> {
        let dir = tempfile::Builder::new()
            .prefix(TREE_PREFIX)
            .tempdir_in(&self.root)?;
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("temporary directory {} is not valid UTF-8", path.display()),
            )
        })?;
        Ok(TransientTree { dir, path })
    }
}

impl Default for TransientStorage {
    fn default() -> Self {
        Self::system()
    }
}

/// The downloaded archive. Removed when dropped.
#[derive(Debug)]
pub struct TransientArtifact {
    file: NamedTempFile,
}

impl TransientArtifact {
    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// The extracted tree. Removed recursively when dropped.
#[derive(Debug)]
pub struct TransientTree {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl TransientTree {
    /// Path of the tree's root directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The same path as a `std` path, for collaborators that take one.
    #[must_use]
    pub fn std_path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::utf8_tempdir;

    fn entries(root: &Utf8Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .expect("read root")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn artifact_is_named_and_removed_on_drop() {
        let (_temp, root) = utf8_tempdir();
        let storage = TransientStorage::new(root.clone());

        let artifact = storage.artifact().expect("artifact");
        let path = artifact.path().to_path_buf();
        assert!(path.is_file());
        assert!(
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(ARTIFACT_PREFIX))
        );

        drop(artifact);
        assert!(!path.exists());
        assert!(entries(&root).is_empty());
    }

    #[test]
    fn tree_has_mode_0755_and_is_removed_recursively() {
        let (_temp, root) = utf8_tempdir();
        let storage = TransientStorage::new(root.clone());

        let tree = storage.tree().expect("tree");
        let mode = fs::metadata(tree.path()).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(tree.path().file_name().is_some_and(|name| name.starts_with(TREE_PREFIX)));

        fs::create_dir_all(tree.path().join("usr/bin")).expect("populate");
        fs::write(tree.path().join("usr/bin/app"), b"#!/bin/sh\n").expect("populate");
        drop(tree);
        assert!(entries(&root).is_empty());
    }

    #[test]
    fn allocations_are_unique() {
        let (_temp, root) = utf8_tempdir();
        let storage = TransientStorage::new(root);
        let first = storage.tree().expect("first");
        let second = storage.tree().expect("second");
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn missing_root_is_an_error() {
        let (_temp, root) = utf8_tempdir();
        let storage = TransientStorage::new(root.join("absent"));
        assert!(storage.artifact().is_err());
        assert!(storage.tree().is_err());
    }
}
