//! Extraction stage: unpack the downloaded archive into the transient tree.
//!
//! Accepts gzip- and zstd-compressed tarballs, detected from the leading
//! magic bytes rather than the object key. Each entry path is validated
//! before it is unpacked so that no entry can escape the destination
//! directory.

use crate::error::{PullError, Result};
use crate::transient::{TransientArtifact, TransientTree};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Component, Path};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Trait for extracting archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Permissions and modification times are always restored; ownership is
    /// restored only when `preserve_ownership` is set. Returns the number of
    /// entries unpacked.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedFormat`] if the archive is
    /// neither gzip nor zstd, [`ExtractionError::PathTraversal`] if any entry
    /// attempts to escape the destination directory,
    /// [`ExtractionError::EmptyArchive`] if no entry names anything below
    /// `dest_dir` (an archive of only `./` counts as empty), and
    /// [`ExtractionError::Io`] on decode or write failures.
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        preserve_ownership: bool,
    ) -> std::result::Result<usize, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction, including corrupt compressed data.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no entries.
    #[error("archive contains no entries")]
    EmptyArchive,

    /// The archive is not gzip- or zstd-compressed.
    #[error("unsupported archive format; expected a gzip or zstd compressed tarball")]
    UnsupportedFormat,
}

/// Compression wrapped around the tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// `gzip` (RFC 1952).
    Gzip,
    /// Zstandard.
    Zstd,
}

impl Compression {
    /// Identify the compression from the first bytes of a file.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::extract::Compression;
    ///
    /// assert_eq!(Compression::sniff(&[0x1f, 0x8b, 0x08, 0x00]), Some(Compression::Gzip));
    /// assert_eq!(Compression::sniff(&[0x28, 0xb5, 0x2f, 0xfd]), Some(Compression::Zstd));
    /// assert_eq!(Compression::sniff(b"PK\x03\x04"), None);
    /// ```
    #[must_use]
    pub fn sniff(magic: &[u8]) -> Option<Self> {
        if magic.starts_with(&GZIP_MAGIC) {
            Some(Self::Gzip)
        } else if magic.starts_with(&ZSTD_MAGIC) {
            Some(Self::Zstd)
        } else {
            None
        }
    }
}

/// Whether ownership is preserved when no explicit choice is made.
///
/// Only the superuser can assign arbitrary ownership, so the default is to
/// preserve it exactly when running with effective uid 0.
#[must_use]
pub fn default_preserve_ownership() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    preserve_ownership_for(unsafe { libc::geteuid() })
}

fn preserve_ownership_for(euid: libc::uid_t) -> bool {
    euid == 0
}

/// Default extractor using the `tar`, `flate2`, and `zstd` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballExtractor;

impl ArchiveExtractor for TarballExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        preserve_ownership: bool,
    ) -> std::result::Result<usize, ExtractionError> {
        let mut file = File::open(archive_path)?;
        let mut magic = Vec::with_capacity(ZSTD_MAGIC.len());
        (&mut file)
            .take(ZSTD_MAGIC.len() as u64)
            .read_to_end(&mut magic)?;
        file.rewind()?;

        let compression = Compression::sniff(&magic).ok_or(ExtractionError::UnsupportedFormat)?;
        log::debug!("unpacking {compression:?} tarball {}", archive_path.display());
        match compression {
            Compression::Gzip => unpack(
                flate2::read::GzDecoder::new(file),
                dest_dir,
                preserve_ownership,
            ),
            Compression::Zstd => unpack(zstd::Decoder::new(file)?, dest_dir, preserve_ownership),
        }
    }
}

fn unpack<R: Read>(
    reader: R,
    dest_dir: &Path,
    preserve_ownership: bool,
) -> std::result::Result<usize, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_preserve_ownerships(preserve_ownership);
    archive.set_overwrite(true);

    let mut unpacked = 0;
    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();

        validate_entry_path(&entry_path)?;

        // `.` and `./` resolve to the destination itself and carry no content.
        if entry.unpack_in(dest_dir)? && names_content(&entry_path) {
            unpacked += 1;
        }
    }

    if unpacked == 0 {
        return Err(ExtractionError::EmptyArchive);
    }

    Ok(unpacked)
}

fn names_content(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::Normal(_)))
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> std::result::Result<(), ExtractionError> {
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Unpack `artifact` into `tree`, tagging failures with the extraction stage.
///
/// # Errors
///
/// Returns [`PullError::ExtractionFailed`] wrapping the extractor's error.
pub fn extract(
    extractor: &dyn ArchiveExtractor,
    artifact: &TransientArtifact,
    tree: &TransientTree,
    preserve_ownership: bool,
) -> Result<usize> {
    let entries = extractor
        .extract(artifact.path(), tree.std_path(), preserve_ownership)
        .map_err(|source| PullError::ExtractionFailed { source })?;
    log::debug!("unpacked {entries} entries into {}", tree.path());
    Ok(entries)
}
