//! Pull pipeline orchestration.
//!
//! Sequences the three stages for a validated [`PullRequest`]:
//!
//! 1. acquire the archive into a transient file,
//! 2. extract it into a transient tree,
//! 3. deploy the tree with the requested [`Strategy`].
//!
//! Each stage runs only if the previous one succeeded, and the first failure
//! is returned tagged with its stage. There are no retries. The transient
//! file and tree are RAII guards owned by [`Pipeline::run`], so they are
//! released on every path out of it.

use crate::acquire::{DownloadError, ObjectDownloader, acquire};
use crate::deploy::{Strategy, TreeSync};
use crate::error::{PullError, Result};
use crate::extract::{ArchiveExtractor, ExtractionError, extract};
use crate::output::write_step;
use crate::request::PullRequest;
use crate::transient::TransientStorage;
use camino::Utf8PathBuf;
use log::debug;
use std::io::Write;

/// Summary of a successful pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    /// Strategy that deployed the tree.
    pub strategy: Strategy,
    /// Size of the downloaded archive.
    pub bytes_downloaded: u64,
    /// Lowercase hex SHA-256 of the archive.
    pub archive_sha256: String,
    /// Number of archive entries unpacked.
    pub entries_extracted: usize,
    /// Directory now holding the content: the destination for mirror-sync,
    /// or the new slot the destination link points at for atomic-swap.
    pub deployed_tree: Utf8PathBuf,
}

/// The collaborators and settings for running pulls.
pub struct Pipeline<'a> {
    downloader: &'a dyn ObjectDownloader,
    extractor: &'a dyn ArchiveExtractor,
    syncer: &'a dyn TreeSync,
    storage: TransientStorage,
    quiet: bool,
}

impl<'a> Pipeline<'a> {
    /// Assemble a pipeline using the system temporary directory.
    #[must_use]
    pub fn new(
        downloader: &'a dyn ObjectDownloader,
        extractor: &'a dyn ArchiveExtractor,
        syncer: &'a dyn TreeSync,
    ) -> Self {
        Self {
            downloader,
            extractor,
            syncer,
            storage: TransientStorage::system(),
            quiet: false,
        }
    }

    /// Allocate transient resources from `storage` instead.
    #[must_use]
    pub fn storage(mut self, storage: TransientStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Suppress progress lines.
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Pull and deploy `request`, writing progress to `stderr`.
    ///
    /// # Errors
    ///
    /// Returns [`PullError::Configuration`] before allocating anything if a
    /// mirror-sync destination contains the storage root. Otherwise returns
    /// the first stage failure as a [`PullError`]. Failing to allocate the
    /// transient file counts as an acquisition failure and failing to
    /// allocate the transient tree as an extraction failure.
    pub fn run(&self, request: &PullRequest, stderr: &mut dyn Write) -> Result<PullOutcome> {
        request.ensure_spares(self.storage.root())?;

        let source = request.source();
        let artifact = self
            .storage
            .artifact()
            .map_err(|err| PullError::AcquisitionFailed {
                source_ref: source.to_string(),
                source: DownloadError::Io(err),
            })?;

        debug!("stage: acquisition");
        self.progress(
            stderr,
            format_args!("Downloading {source} to {}", artifact.path().display()),
        );
        let acquired = acquire(self.downloader, source, &artifact)?;

        let tree = self.storage.tree().map_err(|err| PullError::ExtractionFailed {
            source: ExtractionError::Io(err),
        })?;

        debug!("stage: extraction");
        self.progress(
            stderr,
            format_args!(
                "Extracting archive {} to {}",
                artifact.path().display(),
                tree.path()
            ),
        );
        let entries = extract(
            self.extractor,
            &artifact,
            &tree,
            request.preserve_ownership(),
        )?;
        drop(artifact);

        debug!("stage: deployment");
        let strategy = request.strategy();
        let destination = request.destination();
        self.progress(
            stderr,
            format_args!("Deploying {} to {destination} by {strategy}", tree.path()),
        );
        let deployed_tree = strategy
            .deploy(tree.path(), destination, self.syncer)
            .map_err(|source| PullError::DeploymentFailed { strategy, source })?;

        Ok(PullOutcome {
            strategy,
            bytes_downloaded: acquired.bytes,
            archive_sha256: acquired.sha256,
            entries_extracted: entries,
            deployed_tree,
        })
    }

    fn progress(&self, stderr: &mut dyn Write, message: std::fmt::Arguments<'_>) {
        if !self.quiet {
            write_step(stderr, message);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
