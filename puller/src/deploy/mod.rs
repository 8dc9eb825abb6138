//! Deployment strategies for moving an extracted tree to its destination.
//!
//! Two strategies are supported:
//!
//! - [`Strategy::MirrorSync`] reconciles the destination in place. The path
//!   identity of the destination never changes; only individual files do.
//! - [`Strategy::AtomicSwap`] copies the tree into a fresh sibling slot and
//!   then renames a symbolic link over the destination, so readers see either
//!   the old tree or the new one and nothing in between.
//!
//! # Sub-modules
//!
//! - [`rsync`]: the [`TreeSync`] seam and its `rsync` implementation.
//! - `mirror`: in-place mirror deployment.
//! - `swap`: slot creation and atomic repoint.

mod mirror;
pub mod rsync;
mod swap;

pub use rsync::{RsyncTreeSync, SyncError, TreeSync};

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the extracted tree reaches its permanent destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Incremental in-place reconciliation of the destination directory.
    #[default]
    MirrorSync,
    /// Build a new tree beside the destination, then repoint a symlink at it.
    AtomicSwap,
}

impl Strategy {
    /// Return the canonical name of the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MirrorSync => "mirror-sync",
            Self::AtomicSwap => "atomic-swap",
        }
    }

    /// Deploy `tree` to `destination` using this strategy.
    ///
    /// Returns the directory now holding the deployed content: the
    /// destination itself for mirror-sync, or the newly created slot that the
    /// destination link points at for atomic-swap.
    ///
    /// # Errors
    ///
    /// Returns a [`DeployError`] if the destination cannot be prepared, the
    /// sync fails, or the repoint fails. For atomic-swap any failure leaves
    /// the previous destination target in place.
    pub fn deploy(
        self,
        tree: &Utf8Path,
        destination: &Utf8Path,
        syncer: &dyn TreeSync,
    ) -> Result<Utf8PathBuf, DeployError> {
        match self {
            Self::MirrorSync => mirror::mirror_sync(tree, destination, syncer),
            Self::AtomicSwap => swap::atomic_swap(tree, destination, syncer),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy name that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "invalid mode \"{name}\"; expected 'mirror-sync' or 'atomic-swap' (aliases 'rsync' and 'symlink')"
)]
pub struct UnknownStrategy {
    /// The rejected name.
    pub name: String,
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    /// Parse a strategy name, accepting the legacy `rsync`/`symlink` aliases.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::deploy::Strategy;
    ///
    /// assert_eq!("rsync".parse::<Strategy>(), Ok(Strategy::MirrorSync));
    /// assert_eq!("atomic-swap".parse::<Strategy>(), Ok(Strategy::AtomicSwap));
    /// assert!("copy".parse::<Strategy>().is_err());
    /// ```
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim() {
            "mirror-sync" | "rsync" => Ok(Self::MirrorSync),
            "atomic-swap" | "symlink" => Ok(Self::AtomicSwap),
            other => Err(UnknownStrategy {
                name: other.to_owned(),
            }),
        }
    }
}

/// Errors arising while deploying an extracted tree.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The sync primitive failed.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    /// The mirror-sync destination exists but is not a directory.
    #[error("destination {path} exists but is not a directory")]
    DestinationNotDirectory {
        /// The offending destination path.
        path: Utf8PathBuf,
    },

    /// The atomic-swap destination exists but is not a symbolic link.
    #[error("destination {path} exists and is not a symbolic link; it cannot be swapped atomically")]
    DestinationNotSymlink {
        /// The offending destination path.
        path: Utf8PathBuf,
    },

    /// The destination has no parent directory to hold a sibling slot.
    #[error("destination {path} has no parent directory")]
    NoParent {
        /// The offending destination path.
        path: Utf8PathBuf,
    },

    /// A filesystem operation on the destination side failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// The operation that failed (create, link, repoint, ...).
        action: &'static str,
        /// The path the operation targeted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    pub(crate) fn io(action: &'static str, path: &Utf8Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_owned(),
            source,
        }
    }
}
