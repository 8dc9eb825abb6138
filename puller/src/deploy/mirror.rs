//! In-place mirror deployment.

use super::{DeployError, TreeSync};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs;
use std::io::ErrorKind;

/// Reconcile `destination` with `tree` without replacing the destination.
///
/// A destination that does not exist yet is created (with its parents)
/// before the first sync. A destination that exists but is not a directory is
/// rejected rather than overwritten. A symlink to a directory is followed.
pub(super) fn mirror_sync(
    tree: &Utf8Path,
    destination: &Utf8Path,
    syncer: &dyn TreeSync,
) -> Result<Utf8PathBuf, DeployError> {
    match fs::metadata(destination) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(DeployError::DestinationNotDirectory {
                path: destination.to_owned(),
            });
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("creating {destination} for its first deployment");
            fs::create_dir_all(destination)
                .map_err(|source| DeployError::io("create", destination, source))?;
        }
        Err(source) => return Err(DeployError::io("inspect", destination, source)),
    }

    debug!("mirroring {tree} onto {destination}");
    syncer.sync(tree, destination)?;
    Ok(destination.to_owned())
}
