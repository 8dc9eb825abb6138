//! Atomic symlink swap deployment.
//!
//! The destination is a symbolic link. Each deployment copies the tree into a
//! new sibling slot named `.<name>.droot-<pid>-<nanos>-<n>` and then renames a
//! freshly created link over the destination. `rename(2)` replaces the old
//! link in one step, so a reader resolving the destination sees either the old
//! slot or the new one. The old slot is left in place.

use super::{DeployError, TreeSync};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use std::io::{self, ErrorKind};
use std::time::{SystemTime, UNIX_EPOCH};

/// How many names to try before giving up on creating a fresh slot.
const SLOT_ATTEMPTS: u32 = 16;

pub(super) fn atomic_swap(
    tree: &Utf8Path,
    destination: &Utf8Path,
    syncer: &dyn TreeSync,
) -> Result<Utf8PathBuf, DeployError> {
    swap_with(tree, destination, syncer, |from, to| fs::rename(from, to))
}

/// [`atomic_swap`] with the final link rename supplied by the caller.
fn swap_with(
    tree: &Utf8Path,
    destination: &Utf8Path,
    syncer: &dyn TreeSync,
    rename: impl Fn(&Utf8Path, &Utf8Path) -> io::Result<()>,
) -> Result<Utf8PathBuf, DeployError> {
    let (parent, name) = split_destination(destination)?;
    ensure_replaceable(destination)?;
    fs::create_dir_all(parent).map_err(|source| DeployError::io("create", parent, source))?;

    let slot = create_unique(parent, name, "droot", |path| fs::create_dir(path))?;
    debug!("populating slot {slot} from {tree}");
    if let Err(err) = syncer.sync(tree, &slot) {
        discard_slot(&slot);
        return Err(err.into());
    }

    if let Err(err) = repoint(&slot, destination, parent, name, rename) {
        discard_slot(&slot);
        return Err(err);
    }

    debug!("{destination} now points at {slot}");
    Ok(slot)
}

fn split_destination(destination: &Utf8Path) -> Result<(&Utf8Path, &str), DeployError> {
    let no_parent = || DeployError::NoParent {
        path: destination.to_owned(),
    };
    let parent = destination.parent().ok_or_else(no_parent)?;
    let name = destination.file_name().ok_or_else(no_parent)?;
    Ok((parent, name))
}

/// A destination may be absent or a symlink; anything else cannot be
/// replaced by a single rename.
fn ensure_replaceable(destination: &Utf8Path) -> Result<(), DeployError> {
    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.file_type().is_symlink() => Ok(()),
        Ok(_) => Err(DeployError::DestinationNotSymlink {
            path: destination.to_owned(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DeployError::io("inspect", destination, source)),
    }
}

/// Create a never-before-used sibling entry with `create`, retrying on name
/// collisions.
fn create_unique(
    parent: &Utf8Path,
    name: &str,
    tag: &str,
    create: impl Fn(&Utf8Path) -> io::Result<()>,
) -> Result<Utf8PathBuf, DeployError> {
    let pid = std::process::id();
    let mut last_err = None;
    for attempt in 0..SLOT_ATTEMPTS {
        let candidate = parent.join(format!(".{name}.{tag}-{pid}-{}-{attempt}", unique_nanos()));
        match create(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => last_err = Some(err),
            Err(source) => return Err(DeployError::io("create", &candidate, source)),
        }
    }
    let source = last_err.unwrap_or_else(|| ErrorKind::AlreadyExists.into());
    Err(DeployError::io("create", parent, source))
}

fn unique_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos())
}

/// Point `destination` at `slot` through a temporary link and a rename.
fn repoint(
    slot: &Utf8Path,
    destination: &Utf8Path,
    parent: &Utf8Path,
    name: &str,
    rename: impl Fn(&Utf8Path, &Utf8Path) -> io::Result<()>,
) -> Result<(), DeployError> {
    let link = create_unique(parent, name, "droot-link", |path| {
        std::os::unix::fs::symlink(slot, path)
    })?;

    if let Err(source) = rename(&link, destination) {
        if let Err(err) = fs::remove_file(&link) {
            warn!("could not remove temporary link {link}: {err}");
        }
        return Err(DeployError::io("repoint", destination, source));
    }
    Ok(())
}

fn discard_slot(slot: &Utf8Path) {
    if let Err(err) = fs::remove_dir_all(slot) {
        warn!("could not remove unused slot {slot}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::rsync::{MockTreeSync, SyncError};
    use crate::test_utils::{MirrorCopySync, utf8_tempdir};

    fn tree_with(root: &Utf8Path, name: &str, contents: &str) -> Utf8PathBuf {
        let tree = root.join(name);
        fs::create_dir_all(&tree).expect("create tree");
        fs::write(tree.join("VERSION"), contents).expect("write VERSION");
        tree
    }

    fn sibling_slots(parent: &Utf8Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(parent)
            .expect("read parent")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".app.droot-"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn first_swap_creates_link_to_new_slot() {
        let (_temp, root) = utf8_tempdir();
        let tree = tree_with(&root, "tree", "1");
        let destination = root.join("srv").join("app");

        let slot = atomic_swap(&tree, &destination, &MirrorCopySync).expect("swap");

        let target = fs::read_link(&destination).expect("destination is a link");
        assert_eq!(target, slot.as_std_path());
        assert_eq!(
            fs::read_to_string(destination.join("VERSION")).expect("read"),
            "1"
        );
    }

    #[test]
    fn second_swap_orphans_previous_slot() {
        let (_temp, root) = utf8_tempdir();
        let destination = root.join("app");
        let first = atomic_swap(&tree_with(&root, "v1", "1"), &destination, &MirrorCopySync)
            .expect("first swap");
        let second = atomic_swap(&tree_with(&root, "v2", "2"), &destination, &MirrorCopySync)
            .expect("second swap");

        assert_ne!(first, second);
        assert!(first.join("VERSION").exists(), "old slot is orphaned, not removed");
        assert_eq!(
            fs::read_to_string(destination.join("VERSION")).expect("read"),
            "2"
        );
        assert_eq!(sibling_slots(&root).len(), 2, "no temporary links remain");
    }

    #[test]
    fn sync_failure_leaves_previous_target_and_removes_slot() {
        let (_temp, root) = utf8_tempdir();
        let destination = root.join("app");
        let first = atomic_swap(&tree_with(&root, "v1", "1"), &destination, &MirrorCopySync)
            .expect("first swap");

        let mut syncer = MockTreeSync::new();
        syncer.expect_sync().returning(|_, dest| {
            fs::write(dest.join("partial"), b"half").expect("write partial");
            Err(SyncError::CommandFailed {
                program: "rsync".to_owned(),
                status: "exit status: 11".to_owned(),
                stderr: "No space left on device".to_owned(),
            })
        });

        let err = atomic_swap(&tree_with(&root, "v2", "2"), &destination, &syncer)
            .expect_err("swap should fail");
        assert!(matches!(err, DeployError::Sync(_)));
        assert_eq!(
            fs::read_link(&destination).expect("still a link"),
            first.as_std_path()
        );
        assert_eq!(sibling_slots(&root), vec![first.file_name().expect("name").to_owned()]);
    }

    #[test]
    fn failed_rename_keeps_previous_target_and_cleans_up() {
        let (_temp, root) = utf8_tempdir();
        let destination = root.join("app");
        let first = atomic_swap(&tree_with(&root, "v1", "1"), &destination, &MirrorCopySync)
            .expect("first swap");

        let err = swap_with(
            &tree_with(&root, "v2", "2"),
            &destination,
            &MirrorCopySync,
            |_, _| Err(io::Error::other("rename refused")),
        )
        .expect_err("swap should fail");

        assert!(matches!(err, DeployError::Io { action: "repoint", .. }));
        assert_eq!(
            fs::read_link(&destination).expect("still a link"),
            first.as_std_path()
        );
        assert_eq!(
            fs::read_to_string(destination.join("VERSION")).expect("read"),
            "1"
        );
        assert_eq!(sibling_slots(&root), vec![first.file_name().expect("name").to_owned()]);
    }

    #[test]
    fn refuses_to_replace_a_real_directory() {
        let (_temp, root) = utf8_tempdir();
        let destination = root.join("app");
        fs::create_dir_all(&destination).expect("create destination");
        fs::write(destination.join("keep.txt"), b"keep").expect("write");

        let syncer = MockTreeSync::new();
        let err = atomic_swap(&tree_with(&root, "tree", "1"), &destination, &syncer)
            .expect_err("swap should fail");

        assert!(matches!(err, DeployError::DestinationNotSymlink { .. }));
        assert!(destination.join("keep.txt").exists());
        assert!(sibling_slots(&root).is_empty());
    }

    #[test]
    fn root_destination_has_no_parent() {
        let syncer = MockTreeSync::new();
        let err = atomic_swap(Utf8Path::new("/tmp/tree"), Utf8Path::new("/"), &syncer)
            .expect_err("swap should fail");
        assert!(matches!(err, DeployError::NoParent { .. }));
    }

    #[test]
    fn create_unique_never_reuses_an_existing_name() {
        let (_temp, root) = utf8_tempdir();
        let first = create_unique(&root, "app", "droot", |path| fs::create_dir(path))
            .expect("first slot");
        let second = create_unique(&root, "app", "droot", |path| fs::create_dir(path))
            .expect("second slot");
        assert_ne!(first, second);
    }
}
