//! Shared test utilities for the puller crate.

use crate::command::CommandExecutor;
use crate::deploy::{SyncError, TreeSync};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{ExitStatus, Output};
use tempfile::TempDir;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "rsync").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[String]) -> io::Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            panic!("unexpected command invocation: {cmd} {}", args.join(" "));
        };

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args.as_slice(), args);

        call.result
    }
}

/// A [`TreeSync`] that mirrors directories with plain filesystem calls.
///
/// Behaves like `rsync -a --delete` for regular files, directories and
/// symlinks, so deployment can be exercised on hosts without `rsync`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorCopySync;

impl TreeSync for MirrorCopySync {
    fn sync(&self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), SyncError> {
        mirror_dir(source.as_std_path(), dest.as_std_path()).map_err(|source| SyncError::Spawn {
            program: "mirror-copy".to_owned(),
            source,
        })
    }
}

fn mirror_dir(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dest)? {
        let entry = entry?;
        if fs::symlink_metadata(source.join(entry.file_name())).is_err() {
            remove_entry(&entry.path())?;
        }
    }

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        let existing = fs::symlink_metadata(&target).ok();

        if file_type.is_dir() {
            if existing.as_ref().is_some_and(|meta| !meta.is_dir()) {
                remove_entry(&target)?;
            }
            fs::create_dir_all(&target)?;
            fs::set_permissions(&target, entry.metadata()?.permissions())?;
            mirror_dir(&entry.path(), &target)?;
        } else {
            if existing.is_some() {
                remove_entry(&target)?;
            }
            if file_type.is_symlink() {
                std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Create a temporary directory and return it with its UTF-8 path.
///
/// # Panics
///
/// Panics if the directory cannot be created or its path is not UTF-8.
#[must_use]
pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let temp = match TempDir::new() {
        Ok(temp) => temp,
        Err(err) => panic!("failed to create temporary directory: {err}"),
    };
    let path = match Utf8PathBuf::from_path_buf(temp.path().to_path_buf()) {
        Ok(path) => path,
        Err(path) => panic!("temporary directory is not UTF-8: {}", path.display()),
    };
    (temp, path)
}

/// An entry to place in a fixture archive.
#[derive(Debug, Clone, Copy)]
pub enum FixtureEntry<'a> {
    /// A directory with mode `0755`.
    Dir(&'a str),
    /// A regular file with mode `0644`.
    File(&'a str, &'a [u8]),
    /// A regular file with an explicit mode.
    FileWithMode(&'a str, &'a [u8], u32),
}

/// Fixed modification time stamped on fixture entries.
pub const FIXTURE_MTIME: u64 = 1_700_000_000;

fn write_tar<W: Write>(sink: W, entries: &[FixtureEntry<'_>]) -> io::Result<W> {
    let mut builder = tar::Builder::new(sink);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(FIXTURE_MTIME);
        match *entry {
            FixtureEntry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, path, io::empty())?;
            }
            FixtureEntry::File(path, data) => {
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, path, data)?;
            }
            FixtureEntry::FileWithMode(path, data, mode) => {
                header.set_mode(mode);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, path, data)?;
            }
        }
    }
    builder.into_inner()
}

/// Build an uncompressed tarball containing `entries`.
///
/// # Errors
///
/// Returns any I/O error raised while building the archive.
pub fn tar_bytes(entries: &[FixtureEntry<'_>]) -> io::Result<Vec<u8>> {
    write_tar(Vec::new(), entries)
}

/// Build a gzip-compressed tarball containing `entries`.
///
/// # Errors
///
/// Returns any I/O error raised while building or compressing the archive.
pub fn tar_gz_bytes(entries: &[FixtureEntry<'_>]) -> io::Result<Vec<u8>> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    write_tar(encoder, entries)?.finish()
}

/// Build a zstd-compressed tarball containing `entries`.
///
/// # Errors
///
/// Returns any I/O error raised while building or compressing the archive.
pub fn tar_zst_bytes(entries: &[FixtureEntry<'_>]) -> io::Result<Vec<u8>> {
    let encoder = zstd::stream::write::Encoder::new(Vec::new(), 0)?;
    write_tar(encoder, entries)?.finish()
}
