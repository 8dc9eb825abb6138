//! Incremental tree reconciliation.
//!
//! [`TreeSync`] is the contract both deployment strategies rely on: make the
//! destination directory's contents match the source directory, adding and
//! updating changed files and removing files absent from the source. The
//! production implementation shells out to `rsync`; the byte-level algorithm
//! is not reimplemented here.

use crate::command::{CommandExecutor, SystemCommandExecutor, stderr_text};
use camino::Utf8Path;
use thiserror::Error;

/// Default program used for mirroring.
pub const RSYNC_PROGRAM: &str = "rsync";

/// Trait for mirroring one directory tree onto another.
#[cfg_attr(test, mockall::automock)]
pub trait TreeSync {
    /// Reconcile `dest` so that its contents match `source`.
    ///
    /// `dest` must already exist. Its path identity is preserved; only the
    /// entries beneath it change.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the sync could not be started or did not
    /// complete. `dest` may be left partially synced.
    fn sync(&self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), SyncError>;
}

/// Errors arising from the sync primitive.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The sync program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sync program ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        /// The program that failed.
        program: String,
        /// The exit status as reported by the OS.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// [`TreeSync`] implementation backed by `rsync -a --delete`.
#[derive(Debug, Clone)]
pub struct RsyncTreeSync<E = SystemCommandExecutor> {
    executor: E,
    program: String,
    extra_args: Vec<String>,
}

impl RsyncTreeSync {
    /// Create a syncer that runs the system `rsync`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(SystemCommandExecutor)
    }
}

impl Default for RsyncTreeSync {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> RsyncTreeSync<E> {
    /// Create a syncer that runs commands through `executor`.
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            program: RSYNC_PROGRAM.to_owned(),
            extra_args: Vec::new(),
        }
    }

    /// Override the program name or path used in place of `rsync`.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Append extra arguments (for example `--exclude` rules) before the
    /// source and destination operands.
    #[must_use]
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Build the argument list for syncing `source` onto `dest`.
    ///
    /// Both operands carry a trailing slash so that `rsync` copies the
    /// directory contents rather than nesting the directory itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use droot::deploy::RsyncTreeSync;
    ///
    /// let args = RsyncTreeSync::new().arguments(Utf8Path::new("/tmp/droot_raw1"), Utf8Path::new("/srv/app"));
    /// assert_eq!(args, ["-a", "--delete", "/tmp/droot_raw1/", "/srv/app/"]);
    /// ```
    #[must_use]
    pub fn arguments(&self, source: &Utf8Path, dest: &Utf8Path) -> Vec<String> {
        let mut args = vec!["-a".to_owned(), "--delete".to_owned()];
        args.extend(self.extra_args.iter().cloned());
        args.push(with_trailing_slash(source));
        args.push(with_trailing_slash(dest));
        args
    }
}

impl<E: CommandExecutor> TreeSync for RsyncTreeSync<E> {
    fn sync(&self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), SyncError> {
        let args = self.arguments(source, dest);
        let output = self
            .executor
            .run(&self.program, &args)
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SyncError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr_text(&output),
            });
        }

        Ok(())
    }
}

fn with_trailing_slash(path: &Utf8Path) -> String {
    format!("{}/", path.as_str().trim_end_matches('/'))
}
