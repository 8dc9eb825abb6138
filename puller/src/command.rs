//! External command execution.
//!
//! The `aws` CLI and `rsync` are driven as child processes. Routing every
//! invocation through [`CommandExecutor`] keeps the argument construction
//! testable without either tool installed.

use std::io;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use droot::command::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("rsync", &["--version".to_owned()])?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        log::trace!("running {program} {}", args.join(" "));
        Command::new(program).args(args).output()
    }
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        (**self).run(program, args)
    }
}

/// Return the trimmed stderr of a finished command as an owned string.
#[must_use]
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}
