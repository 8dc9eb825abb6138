//! Progress and summary lines written to the operator.
//!
//! Output goes to an injected writer (stderr in the binary) so that tests can
//! capture it. Write failures are ignored; a closed stderr must not turn a
//! successful deployment into a failure.

use crate::pipeline::PullOutcome;
use std::fmt::Display;
use std::io::Write;

/// Write `message` followed by a newline, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Write a progress step in the `--> ` style.
pub fn write_step(stderr: &mut dyn Write, message: impl Display) {
    write_stderr_line(stderr, format_args!("--> {message}"));
}

/// Format a success message after deployment.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use droot::deploy::Strategy;
/// use droot::output::success_message;
/// use droot::pipeline::PullOutcome;
///
/// let outcome = PullOutcome {
///     strategy: Strategy::MirrorSync,
///     bytes_downloaded: 2048,
///     archive_sha256: "ab".repeat(32),
///     entries_extracted: 1,
///     deployed_tree: Utf8PathBuf::from("/srv/app"),
/// };
/// let message = success_message(&outcome, camino::Utf8Path::new("/srv/app"));
/// assert_eq!(message, "Deployed 1 entry (2048 bytes) to /srv/app by mirror-sync");
/// ```
#[must_use]
pub fn success_message(outcome: &PullOutcome, destination: &camino::Utf8Path) -> String {
    let noun = if outcome.entries_extracted == 1 {
        "entry"
    } else {
        "entries"
    };
    let mut message = format!(
        "Deployed {} {noun} ({} bytes) to {destination} by {}",
        outcome.entries_extracted, outcome.bytes_downloaded, outcome.strategy
    );
    if outcome.deployed_tree.as_path() != destination {
        message.push_str(&format!(" -> {}", outcome.deployed_tree));
    }
    message
}
