//! `droot` library.
//!
//! This crate pulls a packaged filesystem image (a gzip- or zstd-compressed
//! tarball) from S3 and deploys it to a local directory. It is used by the
//! `droot` CLI binary and can be consumed programmatically for testing or
//! custom deployment workflows.
//!
//! Deployment never exposes a half-built tree through the destination path:
//! mirror-sync reconciles an existing directory file by file, and
//! atomic-swap builds a complete copy beside the destination before a single
//! `rename(2)` repoints the destination symlink at it.
//!
//! # Modules
//!
//! - [`acquire`] - Object download into transient storage
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - External command execution seam
//! - [`config`] - Optional TOML configuration file
//! - [`deploy`] - Mirror-sync and atomic-swap deployment strategies
//! - [`error`] - Stage-tagged error types
//! - [`extract`] - Tarball extraction with path traversal protection
//! - [`output`] - Progress and summary lines
//! - [`pipeline`] - Acquire, extract, deploy orchestration
//! - [`request`] - Validation of pull inputs
//! - [`transient`] - Self-cleaning temporary file and directory

pub mod acquire;
pub mod cli;
pub mod command;
pub mod config;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod transient;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
