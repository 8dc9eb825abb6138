//! Acquisition stage: fetch the archive object into transient storage.
//!
//! Provides a trait-based abstraction for downloading an object from S3 into
//! a local file, enabling dependency injection for testing.
//!
//! # Sub-modules
//!
//! - [`aws_cli`] - Downloader that shells out to `aws s3 cp` (the default).
//! - [`http`] - Unsigned HTTP downloader using `ureq`.

pub mod aws_cli;
pub mod http;

pub use aws_cli::AwsCliDownloader;
pub use http::HttpDownloader;

use crate::error::{PullError, Result};
use crate::request::S3Url;
use crate::transient::TransientArtifact;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Trait for downloading an S3 object to a local file.
///
/// Abstractions allow tests to mock object-store behaviour without network
/// access or credentials.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDownloader {
    /// Download the object named by `source` into the file at `dest`.
    ///
    /// `dest` already exists; its contents are replaced. Returns the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing, the transfer fails, or the
    /// file cannot be written.
    fn download(&self, source: &S3Url, dest: &Path) -> std::result::Result<u64, DownloadError>;
}

/// Errors arising from object download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested object was not found.
    #[error("object not found: {url}")]
    NotFound {
        /// The URL or object reference that could not be found.
        url: String,
    },

    /// The external download command failed.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        /// The command line that was run, without credentials.
        command: String,
        /// The exit status as reported by the OS.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// I/O error creating, writing, or reading back the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// How the archive is fetched from the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Run `aws s3 cp`, inheriting the CLI's credential chain.
    #[default]
    AwsCli,
    /// Issue an unsigned HTTP GET (public buckets or S3-compatible gateways).
    Http,
}

impl FromStr for Transport {
    type Err = PullError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim() {
            "aws-cli" => Ok(Self::AwsCli),
            "http" => Ok(Self::Http),
            other => Err(PullError::configuration(format!(
                "invalid transport \"{other}\"; expected 'aws-cli' or 'http'"
            ))),
        }
    }
}

/// Facts about a successfully acquired archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    /// Size of the archive on disk.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the archive, for reporting only.
    pub sha256: String,
}

/// Download `source` into `artifact` and summarise what arrived.
///
/// # Errors
///
/// Returns [`PullError::AcquisitionFailed`] naming `source` if the download
/// fails or the downloaded file cannot be read back.
pub fn acquire(
    downloader: &dyn ObjectDownloader,
    source: &S3Url,
    artifact: &TransientArtifact,
) -> Result<Acquired> {
    let wrap = |source_err: DownloadError| PullError::AcquisitionFailed {
        source_ref: source.to_string(),
        source: source_err,
    };

    let bytes = downloader.download(source, artifact.path()).map_err(wrap)?;
    let sha256 = sha256_hex(artifact.path()).map_err(|err| wrap(err.into()))?;
    log::debug!("downloaded {bytes} bytes from {source} (sha256 {sha256})");
    Ok(Acquired { bytes, sha256 })
}

fn sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
