//! Downloader backed by the `aws` command-line tool.
//!
//! Shelling out keeps credential handling (profiles, SSO, instance roles,
//! environment variables) entirely inside the AWS CLI.

use super::{DownloadError, ObjectDownloader};
use crate::command::{CommandExecutor, SystemCommandExecutor, stderr_text};
use crate::request::S3Url;
use std::fs;
use std::path::Path;

/// Default program used for S3 downloads.
pub const AWS_PROGRAM: &str = "aws";

/// Substrings of `aws s3 cp` stderr that indicate a missing object or bucket.
const NOT_FOUND_MARKERS: [&str; 3] = ["(404)", "NoSuchKey", "NoSuchBucket"];

/// [`ObjectDownloader`] that runs `aws s3 cp`.
#[derive(Debug, Clone)]
pub struct AwsCliDownloader<E = SystemCommandExecutor> {
    executor: E,
    program: String,
    profile: Option<String>,
    region: Option<String>,
    endpoint_url: Option<String>,
}

impl AwsCliDownloader {
    /// Create a downloader that runs the system `aws` binary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(SystemCommandExecutor)
    }
}

impl Default for AwsCliDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> AwsCliDownloader<E> {
    /// Create a downloader that runs commands through `executor`.
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            program: AWS_PROGRAM.to_owned(),
            profile: None,
            region: None,
            endpoint_url: None,
        }
    }

    /// Override the program name or path used in place of `aws`.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Use a named profile from the AWS CLI configuration.
    #[must_use]
    pub fn profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Override the region.
    #[must_use]
    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Talk to an S3-compatible endpoint instead of AWS.
    #[must_use]
    pub fn endpoint_url(mut self, endpoint_url: Option<String>) -> Self {
        self.endpoint_url = endpoint_url;
        self
    }

    /// Build the argument list for copying `source` to `dest`.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::acquire::AwsCliDownloader;
    /// use droot::request::S3Url;
    /// use std::path::Path;
    ///
    /// let source: S3Url = "s3://drootexample/app.tar.gz".parse()?;
    /// let args = AwsCliDownloader::new()
    ///     .region(Some("ap-northeast-1".to_owned()))
    ///     .arguments(&source, Path::new("/tmp/droot_gzip1"));
    /// assert_eq!(
    ///     args,
    ///     [
    ///         "--region", "ap-northeast-1", "s3", "cp", "--only-show-errors",
    ///         "s3://drootexample/app.tar.gz", "/tmp/droot_gzip1",
    ///     ]
    /// );
    /// # Ok::<(), droot::error::PullError>(())
    /// ```
    #[must_use]
    pub fn arguments(&self, source: &S3Url, dest: &Path) -> Vec<String> {
        let mut args = Vec::new();
        let options = [
            ("--profile", &self.profile),
            ("--region", &self.region),
            ("--endpoint-url", &self.endpoint_url),
        ];
        for (flag, value) in options {
            if let Some(value) = value {
                args.push(flag.to_owned());
                args.push(value.clone());
            }
        }
        args.extend(
            ["s3", "cp", "--only-show-errors"]
                .iter()
                .map(|arg| (*arg).to_owned()),
        );
        args.push(source.to_string());
        args.push(dest.to_string_lossy().into_owned());
        args
    }
}

impl<E: CommandExecutor> ObjectDownloader for AwsCliDownloader<E> {
    fn download(&self, source: &S3Url, dest: &Path) -> Result<u64, DownloadError> {
        let args = self.arguments(source, dest);
        let output = self.executor.run(&self.program, &args)?;

        if !output.status.success() {
            let stderr = stderr_text(&output);
            if NOT_FOUND_MARKERS.iter().any(|marker| stderr.contains(marker)) {
                return Err(DownloadError::NotFound {
                    url: source.to_string(),
                });
            }
            return Err(DownloadError::CommandFailed {
                command: format!("{} s3 cp", self.program),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(fs::metadata(dest)?.len())
    }
}
