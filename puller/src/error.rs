//! Error types for the pull-and-deploy pipeline.
//!
//! Every failure that reaches the caller is a [`PullError`]. Configuration
//! problems are detected before any resource is allocated; every other variant
//! names the stage that failed and wraps the collaborator error that caused it,
//! so an operator can tell a missing archive from a corrupt one from a refused
//! write.

use crate::acquire::DownloadError;
use crate::deploy::{DeployError, Strategy};
use crate::extract::ExtractionError;
use std::fmt;
use thiserror::Error;

/// A pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Argument and configuration validation, before any I/O.
    Validation,
    /// Downloading the archive into transient storage.
    Acquisition,
    /// Unpacking the archive into the transient tree.
    Extraction,
    /// Moving the extracted tree to its permanent destination.
    Deployment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Acquisition => "acquisition",
            Self::Extraction => "extraction",
            Self::Deployment => "deployment",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while pulling and deploying an image.
#[derive(Debug, Error)]
pub enum PullError {
    /// Bad or missing arguments, or an unsupported scheme or strategy.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Description of what is wrong with the request.
        reason: String,
    },

    /// The archive could not be fetched from the object store.
    #[error("acquisition failed for {source_ref}: {source}")]
    AcquisitionFailed {
        /// The remote object that was requested.
        source_ref: String,
        /// The underlying transfer error.
        #[source]
        source: DownloadError,
    },

    /// The downloaded archive could not be unpacked.
    #[error("extraction failed: {source}")]
    ExtractionFailed {
        /// The underlying decode or write error.
        #[source]
        source: ExtractionError,
    },

    /// The extracted tree could not be deployed to the destination.
    #[error("deployment failed ({strategy}): {source}")]
    DeploymentFailed {
        /// The strategy that was being applied.
        strategy: Strategy,
        /// The underlying sync or swap error.
        #[source]
        source: DeployError,
    },
}

impl PullError {
    /// Build a configuration error from any displayable reason.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Return the stage at which this error occurred.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::error::{PullError, Stage};
    ///
    /// let err = PullError::configuration("--src and --dest option required");
    /// assert_eq!(err.stage(), Stage::Validation);
    /// ```
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration { .. } => Stage::Validation,
            Self::AcquisitionFailed { .. } => Stage::Acquisition,
            Self::ExtractionFailed { .. } => Stage::Extraction,
            Self::DeploymentFailed { .. } => Stage::Deployment,
        }
    }
}

/// Result type alias using [`PullError`].
pub type Result<T> = std::result::Result<T, PullError>;

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[test]
    fn configuration_error_includes_reason() {
        let err = PullError::configuration("not s3 scheme file:///tmp/app.tar.gz");
        let msg = err.to_string();
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("file:///tmp/app.tar.gz"));
    }

    #[test]
    fn acquisition_error_names_source_and_cause() {
        let err = PullError::AcquisitionFailed {
            source_ref: "s3://bucket/app.tar.gz".to_owned(),
            source: DownloadError::NotFound {
                url: "https://bucket.s3.amazonaws.com/app.tar.gz".to_owned(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("acquisition failed"));
        assert!(msg.contains("s3://bucket/app.tar.gz"));
        assert!(msg.contains("not found"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn deployment_error_names_strategy() {
        let err = PullError::DeploymentFailed {
            strategy: Strategy::AtomicSwap,
            source: DeployError::DestinationNotSymlink {
                path: Utf8PathBuf::from("/srv/app"),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("atomic-swap"));
        assert!(msg.contains("/srv/app"));
    }

    #[rstest]
    #[case::validation(PullError::configuration("x"), Stage::Validation, "validation")]
    #[case::extraction(
        PullError::ExtractionFailed { source: ExtractionError::EmptyArchive },
        Stage::Extraction,
        "extraction"
    )]
    fn stage_is_tagged(#[case] err: PullError, #[case] stage: Stage, #[case] name: &str) {
        assert_eq!(err.stage(), stage);
        assert_eq!(err.stage().to_string(), name);
    }
}
