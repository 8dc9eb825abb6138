//! Optional TOML configuration file.
//!
//! Settings that rarely change between invocations (transport, region,
//! `rsync` options) can live in a file instead of on every command line.
//! Command-line flags always take precedence over file values.
//!
//! The file is located by, in order: the `--config` flag (or `DROOT_CONFIG`),
//! then `config.toml` in the platform configuration directory for `droot`
//! when that file exists. With neither, defaults apply.
//!
//! ```toml
//! [pull]
//! mode = "atomic-swap"
//! temp_dir = "/var/tmp"
//!
//! [s3]
//! transport = "aws-cli"
//! region = "ap-northeast-1"
//!
//! [rsync]
//! extra_args = ["--exclude", "log/"]
//! ```

use crate::error::PullError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Name of the configuration file inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors arising while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The file that was read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or contains unknown keys.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// The file that was parsed.
        path: String,
        /// The TOML parser's diagnostic.
        #[source]
        source: Box<toml::de::Error>,
    },
}

impl From<ConfigError> for PullError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Settings loaded from the configuration file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PullerConfig {
    /// Defaults for the pull itself.
    pub pull: PullSection,
    /// Object store access.
    pub s3: S3Section,
    /// Mirror tool settings.
    pub rsync: RsyncSection,
}

/// The `[pull]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PullSection {
    /// Default deployment mode.
    pub mode: Option<String>,
    /// Default ownership choice.
    pub same_owner: Option<bool>,
    /// Directory for the transient archive and tree.
    pub temp_dir: Option<String>,
}

/// The `[s3]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct S3Section {
    /// `aws-cli` or `http`.
    pub transport: Option<String>,
    /// Region override.
    pub region: Option<String>,
    /// AWS CLI profile.
    pub profile: Option<String>,
    /// S3-compatible endpoint.
    pub endpoint_url: Option<String>,
    /// Program used in place of `aws`.
    pub aws_command: Option<String>,
}

/// The `[rsync]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RsyncSection {
    /// Program used in place of `rsync`.
    pub command: Option<String>,
    /// Extra arguments placed before the source and destination operands.
    pub extra_args: Vec<String>,
}

impl PullerConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or holds
    /// unknown keys. `origin` names the source in the message.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::config::PullerConfig;
    ///
    /// let config = PullerConfig::parse("[s3]\nregion = \"eu-west-1\"\n", "inline")?;
    /// assert_eq!(config.s3.region.as_deref(), Some("eu-west-1"));
    /// assert!(config.rsync.extra_args.is_empty());
    /// # Ok::<(), droot::config::ConfigError>(())
    /// ```
    pub fn parse(source: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|err| ConfigError::Parse {
            path: origin.to_owned(),
            source: Box::new(err),
        })
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&source, path.as_str())
    }

    /// Resolve and load the configuration.
    ///
    /// An `explicit` path must exist. Otherwise `fallback` is used only if it
    /// names an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the chosen file cannot be read or parsed.
    pub fn discover(
        explicit: Option<&Utf8Path>,
        fallback: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        let Some(path) = fallback
            .filter(|path| path.is_file())
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        else {
            return Ok(Self::default());
        };
        log::debug!("loading configuration from {path}");
        Self::load_file(&path)
    }
}

/// The platform default location of the configuration file, if the home
/// directory can be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories_next::ProjectDirs::from("", "", "droot")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
