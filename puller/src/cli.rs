//! CLI argument definitions for `droot`.
//!
//! This module defines the command-line interface using clap and merges it
//! with the optional configuration file. It is separated from the main
//! entrypoint to keep the binary small and focused on orchestration.

use crate::acquire::Transport;
use crate::config::PullerConfig;
use crate::error::Result;
use crate::request::PullOptions;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Deploy packaged filesystem images from S3.
#[derive(Parser, Debug)]
#[command(name = "droot")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Mirror an image onto an existing directory:\n",
    "    $ droot pull --dest /var/containers/app --src s3://drootexample/app.tar.gz\n\n",
    "  Deploy behind an atomically swapped symlink:\n",
    "    $ droot pull -d /var/containers/app -s s3://drootexample/app.tar.gz -m atomic-swap",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull an extracted image from S3 and deploy it to a local directory.
    Pull(PullArgs),
}

/// Arguments for the pull command.
#[derive(Parser, Debug, Clone, Default)]
pub struct PullArgs {
    /// Local filesystem path (e.g. /var/containers/app).
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<String>,

    /// Object to fetch (e.g. s3://drootexample/app.tar.gz).
    #[arg(short, long, value_name = "S3_URL")]
    pub src: Option<String>,

    /// Deployment mode: 'mirror-sync' (alias 'rsync') or 'atomic-swap'
    /// (alias 'symlink') [default: mirror-sync].
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Restore archive ownership (default when running as root).
    #[arg(long, conflicts_with = "no_same_owner")]
    pub same_owner: bool,

    /// Extract files as the invoking user even when running as root.
    #[arg(long)]
    pub no_same_owner: bool,

    /// How to fetch the object: 'aws-cli' or 'http' [default: aws-cli].
    #[arg(long, value_name = "TRANSPORT")]
    pub transport: Option<String>,

    /// S3 region.
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// AWS CLI profile.
    #[arg(long, value_name = "PROFILE")]
    pub profile: Option<String>,

    /// S3-compatible endpoint URL.
    #[arg(long, value_name = "URL")]
    pub endpoint_url: Option<String>,

    /// Directory for the transient archive and tree [default: system temp dir].
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<Utf8PathBuf>,

    /// Configuration file [default: platform config dir, when present].
    #[arg(long, value_name = "FILE", env = "DROOT_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// Suppress progress output (errors still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

/// Fully merged settings for one run: flags over file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Inputs for request validation.
    pub options: PullOptions,
    /// Download mechanism.
    pub transport: Transport,
    /// S3 region.
    pub region: Option<String>,
    /// AWS CLI profile.
    pub profile: Option<String>,
    /// S3-compatible endpoint URL.
    pub endpoint_url: Option<String>,
    /// Program used in place of `aws`.
    pub aws_command: Option<String>,
    /// Program used in place of `rsync`.
    pub rsync_command: Option<String>,
    /// Extra `rsync` arguments.
    pub rsync_extra_args: Vec<String>,
    /// Whether progress output is suppressed.
    pub quiet: bool,
}

impl PullArgs {
    /// The explicit ownership choice, if either flag was given.
    #[must_use]
    pub fn same_owner_flag(&self) -> Option<bool> {
        match (self.same_owner, self.no_same_owner) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Merge these flags with `config`, flags taking precedence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PullError::Configuration`] if the chosen
    /// transport name is not recognised.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::cli::PullArgs;
    /// use droot::config::PullerConfig;
    ///
    /// let config = PullerConfig::parse("[pull]\nmode = \"symlink\"\n", "inline")?;
    /// let args = PullArgs {
    ///     mode: Some("rsync".to_owned()),
    ///     ..PullArgs::default()
    /// };
    /// let settings = args.settings(&config)?;
    /// assert_eq!(settings.options.mode.as_deref(), Some("rsync"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn settings(&self, config: &PullerConfig) -> Result<Settings> {
        let transport = match self.transport.as_ref().or(config.s3.transport.as_ref()) {
            Some(name) => name.parse()?,
            None => Transport::default(),
        };

        Ok(Settings {
            options: PullOptions {
                destination: self.dest.clone(),
                source: self.src.clone(),
                mode: self.mode.clone().or_else(|| config.pull.mode.clone()),
                same_owner: self.same_owner_flag().or(config.pull.same_owner),
                temp_dir: self
                    .temp_dir
                    .clone()
                    .or_else(|| config.pull.temp_dir.as_deref().map(Utf8PathBuf::from)),
            },
            transport,
            region: self.region.clone().or_else(|| config.s3.region.clone()),
            profile: self.profile.clone().or_else(|| config.s3.profile.clone()),
            endpoint_url: self
                .endpoint_url
                .clone()
                .or_else(|| config.s3.endpoint_url.clone()),
            aws_command: config.s3.aws_command.clone(),
            rsync_command: config.rsync.command.clone(),
            rsync_extra_args: config.rsync.extra_args.clone(),
            quiet: self.quiet,
        })
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
