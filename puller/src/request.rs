//! Validation of a pull request before any resource is allocated.
//!
//! [`PullRequest::from_options`] is the only way to build a [`PullRequest`],
//! so holding one means the source is a well-formed `s3://` reference, the
//! strategy is known, and the destination is an absolute, normalised path.
//!
//! Mirror-sync deletes whatever in the destination is absent from the
//! archive. A destination of `/`, or one that contains the transient root,
//! would therefore delete the extracted tree while it is still being synced,
//! so both are rejected here.

use crate::deploy::Strategy;
use crate::error::{PullError, Result};
use crate::extract::default_preserve_ownership;
use crate::transient::TransientStorage;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fmt;
use std::str::FromStr;

/// Raw, unvalidated inputs for a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Destination path, possibly relative.
    pub destination: Option<String>,
    /// Source reference, expected to be `s3://bucket/key`.
    pub source: Option<String>,
    /// Strategy name; unset or empty means mirror-sync.
    pub mode: Option<String>,
    /// Explicit ownership choice; unset means "preserve when root".
    pub same_owner: Option<bool>,
    /// Directory for transient storage, possibly relative; unset means the
    /// system temporary directory.
    pub temp_dir: Option<Utf8PathBuf>,
}

/// A validated pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    destination: Utf8PathBuf,
    source: S3Url,
    strategy: Strategy,
    preserve_ownership: bool,
    transient_root: Utf8PathBuf,
}

impl PullRequest {
    /// Validate `options`, resolving a relative destination against `cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`PullError::Configuration`] if the destination or source is
    /// missing, the source is not a complete `s3://` reference, the mode is
    /// not recognised, an atomic-swap destination has no parent, or a
    /// mirror-sync destination is `/` or contains the transient root.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use droot::deploy::Strategy;
    /// use droot::request::{PullOptions, PullRequest};
    ///
    /// let options = PullOptions {
    ///     destination: Some("containers/../app".to_owned()),
    ///     source: Some("s3://drootexample/app.tar.gz".to_owned()),
    ///     mode: Some("symlink".to_owned()),
    ///     same_owner: Some(false),
    ///     temp_dir: None,
    /// };
    /// let request = PullRequest::from_options(&options, Utf8Path::new("/var"))?;
    /// assert_eq!(request.destination().as_str(), "/var/app");
    /// assert_eq!(request.strategy(), Strategy::AtomicSwap);
    /// assert!(!request.preserve_ownership());
    /// # Ok::<(), droot::error::PullError>(())
    /// ```
    pub fn from_options(options: &PullOptions, cwd: &Utf8Path) -> Result<Self> {
        let (Some(destination), Some(source)) = (
            non_empty(options.destination.as_deref()),
            non_empty(options.source.as_deref()),
        ) else {
            return Err(PullError::configuration("--src and --dest option required"));
        };

        let source: S3Url = source.parse()?;
        let strategy = match non_empty(options.mode.as_deref()) {
            Some(mode) => mode
                .parse::<Strategy>()
                .map_err(|err| PullError::configuration(err.to_string()))?,
            None => Strategy::default(),
        };

        let destination = normalise_destination(Utf8Path::new(destination), cwd);
        if strategy == Strategy::AtomicSwap && destination.parent().is_none() {
            return Err(PullError::configuration(format!(
                "destination {destination} cannot be swapped atomically; it has no parent directory"
            )));
        }

        let transient_root = match &options.temp_dir {
            Some(dir) => normalise_destination(dir, cwd),
            None => normalise_destination(TransientStorage::system().root(), cwd),
        };
        ensure_mirror_spares(strategy, &destination, &transient_root)?;

        let preserve_ownership = options
            .same_owner
            .unwrap_or_else(default_preserve_ownership);

        Ok(Self {
            destination,
            source,
            strategy,
            preserve_ownership,
            transient_root,
        })
    }

    /// Check that deploying this request cannot delete `transient_root`.
    ///
    /// [`PullRequest::from_options`] already checks the root it resolved;
    /// this repeats the check for a pipeline that allocates elsewhere. The
    /// comparison is lexical, so `transient_root` should be absolute.
    ///
    /// # Errors
    ///
    /// Returns [`PullError::Configuration`] if a mirror-sync destination is
    /// `transient_root` or one of its ancestors.
    pub fn ensure_spares(&self, transient_root: &Utf8Path) -> Result<()> {
        ensure_mirror_spares(self.strategy, &self.destination, transient_root)
    }

    /// Absolute, normalised destination path.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    /// Object to fetch.
    #[must_use]
    pub fn source(&self) -> &S3Url {
        &self.source
    }

    /// Deployment strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Whether archive ownership is restored during extraction.
    #[must_use]
    pub fn preserve_ownership(&self) -> bool {
        self.preserve_ownership
    }

    /// Absolute, normalised directory for transient storage.
    #[must_use]
    pub fn transient_root(&self) -> &Utf8Path {
        &self.transient_root
    }
}

/// Mirror-sync must not own the directory its own source lives in.
fn ensure_mirror_spares(
    strategy: Strategy,
    destination: &Utf8Path,
    transient_root: &Utf8Path,
) -> Result<()> {
    if strategy != Strategy::MirrorSync {
        return Ok(());
    }
    if destination.parent().is_none() {
        return Err(PullError::configuration(format!(
            "refusing to mirror onto {destination}; choose a dedicated directory"
        )));
    }
    if transient_root.starts_with(destination) {
        return Err(PullError::configuration(format!(
            "destination {destination} contains the transient directory {transient_root}; \
             mirror-sync would delete the tree it is copying from"
        )));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Make `path` absolute against `cwd` and resolve `.` and `..` lexically.
///
/// `..` never climbs above the root. Symlinks are not consulted, so the
/// result is predictable before the destination exists.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use droot::request::normalise_destination;
///
/// let cwd = Utf8Path::new("/home/deploy");
/// assert_eq!(normalise_destination(Utf8Path::new("./releases/../app/"), cwd), "/home/deploy/app");
/// assert_eq!(normalise_destination(Utf8Path::new("/../srv/app"), cwd), "/srv/app");
/// ```
#[must_use]
pub fn normalise_destination(path: &Utf8Path, cwd: &Utf8Path) -> Utf8PathBuf {
    let joined = cwd.join(path);
    let mut normalised = Utf8PathBuf::from("/");
    for component in joined.components() {
        match component {
            Utf8Component::Normal(part) => normalised.push(part),
            Utf8Component::ParentDir => {
                normalised.pop();
            }
            Utf8Component::RootDir | Utf8Component::CurDir | Utf8Component::Prefix(_) => {}
        }
    }
    normalised
}

/// An `s3://bucket/key` object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    bucket: String,
    key: String,
}

impl S3Url {
    /// Bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key, without a leading slash.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for S3Url {
    type Err = PullError;

    /// Parse an `s3://bucket/key` reference.
    ///
    /// The scheme is matched case-insensitively. Bucket and key must both be
    /// present.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::request::S3Url;
    ///
    /// let url: S3Url = "S3://drootexample/images/app.tar.gz".parse()?;
    /// assert_eq!(url.bucket(), "drootexample");
    /// assert_eq!(url.key(), "images/app.tar.gz");
    /// assert_eq!(url.to_string(), "s3://drootexample/images/app.tar.gz");
    ///
    /// assert!("/tmp/app.tar.gz".parse::<S3Url>().is_err());
    /// assert!("s3://drootexample".parse::<S3Url>().is_err());
    /// # Ok::<(), droot::error::PullError>(())
    /// ```
    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let rest = match raw.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("s3") => rest,
            _ => return Err(PullError::configuration(format!("not s3 scheme {raw}"))),
        };
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(PullError::configuration(format!("missing bucket in {raw}")));
        }
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(PullError::configuration(format!("missing object key in {raw}")));
        }
        Ok(Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
    }
}

impl fmt::Display for S3Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
