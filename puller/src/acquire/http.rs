//! Unsigned HTTP downloader for public buckets and S3-compatible gateways.

use super::{DownloadError, ObjectDownloader};
use crate::request::S3Url;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Connection timeout for object downloads.
///
/// Only connection setup is bounded; a slow transfer of a large archive is
/// left to run to completion.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-based downloader using `ureq`.
pub struct HttpDownloader {
    agent: ureq::Agent,
    region: Option<String>,
    endpoint_url: Option<String>,
}

impl HttpDownloader {
    /// Create a downloader for virtual-hosted AWS URLs in the given region.
    #[must_use]
    pub fn new(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            region,
            endpoint_url,
        }
    }

    /// Construct the object URL for `source`.
    ///
    /// With an endpoint the URL is path-style (`<endpoint>/<bucket>/<key>`);
    /// otherwise it is the virtual-hosted AWS form.
    ///
    /// # Examples
    ///
    /// ```
    /// use droot::acquire::HttpDownloader;
    /// use droot::request::S3Url;
    ///
    /// let source: S3Url = "s3://drootexample/images/app v2.tar.gz".parse()?;
    /// let aws = HttpDownloader::new(Some("eu-west-1".to_owned()), None);
    /// assert_eq!(
    ///     aws.object_url(&source),
    ///     "https://drootexample.s3.eu-west-1.amazonaws.com/images/app%20v2.tar.gz"
    /// );
    ///
    /// let minio = HttpDownloader::new(None, Some("http://127.0.0.1:9000/".to_owned()));
    /// assert_eq!(
    ///     minio.object_url(&source),
    ///     "http://127.0.0.1:9000/drootexample/images/app%20v2.tar.gz"
    /// );
    /// # Ok::<(), droot::error::PullError>(())
    /// ```
    #[must_use]
    pub fn object_url(&self, source: &S3Url) -> String {
        let key = encode_key(source.key());
        match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{key}",
                endpoint.trim_end_matches('/'),
                source.bucket()
            ),
            None => match &self.region {
                Some(region) => {
                    format!("https://{}.s3.{region}.amazonaws.com/{key}", source.bucket())
                }
                None => format!("https://{}.s3.amazonaws.com/{key}", source.bucket()),
            },
        }
    }
}

impl std::fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

impl ObjectDownloader for HttpDownloader {
    fn download(&self, source: &S3Url, dest: &Path) -> Result<u64, DownloadError> {
        let url = self.object_url(source);
        log::debug!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, &e))?;
        let mut file = File::create(dest)?;
        let bytes = std::io::copy(&mut response.into_body().as_reader(), &mut file)?;
        file.sync_all()?;
        Ok(bytes)
    }
}

/// Percent-encode each `/`-separated segment of an object key.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn source(url: &str) -> S3Url {
        url.parse().expect("valid url")
    }

    #[rstest]
    #[case::plain("app.tar.gz", "app.tar.gz")]
    #[case::nested("images/2024/app.tar.gz", "images/2024/app.tar.gz")]
    #[case::space("my app.tar.gz", "my%20app.tar.gz")]
    #[case::reserved("a+b=c?.tgz", "a%2Bb%3Dc%3F.tgz")]
    #[case::unicode("café.tgz", "caf%C3%A9.tgz")]
    fn keys_are_encoded_per_segment(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(encode_key(key), expected);
    }

    #[test]
    fn default_url_omits_region() {
        let downloader = HttpDownloader::new(None, None);
        assert_eq!(
            downloader.object_url(&source("s3://drootexample/app.tar.gz")),
            "https://drootexample.s3.amazonaws.com/app.tar.gz"
        );
    }

    #[test]
    fn endpoint_takes_precedence_over_region() {
        let downloader = HttpDownloader::new(
            Some("us-east-1".to_owned()),
            Some("https://storage.example.test".to_owned()),
        );
        assert_eq!(
            downloader.object_url(&source("s3://bucket/app.tar.gz")),
            "https://storage.example.test/bucket/app.tar.gz"
        );
    }

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = ureq::Error::StatusCode(404);
        let mapped = map_ureq_error("https://example.test/app.tar.gz", &err);
        assert!(matches!(mapped, DownloadError::NotFound { .. }));
    }

    #[test]
    fn map_ureq_error_maps_other_status_to_http_error() {
        let err = ureq::Error::StatusCode(403);
        let mapped = map_ureq_error("https://example.test/app.tar.gz", &err);
        assert!(matches!(mapped, DownloadError::Http { .. }));
    }
}
