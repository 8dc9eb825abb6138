//! Unit tests for request validation.
//!
//! Every rejection here must happen without touching the filesystem, so the
//! tests use a fixed fictional working directory.

use super::{PullOptions, PullRequest, S3Url, normalise_destination};
use crate::deploy::Strategy;
use crate::error::{PullError, Stage};
use crate::transient::TransientStorage;
use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};

const CWD: &str = "/var/containers";

#[fixture]
fn options() -> PullOptions {
    PullOptions {
        destination: Some("app".to_owned()),
        source: Some("s3://drootexample/app.tar.gz".to_owned()),
        mode: None,
        same_owner: Some(false),
        temp_dir: Some(Utf8PathBuf::from("/scratch/droot")),
    }
}

fn validate(options: &PullOptions) -> Result<PullRequest, PullError> {
    PullRequest::from_options(options, Utf8Path::new(CWD))
}

fn assert_configuration_error(result: Result<PullRequest, PullError>, needle: &str) {
    let err = result.expect_err("validation should fail");
    assert_eq!(err.stage(), Stage::Validation);
    let message = err.to_string();
    assert!(message.contains(needle), "{message:?} should contain {needle:?}");
}

#[rstest]
fn defaults_to_mirror_sync(options: PullOptions) {
    let request = validate(&options).expect("valid request");
    assert_eq!(request.strategy(), Strategy::MirrorSync);
    assert_eq!(request.destination().as_str(), "/var/containers/app");
    assert_eq!(request.source().bucket(), "drootexample");
    assert_eq!(request.source().key(), "app.tar.gz");
}

#[rstest]
#[case::empty("")]
#[case::blank("  ")]
fn blank_mode_means_default(options: PullOptions, #[case] mode: &str) {
    let request = validate(&PullOptions {
        mode: Some(mode.to_owned()),
        ..options
    })
    .expect("valid request");
    assert_eq!(request.strategy(), Strategy::MirrorSync);
}

#[rstest]
#[case::rsync("rsync", Strategy::MirrorSync)]
#[case::symlink("symlink", Strategy::AtomicSwap)]
#[case::atomic_swap("atomic-swap", Strategy::AtomicSwap)]
fn accepts_named_modes(options: PullOptions, #[case] mode: &str, #[case] expected: Strategy) {
    let request = validate(&PullOptions {
        mode: Some(mode.to_owned()),
        ..options
    })
    .expect("valid request");
    assert_eq!(request.strategy(), expected);
}

#[rstest]
fn unknown_mode_is_a_configuration_error(options: PullOptions) {
    let result = validate(&PullOptions {
        mode: Some("copy".to_owned()),
        ..options
    });
    assert_configuration_error(result, "invalid mode \"copy\"");
}

#[rstest]
#[case::no_destination(None, Some("s3://b/k"))]
#[case::no_source(Some("/srv/app"), None)]
#[case::empty_destination(Some(""), Some("s3://b/k"))]
#[case::empty_source(Some("/srv/app"), Some(" "))]
fn missing_inputs_are_rejected(
    options: PullOptions,
    #[case] destination: Option<&str>,
    #[case] source: Option<&str>,
) {
    let result = validate(&PullOptions {
        destination: destination.map(str::to_owned),
        source: source.map(str::to_owned),
        ..options
    });
    assert_configuration_error(result, "--src and --dest option required");
}

#[rstest]
#[case::file_scheme("file:///tmp/app.tar.gz", "not s3 scheme")]
#[case::https("https://drootexample.s3.amazonaws.com/app.tar.gz", "not s3 scheme")]
#[case::local_path("/tmp/app.tar.gz", "not s3 scheme")]
#[case::no_bucket("s3:///app.tar.gz", "missing bucket")]
#[case::no_key("s3://drootexample", "missing object key")]
#[case::slash_only_key("s3://drootexample/", "missing object key")]
fn malformed_sources_are_rejected(
    options: PullOptions,
    #[case] source: &str,
    #[case] needle: &str,
) {
    let result = validate(&PullOptions {
        source: Some(source.to_owned()),
        ..options
    });
    assert_configuration_error(result, needle);
}

#[rstest]
fn atomic_swap_onto_root_is_rejected(options: PullOptions) {
    let result = validate(&PullOptions {
        destination: Some("/".to_owned()),
        mode: Some("atomic-swap".to_owned()),
        ..options
    });
    assert_configuration_error(result, "no parent directory");
}

#[rstest]
#[case::default_mode(None)]
#[case::rsync_alias(Some("rsync"))]
fn mirror_sync_onto_root_is_rejected(options: PullOptions, #[case] mode: Option<&str>) {
    let result = validate(&PullOptions {
        destination: Some("/".to_owned()),
        mode: mode.map(str::to_owned),
        ..options
    });
    assert_configuration_error(result, "refusing to mirror onto /");
}

#[rstest]
#[case::ancestor("/var", Some("/var/tmp"))]
#[case::same_directory("/var/tmp", Some("/var/tmp/"))]
#[case::relative_temp_dir(".", Some("tmp"))]
#[case::dotted_temp_dir("/srv/app", Some("/srv/app/../app/cache"))]
fn mirror_destination_containing_transient_root_is_rejected(
    options: PullOptions,
    #[case] destination: &str,
    #[case] temp_dir: Option<&str>,
) {
    let result = validate(&PullOptions {
        destination: Some(destination.to_owned()),
        temp_dir: temp_dir.map(Utf8PathBuf::from),
        ..options
    });
    assert_configuration_error(result, "contains the transient directory");
}

#[rstest]
#[case::sibling("/var/app", "/var/tmp")]
#[case::inside_transient_root("/var/tmp/app", "/var/tmp")]
#[case::shared_prefix("/var/tmp", "/var/tmpfiles")]
fn mirror_destination_beside_transient_root_is_allowed(
    options: PullOptions,
    #[case] destination: &str,
    #[case] temp_dir: &str,
) {
    let request = validate(&PullOptions {
        destination: Some(destination.to_owned()),
        temp_dir: Some(Utf8PathBuf::from(temp_dir)),
        ..options
    })
    .expect("valid request");
    assert_eq!(request.transient_root().as_str(), temp_dir);
}

#[rstest]
fn atomic_swap_may_sit_above_transient_root(options: PullOptions) {
    let request = validate(&PullOptions {
        destination: Some("/var".to_owned()),
        mode: Some("atomic-swap".to_owned()),
        temp_dir: Some(Utf8PathBuf::from("/var/tmp")),
        ..options
    })
    .expect("valid request");
    assert_eq!(request.strategy(), Strategy::AtomicSwap);
}

#[rstest]
fn unset_temp_dir_resolves_to_system_temp_dir(options: PullOptions) {
    let request = validate(&PullOptions {
        temp_dir: None,
        ..options
    })
    .expect("valid request");
    assert_eq!(
        request.transient_root(),
        normalise_destination(TransientStorage::system().root(), Utf8Path::new(CWD))
    );
}

#[rstest]
fn relative_temp_dir_resolves_against_cwd(options: PullOptions) {
    let request = validate(&PullOptions {
        temp_dir: Some(Utf8PathBuf::from("scratch")),
        ..options
    })
    .expect("valid request");
    assert_eq!(request.transient_root().as_str(), "/var/containers/scratch");
}

#[rstest]
fn spares_check_applies_to_other_roots(options: PullOptions) {
    let request = validate(&options).expect("valid request");
    assert!(request.ensure_spares(Utf8Path::new("/srv/tmp")).is_ok());
    let err = request
        .ensure_spares(Utf8Path::new("/var/containers/app/tmp"))
        .expect_err("root inside destination");
    assert_eq!(err.stage(), Stage::Validation);
}

#[rstest]
#[case::explicit_true(Some(true), true)]
#[case::explicit_false(Some(false), false)]
fn explicit_ownership_choice_wins(
    options: PullOptions,
    #[case] same_owner: Option<bool>,
    #[case] expected: bool,
) {
    let request = validate(&PullOptions {
        same_owner,
        ..options
    })
    .expect("valid request");
    assert_eq!(request.preserve_ownership(), expected);
}

#[rstest]
fn unset_ownership_follows_privilege(options: PullOptions) {
    let request = validate(&PullOptions {
        same_owner: None,
        ..options
    })
    .expect("valid request");
    assert_eq!(
        request.preserve_ownership(),
        crate::extract::default_preserve_ownership()
    );
}

#[rstest]
#[case::relative("app", "/var/containers/app")]
#[case::dot_segments("./a/./b", "/var/containers/a/b")]
#[case::parent("../srv/app", "/var/srv/app")]
#[case::above_root("../../../../etc", "/etc")]
#[case::absolute("/srv//app/", "/srv/app")]
fn destinations_are_normalised(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(
        normalise_destination(Utf8Path::new(input), Utf8Path::new(CWD)),
        expected
    );
}

#[rstest]
#[case::upper_scheme("S3://bucket/key.tgz", "bucket", "key.tgz")]
#[case::nested_key("s3://bucket/a/b/c.tar.zst", "bucket", "a/b/c.tar.zst")]
#[case::double_slash("s3://bucket//key.tgz", "bucket", "key.tgz")]
fn s3_urls_parse(#[case] raw: &str, #[case] bucket: &str, #[case] key: &str) {
    let url: S3Url = raw.parse().expect("valid url");
    assert_eq!(url.bucket(), bucket);
    assert_eq!(url.key(), key);
}
