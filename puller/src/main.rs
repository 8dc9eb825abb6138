//! `droot` CLI entrypoint.
//!
//! Pulls a packaged filesystem image from S3 and deploys it to a local
//! directory, either by mirroring it in place or by atomically swapping a
//! symlink onto a freshly built copy.

use camino::Utf8PathBuf;
use clap::Parser;
use droot::acquire::{AwsCliDownloader, HttpDownloader, ObjectDownloader, Transport};
use droot::cli::{Cli, Command, PullArgs, Settings};
use droot::config::{PullerConfig, default_config_path};
use droot::deploy::RsyncTreeSync;
use droot::error::{PullError, Result};
use droot::extract::TarballExtractor;
use droot::output::{success_message, write_stderr_line};
use droot::pipeline::Pipeline;
use droot::request::PullRequest;
use droot::transient::TransientStorage;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Pull(args) => run_pull(args, stderr),
    }
}

fn run_pull(args: &PullArgs, stderr: &mut dyn Write) -> Result<()> {
    let config = PullerConfig::discover(args.config.as_deref(), default_config_path())?;
    let settings = args.settings(&config)?;
    let request = PullRequest::from_options(&settings.options, &current_dir()?)?;

    let downloader = downloader_for(&settings);
    let extractor = TarballExtractor;
    let syncer = syncer_for(&settings);
    let pipeline = Pipeline::new(downloader.as_ref(), &extractor, &syncer)
        .storage(TransientStorage::new(request.transient_root().to_owned()))
        .quiet(settings.quiet);

    let outcome = pipeline.run(&request, stderr)?;
    if !settings.quiet {
        write_stderr_line(stderr, success_message(&outcome, request.destination()));
    }
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| {
        PullError::configuration(format!("cannot determine current directory: {err}"))
    })?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        PullError::configuration(format!(
            "current directory {} is not valid UTF-8",
            path.display()
        ))
    })
}

fn downloader_for(settings: &Settings) -> Box<dyn ObjectDownloader> {
    match settings.transport {
        Transport::AwsCli => {
            let mut downloader = AwsCliDownloader::new()
                .profile(settings.profile.clone())
                .region(settings.region.clone())
                .endpoint_url(settings.endpoint_url.clone());
            if let Some(program) = &settings.aws_command {
                downloader = downloader.program(program);
            }
            Box::new(downloader)
        }
        Transport::Http => Box::new(HttpDownloader::new(
            settings.region.clone(),
            settings.endpoint_url.clone(),
        )),
    }
}

fn syncer_for(settings: &Settings) -> RsyncTreeSync {
    let syncer = RsyncTreeSync::new().extra_args(settings.rsync_extra_args.clone());
    match &settings.rsync_command {
        Some(program) => syncer.program(program),
        None => syncer,
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format_args!("error: {err}"));
            1
        }
    }
}
