use crate::channel::supervisor::SupervisorOptions;
use crate::config::SessionConfig;
use crate::engine::sim::SimEngine;
use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::{panic, process};

pub mod channel;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(env!("CARGO_PKG_NAME"))
        .version(config::app_version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Session configuration file (JSON). Defaults are used when omitted.")
                .value_parser(clap::value_parser!(PathBuf))
                .required(false),
        )
        .arg(
            Arg::new("pause-after")
                .long("pause-after")
                .value_name("SECONDS")
                .help("Seconds from session start at which PAUSE is sent.")
                .value_parser(clap::value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            Arg::new("resume-after")
                .long("resume-after")
                .value_name("SECONDS")
                .help("Seconds from session start at which RESUME is sent.")
                .value_parser(clap::value_parser!(u64))
                .default_value("10"),
        )
        .arg(
            Arg::new("stop-after")
                .long("stop-after")
                .value_name("SECONDS")
                .help("Seconds from session start at which STOP is sent.")
                .value_parser(clap::value_parser!(u64))
                .default_value("15"),
        )
        .arg(
            Arg::new("worker")
                .long("worker")
                .action(ArgAction::SetTrue)
                .hide(true),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .value_name("NAME")
                .hide(true),
        )
        .get_matches();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    let config_path = matches.get_one::<PathBuf>("config").cloned();
    let session_config = match &config_path {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    if matches.get_flag("worker") {
        let channel = matches
            .get_one::<String>("channel")
            .cloned()
            .context("--worker requires --channel")?;

        let engine = SimEngine::new();
        channel::worker::run(&engine, &session_config, &channel).await
    } else {
        // gracefully close the session when receiving SIGINT, SIGTERM, or SIGHUP;
        // the worker observes the closed channel as an implicit STOP
        ctrlc::set_handler(move || {
            process::exit(130);
        })
        .expect("Error setting Ctrl-C handler");

        channel::supervisor::run(SupervisorOptions {
            config_path,
            pause_after: *matches.get_one::<u64>("pause-after").unwrap_or(&5),
            resume_after: *matches.get_one::<u64>("resume-after").unwrap_or(&10),
            stop_after: *matches.get_one::<u64>("stop-after").unwrap_or(&15),
        })
        .await
    }
}
