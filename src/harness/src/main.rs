// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Waits for the data-diff engine matrix to come up, then runs tests against
//! it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use dd_harness::{Config, Deadline};
use dd_ore::cli::{self, CliConfig, KeyValueArg};
use dd_ore::error::ErrorExt;
use dd_ore::task;
use dd_ore::tracing::StderrLogConfig;
use tracing::{error, info, warn};

/// The exit code for configuration errors.
const EXIT_CONFIG_ERROR: i32 = 3;
/// The exit code for unexpected internal errors.
const EXIT_INTERNAL_ERROR: i32 = 4;

/// Waits for every configured database engine to become ready, then runs the
/// test matrix against the engines that did.
///
/// Engines are configured through `DATADIFF_<ENGINE>_URI` environment
/// variables, e.g. `DATADIFF_POSTGRESQL_URI`.
#[derive(clap::Parser, Debug)]
#[clap(name = "dd-harness", next_line_help = true)]
struct Args {
    /// The time after which the run is abandoned, covering both the
    /// readiness and test phases.
    #[clap(
        long,
        env = "DD_HARNESS_GLOBAL_DEADLINE",
        value_name = "DURATION",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    global_deadline: Duration,
    /// The maximum number of tests to run at once.
    #[clap(
        long,
        env = "DD_HARNESS_CONCURRENCY_LIMIT",
        value_name = "N",
        default_value_t = num_cpus::get()
    )]
    concurrency_limit: usize,
    /// Restrict the run to this engine. Can be specified multiple times.
    /// Defaults to every engine whose connection URI is set.
    #[clap(long = "engine", value_name = "ID")]
    engines: Vec<String>,
    /// Use this connection URI for an engine instead of its
    /// `DATADIFF_<ENGINE>_URI` variable. Can be specified multiple times.
    #[clap(long = "engine-uri", value_name = "ID=URI")]
    engine_uris: Vec<KeyValueArg<String, String>>,
    /// A JSON file describing the tests to run.
    #[clap(long, value_name = "PATH")]
    manifest: Option<PathBuf>,
    /// Write a machine-readable summary of the run to this file.
    #[clap(long, value_name = "PATH")]
    json_summary_file: Option<PathBuf>,
    /// Which log messages to emit, in `tracing_subscriber::EnvFilter` syntax.
    #[clap(long, env = "DD_HARNESS_LOG", value_name = "FILTER", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() {
    let args: Args = cli::parse_args(CliConfig {
        enable_version_flag: false,
    });
    if let Err(err) = dd_ore::tracing::configure(
        "dd-harness",
        StderrLogConfig {
            filter: args.log_filter.clone(),
        },
    ) {
        eprintln!("dd-harness: fatal: {}", err.display_with_causes());
        process::exit(EXIT_INTERNAL_ERROR);
    }
    process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    let deadline = Deadline::after(args.global_deadline);
    info!(
        global_deadline = %humantime::format_duration(args.global_deadline),
        concurrency_limit = args.concurrency_limit,
        "starting harness"
    );
    {
        let deadline = deadline.clone();
        task::spawn(|| "ctrl_c_handler", async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupted; canceling run");
                    deadline.cancel();
                }
                Err(e) => warn!("unable to listen for ctrl-c: {}", e),
            }
        });
    }

    let config = Config {
        concurrency_limit: args.concurrency_limit,
        engines: if args.engines.is_empty() {
            None
        } else {
            Some(args.engines.into_iter().collect::<BTreeSet<_>>())
        },
        engine_uris: args
            .engine_uris
            .into_iter()
            .map(|kv| (kv.key, kv.value))
            .collect(),
        manifest: args.manifest,
    };

    let report = match dd_harness::run(config, &deadline).await {
        Ok(report) => report,
        Err(err) => {
            error!("configuration error: {}", err.display_with_causes());
            eprintln!("dd-harness: {}", err.display_with_causes());
            return EXIT_CONFIG_ERROR;
        }
    };

    println!("{}", report);
    if let Some(path) = &args.json_summary_file {
        let json = report.as_json();
        let res = serde_json::to_string_pretty(&json)
            .map_err(anyhow::Error::from)
            .and_then(|s| std::fs::write(path, s).map_err(anyhow::Error::from));
        if let Err(err) = res {
            error!(
                "writing json summary to {}: {}",
                path.display(),
                err.display_with_causes()
            );
            return EXIT_INTERNAL_ERROR;
        }
    }
    report.verdict.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args: Args = cli::try_parse_args_from(
            CliConfig::default(),
            [
                "dd-harness",
                "--global-deadline",
                "90s",
                "--concurrency-limit",
                "2",
                "--engine",
                "postgresql",
                "--engine",
                "mysql",
                "--engine-uri",
                "mysql=mysql://localhost/db?ssl-mode=disabled",
            ],
        )
        .unwrap();
        assert_eq!(args.global_deadline, Duration::from_secs(90));
        assert_eq!(args.concurrency_limit, 2);
        assert_eq!(args.engines, vec!["postgresql", "mysql"]);
        assert_eq!(args.engine_uris[0].key, "mysql");
        assert_eq!(
            args.engine_uris[0].value,
            "mysql://localhost/db?ssl-mode=disabled"
        );
        assert!(args.manifest.is_none());
    }

    #[test]
    fn rejects_bad_durations() {
        let res: Result<Args, _> = cli::try_parse_args_from(
            CliConfig::default(),
            ["dd-harness", "--global-deadline", "soon"],
        );
        assert!(res.is_err());
    }
}
