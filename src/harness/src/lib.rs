// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Readiness and test orchestration for the data-diff engine matrix.
//!
//! A run has two phases, both bounded by a single global [`Deadline`]:
//!
//!   1. **Readiness.** Every configured engine is probed concurrently until
//!      it serves queries, fails fatally, or runs out of time
//!      ([`coordinator::await_all`]).
//!   2. **Tests.** Every test whose engines are all ready runs on a bounded
//!      pool of workers ([`dispatch::run`]). The rest are skipped.
//!
//! The engine statuses and test outcomes are then folded into a single
//! [`RunReport`] with an overall [`Verdict`](report::Verdict).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub mod coordinator;
pub mod deadline;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod probe;
pub mod report;

pub use crate::deadline::Deadline;
pub use crate::engine::Registry;
pub use crate::error::ConfigError;
pub use crate::report::RunReport;

use crate::dispatch::TestCase;
use crate::probe::{FamilyProber, Prober};

/// Configures a harness run.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The maximum number of tests to run at once.
    pub concurrency_limit: usize,
    /// The engines to include in the run. `None` means every engine whose
    /// connection URI is set.
    pub engines: Option<BTreeSet<String>>,
    /// Connection URIs that take precedence over the environment, keyed by
    /// engine.
    pub engine_uris: BTreeMap<String, String>,
    /// The test manifest, if any.
    pub manifest: Option<PathBuf>,
}

/// Runs the harness against the engines configured in the environment.
///
/// Configuration errors are returned before any engine is probed. Everything
/// that goes wrong afterwards is recorded in the report.
pub async fn run(config: Config, deadline: &Deadline) -> Result<RunReport, ConfigError> {
    let registry = Registry::from_env(&config.engine_uris, config.engines.as_ref())?;
    let tests = match &config.manifest {
        Some(path) => manifest::load(path, &registry)?,
        None => vec![],
    };
    Ok(run_with(
        &registry,
        tests,
        Arc::new(FamilyProber),
        config.concurrency_limit,
        deadline,
    )
    .await)
}

/// Runs the harness with explicit engines, tests, and prober.
pub async fn run_with(
    registry: &Registry,
    tests: Vec<TestCase>,
    prober: Arc<dyn Prober>,
    concurrency_limit: usize,
    deadline: &Deadline,
) -> RunReport {
    let profiles: Vec<_> = registry.profiles().cloned().collect();
    info!(
        engines = profiles.len(),
        tests = tests.len(),
        "awaiting engine readiness"
    );
    let statuses = coordinator::await_all(&profiles, prober, deadline).await;
    let ready = statuses.values().filter(|s| s.is_ready()).count();
    info!(ready, engines = statuses.len(), "readiness phase complete");

    let outcomes = dispatch::run(tests, &statuses, concurrency_limit, deadline).await;
    let report = report::aggregate(statuses, outcomes);
    info!(verdict = %report.verdict, "run complete");
    report
}
