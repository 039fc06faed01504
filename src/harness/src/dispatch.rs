// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The test dispatcher.
//!
//! Tests whose engines are all ready are fanned out across a pool of workers
//! bounded by a semaphore. Every test yields exactly one [`TestOutcome`],
//! even if it was skipped or its worker crashed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dd_ore::error::ErrorExt;
use dd_ore::task;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coordinator::EngineStatus;
use crate::deadline::Deadline;

/// A unit of work exercising one or more engines.
///
/// The harness treats the work as opaque: it only learns whether it
/// succeeded.
#[async_trait]
pub trait TestUnit: fmt::Debug + Send + Sync {
    /// Runs the test.
    ///
    /// Implementations should return promptly once `deadline` fires; the
    /// dispatcher abandons them regardless.
    async fn execute(&self, deadline: &Deadline) -> Result<(), TestFailure>;
}

/// Why a test did not pass.
#[derive(Debug, thiserror::Error)]
pub enum TestFailure {
    /// The test ran and its assertions failed.
    #[error("{0}")]
    Failed(String),
    /// The test could not be run to completion.
    #[error(transparent)]
    Errored(#[from] anyhow::Error),
}

/// A test and the engines it requires.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: String,
    pub requires: BTreeSet<String>,
    pub unit: Arc<dyn TestUnit>,
}

/// Why a test was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required engine did not become ready.
    EngineUnavailable(String),
    /// A required engine was not part of this run.
    EngineNotInScope(String),
    /// The global deadline fired before the test could start.
    DeadlineExceeded,
}

impl SkipReason {
    /// Reports whether this skip prevents the run from succeeding.
    ///
    /// Leaving an engine out of the run is the operator's choice, not a
    /// failure.
    pub fn spoils_success(&self) -> bool {
        match self {
            SkipReason::EngineUnavailable(_) | SkipReason::DeadlineExceeded => true,
            SkipReason::EngineNotInScope(_) => false,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EngineUnavailable(engine) => write!(f, "engine-unavailable({})", engine),
            SkipReason::EngineNotInScope(engine) => write!(f, "engine-not-in-scope({})", engine),
            SkipReason::DeadlineExceeded => f.write_str("deadline-exceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Passed,
    Failed,
    Skipped(SkipReason),
    Errored,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestResult::Passed => f.write_str("passed"),
            TestResult::Failed => f.write_str("failed"),
            TestResult::Skipped(reason) => write!(f, "skipped({})", reason),
            TestResult::Errored => f.write_str("errored"),
        }
    }
}

/// The outcome of one test.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub test: String,
    pub requires: BTreeSet<String>,
    pub result: TestResult,
    pub duration: Duration,
    pub diagnostic: Option<String>,
}

impl TestOutcome {
    fn skipped(case: &TestCase, reason: SkipReason) -> TestOutcome {
        TestOutcome {
            test: case.id.clone(),
            requires: case.requires.clone(),
            diagnostic: Some(format!("skipped: {}", reason)),
            result: TestResult::Skipped(reason),
            duration: Duration::ZERO,
        }
    }
}

/// Decides whether `case` can run given the engines' final statuses.
///
/// An unavailable engine takes precedence over one that is out of scope.
fn gate(case: &TestCase, statuses: &BTreeMap<String, EngineStatus>) -> Option<SkipReason> {
    let mut not_in_scope = None;
    for engine in &case.requires {
        match statuses.get(engine) {
            Some(status) if status.is_ready() => (),
            Some(_) => return Some(SkipReason::EngineUnavailable(engine.clone())),
            None => {
                not_in_scope.get_or_insert_with(|| SkipReason::EngineNotInScope(engine.clone()));
            }
        }
    }
    not_in_scope
}

/// Runs every test whose engines are ready, at most `concurrency_limit` at a
/// time.
///
/// Returns one outcome per test, in no particular order. A limit of zero is
/// treated as one.
pub async fn run(
    cases: Vec<TestCase>,
    statuses: &BTreeMap<String, EngineStatus>,
    concurrency_limit: usize,
    deadline: &Deadline,
) -> Vec<TestOutcome> {
    let limit = concurrency_limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut outcomes = Vec::with_capacity(cases.len());
    let mut dispatches = FuturesUnordered::new();

    for case in cases {
        if let Some(reason) = gate(&case, statuses) {
            debug!(test = %case.id, "skipping: {}", reason);
            outcomes.push(TestOutcome::skipped(&case, reason));
            continue;
        }
        let semaphore = Arc::clone(&semaphore);
        let deadline = deadline.clone();
        dispatches.push(async move {
            let permit = tokio::select! {
                biased;
                _ = deadline.fired() => None,
                permit = semaphore.acquire_owned() => {
                    Some(permit.expect("acquiring permit from open semaphore"))
                }
            };
            let Some(permit) = permit else {
                return TestOutcome::skipped(&case, SkipReason::DeadlineExceeded);
            };
            let id = case.id.clone();
            let requires = case.requires.clone();
            let start = Instant::now();
            let handle = task::spawn(|| format!("test:{}", id), async move {
                let res = execute(&case, &deadline).await;
                drop(permit);
                res
            });
            let (result, diagnostic) = match handle.await {
                Ok(res) => res,
                Err(e) => (TestResult::Errored, Some(task::join_error_message(e))),
            };
            TestOutcome {
                test: id,
                requires,
                result,
                duration: start.elapsed(),
                diagnostic,
            }
        });
    }

    info!(
        dispatched = dispatches.len(),
        skipped = outcomes.len(),
        concurrency_limit = limit,
        "running tests"
    );
    while let Some(outcome) = dispatches.next().await {
        match &outcome.result {
            TestResult::Passed => {
                info!(test = %outcome.test, duration = ?outcome.duration, "test passed")
            }
            result => warn!(
                test = %outcome.test,
                duration = ?outcome.duration,
                "test {}: {}",
                result,
                outcome.diagnostic.as_deref().unwrap_or("")
            ),
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn execute(case: &TestCase, deadline: &Deadline) -> (TestResult, Option<String>) {
    debug!(test = %case.id, "starting test");
    tokio::select! {
        biased;
        _ = deadline.fired() => (TestResult::Errored, Some("canceled at deadline".into())),
        res = case.unit.execute(deadline) => match res {
            Ok(()) => (TestResult::Passed, None),
            Err(TestFailure::Failed(msg)) => (TestResult::Failed, Some(msg)),
            Err(TestFailure::Errored(e)) => (TestResult::Errored, Some(e.to_string_with_causes())),
        },
    }
}
