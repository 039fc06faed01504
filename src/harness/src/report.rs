// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The result aggregator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::coordinator::{EngineState, EngineStatus};
use crate::dispatch::{TestOutcome, TestResult};

/// The overall classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every engine became ready and every test passed or was skipped by
    /// choice.
    Success,
    /// Something went wrong, but no test was blocked by a dead engine.
    PartialFailure,
    /// An engine that at least one test required failed or timed out.
    HardFailure,
}

impl Verdict {
    /// The process exit code for the verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::PartialFailure => 1,
            Verdict::HardFailure => 2,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Success => "success",
            Verdict::PartialFailure => "partial-failure",
            Verdict::HardFailure => "hard-failure",
        })
    }
}

/// Everything that happened in a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every engine's final status, in identifier order.
    pub engines: Vec<EngineStatus>,
    /// Every test's outcome, in identifier order.
    pub tests: Vec<TestOutcome>,
    pub verdict: Verdict,
}

/// Merges engine statuses and test outcomes into a report.
pub fn aggregate(
    statuses: BTreeMap<String, EngineStatus>,
    mut outcomes: Vec<TestOutcome>,
) -> RunReport {
    outcomes.sort_by(|a, b| a.test.cmp(&b.test));

    let required: BTreeSet<&str> = outcomes
        .iter()
        .flat_map(|o| o.requires.iter().map(|e| e.as_str()))
        .collect();
    let dead = |status: &EngineStatus| {
        matches!(status.state(), EngineState::Failed | EngineState::TimedOut)
    };

    let verdict = if statuses
        .values()
        .any(|s| dead(s) && required.contains(s.engine.as_str()))
    {
        Verdict::HardFailure
    } else if statuses.values().all(|s| s.is_ready())
        && outcomes.iter().all(|o| match &o.result {
            TestResult::Passed => true,
            TestResult::Skipped(reason) => !reason.spoils_success(),
            TestResult::Failed | TestResult::Errored => false,
        })
    {
        Verdict::Success
    } else {
        Verdict::PartialFailure
    };

    RunReport {
        engines: statuses.into_values().collect(),
        tests: outcomes,
        verdict,
    }
}

fn secs(d: Duration) -> String {
    format!("{:.3}s", d.as_secs_f64())
}

impl RunReport {
    pub fn as_json(&self) -> serde_json::Value {
        let engines: Vec<_> = self
            .engines
            .iter()
            .map(|e| {
                serde_json::json!({
                    "engine": e.engine,
                    "state": e.state().to_string(),
                    "attempts": e.attempts,
                    "first_ready_at": e.first_ready_at.map(|t| t.to_rfc3339()),
                    "ready_after_secs": e.ready_after.map(|d| d.as_secs_f64()),
                    "error": e.last_error,
                })
            })
            .collect();
        let tests: Vec<_> = self
            .tests
            .iter()
            .map(|t| {
                serde_json::json!({
                    "test": t.test,
                    "requires": t.requires,
                    "result": t.result.to_string(),
                    "duration_secs": t.duration.as_secs_f64(),
                    "diagnostic": t.diagnostic,
                })
            })
            .collect();
        serde_json::json!({
            "verdict": self.verdict.to_string(),
            "exit_code": self.verdict.exit_code(),
            "engines": engines,
            "tests": tests,
        })
    }
}

/// The line-oriented summary printed at the end of a run.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.engines {
            write!(f, "engine {} {} attempts={}", e.engine, e.state(), e.attempts)?;
            if let Some(ready_after) = e.ready_after {
                write!(f, " ready_after={}", secs(ready_after))?;
            }
            if let Some(error) = &e.last_error {
                write!(f, " error={:?}", error)?;
            }
            writeln!(f)?;
        }
        for t in &self.tests {
            write!(f, "test {} {} duration={}", t.test, t.result, secs(t.duration))?;
            if let Some(diagnostic) = &t.diagnostic {
                write!(f, " diagnostic={:?}", diagnostic)?;
            }
            writeln!(f)?;
        }
        write!(f, "verdict {}", self.verdict)
    }
}
