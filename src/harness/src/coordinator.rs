// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The readiness coordinator.
//!
//! Every engine is polled by its own task until it reaches a terminal
//! state. The task owns the engine's [`EngineStatus`] and hands it
//! back when it finishes, so there is no shared status map to synchronize.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dd_ore::retry::Retry;
use dd_ore::task;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::engine::EngineProfile;
use crate::probe::{ProbeOutcome, Prober};

/// The readiness state of an engine.
///
/// States only move forward: `Pending` → `Probing` → one of the terminal
/// states `Ready`, `Failed`, or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Pending,
    Probing,
    Ready,
    Failed,
    TimedOut,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Ready | EngineState::Failed | EngineState::TimedOut
        )
    }

    fn can_transition_to(&self, to: EngineState) -> bool {
        match (self, to) {
            (EngineState::Pending, EngineState::Probing) => true,
            // An engine can run out of time before its first probe.
            (EngineState::Pending, EngineState::TimedOut) => true,
            (EngineState::Probing, to) => to.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Pending => "pending",
            EngineState::Probing => "probing",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
            EngineState::TimedOut => "timed-out",
        })
    }
}

/// The readiness of one engine over the course of a run.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub engine: String,
    state: EngineState,
    /// The number of probes issued.
    pub attempts: usize,
    /// The wall-clock time of the first successful probe.
    pub first_ready_at: Option<DateTime<Utc>>,
    /// The time from the start of polling to the first successful probe.
    pub ready_after: Option<Duration>,
    /// The error of the most recent failed probe, or the reason the engine
    /// timed out.
    pub last_error: Option<String>,
}

impl EngineStatus {
    pub fn new(engine: String) -> EngineStatus {
        EngineStatus {
            engine,
            state: EngineState::Pending,
            attempts: 0,
            first_ready_at: None,
            ready_after: None,
            last_error: None,
        }
    }

    /// Builds a status in an arbitrary state.
    #[cfg(test)]
    pub(crate) fn with_state(engine: &str, state: EngineState) -> EngineStatus {
        EngineStatus {
            state,
            ..EngineStatus::new(engine.into())
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    fn transition(&mut self, to: EngineState) {
        if self.state == to {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid engine state transition {} -> {}",
            self.state,
            to
        );
        debug!(engine = %self.engine, "{} -> {}", self.state, to);
        self.state = to;
    }

    fn time_out(&mut self, reason: String) {
        warn!(engine = %self.engine, attempts = self.attempts, "timed out: {}", reason);
        self.last_error = Some(match self.last_error.take() {
            Some(last) => format!("{}; last error: {}", reason, last),
            None => reason,
        });
        self.transition(EngineState::TimedOut);
    }
}

/// Polls every engine concurrently until each has reached a terminal state.
///
/// Returns the final status of every engine, keyed by engine identifier. Once
/// `deadline` fires, engines that are not yet terminal are forced to
/// [`EngineState::TimedOut`] and the function returns promptly.
pub async fn await_all(
    profiles: &[EngineProfile],
    prober: Arc<dyn Prober>,
    deadline: &Deadline,
) -> BTreeMap<String, EngineStatus> {
    let handles: Vec<_> = profiles
        .iter()
        .map(|profile| {
            let id = profile.id.clone();
            let handle = task::spawn(
                || format!("poll_engine:{}", id),
                poll_engine(profile.clone(), Arc::clone(&prober), deadline.clone()),
            );
            (id, handle)
        })
        .collect();

    let mut statuses = BTreeMap::new();
    for (id, handle) in handles {
        let status = match handle.await {
            Ok(status) => status,
            Err(e) => {
                let msg = task::join_error_message(e);
                warn!(engine = %id, "readiness task failed: {}", msg);
                let mut status = EngineStatus::new(id.clone());
                status.state = EngineState::Failed;
                status.last_error = Some(msg);
                status
            }
        };
        statuses.insert(id, status);
    }
    statuses
}

/// Drives one engine's state machine to a terminal state.
async fn poll_engine(
    profile: EngineProfile,
    prober: Arc<dyn Prober>,
    deadline: Deadline,
) -> EngineStatus {
    let mut status = EngineStatus::new(profile.id.clone());
    let mut retry = Retry::fixed(profile.retry_interval);
    if let Some(grace_period) = profile.grace_period {
        retry = retry.max_duration(grace_period);
    }
    let mut retry = retry.into_retry_stream();
    let start = Instant::now();
    info!(
        engine = %profile.id,
        kind = %profile.probe_kind(),
        uri = %profile.redacted_uri(),
        "waiting for engine"
    );

    loop {
        if deadline.is_expired() {
            status.time_out("global deadline exceeded".into());
            return status;
        }
        status.transition(EngineState::Probing);
        retry.advance();
        status.attempts = retry.attempt();

        // Racing here as well as inside the prober keeps a stuck prober from
        // holding the run past its deadline. An attempt in flight when the
        // grace period ends does not get to finish either.
        let res = tokio::select! {
            biased;
            _ = deadline.fired() => {
                status.time_out("global deadline exceeded".into());
                return status;
            }
            _ = grace_period_end(start, profile.grace_period) => {
                status.time_out(grace_period_exceeded(profile.grace_period));
                return status;
            }
            res = prober.probe(&profile, &deadline) => res,
        };
        debug!(
            engine = %profile.id,
            attempt = status.attempts,
            latency = ?res.latency,
            outcome = ?res.outcome,
            "probe finished"
        );

        match res.outcome {
            ProbeOutcome::Ready => {
                let ready_after = start.elapsed();
                status.first_ready_at = Some(Utc::now());
                status.ready_after = Some(ready_after);
                status.last_error = None;
                status.transition(EngineState::Ready);
                info!(
                    engine = %profile.id,
                    attempts = status.attempts,
                    "engine ready after {}",
                    humantime::format_duration(ready_after)
                );
                return status;
            }
            ProbeOutcome::FatalFailure => {
                status.last_error = res.error;
                status.transition(EngineState::Failed);
                warn!(
                    engine = %profile.id,
                    "engine failed: {}",
                    status.last_error.as_deref().unwrap_or("unknown error")
                );
                return status;
            }
            ProbeOutcome::TransientFailure => {
                status.last_error = res.error;
                let Some(sleep) = retry.next_sleep() else {
                    status.time_out(grace_period_exceeded(profile.grace_period));
                    return status;
                };
                debug!(
                    engine = %profile.id,
                    attempt = status.attempts,
                    "engine not ready: {}",
                    status.last_error.as_deref().unwrap_or("unknown error")
                );
                tokio::select! {
                    biased;
                    _ = deadline.fired() => {
                        status.time_out("global deadline exceeded".into());
                        return status;
                    }
                    _ = tokio::time::sleep(sleep) => {}
                }
            }
        }
    }
}

/// Resolves when the grace period that started at `start` ends, or never if
/// there is none.
async fn grace_period_end(start: Instant, grace_period: Option<Duration>) {
    match grace_period {
        Some(grace_period) => tokio::time::sleep_until(start + grace_period).await,
        None => std::future::pending().await,
    }
}

fn grace_period_exceeded(grace_period: Option<Duration>) -> String {
    format!(
        "grace period of {} exceeded",
        humantime::format_duration(grace_period.unwrap_or_default())
    )
}
