// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Readiness probes.
//!
//! A probe is a single, lightweight check of whether an engine can serve
//! queries. Each engine family knows how to reach its engines (see
//! [`EngineFamily`]); the [`FamilyProber`] wraps a family's check with the
//! per-probe timeout and the run's [`Deadline`], and classifies the result.

use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use dd_ore::error::ErrorExt;
use dd_ore::result::Severity;
use tokio::time::Instant;

use crate::deadline::Deadline;
use crate::engine::EngineProfile;
use crate::engine::uri::{ConnectionUri, UriError};

pub mod handshake;
pub mod http;
pub mod mysql;
pub mod postgres;

/// How an engine family checks readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Connect with the engine's native driver and run a trivial query.
    SqlPing,
    /// Connect to the engine's endpoint and complete the opening exchange of
    /// its wire protocol.
    Handshake,
    /// Issue a GET against a health endpoint.
    HttpHealth,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeKind::SqlPing => "sql-ping",
            ProbeKind::Handshake => "handshake",
            ProbeKind::HttpHealth => "http-health",
        })
    }
}

/// The classification of a single probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The engine served the probe.
    Ready,
    /// The engine did not serve the probe, but may if asked again later.
    TransientFailure,
    /// The engine will never serve the probe, e.g. because the URI is
    /// malformed or the credentials were rejected.
    FatalFailure,
}

/// The result of one probe attempt.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub engine: String,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
    /// The error that caused a failure, with its causes.
    pub error: Option<String>,
}

impl ProbeResult {
    /// Classifies the result of an engine family's readiness check.
    pub fn from_check(
        engine: String,
        res: Result<(), Severity<anyhow::Error>>,
        latency: Duration,
    ) -> ProbeResult {
        let (outcome, error) = match res {
            Ok(()) => (ProbeOutcome::Ready, None),
            Err(Severity::Recoverable(e)) => (
                ProbeOutcome::TransientFailure,
                Some(e.to_string_with_causes()),
            ),
            Err(Severity::Fatal(e)) => (ProbeOutcome::FatalFailure, Some(e.to_string_with_causes())),
        };
        ProbeResult {
            engine,
            outcome,
            latency,
            error,
        }
    }
}

/// The capabilities of a family of engines that share a wire protocol and
/// URI shape.
///
/// There is one implementation per family; an [`EngineProfile`] selects its
/// family by its [`EngineKind`](crate::engine::EngineKind).
#[async_trait]
pub trait EngineFamily: fmt::Debug + Send + Sync {
    /// How this family checks readiness.
    fn probe_kind(&self) -> ProbeKind;

    /// The URI schemes this family accepts.
    fn schemes(&self) -> &'static [&'static str];

    /// Parses and validates a connection URI for this family.
    fn parse_uri(&self, raw: &str) -> Result<ConnectionUri, UriError> {
        ConnectionUri::parse(raw, self.schemes())
    }

    /// Performs one readiness check against the engine at `uri`.
    ///
    /// Errors must be classified: recoverable if the engine may yet become
    /// ready, fatal if it never will. `timeout` is a hint for driver-level
    /// connect timeouts; the caller enforces it regardless.
    async fn check(&self, uri: &ConnectionUri, timeout: Duration)
    -> Result<(), Severity<anyhow::Error>>;
}

/// Issues readiness probes.
///
/// This is the seam between the readiness coordinator and the network. The
/// production implementation is [`FamilyProber`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes the engine described by `profile` once.
    ///
    /// Must not return an error: every failure is folded into the
    /// [`ProbeResult`]. Must return promptly once `deadline` fires.
    async fn probe(&self, profile: &EngineProfile, deadline: &Deadline) -> ProbeResult;
}

/// Probes engines using their [`EngineFamily`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FamilyProber;

#[async_trait]
impl Prober for FamilyProber {
    async fn probe(&self, profile: &EngineProfile, deadline: &Deadline) -> ProbeResult {
        let start = Instant::now();
        let family = profile.family();
        let res = match family.parse_uri(profile.uri()) {
            Err(e) => Err(Severity::Fatal(
                anyhow::Error::new(e).context(format!("parsing {}", profile.env_var)),
            )),
            Ok(uri) => {
                // Drivers need not wait past the deadline.
                let timeout = profile.connect_timeout.min(deadline.remaining());
                tokio::select! {
                    biased;
                    _ = deadline.fired() => Err(Severity::Recoverable(anyhow!("probe canceled"))),
                    res = tokio::time::timeout(timeout, family.check(&uri, timeout)) => {
                        match res {
                            Ok(res) => res,
                            Err(_) => Err(Severity::Recoverable(anyhow!(
                                "probe timed out after {}",
                                humantime::format_duration(timeout)
                            ))),
                        }
                    }
                }
            }
        };
        ProbeResult::from_check(profile.id.clone(), res, start.elapsed())
    }
}
