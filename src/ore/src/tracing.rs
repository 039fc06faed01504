// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tracing utilities.
//!
//! This module contains application tracing utilities built on top of the
//! [`tracing`] library. The key export is the **[`configure`]** function,
//! which configures the `tracing` crate with sensible defaults and should be
//! called during initialization of every harness binary.

use std::io::{self, IsTerminal};

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Application tracing configuration.
///
/// See the [`configure`] function for details.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Configuration of the stderr log.
    pub stderr_log: StderrLogConfig,
}

/// Configures the stderr log.
#[derive(Debug, Clone)]
pub struct StderrLogConfig {
    /// A filter directive, in [`EnvFilter`] syntax, which determines which
    /// events are emitted to the log.
    pub filter: String,
}

impl From<StderrLogConfig> for TracingConfig {
    fn from(stderr_log: StderrLogConfig) -> TracingConfig {
        TracingConfig { stderr_log }
    }
}

/// Enables application tracing via the [`tracing`] library.
///
/// Events are emitted as textual log lines to stderr, leaving stdout free for
/// the program's own output. ANSI colors are used only when stderr is a
/// terminal.
///
/// Returns an error if the filter cannot be parsed or if a global subscriber
/// has already been installed.
pub fn configure<C>(service_name: &str, config: C) -> Result<(), anyhow::Error>
where
    C: Into<TracingConfig>,
{
    let config = config.into();
    let filter = EnvFilter::try_new(&config.stderr_log.filter)
        .with_context(|| format!("parsing log filter {:?}", config.stderr_log.filter))?;

    let stderr_fmt = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_fmt)
        .try_init()
        .with_context(|| format!("initializing tracing for {}", service_name))?;

    ::tracing::debug!(service_name, "tracing configured");
    Ok(())
}
