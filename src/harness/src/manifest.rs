// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Test manifests.
//!
//! A manifest is a JSON document listing the tests of a run:
//!
//! ```json
//! {
//!   "tests": [
//!     {
//!       "id": "diff_postgresql_mysql",
//!       "requires": ["postgresql", "mysql"],
//!       "command": ["python", "-m", "unittest", "tests.test_database_types"],
//!       "env": {"N_SAMPLES": "100"}
//!     }
//!   ]
//! }
//! ```
//!
//! Every test runs as a subprocess with the connection URI of every
//! configured engine in its environment.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::deadline::Deadline;
use crate::dispatch::{TestCase, TestFailure, TestUnit};
use crate::engine::Registry;
use crate::error::ConfigError;

/// The number of trailing stderr lines kept as a failed test's diagnostic.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    tests: Vec<ManifestTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestTest {
    id: String,
    #[serde(default)]
    requires: BTreeSet<String>,
    command: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// Loads the test cases described by the manifest at `path`.
pub fn load(path: &Path, registry: &Registry) -> Result<Vec<TestCase>, ConfigError> {
    load_inner(path, registry).map_err(|source| ConfigError::Manifest {
        path: path.to_owned(),
        source,
    })
}

fn load_inner(path: &Path, registry: &Registry) -> Result<Vec<TestCase>, anyhow::Error> {
    let contents = std::fs::read_to_string(path).context("reading manifest")?;
    let manifest: Manifest = serde_json::from_str(&contents).context("parsing manifest")?;
    parse(manifest, registry)
}

fn parse(manifest: Manifest, registry: &Registry) -> Result<Vec<TestCase>, anyhow::Error> {
    let engine_env: BTreeMap<String, String> = registry
        .profiles()
        .map(|profile| (profile.env_var.clone(), profile.uri().to_owned()))
        .collect();

    let mut seen = BTreeSet::new();
    let mut cases = Vec::with_capacity(manifest.tests.len());
    for test in manifest.tests {
        if test.id.is_empty() {
            bail!("test with empty id");
        }
        if !seen.insert(test.id.clone()) {
            bail!("duplicate test id {:?}", test.id);
        }
        for engine in &test.requires {
            match registry.resolve(engine) {
                // Known but not selected: the test is skipped as out of scope.
                Ok(_) | Err(ConfigError::ConfigurationMissing { .. }) => (),
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("test {:?}", test.id)));
                }
            }
        }
        let Some((program, args)) = test.command.split_first() else {
            bail!("test {:?} has an empty command", test.id);
        };

        let mut env = engine_env.clone();
        env.extend(test.env);
        let unit = CommandUnit {
            program: program.clone(),
            args: args.to_vec(),
            env,
        };
        cases.push(TestCase {
            id: test.id,
            requires: test.requires,
            unit: Arc::new(unit),
        });
    }
    Ok(cases)
}

/// A test that runs a subprocess.
///
/// Exit status zero passes; any other exit status fails, with the tail of
/// the subprocess's stderr as the diagnostic.
pub struct CommandUnit {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandUnit {
    pub fn new(program: String, args: Vec<String>, env: BTreeMap<String, String>) -> CommandUnit {
        CommandUnit { program, args, env }
    }
}

impl std::fmt::Debug for CommandUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The environment holds credentials.
        f.debug_struct("CommandUnit")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl TestUnit for CommandUnit {
    async fn execute(&self, _deadline: &Deadline) -> Result<(), TestFailure> {
        debug!(program = %self.program, args = ?self.args, "spawning test command");
        // Dropping the future on cancellation kills the child.
        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            // Only the stderr tail is reported; stdout may be large.
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning {:?}", self.program))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<_> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let msg = match output.status.code() {
            Some(code) => format!("exited with code {}", code),
            None => format!("terminated: {}", output.status),
        };
        if tail.is_empty() {
            Err(TestFailure::Failed(msg))
        } else {
            Err(TestFailure::Failed(format!("{}: {}", msg, tail)))
        }
    }
}
