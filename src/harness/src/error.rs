// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

/// An error in the harness configuration.
///
/// Configuration errors abort the run before any engine is probed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown engine {engine:?}")]
    UnknownEngine { engine: String },
    #[error("engine {engine:?} is not configured: set {env_var} or pass --engine-uri {engine}=URI")]
    ConfigurationMissing { engine: String, env_var: String },
    #[error("no engines configured: set at least one DATADIFF_<ENGINE>_URI variable")]
    NoEngines,
    #[error("invalid test manifest {}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
