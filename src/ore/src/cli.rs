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

//! Command-line parsing utilities.

use std::ffi::OsString;
use std::fmt::Display;
use std::str::FromStr;

use clap::Parser;

/// A help template for use with clap that does not include the name of the
/// binary or the version in the help output.
const NO_VERSION_HELP_TEMPLATE: &str = "{about}

USAGE:
    {usage}

{all-args}";

/// Configures command-line parsing via [`parse_args`].
#[derive(Debug, Default, Clone)]
pub struct CliConfig {
    /// Whether to enable the `--version` flag.
    pub enable_version_flag: bool,
}

/// Parses the process's command-line arguments according to a clap
/// [`Parser`] after applying harness-specific customizations.
///
/// Exits the process with clap's usage error if parsing fails.
pub fn parse_args<O>(config: CliConfig) -> O
where
    O: Parser,
{
    parse_args_from(config, std::env::args_os())
}

/// Like [`parse_args`], but parses the provided arguments rather than the
/// process's command-line arguments.
///
/// The first item of `args` is the binary name.
pub fn parse_args_from<O, I, T>(config: CliConfig, args: I) -> O
where
    O: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match try_parse_args_from(config, args) {
        Ok(o) => o,
        Err(e) => e.exit(),
    }
}

/// Like [`parse_args_from`], but returns parse errors to the caller instead
/// of exiting the process.
pub fn try_parse_args_from<O, I, T>(config: CliConfig, args: I) -> Result<O, clap::Error>
where
    O: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut clap = O::command()
        .args_override_self(true)
        .help_template(NO_VERSION_HELP_TEMPLATE);
    if !config.enable_version_flag {
        clap = clap.disable_version_flag(true);
    }
    let matches = clap.try_get_matches_from(args)?;
    O::from_arg_matches(&matches)
}

/// A command-line argument of the form `KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueArg<K, V> {
    /// The key of the command-line argument.
    pub key: K,
    /// The value of the command-line argument.
    pub value: V,
}

impl<K, V> FromStr for KeyValueArg<K, V>
where
    K: FromStr,
    K::Err: Display,
    V: FromStr,
    V::Err: Display,
{
    type Err = String;

    fn from_str(s: &str) -> Result<KeyValueArg<K, V>, String> {
        // Split on the first `=` only. Values are frequently URLs, which may
        // contain `=` in their query strings.
        let Some((key, value)) = s.split_once('=') else {
            return Err("must have format KEY=VALUE".to_string());
        };
        Ok(KeyValueArg {
            key: key.parse().map_err(|e| format!("parsing key: {}", e))?,
            value: value.parse().map_err(|e| format!("parsing value: {}", e))?,
        })
    }
}
