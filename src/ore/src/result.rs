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

//! Result utilities.

/// Error wrapper that conveys severity information.
///
/// A recoverable error is one that may go away if the operation is retried,
/// e.g. a refused connection to a server that is still starting up. A fatal
/// error will not go away no matter how often the operation is retried.
#[derive(Debug)]
pub enum Severity<E> {
    /// A recoverable error.
    Recoverable(E),
    /// A fatal error.
    Fatal(E),
}

impl<E> Severity<E> {
    /// Reports whether the error is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Severity::Fatal(_))
    }

    /// Returns the wrapped error, discarding the severity.
    pub fn into_inner(self) -> E {
        match self {
            Severity::Recoverable(e) | Severity::Fatal(e) => e,
        }
    }

    /// Applies `f` to the wrapped error, preserving the severity.
    pub fn map<E2, F>(self, f: F) -> Severity<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Severity::Recoverable(e) => Severity::Recoverable(f(e)),
            Severity::Fatal(e) => Severity::Fatal(f(e)),
        }
    }
}

/// Extension methods for [`std::result::Result`].
pub trait ResultExt<T, E> {
    /// Marks an error as recoverable.
    fn recoverable(self) -> Result<T, Severity<E>>;

    /// Marks an error as fatal.
    fn fatal(self) -> Result<T, Severity<E>>;

    /// Marks an error as fatal if `is_fatal` returns true for it, and as
    /// recoverable otherwise.
    fn severity_by<F>(self, is_fatal: F) -> Result<T, Severity<E>>
    where
        F: FnOnce(&E) -> bool;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn recoverable(self) -> Result<T, Severity<E>> {
        self.map_err(Severity::Recoverable)
    }

    fn fatal(self) -> Result<T, Severity<E>> {
        self.map_err(Severity::Fatal)
    }

    fn severity_by<F>(self, is_fatal: F) -> Result<T, Severity<E>>
    where
        F: FnOnce(&E) -> bool,
    {
        self.map_err(|e| {
            if is_fatal(&e) {
                Severity::Fatal(e)
            } else {
                Severity::Recoverable(e)
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn severity_by_classifies_errors() {
        let refused: Result<(), u16> = Err(2003);
        let denied: Result<(), u16> = Err(1045);
        let is_fatal = |code: &u16| *code == 1045;

        let refused = refused.severity_by(is_fatal).unwrap_err();
        assert!(!refused.is_fatal());
        assert_eq!(refused.into_inner(), 2003);

        let denied = denied.severity_by(is_fatal).unwrap_err();
        assert!(denied.is_fatal());
        assert_eq!(denied.map(|code| code.to_string()).into_inner(), "1045");
    }
}
