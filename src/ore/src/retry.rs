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

//! Retry utilities.
//!
//! Retries here use a fixed interval between attempts rather than an
//! exponential backoff. The callers are waiting on services whose startup
//! latency is roughly bounded, so a steady poll detects readiness sooner than
//! a backoff that has grown large by the time the service comes up.

use std::time::Duration;

use tokio::time::Instant;

/// Configures a retry operation.
///
/// See [`Retry::into_retry_stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retry {
    /// The sleep between consecutive attempts.
    pub interval: Duration,
    /// Bounds the time at which a new attempt may start, measured from the
    /// creation of the stream.
    ///
    /// `None` means attempts may start at any time.
    pub max_duration: Option<Duration>,
}

impl Retry {
    /// Retries at a steady pace of one attempt per `interval`, forever.
    pub fn fixed(interval: Duration) -> Retry {
        Retry {
            interval,
            max_duration: None,
        }
    }

    /// Sets the duration after which no new attempt will be started.
    pub fn max_duration(mut self, duration: Duration) -> Retry {
        self.max_duration = Some(duration);
        self
    }

    /// Converts into a [`RetryStream`], starting the clock for
    /// [`Retry::max_duration`].
    pub fn into_retry_stream(self) -> RetryStream {
        RetryStream {
            cfg: self,
            start: Instant::now(),
            attempt: 0,
        }
    }
}

/// A series of fixed sleeps between attempts.
///
/// The caller makes an attempt, and if it fails asks [`RetryStream::next_sleep`]
/// whether another attempt is permitted.
#[derive(Debug)]
pub struct RetryStream {
    cfg: Retry,
    start: Instant,
    attempt: usize,
}

impl RetryStream {
    /// How many attempts have completed, i.e., how many times
    /// [`RetryStream::advance`] has been called.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// The time elapsed since the stream was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// The sleep to perform before the next attempt, or `None` if the next
    /// attempt would exceed the configured budget.
    ///
    /// An attempt is permitted only if it would *start* strictly before
    /// [`Retry::max_duration`] elapses.
    pub fn next_sleep(&self) -> Option<Duration> {
        if let Some(max_duration) = self.cfg.max_duration {
            let next_start = self.elapsed().saturating_add(self.cfg.interval);
            if next_start >= max_duration {
                return None;
            }
        }
        Some(self.cfg.interval)
    }

    /// Records the completion of an attempt.
    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}
