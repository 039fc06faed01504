// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The run-wide cancellation signal.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// The global deadline of a harness run.
///
/// A `Deadline` is a single cancellation token shared by every probe and every
/// test execution. It fires when its instant passes or when it is canceled
/// explicitly (e.g., on Ctrl-C), whichever happens first. Clones share the
/// same token.
///
/// Long-running operations must race their suspension points against
/// [`Deadline::fired`] and return promptly once it resolves.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// Creates a deadline that fires `duration` from now.
    pub fn after(duration: Duration) -> Deadline {
        Deadline {
            at: Instant::now() + duration,
            token: CancellationToken::new(),
        }
    }

    /// Fires the deadline immediately.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reports whether the deadline has fired.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.at
    }

    /// The time left until the deadline fires.
    pub fn remaining(&self) -> Duration {
        if self.token.is_cancelled() {
            Duration::ZERO
        } else {
            self.at.saturating_duration_since(Instant::now())
        }
    }

    /// Resolves once the deadline has fired.
    ///
    /// Whichever waiter observes the instant passing cancels the shared token,
    /// so every other waiter wakes up too.
    pub async fn fired(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = sleep_until(self.at) => self.token.cancel(),
        }
    }
}
