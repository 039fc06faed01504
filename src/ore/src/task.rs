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

//! Tokio task utilities.
//!
//! Every task spawned by the harness carries a name, so that it can be
//! identified in the Tokio console and in panic reports.

use std::any::Any;
use std::future::Future;

use tokio::task::{JoinError, JoinHandle};

/// Spawns a new asynchronous task with a name.
///
/// The name is only attached to the task when the binary is built with
/// `--cfg tokio_unstable`; otherwise it is only evaluated for the trace
/// event emitted here.
#[track_caller]
pub fn spawn<Fut, Name, NameClosure>(nc: NameClosure, future: Fut) -> JoinHandle<Fut::Output>
where
    Name: AsRef<str>,
    NameClosure: FnOnce() -> Name,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    #[cfg(tokio_unstable)]
    {
        let name = nc();
        ::tracing::trace!(task = name.as_ref(), "spawning task");
        tokio::task::Builder::new()
            .name(name.as_ref())
            .spawn(future)
            .expect("task spawning cannot fail")
    }
    #[cfg(not(tokio_unstable))]
    {
        ::tracing::trace!(task = nc().as_ref(), "spawning task");
        tokio::spawn(future)
    }
}

/// Extracts a human-readable message from a task that failed to complete.
pub fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".into();
    }
    panic_message(err.into_panic())
}

/// Extracts the message from a panic payload, as captured by
/// [`std::panic::catch_unwind`] or a failed [`JoinHandle`].
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked with a non-string payload".into()
    }
}
