// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The server-streaming retry state machine.
//!
//! One driver task presents a single logical stream to the consumer while
//! issuing successive upstream attempts. Events forward per the shared
//! rules; on an upstream error the driver consults the retry policy and the
//! backoff settings, sleeps, rebuilds the request through the resumption
//! function, and re-attempts. A message delivered to the consumer resets
//! the consecutive-failure budget, so a stream that keeps making progress
//! retries indefinitely.

use super::events::{Forwarder, Step, StreamEvent, StreamingStub, closed_error};
use crate::backoff::{BackoffSettings, Exhausted};
use crate::error::Error;
use crate::retry_policy::RetryPolicy;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) const NOT_TRANSIENT_NOTE: &str =
    "Exception occurred in retry method that was not classified as transient";

const MAX_RETRIES_ZERO_NOTE: &str = "Max retries is set to zero.";

pub(crate) async fn run<R, M, S>(
    mut stub: S,
    request: R,
    policy: RetryPolicy<R>,
    tx: mpsc::UnboundedSender<StreamEvent<M>>,
    cancel: CancellationToken,
) where
    R: Clone + Send + 'static,
    M: Send + 'static,
    S: StreamingStub<R, M>,
{
    let backoff = policy.backoff().clone();
    let loop_start = tokio::time::Instant::now();
    let mut retry_count: u32 = 0;
    let mut delay = backoff.initial_retry_delay();
    let mut timeout = backoff.initial_rpc_timeout();
    let mut current = request.clone();
    let mut cancel_requested = false;
    let consumer_gone = tx.clone();

    loop {
        let mut stream = stub.call(current.clone(), Some(timeout));
        let mut forwarder = Forwarder::new(tx.clone());
        let error = 'attempt: loop {
            tokio::select! {
                _ = cancel.cancelled(), if !cancel_requested => {
                    cancel_requested = true;
                    stream.cancel();
                }
                _ = consumer_gone.closed() => {
                    stream.cancel();
                    return;
                }
                event = stream.next_event() => {
                    let event = match event {
                        Some(event) => event,
                        None => StreamEvent::Error(closed_error(cancel_requested)),
                    };
                    if matches!(&event, StreamEvent::Data(_)) {
                        retry_count = 0;
                    }
                    match forwarder.on_event(event) {
                        Step::Continue => {}
                        Step::Complete => return,
                        Step::Upstream(e) => break 'attempt e,
                    }
                }
            }
        };
        drop(stream);

        // A cancellation surfaces as the upstream's own error, forwarded
        // unchanged; it never enters the retry path.
        if cancel_requested {
            forwarder.fail(error);
            return;
        }
        let mut error = error;
        error.decode_status_details();
        match (backoff.max_retries(), backoff.total_timeout()) {
            (None, None) => {
                // No retry budget means no retry regime.
                error.set_note(NOT_TRANSIENT_NOTE);
                forwarder.fail(error);
                return;
            }
            (Some(_), Some(_)) => {
                forwarder.fail(Error::invalid_argument(
                    "Cannot set both totalTimeoutMillis and maxRetries in backoffSettings.",
                ));
                return;
            }
            _ => {}
        }
        if !policy.classify(&error).is_retry() {
            error.set_note(NOT_TRANSIENT_NOTE);
            forwarder.fail(error);
            return;
        }
        if backoff.max_retries() == Some(0) {
            error.set_note(MAX_RETRIES_ZERO_NOTE);
            forwarder.fail(error);
            return;
        }
        let elapsed = tokio::time::Instant::now() - loop_start;
        match backoff.exceeded(retry_count, elapsed) {
            Some(Exhausted::DeadlineExceeded { total }) => {
                forwarder.fail(Error::deadline_exceeded(format!(
                    "Total timeout of API exceeded {} milliseconds retrying error {error}  before any response was received.",
                    total.as_millis()
                )));
                return;
            }
            Some(Exhausted::MaxRetries { .. }) => {
                forwarder.fail(Error::deadline_exceeded(format!(
                    "Exceeded maximum number of retries retrying error {error} before any response was received"
                )));
                return;
            }
            None => {}
        }

        let sleep = BackoffSettings::jittered(delay, &mut rand::rng());
        tracing::debug!(retry_count, sleep_ms = sleep.as_millis() as u64, "retrying streaming call");
        tokio::select! {
            _ = cancel.cancelled() => {
                forwarder.fail(Error::cancelled("the streaming call was cancelled"));
                return;
            }
            _ = tokio::time::sleep(sleep) => {}
        }
        retry_count += 1;
        delay = backoff.next_delay(delay);
        let remaining = backoff
            .total_timeout()
            .map(|total| total.saturating_sub(tokio::time::Instant::now() - loop_start));
        timeout = backoff.next_timeout(timeout, remaining);
        current = policy.next_request(&request);
    }
}
