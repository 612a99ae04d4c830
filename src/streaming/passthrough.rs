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

//! The single-attempt and legacy proxy modes.
//!
//! REST-based server streaming and client/bidi streaming run a single
//! upstream attempt with events piped through. The legacy server-streaming
//! mode adds one wrinkle: an attempt that fails before producing any event
//! is re-issued, a bounded number of times.

use super::events::{Forwarder, RequestStream, Step, StreamEvent, StreamingStub, closed_error};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Retries granted to attempts that fail before any response, when the
/// retry policy does not say otherwise.
pub(crate) const DEFAULT_NO_RESPONSE_RETRIES: u32 = 2;

/// Pipes one upstream attempt to the consumer. Never retries.
pub(crate) async fn run_single_attempt<M>(
    mut stream: RequestStream<M>,
    tx: mpsc::UnboundedSender<StreamEvent<M>>,
    cancel: CancellationToken,
) where
    M: Send,
{
    let mut forwarder = Forwarder::new(tx.clone());
    let consumer_gone = tx;
    let mut cancel_requested = false;
    loop {
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
                match forwarder.on_event(event) {
                    Step::Continue => {}
                    Step::Complete => return,
                    Step::Upstream(e) => {
                        forwarder.fail(e);
                        return;
                    }
                }
            }
        }
    }
}

/// The legacy server-streaming wrapper.
///
/// Re-issues the call when it fails before any `metadata`, `response`, or
/// `data` arrived, up to `max_retries` times. Data already delivered by a
/// failed attempt is not reconciled with the next attempt; that is the
/// legacy behavior this mode preserves.
pub(crate) async fn run_no_response_retry<R, M, S>(
    mut stub: S,
    request: R,
    max_retries: u32,
    tx: mpsc::UnboundedSender<StreamEvent<M>>,
    cancel: CancellationToken,
) where
    R: Clone + Send + 'static,
    M: Send + 'static,
    S: StreamingStub<R, M>,
{
    let consumer_gone = tx.clone();
    let mut attempts: u32 = 0;
    let mut cancel_requested = false;
    loop {
        let mut stream = stub.call(request.clone(), None);
        let mut forwarder = Forwarder::new(tx.clone());
        let mut saw_response = false;
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
                    if matches!(
                        &event,
                        StreamEvent::Metadata(_) | StreamEvent::Response(_) | StreamEvent::Data(_)
                    ) {
                        saw_response = true;
                    }
                    match forwarder.on_event(event) {
                        Step::Continue => {}
                        Step::Complete => return,
                        Step::Upstream(e) => break 'attempt e,
                    }
                }
            }
        };
        if cancel_requested || saw_response || attempts >= max_retries {
            forwarder.fail(error);
            return;
        }
        attempts += 1;
        tracing::debug!(attempts, "retrying streaming call that failed before any response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::streaming::events::CallStatus;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn stream_of(events: Vec<StreamEvent<i32>>) -> RequestStream<i32> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event);
        }
        RequestStream::new(rx)
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<StreamEvent<i32>>) -> Vec<StreamEvent<i32>> {
        let mut got = Vec::new();
        while let Some(event) = rx.recv().await {
            got.push(event);
        }
        got
    }

    #[tokio::test]
    async fn single_attempt_forwards_error_unchanged() {
        let upstream = stream_of(vec![
            StreamEvent::Data(1),
            StreamEvent::Error(Error::unavailable("down")),
        ]);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_single_attempt(upstream, tx, CancellationToken::new()));
        let events = drain(rx).await;
        assert!(
            matches!(events.last(), Some(StreamEvent::Error(e)) if e.message() == "down"),
            "{events:?}"
        );
    }

    #[tokio::test]
    async fn no_response_error_is_retried() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = calls.clone();
        let stub = move |_request: i32, _timeout: Option<Duration>| {
            let mut calls = counter.lock().expect("calls lock");
            *calls += 1;
            if *calls == 1 {
                stream_of(vec![StreamEvent::Error(Error::unavailable("no response"))])
            } else {
                stream_of(vec![
                    StreamEvent::Data(1),
                    StreamEvent::Status(CallStatus::new(0)),
                    StreamEvent::End,
                ])
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_no_response_retry(
            stub,
            0,
            DEFAULT_NO_RESPONSE_RETRIES,
            tx,
            CancellationToken::new(),
        ));
        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(StreamEvent::End)), "{events:?}");
        assert_eq!(*calls.lock().expect("calls lock"), 2);
    }

    #[tokio::test]
    async fn error_after_data_is_not_retried() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = calls.clone();
        let stub = move |_request: i32, _timeout: Option<Duration>| {
            *counter.lock().expect("calls lock") += 1;
            stream_of(vec![
                StreamEvent::Data(1),
                StreamEvent::Error(Error::unavailable("mid-stream")),
            ])
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_no_response_retry(
            stub,
            0,
            DEFAULT_NO_RESPONSE_RETRIES,
            tx,
            CancellationToken::new(),
        ));
        let events = drain(rx).await;
        assert!(
            matches!(events.last(), Some(StreamEvent::Error(_))),
            "{events:?}"
        );
        assert_eq!(*calls.lock().expect("calls lock"), 1);
    }

    #[tokio::test]
    async fn no_response_retries_are_bounded() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = calls.clone();
        let stub = move |_request: i32, _timeout: Option<Duration>| {
            *counter.lock().expect("calls lock") += 1;
            stream_of(vec![StreamEvent::Error(Error::unavailable("no response"))])
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_no_response_retry(stub, 0, 2, tx, CancellationToken::new()));
        let events = drain(rx).await;
        assert!(
            matches!(events.last(), Some(StreamEvent::Error(_))),
            "{events:?}"
        );
        // The initial attempt plus two retries.
        assert_eq!(*calls.lock().expect("calls lock"), 3);
    }
}
