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

//! The stream proxy: one logical stream across one or more attempts.
//!
//! A [StreamingCall] relays the lifecycle events of an upstream call
//! ([RequestStream], produced by a [StreamingStub]) to the consumer. For
//! server-streaming calls with the retry engine enabled, the proxy
//! transparently tears down and restarts the upstream call on retryable
//! failures: data already delivered stays delivered, and the next attempt's
//! request is rebuilt by the policy's resumption function.
//!
//! Mode selection for server streaming:
//!
//! - REST transports use a transport-native parser and are never retried
//!   here; the upstream events pipe through unchanged.
//! - With [streaming_retries][StreamingDescriptor::streaming_retries] set,
//!   the retry state machine runs.
//! - Otherwise a legacy wrapper retries only calls that failed before
//!   producing any response, bounded by the policy's `max_retries`
//!   (default 2).
//!
//! Client- and bidi-streaming calls run one attempt; consumer writes are
//! forwarded to the upstream writer.

mod events;
mod passthrough;
mod retry_engine;

pub use events::{CallStatus, RequestStream, ResponseEnvelope, StreamEvent, StreamingStub};

use crate::Result;
use crate::error::Error;
use crate::retry_policy::RetryPolicy;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The call shape of a streaming method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

/// Describes one streaming method at stub initialization.
#[derive(Clone, Copy, Debug)]
pub struct StreamingDescriptor {
    pub kind: StreamKind,
    /// The method is served over a REST transport; never retried here.
    pub rest_transport: bool,
    /// Selects the retry state machine over the legacy wrapper.
    pub streaming_retries: bool,
}

impl StreamingDescriptor {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            rest_transport: false,
            streaming_retries: false,
        }
    }

    pub fn with_rest_transport(mut self, v: bool) -> Self {
        self.rest_transport = v;
        self
    }

    pub fn with_streaming_retries(mut self, v: bool) -> Self {
        self.streaming_retries = v;
        self
    }
}

/// The consumer half of a streaming call.
///
/// Events arrive through [recv][StreamingCall::recv] in the order
/// `Metadata?`, `Response`, `Data*`, `Status`, then exactly one terminal
/// `End` or `Error`. Dropping the call cancels it.
pub struct StreamingCall<M> {
    events: mpsc::UnboundedReceiver<StreamEvent<M>>,
    writer: Option<mpsc::UnboundedSender<M>>,
    cancel: CancellationToken,
}

impl<M> StreamingCall<M>
where
    M: Send + 'static,
{
    /// Starts a streaming call.
    ///
    /// Fails fast, before any upstream call, when the policy carries a
    /// resumption function but the retry engine is not enabled: the legacy
    /// paths would silently ignore it.
    pub fn start<R, S>(
        descriptor: StreamingDescriptor,
        mut stub: S,
        request: R,
        retry: Option<RetryPolicy<R>>,
    ) -> Result<Self>
    where
        R: Clone + Send + 'static,
        S: StreamingStub<R, M> + 'static,
    {
        let new_engine = descriptor.streaming_retries
            && descriptor.kind == StreamKind::ServerStreaming
            && !descriptor.rest_transport;
        if !new_engine && retry.as_ref().is_some_and(|r| r.has_resume_request()) {
            return Err(Error::unknown(
                "a resumption function requires the streaming retry engine to be enabled",
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut call = Self {
            events: rx,
            writer: None,
            cancel: cancel.clone(),
        };
        match descriptor.kind {
            StreamKind::ClientStreaming | StreamKind::BidiStreaming => {
                let mut stream = stub.call(request, None);
                call.writer = stream.take_writer();
                tokio::spawn(passthrough::run_single_attempt(stream, tx, cancel));
            }
            StreamKind::ServerStreaming if descriptor.rest_transport => {
                let stream = stub.call(request, None);
                tokio::spawn(passthrough::run_single_attempt(stream, tx, cancel));
            }
            StreamKind::ServerStreaming if descriptor.streaming_retries => match retry {
                Some(policy) => {
                    tokio::spawn(retry_engine::run(stub, request, policy, tx, cancel));
                }
                None => {
                    let stream = stub.call(request, None);
                    tokio::spawn(passthrough::run_single_attempt(stream, tx, cancel));
                }
            },
            StreamKind::ServerStreaming => {
                let max_retries = retry
                    .as_ref()
                    .and_then(|r| r.backoff().max_retries())
                    .unwrap_or(passthrough::DEFAULT_NO_RESPONSE_RETRIES);
                tokio::spawn(passthrough::run_no_response_retry(
                    stub,
                    request,
                    max_retries,
                    tx,
                    cancel,
                ));
            }
        }
        Ok(call)
    }

    /// Receives the next event, or `None` after the terminal event.
    pub async fn recv(&mut self) -> Option<StreamEvent<M>> {
        self.events.recv().await
    }

    /// Requests cancellation.
    ///
    /// The live upstream attempt is cancelled and any pending retry is
    /// disarmed. Calling this after the terminal event is a no-op.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Writes a request message into the upstream call.
    ///
    /// Only client- and bidi-streaming calls accept writes.
    pub fn send(&self, message: M) -> Result<()> {
        let writer = self.writer.as_ref().ok_or_else(|| {
            Error::unknown("this streaming call does not accept request messages")
        })?;
        writer
            .send(message)
            .map_err(|_| Error::cancelled("the upstream call is closed"))
    }
}

impl<M> Drop for StreamingCall<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<M> std::fmt::Debug for StreamingCall<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCall")
            .field("writer", &self.writer.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffSettings;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn empty_stub(_request: i32, _timeout: Option<Duration>) -> RequestStream<i32> {
        let (tx, rx) = unbounded_channel();
        let _ = tx.send(StreamEvent::Status(CallStatus::new(0)));
        let _ = tx.send(StreamEvent::End);
        RequestStream::new(rx)
    }

    #[tokio::test]
    async fn resumption_requires_the_new_engine() {
        let policy = RetryPolicy::new([14], BackoffSettings::default())
            .with_resume_request(|request: &i32| *request);
        let descriptor = StreamingDescriptor::new(StreamKind::ServerStreaming);
        let got = StreamingCall::<i32>::start(descriptor, empty_stub, 0, Some(policy))
            .expect_err("legacy mode rejects a resumption function");
        assert!(
            got.message().contains("resumption function"),
            "{got:?}"
        );
    }

    #[tokio::test]
    async fn resumption_is_accepted_with_the_new_engine() -> anyhow::Result<()> {
        let policy = RetryPolicy::new(
            [14],
            BackoffSettings::builder().with_max_retries(1).build()?,
        )
        .with_resume_request(|request: &i32| *request);
        let descriptor =
            StreamingDescriptor::new(StreamKind::ServerStreaming).with_streaming_retries(true);
        let mut call = StreamingCall::<i32>::start(descriptor, empty_stub, 0, Some(policy))?;
        let mut terminal = None;
        while let Some(event) = call.recv().await {
            terminal = Some(event);
        }
        assert_eq!(terminal, Some(StreamEvent::End));
        Ok(())
    }

    #[tokio::test]
    async fn send_without_writer_fails() -> anyhow::Result<()> {
        let descriptor = StreamingDescriptor::new(StreamKind::ServerStreaming);
        let call = StreamingCall::<i32>::start(descriptor, empty_stub, 0, None)?;
        let got = call.send(42).expect_err("server streaming takes no writes");
        assert!(got.message().contains("does not accept"), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    async fn bidi_writes_reach_the_upstream() -> anyhow::Result<()> {
        let (writer_tx, mut writer_rx) = unbounded_channel();
        let stub = move |_request: i32, _timeout: Option<Duration>| {
            let (tx, rx) = unbounded_channel();
            let _ = tx.send(StreamEvent::Status(CallStatus::new(0)));
            let _ = tx.send(StreamEvent::End);
            RequestStream::new(rx).with_writer(writer_tx.clone())
        };
        let descriptor = StreamingDescriptor::new(StreamKind::BidiStreaming);
        let call = StreamingCall::<i32>::start(descriptor, stub, 0, None)?;
        call.send(42)?;
        assert_eq!(writer_rx.recv().await, Some(42));
        Ok(())
    }
}
