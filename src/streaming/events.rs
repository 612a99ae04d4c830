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

use crate::error::{Error, Metadata};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The response envelope delivered once per successful attempt.
///
/// The envelope is synthesized by the proxy from the first `metadata` event
/// (or from the terminal `status` when the upstream sent no metadata).
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseEnvelope {
    pub code: i32,
    pub message: String,
    pub details: String,
    pub metadata: Option<Metadata>,
}

impl ResponseEnvelope {
    pub(crate) fn ok(metadata: Option<Metadata>) -> Self {
        Self {
            code: 200,
            message: "OK".to_string(),
            details: String::new(),
            metadata,
        }
    }
}

/// The terminal protocol status of one attempt.
///
/// A conformant upstream always emits a status, after all data and before
/// the stream ends.
#[derive(Clone, Debug, PartialEq)]
pub struct CallStatus {
    pub code: i32,
    pub message: String,
    pub metadata: Option<Metadata>,
}

impl CallStatus {
    pub fn new(code: i32) -> Self {
        Self {
            code,
            message: String::new(),
            metadata: None,
        }
    }

    pub fn with_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    pub fn with_metadata(mut self, v: Metadata) -> Self {
        self.metadata = Some(v);
        self
    }
}

/// One lifecycle event of a streaming call.
///
/// Both the upstream ([RequestStream]) and the consumer
/// ([StreamingCall][super::StreamingCall]) speak this vocabulary. The
/// consumer observes events in the order `Metadata?`, `Response`, `Data*`,
/// `Status`, then exactly one of `End` or `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent<M> {
    /// The initial call metadata. At most one per attempt, first.
    Metadata(Metadata),
    /// The response envelope. Exactly one per successful attempt.
    Response(ResponseEnvelope),
    /// One response message.
    Data(M),
    /// The terminal protocol status.
    Status(CallStatus),
    /// Normal completion. Terminal.
    End,
    /// Failure. Terminal.
    Error(Error),
}

/// The upstream stream produced by a stub for one attempt.
///
/// The stub sends events into the channel half it keeps; the proxy owns
/// this receiving half exclusively and is the only caller of
/// [cancel][RequestStream::cancel]. A stub that honors cancellation keeps a
/// clone of the token passed to
/// [with_cancellation][RequestStream::with_cancellation] and reacts to it
/// by terminating the stream, typically with an `Error` event.
pub struct RequestStream<M> {
    events: mpsc::UnboundedReceiver<StreamEvent<M>>,
    writer: Option<mpsc::UnboundedSender<M>>,
    cancel: CancellationToken,
}

impl<M> RequestStream<M> {
    /// Creates a stream over the receiving half of an event channel.
    pub fn new(events: mpsc::UnboundedReceiver<StreamEvent<M>>) -> Self {
        Self {
            events,
            writer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches the writer half for client- and bidi-streaming calls.
    pub fn with_writer(mut self, writer: mpsc::UnboundedSender<M>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Uses `token` as this stream's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Requests termination; no further `Data` will be delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn next_event(&mut self) -> Option<StreamEvent<M>> {
        self.events.recv().await
    }

    pub(crate) fn take_writer(&mut self) -> Option<mpsc::UnboundedSender<M>> {
        self.writer.take()
    }
}

impl<M> std::fmt::Debug for RequestStream<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStream")
            .field("writer", &self.writer.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// The transport seam: turns a request into one upstream attempt.
///
/// `timeout` is the per-attempt RPC timeout computed by the retry engine;
/// transports that enforce deadlines apply it to the attempt.
///
/// Closures with the same shape implement the trait, so stubs (and tests)
/// rarely name it.
pub trait StreamingStub<R: 'static, M: 'static>: Send {
    fn call(&mut self, request: R, timeout: Option<Duration>) -> RequestStream<M>;
}

impl<F, R, M> StreamingStub<R, M> for F
where
    F: FnMut(R, Option<Duration>) -> RequestStream<M> + Send,
    R: 'static,
    M: 'static,
{
    fn call(&mut self, request: R, timeout: Option<Duration>) -> RequestStream<M> {
        self(request, timeout)
    }
}

/// Applies the event forwarding rules shared by every proxy mode.
///
/// `metadata`, `response`, and `status` relay by identity; a response
/// envelope is synthesized from the first `metadata` (or from `status` if
/// none arrived); `end` is held until `status` has also arrived so the
/// terminal event cannot race past the status.
pub(crate) struct Forwarder<M> {
    tx: mpsc::UnboundedSender<StreamEvent<M>>,
    response_emitted: bool,
    status_seen: bool,
    end_seen: bool,
}

/// What the proxy should do after forwarding one upstream event.
pub(crate) enum Step {
    Continue,
    /// The consumer stream terminated with `End`.
    Complete,
    /// The upstream failed; the proxy decides what happens next.
    Upstream(Error),
}

impl<M> Forwarder<M> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<StreamEvent<M>>) -> Self {
        Self {
            tx,
            response_emitted: false,
            status_seen: false,
            end_seen: false,
        }
    }

    pub(crate) fn on_event(&mut self, event: StreamEvent<M>) -> Step {
        match event {
            StreamEvent::Metadata(metadata) => {
                let _ = self.tx.send(StreamEvent::Metadata(metadata.clone()));
                if !self.response_emitted {
                    self.response_emitted = true;
                    let _ = self
                        .tx
                        .send(StreamEvent::Response(ResponseEnvelope::ok(Some(metadata))));
                }
                Step::Continue
            }
            StreamEvent::Response(response) => {
                self.response_emitted = true;
                let _ = self.tx.send(StreamEvent::Response(response));
                Step::Continue
            }
            StreamEvent::Data(message) => {
                let _ = self.tx.send(StreamEvent::Data(message));
                Step::Continue
            }
            StreamEvent::Status(status) => {
                if !self.response_emitted {
                    self.response_emitted = true;
                    let _ = self
                        .tx
                        .send(StreamEvent::Response(ResponseEnvelope::ok(None)));
                }
                let _ = self.tx.send(StreamEvent::Status(status));
                self.status_seen = true;
                if self.end_seen {
                    return self.complete();
                }
                Step::Continue
            }
            StreamEvent::End => {
                self.end_seen = true;
                if self.status_seen {
                    return self.complete();
                }
                Step::Continue
            }
            StreamEvent::Error(e) => Step::Upstream(e),
        }
    }

    /// Emits the terminal `Error` event.
    pub(crate) fn fail(&self, error: Error) {
        let _ = self.tx.send(StreamEvent::Error(error));
    }

    fn complete(&self) -> Step {
        let _ = self.tx.send(StreamEvent::End);
        Step::Complete
    }
}

/// The error synthesized when the upstream channel closes without a
/// terminal event.
pub(crate) fn closed_error(cancel_requested: bool) -> Error {
    if cancel_requested {
        Error::cancelled("the streaming call was cancelled")
    } else {
        Error::unknown("the upstream stream closed without a final status")
    }
}
