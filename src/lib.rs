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

//! Streaming retry and pagination engine for RPC client libraries.
//!
//! This crate contains the call-runtime core shared by generated client
//! stubs: a server-streaming retry/resumption engine that presents one
//! logical stream to the consumer while transparently restarting the
//! upstream call on transient failures, and a pagination engine that turns
//! page-token RPCs into eager lists, lazy item sequences, or event streams.
//!
//! The crate does not implement a transport. Stubs provide the transport as
//! a [StreamingStub][streaming::StreamingStub] for streaming calls, or as a
//! plain async function for paged unary calls.

/// An alias of [std::result::Result] where the error is always [Error][crate::error::Error].
///
/// This is the result type used by all functions wrapping RPCs.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types used by generated clients.
pub mod error;

pub mod paginator;

pub mod streaming;

pub mod backoff;
pub mod call_settings;
pub mod retry_policy;
pub mod retry_request_options;
pub mod warnings;

mod field_path;

#[cfg(test)]
pub(crate) mod mock_rng;
