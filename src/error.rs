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

mod core_error;
pub use core_error::*;

/// Error codes and the wire-status details attached to service errors.
///
/// Services report failures as a numeric status code, a developer-facing
/// message, and (optionally) a binary status payload carried in the call
/// metadata. The types in this module represent the codes and decode the
/// payload.
///
/// # Examples
///
/// ```
/// # use callstream::error;
/// use error::Error;
/// fn handle_error(mut e: Error) {
///     e.decode_status_details();
///     if let Some(reason) = e.reason() {
///         println!("the service reported reason {reason}")
///     }
/// }
/// ```
pub mod rpc;
