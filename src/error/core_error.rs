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

use super::rpc::{Code, wire};
use prost::Message;
use std::collections::HashMap;

/// Call metadata, an opaque map from key to value.
///
/// Keys ending in `-bin` carry binary values. All other values are plain
/// ASCII, stored as bytes for uniformity.
pub type Metadata = HashMap<String, bytes::Bytes>;

/// The metadata key carrying the binary status payload.
pub const STATUS_DETAILS_KEY: &str = "grpc-status-details-bin";

/// The core error returned by the call runtime.
///
/// Errors carry the status code and message reported at the point of
/// failure, the call metadata (if any), and the structured fields decoded
/// from the binary status payload. The retry engine may attach a [note]
/// describing why a failure was treated as terminal.
///
/// [note]: Error::note
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    code: Code,
    message: String,
    details: String,
    metadata: Metadata,
    reason: Option<String>,
    domain: Option<String>,
    error_info_metadata: HashMap<String, String>,
    note: Option<String>,
    decoded: bool,
}

impl Error {
    /// Creates a new [Error] with the given code and message.
    pub fn new<T: Into<String>>(code: Code, message: T) -> Self {
        Self {
            code,
            message: message.into(),
            details: String::new(),
            metadata: Metadata::new(),
            reason: None,
            domain: None,
            error_info_metadata: HashMap::new(),
            note: None,
            decoded: false,
        }
    }

    /// A helper to create a new [Code::Cancelled] error.
    pub fn cancelled<T: Into<String>>(message: T) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// A helper to create a new [Code::Unknown] error.
    pub fn unknown<T: Into<String>>(message: T) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// A helper to create a new [Code::InvalidArgument] error.
    pub fn invalid_argument<T: Into<String>>(message: T) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// A helper to create a new [Code::DeadlineExceeded] error.
    pub fn deadline_exceeded<T: Into<String>>(message: T) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// A helper to create a new [Code::Unavailable] error.
    pub fn unavailable<T: Into<String>>(message: T) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Sets the free-form detail text.
    pub fn with_details<T: Into<String>>(mut self, v: T) -> Self {
        self.details = v.into();
        self
    }

    /// Sets the call metadata.
    pub fn with_metadata(mut self, v: Metadata) -> Self {
        self.metadata = v;
        self
    }

    /// Returns the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the developer-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the free-form detail text.
    pub fn details(&self) -> &str {
        &self.details
    }

    /// Returns the call metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The reason decoded from an embedded `ErrorInfo`, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The domain decoded from an embedded `ErrorInfo`, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// The metadata decoded from an embedded `ErrorInfo`.
    pub fn error_info_metadata(&self) -> &HashMap<String, String> {
        &self.error_info_metadata
    }

    /// The note attached by the retry engine, if any.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Attaches a note describing how the error was handled.
    pub fn set_note<T: Into<String>>(&mut self, v: T) {
        self.note = Some(v.into());
    }

    /// Decodes the binary status payload in the call metadata.
    ///
    /// Populates [reason][Error::reason], [domain][Error::domain], and
    /// [error_info_metadata][Error::error_info_metadata] from an `ErrorInfo`
    /// embedded in the `grpc-status-details-bin` metadata value. Absent
    /// metadata, unknown detail types, and malformed payloads leave the
    /// fields unset. Decoding is idempotent: a second call is a no-op.
    pub fn decode_status_details(&mut self) {
        if self.decoded {
            return;
        }
        self.decoded = true;
        let Some(blob) = self.metadata.get(STATUS_DETAILS_KEY) else {
            return;
        };
        let Some(status) = decode_status(blob) else {
            return;
        };
        for any in status.details {
            if !any.type_url.ends_with("ErrorInfo") {
                continue;
            }
            let Ok(info) = wire::ErrorInfo::decode(any.value.as_slice()) else {
                continue;
            };
            self.reason = Some(info.reason);
            self.domain = Some(info.domain);
            self.error_info_metadata = info.metadata;
        }
    }
}

/// Decodes a status payload, raw first, then base64.
///
/// Over HTTP/2 the value of a `-bin` metadata key is base64, while stubs
/// that already unwrapped the transport hand over raw bytes.
fn decode_status(blob: &bytes::Bytes) -> Option<wire::Status> {
    use base64::Engine;
    use base64::prelude::{BASE64_STANDARD, BASE64_STANDARD_NO_PAD};
    if let Ok(status) = wire::Status::decode(blob.as_ref()) {
        return Some(status);
    }
    let decoded = BASE64_STANDARD
        .decode(blob.as_ref())
        .or_else(|_| BASE64_STANDARD_NO_PAD.decode(blob.as_ref()))
        .ok()?;
    wire::Status::decode(decoded.as_slice()).ok()
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for Error {}
