//! The error type shared by every fallible operation in this crate.

// Copyright 2024 Logan Wemyss
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

/// A problem found by the playlist validator.
///
/// Warnings describe output that some clients will tolerate; errors
/// describe output that violates the HLS specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,

    /// A human-readable location, such as a tag name or a segment URI.
    pub location: String,

    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{severity}: {}: {}", self.location, self.message)
    }
}

/// Everything that can go wrong outside of plain io on a `serialize` call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `encode` or `flush` was called on an encoder that was never configured.
    #[error("the encoder has not been configured")]
    NotConfigured,

    /// The encoder or pipeline was torn down and cannot accept further work.
    #[error("the encoder has been torn down")]
    TornDown,

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// The input bytes are not the container format the operation expects.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// A required box was absent; the path is slash-separated from the root,
    /// e.g. `moov/trak/mdia/mdhd`.
    #[error("missing box: {0}")]
    MissingBox(String),

    /// A declared size would read past the end of the provided buffer.
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("the input contains no data")]
    EmptyInput,

    /// The input has no video track, and audio-only segmentation was not
    /// requested.
    #[error("the input contains no segmentable track")]
    NoSegmentableTrack,

    /// A line beginning with `#EXT` could not be parsed as a tag.
    /// Carries the 1-based line number and the offending line.
    #[error("invalid tag on line {line_number}: {line}")]
    InvalidTag { line_number: usize, line: String },

    /// A recognized attribute on a recognized tag had an unparseable value.
    #[error("invalid value {value:?} for attribute {attribute} on {tag}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        value: String,
    },

    /// The attribute list itself was malformed, such as an unterminated
    /// quoted string.
    #[error("malformed attribute list")]
    MalformedAttributes,

    /// The playlist could not be classified as either a media or a
    /// multivariant playlist.
    #[error("playlist is neither a media nor a multivariant playlist")]
    Ambiguous,

    #[error("validation failed with {} diagnostic(s)", .0.len())]
    ValidationFailed(Vec<Diagnostic>),
}

pub type Result<T> = std::result::Result<T, Error>;
