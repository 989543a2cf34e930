//! Timestamps, raw buffers and encoded frames shared by the segmenter and
//! the live pipeline.

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

use bytes::Bytes;

/// A rational point in time or span of time.
///
/// Seconds are the canonical value; the timescale is kept only so that a
/// timestamp can be re-rendered in its source track's units without
/// rounding twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaTimestamp {
    pub seconds: f64,
    pub timescale: Option<i32>,
}

impl MediaTimestamp {
    pub const ZERO: Self = Self {
        seconds: 0.0,
        timescale: None,
    };

    #[must_use]
    pub const fn from_seconds(seconds: f64) -> Self {
        Self {
            seconds,
            timescale: None,
        }
    }

    /// A timestamp of `value` ticks in a `timescale` ticks-per-second clock.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_scaled(value: u64, timescale: i32) -> Self {
        Self {
            seconds: value as f64 / f64::from(timescale),
            timescale: Some(timescale),
        }
    }

    /// This timestamp rendered in ticks of its own timescale, if it has one.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn scaled_value(&self) -> Option<u64> {
        let timescale = self.timescale?;
        Some((self.seconds * f64::from(timescale)).round() as u64)
    }

    #[must_use]
    pub fn advanced_by(&self, duration: Self) -> Self {
        Self {
            seconds: self.seconds + duration.seconds,
            timescale: self.timescale.or(duration.timescale),
        }
    }
}

/// The codec of an [`EncodedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedCodec {
    Aac,
    Ac3,
    Eac3,
    Alac,
    Flac,
    Opus,
    H264,
    H265,
    Av1,
}

impl EncodedCodec {
    #[must_use]
    pub const fn is_video(self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Av1)
    }

    #[must_use]
    pub const fn is_audio(self) -> bool {
        !self.is_video()
    }
}

/// High dynamic range mastering metadata attached to a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdrMetadata {
    Hdr10,
    Hlg,
    DolbyVision {
        /// The Dolby Vision profile number, e.g. 5 or 8.
        profile: u8,
    },
}

/// The channel layout of an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Surround5_1,
    Surround7_1,
    /// Spatial audio carrying Dolby Atmos metadata.
    Atmos,
}

impl ChannelLayout {
    #[must_use]
    pub const fn channel_count(self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround5_1 => 6,
            Self::Surround7_1 => 8,
            Self::Atmos => 16,
        }
    }
}

/// One encoded access unit, as produced by an encoder or demuxed from a
/// container.
///
/// `is_keyframe` is authoritative: the segmenter and the live pipeline
/// never inspect the payload to make boundary decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub data: Bytes,

    /// Presentation timestamp.
    pub pts: MediaTimestamp,

    /// Presentation duration.
    pub duration: MediaTimestamp,

    pub is_keyframe: bool,

    pub codec: EncodedCodec,

    /// The encoder's bitrate target in bits per second, if it knows one.
    pub bitrate_hint: Option<u32>,

    pub hdr_metadata: Option<HdrMetadata>,

    pub channel_layout: Option<ChannelLayout>,
}

impl EncodedFrame {
    /// A bare frame with no optional metadata.
    #[must_use]
    pub fn new(
        data: Bytes,
        pts: MediaTimestamp,
        duration: MediaTimestamp,
        is_keyframe: bool,
        codec: EncodedCodec,
    ) -> Self {
        Self {
            data,
            pts,
            duration,
            is_keyframe,
            codec,
            bitrate_hint: None,
            hdr_metadata: None,
            channel_layout: None,
        }
    }
}

/// A buffer of raw, un-encoded media handed to a [`crate::live::LiveEncoder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawMediaBuffer {
    /// Interleaved signed 16-bit PCM.
    PcmS16 {
        samples: Vec<i16>,
        channels: u16,
        sample_rate: u32,
    },

    /// A raw picture in the encoder's configured pixel format.
    VideoFrame {
        data: Bytes,
        pts: MediaTimestamp,
        force_keyframe: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_round_trip() {
        let ts = MediaTimestamp::from_scaled(90_000 * 3, 90_000);
        assert!((ts.seconds - 3.0).abs() < f64::EPSILON);
        assert_eq!(ts.scaled_value(), Some(270_000));
    }

    #[test]
    fn advanced_by_accumulates() {
        let ts = MediaTimestamp::from_seconds(1.5)
            .advanced_by(MediaTimestamp::from_seconds(0.5));
        assert!((ts.seconds - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn codec_classification() {
        assert!(EncodedCodec::H265.is_video());
        assert!(EncodedCodec::Aac.is_audio());
        assert!(!EncodedCodec::Opus.is_video());
    }
}
