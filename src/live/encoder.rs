//! The live encoder abstraction and the AAC frame clock.

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
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::{Error, Result},
    media::{EncodedCodec, EncodedFrame, MediaTimestamp, RawMediaBuffer},
};

/// Samples per channel in one AAC access unit.
const AAC_FRAME_LENGTH: usize = 1024;

/// The encoder lifecycle. Operations outside the expected phase fail
/// with [`Error::NotConfigured`] or [`Error::TornDown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPhase {
    Fresh,
    Configured,
    Tearing,
    TornDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub codec: EncodedCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: Option<u32>,
}

/// A live encoder: configure, feed raw buffers, receive encoded frames.
///
/// Implementations serialize all operations per instance; callers may
/// invoke from any task without further coordination. `teardown` is the
/// cancellation signal and is infallible.
#[allow(async_fn_in_trait)]
pub trait LiveEncoder {
    async fn configure(&self, config: EncoderConfig) -> Result<()>;

    async fn encode(&self, buffer: RawMediaBuffer) -> Result<Vec<EncodedFrame>>;

    async fn flush(&self) -> Result<Vec<EncodedFrame>>;

    async fn teardown(&self);

    async fn phase(&self) -> EncoderPhase;
}

/// The bit-stream compression seam of [`AacEncoder`].
///
/// Frame timing, accumulation and the state machine live in the
/// encoder; producing the compressed access unit for one block of PCM is
/// delegated here, so a hardware or subprocess codec can be plugged in
/// without touching the clock.
pub trait AacCodec: Send {
    /// Compresses exactly one frame worth of interleaved PCM
    /// (1024 samples per channel).
    fn encode_block(&mut self, pcm: &[i16], channels: u16) -> Result<Bytes>;
}

/// A codec that passes the PCM block through unmodified. Useful for
/// tests and for timing-only pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAacCodec;

impl AacCodec for PassthroughAacCodec {
    fn encode_block(&mut self, pcm: &[i16], _channels: u16) -> Result<Bytes> {
        let mut data = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            data.extend_from_slice(&sample.to_be_bytes());
        }
        Ok(Bytes::from(data))
    }
}

struct AacEncoderState<C> {
    phase: EncoderPhase,
    config: Option<EncoderConfig>,
    codec: C,

    /// Interleaved PCM waiting for a full frame.
    pending: Vec<i16>,

    frames_encoded: u64,
}

/// An audio encoder that owns the AAC frame clock: PCM accumulates until
/// 1024 samples per channel are available, and each emitted frame is
/// stamped `frames_encoded * 1024 / sample_rate`.
pub struct AacEncoder<C: AacCodec = PassthroughAacCodec> {
    state: Mutex<AacEncoderState<C>>,
}

impl Default for AacEncoder<PassthroughAacCodec> {
    fn default() -> Self {
        Self::new(PassthroughAacCodec)
    }
}

impl<C: AacCodec> AacEncoder<C> {
    #[must_use]
    pub fn new(codec: C) -> Self {
        Self {
            state: Mutex::new(AacEncoderState {
                phase: EncoderPhase::Fresh,
                config: None,
                codec,
                pending: Vec::new(),
                frames_encoded: 0,
            }),
        }
    }
}

impl<C: AacCodec> AacEncoderState<C> {
    fn config(&self) -> Result<&EncoderConfig> {
        match self.phase {
            EncoderPhase::Fresh => Err(Error::NotConfigured),
            EncoderPhase::Tearing | EncoderPhase::TornDown => Err(Error::TornDown),
            EncoderPhase::Configured => {
                self.config.as_ref().ok_or(Error::NotConfigured)
            }
        }
    }

    /// Drains every complete frame from the accumulator.
    fn drain_frames(&mut self) -> Result<Vec<EncodedFrame>> {
        let config = self.config()?.clone();
        let frame_samples = AAC_FRAME_LENGTH * usize::from(config.channels);

        let mut frames = Vec::new();
        while self.pending.len() >= frame_samples {
            let block: Vec<i16> = self.pending.drain(..frame_samples).collect();
            frames.push(self.emit_block(&block, &config)?);
        }
        Ok(frames)
    }

    fn emit_block(&mut self, block: &[i16], config: &EncoderConfig) -> Result<EncodedFrame> {
        let data = self.codec.encode_block(block, config.channels)?;

        #[allow(clippy::cast_precision_loss)]
        let pts = (self.frames_encoded * AAC_FRAME_LENGTH as u64) as f64
            / f64::from(config.sample_rate);
        let duration = AAC_FRAME_LENGTH as f64 / f64::from(config.sample_rate);
        self.frames_encoded += 1;

        let mut frame = EncodedFrame::new(
            data,
            MediaTimestamp::from_seconds(pts),
            MediaTimestamp::from_seconds(duration),
            true,
            EncodedCodec::Aac,
        );
        frame.bitrate_hint = config.bitrate;
        Ok(frame)
    }
}

impl<C: AacCodec> LiveEncoder for AacEncoder<C> {
    async fn configure(&self, config: EncoderConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.phase {
            EncoderPhase::Tearing | EncoderPhase::TornDown => return Err(Error::TornDown),
            EncoderPhase::Fresh | EncoderPhase::Configured => (),
        }

        if config.codec != EncodedCodec::Aac {
            return Err(Error::UnsupportedConfiguration(format!(
                "AacEncoder cannot produce {:?}",
                config.codec
            )));
        }
        if config.sample_rate == 0 || config.channels == 0 {
            return Err(Error::UnsupportedConfiguration(
                "sample rate and channel count must be positive".to_owned(),
            ));
        }

        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "configured audio encoder"
        );
        state.config = Some(config);
        state.phase = EncoderPhase::Configured;
        state.pending.clear();
        state.frames_encoded = 0;
        Ok(())
    }

    async fn encode(&self, buffer: RawMediaBuffer) -> Result<Vec<EncodedFrame>> {
        let mut state = self.state.lock().await;
        let config = state.config()?.clone();

        let RawMediaBuffer::PcmS16 {
            samples,
            channels,
            sample_rate,
        } = buffer
        else {
            return Err(Error::FormatMismatch(
                "audio encoders accept PCM buffers only".to_owned(),
            ));
        };
        if channels != config.channels || sample_rate != config.sample_rate {
            return Err(Error::FormatMismatch(format!(
                "buffer is {channels}ch@{sample_rate}, encoder is {}ch@{}",
                config.channels, config.sample_rate
            )));
        }

        state.pending.extend_from_slice(&samples);
        state.drain_frames()
    }

    async fn flush(&self) -> Result<Vec<EncodedFrame>> {
        let mut state = self.state.lock().await;
        let config = state.config()?.clone();

        let mut frames = state.drain_frames()?;

        if !state.pending.is_empty() {
            let frame_samples = AAC_FRAME_LENGTH * usize::from(config.channels);
            let mut block = std::mem::take(&mut state.pending);
            block.resize(frame_samples, 0);
            frames.push(state.emit_block(&block, &config)?);
        }

        Ok(frames)
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        state.phase = EncoderPhase::Tearing;
        state.pending.clear();
        state.config = None;
        state.phase = EncoderPhase::TornDown;
    }

    async fn phase(&self) -> EncoderPhase {
        self.state.lock().await.phase
    }
}

/// One rung of a multi-bitrate ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderPreset {
    /// Identity of the rung, e.g. `"audio-96k"`.
    pub name: String,

    pub config: EncoderConfig,
}

/// Feeds one buffer to every encoder concurrently.
///
/// Results come back keyed by preset name in ladder order, regardless of
/// which encoder finished first. The first failure cancels the remaining
/// encodes and is returned.
pub async fn encode_all<E: LiveEncoder>(
    ladder: &[(EncoderPreset, E)],
    buffer: &RawMediaBuffer,
) -> Result<Vec<(String, Vec<EncodedFrame>)>> {
    let encodes = ladder
        .iter()
        .map(|(preset, encoder)| async move {
            let frames = encoder.encode(buffer.clone()).await?;
            Ok::<_, Error>((preset.name.clone(), frames))
        });

    futures::future::try_join_all(encodes).await
}
