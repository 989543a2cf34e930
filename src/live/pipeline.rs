//! The sliding-window live pipeline.

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

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    drm::{KeyManager, LiveDrmPipelineConfig},
    error::{Error, Result},
    media::EncodedFrame,
    playlist::{MediaPlaylist, MediaSegment, PartInformation, PartialSegment},
    FloatOrInteger, PreloadHint, PreloadHintType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LivePipelineConfig {
    /// Segment target duration in seconds. Segments close at the first
    /// keyframe after reaching it.
    pub target_duration: f64,

    /// How many complete segments the playlist window retains.
    pub window_size: usize,

    /// Enables LL-HLS partial segments when set.
    pub part_target_duration: Option<f64>,

    /// Overrides the advertised PART-HOLD-BACK. Defaults to three part
    /// target durations.
    pub part_hold_back: Option<f64>,

    pub segment_name_prefix: String,

    pub segment_extension: String,

    pub drm: Option<LiveDrmPipelineConfig>,
}

impl Default for LivePipelineConfig {
    fn default() -> Self {
        Self {
            target_duration: 6.0,
            window_size: 6,
            part_target_duration: None,
            part_hold_back: None,
            segment_name_prefix: "segment_".to_owned(),
            segment_extension: "m4s".to_owned(),
            drm: None,
        }
    }
}

/// Something the caller must act on: a finished file to publish, or a
/// key rotation to record.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SegmentCompleted {
        media_sequence: u64,
        uri: String,
        data: Bytes,
        duration_seconds: f64,
    },
    PartCompleted {
        uri: String,
        data: Bytes,
        duration_seconds: f64,
        is_independent: bool,
    },
    KeyRotated {
        key_id: [u8; 16],
    },
}

struct CurrentSegment {
    data: BytesMut,
    duration: f64,
    start_media_time: f64,

    parts: Vec<PartialSegment>,
    part_data: BytesMut,
    part_duration: f64,
    part_starts_independent: bool,
    part_index: u64,

    pending_discontinuity: bool,
}

impl CurrentSegment {
    fn fresh(start_media_time: f64, pending_discontinuity: bool) -> Self {
        Self {
            data: BytesMut::new(),
            duration: 0.0,
            start_media_time,
            parts: Vec::new(),
            part_data: BytesMut::new(),
            part_duration: 0.0,
            part_starts_independent: false,
            part_index: 0,
            pending_discontinuity,
        }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty() && self.parts.is_empty()
    }
}

struct PipelineState {
    config: LivePipelineConfig,
    key_manager: Option<KeyManager>,

    window: VecDeque<MediaSegment>,

    /// Media sequence number of the first window entry. Sequence numbers
    /// start at 1, like fragment sequence numbers.
    first_media_sequence: u64,

    /// Media sequence number the in-progress segment will get.
    next_sequence: u64,

    discontinuity_sequence: u64,

    current: CurrentSegment,
    media_time: f64,
    ended: bool,
}

/// Feeds encoded frames into a sliding playlist window, closing segments
/// on keyframes, rotating keys, and accounting LL-HLS partials.
///
/// The pipeline is an actor: all operations serialize on an internal
/// lock, and [`LivePipeline::snapshot`] hands out a plain
/// [`MediaPlaylist`] value the pure writer can serialize at any time.
pub struct LivePipeline {
    state: Mutex<PipelineState>,
}

impl LivePipeline {
    #[must_use]
    pub fn new(config: LivePipelineConfig) -> Self {
        let key_manager = config.drm.as_ref().map(|drm| {
            KeyManager::new(drm.rotation, drm.key_uri_prefix.clone())
        });

        Self {
            state: Mutex::new(PipelineState {
                key_manager,
                window: VecDeque::new(),
                first_media_sequence: 1,
                next_sequence: 1,
                discontinuity_sequence: 0,
                current: CurrentSegment::fresh(0.0, false),
                media_time: 0.0,
                ended: false,
                config,
            }),
        }
    }

    /// Appends one encoded frame.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TornDown`] after [`LivePipeline::finish`].
    pub async fn push_frame(&self, frame: EncodedFrame) -> Result<Vec<PipelineEvent>> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(Error::TornDown);
        }

        let mut events = Vec::new();

        // A keyframe closes the running segment once the target has been
        // reached, so every segment begins on one.
        if frame.is_keyframe
            && !state.current.is_empty()
            && state.current.duration >= state.config.target_duration
        {
            state.close_current(&mut events);
        }

        if state.config.part_target_duration.is_some() && state.current.part_data.is_empty() {
            state.current.part_starts_independent = frame.is_keyframe;
        }

        state.current.data.extend_from_slice(&frame.data);
        state.current.duration += frame.duration.seconds;
        state.media_time += frame.duration.seconds;

        if let Some(part_target) = state.config.part_target_duration {
            state.current.part_data.extend_from_slice(&frame.data);
            state.current.part_duration += frame.duration.seconds;
            if state.current.part_duration >= part_target {
                state.close_part(&mut events);
            }
        }

        Ok(events)
    }

    /// Marks the boundary in front of the next segment as a timeline
    /// discontinuity. The running segment is closed early.
    pub async fn signal_discontinuity(&self) -> Result<Vec<PipelineEvent>> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(Error::TornDown);
        }

        let mut events = Vec::new();
        if !state.current.is_empty() {
            state.close_current(&mut events);
        }
        state.current.pending_discontinuity = true;
        Ok(events)
    }

    /// Publishes a segment-sized hole in the timeline, for upstream
    /// failures the playlist must admit to.
    pub async fn push_gap(&self, duration_seconds: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(Error::TornDown);
        }

        warn!(duration_seconds, "publishing gap segment");

        let mut events = Vec::new();
        if !state.current.is_empty() {
            state.close_current(&mut events);
        }

        let sequence = state.next_sequence;
        let uri = state.segment_uri(sequence);
        let encryption = state.current_key_tag();
        let discontinuity = std::mem::take(&mut state.current.pending_discontinuity);
        state.media_time += duration_seconds;

        state.append_segment(MediaSegment {
            uri,
            duration_seconds: FloatOrInteger::Float(duration_seconds),
            is_discontinuity: discontinuity,
            encryption,
            is_gap: true,
            ..MediaSegment::default()
        });
        state.current = CurrentSegment::fresh(state.media_time, false);
        Ok(())
    }

    /// Rotates the content key immediately, regardless of policy.
    pub async fn rotate_key_now(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(Error::TornDown);
        }
        let sequence = state.next_sequence;
        let media_time = state.media_time;
        match &mut state.key_manager {
            Some(manager) => {
                manager.rotate(sequence, media_time);
                Ok(())
            }
            None => Err(Error::UnsupportedConfiguration(
                "pipeline has no DRM configuration".to_owned(),
            )),
        }
    }

    /// Closes the running segment and ends the playlist. Later mutations
    /// fail.
    pub async fn finish(&self) -> Result<Vec<PipelineEvent>> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(Error::TornDown);
        }

        let mut events = Vec::new();
        if !state.current.is_empty() {
            state.close_current(&mut events);
        }
        state.ended = true;
        Ok(events)
    }

    /// A playlist snapshot of the window. The writer is a pure function
    /// of this value.
    pub async fn snapshot(&self) -> MediaPlaylist {
        let state = self.state.lock().await;

        let part_information =
            state
                .config
                .part_target_duration
                .map(|part_target_duration| PartInformation {
                    part_hold_back_seconds: state
                        .config
                        .part_hold_back
                        .unwrap_or(part_target_duration * 3.0),
                    part_target_duration,
                });

        let preload_hints = if part_information.is_some() && !state.ended {
            vec![PreloadHint {
                hint_type: PreloadHintType::Part,
                uri: state.part_uri(state.next_sequence, state.current.part_index),
                start_byte_offset: 0,
                length_in_bytes: None,
            }]
        } else {
            vec![]
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target_duration = state.config.target_duration.ceil() as u64;

        MediaPlaylist {
            target_duration,
            first_media_sequence_number: state.first_media_sequence,
            discontinuity_sequence_number: state.discontinuity_sequence,
            finished: state.ended,
            supports_blocking_playlist_reloads: part_information.is_some(),
            part_information,
            segments: state.window.iter().cloned().collect(),
            trailing_parts: state.current.parts.clone(),
            metadata: crate::playlist::MediaMetadata {
                preload_hints,
                ..crate::playlist::MediaMetadata::default()
            },
            ..MediaPlaylist::default()
        }
    }
}

impl PipelineState {
    fn segment_uri(&self, sequence: u64) -> String {
        format!(
            "{}{sequence}.{}",
            self.config.segment_name_prefix, self.config.segment_extension
        )
    }

    fn part_uri(&self, sequence: u64, part_index: u64) -> String {
        format!(
            "{}{sequence}.{part_index}.{}",
            self.config.segment_name_prefix, self.config.segment_extension
        )
    }

    fn current_key_tag(&self) -> Option<crate::EncryptionMethod> {
        self.key_manager.as_ref().and_then(KeyManager::key_tag)
    }

    fn close_part(&mut self, events: &mut Vec<PipelineEvent>) {
        let uri = self.part_uri(self.next_sequence, self.current.part_index);
        let data = self.current.part_data.split().freeze();
        let duration = self.current.part_duration;
        let is_independent = self.current.part_starts_independent;

        self.current.parts.push(PartialSegment {
            uri: uri.clone(),
            duration_in_seconds: duration,
            is_independent,
            byte_range: None,
            is_gap: false,
        });
        self.current.part_index += 1;
        self.current.part_duration = 0.0;
        self.current.part_starts_independent = false;

        events.push(PipelineEvent::PartCompleted {
            uri,
            data,
            duration_seconds: duration,
            is_independent,
        });
    }

    fn close_current(&mut self, events: &mut Vec<PipelineEvent>) {
        // A short leftover part still gets published with its segment.
        if self.config.part_target_duration.is_some() && !self.current.part_data.is_empty() {
            self.close_part(events);
        }

        let sequence = self.next_sequence;
        let start_media_time = self.current.start_media_time;

        if let Some(manager) = &mut self.key_manager {
            if manager.bind_segment(sequence, start_media_time) {
                if let Some(material) = manager.current() {
                    events.push(PipelineEvent::KeyRotated {
                        key_id: material.key_id,
                    });
                }
            }
        }

        let uri = self.segment_uri(sequence);
        let data = self.current.data.split().freeze();
        let duration = self.current.duration;
        let discontinuity = self.current.pending_discontinuity;
        let encryption = self.current_key_tag();

        debug!(sequence, duration, uri = %uri, "closed segment");

        self.append_segment(MediaSegment {
            uri: uri.clone(),
            duration_seconds: FloatOrInteger::Float(duration),
            is_discontinuity: discontinuity,
            encryption,
            ..MediaSegment::default()
        });

        events.push(PipelineEvent::SegmentCompleted {
            media_sequence: sequence,
            uri,
            data,
            duration_seconds: duration,
        });

        self.current = CurrentSegment::fresh(self.media_time, false);
    }

    /// Appends a completed segment and trims the window. The first
    /// retained segment's sequence number becomes the playlist's
    /// EXT-X-MEDIA-SEQUENCE; trimming a discontinuity advances the
    /// discontinuity sequence.
    fn append_segment(&mut self, segment: MediaSegment) {
        self.window.push_back(segment);
        self.next_sequence += 1;

        while self.window.len() > self.config.window_size {
            if let Some(trimmed) = self.window.pop_front() {
                if trimmed.is_discontinuity {
                    self.discontinuity_sequence += 1;
                }
            }
            self.first_media_sequence += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{EncodedCodec, MediaTimestamp};

    fn frame(duration: f64, keyframe: bool) -> EncodedFrame {
        EncodedFrame::new(
            Bytes::from_static(&[0xAB; 16]),
            MediaTimestamp::ZERO,
            MediaTimestamp::from_seconds(duration),
            keyframe,
            EncodedCodec::H264,
        )
    }

    /// Feeds `count` one-second segments, each two frames with a leading
    /// keyframe.
    async fn feed_segments(pipeline: &LivePipeline, count: usize) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        for _ in 0..count {
            events.extend(pipeline.push_frame(frame(0.5, true)).await.unwrap());
            events.extend(pipeline.push_frame(frame(0.5, false)).await.unwrap());
        }
        // The closing keyframe of the final fed segment.
        events.extend(pipeline.push_frame(frame(0.5, true)).await.unwrap());
        events
    }

    fn ll_hls_config() -> LivePipelineConfig {
        LivePipelineConfig {
            target_duration: 1.0,
            window_size: 6,
            part_target_duration: Some(1.0),
            part_hold_back: Some(3.012),
            ..LivePipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn window_trim_sets_media_sequence_to_first_retained() {
        let pipeline = LivePipeline::new(ll_hls_config());
        feed_segments(&pipeline, 102).await;

        let playlist = pipeline.snapshot().await;
        assert_eq!(playlist.segments.len(), 6);
        assert_eq!(playlist.first_media_sequence_number, 97);
        assert_eq!(playlist.segments[0].uri, "segment_97.m4s");
        assert_eq!(playlist.segments[5].uri, "segment_102.m4s");
    }

    #[tokio::test]
    async fn ll_hls_snapshot_matches_live_edge() {
        let pipeline = LivePipeline::new(ll_hls_config());
        feed_segments(&pipeline, 102).await;
        // Finish the in-progress segment's first part.
        pipeline.push_frame(frame(0.5, false)).await.unwrap();

        let playlist = pipeline.snapshot().await;
        assert_eq!(playlist.trailing_parts.len(), 1);
        assert!(playlist.trailing_parts[0].is_independent);
        assert_eq!(playlist.metadata.preload_hints.len(), 1);

        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("#EXT-X-MEDIA-SEQUENCE:97\n"));
        assert!(text.contains(
            "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK=3.012\n"
        ));
        assert!(text.contains("#EXT-X-PART:"));
        assert!(text.contains("#EXT-X-PRELOAD-HINT:TYPE=PART,"));
        assert!(!text.contains("#EXT-X-ENDLIST"));
    }

    #[tokio::test]
    async fn segments_close_on_keyframes_only() {
        let pipeline = LivePipeline::new(LivePipelineConfig {
            target_duration: 2.0,
            window_size: 10,
            ..LivePipelineConfig::default()
        });

        // 2.5 s of frames without a keyframe: nothing may close.
        pipeline.push_frame(frame(0.5, true)).await.unwrap();
        for _ in 0..4 {
            let events = pipeline.push_frame(frame(0.5, false)).await.unwrap();
            assert!(events.is_empty());
        }

        // The keyframe closes the 2.5 s segment.
        let events = pipeline.push_frame(frame(0.5, true)).await.unwrap();
        assert!(matches!(
            events.as_slice(),
            [PipelineEvent::SegmentCompleted { media_sequence: 1, duration_seconds, .. }]
                if (*duration_seconds - 2.5).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn key_rotation_binds_keys_to_first_segments() {
        let pipeline = LivePipeline::new(LivePipelineConfig {
            target_duration: 1.0,
            window_size: 100,
            drm: Some(LiveDrmPipelineConfig {
                rotation: crate::drm::KeyRotationPolicy::EveryNSegments(3),
                ..LiveDrmPipelineConfig::default()
            }),
            ..LivePipelineConfig::default()
        });

        let events = feed_segments(&pipeline, 10).await;
        let rotations = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::KeyRotated { .. }))
            .count();
        // Segment sequence numbers 1..=10; rotations at 1, 4, 7, 10.
        assert_eq!(rotations, 4);

        let playlist = pipeline.snapshot().await;
        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("#EXT-X-KEY:").count(), 4);

        // Each key tag must sit immediately before the first segment
        // encrypted under it.
        let lines: Vec<&str> = text.lines().collect();
        for expected in ["segment_1.m4s", "segment_4.m4s", "segment_7.m4s", "segment_10.m4s"] {
            let position = lines.iter().position(|line| *line == expected).unwrap();
            assert!(
                lines[position - 2].starts_with("#EXT-X-KEY:"),
                "no key tag before {expected}"
            );
        }
    }

    #[tokio::test]
    async fn trimming_a_discontinuity_advances_the_sequence() {
        let pipeline = LivePipeline::new(LivePipelineConfig {
            target_duration: 1.0,
            window_size: 2,
            ..LivePipelineConfig::default()
        });

        pipeline.push_frame(frame(1.0, true)).await.unwrap();
        pipeline.signal_discontinuity().await.unwrap();
        pipeline.push_frame(frame(1.0, true)).await.unwrap();
        pipeline.push_frame(frame(1.0, true)).await.unwrap();

        let playlist = pipeline.snapshot().await;
        assert_eq!(playlist.discontinuity_sequence_number, 0);
        assert!(playlist.segments[0].is_discontinuity);

        // Two more closes push the discontinuity segment out of the
        // window.
        pipeline.push_frame(frame(1.0, true)).await.unwrap();
        pipeline.push_frame(frame(1.0, true)).await.unwrap();

        let playlist = pipeline.snapshot().await;
        assert_eq!(playlist.discontinuity_sequence_number, 1);
        assert!(playlist.segments.iter().all(|s| !s.is_discontinuity));
    }

    #[tokio::test]
    async fn gap_segments_flow_into_the_playlist() {
        let pipeline = LivePipeline::new(LivePipelineConfig {
            target_duration: 1.0,
            window_size: 10,
            ..LivePipelineConfig::default()
        });

        pipeline.push_frame(frame(1.0, true)).await.unwrap();
        pipeline.push_gap(1.0).await.unwrap();
        pipeline.push_frame(frame(1.0, true)).await.unwrap();
        pipeline.push_frame(frame(1.0, true)).await.unwrap();

        let playlist = pipeline.snapshot().await;
        let gaps: Vec<bool> = playlist.segments.iter().map(|s| s.is_gap).collect();
        assert_eq!(gaps, vec![false, true, false]);

        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        assert!(String::from_utf8(output).unwrap().contains("#EXT-X-GAP\n"));
    }

    #[tokio::test]
    async fn finish_ends_the_playlist_and_blocks_mutation() {
        let pipeline = LivePipeline::new(LivePipelineConfig::default());
        pipeline.push_frame(frame(1.0, true)).await.unwrap();

        let events = pipeline.finish().await.unwrap();
        assert_eq!(events.len(), 1);

        let playlist = pipeline.snapshot().await;
        assert!(playlist.finished);

        assert_eq!(
            pipeline.push_frame(frame(1.0, true)).await.unwrap_err(),
            Error::TornDown
        );
    }
}
