//! The segmenter: turns an MP4 input into HLS media segments, either
//! fragmented MP4 or MPEG-TS, as separate files or byte ranges of one file.

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

mod fmp4;
mod ts;

use bytes::Bytes;
use tracing::debug;

use crate::{
    error::{Error, Result},
    media::MediaTimestamp,
    mp4::{FileInfo, SampleInfo, Track},
    playlist::{ByteRangeOrBitrate, MediaInitializationSection, MediaPlaylist, MediaSegment},
    ByteRange, ByteRangeWithOffset, FloatOrInteger, PlaylistType,
};

/// The container format of the produced media segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    FragmentedMp4,
    MpegTs,
}

/// Whether segments become separate files or byte ranges of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    SeparateFiles,
    ByteRange,
}

/// Everything the segmenter needs to know about the desired output.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    /// The duration each segment aims for, in seconds. Segments may run
    /// longer to reach the next keyframe.
    pub target_duration: f64,

    pub container_format: ContainerFormat,

    pub output_mode: OutputMode,

    pub generate_playlist: bool,

    pub playlist_type: Option<PlaylistType>,

    /// Include the first audio track alongside the video track, and allow
    /// audio-only inputs.
    pub include_audio: bool,

    /// File name the playlist uses for the initialization segment.
    pub init_segment_name: String,

    /// File name of the single output file in byte-range mode.
    pub media_file_name: String,

    pub playlist_name: String,

    /// Forces an `EXT-X-VERSION`; `None` lets the writer choose.
    pub hls_version: Option<u8>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            target_duration: 6.0,
            container_format: ContainerFormat::FragmentedMp4,
            output_mode: OutputMode::SeparateFiles,
            generate_playlist: true,
            playlist_type: Some(PlaylistType::Vod),
            include_audio: true,
            init_segment_name: "init.mp4".to_owned(),
            media_file_name: "media.mp4".to_owned(),
            playlist_name: "playlist.m3u8".to_owned(),
            hls_version: None,
        }
    }
}

/// One produced media segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentData {
    pub data: Bytes,

    /// File name in separate-files mode.
    pub name: Option<String>,

    pub duration_seconds: f64,

    /// Position within the single output file in byte-range mode.
    pub byte_range_offset: Option<u64>,
    pub byte_range_length: Option<u64>,

    /// Presentation timestamp of the segment's first sample.
    pub start_pts: MediaTimestamp,

    /// Always true: segments begin on keyframes.
    pub is_keyframe_start: bool,
}

/// The product of a segmentation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    /// The initialization segment, for fragmented MP4 output.
    pub init_segment: Option<Bytes>,

    pub media_segments: Vec<SegmentData>,

    pub playlist: Option<String>,

    pub total_duration: f64,
}

/// A planned segment: which samples of each track it covers.
#[derive(Debug, Clone)]
pub(crate) struct PlannedSegment {
    pub(crate) primary: Vec<SampleInfo>,
    pub(crate) audio: Vec<SampleInfo>,

    pub(crate) duration_seconds: f64,

    /// Decode timestamp of the first primary sample, in primary track
    /// timescale ticks.
    pub(crate) start_dts: u64,
}

/// Splits an MP4 buffer into HLS media segments.
///
/// # Errors
///
/// Fails with [`Error::EmptyInput`] on empty input,
/// [`Error::NoSegmentableTrack`] when the input has no usable track, and
/// the box-level errors of [`FileInfo::parse`] on malformed input.
pub fn segment(data: &[u8], config: &SegmentationConfig) -> Result<SegmentationResult> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }

    let info = FileInfo::parse(data)?;

    let video = info.video_track();
    let audio = info.audio_track().filter(|_| config.include_audio);

    let (primary, secondary_audio) = match (video, audio) {
        (Some(video), audio) => (video, audio),
        (None, Some(audio)) => (audio, None),
        (None, None) => return Err(Error::NoSegmentableTrack),
    };

    let planned = plan_segments(primary, secondary_audio, config.target_duration)?;
    debug!(
        segments = planned.len(),
        container = ?config.container_format,
        "planned segment boundaries"
    );

    let mut result = match config.container_format {
        ContainerFormat::FragmentedMp4 => {
            fmp4::emit(data, &info, primary, secondary_audio, &planned)?
        }
        ContainerFormat::MpegTs => ts::emit(data, primary, secondary_audio, &planned)?,
    };

    finish_output(&mut result, config);

    if config.generate_playlist {
        let playlist = build_playlist(&result, config)?;
        result.playlist = Some(playlist);
    }

    Ok(result)
}

/// Chooses segment boundaries on keyframes.
///
/// A segment closes at the first keyframe at or after the point where its
/// accumulated duration reaches the target. Tracks without sync tables
/// treat every sample as independent.
pub(crate) fn plan_segments(
    primary: &Track,
    audio: Option<&Track>,
    target_duration: f64,
) -> Result<Vec<PlannedSegment>> {
    if primary.timescale == 0 {
        return Err(Error::MalformedContainer(
            "track timescale is zero".to_owned(),
        ));
    }

    let samples = primary.samples()?;
    if samples.is_empty() {
        return Err(Error::NoSegmentableTrack);
    }

    let timescale = f64::from(primary.timescale);

    let mut boundaries = vec![0usize];
    let mut accumulated = 0.0;
    for (index, sample) in samples.iter().enumerate() {
        if index > 0 && sample.is_sync && accumulated >= target_duration {
            boundaries.push(index);
            accumulated = 0.0;
        }
        accumulated += f64::from(sample.duration) / timescale;
    }
    boundaries.push(samples.len());

    let audio_samples = match audio {
        Some(track) => {
            if track.timescale == 0 {
                return Err(Error::MalformedContainer(
                    "track timescale is zero".to_owned(),
                ));
            }
            track.samples()?
        }
        None => Vec::new(),
    };
    let audio_timescale = audio.map_or(1.0, |track| f64::from(track.timescale));
    let mut audio_position = 0usize;

    let mut planned = Vec::new();
    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        if start == end {
            continue;
        }

        let segment_samples = samples[start..end].to_vec();
        let duration_ticks: u64 = segment_samples
            .iter()
            .map(|sample| u64::from(sample.duration))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = duration_ticks as f64 / timescale;

        let segment_end_dts = segment_samples
            .last()
            .map_or(0, |sample| sample.dts + u64::from(sample.duration));
        #[allow(clippy::cast_precision_loss)]
        let end_seconds = segment_end_dts as f64 / timescale;

        // Audio samples follow the video boundary by decode time.
        let audio_start = audio_position;
        while audio_position < audio_samples.len() {
            #[allow(clippy::cast_precision_loss)]
            let audio_seconds = audio_samples[audio_position].dts as f64 / audio_timescale;
            let is_last_segment = end == samples.len();
            if !is_last_segment && audio_seconds >= end_seconds {
                break;
            }
            audio_position += 1;
        }

        planned.push(PlannedSegment {
            start_dts: segment_samples[0].dts,
            duration_seconds,
            primary: segment_samples,
            audio: audio_samples[audio_start..audio_position].to_vec(),
        });
    }

    Ok(planned)
}

/// Assigns names or byte ranges and sums the total duration.
fn finish_output(result: &mut SegmentationResult, config: &SegmentationConfig) {
    let extension = match config.container_format {
        ContainerFormat::FragmentedMp4 => "m4s",
        ContainerFormat::MpegTs => "ts",
    };

    match config.output_mode {
        OutputMode::SeparateFiles => {
            for (index, segment) in result.media_segments.iter_mut().enumerate() {
                segment.name = Some(format!("segment_{}.{extension}", index + 1));
            }
        }
        OutputMode::ByteRange => {
            let mut offset = result
                .init_segment
                .as_ref()
                .map_or(0, |init| init.len() as u64);
            for segment in &mut result.media_segments {
                segment.byte_range_offset = Some(offset);
                segment.byte_range_length = Some(segment.data.len() as u64);
                offset += segment.data.len() as u64;
            }
        }
    }

    result.total_duration = result
        .media_segments
        .iter()
        .map(|segment| segment.duration_seconds)
        .sum();
}

fn build_playlist(result: &SegmentationResult, config: &SegmentationConfig) -> Result<String> {
    let target_duration = result
        .media_segments
        .iter()
        .map(|segment| segment.duration_seconds)
        .fold(0.0f64, f64::max)
        .ceil();

    let map = match (config.container_format, config.output_mode) {
        (ContainerFormat::FragmentedMp4, OutputMode::SeparateFiles) => {
            Some(MediaInitializationSection {
                uri: config.init_segment_name.clone(),
                range: None,
            })
        }
        (ContainerFormat::FragmentedMp4, OutputMode::ByteRange) => {
            Some(MediaInitializationSection {
                uri: config.media_file_name.clone(),
                range: result.init_segment.as_ref().map(|init| ByteRangeWithOffset {
                    length_bytes: init.len() as u64,
                    start_offset_bytes: 0,
                }),
            })
        }
        (ContainerFormat::MpegTs, _) => None,
    };

    let segments = result
        .media_segments
        .iter()
        .map(|segment| {
            let (uri, byte_range_or_bitrate) = match config.output_mode {
                OutputMode::SeparateFiles => (
                    segment.name.clone().unwrap_or_default(),
                    None,
                ),
                OutputMode::ByteRange => (
                    config.media_file_name.clone(),
                    Some(ByteRangeOrBitrate::ByteRange(ByteRange {
                        length_bytes: segment.byte_range_length.unwrap_or_default(),
                        start_offset_bytes: segment.byte_range_offset,
                    })),
                ),
            };

            MediaSegment {
                uri,
                duration_seconds: FloatOrInteger::Float(segment.duration_seconds),
                byte_range_or_bitrate,
                media_initialization_section: map.clone(),
                ..MediaSegment::default()
            }
        })
        .collect();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let playlist = MediaPlaylist {
        version: config.hls_version,
        target_duration: target_duration as u64,
        playlist_type: config.playlist_type.clone(),
        finished: true,
        segments,
        ..MediaPlaylist::default()
    };

    let mut output = Vec::new();
    playlist
        .serialize(&mut output)
        .map_err(|io_error| Error::EncodingFailed(io_error.to_string()))?;
    String::from_utf8(output)
        .map_err(|_| Error::EncodingFailed("playlist was not UTF-8".to_owned()))
}

/// Copies a sample's payload out of the source file.
pub(crate) fn sample_bytes<'a>(data: &'a [u8], sample: &SampleInfo) -> Result<&'a [u8]> {
    let start = usize::try_from(sample.offset).map_err(|_| Error::UnexpectedEof)?;
    let end = start
        .checked_add(sample.size as usize)
        .filter(|end| *end <= data.len())
        .ok_or(Error::UnexpectedEof)?;
    Ok(&data[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::testing::{build_mp4, TestTrack};

    /// 10 seconds of 25 fps video, keyframes every 2 seconds.
    fn test_input() -> Vec<u8> {
        let durations = vec![3600u32; 250]; // 90k timescale, 25 fps
        let sync = (0..250).filter(|i| i % 50 == 0).map(|i| i + 1).collect();
        build_mp4(&[TestTrack::video(90_000, durations, sync)])
    }

    #[test]
    fn boundaries_land_on_keyframes() {
        let data = test_input();
        let info = FileInfo::parse(&data).unwrap();
        let video = info.video_track().unwrap();
        let planned = plan_segments(video, None, 4.0).unwrap();

        // Keyframes at 0, 2, 4, 6, 8 s with a 4 s target: 4 + 4 + 2.
        assert_eq!(planned.len(), 3);
        assert!((planned[0].duration_seconds - 4.0).abs() < 1e-9);
        assert!((planned[1].duration_seconds - 4.0).abs() < 1e-9);
        assert!((planned[2].duration_seconds - 2.0).abs() < 1e-9);

        let sync_dts: Vec<u64> = video
            .samples()
            .unwrap()
            .iter()
            .filter(|sample| sample.is_sync)
            .map(|sample| sample.dts)
            .collect();
        for segment in &planned {
            assert!(sync_dts.contains(&segment.primary[0].dts));
            assert!(segment.primary[0].is_sync);
        }
    }

    #[test]
    fn stream_without_stss_cuts_exactly_at_target() {
        let data = build_mp4(&[TestTrack::audio(48_000, 100)]);
        let info = FileInfo::parse(&data).unwrap();
        let audio = info.audio_track().unwrap();

        // 1024-tick samples at 48 kHz: ~46.9 samples per second.
        let planned = plan_segments(audio, None, 1.0).unwrap();
        assert!(planned.len() > 1);
        for segment in &planned[..planned.len() - 1] {
            assert!(segment.duration_seconds >= 1.0);
            assert!(segment.duration_seconds < 1.1);
        }
    }

    #[test]
    fn empty_input_fails() {
        assert_eq!(
            segment(&[], &SegmentationConfig::default()).unwrap_err(),
            Error::EmptyInput
        );
    }

    #[test]
    fn audio_only_without_include_audio_fails() {
        let data = build_mp4(&[TestTrack::audio(48_000, 10)]);
        let config = SegmentationConfig {
            include_audio: false,
            ..SegmentationConfig::default()
        };
        assert_eq!(
            segment(&data, &config).unwrap_err(),
            Error::NoSegmentableTrack
        );
    }

    #[test]
    fn byte_ranges_cover_the_file_contiguously() {
        let data = test_input();
        let config = SegmentationConfig {
            target_duration: 4.0,
            output_mode: OutputMode::ByteRange,
            ..SegmentationConfig::default()
        };
        let result = segment(&data, &config).unwrap();

        let init_len = result.init_segment.as_ref().unwrap().len() as u64;
        let mut expected_offset = init_len;
        for segment in &result.media_segments {
            assert_eq!(segment.byte_range_offset, Some(expected_offset));
            assert_eq!(segment.byte_range_length, Some(segment.data.len() as u64));
            expected_offset += segment.data.len() as u64;
        }

        let playlist = result.playlist.unwrap();
        assert_eq!(
            playlist.matches("#EXT-X-BYTERANGE:").count(),
            result.media_segments.len()
        );
    }

    #[test]
    fn separate_files_are_named_sequentially() {
        let data = test_input();
        let config = SegmentationConfig {
            target_duration: 4.0,
            ..SegmentationConfig::default()
        };
        let result = segment(&data, &config).unwrap();

        assert_eq!(result.media_segments[0].name.as_deref(), Some("segment_1.m4s"));
        assert_eq!(result.media_segments[1].name.as_deref(), Some("segment_2.m4s"));

        let playlist = result.playlist.unwrap();
        assert!(playlist.contains("#EXT-X-MAP:URI=\"init.mp4\""));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:4"));
        assert!(playlist.contains("#EXT-X-ENDLIST"));
        assert!(playlist.contains("segment_1.m4s"));
    }

    #[test]
    fn total_duration_matches_track() {
        let data = test_input();
        let result = segment(&data, &SegmentationConfig::default()).unwrap();
        assert!((result.total_duration - 10.0).abs() < 1e-6);
    }
}
