//! Parsing of extended M3U playlists into the playlist model.

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

use crate::{
    error::{Error, Result},
    tags::{MediaType, Tag},
    EncryptionMethod, FloatOrInteger,
};

use super::{
    AudioRendition, ByteRangeOrBitrate, ClosedCaptionRendition, MediaInitializationSection,
    MediaPlaylist, MediaSegment, MultivariantPlaylist, PartInformation, PartialSegment,
    RenditionGroup, RenditionInfo, SkipInformation, StartOffset, SubtitleRendition, VariantStream,
    VideoRendition,
};

/// Either flavor of playlist, as determined by classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Media(Box<MediaPlaylist>),
    Multivariant(Box<MultivariantPlaylist>),
}

/// Parses a UTF-8 extended M3U playlist.
///
/// The playlist is classified as a media playlist or a multivariant
/// playlist by which of `EXTINF` and `EXT-X-STREAM-INF` it contains.
/// A playlist containing both or neither fails with [`Error::Ambiguous`].
///
/// Unrecognized `#EXT` tags are preserved; unrecognized attributes on
/// recognized tags are dropped.
pub fn parse(input: &str) -> Result<Playlist> {
    let mut lines = input.lines();
    let Some(first_line) = lines.next() else {
        return Err(Error::EmptyInput);
    };
    if first_line.trim_end() != "#EXTM3U" {
        return Err(Error::FormatMismatch(
            "playlists must begin with #EXTM3U".to_owned(),
        ));
    }

    let has_variant = input.lines().any(|line| {
        line.starts_with("#EXT-X-STREAM-INF:") || line.starts_with("#EXT-X-I-FRAME-STREAM-INF:")
    });
    let has_segment = input.lines().any(|line| line.starts_with("#EXTINF:"));

    match (has_variant, has_segment) {
        (true, false) => parse_multivariant(input).map(|playlist| {
            Playlist::Multivariant(Box::new(playlist))
        }),
        (false, true) => parse_media(input).map(|playlist| Playlist::Media(Box::new(playlist))),
        _ => Err(Error::Ambiguous),
    }
}

/// Parses a media playlist. The first line must be `#EXTM3U`.
pub fn parse_media(input: &str) -> Result<MediaPlaylist> {
    let mut playlist = MediaPlaylist::default();

    // Tags that apply to every following segment until changed.
    let mut current_key: Option<EncryptionMethod> = None;
    let mut current_map: Option<MediaInitializationSection> = None;
    let mut current_bitrate: Option<u64> = None;

    let mut part_target_duration: Option<f64> = None;
    let mut part_hold_back: Option<f64> = None;

    let mut pending = PendingSegment::default();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if !line.starts_with('#') {
            // A URI line closes the pending segment.
            let Some(duration_seconds) = pending.duration_seconds.take() else {
                return Err(Error::InvalidTag {
                    line_number,
                    line: line.to_owned(),
                });
            };

            playlist.segments.push(MediaSegment {
                uri: line.to_owned(),
                duration_seconds,
                title: pending.title.take().unwrap_or_default(),
                byte_range_or_bitrate: pending.byte_range.take().map(ByteRangeOrBitrate::ByteRange)
                    .or(current_bitrate.map(ByteRangeOrBitrate::Bitrate)),
                is_discontinuity: std::mem::take(&mut pending.is_discontinuity),
                encryption: current_key.clone(),
                media_initialization_section: current_map.clone(),
                absolute_time: pending.absolute_time.take(),
                is_gap: std::mem::take(&mut pending.is_gap),
                parts: std::mem::take(&mut pending.parts),
                unknown_tags: std::mem::take(&mut pending.unknown_tags),
            });
            continue;
        }

        if !line.starts_with("#EXT") {
            // Comment line.
            continue;
        }

        let Some(tag) = Tag::parse(line, line_number)? else {
            if playlist.segments.is_empty() && !pending.is_dirty() {
                playlist.unknown_tags.push(line.to_owned());
            } else {
                pending.unknown_tags.push(line.to_owned());
            }
            continue;
        };

        match tag {
            Tag::M3u => (),
            Tag::XVersion { version } => playlist.version = Some(version),
            Tag::XTargetDuration {
                target_duration_seconds,
            } => playlist.target_duration = target_duration_seconds,
            Tag::XMediaSequence { sequence_number } => {
                playlist.first_media_sequence_number = sequence_number;
            }
            Tag::XDiscontinuitySequence { sequence_number } => {
                playlist.discontinuity_sequence_number = sequence_number;
            }
            Tag::XPlaylistType(playlist_type) => playlist.playlist_type = Some(playlist_type),
            Tag::XIFramesOnly => playlist.iframes_only = true,
            Tag::XIndependentSegments => playlist.is_independent_segments = true,
            Tag::XStart {
                offset_seconds,
                is_precise,
            } => {
                playlist.start_offset = Some(StartOffset {
                    offset_in_seconds: offset_seconds,
                    is_precise,
                });
            }
            Tag::XDefine(definition) => playlist.variables.push(definition),
            Tag::XEndList => playlist.finished = true,
            Tag::XServerControl {
                can_block_reload,
                delta_update_info,
                hold_back,
                part_hold_back: tag_part_hold_back,
            } => {
                playlist.supports_blocking_playlist_reloads = can_block_reload;
                playlist.playlist_delta_updates_information = delta_update_info;
                playlist.hold_back_seconds = hold_back;
                part_hold_back = tag_part_hold_back;
            }
            Tag::XPartInf {
                part_target_duration_seconds,
            } => part_target_duration = Some(part_target_duration_seconds),
            Tag::XSkip {
                number_of_skipped_segments,
                recently_removed_dataranges,
            } => {
                playlist.metadata.skip = Some(SkipInformation {
                    number_of_skipped_segments,
                    recently_removed_dataranges,
                });
            }
            Tag::XDateRange(date_range) => playlist.metadata.date_ranges.push(date_range),
            Tag::XPreloadHint(hint) => playlist.metadata.preload_hints.push(hint),
            Tag::XRenditionReport(report) => {
                playlist.metadata.rendition_reports.push(report);
            }
            Tag::Inf {
                duration_seconds,
                title,
            } => {
                pending.duration_seconds = Some(duration_seconds);
                pending.title = Some(title);
            }
            Tag::XByterange(range) => pending.byte_range = Some(range),
            Tag::XBitrate { kbps } => current_bitrate = Some(kbps),
            Tag::XDiscontinuity => pending.is_discontinuity = true,
            Tag::XGap => pending.is_gap = true,
            Tag::XKey(key) => current_key = key,
            Tag::XMap { uri, range } => {
                current_map = Some(MediaInitializationSection { uri, range });
            }
            Tag::XProgramDateTime(time) => pending.absolute_time = Some(time),
            Tag::XPart {
                uri,
                duration_seconds,
                is_independent,
                byte_range,
                is_gap,
            } => pending.parts.push(PartialSegment {
                uri,
                duration_in_seconds: duration_seconds,
                is_independent,
                byte_range,
                is_gap,
            }),
            _ => {
                return Err(Error::InvalidTag {
                    line_number,
                    line: line.to_owned(),
                })
            }
        }
    }

    playlist.part_information = part_target_duration.map(|part_target_duration| PartInformation {
        part_hold_back_seconds: part_hold_back.unwrap_or(part_target_duration * 3.0),
        part_target_duration,
    });

    // Parts at the live edge belong to the segment that has not completed
    // yet.
    playlist.trailing_parts = pending.parts;
    playlist.unknown_tags.extend(pending.unknown_tags);

    Ok(playlist)
}

/// Parses a multivariant playlist. The first line must be `#EXTM3U`.
pub fn parse_multivariant(input: &str) -> Result<MultivariantPlaylist> {
    let mut playlist = MultivariantPlaylist::default();
    let mut pending_variant: Option<VariantStream> = None;

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if !line.starts_with('#') {
            let Some(mut variant) = pending_variant.take() else {
                return Err(Error::InvalidTag {
                    line_number,
                    line: line.to_owned(),
                });
            };
            variant.uri = line.to_owned();
            playlist.variant_streams.push(variant);
            continue;
        }

        if !line.starts_with("#EXT") {
            continue;
        }

        let Some(tag) = Tag::parse(line, line_number)? else {
            playlist.unknown_tags.push(line.to_owned());
            continue;
        };

        match tag {
            Tag::M3u => (),
            Tag::XVersion { version } => playlist.version = Some(version),
            Tag::XIndependentSegments => playlist.is_independent_segments = true,
            Tag::XStart {
                offset_seconds,
                is_precise,
            } => {
                playlist.start_offset = Some(StartOffset {
                    offset_in_seconds: offset_seconds,
                    is_precise,
                });
            }
            Tag::XDefine(definition) => playlist.variables.push(definition),
            Tag::XMedia {
                media_type,
                group_id,
                language,
                assoc_language,
                name,
                stable_rendition_id,
                playback_priority,
                characteristics,
            } => {
                let info = RenditionInfo {
                    language,
                    assoc_language,
                    name,
                    priority: playback_priority,
                    characteristics,
                    stable_rendition_id,
                };
                insert_rendition(&mut playlist.renditions_groups, media_type, group_id, info);
            }
            Tag::XStreamInf {
                stream_inf,
                audio_group_id,
                video_group_id,
                subtitles_group_id,
                closed_captions,
                ..
            } => {
                pending_variant = Some(VariantStream {
                    stream_info: stream_inf,
                    audio_group_id,
                    video_group_id,
                    subtitles_group_id,
                    closed_captions,
                    uri: String::new(),
                });
            }
            Tag::XIFrameStreamInf {
                stream_inf,
                video_group_id,
                uri,
            } => playlist.i_frame_streams.push(super::IFrameStream {
                stream_info: stream_inf,
                video_group_id,
                uri,
            }),
            Tag::XSessionData(data) => playlist.session_data.push(data),
            Tag::XSessionKey(key) => playlist.session_key.push(key),
            Tag::XContentSteering(steering) => {
                playlist.content_steering.get_or_insert(steering);
            }
            _ => {
                return Err(Error::InvalidTag {
                    line_number,
                    line: line.to_owned(),
                })
            }
        }
    }

    Ok(playlist)
}

/// State accumulated for the segment whose URI line has not appeared yet.
#[derive(Default)]
struct PendingSegment {
    duration_seconds: Option<FloatOrInteger>,
    title: Option<String>,
    byte_range: Option<crate::ByteRange>,
    is_discontinuity: bool,
    is_gap: bool,
    absolute_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    parts: Vec<PartialSegment>,
    unknown_tags: Vec<String>,
}

impl PendingSegment {
    fn is_dirty(&self) -> bool {
        self.duration_seconds.is_some()
            || self.byte_range.is_some()
            || self.is_discontinuity
            || self.is_gap
            || self.absolute_time.is_some()
            || !self.parts.is_empty()
    }
}

fn insert_rendition(
    groups: &mut Vec<RenditionGroup>,
    media_type: MediaType,
    group_id: String,
    info: RenditionInfo,
) {
    match media_type {
        MediaType::Video { uri } => {
            let rendition = VideoRendition { info, uri };
            for group in groups.iter_mut() {
                if let RenditionGroup::Video {
                    group_id: existing,
                    renditions,
                } = group
                {
                    if *existing == group_id {
                        renditions.push(rendition);
                        return;
                    }
                }
            }
            groups.push(RenditionGroup::Video {
                group_id,
                renditions: vec![rendition],
            });
        }
        MediaType::Audio {
            uri,
            channels,
            bit_depth,
            sample_rate,
        } => {
            let rendition = AudioRendition {
                bit_depth,
                sample_rate,
                channels,
                info,
                uri,
            };
            for group in groups.iter_mut() {
                if let RenditionGroup::Audio {
                    group_id: existing,
                    renditions,
                } = group
                {
                    if *existing == group_id {
                        renditions.push(rendition);
                        return;
                    }
                }
            }
            groups.push(RenditionGroup::Audio {
                group_id,
                renditions: vec![rendition],
            });
        }
        MediaType::Subtitles { uri, forced } => {
            let rendition = SubtitleRendition { forced, info, uri };
            for group in groups.iter_mut() {
                if let RenditionGroup::Subtitles {
                    group_id: existing,
                    renditions,
                } = group
                {
                    if *existing == group_id {
                        renditions.push(rendition);
                        return;
                    }
                }
            }
            groups.push(RenditionGroup::Subtitles {
                group_id,
                renditions: vec![rendition],
            });
        }
        MediaType::ClosedCaptions { in_stream_id } => {
            let rendition = ClosedCaptionRendition { in_stream_id, info };
            for group in groups.iter_mut() {
                if let RenditionGroup::ClosedCaptions {
                    group_id: existing,
                    renditions,
                } = group
                {
                    if *existing == group_id {
                        renditions.push(rendition);
                        return;
                    }
                }
            }
            groups.push(RenditionGroup::ClosedCaptions {
                group_id,
                renditions: vec![rendition],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    fn serialize_media(playlist: &MediaPlaylist) -> String {
        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    fn serialize_multivariant(playlist: &MultivariantPlaylist) -> String {
        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[rstest]
    fn classification() {
        let media = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.009,\ns001.ts\n";
        assert!(matches!(parse(media).unwrap(), Playlist::Media(_)));

        let multivariant = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\n480p/playlist.m3u8\n";
        assert!(matches!(
            parse(multivariant).unwrap(),
            Playlist::Multivariant(_)
        ));

        let neither = "#EXTM3U\n";
        assert_eq!(parse(neither).unwrap_err(), Error::Ambiguous);

        let both = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nx.m3u8\n#EXTINF:1,\nx.ts\n";
        assert_eq!(parse(both).unwrap_err(), Error::Ambiguous);
    }

    #[rstest]
    fn missing_header_is_rejected() {
        assert!(matches!(
            parse("#EXT-X-TARGETDURATION:10\n"),
            Err(Error::FormatMismatch(_))
        ));
    }

    #[rstest]
    fn media_round_trip_is_idempotent() {
        let input = "#EXTM3U\n\
                     #EXT-X-VERSION:6\n\
                     #EXT-X-TARGETDURATION:10\n\
                     #EXT-X-MEDIA-SEQUENCE:12\n\
                     #EXT-X-PLAYLIST-TYPE:VOD\n\
                     #EXT-X-KEY:METHOD=AES-128,URI=\"https://example.com/key\"\n\
                     #EXT-X-MAP:URI=\"init.mp4\"\n\
                     #EXTINF:9.009,\n\
                     s001.m4s\n\
                     #EXTINF:9.009,\n\
                     s002.m4s\n\
                     #EXT-X-ENDLIST\n";

        let Playlist::Media(playlist) = parse(input).unwrap() else {
            panic!("classified wrong");
        };
        let first_pass = serialize_media(&playlist);
        let Playlist::Media(reparsed) = parse(&first_pass).unwrap() else {
            panic!("classified wrong");
        };
        assert_eq!(*playlist, *reparsed);
        assert_eq!(first_pass, serialize_media(&reparsed));
    }

    #[rstest]
    fn key_and_map_inherit_across_segments() {
        let input = "#EXTM3U\n\
                     #EXT-X-TARGETDURATION:6\n\
                     #EXT-X-KEY:METHOD=AES-128,URI=\"https://example.com/key\"\n\
                     #EXTINF:6,\n\
                     s001.ts\n\
                     #EXTINF:6,\n\
                     s002.ts\n";

        let playlist = parse_media(input).unwrap();
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(
            playlist.segments[0].encryption,
            playlist.segments[1].encryption
        );
        assert!(playlist.segments[0].encryption.is_some());
    }

    #[rstest]
    fn unknown_tags_are_preserved_in_context() {
        let input = "#EXTM3U\n\
                     #EXT-X-TARGETDURATION:6\n\
                     #EXT-X-EXPERIMENTAL-HEADER:1\n\
                     #EXTINF:6,\n\
                     s001.ts\n\
                     #EXT-X-EXPERIMENTAL-SEGMENT-MARK\n\
                     #EXTINF:6,\n\
                     s002.ts\n";

        let playlist = parse_media(input).unwrap();
        assert_eq!(
            playlist.unknown_tags,
            vec!["#EXT-X-EXPERIMENTAL-HEADER:1".to_owned()]
        );
        assert_eq!(
            playlist.segments[1].unknown_tags,
            vec!["#EXT-X-EXPERIMENTAL-SEGMENT-MARK".to_owned()]
        );
    }

    #[rstest]
    fn multivariant_round_trip_is_idempotent() {
        let input = "#EXTM3U\n\
                     #EXT-X-INDEPENDENT-SEGMENTS\n\
                     #EXT-X-MEDIA:TYPE=AUDIO,URI=\"audio/en.m3u8\",GROUP-ID=\"stereo\",LANGUAGE=\"en\",NAME=\"English\",DEFAULT=YES,AUTOSELECT=YES,CHANNELS=\"2\"\n\
                     #EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=1280x720,FRAME-RATE=30.000,AUDIO=\"stereo\"\n\
                     720p/playlist.m3u8\n\
                     #EXT-X-CONTENT-STEERING:SERVER-URI=\"https://example.com/steering\",PATHWAY-ID=\"CDN-A\"\n";

        let Playlist::Multivariant(playlist) = parse(input).unwrap() else {
            panic!("classified wrong");
        };
        let first_pass = serialize_multivariant(&playlist);
        let Playlist::Multivariant(reparsed) = parse(&first_pass).unwrap() else {
            panic!("classified wrong");
        };
        assert_eq!(*playlist, *reparsed);
        assert_eq!(first_pass, serialize_multivariant(&reparsed));
    }

    #[rstest]
    fn ll_hls_trailing_parts_attach_to_live_edge() {
        let input = "#EXTM3U\n\
                     #EXT-X-TARGETDURATION:4\n\
                     #EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK=3.012\n\
                     #EXT-X-PART-INF:PART-TARGET=1\n\
                     #EXTINF:4.00008,\n\
                     fileSequence100.mp4\n\
                     #EXT-X-PART:URI=\"filePart101.0.mp4\",DURATION=1.004,INDEPENDENT=YES\n\
                     #EXT-X-PART:URI=\"filePart101.1.mp4\",DURATION=1.004\n\
                     #EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"filePart101.2.mp4\"\n";

        let playlist = parse_media(input).unwrap();
        assert_eq!(playlist.segments.len(), 1);
        assert!(playlist.segments[0].parts.is_empty());
        assert_eq!(playlist.trailing_parts.len(), 2);
        assert_eq!(playlist.metadata.preload_hints.len(), 1);
        let part_information = playlist.part_information.unwrap();
        assert!((part_information.part_hold_back_seconds - 3.012).abs() < 1e-9);
        assert!((part_information.part_target_duration - 1.0).abs() < 1e-9);
    }

    #[rstest]
    fn uri_without_extinf_fails() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:6\nstray.ts\n#EXTINF:6,\nok.ts\n";
        assert!(matches!(
            parse_media(input),
            Err(Error::InvalidTag { line_number: 3, .. })
        ));
    }
}
