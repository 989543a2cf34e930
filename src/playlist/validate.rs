//! Structural and semantic validation of playlists.

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
    error::{Diagnostic, Error, Result, Severity},
    ClosedCaptionsValue, HdcpLevel, VideoRange,
};

use super::{ByteRangeOrBitrate, MediaPlaylist, MultivariantPlaylist, RenditionGroup};

fn error(location: impl Into<String>, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        location: location.into(),
        message: message.into(),
    }
}

fn warning(location: impl Into<String>, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        location: location.into(),
        message: message.into(),
    }
}

/// Collects every problem found in a media playlist.
#[must_use]
pub fn validate_media(playlist: &MediaPlaylist) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let mut max_rounded_duration = 0;
    for segment in &playlist.segments {
        let duration = segment.duration_seconds.as_f64();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = duration.ceil() as u64;
        max_rounded_duration = max_rounded_duration.max(rounded);

        if rounded > playlist.target_duration {
            diagnostics.push(error(
                &segment.uri,
                format!(
                    "segment duration {duration} exceeds EXT-X-TARGETDURATION {}",
                    playlist.target_duration
                ),
            ));
        }
    }
    if !playlist.segments.is_empty() && playlist.target_duration > max_rounded_duration {
        diagnostics.push(warning(
            "EXT-X-TARGETDURATION",
            format!(
                "target duration {} is larger than the longest segment requires ({max_rounded_duration})",
                playlist.target_duration
            ),
        ));
    }

    if let Some(part_information) = &playlist.part_information {
        let part_target = part_information.part_target_duration;
        for part in playlist
            .segments
            .iter()
            .flat_map(|segment| &segment.parts)
            .chain(&playlist.trailing_parts)
        {
            if part.duration_in_seconds > part_target {
                diagnostics.push(error(
                    &part.uri,
                    format!(
                        "partial segment duration {} exceeds PART-TARGET {part_target}",
                        part.duration_in_seconds
                    ),
                ));
            }
        }

        if part_information.part_hold_back_seconds < part_target * 3.0 {
            diagnostics.push(warning(
                "EXT-X-SERVER-CONTROL",
                format!(
                    "PART-HOLD-BACK {} is below three part target durations",
                    part_information.part_hold_back_seconds
                ),
            ));
        }
    } else if !playlist.trailing_parts.is_empty()
        || playlist.segments.iter().any(|segment| !segment.parts.is_empty())
    {
        diagnostics.push(error(
            "EXT-X-PART",
            "partial segments require an EXT-X-PART-INF tag",
        ));
    }

    if matches!(playlist.playlist_type, Some(crate::PlaylistType::Vod)) && !playlist.finished {
        diagnostics.push(warning(
            "EXT-X-PLAYLIST-TYPE",
            "VOD playlists should carry EXT-X-ENDLIST",
        ));
    }

    // An offset-less byte range continues the previous one, so the previous
    // segment must be a byte range of the same resource.
    let mut previous: Option<&super::MediaSegment> = None;
    for segment in &playlist.segments {
        if let Some(ByteRangeOrBitrate::ByteRange(range)) = &segment.byte_range_or_bitrate {
            if range.start_offset_bytes.is_none() {
                let continues_previous = previous.is_some_and(|previous| {
                    previous.uri == segment.uri
                        && matches!(
                            previous.byte_range_or_bitrate,
                            Some(ByteRangeOrBitrate::ByteRange(_))
                        )
                });
                if !continues_previous {
                    diagnostics.push(error(
                        &segment.uri,
                        "byte range without an offset does not follow a byte range of the same resource",
                    ));
                }
            }
        }
        previous = Some(segment);
    }

    if playlist.metadata.skip.is_some() && playlist.playlist_delta_updates_information.is_none() {
        diagnostics.push(warning(
            "EXT-X-SKIP",
            "playlist delta update without CAN-SKIP-UNTIL in EXT-X-SERVER-CONTROL",
        ));
    }

    diagnostics
}

/// Collects every problem found in a multivariant playlist.
#[must_use]
pub fn validate_multivariant(playlist: &MultivariantPlaylist) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let group_exists = |wanted: &str, matches_kind: &dyn Fn(&RenditionGroup) -> bool| {
        playlist
            .renditions_groups
            .iter()
            .any(|group| matches_kind(group) && group.group_id() == wanted)
    };

    let mut any_closed_captions_none = false;
    let mut any_closed_captions_group = false;

    for variant in &playlist.variant_streams {
        let location = &variant.uri;

        if variant.stream_info.bandwidth_bits_per_second == 0 {
            diagnostics.push(error(location, "BANDWIDTH must be positive"));
        }

        if let Some(average) = variant.stream_info.average_bandwidth_bits_per_second {
            if average > variant.stream_info.bandwidth_bits_per_second {
                diagnostics.push(warning(
                    location,
                    "AVERAGE-BANDWIDTH exceeds peak BANDWIDTH",
                ));
            }
        }

        if let Some(group) = &variant.audio_group_id {
            if !group_exists(group, &|g| matches!(g, RenditionGroup::Audio { .. })) {
                diagnostics.push(error(
                    location,
                    format!("AUDIO group {group:?} has no EXT-X-MEDIA entries"),
                ));
            }
        }
        if let Some(group) = &variant.video_group_id {
            if !group_exists(group, &|g| matches!(g, RenditionGroup::Video { .. })) {
                diagnostics.push(error(
                    location,
                    format!("VIDEO group {group:?} has no EXT-X-MEDIA entries"),
                ));
            }
        }
        if let Some(group) = &variant.subtitles_group_id {
            if !group_exists(group, &|g| matches!(g, RenditionGroup::Subtitles { .. })) {
                diagnostics.push(error(
                    location,
                    format!("SUBTITLES group {group:?} has no EXT-X-MEDIA entries"),
                ));
            }
        }
        match &variant.closed_captions {
            ClosedCaptionsValue::GroupId(group) => {
                any_closed_captions_group = true;
                if !group_exists(group, &|g| matches!(g, RenditionGroup::ClosedCaptions { .. })) {
                    diagnostics.push(error(
                        location,
                        format!("CLOSED-CAPTIONS group {group:?} has no EXT-X-MEDIA entries"),
                    ));
                }
            }
            ClosedCaptionsValue::None => any_closed_captions_none = true,
            ClosedCaptionsValue::Omitted => (),
        }

        // HDR output over an unprotected link is the usual misconfiguration
        // behind this pairing.
        if matches!(
            variant.stream_info.video_range,
            VideoRange::Hlg | VideoRange::Pq
        ) && variant.stream_info.hdcp_level == Some(HdcpLevel::None)
        {
            diagnostics.push(warning(
                location,
                "HDR VIDEO-RANGE with HDCP-LEVEL=NONE",
            ));
        }
    }

    if any_closed_captions_none && any_closed_captions_group {
        diagnostics.push(error(
            "EXT-X-STREAM-INF",
            "CLOSED-CAPTIONS=NONE requires every Variant Stream to declare NONE",
        ));
    }

    for group in &playlist.renditions_groups {
        if let RenditionGroup::ClosedCaptions {
            group_id,
            renditions,
        } = group
        {
            for rendition in renditions {
                if let crate::InStreamId::Service(id) = &rendition.in_stream_id {
                    if id.get() > 63 {
                        diagnostics.push(error(
                            group_id,
                            format!("caption SERVICE{id} is outside 1..=63"),
                        ));
                    }
                }
            }
        }
    }

    diagnostics
}

/// Validates a media playlist, failing when any error-severity diagnostic
/// is found.
pub fn check_media(playlist: &MediaPlaylist) -> Result<()> {
    raise_errors(validate_media(playlist))
}

/// Validates a multivariant playlist, failing when any error-severity
/// diagnostic is found.
pub fn check_multivariant(playlist: &MultivariantPlaylist) -> Result<()> {
    raise_errors(validate_multivariant(playlist))
}

fn raise_errors(diagnostics: Vec<Diagnostic>) -> Result<()> {
    if diagnostics
        .iter()
        .any(|diagnostic| diagnostic.severity == Severity::Error)
    {
        return Err(Error::ValidationFailed(diagnostics));
    }
    Ok(())
}
