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

use super::{
    ByteRangeOrBitrate, IFrameStream, MediaPlaylist, MediaSegment, MultivariantPlaylist,
    RenditionGroup, VariantStream,
};
use crate::tags::Tag;
use std::{cmp::max, io};

impl MediaPlaylist {
    /// Serializes the `MediaPlaylist` as a extended M3U playlist into `output`.
    /// Guaranteed to write valid UTF-8 only.
    ///
    /// This method makes lots of small calls to write on `output`. If the implementation
    /// of write on `output` makes a syscall, like with a `TcpStream`, you should wrap it
    /// in a [`std::io::BufWriter`].
    ///
    /// # Note
    ///
    /// This method is not guaranteed to write a valid M3U playlist. It's your job to create
    /// valid input.
    ///
    /// # Errors
    ///
    /// May return `Err` when encountering an io error on `output`.
    pub fn serialize(&self, mut output: impl io::Write) -> io::Result<()> {
        Tag::M3u.serialize(&mut output)?;

        let version = self.version.unwrap_or_else(|| self.computed_version());
        if version != 1 {
            Tag::XVersion { version }.serialize(&mut output)?;
        }

        Tag::XTargetDuration {
            target_duration_seconds: self.target_duration,
        }
        .serialize(&mut output)?;
        if self.first_media_sequence_number != 0 {
            Tag::XMediaSequence {
                sequence_number: self.first_media_sequence_number,
            }
            .serialize(&mut output)?;
        }
        if self.discontinuity_sequence_number != 0 {
            Tag::XDiscontinuitySequence {
                sequence_number: self.discontinuity_sequence_number,
            }
            .serialize(&mut output)?;
        }
        if let Some(playlist_type) = &self.playlist_type {
            Tag::XPlaylistType(playlist_type.clone()).serialize(&mut output)?;
        }
        if self.iframes_only {
            Tag::XIFramesOnly.serialize(&mut output)?;
        }
        if self.is_independent_segments {
            Tag::XIndependentSegments.serialize(&mut output)?;
        }
        if let Some(offset) = &self.start_offset {
            Tag::XStart {
                offset_seconds: offset.offset_in_seconds,
                is_precise: offset.is_precise,
            }
            .serialize(&mut output)?;
        }
        if self.playlist_delta_updates_information.is_some()
            || self.hold_back_seconds.is_some()
            || self.part_information.is_some()
            || self.supports_blocking_playlist_reloads
        {
            Tag::XServerControl {
                can_block_reload: self.supports_blocking_playlist_reloads,
                delta_update_info: self.playlist_delta_updates_information.clone(),
                hold_back: self.hold_back_seconds,
                part_hold_back: self
                    .part_information
                    .as_ref()
                    .map(|info| info.part_hold_back_seconds),
            }
            .serialize(&mut output)?;
        }
        if let Some(part_information) = &self.part_information {
            Tag::XPartInf {
                part_target_duration_seconds: part_information.part_target_duration,
            }
            .serialize(&mut output)?;
        }

        for variable in &self.variables {
            Tag::XDefine(variable.clone()).serialize(&mut output)?;
        }

        if let Some(skip) = &self.metadata.skip {
            Tag::XSkip {
                number_of_skipped_segments: skip.number_of_skipped_segments,
                recently_removed_dataranges: skip.recently_removed_dataranges.clone(),
            }
            .serialize(&mut output)?;
        }

        for line in &self.unknown_tags {
            writeln!(output, "{line}")?;
        }

        for date_range in &self.metadata.date_ranges {
            Tag::XDateRange(date_range.clone()).serialize(&mut output)?;
        }

        let mut last_media_segment: Option<&MediaSegment> = None;
        for segment in &self.segments {
            segment.serialize(last_media_segment, version, &mut output)?;
            last_media_segment = Some(segment);
        }

        for part in &self.trailing_parts {
            Tag::XPart {
                uri: part.uri.clone(),
                duration_seconds: part.duration_in_seconds,
                is_independent: part.is_independent,
                byte_range: part.byte_range.clone(),
                is_gap: part.is_gap,
            }
            .serialize(&mut output)?;
        }

        for hint in &self.metadata.preload_hints {
            Tag::XPreloadHint(hint.clone()).serialize(&mut output)?;
        }

        for report in &self.metadata.rendition_reports {
            Tag::XRenditionReport(report.clone()).serialize(&mut output)?;
        }

        if self.finished {
            Tag::XEndList.serialize(&mut output)?;
        }

        Ok(())
    }

    /// The lowest protocol version implied by the playlist's contents.
    #[must_use]
    pub fn computed_version(&self) -> u8 {
        let mut version = 1;

        for segment in &self.segments {
            if let Some(method) = &segment.encryption {
                if let crate::EncryptionMethod::Aes128 { iv, .. } = method {
                    if iv.is_some() {
                        version = max(version, 5);
                    }
                } else {
                    version = max(version, 5);
                }

                if let crate::KeyFormat::Other(_) = method.key_format() {
                    version = max(version, 5);
                }

                let (crate::EncryptionMethod::Aes128 {
                    key_format_versions,
                    ..
                }
                | crate::EncryptionMethod::SampleAes {
                    key_format_versions,
                    ..
                }
                | crate::EncryptionMethod::SampleAesCtr {
                    key_format_versions,
                    ..
                }) = method;
                if key_format_versions.iter().any(|key_version| *key_version != 1) {
                    version = max(version, 5);
                }
            }

            if let crate::FloatOrInteger::Float(_) = segment.duration_seconds {
                version = max(version, 3);
            }

            if let Some(ByteRangeOrBitrate::ByteRange(_)) = segment.byte_range_or_bitrate {
                version = max(version, 4);
            }

            if segment.media_initialization_section.is_some() {
                version = max(version, if self.iframes_only { 5 } else { 6 });
            }

            if segment.is_gap {
                version = max(version, 8);
            }
        }

        if self.iframes_only {
            version = max(version, 4);
        }

        if !self.variables.is_empty() {
            version = max(version, 8);
        }
        for variable in &self.variables {
            if let crate::DefinitionType::QueryParameter { .. } = variable {
                version = max(version, 11);
            }
        }

        if self.part_information.is_some()
            || self.supports_blocking_playlist_reloads
            || self.hold_back_seconds.is_some()
            || self.playlist_delta_updates_information.is_some()
            || !self.trailing_parts.is_empty()
        {
            version = max(version, 9);
        }

        if let Some(skip_information) = &self.metadata.skip {
            if skip_information.recently_removed_dataranges.is_empty() {
                version = max(version, 9);
            } else {
                version = max(version, 10);
            }
        }

        version
    }
}

impl MediaSegment {
    fn serialize(
        &self,
        last_media_segment: Option<&Self>,
        version: u8,
        mut output: impl io::Write,
    ) -> io::Result<()> {
        if self.is_discontinuity {
            Tag::XDiscontinuity.serialize(&mut output)?;
        }

        let last_encryption = last_media_segment.and_then(|last| last.encryption.as_ref());
        if last_encryption != self.encryption.as_ref() {
            Tag::XKey(self.encryption.clone()).serialize(&mut output)?;
        }

        if let Some(map) = &self.media_initialization_section {
            if last_media_segment
                .and_then(|last| last.media_initialization_section.as_ref())
                != Some(map)
            {
                Tag::XMap {
                    uri: map.uri.clone(),
                    range: map.range.clone(),
                }
                .serialize(&mut output)?;
            }
        }

        match &self.byte_range_or_bitrate {
            Some(ByteRangeOrBitrate::ByteRange(byte_range)) => {
                Tag::XByterange(byte_range.clone()).serialize(&mut output)?;
            }
            Some(ByteRangeOrBitrate::Bitrate(kbps)) => {
                if last_media_segment.and_then(|last| last.byte_range_or_bitrate.as_ref())
                    != self.byte_range_or_bitrate.as_ref()
                {
                    Tag::XBitrate { kbps: *kbps }.serialize(&mut output)?;
                }
            }
            None => (),
        }

        if let Some(time) = self.absolute_time {
            Tag::XProgramDateTime(time).serialize(&mut output)?;
        }

        if self.is_gap {
            Tag::XGap.serialize(&mut output)?;
        }

        for line in &self.unknown_tags {
            writeln!(output, "{line}")?;
        }

        for part in &self.parts {
            Tag::XPart {
                uri: part.uri.clone(),
                duration_seconds: part.duration_in_seconds,
                is_independent: part.is_independent,
                byte_range: part.byte_range.clone(),
                is_gap: part.is_gap,
            }
            .serialize(&mut output)?;
        }

        // Protocol versions below 3 only allow integer EXTINF durations.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let duration_seconds = match &self.duration_seconds {
            crate::FloatOrInteger::Float(float) if version < 3 => {
                crate::FloatOrInteger::Integer(*float as u64)
            }
            other => other.clone(),
        };
        Tag::Inf {
            duration_seconds,
            title: self.title.clone(),
        }
        .serialize(&mut output)?;

        writeln!(output, "{}", self.uri)?;

        Ok(())
    }
}

impl MultivariantPlaylist {
    /// Serializes the `MultivariantPlaylist` as a extended M3U playlist into `output`.
    /// Guaranteed to write valid UTF-8 only.
    ///
    /// This method makes lots of small calls to write on `output`. If the implementation
    /// of write on `output` makes a syscall, like with a `TcpStream`, you should wrap it
    /// in a [`std::io::BufWriter`].
    ///
    /// # Note
    ///
    /// This method is not guaranteed to write a valid M3U playlist. It's your job to create
    /// valid input.
    ///
    /// # Errors
    ///
    /// May return `Err` when encountering an io error on `output`.
    pub fn serialize(&self, mut output: impl io::Write) -> io::Result<()> {
        Tag::M3u.serialize(&mut output)?;

        let version = self.version.unwrap_or_else(|| self.computed_version());
        if version != 1 {
            Tag::XVersion { version }.serialize(&mut output)?;
        }

        if self.is_independent_segments {
            Tag::XIndependentSegments.serialize(&mut output)?;
        }
        if let Some(offset) = &self.start_offset {
            Tag::XStart {
                offset_seconds: offset.offset_in_seconds,
                is_precise: offset.is_precise,
            }
            .serialize(&mut output)?;
        }

        for variable in &self.variables {
            Tag::XDefine(variable.clone()).serialize(&mut output)?;
        }

        for key in &self.session_key {
            Tag::XSessionKey(key.clone()).serialize(&mut output)?;
        }

        for line in &self.unknown_tags {
            writeln!(output, "{line}")?;
        }

        for rendition_group in &self.renditions_groups {
            rendition_group.serialize(&mut output)?;
        }

        for variant_stream in &self.variant_streams {
            variant_stream.serialize(&mut output)?;
        }

        for i_frame_stream in &self.i_frame_streams {
            i_frame_stream.serialize(&mut output)?;
        }

        for data in &self.session_data {
            Tag::XSessionData(data.clone()).serialize(&mut output)?;
        }

        if let Some(content_steering) = &self.content_steering {
            Tag::XContentSteering(content_steering.clone()).serialize(&mut output)?;
        }

        Ok(())
    }

    /// The lowest protocol version implied by the playlist's contents.
    #[must_use]
    pub fn computed_version(&self) -> u8 {
        let mut version = 1;

        for rendition_group in &self.renditions_groups {
            if matches!(rendition_group, RenditionGroup::Subtitles { .. }) {
                version = max(version, 5);
            }
            if let RenditionGroup::ClosedCaptions { renditions, .. } = rendition_group {
                for rendition in renditions {
                    if let crate::InStreamId::Service(_) = rendition.in_stream_id {
                        version = max(version, 7);
                    }
                }
            }
        }

        for key in &self.session_key {
            if !matches!(key, crate::EncryptionMethod::Aes128 { .. }) {
                version = max(version, 5);
            }
            if let crate::KeyFormat::Other(_) = key.key_format() {
                version = max(version, 5);
            }
        }

        if !self.variables.is_empty() {
            version = max(version, 8);
        }
        for variable in &self.variables {
            if let crate::DefinitionType::QueryParameter { .. } = variable {
                version = max(version, 11);
            }
        }

        for stream in &self.variant_streams {
            if stream.stream_info.hdcp_level.is_some() {
                version = max(version, 7);
            }
            if matches!(stream.closed_captions, crate::ClosedCaptionsValue::None) {
                version = max(version, 7);
            }
            if !stream.stream_info.supplemental_codecs.is_empty() {
                version = max(version, 10);
            }
            if !stream.stream_info.required_video_layout.is_empty() {
                version = max(version, 12);
            }
        }

        for stream in &self.i_frame_streams {
            if stream.stream_info.hdcp_level.is_some() {
                version = max(version, 7);
            }
            if !stream.stream_info.supplemental_codecs.is_empty() {
                version = max(version, 10);
            }
        }

        version
    }
}

impl IFrameStream {
    fn serialize(&self, mut output: impl io::Write) -> io::Result<()> {
        Tag::XIFrameStreamInf {
            stream_inf: self.stream_info.clone(),
            video_group_id: self.video_group_id.clone(),
            uri: self.uri.clone(),
        }
        .serialize(&mut output)?;

        Ok(())
    }
}

impl VariantStream {
    fn serialize(&self, mut output: impl io::Write) -> io::Result<()> {
        Tag::XStreamInf {
            stream_inf: self.stream_info.clone(),
            audio_group_id: self.audio_group_id.clone(),
            video_group_id: self.video_group_id.clone(),
            subtitles_group_id: self.subtitles_group_id.clone(),
            closed_captions: self.closed_captions.clone(),
            uri: self.uri.clone(),
        }
        .serialize(&mut output)?;

        Ok(())
    }
}

impl RenditionGroup {
    fn serialize(&self, mut output: impl io::Write) -> io::Result<()> {
        match self {
            Self::Video {
                group_id,
                renditions,
            } => {
                for rendition in renditions {
                    Tag::XMedia {
                        media_type: crate::tags::MediaType::Video {
                            uri: rendition.uri.clone(),
                        },
                        group_id: group_id.clone(),
                        language: rendition.info.language.clone(),
                        assoc_language: rendition.info.assoc_language.clone(),
                        name: rendition.info.name.clone(),
                        stable_rendition_id: rendition.info.stable_rendition_id.clone(),
                        playback_priority: rendition.info.priority.clone(),
                        characteristics: rendition.info.characteristics.clone(),
                    }
                    .serialize(&mut output)?;
                }
            }
            Self::Audio {
                group_id,
                renditions,
            } => {
                for rendition in renditions {
                    Tag::XMedia {
                        media_type: crate::tags::MediaType::Audio {
                            uri: rendition.uri.clone(),
                            channels: rendition.channels.clone(),
                            bit_depth: rendition.bit_depth,
                            sample_rate: rendition.sample_rate,
                        },
                        group_id: group_id.clone(),
                        language: rendition.info.language.clone(),
                        assoc_language: rendition.info.assoc_language.clone(),
                        name: rendition.info.name.clone(),
                        stable_rendition_id: rendition.info.stable_rendition_id.clone(),
                        playback_priority: rendition.info.priority.clone(),
                        characteristics: rendition.info.characteristics.clone(),
                    }
                    .serialize(&mut output)?;
                }
            }
            Self::Subtitles {
                group_id,
                renditions,
            } => {
                for rendition in renditions {
                    Tag::XMedia {
                        media_type: crate::tags::MediaType::Subtitles {
                            uri: rendition.uri.clone(),
                            forced: rendition.forced,
                        },
                        group_id: group_id.clone(),
                        language: rendition.info.language.clone(),
                        assoc_language: rendition.info.assoc_language.clone(),
                        name: rendition.info.name.clone(),
                        stable_rendition_id: rendition.info.stable_rendition_id.clone(),
                        playback_priority: rendition.info.priority.clone(),
                        characteristics: rendition.info.characteristics.clone(),
                    }
                    .serialize(&mut output)?;
                }
            }
            Self::ClosedCaptions {
                group_id,
                renditions,
            } => {
                for rendition in renditions {
                    Tag::XMedia {
                        media_type: crate::tags::MediaType::ClosedCaptions {
                            in_stream_id: rendition.in_stream_id.clone(),
                        },
                        group_id: group_id.clone(),
                        language: rendition.info.language.clone(),
                        assoc_language: rendition.info.assoc_language.clone(),
                        name: rendition.info.name.clone(),
                        stable_rendition_id: rendition.info.stable_rendition_id.clone(),
                        playback_priority: rendition.info.priority.clone(),
                        characteristics: rendition.info.characteristics.clone(),
                    }
                    .serialize(&mut output)?;
                }
            }
        }

        Ok(())
    }
}
