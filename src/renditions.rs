//! Generators for accessibility and spatial-audio rendition groups, and
//! the WebVTT cue writer for subtitle segments.

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

use std::io;

use crate::{
    media::ChannelLayout,
    playlist::{
        AudioRendition, ClosedCaptionRendition, RenditionGroup, RenditionInfo, SubtitleRendition,
    },
    AudioChannelInformation, InStreamId, RenditionPlaybackPriority,
};

/// Media characteristic tag for subtitles that transcribe dialog.
const TRANSCRIBES_DIALOG: &str = "public.accessibility.transcribes-spoken-dialog";

/// Media characteristic tag for subtitles that also describe music and
/// sound, i.e. SDH.
const DESCRIBES_SOUND: &str = "public.accessibility.describes-music-and-sound";

/// Media characteristic tag for audio description renditions.
const DESCRIBES_VIDEO: &str = "public.accessibility.describes-video";

fn rendition_info(
    name: impl Into<String>,
    language: Option<String>,
    is_default: bool,
    characteristics: Vec<String>,
) -> RenditionInfo {
    RenditionInfo {
        language,
        assoc_language: None,
        name: name.into(),
        priority: if is_default {
            RenditionPlaybackPriority::Default
        } else {
            RenditionPlaybackPriority::AutoSelect
        },
        characteristics,
        stable_rendition_id: None,
    }
}

/// One embedded closed caption service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedCaptionEntry {
    pub name: String,
    pub language: Option<String>,
    pub in_stream_id: InStreamId,
    pub is_default: bool,
}

/// Builds the CLOSED-CAPTIONS rendition group for a set of embedded
/// caption services.
#[must_use]
pub fn closed_caption_group(
    group_id: impl Into<String>,
    entries: Vec<ClosedCaptionEntry>,
) -> RenditionGroup {
    RenditionGroup::ClosedCaptions {
        group_id: group_id.into(),
        renditions: entries
            .into_iter()
            .map(|entry| ClosedCaptionRendition {
                in_stream_id: entry.in_stream_id,
                info: rendition_info(entry.name, entry.language, entry.is_default, vec![]),
            })
            .collect(),
    }
}

/// One subtitle rendition to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    pub name: String,
    pub language: Option<String>,

    /// URI of the rendition's media playlist.
    pub uri: String,

    /// Forced narrative subtitles: on-screen text the author requires.
    pub forced: bool,

    /// Subtitles for the deaf and hard of hearing; adds the
    /// transcription and sound-description characteristics.
    pub sdh: bool,

    pub is_default: bool,
}

/// Builds a SUBTITLES rendition group.
#[must_use]
pub fn subtitle_group(
    group_id: impl Into<String>,
    entries: Vec<SubtitleEntry>,
) -> RenditionGroup {
    RenditionGroup::Subtitles {
        group_id: group_id.into(),
        renditions: entries
            .into_iter()
            .map(|entry| {
                let characteristics = if entry.sdh {
                    vec![TRANSCRIBES_DIALOG.to_owned(), DESCRIBES_SOUND.to_owned()]
                } else {
                    vec![]
                };
                SubtitleRendition {
                    forced: entry.forced,
                    info: rendition_info(
                        entry.name,
                        entry.language,
                        entry.is_default,
                        characteristics,
                    ),
                    uri: entry.uri,
                }
            })
            .collect(),
    }
}

/// One audio rendition to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEntry {
    pub name: String,
    pub language: Option<String>,
    pub uri: Option<String>,
    pub layout: ChannelLayout,

    /// Marks an audio description rendition.
    pub describes_video: bool,

    pub is_default: bool,
}

/// Builds an AUDIO rendition group covering stereo, surround, spatial
/// and audio-description renditions.
#[must_use]
pub fn audio_group(group_id: impl Into<String>, entries: Vec<AudioEntry>) -> RenditionGroup {
    RenditionGroup::Audio {
        group_id: group_id.into(),
        renditions: entries
            .into_iter()
            .map(|entry| {
                let channels = Some(channel_information(entry.layout));
                let characteristics = if entry.describes_video {
                    vec![DESCRIBES_VIDEO.to_owned()]
                } else {
                    vec![]
                };
                AudioRendition {
                    bit_depth: None,
                    sample_rate: None,
                    channels,
                    info: rendition_info(
                        entry.name,
                        entry.language,
                        entry.is_default,
                        characteristics,
                    ),
                    uri: entry.uri,
                }
            })
            .collect(),
    }
}

/// The CHANNELS attribute value for a layout. Spatial audio carries the
/// JOC coding identifier.
fn channel_information(layout: ChannelLayout) -> AudioChannelInformation {
    match layout {
        ChannelLayout::Atmos => AudioChannelInformation::WithAudioCodingIdentifiers {
            number_of_channels: u64::from(layout.channel_count()),
            audio_coding_identifiers: vec!["JOC".to_owned()],
        },
        _ => AudioChannelInformation::NumberOfChannelsOnly {
            number_of_channels: u64::from(layout.channel_count()),
        },
    }
}

/// One WebVTT cue.
#[derive(Debug, Clone, PartialEq)]
pub struct WebVttCue {
    pub start_seconds: f64,
    pub end_seconds: f64,

    /// Raw cue settings appended after the timing line, e.g.
    /// `align:center line:90%`.
    pub settings: Option<String>,

    pub text: String,
}

/// Serializes a WebVTT subtitle segment. Timestamps always carry full
/// hours.
///
/// # Errors
///
/// May return `Err` when encountering an io error on `output`.
pub fn serialize_webvtt(cues: &[WebVttCue], mut output: impl io::Write) -> io::Result<()> {
    output.write_all(b"WEBVTT\n")?;

    for cue in cues {
        output.write_all(b"\n")?;
        write_timestamp(&mut output, cue.start_seconds)?;
        output.write_all(b" --> ")?;
        write_timestamp(&mut output, cue.end_seconds)?;
        if let Some(settings) = &cue.settings {
            write!(output, " {settings}")?;
        }
        writeln!(output)?;
        writeln!(output, "{}", cue.text)?;
    }

    Ok(())
}

fn write_timestamp(mut output: impl io::Write, seconds: f64) -> io::Result<()> {
    let seconds = seconds.max(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_millis = (seconds * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = total_millis / 60_000 % 60;
    let secs = total_millis / 1000 % 60;
    let millis = total_millis % 1000;
    write!(output, "{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn sdh_subtitles_carry_both_characteristics() {
        let group = subtitle_group(
            "subs",
            vec![SubtitleEntry {
                name: "English (SDH)".to_owned(),
                language: Some("en".to_owned()),
                uri: "subs/en-sdh.m3u8".to_owned(),
                forced: false,
                sdh: true,
                is_default: false,
            }],
        );

        let RenditionGroup::Subtitles { renditions, .. } = &group else {
            panic!("wrong group type");
        };
        assert_eq!(
            renditions[0].info.characteristics,
            vec![
                TRANSCRIBES_DIALOG.to_owned(),
                DESCRIBES_SOUND.to_owned(),
            ]
        );
    }

    #[rstest]
    fn atmos_rendition_gets_joc_channels() {
        let group = audio_group(
            "atmos",
            vec![AudioEntry {
                name: "English Atmos".to_owned(),
                language: Some("en".to_owned()),
                uri: Some("audio/atmos.m3u8".to_owned()),
                layout: ChannelLayout::Atmos,
                describes_video: false,
                is_default: true,
            }],
        );

        let RenditionGroup::Audio { renditions, .. } = &group else {
            panic!("wrong group type");
        };
        assert_eq!(
            renditions[0].channels,
            Some(AudioChannelInformation::WithAudioCodingIdentifiers {
                number_of_channels: 16,
                audio_coding_identifiers: vec!["JOC".to_owned()],
            })
        );
    }

    #[rstest]
    fn caption_group_serializes_with_instream_ids() {
        let group = closed_caption_group(
            "cc",
            vec![ClosedCaptionEntry {
                name: "English".to_owned(),
                language: Some("en".to_owned()),
                in_stream_id: InStreamId::Cc1,
                is_default: true,
            }],
        );

        let playlist = crate::playlist::MultivariantPlaylist {
            renditions_groups: vec![group],
            ..crate::playlist::MultivariantPlaylist::default()
        };
        let mut output = Vec::new();
        playlist.serialize(&mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains(
            "#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",LANGUAGE=\"en\",NAME=\"English\",DEFAULT=YES,AUTOSELECT=YES,INSTREAM-ID=\"CC1\"\n"
        ));
    }

    #[rstest]
    fn webvtt_always_writes_full_hours() {
        let cues = vec![
            WebVttCue {
                start_seconds: 0.0,
                end_seconds: 2.5,
                settings: None,
                text: "Hello.".to_owned(),
            },
            WebVttCue {
                start_seconds: 3661.25,
                end_seconds: 3662.0,
                settings: Some("align:center".to_owned()),
                text: "An hour in.".to_owned(),
            },
        ];

        let mut output = Vec::new();
        serialize_webvtt(&cues, &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "WEBVTT\n\
             \n\
             00:00:00.000 --> 00:00:02.500\n\
             Hello.\n\
             \n\
             01:01:01.250 --> 01:01:02.000 align:center\n\
             An hour in.\n"
        );
    }
}
