//! Parsing of extended M3U playlist tags.

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

use std::num::NonZeroU8;

use crate::{
    error::{Error, Result},
    AttributeValue, AudioChannelInformation, ByteRange, ByteRangeWithOffset, ClosedCaptionsValue,
    ContentProtectionConfiguration, ContentSteering, DateRange, DateRangeCue,
    DateRangeCuePosition, DefinitionType, DeltaUpdateInfo, EncryptionMethod, FloatOrInteger,
    HdcpLevel, InStreamId, KeyFormat, PlaylistType, PreloadHint, PreloadHintType,
    RenditionPlaybackPriority, RenditionReport, Resolution, SessionData, SessionDataValue,
    StreamInf, SupplementalCodec, UriFormat, VideoChannelSpecifier, VideoRange,
};

use super::{MediaType, Tag};

/// One attribute from an attribute list, with its quoting preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    pub was_quoted: bool,
}

/// Splits an attribute list at top-level commas, respecting double-quoted
/// strings. The HLS spec defines no escaping, so a stray quote inside a
/// quoted value is malformed.
pub fn split_attribute_list(input: &str) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(equals) = rest.find('=') else {
            return Err(Error::MalformedAttributes);
        };
        let name = &rest[..equals];
        if name.is_empty() || name.contains(',') {
            return Err(Error::MalformedAttributes);
        }
        rest = &rest[equals + 1..];

        if let Some(after_quote) = rest.strip_prefix('"') {
            let Some(closing) = after_quote.find('"') else {
                return Err(Error::MalformedAttributes);
            };
            let value = &after_quote[..closing];
            rest = &after_quote[closing + 1..];

            match rest.strip_prefix(',') {
                Some(next) => rest = next,
                None if rest.is_empty() => (),
                None => return Err(Error::MalformedAttributes),
            }

            attributes.push(Attribute {
                name: name.to_owned(),
                value: value.to_owned(),
                was_quoted: true,
            });
        } else {
            let (value, next) = match rest.find(',') {
                Some(comma) => (&rest[..comma], &rest[comma + 1..]),
                None => (rest, ""),
            };
            if value.contains('"') {
                return Err(Error::MalformedAttributes);
            }
            rest = next;

            attributes.push(Attribute {
                name: name.to_owned(),
                value: value.to_owned(),
                was_quoted: false,
            });
        }
    }

    Ok(attributes)
}

fn invalid_attribute(tag: &str, attribute: &str, value: &str) -> Error {
    Error::InvalidAttribute {
        tag: tag.to_owned(),
        attribute: attribute.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_u64(tag: &str, attribute: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| invalid_attribute(tag, attribute, value))
}

fn parse_f64(tag: &str, attribute: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| invalid_attribute(tag, attribute, value))
}

fn parse_yes(value: &str) -> bool {
    value == "YES"
}

fn parse_byte_range(tag: &str, attribute: &str, value: &str) -> Result<ByteRange> {
    let (length, offset) = match value.split_once('@') {
        Some((length, offset)) => (length, Some(offset)),
        None => (value, None),
    };

    Ok(ByteRange {
        length_bytes: parse_u64(tag, attribute, length)?,
        start_offset_bytes: offset
            .map(|offset| parse_u64(tag, attribute, offset))
            .transpose()?,
    })
}

fn parse_byte_range_with_offset(
    tag: &str,
    attribute: &str,
    value: &str,
) -> Result<ByteRangeWithOffset> {
    let Some((length, offset)) = value.split_once('@') else {
        return Err(invalid_attribute(tag, attribute, value));
    };

    Ok(ByteRangeWithOffset {
        length_bytes: parse_u64(tag, attribute, length)?,
        start_offset_bytes: parse_u64(tag, attribute, offset)?,
    })
}

fn parse_date(
    tag: &str,
    attribute: &str,
    value: &str,
) -> Result<chrono::DateTime<chrono::FixedOffset>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map_err(|_| invalid_attribute(tag, attribute, value))
}

fn parse_hex_sequence(tag: &str, attribute: &str, value: &str) -> Result<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| invalid_attribute(tag, attribute, value))?;
    hex::decode(digits).map_err(|_| invalid_attribute(tag, attribute, value))
}

fn parse_iv(tag: &str, value: &str) -> Result<u128> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| invalid_attribute(tag, "IV", value))?;
    u128::from_str_radix(digits, 16).map_err(|_| invalid_attribute(tag, "IV", value))
}

fn parse_encryption_method(tag: &str, attributes: &[Attribute]) -> Result<Option<EncryptionMethod>> {
    let mut method = None;
    let mut uri = None;
    let mut iv = None;
    let mut key_format = KeyFormat::Identity;
    let mut key_format_versions = Vec::new();

    for attribute in attributes {
        match attribute.name.as_str() {
            "METHOD" => method = Some(attribute.value.clone()),
            "URI" => uri = Some(attribute.value.clone()),
            "IV" => iv = Some(parse_iv(tag, &attribute.value)?),
            "KEYFORMAT" => {
                if attribute.value != "identity" {
                    key_format = KeyFormat::Other(attribute.value.clone());
                }
            }
            "KEYFORMATVERSIONS" => {
                for version in attribute.value.split('/') {
                    key_format_versions.push(parse_u64(tag, "KEYFORMATVERSIONS", version)?);
                }
            }
            _ => (),
        }
    }

    let Some(method) = method else {
        return Err(invalid_attribute(tag, "METHOD", ""));
    };

    let require_uri = |uri: Option<String>| {
        uri.ok_or_else(|| invalid_attribute(tag, "URI", ""))
    };

    match method.as_str() {
        "NONE" => Ok(None),
        "AES-128" => Ok(Some(EncryptionMethod::Aes128 {
            uri: require_uri(uri)?,
            iv,
            key_format,
            key_format_versions,
        })),
        "SAMPLE-AES" => Ok(Some(EncryptionMethod::SampleAes {
            uri: require_uri(uri)?,
            iv,
            key_format,
            key_format_versions,
        })),
        "SAMPLE-AES-CTR" => Ok(Some(EncryptionMethod::SampleAesCtr {
            uri: require_uri(uri)?,
            key_format,
            key_format_versions,
        })),
        other => Err(invalid_attribute(tag, "METHOD", other)),
    }
}

fn parse_resolution(tag: &str, value: &str) -> Result<Resolution> {
    let Some((width, height)) = value.split_once('x') else {
        return Err(invalid_attribute(tag, "RESOLUTION", value));
    };

    Ok(Resolution {
        width: parse_u64(tag, "RESOLUTION", width)?,
        height: parse_u64(tag, "RESOLUTION", height)?,
    })
}

fn parse_supplemental_codecs(value: &str) -> Vec<SupplementalCodec> {
    value
        .split(',')
        .map(|entry| {
            let mut parts = entry.split('/');
            SupplementalCodec {
                supplemental_codec: parts.next().unwrap_or_default().to_owned(),
                compatibility_brands: parts.map(ToOwned::to_owned).collect(),
            }
        })
        .collect()
}

fn parse_allowed_cpc(value: &str) -> Vec<ContentProtectionConfiguration> {
    value
        .split(',')
        .filter_map(|entry| {
            let (key_format, labels) = entry.split_once(':')?;
            Some(ContentProtectionConfiguration {
                key_format: key_format.to_owned(),
                cpc_labels: labels.split('/').map(ToOwned::to_owned).collect(),
            })
        })
        .collect()
}

/// Parses the shared EXT-X-STREAM-INF / EXT-X-I-FRAME-STREAM-INF attributes.
fn parse_stream_inf(tag: &str, attributes: &[Attribute]) -> Result<StreamInf> {
    let mut stream_inf = StreamInf::default();
    let mut saw_bandwidth = false;

    for attribute in attributes {
        let value = attribute.value.as_str();
        match attribute.name.as_str() {
            "BANDWIDTH" => {
                stream_inf.bandwidth_bits_per_second = parse_u64(tag, "BANDWIDTH", value)?;
                saw_bandwidth = true;
            }
            "AVERAGE-BANDWIDTH" => {
                stream_inf.average_bandwidth_bits_per_second =
                    Some(parse_u64(tag, "AVERAGE-BANDWIDTH", value)?);
            }
            "SCORE" => stream_inf.score = Some(parse_f64(tag, "SCORE", value)?),
            "CODECS" => {
                stream_inf.codecs = value.split(',').map(ToOwned::to_owned).collect();
            }
            "SUPPLEMENTAL-CODECS" => {
                stream_inf.supplemental_codecs = parse_supplemental_codecs(value);
            }
            "RESOLUTION" => stream_inf.resolution = Some(parse_resolution(tag, value)?),
            "FRAME-RATE" => stream_inf.frame_rate = Some(parse_f64(tag, "FRAME-RATE", value)?),
            "HDCP-LEVEL" => {
                stream_inf.hdcp_level = Some(match value {
                    "NONE" => HdcpLevel::None,
                    "TYPE-0" => HdcpLevel::Type0,
                    "TYPE-1" => HdcpLevel::Type1,
                    other => return Err(invalid_attribute(tag, "HDCP-LEVEL", other)),
                });
            }
            "ALLOWED-CPC" => stream_inf.allowed_cpc = parse_allowed_cpc(value),
            "VIDEO-RANGE" => {
                stream_inf.video_range = match value {
                    "SDR" => VideoRange::Sdr,
                    "HLG" => VideoRange::Hlg,
                    "PQ" => VideoRange::Pq,
                    other => VideoRange::Other(other.to_owned()),
                };
            }
            "REQ-VIDEO-LAYOUT" => {
                let mut layout = Vec::new();
                for specifier in value.split(',') {
                    layout.push(match specifier {
                        "CH-STEREO" => VideoChannelSpecifier::Stereo,
                        "CH-MONO" => VideoChannelSpecifier::Mono,
                        other => return Err(invalid_attribute(tag, "REQ-VIDEO-LAYOUT", other)),
                    });
                }
                stream_inf.required_video_layout = layout;
            }
            "STABLE-VARIANT-ID" => stream_inf.stable_variant_id = Some(value.to_owned()),
            "PATHWAY-ID" => stream_inf.pathway_id = Some(value.to_owned()),
            _ => (),
        }
    }

    if !saw_bandwidth {
        return Err(invalid_attribute(tag, "BANDWIDTH", ""));
    }

    Ok(stream_inf)
}

fn parse_in_stream_id(tag: &str, value: &str) -> Result<InStreamId> {
    Ok(match value {
        "CC1" => InStreamId::Cc1,
        "CC2" => InStreamId::Cc2,
        "CC3" => InStreamId::Cc3,
        "CC4" => InStreamId::Cc4,
        other => {
            let service = other
                .strip_prefix("SERVICE")
                .and_then(|n| n.parse::<NonZeroU8>().ok())
                .filter(|n| n.get() <= 63)
                .ok_or_else(|| invalid_attribute(tag, "INSTREAM-ID", other))?;
            InStreamId::Service(service)
        }
    })
}

fn parse_channels(tag: &str, value: &str) -> Result<AudioChannelInformation> {
    let mut parts = value.split('/');
    let number_of_channels = parse_u64(tag, "CHANNELS", parts.next().unwrap_or_default())?;

    let Some(identifiers) = parts.next() else {
        return Ok(AudioChannelInformation::NumberOfChannelsOnly { number_of_channels });
    };
    let audio_coding_identifiers = if identifiers == "-" {
        vec![]
    } else {
        identifiers.split(',').map(ToOwned::to_owned).collect()
    };

    let Some(special_usage) = parts.next() else {
        return Ok(AudioChannelInformation::WithAudioCodingIdentifiers {
            number_of_channels,
            audio_coding_identifiers,
        });
    };

    let mut binaural = false;
    let mut immersive = false;
    let mut downmix = false;
    for identifier in special_usage.split(',') {
        match identifier {
            "BINAURAL" => binaural = true,
            "IMMERSIVE" => immersive = true,
            "DOWNMIX" => downmix = true,
            other => return Err(invalid_attribute(tag, "CHANNELS", other)),
        }
    }

    Ok(AudioChannelInformation::WithSpecialUsageIdentifiers {
        number_of_channels,
        audio_coding_identifiers,
        binaural,
        immersive,
        downmix,
    })
}

fn parse_x_media(attributes: &[Attribute]) -> Result<Tag> {
    const TAG: &str = "EXT-X-MEDIA";

    let mut media_type = None;
    let mut uri = None;
    let mut group_id = None;
    let mut language = None;
    let mut assoc_language = None;
    let mut name = None;
    let mut stable_rendition_id = None;
    let mut is_default = false;
    let mut autoselect = false;
    let mut forced = false;
    let mut in_stream_id = None;
    let mut bit_depth = None;
    let mut sample_rate = None;
    let mut characteristics = Vec::new();
    let mut channels = None;

    for attribute in attributes {
        let value = attribute.value.as_str();
        match attribute.name.as_str() {
            "TYPE" => media_type = Some(value.to_owned()),
            "URI" => uri = Some(value.to_owned()),
            "GROUP-ID" => group_id = Some(value.to_owned()),
            "LANGUAGE" => language = Some(value.to_owned()),
            "ASSOC-LANGUAGE" => assoc_language = Some(value.to_owned()),
            "NAME" => name = Some(value.to_owned()),
            "STABLE-RENDITION-ID" => stable_rendition_id = Some(value.to_owned()),
            "DEFAULT" => is_default = parse_yes(value),
            "AUTOSELECT" => autoselect = parse_yes(value),
            "FORCED" => forced = parse_yes(value),
            "INSTREAM-ID" => in_stream_id = Some(parse_in_stream_id(TAG, value)?),
            "BIT-DEPTH" => bit_depth = Some(parse_u64(TAG, "BIT-DEPTH", value)?),
            "SAMPLE-RATE" => sample_rate = Some(parse_u64(TAG, "SAMPLE-RATE", value)?),
            "CHARACTERISTICS" => {
                characteristics = value.split(',').map(ToOwned::to_owned).collect();
            }
            "CHANNELS" => channels = Some(parse_channels(TAG, value)?),
            _ => (),
        }
    }

    let media_type = match media_type.as_deref() {
        Some("AUDIO") => MediaType::Audio {
            uri,
            channels,
            bit_depth,
            sample_rate,
        },
        Some("VIDEO") => MediaType::Video { uri },
        Some("SUBTITLES") => MediaType::Subtitles {
            uri: uri.ok_or_else(|| invalid_attribute(TAG, "URI", ""))?,
            forced,
        },
        Some("CLOSED-CAPTIONS") => MediaType::ClosedCaptions {
            in_stream_id: in_stream_id
                .ok_or_else(|| invalid_attribute(TAG, "INSTREAM-ID", ""))?,
        },
        other => return Err(invalid_attribute(TAG, "TYPE", other.unwrap_or_default())),
    };

    let playback_priority = if is_default {
        RenditionPlaybackPriority::Default
    } else if autoselect {
        RenditionPlaybackPriority::AutoSelect
    } else {
        RenditionPlaybackPriority::None
    };

    Ok(Tag::XMedia {
        media_type,
        group_id: group_id.ok_or_else(|| invalid_attribute(TAG, "GROUP-ID", ""))?,
        language,
        assoc_language,
        name: name.ok_or_else(|| invalid_attribute(TAG, "NAME", ""))?,
        stable_rendition_id,
        playback_priority,
        characteristics,
    })
}

fn parse_x_stream_inf(attributes: &[Attribute]) -> Result<Tag> {
    const TAG: &str = "EXT-X-STREAM-INF";

    let stream_inf = parse_stream_inf(TAG, attributes)?;
    let mut audio_group_id = None;
    let mut video_group_id = None;
    let mut subtitles_group_id = None;
    let mut closed_captions = ClosedCaptionsValue::Omitted;

    for attribute in attributes {
        match attribute.name.as_str() {
            "AUDIO" => audio_group_id = Some(attribute.value.clone()),
            "VIDEO" => video_group_id = Some(attribute.value.clone()),
            "SUBTITLES" => subtitles_group_id = Some(attribute.value.clone()),
            "CLOSED-CAPTIONS" => {
                closed_captions = if attribute.was_quoted {
                    ClosedCaptionsValue::GroupId(attribute.value.clone())
                } else if attribute.value == "NONE" {
                    ClosedCaptionsValue::None
                } else {
                    return Err(invalid_attribute(TAG, "CLOSED-CAPTIONS", &attribute.value));
                };
            }
            _ => (),
        }
    }

    Ok(Tag::XStreamInf {
        stream_inf,
        audio_group_id,
        video_group_id,
        subtitles_group_id,
        closed_captions,
        // The URI comes from the following line; the playlist parser
        // fills it in.
        uri: String::new(),
    })
}

fn parse_x_daterange(attributes: &[Attribute]) -> Result<Tag> {
    const TAG: &str = "EXT-X-DATERANGE";

    let mut id = None;
    let mut class = None;
    let mut start_date = None;
    let mut cue = None;
    let mut end_date = None;
    let mut duration_seconds = None;
    let mut planned_duration_seconds = None;
    let mut client_attributes = std::collections::BTreeMap::new();
    let mut scte35_cmd = Vec::new();
    let mut scte35_in = Vec::new();
    let mut scte35_out = Vec::new();
    let mut end_on_next = false;

    for attribute in attributes {
        let value = attribute.value.as_str();
        match attribute.name.as_str() {
            "ID" => id = Some(value.to_owned()),
            "CLASS" => class = Some(value.to_owned()),
            "START-DATE" => start_date = Some(parse_date(TAG, "START-DATE", value)?),
            "CUE" => {
                let mut once = false;
                let mut position = DateRangeCuePosition::Neither;
                for part in value.split(',').filter(|part| !part.is_empty()) {
                    match part {
                        "ONCE" => once = true,
                        "PRE" => position = DateRangeCuePosition::Pre,
                        "POST" => position = DateRangeCuePosition::Post,
                        other => return Err(invalid_attribute(TAG, "CUE", other)),
                    }
                }
                cue = Some(DateRangeCue { once, position });
            }
            "END-DATE" => end_date = Some(parse_date(TAG, "END-DATE", value)?),
            "DURATION" => duration_seconds = Some(parse_f64(TAG, "DURATION", value)?),
            "PLANNED-DURATION" => {
                planned_duration_seconds = Some(parse_f64(TAG, "PLANNED-DURATION", value)?);
            }
            "SCTE35-CMD" => scte35_cmd = parse_hex_sequence(TAG, "SCTE35-CMD", value)?,
            "SCTE35-IN" => scte35_in = parse_hex_sequence(TAG, "SCTE35-IN", value)?,
            "SCTE35-OUT" => scte35_out = parse_hex_sequence(TAG, "SCTE35-OUT", value)?,
            "END-ON-NEXT" => end_on_next = parse_yes(value),
            name => {
                if let Some(client_name) = name.strip_prefix("X-") {
                    let parsed = if attribute.was_quoted {
                        AttributeValue::String(value.to_owned())
                    } else if value.starts_with("0x") || value.starts_with("0X") {
                        AttributeValue::Bytes(parse_hex_sequence(TAG, name, value)?)
                    } else {
                        AttributeValue::Float(parse_f64(TAG, name, value)?)
                    };
                    client_attributes.insert(client_name.to_owned(), parsed);
                }
            }
        }
    }

    Ok(Tag::XDateRange(DateRange {
        id: id.ok_or_else(|| invalid_attribute(TAG, "ID", ""))?,
        class,
        start_date: start_date.ok_or_else(|| invalid_attribute(TAG, "START-DATE", ""))?,
        cue,
        end_date,
        duration_seconds,
        planned_duration_seconds,
        client_attributes,
        scte35_cmd,
        scte35_in,
        scte35_out,
        end_on_next,
    }))
}

fn parse_x_define(attributes: &[Attribute]) -> Result<Tag> {
    const TAG: &str = "EXT-X-DEFINE";

    let mut name = None;
    let mut value = None;
    let mut import = None;
    let mut query_parameter = None;

    for attribute in attributes {
        match attribute.name.as_str() {
            "NAME" => name = Some(attribute.value.clone()),
            "VALUE" => value = Some(attribute.value.clone()),
            "IMPORT" => import = Some(attribute.value.clone()),
            "QUERYPARAM" => query_parameter = Some(attribute.value.clone()),
            _ => (),
        }
    }

    if let Some(name) = name {
        return Ok(Tag::XDefine(DefinitionType::Inline {
            name,
            value: value.ok_or_else(|| invalid_attribute(TAG, "VALUE", ""))?,
        }));
    }
    if let Some(name) = import {
        return Ok(Tag::XDefine(DefinitionType::Import { name }));
    }
    if let Some(name) = query_parameter {
        return Ok(Tag::XDefine(DefinitionType::QueryParameter { name }));
    }

    Err(invalid_attribute(TAG, "NAME", ""))
}

fn parse_x_session_data(attributes: &[Attribute]) -> Result<Tag> {
    const TAG: &str = "EXT-X-SESSION-DATA";

    let mut data_id = None;
    let mut value = None;
    let mut language = None;
    let mut uri = None;
    let mut format = UriFormat::Json;

    for attribute in attributes {
        match attribute.name.as_str() {
            "DATA-ID" => data_id = Some(attribute.value.clone()),
            "VALUE" => value = Some(attribute.value.clone()),
            "LANGUAGE" => language = Some(attribute.value.clone()),
            "URI" => uri = Some(attribute.value.clone()),
            "FORMAT" => {
                format = match attribute.value.as_str() {
                    "JSON" => UriFormat::Json,
                    "RAW" => UriFormat::Raw,
                    other => return Err(invalid_attribute(TAG, "FORMAT", other)),
                };
            }
            _ => (),
        }
    }

    let session_value = if let Some(uri) = uri {
        SessionDataValue::Uri { uri, format }
    } else {
        SessionDataValue::Value {
            value: value.ok_or_else(|| invalid_attribute(TAG, "VALUE", ""))?,
            language,
        }
    };

    Ok(Tag::XSessionData(SessionData {
        data_id: data_id.ok_or_else(|| invalid_attribute(TAG, "DATA-ID", ""))?,
        value: session_value,
    }))
}

impl Tag {
    /// Parses a single tag line.
    ///
    /// Returns `Ok(None)` for unrecognized `#EXT` lines so callers can
    /// preserve them verbatim. An `EXT-X-STREAM-INF` result carries an
    /// empty URI; the playlist parser attaches the following line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTag`], [`Error::InvalidAttribute`] or
    /// [`Error::MalformedAttributes`] when the line is recognized but
    /// unparseable.
    pub fn parse(line: &str, line_number: usize) -> Result<Option<Self>> {
        let invalid_tag = || Error::InvalidTag {
            line_number,
            line: line.to_owned(),
        };

        match line {
            "#EXTM3U" => return Ok(Some(Self::M3u)),
            "#EXT-X-INDEPENDENT-SEGMENTS" => return Ok(Some(Self::XIndependentSegments)),
            "#EXT-X-DISCONTINUITY" => return Ok(Some(Self::XDiscontinuity)),
            "#EXT-X-GAP" => return Ok(Some(Self::XGap)),
            "#EXT-X-ENDLIST" => return Ok(Some(Self::XEndList)),
            "#EXT-X-I-FRAMES-ONLY" => return Ok(Some(Self::XIFramesOnly)),
            _ => (),
        }

        let Some((name, value)) = line.split_once(':') else {
            return Ok(None);
        };

        let tag = match name {
            "#EXT-X-VERSION" => Self::XVersion {
                version: value.parse().map_err(|_| invalid_tag())?,
            },
            "#EXTINF" => {
                let (duration, title) = match value.split_once(',') {
                    Some((duration, title)) => (duration, title),
                    None => (value, ""),
                };
                let duration_seconds = if duration.contains('.') {
                    FloatOrInteger::Float(duration.parse().map_err(|_| invalid_tag())?)
                } else {
                    FloatOrInteger::Integer(duration.parse().map_err(|_| invalid_tag())?)
                };
                Self::Inf {
                    duration_seconds,
                    title: title.to_owned(),
                }
            }
            "#EXT-X-BYTERANGE" => {
                Self::XByterange(parse_byte_range("EXT-X-BYTERANGE", "BYTERANGE", value)?)
            }
            "#EXT-X-BITRATE" => Self::XBitrate {
                kbps: value.parse().map_err(|_| invalid_tag())?,
            },
            "#EXT-X-TARGETDURATION" => Self::XTargetDuration {
                target_duration_seconds: value.parse().map_err(|_| invalid_tag())?,
            },
            "#EXT-X-MEDIA-SEQUENCE" => Self::XMediaSequence {
                sequence_number: value.parse().map_err(|_| invalid_tag())?,
            },
            "#EXT-X-DISCONTINUITY-SEQUENCE" => Self::XDiscontinuitySequence {
                sequence_number: value.parse().map_err(|_| invalid_tag())?,
            },
            "#EXT-X-PLAYLIST-TYPE" => Self::XPlaylistType(match value {
                "EVENT" => PlaylistType::Event,
                "VOD" => PlaylistType::Vod,
                _ => return Err(invalid_tag()),
            }),
            "#EXT-X-PROGRAM-DATE-TIME" => Self::XProgramDateTime(
                chrono::DateTime::parse_from_rfc3339(value).map_err(|_| invalid_tag())?,
            ),
            "#EXT-X-KEY" => {
                let attributes = split_attribute_list(value)?;
                Self::XKey(parse_encryption_method("EXT-X-KEY", &attributes)?)
            }
            "#EXT-X-SESSION-KEY" => {
                let attributes = split_attribute_list(value)?;
                let method = parse_encryption_method("EXT-X-SESSION-KEY", &attributes)?
                    .ok_or_else(|| invalid_attribute("EXT-X-SESSION-KEY", "METHOD", "NONE"))?;
                Self::XSessionKey(method)
            }
            "#EXT-X-MAP" => {
                let attributes = split_attribute_list(value)?;
                let mut uri = None;
                let mut range = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "URI" => uri = Some(attribute.value.clone()),
                        "BYTERANGE" => {
                            range = Some(parse_byte_range_with_offset(
                                "EXT-X-MAP",
                                "BYTERANGE",
                                &attribute.value,
                            )?);
                        }
                        _ => (),
                    }
                }
                Self::XMap {
                    uri: uri.ok_or_else(|| invalid_attribute("EXT-X-MAP", "URI", ""))?,
                    range,
                }
            }
            "#EXT-X-PART" => {
                const TAG: &str = "EXT-X-PART";
                let attributes = split_attribute_list(value)?;
                let mut uri = None;
                let mut duration_seconds = None;
                let mut is_independent = false;
                let mut byte_range = None;
                let mut is_gap = false;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "URI" => uri = Some(attribute.value.clone()),
                        "DURATION" => {
                            duration_seconds =
                                Some(parse_f64(TAG, "DURATION", &attribute.value)?);
                        }
                        "INDEPENDENT" => is_independent = parse_yes(&attribute.value),
                        "BYTERANGE" => {
                            byte_range =
                                Some(parse_byte_range(TAG, "BYTERANGE", &attribute.value)?);
                        }
                        "GAP" => is_gap = parse_yes(&attribute.value),
                        _ => (),
                    }
                }
                Self::XPart {
                    uri: uri.ok_or_else(|| invalid_attribute(TAG, "URI", ""))?,
                    duration_seconds: duration_seconds
                        .ok_or_else(|| invalid_attribute(TAG, "DURATION", ""))?,
                    is_independent,
                    byte_range,
                    is_gap,
                }
            }
            "#EXT-X-PART-INF" => {
                const TAG: &str = "EXT-X-PART-INF";
                let attributes = split_attribute_list(value)?;
                let part_target = attributes
                    .iter()
                    .find(|attribute| attribute.name == "PART-TARGET")
                    .ok_or_else(|| invalid_attribute(TAG, "PART-TARGET", ""))?;
                Self::XPartInf {
                    part_target_duration_seconds: parse_f64(
                        TAG,
                        "PART-TARGET",
                        &part_target.value,
                    )?,
                }
            }
            "#EXT-X-SERVER-CONTROL" => {
                const TAG: &str = "EXT-X-SERVER-CONTROL";
                let attributes = split_attribute_list(value)?;
                let mut can_block_reload = false;
                let mut skip_boundary = None;
                let mut can_skip_dateranges = false;
                let mut hold_back = None;
                let mut part_hold_back = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "CAN-BLOCK-RELOAD" => can_block_reload = parse_yes(&attribute.value),
                        "CAN-SKIP-UNTIL" => {
                            skip_boundary =
                                Some(parse_f64(TAG, "CAN-SKIP-UNTIL", &attribute.value)?);
                        }
                        "CAN-SKIP-DATERANGES" => {
                            can_skip_dateranges = parse_yes(&attribute.value);
                        }
                        "HOLD-BACK" => {
                            hold_back = Some(parse_f64(TAG, "HOLD-BACK", &attribute.value)?);
                        }
                        "PART-HOLD-BACK" => {
                            part_hold_back =
                                Some(parse_f64(TAG, "PART-HOLD-BACK", &attribute.value)?);
                        }
                        _ => (),
                    }
                }
                Self::XServerControl {
                    can_block_reload,
                    delta_update_info: skip_boundary.map(|skip_boundary_seconds| {
                        DeltaUpdateInfo {
                            skip_boundary_seconds,
                            can_skip_dateranges,
                        }
                    }),
                    hold_back,
                    part_hold_back,
                }
            }
            "#EXT-X-START" => {
                const TAG: &str = "EXT-X-START";
                let attributes = split_attribute_list(value)?;
                let mut offset_seconds = None;
                let mut is_precise = false;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "TIME-OFFSET" => {
                            offset_seconds =
                                Some(parse_f64(TAG, "TIME-OFFSET", &attribute.value)?);
                        }
                        "PRECISE" => is_precise = parse_yes(&attribute.value),
                        _ => (),
                    }
                }
                Self::XStart {
                    offset_seconds: offset_seconds
                        .ok_or_else(|| invalid_attribute(TAG, "TIME-OFFSET", ""))?,
                    is_precise,
                }
            }
            "#EXT-X-DEFINE" => parse_x_define(&split_attribute_list(value)?)?,
            "#EXT-X-MEDIA" => parse_x_media(&split_attribute_list(value)?)?,
            "#EXT-X-STREAM-INF" => parse_x_stream_inf(&split_attribute_list(value)?)?,
            "#EXT-X-I-FRAME-STREAM-INF" => {
                const TAG: &str = "EXT-X-I-FRAME-STREAM-INF";
                let attributes = split_attribute_list(value)?;
                let stream_inf = parse_stream_inf(TAG, &attributes)?;
                let mut video_group_id = None;
                let mut uri = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "VIDEO" => video_group_id = Some(attribute.value.clone()),
                        "URI" => uri = Some(attribute.value.clone()),
                        _ => (),
                    }
                }
                Self::XIFrameStreamInf {
                    stream_inf,
                    video_group_id,
                    uri: uri.ok_or_else(|| invalid_attribute(TAG, "URI", ""))?,
                }
            }
            "#EXT-X-SESSION-DATA" => parse_x_session_data(&split_attribute_list(value)?)?,
            "#EXT-X-CONTENT-STEERING" => {
                const TAG: &str = "EXT-X-CONTENT-STEERING";
                let attributes = split_attribute_list(value)?;
                let mut server_uri = None;
                let mut pathway_id = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "SERVER-URI" => server_uri = Some(attribute.value.clone()),
                        "PATHWAY-ID" => pathway_id = Some(attribute.value.clone()),
                        _ => (),
                    }
                }
                Self::XContentSteering(ContentSteering {
                    server_uri: server_uri
                        .ok_or_else(|| invalid_attribute(TAG, "SERVER-URI", ""))?,
                    pathway_id,
                })
            }
            "#EXT-X-DATERANGE" => parse_x_daterange(&split_attribute_list(value)?)?,
            "#EXT-X-SKIP" => {
                const TAG: &str = "EXT-X-SKIP";
                let attributes = split_attribute_list(value)?;
                let mut number_of_skipped_segments = None;
                let mut recently_removed_dataranges = Vec::new();
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "SKIPPED-SEGMENTS" => {
                            number_of_skipped_segments =
                                Some(parse_u64(TAG, "SKIPPED-SEGMENTS", &attribute.value)?);
                        }
                        "RECENTLY-REMOVED-DATERANGES" => {
                            recently_removed_dataranges =
                                attribute.value.split('\t').map(ToOwned::to_owned).collect();
                        }
                        _ => (),
                    }
                }
                Self::XSkip {
                    number_of_skipped_segments: number_of_skipped_segments
                        .ok_or_else(|| invalid_attribute(TAG, "SKIPPED-SEGMENTS", ""))?,
                    recently_removed_dataranges,
                }
            }
            "#EXT-X-PRELOAD-HINT" => {
                const TAG: &str = "EXT-X-PRELOAD-HINT";
                let attributes = split_attribute_list(value)?;
                let mut hint_type = None;
                let mut uri = None;
                let mut start_byte_offset = 0;
                let mut length_in_bytes = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "TYPE" => {
                            hint_type = Some(match attribute.value.as_str() {
                                "PART" => PreloadHintType::Part,
                                "MAP" => PreloadHintType::Map,
                                other => return Err(invalid_attribute(TAG, "TYPE", other)),
                            });
                        }
                        "URI" => uri = Some(attribute.value.clone()),
                        "BYTERANGE-START" => {
                            start_byte_offset =
                                parse_u64(TAG, "BYTERANGE-START", &attribute.value)?;
                        }
                        "BYTERANGE-LENGTH" => {
                            length_in_bytes =
                                Some(parse_u64(TAG, "BYTERANGE-LENGTH", &attribute.value)?);
                        }
                        _ => (),
                    }
                }
                Self::XPreloadHint(PreloadHint {
                    hint_type: hint_type.ok_or_else(|| invalid_attribute(TAG, "TYPE", ""))?,
                    uri: uri.ok_or_else(|| invalid_attribute(TAG, "URI", ""))?,
                    start_byte_offset,
                    length_in_bytes,
                })
            }
            "#EXT-X-RENDITION-REPORT" => {
                const TAG: &str = "EXT-X-RENDITION-REPORT";
                let attributes = split_attribute_list(value)?;
                let mut uri = None;
                let mut last_sequence_number = None;
                let mut last_part_index = None;
                for attribute in &attributes {
                    match attribute.name.as_str() {
                        "URI" => uri = Some(attribute.value.clone()),
                        "LAST-MSN" => {
                            last_sequence_number =
                                Some(parse_u64(TAG, "LAST-MSN", &attribute.value)?);
                        }
                        "LAST-PART" => {
                            last_part_index =
                                Some(parse_u64(TAG, "LAST-PART", &attribute.value)?);
                        }
                        _ => (),
                    }
                }
                Self::XRenditionReport(RenditionReport {
                    uri: uri.ok_or_else(|| invalid_attribute(TAG, "URI", ""))?,
                    last_sequence_number,
                    last_part_index,
                })
            }
            _ => return Ok(None),
        };

        Ok(Some(tag))
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn split_respects_quotes() {
        let attributes =
            split_attribute_list("BANDWIDTH=800000,CODECS=\"avc1.64001f,mp4a.40.2\",GAP=YES")
                .unwrap();
        assert_eq!(
            attributes,
            vec![
                Attribute {
                    name: "BANDWIDTH".into(),
                    value: "800000".into(),
                    was_quoted: false,
                },
                Attribute {
                    name: "CODECS".into(),
                    value: "avc1.64001f,mp4a.40.2".into(),
                    was_quoted: true,
                },
                Attribute {
                    name: "GAP".into(),
                    value: "YES".into(),
                    was_quoted: false,
                },
            ]
        );
    }

    #[rstest]
    #[case("URI=\"unterminated")]
    #[case("URI=\"stray\"inside\"")]
    #[case("NOVALUE")]
    fn split_rejects_malformed(#[case] input: &str) {
        assert_eq!(
            split_attribute_list(input).unwrap_err(),
            Error::MalformedAttributes
        );
    }

    #[rstest]
    fn parse_inf_keeps_integer_and_float_apart() {
        assert_eq!(
            Tag::parse("#EXTINF:6,", 4).unwrap(),
            Some(Tag::Inf {
                duration_seconds: FloatOrInteger::Integer(6),
                title: String::new(),
            })
        );
        assert_eq!(
            Tag::parse("#EXTINF:9.009,some title", 4).unwrap(),
            Some(Tag::Inf {
                duration_seconds: FloatOrInteger::Float(9.009),
                title: "some title".into(),
            })
        );
    }

    #[rstest]
    fn parse_key_none_forbids_nothing_else() {
        assert_eq!(
            Tag::parse("#EXT-X-KEY:METHOD=NONE", 7).unwrap(),
            Some(Tag::XKey(None))
        );
    }

    #[rstest]
    fn parse_key_aes128_round_trips_iv() {
        let tag = Tag::parse(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"https://example.com/key\",IV=0x0000000000000000000000000F91DC05",
            7,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            tag,
            Tag::XKey(Some(EncryptionMethod::Aes128 {
                uri: "https://example.com/key".into(),
                iv: Some(0x0F91_DC05),
                key_format: KeyFormat::Identity,
                key_format_versions: vec![],
            }))
        );
    }

    #[rstest]
    fn parse_stream_inf_closed_captions_states() {
        let quoted = Tag::parse("#EXT-X-STREAM-INF:BANDWIDTH=1,CLOSED-CAPTIONS=\"cc\"", 2)
            .unwrap()
            .unwrap();
        let Tag::XStreamInf {
            closed_captions, ..
        } = quoted
        else {
            panic!("wrong tag");
        };
        assert_eq!(closed_captions, ClosedCaptionsValue::GroupId("cc".into()));

        let none = Tag::parse("#EXT-X-STREAM-INF:BANDWIDTH=1,CLOSED-CAPTIONS=NONE", 2)
            .unwrap()
            .unwrap();
        let Tag::XStreamInf {
            closed_captions, ..
        } = none
        else {
            panic!("wrong tag");
        };
        assert_eq!(closed_captions, ClosedCaptionsValue::None);

        let omitted = Tag::parse("#EXT-X-STREAM-INF:BANDWIDTH=1", 2).unwrap().unwrap();
        let Tag::XStreamInf {
            closed_captions, ..
        } = omitted
        else {
            panic!("wrong tag");
        };
        assert_eq!(closed_captions, ClosedCaptionsValue::Omitted);
    }

    #[rstest]
    fn parse_stream_inf_requires_bandwidth() {
        assert!(matches!(
            Tag::parse("#EXT-X-STREAM-INF:RESOLUTION=1920x1080", 2),
            Err(Error::InvalidAttribute { .. })
        ));
    }

    #[rstest]
    fn parse_unknown_tag_is_preserved_by_caller() {
        assert_eq!(Tag::parse("#EXT-X-FUTURE-FEATURE:WAT=1", 3).unwrap(), None);
    }

    #[rstest]
    fn parse_unparseable_recognized_attribute_fails() {
        assert_eq!(
            Tag::parse("#EXT-X-STREAM-INF:BANDWIDTH=very-fast", 2).unwrap_err(),
            Error::InvalidAttribute {
                tag: "EXT-X-STREAM-INF".into(),
                attribute: "BANDWIDTH".into(),
                value: "very-fast".into(),
            }
        );
    }

    #[rstest]
    fn parse_server_control() {
        assert_eq!(
            Tag::parse(
                "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK=3.012",
                2
            )
            .unwrap(),
            Some(Tag::XServerControl {
                can_block_reload: true,
                delta_update_info: None,
                hold_back: None,
                part_hold_back: Some(3.012),
            })
        );
    }

    #[rstest]
    fn parse_media_closed_captions_requires_instream_id() {
        assert!(matches!(
            Tag::parse(
                "#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"English\"",
                2
            ),
            Err(Error::InvalidAttribute { .. })
        ));
    }
}
