//! MPEG-TS emission: 188-byte packets with PAT, PMT and PES streams.

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

use bytes::{BufMut, BytesMut};

use crate::{
    error::{Error, Result},
    media::MediaTimestamp,
    mp4::{FourCc, SampleInfo, Track},
};

use super::{sample_bytes, PlannedSegment, SegmentData, SegmentationResult};

const PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;

const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x0100;
const AUDIO_PID: u16 = 0x0101;

const VIDEO_STREAM_ID: u8 = 0xE0;
const AUDIO_STREAM_ID: u8 = 0xC0;

const PCR_CLOCK: u64 = 90_000;

fn stream_type_for(codec: Option<FourCc>) -> Result<u8> {
    let Some(codec) = codec else {
        return Err(Error::UnsupportedConfiguration(
            "track has no sample description".to_owned(),
        ));
    };
    Ok(match codec.as_bytes() {
        b"avc1" | b"avc3" => 0x1B,
        b"hvc1" | b"hev1" => 0x24,
        b"mp4a" => 0x0F,
        b"ac-3" => 0x81,
        b"ec-3" => 0x87,
        _ => {
            return Err(Error::UnsupportedConfiguration(format!(
                "codec {codec} cannot be carried in MPEG-TS"
            )))
        }
    })
}

/// MPEG-2 CRC-32: polynomial 0x04C11DB7, initial value all ones, no
/// reflection and no final xor.
fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for byte in data {
        crc ^= u32::from(*byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Default)]
struct ContinuityCounters {
    pat: u8,
    pmt: u8,
    video: u8,
    audio: u8,
}

impl ContinuityCounters {
    fn next(&mut self, pid: u16) -> u8 {
        let counter = match pid {
            PAT_PID => &mut self.pat,
            PMT_PID => &mut self.pmt,
            VIDEO_PID => &mut self.video,
            _ => &mut self.audio,
        };
        let value = *counter;
        *counter = (*counter + 1) & 0x0F;
        value
    }
}

pub(crate) fn emit(
    data: &[u8],
    primary: &Track,
    audio: Option<&Track>,
    planned: &[PlannedSegment],
) -> Result<SegmentationResult> {
    let primary_stream_type = stream_type_for(primary.codec)?;
    let audio_stream_type = audio
        .map(|track| stream_type_for(track.codec))
        .transpose()?;

    let mut counters = ContinuityCounters::default();
    let mut media_segments = Vec::with_capacity(planned.len());

    for plan in planned {
        let mut buffer = BytesMut::new();

        write_pat(&mut buffer, &mut counters);
        write_pmt(&mut buffer, &mut counters, primary_stream_type, audio_stream_type);

        // Interleave by decode time; the primary track wins ties so each
        // segment opens with its keyframe.
        let mut merged: Vec<(bool, &SampleInfo)> = Vec::new();
        merged.extend(plan.primary.iter().map(|sample| (false, sample)));
        merged.extend(plan.audio.iter().map(|sample| (true, sample)));
        let primary_scale = u64::from(primary.timescale);
        let audio_scale = audio.map_or(1, |track| u64::from(track.timescale));
        merged.sort_by_key(|(is_audio, sample)| {
            let scale = if *is_audio { audio_scale } else { primary_scale };
            (sample.dts * PCR_CLOCK / scale, *is_audio)
        });

        let mut first_video_packet = true;
        for (is_audio, sample) in merged {
            let scale = if is_audio { audio_scale } else { primary_scale };
            let pts = sample.dts * PCR_CLOCK / scale;

            let (pid, stream_id) = if is_audio {
                (AUDIO_PID, AUDIO_STREAM_ID)
            } else {
                (VIDEO_PID, VIDEO_STREAM_ID)
            };

            let with_pcr = !is_audio && (first_video_packet || sample.is_sync);
            if !is_audio {
                first_video_packet = false;
            }

            let payload = sample_bytes(data, sample)?;
            write_pes(
                &mut buffer,
                &mut counters,
                pid,
                stream_id,
                payload,
                pts,
                with_pcr.then_some(pts),
            );
        }

        debug_assert_eq!(buffer.len() % PACKET_SIZE, 0);

        #[allow(clippy::cast_possible_wrap)]
        media_segments.push(SegmentData {
            data: buffer.freeze(),
            name: None,
            duration_seconds: plan.duration_seconds,
            byte_range_offset: None,
            byte_range_length: None,
            start_pts: MediaTimestamp::from_scaled(plan.start_dts, primary.timescale as i32),
            is_keyframe_start: true,
        });
    }

    Ok(SegmentationResult {
        init_segment: None,
        media_segments,
        playlist: None,
        total_duration: 0.0,
    })
}

/// Writes one PSI packet: pointer field, section, stuffing to 188 bytes.
fn write_psi(buffer: &mut BytesMut, counters: &mut ContinuityCounters, pid: u16, section: &[u8]) {
    let continuity = counters.next(pid);
    buffer.put_u8(SYNC_BYTE);
    buffer.put_u16(0x4000 | pid); // PUSI set
    buffer.put_u8(0x10 | continuity); // payload only
    buffer.put_u8(0); // pointer_field

    buffer.put_slice(section);

    let used = 4 + 1 + section.len();
    buffer.put_bytes(0xFF, PACKET_SIZE - used);
}

fn finish_section(body: &[u8], table_id: u8) -> Vec<u8> {
    let mut section = Vec::with_capacity(body.len() + 8);
    section.push(table_id);
    // section_syntax_indicator, reserved bits, 12-bit length.
    let length = body.len() + 4; // body + CRC
    section.push(0xB0 | ((length >> 8) as u8 & 0x0F));
    section.push((length & 0xFF) as u8);
    section.extend_from_slice(body);
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

fn write_pat(buffer: &mut BytesMut, counters: &mut ContinuityCounters) {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes()); // transport_stream_id
    body.push(0xC1); // version 0, current_next
    body.push(0); // section_number
    body.push(0); // last_section_number
    body.extend_from_slice(&1u16.to_be_bytes()); // program_number
    body.extend_from_slice(&(0xE000 | PMT_PID).to_be_bytes());

    let section = finish_section(&body, 0x00);
    write_psi(buffer, counters, PAT_PID, &section);
}

fn write_pmt(
    buffer: &mut BytesMut,
    counters: &mut ContinuityCounters,
    primary_stream_type: u8,
    audio_stream_type: Option<u8>,
) {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes()); // program_number
    body.push(0xC1);
    body.push(0);
    body.push(0);
    body.extend_from_slice(&(0xE000 | VIDEO_PID).to_be_bytes()); // PCR PID
    body.extend_from_slice(&0xF000u16.to_be_bytes()); // program_info_length

    body.push(primary_stream_type);
    body.extend_from_slice(&(0xE000 | VIDEO_PID).to_be_bytes());
    body.extend_from_slice(&0xF000u16.to_be_bytes()); // ES_info_length

    if let Some(stream_type) = audio_stream_type {
        body.push(stream_type);
        body.extend_from_slice(&(0xE000 | AUDIO_PID).to_be_bytes());
        body.extend_from_slice(&0xF000u16.to_be_bytes());
    }

    let section = finish_section(&body, 0x02);
    write_psi(buffer, counters, PMT_PID, &section);
}

fn encode_pts(buffer: &mut Vec<u8>, prefix: u8, pts: u64) {
    let pts = pts & 0x1_FFFF_FFFF;
    buffer.push((prefix << 4) | (((pts >> 30) as u8) << 1) | 1);
    buffer.push((pts >> 22) as u8);
    buffer.push((((pts >> 14) as u8) & 0xFE) | 1);
    buffer.push((pts >> 7) as u8);
    buffer.push((((pts << 1) as u8) & 0xFE) | 1);
}

/// Packetizes one PES packet across as many TS packets as needed.
fn write_pes(
    buffer: &mut BytesMut,
    counters: &mut ContinuityCounters,
    pid: u16,
    stream_id: u8,
    payload: &[u8],
    pts: u64,
    pcr: Option<u64>,
) {
    let mut pes = Vec::with_capacity(payload.len() + 14);
    pes.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);
    let pes_length = payload.len() + 8;
    if pes_length > usize::from(u16::MAX) {
        // Unbounded, only allowed for video elementary streams.
        pes.extend_from_slice(&[0, 0]);
    } else {
        #[allow(clippy::cast_possible_truncation)]
        pes.extend_from_slice(&(pes_length as u16).to_be_bytes());
    }
    pes.push(0x80); // marker bits
    pes.push(0x80); // PTS only
    pes.push(5); // PES_header_data_length
    encode_pts(&mut pes, 0b0010, pts);
    pes.extend_from_slice(payload);

    let mut remaining = pes.as_slice();
    let mut first = true;
    while !remaining.is_empty() {
        let continuity = counters.next(pid);

        // Adaptation field content, without its length byte. `Some`
        // means the field is present even if empty (a lone length byte
        // of zero).
        let mut adaptation: Option<Vec<u8>> = if first {
            pcr.map(|pcr| {
                let pcr_base = pcr & 0x1_FFFF_FFFF;
                vec![
                    0x10, // PCR flag
                    (pcr_base >> 25) as u8,
                    (pcr_base >> 17) as u8,
                    (pcr_base >> 9) as u8,
                    (pcr_base >> 1) as u8,
                    (((pcr_base & 1) as u8) << 7) | 0x7E,
                    0, // PCR extension low bits
                ]
            })
        } else {
            None
        };

        let room = |adaptation: &Option<Vec<u8>>| {
            PACKET_SIZE - 4 - adaptation.as_ref().map_or(0, |content| 1 + content.len())
        };

        // Stuff the adaptation field when the payload cannot fill the
        // packet.
        if remaining.len() < room(&adaptation) {
            let shortfall = room(&adaptation) - remaining.len();
            match &mut adaptation {
                Some(content) => content.extend(std::iter::repeat(0xFF).take(shortfall)),
                None if shortfall == 1 => adaptation = Some(Vec::new()),
                None => {
                    let mut content = vec![0x00];
                    content.extend(std::iter::repeat(0xFF).take(shortfall - 2));
                    adaptation = Some(content);
                }
            }
        }

        buffer.put_u8(SYNC_BYTE);
        let pusi = if first { 0x4000 } else { 0 };
        buffer.put_u16(pusi | pid);
        let control = if adaptation.is_some() { 0x30 } else { 0x10 };
        buffer.put_u8(control | continuity);
        if let Some(content) = &adaptation {
            #[allow(clippy::cast_possible_truncation)]
            buffer.put_u8(content.len() as u8);
            buffer.put_slice(content);
        }

        let take = remaining.len().min(room(&adaptation));
        buffer.put_slice(&remaining[..take]);
        remaining = &remaining[take..];
        first = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::testing::{build_mp4, TestTrack};
    use crate::mp4::FileInfo;
    use crate::segment::plan_segments;

    fn emit_ts(target: f64) -> SegmentationResult {
        let durations = vec![3600u32; 250];
        let sync = (0..250).filter(|i| i % 50 == 0).map(|i| i + 1).collect();
        let data = build_mp4(&[TestTrack::video(90_000, durations, sync)]);
        let info = FileInfo::parse(&data).unwrap();
        let video = info.video_track().unwrap().clone();
        let planned = plan_segments(&video, None, target).unwrap();
        emit(&data, &video, None, &planned).unwrap()
    }

    #[test]
    fn segments_are_whole_packets() {
        let result = emit_ts(4.0);
        assert_eq!(result.media_segments.len(), 3);
        for segment in &result.media_segments {
            assert_eq!(segment.data.len() % PACKET_SIZE, 0);
            for packet in segment.data.chunks(PACKET_SIZE) {
                assert_eq!(packet[0], SYNC_BYTE);
            }
        }
    }

    #[test]
    fn each_segment_opens_with_pat_pmt_then_video_pusi() {
        let result = emit_ts(4.0);
        for segment in &result.media_segments {
            let packets: Vec<&[u8]> = segment.data.chunks(PACKET_SIZE).collect();

            let pat_pid = u16::from_be_bytes([packets[0][1], packets[0][2]]) & 0x1FFF;
            assert_eq!(pat_pid, PAT_PID);
            assert_ne!(packets[0][1] & 0x40, 0, "PAT must carry PUSI");

            let pmt_pid = u16::from_be_bytes([packets[1][1], packets[1][2]]) & 0x1FFF;
            assert_eq!(pmt_pid, PMT_PID);

            let video_pid = u16::from_be_bytes([packets[2][1], packets[2][2]]) & 0x1FFF;
            assert_eq!(video_pid, VIDEO_PID);
            assert_ne!(
                packets[2][1] & 0x40,
                0,
                "first video packet of a segment must carry PUSI"
            );
        }
    }

    #[test]
    fn pat_crc_is_valid() {
        let result = emit_ts(4.0);
        let packet = &result.media_segments[0].data[..PACKET_SIZE];
        // Skip TS header and pointer field.
        let section_start = 5;
        let section_length = (usize::from(packet[section_start + 1] & 0x0F) << 8)
            | usize::from(packet[section_start + 2]);
        let section = &packet[section_start..section_start + 3 + section_length];
        let (body, crc) = section.split_at(section.len() - 4);
        assert_eq!(crc, &crc32_mpeg(body).to_be_bytes()[..]);
    }

    #[test]
    fn unsupported_codec_is_rejected() {
        assert!(stream_type_for(Some(FourCc(*b"vp09"))).is_err());
        assert_eq!(stream_type_for(Some(FourCc(*b"avc1"))).unwrap(), 0x1B);
        assert_eq!(stream_type_for(Some(FourCc(*b"mp4a"))).unwrap(), 0x0F);
    }
}
