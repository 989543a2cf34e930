//! Fragmented MP4 emission: an initialization segment plus `moof`+`mdat`
//! media segments.

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

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{Error, Result},
    media::MediaTimestamp,
    mp4::{
        find_box, parse_box_tree, write_box, write_full_box, BoxNode, FileInfo, FourCc,
        SampleInfo, Track,
    },
};

use super::{sample_bytes, PlannedSegment, SegmentData, SegmentationResult};

/// Sample flags for a sync sample: `sample_depends_on = 2`.
const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;

/// Sample flags for a non-sync sample: `sample_depends_on = 1`,
/// `sample_is_non_sync_sample` set.
const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

pub(crate) fn emit(
    data: &[u8],
    info: &FileInfo,
    primary: &Track,
    audio: Option<&Track>,
    planned: &[PlannedSegment],
) -> Result<SegmentationResult> {
    let boxes = parse_box_tree(data)?;
    let moov =
        find_box(&boxes, FourCc::MOOV).ok_or_else(|| Error::MissingBox("moov".to_owned()))?;

    let mut included_ids = vec![primary.id];
    if let Some(audio) = audio {
        included_ids.push(audio.id);
    }

    let init_segment = build_init_segment(moov, info, &included_ids)?;

    let mut media_segments = Vec::with_capacity(planned.len());
    for (index, plan) in planned.iter().enumerate() {
        let sequence_number = u32::try_from(index + 1)
            .map_err(|_| Error::UnsupportedConfiguration("too many segments".to_owned()))?;
        let segment = build_media_segment(data, sequence_number, primary, audio, plan)?;

        #[allow(clippy::cast_possible_wrap)]
        media_segments.push(SegmentData {
            data: segment,
            name: None,
            duration_seconds: plan.duration_seconds,
            byte_range_offset: None,
            byte_range_length: None,
            start_pts: MediaTimestamp::from_scaled(plan.start_dts, primary.timescale as i32),
            is_keyframe_start: true,
        });
    }

    Ok(SegmentationResult {
        init_segment: Some(init_segment),
        media_segments,
        playlist: None,
        total_duration: 0.0,
    })
}

/// Copies a box verbatim, rebuilding its header with a 32-bit size.
fn copy_box(buffer: &mut BytesMut, node: &BoxNode<'_>) {
    write_box(buffer, node.four_cc, |buffer| {
        buffer.put_slice(node.payload);
    });
}

/// `ftyp` + the original `moov` with its sample tables emptied and a
/// `mvex` added, so the segments carry all timing and offsets themselves.
fn build_init_segment(
    moov: &BoxNode<'_>,
    info: &FileInfo,
    included_ids: &[u32],
) -> Result<Bytes> {
    let mut buffer = BytesMut::new();

    write_box(&mut buffer, FourCc::FTYP, |buffer| {
        buffer.put_slice(b"iso6");
        buffer.put_u32(0);
        buffer.put_slice(b"iso6");
        buffer.put_slice(b"isom");
    });

    write_box(&mut buffer, FourCc::MOOV, |buffer| {
        if let Some(mvhd) = moov.child(FourCc::MVHD) {
            copy_box(buffer, mvhd);
        }

        for (trak, track) in moov.children_of_type(FourCc::TRAK).zip(&info.tracks) {
            if !included_ids.contains(&track.id) {
                continue;
            }
            write_box(buffer, FourCc::TRAK, |buffer| {
                for child in &trak.children {
                    match child.four_cc {
                        FourCc::MDIA => {
                            write_box(buffer, FourCc::MDIA, |buffer| {
                                for mdia_child in &child.children {
                                    if mdia_child.four_cc == FourCc::MINF {
                                        write_box(buffer, FourCc::MINF, |buffer| {
                                            for minf_child in &mdia_child.children {
                                                if minf_child.four_cc == FourCc::STBL {
                                                    write_stripped_stbl(buffer, minf_child);
                                                } else {
                                                    copy_box(buffer, minf_child);
                                                }
                                            }
                                        });
                                    } else {
                                        copy_box(buffer, mdia_child);
                                    }
                                }
                            });
                        }
                        // Edit lists do not survive fragmenting.
                        FourCc::EDTS => (),
                        _ => copy_box(buffer, child),
                    }
                }
            });
        }

        write_box(buffer, FourCc::MVEX, |buffer| {
            for id in included_ids {
                write_full_box(buffer, FourCc::TREX, 0, 0, |buffer| {
                    buffer.put_u32(*id);
                    buffer.put_u32(1); // default_sample_description_index
                    buffer.put_u32(0); // default_sample_duration
                    buffer.put_u32(0); // default_sample_size
                    buffer.put_u32(0); // default_sample_flags
                });
            }
        });
    });

    Ok(buffer.freeze())
}

/// The original `stbl` with `stsd` kept and all sample tables emptied.
fn write_stripped_stbl(buffer: &mut BytesMut, stbl: &BoxNode<'_>) {
    write_box(buffer, FourCc::STBL, |buffer| {
        if let Some(stsd) = stbl.child(FourCc::STSD) {
            copy_box(buffer, stsd);
        }
        write_full_box(buffer, FourCc::STTS, 0, 0, |buffer| buffer.put_u32(0));
        write_full_box(buffer, FourCc::STSC, 0, 0, |buffer| buffer.put_u32(0));
        write_full_box(buffer, FourCc::STSZ, 0, 0, |buffer| {
            buffer.put_u32(0);
            buffer.put_u32(0);
        });
        write_full_box(buffer, FourCc::STCO, 0, 0, |buffer| buffer.put_u32(0));
    });
}

struct TrackRun<'a> {
    track_id: u32,
    samples: &'a [SampleInfo],
    base_decode_time: u64,
    mark_sync_flags: bool,
}

fn build_media_segment(
    data: &[u8],
    sequence_number: u32,
    primary: &Track,
    audio: Option<&Track>,
    plan: &PlannedSegment,
) -> Result<Bytes> {
    let mut runs = vec![TrackRun {
        track_id: primary.id,
        samples: &plan.primary,
        base_decode_time: plan.start_dts,
        mark_sync_flags: true,
    }];
    if let Some(audio) = audio {
        if !plan.audio.is_empty() {
            runs.push(TrackRun {
                track_id: audio.id,
                samples: &plan.audio,
                base_decode_time: plan.audio[0].dts,
                mark_sync_flags: false,
            });
        }
    }

    // Concatenated per-track payload lengths decide the mdat offsets.
    let mut run_lengths = Vec::with_capacity(runs.len());
    for run in &runs {
        let mut length = 0u64;
        for sample in run.samples {
            length += u64::from(sample.size);
        }
        run_lengths.push(length);
    }

    // First pass with zero offsets just measures the moof.
    let moof_size = build_moof(sequence_number, &runs, &vec![0; runs.len()]).len();

    let mut data_offsets = Vec::with_capacity(runs.len());
    let mut offset = moof_size as u64 + 8;
    for length in &run_lengths {
        data_offsets.push(i32::try_from(offset).map_err(|_| {
            Error::UnsupportedConfiguration("segment larger than 2 GiB".to_owned())
        })?);
        offset += length;
    }

    // Resolve every source range before the mdat closure, which cannot
    // report errors.
    let mut payloads = Vec::new();
    for run in &runs {
        for sample in run.samples {
            payloads.push(sample_bytes(data, sample)?);
        }
    }

    let mut buffer = build_moof(sequence_number, &runs, &data_offsets);

    write_box(&mut buffer, FourCc::MDAT, |buffer| {
        for payload in &payloads {
            buffer.put_slice(payload);
        }
    });

    Ok(buffer.freeze())
}

fn build_moof(sequence_number: u32, runs: &[TrackRun<'_>], data_offsets: &[i32]) -> BytesMut {
    let mut buffer = BytesMut::new();

    write_box(&mut buffer, FourCc::MOOF, |buffer| {
        write_full_box(buffer, FourCc::MFHD, 0, 0, |buffer| {
            buffer.put_u32(sequence_number);
        });

        for (run, data_offset) in runs.iter().zip(data_offsets) {
            write_box(buffer, FourCc::TRAF, |buffer| {
                // default-base-is-moof
                write_full_box(buffer, FourCc::TFHD, 0, 0x02_0000, |buffer| {
                    buffer.put_u32(run.track_id);
                });
                write_full_box(buffer, FourCc::TFDT, 1, 0, |buffer| {
                    buffer.put_u64(run.base_decode_time);
                });

                // data-offset, sample-duration, sample-size, sample-flags
                write_full_box(buffer, FourCc::TRUN, 0, 0x00_0701, |buffer| {
                    #[allow(clippy::cast_possible_truncation)]
                    buffer.put_u32(run.samples.len() as u32);
                    buffer.put_i32(*data_offset);
                    for sample in run.samples {
                        buffer.put_u32(sample.duration);
                        buffer.put_u32(sample.size);
                        let flags = if !run.mark_sync_flags || sample.is_sync {
                            SYNC_SAMPLE_FLAGS
                        } else {
                            NON_SYNC_SAMPLE_FLAGS
                        };
                        buffer.put_u32(flags);
                    }
                });
            });
        }
    });

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::testing::{build_mp4, TestTrack};
    use crate::mp4::Cursor;
    use crate::segment::plan_segments;

    fn emit_from(data: &[u8], target: f64) -> (SegmentationResult, FileInfo) {
        let info = FileInfo::parse(data).unwrap();
        let video = info.video_track().unwrap().clone();
        let planned = plan_segments(&video, None, target).unwrap();
        let result = emit(data, &info, &video, None, &planned).unwrap();
        (result, info)
    }

    #[test]
    fn init_segment_is_a_valid_stripped_moov() {
        let data = build_mp4(&[TestTrack::video(
            90_000,
            vec![3000; 100],
            vec![1, 26, 51, 76],
        )]);
        let (result, _) = emit_from(&data, 2.0);

        let init = result.init_segment.unwrap();
        let boxes = parse_box_tree(&init).unwrap();
        assert_eq!(boxes[0].four_cc, FourCc::FTYP);

        let moov = find_box(&boxes, FourCc::MOOV).unwrap();
        let trak = moov.child(FourCc::TRAK).unwrap();
        let stbl = trak
            .child(FourCc::MDIA)
            .unwrap()
            .child(FourCc::MINF)
            .unwrap()
            .child(FourCc::STBL)
            .unwrap();

        // Sample tables are present but empty; stsd survives.
        assert!(stbl.child(FourCc::STSD).is_some());
        assert!(stbl.child(FourCc::STSS).is_none());
        let stts = stbl.child(FourCc::STTS).unwrap();
        assert_eq!(&stts.payload[4..8], &0u32.to_be_bytes());

        assert!(moov.child(FourCc::MVEX).is_some());
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let data = build_mp4(&[TestTrack::video(
            90_000,
            vec![3000; 100],
            vec![1, 26, 51, 76],
        )]);
        let (result, _) = emit_from(&data, 2.0);

        for (index, segment) in result.media_segments.iter().enumerate() {
            let boxes = parse_box_tree(&segment.data).unwrap();
            let moof = find_box(&boxes, FourCc::MOOF).unwrap();
            let mfhd = moof.child(FourCc::MFHD).unwrap();
            let mut cursor = Cursor::new(mfhd.payload);
            cursor.read_full_box_header().unwrap();
            assert_eq!(cursor.read_u32().unwrap(), index as u32 + 1);
        }
    }

    #[test]
    fn trun_data_offset_points_at_mdat_payload() {
        let data = build_mp4(&[TestTrack::video(90_000, vec![3000; 50], vec![1, 26])]);
        let (result, info) = emit_from(&data, 100.0);
        assert_eq!(result.media_segments.len(), 1);

        let segment = &result.media_segments[0];
        let boxes = parse_box_tree(&segment.data).unwrap();
        let moof = find_box(&boxes, FourCc::MOOF).unwrap();
        let trun = moof
            .child(FourCc::TRAF)
            .unwrap()
            .child(FourCc::TRUN)
            .unwrap();

        let mut cursor = Cursor::new(trun.payload);
        cursor.read_full_box_header().unwrap();
        cursor.read_u32().unwrap(); // sample_count
        let data_offset = cursor.read_u32().unwrap() as usize;

        // The first sample's bytes in the segment equal the source bytes.
        let samples = info.video_track().unwrap().samples().unwrap();
        let first = sample_bytes(&data, &samples[0]).unwrap();
        assert_eq!(
            &segment.data[data_offset..data_offset + first.len()],
            first
        );
    }

    #[test]
    fn audio_track_rides_along() {
        let durations = vec![3600u32; 125]; // 5 s of 25 fps video
        let sync = (0..125).filter(|i| i % 25 == 0).map(|i| i + 1).collect();
        let data = build_mp4(&[
            TestTrack::video(90_000, durations, sync),
            TestTrack::audio(48_000, 235), // ~5 s of 1024-tick frames
        ]);

        let info = FileInfo::parse(&data).unwrap();
        let video = info.video_track().unwrap().clone();
        let audio = info.audio_track().unwrap().clone();
        let planned = plan_segments(&video, Some(&audio), 2.0).unwrap();
        let result = emit(&data, &info, &video, Some(&audio), &planned).unwrap();

        let total_audio: usize = planned.iter().map(|plan| plan.audio.len()).sum();
        assert_eq!(total_audio, 235);

        // Each segment carries two track fragments.
        let first = parse_box_tree(&result.media_segments[0].data).unwrap();
        let moof = find_box(&first, FourCc::MOOF).unwrap();
        assert_eq!(moof.children_of_type(FourCc::TRAF).count(), 2);
    }
}
