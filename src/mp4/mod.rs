//! ISO-BMFF (MP4) reading and writing: a bounded byte cursor, a box tree
//! reader, track metadata extraction, and box building for the segmenter.

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

mod info;
mod reader;
mod writer;

pub use info::{
    FileInfo, SampleInfo, SampleSizes, SampleTables, SampleToChunkEntry, TimeToSampleEntry, Track,
    TrackKind,
};
pub use reader::{find_box, parse_box_tree, BoxNode, Cursor, FourCc};
pub use writer::{write_box, write_full_box};


#[cfg(test)]
mod tests {
    use super::testing::{build_mp4, TestTrack};
    use super::*;
    use crate::error::Error;

    #[test]
    fn parses_synthetic_file_info() {
        let data = build_mp4(&[
            TestTrack::video(30_000, vec![1001; 60], vec![1, 31]),
            TestTrack::audio(44_100, 10),
        ]);

        let info = FileInfo::parse(&data).unwrap();
        assert_eq!(info.major_brand, Some(FourCc(*b"isom")));
        assert_eq!(info.tracks.len(), 2);

        let video = info.video_track().unwrap();
        assert_eq!(video.kind, TrackKind::Video);
        assert_eq!(video.timescale, 30_000);
        assert_eq!(video.codec, Some(FourCc(*b"avc1")));
        assert_eq!(video.width, 1280);
        assert_eq!(video.height, 720);
        assert_eq!(video.language.as_deref(), Some("und"));

        let audio = info.audio_track().unwrap();
        assert_eq!(audio.kind, TrackKind::Audio);
        assert_eq!(audio.timescale, 44_100);
    }

    #[test]
    fn resolves_samples_in_decode_order() {
        let data = build_mp4(&[TestTrack::video(90_000, vec![3000; 10], vec![1, 5, 9])]);
        let info = FileInfo::parse(&data).unwrap();
        let samples = info.video_track().unwrap().samples().unwrap();

        assert_eq!(samples.len(), 10);
        assert_eq!(samples[0].dts, 0);
        assert_eq!(samples[1].dts, 3000);
        assert!(samples[0].is_sync);
        assert!(!samples[1].is_sync);
        assert!(samples[4].is_sync);
        assert!(samples[8].is_sync);

        // Samples are contiguous within the single chunk.
        for pair in samples.windows(2) {
            assert_eq!(pair[0].offset + u64::from(pair[0].size), pair[1].offset);
        }
    }

    #[test]
    fn missing_stss_marks_every_sample_sync() {
        let data = build_mp4(&[TestTrack::audio(48_000, 5)]);
        let info = FileInfo::parse(&data).unwrap();
        let samples = info.audio_track().unwrap().samples().unwrap();
        assert!(samples.iter().all(|sample| sample.is_sync));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(FileInfo::parse(&[]).unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn missing_moov_is_reported_by_path() {
        let mut data = bytes::BytesMut::new();
        write_box(&mut data, FourCc::FTYP, |buffer| {
            use bytes::BufMut;
            buffer.put_slice(b"isom");
            buffer.put_u32(0);
        });
        assert_eq!(
            FileInfo::parse(&data).unwrap_err(),
            Error::MissingBox("moov".to_owned())
        );
    }

    #[test]
    fn truncated_moov_is_eof() {
        let data = build_mp4(&[TestTrack::audio(48_000, 5)]);
        assert!(matches!(
            FileInfo::parse(&data[..data.len() / 2]),
            Err(Error::UnexpectedEof | Error::MalformedContainer(_))
        ));
    }
}
