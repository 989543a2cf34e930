//! Track and sample table extraction from a parsed box tree.

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

use crate::error::{Error, Result};

use super::reader::{parse_box_tree, find_box, BoxNode, Cursor, FourCc};

/// Parsed metadata of an ISO-BMFF file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// The major brand from `ftyp`, if the file carries one.
    pub major_brand: Option<FourCc>,

    pub compatible_brands: Vec<FourCc>,

    pub tracks: Vec<Track>,
}

impl FileInfo {
    /// Parses the metadata of an MP4 buffer.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyInput`] on an empty buffer,
    /// [`Error::MissingBox`] when a required box is absent, and
    /// [`Error::MalformedContainer`] / [`Error::UnexpectedEof`] on
    /// structurally broken input.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }

        let boxes = parse_box_tree(data)?;

        let mut major_brand = None;
        let mut compatible_brands = Vec::new();
        if let Some(ftyp) = find_box(&boxes, FourCc::FTYP) {
            let mut cursor = Cursor::new(ftyp.payload);
            major_brand = Some(cursor.read_four_cc()?);
            cursor.skip(4)?; // minor_version
            while cursor.remaining() >= 4 {
                compatible_brands.push(cursor.read_four_cc()?);
            }
        }

        let moov = find_box(&boxes, FourCc::MOOV)
            .ok_or_else(|| Error::MissingBox("moov".to_owned()))?;

        let mut tracks = Vec::new();
        for trak in moov.children_of_type(FourCc::TRAK) {
            tracks.push(Track::parse(trak)?);
        }

        Ok(Self {
            major_brand,
            compatible_brands,
            tracks,
        })
    }

    /// The first video track, if any.
    #[must_use]
    pub fn video_track(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|track| track.kind == TrackKind::Video)
    }

    /// The first audio track, if any.
    #[must_use]
    pub fn audio_track(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|track| track.kind == TrackKind::Audio)
    }
}

/// What kind of media a track carries, from its `hdlr` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Unknown,
}

/// One `trak` of an MP4 file.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: u32,

    pub kind: TrackKind,

    /// Ticks per second of this track's media clock.
    pub timescale: u32,

    /// Duration in `timescale` ticks.
    pub duration: u64,

    /// ISO-639-2 language, unpacked from `mdhd`. A packed value of zero
    /// means unspecified.
    pub language: Option<String>,

    /// The format of the first sample description entry.
    pub codec: Option<FourCc>,

    pub width: u32,
    pub height: u32,

    pub sample_tables: SampleTables,
}

impl Track {
    pub(crate) fn parse(trak: &BoxNode<'_>) -> Result<Self> {
        let tkhd = trak.require_child(FourCc::TKHD, "moov/trak/tkhd")?;
        let (id, width, height) = parse_tkhd(tkhd.payload)?;

        let mdia = trak.require_child(FourCc::MDIA, "moov/trak/mdia")?;
        let mdhd = mdia.require_child(FourCc::MDHD, "moov/trak/mdia/mdhd")?;
        let (timescale, duration, language) = parse_mdhd(mdhd.payload)?;

        let kind = match mdia.child(FourCc::HDLR) {
            Some(hdlr) => parse_hdlr(hdlr.payload)?,
            None => TrackKind::Unknown,
        };

        let stbl = mdia
            .require_child(FourCc::MINF, "moov/trak/mdia/minf")?
            .require_child(FourCc::STBL, "moov/trak/mdia/minf/stbl")?;

        let codec = match stbl.child(FourCc::STSD) {
            Some(stsd) => parse_stsd(stsd.payload)?,
            None => None,
        };

        Ok(Self {
            id,
            kind,
            timescale,
            duration,
            language,
            codec,
            width,
            height,
            sample_tables: SampleTables::parse(stbl)?,
        })
    }

    /// The track duration in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / f64::from(self.timescale)
    }

    /// Resolves the sample tables into one flat record per sample, in
    /// decode order.
    pub fn samples(&self) -> Result<Vec<SampleInfo>> {
        self.sample_tables.resolve()
    }
}

fn parse_tkhd(payload: &[u8]) -> Result<(u32, u32, u32)> {
    let mut cursor = Cursor::new(payload);
    let (version, _flags) = cursor.read_full_box_header()?;

    match version {
        0 => cursor.skip(8)?,  // creation_time, modification_time
        1 => cursor.skip(16)?,
        other => {
            return Err(Error::MalformedContainer(format!(
                "unsupported tkhd version {other}"
            )))
        }
    }

    let id = cursor.read_u32()?;
    cursor.skip(4)?; // reserved
    match version {
        0 => cursor.skip(4)?,  // duration
        _ => cursor.skip(8)?,
    }
    cursor.skip(8)?;  // reserved
    cursor.skip(2 + 2 + 2 + 2)?; // layer, alternate_group, volume, reserved
    cursor.skip(36)?; // matrix

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let width = cursor.read_fixed_16_16()?.round() as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let height = cursor.read_fixed_16_16()?.round() as u32;

    Ok((id, width, height))
}

fn parse_mdhd(payload: &[u8]) -> Result<(u32, u64, Option<String>)> {
    let mut cursor = Cursor::new(payload);
    let (version, _flags) = cursor.read_full_box_header()?;

    let (timescale, duration) = match version {
        0 => {
            cursor.skip(8)?;
            let timescale = cursor.read_u32()?;
            let duration = u64::from(cursor.read_u32()?);
            (timescale, duration)
        }
        1 => {
            cursor.skip(16)?;
            let timescale = cursor.read_u32()?;
            let duration = cursor.read_u64()?;
            (timescale, duration)
        }
        other => {
            return Err(Error::MalformedContainer(format!(
                "unsupported mdhd version {other}"
            )))
        }
    };

    // Three 5-bit characters biased by 0x60, packed into 15 bits.
    let packed_language = cursor.read_u16()?;
    let language = if packed_language == 0 {
        None
    } else {
        let code = [
            ((packed_language >> 10) & 0x1F) as u8 + 0x60,
            ((packed_language >> 5) & 0x1F) as u8 + 0x60,
            (packed_language & 0x1F) as u8 + 0x60,
        ];
        String::from_utf8(code.to_vec()).ok()
    };

    Ok((timescale, duration, language))
}

fn parse_hdlr(payload: &[u8]) -> Result<TrackKind> {
    let mut cursor = Cursor::new(payload);
    cursor.read_full_box_header()?;
    cursor.skip(4)?; // pre_defined
    let handler_type = cursor.read_four_cc()?;

    Ok(match handler_type.as_bytes() {
        b"vide" => TrackKind::Video,
        b"soun" => TrackKind::Audio,
        _ => TrackKind::Unknown,
    })
}

fn parse_stsd(payload: &[u8]) -> Result<Option<FourCc>> {
    let mut cursor = Cursor::new(payload);
    cursor.read_full_box_header()?;
    let entry_count = cursor.read_u32()?;
    if entry_count == 0 {
        return Ok(None);
    }

    // The first sample entry is itself box-shaped.
    cursor.skip(4)?; // entry size
    Ok(Some(cursor.read_four_cc()?))
}

/// A run of samples sharing one duration, from `stts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// A run of chunks sharing one samples-per-chunk value, from `stsc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample sizes from `stsz`: one shared size, or one size per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    Constant { sample_size: u32, sample_count: u32 },
    PerSample(Vec<u32>),
}

impl SampleSizes {
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        match self {
            Self::Constant { sample_count, .. } => *sample_count,
            #[allow(clippy::cast_possible_truncation)]
            Self::PerSample(sizes) => sizes.len() as u32,
        }
    }

    #[must_use]
    pub fn size_of(&self, index: u32) -> Option<u32> {
        match self {
            Self::Constant {
                sample_size,
                sample_count,
            } => (index < *sample_count).then_some(*sample_size),
            Self::PerSample(sizes) => sizes.get(index as usize).copied(),
        }
    }
}

/// The raw sample tables of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTables {
    pub time_to_sample: Vec<TimeToSampleEntry>,

    /// 1-based indices of sync samples. `None` means the track had no
    /// `stss` box, in which case every sample is a sync sample.
    pub sync_samples: Option<Vec<u32>>,

    pub sample_sizes: SampleSizes,

    pub sample_to_chunk: Vec<SampleToChunkEntry>,

    /// Absolute file offsets of each chunk, from `stco` or `co64`.
    pub chunk_offsets: Vec<u64>,
}

/// One sample resolved from the tables, in decode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// 0-based index in decode order.
    pub index: u32,

    /// Absolute file offset of the sample's payload.
    pub offset: u64,

    pub size: u32,

    /// Decode timestamp in track timescale ticks.
    pub dts: u64,

    /// Duration in track timescale ticks.
    pub duration: u32,

    pub is_sync: bool,
}

impl SampleTables {
    fn parse(stbl: &BoxNode<'_>) -> Result<Self> {
        let stts = stbl.require_child(FourCc::STTS, "moov/trak/mdia/minf/stbl/stts")?;
        let mut cursor = Cursor::new(stts.payload);
        cursor.read_full_box_header()?;
        let entry_count = cursor.read_u32()?;
        let mut time_to_sample = Vec::new();
        for _ in 0..entry_count {
            time_to_sample.push(TimeToSampleEntry {
                sample_count: cursor.read_u32()?,
                sample_delta: cursor.read_u32()?,
            });
        }

        let sync_samples = match stbl.child(FourCc::STSS) {
            Some(stss) => {
                let mut cursor = Cursor::new(stss.payload);
                cursor.read_full_box_header()?;
                let entry_count = cursor.read_u32()?;
                let mut samples = Vec::new();
                for _ in 0..entry_count {
                    samples.push(cursor.read_u32()?);
                }
                Some(samples)
            }
            None => None,
        };

        let stsz = stbl.require_child(FourCc::STSZ, "moov/trak/mdia/minf/stbl/stsz")?;
        let mut cursor = Cursor::new(stsz.payload);
        cursor.read_full_box_header()?;
        let sample_size = cursor.read_u32()?;
        let sample_count = cursor.read_u32()?;
        let sample_sizes = if sample_size == 0 {
            let mut sizes = Vec::new();
            for _ in 0..sample_count {
                sizes.push(cursor.read_u32()?);
            }
            SampleSizes::PerSample(sizes)
        } else {
            SampleSizes::Constant {
                sample_size,
                sample_count,
            }
        };

        let stsc = stbl.require_child(FourCc::STSC, "moov/trak/mdia/minf/stbl/stsc")?;
        let mut cursor = Cursor::new(stsc.payload);
        cursor.read_full_box_header()?;
        let entry_count = cursor.read_u32()?;
        let mut sample_to_chunk = Vec::new();
        for _ in 0..entry_count {
            sample_to_chunk.push(SampleToChunkEntry {
                first_chunk: cursor.read_u32()?,
                samples_per_chunk: cursor.read_u32()?,
                sample_description_index: cursor.read_u32()?,
            });
        }

        let chunk_offsets = if let Some(stco) = stbl.child(FourCc::STCO) {
            let mut cursor = Cursor::new(stco.payload);
            cursor.read_full_box_header()?;
            let entry_count = cursor.read_u32()?;
            let mut offsets = Vec::new();
            for _ in 0..entry_count {
                offsets.push(u64::from(cursor.read_u32()?));
            }
            offsets
        } else if let Some(co64) = stbl.child(FourCc::CO64) {
            let mut cursor = Cursor::new(co64.payload);
            cursor.read_full_box_header()?;
            let entry_count = cursor.read_u32()?;
            let mut offsets = Vec::new();
            for _ in 0..entry_count {
                offsets.push(cursor.read_u64()?);
            }
            offsets
        } else {
            return Err(Error::MissingBox(
                "moov/trak/mdia/minf/stbl/stco".to_owned(),
            ));
        };

        Ok(Self {
            time_to_sample,
            sync_samples,
            sample_sizes,
            sample_to_chunk,
            chunk_offsets,
        })
    }

    /// The number of samples described by the tables.
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_sizes.sample_count()
    }

    /// Flattens the run-length tables into one record per sample.
    pub fn resolve(&self) -> Result<Vec<SampleInfo>> {
        let sample_count = self.sample_count();
        let mut samples = Vec::with_capacity(sample_count as usize);

        // Walk stsc runs to place each sample inside its chunk.
        let mut chunk_assignments = Vec::with_capacity(sample_count as usize);
        let chunk_count = self.chunk_offsets.len() as u64;
        for (run_index, run) in self.sample_to_chunk.iter().enumerate() {
            if run.first_chunk == 0 {
                return Err(Error::MalformedContainer(
                    "stsc first_chunk is 1-based and cannot be 0".to_owned(),
                ));
            }
            let run_end = self
                .sample_to_chunk
                .get(run_index + 1)
                .map_or(chunk_count, |next| u64::from(next.first_chunk).saturating_sub(1));
            let mut chunk = u64::from(run.first_chunk) - 1;
            while chunk < run_end && chunk_assignments.len() < sample_count as usize {
                for _ in 0..run.samples_per_chunk {
                    if chunk_assignments.len() == sample_count as usize {
                        break;
                    }
                    chunk_assignments.push(chunk);
                }
                chunk += 1;
            }
        }
        if chunk_assignments.len() != sample_count as usize {
            return Err(Error::MalformedContainer(format!(
                "sample tables disagree: stsz describes {sample_count} samples, stsc covers {}",
                chunk_assignments.len()
            )));
        }

        let mut durations = self
            .time_to_sample
            .iter()
            .flat_map(|entry| std::iter::repeat(entry.sample_delta).take(entry.sample_count as usize));

        let mut dts = 0u64;
        let mut previous_chunk = u64::MAX;
        let mut next_offset = 0u64;
        for index in 0..sample_count {
            let size = self
                .sample_sizes
                .size_of(index)
                .ok_or_else(|| Error::MalformedContainer("stsz too short".to_owned()))?;

            let chunk = chunk_assignments[index as usize];
            if chunk != previous_chunk {
                next_offset = *self.chunk_offsets.get(chunk as usize).ok_or_else(|| {
                    Error::MalformedContainer("stsc references a chunk beyond stco".to_owned())
                })?;
                previous_chunk = chunk;
            }

            let duration = durations.next().ok_or_else(|| {
                Error::MalformedContainer("stts describes fewer samples than stsz".to_owned())
            })?;

            let is_sync = self
                .sync_samples
                .as_ref()
                .map_or(true, |sync| sync.binary_search(&(index + 1)).is_ok());

            samples.push(SampleInfo {
                index,
                offset: next_offset,
                size,
                dts,
                duration,
                is_sync,
            });

            next_offset = next_offset
                .checked_add(u64::from(size))
                .ok_or_else(|| Error::MalformedContainer("sample offsets overflow".to_owned()))?;
            dts = dts
                .checked_add(u64::from(duration))
                .ok_or_else(|| Error::MalformedContainer("timestamps overflow".to_owned()))?;
        }

        Ok(samples)
    }
}
