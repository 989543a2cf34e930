//! Bounded big-endian cursor and ISO-BMFF box tree reader.

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

use std::fmt;

use crate::error::{Error, Result};

/// A four character box or brand code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STSC: Self = Self(*b"stsc");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const PSSH: Self = Self(*b"pssh");

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// A bounded cursor over an in-memory buffer. Every read is bounds-checked;
/// reads past the end fail with [`Error::UnexpectedEof`] instead of
/// panicking, no matter how hostile the input is.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::UnexpectedEof)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(3)?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_four_cc(&mut self) -> Result<FourCc> {
        let bytes = self.read_bytes(4)?;
        Ok(FourCc([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a 16.16 fixed point value as a float.
    pub fn read_fixed_16_16(&mut self) -> Result<f64> {
        Ok(f64::from(self.read_u32()?) / 65536.0)
    }

    /// Reads the version byte and 24-bit flags of a full box.
    pub fn read_full_box_header(&mut self) -> Result<(u8, u32)> {
        let version = self.read_u8()?;
        let flags = self.read_u24()?;
        Ok((version, flags))
    }
}

/// One parsed box. Recognized container boxes carry their children;
/// everything else is preserved as opaque payload.
#[derive(Debug, Clone)]
pub struct BoxNode<'a> {
    pub four_cc: FourCc,

    /// Offset of the box header from the start of the parsed buffer.
    pub offset: u64,

    /// Total size of the box including its header.
    pub size: u64,

    /// The payload after the header.
    pub payload: &'a [u8],

    /// Parsed children when `four_cc` names a recognized container.
    pub children: Vec<BoxNode<'a>>,
}

impl<'a> BoxNode<'a> {
    /// The first direct child with the given type.
    #[must_use]
    pub fn child(&self, four_cc: FourCc) -> Option<&BoxNode<'a>> {
        self.children.iter().find(|child| child.four_cc == four_cc)
    }

    /// Every direct child with the given type.
    pub fn children_of_type(
        &self,
        four_cc: FourCc,
    ) -> impl Iterator<Item = &BoxNode<'a>> {
        self.children
            .iter()
            .filter(move |child| child.four_cc == four_cc)
    }

    /// The first direct child with the given type, or a `MissingBox` error
    /// naming the slash-separated path.
    pub fn require_child(&self, four_cc: FourCc, path: &str) -> Result<&BoxNode<'a>> {
        self.child(four_cc)
            .ok_or_else(|| Error::MissingBox(path.to_owned()))
    }
}

/// Box types whose payload is a sequence of child boxes.
const CONTAINER_TYPES: [FourCc; 9] = [
    FourCc::MOOV,
    FourCc::TRAK,
    FourCc::MDIA,
    FourCc::MINF,
    FourCc::STBL,
    FourCc::MOOF,
    FourCc::TRAF,
    FourCc::EDTS,
    FourCc::DINF,
];

/// Parses a sequence of sibling boxes covering the whole buffer.
pub fn parse_box_tree(data: &[u8]) -> Result<Vec<BoxNode<'_>>> {
    parse_siblings(data, 0)
}

fn parse_siblings(data: &[u8], base_offset: u64) -> Result<Vec<BoxNode<'_>>> {
    let mut boxes = Vec::new();
    let mut position = 0usize;

    while position < data.len() {
        let rest = &data[position..];
        let mut cursor = Cursor::new(rest);

        let size32 = cursor.read_u32()?;
        let four_cc = cursor.read_four_cc()?;

        let (total_size, header_len) = match size32 {
            // Size 0 extends to the end of the enclosing buffer.
            0 => (rest.len() as u64, 8usize),
            1 => (cursor.read_u64()?, 16usize),
            _ => (u64::from(size32), 8usize),
        };

        if total_size < header_len as u64 {
            return Err(Error::MalformedContainer(format!(
                "box {four_cc} declares size {total_size}, smaller than its header"
            )));
        }
        if total_size > rest.len() as u64 {
            return Err(Error::UnexpectedEof);
        }
        #[allow(clippy::cast_possible_truncation)]
        let total_size_usize = total_size as usize;

        let payload = &rest[header_len..total_size_usize];
        let children = if CONTAINER_TYPES.contains(&four_cc) {
            parse_siblings(payload, base_offset + position as u64 + header_len as u64)?
        } else {
            Vec::new()
        };

        boxes.push(BoxNode {
            four_cc,
            offset: base_offset + position as u64,
            size: total_size,
            payload,
            children,
        });

        position += total_size_usize;
    }

    Ok(boxes)
}

/// The first top-level box with the given type.
#[must_use]
pub fn find_box<'t, 'a>(boxes: &'t [BoxNode<'a>], four_cc: FourCc) -> Option<&'t BoxNode<'a>> {
    boxes.iter().find(|node| node.four_cc == four_cc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_box(four_cc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::try_from(payload.len() + 8).unwrap().to_be_bytes());
        data.extend_from_slice(four_cc);
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn parses_flat_boxes() {
        let mut data = plain_box(b"free", &[1, 2, 3]);
        data.extend_from_slice(&plain_box(b"mdat", &[4, 5]));

        let boxes = parse_box_tree(&data).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].four_cc, FourCc(*b"free"));
        assert_eq!(boxes[0].payload, &[1, 2, 3]);
        assert_eq!(boxes[1].four_cc, FourCc::MDAT);
        assert_eq!(boxes[1].offset, 11);
    }

    #[test]
    fn parses_container_children() {
        let trak = plain_box(b"trak", &plain_box(b"tkhd", &[0; 4]));
        let moov = plain_box(b"moov", &trak);

        let boxes = parse_box_tree(&moov).unwrap();
        assert_eq!(boxes[0].four_cc, FourCc::MOOV);
        let trak = boxes[0].child(FourCc::TRAK).unwrap();
        assert!(trak.child(FourCc::TKHD).is_some());
    }

    #[test]
    fn extended_size_is_supported() {
        let payload = [7u8; 4];
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&u64::try_from(payload.len() + 16).unwrap().to_be_bytes());
        data.extend_from_slice(&payload);

        let boxes = parse_box_tree(&data).unwrap();
        assert_eq!(boxes[0].size, 20);
        assert_eq!(boxes[0].payload, &payload);
    }

    #[test]
    fn zero_size_extends_to_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[9; 10]);

        let boxes = parse_box_tree(&data).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].payload.len(), 10);
    }

    #[test]
    fn undersized_box_is_malformed() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(b"mdat");

        assert!(matches!(
            parse_box_tree(&data),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn truncated_box_is_eof() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0; 4]);

        assert!(matches!(parse_box_tree(&data), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn cursor_never_reads_past_end() {
        let mut cursor = Cursor::new(&[1, 2, 3]);
        assert_eq!(cursor.read_u16().unwrap(), 0x0102);
        assert!(matches!(cursor.read_u32(), Err(Error::UnexpectedEof)));
        // The failed read must not consume anything.
        assert_eq!(cursor.read_u8().unwrap(), 3);
    }
}
