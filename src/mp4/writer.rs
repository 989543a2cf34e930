//! ISO-BMFF box building.

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

use super::reader::FourCc;

/// Writes a box: the payload is produced by `build`, then the 32-bit size
/// is patched over the placeholder.
pub fn write_box(buffer: &mut BytesMut, four_cc: FourCc, build: impl FnOnce(&mut BytesMut)) {
    let start = buffer.len();
    buffer.put_u32(0);
    buffer.put_slice(four_cc.as_bytes());

    build(buffer);

    let size = buffer.len() - start;
    #[allow(clippy::cast_possible_truncation)]
    buffer[start..start + 4].copy_from_slice(&(size as u32).to_be_bytes());
}

/// Writes a full box (version byte plus 24-bit flags before the payload).
pub fn write_full_box(
    buffer: &mut BytesMut,
    four_cc: FourCc,
    version: u8,
    flags: u32,
    build: impl FnOnce(&mut BytesMut),
) {
    write_box(buffer, four_cc, |buffer| {
        buffer.put_u8(version);
        buffer.put_slice(&flags.to_be_bytes()[1..]);
        build(buffer);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::reader::parse_box_tree;

    #[test]
    fn size_is_patched_over_placeholder() {
        let mut buffer = BytesMut::new();
        write_box(&mut buffer, FourCc::MDAT, |buffer| {
            buffer.put_slice(&[1, 2, 3]);
        });

        assert_eq!(&buffer[..4], &11u32.to_be_bytes());
        let boxes = parse_box_tree(&buffer).unwrap();
        assert_eq!(boxes[0].four_cc, FourCc::MDAT);
        assert_eq!(boxes[0].payload, &[1, 2, 3]);
    }

    #[test]
    fn full_box_carries_version_and_flags() {
        let mut buffer = BytesMut::new();
        write_full_box(&mut buffer, FourCc::MFHD, 1, 0x00_00_07, |buffer| {
            buffer.put_u32(42);
        });

        let boxes = parse_box_tree(&buffer).unwrap();
        assert_eq!(boxes[0].payload, &[1, 0, 0, 7, 0, 0, 0, 42]);
    }
}
