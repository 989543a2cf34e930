//! DRM bookkeeping: key rotation, key material, PSSH boxes and session
//! key tags. License acquisition protocols are out of scope; this module
//! produces the tags and boxes that reference them.

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
use rand::RngCore;
use tracing::debug;

use crate::{
    mp4::{write_box, FourCc},
    EncryptionMethod, KeyFormat,
};

/// When the live pipeline replaces its content key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyRotationPolicy {
    /// One key for the whole stream.
    None,

    EverySegment,

    EveryNSegments(u64),

    /// Rotate after this many seconds of media time.
    Interval(f64),

    /// Rotation happens only when requested explicitly.
    Manual,
}

impl KeyRotationPolicy {
    /// Whether a new key is due before appending the segment at
    /// `segment_index`. `last_rotation_segment` is `None` until the first
    /// key has been issued.
    #[must_use]
    pub fn should_rotate(
        &self,
        segment_index: u64,
        elapsed_since_last_rotation: f64,
        last_rotation_segment: Option<u64>,
    ) -> bool {
        match self {
            Self::None | Self::Manual => false,
            Self::EverySegment => {
                last_rotation_segment.map_or(true, |last| segment_index > last)
            }
            Self::EveryNSegments(n) => {
                last_rotation_segment.map_or(true, |last| segment_index - last >= *n)
            }
            Self::Interval(seconds) => {
                last_rotation_segment.is_none() || elapsed_since_last_rotation >= *seconds
            }
        }
    }
}

/// One generation of content key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key_id: [u8; 16],
    pub key_bytes: [u8; 16],
    pub iv: [u8; 16],
}

impl KeyMaterial {
    fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key_id = [0u8; 16];
        let mut key_bytes = [0u8; 16];
        let mut iv = [0u8; 16];
        rng.fill_bytes(&mut key_id);
        rng.fill_bytes(&mut key_bytes);
        rng.fill_bytes(&mut iv);
        Self {
            key_id,
            key_bytes,
            iv,
        }
    }

    /// The IV as the integer the `IV=` attribute carries.
    #[must_use]
    pub fn iv_value(&self) -> u128 {
        u128::from_be_bytes(self.iv)
    }
}

/// Issues and rotates key material according to a [`KeyRotationPolicy`].
///
/// The manager is driven by media time, never by the wall clock, so
/// rotation points are deterministic for a given segment sequence.
#[derive(Debug)]
pub struct KeyManager {
    policy: KeyRotationPolicy,

    /// Base of the EXT-X-KEY URI; the hex key id is appended.
    key_uri_prefix: String,

    current: Option<KeyMaterial>,
    last_rotation_segment: Option<u64>,
    last_rotation_time: f64,
}

impl KeyManager {
    #[must_use]
    pub fn new(policy: KeyRotationPolicy, key_uri_prefix: impl Into<String>) -> Self {
        Self {
            policy,
            key_uri_prefix: key_uri_prefix.into(),
            current: None,
            last_rotation_segment: None,
            last_rotation_time: 0.0,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&KeyMaterial> {
        self.current.as_ref()
    }

    #[must_use]
    pub const fn last_rotation_segment(&self) -> Option<u64> {
        self.last_rotation_segment
    }

    /// The key under which the segment at `segment_index` must be
    /// encrypted, rotating first when the policy says so. `media_time` is
    /// the stream position in seconds.
    ///
    /// Returns `true` when a rotation happened, meaning the segment is
    /// the first one under the new key and its `EXT-X-KEY` tag must be
    /// emitted immediately before it.
    pub fn bind_segment(&mut self, segment_index: u64, media_time: f64) -> bool {
        let elapsed = media_time - self.last_rotation_time;
        let due = self.current.is_none()
            || self
                .policy
                .should_rotate(segment_index, elapsed, self.last_rotation_segment);
        if !due {
            return false;
        }

        self.rotate(segment_index, media_time);
        true
    }

    /// Forces a rotation, for [`KeyRotationPolicy::Manual`].
    pub fn rotate(&mut self, segment_index: u64, media_time: f64) {
        let material = KeyMaterial::generate();
        debug!(
            segment_index,
            key_id = %hex::encode(material.key_id),
            "rotated content key"
        );
        self.current = Some(material);
        self.last_rotation_segment = Some(segment_index);
        self.last_rotation_time = media_time;
    }

    /// The `EXT-X-KEY` value for the current key.
    #[must_use]
    pub fn key_tag(&self) -> Option<EncryptionMethod> {
        let material = self.current.as_ref()?;
        Some(EncryptionMethod::Aes128 {
            uri: format!("{}{}", self.key_uri_prefix, hex::encode(material.key_id)),
            iv: Some(material.iv_value()),
            key_format: KeyFormat::Identity,
            key_format_versions: vec![],
        })
    }
}

/// A DRM system participating in Common Encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrmSystem {
    Widevine,
    PlayReady,
    FairPlay,
}

impl DrmSystem {
    /// The 16-byte system id registered for this DRM system.
    #[must_use]
    pub const fn system_id(self) -> [u8; 16] {
        match self {
            Self::Widevine => [
                0xED, 0xEF, 0x8B, 0xA9, 0x79, 0xD6, 0x4A, 0xCE, 0xA3, 0xC8, 0x27, 0xDC, 0xD5,
                0x1D, 0x21, 0xED,
            ],
            Self::PlayReady => [
                0x9A, 0x04, 0xF0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xAB, 0x92, 0xE6, 0x5B, 0xE0,
                0x88, 0x5F, 0x95,
            ],
            Self::FairPlay => [
                0x94, 0xCE, 0x86, 0xFB, 0x07, 0xFF, 0x4F, 0x43, 0xAD, 0xB8, 0x93, 0xD2, 0xFA,
                0x96, 0x8C, 0xA2,
            ],
        }
    }

    /// The system id as a lowercase hyphenated UUID.
    #[must_use]
    pub fn uuid_string(self) -> String {
        let id = self.system_id();
        let hex = hex::encode(id);
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }

    /// The `KEYFORMAT` value identifying this system in a playlist.
    #[must_use]
    pub fn key_format(self) -> KeyFormat {
        match self {
            Self::FairPlay => KeyFormat::Other("com.apple.streamingkeydelivery".to_owned()),
            _ => KeyFormat::Other(format!("urn:uuid:{}", self.uuid_string())),
        }
    }
}

/// Builds a `pssh` box (version 1) binding the key id to the system.
#[must_use]
pub fn pssh_box(system: DrmSystem, key_ids: &[[u8; 16]], data: &[u8]) -> Bytes {
    let mut buffer = BytesMut::new();
    write_box(&mut buffer, FourCc::PSSH, |buffer| {
        buffer.put_u8(1);
        buffer.put_slice(&[0, 0, 0]); // flags
        buffer.put_slice(&system.system_id());
        #[allow(clippy::cast_possible_truncation)]
        buffer.put_u32(key_ids.len() as u32);
        for key_id in key_ids {
            buffer.put_slice(key_id);
        }
        #[allow(clippy::cast_possible_truncation)]
        buffer.put_u32(data.len() as u32);
        buffer.put_slice(data);
    });
    buffer.freeze()
}

/// FairPlay Streaming configuration for a live pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FairPlayLiveConfig {
    /// The `skd://` key server URI placed in the session key tag.
    pub key_server_uri: String,
}

impl FairPlayLiveConfig {
    /// The `EXT-X-SESSION-KEY` entry advertised in the multivariant
    /// playlist.
    #[must_use]
    pub fn session_key(&self) -> EncryptionMethod {
        EncryptionMethod::SampleAesCtr {
            uri: self.key_server_uri.clone(),
            key_format: KeyFormat::Other("com.apple.streamingkeydelivery".to_owned()),
            key_format_versions: vec![1],
        }
    }
}

/// Common Encryption configuration for multi-DRM output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CencConfig {
    pub systems: Vec<DrmSystem>,

    pub default_key_id: [u8; 16],

    /// Base of each session key URI; the hex key id is appended.
    pub key_uri_prefix: String,
}

impl CencConfig {
    /// One `EXT-X-SESSION-KEY` entry per configured system.
    #[must_use]
    pub fn session_keys(&self) -> Vec<EncryptionMethod> {
        self.systems
            .iter()
            .map(|system| EncryptionMethod::SampleAesCtr {
                uri: format!("{}{}", self.key_uri_prefix, hex::encode(self.default_key_id)),
                key_format: system.key_format(),
                key_format_versions: vec![1],
            })
            .collect()
    }

    /// One `pssh` box per configured system, each carrying the default
    /// key id.
    #[must_use]
    pub fn pssh_boxes(&self) -> Vec<(DrmSystem, Bytes)> {
        self.systems
            .iter()
            .map(|system| {
                (
                    *system,
                    pssh_box(*system, &[self.default_key_id], &self.default_key_id),
                )
            })
            .collect()
    }
}

/// Everything the live pipeline needs to know about encryption.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveDrmPipelineConfig {
    pub rotation: KeyRotationPolicy,

    /// Base of each media key URI; the hex key id is appended.
    pub key_uri_prefix: String,

    pub fairplay: Option<FairPlayLiveConfig>,

    pub cenc: Option<CencConfig>,
}

impl Default for LiveDrmPipelineConfig {
    fn default() -> Self {
        Self {
            rotation: KeyRotationPolicy::None,
            key_uri_prefix: "key://".to_owned(),
            fairplay: None,
            cenc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::mp4::parse_box_tree;

    #[rstest]
    fn rotation_every_n_segments_is_deterministic() {
        let mut manager = KeyManager::new(KeyRotationPolicy::EveryNSegments(3), "key://");

        let mut rotated_at = Vec::new();
        let mut key_ids = Vec::new();
        for segment_index in 0..10u64 {
            #[allow(clippy::cast_precision_loss)]
            if manager.bind_segment(segment_index, segment_index as f64) {
                rotated_at.push(segment_index);
                key_ids.push(manager.current().unwrap().key_id);
            }
        }

        assert_eq!(rotated_at, vec![0, 3, 6, 9]);
        for pair in key_ids.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[rstest]
    fn rotation_every_segment() {
        let mut manager = KeyManager::new(KeyRotationPolicy::EverySegment, "key://");
        let rotations = (0..4u64)
            .filter(|index| {
                #[allow(clippy::cast_precision_loss)]
                let rotated = manager.bind_segment(*index, *index as f64);
                rotated
            })
            .count();
        assert_eq!(rotations, 4);
    }

    #[rstest]
    fn interval_rotation_follows_media_time() {
        let mut manager = KeyManager::new(KeyRotationPolicy::Interval(10.0), "key://");

        assert!(manager.bind_segment(0, 0.0));
        assert!(!manager.bind_segment(1, 4.0));
        assert!(!manager.bind_segment(2, 8.0));
        assert!(manager.bind_segment(3, 12.0));
        assert_eq!(manager.last_rotation_segment(), Some(3));
    }

    #[rstest]
    fn manual_policy_never_rotates_on_its_own() {
        let mut manager = KeyManager::new(KeyRotationPolicy::Manual, "key://");
        assert!(manager.bind_segment(0, 0.0)); // initial key issue
        for index in 1..50u64 {
            assert!(!manager.bind_segment(index, index as f64));
        }
        manager.rotate(50, 50.0);
        assert_eq!(manager.last_rotation_segment(), Some(50));
    }

    #[rstest]
    fn key_tag_carries_uri_and_iv() {
        let mut manager = KeyManager::new(KeyRotationPolicy::EverySegment, "https://keys/");
        manager.bind_segment(0, 0.0);

        let Some(EncryptionMethod::Aes128 { uri, iv, .. }) = manager.key_tag() else {
            panic!("expected an AES-128 key tag");
        };
        assert!(uri.starts_with("https://keys/"));
        assert_eq!(uri.len(), "https://keys/".len() + 32);
        assert!(iv.is_some());
    }

    #[rstest]
    fn system_uuids_match_registration() {
        assert_eq!(
            DrmSystem::Widevine.uuid_string(),
            "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
        );
        assert_eq!(
            DrmSystem::PlayReady.uuid_string(),
            "9a04f079-9840-4286-ab92-e65be0885f95"
        );
        assert_eq!(
            DrmSystem::FairPlay.uuid_string(),
            "94ce86fb-07ff-4f43-adb8-93d2fa968ca2"
        );
    }

    #[rstest]
    fn pssh_box_parses_back() {
        let key_id = [7u8; 16];
        let pssh = pssh_box(DrmSystem::Widevine, &[key_id], &key_id);

        let boxes = parse_box_tree(&pssh).unwrap();
        assert_eq!(boxes[0].four_cc, FourCc::PSSH);
        // version 1, then system id.
        assert_eq!(boxes[0].payload[0], 1);
        assert_eq!(&boxes[0].payload[4..20], &DrmSystem::Widevine.system_id());
        assert_eq!(&boxes[0].payload[24..40], &key_id);
    }

    #[rstest]
    fn cenc_session_keys_name_each_system() {
        let config = CencConfig {
            systems: vec![DrmSystem::Widevine, DrmSystem::PlayReady],
            default_key_id: [1; 16],
            key_uri_prefix: "https://keys/".to_owned(),
        };

        let keys = config.session_keys();
        assert_eq!(keys.len(), 2);

        let formats: Vec<String> = keys
            .iter()
            .map(|key| match key.key_format() {
                KeyFormat::Other(format) => format.clone(),
                KeyFormat::Identity => panic!("expected explicit key formats"),
            })
            .collect();
        assert_eq!(
            formats,
            vec![
                "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed".to_owned(),
                "urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95".to_owned(),
            ]
        );
    }

    #[rstest]
    fn fairplay_session_key_serializes_to_expected_tag() {
        let config = FairPlayLiveConfig {
            key_server_uri: "skd://keyserver.example.com/asset42".to_owned(),
        };

        let mut output = Vec::new();
        crate::tags::Tag::XSessionKey(config.session_key())
            .serialize(&mut output)
            .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "#EXT-X-SESSION-KEY:METHOD=SAMPLE-AES-CTR,URI=\"skd://keyserver.example.com/asset42\",KEYFORMAT=\"com.apple.streamingkeydelivery\"\n"
        );
    }
}
