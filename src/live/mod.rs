//! The live surface: encoder abstraction and the sliding-window pipeline.
//!
//! Everything here is actor-shaped: each encoder and each pipeline
//! serializes its operations behind an async mutex, so callers may share
//! instances freely across tasks. The playlist model, writer and
//! segmenter stay pure and are driven from here.

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

mod encoder;
mod pipeline;

pub use encoder::{
    encode_all, AacCodec, AacEncoder, EncoderConfig, EncoderPhase, EncoderPreset, LiveEncoder,
    PassthroughAacCodec,
};
pub use pipeline::{LivePipeline, LivePipelineConfig, PipelineEvent};
