// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
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

//! Save state serialization for the graphics pipeline
//!
//! Snapshots every stateful part of the pipeline so emulation can resume
//! deterministically.
//!
//! # Save State Format
//!
//! Save states are encoded with bincode. Fields are written in a fixed
//! order:
//! - Metadata (timestamp, frame count)
//! - BP, CP and XF register banks
//! - Texture memory
//! - Decoder state and buffered command bytes
//! - Setup unit vertex window and clipper view offset
//! - Rasterizer slopes and TEV registers
//! - EFB color and depth planes
//! - Pixel engine state and bounding box
//! - Command processor FIFO (when the caller owns one)
//! - Statistics
//!
//! # Version Compatibility
//!
//! Loading a save state with a different version fails with
//! `EmulatorError::SaveState`.
//!
//! # Example
//!
//! ```no_run
//! use swgx::core::gpu::Gpu;
//! use swgx::core::save_state::GpuSaveState;
//!
//! let gpu = Gpu::new();
//! let state = gpu.save_state(None);
//! state.save_to_file("gpu.state").unwrap();
//!
//! let loaded = GpuSaveState::load_from_file("gpu.state").unwrap();
//! let mut restored = Gpu::new();
//! restored.load_state(&loaded, None).unwrap();
//! ```

use crate::core::error::{EmulatorError, Result};
use crate::core::gpu::clipper::Clipper;
use crate::core::gpu::command_processor::FifoState;
use crate::core::gpu::efb::Efb;
use crate::core::gpu::opcode_decoder::DecoderState;
use crate::core::gpu::pixel_engine::{BoundingBox, PixelEngineState};
use crate::core::gpu::rasterizer::Rasterizer;
use crate::core::gpu::setup::SetupUnit;
use crate::core::gpu::tev::Tev;
use crate::core::gpu::xfb::XfbCopy;
use crate::core::gpu::GpuStatistics;
use bincode::{config, Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Save state version for compatibility checking
///
/// Incremented whenever the layout below changes.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Save state metadata
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
#[bincode(encode_bounds = "", decode_bounds = "")]
pub struct SaveStateMetadata {
    /// Timestamp when the save state was created
    #[bincode(with_serde)]
    pub timestamp: DateTime<Utc>,

    /// Frames presented before the snapshot
    pub frame_count: u64,
}

/// Complete pipeline snapshot
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct GpuSaveState {
    /// Version number for compatibility checking
    pub version: u32,

    pub metadata: SaveStateMetadata,

    /// Register banks as raw words
    pub bp: Vec<u32>,
    pub cp: Vec<u32>,
    pub xf: Vec<u32>,

    pub tmem: Vec<u8>,

    pub decoder: DecoderState,

    /// Bytes of an incomplete trailing command
    pub pending: Vec<u8>,

    pub setup: SetupUnit,
    pub clipper: Clipper,
    pub rasterizer: Rasterizer,
    pub tev: Tev,
    pub efb: Efb,
    pub pixel_engine: PixelEngineState,
    pub bounding_box: BoundingBox,

    /// FIFO ring, absent when the snapshot was taken without one
    pub fifo: Option<FifoState>,

    /// Position of the last XFB copy
    pub last_xfb: Option<XfbCopy>,

    pub triangle_index: u32,
    pub stats: GpuStatistics,
}

impl GpuSaveState {
    /// Encode to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, config::standard())
            .map_err(|e| EmulatorError::SaveState(e.to_string()))
    }

    /// Decode from bytes, checking the version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (state, _): (GpuSaveState, usize) =
            bincode::decode_from_slice(bytes, config::standard())
                .map_err(|e| EmulatorError::SaveState(e.to_string()))?;

        if state.version != SAVE_STATE_VERSION {
            return Err(EmulatorError::SaveState(format!(
                "Incompatible save state version: expected {}, got {}",
                SAVE_STATE_VERSION, state.version
            )));
        }

        Ok(state)
    }

    /// Save state to file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written, or encoding
    /// fails.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = self.to_bytes()?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&encoded)?;
        log::info!(
            "Saved GPU state to {} ({} bytes)",
            path.as_ref().display(),
            encoded.len()
        );
        Ok(())
    }

    /// Load state from file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be opened or read
    /// - Decoding fails
    /// - Version is incompatible
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let state = Self::from_bytes(&buffer)?;
        log::info!("Loaded GPU state from {}", path.as_ref().display());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::Gpu;

    #[test]
    fn test_save_state_version() {
        assert_eq!(SAVE_STATE_VERSION, 1);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let gpu = Gpu::new();
        let state = gpu.save_state(None);
        let bytes = state.to_bytes().unwrap();
        let decoded = GpuSaveState::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.version, SAVE_STATE_VERSION);
        assert_eq!(decoded.bp, state.bp);
        assert_eq!(decoded.efb.color_plane().len(), state.efb.color_plane().len());
        assert!(decoded.fifo.is_none());
    }

    #[test]
    fn test_version_check() {
        let mut state = Gpu::new().save_state(None);
        state.version = 999;
        let bytes = state.to_bytes().unwrap();

        match GpuSaveState::from_bytes(&bytes) {
            Err(EmulatorError::SaveState(msg)) => {
                assert!(msg.contains("Incompatible save state version"))
            }
            other => panic!("expected version error, got {:?}", other.map(|s| s.version)),
        }
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu.state");

        let state = Gpu::new().save_state(None);
        state.save_to_file(&path).unwrap();
        let loaded = GpuSaveState::load_from_file(&path).unwrap();

        assert_eq!(loaded.tmem.len(), state.tmem.len());
        assert_eq!(loaded.metadata.frame_count, 0);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            GpuSaveState::from_bytes(&[1, 2, 3]),
            Err(EmulatorError::SaveState(_))
        ));
    }
}
