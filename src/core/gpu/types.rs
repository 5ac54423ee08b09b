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

//! GPU type definitions
//!
//! Vertex records passed between pipeline stages, the primitive topologies,
//! a big-endian stream reader and per-frame statistics.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// EFB width in pixels
pub const EFB_WIDTH: u32 = 640;

/// EFB height in pixels
pub const EFB_HEIGHT: u32 = 528;

/// Primitive topology selected by a draw opcode
///
/// Encoded in bits 3-5 of the draw opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum Primitive {
    Quads,
    Quads2,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    Points,
}

impl Primitive {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 7 {
            0 => Primitive::Quads,
            1 => Primitive::Quads2,
            2 => Primitive::Triangles,
            3 => Primitive::TriangleStrip,
            4 => Primitive::TriangleFan,
            5 => Primitive::Lines,
            6 => Primitive::LineStrip,
            _ => Primitive::Points,
        }
    }
}

/// A decoded but untransformed vertex
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputVertexData {
    pub pos_mtx: u8,
    pub tex_mtx: [u8; 8],
    pub position: [f32; 3],
    /// Normal, binormal, tangent
    pub normal: [[f32; 3]; 3],
    /// RGBA
    pub color: [[u8; 4]; 2],
    pub tex_coords: [[f32; 2]; 8],
}

/// A transformed vertex
///
/// `screen_position` is only valid after the perspective divide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct OutputVertexData {
    pub mv_position: [f32; 3],
    pub projected_position: [f32; 4],
    pub screen_position: [f32; 3],
    pub normal: [[f32; 3]; 3],
    /// RGBA
    pub color: [[u8; 4]; 2],
    pub tex_coords: [[f32; 3]; 8],
}

impl OutputVertexData {
    /// Interpolate from `a` toward `b` by `t`
    ///
    /// Colors use 8-bit fixed point weights.
    pub fn lerp(t: f32, a: &OutputVertexData, b: &OutputVertexData) -> OutputVertexData {
        let mut out = OutputVertexData::default();
        let lf = |x: f32, y: f32| x + (y - x) * t;

        for i in 0..3 {
            out.mv_position[i] = lf(a.mv_position[i], b.mv_position[i]);
        }
        for i in 0..4 {
            out.projected_position[i] = lf(a.projected_position[i], b.projected_position[i]);
        }
        for n in 0..3 {
            for i in 0..3 {
                out.normal[n][i] = lf(a.normal[n][i], b.normal[n][i]);
            }
        }

        let t_int = (t * 256.0) as i32;
        for c in 0..2 {
            for i in 0..4 {
                let from = a.color[c][i] as i32;
                let to = b.color[c][i] as i32;
                out.color[c][i] = (from + (((to - from) * t_int) >> 8)) as u8;
            }
        }

        for tc in 0..8 {
            for i in 0..3 {
                out.tex_coords[tc][i] = lf(a.tex_coords[tc][i], b.tex_coords[tc][i]);
            }
        }
        out
    }
}

/// Per-frame pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct GpuStatistics {
    pub vertices_loaded: u32,
    pub primitives: u32,
    pub triangles_in: u32,
    pub triangles_rejected: u32,
    pub triangles_culled: u32,
    pub triangles_clipped: u32,
    pub triangles_drawn: u32,
    pub rasterized_pixels: u32,
    pub tev_pixels_in: u32,
    pub tev_pixels_out: u32,
    pub efb_copies: u32,
    pub display_lists: u32,
}

/// Warn-once latches for approximate pipeline paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineWarnings {
    /// An undefined konst selector was read
    pub invalid_konst: bool,
    /// RGB565_Z16 is selected and has been reported
    pub rgb565_z16: bool,
}

/// Big-endian cursor over a command stream
///
/// # Example
///
/// ```
/// use swgx::core::gpu::DataReader;
///
/// let data = [0x61, 0x00, 0x12, 0x34, 0x56];
/// let mut reader = DataReader::new(&data);
/// assert_eq!(reader.read_u8(), Some(0x61));
/// assert_eq!(reader.read_u32(), Some(0x00123456));
/// assert_eq!(reader.remaining(), 0);
/// ```
pub struct DataReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline(always)]
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    #[inline(always)]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    #[inline(always)]
    pub fn skip(&mut self, len: usize) -> Option<()> {
        self.read_bytes(len).map(|_| ())
    }

    #[inline(always)]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    #[inline(always)]
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_bytes(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    #[inline(always)]
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[inline(always)]
pub(crate) fn dot3(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline(always)]
pub(crate) fn sub3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline(always)]
pub(crate) fn scale3(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Unit vector along `a`; the zero vector stays zero
#[inline(always)]
pub(crate) fn normalize3(a: [f32; 3]) -> [f32; 3] {
    let len2 = dot3(a, a);
    if len2 == 0.0 {
        return a;
    }
    scale3(a, 1.0 / len2.sqrt())
}
