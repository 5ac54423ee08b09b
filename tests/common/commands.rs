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

//! Command stream builders
//!
//! Assemble FIFO bytes the way a game's GX library would emit them.

/// Opcode of a draw with topology `primitive` and vertex format `vat`
#[allow(dead_code)]
pub fn draw_opcode(primitive: u8, vat: u8) -> u8 {
    0x80 | ((primitive & 7) << 3) | (vat & 7)
}

#[allow(dead_code)]
pub const QUADS: u8 = 0;
#[allow(dead_code)]
pub const TRIANGLES: u8 = 2;
#[allow(dead_code)]
pub const TRIANGLE_STRIP: u8 = 3;
#[allow(dead_code)]
pub const LINES: u8 = 5;

/// Position plus RGBA8 color, the layout of [`Stream::color_vertex_format`]
#[derive(Debug, Clone, Copy)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

/// Big-endian GX command stream
#[derive(Debug, Default, Clone)]
pub struct Stream {
    bytes: Vec<u8>,
}

#[allow(dead_code)]
impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn nop(&mut self) -> &mut Self {
        self.bytes.push(0x00);
        self
    }

    /// BP register load (opcode 0x61)
    pub fn bp(&mut self, reg: u8, value: u32) -> &mut Self {
        self.bytes.push(0x61);
        self.bytes
            .extend_from_slice(&(((reg as u32) << 24) | (value & 0xFF_FFFF)).to_be_bytes());
        self
    }

    /// CP register load (opcode 0x08)
    pub fn cp(&mut self, sub: u8, value: u32) -> &mut Self {
        self.bytes.push(0x08);
        self.bytes.push(sub);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// XF block load (opcode 0x10), up to 16 words
    pub fn xf(&mut self, address: u16, words: &[u32]) -> &mut Self {
        assert!(!words.is_empty() && words.len() <= 16);
        let header = (((words.len() - 1) as u32) << 16) | address as u32;
        self.bytes.push(0x10);
        self.bytes.extend_from_slice(&header.to_be_bytes());
        for word in words {
            self.bytes.extend_from_slice(&word.to_be_bytes());
        }
        self
    }

    pub fn xf_floats(&mut self, address: u16, values: &[f32]) -> &mut Self {
        let words: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        self.xf(address, &words)
    }

    /// Display list call (opcode 0x40)
    pub fn call_display_list(&mut self, address: u32, size: u32) -> &mut Self {
        self.bytes.push(0x40);
        self.bytes.extend_from_slice(&address.to_be_bytes());
        self.bytes.extend_from_slice(&size.to_be_bytes());
        self
    }

    /// Draw header followed by raw vertex bytes
    pub fn draw_raw(&mut self, primitive: u8, vat: u8, count: u16, data: &[u8]) -> &mut Self {
        self.bytes.push(draw_opcode(primitive, vat));
        self.bytes.extend_from_slice(&count.to_be_bytes());
        self.bytes.extend_from_slice(data);
        self
    }

    /// Draw with float XYZ positions and RGBA8 colors
    pub fn draw(&mut self, primitive: u8, vertices: &[ColorVertex]) -> &mut Self {
        let mut data = Vec::with_capacity(vertices.len() * 16);
        for v in vertices {
            for c in v.position {
                data.extend_from_slice(&c.to_bits().to_be_bytes());
            }
            data.extend_from_slice(&v.color);
        }
        self.draw_raw(primitive, 0, vertices.len() as u16, &data)
    }

    /// Vertex format 0: direct float XYZ position, direct RGBA8 color 0
    pub fn color_vertex_format(&mut self) -> &mut Self {
        // Position direct (bits 9-10), color 0 direct (bits 13-14)
        self.cp(0x50, (1 << 9) | (1 << 13))
            .cp(0x60, 0)
            // XYZ, float, color 0 RGBA8888
            .cp(0x70, 1 | (4 << 1) | (5 << 14))
            .cp(0x30, 0)
    }

    /// Identity model-view, orthographic projection and a 640x480 viewport
    ///
    /// Clip-space x and y in -1..1 cover the EFB from (0, 0) to (640, 480).
    pub fn screen_transform(&mut self) -> &mut Self {
        self.xf_floats(
            0x0000,
            &[
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            ],
        )
        .xf_floats(
            0x101A,
            &[
                320.0,
                -240.0,
                16_777_215.0,
                342.0 + 320.0,
                342.0 + 240.0,
                16_777_215.0,
            ],
        )
        .xf_floats(0x1020, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0])
        .xf(0x1026, &[1])
        // One color channel taken from the vertex, no texgens
        .xf(0x1009, &[1])
        .xf(0x100E, &[1])
        .xf(0x1010, &[1])
        .xf(0x103F, &[0])
    }

    /// One TEV stage passing the rasterized color through
    pub fn passthrough_tev(&mut self) -> &mut Self {
        // One color channel, one stage, no culling
        self.bp(0x00, 1 << 4)
            // Scissor covering the whole EFB
            .bp(0x20, (342 << 12) | 342)
            .bp(0x21, ((342 + 639) << 12) | (342 + 527))
            // Offset is stored as (x + 342) / 2
            .bp(0x59, 171 | (171 << 10))
            // Stage 0: color 0, no texture
            .bp(0x28, 0)
            // C = RASC, A = RASA, clamped
            .bp(0xC0, 0xA | (0xF << 4) | (0xF << 8) | (0xF << 12) | (1 << 19))
            .bp(0xC1, (5 << 4) | (7 << 7) | (7 << 10) | (7 << 13) | (1 << 19))
            // Identity swap table 0
            .bp(0xF6, 1 << 2)
            .bp(0xF7, 2 | (3 << 2))
            // Alpha test always passes
            .bp(0xF3, (7 << 16) | (7 << 19))
            // No depth test, color and alpha updates, RGB8_Z24
            .bp(0x40, 0)
            .bp(0x41, (1 << 3) | (1 << 4))
            .bp(0x43, 0)
    }

    /// Vertex format, transform and TEV state for flat-shaded drawing
    pub fn flat_shading(&mut self) -> &mut Self {
        self.color_vertex_format().screen_transform().passthrough_tev()
    }

    /// Axis-aligned rectangle in EFB pixels as a single quad
    pub fn rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, color: [u8; 4]) -> &mut Self {
        let corner = |x: f32, y: f32| ColorVertex {
            position: [x / 320.0 - 1.0, 1.0 - y / 240.0, -0.5],
            color,
        };
        let vertices = [
            corner(left, top),
            corner(right, top),
            corner(right, bottom),
            corner(left, bottom),
        ];
        self.draw(QUADS, &vertices)
    }

    /// Set the EFB copy rectangle and destination
    pub fn copy_source(&mut self, left: u32, top: u32, width: u32, height: u32) -> &mut Self {
        self.bp(0x49, left | (top << 10))
            .bp(0x4A, (width - 1) | ((height - 1) << 10))
    }

    pub fn copy_destination(&mut self, address: u32, stride: u32) -> &mut Self {
        self.bp(0x4B, address >> 5).bp(0x4D, stride >> 5)
    }

    /// Trigger a texture copy in real format `format`
    pub fn copy_to_texture(&mut self, format: u32, clear: bool) -> &mut Self {
        // Target format is stored as (fmt & 7) << 1 | fmt >> 3
        let target = ((format & 7) << 1) | (format >> 3);
        self.bp(0x52, (target << 3) | ((clear as u32) << 11))
    }

    pub fn copy_to_xfb(&mut self, clear: bool) -> &mut Self {
        self.bp(0x52, (1 << 14) | ((clear as u32) << 11))
    }

    pub fn clear_color(&mut self, color: [u8; 4]) -> &mut Self {
        let [r, g, b, a] = color;
        self.bp(0x4F, ((a as u32) << 8) | r as u32)
            .bp(0x50, ((g as u32) << 8) | b as u32)
    }

    /// PE token without interrupt
    pub fn token(&mut self, value: u16) -> &mut Self {
        self.bp(0x47, value as u32)
    }

    /// Draw-done signal
    pub fn draw_done(&mut self) -> &mut Self {
        self.bp(0x45, 0x02)
    }
}
