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

//! EFB to texture copies
//!
//! Re-packs the copy source rectangle into the tiled texture layouts the
//! decoder reads. Output is produced one row of blocks at a time; rows are
//! written to main memory `copy_dest_stride` bytes apart.
//!
//! # Copy Formats
//!
//! | Value | Format | Block | Intensity variant |
//! |-------|--------|-------|-------------------|
//! | 0x0 | R4 | 8x8 | I4 |
//! | 0x1, 0x8 | R8 | 8x4 | I8 |
//! | 0x2 | RA4 | 8x4 | IA4 |
//! | 0x3 | RA8 | 4x4 | IA8 |
//! | 0x4 | RGB565 | 4x4 | |
//! | 0x5 | RGB5A3 | 4x4 | |
//! | 0x6 | RGBA8 | 4x4, 64 bytes | |
//! | 0x7 | A8 | 8x4 | |
//! | 0x9 | G8 | 8x4 | |
//! | 0xA | B8 | 8x4 | |
//! | 0xB | RG8 | 4x4 | |
//! | 0xC | GB8 | 4x4 | |
//!
//! Depth copies (pixel format Z24) read the 24-bit depth as R = high byte,
//! G = middle byte, B = low byte, so R8, G8 and B8 give Z8, Z8M and Z8L.

use crate::core::error::Result;
use crate::core::gpu::efb::Efb;
use crate::core::gpu::registers::bp::{CopyTrigger, PixelFormat, BPMEM_TRIGGER_EFB_COPY};
use crate::core::gpu::registers::BpMemory;
use crate::core::memory::MemoryAccessor;

/// Texture copy destination format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    R4,
    R8,
    RA4,
    RA8,
    Rgb565,
    Rgb5a3,
    Rgba8,
    A8,
    G8,
    B8,
    RG8,
    GB8,
}

impl CopyFormat {
    /// Decode a real copy format value
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x0 => Some(CopyFormat::R4),
            0x1 | 0x8 => Some(CopyFormat::R8),
            0x2 => Some(CopyFormat::RA4),
            0x3 => Some(CopyFormat::RA8),
            0x4 => Some(CopyFormat::Rgb565),
            0x5 => Some(CopyFormat::Rgb5a3),
            0x6 => Some(CopyFormat::Rgba8),
            0x7 => Some(CopyFormat::A8),
            0x9 => Some(CopyFormat::G8),
            0xA => Some(CopyFormat::B8),
            0xB => Some(CopyFormat::RG8),
            0xC => Some(CopyFormat::GB8),
            _ => None,
        }
    }

    /// Block size in texels as (log2 width, log2 height)
    fn block_shift(self) -> (u32, u32) {
        match self {
            CopyFormat::R4 => (3, 3),
            CopyFormat::R8 | CopyFormat::RA4 | CopyFormat::A8 | CopyFormat::G8 | CopyFormat::B8 => {
                (3, 2)
            }
            _ => (2, 2),
        }
    }

    /// Bytes per block
    pub fn block_bytes(self) -> usize {
        match self {
            CopyFormat::Rgba8 => 64,
            _ => 32,
        }
    }

    /// Formats the intensity conversion applies to
    fn supports_intensity(self) -> bool {
        matches!(
            self,
            CopyFormat::R4 | CopyFormat::R8 | CopyFormat::RA4 | CopyFormat::RA8
        )
    }

    /// Formats that have a meaning for depth sources
    fn supports_depth(self) -> bool {
        !matches!(
            self,
            CopyFormat::RA4 | CopyFormat::Rgb565 | CopyFormat::Rgb5a3 | CopyFormat::A8
        )
    }
}

/// Y of the BT.601 conversion, range 16..=235
#[inline]
pub fn rgb_to_intensity(r: u8, g: u8, b: u8) -> u8 {
    ((4096 + 66 * r as u32 + 129 * g as u32 + 25 * b as u32) >> 8) as u8
}

/// Where copy texels come from
struct CopySource<'a> {
    efb: &'a Efb,
    bp: &'a BpMemory,
    left: u32,
    top: u32,
    half_scale: bool,
    depth: bool,
    intensity: bool,
    format: PixelFormat,
}

impl CopySource<'_> {
    /// Source color of destination texel (s, t)
    fn texel(&self, s: u32, t: u32) -> [u8; 4] {
        let shift = self.half_scale as u32;
        let x = self.left + (s << shift);
        let y = self.top + (t << shift);

        let mut color = if self.depth {
            self.depth_texel(x, y)
        } else if self.half_scale {
            self.box_filtered(x, y)
        } else {
            self.efb.get_color(self.bp, x, y)
        };

        if self.intensity {
            let i = rgb_to_intensity(color[0], color[1], color[2]);
            color = [i, i, i, color[3]];
        }
        color
    }

    fn depth_texel(&self, x: u32, y: u32) -> [u8; 4] {
        let z = if self.half_scale {
            let sum: u32 = [(0, 0), (1, 0), (0, 1), (1, 1)]
                .iter()
                .map(|&(dx, dy)| self.efb.depth_value(x + dx, y + dy))
                .sum();
            sum >> 2
        } else {
            self.efb.depth_value(x, y)
        };
        [(z >> 16) as u8, (z >> 8) as u8, z as u8, 0xFF]
    }

    /// 2x2 box filter at (x, y)
    fn box_filtered(&self, x: u32, y: u32) -> [u8; 4] {
        let corners = [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)];
        let mut sum = [0u32; 4];

        if self.format == PixelFormat::Rgba6Z24 {
            // Sum the raw 6-bit channels, then widen with the hardware rounding
            for &(px, py) in &corners {
                let word = self.efb.color_word(px, py);
                sum[0] += (word >> 18) & 0x3F;
                sum[1] += (word >> 12) & 0x3F;
                sum[2] += (word >> 6) & 0x3F;
                sum[3] += word & 0x3F;
            }
            sum.map(|s| (s + (s >> 6)) as u8)
        } else {
            for &(px, py) in &corners {
                let c = self.efb.get_color(self.bp, px, py);
                for i in 0..3 {
                    sum[i] += c[i] as u32;
                }
            }
            [(sum[0] >> 2) as u8, (sum[1] >> 2) as u8, (sum[2] >> 2) as u8, 0xFF]
        }
    }
}

/// Pack one block with top-left texel (s0, t0)
fn encode_block(format: CopyFormat, src: &CopySource<'_>, s0: u32, t0: u32, out: &mut Vec<u8>) {
    let (bw, bh) = format.block_shift();
    let (bw, bh) = (1u32 << bw, 1u32 << bh);
    let texels = move || (0..bh).flat_map(move |t| (0..bw).map(move |s| (s0 + s, t0 + t)));

    match format {
        CopyFormat::R4 => {
            for t in 0..bh {
                for s in (0..bw).step_by(2) {
                    let hi = src.texel(s0 + s, t0 + t)[0] & 0xF0;
                    let lo = src.texel(s0 + s + 1, t0 + t)[0] >> 4;
                    out.push(hi | lo);
                }
            }
        }
        CopyFormat::R8 => out.extend(texels().map(|(s, t)| src.texel(s, t)[0])),
        CopyFormat::A8 => out.extend(texels().map(|(s, t)| src.texel(s, t)[3])),
        CopyFormat::G8 => out.extend(texels().map(|(s, t)| src.texel(s, t)[1])),
        CopyFormat::B8 => out.extend(texels().map(|(s, t)| src.texel(s, t)[2])),
        CopyFormat::RA4 => out.extend(texels().map(|(s, t)| {
            let c = src.texel(s, t);
            (c[3] & 0xF0) | (c[0] >> 4)
        })),
        CopyFormat::RA8 => {
            for (s, t) in texels() {
                let c = src.texel(s, t);
                if src.depth {
                    // Z16: high then middle byte
                    out.extend_from_slice(&[c[0], c[1]]);
                } else {
                    out.extend_from_slice(&[c[3], c[0]]);
                }
            }
        }
        CopyFormat::RG8 => {
            for (s, t) in texels() {
                let c = src.texel(s, t);
                out.extend_from_slice(&[c[1], c[0]]);
            }
        }
        CopyFormat::GB8 => {
            for (s, t) in texels() {
                let c = src.texel(s, t);
                out.extend_from_slice(&[c[2], c[1]]);
            }
        }
        CopyFormat::Rgb565 => {
            for (s, t) in texels() {
                let [r, g, b, _] = src.texel(s, t);
                let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        CopyFormat::Rgb5a3 => {
            for (s, t) in texels() {
                let [r, g, b, a] = src.texel(s, t);
                let a3 = a >> 5;
                let v = if a3 == 7 {
                    0x8000 | ((r as u16 >> 3) << 10) | ((g as u16 >> 3) << 5) | (b as u16 >> 3)
                } else {
                    ((a3 as u16) << 12)
                        | ((r as u16 >> 4) << 8)
                        | ((g as u16 >> 4) << 4)
                        | (b as u16 >> 4)
                };
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        CopyFormat::Rgba8 => {
            let colors: Vec<[u8; 4]> = texels().map(|(s, t)| src.texel(s, t)).collect();
            for c in &colors {
                out.extend_from_slice(&[c[3], c[0]]);
            }
            for c in &colors {
                out.extend_from_slice(&[c[1], c[2]]);
            }
        }
    }
}

/// Encode the copy source rectangle as block rows
///
/// Returns `None` for formats that have no encoding for the current source.
pub fn encode_efb_copy(efb: &Efb, bp: &BpMemory) -> Option<Vec<Vec<u8>>> {
    let trigger = CopyTrigger(bp.raw(BPMEM_TRIGGER_EFB_COPY));
    let Some(format) = CopyFormat::from_bits(trigger.real_format()) else {
        log::error!("Unknown EFB copy format 0x{:X}", trigger.real_format());
        return None;
    };

    let pixel_format = bp.pixel_format();
    let depth = pixel_format == PixelFormat::Z24;
    if depth && !format.supports_depth() {
        log::warn!("EFB depth copy to {:?} is not supported", format);
        return None;
    }
    if pixel_format == PixelFormat::Rgb565Z16 {
        log::warn!("EFB copy from RGB565_Z16 is approximated as RGB8");
    }

    let half_scale = trigger.half_scale() != 0;
    let src_xy = bp.copy_src_xy();
    let src_wh = bp.copy_src_wh();
    let source = CopySource {
        efb,
        bp,
        left: src_xy.x(),
        top: src_xy.y(),
        half_scale,
        depth,
        intensity: trigger.intensity_fmt() != 0 && format.supports_intensity() && !depth,
        format: pixel_format,
    };

    let width_minus_1 = src_wh.x() >> half_scale as u32;
    let height_minus_1 = src_wh.y() >> half_scale as u32;
    let (bw, bh) = format.block_shift();
    let blocks_x = (width_minus_1 >> bw) + 1;
    let blocks_y = (height_minus_1 >> bh) + 1;

    log::debug!(
        "EFB copy {:?}: {}x{} blocks from ({}, {}), half scale {}",
        format,
        blocks_x,
        blocks_y,
        source.left,
        source.top,
        half_scale
    );

    let rows = (0..blocks_y)
        .map(|by| {
            let mut row = Vec::with_capacity(blocks_x as usize * format.block_bytes());
            for bx in 0..blocks_x {
                encode_block(format, &source, bx << bw, by << bh, &mut row);
            }
            row
        })
        .collect();
    Some(rows)
}

/// Encode the copy source and write it to the copy destination
pub fn copy_efb_to_memory(efb: &Efb, bp: &BpMemory, memory: &mut dyn MemoryAccessor) -> Result<()> {
    let Some(rows) = encode_efb_copy(efb, bp) else {
        return Ok(());
    };

    let dest = bp.copy_dest_address();
    let stride = bp.copy_dest_stride();
    for (i, row) in rows.iter().enumerate() {
        let address = dest.wrapping_add(i as u32 * stride);
        memory.write_bytes(address, row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::registers::bp::{
        BPMEM_BLENDMODE, BPMEM_EFB_ADDR, BPMEM_EFB_TL, BPMEM_EFB_WH, BPMEM_MIPMAP_STRIDE,
        BPMEM_ZCOMPARE,
    };
    use crate::core::gpu::texture::decoder::{decode_texel, TextureFormat, TlutFormat};
    use crate::core::memory::MainMemory;

    /// Copy trigger value for a real format
    fn trigger_for(real: u32, half_scale: bool, intensity: bool) -> u32 {
        // Undo real_format = fmt / 2 + (fmt & 1) * 8
        let fmt = ((real & 7) << 1) | (real >> 3);
        let mut t = CopyTrigger(0);
        t.set_target_pixel_format(fmt);
        t.set_half_scale(half_scale as u32);
        t.set_intensity_fmt(intensity as u32);
        t.0
    }

    fn setup(width: u32, height: u32, trigger: u32, pixel_format: u32) -> BpMemory {
        let mut bp = BpMemory::new();
        bp.set_raw(BPMEM_ZCOMPARE, pixel_format);
        // Color and alpha updates on
        bp.set_raw(BPMEM_BLENDMODE, (1 << 3) | (1 << 4));
        bp.set_raw(BPMEM_EFB_TL, 0);
        bp.set_raw(BPMEM_EFB_WH, (width - 1) | ((height - 1) << 10));
        bp.set_raw(BPMEM_EFB_ADDR, 0x1000 >> 5);
        bp.set_raw(BPMEM_MIPMAP_STRIDE, 1);
        bp.set_raw(BPMEM_TRIGGER_EFB_COPY, trigger);
        bp
    }

    fn gradient(efb: &mut Efb, bp: &BpMemory, width: u32, height: u32) {
        for y in 0..height {
            for x in 0..width {
                efb.set_color(bp, x, y, [(x * 16) as u8, (y * 32) as u8, 0x55, 0xFF]);
            }
        }
    }

    #[test]
    fn test_real_format_helper() {
        for real in [0, 1, 3, 6, 8, 0xA, 0xC] {
            assert_eq!(CopyTrigger(trigger_for(real, false, false)).real_format(), real);
        }
    }

    #[test]
    fn test_intensity_range() {
        assert_eq!(rgb_to_intensity(0, 0, 0), 16);
        assert_eq!(rgb_to_intensity(255, 255, 255), 235);
    }

    #[test]
    fn test_rgba8_roundtrip_is_exact() {
        let bp = setup(8, 4, trigger_for(6, false, false), 0);
        let mut efb = Efb::new();
        gradient(&mut efb, &bp, 8, 4);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 128);

        for t in 0..4 {
            for s in 0..8 {
                let texel = decode_texel(TextureFormat::Rgba8, &rows[0], s, t, 7, &[], TlutFormat::IA8);
                assert_eq!(texel, efb.get_color(&bp, s, t));
            }
        }
    }

    #[test]
    fn test_rgb565_roundtrip_drops_low_bits() {
        let bp = setup(4, 4, trigger_for(4, false, false), 0);
        let mut efb = Efb::new();
        gradient(&mut efb, &bp, 4, 4);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        for t in 0..4 {
            for s in 0..4 {
                let src = efb.get_color(&bp, s, t);
                let texel = decode_texel(TextureFormat::Rgb565, &rows[0], s, t, 3, &[], TlutFormat::IA8);
                assert_eq!(texel[0] >> 3, src[0] >> 3);
                assert_eq!(texel[1] >> 2, src[1] >> 2);
                assert_eq!(texel[2] >> 3, src[2] >> 3);
                assert_eq!(texel[3], 0xFF);
            }
        }
    }

    #[test]
    fn test_i8_intensity_copy() {
        let bp = setup(8, 4, trigger_for(8, false, true), 0);
        let mut efb = Efb::new();
        efb.set_color(&bp, 0, 0, [255, 255, 255, 255]);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        assert_eq!(rows[0][0], 235);
        assert_eq!(rows[0][1], 16);
    }

    #[test]
    fn test_r4_packs_high_nibble_first() {
        let bp = setup(8, 8, trigger_for(0, false, false), 0);
        let mut efb = Efb::new();
        efb.set_color(&bp, 0, 0, [0xA0, 0, 0, 0xFF]);
        efb.set_color(&bp, 1, 0, [0x50, 0, 0, 0xFF]);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        assert_eq!(rows[0].len(), 32);
        assert_eq!(rows[0][0], 0xA5);
        let texel = decode_texel(TextureFormat::I4, &rows[0], 1, 0, 7, &[], TlutFormat::IA8);
        assert_eq!(texel[0], 0x55);
    }

    #[test]
    fn test_half_scale_box_filter() {
        let bp = setup(8, 8, trigger_for(8, true, false), 0);
        let mut efb = Efb::new();
        efb.set_color(&bp, 0, 0, [100, 0, 0, 0xFF]);
        efb.set_color(&bp, 1, 0, [200, 0, 0, 0xFF]);
        efb.set_color(&bp, 0, 1, [0, 0, 0, 0xFF]);
        efb.set_color(&bp, 1, 1, [101, 0, 0, 0xFF]);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        // 4x4 destination fits one 8x4 block
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], 100);
    }

    #[test]
    fn test_half_scale_rgba6_rounding() {
        let bp = setup(4, 4, trigger_for(8, true, false), 1);
        let mut efb = Efb::new();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            efb.set_color(&bp, x, y, [0xFF, 0xFF, 0xFF, 0xFF]);
        }

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        // 4 * 63 = 252, widened to 255
        assert_eq!(rows[0][0], 0xFF);
    }

    #[test]
    fn test_depth_copy_channels() {
        let bp = setup(8, 4, trigger_for(9, false, false), 3);
        let mut efb = Efb::new();
        let mut zbp = bp.clone();
        zbp.set_raw(crate::core::gpu::registers::bp::BPMEM_ZMODE, 1 << 4);
        efb.set_depth(&zbp, 0, 0, 0x123456);

        let rows = encode_efb_copy(&efb, &bp).expect("encodable");
        assert_eq!(rows[0][0], 0x34);
    }

    #[test]
    fn test_unsupported_depth_format_is_skipped() {
        let bp = setup(4, 4, trigger_for(4, false, false), 3);
        assert!(encode_efb_copy(&Efb::new(), &bp).is_none());
    }

    #[test]
    fn test_copy_rows_use_stride() {
        let mut bp = setup(4, 8, trigger_for(3, false, false), 0);
        bp.set_raw(BPMEM_MIPMAP_STRIDE, 2);
        let mut efb = Efb::new();
        efb.set_color(&bp, 0, 4, [0x11, 0, 0, 0xFF]);

        let mut memory = MainMemory::with_size(0x4000);
        copy_efb_to_memory(&efb, &bp, &mut memory).expect("copy");
        // Second block row starts one stride (64 bytes) later
        assert_eq!(memory.read_u8(0x1040), Some(0xFF));
        assert_eq!(memory.read_u8(0x1041), Some(0x11));
    }
}
