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

//! Texel decoding
//!
//! GX textures are stored as a raster of fixed-size tiles (blocks), each
//! 32 bytes except RGBA8 which interleaves two 32-byte planes (AR then GB)
//! per 4x4 block. `decode_texel` reads one texel without decoding the rest
//! of the image.
//!
//! | Format | Block | Bits/texel |
//! |--------|-------|------------|
//! | I4, C4, CMPR | 8x8 | 4 |
//! | I8, IA4, C8 | 8x4 | 8 |
//! | IA8, RGB565, RGB5A3, C14X2 | 4x4 | 16 |
//! | RGBA8 | 4x4 | 32 |

/// Texture format of TexImage0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    I4,
    I8,
    IA4,
    IA8,
    Rgb565,
    Rgb5a3,
    Rgba8,
    C4,
    C8,
    C14x2,
    Cmpr,
}

impl TextureFormat {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x0 => Some(TextureFormat::I4),
            0x1 => Some(TextureFormat::I8),
            0x2 => Some(TextureFormat::IA4),
            0x3 => Some(TextureFormat::IA8),
            0x4 => Some(TextureFormat::Rgb565),
            0x5 => Some(TextureFormat::Rgb5a3),
            0x6 => Some(TextureFormat::Rgba8),
            0x8 => Some(TextureFormat::C4),
            0x9 => Some(TextureFormat::C8),
            0xA => Some(TextureFormat::C14x2),
            0xE => Some(TextureFormat::Cmpr),
            _ => None,
        }
    }

    pub fn block_width(self) -> u32 {
        match self {
            TextureFormat::I4 | TextureFormat::C4 | TextureFormat::Cmpr => 8,
            TextureFormat::I8 | TextureFormat::IA4 | TextureFormat::C8 => 8,
            _ => 4,
        }
    }

    pub fn block_height(self) -> u32 {
        match self {
            TextureFormat::I4 | TextureFormat::C4 | TextureFormat::Cmpr => 8,
            _ => 4,
        }
    }

    /// Texel size in nibbles
    pub fn texel_nibbles(self) -> u32 {
        match self {
            TextureFormat::I4 | TextureFormat::C4 | TextureFormat::Cmpr => 1,
            TextureFormat::I8 | TextureFormat::IA4 | TextureFormat::C8 => 2,
            TextureFormat::Rgba8 => 8,
            _ => 4,
        }
    }

    /// Bytes of one mip level of the given size, rounded up to whole blocks
    pub fn level_size(self, width: u32, height: u32) -> usize {
        let bw = self.block_width();
        let bh = self.block_height();
        let blocks = width.div_ceil(bw) * height.div_ceil(bh);
        (blocks * bw * bh * self.texel_nibbles() / 2) as usize
    }
}

/// Palette entry format of TexTlut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlutFormat {
    IA8,
    Rgb565,
    Rgb5a3,
}

impl TlutFormat {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => TlutFormat::IA8,
            1 => TlutFormat::Rgb565,
            _ => TlutFormat::Rgb5a3,
        }
    }
}

#[inline(always)]
pub fn convert3to8(v: u8) -> u8 {
    (v << 5) | (v << 2) | (v >> 1)
}

#[inline(always)]
pub fn convert4to8(v: u8) -> u8 {
    (v << 4) | v
}

#[inline(always)]
pub fn convert5to8(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

#[inline(always)]
pub fn convert6to8(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

/// Alpha in the high byte, intensity in the low byte
#[inline]
pub fn decode_ia8(v: u16) -> [u8; 4] {
    let i = v as u8;
    [i, i, i, (v >> 8) as u8]
}

#[inline]
pub fn decode_rgb565(v: u16) -> [u8; 4] {
    [
        convert5to8((v >> 11) as u8 & 0x1F),
        convert6to8((v >> 5) as u8 & 0x3F),
        convert5to8(v as u8 & 0x1F),
        0xFF,
    ]
}

/// Opaque RGB555 when bit 15 is set, otherwise RGB444 with 3-bit alpha
#[inline]
pub fn decode_rgb5a3(v: u16) -> [u8; 4] {
    if v & 0x8000 != 0 {
        [
            convert5to8((v >> 10) as u8 & 0x1F),
            convert5to8((v >> 5) as u8 & 0x1F),
            convert5to8(v as u8 & 0x1F),
            0xFF,
        ]
    } else {
        [
            convert4to8((v >> 8) as u8 & 0xF),
            convert4to8((v >> 4) as u8 & 0xF),
            convert4to8(v as u8 & 0xF),
            convert3to8((v >> 12) as u8 & 0x7),
        ]
    }
}

#[inline(always)]
fn byte(src: &[u8], offset: usize) -> u8 {
    src.get(offset).copied().unwrap_or(0)
}

#[inline(always)]
fn be16(src: &[u8], offset: usize) -> u16 {
    ((byte(src, offset) as u16) << 8) | byte(src, offset + 1) as u16
}

fn palette(tlut: &[u8], index: u16, format: TlutFormat) -> [u8; 4] {
    let entry = be16(tlut, index as usize * 2);
    match format {
        TlutFormat::IA8 => decode_ia8(entry),
        TlutFormat::Rgb565 => decode_rgb565(entry),
        TlutFormat::Rgb5a3 => decode_rgb5a3(entry),
    }
}

/// Byte offset of the 8-bit texel (s, t) in 8x4 blocks
#[inline]
fn offset_8x4(s: u32, t: u32, width_minus_1: u32) -> usize {
    let width_blocks = (width_minus_1 >> 3) + 1;
    let base = ((t >> 2) * width_blocks + (s >> 3)) << 5;
    (base + ((t & 3) << 3) + (s & 7)) as usize
}

/// Byte offset of the 16-bit texel (s, t) in 4x4 blocks
#[inline]
fn offset_4x4(s: u32, t: u32, width_minus_1: u32) -> usize {
    let width_blocks = (width_minus_1 >> 2) + 1;
    let base = ((t >> 2) * width_blocks + (s >> 2)) << 4;
    ((base + ((t & 3) << 2) + (s & 3)) << 1) as usize
}

/// 4-bit texel (s, t) in 8x8 blocks
#[inline]
fn nibble_8x8(src: &[u8], s: u32, t: u32, width_minus_1: u32) -> u8 {
    let width_blocks = (width_minus_1 >> 3) + 1;
    let base = ((t >> 3) * width_blocks + (s >> 3)) << 5;
    let block_offset = ((t & 7) << 3) + (s & 7);
    let shift = if block_offset & 1 != 0 { 0 } else { 4 };
    (byte(src, (base + (block_offset >> 1)) as usize) >> shift) & 0xF
}

#[inline]
fn dxt_blend(v1: u32, v2: u32) -> u8 {
    ((v1 * 3 + v2 * 5) >> 3) as u8
}

fn decode_cmpr(src: &[u8], s: u32, t: u32, width_minus_1: u32) -> [u8; 4] {
    let s_dxt = s >> 2;
    let t_dxt = t >> 2;
    let width_blocks = (width_minus_1 >> 3) + 1;
    let base = ((t_dxt >> 1) * width_blocks + (s_dxt >> 1)) << 2;
    let sub_block = ((t_dxt & 1) << 1) + (s_dxt & 1);
    let offset = ((base + sub_block) << 3) as usize;

    let c1 = be16(src, offset);
    let c2 = be16(src, offset + 2);
    let [r1, g1, b1, _] = decode_rgb565(c1);
    let [r2, g2, b2, _] = decode_rgb565(c2);
    let (r1, g1, b1) = (r1 as u32, g1 as u32, b1 as u32);
    let (r2, g2, b2) = (r2 as u32, g2 as u32, b2 as u32);

    let line = byte(src, offset + 4 + (t & 3) as usize);
    let shift = 6 - ((s & 3) << 1);
    let mut select = (line >> shift) & 3;
    if c1 <= c2 {
        select |= 4;
    }

    match select {
        0 | 4 => [r1 as u8, g1 as u8, b1 as u8, 0xFF],
        1 | 5 => [r2 as u8, g2 as u8, b2 as u8, 0xFF],
        2 => [dxt_blend(r2, r1), dxt_blend(g2, g1), dxt_blend(b2, b1), 0xFF],
        3 => [dxt_blend(r1, r2), dxt_blend(g1, g2), dxt_blend(b1, b2), 0xFF],
        6 => [((r1 + r2) / 2) as u8, ((g1 + g2) / 2) as u8, ((b1 + b2) / 2) as u8, 0xFF],
        // The averaged color again, but transparent
        _ => [((r1 + r2) / 2) as u8, ((g1 + g2) / 2) as u8, ((b1 + b2) / 2) as u8, 0],
    }
}

/// Decode the texel at (s, t) as RGBA
///
/// `src` starts at the mip level holding the texel. Bytes past the end of
/// `src` or `tlut` read as zero.
///
/// # Example
///
/// ```
/// use swgx::core::gpu::texture::decoder::{decode_texel, TextureFormat, TlutFormat};
///
/// // One 8x4 I8 block, texel (1, 0) holds 0x80
/// let mut block = [0u8; 32];
/// block[1] = 0x80;
/// let texel = decode_texel(TextureFormat::I8, &block, 1, 0, 7, &[], TlutFormat::IA8);
/// assert_eq!(texel, [0x80; 4]);
/// ```
pub fn decode_texel(
    format: TextureFormat,
    src: &[u8],
    s: u32,
    t: u32,
    width_minus_1: u32,
    tlut: &[u8],
    tlut_format: TlutFormat,
) -> [u8; 4] {
    match format {
        TextureFormat::I4 => {
            let i = convert4to8(nibble_8x8(src, s, t, width_minus_1));
            [i; 4]
        }
        TextureFormat::C4 => palette(tlut, nibble_8x8(src, s, t, width_minus_1) as u16, tlut_format),
        TextureFormat::I8 => [byte(src, offset_8x4(s, t, width_minus_1)); 4],
        TextureFormat::C8 => palette(tlut, byte(src, offset_8x4(s, t, width_minus_1)) as u16, tlut_format),
        TextureFormat::IA4 => {
            let v = byte(src, offset_8x4(s, t, width_minus_1));
            let i = convert4to8(v & 0xF);
            [i, i, i, convert4to8(v >> 4)]
        }
        TextureFormat::IA8 => decode_ia8(be16(src, offset_4x4(s, t, width_minus_1))),
        TextureFormat::C14x2 => {
            let index = be16(src, offset_4x4(s, t, width_minus_1)) & 0x3FFF;
            palette(tlut, index, tlut_format)
        }
        TextureFormat::Rgb565 => decode_rgb565(be16(src, offset_4x4(s, t, width_minus_1))),
        TextureFormat::Rgb5a3 => decode_rgb5a3(be16(src, offset_4x4(s, t, width_minus_1))),
        TextureFormat::Rgba8 => {
            let width_blocks = (width_minus_1 >> 2) + 1;
            let base = ((t >> 2) * width_blocks + (s >> 2)) << 5;
            let offset = ((base + ((t & 3) << 2) + (s & 3)) << 1) as usize;
            // AR plane then GB plane
            [
                byte(src, offset + 1),
                byte(src, offset + 32),
                byte(src, offset + 33),
                byte(src, offset),
            ]
        }
        TextureFormat::Cmpr => decode_cmpr(src, s, t, width_minus_1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_expansion() {
        assert_eq!(convert3to8(7), 0xFF);
        assert_eq!(convert4to8(0xA), 0xAA);
        assert_eq!(convert5to8(0x1F), 0xFF);
        assert_eq!(convert5to8(0x10), 0x84);
        assert_eq!(convert6to8(0x3F), 0xFF);
        assert_eq!(convert6to8(0x20), 0x82);
    }

    #[test]
    fn test_i4_nibble_order() {
        let mut block = [0u8; 32];
        block[0] = 0x3C;
        let t0 = decode_texel(TextureFormat::I4, &block, 0, 0, 7, &[], TlutFormat::IA8);
        let t1 = decode_texel(TextureFormat::I4, &block, 1, 0, 7, &[], TlutFormat::IA8);
        assert_eq!(t0, [0x33; 4]);
        assert_eq!(t1, [0xCC; 4]);
    }

    #[test]
    fn test_rgb5a3_both_modes() {
        assert_eq!(decode_rgb5a3(0xFC00), [0xFF, 0, 0, 0xFF]);
        // Translucent: alpha 4/7, color 0xF0F
        assert_eq!(decode_rgb5a3(0x4F0F), [0xFF, 0x00, 0xFF, 0x92]);
    }

    #[test]
    fn test_rgba8_planes() {
        let mut block = [0u8; 64];
        // Texel (1, 0): AR at 2..4, GB at 34..36
        block[2] = 0x11;
        block[3] = 0x22;
        block[34] = 0x33;
        block[35] = 0x44;
        let texel = decode_texel(TextureFormat::Rgba8, &block, 1, 0, 3, &[], TlutFormat::IA8);
        assert_eq!(texel, [0x22, 0x33, 0x44, 0x11]);
    }

    #[test]
    fn test_c8_palette_lookup() {
        let mut block = [0u8; 32];
        block[0] = 2;
        let mut tlut = [0u8; 8];
        tlut[4] = 0xF8;
        tlut[5] = 0x00;
        let texel = decode_texel(TextureFormat::C8, &block, 0, 0, 7, &tlut, TlutFormat::Rgb565);
        assert_eq!(texel, [0xFF, 0, 0, 0xFF]);
    }

    #[test]
    fn test_cmpr_transparent_fourth_color() {
        // color1 <= color2 enables the three-color mode
        let mut block = [0u8; 32];
        block[0..2].copy_from_slice(&0x0000u16.to_be_bytes());
        block[2..4].copy_from_slice(&0xF800u16.to_be_bytes());
        block[4] = 0b1110_0100;

        let get = |s| decode_texel(TextureFormat::Cmpr, &block, s, 0, 7, &[], TlutFormat::IA8);
        assert_eq!(get(3), [0, 0, 0, 0xFF]);
        assert_eq!(get(2), [0xFF, 0, 0, 0xFF]);
        assert_eq!(get(1), [0x7F, 0, 0, 0xFF]);
        assert_eq!(get(0), [0x7F, 0, 0, 0]);
    }

    #[test]
    fn test_level_size_rounds_to_blocks() {
        assert_eq!(TextureFormat::I4.level_size(8, 8), 32);
        assert_eq!(TextureFormat::I4.level_size(1, 1), 32);
        assert_eq!(TextureFormat::Rgba8.level_size(4, 4), 64);
        assert_eq!(TextureFormat::Rgb565.level_size(16, 8), 256);
    }
}
