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

//! Embedded framebuffer
//!
//! 640x528 color and depth planes. Each pixel is a packed 24-bit word whose
//! layout depends on the pixel format:
//!
//! - RGB8: `r << 16 | g << 8 | b`
//! - RGBA6: `r << 18 | g << 12 | b << 6 | a`, 6 bits per channel
//! - depth: 24-bit Z in the low bits
//!
//! The top byte of each word is never written by pixel operations.

use super::registers::bp::{CompareMode, PixelFormat};
use super::registers::BpMemory;
use super::texture::decoder::convert6to8;
use super::types::{EFB_HEIGHT, EFB_WIDTH};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

const EFB_PIXELS: usize = (EFB_WIDTH * EFB_HEIGHT) as usize;

/// Mask selecting the 24 bits a pixel write may touch
const PIXEL_MASK: u32 = 0x00FF_FFFF;

/// 2x2 Bayer matrix for RGBA6 dithering, indexed `[y & 1][x & 1]`
const DITHER: [[u8; 2]; 2] = [[0, 2], [3, 1]];

/// Color and depth planes
#[derive(Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Efb {
    color: Vec<u32>,
    depth: Vec<u32>,
}

impl std::fmt::Debug for Efb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Efb")
            .field("width", &EFB_WIDTH)
            .field("height", &EFB_HEIGHT)
            .finish()
    }
}

#[inline]
fn offset(x: u32, y: u32) -> Option<usize> {
    if x < EFB_WIDTH && y < EFB_HEIGHT {
        Some((x + y * EFB_WIDTH) as usize)
    } else {
        None
    }
}

/// Pack an RGBA color in RGBA6 layout
#[inline]
fn pack_rgba6(color: [u8; 4]) -> u32 {
    ((color[0] as u32 >> 2) << 18)
        | ((color[1] as u32 >> 2) << 12)
        | ((color[2] as u32 >> 2) << 6)
        | (color[3] as u32 >> 2)
}

#[inline]
fn pack_rgb8(color: [u8; 4]) -> u32 {
    ((color[0] as u32) << 16) | ((color[1] as u32) << 8) | color[2] as u32
}

fn blend_factor_src(mode: u32, src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    match mode & 7 {
        0 => [0; 4],
        1 => [0xFF; 4],
        2 => dst,
        3 => dst.map(|c| 0xFF - c),
        4 => [src[3]; 4],
        5 => [0xFF - src[3]; 4],
        6 => [dst[3]; 4],
        _ => [0xFF - dst[3]; 4],
    }
}

fn blend_factor_dst(mode: u32, src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    match mode & 7 {
        0 => [0; 4],
        1 => [0xFF; 4],
        2 => src,
        3 => src.map(|c| 0xFF - c),
        4 => [src[3]; 4],
        5 => [0xFF - src[3]; 4],
        6 => [dst[3]; 4],
        _ => [0xFF - dst[3]; 4],
    }
}

fn blend_color(bp: &BpMemory, src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let mode = bp.blend_mode();
    let src_factor = blend_factor_src(mode.src_factor(), src, dst);
    let dst_factor = blend_factor_dst(mode.dst_factor(), src, dst);

    let mut out = [0u8; 4];
    for i in 0..4 {
        // Factors run 0..=256
        let sf = src_factor[i] as u32 + (src_factor[i] as u32 >> 7);
        let df = dst_factor[i] as u32 + (dst_factor[i] as u32 >> 7);
        out[i] = ((src[i] as u32 * sf + dst[i] as u32 * df) >> 8).min(255) as u8;
    }
    out
}

fn subtract_blend(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = dst[i].saturating_sub(src[i]);
    }
    out
}

/// Apply logic op `op` to the packed colors
fn logic_blend(op: u32, src: u32, dst: u32) -> u32 {
    match op & 0xF {
        0 => 0,
        1 => src & dst,
        2 => src & !dst,
        3 => src,
        4 => !src & dst,
        5 => dst,
        6 => src ^ dst,
        7 => src | dst,
        8 => !(src | dst),
        9 => !(src ^ dst),
        10 => !dst,
        11 => src | !dst,
        12 => !src,
        13 => !src | dst,
        14 => !(src & dst),
        _ => 0xFFFF_FFFF,
    }
}

impl Efb {
    pub fn new() -> Self {
        Self {
            color: vec![0; EFB_PIXELS],
            depth: vec![0; EFB_PIXELS],
        }
    }

    /// Packed color word at (x, y), 0 outside the buffer
    #[inline]
    pub fn color_word(&self, x: u32, y: u32) -> u32 {
        offset(x, y).map_or(0, |i| self.color[i] & PIXEL_MASK)
    }

    /// Raw depth at (x, y), 0 outside the buffer
    #[inline]
    pub fn depth_value(&self, x: u32, y: u32) -> u32 {
        offset(x, y).map_or(0, |i| self.depth[i] & PIXEL_MASK)
    }

    /// Decoded RGBA color at (x, y)
    ///
    /// Formats without alpha read back alpha 0xFF.
    pub fn get_color(&self, bp: &BpMemory, x: u32, y: u32) -> [u8; 4] {
        let word = self.color_word(x, y);
        match bp.pixel_format() {
            PixelFormat::Rgba6Z24 => [
                convert6to8(((word >> 18) & 0x3F) as u8),
                convert6to8(((word >> 12) & 0x3F) as u8),
                convert6to8(((word >> 6) & 0x3F) as u8),
                convert6to8((word & 0x3F) as u8),
            ],
            PixelFormat::Rgb565Z16 => {
                log::trace!("RGB565_Z16 EFB reads are approximated as RGB8");
                [(word >> 16) as u8, (word >> 8) as u8, word as u8, 0xFF]
            }
            _ => [(word >> 16) as u8, (word >> 8) as u8, word as u8, 0xFF],
        }
    }

    /// Replace the color bits, keeping alpha
    fn set_pixel_color_only(&mut self, bp: &BpMemory, index: usize, color: [u8; 4]) {
        let dst = &mut self.color[index];
        match bp.pixel_format() {
            PixelFormat::Rgba6Z24 => {
                *dst = (*dst & 0xFF00_003F) | (pack_rgba6(color) & 0x00FF_FFC0);
            }
            PixelFormat::Rgb8Z24 | PixelFormat::Z24 | PixelFormat::Rgb565Z16 => {
                *dst = (*dst & 0xFF00_0000) | pack_rgb8(color);
            }
            other => log::error!("Color write with unsupported pixel format {:?}", other),
        }
    }

    /// Replace only the alpha bits
    fn set_pixel_alpha_only(&mut self, bp: &BpMemory, index: usize, alpha: u8) {
        let dst = &mut self.color[index];
        match bp.pixel_format() {
            PixelFormat::Rgba6Z24 => {
                *dst = (*dst & 0xFFFF_FFC0) | ((alpha as u32 >> 2) & 0x3F);
            }
            // No alpha bits to write
            PixelFormat::Rgb8Z24 | PixelFormat::Z24 | PixelFormat::Rgb565Z16 => {}
            other => log::error!("Alpha write with unsupported pixel format {:?}", other),
        }
    }

    fn set_pixel_alpha_color(&mut self, bp: &BpMemory, index: usize, color: [u8; 4]) {
        let dst = &mut self.color[index];
        match bp.pixel_format() {
            PixelFormat::Rgba6Z24 => {
                *dst = (*dst & 0xFF00_0000) | pack_rgba6(color);
            }
            PixelFormat::Rgb8Z24 | PixelFormat::Z24 | PixelFormat::Rgb565Z16 => {
                *dst = (*dst & 0xFF00_0000) | pack_rgb8(color);
            }
            other => log::error!("Color write with unsupported pixel format {:?}", other),
        }
    }

    /// Write a color through the color and alpha update flags
    pub fn set_color(&mut self, bp: &BpMemory, x: u32, y: u32, color: [u8; 4]) {
        let Some(index) = offset(x, y) else {
            return;
        };
        let mode = bp.blend_mode();
        if mode.color_update() != 0 {
            if mode.alpha_update() != 0 {
                self.set_pixel_alpha_color(bp, index, color);
            } else {
                self.set_pixel_color_only(bp, index, color);
            }
        } else if mode.alpha_update() != 0 {
            self.set_pixel_alpha_only(bp, index, color[3]);
        }
    }

    #[inline]
    fn set_pixel_depth(&mut self, index: usize, depth: u32) {
        let dst = &mut self.depth[index];
        *dst = (*dst & 0xFF00_0000) | (depth & PIXEL_MASK);
    }

    /// Write a depth value if depth updates are enabled
    pub fn set_depth(&mut self, bp: &BpMemory, x: u32, y: u32, depth: u32) {
        if bp.zmode().update_enable() == 0 {
            return;
        }
        if let Some(index) = offset(x, y) {
            self.set_pixel_depth(index, depth);
        }
    }

    /// Depth test against the stored value, updating it on a pass
    pub fn z_compare(&mut self, bp: &BpMemory, x: u32, y: u32, z: u32) -> bool {
        let Some(index) = offset(x, y) else {
            return false;
        };
        let zmode = bp.zmode();
        let depth = self.depth[index] & PIXEL_MASK;
        let pass = CompareMode::from_bits(zmode.func()).test(z, depth);

        if pass && zmode.update_enable() != 0 {
            self.set_pixel_depth(index, z);
        }
        pass
    }

    /// Blend a TEV output color into the buffer
    pub fn blend_tev(&mut self, bp: &BpMemory, x: u32, y: u32, color: [u8; 4]) {
        let Some(index) = offset(x, y) else {
            return;
        };
        let mode = bp.blend_mode();
        let dst = self.get_color(bp, x, y);

        let mut out = if mode.blend_enable() != 0 {
            if mode.subtract() != 0 {
                subtract_blend(color, dst)
            } else {
                blend_color(bp, color, dst)
            }
        } else if mode.logicop_enable() != 0 {
            let packed = logic_blend(
                mode.logic_mode(),
                u32::from_le_bytes(color),
                u32::from_le_bytes(dst),
            );
            packed.to_le_bytes()
        } else {
            color
        };

        let dst_alpha = bp.dst_alpha();
        if dst_alpha.enable() != 0 {
            out[3] = dst_alpha.alpha() as u8;
        }

        if mode.color_update() != 0 {
            if mode.dither() != 0 && bp.pixel_format() == PixelFormat::Rgba6Z24 {
                let d = DITHER[(y & 1) as usize][(x & 1) as usize];
                for c in out.iter_mut().take(3) {
                    *c = ((*c - (*c >> 6)) + d) & 0xFC;
                }
            }
            if mode.alpha_update() != 0 {
                self.set_pixel_alpha_color(bp, index, out);
            } else {
                self.set_pixel_color_only(bp, index, out);
            }
        } else if mode.alpha_update() != 0 {
            self.set_pixel_alpha_only(bp, index, out[3]);
        }
    }

    /// Clear the copy source rectangle to the clear color and depth
    ///
    /// The rectangle is inclusive on both ends, matching the hardware's
    /// use of the size-minus-one register.
    pub fn clear(&mut self, bp: &BpMemory) {
        let src = bp.copy_src_xy();
        let size = bp.copy_src_wh();
        let color = bp.clear_color();
        let depth = bp.clear_z();

        let left = src.x();
        let top = src.y();
        let right = (left + size.x()).min(EFB_WIDTH - 1);
        let bottom = (top + size.y()).min(EFB_HEIGHT - 1);

        for y in top..=bottom {
            for x in left..=right {
                self.set_color(bp, x, y, color);
                self.set_depth(bp, x, y, depth);
            }
        }
    }

    /// Color plane as raw words, row-major
    pub fn color_plane(&self) -> &[u32] {
        &self.color
    }

    /// Depth plane as raw words, row-major
    pub fn depth_plane(&self) -> &[u32] {
        &self.depth
    }
}

impl Default for Efb {
    fn default() -> Self {
        Self::new()
    }
}
