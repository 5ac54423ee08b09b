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

//! External framebuffer
//!
//! XFB copies convert the EFB to YUV 4:2:2 in main memory. Each pixel is two
//! bytes: its luma, then the chroma it carries (U on even pixels, V on odd
//! pixels), so a pixel pair reads `Y0 U Y1 V`.
//!
//! Chroma is filtered across neighbours within the scanline:
//!
//! ```text
//! U'[x]   = 128 + ((U[x-1] + 2 * U[x]   + U[x+1]) >> 2)
//! V'[x+1] = 128 + ((V[x]   + 2 * V[x+1] + V[x+2]) >> 2)
//! ```
//!
//! with the first and last pixel repeated at the row edges.

use super::efb::Efb;
use super::registers::BpMemory;
use super::types::EFB_WIDTH;
use crate::core::error::Result;
use crate::core::memory::MemoryAccessor;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Location and size of an XFB image in main memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct XfbCopy {
    pub address: u32,
    /// Width in pixels, always even
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes
    pub stride: u32,
}

/// Fixed-point result rounded to nearest
#[inline]
fn round8(x: i32) -> i32 {
    (x >> 8) + ((x >> 7) & 1)
}

/// Unbiased Y, U and V of an RGB color
#[inline]
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [i32; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    [
        round8(66 * r + 129 * g + 25 * b),
        round8(-38 * r - 74 * g + 112 * b),
        round8(112 * r - 94 * g - 18 * b),
    ]
}

/// Encode one row of colors as YUYV
///
/// An odd-length row is padded with its last pixel.
pub fn encode_scanline(colors: &[[u8; 4]]) -> Vec<u8> {
    if colors.is_empty() {
        return Vec::new();
    }

    let width = colors.len() + (colors.len() & 1);
    let yuv: Vec<[i32; 3]> = (0..width)
        .map(|x| {
            let c = colors[x.min(colors.len() - 1)];
            rgb_to_yuv(c[0], c[1], c[2])
        })
        .collect();
    let at = |x: isize| yuv[x.clamp(0, width as isize - 1) as usize];

    let mut out = Vec::with_capacity(width * 2);
    for x in (0..width as isize).step_by(2) {
        let u = (at(x - 1)[1] + 2 * at(x)[1] + at(x + 1)[1]) >> 2;
        let v = (at(x)[2] + 2 * at(x + 1)[2] + at(x + 2)[2]) >> 2;
        out.push((at(x)[0] + 16).clamp(0, 255) as u8);
        out.push((128 + u).clamp(0, 255) as u8);
        out.push((at(x + 1)[0] + 16).clamp(0, 255) as u8);
        out.push((128 + v).clamp(0, 255) as u8);
    }
    out
}

/// Convert YUYV bytes to RGBA8
pub fn yuyv_to_rgba(yuyv: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(yuyv.len() * 2);
    for pair in yuyv.chunks_exact(4) {
        let u = pair[1] as f32 - 128.0;
        let v = pair[3] as f32 - 128.0;
        for y in [pair[0], pair[2]] {
            let y = 1.164 * (y as f32 - 16.0);
            let r = y + 1.596 * v;
            let g = y - 0.392 * u - 0.813 * v;
            let b = y + 2.017 * u;
            out.extend_from_slice(&[
                r.clamp(0.0, 255.0) as u8,
                g.clamp(0.0, 255.0) as u8,
                b.clamp(0.0, 255.0) as u8,
                0xFF,
            ]);
        }
    }
    out
}

/// Copy the EFB source rectangle to the XFB at the copy destination
pub fn copy_efb_to_xfb(efb: &Efb, bp: &BpMemory, memory: &mut dyn MemoryAccessor) -> Result<XfbCopy> {
    let src = bp.copy_src_xy();
    let size = bp.copy_src_wh();
    let left = src.x();
    let top = src.y();
    let width = (size.x() + 1).min(EFB_WIDTH - left.min(EFB_WIDTH));
    let height = size.y() + 1;

    let even_width = width + (width & 1);
    let stride = match bp.copy_dest_stride() {
        0 => even_width * 2,
        s => s,
    };
    let copy = XfbCopy {
        address: bp.copy_dest_address(),
        width: even_width,
        height,
        stride,
    };

    log::debug!(
        "XFB copy {}x{} from ({}, {}) to 0x{:08X}",
        width,
        height,
        left,
        top,
        copy.address
    );

    let mut row = Vec::with_capacity(width as usize);
    for y in 0..height {
        row.clear();
        row.extend((0..width).map(|x| efb.get_color(bp, left + x, top + y)));
        let encoded = encode_scanline(&row);
        memory.write_bytes(copy.address.wrapping_add(y * stride), &encoded)?;
    }
    Ok(copy)
}

/// Read an XFB image back as RGBA8
pub fn decode_xfb(memory: &dyn MemoryAccessor, copy: &XfbCopy) -> Option<Vec<u8>> {
    let row_bytes = copy.width as usize * 2;
    let mut rgba = Vec::with_capacity(row_bytes * 2 * copy.height as usize);
    for y in 0..copy.height {
        let row = memory.get_slice(copy.address.wrapping_add(y * copy.stride), row_bytes)?;
        rgba.extend(yuyv_to_rgba(row));
    }
    Some(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::registers::bp::{
        BPMEM_BLENDMODE, BPMEM_EFB_ADDR, BPMEM_EFB_TL, BPMEM_EFB_WH, BPMEM_MIPMAP_STRIDE,
    };
    use crate::core::memory::MainMemory;

    #[test]
    fn test_white_and_black() {
        assert_eq!(encode_scanline(&[[255, 255, 255, 255]; 2]), vec![235, 128, 235, 128]);
        assert_eq!(encode_scanline(&[[0, 0, 0, 255]; 2]), vec![16, 128, 16, 128]);
    }

    #[test]
    fn test_solid_red() {
        assert_eq!(encode_scanline(&[[255, 0, 0, 255]; 4]), vec![82, 90, 82, 240, 82, 90, 82, 240]);
        let rgba = yuyv_to_rgba(&[82, 90, 82, 240]);
        assert_eq!(&rgba[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_chroma_filter_uses_neighbours() {
        // Blue in the right pair leaks into the filtered V of the left pair
        let row = [[0, 0, 0, 255], [0, 0, 0, 255], [0, 0, 255, 255], [0, 0, 255, 255]];
        let out = encode_scanline(&row);
        assert_eq!(out[1], 128);
        assert_eq!(out[3], 123);
        assert_eq!(out[5], 212);
    }

    #[test]
    fn test_odd_row_is_padded() {
        assert_eq!(encode_scanline(&[[255, 255, 255, 255]; 3]).len(), 8);
        assert!(encode_scanline(&[]).is_empty());
    }

    #[test]
    fn test_gray_roundtrip_is_close() {
        let rgba = yuyv_to_rgba(&encode_scanline(&[[128, 128, 128, 255]; 2]));
        for c in &rgba[..3] {
            assert!((*c as i32 - 128).abs() <= 2);
        }
    }

    #[test]
    fn test_copy_and_decode() {
        let mut bp = BpMemory::new();
        bp.set_raw(BPMEM_BLENDMODE, 1 << 3);
        bp.set_raw(BPMEM_EFB_TL, 0);
        bp.set_raw(BPMEM_EFB_WH, 3 | (1 << 10));
        bp.set_raw(BPMEM_EFB_ADDR, 0x2000 >> 5);
        bp.set_raw(BPMEM_MIPMAP_STRIDE, 0);

        let mut efb = Efb::new();
        for y in 0..2 {
            for x in 0..4 {
                efb.set_color(&bp, x, y, [255, 255, 255, 255]);
            }
        }

        let mut memory = MainMemory::with_size(0x4000);
        let copy = copy_efb_to_xfb(&efb, &bp, &mut memory).expect("copy");
        assert_eq!(copy, XfbCopy { address: 0x2000, width: 4, height: 2, stride: 8 });
        assert_eq!(memory.read_u8(0x2008), Some(235));

        let rgba = decode_xfb(&memory, &copy).expect("mapped");
        assert_eq!(rgba.len(), 4 * 2 * 4);
        assert!(rgba.iter().all(|&c| c >= 254));
    }
}
