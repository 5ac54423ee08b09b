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

//! Texture sampling
//!
//! Coordinates arrive as s17.7 texel positions and the LOD as s28.4. The
//! sampler picks the mip level, wraps the coordinates and filters.

use super::decoder::{decode_texel, TextureFormat, TlutFormat};
use crate::core::gpu::registers::BpMemory;
use crate::core::memory::MemoryAccessor;

/// Texture memory size
pub const TMEM_SIZE: usize = 1024 * 1024;

/// Where texture images and palettes are read from
pub struct TextureSource<'a> {
    pub memory: &'a dyn MemoryAccessor,
    pub tmem: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WrapMode {
    Clamp,
    Repeat,
    Mirror,
}

impl WrapMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            1 => WrapMode::Repeat,
            2 => WrapMode::Mirror,
            // 3 is reserved; it clamps
            _ => WrapMode::Clamp,
        }
    }
}

/// Fold `coord` into `0..=size_minus_1`
fn wrap_coord(coord: i32, mode: WrapMode, size_minus_1: i32) -> i32 {
    match mode {
        WrapMode::Clamp => coord.clamp(0, size_minus_1.max(0)),
        WrapMode::Repeat => {
            let c = coord % (size_minus_1 + 1);
            if c < 0 {
                size_minus_1 + 1 + c
            } else {
                c
            }
        }
        WrapMode::Mirror => {
            let size = size_minus_1 + 1;
            let div = coord / size;
            let c = (coord - div * size).abs();
            if div & 1 != 0 {
                size_minus_1 - c
            } else {
                c
            }
        }
    }
}

/// Sample texture map `texmap` at (s, t)
///
/// `lod` only matters when the unit has mipmapping enabled.
pub fn sample(
    bp: &BpMemory,
    source: &TextureSource,
    s: i32,
    t: i32,
    lod: i32,
    linear: bool,
    texmap: usize,
) -> [u8; 4] {
    let tm0 = bp.tex_mode0(texmap);
    let mip_filter = tm0.mip_filter();
    let mut base_mip = 0;
    let mut mip_linear = false;

    if lod > 0 && mip_filter != 0 {
        let lod_fract = lod & 0xF;
        base_mip = lod >> 4;
        mip_linear = lod_fract != 0 && mip_filter == 2;
        // Point mip filtering rounds to the nearer level
        if mip_filter == 1 && lod_fract >= 8 {
            base_mip += 1;
        }
    }

    if mip_linear {
        let lod_fract = (lod & 0xF) as u32;
        let near = sample_mip(bp, source, s, t, base_mip, linear, texmap);
        let far = sample_mip(bp, source, s, t, base_mip + 1, linear, texmap);
        let mut out = [0u8; 4];
        for i in 0..4 {
            out[i] = ((near[i] as u32 * (16 - lod_fract) + far[i] as u32 * lod_fract) >> 4) as u8;
        }
        out
    } else {
        sample_mip(bp, source, s, t, base_mip, linear, texmap)
    }
}

fn sample_mip(
    bp: &BpMemory,
    source: &TextureSource,
    mut s: i32,
    mut t: i32,
    mip: i32,
    linear: bool,
    texmap: usize,
) -> [u8; 4] {
    let tm0 = bp.tex_mode0(texmap);
    let ti0 = bp.tex_image0(texmap);
    let tlut_reg = bp.tex_tlut(texmap);

    let Some(format) = TextureFormat::from_bits(ti0.format()) else {
        log::warn!("Texture map {} uses unknown format {}", texmap, ti0.format());
        return [0; 4];
    };
    let tlut_format = TlutFormat::from_bits(tlut_reg.tlut_format());
    let tlut_address = (tlut_reg.tmem_offset() << 9) as usize;
    let tlut = source.tmem.get(tlut_address..).unwrap_or(&[]);

    let mut address = bp.tex_image3(texmap).image_base() << 5;
    let mut width_minus_1 = ti0.width_minus_1() as i32;
    let mut height_minus_1 = ti0.height_minus_1() as i32;

    if mip > 0 {
        let mip = mip.min(10) as u32;
        let mut mip_width = (width_minus_1 + 1) as u32;
        let mut mip_height = (height_minus_1 + 1) as u32;
        for _ in 0..mip {
            mip_width = mip_width.max(format.block_width());
            mip_height = mip_height.max(format.block_height());
            address += (mip_width * mip_height * format.texel_nibbles()) >> 1;
            mip_width >>= 1;
            mip_height >>= 1;
        }
        width_minus_1 >>= mip;
        height_minus_1 >>= mip;
        s >>= mip;
        t >>= mip;
    }

    let level_size = format.level_size((width_minus_1 + 1) as u32, (height_minus_1 + 1) as u32);
    let Some(image) = source.memory.get_slice(address, level_size) else {
        log::error!(
            "Texture map {} image at 0x{:08X} ({} bytes) is not mapped",
            texmap,
            address,
            level_size
        );
        return [0; 4];
    };

    let wrap_s = WrapMode::from_bits(tm0.wrap_s());
    let wrap_t = WrapMode::from_bits(tm0.wrap_t());
    let texel = |s: i32, t: i32| {
        decode_texel(format, image, s as u32, t as u32, width_minus_1 as u32, tlut, tlut_format)
    };

    if linear {
        // Filter around texel centers
        s -= 64;
        t -= 64;

        let fract_s = (s & 0x7F) as u32;
        let fract_t = (t & 0x7F) as u32;
        let s0 = wrap_coord(s >> 7, wrap_s, width_minus_1);
        let t0 = wrap_coord(t >> 7, wrap_t, height_minus_1);
        let s1 = wrap_coord((s >> 7) + 1, wrap_s, width_minus_1);
        let t1 = wrap_coord((t >> 7) + 1, wrap_t, height_minus_1);

        let taps = [
            (texel(s0, t0), (128 - fract_s) * (128 - fract_t)),
            (texel(s1, t0), fract_s * (128 - fract_t)),
            (texel(s0, t1), (128 - fract_s) * fract_t),
            (texel(s1, t1), fract_s * fract_t),
        ];

        let mut acc = [0u32; 4];
        for (tap, weight) in &taps {
            for i in 0..4 {
                acc[i] += tap[i] as u32 * weight;
            }
        }
        acc.map(|v| (v >> 14) as u8)
    } else {
        let s0 = wrap_coord(s >> 7, wrap_s, width_minus_1);
        let t0 = wrap_coord(t >> 7, wrap_t, height_minus_1);
        texel(s0, t0)
    }
}
