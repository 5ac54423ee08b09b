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

//! Texture environment
//!
//! Per-pixel evaluation of the TEV stages, followed by the alpha test,
//! Z texturing, fog, the late depth test and the bounding box update. The
//! surviving color is handed to the EFB for blending.
//!
//! # Color order
//!
//! All colors here are `[r, g, b, a]`. Channel swap tables index into that
//! order (0 = red, 3 = alpha).

use super::efb::Efb;
use super::pixel_engine::BoundingBox;
use super::registers::bp::{
    AlphaCombiner, ColorCombiner, CompareMode, FogType, TevRegBG, TevRegRA,
};
use super::registers::{sign_extend, BpMemory, XfMemory};
use super::texture::sampler::{sample, TextureSource};
use super::types::{GpuStatistics, PipelineWarnings};
use crate::core::config::RendererConfig;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

const RED: usize = 0;
const GRN: usize = 1;
const BLU: usize = 2;
const ALP: usize = 3;

/// Konst selectors 0-7: 1, 7/8, 3/4, ... 1/8
const FIXED_KONST: [i16; 8] = [255, 223, 191, 159, 127, 95, 63, 31];

const BIAS: [i32; 4] = [0, 128, -128, 0];
const SCALE_LSHIFT: [u32; 4] = [0, 1, 2, 0];
const SCALE_RSHIFT: [u32; 4] = [0, 0, 0, 1];

/// Bias value selecting compare mode
const BIAS_COMPARE: u32 = 3;

/// Everything the pipeline needs after rasterization
pub struct PixelPipeline<'a> {
    pub bp: &'a BpMemory,
    pub xf: &'a XfMemory,
    pub textures: TextureSource<'a>,
    pub efb: &'a mut Efb,
    pub bbox: &'a mut BoundingBox,
    pub stats: &'a mut GpuStatistics,
    pub warnings: &'a mut PipelineWarnings,
    pub config: &'a RendererConfig,
}

/// Rasterized attributes of one pixel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TevInput {
    /// x, y and 24-bit depth
    pub position: [i32; 3],
    pub color: [[u8; 4]; 2],
    /// s17.7 texel coordinates
    pub uv: [[i32; 2]; 8],
    pub indirect_lod: [i32; 4],
    pub indirect_linear: [bool; 4],
    pub texture_lod: [i32; 16],
    pub texture_linear: [bool; 16],
}

/// Combiner inputs for one channel
///
/// `a`, `b` and `c` only see the low 8 bits of their source, `d` the full
/// signed value.
#[derive(Debug, Clone, Copy, Default)]
struct InputReg {
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

/// Values a stage selects its inputs from
struct StageSources<'r> {
    regs: &'r [[i16; 4]; 4],
    tex: [u8; 4],
    ras: [u8; 4],
    konst: [i16; 4],
}

impl StageSources<'_> {
    fn color_input(&self, sel: u32, comp: usize) -> i16 {
        match sel & 0xF {
            0 => self.regs[0][comp],
            1 => self.regs[0][ALP],
            2 => self.regs[1][comp],
            3 => self.regs[1][ALP],
            4 => self.regs[2][comp],
            5 => self.regs[2][ALP],
            6 => self.regs[3][comp],
            7 => self.regs[3][ALP],
            8 => self.tex[comp] as i16,
            9 => self.tex[ALP] as i16,
            10 => self.ras[comp] as i16,
            11 => self.ras[ALP] as i16,
            12 => 255,
            13 => 128,
            14 => self.konst[comp],
            _ => 0,
        }
    }

    fn alpha_input(&self, sel: u32) -> i16 {
        match sel & 7 {
            0 => self.regs[0][ALP],
            1 => self.regs[1][ALP],
            2 => self.regs[2][ALP],
            3 => self.regs[3][ALP],
            4 => self.tex[ALP] as i16,
            5 => self.ras[ALP] as i16,
            6 => self.konst[ALP],
            _ => 0,
        }
    }
}

#[inline]
fn input_reg(a: i16, b: i16, c: i16, d: i16) -> InputReg {
    InputReg {
        a: (a & 0xFF) as i32,
        b: (b & 0xFF) as i32,
        c: (c & 0xFF) as i32,
        d: d as i32,
    }
}

/// `d + lerp(a, b, c)` with bias, scale and rounding
fn combine_regular(input: InputReg, bias: u32, subtract: bool, scale: u32) -> i32 {
    let scale = (scale & 3) as usize;
    let c = input.c + (input.c >> 7);

    let mut temp = input.a * (256 - c) + input.b * c;
    temp <<= SCALE_LSHIFT[scale];
    temp += if scale == 3 {
        0
    } else if subtract {
        127
    } else {
        128
    };
    temp >>= 8;
    if subtract {
        temp = -temp;
    }

    let result = ((input.d + BIAS[(bias & 3) as usize]) << SCALE_LSHIFT[scale]) + temp;
    result >> SCALE_RSHIFT[scale]
}

/// Comparison operands for compare modes R8, GR16 and BGR24
fn packed_operands(inputs: &[InputReg; 4], mode: u32) -> (i32, i32) {
    match mode {
        0 => (inputs[RED].a, inputs[RED].b),
        1 => (
            (inputs[GRN].a << 8) | inputs[RED].a,
            (inputs[GRN].b << 8) | inputs[RED].b,
        ),
        _ => (
            (inputs[BLU].a << 16) | (inputs[GRN].a << 8) | inputs[RED].a,
            (inputs[BLU].b << 16) | (inputs[GRN].b << 8) | inputs[RED].b,
        ),
    }
}

#[inline]
fn compare_result(input: InputReg, a: i32, b: i32, equal: bool) -> i32 {
    let pass = if equal { a == b } else { a > b };
    input.d + if pass { input.c } else { 0 }
}

fn color_compare(cc: ColorCombiner, inputs: &[InputReg; 4], comp: usize) -> i32 {
    let mode = cc.scale();
    let (a, b) = if mode == 3 {
        (inputs[comp].a, inputs[comp].b)
    } else {
        packed_operands(inputs, mode)
    };
    compare_result(inputs[comp], a, b, cc.op() != 0)
}

fn alpha_compare(ac: AlphaCombiner, inputs: &[InputReg; 4]) -> i32 {
    let mode = ac.scale();
    let (a, b) = if mode == 3 {
        (inputs[ALP].a, inputs[ALP].b)
    } else {
        packed_operands(inputs, mode)
    };
    compare_result(inputs[ALP], a, b, ac.op() != 0)
}

#[inline]
fn clamp_result(value: i32, clamp: bool) -> i16 {
    if clamp {
        value.clamp(0, 255) as i16
    } else {
        value.clamp(-1024, 1023) as i16
    }
}

fn konst_value(
    sel: u32,
    comp: usize,
    konst: &[[i16; 4]; 4],
    alpha: bool,
    warned: &mut bool,
) -> i16 {
    match sel & 0x1F {
        s @ 0..=7 => FIXED_KONST[s as usize],
        s @ 12..=15 if !alpha => konst[(s - 12) as usize][comp],
        s @ 16..=31 => konst[(s & 3) as usize][((s - 16) >> 2) as usize],
        s => {
            if !std::mem::replace(warned, true) {
                log::warn!("Invalid konst selector {} reads as zero", s);
            }
            0
        }
    }
}

/// Apply swap table `table` to an RGBA color
fn swap(bp: &BpMemory, table: u32, color: [u8; 4]) -> [u8; 4] {
    let first = bp.tev_ksel((table * 2) as usize);
    let second = bp.tev_ksel((table * 2 + 1) as usize);
    [
        color[first.swap_rb() as usize],
        color[first.swap_ga() as usize],
        color[second.swap_rb() as usize],
        color[second.swap_ga() as usize],
    ]
}

/// Indirect coordinate wrap, on s17.7 values
fn wrap_indirect_coord(coord: i32, mode: u32) -> i32 {
    match mode & 7 {
        0 => coord,
        1 => coord & ((256 << 7) - 1),
        2 => coord & ((128 << 7) - 1),
        3 => coord & ((64 << 7) - 1),
        4 => coord & ((32 << 7) - 1),
        5 => coord & ((16 << 7) - 1),
        _ => 0,
    }
}

fn alpha_test(bp: &BpMemory, alpha: u8) -> bool {
    let test = bp.alpha_test();
    let comp0 = CompareMode::from_bits(test.comp0()).test(alpha as u32, test.ref0());
    let comp1 = CompareMode::from_bits(test.comp1()).test(alpha as u32, test.ref1());
    match test.logic() {
        0 => comp0 && comp1,
        1 => comp0 || comp1,
        2 => comp0 ^ comp1,
        _ => comp0 == comp1,
    }
}

/// Fog density in 0..=1 for a pixel, or None when fog is off
fn fog_factor(bp: &BpMemory, xf: &XfMemory, x: i32, z: i32) -> Option<f32> {
    let param3 = bp.fog_param3();
    let fog_type = FogType::from_bits(param3.fsel());
    if fog_type == FogType::Off {
        return None;
    }

    let mut ze = if param3.projection() == 0 {
        // ze = A / (B - (Zs >> B_SHF)), with Zs normalized to 0.24
        let shifted = (z as u32).checked_shr(bp.fog_b_shift()).unwrap_or(0);
        let denom = bp.fog_b_magnitude() as i32 - shifted as i32;
        bp.fog_a() * 16_777_215.0 / denom as f32
    } else {
        bp.fog_a() * (z as f32 / 16_777_215.0)
    };

    let range = bp.fog_range_base();
    if range.enabled() != 0 {
        let center = range.center() as i32 - 342;
        let offset = (x - center) as f32 / xf.viewport().wd;
        let index = (9.0 - offset.abs() * 9.0).clamp(0.0, 9.0);
        let lower = index as usize;
        let upper = (lower + 1).min(9);

        let k_lower = bp.fog_range_k(lower / 2).value(lower % 2) * 4.0;
        let k_upper = bp.fog_range_k(upper / 2).value(upper % 2) * 4.0;
        let factor = (lower + 1) as f32 - index;
        let k = k_lower * factor + k_upper * (1.0 - factor);
        ze *= (offset * offset + k * k).sqrt() / k;
    }

    ze -= param3.float_value();
    let fog = ze.clamp(0.0, 1.0);

    Some(match fog_type {
        FogType::Exp => 1.0 - 2.0f32.powf(-8.0 * fog),
        FogType::ExpSq => 1.0 - 2.0f32.powf(-8.0 * fog * fog),
        FogType::BackwardsExp => {
            let fog = 1.0 - fog;
            2.0f32.powf(-8.0 * fog)
        }
        FogType::BackwardsExpSq => {
            let fog = 1.0 - fog;
            2.0f32.powf(-8.0 * fog * fog)
        }
        _ => fog,
    })
}

/// TEV register file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Tev {
    /// Color registers PREV, C0, C1, C2
    color: [[i16; 4]; 4],
    /// Konst registers K0-K3
    konst: [[i16; 4]; 4],
}

impl Tev {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a write to BP registers 0xE0-0xE7
    pub fn write_register(&mut self, address: u8, value: u32) {
        let index = ((address.wrapping_sub(0xE0) >> 1) & 3) as usize;
        if address & 1 == 0 {
            let ra = TevRegRA(value);
            let regs = if ra.konst() != 0 {
                &mut self.konst
            } else {
                &mut self.color
            };
            regs[index][RED] = sign_extend(ra.red(), 11) as i16;
            regs[index][ALP] = sign_extend(ra.alpha(), 11) as i16;
        } else {
            let bg = TevRegBG(value);
            let regs = if bg.konst() != 0 {
                &mut self.konst
            } else {
                &mut self.color
            };
            regs[index][BLU] = sign_extend(bg.blue(), 11) as i16;
            regs[index][GRN] = sign_extend(bg.green(), 11) as i16;
        }
    }

    pub fn color_register(&self, index: usize) -> [i16; 4] {
        self.color[index & 3]
    }

    pub fn konst_register(&self, index: usize) -> [i16; 4] {
        self.konst[index & 3]
    }

    /// Run a pixel through TEV and the rest of the pixel pipeline
    ///
    /// Returns whether the pixel reached the EFB.
    pub fn draw(&self, input: &TevInput, pipe: &mut PixelPipeline) -> bool {
        let bp = pipe.bp;
        pipe.stats.tev_pixels_in += 1;

        let gen_mode = bp.gen_mode();
        let mut regs = self.color;
        let mut tex = [0u8; 4];
        let mut tex_coord = [0i32; 2];
        let mut alpha_bump = 0u8;

        let refs = bp.indirect_refs();
        let mut indirect_tex = [[0u8; 4]; 4];
        for stage in 0..(gen_mode.num_ind_stages() as usize).min(4) {
            let coord = refs.tex_coord(stage) as usize;
            let map = refs.tex_map(stage) as usize;
            let scale = bp.ind_tex_scale(stage >> 1);
            let (scale_s, scale_t) = if stage & 1 != 0 {
                (scale.ss1(), scale.ts1())
            } else {
                (scale.ss0(), scale.ts0())
            };
            indirect_tex[stage] = sample(
                bp,
                &pipe.textures,
                input.uv[coord][0] >> scale_s,
                input.uv[coord][1] >> scale_t,
                input.indirect_lod[stage],
                input.indirect_linear[stage],
                map,
            );
        }

        let num_stages = gen_mode.num_tev_stages() as usize;
        for stage in 0..=num_stages {
            let odd = stage & 1 != 0;
            let order = bp.tev_orders(stage >> 1);
            let ksel = bp.tev_ksel(stage >> 1);
            let cc = bp.color_combiner(stage);
            let ac = bp.alpha_combiner(stage);

            let uv = input.uv[order.tex_coord(odd) as usize];
            indirect(bp, stage, uv, &indirect_tex, &mut tex_coord, &mut alpha_bump);

            if order.enable(odd) {
                let texel = if gen_mode.num_texgens() > 0 {
                    sample(
                        bp,
                        &pipe.textures,
                        tex_coord[0],
                        tex_coord[1],
                        input.texture_lod[stage],
                        input.texture_linear[stage],
                        order.tex_map(odd) as usize,
                    )
                } else {
                    // No texgens samples black
                    [0; 4]
                };
                tex = swap(bp, ac.tswap(), texel);
            }

            let kc = ksel.kcsel(odd);
            let ka = ksel.kasel(odd);
            let warned = &mut pipe.warnings.invalid_konst;
            let konst = [
                konst_value(kc, RED, &self.konst, false, warned),
                konst_value(kc, GRN, &self.konst, false, warned),
                konst_value(kc, BLU, &self.konst, false, warned),
                konst_value(ka, ALP, &self.konst, true, warned),
            ];

            let ras = match order.color_chan(odd) {
                0 => swap(bp, ac.rswap(), input.color[0]),
                1 => swap(bp, ac.rswap(), input.color[1]),
                5 => [alpha_bump; 4],
                6 => [alpha_bump | (alpha_bump >> 5); 4],
                7 => [0; 4],
                other => {
                    log::trace!("Invalid ras color channel {} reads as zero", other);
                    [0; 4]
                }
            };

            let sources = StageSources {
                regs: &regs,
                tex,
                ras,
                konst,
            };
            let mut inputs = [InputReg::default(); 4];
            for (comp, slot) in inputs.iter_mut().enumerate().take(3) {
                *slot = input_reg(
                    sources.color_input(cc.a(), comp),
                    sources.color_input(cc.b(), comp),
                    sources.color_input(cc.c(), comp),
                    sources.color_input(cc.d(), comp),
                );
            }
            inputs[ALP] = input_reg(
                sources.alpha_input(ac.a()),
                sources.alpha_input(ac.b()),
                sources.alpha_input(ac.c()),
                sources.alpha_input(ac.d()),
            );

            let color_dest = cc.dest() as usize;
            for comp in RED..=BLU {
                let value = if cc.bias() == BIAS_COMPARE {
                    color_compare(cc, &inputs, comp)
                } else {
                    combine_regular(inputs[comp], cc.bias(), cc.op() != 0, cc.scale())
                };
                regs[color_dest][comp] = clamp_result(value, cc.clamp() != 0);
            }

            let alpha_value = if ac.bias() == BIAS_COMPARE {
                alpha_compare(ac, &inputs)
            } else {
                combine_regular(inputs[ALP], ac.bias(), ac.op() != 0, ac.scale())
            };
            regs[ac.dest() as usize][ALP] = clamp_result(alpha_value, ac.clamp() != 0);
        }

        // The last stage's destination registers hold the result
        let color_index = bp.color_combiner(num_stages).dest() as usize;
        let alpha_index = bp.alpha_combiner(num_stages).dest() as usize;
        let mut output = [
            regs[color_index][RED] as u8,
            regs[color_index][GRN] as u8,
            regs[color_index][BLU] as u8,
            regs[alpha_index][ALP] as u8,
        ];

        if !alpha_test(bp, output[ALP]) {
            return false;
        }

        let mut position = input.position;

        let ztex2 = bp.ztex2();
        if ztex2.op() != 0 {
            let mut ztex = bp.ztex_bias();
            match ztex2.ztype() {
                0 => ztex = ztex.wrapping_add(tex[ALP] as u32),
                1 => ztex = ztex.wrapping_add(((tex[ALP] as u32) << 8) | tex[RED] as u32),
                2 => {
                    ztex = ztex.wrapping_add(
                        ((tex[RED] as u32) << 16) | ((tex[GRN] as u32) << 8) | tex[BLU] as u32,
                    )
                }
                _ => {}
            }
            if ztex2.op() == 1 {
                ztex = ztex.wrapping_add(position[2] as u32);
            }
            position[2] = (ztex & 0x00FF_FFFF) as i32;
        }

        if let Some(fog) = fog_factor(bp, pipe.xf, position[0], position[2]) {
            let color = bp.fog_color();
            let fog_int = (fog * 256.0) as u32;
            let inv_fog = 256 - fog_int.min(256);
            let blend = |c: u8, f: u32| ((c as u32 * inv_fog + fog_int * f) >> 8) as u8;
            output[RED] = blend(output[RED], color.r());
            output[GRN] = blend(output[GRN], color.g());
            output[BLU] = blend(output[BLU], color.b());
        }

        let (x, y) = (position[0] as u32, position[1] as u32);

        let late_ztest = !bp.early_ztest() || !pipe.config.early_z;
        if late_ztest
            && bp.zmode().test_enable() != 0
            && !pipe.efb.z_compare(bp, x, y, position[2] as u32)
        {
            return false;
        }

        if pipe.config.bounding_box {
            pipe.bbox.update(x, y);
        }

        pipe.stats.tev_pixels_out += 1;
        pipe.efb.blend_tev(bp, x, y, output);
        true
    }
}

/// Indirect stage for TEV stage `stage`, updating the direct texture coordinate
fn indirect(
    bp: &BpMemory,
    stage: usize,
    uv: [i32; 2],
    indirect_tex: &[[u8; 4]; 4],
    tex_coord: &mut [i32; 2],
    alpha_bump: &mut u8,
) {
    let ind = bp.tev_indirect(stage);
    let map = indirect_tex[ind.bt() as usize & 3];

    *alpha_bump = match ind.bs() {
        1 => map[ALP],
        2 => map[BLU],
        3 => map[GRN],
        _ => 0,
    };

    let fmt = ind.fmt();
    let bias_value: i32 = if fmt == 0 { -128 } else { 1 };
    let bias = [
        if ind.bias() & 1 != 0 { bias_value } else { 0 },
        if ind.bias() & 2 != 0 { bias_value } else { 0 },
        if ind.bias() & 4 != 0 { bias_value } else { 0 },
    ];

    let (mask, bump_mask) = match fmt {
        0 => (0xFF, 0xF8),
        1 => (0x1F, 0xE0),
        2 => (0x0F, 0xF0),
        _ => (0x07, 0xF8),
    };
    let coord = [
        (map[ALP] as i32 & mask) + bias[0],
        (map[BLU] as i32 & mask) + bias[1],
        (map[GRN] as i32 & mask) + bias[2],
    ];
    *alpha_bump &= bump_mask;

    let mut trans = [0i32; 2];
    let matrix_index = ind.matrix_index();
    if matrix_index != 0 {
        let (m, scale) = bp.ind_matrix(matrix_index as usize - 1);
        let shift = 17 - scale as i32;

        match ind.matrix_id() {
            0 => {
                // S0.10 matrix, s17.7 result
                trans[0] = m[0]
                    .wrapping_mul(coord[0])
                    .wrapping_add(m[2].wrapping_mul(coord[1]))
                    .wrapping_add(m[4].wrapping_mul(coord[2]))
                    >> 3;
                trans[1] = m[1]
                    .wrapping_mul(coord[0])
                    .wrapping_add(m[3].wrapping_mul(coord[1]))
                    .wrapping_add(m[5].wrapping_mul(coord[2]))
                    >> 3;
            }
            1 => {
                trans[0] = (uv[0] as i64 * coord[0] as i64 / 256) as i32;
                trans[1] = (uv[1] as i64 * coord[0] as i64 / 256) as i32;
            }
            2 => {
                trans[0] = (uv[0] as i64 * coord[1] as i64 / 256) as i32;
                trans[1] = (uv[1] as i64 * coord[1] as i64 / 256) as i32;
            }
            other => {
                log::warn!("Unsupported indirect matrix id {}", other);
                return;
            }
        }

        for t in &mut trans {
            *t = if shift >= 0 {
                *t >> shift.min(31)
            } else {
                t.wrapping_shl((-shift) as u32)
            };
        }
    }

    let s = wrap_indirect_coord(uv[0], ind.sw()).wrapping_add(trans[0]);
    let t = wrap_indirect_coord(uv[1], ind.tw()).wrapping_add(trans[1]);
    if ind.fb_addprev() != 0 {
        tex_coord[0] = tex_coord[0].wrapping_add(s);
        tex_coord[1] = tex_coord[1].wrapping_add(t);
    } else {
        *tex_coord = [s, t];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_lerp() {
        // a=0, b=255, c=128 gives roughly halfway
        let input = InputReg { a: 0, b: 255, c: 128, d: 0 };
        assert_eq!(combine_regular(input, 0, false, 0), 128);

        // d only, with +128 bias
        let input = InputReg { a: 0, b: 0, c: 0, d: 10 };
        assert_eq!(combine_regular(input, 1, false, 0), 138);
    }

    #[test]
    fn test_regular_scale_and_subtract() {
        let input = InputReg { a: 100, b: 0, c: 0, d: 50 };
        // (50 + 0) * 2 + 100 * 2
        assert_eq!(combine_regular(input, 0, false, 1), 300);
        // Divide by two
        assert_eq!(combine_regular(input, 0, false, 3), 75);
        // d - a
        assert_eq!(combine_regular(input, 0, true, 0), -50);
    }

    #[test]
    fn test_inputs_truncate_abc() {
        let reg = input_reg(0x1FF, -1, 256, -5);
        assert_eq!(reg.a, 0xFF);
        assert_eq!(reg.b, 0xFF);
        assert_eq!(reg.c, 0);
        assert_eq!(reg.d, -5);
    }

    #[test]
    fn test_konst_selectors() {
        let mut konst = [[0i16; 4]; 4];
        konst[2] = [10, 20, 30, 40];
        let mut warned = false;
        assert_eq!(konst_value(0, RED, &konst, false, &mut warned), 255);
        assert_eq!(konst_value(7, RED, &konst, false, &mut warned), 31);
        assert_eq!(konst_value(14, GRN, &konst, false, &mut warned), 20);
        assert_eq!(konst_value(18, BLU, &konst, false, &mut warned), 10);
        assert_eq!(konst_value(26, RED, &konst, false, &mut warned), 30);
        assert_eq!(konst_value(30, ALP, &konst, true, &mut warned), 40);
        assert!(!warned);

        assert_eq!(konst_value(9, RED, &konst, false, &mut warned), 0);
        assert!(warned);
        assert_eq!(konst_value(14, ALP, &konst, true, &mut warned), 0);
    }

    #[test]
    fn test_invalid_konst_latch_is_per_caller() {
        let konst = [[0i16; 4]; 4];
        let mut first = false;
        let mut second = false;
        konst_value(9, RED, &konst, false, &mut first);
        assert!(first);
        // A separate latch still starts clear
        assert!(!second);
        konst_value(10, RED, &konst, false, &mut second);
        assert!(second);
    }

    #[test]
    fn test_clamp_modes() {
        assert_eq!(clamp_result(300, true), 255);
        assert_eq!(clamp_result(-3, true), 0);
        assert_eq!(clamp_result(2000, false), 1023);
        assert_eq!(clamp_result(-2000, false), -1024);
    }

    #[test]
    fn test_indirect_wrap() {
        assert_eq!(wrap_indirect_coord(300 << 7, 1), 44 << 7);
        assert_eq!(wrap_indirect_coord(-5, 0), -5);
        assert_eq!(wrap_indirect_coord(12345, 6), 0);
    }

    #[test]
    fn test_register_write_sign_extends() {
        let mut tev = Tev::new();
        let mut ra = TevRegRA::default();
        ra.set_red(0x7FF);
        ra.set_alpha(0x0FF);
        tev.write_register(0xE2, ra.0);
        assert_eq!(tev.color_register(1), [-1, 0, 0, 255]);

        let mut bg = TevRegBG::default();
        bg.set_blue(12);
        bg.set_green(34);
        bg.set_konst(1);
        tev.write_register(0xE7, bg.0);
        assert_eq!(tev.konst_register(3), [0, 34, 12, 0]);
        assert_eq!(tev.color_register(3), [0; 4]);
    }
}
