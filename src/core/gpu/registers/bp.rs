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

//! BP (pixel pipeline) register bank
//!
//! 256 registers of 24 significant bits each, written through the `0x61`
//! opcode. Writes are filtered by the mask register at `0xFE`, which resets to
//! all ones after every other register write.
//!
//! ## Register Map (selection)
//!
//! ```text
//! Address     | Register
//! ------------|-----------------------------------------
//! 0x00        | genMode
//! 0x06-0x0E   | indirect matrices (3 rows each)
//! 0x10-0x1F   | indirect TEV stage config
//! 0x20-0x21   | scissor top-left / bottom-right
//! 0x22        | line/point width
//! 0x25-0x26   | indirect texcoord scale
//! 0x27        | indirect texture references
//! 0x28-0x2F   | TEV stage orders
//! 0x30-0x3F   | texcoord scale (s/t pairs)
//! 0x40-0x43   | Z mode, blend mode, dst alpha, Z control
//! 0x45        | draw done
//! 0x47-0x48   | PE token / token-int
//! 0x49-0x4D   | EFB copy source and destination
//! 0x4F-0x51   | clear color and depth
//! 0x52        | EFB copy trigger
//! 0x55-0x56   | bounding box
//! 0x59        | scissor offset
//! 0x64-0x65   | TLUT load
//! 0x80-0xBF   | texture units
//! 0xC0-0xDF   | TEV color/alpha combiners
//! 0xE0-0xE7   | TEV color/konst registers
//! 0xE8-0xF2   | fog
//! 0xF3        | alpha test
//! 0xF4-0xF5   | Z texture
//! 0xF6-0xFD   | konst selection and swap tables
//! 0xFE        | write mask
//! ```

use super::{extract, sign_extend};
use serde::{Deserialize, Serialize};

pub const BPMEM_GENMODE: u8 = 0x00;
pub const BPMEM_IND_MTXA: u8 = 0x06;
pub const BPMEM_IND_IMASK: u8 = 0x0F;
pub const BPMEM_IND_CMD: u8 = 0x10;
pub const BPMEM_SCISSORTL: u8 = 0x20;
pub const BPMEM_SCISSORBR: u8 = 0x21;
pub const BPMEM_LINEPTWIDTH: u8 = 0x22;
pub const BPMEM_RAS1_SS0: u8 = 0x25;
pub const BPMEM_RAS1_SS1: u8 = 0x26;
pub const BPMEM_IREF: u8 = 0x27;
pub const BPMEM_TREF: u8 = 0x28;
pub const BPMEM_SU_SSIZE: u8 = 0x30;
pub const BPMEM_SU_TSIZE: u8 = 0x31;
pub const BPMEM_ZMODE: u8 = 0x40;
pub const BPMEM_BLENDMODE: u8 = 0x41;
pub const BPMEM_CONSTANTALPHA: u8 = 0x42;
pub const BPMEM_ZCOMPARE: u8 = 0x43;
pub const BPMEM_SETDRAWDONE: u8 = 0x45;
pub const BPMEM_PE_TOKEN_ID: u8 = 0x47;
pub const BPMEM_PE_TOKEN_INT_ID: u8 = 0x48;
pub const BPMEM_EFB_TL: u8 = 0x49;
pub const BPMEM_EFB_WH: u8 = 0x4A;
pub const BPMEM_EFB_ADDR: u8 = 0x4B;
pub const BPMEM_MIPMAP_STRIDE: u8 = 0x4D;
pub const BPMEM_COPYYSCALE: u8 = 0x4E;
pub const BPMEM_CLEAR_AR: u8 = 0x4F;
pub const BPMEM_CLEAR_GB: u8 = 0x50;
pub const BPMEM_CLEAR_Z: u8 = 0x51;
pub const BPMEM_TRIGGER_EFB_COPY: u8 = 0x52;
pub const BPMEM_CLEARBBOX1: u8 = 0x55;
pub const BPMEM_CLEARBBOX2: u8 = 0x56;
pub const BPMEM_SCISSOROFFSET: u8 = 0x59;
pub const BPMEM_PRELOAD_ADDR: u8 = 0x60;
pub const BPMEM_LOADTLUT0: u8 = 0x64;
pub const BPMEM_LOADTLUT1: u8 = 0x65;
pub const BPMEM_TX_SETMODE0: u8 = 0x80;
pub const BPMEM_TEV_COLOR_ENV: u8 = 0xC0;
pub const BPMEM_TEV_ALPHA_ENV: u8 = 0xC1;
pub const BPMEM_TEV_COLOR_RA: u8 = 0xE0;
pub const BPMEM_TEV_COLOR_BG: u8 = 0xE1;
pub const BPMEM_FOGRANGE: u8 = 0xE8;
pub const BPMEM_FOGPARAM0: u8 = 0xEE;
pub const BPMEM_FOGBMAGNITUDE: u8 = 0xEF;
pub const BPMEM_FOGBEXPONENT: u8 = 0xF0;
pub const BPMEM_FOGPARAM3: u8 = 0xF1;
pub const BPMEM_FOGCOLOR: u8 = 0xF2;
pub const BPMEM_ALPHACOMPARE: u8 = 0xF3;
pub const BPMEM_BIAS: u8 = 0xF4;
pub const BPMEM_ZTEX2: u8 = 0xF5;
pub const BPMEM_TEV_KSEL: u8 = 0xF6;
pub const BPMEM_BP_MASK: u8 = 0xFE;

/// Mask value the write mask resets to
pub const BP_MASK_RESET: u32 = 0x00FF_FFFF;

register! {
    /// 0x00
    GenMode {
        num_texgens / set_num_texgens: 0, 4;
        num_color_chans / set_num_color_chans: 4, 3;
        /// Stage count minus one
        num_tev_stages / set_num_tev_stages: 10, 4;
        cull_mode / set_cull_mode: 14, 2;
        num_ind_stages / set_num_ind_stages: 16, 3;
    }
}

register! {
    /// 0x06 + 3*i: first indirect matrix row
    IndMtxA {
        ma / set_ma: 0, 11;
        mb / set_mb: 11, 11;
        s0 / set_s0: 22, 2;
    }
}

register! {
    /// 0x07 + 3*i: second indirect matrix row
    IndMtxB {
        mc / set_mc: 0, 11;
        md / set_md: 11, 11;
        s1 / set_s1: 22, 2;
    }
}

register! {
    /// 0x08 + 3*i: third indirect matrix row
    IndMtxC {
        me / set_me: 0, 11;
        mf / set_mf: 11, 11;
        s2 / set_s2: 22, 1;
    }
}

register! {
    /// 0x10 + i: indirect configuration for a TEV stage
    TevIndirect {
        /// Indirect stage supplying the offset
        bt / set_bt: 0, 2;
        fmt / set_fmt: 2, 2;
        bias / set_bias: 4, 3;
        /// Bump alpha select
        bs / set_bs: 7, 2;
        /// 0 disables the matrix stage, 1-3 pick a matrix
        matrix_index / set_matrix_index: 9, 2;
        /// 0 regular, 1 S, 2 T
        matrix_id / set_matrix_id: 11, 2;
        sw / set_sw: 13, 3;
        tw / set_tw: 16, 3;
        lb_utclod / set_lb_utclod: 19, 1;
        fb_addprev / set_fb_addprev: 20, 1;
    }
}

register! {
    /// 0x20 / 0x21: scissor corners, both biased by 342
    ScissorPos {
        y / set_y: 0, 11;
        x / set_x: 12, 11;
    }
}

register! {
    /// 0x22
    LinePointWidth {
        line_size / set_line_size: 0, 8;
        point_size / set_point_size: 8, 8;
        line_offset / set_line_offset: 16, 3;
        point_offset / set_point_offset: 19, 3;
        adjust_for_aspect / set_adjust_for_aspect: 22, 1;
    }
}

register! {
    /// 0x25 / 0x26: indirect texcoord scale for a pair of indirect stages
    IndTexScale {
        ss0 / set_ss0: 0, 4;
        ts0 / set_ts0: 4, 4;
        ss1 / set_ss1: 8, 4;
        ts1 / set_ts1: 12, 4;
    }
}

register! {
    /// 0x27: texture map and coord for each indirect stage
    IndirectRefs {
        bi0 / set_bi0: 0, 3;
        bc0 / set_bc0: 3, 3;
        bi1 / set_bi1: 6, 3;
        bc1 / set_bc1: 9, 3;
        bi2 / set_bi2: 12, 3;
        bc2 / set_bc2: 15, 3;
        bi3 / set_bi3: 18, 3;
        bc3 / set_bc3: 21, 3;
    }
}

impl IndirectRefs {
    pub const fn tex_map(self, stage: usize) -> u32 {
        extract(self.0, (stage as u32) * 6, 3)
    }

    pub const fn tex_coord(self, stage: usize) -> u32 {
        extract(self.0, (stage as u32) * 6 + 3, 3)
    }
}

register! {
    /// 0x28 + i: orders for TEV stages 2i and 2i+1
    TwoTevStageOrders {
        texmap_even / set_texmap_even: 0, 3;
        texcoord_even / set_texcoord_even: 3, 3;
        enable_even / set_enable_even: 6, 1;
        colorchan_even / set_colorchan_even: 7, 3;
        texmap_odd / set_texmap_odd: 12, 3;
        texcoord_odd / set_texcoord_odd: 15, 3;
        enable_odd / set_enable_odd: 18, 1;
        colorchan_odd / set_colorchan_odd: 19, 3;
    }
}

impl TwoTevStageOrders {
    #[inline]
    const fn half(self, odd: bool) -> u32 {
        if odd {
            self.0 >> 12
        } else {
            self.0
        }
    }

    pub const fn tex_map(self, odd: bool) -> u32 {
        extract(self.half(odd), 0, 3)
    }

    pub const fn tex_coord(self, odd: bool) -> u32 {
        extract(self.half(odd), 3, 3)
    }

    pub const fn enable(self, odd: bool) -> bool {
        extract(self.half(odd), 6, 1) != 0
    }

    pub const fn color_chan(self, odd: bool) -> u32 {
        extract(self.half(odd), 7, 3)
    }
}

register! {
    /// 0x30 + 2i (s) / 0x31 + 2i (t)
    TcInfo {
        scale_minus_1 / set_scale_minus_1: 0, 16;
        range_bias / set_range_bias: 16, 1;
        cylindric_wrap / set_cylindric_wrap: 17, 1;
        line_offset / set_line_offset: 18, 1;
        point_offset / set_point_offset: 19, 1;
    }
}

register! {
    /// 0x40
    ZMode {
        test_enable / set_test_enable: 0, 1;
        func / set_func: 1, 3;
        update_enable / set_update_enable: 4, 1;
    }
}

register! {
    /// 0x41
    BlendMode {
        blend_enable / set_blend_enable: 0, 1;
        logicop_enable / set_logicop_enable: 1, 1;
        dither / set_dither: 2, 1;
        color_update / set_color_update: 3, 1;
        alpha_update / set_alpha_update: 4, 1;
        dst_factor / set_dst_factor: 5, 3;
        src_factor / set_src_factor: 8, 3;
        subtract / set_subtract: 11, 1;
        logic_mode / set_logic_mode: 12, 4;
    }
}

register! {
    /// 0x42
    ConstantAlpha {
        alpha / set_alpha: 0, 8;
        enable / set_enable: 8, 1;
    }
}

register! {
    /// 0x43
    PeControl {
        pixel_format / set_pixel_format: 0, 3;
        z_format / set_z_format: 3, 3;
        early_ztest / set_early_ztest: 6, 1;
    }
}

register! {
    /// 0x49 (source corner) / 0x4A (size minus one)
    EfbRectangle {
        x / set_x: 0, 10;
        y / set_y: 10, 10;
    }
}

register! {
    /// 0x52
    CopyTrigger {
        clamp_top / set_clamp_top: 0, 1;
        clamp_bottom / set_clamp_bottom: 1, 1;
        target_pixel_format / set_target_pixel_format: 3, 4;
        gamma / set_gamma: 7, 2;
        half_scale / set_half_scale: 9, 1;
        scale_invert / set_scale_invert: 10, 1;
        clear / set_clear: 11, 1;
        frame_to_field / set_frame_to_field: 12, 2;
        copy_to_xfb / set_copy_to_xfb: 14, 1;
        intensity_fmt / set_intensity_fmt: 15, 1;
        auto_conv / set_auto_conv: 16, 1;
    }
}

impl CopyTrigger {
    /// Copy format with the register's bit rotation undone
    pub const fn real_format(self) -> u32 {
        let fmt = self.target_pixel_format();
        fmt / 2 + (fmt & 1) * 8
    }
}

register! {
    /// 0x59
    ScissorOffset {
        x / set_x: 0, 10;
        y / set_y: 10, 10;
    }
}

register! {
    /// 0x65
    TlutLoad {
        tmem_addr / set_tmem_addr: 0, 10;
        line_count / set_line_count: 10, 11;
    }
}

register! {
    /// 0x80 + unit
    TexMode0 {
        wrap_s / set_wrap_s: 0, 2;
        wrap_t / set_wrap_t: 2, 2;
        mag_filter / set_mag_filter: 4, 1;
        /// 0 none, 1 point, 2 linear
        mip_filter / set_mip_filter: 5, 2;
        min_filter / set_min_filter: 7, 1;
        diag_lod / set_diag_lod: 8, 1;
        lod_bias / set_lod_bias: 9, 8;
        max_aniso / set_max_aniso: 19, 2;
        lod_clamp / set_lod_clamp: 21, 1;
    }
}

impl TexMode0 {
    /// LOD bias as signed s2.5
    pub const fn lod_bias_signed(self) -> i32 {
        sign_extend(self.lod_bias(), 8)
    }
}

register! {
    /// 0x84 + unit
    TexMode1 {
        min_lod / set_min_lod: 0, 8;
        max_lod / set_max_lod: 8, 8;
    }
}

register! {
    /// 0x88 + unit
    TexImage0 {
        width_minus_1 / set_width_minus_1: 0, 10;
        height_minus_1 / set_height_minus_1: 10, 10;
        format / set_format: 20, 4;
    }
}

register! {
    /// 0x8C + unit
    TexImage1 {
        tmem_even / set_tmem_even: 0, 15;
        cache_width / set_cache_width: 15, 3;
        cache_height / set_cache_height: 18, 3;
        manually_managed / set_manually_managed: 21, 1;
    }
}

register! {
    /// 0x94 + unit
    TexImage3 {
        /// Main memory address >> 5
        image_base / set_image_base: 0, 24;
    }
}

register! {
    /// 0x98 + unit
    TexTlut {
        tmem_offset / set_tmem_offset: 0, 10;
        tlut_format / set_tlut_format: 10, 2;
    }
}

register! {
    /// 0xC0 + 2i
    ColorCombiner {
        d / set_d: 0, 4;
        c / set_c: 4, 4;
        b / set_b: 8, 4;
        a / set_a: 12, 4;
        bias / set_bias: 16, 2;
        /// Subtract for regular mode, comparison for compare mode
        op / set_op: 18, 1;
        clamp / set_clamp: 19, 1;
        /// Scale for regular mode, compare mode for compare mode
        scale / set_scale: 20, 2;
        dest / set_dest: 22, 2;
    }
}

register! {
    /// 0xC1 + 2i
    AlphaCombiner {
        rswap / set_rswap: 0, 2;
        tswap / set_tswap: 2, 2;
        d / set_d: 4, 3;
        c / set_c: 7, 3;
        b / set_b: 10, 3;
        a / set_a: 13, 3;
        bias / set_bias: 16, 2;
        op / set_op: 18, 1;
        clamp / set_clamp: 19, 1;
        scale / set_scale: 20, 2;
        dest / set_dest: 22, 2;
    }
}

register! {
    /// 0xE0 + 2i: red and alpha of a TEV register
    TevRegRA {
        red / set_red: 0, 11;
        alpha / set_alpha: 12, 11;
        konst / set_konst: 23, 1;
    }
}

register! {
    /// 0xE1 + 2i: blue and green of a TEV register
    TevRegBG {
        blue / set_blue: 0, 11;
        green / set_green: 12, 11;
        konst / set_konst: 23, 1;
    }
}

register! {
    /// 0xE8
    FogRangeBase {
        center / set_center: 0, 10;
        enabled / set_enabled: 10, 1;
    }
}

register! {
    /// 0xE9 - 0xED: two range adjustment factors each
    FogRangeK {
        hi / set_hi: 0, 12;
        lo / set_lo: 12, 12;
    }
}

impl FogRangeK {
    pub fn value(self, index: usize) -> f32 {
        let raw = if index != 0 { self.hi() } else { self.lo() };
        raw as f32 / 256.0
    }
}

register! {
    /// 0xEE: fog A parameter as a truncated float
    FogParam0 {
        mantissa / set_mantissa: 0, 11;
        exponent / set_exponent: 11, 8;
        sign / set_sign: 19, 1;
    }
}

impl FogParam0 {
    pub fn float_value(self) -> f32 {
        f32::from_bits((self.sign() << 31) | (self.exponent() << 23) | (self.mantissa() << 12))
    }
}

register! {
    /// 0xF1: fog C parameter, projection and function
    FogParam3 {
        c_mantissa / set_c_mantissa: 0, 11;
        c_exponent / set_c_exponent: 11, 8;
        c_sign / set_c_sign: 19, 1;
        /// 0 perspective, 1 orthographic
        projection / set_projection: 20, 1;
        fsel / set_fsel: 21, 3;
    }
}

impl FogParam3 {
    pub fn float_value(self) -> f32 {
        f32::from_bits(
            (self.c_sign() << 31) | (self.c_exponent() << 23) | (self.c_mantissa() << 12),
        )
    }
}

register! {
    /// 0xF2
    FogColor {
        b / set_b: 0, 8;
        g / set_g: 8, 8;
        r / set_r: 16, 8;
    }
}

register! {
    /// 0xF3
    AlphaTest {
        ref0 / set_ref0: 0, 8;
        ref1 / set_ref1: 8, 8;
        comp0 / set_comp0: 16, 3;
        comp1 / set_comp1: 19, 3;
        logic / set_logic: 22, 2;
    }
}

register! {
    /// 0xF5
    ZTex2 {
        /// 0 U8, 1 U16, 2 U24
        ztype / set_ztype: 0, 2;
        /// 0 disabled, 1 add, 2 replace
        op / set_op: 2, 2;
    }
}

register! {
    /// 0xF6 + i
    TevKSel {
        swap_rb / set_swap_rb: 0, 2;
        swap_ga / set_swap_ga: 2, 2;
        kcsel_even / set_kcsel_even: 4, 5;
        kasel_even / set_kasel_even: 9, 5;
        kcsel_odd / set_kcsel_odd: 14, 5;
        kasel_odd / set_kasel_odd: 19, 5;
    }
}

impl TevKSel {
    pub const fn kcsel(self, odd: bool) -> u32 {
        if odd {
            self.kcsel_odd()
        } else {
            self.kcsel_even()
        }
    }

    pub const fn kasel(self, odd: bool) -> u32 {
        if odd {
            self.kasel_odd()
        } else {
            self.kasel_even()
        }
    }
}

/// Comparison used by the depth and alpha tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    Never,
    Less,
    Equal,
    LEqual,
    Greater,
    NEqual,
    GEqual,
    Always,
}

impl CompareMode {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => CompareMode::Never,
            1 => CompareMode::Less,
            2 => CompareMode::Equal,
            3 => CompareMode::LEqual,
            4 => CompareMode::Greater,
            5 => CompareMode::NEqual,
            6 => CompareMode::GEqual,
            _ => CompareMode::Always,
        }
    }

    #[inline]
    pub fn test<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CompareMode::Never => false,
            CompareMode::Less => lhs < rhs,
            CompareMode::Equal => lhs == rhs,
            CompareMode::LEqual => lhs <= rhs,
            CompareMode::Greater => lhs > rhs,
            CompareMode::NEqual => lhs != rhs,
            CompareMode::GEqual => lhs >= rhs,
            CompareMode::Always => true,
        }
    }
}

/// EFB pixel format from the Z control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb8Z24,
    Rgba6Z24,
    Rgb565Z16,
    Z24,
    Y8,
    U8,
    V8,
    Yuv420,
}

impl PixelFormat {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => PixelFormat::Rgb8Z24,
            1 => PixelFormat::Rgba6Z24,
            2 => PixelFormat::Rgb565Z16,
            3 => PixelFormat::Z24,
            4 => PixelFormat::Y8,
            5 => PixelFormat::U8,
            6 => PixelFormat::V8,
            _ => PixelFormat::Yuv420,
        }
    }
}

/// Fog response curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FogType {
    Off,
    Linear,
    Exp,
    ExpSq,
    BackwardsExp,
    BackwardsExpSq,
}

impl FogType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            2 => FogType::Linear,
            4 => FogType::Exp,
            5 => FogType::ExpSq,
            6 => FogType::BackwardsExp,
            7 => FogType::BackwardsExpSq,
            // 1 and 3 behave as disabled
            _ => FogType::Off,
        }
    }
}

/// Register index into the texture unit block for a texture map
#[inline]
pub const fn tex_unit_offset(unit: usize) -> usize {
    (unit & 3) | ((unit & 4) << 3)
}

/// The BP register file
#[derive(Clone)]
pub struct BpMemory {
    regs: [u32; 256],
}

impl BpMemory {
    pub fn new() -> Self {
        let mut bp = Self { regs: [0; 256] };
        bp.regs[BPMEM_BP_MASK as usize] = BP_MASK_RESET;
        bp
    }

    /// Raw register value
    #[inline(always)]
    pub fn raw(&self, address: u8) -> u32 {
        self.regs[address as usize]
    }

    /// Store a raw register value without masking or side effects
    #[inline(always)]
    pub fn set_raw(&mut self, address: u8, value: u32) {
        self.regs[address as usize] = value & 0x00FF_FFFF;
    }

    /// Apply a masked write, returning the previous value
    ///
    /// Writes to the mask register replace it outright. Every other write
    /// merges `value` under the current mask and then resets the mask.
    ///
    /// # Example
    ///
    /// ```
    /// use swgx::core::gpu::registers::bp::{BpMemory, BPMEM_BP_MASK};
    ///
    /// let mut bp = BpMemory::new();
    /// bp.set_raw(0x00, 0xABCDEF);
    /// bp.load(BPMEM_BP_MASK, 0x00FF00);
    /// bp.load(0x00, 0x123456);
    ///
    /// assert_eq!(bp.raw(0x00), 0xAB34EF);
    /// assert_eq!(bp.raw(BPMEM_BP_MASK), 0xFFFFFF);
    /// ```
    pub fn load(&mut self, address: u8, value: u32) -> u32 {
        let index = address as usize;
        let old = self.regs[index];
        let value = value & 0x00FF_FFFF;

        if address == BPMEM_BP_MASK {
            self.regs[index] = value;
        } else {
            let mask = self.regs[BPMEM_BP_MASK as usize];
            self.regs[index] = (old & !mask) | (value & mask);
            self.regs[BPMEM_BP_MASK as usize] = BP_MASK_RESET;
        }
        old
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.regs
    }

    pub fn restore(&mut self, regs: &[u32]) {
        let len = regs.len().min(self.regs.len());
        self.regs[..len].copy_from_slice(&regs[..len]);
    }

    pub fn gen_mode(&self) -> GenMode {
        GenMode(self.raw(BPMEM_GENMODE))
    }

    pub fn ind_mtx_a(&self, index: usize) -> IndMtxA {
        IndMtxA(self.regs[BPMEM_IND_MTXA as usize + index * 3])
    }

    pub fn ind_mtx_b(&self, index: usize) -> IndMtxB {
        IndMtxB(self.regs[BPMEM_IND_MTXA as usize + index * 3 + 1])
    }

    pub fn ind_mtx_c(&self, index: usize) -> IndMtxC {
        IndMtxC(self.regs[BPMEM_IND_MTXA as usize + index * 3 + 2])
    }

    /// Indirect matrix `(ma, mb, mc, md, me, mf)` and its 6-bit scale exponent
    pub fn ind_matrix(&self, index: usize) -> ([i32; 6], u32) {
        let a = self.ind_mtx_a(index);
        let b = self.ind_mtx_b(index);
        let c = self.ind_mtx_c(index);
        let m = [
            sign_extend(a.ma(), 11),
            sign_extend(a.mb(), 11),
            sign_extend(b.mc(), 11),
            sign_extend(b.md(), 11),
            sign_extend(c.me(), 11),
            sign_extend(c.mf(), 11),
        ];
        let scale = a.s0() | (b.s1() << 2) | (c.s2() << 4);
        (m, scale)
    }

    pub fn tev_indirect(&self, stage: usize) -> TevIndirect {
        TevIndirect(self.regs[BPMEM_IND_CMD as usize + stage])
    }

    pub fn scissor_tl(&self) -> ScissorPos {
        ScissorPos(self.raw(BPMEM_SCISSORTL))
    }

    pub fn scissor_br(&self) -> ScissorPos {
        ScissorPos(self.raw(BPMEM_SCISSORBR))
    }

    pub fn scissor_offset(&self) -> ScissorOffset {
        ScissorOffset(self.raw(BPMEM_SCISSOROFFSET))
    }

    pub fn line_point_width(&self) -> LinePointWidth {
        LinePointWidth(self.raw(BPMEM_LINEPTWIDTH))
    }

    pub fn ind_tex_scale(&self, pair: usize) -> IndTexScale {
        IndTexScale(self.regs[BPMEM_RAS1_SS0 as usize + pair])
    }

    pub fn indirect_refs(&self) -> IndirectRefs {
        IndirectRefs(self.raw(BPMEM_IREF))
    }

    pub fn tev_orders(&self, pair: usize) -> TwoTevStageOrders {
        TwoTevStageOrders(self.regs[BPMEM_TREF as usize + pair])
    }

    pub fn texcoord_s(&self, coord: usize) -> TcInfo {
        TcInfo(self.regs[BPMEM_SU_SSIZE as usize + coord * 2])
    }

    pub fn texcoord_t(&self, coord: usize) -> TcInfo {
        TcInfo(self.regs[BPMEM_SU_TSIZE as usize + coord * 2])
    }

    pub fn zmode(&self) -> ZMode {
        ZMode(self.raw(BPMEM_ZMODE))
    }

    pub fn blend_mode(&self) -> BlendMode {
        BlendMode(self.raw(BPMEM_BLENDMODE))
    }

    pub fn dst_alpha(&self) -> ConstantAlpha {
        ConstantAlpha(self.raw(BPMEM_CONSTANTALPHA))
    }

    pub fn pe_control(&self) -> PeControl {
        PeControl(self.raw(BPMEM_ZCOMPARE))
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_bits(self.pe_control().pixel_format())
    }

    /// Depth test runs before TEV
    pub fn early_ztest(&self) -> bool {
        self.pe_control().early_ztest() != 0
    }

    pub fn copy_src_xy(&self) -> EfbRectangle {
        EfbRectangle(self.raw(BPMEM_EFB_TL))
    }

    pub fn copy_src_wh(&self) -> EfbRectangle {
        EfbRectangle(self.raw(BPMEM_EFB_WH))
    }

    /// EFB copy destination in main memory
    pub fn copy_dest_address(&self) -> u32 {
        self.raw(BPMEM_EFB_ADDR) << 5
    }

    /// EFB copy destination row stride in bytes
    pub fn copy_dest_stride(&self) -> u32 {
        self.raw(BPMEM_MIPMAP_STRIDE) << 5
    }

    pub fn clear_color(&self) -> [u8; 4] {
        let ar = self.raw(BPMEM_CLEAR_AR);
        let gb = self.raw(BPMEM_CLEAR_GB);
        [
            extract(ar, 0, 8) as u8,
            extract(gb, 8, 8) as u8,
            extract(gb, 0, 8) as u8,
            extract(ar, 8, 8) as u8,
        ]
    }

    pub fn clear_z(&self) -> u32 {
        self.raw(BPMEM_CLEAR_Z) & 0x00FF_FFFF
    }

    pub fn tlut_source(&self) -> u32 {
        self.raw(BPMEM_LOADTLUT0) << 5
    }

    pub fn tlut_load(&self) -> TlutLoad {
        TlutLoad(self.raw(BPMEM_LOADTLUT1))
    }

    pub fn tex_mode0(&self, unit: usize) -> TexMode0 {
        TexMode0(self.regs[0x80 + tex_unit_offset(unit)])
    }

    pub fn tex_mode1(&self, unit: usize) -> TexMode1 {
        TexMode1(self.regs[0x84 + tex_unit_offset(unit)])
    }

    pub fn tex_image0(&self, unit: usize) -> TexImage0 {
        TexImage0(self.regs[0x88 + tex_unit_offset(unit)])
    }

    pub fn tex_image1(&self, unit: usize) -> TexImage1 {
        TexImage1(self.regs[0x8C + tex_unit_offset(unit)])
    }

    pub fn tex_image3(&self, unit: usize) -> TexImage3 {
        TexImage3(self.regs[0x94 + tex_unit_offset(unit)])
    }

    pub fn tex_tlut(&self, unit: usize) -> TexTlut {
        TexTlut(self.regs[0x98 + tex_unit_offset(unit)])
    }

    pub fn color_combiner(&self, stage: usize) -> ColorCombiner {
        ColorCombiner(self.regs[BPMEM_TEV_COLOR_ENV as usize + stage * 2])
    }

    pub fn alpha_combiner(&self, stage: usize) -> AlphaCombiner {
        AlphaCombiner(self.regs[BPMEM_TEV_ALPHA_ENV as usize + stage * 2])
    }

    pub fn fog_range_base(&self) -> FogRangeBase {
        FogRangeBase(self.raw(BPMEM_FOGRANGE))
    }

    pub fn fog_range_k(&self, index: usize) -> FogRangeK {
        FogRangeK(self.regs[BPMEM_FOGRANGE as usize + 1 + index])
    }

    pub fn fog_a(&self) -> f32 {
        FogParam0(self.raw(BPMEM_FOGPARAM0)).float_value()
    }

    pub fn fog_b_magnitude(&self) -> u32 {
        self.raw(BPMEM_FOGBMAGNITUDE)
    }

    pub fn fog_b_shift(&self) -> u32 {
        self.raw(BPMEM_FOGBEXPONENT)
    }

    pub fn fog_param3(&self) -> FogParam3 {
        FogParam3(self.raw(BPMEM_FOGPARAM3))
    }

    pub fn fog_color(&self) -> FogColor {
        FogColor(self.raw(BPMEM_FOGCOLOR))
    }

    pub fn alpha_test(&self) -> AlphaTest {
        AlphaTest(self.raw(BPMEM_ALPHACOMPARE))
    }

    pub fn ztex_bias(&self) -> u32 {
        self.raw(BPMEM_BIAS) & 0x00FF_FFFF
    }

    pub fn ztex2(&self) -> ZTex2 {
        ZTex2(self.raw(BPMEM_ZTEX2))
    }

    pub fn tev_ksel(&self, index: usize) -> TevKSel {
        TevKSel(self.regs[BPMEM_TEV_KSEL as usize + index])
    }
}

impl Default for BpMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_write_and_reset() {
        let mut bp = BpMemory::new();
        bp.set_raw(BPMEM_GENMODE, 0x00AB_CDEF);

        bp.load(BPMEM_BP_MASK, 0x0000_FF00);
        assert_eq!(bp.raw(BPMEM_BP_MASK), 0x0000_FF00);

        bp.load(BPMEM_GENMODE, 0x0012_3456);
        assert_eq!(bp.raw(BPMEM_GENMODE), 0x00AB_34EF);
        assert_eq!(bp.raw(BPMEM_BP_MASK), BP_MASK_RESET);

        // Mask is back to all ones
        bp.load(BPMEM_GENMODE, 0x0012_3456);
        assert_eq!(bp.raw(BPMEM_GENMODE), 0x0012_3456);
    }

    #[test]
    fn test_gen_mode_fields() {
        let mut mode = GenMode::default();
        mode.set_num_texgens(2);
        mode.set_num_color_chans(1);
        mode.set_num_tev_stages(15);
        mode.set_cull_mode(2);
        mode.set_num_ind_stages(4);

        assert_eq!(mode.0, 2 | (1 << 4) | (15 << 10) | (2 << 14) | (4 << 16));
        assert_eq!(mode.num_tev_stages(), 15);
    }

    #[test]
    fn test_copy_trigger_real_format() {
        let mut trigger = CopyTrigger::default();
        for (raw, real) in [(0, 0), (1, 8), (2, 1), (3, 9), (12, 6), (13, 14)] {
            trigger.set_target_pixel_format(raw);
            assert_eq!(trigger.real_format(), real);
        }
    }

    #[test]
    fn test_tevreg_signed_fields() {
        let mut ra = TevRegRA::default();
        ra.set_red(0x7FF);
        ra.set_alpha(0x400);
        ra.set_konst(1);

        assert_eq!(sign_extend(ra.red(), 11), -1);
        assert_eq!(sign_extend(ra.alpha(), 11), -1024);
        assert_eq!(ra.0 >> 23, 1);
    }

    #[test]
    fn test_tev_stage_order_halves() {
        let mut orders = TwoTevStageOrders::default();
        orders.set_texmap_even(3);
        orders.set_enable_even(1);
        orders.set_texcoord_odd(5);
        orders.set_colorchan_odd(1);

        assert_eq!(orders.tex_map(false), 3);
        assert!(orders.enable(false));
        assert!(!orders.enable(true));
        assert_eq!(orders.tex_coord(true), 5);
        assert_eq!(orders.color_chan(true), 1);
    }

    #[test]
    fn test_indirect_matrix_scale() {
        let mut bp = BpMemory::new();

        let mut a = IndMtxA::default();
        a.set_ma(0x7FF); // -1
        a.set_s0(3);
        let mut b = IndMtxB::default();
        b.set_md(0x100);
        b.set_s1(1);
        let mut c = IndMtxC::default();
        c.set_s2(1);

        bp.set_raw(BPMEM_IND_MTXA + 3, a.0);
        bp.set_raw(BPMEM_IND_MTXA + 4, b.0);
        bp.set_raw(BPMEM_IND_MTXA + 5, c.0);

        let (m, scale) = bp.ind_matrix(1);
        assert_eq!(m, [-1, 0, 0, 0x100, 0, 0]);
        assert_eq!(scale, 3 | (1 << 2) | (1 << 4));
    }

    #[test]
    fn test_tex_unit_offsets() {
        assert_eq!(tex_unit_offset(0), 0x00);
        assert_eq!(tex_unit_offset(3), 0x03);
        assert_eq!(tex_unit_offset(4), 0x20);
        assert_eq!(tex_unit_offset(7), 0x23);
    }

    #[test]
    fn test_fog_a_float() {
        let mut p = FogParam0::default();
        // 1.0 = exponent 127, mantissa 0
        p.set_exponent(127);
        assert_eq!(p.float_value(), 1.0);
        p.set_sign(1);
        p.set_mantissa(0x400); // top mantissa bit
        assert_eq!(p.float_value(), -1.5);
    }

    #[test]
    fn test_clear_color_order() {
        let mut bp = BpMemory::new();
        bp.set_raw(BPMEM_CLEAR_AR, 0x80_11); // a=0x80 r=0x11
        bp.set_raw(BPMEM_CLEAR_GB, 0x22_33); // g=0x22 b=0x33
        assert_eq!(bp.clear_color(), [0x11, 0x22, 0x33, 0x80]);
    }

    #[test]
    fn test_compare_mode() {
        assert!(!CompareMode::from_bits(0).test(1, 1));
        assert!(CompareMode::from_bits(3).test(1, 1));
        assert!(CompareMode::from_bits(6).test(2, 1));
        assert!(CompareMode::from_bits(7).test(0, 9));
    }
}
