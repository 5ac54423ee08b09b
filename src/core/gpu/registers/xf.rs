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

//! XF (transform unit) memory
//!
//! A flat space of 32-bit words holding matrices, lights and registers:
//!
//! ```text
//! Address         | Contents
//! ----------------|--------------------------------------------
//! 0x0000-0x00FF   | position / texture matrices (4 floats per row)
//! 0x0400-0x045F   | normal matrices (3 floats per row)
//! 0x0500-0x05FF   | post-transform matrices
//! 0x0600-0x067F   | 8 lights, 16 words each
//! 0x1000-0x1057   | registers
//! ```
//!
//! Light layout (words): 3 reserved, color, cosatt[3], distatt[3], pos[3],
//! dir[3].

use super::extract;

pub const XFMEM_POSMATRICES: u32 = 0x0000;
pub const XFMEM_NORMALMATRICES: u32 = 0x0400;
pub const XFMEM_POSTMATRICES: u32 = 0x0500;
pub const XFMEM_LIGHTS: u32 = 0x0600;
pub const XFMEM_LIGHTS_END: u32 = 0x0680;
pub const XFMEM_REGISTERS_START: u32 = 0x1000;
pub const XFMEM_CLIPDISABLE: u32 = 0x1005;
pub const XFMEM_INVTXSPEC: u32 = 0x1008;
pub const XFMEM_SETNUMCHAN: u32 = 0x1009;
pub const XFMEM_SETCHAN0_AMBCOLOR: u32 = 0x100A;
pub const XFMEM_SETCHAN0_MATCOLOR: u32 = 0x100C;
pub const XFMEM_SETCHAN0_COLOR: u32 = 0x100E;
pub const XFMEM_SETCHAN0_ALPHA: u32 = 0x1010;
pub const XFMEM_DUALTEX: u32 = 0x1012;
pub const XFMEM_SETMATRIXINDA: u32 = 0x1018;
pub const XFMEM_SETMATRIXINDB: u32 = 0x1019;
pub const XFMEM_SETVIEWPORT: u32 = 0x101A;
pub const XFMEM_SETPROJECTION: u32 = 0x1020;
pub const XFMEM_SETPROJECTIONTYPE: u32 = 0x1026;
pub const XFMEM_SETNUMTEXGENS: u32 = 0x103F;
pub const XFMEM_SETTEXMTXINFO: u32 = 0x1040;
pub const XFMEM_SETPOSTMTXINFO: u32 = 0x1050;

/// One past the last addressable word
pub const XFMEM_SIZE: u32 = 0x1058;

const WORDS_PER_LIGHT: u32 = 16;

register! {
    /// 0x100E + chan (color) / 0x1010 + chan (alpha)
    LitChannel {
        /// 0 material register, 1 vertex color
        mat_source / set_mat_source: 0, 1;
        enable_lighting / set_enable_lighting: 1, 1;
        light_mask_lo / set_light_mask_lo: 2, 4;
        /// 0 ambient register, 1 vertex color
        amb_source / set_amb_source: 6, 1;
        diffuse_func / set_diffuse_func: 7, 2;
        atten_func / set_atten_func: 9, 2;
        light_mask_hi / set_light_mask_hi: 11, 4;
    }
}

impl LitChannel {
    /// Mask of lights 0-7
    pub const fn full_light_mask(self) -> u32 {
        self.light_mask_lo() | (self.light_mask_hi() << 4)
    }
}

register! {
    /// 0x1040 + n
    TexMtxInfo {
        /// 0 ST, 1 STQ
        projection / set_projection: 1, 1;
        /// 0 AB11, 1 ABC1
        input_form / set_input_form: 2, 1;
        texgen_type / set_texgen_type: 4, 3;
        source_row / set_source_row: 7, 5;
        emboss_source / set_emboss_source: 12, 3;
        emboss_light / set_emboss_light: 15, 3;
    }
}

register! {
    /// 0x1050 + n
    PostMtxInfo {
        index / set_index: 0, 6;
        normalize / set_normalize: 8, 1;
    }
}

register! {
    /// 0x1005
    ClipDisable {
        disable_clipping / set_disable_clipping: 0, 1;
        disable_trivial_reject / set_disable_trivial_reject: 1, 1;
        disable_cpoly_accel / set_disable_cpoly_accel: 2, 1;
    }
}

/// Distance / spot attenuation mode for a lit channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttenuationFunc {
    None,
    Spec,
    Dir,
    Spot,
}

impl AttenuationFunc {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => AttenuationFunc::None,
            1 => AttenuationFunc::Spec,
            2 => AttenuationFunc::Dir,
            _ => AttenuationFunc::Spot,
        }
    }
}

/// N.L handling for a lit channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffuseFunc {
    None,
    Sign,
    Clamp,
}

impl DiffuseFunc {
    /// The reserved value 3 behaves as clamp
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => DiffuseFunc::None,
            1 => DiffuseFunc::Sign,
            _ => DiffuseFunc::Clamp,
        }
    }
}

/// How a texture coordinate generator produces its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexGenType {
    Regular,
    EmbossMap,
    Color0,
    Color1,
}

impl TexGenType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            1 => TexGenType::EmbossMap,
            2 => TexGenType::Color0,
            3 => TexGenType::Color1,
            _ => TexGenType::Regular,
        }
    }
}

/// Input row of a regular texture coordinate generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRow {
    Geometry,
    Normal,
    Colors,
    BinormalT,
    BinormalB,
    Tex(usize),
}

impl SourceRow {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            0 => SourceRow::Geometry,
            1 => SourceRow::Normal,
            2 => SourceRow::Colors,
            3 => SourceRow::BinormalT,
            4 => SourceRow::BinormalB,
            n @ 5..=12 => SourceRow::Tex((n - 5) as usize),
            _ => SourceRow::Geometry,
        }
    }
}

/// Viewport transform parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub wd: f32,
    pub ht: f32,
    pub z_range: f32,
    pub x_orig: f32,
    pub y_orig: f32,
    pub far_z: f32,
}

/// Decoded light parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Light {
    /// RGBA
    pub color: [u8; 4],
    pub cosatt: [f32; 3],
    pub distatt: [f32; 3],
    pub pos: [f32; 3],
    pub dir: [f32; 3],
}

/// The XF memory and register state
#[derive(Clone)]
pub struct XfMemory {
    words: Vec<u32>,
}

impl XfMemory {
    pub fn new() -> Self {
        Self {
            words: vec![0; XFMEM_SIZE as usize],
        }
    }

    #[inline(always)]
    pub fn word(&self, address: u32) -> u32 {
        self.words.get(address as usize).copied().unwrap_or(0)
    }

    #[inline(always)]
    pub fn float(&self, address: u32) -> f32 {
        f32::from_bits(self.word(address))
    }

    /// Write a block of words starting at `base`
    ///
    /// Writes past the end of the register space are dropped. After the copy,
    /// non-finite light parameters are zeroed. Returns true when the write
    /// touched the viewport or projection registers.
    pub fn load(&mut self, base: u32, data: &[u32]) -> bool {
        let requested = data.len() as u32;
        let size = if base.saturating_add(requested) > XFMEM_SIZE {
            log::info!(
                "XF load exceeds address space: 0x{:04X} + {} words",
                base,
                requested
            );
            XFMEM_SIZE.saturating_sub(base)
        } else {
            requested
        };

        if size == 0 {
            return false;
        }

        let start = base as usize;
        self.words[start..start + size as usize].copy_from_slice(&data[..size as usize]);
        log::trace!("XF load 0x{:04X} x{}", base, size);

        self.written(base, requested)
    }

    /// Post-write hook shared by direct and indexed loads
    fn written(&mut self, base: u32, size: u32) -> bool {
        let top = base + size;

        if base < XFMEM_LIGHTS_END && top > XFMEM_LIGHTS + 3 {
            self.sanitize_lights();
        }

        base <= XFMEM_SETPROJECTIONTYPE && top > XFMEM_SETVIEWPORT
    }

    fn sanitize_lights(&mut self) {
        for light in 0..8 {
            let base = (XFMEM_LIGHTS + light * WORDS_PER_LIGHT) as usize;
            // Everything after the color word is a float
            for word in &mut self.words[base + 4..base + WORDS_PER_LIGHT as usize] {
                if !f32::from_bits(*word).is_finite() {
                    *word = 0;
                }
            }
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.words
    }

    pub fn restore(&mut self, words: &[u32]) {
        let len = words.len().min(self.words.len());
        self.words[..len].copy_from_slice(&words[..len]);
    }

    /// Row `row` of the position matrix bank, 4 floats
    pub fn pos_matrix_row(&self, row: u32) -> [f32; 4] {
        let base = XFMEM_POSMATRICES + row * 4;
        [
            self.float(base),
            self.float(base + 1),
            self.float(base + 2),
            self.float(base + 3),
        ]
    }

    /// Twelve floats of a 3x4 matrix starting at word `base`
    pub fn matrix34(&self, base: u32) -> [f32; 12] {
        let mut m = [0.0; 12];
        for (i, v) in m.iter_mut().enumerate() {
            *v = self.float(base + i as u32);
        }
        m
    }

    /// 3x4 position or texture matrix starting at row `index`
    pub fn pos_matrix(&self, index: u32) -> [f32; 12] {
        self.matrix34(XFMEM_POSMATRICES + (index & 63) * 4)
    }

    /// 3x3 normal matrix paired with position matrix `pos_index`
    pub fn normal_matrix(&self, pos_index: u32) -> [f32; 9] {
        let base = XFMEM_NORMALMATRICES + (pos_index & 31) * 3;
        let mut m = [0.0; 9];
        for (i, v) in m.iter_mut().enumerate() {
            *v = self.float(base + i as u32);
        }
        m
    }

    /// 3x4 dual-texture post matrix starting at row `index`
    pub fn post_matrix(&self, index: u32) -> [f32; 12] {
        self.matrix34(XFMEM_POSTMATRICES + (index & 63) * 4)
    }

    pub fn light(&self, index: usize) -> Light {
        let base = XFMEM_LIGHTS + (index as u32 & 7) * WORDS_PER_LIGHT;
        let vec3 = |at: u32| [self.float(at), self.float(at + 1), self.float(at + 2)];
        Light {
            color: self.word(base + 3).to_be_bytes(),
            cosatt: vec3(base + 4),
            distatt: vec3(base + 7),
            pos: vec3(base + 10),
            dir: vec3(base + 13),
        }
    }

    pub fn clip_disable(&self) -> ClipDisable {
        ClipDisable(self.word(XFMEM_CLIPDISABLE))
    }

    pub fn num_color_chans(&self) -> u32 {
        extract(self.word(XFMEM_SETNUMCHAN), 0, 3)
    }

    /// Ambient color register as RGBA
    pub fn amb_color(&self, chan: usize) -> [u8; 4] {
        self.word(XFMEM_SETCHAN0_AMBCOLOR + chan as u32).to_be_bytes()
    }

    /// Material color register as RGBA
    pub fn mat_color(&self, chan: usize) -> [u8; 4] {
        self.word(XFMEM_SETCHAN0_MATCOLOR + chan as u32).to_be_bytes()
    }

    pub fn color_channel(&self, chan: usize) -> LitChannel {
        LitChannel(self.word(XFMEM_SETCHAN0_COLOR + chan as u32))
    }

    pub fn alpha_channel(&self, chan: usize) -> LitChannel {
        LitChannel(self.word(XFMEM_SETCHAN0_ALPHA + chan as u32))
    }

    pub fn dual_tex_enabled(&self) -> bool {
        self.word(XFMEM_DUALTEX) & 1 != 0
    }

    pub fn viewport(&self) -> Viewport {
        let base = XFMEM_SETVIEWPORT;
        Viewport {
            wd: self.float(base),
            ht: self.float(base + 1),
            z_range: self.float(base + 2),
            x_orig: self.float(base + 3),
            y_orig: self.float(base + 4),
            far_z: self.float(base + 5),
        }
    }

    pub fn projection(&self) -> [f32; 6] {
        let mut p = [0.0; 6];
        for (i, v) in p.iter_mut().enumerate() {
            *v = self.float(XFMEM_SETPROJECTION + i as u32);
        }
        p
    }

    /// True for orthographic projection
    pub fn projection_is_ortho(&self) -> bool {
        self.word(XFMEM_SETPROJECTIONTYPE) & 1 != 0
    }

    pub fn num_texgens(&self) -> u32 {
        extract(self.word(XFMEM_SETNUMTEXGENS), 0, 4)
    }

    pub fn tex_mtx_info(&self, coord: usize) -> TexMtxInfo {
        TexMtxInfo(self.word(XFMEM_SETTEXMTXINFO + coord as u32))
    }

    pub fn post_mtx_info(&self, coord: usize) -> PostMtxInfo {
        PostMtxInfo(self.word(XFMEM_SETPOSTMTXINFO + coord as u32))
    }
}

impl Default for XfMemory {
    fn default() -> Self {
        Self::new()
    }
}
