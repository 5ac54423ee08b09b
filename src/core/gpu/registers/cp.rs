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

//! CP (command processor) vertex format registers
//!
//! Written through the `0x08` opcode with an 8-bit sub-address:
//!
//! ```text
//! Sub-address | Register
//! ------------|-------------------------------------
//! 0x30        | matrix index A (pos/nrm, tex0-3)
//! 0x40        | matrix index B (tex4-7)
//! 0x50        | vertex descriptor, low 17 bits
//! 0x60        | vertex descriptor, high 16 bits
//! 0x70 + n    | VAT group 0 for format n
//! 0x80 + n    | VAT group 1 for format n
//! 0x90 + n    | VAT group 2 for format n
//! 0xA0 + i    | array base address
//! 0xB0 + i    | array stride
//! ```
//!
//! Arrays 0-11 back indexed vertex attributes. Arrays 12-15 back the indexed
//! XF loads.

use serde::{Deserialize, Serialize};

/// Array slots
pub mod arrays {
    pub const POSITION: usize = 0;
    pub const NORMAL: usize = 1;
    pub const COLOR0: usize = 2;
    pub const TEXCOORD0: usize = 4;
    pub const XF_A: usize = 12;
}

/// How an attribute is stored in the vertex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeMode {
    NotPresent,
    Direct,
    Index8,
    Index16,
}

impl AttributeMode {
    pub fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => AttributeMode::NotPresent,
            1 => AttributeMode::Direct,
            2 => AttributeMode::Index8,
            _ => AttributeMode::Index16,
        }
    }

    /// Bytes the attribute occupies when stored as an index
    pub fn index_size(self) -> Option<u32> {
        match self {
            AttributeMode::Index8 => Some(1),
            AttributeMode::Index16 => Some(2),
            _ => None,
        }
    }
}

/// Numeric format of position, normal and texcoord components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentFormat {
    UByte,
    Byte,
    UShort,
    Short,
    Float,
}

impl ComponentFormat {
    /// 5-7 behave as float on hardware
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => ComponentFormat::UByte,
            1 => ComponentFormat::Byte,
            2 => ComponentFormat::UShort,
            3 => ComponentFormat::Short,
            _ => ComponentFormat::Float,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            ComponentFormat::UByte | ComponentFormat::Byte => 1,
            ComponentFormat::UShort | ComponentFormat::Short => 2,
            ComponentFormat::Float => 4,
        }
    }
}

/// Vertex color encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    Rgb565,
    Rgb888,
    Rgb888x,
    Rgba4444,
    Rgba6666,
    Rgba8888,
}

impl ColorFormat {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => ColorFormat::Rgb565,
            1 => ColorFormat::Rgb888,
            2 => ColorFormat::Rgb888x,
            3 => ColorFormat::Rgba4444,
            4 => ColorFormat::Rgba6666,
            _ => ColorFormat::Rgba8888,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            ColorFormat::Rgb565 | ColorFormat::Rgba4444 => 2,
            ColorFormat::Rgb888 | ColorFormat::Rgba6666 => 3,
            ColorFormat::Rgb888x | ColorFormat::Rgba8888 => 4,
        }
    }
}

register! {
    /// 0x30
    MatrixIndexA {
        pos_normal / set_pos_normal: 0, 6;
        tex0 / set_tex0: 6, 6;
        tex1 / set_tex1: 12, 6;
        tex2 / set_tex2: 18, 6;
        tex3 / set_tex3: 24, 6;
    }
}

register! {
    /// 0x40
    MatrixIndexB {
        tex4 / set_tex4: 0, 6;
        tex5 / set_tex5: 6, 6;
        tex6 / set_tex6: 12, 6;
        tex7 / set_tex7: 18, 6;
    }
}

register! {
    /// 0x70 + n
    VatGroup0 {
        pos_elements / set_pos_elements: 0, 1;
        pos_format / set_pos_format: 1, 3;
        pos_frac / set_pos_frac: 4, 5;
        normal_elements / set_normal_elements: 9, 1;
        normal_format / set_normal_format: 10, 3;
        color0_elements / set_color0_elements: 13, 1;
        color0_comp / set_color0_comp: 14, 3;
        color1_elements / set_color1_elements: 17, 1;
        color1_comp / set_color1_comp: 18, 3;
        tex0_elements / set_tex0_elements: 21, 1;
        tex0_format / set_tex0_format: 22, 3;
        tex0_frac / set_tex0_frac: 25, 5;
        byte_dequant / set_byte_dequant: 30, 1;
        normal_index3 / set_normal_index3: 31, 1;
    }
}

register! {
    /// 0x80 + n
    VatGroup1 {
        tex1_elements / set_tex1_elements: 0, 1;
        tex1_format / set_tex1_format: 1, 3;
        tex1_frac / set_tex1_frac: 4, 5;
        tex2_elements / set_tex2_elements: 9, 1;
        tex2_format / set_tex2_format: 10, 3;
        tex2_frac / set_tex2_frac: 13, 5;
        tex3_elements / set_tex3_elements: 18, 1;
        tex3_format / set_tex3_format: 19, 3;
        tex3_frac / set_tex3_frac: 22, 5;
        tex4_elements / set_tex4_elements: 27, 1;
        tex4_format / set_tex4_format: 28, 3;
        vcache_enhance / set_vcache_enhance: 31, 1;
    }
}

register! {
    /// 0x90 + n
    VatGroup2 {
        tex4_frac / set_tex4_frac: 0, 5;
        tex5_elements / set_tex5_elements: 5, 1;
        tex5_format / set_tex5_format: 6, 3;
        tex5_frac / set_tex5_frac: 9, 5;
        tex6_elements / set_tex6_elements: 14, 1;
        tex6_format / set_tex6_format: 15, 3;
        tex6_frac / set_tex6_frac: 18, 5;
        tex7_elements / set_tex7_elements: 23, 1;
        tex7_format / set_tex7_format: 24, 3;
        tex7_frac / set_tex7_frac: 27, 5;
    }
}

/// Vertex descriptor: which attributes are present and how
///
/// 33 bits. The low 17 bits come from sub-address 0x50, the rest from 0x60.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexDescriptor(pub u64);

impl VertexDescriptor {
    pub fn pos_mat_idx(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn tex_mat_idx(self, i: usize) -> bool {
        (self.0 >> (1 + i)) & 1 != 0
    }

    pub fn position(self) -> AttributeMode {
        AttributeMode::from_bits(self.0 >> 9)
    }

    pub fn normal(self) -> AttributeMode {
        AttributeMode::from_bits(self.0 >> 11)
    }

    pub fn color(self, i: usize) -> AttributeMode {
        AttributeMode::from_bits(self.0 >> (13 + 2 * i))
    }

    pub fn tex_coord(self, i: usize) -> AttributeMode {
        AttributeMode::from_bits(self.0 >> (17 + 2 * i))
    }

    pub fn set_low(&mut self, value: u32) {
        self.0 = (self.0 & !0x1FFFF) | (value as u64 & 0x1FFFF);
    }

    pub fn set_high(&mut self, value: u32) {
        self.0 = (self.0 & 0x1FFFF) | ((value as u64 & 0xFFFF) << 17);
    }
}

/// Resolved texcoord format for one of the eight coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexCoordFormat {
    /// Two components (ST) instead of one (S)
    pub two_elements: bool,
    pub format: ComponentFormat,
    pub frac: u32,
}

/// One vertex attribute table entry (three register groups)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexAttributeTable {
    pub g0: VatGroup0,
    pub g1: VatGroup1,
    pub g2: VatGroup2,
}

impl VertexAttributeTable {
    pub fn tex_coord(&self, i: usize) -> TexCoordFormat {
        let (elements, format, frac) = match i {
            0 => (self.g0.tex0_elements(), self.g0.tex0_format(), self.g0.tex0_frac()),
            1 => (self.g1.tex1_elements(), self.g1.tex1_format(), self.g1.tex1_frac()),
            2 => (self.g1.tex2_elements(), self.g1.tex2_format(), self.g1.tex2_frac()),
            3 => (self.g1.tex3_elements(), self.g1.tex3_format(), self.g1.tex3_frac()),
            4 => (self.g1.tex4_elements(), self.g1.tex4_format(), self.g2.tex4_frac()),
            5 => (self.g2.tex5_elements(), self.g2.tex5_format(), self.g2.tex5_frac()),
            6 => (self.g2.tex6_elements(), self.g2.tex6_format(), self.g2.tex6_frac()),
            _ => (self.g2.tex7_elements(), self.g2.tex7_format(), self.g2.tex7_frac()),
        };
        TexCoordFormat {
            two_elements: elements != 0,
            format: ComponentFormat::from_bits(format),
            frac,
        }
    }

    pub fn color_format(&self, i: usize) -> ColorFormat {
        if i == 0 {
            ColorFormat::from_bits(self.g0.color0_comp())
        } else {
            ColorFormat::from_bits(self.g0.color1_comp())
        }
    }
}

/// The CP register state
#[derive(Debug, Clone, Default)]
pub struct CpMemory {
    pub matrix_index_a: MatrixIndexA,
    pub matrix_index_b: MatrixIndexB,
    pub vtx_desc: VertexDescriptor,
    pub vtx_attr: [VertexAttributeTable; 8],
    pub array_bases: [u32; 16],
    pub array_strides: [u32; 16],
}

impl CpMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a CP register load
    pub fn load(&mut self, sub_cmd: u8, value: u32) {
        let index = (sub_cmd & 0x0F) as usize;
        match sub_cmd & 0xF0 {
            0x30 => self.matrix_index_a = MatrixIndexA(value),
            0x40 => self.matrix_index_b = MatrixIndexB(value),
            0x50 => self.vtx_desc.set_low(value),
            0x60 => self.vtx_desc.set_high(value),
            0x70 => self.vtx_attr[index & 7].g0 = VatGroup0(value),
            0x80 => self.vtx_attr[index & 7].g1 = VatGroup1(value),
            0x90 => self.vtx_attr[index & 7].g2 = VatGroup2(value),
            0xA0 => self.array_bases[index] = value,
            0xB0 => self.array_strides[index] = value & 0xFF,
            _ => log::warn!("Unknown CP register 0x{:02X} = 0x{:08X}", sub_cmd, value),
        }
    }

    /// Default texture matrix index when none is streamed
    pub fn tex_matrix_index(&self, i: usize) -> u32 {
        match i {
            0 => self.matrix_index_a.tex0(),
            1 => self.matrix_index_a.tex1(),
            2 => self.matrix_index_a.tex2(),
            3 => self.matrix_index_a.tex3(),
            4 => self.matrix_index_b.tex4(),
            5 => self.matrix_index_b.tex5(),
            6 => self.matrix_index_b.tex6(),
            _ => self.matrix_index_b.tex7(),
        }
    }

    /// Address of element `index` in array `array`
    #[inline]
    pub fn array_address(&self, array: usize, index: u32) -> u32 {
        self.array_bases[array].wrapping_add(self.array_strides[array].wrapping_mul(index))
    }

    /// Flatten to raw words for save states
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(4 + 24 + 32);
        words.push(self.matrix_index_a.0);
        words.push(self.matrix_index_b.0);
        words.push(self.vtx_desc.0 as u32);
        words.push((self.vtx_desc.0 >> 32) as u32);
        for vat in &self.vtx_attr {
            words.extend_from_slice(&[vat.g0.0, vat.g1.0, vat.g2.0]);
        }
        words.extend_from_slice(&self.array_bases);
        words.extend_from_slice(&self.array_strides);
        words
    }

    /// Restore from [`CpMemory::to_words`] output
    pub fn from_words(words: &[u32]) -> Option<Self> {
        if words.len() != 4 + 24 + 32 {
            return None;
        }
        let mut cp = Self {
            matrix_index_a: MatrixIndexA(words[0]),
            matrix_index_b: MatrixIndexB(words[1]),
            vtx_desc: VertexDescriptor(words[2] as u64 | ((words[3] as u64) << 32)),
            ..Self::default()
        };
        for (i, vat) in cp.vtx_attr.iter_mut().enumerate() {
            let base = 4 + i * 3;
            vat.g0 = VatGroup0(words[base]);
            vat.g1 = VatGroup1(words[base + 1]);
            vat.g2 = VatGroup2(words[base + 2]);
        }
        cp.array_bases.copy_from_slice(&words[28..44]);
        cp.array_strides.copy_from_slice(&words[44..60]);
        Some(cp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_descriptor_split_writes() {
        let mut cp = CpMemory::new();
        // Position direct, color0 index8
        cp.load(0x50, (1 << 9) | (2 << 13));
        // Tex0 index16, tex7 direct
        cp.load(0x60, 3 | (1 << 14));

        let desc = cp.vtx_desc;
        assert_eq!(desc.position(), AttributeMode::Direct);
        assert_eq!(desc.normal(), AttributeMode::NotPresent);
        assert_eq!(desc.color(0), AttributeMode::Index8);
        assert_eq!(desc.tex_coord(0), AttributeMode::Index16);
        assert_eq!(desc.tex_coord(7), AttributeMode::Direct);

        // Rewriting the low half leaves the texcoords alone
        cp.load(0x50, 1 << 9);
        assert_eq!(cp.vtx_desc.color(0), AttributeMode::NotPresent);
        assert_eq!(cp.vtx_desc.tex_coord(0), AttributeMode::Index16);
    }

    #[test]
    fn test_vat_texcoord_fields() {
        let mut vat = VertexAttributeTable::default();
        vat.g1.set_tex4_elements(1);
        vat.g1.set_tex4_format(3);
        vat.g2.set_tex4_frac(8);
        vat.g2.set_tex7_format(4);

        let tc4 = vat.tex_coord(4);
        assert!(tc4.two_elements);
        assert_eq!(tc4.format, ComponentFormat::Short);
        assert_eq!(tc4.frac, 8);
        assert_eq!(vat.tex_coord(7).format, ComponentFormat::Float);
    }

    #[test]
    fn test_array_stride_masked() {
        let mut cp = CpMemory::new();
        cp.load(0xA3, 0x0010_0000);
        cp.load(0xB3, 0x1234);

        assert_eq!(cp.array_strides[3], 0x34);
        assert_eq!(cp.array_address(3, 2), 0x0010_0068);
    }

    #[test]
    fn test_word_round_trip() {
        let mut cp = CpMemory::new();
        cp.load(0x30, 0x0ABC_DEF0);
        cp.load(0x60, 0xFFFF);
        cp.load(0x75, 0x1234_5678);
        cp.load(0xAF, 0x8000_0000);

        let restored = CpMemory::from_words(&cp.to_words()).unwrap();
        assert_eq!(restored.matrix_index_a, cp.matrix_index_a);
        assert_eq!(restored.vtx_desc, cp.vtx_desc);
        assert_eq!(restored.vtx_attr[5], cp.vtx_attr[5]);
        assert_eq!(restored.array_bases[15], 0x8000_0000);
    }
}
