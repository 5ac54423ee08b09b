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

//! Vertex loader
//!
//! Turns the raw bytes of one vertex into an [`InputVertexData`] according to
//! the active vertex descriptor and attribute table.
//!
//! On every format change the loader builds a list of [`AttributeLoader`]s in
//! the hardware's fixed order:
//!
//! 1. position/normal matrix index (1 byte)
//! 2. texture matrix indices 0-7 (1 byte each)
//! 3. position
//! 4. normal (or normal/binormal/tangent)
//! 5. colors 0-1
//! 6. texture coordinates 0-7
//!
//! The vertex size is the sum of the loader sizes. Indexed attributes are
//! fetched live from main memory through the CP array base/stride pairs.

use super::registers::cp::{
    arrays, AttributeMode, ColorFormat, ComponentFormat, CpMemory, VertexAttributeTable,
};
use super::registers::xf::XfMemory;
use super::types::{DataReader, InputVertexData, Primitive};
use crate::core::error::{DecodeFault, Result};
use crate::core::memory::MemoryAccessor;

/// One attribute decode step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLoader {
    PosMatrixIndex,
    TexMatrixIndex(u8),
    Position {
        mode: AttributeMode,
        format: ComponentFormat,
        elements: u8,
        frac: u8,
    },
    Normal {
        mode: AttributeMode,
        format: ComponentFormat,
        /// Normal, binormal and tangent
        nbt: bool,
        /// NBT with one index per vector
        index3: bool,
    },
    Color {
        chan: u8,
        mode: AttributeMode,
        format: ColorFormat,
    },
    TexCoord {
        coord: u8,
        mode: AttributeMode,
        format: ComponentFormat,
        elements: u8,
        frac: u8,
    },
}

impl AttributeLoader {
    /// Bytes this attribute occupies in the vertex stream
    pub fn size(&self) -> u32 {
        match *self {
            AttributeLoader::PosMatrixIndex | AttributeLoader::TexMatrixIndex(_) => 1,
            AttributeLoader::Position {
                mode,
                format,
                elements,
                ..
            } => mode
                .index_size()
                .unwrap_or(format.size() * elements as u32),
            AttributeLoader::Normal {
                mode,
                format,
                nbt,
                index3,
            } => {
                let vectors = if nbt { 3 } else { 1 };
                match mode.index_size() {
                    Some(size) if nbt && index3 => size * 3,
                    Some(size) => size,
                    None => format.size() * 3 * vectors,
                }
            }
            AttributeLoader::Color { mode, format, .. } => {
                mode.index_size().unwrap_or(format.size())
            }
            AttributeLoader::TexCoord {
                mode,
                format,
                elements,
                ..
            } => mode
                .index_size()
                .unwrap_or(format.size() * elements as u32),
        }
    }
}

/// Decoded format state for the current draw
#[derive(Debug, Clone)]
pub struct VertexLoader {
    loaders: Vec<AttributeLoader>,
    vertex_size: u32,
    vat_index: u8,
    primitive: Primitive,
    tex_gen_special_case: bool,
}

impl VertexLoader {
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            vertex_size: 0,
            vat_index: 0,
            primitive: Primitive::Triangles,
            tex_gen_special_case: false,
        }
    }

    /// Rebuild the loader list for `vat_index`
    pub fn set_format(&mut self, cp: &CpMemory, xf: &XfMemory, vat_index: u8, primitive: Primitive) {
        let desc = cp.vtx_desc;
        let vat: &VertexAttributeTable = &cp.vtx_attr[(vat_index & 7) as usize];

        self.vat_index = vat_index & 7;
        self.primitive = primitive;
        self.loaders.clear();

        if desc.pos_mat_idx() {
            self.loaders.push(AttributeLoader::PosMatrixIndex);
        }
        for i in 0..8 {
            if desc.tex_mat_idx(i) {
                self.loaders.push(AttributeLoader::TexMatrixIndex(i as u8));
            }
        }

        let position = desc.position();
        if position == AttributeMode::NotPresent {
            log::warn!("Vertex format {} has no position", vat_index);
        }
        self.loaders.push(AttributeLoader::Position {
            // Position is mandatory and treated as direct when absent
            mode: if position == AttributeMode::NotPresent {
                AttributeMode::Direct
            } else {
                position
            },
            format: ComponentFormat::from_bits(vat.g0.pos_format()),
            elements: if vat.g0.pos_elements() != 0 { 3 } else { 2 },
            frac: vat.g0.pos_frac() as u8,
        });

        let normal = desc.normal();
        if normal != AttributeMode::NotPresent {
            self.loaders.push(AttributeLoader::Normal {
                mode: normal,
                format: ComponentFormat::from_bits(vat.g0.normal_format()),
                nbt: vat.g0.normal_elements() != 0,
                index3: vat.g0.normal_index3() != 0,
            });
        }

        for chan in 0..2 {
            let mode = desc.color(chan);
            if mode != AttributeMode::NotPresent {
                self.loaders.push(AttributeLoader::Color {
                    chan: chan as u8,
                    mode,
                    format: vat.color_format(chan),
                });
            }
        }

        for coord in 0..8 {
            let mode = desc.tex_coord(coord);
            if mode != AttributeMode::NotPresent {
                let fmt = vat.tex_coord(coord);
                self.loaders.push(AttributeLoader::TexCoord {
                    coord: coord as u8,
                    mode,
                    format: fmt.format,
                    elements: if fmt.two_elements { 2 } else { 1 },
                    frac: fmt.frac as u8,
                });
            }
        }

        self.vertex_size = self.loaders.iter().map(AttributeLoader::size).sum();

        // Only position and texcoord 0, with an ST texgen for coordinate 0
        self.tex_gen_special_case = (desc.0 & 0x60600) == desc.0
            && desc.tex_coord(0) != AttributeMode::NotPresent
            && xf.tex_mtx_info(0).projection() == 0;

        log::trace!(
            "Vertex format {} {:?}: {} loaders, {} bytes",
            self.vat_index,
            primitive,
            self.loaders.len(),
            self.vertex_size
        );
    }

    #[inline]
    pub fn vertex_size(&self) -> u32 {
        self.vertex_size
    }

    pub fn loaders(&self) -> &[AttributeLoader] {
        &self.loaders
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn tex_gen_special_case(&self) -> bool {
        self.tex_gen_special_case
    }

    /// Whether the current format streams NBT normals
    pub fn has_nbt(&self) -> bool {
        self.loaders
            .iter()
            .any(|l| matches!(l, AttributeLoader::Normal { nbt: true, .. }))
    }

    /// Decode one vertex from `reader`
    ///
    /// Consumes exactly [`VertexLoader::vertex_size`] bytes.
    pub fn load_vertex(
        &self,
        cp: &CpMemory,
        reader: &mut DataReader<'_>,
        memory: &dyn MemoryAccessor,
    ) -> Result<InputVertexData> {
        let available = reader.remaining();
        let bytes = reader
            .read_bytes(self.vertex_size as usize)
            .ok_or(DecodeFault::BufferUnderflow {
                needed: self.vertex_size as usize,
                available,
            })?;

        let mut vtx = InputVertexData {
            pos_mtx: cp.matrix_index_a.pos_normal() as u8,
            ..Default::default()
        };
        for i in 0..8 {
            vtx.tex_mtx[i] = cp.tex_matrix_index(i) as u8;
        }

        let mut src = DataReader::new(bytes);
        for loader in &self.loaders {
            load_attribute(loader, cp, &mut src, memory, &mut vtx);
        }
        debug_assert_eq!(src.remaining(), 0);

        Ok(vtx)
    }
}

impl Default for VertexLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read an index and return the address of the element it selects
fn read_index(
    mode: AttributeMode,
    array: usize,
    cp: &CpMemory,
    src: &mut DataReader<'_>,
) -> Option<u32> {
    let index = match mode {
        AttributeMode::Index8 => src.read_u8()? as u32,
        AttributeMode::Index16 => src.read_u16()? as u32,
        _ => return None,
    };
    Some(cp.array_address(array, index))
}

/// Largest attribute: float NBT, nine components
static ZEROS: [u8; 36] = [0; 36];

/// Bytes for an attribute, from the stream or its array
///
/// Unmapped array reads log an error and decode as zeros.
fn attribute_bytes<'s, 'd: 's>(
    mode: AttributeMode,
    array: usize,
    len: usize,
    cp: &CpMemory,
    src: &mut DataReader<'d>,
    memory: &'s dyn MemoryAccessor,
) -> &'s [u8] {
    if mode == AttributeMode::Direct {
        return src.read_bytes(len).unwrap_or(&ZEROS[..len]);
    }
    match read_index(mode, array, cp, src) {
        Some(address) => fetch_array(memory, array, address, len),
        None => &ZEROS[..len],
    }
}

fn fetch_array<'s>(memory: &'s dyn MemoryAccessor, array: usize, address: u32, len: usize) -> &'s [u8] {
    match memory.get_slice(address, len) {
        Some(bytes) => bytes,
        None => {
            log::error!(
                "Vertex array {} read at 0x{:08X} ({} bytes) is unmapped",
                array,
                address,
                len
            );
            &ZEROS[..len]
        }
    }
}

#[inline]
fn read_component(bytes: &[u8], index: usize, format: ComponentFormat, scale: f32) -> f32 {
    match format {
        ComponentFormat::UByte => bytes[index] as f32 * scale,
        ComponentFormat::Byte => bytes[index] as i8 as f32 * scale,
        ComponentFormat::UShort => {
            let o = index * 2;
            u16::from_be_bytes([bytes[o], bytes[o + 1]]) as f32 * scale
        }
        ComponentFormat::Short => {
            let o = index * 2;
            i16::from_be_bytes([bytes[o], bytes[o + 1]]) as f32 * scale
        }
        ComponentFormat::Float => {
            let o = index * 4;
            f32::from_be_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
        }
    }
}

#[inline]
fn dequant_scale(format: ComponentFormat, frac: u8) -> f32 {
    match format {
        ComponentFormat::Float => 1.0,
        _ => 1.0 / (1u32 << frac) as f32,
    }
}

/// Fixed normal scale per component format
#[inline]
fn normal_scale(format: ComponentFormat) -> f32 {
    match format {
        ComponentFormat::UByte => 1.0 / 128.0,
        ComponentFormat::Byte => 1.0 / 64.0,
        ComponentFormat::UShort => 1.0 / 32768.0,
        ComponentFormat::Short => 1.0 / 16384.0,
        ComponentFormat::Float => 1.0,
    }
}

/// Decode a vertex color to RGBA
pub fn decode_color(format: ColorFormat, b: &[u8]) -> [u8; 4] {
    use super::texture::decoder::{convert4to8, convert5to8, convert6to8};

    match format {
        ColorFormat::Rgb565 => {
            let v = u16::from_be_bytes([b[0], b[1]]);
            [
                convert5to8((v >> 11) as u8 & 0x1F),
                convert6to8((v >> 5) as u8 & 0x3F),
                convert5to8(v as u8 & 0x1F),
                0xFF,
            ]
        }
        ColorFormat::Rgb888 | ColorFormat::Rgb888x => [b[0], b[1], b[2], 0xFF],
        ColorFormat::Rgba4444 => {
            let v = u16::from_be_bytes([b[0], b[1]]);
            [
                convert4to8((v >> 12) as u8 & 0xF),
                convert4to8((v >> 8) as u8 & 0xF),
                convert4to8((v >> 4) as u8 & 0xF),
                convert4to8(v as u8 & 0xF),
            ]
        }
        ColorFormat::Rgba6666 => {
            let v = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
            [
                convert6to8((v >> 18) as u8 & 0x3F),
                convert6to8((v >> 12) as u8 & 0x3F),
                convert6to8((v >> 6) as u8 & 0x3F),
                convert6to8(v as u8 & 0x3F),
            ]
        }
        ColorFormat::Rgba8888 => [b[0], b[1], b[2], b[3]],
    }
}

fn load_attribute(
    loader: &AttributeLoader,
    cp: &CpMemory,
    src: &mut DataReader<'_>,
    memory: &dyn MemoryAccessor,
    vtx: &mut InputVertexData,
) {
    match *loader {
        AttributeLoader::PosMatrixIndex => {
            vtx.pos_mtx = src.read_u8().unwrap_or(0) & 0x3F;
        }
        AttributeLoader::TexMatrixIndex(i) => {
            vtx.tex_mtx[i as usize] = src.read_u8().unwrap_or(0) & 0x3F;
        }
        AttributeLoader::Position {
            mode,
            format,
            elements,
            frac,
        } => {
            let len = (format.size() * elements as u32) as usize;
            let bytes = attribute_bytes(mode, arrays::POSITION, len, cp, src, memory);
            let scale = dequant_scale(format, frac);
            for i in 0..elements as usize {
                vtx.position[i] = read_component(bytes, i, format, scale);
            }
            if elements == 2 {
                vtx.position[2] = 0.0;
            }
        }
        AttributeLoader::Normal {
            mode,
            format,
            nbt,
            index3,
        } => {
            let vectors = if nbt { 3 } else { 1 };
            let vec_len = (format.size() * 3) as usize;
            let scale = normal_scale(format);

            if nbt && index3 && mode != AttributeMode::Direct {
                // One index per vector, vector n at offset n within the element
                for n in 0..3 {
                    let bytes = match read_index(mode, arrays::NORMAL, cp, src) {
                        Some(address) => fetch_array(
                            memory,
                            arrays::NORMAL,
                            address.wrapping_add((n * vec_len) as u32),
                            vec_len,
                        ),
                        None => &ZEROS[..vec_len],
                    };
                    for i in 0..3 {
                        vtx.normal[n][i] = read_component(bytes, i, format, scale);
                    }
                }
            } else {
                let bytes = attribute_bytes(
                    mode,
                    arrays::NORMAL,
                    vec_len * vectors,
                    cp,
                    src,
                    memory,
                );
                for n in 0..vectors {
                    for i in 0..3 {
                        vtx.normal[n][i] = read_component(bytes, n * 3 + i, format, scale);
                    }
                }
            }
        }
        AttributeLoader::Color { chan, mode, format } => {
            let bytes = attribute_bytes(
                mode,
                arrays::COLOR0 + chan as usize,
                format.size() as usize,
                cp,
                src,
                memory,
            );
            vtx.color[chan as usize] = decode_color(format, bytes);
        }
        AttributeLoader::TexCoord {
            coord,
            mode,
            format,
            elements,
            frac,
        } => {
            let len = (format.size() * elements as u32) as usize;
            let bytes = attribute_bytes(
                mode,
                arrays::TEXCOORD0 + coord as usize,
                len,
                cp,
                src,
                memory,
            );
            let scale = dequant_scale(format, frac);
            let tc = &mut vtx.tex_coords[coord as usize];
            tc[0] = read_component(bytes, 0, format, scale);
            tc[1] = if elements == 2 {
                read_component(bytes, 1, format, scale)
            } else {
                0.0
            };
        }
    }
}
