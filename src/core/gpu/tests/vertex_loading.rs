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

//! Vertex loader tests
//! Tests for stream layout, attribute decoding and indexed arrays

use crate::core::error::{DecodeFault, EmulatorError};
use crate::core::gpu::registers::{CpMemory, XfMemory};
use crate::core::gpu::vertex_loader::{AttributeLoader, VertexLoader};
use crate::core::gpu::{DataReader, Primitive};
use crate::core::memory::{MainMemory, MemoryAccessor};
use proptest::prelude::*;

fn component_size(format: u32) -> u32 {
    match format & 7 {
        0 | 1 => 1,
        2 | 3 => 2,
        _ => 4,
    }
}

fn color_size(format: u32) -> u32 {
    match format & 7 {
        0 | 3 => 2,
        1 | 4 => 3,
        _ => 4,
    }
}

fn bits(value: u32, shift: u32, width: u32) -> u32 {
    (value >> shift) & ((1 << width) - 1)
}

/// Stream size of a vertex, straight from the raw register words
fn expected_vertex_size(vcd_lo: u32, vcd_hi: u32, g0: u32, g1: u32, g2: u32) -> u32 {
    let sized = |mode: u32, direct: u32| match mode {
        0 => 0,
        1 => direct,
        2 => 1,
        _ => 2,
    };

    // Matrix indices are one byte each
    let mut size = (vcd_lo & 0x1FF).count_ones();

    // Position is always loaded, direct when absent
    let pos_mode = bits(vcd_lo, 9, 2).max(1);
    let pos_elements = if bits(g0, 0, 1) != 0 { 3 } else { 2 };
    size += sized(pos_mode, component_size(bits(g0, 1, 3)) * pos_elements);

    let normal_mode = bits(vcd_lo, 11, 2);
    let nbt = bits(g0, 9, 1) != 0;
    let index3 = bits(g0, 31, 1) != 0;
    let normal_direct = component_size(bits(g0, 10, 3)) * 3 * if nbt { 3 } else { 1 };
    size += match normal_mode {
        2 | 3 if nbt && index3 => sized(normal_mode, 0) * 3,
        _ => sized(normal_mode, normal_direct),
    };

    size += sized(bits(vcd_lo, 13, 2), color_size(bits(g0, 14, 3)));
    size += sized(bits(vcd_lo, 15, 2), color_size(bits(g0, 18, 3)));

    let tex_formats = [
        (bits(g0, 21, 1), bits(g0, 22, 3)),
        (bits(g1, 0, 1), bits(g1, 1, 3)),
        (bits(g1, 9, 1), bits(g1, 10, 3)),
        (bits(g1, 18, 1), bits(g1, 19, 3)),
        (bits(g1, 27, 1), bits(g1, 28, 3)),
        (bits(g2, 5, 1), bits(g2, 6, 3)),
        (bits(g2, 14, 1), bits(g2, 15, 3)),
        (bits(g2, 23, 1), bits(g2, 24, 3)),
    ];
    for (i, (two, format)) in tex_formats.iter().enumerate() {
        let elements = if *two != 0 { 2 } else { 1 };
        size += sized(bits(vcd_hi, 2 * i as u32, 2), component_size(*format) * elements);
    }

    size
}

fn loader_for(cp: &CpMemory) -> VertexLoader {
    let mut loader = VertexLoader::new();
    loader.set_format(cp, &XfMemory::new(), 0, Primitive::Triangles);
    loader
}

proptest! {
    #[test]
    fn prop_vertex_size_is_attribute_sum(
        vcd_lo in 0u32..(1 << 17),
        vcd_hi in 0u32..(1 << 16),
        g0 in any::<u32>(),
        g1 in any::<u32>(),
        g2 in any::<u32>(),
    ) {
        let mut cp = CpMemory::new();
        cp.load(0x50, vcd_lo);
        cp.load(0x60, vcd_hi);
        cp.load(0x70, g0);
        cp.load(0x80, g1);
        cp.load(0x90, g2);

        let loader = loader_for(&cp);
        let sum: u32 = loader.loaders().iter().map(AttributeLoader::size).sum();

        prop_assert_eq!(loader.vertex_size(), sum);
        prop_assert_eq!(loader.vertex_size(), expected_vertex_size(vcd_lo, vcd_hi, g0, g1, g2));
    }

    #[test]
    fn prop_load_consumes_vertex_size(
        vcd_lo in 0u32..(1 << 17),
        vcd_hi in 0u32..(1 << 16),
        g0 in any::<u32>(),
        fill in any::<u8>(),
    ) {
        let mut cp = CpMemory::new();
        cp.load(0x50, vcd_lo);
        cp.load(0x60, vcd_hi);
        cp.load(0x70, g0);

        let loader = loader_for(&cp);
        let data = vec![fill; loader.vertex_size() as usize + 7];
        let memory = MainMemory::with_size(0x100);
        let mut reader = DataReader::new(&data);

        prop_assert!(loader.load_vertex(&cp, &mut reader, &memory).is_ok());
        prop_assert_eq!(reader.position(), loader.vertex_size() as usize);
    }
}

#[test]
fn test_attribute_order() {
    let mut cp = CpMemory::new();
    // Position matrix index, tex matrix 1, position, color 0, texcoord 0
    cp.load(0x50, 1 | (1 << 2) | (1 << 9) | (1 << 13));
    cp.load(0x60, 1);

    let loader = loader_for(&cp);
    let kinds: Vec<&'static str> = loader
        .loaders()
        .iter()
        .map(|l| match l {
            AttributeLoader::PosMatrixIndex => "pnmtx",
            AttributeLoader::TexMatrixIndex(_) => "texmtx",
            AttributeLoader::Position { .. } => "pos",
            AttributeLoader::Normal { .. } => "nrm",
            AttributeLoader::Color { .. } => "clr",
            AttributeLoader::TexCoord { .. } => "tex",
        })
        .collect();
    assert_eq!(kinds, vec!["pnmtx", "texmtx", "pos", "clr", "tex"]);
    assert!(matches!(loader.loaders()[1], AttributeLoader::TexMatrixIndex(1)));
}

#[test]
fn test_direct_fixed_point_position_and_color() {
    let mut cp = CpMemory::new();
    cp.load(0x50, (1 << 9) | (1 << 13));
    // XYZ s16 with 8 fraction bits, RGB565 color
    cp.load(0x70, 1 | (3 << 1) | (8 << 4));

    let loader = loader_for(&cp);
    assert_eq!(loader.vertex_size(), 8);

    let data = [0x01, 0x00, 0xFF, 0x00, 0x00, 0x80, 0xF8, 0x00];
    let memory = MainMemory::with_size(0x100);
    let mut reader = DataReader::new(&data);
    let vtx = loader.load_vertex(&cp, &mut reader, &memory).unwrap();

    assert_eq!(vtx.position, [1.0, -1.0, 0.5]);
    assert_eq!(vtx.color[0], [255, 0, 0, 255]);
}

#[test]
fn test_two_element_position_has_zero_z() {
    let mut cp = CpMemory::new();
    cp.load(0x50, 1 << 9);
    cp.load(0x70, 4 << 1);

    let loader = loader_for(&cp);
    assert_eq!(loader.vertex_size(), 8);

    let mut data = Vec::new();
    data.extend_from_slice(&2.5f32.to_be_bytes());
    data.extend_from_slice(&(-1.0f32).to_be_bytes());
    let memory = MainMemory::with_size(0x100);
    let vtx = loader
        .load_vertex(&cp, &mut DataReader::new(&data), &memory)
        .unwrap();

    assert_eq!(vtx.position, [2.5, -1.0, 0.0]);
}

#[test]
fn test_indexed_position() {
    let mut cp = CpMemory::new();
    cp.load(0x50, 3 << 9);
    cp.load(0x70, 1 | (4 << 1));
    cp.load(0xA0, 0x400);
    cp.load(0xB0, 12);

    let mut memory = MainMemory::with_size(0x1000);
    for (i, v) in [7.0f32, 8.0, 9.0].iter().enumerate() {
        memory.write_u32(0x418 + 4 * i as u32, v.to_bits()).unwrap();
    }

    let loader = loader_for(&cp);
    assert_eq!(loader.vertex_size(), 2);

    let vtx = loader
        .load_vertex(&cp, &mut DataReader::new(&[0x00, 0x02]), &memory)
        .unwrap();
    assert_eq!(vtx.position, [7.0, 8.0, 9.0]);
}

#[test]
fn test_unmapped_array_reads_zero() {
    let mut cp = CpMemory::new();
    cp.load(0x50, (1 << 9) | (2 << 13));
    cp.load(0x70, 1 | (4 << 1) | (5 << 14));
    cp.load(0xA2, 0x10_0000);
    cp.load(0xB2, 4);

    let loader = loader_for(&cp);
    let mut data = vec![0u8; 12];
    data.extend_from_slice(&[0x03]);

    let memory = MainMemory::with_size(0x100);
    let vtx = loader
        .load_vertex(&cp, &mut DataReader::new(&data), &memory)
        .unwrap();
    assert_eq!(vtx.color[0], [0, 0, 0, 0]);
}

#[test]
fn test_matrix_indices() {
    let mut cp = CpMemory::new();
    cp.load(0x30, 7 | (9 << 6));
    cp.load(0x50, 1 | (1 << 9));
    cp.load(0x70, 1 << 1);

    let loader = loader_for(&cp);
    let memory = MainMemory::with_size(0x100);

    // Streamed index, masked to six bits
    let vtx = loader
        .load_vertex(&cp, &mut DataReader::new(&[0x45, 0, 0]), &memory)
        .unwrap();
    assert_eq!(vtx.pos_mtx, 0x05);
    // Texture matrices fall back to the CP defaults
    assert_eq!(vtx.tex_mtx[0], 9);
}

#[test]
fn test_short_buffer_underflows() {
    let mut cp = CpMemory::new();
    cp.load(0x50, 1 << 9);
    cp.load(0x70, 1 | (4 << 1));

    let loader = loader_for(&cp);
    let memory = MainMemory::with_size(0x100);
    let err = loader
        .load_vertex(&cp, &mut DataReader::new(&[0; 5]), &memory)
        .unwrap_err();

    assert!(matches!(
        err,
        EmulatorError::Decode(DecodeFault::BufferUnderflow {
            needed: 12,
            available: 5
        })
    ));
}
