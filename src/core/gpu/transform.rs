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

//! Transform unit
//!
//! Position, normal and texture coordinate transforms. Matrices are read
//! straight out of XF memory as row-major 3x4 (or 2x4, 3x3) float blocks.

use super::registers::xf::{SourceRow, TexGenType, TexMtxInfo, XfMemory};
use super::types::{dot3, normalize3, sub3, InputVertexData, OutputVertexData};

/// Pulls clip-space Z just inside the near plane
const DEPTH_FUDGE: f32 = 1.0 - 1e-7;

#[inline]
fn mul_vec3_mat34(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2] + m[3],
        m[4] * v[0] + m[5] * v[1] + m[6] * v[2] + m[7],
        m[8] * v[0] + m[9] * v[1] + m[10] * v[2] + m[11],
    ]
}

#[inline]
fn mul_vec3_mat33(v: [f32; 3], m: &[f32; 9]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// (a, b, 1, 1) through the first two rows
#[inline]
fn mul_vec2_mat24(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] + m[3],
        m[4] * v[0] + m[5] * v[1] + m[6] + m[7],
        1.0,
    ]
}

#[inline]
fn mul_vec3_mat24(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2] + m[3],
        m[4] * v[0] + m[5] * v[1] + m[6] * v[2] + m[7],
        1.0,
    ]
}

#[inline]
fn mul_vec2_mat34(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] + m[3],
        m[4] * v[0] + m[5] * v[1] + m[6] + m[7],
        m[8] * v[0] + m[9] * v[1] + m[10] + m[11],
    ]
}

/// Model-view transform followed by projection into clip space
///
/// # Example
///
/// ```
/// use swgx::core::gpu::registers::XfMemory;
/// use swgx::core::gpu::transform::transform_position;
/// use swgx::core::gpu::{InputVertexData, OutputVertexData};
///
/// let mut xf = XfMemory::new();
/// // Identity model-view, orthographic identity projection
/// let one = 1.0f32.to_bits();
/// xf.load(0, &[one, 0, 0, 0, 0, one, 0, 0, 0, 0, one, 0]);
/// xf.load(0x1020, &[one, 0, one, 0, one, 0, 1]);
///
/// let src = InputVertexData { position: [0.25, -0.5, 0.75], ..Default::default() };
/// let mut dst = OutputVertexData::default();
/// transform_position(&xf, &src, &mut dst);
/// assert_eq!(dst.projected_position, [0.25, -0.5, 0.75, 1.0]);
/// ```
pub fn transform_position(xf: &XfMemory, src: &InputVertexData, dst: &mut OutputVertexData) {
    let mat = xf.pos_matrix(src.pos_mtx as u32);
    let mv = mul_vec3_mat34(src.position, &mat);
    dst.mv_position = mv;

    let proj = xf.projection();
    dst.projected_position = if xf.projection_is_ortho() {
        [
            proj[0] * mv[0] + proj[1],
            proj[2] * mv[1] + proj[3],
            proj[4] * mv[2] + proj[5],
            1.0,
        ]
    } else {
        [
            proj[0] * mv[0] + proj[1] * mv[2],
            proj[2] * mv[1] + proj[3] * mv[2],
            (proj[4] * mv[2] + proj[5]) * DEPTH_FUDGE,
            -mv[2],
        ]
    };
}

/// Normal matrix transform
///
/// Only the primary normal is renormalized, binormal and tangent are not.
pub fn transform_normal(xf: &XfMemory, src: &InputVertexData, nbt: bool, dst: &mut OutputVertexData) {
    let mat = xf.normal_matrix(src.pos_mtx as u32);

    dst.normal[0] = normalize3(mul_vec3_mat33(src.normal[0], &mat));
    if nbt {
        dst.normal[1] = mul_vec3_mat33(src.normal[1], &mat);
        dst.normal[2] = mul_vec3_mat33(src.normal[2], &mat);
    } else {
        dst.normal[1] = [0.0; 3];
        dst.normal[2] = [0.0; 3];
    }
}

fn transform_tex_coord_regular(
    xf: &XfMemory,
    info: TexMtxInfo,
    coord: usize,
    src: &InputVertexData,
    dst: &mut OutputVertexData,
) {
    let input = match SourceRow::from_bits(info.source_row()) {
        SourceRow::Geometry => src.position,
        SourceRow::Normal => src.normal[0],
        SourceRow::BinormalT => src.normal[1],
        SourceRow::BinormalB => src.normal[2],
        SourceRow::Tex(n) => [src.tex_coords[n][0], src.tex_coords[n][1], 1.0],
        SourceRow::Colors => {
            log::warn!("Regular texgen {} reads the color row", coord);
            [0.0, 0.0, 1.0]
        }
    };

    let mat = xf.pos_matrix(src.tex_mtx[coord] as u32);
    let ab11 = info.input_form() == 0;
    let mut out = match (info.projection() != 0, ab11) {
        (false, true) => mul_vec2_mat24(input, &mat),
        (false, false) => mul_vec3_mat24(input, &mat),
        (true, true) => mul_vec2_mat34(input, &mat),
        (true, false) => mul_vec3_mat34(input, &mat),
    };

    if xf.dual_tex_enabled() {
        let post = xf.post_mtx_info(coord);
        let post_mat = xf.post_matrix(post.index());
        let temp = if post.normalize() != 0 {
            let len = dot3(out, out).sqrt();
            let inv = 1.0 / len;
            [out[0] * inv, out[1] * inv, out[2] * inv]
        } else {
            out
        };
        out = mul_vec3_mat34(temp, &post_mat);
    }

    // A zero Q halves and clamps S and T
    if out[2] == 0.0 {
        out[0] = (out[0] / 2.0).clamp(-1.0, 1.0);
        out[1] = (out[1] / 2.0).clamp(-1.0, 1.0);
    }

    dst.tex_coords[coord] = out;
}

/// Texcoord 0 from texcoord input 0 through a 2x4 matrix
///
/// Only valid when the format streams position and texcoord 0 alone and
/// generator 0 is an ST generator sourcing an input texcoord row.
fn transform_tex_coord_st_fast(xf: &XfMemory, info: TexMtxInfo, src: &InputVertexData, dst: &mut OutputVertexData) {
    let row = SourceRow::from_bits(info.source_row());
    let SourceRow::Tex(n) = row else {
        return transform_tex_coord_regular(xf, info, 0, src, dst);
    };
    if info.projection() != 0 || xf.dual_tex_enabled() {
        return transform_tex_coord_regular(xf, info, 0, src, dst);
    }

    let mat = xf.pos_matrix(src.tex_mtx[0] as u32);
    let s = src.tex_coords[n][0];
    let t = src.tex_coords[n][1];
    // AB11 and ABC1 agree here since C is 1 for texcoord rows
    dst.tex_coords[0] = [
        mat[0] * s + mat[1] * t + mat[2] + mat[3],
        mat[4] * s + mat[5] * t + mat[6] + mat[7],
        1.0,
    ];
}

/// Run every enabled texture coordinate generator
///
/// `dst` must already hold the transformed position, normals and colors:
/// emboss and color generators read them.
pub fn transform_tex_coords(
    xf: &XfMemory,
    src: &InputVertexData,
    dst: &mut OutputVertexData,
    st_fast_path: bool,
) {
    let num = (xf.num_texgens() as usize).min(8);
    for coord in 0..num {
        let info = xf.tex_mtx_info(coord);
        match TexGenType::from_bits(info.texgen_type()) {
            TexGenType::Regular => {
                if coord == 0 && st_fast_path {
                    transform_tex_coord_st_fast(xf, info, src, dst);
                } else {
                    transform_tex_coord_regular(xf, info, coord, src, dst);
                }
            }
            TexGenType::EmbossMap => {
                let light = xf.light(info.emboss_light() as usize);
                let ldir = normalize3(sub3(light.pos, dst.mv_position));
                let d1 = dot3(ldir, dst.normal[1]);
                let d2 = dot3(ldir, dst.normal[2]);

                let source = dst.tex_coords[info.emboss_source() as usize];
                dst.tex_coords[coord] = [source[0] + d1, source[1] + d2, source[2]];
            }
            TexGenType::Color0 => {
                let c = dst.color[0];
                dst.tex_coords[coord] = [c[0] as f32 / 255.0, c[1] as f32 / 255.0, 1.0];
            }
            TexGenType::Color1 => {
                let c = dst.color[1];
                dst.tex_coords[coord] = [c[0] as f32 / 255.0, c[1] as f32 / 255.0, 1.0];
            }
        }
    }
}
