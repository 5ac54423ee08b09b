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

//! Clipper
//!
//! Trivial rejection, backface culling, frustum clipping and the
//! perspective divide for assembled triangles and lines.
//!
//! # Clip Space
//!
//! A vertex is inside when all six of these hold:
//!
//! ```text
//! w - x >= 0    w + x >= 0
//! w - y >= 0    w + y >= 0
//! z <= 0        z + w >= 0
//! ```
//!
//! Polygons are clipped plane by plane (Sutherland-Hodgman) and the result
//! is emitted as a triangle fan around its first vertex.

use super::registers::bp::LinePointWidth;
use super::registers::xf::XfMemory;
use super::types::{GpuStatistics, OutputVertexData};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

pub const CLIP_POS_X_BIT: u32 = 0x01;
pub const CLIP_NEG_X_BIT: u32 = 0x02;
pub const CLIP_POS_Y_BIT: u32 = 0x04;
pub const CLIP_NEG_Y_BIT: u32 = 0x08;
pub const CLIP_POS_Z_BIT: u32 = 0x10;
pub const CLIP_NEG_Z_BIT: u32 = 0x20;

/// Clip planes as (bit, x, y, z, w) coefficients of the inside test
const CLIP_PLANES: [(u32, [f32; 4]); 6] = [
    (CLIP_POS_X_BIT, [-1.0, 0.0, 0.0, 1.0]),
    (CLIP_NEG_X_BIT, [1.0, 0.0, 0.0, 1.0]),
    (CLIP_POS_Y_BIT, [0.0, -1.0, 0.0, 1.0]),
    (CLIP_NEG_Y_BIT, [0.0, 1.0, 0.0, 1.0]),
    (CLIP_POS_Z_BIT, [0.0, 0.0, -1.0, 0.0]),
    (CLIP_NEG_Z_BIT, [0.0, 0.0, 1.0, 1.0]),
];

/// Original 3 vertices plus up to 33 generated by clipping
const MAX_CLIP_VERTICES: usize = 36;

/// Longest clipped polygon: each plane adds at most one vertex
const MAX_POLY: usize = 2 * 6 + 1;

/// Outside-plane mask of one vertex
///
/// # Example
///
/// ```
/// use swgx::core::gpu::clipper::{clip_mask, CLIP_NEG_X_BIT, CLIP_POS_Z_BIT};
/// use swgx::core::gpu::OutputVertexData;
///
/// let mut v = OutputVertexData::default();
/// v.projected_position = [-2.0, 0.0, 0.5, 1.0];
/// assert_eq!(clip_mask(&v), CLIP_NEG_X_BIT | CLIP_POS_Z_BIT);
/// ```
#[inline]
pub fn clip_mask(v: &OutputVertexData) -> u32 {
    let [x, y, z, w] = v.projected_position;
    let mut mask = 0;
    if w - x < 0.0 {
        mask |= CLIP_POS_X_BIT;
    }
    if x + w < 0.0 {
        mask |= CLIP_NEG_X_BIT;
    }
    if w - y < 0.0 {
        mask |= CLIP_POS_Y_BIT;
    }
    if y + w < 0.0 {
        mask |= CLIP_NEG_Y_BIT;
    }
    if z > 0.0 {
        mask |= CLIP_POS_Z_BIT;
    }
    if z + w < 0.0 {
        mask |= CLIP_NEG_Z_BIT;
    }
    mask
}

#[inline]
fn plane_distance(v: &OutputVertexData, plane: &[f32; 4]) -> f32 {
    let p = v.projected_position;
    p[0] * plane[0] + p[1] * plane[1] + p[2] * plane[2] + p[3] * plane[3]
}

#[inline]
fn different_signs(a: f32, b: f32) -> bool {
    (a <= 0.0 && b > 0.0) || (a > 0.0 && b <= 0.0)
}

/// Triangles handed to the rasterizer, already divided
pub type ScreenTriangle = [OutputVertexData; 3];

/// Clipper state: the viewport offset applied in the perspective divide
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Clipper {
    view_offset: [f32; 3],
}

impl Clipper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the offset from the viewport registers
    pub fn set_view_offset(&mut self, xf: &XfMemory) {
        let vp = xf.viewport();
        self.view_offset = [vp.x_orig - 342.0, vp.y_orig - 342.0, vp.far_z];
        log::trace!("View offset {:?}", self.view_offset);
    }

    pub fn view_offset(&self) -> [f32; 3] {
        self.view_offset
    }

    /// Clip space to screen space
    pub fn perspective_divide(&self, xf: &XfMemory, v: &mut OutputVertexData) {
        let vp = xf.viewport();
        let [x, y, z, w] = v.projected_position;
        let inv_w = 1.0 / w;
        v.screen_position = [
            x * inv_w * vp.wd + self.view_offset[0],
            y * inv_w * vp.ht + self.view_offset[1],
            z * inv_w * vp.z_range + self.view_offset[2],
        ];
    }

    /// Orientation of a clip-space triangle, corrected for mirrored viewports
    pub fn is_backface(xf: &XfMemory, v0: &OutputVertexData, v1: &OutputVertexData, v2: &OutputVertexData) -> bool {
        let [x0, y0, _, w0] = v0.projected_position;
        let [x1, y1, _, w1] = v1.projected_position;
        let [x2, y2, _, w2] = v2.projected_position;

        let normal_z_dir = (x0 * w2 - x2 * w0) * y1 + (x2 * y0 - x0 * y2) * w1 + (y2 * w0 - y0 * w2) * x1;
        let mut backface = normal_z_dir <= 0.0;

        let vp = xf.viewport();
        if vp.ht < 0.0 {
            backface = !backface;
        }
        if vp.wd < 0.0 {
            backface = !backface;
        }
        backface
    }

    /// Cull, clip and divide one triangle
    ///
    /// Surviving triangles are appended to `out` in rasterizer winding.
    pub fn process_triangle(
        &self,
        xf: &XfMemory,
        cull_mode: u32,
        v0: &OutputVertexData,
        v1: &OutputVertexData,
        v2: &OutputVertexData,
        stats: &mut GpuStatistics,
        out: &mut Vec<ScreenTriangle>,
    ) {
        stats.triangles_in += 1;

        let m0 = clip_mask(v0);
        let m1 = clip_mask(v1);
        let m2 = clip_mask(v2);

        // Every vertex outside the same plane
        if m0 & m1 & m2 != 0 {
            stats.triangles_rejected += 1;
            return;
        }

        let backface = Self::is_backface(xf, v0, v1, v2);
        let culled = if backface { cull_mode & 2 != 0 } else { cull_mode & 1 != 0 };
        if culled {
            stats.triangles_culled += 1;
            return;
        }

        // The rasterizer takes one winding: flip back faces
        let mut vertices = [OutputVertexData::default(); MAX_CLIP_VERTICES];
        vertices[0] = *v0;
        if backface {
            vertices[1] = *v2;
            vertices[2] = *v1;
        } else {
            vertices[1] = *v1;
            vertices[2] = *v2;
        }

        let mask = m0 | m1 | m2;
        let mut poly = [0usize; MAX_POLY + 1];
        let mut n = 3;
        poly[..3].copy_from_slice(&[0, 1, 2]);

        if mask != 0 && xf.clip_disable().disable_clipping() == 0 {
            match clip_polygon(&mut vertices, mask, &mut poly) {
                Some(count) => n = count,
                None => return,
            }
            stats.triangles_clipped += 1;
        }

        let mut used = [false; MAX_CLIP_VERTICES];
        for &index in &poly[..n] {
            if !used[index] {
                self.perspective_divide(xf, &mut vertices[index]);
                used[index] = true;
            }
        }

        for j in 2..n {
            out.push([vertices[poly[0]], vertices[poly[j - 1]], vertices[poly[j]]]);
        }
    }

    /// Clip and divide a line, then expand it into a two-triangle quad
    pub fn process_line(
        &self,
        xf: &XfMemory,
        width: LinePointWidth,
        v0: &OutputVertexData,
        v1: &OutputVertexData,
        out: &mut Vec<ScreenTriangle>,
    ) {
        let mask = clip_mask(v0) | clip_mask(v1);
        let mut t0 = 0.0f32;
        let mut t1 = 0.0f32;

        for (bit, plane) in &CLIP_PLANES {
            if mask & bit == 0 {
                continue;
            }
            let dp0 = plane_distance(v0, plane);
            let dp1 = plane_distance(v1, plane);
            if dp0 < 0.0 && dp1 < 0.0 {
                return;
            }
            if dp1 < 0.0 {
                t1 = t1.max(dp1 / (dp1 - dp0));
            } else if dp0 < 0.0 {
                t0 = t0.max(dp0 / (dp0 - dp1));
            }
        }

        let mut a = if t0 != 0.0 { OutputVertexData::lerp(t0, v0, v1) } else { *v0 };
        let mut b = if t1 != 0.0 { OutputVertexData::lerp(t1, v1, v0) } else { *v1 };
        self.perspective_divide(xf, &mut a);
        self.perspective_divide(xf, &mut b);

        let dx = b.screen_position[0] - a.screen_position[0];
        let dy = b.screen_position[1] - a.screen_position[1];
        let half = width.line_size() as f32 / 12.0;

        // Offset perpendicular to the dominant axis
        let (ox, oy) = if dx.abs() > dy.abs() {
            (0.0, if dx > 0.0 { -half } else { half })
        } else {
            (if dy > 0.0 { half } else { -half }, 0.0)
        };

        let shifted = |v: &OutputVertexData, sx: f32, sy: f32| {
            let mut out = *v;
            out.screen_position[0] += sx;
            out.screen_position[1] += sy;
            out
        };

        let a0 = shifted(&a, ox, oy);
        let b0 = shifted(&b, ox, oy);
        let b1 = shifted(&b, -ox, -oy);
        let a1 = shifted(&a, -ox, -oy);

        out.push([b1, b0, a0]);
        out.push([a0, a1, b1]);
    }
}

/// Sutherland-Hodgman against every plane in `mask`
///
/// `poly` holds the polygon's vertex indices on return. `None` means the
/// polygon was clipped away.
fn clip_polygon(
    vertices: &mut [OutputVertexData; MAX_CLIP_VERTICES],
    mask: u32,
    poly: &mut [usize; MAX_POLY + 1],
) -> Option<usize> {
    let mut num_vertices = 3;
    let mut n = 3;
    let mut inlist = *poly;
    let mut outlist = [0usize; MAX_POLY + 1];

    for (bit, plane) in &CLIP_PLANES {
        if mask & bit == 0 {
            continue;
        }

        let mut idx_prev = inlist[0];
        let mut dp_prev = plane_distance(&vertices[idx_prev], plane);
        let mut outcount = 0;

        inlist[n] = inlist[0];
        for j in 1..=n {
            let idx = inlist[j];
            let dp = plane_distance(&vertices[idx], plane);

            if dp_prev >= 0.0 {
                outlist[outcount] = idx_prev;
                outcount += 1;
            }

            if different_signs(dp, dp_prev) {
                if num_vertices >= MAX_CLIP_VERTICES || outcount >= MAX_POLY {
                    log::warn!("Clipper ran out of vertex slots");
                    return None;
                }
                vertices[num_vertices] = if dp < 0.0 {
                    let t = dp / (dp - dp_prev);
                    OutputVertexData::lerp(t, &vertices[idx], &vertices[idx_prev])
                } else {
                    let t = dp_prev / (dp_prev - dp);
                    OutputVertexData::lerp(t, &vertices[idx_prev], &vertices[idx])
                };
                outlist[outcount] = num_vertices;
                outcount += 1;
                num_vertices += 1;
            }

            idx_prev = idx;
            dp_prev = dp;
        }

        if outcount < 3 {
            return None;
        }

        std::mem::swap(&mut inlist, &mut outlist);
        n = outcount;
    }

    poly[..n].copy_from_slice(&inlist[..n]);
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport_xf() -> XfMemory {
        let mut xf = XfMemory::new();
        let f = |v: f32| v.to_bits();
        // 640x480 viewport with a flipped y axis
        xf.load(0x101A, &[f(320.0), f(-240.0), f(16_777_215.0), f(662.0), f(582.0), f(16_777_215.0)]);
        xf
    }

    fn clip_vertex(x: f32, y: f32, z: f32) -> OutputVertexData {
        OutputVertexData {
            projected_position: [x, y, z, 1.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_view_offset_from_viewport() {
        let xf = viewport_xf();
        let mut clipper = Clipper::new();
        clipper.set_view_offset(&xf);
        assert_eq!(clipper.view_offset(), [320.0, 240.0, 16_777_215.0]);
    }

    #[test]
    fn test_inside_triangle_passes_unchanged() {
        let xf = viewport_xf();
        let mut clipper = Clipper::new();
        clipper.set_view_offset(&xf);
        let mut stats = GpuStatistics::default();
        let mut out = Vec::new();

        let v0 = clip_vertex(-0.5, -0.5, -0.5);
        let v1 = clip_vertex(0.5, -0.5, -0.5);
        let v2 = clip_vertex(0.0, 0.5, -0.5);
        clipper.process_triangle(&xf, 0, &v0, &v1, &v2, &mut stats, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(stats.triangles_clipped, 0);
        let tri = &out[0];
        let originals = [v0, v1, v2];
        let backface = Clipper::is_backface(&xf, &v0, &v1, &v2);
        let expected = if backface { [0, 2, 1] } else { [0, 1, 2] };
        for (got, &want) in tri.iter().zip(expected.iter()) {
            assert_eq!(got.projected_position, originals[want].projected_position);
        }
    }

    #[test]
    fn test_trivial_reject() {
        let xf = viewport_xf();
        let clipper = Clipper::new();
        let mut stats = GpuStatistics::default();
        let mut out = Vec::new();

        // All three beyond w - x < 0
        let v0 = clip_vertex(2.0, 0.0, -0.5);
        let v1 = clip_vertex(3.0, 0.5, -0.5);
        let v2 = clip_vertex(2.5, -0.5, -0.5);
        clipper.process_triangle(&xf, 0, &v0, &v1, &v2, &mut stats, &mut out);

        assert!(out.is_empty());
        assert_eq!(stats.triangles_rejected, 1);
        assert_eq!(stats.triangles_clipped, 0);
    }

    #[test]
    fn test_partial_clip_emits_fan() {
        let xf = viewport_xf();
        let clipper = Clipper::new();
        let mut stats = GpuStatistics::default();
        let mut out = Vec::new();

        // One vertex past +x
        let v0 = clip_vertex(-0.5, -0.5, -0.5);
        let v1 = clip_vertex(2.0, -0.5, -0.5);
        let v2 = clip_vertex(-0.5, 0.5, -0.5);
        clipper.process_triangle(&xf, 0, &v0, &v1, &v2, &mut stats, &mut out);

        // Quad after clipping, emitted as two triangles
        assert_eq!(out.len(), 2);
        assert_eq!(stats.triangles_clipped, 1);
        for tri in &out {
            for v in tri {
                assert!(v.projected_position[0] <= 1.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_cull_modes() {
        let xf = viewport_xf();
        let clipper = Clipper::new();
        let v0 = clip_vertex(-0.5, -0.5, -0.5);
        let v1 = clip_vertex(0.5, -0.5, -0.5);
        let v2 = clip_vertex(0.0, 0.5, -0.5);
        let backface = Clipper::is_backface(&xf, &v0, &v1, &v2);

        let mut stats = GpuStatistics::default();
        let mut out = Vec::new();
        clipper.process_triangle(&xf, 3, &v0, &v1, &v2, &mut stats, &mut out);
        assert!(out.is_empty());

        // Culling only the other orientation keeps it
        let keep = if backface { 1 } else { 2 };
        clipper.process_triangle(&xf, keep, &v0, &v1, &v2, &mut stats, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(stats.triangles_culled, 1);
    }

    #[test]
    fn test_perspective_divide() {
        let xf = viewport_xf();
        let mut clipper = Clipper::new();
        clipper.set_view_offset(&xf);

        let mut v = OutputVertexData {
            projected_position: [1.0, 1.0, -1.0, 2.0],
            ..Default::default()
        };
        clipper.perspective_divide(&xf, &mut v);
        assert_eq!(v.screen_position[0], 0.5 * 320.0 + 320.0);
        assert_eq!(v.screen_position[1], 0.5 * -240.0 + 240.0);
        assert_eq!(v.screen_position[2], -0.5 * 16_777_215.0 + 16_777_215.0);
    }

    #[test]
    fn test_line_expands_to_quad() {
        let xf = viewport_xf();
        let mut clipper = Clipper::new();
        clipper.set_view_offset(&xf);
        let mut out = Vec::new();

        let mut width = LinePointWidth(0);
        width.set_line_size(24);
        let v0 = clip_vertex(-0.5, 0.0, -0.5);
        let v1 = clip_vertex(0.5, 0.0, -0.5);
        clipper.process_line(&xf, width, &v0, &v1, &mut out);

        assert_eq!(out.len(), 2);
        let ys: Vec<f32> = out.iter().flatten().map(|v| v.screen_position[1]).collect();
        assert!(ys.iter().all(|&y| y == 238.0 || y == 242.0));
    }
}
