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

//! Triangle rasterizer
//!
//! Half-space rasterization in 28.4 fixed point over 2x2 pixel blocks.
//! Each block corner is tested against the three edge functions: blocks
//! outside any edge are skipped, fully covered blocks are drawn without
//! per-pixel tests, and partially covered blocks fall back to stepping the
//! edge functions per pixel.
//!
//! Vertex attributes are fit to planes over screen space ("slopes") once per
//! triangle. Texture coordinates and Q are interpolated as `attr / w` and
//! corrected per pixel.

use super::registers::{BpMemory, XfMemory};
use super::tev::{PixelPipeline, Tev, TevInput};
use super::types::{OutputVertexData, EFB_HEIGHT, EFB_WIDTH};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Pixels per block side
pub const BLOCK_SIZE: i32 = 2;

/// Slightly less than half a pixel, to sample at pixel centers
const CENTER_ADJUST: f32 = 0.495;

/// Round half up, truncating toward zero first
#[inline]
fn iround(x: f32) -> i32 {
    let t = x as i32;
    if x - t as f32 >= 0.5 {
        t + 1
    } else {
        t
    }
}

/// Approximate log2 in s28.4, read straight from the float's bits
#[inline]
fn float_log2(x: f32) -> i32 {
    ((x.to_bits() >> 19) & 0xFFF) as i32 - (127 << 4)
}

/// Screen-space deltas of a triangle relative to its first vertex
struct SlopeContext {
    dx10: f32,
    dx20: f32,
    dy10: f32,
    dy20: f32,
}

impl SlopeContext {
    fn new(v0: &OutputVertexData, v1: &OutputVertexData, v2: &OutputVertexData) -> Self {
        Self {
            dx10: v1.screen_position[0] - v0.screen_position[0],
            dx20: v2.screen_position[0] - v0.screen_position[0],
            dy10: v1.screen_position[1] - v0.screen_position[1],
            dy20: v2.screen_position[1] - v0.screen_position[1],
        }
    }
}

/// A planar attribute `f0 + dfdx * dx + dfdy * dy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Slope {
    pub dfdx: f32,
    pub dfdy: f32,
    pub f0: f32,
}

impl Slope {
    fn new(f: [f32; 3], ctx: &SlopeContext) -> Self {
        let delta_10 = f[1] - f[0];
        let delta_20 = f[2] - f[0];
        let a = delta_20 * ctx.dy10 - delta_10 * ctx.dy20;
        let b = ctx.dx20 * delta_10 - ctx.dx10 * delta_20;
        let c = ctx.dx20 * ctx.dy10 - ctx.dx10 * ctx.dy20;
        Self {
            dfdx: a / c,
            dfdy: b / c,
            f0: f[0],
        }
    }

    #[inline]
    pub fn value(&self, dx: f32, dy: f32) -> f32 {
        self.f0 + self.dfdx * dx + self.dfdy * dy
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockPixel {
    uv: [[f32; 2]; 8],
}

/// Per-block texture coordinates and the LODs derived from them
#[derive(Debug, Clone, Copy, Default)]
struct RasterBlock {
    /// Indexed `[x][y]`
    pixels: [[BlockPixel; 2]; 2],
    indirect_lod: [i32; 4],
    indirect_linear: [bool; 4],
    texture_lod: [i32; 16],
    texture_linear: [bool; 16],
}

/// Slopes of the triangle being drawn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Rasterizer {
    z_slope: Slope,
    w_slope: Slope,
    color_slopes: [[Slope; 4]; 2],
    tex_slopes: [[Slope; 3]; 8],
    vertex0: [i32; 2],
    vertex_offset: [f32; 2],
}

/// Scissor rectangle in EFB pixels, right and bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scissor {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Scissor {
    fn from_registers(bp: &BpMemory) -> Self {
        let offset = bp.scissor_offset();
        let xoff = offset.x() as i32 * 2;
        let yoff = offset.y() as i32 * 2;
        let tl = bp.scissor_tl();
        let br = bp.scissor_br();
        Self {
            left: (tl.x() as i32 - xoff).max(0),
            top: (tl.y() as i32 - yoff).max(0),
            right: (br.x() as i32 - xoff + 1).min(EFB_WIDTH as i32),
            bottom: (br.y() as i32 - yoff + 1).min(EFB_HEIGHT as i32),
        }
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn delta(&self, x: i32, y: i32) -> (f32, f32) {
        (
            self.vertex_offset[0] + (x - self.vertex0[0]) as f32,
            self.vertex_offset[1] + (y - self.vertex0[1]) as f32,
        )
    }

    /// Depth of the current plane at pixel (x, y)
    pub fn depth_at(&self, x: i32, y: i32) -> f32 {
        let (dx, dy) = self.delta(x, y);
        self.z_slope.value(dx, dy)
    }

    /// Rasterize one screen-space triangle through TEV into the EFB
    ///
    /// Either winding is accepted; culling has already happened.
    pub fn draw_triangle(
        &mut self,
        tev: &mut Tev,
        pipe: &mut PixelPipeline,
        v0: &OutputVertexData,
        v1: &OutputVertexData,
        v2: &OutputVertexData,
    ) {
        pipe.stats.triangles_drawn += 1;

        // 28.4 fixed point, rounded and biased to match hardware coverage
        let fixed = |v: f32| (iround(16.0 * v) - 9) as i64;
        let edge_area = |a: &OutputVertexData, b: &OutputVertexData, c: &OutputVertexData| {
            let (x1, y1) = (fixed(a.screen_position[0]), fixed(a.screen_position[1]));
            let (x2, y2) = (fixed(b.screen_position[0]), fixed(b.screen_position[1]));
            let (x3, y3) = (fixed(c.screen_position[0]), fixed(c.screen_position[1]));
            (x1 - x2) * (y3 - y1) - (y1 - y2) * (x3 - x1)
        };

        let area = edge_area(v0, v1, v2);
        if area == 0 {
            return;
        }
        let (v1, v2) = if area < 0 { (v2, v1) } else { (v1, v2) };

        let x1 = fixed(v0.screen_position[0]);
        let x2 = fixed(v1.screen_position[0]);
        let x3 = fixed(v2.screen_position[0]);
        let y1 = fixed(v0.screen_position[1]);
        let y2 = fixed(v1.screen_position[1]);
        let y3 = fixed(v2.screen_position[1]);

        let dx12 = x1 - x2;
        let dx23 = x2 - x3;
        let dx31 = x3 - x1;
        let dy12 = y1 - y2;
        let dy23 = y2 - y3;
        let dy31 = y3 - y1;

        let fdx12 = dx12 << 4;
        let fdx23 = dx23 << 4;
        let fdx31 = dx31 << 4;
        let fdy12 = dy12 << 4;
        let fdy23 = dy23 << 4;
        let fdy31 = dy31 << 4;

        let ctx = SlopeContext::new(v0, v1, v2);
        self.vertex0 = [((x1 + 0xF) >> 4) as i32, ((y1 + 0xF) >> 4) as i32];
        self.vertex_offset = [
            self.vertex0[0] as f32 - v0.screen_position[0] + CENTER_ADJUST,
            self.vertex0[1] as f32 - v0.screen_position[1] + CENTER_ADJUST,
        ];

        // Depth is fit before the scissor rejects anything
        self.z_slope = Slope::new(
            [v0.screen_position[2], v1.screen_position[2], v2.screen_position[2]],
            &ctx,
        );

        let scissor = Scissor::from_registers(pipe.bp);
        let minx = (((x1.min(x2).min(x3) + 0xF) >> 4) as i32).max(scissor.left);
        let maxx = (((x1.max(x2).max(x3) + 0xF) >> 4) as i32).min(scissor.right);
        let miny = (((y1.min(y2).min(y3) + 0xF) >> 4) as i32).max(scissor.top);
        let maxy = (((y1.max(y2).max(y3) + 0xF) >> 4) as i32).min(scissor.bottom);
        if minx >= maxx || miny >= maxy {
            return;
        }

        let w = [
            1.0 / v0.projected_position[3],
            1.0 / v1.projected_position[3],
            1.0 / v2.projected_position[3],
        ];
        self.w_slope = Slope::new(w, &ctx);

        let num_colors = (pipe.bp.gen_mode().num_color_chans() as usize).min(2);
        for chan in 0..num_colors {
            for comp in 0..4 {
                self.color_slopes[chan][comp] = Slope::new(
                    [
                        v0.color[chan][comp] as f32,
                        v1.color[chan][comp] as f32,
                        v2.color[chan][comp] as f32,
                    ],
                    &ctx,
                );
            }
        }

        let num_texgens = (pipe.xf.num_texgens() as usize).min(8);
        for coord in 0..num_texgens {
            for comp in 0..3 {
                self.tex_slopes[coord][comp] = Slope::new(
                    [
                        v0.tex_coords[coord][comp] * w[0],
                        v1.tex_coords[coord][comp] * w[1],
                        v2.tex_coords[coord][comp] * w[2],
                    ],
                    &ctx,
                );
            }
        }

        // Half-edge constants with the top-left fill convention
        let mut c1 = dy12 * x1 - dx12 * y1;
        let mut c2 = dy23 * x2 - dx23 * y2;
        let mut c3 = dy31 * x3 - dx31 * y3;
        if dy12 < 0 || (dy12 == 0 && dx12 > 0) {
            c1 += 1;
        }
        if dy23 < 0 || (dy23 == 0 && dx23 > 0) {
            c2 += 1;
        }
        if dy31 < 0 || (dy31 == 0 && dx31 > 0) {
            c3 += 1;
        }

        let minx = minx & !(BLOCK_SIZE - 1);
        let miny = miny & !(BLOCK_SIZE - 1);

        let mut y = miny;
        while y < maxy {
            let mut x = minx;
            while x < maxx {
                let x0 = (x as i64) << 4;
                let xb = ((x + BLOCK_SIZE - 1) as i64) << 4;
                let y0 = (y as i64) << 4;
                let yb = ((y + BLOCK_SIZE - 1) as i64) << 4;

                let corners = |c: i64, dx: i64, dy: i64| -> u32 {
                    (c + dx * y0 - dy * x0 > 0) as u32
                        | ((c + dx * y0 - dy * xb > 0) as u32) << 1
                        | ((c + dx * yb - dy * x0 > 0) as u32) << 2
                        | ((c + dx * yb - dy * xb > 0) as u32) << 3
                };
                let a = corners(c1, dx12, dy12);
                let b = corners(c2, dx23, dy23);
                let c = corners(c3, dx31, dy31);

                if a == 0 || b == 0 || c == 0 {
                    x += BLOCK_SIZE;
                    continue;
                }

                let block = self.build_block(x, y, pipe.bp, pipe.xf);

                if a == 0xF && b == 0xF && c == 0xF {
                    for iy in 0..BLOCK_SIZE {
                        for ix in 0..BLOCK_SIZE {
                            if scissor_contains(&scissor, x + ix, y + iy) {
                                self.draw_pixel(tev, pipe, &block, x + ix, y + iy, ix, iy);
                            }
                        }
                    }
                } else {
                    let mut cy1 = c1 + dx12 * y0 - dy12 * x0;
                    let mut cy2 = c2 + dx23 * y0 - dy23 * x0;
                    let mut cy3 = c3 + dx31 * y0 - dy31 * x0;

                    for iy in 0..BLOCK_SIZE {
                        let mut cx1 = cy1;
                        let mut cx2 = cy2;
                        let mut cx3 = cy3;

                        for ix in 0..BLOCK_SIZE {
                            if cx1 > 0
                                && cx2 > 0
                                && cx3 > 0
                                && scissor_contains(&scissor, x + ix, y + iy)
                            {
                                self.draw_pixel(tev, pipe, &block, x + ix, y + iy, ix, iy);
                            }
                            cx1 -= fdy12;
                            cx2 -= fdy23;
                            cx3 -= fdy31;
                        }

                        cy1 += fdx12;
                        cy2 += fdx23;
                        cy3 += fdx31;
                    }
                }

                x += BLOCK_SIZE;
            }
            y += BLOCK_SIZE;
        }
    }

    /// Perspective-correct texture coordinates for a block, scaled to texels
    fn build_block(&self, block_x: i32, block_y: i32, bp: &BpMemory, xf: &XfMemory) -> RasterBlock {
        let mut block = RasterBlock::default();
        let num_texgens = (xf.num_texgens() as usize).min(8);

        for yi in 0..BLOCK_SIZE {
            for xi in 0..BLOCK_SIZE {
                let (dx, dy) = self.delta(block_x + xi, block_y + yi);
                let inv_w = 1.0 / self.w_slope.value(dx, dy);
                let pixel = &mut block.pixels[xi as usize][yi as usize];

                for coord in 0..num_texgens {
                    let slopes = &self.tex_slopes[coord];
                    let q = slopes[2].value(dx, dy) * inv_w;
                    let projection = if q != 0.0 { inv_w / q } else { inv_w };
                    let scale_s = (bp.texcoord_s(coord).scale_minus_1() + 1) as f32;
                    let scale_t = (bp.texcoord_t(coord).scale_minus_1() + 1) as f32;
                    pixel.uv[coord] = [
                        slopes[0].value(dx, dy) * projection * scale_s,
                        slopes[1].value(dx, dy) * projection * scale_t,
                    ];
                }
            }
        }

        let gen_mode = bp.gen_mode();
        let refs = bp.indirect_refs();
        for stage in 0..(gen_mode.num_ind_stages() as usize).min(4) {
            let (lod, linear) =
                calculate_lod(bp, &block, refs.tex_map(stage) as usize, refs.tex_coord(stage) as usize);
            block.indirect_lod[stage] = lod;
            block.indirect_linear[stage] = linear;
        }

        for stage in 0..=(gen_mode.num_tev_stages() as usize) {
            let odd = stage & 1 != 0;
            let order = bp.tev_orders(stage >> 1);
            if order.enable(odd) {
                let (lod, linear) = calculate_lod(
                    bp,
                    &block,
                    order.tex_map(odd) as usize,
                    order.tex_coord(odd) as usize,
                );
                block.texture_lod[stage] = lod;
                block.texture_linear[stage] = linear;
            }
        }

        block
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_pixel(
        &self,
        tev: &mut Tev,
        pipe: &mut PixelPipeline,
        block: &RasterBlock,
        x: i32,
        y: i32,
        xi: i32,
        yi: i32,
    ) {
        pipe.stats.rasterized_pixels += 1;

        let (dx, dy) = self.delta(x, y);
        let z = self.z_slope.value(dx, dy).clamp(0.0, 16_777_215.0) as i32;

        let bp = pipe.bp;
        if pipe.config.early_z
            && bp.early_ztest()
            && bp.zmode().test_enable() != 0
            && !pipe.efb.z_compare(bp, x as u32, y as u32, z as u32)
        {
            return;
        }

        let mut input = TevInput {
            position: [x, y, z],
            ..Default::default()
        };

        let num_colors = (bp.gen_mode().num_color_chans() as usize).min(2);
        for chan in 0..num_colors {
            for comp in 0..4 {
                input.color[chan][comp] =
                    self.color_slopes[chan][comp].value(dx, dy).clamp(0.0, 255.0) as u8;
            }
        }

        // TEV texture coordinates are s17.7
        let pixel = &block.pixels[xi as usize][yi as usize];
        for coord in 0..(pipe.xf.num_texgens() as usize).min(8) {
            input.uv[coord] = [
                (pixel.uv[coord][0] * 128.0) as i32,
                (pixel.uv[coord][1] * 128.0) as i32,
            ];
        }

        input.indirect_lod = block.indirect_lod;
        input.indirect_linear = block.indirect_linear;
        input.texture_lod = block.texture_lod;
        input.texture_linear = block.texture_linear;

        tev.draw(&input, pipe);
    }
}

#[inline]
fn scissor_contains(scissor: &Scissor, x: i32, y: i32) -> bool {
    x >= scissor.left && x < scissor.right && y >= scissor.top && y < scissor.bottom
}

/// LOD in s28.4 and whether the filter is linear, for one texture map
fn calculate_lod(bp: &BpMemory, block: &RasterBlock, texmap: usize, texcoord: usize) -> (i32, bool) {
    let tm0 = bp.tex_mode0(texmap);
    let tm1 = bp.tex_mode1(texmap);
    let texcoord = texcoord & 7;

    let uv0 = block.pixels[0][0].uv[texcoord];
    let (s_delta, t_delta) = if tm0.diag_lod() != 0 {
        let uv1 = block.pixels[1][1].uv[texcoord];
        ((uv0[0] - uv1[0]).abs(), (uv0[1] - uv1[1]).abs())
    } else {
        let uv1 = block.pixels[1][0].uv[texcoord];
        let uv2 = block.pixels[0][1].uv[texcoord];
        (
            (uv0[0] - uv1[0]).abs().max((uv0[0] - uv2[0]).abs()),
            (uv0[1] - uv1[1]).abs().max((uv0[1] - uv2[1]).abs()),
        )
    };

    // Bias is s2.5
    let mut lod = float_log2(s_delta.max(t_delta)) + (tm0.lod_bias_signed() >> 1);

    let linear = (lod > 0 && tm0.min_filter() != 0) || (lod <= 0 && tm0.mag_filter() != 0);

    let max_lod = tm1.max_lod() as i32;
    let min_lod = tm1.min_lod() as i32;
    if lod > max_lod {
        lod = max_lod;
    } else if lod < min_lod {
        lod = min_lod;
    }

    (lod, linear)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iround() {
        assert_eq!(iround(1.5), 2);
        assert_eq!(iround(1.49), 1);
        assert_eq!(iround(-1.5), -1);
    }

    #[test]
    fn test_float_log2() {
        assert_eq!(float_log2(1.0), 0);
        assert_eq!(float_log2(2.0), 16);
        assert_eq!(float_log2(0.5), -16);
        // 1.5 has its top mantissa bit set: 0.5 in 4-bit fraction
        assert_eq!(float_log2(1.5), 8);
    }

    #[test]
    fn test_slope_fits_plane() {
        let mut v0 = OutputVertexData::default();
        let mut v1 = OutputVertexData::default();
        let mut v2 = OutputVertexData::default();
        v0.screen_position = [0.0, 0.0, 0.0];
        v1.screen_position = [10.0, 0.0, 0.0];
        v2.screen_position = [0.0, 10.0, 0.0];

        let ctx = SlopeContext::new(&v0, &v1, &v2);
        // f = 3 + 2x + 5y
        let slope = Slope::new([3.0, 23.0, 53.0], &ctx);
        assert!((slope.dfdx - 2.0).abs() < 1e-6);
        assert!((slope.dfdy - 5.0).abs() < 1e-6);
        assert!((slope.value(1.0, 1.0) - 10.0).abs() < 1e-5);
    }
}
