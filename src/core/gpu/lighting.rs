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

//! Fixed-function lighting
//!
//! Two color channels, each with an independent RGB and alpha lighting
//! equation over up to eight lights:
//!
//! ```text
//! light  = ambient + sum(light.color * attenuation * diffuse)
//! result = material * clamp(light, 0, 255) / 255
//! ```
//!
//! The final multiply is done in 8-bit fixed point as
//! `(mat * (l + (l >> 7))) >> 8`.

use super::registers::xf::{AttenuationFunc, DiffuseFunc, Light, LitChannel, XfMemory};
use super::types::{dot3, normalize3, scale3, sub3, InputVertexData, OutputVertexData};

/// Division where 0/0 is 0 and n/0 with n > 0 is 1
#[inline]
fn safe_divide(n: f32, d: f32) -> f32 {
    if d == 0.0 {
        if n > 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        n / d
    }
}

/// Attenuation factor; rewrites `ldir` into the direction used for diffuse
fn light_attenuation(light: &Light, ldir: &mut [f32; 3], normal: [f32; 3], chan: LitChannel) -> f32 {
    match AttenuationFunc::from_bits(chan.atten_func()) {
        AttenuationFunc::None | AttenuationFunc::Dir => {
            *ldir = normalize3(*ldir);
            if *ldir == [0.0; 3] {
                *ldir = normal;
            }
            1.0
        }
        AttenuationFunc::Spec => {
            *ldir = normalize3(*ldir);
            let attn = if dot3(*ldir, normal) >= 0.0 {
                dot3(light.dir, normal).max(0.0)
            } else {
                0.0
            };
            let att_len = [1.0, attn, attn * attn];
            let distatt = if DiffuseFunc::from_bits(chan.diffuse_func()) != DiffuseFunc::None {
                normalize3(light.distatt)
            } else {
                light.distatt
            };
            safe_divide(dot3(att_len, light.cosatt).max(0.0), dot3(att_len, distatt))
        }
        AttenuationFunc::Spot => {
            let dist2 = dot3(*ldir, *ldir);
            let dist = dist2.sqrt();
            if dist > 0.0 {
                *ldir = scale3(*ldir, 1.0 / dist);
            }
            let attn = dot3(*ldir, light.dir).max(0.0);
            let cos_att = light.cosatt[0] + light.cosatt[1] * attn + light.cosatt[2] * attn * attn;
            let dist_att = light.distatt[0] + light.distatt[1] * dist + light.distatt[2] * dist2;
            safe_divide(cos_att.max(0.0), dist_att)
        }
    }
}

/// Diffuse-weighted attenuation of one light
fn light_scale(
    light: &Light,
    position: [f32; 3],
    normal: [f32; 3],
    chan: LitChannel,
) -> f32 {
    let mut ldir = sub3(light.pos, position);
    let attn = light_attenuation(light, &mut ldir, normal, chan);
    let dif = dot3(ldir, normal);

    match DiffuseFunc::from_bits(chan.diffuse_func()) {
        DiffuseFunc::None => attn,
        DiffuseFunc::Sign => attn * dif,
        DiffuseFunc::Clamp => attn * dif.max(0.0),
    }
}

#[inline]
fn modulate(material: u8, light: f32) -> u8 {
    let l = (light as i32).clamp(0, 255);
    ((material as i32 * (l + (l >> 7))) >> 8) as u8
}

/// Compute both output color channels
///
/// Reads `dst.mv_position` and `dst.normal[0]`, so position and normal
/// transforms must run first.
pub fn transform_color(xf: &XfMemory, src: &InputVertexData, dst: &mut OutputVertexData) {
    for chan in 0..2 {
        let mut out = [0u8; 4];

        // RGB
        let color_chan = xf.color_channel(chan);
        let mat = if color_chan.mat_source() != 0 {
            src.color[chan]
        } else {
            xf.mat_color(chan)
        };

        if color_chan.enable_lighting() != 0 {
            let amb = if color_chan.amb_source() != 0 {
                src.color[chan]
            } else {
                xf.amb_color(chan)
            };
            let mut light_col = [amb[0] as f32, amb[1] as f32, amb[2] as f32];

            let mask = color_chan.full_light_mask();
            for i in 0..8 {
                if mask & (1 << i) != 0 {
                    let light = xf.light(i);
                    let scale = light_scale(&light, dst.mv_position, dst.normal[0], color_chan);
                    for c in 0..3 {
                        light_col[c] += light.color[c] as f32 * scale;
                    }
                }
            }

            for c in 0..3 {
                out[c] = modulate(mat[c], light_col[c]);
            }
        } else {
            out[..3].copy_from_slice(&mat[..3]);
        }

        // Alpha
        let alpha_chan = xf.alpha_channel(chan);
        let mat_alpha = if alpha_chan.mat_source() != 0 {
            src.color[chan][3]
        } else {
            xf.mat_color(chan)[3]
        };

        out[3] = if alpha_chan.enable_lighting() != 0 {
            let mut light_alpha = if alpha_chan.amb_source() != 0 {
                src.color[chan][3]
            } else {
                xf.amb_color(chan)[3]
            } as f32;

            let mask = alpha_chan.full_light_mask();
            for i in 0..8 {
                if mask & (1 << i) != 0 {
                    let light = xf.light(i);
                    light_alpha +=
                        light.color[3] as f32 * light_scale(&light, dst.mv_position, dst.normal[0], alpha_chan);
                }
            }
            modulate(mat_alpha, light_alpha)
        } else {
            mat_alpha
        };

        dst.color[chan] = out;
    }
}
