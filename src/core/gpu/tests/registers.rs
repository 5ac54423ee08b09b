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

//! Register accessor tests
//! Field setters only touch their own bits

use crate::core::gpu::registers::bp::{
    AlphaCombiner, BlendMode, BpMemory, ColorCombiner, BPMEM_BP_MASK, BPMEM_GENMODE,
};
use crate::core::gpu::registers::cp::MatrixIndexA;
use crate::core::gpu::registers::{extract, insert};
use proptest::prelude::*;

/// Shift and width pairs that fit in a word
fn field() -> impl Strategy<Value = (u32, u32)> {
    (0u32..32).prop_flat_map(|shift| (Just(shift), 1u32..=(32 - shift).min(31)))
}

proptest! {
    #[test]
    fn prop_insert_then_extract(word in any::<u32>(), (shift, width) in field(), value in any::<u32>()) {
        let mask = ((1u32 << width) - 1) << shift;
        let out = insert(word, shift, width, value);

        prop_assert_eq!(extract(out, shift, width), value & ((1 << width) - 1));
        prop_assert_eq!(out & !mask, word & !mask);
    }

    #[test]
    fn prop_color_combiner_fields_are_isolated(raw in any::<u32>(), a in 0u32..16, dest in 0u32..4) {
        let mut cc = ColorCombiner(raw);
        let before = cc;
        cc.set_a(a);
        cc.set_dest(dest);

        prop_assert_eq!(cc.a(), a);
        prop_assert_eq!(cc.dest(), dest);
        prop_assert_eq!(cc.b(), before.b());
        prop_assert_eq!(cc.c(), before.c());
        prop_assert_eq!(cc.d(), before.d());
        prop_assert_eq!(cc.bias(), before.bias());
        prop_assert_eq!(cc.op(), before.op());
        prop_assert_eq!(cc.clamp(), before.clamp());
        prop_assert_eq!(cc.scale(), before.scale());
    }

    #[test]
    fn prop_alpha_combiner_swaps_are_isolated(raw in any::<u32>(), rswap in 0u32..4, tswap in 0u32..4) {
        let mut ac = AlphaCombiner(raw);
        let before = ac;
        ac.set_rswap(rswap);
        ac.set_tswap(tswap);

        prop_assert_eq!(ac.rswap(), rswap);
        prop_assert_eq!(ac.tswap(), tswap);
        prop_assert_eq!(ac.0 >> 4, before.0 >> 4);
    }

    #[test]
    fn prop_oversized_values_are_truncated(raw in any::<u32>(), value in any::<u32>()) {
        let mut mode = BlendMode(raw);
        let before = mode;
        mode.set_src_factor(value);

        prop_assert_eq!(mode.src_factor(), value & 7);
        prop_assert_eq!(mode.dst_factor(), before.dst_factor());
        prop_assert_eq!(mode.subtract(), before.subtract());
        prop_assert_eq!(mode.logic_mode(), before.logic_mode());
    }

    #[test]
    fn prop_masked_bp_write(old in 0u32..(1 << 24), mask in 0u32..(1 << 24), value in any::<u32>()) {
        let mut bp = BpMemory::new();
        bp.set_raw(BPMEM_GENMODE, old);
        bp.load(BPMEM_BP_MASK, mask);

        prop_assert_eq!(bp.load(BPMEM_GENMODE, value), old);
        prop_assert_eq!(bp.raw(BPMEM_GENMODE), (old & !mask) | (value & mask & 0xFF_FFFF));
        prop_assert_eq!(bp.raw(BPMEM_BP_MASK), 0xFF_FFFF);
    }
}

#[test]
fn test_matrix_index_fields() {
    let mut a = MatrixIndexA::default();
    a.set_pos_normal(63);
    a.set_tex0(30);
    a.set_tex3(15);

    assert_eq!(a.pos_normal(), 63);
    assert_eq!(a.tex0(), 30);
    assert_eq!(a.tex1(), 0);
    assert_eq!(a.tex3(), 15);
    assert_eq!(a.0, 63 | (30 << 6) | (15 << 24));
}
