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

//! GPU register banks
//!
//! The three register address spaces driving the pipeline:
//! - `bp`: pixel-side configuration (TEV, texture units, blending, EFB copies)
//! - `cp`: command processor vertex descriptor, attribute tables and arrays
//! - `xf`: transform unit matrices, lights, viewport and projection
//!
//! Every hardware register is a plain integer wrapped in a newtype. Fields are
//! accessed through generated getter/setter pairs with explicit shift and
//! width, so no layout depends on compiler bitfield rules.

/// Extract `width` bits of `value` starting at `shift`
#[inline(always)]
pub const fn extract(value: u32, shift: u32, width: u32) -> u32 {
    (value >> shift) & ((1u32 << width) - 1)
}

/// Replace `width` bits of `value` starting at `shift` with `field`
#[inline(always)]
pub const fn insert(value: u32, shift: u32, width: u32, field: u32) -> u32 {
    let mask = ((1u32 << width) - 1) << shift;
    (value & !mask) | ((field << shift) & mask)
}

/// Sign-extend the low `width` bits of `value`
#[inline(always)]
pub const fn sign_extend(value: u32, width: u32) -> i32 {
    ((value << (32 - width)) as i32) >> (32 - width)
}

/// Declare a register newtype with explicit field accessors
///
/// ```ignore
/// register! {
///     /// Z mode
///     ZMode {
///         test_enable / set_test_enable: 0, 1;
///         func / set_func: 1, 3;
///     }
/// }
/// ```
macro_rules! register {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$fmeta:meta])*
                $get:ident / $set:ident : $shift:expr, $width:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub u32);

        #[allow(dead_code)]
        impl $name {
            $(
                $(#[$fmeta])*
                #[inline(always)]
                pub const fn $get(self) -> u32 {
                    $crate::core::gpu::registers::extract(self.0, $shift, $width)
                }

                #[inline(always)]
                pub fn $set(&mut self, value: u32) {
                    self.0 = $crate::core::gpu::registers::insert(self.0, $shift, $width, value);
                }
            )*
        }
    };
}

pub mod bp;
pub mod cp;
pub mod xf;

pub use bp::BpMemory;
pub use cp::CpMemory;
pub use xf::XfMemory;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_insert() {
        assert_eq!(extract(0x00AB_CD00, 8, 8), 0xCD);
        assert_eq!(insert(0xFFFF_FFFF, 4, 4, 0x0), 0xFFFF_FF0F);
        assert_eq!(insert(0, 4, 4, 0x1F), 0xF0); // excess bits dropped
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x7FF, 11), -1);
        assert_eq!(sign_extend(0x3FF, 11), 1023);
        assert_eq!(sign_extend(0x400, 11), -1024);
        assert_eq!(sign_extend(0x80, 8), -128);
    }
}
