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

//! Custom assertions for pipeline testing

use swgx::core::gpu::Gpu;
use swgx::core::memory::MemoryAccessor;

/// Assert the EFB holds `expected` RGBA at (x, y)
#[allow(dead_code)]
pub fn assert_efb_color(gpu: &Gpu, x: u32, y: u32, expected: [u8; 4]) {
    let actual = gpu.efb().get_color(gpu.bp(), x, y);
    assert_eq!(
        actual, expected,
        "EFB at ({}, {}) mismatch: expected {:?}, got {:?}",
        x, y, expected, actual
    );
}

/// Assert memory holds `expected` starting at `address`
#[allow(dead_code)]
pub fn assert_memory_bytes(memory: &dyn MemoryAccessor, address: u32, expected: &[u8]) {
    let actual = memory
        .get_slice(address, expected.len())
        .expect("Failed to read memory");
    assert_eq!(
        actual, expected,
        "Memory at 0x{:08X} mismatch: expected {:02X?}, got {:02X?}",
        address, expected, actual
    );
}
