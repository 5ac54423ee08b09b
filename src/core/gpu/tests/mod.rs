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

//! GPU module tests
//!
//! Tests are organized into the following modules:
//! - `decoder`: Opcode decoding, partial commands and display lists
//! - `vertex_loading`: Vertex formats and attribute decoding
//! - `registers`: Register field accessors
//! - `pixel_ops`: Compare modes and blending
//! - `pipeline`: Whole draws from command bytes to EFB pixels

mod registers;
mod vertex_loading;

use super::{Gpu, GpuBus};
use crate::core::error::Result;
use crate::core::memory::MainMemory;
use crate::core::timing::EventLog;

/// Feed `data` to `gpu` against `memory`, discarding scheduled events
fn run(gpu: &mut Gpu, memory: &mut MainMemory, data: &[u8]) -> Result<usize> {
    let mut events = EventLog::new();
    let mut bus = GpuBus {
        memory,
        scheduler: &mut events,
    };
    gpu.run_buffer(data, &mut bus)
}

fn bp(reg: u8, value: u32) -> [u8; 5] {
    let word = ((reg as u32) << 24) | (value & 0xFF_FFFF);
    let b = word.to_be_bytes();
    [0x61, b[0], b[1], b[2], b[3]]
}

fn cp(sub: u8, value: u32) -> [u8; 6] {
    let b = value.to_be_bytes();
    [0x08, sub, b[0], b[1], b[2], b[3]]
}

fn xf(address: u16, words: &[u32]) -> Vec<u8> {
    let header = (((words.len() as u32) - 1) << 16) | address as u32;
    let mut out = vec![0x10];
    out.extend_from_slice(&header.to_be_bytes());
    for w in words {
        out.extend_from_slice(&w.to_be_bytes());
    }
    out
}

fn xf_floats(address: u16, values: &[f32]) -> Vec<u8> {
    let words: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
    xf(address, &words)
}
