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

/// Pipeline error types
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the graphics pipeline
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Save state error: {0}")]
    SaveState(String),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Decode fault: {0}")]
    Decode(#[from] DecodeFault),
}

/// Command stream faults
///
/// These invalidate the rest of the command buffer being decoded: once the
/// byte cursor is out of step with the stream there is no resync point.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeFault {
    #[error("Unknown opcode 0x{opcode:02X} at stream offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("Display list at 0x{address:08X} underrun: {consumed} bytes consumed of {size}")]
    DisplayListUnderrun {
        address: u32,
        size: u32,
        consumed: u32,
    },

    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow { needed: usize, available: usize },
}

/// GPU resource errors
///
/// Logged and skipped by the pipeline; they never abort a command buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("Invalid memory access at 0x{address:08X} ({size} bytes)")]
    InvalidMemoryAccess { address: u32, size: usize },

    #[error("Invalid texture at 0x{address:08X}")]
    InvalidTexture { address: u32 },

    #[error("Invalid vertex format: {0}")]
    InvalidVertexFormat(String),

    #[error("GPU thread panicked")]
    ThreadPanicked,
}
