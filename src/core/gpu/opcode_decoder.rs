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

//! FIFO opcode decoder
//!
//! Converts the command byte stream into register loads and draws.
//!
//! # Command Format
//!
//! | Opcode | Payload | Meaning |
//! |--------|---------|---------|
//! | 0x00 | - | NOP |
//! | 0x08 | u8 address, u32 value | CP register load |
//! | 0x10 | u32 header, n x u32 | XF load, `n = ((header >> 16) & 15) + 1` |
//! | 0x20/0x28/0x30/0x38 | u32 | Indexed XF load through arrays 12-15 |
//! | 0x40 | u32 address, u32 size | Call display list |
//! | 0x48 | - | Invalidate vertex cache |
//! | 0x61 | u32 (8-bit reg, 24-bit value) | BP register load |
//! | 0x80-0xBF | u16 count, vertices | Draw, bits 0-2 VAT, bits 3-5 primitive |
//!
//! A command only runs once all of its fixed-size part is buffered. Vertex
//! streams and XF data runs are consumed in as many whole units as are
//! available and resumed on the next call.

use super::types::{DataReader, Primitive};
use super::{Gpu, GpuBus};
use crate::core::error::{DecodeFault, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const LOAD_CP_REG: u8 = 0x08;
    pub const LOAD_XF_REG: u8 = 0x10;
    pub const LOAD_INDX_A: u8 = 0x20;
    pub const LOAD_INDX_B: u8 = 0x28;
    pub const LOAD_INDX_C: u8 = 0x30;
    pub const LOAD_INDX_D: u8 = 0x38;
    pub const CALL_DL: u8 = 0x40;
    pub const UNKNOWN_RESET: u8 = 0x44;
    pub const INVALIDATE_VERTEX_CACHE: u8 = 0x48;
    pub const LOAD_BP_REG: u8 = 0x61;
    pub const PRIMITIVE_MASK: u8 = 0xC0;
    pub const PRIMITIVE_START: u8 = 0x80;
}

/// Multi-byte operation in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum MultiByteOp {
    /// Vertices left in a draw
    Primitive {
        vat: u8,
        primitive: Primitive,
        remaining: u16,
    },
    /// Words left in an XF load
    XfData { address: u16, remaining: u8 },
}

/// Decoder state carried across buffer boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum DecoderState {
    ReadOpcode,
    ContinuingMultiByteOp(MultiByteOp),
}

impl Default for DecoderState {
    fn default() -> Self {
        DecoderState::ReadOpcode
    }
}

/// Bytes the fixed part of a command needs, opcode included
///
/// # Example
///
/// ```
/// use swgx::core::gpu::opcode_decoder::min_command_size;
///
/// assert_eq!(min_command_size(0x61), 5);
/// assert_eq!(min_command_size(0x90), 3);
/// assert_eq!(min_command_size(0x00), 1);
/// ```
pub fn min_command_size(opcode: u8) -> usize {
    match opcode {
        opcodes::LOAD_CP_REG => 6,
        opcodes::LOAD_XF_REG => 5,
        opcodes::LOAD_INDX_A
        | opcodes::LOAD_INDX_B
        | opcodes::LOAD_INDX_C
        | opcodes::LOAD_INDX_D => 5,
        opcodes::CALL_DL => 9,
        opcodes::LOAD_BP_REG => 5,
        op if op & opcodes::PRIMITIVE_MASK == opcodes::PRIMITIVE_START => 3,
        _ => 1,
    }
}

#[inline]
fn underflow(reader: &DataReader<'_>, needed: usize) -> DecodeFault {
    DecodeFault::BufferUnderflow {
        needed,
        available: reader.remaining(),
    }
}

#[inline]
fn read_u8(reader: &mut DataReader<'_>) -> Result<u8> {
    reader.read_u8().ok_or_else(|| underflow(reader, 1).into())
}

#[inline]
fn read_u16(reader: &mut DataReader<'_>) -> Result<u16> {
    reader.read_u16().ok_or_else(|| underflow(reader, 2).into())
}

#[inline]
fn read_u32(reader: &mut DataReader<'_>) -> Result<u32> {
    reader.read_u32().ok_or_else(|| underflow(reader, 4).into())
}

impl Gpu {
    /// Whether `data` holds enough bytes for the next unit of work
    pub(crate) fn command_runnable(&self, data: &[u8]) -> bool {
        match self.decoder {
            DecoderState::ReadOpcode => match data.first() {
                Some(&opcode) => data.len() >= min_command_size(opcode),
                None => false,
            },
            DecoderState::ContinuingMultiByteOp(MultiByteOp::Primitive { .. }) => {
                data.len() >= self.vertex_loader.vertex_size() as usize
            }
            DecoderState::ContinuingMultiByteOp(MultiByteOp::XfData { .. }) => data.len() >= 4,
        }
    }

    /// Run every complete command in `data`
    ///
    /// Returns the number of bytes consumed. Trailing bytes of an incomplete
    /// command are left for the caller to resubmit.
    pub(crate) fn decode_stream(&mut self, data: &[u8], bus: &mut GpuBus<'_>) -> Result<usize> {
        let mut reader = DataReader::new(data);
        while self.command_runnable(&data[reader.position()..]) {
            self.run_command(&mut reader, bus)?;
        }
        Ok(reader.position())
    }

    /// Run one command, or as much of a multi-byte operation as is buffered
    pub(crate) fn run_command(&mut self, reader: &mut DataReader<'_>, bus: &mut GpuBus<'_>) -> Result<()> {
        match self.decoder {
            DecoderState::ReadOpcode => self.decode_opcode(reader, bus),
            DecoderState::ContinuingMultiByteOp(MultiByteOp::Primitive {
                vat,
                primitive,
                remaining,
            }) => self.decode_primitive_stream(reader, bus, vat, primitive, remaining),
            DecoderState::ContinuingMultiByteOp(MultiByteOp::XfData { address, remaining }) => {
                self.decode_xf_data(reader, address, remaining)
            }
        }
    }

    fn decode_opcode(&mut self, reader: &mut DataReader<'_>, bus: &mut GpuBus<'_>) -> Result<()> {
        let offset = reader.position();
        let cmd = read_u8(reader)?;

        match cmd {
            opcodes::NOP => {}

            opcodes::LOAD_CP_REG => {
                let sub_cmd = read_u8(reader)?;
                let value = read_u32(reader)?;
                log::trace!("CP load 0x{:02X} = 0x{:08X}", sub_cmd, value);
                self.cp.load(sub_cmd, value);
            }

            opcodes::LOAD_XF_REG => {
                let header = read_u32(reader)?;
                let address = (header & 0xFFFF) as u16;
                let size = ((header >> 16) & 0xF) as u8 + 1;
                log::trace!("XF load 0x{:04X}, {} words", address, size);
                self.decoder = DecoderState::ContinuingMultiByteOp(MultiByteOp::XfData {
                    address,
                    remaining: size,
                });
            }

            opcodes::LOAD_INDX_A
            | opcodes::LOAD_INDX_B
            | opcodes::LOAD_INDX_C
            | opcodes::LOAD_INDX_D => {
                let value = read_u32(reader)?;
                let array = 12 + ((cmd - opcodes::LOAD_INDX_A) >> 3) as usize;
                self.load_indexed_xf(value, array, bus);
            }

            opcodes::CALL_DL => {
                let address = read_u32(reader)?;
                let size = read_u32(reader)?;
                self.execute_display_list(address, size, bus)?;
            }

            opcodes::UNKNOWN_RESET => {
                log::debug!("Opcode 0x44 ignored");
            }

            opcodes::INVALIDATE_VERTEX_CACHE => {
                log::trace!("Invalidate vertex cache");
            }

            opcodes::LOAD_BP_REG => {
                let value = read_u32(reader)?;
                let reg = (value >> 24) as u8;
                log::trace!("BP load 0x{:02X} = 0x{:06X}", reg, value & 0xFF_FFFF);
                self.write_bp(reg, value & 0xFF_FFFF, bus);
            }

            _ if cmd & opcodes::PRIMITIVE_MASK == opcodes::PRIMITIVE_START => {
                let count = read_u16(reader)?;
                let vat = cmd & 7;
                let primitive = Primitive::from_bits(cmd >> 3);

                self.vertex_loader.set_format(&self.cp, &self.xf, vat, primitive);
                self.setup.init(primitive);
                self.stats.primitives += 1;

                log::trace!("Draw {:?}, VAT {}, {} vertices", primitive, vat, count);

                if count > 0 {
                    self.decoder = DecoderState::ContinuingMultiByteOp(MultiByteOp::Primitive {
                        vat,
                        primitive,
                        remaining: count,
                    });
                }
            }

            _ => {
                log::error!("Unknown opcode 0x{:02X} at stream offset {}", cmd, offset);
                return Err(DecodeFault::UnknownOpcode {
                    opcode: cmd,
                    offset,
                }
                .into());
            }
        }

        Ok(())
    }

    fn decode_xf_data(&mut self, reader: &mut DataReader<'_>, address: u16, remaining: u8) -> Result<()> {
        let count = (reader.remaining() / 4).min(remaining as usize);
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(read_u32(reader)?);
        }
        self.load_xf(address as u32, &words);

        let remaining = remaining - count as u8;
        self.decoder = if remaining == 0 {
            DecoderState::ReadOpcode
        } else {
            DecoderState::ContinuingMultiByteOp(MultiByteOp::XfData {
                address: address.wrapping_add(count as u16),
                remaining,
            })
        };
        Ok(())
    }

    fn decode_primitive_stream(
        &mut self,
        reader: &mut DataReader<'_>,
        bus: &mut GpuBus<'_>,
        vat: u8,
        primitive: Primitive,
        mut remaining: u16,
    ) -> Result<()> {
        let size = self.vertex_loader.vertex_size() as usize;
        while remaining > 0 && reader.remaining() >= size {
            self.load_vertex(reader, &*bus.memory)?;
            remaining -= 1;
        }

        self.decoder = if remaining == 0 {
            DecoderState::ReadOpcode
        } else {
            DecoderState::ContinuingMultiByteOp(MultiByteOp::Primitive {
                vat,
                primitive,
                remaining,
            })
        };
        Ok(())
    }

    /// Load XF words fetched through one of the indexed arrays
    fn load_indexed_xf(&mut self, value: u32, array: usize, bus: &mut GpuBus<'_>) {
        let index = value >> 16;
        let address = value & 0xFFF;
        let size = ((value >> 12) & 0xF) as usize + 1;
        let source = self.cp.array_address(array, index);

        let Some(bytes) = bus.memory.get_slice(source, size * 4) else {
            log::error!(
                "Indexed XF load from unmapped 0x{:08X} (array {}, index {})",
                source,
                array,
                index
            );
            return;
        };

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        log::trace!(
            "Indexed XF load 0x{:03X} <- 0x{:08X}, {} words",
            address,
            source,
            size
        );
        self.load_xf(address, &words);
    }

    /// Decode a display list in main memory through the same decoder state
    fn execute_display_list(&mut self, address: u32, size: u32, bus: &mut GpuBus<'_>) -> Result<()> {
        if self.in_display_list {
            log::warn!("Nested display list call at 0x{:08X} ignored", address);
            return Ok(());
        }

        let Some(list) = bus.memory.get_slice(address, size as usize).map(<[u8]>::to_vec) else {
            log::error!(
                "Display list at 0x{:08X} ({} bytes) is unmapped",
                address,
                size
            );
            return Ok(());
        };

        log::trace!("Call display list 0x{:08X}, {} bytes", address, size);
        self.stats.display_lists += 1;

        let saved = self.decoder;
        self.decoder = DecoderState::ReadOpcode;
        self.in_display_list = true;
        let result = self.decode_stream(&list, bus);
        self.in_display_list = false;

        let consumed = result? as u32;
        if consumed != size || self.decoder != DecoderState::ReadOpcode {
            // The list ends inside a command
            log::error!(
                "Display list 0x{:08X} underrun: {} of {} bytes, left in {:?}",
                address,
                consumed,
                size,
                self.decoder
            );
            self.decoder = saved;
            return Err(DecodeFault::DisplayListUnderrun {
                address,
                size,
                consumed,
            }
            .into());
        }
        self.decoder = saved;
        Ok(())
    }
}
