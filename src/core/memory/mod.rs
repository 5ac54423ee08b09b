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

//! Emulated main memory access
//!
//! The graphics pipeline never owns main memory. Everything it reads from or
//! writes to RAM (display lists, vertex arrays, indexed matrix loads, texture
//! images, palettes, EFB copy destinations) goes through [`MemoryAccessor`].
//!
//! # Address Translation
//!
//! The PowerPC side addresses RAM through cached (0x80000000) and uncached
//! (0xC0000000) mirrors. GPU-side addresses are physical, but command streams
//! routinely carry mirrored addresses, so [`MainMemory`] masks with
//! `0x3FFFFFFF` before indexing.
//!
//! # Example
//!
//! ```
//! use swgx::core::memory::{MainMemory, MemoryAccessor};
//!
//! let mut memory = MainMemory::new();
//!
//! // Write through the cached mirror
//! memory.write_u32(0x80000010, 0x12345678).unwrap();
//!
//! // Data is stored big-endian and visible at the physical address
//! assert_eq!(memory.read_u32(0x00000010), Some(0x12345678));
//! assert_eq!(memory.read_u8(0xC0000010), Some(0x12));
//! ```

use crate::core::error::{EmulatorError, GpuError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Resolves emulated addresses to host byte slices
///
/// Slices returned by `get_slice` must stay valid for the duration of a single
/// decode or draw call. All multi-byte helpers read big-endian, matching the
/// console's byte order.
pub trait MemoryAccessor {
    /// Borrow `len` bytes starting at `address`, or `None` if unmapped
    fn get_slice(&self, address: u32, len: usize) -> Option<&[u8]>;

    /// Mutably borrow `len` bytes starting at `address`, or `None` if unmapped
    fn get_slice_mut(&mut self, address: u32, len: usize) -> Option<&mut [u8]>;

    #[inline]
    fn read_u8(&self, address: u32) -> Option<u8> {
        self.get_slice(address, 1).map(|s| s[0])
    }

    #[inline]
    fn read_u16(&self, address: u32) -> Option<u16> {
        self.get_slice(address, 2)
            .map(|s| u16::from_be_bytes([s[0], s[1]]))
    }

    #[inline]
    fn read_u32(&self, address: u32) -> Option<u32> {
        self.get_slice(address, 4)
            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    #[inline]
    fn read_f32(&self, address: u32) -> Option<f32> {
        self.read_u32(address).map(f32::from_bits)
    }

    /// Copy `data` into memory at `address`
    fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<()> {
        match self.get_slice_mut(address, data.len()) {
            Some(dst) => {
                dst.copy_from_slice(data);
                Ok(())
            }
            None => Err(GpuError::InvalidMemoryAccess {
                address,
                size: data.len(),
            }
            .into()),
        }
    }

    fn write_u16(&mut self, address: u32, value: u16) -> Result<()> {
        self.write_bytes(address, &value.to_be_bytes())
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<()> {
        self.write_bytes(address, &value.to_be_bytes())
    }
}

/// Flat emulated RAM
pub struct MainMemory {
    ram: Vec<u8>,
}

impl MainMemory {
    /// Default RAM size (24MB, GameCube main memory)
    pub const DEFAULT_SIZE: usize = 24 * 1024 * 1024;

    /// Mirror mask applied to every incoming address
    const ADDRESS_MASK: u32 = 0x3FFF_FFFF;

    /// Create a zero-filled RAM of the default size
    pub fn new() -> Self {
        Self::with_size(Self::DEFAULT_SIZE)
    }

    /// Create a zero-filled RAM of `size` bytes
    pub fn with_size(size: usize) -> Self {
        Self { ram: vec![0; size] }
    }

    /// Create a RAM image from raw bytes, padded to the default size
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut ram = vec![0; Self::DEFAULT_SIZE.max(data.len())];
        ram[..data.len()].copy_from_slice(data);
        Self { ram }
    }

    /// Load a raw memory image from disk
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::Io` if the file cannot be read, or
    /// `EmulatorError::Parse` if the image is larger than 0x40000000 bytes.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.len() > (Self::ADDRESS_MASK as usize) + 1 {
            return Err(EmulatorError::Parse(format!(
                "memory image too large: {} bytes",
                data.len()
            )));
        }

        log::info!("Loaded {} byte memory image", data.len());
        Ok(Self::from_bytes(&data))
    }

    /// Size of RAM in bytes
    pub fn size(&self) -> usize {
        self.ram.len()
    }

    /// Raw RAM contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.ram
    }

    #[inline(always)]
    fn range(&self, address: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = (address & Self::ADDRESS_MASK) as usize;
        let end = start.checked_add(len)?;
        if end <= self.ram.len() {
            Some(start..end)
        } else {
            None
        }
    }
}

impl Default for MainMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccessor for MainMemory {
    fn get_slice(&self, address: u32, len: usize) -> Option<&[u8]> {
        let range = self.range(address, len)?;
        Some(&self.ram[range])
    }

    fn get_slice_mut(&mut self, address: u32, len: usize) -> Option<&mut [u8]> {
        let range = self.range(address, len)?;
        Some(&mut self.ram[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let mut memory = MainMemory::with_size(0x100);
        memory
            .write_bytes(0x10, &[0x3F, 0x80, 0x00, 0x00, 0xAB, 0xCD])
            .unwrap();

        assert_eq!(memory.read_f32(0x10), Some(1.0));
        assert_eq!(memory.read_u16(0x14), Some(0xABCD));
        assert_eq!(memory.read_u8(0x15), Some(0xCD));
    }

    #[test]
    fn test_mirrors_resolve_to_physical() {
        let mut memory = MainMemory::with_size(0x100);
        memory.write_u32(0xC0000020, 0xDEADBEEF).unwrap();

        assert_eq!(memory.read_u32(0x00000020), Some(0xDEADBEEF));
        assert_eq!(memory.read_u32(0x80000020), Some(0xDEADBEEF));
    }

    #[test]
    fn test_out_of_range_access() {
        let mut memory = MainMemory::with_size(0x100);

        assert_eq!(memory.read_u32(0xFE), None);
        assert!(memory.get_slice(0x100, 1).is_none());
        assert!(memory.write_u32(0xFE, 0).is_err());
    }

    #[test]
    fn test_from_bytes_pads_to_default_size() {
        let memory = MainMemory::from_bytes(&[1, 2, 3]);
        assert_eq!(memory.size(), MainMemory::DEFAULT_SIZE);
        assert_eq!(memory.read_u8(2), Some(3));
    }
}
