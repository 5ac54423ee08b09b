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

//! GPU-facing interrupt lines
//!
//! The wider emulator owns the processor interface; this is the small part of
//! it the graphics pipeline talks to. Lines are level-triggered: each source
//! sets or clears its own cause bit, and the CPU side polls [`InterruptLines::is_pending`].
//!
//! ## Cause Bits
//!
//! ```text
//! Bit  | Source        | Description
//! -----|---------------|----------------------------------
//! 9    | PE_TOKEN      | Pixel engine token reached (token-int)
//! 10   | PE_FINISH     | Pixel engine draw done
//! 11   | CP            | Command processor FIFO breakpoint/watermark
//! ```
//!
//! The GPU side never writes these directly. It posts scheduler events and the
//! owner of the emulated timeline routes fired events here.

/// Interrupt cause bit flags
pub mod interrupts {
    /// Pixel engine token interrupt (bit 9)
    pub const PE_TOKEN: u32 = 1 << 9;

    /// Pixel engine finish interrupt (bit 10)
    pub const PE_FINISH: u32 = 1 << 10;

    /// Command processor interrupt (bit 11)
    pub const CP: u32 = 1 << 11;
}

/// Level-triggered interrupt cause/mask pair
///
/// # Example
///
/// ```
/// use swgx::core::interrupt::{InterruptLines, interrupts};
///
/// let mut lines = InterruptLines::new();
/// lines.write_mask(interrupts::PE_FINISH);
///
/// lines.set_interrupt(interrupts::PE_FINISH, true);
/// assert!(lines.is_pending());
///
/// lines.set_interrupt(interrupts::PE_FINISH, false);
/// assert!(!lines.is_pending());
/// ```
#[derive(Debug, Default, Clone)]
pub struct InterruptLines {
    /// Active cause bits
    cause: u32,

    /// Enabled cause bits
    mask: u32,
}

impl InterruptLines {
    /// Create with all lines low and masked
    pub fn new() -> Self {
        Self { cause: 0, mask: 0 }
    }

    /// Raise or lower a cause bit
    pub fn set_interrupt(&mut self, cause: u32, raised: bool) {
        if raised {
            self.cause |= cause;
        } else {
            self.cause &= !cause;
        }
        log::trace!(
            "Interrupt 0x{:04X} {}, cause=0x{:04X}",
            cause,
            if raised { "raised" } else { "lowered" },
            self.cause
        );
    }

    pub fn read_cause(&self) -> u32 {
        self.cause
    }

    pub fn read_mask(&self) -> u32 {
        self.mask
    }

    pub fn write_mask(&mut self, value: u32) {
        self.mask = value;
    }

    /// Whether any enabled line is raised
    pub fn is_pending(&self) -> bool {
        (self.cause & self.mask) != 0
    }

    pub fn reset(&mut self) {
        self.cause = 0;
        self.mask = 0;
    }
}
