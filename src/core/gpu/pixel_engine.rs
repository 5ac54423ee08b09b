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

//! Pixel engine
//!
//! Tokens, draw-done signals and the bounding box registers.
//!
//! Token and finish writes arrive on the GPU side through BP registers but
//! are observed by the CPU. They are never applied directly: the GPU posts a
//! scheduler event and the CPU side applies it when the event fires, through
//! [`PixelEngine::handle_event`].

use crate::core::interrupt::{interrupts, InterruptLines};
use crate::core::timing::{EventHandle, EventScheduler};
use bincode::{Decode, Encode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// PE control register offset
pub const PE_CTRL_REGISTER: u32 = 0x0A;
/// PE token register offset
pub const PE_TOKEN_REG: u32 = 0x0E;
/// First bounding box register offset (left, right, top, bottom follow)
pub const PE_BBOX_LEFT: u32 = 0x10;

/// Userdata bit marking a token write that raises the token interrupt
const TOKEN_INTERRUPT_FLAG: u64 = 1 << 16;

bitflags! {
    /// PE control/status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PeControl: u16 {
        const TOKEN_ENABLE = 1 << 0;
        const FINISH_ENABLE = 1 << 1;
        /// Token interrupt pending, write 1 to acknowledge
        const TOKEN = 1 << 2;
        /// Finish interrupt pending, write 1 to acknowledge
        const FINISH = 1 << 3;
    }
}

/// Running bounding box of drawn pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct BoundingBox {
    pub left: u16,
    pub right: u16,
    pub top: u16,
    pub bottom: u16,
}

impl BoundingBox {
    pub const fn new() -> Self {
        Self {
            left: 1023,
            right: 0,
            top: 1023,
            bottom: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Grow to include pixel (x, y), rounded out to its 2x2 quad
    #[inline]
    pub fn update(&mut self, x: u32, y: u32) {
        self.left = self.left.min((x & !1) as u16);
        self.right = self.right.max((x | 1) as u16);
        self.top = self.top.min((y & !1) as u16);
        self.bottom = self.bottom.max((y | 1) as u16);
    }

    /// Apply a BP 0x55/0x56 write
    pub fn write(&mut self, address: u8, value: u32) {
        let low = (value & 0x3FF) as u16;
        let high = ((value >> 10) & 0x3FF) as u16;
        if address & 2 == 0 {
            self.left = low;
            self.right = high;
        } else {
            self.top = low;
            self.bottom = high;
        }
    }

    /// Register value by index: left, right, top, bottom
    pub fn get(&self, index: usize) -> u16 {
        match index {
            0 => self.left,
            1 => self.right,
            2 => self.top,
            _ => self.bottom,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent pixel engine state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct PixelEngineState {
    pub token: u16,
    pub control: u16,
}

/// Pixel engine registers and event plumbing
#[derive(Debug, Default)]
pub struct PixelEngine {
    token: u16,
    control: PeControl,
    token_event: Option<EventHandle>,
    finish_event: Option<EventHandle>,
}

impl PixelEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_events(&mut self, scheduler: &mut dyn EventScheduler) {
        self.token_event = Some(scheduler.register_event("PE Token"));
        self.finish_event = Some(scheduler.register_event("PE Finish"));
    }

    /// Post a token write, optionally raising the token interrupt
    pub fn post_token(&self, token: u16, interrupt: bool, scheduler: &mut dyn EventScheduler) {
        let Some(event) = self.token_event else {
            log::warn!("PE token 0x{:04X} dropped: events not registered", token);
            return;
        };
        let userdata = token as u64 | if interrupt { TOKEN_INTERRUPT_FLAG } else { 0 };
        log::debug!("PE token 0x{:04X} (interrupt: {})", token, interrupt);
        scheduler.schedule_event(0, event, userdata);
    }

    /// Post a draw-done signal
    pub fn post_finish(&self, scheduler: &mut dyn EventScheduler) {
        let Some(event) = self.finish_event else {
            log::warn!("PE finish dropped: events not registered");
            return;
        };
        log::debug!("PE finish");
        scheduler.schedule_event(0, event, 0);
    }

    /// Apply a fired scheduler event
    ///
    /// Returns false if the event does not belong to the pixel engine.
    pub fn handle_event(
        &mut self,
        handle: EventHandle,
        userdata: u64,
        lines: &mut InterruptLines,
    ) -> bool {
        if Some(handle) == self.token_event {
            self.token = userdata as u16;
            if userdata & TOKEN_INTERRUPT_FLAG != 0 {
                self.control.insert(PeControl::TOKEN);
            }
        } else if Some(handle) == self.finish_event {
            self.control.insert(PeControl::FINISH);
        } else {
            return false;
        }
        self.update_interrupts(lines);
        true
    }

    fn update_interrupts(&self, lines: &mut InterruptLines) {
        lines.set_interrupt(
            interrupts::PE_TOKEN,
            self.control
                .contains(PeControl::TOKEN | PeControl::TOKEN_ENABLE),
        );
        lines.set_interrupt(
            interrupts::PE_FINISH,
            self.control
                .contains(PeControl::FINISH | PeControl::FINISH_ENABLE),
        );
    }

    pub fn token(&self) -> u16 {
        self.token
    }

    pub fn control(&self) -> PeControl {
        self.control
    }

    /// CPU write to the control register
    ///
    /// Enable bits are stored; writing 1 to a pending bit acknowledges it.
    pub fn write_control(&mut self, value: u16, lines: &mut InterruptLines) {
        let written = PeControl::from_bits_truncate(value);
        let enables = PeControl::TOKEN_ENABLE | PeControl::FINISH_ENABLE;

        self.control = (self.control - enables) | (written & enables);
        self.control.remove(written & (PeControl::TOKEN | PeControl::FINISH));
        self.update_interrupts(lines);
    }

    /// CPU read of a 16-bit PE register
    pub fn read_register(&self, offset: u32, bbox: &BoundingBox) -> u16 {
        match offset {
            PE_CTRL_REGISTER => self.control.bits(),
            PE_TOKEN_REG => self.token,
            o @ PE_BBOX_LEFT..=0x16 if o & 1 == 0 => bbox.get(((o - PE_BBOX_LEFT) / 2) as usize),
            _ => {
                log::trace!("Unhandled PE register read 0x{:02X}", offset);
                0
            }
        }
    }

    pub fn state(&self) -> PixelEngineState {
        PixelEngineState {
            token: self.token,
            control: self.control.bits(),
        }
    }

    pub fn restore(&mut self, state: &PixelEngineState) {
        self.token = state.token;
        self.control = PeControl::from_bits_truncate(state.control);
    }
}
