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

//! Command processor FIFO
//!
//! A byte ring between `base` (inclusive) and `end` (exclusive) in the GPU's
//! address space. The producer (CPU write-gather pipe or DMA) appends with
//! [`CommandProcessor::write`]; the consumer drains everything between the
//! read and write pointers with [`CommandProcessor::drain_into`].
//!
//! # Status Bits
//!
//! ```text
//! Bit | Name         | Set when
//! ----|--------------|------------------------------------------
//! 0   | OVERFLOW     | pending bytes reach the high watermark
//! 1   | UNDERFLOW    | pending bytes drop below the low watermark
//! 2   | READ_IDLE    | nothing left to read
//! 3   | COMMAND_IDLE | the consumer is not processing commands
//! 4   | BREAKPOINT   | the read pointer reached the breakpoint
//! ```
//!
//! Interrupts derived from these bits are posted as scheduler events and
//! take effect when the CPU side dispatches them.

use crate::core::interrupt::{interrupts, InterruptLines};
use crate::core::timing::{EventHandle, EventScheduler};
use bincode::{Decode, Encode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// CP status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CpStatus: u32 {
        const OVERFLOW = 1 << 0;
        const UNDERFLOW = 1 << 1;
        const READ_IDLE = 1 << 2;
        const COMMAND_IDLE = 1 << 3;
        const BREAKPOINT = 1 << 4;
    }
}

bitflags! {
    /// CP control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CpControl: u32 {
        const READ_ENABLE = 1 << 0;
        const BP_ENABLE = 1 << 1;
        const OVERFLOW_INT = 1 << 2;
        const UNDERFLOW_INT = 1 << 3;
        const LINKED = 1 << 4;
        const BP_INT = 1 << 5;
    }
}

/// Serializable FIFO snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FifoState {
    pub base: u32,
    pub end: u32,
    pub write_pointer: u32,
    pub read_pointer: u32,
    pub hi_watermark: u32,
    pub lo_watermark: u32,
    pub breakpoint: u32,
    pub rw_distance: u32,
    pub status: u32,
    pub control: u32,
    pub data: Vec<u8>,
}

/// The GPU command FIFO and its registers
#[derive(Debug)]
pub struct CommandProcessor {
    base: u32,
    end: u32,
    write_pointer: u32,
    read_pointer: u32,
    hi_watermark: u32,
    lo_watermark: u32,
    breakpoint: u32,
    rw_distance: u32,
    data: Vec<u8>,
    status: CpStatus,
    control: CpControl,
    interrupt_event: Option<EventHandle>,
    interrupt_raised: bool,
}

impl CommandProcessor {
    /// Default FIFO size
    pub const DEFAULT_SIZE: u32 = 256 * 1024;

    pub fn new() -> Self {
        let mut cp = Self {
            base: 0,
            end: 0,
            write_pointer: 0,
            read_pointer: 0,
            hi_watermark: 0,
            lo_watermark: 0,
            breakpoint: 0,
            rw_distance: 0,
            data: Vec::new(),
            status: CpStatus::READ_IDLE | CpStatus::COMMAND_IDLE,
            control: CpControl::READ_ENABLE,
            interrupt_event: None,
            interrupt_raised: false,
        };
        cp.set_fifo(0, Self::DEFAULT_SIZE);
        cp
    }

    pub fn register_events(&mut self, scheduler: &mut dyn EventScheduler) {
        self.interrupt_event = Some(scheduler.register_event("CP Interrupt"));
    }

    /// Place the ring at `base..end`, discarding pending data
    pub fn set_fifo(&mut self, base: u32, end: u32) {
        let end = end.max(base);
        self.base = base;
        self.end = end;
        self.write_pointer = base;
        self.read_pointer = base;
        self.rw_distance = 0;
        self.data = vec![0; (end - base) as usize];
        self.status.insert(CpStatus::READ_IDLE);
        log::debug!("CP FIFO at 0x{:08X}-0x{:08X}", base, end);
    }

    pub fn set_watermarks(&mut self, hi: u32, lo: u32) {
        self.hi_watermark = hi;
        self.lo_watermark = lo;
    }

    pub fn set_breakpoint(&mut self, address: u32) {
        self.breakpoint = address;
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.end - self.base
    }

    /// Bytes written but not yet read
    #[inline]
    pub fn rw_distance(&self) -> u32 {
        self.rw_distance
    }

    pub fn read_pointer(&self) -> u32 {
        self.read_pointer
    }

    pub fn write_pointer(&self) -> u32 {
        self.write_pointer
    }

    pub fn status(&self) -> CpStatus {
        self.status
    }

    pub fn control(&self) -> CpControl {
        self.control
    }

    #[inline]
    fn advance(&self, pointer: u32, count: u32) -> u32 {
        let capacity = self.capacity();
        self.base + (pointer - self.base + count) % capacity
    }

    /// Append `bytes` at the write pointer
    ///
    /// Returns the number of bytes accepted; a full ring drops the rest.
    pub fn write(&mut self, bytes: &[u8], scheduler: &mut dyn EventScheduler) -> usize {
        let capacity = self.capacity();
        if capacity == 0 {
            log::error!("CP FIFO write with no ring configured");
            return 0;
        }

        let free = (capacity - self.rw_distance) as usize;
        let count = bytes.len().min(free);
        if count < bytes.len() {
            log::warn!("CP FIFO full, dropped {} bytes", bytes.len() - count);
        }

        for &byte in &bytes[..count] {
            let index = (self.write_pointer - self.base) as usize;
            self.data[index] = byte;
            self.write_pointer = self.advance(self.write_pointer, 1);
        }
        self.rw_distance += count as u32;

        if count > 0 {
            self.status.remove(CpStatus::READ_IDLE);
        }
        self.update_watermarks();
        self.update_interrupts(scheduler);
        count
    }

    /// Move every readable byte into `out`
    ///
    /// Reading stops at the breakpoint when enabled.
    pub fn drain_into(&mut self, out: &mut Vec<u8>, scheduler: &mut dyn EventScheduler) -> usize {
        if !self.control.contains(CpControl::READ_ENABLE)
            || self.status.contains(CpStatus::BREAKPOINT)
        {
            return 0;
        }

        let mut count = self.rw_distance;
        let mut hit_breakpoint = false;
        if self.control.contains(CpControl::BP_ENABLE)
            && (self.base..self.end).contains(&self.breakpoint)
        {
            let capacity = self.capacity();
            let to_breakpoint =
                (self.breakpoint + capacity - self.read_pointer) % capacity;
            if to_breakpoint < count {
                count = to_breakpoint;
                hit_breakpoint = true;
            }
        }

        out.reserve(count as usize);
        for _ in 0..count {
            out.push(self.data[(self.read_pointer - self.base) as usize]);
            self.read_pointer = self.advance(self.read_pointer, 1);
        }
        self.rw_distance -= count;

        if hit_breakpoint {
            log::debug!("CP breakpoint at 0x{:08X}", self.breakpoint);
            self.status.insert(CpStatus::BREAKPOINT);
        }
        if self.rw_distance == 0 {
            self.status.insert(CpStatus::READ_IDLE);
        }
        self.update_watermarks();
        self.update_interrupts(scheduler);
        count as usize
    }

    /// Mark whether the consumer is busy with commands
    pub fn set_command_idle(&mut self, idle: bool) {
        self.status.set(CpStatus::COMMAND_IDLE, idle);
    }

    fn update_watermarks(&mut self) {
        let over = self.hi_watermark != 0 && self.rw_distance >= self.hi_watermark;
        let under = self.rw_distance < self.lo_watermark;
        self.status.set(CpStatus::OVERFLOW, over);
        self.status.set(CpStatus::UNDERFLOW, under);
    }

    fn update_interrupts(&mut self, scheduler: &mut dyn EventScheduler) {
        let active = (self.status.contains(CpStatus::OVERFLOW)
            && self.control.contains(CpControl::OVERFLOW_INT))
            || (self.status.contains(CpStatus::UNDERFLOW)
                && self.control.contains(CpControl::UNDERFLOW_INT))
            || (self.status.contains(CpStatus::BREAKPOINT)
                && self.control.contains(CpControl::BP_INT));

        if active == self.interrupt_raised {
            return;
        }
        self.interrupt_raised = active;
        match self.interrupt_event {
            Some(event) => scheduler.schedule_event(0, event, active as u64),
            None => log::warn!("CP interrupt change dropped: events not registered"),
        }
    }

    /// CPU write to the control register
    ///
    /// Disabling breakpoints releases a reader stopped at one.
    pub fn write_control(&mut self, value: u32, scheduler: &mut dyn EventScheduler) {
        self.control = CpControl::from_bits_truncate(value);
        if !self.control.contains(CpControl::BP_ENABLE) {
            self.status.remove(CpStatus::BREAKPOINT);
        }
        self.update_interrupts(scheduler);
    }

    /// CPU write to the clear register: bit 0 clears overflow, bit 1 underflow
    pub fn write_clear(&mut self, value: u32, scheduler: &mut dyn EventScheduler) {
        if value & 1 != 0 {
            self.status.remove(CpStatus::OVERFLOW);
        }
        if value & 2 != 0 {
            self.status.remove(CpStatus::UNDERFLOW);
        }
        self.update_interrupts(scheduler);
    }

    /// Apply a fired scheduler event
    ///
    /// Returns false if the event does not belong to the command processor.
    pub fn handle_event(
        &mut self,
        handle: EventHandle,
        userdata: u64,
        lines: &mut InterruptLines,
    ) -> bool {
        if Some(handle) != self.interrupt_event {
            return false;
        }
        lines.set_interrupt(interrupts::CP, userdata != 0);
        true
    }

    pub fn state(&self) -> FifoState {
        FifoState {
            base: self.base,
            end: self.end,
            write_pointer: self.write_pointer,
            read_pointer: self.read_pointer,
            hi_watermark: self.hi_watermark,
            lo_watermark: self.lo_watermark,
            breakpoint: self.breakpoint,
            rw_distance: self.rw_distance,
            status: self.status.bits(),
            control: self.control.bits(),
            data: self.data.clone(),
        }
    }

    pub fn restore(&mut self, state: &FifoState) {
        self.base = state.base;
        self.end = state.end.max(state.base);
        self.write_pointer = state.write_pointer;
        self.read_pointer = state.read_pointer;
        self.hi_watermark = state.hi_watermark;
        self.lo_watermark = state.lo_watermark;
        self.breakpoint = state.breakpoint;
        self.rw_distance = state.rw_distance.min(self.end - self.base);
        self.status = CpStatus::from_bits_truncate(state.status);
        self.control = CpControl::from_bits_truncate(state.control);
        self.data = state.data.clone();
        self.data.resize((self.end - self.base) as usize, 0);
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::EventLog;

    fn small_fifo(log: &mut EventLog) -> CommandProcessor {
        let mut cp = CommandProcessor::new();
        cp.register_events(log);
        cp.set_fifo(0x1000, 0x1010);
        cp
    }

    #[test]
    fn test_write_and_drain() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);

        assert_eq!(cp.write(&[1, 2, 3, 4], &mut log), 4);
        assert_eq!(cp.rw_distance(), 4);
        assert!(!cp.status().contains(CpStatus::READ_IDLE));

        let mut out = Vec::new();
        assert_eq!(cp.drain_into(&mut out, &mut log), 4);
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert!(cp.status().contains(CpStatus::READ_IDLE));
    }

    #[test]
    fn test_ring_wraps() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);
        let mut out = Vec::new();

        cp.write(&[0xAA; 12], &mut log);
        cp.drain_into(&mut out, &mut log);
        out.clear();

        let data: Vec<u8> = (0..10).collect();
        assert_eq!(cp.write(&data, &mut log), 10);
        assert_eq!(cp.write_pointer(), 0x1000 + 6);
        cp.drain_into(&mut out, &mut log);
        assert_eq!(out, data);
    }

    #[test]
    fn test_full_ring_drops() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);
        assert_eq!(cp.write(&[0; 20], &mut log), 16);
        assert_eq!(cp.write(&[0; 1], &mut log), 0);
    }

    #[test]
    fn test_high_watermark_interrupt_is_posted() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);
        cp.set_watermarks(8, 0);
        cp.write_control(
            (CpControl::READ_ENABLE | CpControl::OVERFLOW_INT).bits(),
            &mut log,
        );

        cp.write(&[0; 8], &mut log);
        assert!(cp.status().contains(CpStatus::OVERFLOW));
        assert_eq!(log.posted_named("CP Interrupt"), vec![1]);

        let mut lines = InterruptLines::new();
        lines.write_mask(interrupts::CP);
        for (_, handle, userdata) in log.drain() {
            assert!(cp.handle_event(handle, userdata, &mut lines));
        }
        assert!(lines.is_pending());

        // Draining lowers it again
        let mut out = Vec::new();
        cp.drain_into(&mut out, &mut log);
        assert_eq!(log.posted_named("CP Interrupt"), vec![0]);
    }

    #[test]
    fn test_breakpoint_stops_reads() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);
        cp.set_breakpoint(0x1003);
        cp.write_control((CpControl::READ_ENABLE | CpControl::BP_ENABLE).bits(), &mut log);

        cp.write(&[1, 2, 3, 4, 5], &mut log);
        let mut out = Vec::new();
        assert_eq!(cp.drain_into(&mut out, &mut log), 3);
        assert!(cp.status().contains(CpStatus::BREAKPOINT));
        assert_eq!(cp.drain_into(&mut out, &mut log), 0);

        cp.write_control(CpControl::READ_ENABLE.bits(), &mut log);
        assert_eq!(cp.drain_into(&mut out, &mut log), 2);
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_state_restore() {
        let mut log = EventLog::new();
        let mut cp = small_fifo(&mut log);
        cp.write(&[9, 8, 7], &mut log);

        let state = cp.state();
        let mut other = CommandProcessor::new();
        other.restore(&state);

        let mut out = Vec::new();
        other.drain_into(&mut out, &mut log);
        assert_eq!(out, vec![9, 8, 7]);
    }
}
