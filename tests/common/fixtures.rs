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

//! Test fixtures for common test scenarios

use super::commands::Stream;
use swgx::core::error::Result;
use swgx::core::gpu::{Gpu, GpuBus};
use swgx::core::interrupt::InterruptLines;
use swgx::core::memory::MainMemory;
use swgx::core::timing::EventLog;

/// Size of the test RAM
#[allow(dead_code)]
pub const TEST_RAM_SIZE: usize = 0x40_0000;

/// A GPU wired to a small RAM and an event recorder
pub struct Harness {
    pub gpu: Gpu,
    pub memory: MainMemory,
    pub events: EventLog,
    pub lines: InterruptLines,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_gpu(Gpu::new())
    }

    pub fn with_gpu(mut gpu: Gpu) -> Self {
        let mut events = EventLog::new();
        gpu.register_events(&mut events);
        Self {
            gpu,
            memory: MainMemory::with_size(TEST_RAM_SIZE),
            events,
            lines: InterruptLines::new(),
        }
    }

    pub fn run_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut bus = GpuBus {
            memory: &mut self.memory,
            scheduler: &mut self.events,
        };
        self.gpu.run_buffer(bytes, &mut bus)
    }

    pub fn run(&mut self, stream: &Stream) -> Result<usize> {
        self.run_bytes(stream.bytes())
    }

    /// Deliver every posted event, returning how many the GPU accepted
    pub fn fire_events(&mut self) -> usize {
        let mut handled = 0;
        for (_, handle, userdata) in self.events.drain() {
            if self.gpu.dispatch_event(handle, userdata, &mut self.lines) {
                handled += 1;
            }
        }
        handled
    }
}

/// A harness with flat shading already configured
#[allow(dead_code)]
pub fn flat_shaded_harness() -> Harness {
    let mut harness = Harness::new();
    let mut setup = Stream::new();
    setup.flat_shading();
    harness.run(&setup).expect("state setup");
    harness
}
