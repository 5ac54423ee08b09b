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

//! GPU run loop
//!
//! Drains the shared command FIFO into the decoder until told to stop. The
//! CPU side writes into the FIFO under its mutex; the loop holds the lock
//! only while copying bytes out, never while decoding.
//!
//! Lock order is FIFO first, then scheduler. Producers must take them in the
//! same order.

use super::command_processor::CommandProcessor;
use super::{Gpu, GpuBus};
use crate::core::error::{GpuError, Result};
use crate::core::memory::MemoryAccessor;
use crate::core::timing::{EventScheduler, SharedScheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sleep between polls of an empty FIFO
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Run the GPU until `running` is cleared
///
/// Decode faults are logged and the loop carries on with the next FIFO
/// bytes.
///
/// Returns the number of command bytes consumed.
pub fn enter_loop(
    gpu: &mut Gpu,
    fifo: &Mutex<CommandProcessor>,
    memory: &mut dyn MemoryAccessor,
    scheduler: &mut dyn EventScheduler,
    running: &AtomicBool,
) -> u64 {
    log::info!("GPU loop started");

    let mut chunk = Vec::with_capacity(CommandProcessor::DEFAULT_SIZE as usize);
    let mut consumed_total = 0u64;

    while running.load(Ordering::Acquire) {
        chunk.clear();
        let drained = {
            let mut cp = fifo.lock().unwrap_or_else(PoisonError::into_inner);
            let drained = cp.drain_into(&mut chunk, scheduler);
            cp.set_command_idle(drained == 0 && gpu.pending_bytes() == 0);
            drained
        };

        if drained == 0 {
            thread::park_timeout(IDLE_WAIT);
            continue;
        }

        let mut bus = GpuBus {
            memory: &mut *memory,
            scheduler: &mut *scheduler,
        };
        match gpu.run_buffer(&chunk, &mut bus) {
            Ok(consumed) => consumed_total += consumed as u64,
            Err(e) => log::warn!("GPU loop dropped {} FIFO bytes: {}", drained, e),
        }
    }

    log::info!("GPU loop stopped after {} bytes", consumed_total);
    consumed_total
}

/// The GPU running on its own thread
///
/// The thread owns the GPU and the memory it reads. Both are handed back by
/// [`GpuThread::stop`].
pub struct GpuThread<M> {
    handle: Option<JoinHandle<(Gpu, M)>>,
    running: Arc<AtomicBool>,
    fifo: Arc<Mutex<CommandProcessor>>,
}

impl<M: MemoryAccessor + Send + 'static> GpuThread<M> {
    /// Start the run loop on a thread named `gpu`
    ///
    /// # Errors
    ///
    /// `EmulatorError::Io` if the thread cannot be created.
    pub fn spawn(
        gpu: Gpu,
        fifo: Arc<Mutex<CommandProcessor>>,
        memory: M,
        scheduler: SharedScheduler,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread_fifo = Arc::clone(&fifo);

        let handle = thread::Builder::new()
            .name("gpu".to_string())
            .spawn(move || {
                let mut gpu = gpu;
                let mut memory = memory;
                let mut scheduler = scheduler;
                enter_loop(
                    &mut gpu,
                    &thread_fifo,
                    &mut memory,
                    &mut scheduler,
                    &thread_running,
                );
                (gpu, memory)
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
            fifo,
        })
    }

    /// The FIFO the thread drains
    pub fn fifo(&self) -> &Arc<Mutex<CommandProcessor>> {
        &self.fifo
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cut the idle wait short after new FIFO writes
    pub fn wake(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Stop the loop and join the thread
    ///
    /// # Errors
    ///
    /// `GpuError::ThreadPanicked` if the loop panicked.
    pub fn stop(mut self) -> Result<(Gpu, M)> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take().ok_or(GpuError::ThreadPanicked)?;
        handle.thread().unpark();
        let parts = handle.join().map_err(|_| GpuError::ThreadPanicked)?;
        Ok(parts)
    }
}

impl<M> Drop for GpuThread<M> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("GPU thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::InterruptLines;
    use crate::core::memory::MainMemory;
    use crate::core::timing::EventLog;
    use std::time::Instant;

    const TOKEN_CMD: [u8; 5] = [0x61, 0x47, 0x00, 0xBE, 0xEF];

    #[test]
    fn test_loop_returns_when_stopped() {
        let mut gpu = Gpu::new();
        let fifo = Mutex::new(CommandProcessor::new());
        let mut memory = MainMemory::with_size(0x100);
        let mut events = EventLog::new();
        let running = AtomicBool::new(false);

        let consumed = enter_loop(&mut gpu, &fifo, &mut memory, &mut events, &running);
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_thread_runs_fifo_commands() {
        let mut scheduler = SharedScheduler::default();
        let mut gpu = Gpu::new();
        gpu.register_events(&mut scheduler);

        let mut cp = CommandProcessor::new();
        cp.register_events(&mut scheduler);
        let fifo = Arc::new(Mutex::new(cp));

        let thread = GpuThread::spawn(
            gpu,
            Arc::clone(&fifo),
            MainMemory::with_size(0x1000),
            scheduler.clone(),
        )
        .expect("spawn");

        {
            let mut producer = scheduler.clone();
            let mut cp = fifo.lock().unwrap();
            assert_eq!(cp.write(&TOKEN_CMD, &mut producer), TOKEN_CMD.len());
        }
        thread.wake();

        let deadline = Instant::now() + Duration::from_secs(5);
        while fifo.lock().unwrap().rw_distance() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let (mut gpu, _memory) = thread.stop().expect("join");
        assert_eq!(fifo.lock().unwrap().rw_distance(), 0);
        assert_eq!(gpu.pending_bytes(), 0);

        let mut lines = InterruptLines::new();
        for (handle, userdata) in scheduler.lock().run_events() {
            gpu.dispatch_event(handle, userdata, &mut lines);
        }
        assert_eq!(gpu.read_pe_register(0x0E), 0xBEEF);
    }

    #[test]
    fn test_stop_without_work() {
        let thread = GpuThread::spawn(
            Gpu::new(),
            Arc::new(Mutex::new(CommandProcessor::new())),
            MainMemory::with_size(0x100),
            SharedScheduler::default(),
        )
        .expect("spawn");
        assert!(thread.is_running());

        let (gpu, memory) = thread.stop().expect("join");
        assert_eq!(gpu.statistics().vertices_loaded, 0);
        assert_eq!(memory.size(), 0x100);
    }
}
