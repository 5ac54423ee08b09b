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

//! Software GameCube/Wii GX graphics pipeline
//!
//! This library implements the "Flipper" GPU in software: command stream
//! decoding, vertex loading, transform and lighting, clipping,
//! rasterization, the TEV color combiner and the embedded framebuffer with
//! its copy paths to textures and the external framebuffer.
//!
//! # Example
//!
//! ```
//! use swgx::core::gpu::{Gpu, GpuBus};
//! use swgx::core::memory::MainMemory;
//! use swgx::core::timing::EventLog;
//!
//! let mut gpu = Gpu::new();
//! let mut memory = MainMemory::with_size(0x1000);
//! let mut events = EventLog::new();
//!
//! // NOP, then BP 0x00 (gen mode)
//! let stream = [0x00, 0x61, 0x00, 0x00, 0x00, 0x10];
//! let mut bus = GpuBus { memory: &mut memory, scheduler: &mut events };
//! gpu.run_buffer(&stream, &mut bus).unwrap();
//! assert_eq!(gpu.bp().raw(0x00), 0x10);
//! ```

pub mod core;
