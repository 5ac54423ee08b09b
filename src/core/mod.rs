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

//! Pipeline components
//!
//! - GPU (decoder, transform, rasterizer, TEV, EFB, copies)
//! - Main memory accessor
//! - Event scheduler and interrupt lines
//! - Configuration, errors and save states

pub mod config;
pub mod error;
pub mod gpu;
pub mod interrupt;
pub mod memory;
pub mod save_state;
pub mod timing;

// Re-export commonly used types
pub use config::RendererConfig;
pub use error::{DecodeFault, EmulatorError, GpuError, Result};
pub use gpu::{Gpu, GpuBus, PresentationBackend};
pub use interrupt::InterruptLines;
pub use memory::{MainMemory, MemoryAccessor};
pub use timing::{EventScheduler, SharedScheduler, TimingEventManager};
