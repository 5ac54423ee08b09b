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

//! GX graphics pipeline
//!
//! A software implementation of the GameCube/Wii "Flipper" GPU. The
//! pipeline is fed a raw command stream and renders into the embedded
//! framebuffer (EFB):
//!
//! ```text
//! FIFO bytes -> opcode decoder -> vertex loader -> transform/lighting
//!            -> setup unit -> clipper -> rasterizer -> TEV -> EFB
//!                                                          -> EFB copy / XFB
//! ```
//!
//! # Ownership
//!
//! All pipeline state lives in [`Gpu`]: register banks, texture memory, the
//! EFB, rasterizer slopes and the pixel engine. Nothing is global, so any
//! number of instances can run side by side. Main memory and the event
//! scheduler belong to the caller and are lent to each call through
//! [`GpuBus`].
//!
//! # EFB Layout
//!
//! The EFB is 640x528 pixels with 24-bit color and 24-bit depth planes. The
//! color layout depends on the pixel format in the Z control register
//! (RGB8, RGBA6 or RGB565 approximated as RGB8).
//!
//! # Example
//!
//! ```
//! use swgx::core::gpu::{Gpu, GpuBus};
//! use swgx::core::memory::MainMemory;
//! use swgx::core::timing::{EventLog, EventScheduler};
//!
//! let mut gpu = Gpu::new();
//! let mut memory = MainMemory::with_size(0x10000);
//! let mut events = EventLog::new();
//! gpu.register_events(&mut events);
//!
//! // BP 0x47: PE token 0x1234
//! let stream = [0x61, 0x47, 0x00, 0x12, 0x34];
//! let mut bus = GpuBus { memory: &mut memory, scheduler: &mut events };
//! gpu.run_buffer(&stream, &mut bus).unwrap();
//!
//! assert_eq!(events.posted_named("PE Token"), vec![0x1234]);
//! ```

pub mod clipper;
pub mod command_processor;
pub mod efb;
pub mod lighting;
pub mod opcode_decoder;
pub mod pixel_engine;
pub mod rasterizer;
pub mod registers;
pub mod setup;
pub mod tev;
pub mod texture;
pub mod transform;
pub mod vertex_loader;
pub mod video_loop;
pub mod xfb;

#[cfg(test)]
mod tests;
mod types;

pub use types::*;

use crate::core::config::RendererConfig;
use crate::core::error::{EmulatorError, Result};
use crate::core::interrupt::InterruptLines;
use crate::core::memory::MemoryAccessor;
use crate::core::save_state::{GpuSaveState, SaveStateMetadata, SAVE_STATE_VERSION};
use crate::core::timing::{EventHandle, EventScheduler};
use clipper::{Clipper, ScreenTriangle};
use command_processor::CommandProcessor;
use efb::Efb;
use opcode_decoder::{DecoderState, MultiByteOp};
use pixel_engine::{BoundingBox, PixelEngine};
use rasterizer::Rasterizer;
use registers::bp::{
    CopyTrigger, PixelFormat, BPMEM_CLEARBBOX1, BPMEM_CLEARBBOX2, BPMEM_LOADTLUT1,
    BPMEM_PE_TOKEN_ID, BPMEM_PE_TOKEN_INT_ID, BPMEM_SETDRAWDONE, BPMEM_TRIGGER_EFB_COPY,
    BPMEM_ZCOMPARE,
};
use registers::{BpMemory, CpMemory, XfMemory};
use setup::{Assembled, SetupUnit};
use tev::{PixelPipeline, Tev};
use texture::{TextureSource, TMEM_SIZE};
use vertex_loader::VertexLoader;
use xfb::XfbCopy;

/// Collaborators lent to the pipeline for one call
pub struct GpuBus<'a> {
    pub memory: &'a mut dyn MemoryAccessor,
    pub scheduler: &'a mut dyn EventScheduler,
}

/// Receives finished frames
pub trait PresentationBackend {
    /// Display an RGBA8 image of `width` x `height` pixels
    fn present_xfb(&mut self, rgba: &[u8], width: u32, height: u32);
}

/// The GPU context
///
/// # Examples
///
/// ```
/// use swgx::core::gpu::Gpu;
///
/// let gpu = Gpu::new();
/// assert_eq!(gpu.statistics().triangles_drawn, 0);
/// assert_eq!(gpu.pending_bytes(), 0);
/// ```
pub struct Gpu {
    // Register banks
    pub(crate) bp: BpMemory,
    pub(crate) cp: CpMemory,
    pub(crate) xf: XfMemory,

    /// Texture memory, holds TLUT palettes
    tmem: Vec<u8>,

    // Command stream
    pub(crate) decoder: DecoderState,
    pending: Vec<u8>,
    pub(crate) in_display_list: bool,

    // Vertex pipeline
    pub(crate) vertex_loader: VertexLoader,
    pub(crate) setup: SetupUnit,
    clipper: Clipper,
    clip_buffer: Vec<ScreenTriangle>,

    // Pixel pipeline
    rasterizer: Rasterizer,
    tev: Tev,
    efb: Efb,
    bbox: BoundingBox,
    pixel_engine: PixelEngine,

    config: RendererConfig,
    pub(crate) stats: GpuStatistics,
    warnings: PipelineWarnings,

    /// Running triangle index for the debug draw range
    triangle_index: u32,
    frame_count: u64,
    last_xfb: Option<XfbCopy>,
}

impl Gpu {
    /// Create a GPU with default settings
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        Self {
            bp: BpMemory::new(),
            cp: CpMemory::new(),
            xf: XfMemory::new(),
            tmem: vec![0; TMEM_SIZE],
            decoder: DecoderState::ReadOpcode,
            pending: Vec::new(),
            in_display_list: false,
            vertex_loader: VertexLoader::new(),
            setup: SetupUnit::new(),
            clipper: Clipper::new(),
            clip_buffer: Vec::with_capacity(16),
            rasterizer: Rasterizer::new(),
            tev: Tev::new(),
            efb: Efb::new(),
            bbox: BoundingBox::new(),
            pixel_engine: PixelEngine::new(),
            config,
            stats: GpuStatistics::default(),
            warnings: PipelineWarnings::default(),
            triangle_index: 0,
            frame_count: 0,
            last_xfb: None,
        }
    }

    /// Reset all pipeline state, keeping settings and event registrations
    pub fn reset(&mut self) {
        let config = self.config.clone();
        let pixel_engine = std::mem::take(&mut self.pixel_engine);
        *self = Self::with_config(config);
        self.pixel_engine = pixel_engine;
        self.pixel_engine.restore(&Default::default());
        log::info!("GPU reset");
    }

    /// Register the pixel engine's events with `scheduler`
    pub fn register_events(&mut self, scheduler: &mut dyn EventScheduler) {
        self.pixel_engine.register_events(scheduler);
    }

    /// Feed command bytes and run every complete command
    ///
    /// Bytes of a trailing incomplete command are kept and resumed on the
    /// next call. A decode fault abandons the rest of the buffered stream.
    ///
    /// Returns the number of buffered bytes consumed.
    pub fn run_buffer(&mut self, data: &[u8], bus: &mut GpuBus<'_>) -> Result<usize> {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(data);

        match self.decode_stream(&buffer, bus) {
            Ok(consumed) => {
                buffer.drain(..consumed);
                self.pending = buffer;
                Ok(consumed)
            }
            Err(e) => {
                log::error!("Command stream abandoned: {}", e);
                self.decoder = DecoderState::ReadOpcode;
                self.in_display_list = false;
                buffer.clear();
                self.pending = buffer;
                Err(e)
            }
        }
    }

    /// Bytes waiting for the rest of their command
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Apply a BP register load and its side effects
    pub(crate) fn write_bp(&mut self, address: u8, value: u32, bus: &mut GpuBus<'_>) {
        self.bp.load(address, value);
        let new_value = self.bp.raw(address);

        match address {
            BPMEM_SETDRAWDONE => {
                if new_value & 0xFF == 0x02 {
                    self.pixel_engine.post_finish(bus.scheduler);
                }
            }
            BPMEM_PE_TOKEN_ID => {
                self.pixel_engine
                    .post_token(new_value as u16, false, bus.scheduler);
            }
            BPMEM_PE_TOKEN_INT_ID => {
                self.pixel_engine
                    .post_token(new_value as u16, true, bus.scheduler);
            }
            BPMEM_ZCOMPARE => self.check_pixel_format(),
            BPMEM_TRIGGER_EFB_COPY => self.efb_copy(bus),
            BPMEM_CLEARBBOX1 | BPMEM_CLEARBBOX2 => self.bbox.write(address, new_value),
            BPMEM_LOADTLUT1 => self.load_tlut(&*bus.memory),
            0xE0..=0xE7 => self.tev.write_register(address, new_value),
            _ => {}
        }
    }

    /// Report RGB565_Z16 once each time it becomes the active format
    fn check_pixel_format(&mut self) {
        let rgb565 = self.bp.pixel_format() == PixelFormat::Rgb565Z16;
        if rgb565 && !self.warnings.rgb565_z16 {
            log::warn!("RGB565_Z16 pixel format is not fully correct, drawing as RGB8");
        }
        self.warnings.rgb565_z16 = rgb565;
    }

    fn efb_copy(&mut self, bus: &mut GpuBus<'_>) {
        let trigger = CopyTrigger(self.bp.raw(BPMEM_TRIGGER_EFB_COPY));
        self.stats.efb_copies += 1;

        if trigger.copy_to_xfb() != 0 {
            match xfb::copy_efb_to_xfb(&self.efb, &self.bp, bus.memory) {
                Ok(copy) => self.last_xfb = Some(copy),
                Err(e) => log::error!("XFB copy failed: {}", e),
            }
        } else if self.config.efb_copies {
            if let Err(e) = texture::encoder::copy_efb_to_memory(&self.efb, &self.bp, bus.memory) {
                log::error!("EFB copy failed: {}", e);
            }
        } else {
            log::debug!("EFB copy skipped");
        }

        if trigger.clear() != 0 {
            log::debug!("EFB clear after copy");
            self.efb.clear(&self.bp);
        }
    }

    /// Copy a palette from main memory into texture memory
    fn load_tlut(&mut self, memory: &dyn MemoryAccessor) {
        let source = self.bp.tlut_source();
        let load = self.bp.tlut_load();
        let size = load.line_count() as usize * 32;
        let dest = (load.tmem_addr() as usize) << 9;

        if dest + size > self.tmem.len() {
            log::error!("TLUT load of {} bytes at TMEM 0x{:05X} overflows", size, dest);
            return;
        }
        match memory.get_slice(source, size) {
            Some(bytes) => {
                self.tmem[dest..dest + size].copy_from_slice(bytes);
                log::debug!("TLUT load 0x{:08X} -> TMEM 0x{:05X}, {} bytes", source, dest, size);
            }
            None => log::error!("TLUT source 0x{:08X} ({} bytes) is unmapped", source, size),
        }
    }

    /// Write XF words, refreshing the clipper when the viewport changes
    pub(crate) fn load_xf(&mut self, address: u32, words: &[u32]) {
        if self.xf.load(address, words) {
            self.clipper.set_view_offset(&self.xf);
        }
    }

    /// Decode, transform and assemble one vertex
    pub(crate) fn load_vertex(
        &mut self,
        reader: &mut DataReader<'_>,
        memory: &dyn MemoryAccessor,
    ) -> Result<()> {
        let input = self.vertex_loader.load_vertex(&self.cp, reader, memory)?;
        self.stats.vertices_loaded += 1;

        let mut output = OutputVertexData::default();
        transform::transform_position(&self.xf, &input, &mut output);
        transform::transform_normal(&self.xf, &input, self.vertex_loader.has_nbt(), &mut output);
        lighting::transform_color(&self.xf, &input, &mut output);
        transform::transform_tex_coords(
            &self.xf,
            &input,
            &mut output,
            self.vertex_loader.tex_gen_special_case(),
        );

        if let Some(primitive) = self.setup.push_vertex(output) {
            self.draw_assembled(primitive, memory);
        }
        Ok(())
    }

    fn draw_assembled(&mut self, primitive: Assembled, memory: &dyn MemoryAccessor) {
        let mut triangles = std::mem::take(&mut self.clip_buffer);
        triangles.clear();

        match primitive {
            Assembled::Triangle([a, b, c]) => {
                let cull_mode = self.bp.gen_mode().cull_mode();
                self.clipper.process_triangle(
                    &self.xf,
                    cull_mode,
                    self.setup.vertex(a),
                    self.setup.vertex(b),
                    self.setup.vertex(c),
                    &mut self.stats,
                    &mut triangles,
                );
            }
            Assembled::Line([a, b]) => {
                self.clipper.process_line(
                    &self.xf,
                    self.bp.line_point_width(),
                    self.setup.vertex(a),
                    self.setup.vertex(b),
                    &mut triangles,
                );
            }
        }

        for triangle in &triangles {
            self.rasterize(triangle, memory);
        }
        self.clip_buffer = triangles;
    }

    fn rasterize(&mut self, triangle: &ScreenTriangle, memory: &dyn MemoryAccessor) {
        let index = self.triangle_index;
        self.triangle_index = self.triangle_index.wrapping_add(1);
        if !self.config.draws_triangle(index) {
            return;
        }

        let mut pipe = PixelPipeline {
            bp: &self.bp,
            xf: &self.xf,
            textures: TextureSource {
                memory,
                tmem: &self.tmem,
            },
            efb: &mut self.efb,
            bbox: &mut self.bbox,
            stats: &mut self.stats,
            warnings: &mut self.warnings,
            config: &self.config,
        };
        let [v0, v1, v2] = triangle;
        self.rasterizer
            .draw_triangle(&mut self.tev, &mut pipe, v0, v1, v2);
    }

    /// Present the last XFB copy and start a new frame
    ///
    /// Returns false when there was nothing to present.
    pub fn swap(
        &mut self,
        memory: &dyn MemoryAccessor,
        backend: &mut dyn PresentationBackend,
    ) -> bool {
        self.triangle_index = 0;
        self.frame_count += 1;

        let Some(copy) = self.last_xfb else {
            log::debug!("Swap without an XFB copy");
            return false;
        };
        match xfb::decode_xfb(memory, &copy) {
            Some(rgba) => {
                backend.present_xfb(&rgba, copy.width, copy.height);
                true
            }
            None => {
                log::error!("XFB at 0x{:08X} is unmapped", copy.address);
                false
            }
        }
    }

    /// Route a fired scheduler event to the pixel engine
    ///
    /// Returns false if the event is not a GPU event.
    pub fn dispatch_event(
        &mut self,
        handle: EventHandle,
        userdata: u64,
        lines: &mut InterruptLines,
    ) -> bool {
        self.pixel_engine.handle_event(handle, userdata, lines)
    }

    /// CPU read of a 16-bit pixel engine register
    pub fn read_pe_register(&self, offset: u32) -> u16 {
        self.pixel_engine.read_register(offset, &self.bbox)
    }

    /// CPU write to the pixel engine control register
    pub fn write_pe_control(&mut self, value: u16, lines: &mut InterruptLines) {
        self.pixel_engine.write_control(value, lines);
    }

    pub fn bp(&self) -> &BpMemory {
        &self.bp
    }

    pub fn cp(&self) -> &CpMemory {
        &self.cp
    }

    pub fn xf(&self) -> &XfMemory {
        &self.xf
    }

    pub fn efb(&self) -> &Efb {
        &self.efb
    }

    pub fn tmem(&self) -> &[u8] {
        &self.tmem
    }

    pub fn tev(&self) -> &Tev {
        &self.tev
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn pixel_engine(&self) -> &PixelEngine {
        &self.pixel_engine
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder
    }

    pub fn last_xfb(&self) -> Option<XfbCopy> {
        self.last_xfb
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RendererConfig) {
        self.config = config;
    }

    /// Approximate paths reported so far
    pub fn warnings(&self) -> PipelineWarnings {
        self.warnings
    }

    pub fn statistics(&self) -> GpuStatistics {
        self.stats
    }

    /// Take the counters, zeroing them
    pub fn take_statistics(&mut self) -> GpuStatistics {
        std::mem::take(&mut self.stats)
    }

    /// Snapshot the pipeline, optionally with the FIFO feeding it
    pub fn save_state(&self, fifo: Option<&CommandProcessor>) -> GpuSaveState {
        GpuSaveState {
            version: SAVE_STATE_VERSION,
            metadata: SaveStateMetadata {
                timestamp: chrono::Utc::now(),
                frame_count: self.frame_count,
            },
            bp: self.bp.as_slice().to_vec(),
            cp: self.cp.to_words(),
            xf: self.xf.as_slice().to_vec(),
            tmem: self.tmem.clone(),
            decoder: self.decoder,
            pending: self.pending.clone(),
            setup: self.setup.clone(),
            clipper: self.clipper,
            rasterizer: self.rasterizer.clone(),
            tev: self.tev.clone(),
            efb: self.efb.clone(),
            pixel_engine: self.pixel_engine.state(),
            bounding_box: self.bbox,
            fifo: fifo.map(CommandProcessor::state),
            last_xfb: self.last_xfb,
            triangle_index: self.triangle_index,
            stats: self.stats,
        }
    }

    /// Restore a snapshot taken by [`Gpu::save_state`]
    ///
    /// # Errors
    ///
    /// `EmulatorError::SaveState` on a version mismatch or malformed register
    /// banks. The GPU is left untouched in that case.
    pub fn load_state(
        &mut self,
        state: &GpuSaveState,
        fifo: Option<&mut CommandProcessor>,
    ) -> Result<()> {
        if state.version != SAVE_STATE_VERSION {
            return Err(EmulatorError::SaveState(format!(
                "Incompatible save state version: expected {}, got {}",
                SAVE_STATE_VERSION, state.version
            )));
        }
        let cp = CpMemory::from_words(&state.cp)
            .ok_or_else(|| EmulatorError::SaveState("Malformed CP register bank".to_string()))?;

        self.bp.restore(&state.bp);
        self.cp = cp;
        self.xf.restore(&state.xf);
        let tmem_len = state.tmem.len().min(TMEM_SIZE);
        self.tmem.fill(0);
        self.tmem[..tmem_len].copy_from_slice(&state.tmem[..tmem_len]);
        self.decoder = state.decoder;
        self.pending = state.pending.clone();
        self.in_display_list = false;
        self.setup = state.setup.clone();
        self.clipper = state.clipper;
        self.rasterizer = state.rasterizer.clone();
        self.tev = state.tev.clone();
        self.efb = state.efb.clone();
        self.pixel_engine.restore(&state.pixel_engine);
        self.bbox = state.bounding_box;
        self.last_xfb = state.last_xfb;
        self.triangle_index = state.triangle_index;
        self.frame_count = state.metadata.frame_count;
        self.stats = state.stats;

        // A draw in progress needs its vertex format back
        if let DecoderState::ContinuingMultiByteOp(MultiByteOp::Primitive { vat, primitive, .. }) =
            self.decoder
        {
            self.vertex_loader.set_format(&self.cp, &self.xf, vat, primitive);
        }

        match (fifo, &state.fifo) {
            (Some(cp), Some(saved)) => cp.restore(saved),
            (Some(_), None) => log::warn!("Save state has no FIFO snapshot"),
            _ => {}
        }

        log::info!("GPU state restored (frame {})", self.frame_count);
        Ok(())
    }
}

impl Default for Gpu {
    fn default() -> Self {
        Self::new()
    }
}
