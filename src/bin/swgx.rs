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

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use swgx::core::config::RendererConfig;
use swgx::core::error::{EmulatorError, Result};
use swgx::core::gpu::xfb::decode_xfb;
use swgx::core::gpu::{Gpu, GpuBus};
use swgx::core::memory::MainMemory;
use swgx::core::timing::EventLog;

/// Software GX command stream player
#[derive(Parser)]
#[command(name = "swgx")]
#[command(about = "Replays a GX command stream through the software pipeline", long_about = None)]
struct Args {
    /// Raw FIFO command stream
    stream: PathBuf,

    /// Main memory image that display lists, arrays and textures refer to
    #[arg(short = 'm', long)]
    memory: Option<PathBuf>,

    /// Renderer configuration (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Write a save state after the stream has run
    #[arg(short = 's', long)]
    save_state: Option<PathBuf>,

    /// Dump the last XFB copy as raw RGBA8
    #[arg(short = 'x', long)]
    xfb: Option<PathBuf>,
}

fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("swgx v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            RendererConfig::load_from_file(path)?
        }
        None => RendererConfig::default(),
    };

    let mut memory = match &args.memory {
        Some(path) => {
            info!("Loading memory image from: {}", path.display());
            MainMemory::load_from_file(path)?
        }
        None => MainMemory::new(),
    };

    let stream = std::fs::read(&args.stream)?;
    info!("Replaying {} bytes from {}", stream.len(), args.stream.display());

    let mut gpu = Gpu::with_config(config);
    let mut events = EventLog::new();
    gpu.register_events(&mut events);
    let mut bus = GpuBus {
        memory: &mut memory,
        scheduler: &mut events,
    };

    if let Err(e) = gpu.run_buffer(&stream, &mut bus) {
        error!("Command stream stopped: {}", e);
        return Err(e);
    }
    if gpu.pending_bytes() > 0 {
        warn!("{} trailing bytes form an incomplete command", gpu.pending_bytes());
    }

    let stats = gpu.statistics();
    let report = serde_json::to_string_pretty(&stats)
        .map_err(|e| EmulatorError::Parse(format!("Failed to encode statistics: {}", e)))?;
    println!("{}", report);

    for (delay, handle, userdata) in events.posted() {
        info!(
            "Posted event {} after {} ticks (userdata 0x{:X})",
            handle, delay, userdata
        );
    }

    if let Some(path) = &args.save_state {
        gpu.save_state(None).save_to_file(path)?;
        info!("Save state written to: {}", path.display());
    }

    if let Some(path) = &args.xfb {
        match gpu.last_xfb() {
            Some(copy) => match decode_xfb(&memory, &copy) {
                Some(rgba) => {
                    std::fs::write(path, rgba)?;
                    info!(
                        "XFB {}x{} written to: {}",
                        copy.width,
                        copy.height,
                        path.display()
                    );
                }
                None => warn!("XFB at 0x{:08X} lies outside memory", copy.address),
            },
            None => warn!("No XFB copy was made"),
        }
    }

    Ok(())
}
