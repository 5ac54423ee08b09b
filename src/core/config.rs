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

//! Renderer configuration
//!
//! Settings are read from a TOML file. Every key is optional and unknown keys
//! are rejected.
//!
//! ```toml
//! early_z = true
//! bounding_box = true
//! draw_start = 0
//! draw_end = 100000
//! efb_copies = true
//! ```

use crate::core::error::{EmulatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Software renderer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Honor the early depth test bit in the Z control register
    pub early_z: bool,

    /// Track the pixel engine bounding box
    pub bounding_box: bool,

    /// First triangle index to rasterize
    pub draw_start: u32,

    /// One past the last triangle index to rasterize
    pub draw_end: u32,

    /// Perform EFB to texture copies
    pub efb_copies: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            early_z: true,
            bounding_box: true,
            draw_start: 0,
            draw_end: 100_000,
            efb_copies: true,
        }
    }
}

impl RendererConfig {
    /// Parse settings from a TOML document
    ///
    /// # Example
    ///
    /// ```
    /// use swgx::core::config::RendererConfig;
    ///
    /// let config = RendererConfig::from_toml_str("early_z = false").unwrap();
    /// assert!(!config.early_z);
    /// assert!(config.bounding_box);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EmulatorError::Config(e.to_string()))?;

        if config.draw_start > config.draw_end {
            return Err(EmulatorError::Config(format!(
                "draw_start ({}) is past draw_end ({})",
                config.draw_start, config.draw_end
            )));
        }

        Ok(config)
    }

    /// Load settings from a TOML file
    ///
    /// # Errors
    ///
    /// `EmulatorError::Io` if the file cannot be read, `EmulatorError::Config`
    /// if it does not parse.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded renderer config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Serialize settings back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| EmulatorError::Config(e.to_string()))
    }

    /// Whether the triangle with running index `index` should be drawn
    #[inline]
    pub fn draws_triangle(&self, index: u32) -> bool {
        index >= self.draw_start && index < self.draw_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = RendererConfig::from_toml_str("hw_rasterizer = true").unwrap_err();
        assert!(matches!(err, EmulatorError::Config(_)));
    }

    #[test]
    fn test_inverted_draw_range_rejected() {
        let err = RendererConfig::from_toml_str("draw_start = 10\ndraw_end = 5").unwrap_err();
        assert!(matches!(err, EmulatorError::Config(_)));
    }

    #[test]
    fn test_draw_range() {
        let config = RendererConfig {
            draw_start: 2,
            draw_end: 4,
            ..Default::default()
        };
        assert!(!config.draws_triangle(1));
        assert!(config.draws_triangle(2));
        assert!(config.draws_triangle(3));
        assert!(!config.draws_triangle(4));
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let config = RendererConfig {
            early_z: false,
            efb_copies: false,
            ..Default::default()
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = RendererConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
