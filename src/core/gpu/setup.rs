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

//! Primitive setup
//!
//! Assembles the vertex stream of one draw into triangles and lines. Three
//! vertex slots are shared by every topology; a pointer table maps the
//! logical window positions onto slots and is rotated after each emitted
//! primitive so strips and fans reuse vertices without copying.

use super::types::{OutputVertexData, Primitive};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A primitive ready for clipping, as vertex slot indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembled {
    Triangle([usize; 3]),
    Line([usize; 2]),
}

/// Vertex window state
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct SetupUnit {
    primitive: Primitive,
    vertex_counter: u32,
    vertices: [OutputVertexData; 3],
    pointers: [usize; 3],
    write_pointer: usize,
}

impl SetupUnit {
    pub fn new() -> Self {
        Self {
            primitive: Primitive::Triangles,
            vertex_counter: 0,
            vertices: [OutputVertexData::default(); 3],
            pointers: [0, 1, 2],
            write_pointer: 0,
        }
    }

    /// Start a new draw
    pub fn init(&mut self, primitive: Primitive) {
        self.primitive = primitive;
        self.vertex_counter = 0;
        self.pointers = [0, 1, 2];
        self.write_pointer = 0;
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Slot the next vertex is written to
    #[inline]
    pub fn write_slot(&self) -> usize {
        self.write_pointer
    }

    #[inline]
    pub fn vertex(&self, slot: usize) -> &OutputVertexData {
        &self.vertices[slot]
    }

    /// Store the next vertex and advance the window
    pub fn push_vertex(&mut self, vertex: OutputVertexData) -> Option<Assembled> {
        self.vertices[self.write_pointer] = vertex;
        self.setup_vertex()
    }

    fn setup_vertex(&mut self) -> Option<Assembled> {
        match self.primitive {
            Primitive::Quads => self.setup_quad(),
            Primitive::Quads2 => {
                log::warn!("Quads2 primitive drawn as quads");
                self.setup_quad()
            }
            Primitive::Triangles => self.setup_triangle(),
            Primitive::TriangleStrip => self.setup_tri_strip(),
            Primitive::TriangleFan => self.setup_tri_fan(),
            Primitive::Lines => self.setup_line(),
            Primitive::LineStrip => self.setup_line_strip(),
            Primitive::Points => None,
        }
    }

    /// Below `needed` vertices, only move the write pointer
    #[inline]
    fn fill(&mut self, needed: u32) -> bool {
        if self.vertex_counter < needed {
            self.vertex_counter += 1;
            self.write_pointer = self.pointers[self.vertex_counter as usize];
            return true;
        }
        false
    }

    #[inline]
    fn triangle(&self) -> Assembled {
        Assembled::Triangle(self.pointers)
    }

    fn setup_quad(&mut self) -> Option<Assembled> {
        if self.fill(2) {
            return None;
        }
        let tri = self.triangle();

        self.vertex_counter = (self.vertex_counter + 1) & 3;
        self.write_pointer = (self.vertex_counter & 1) as usize;
        self.pointers.swap(1, 2);

        Some(tri)
    }

    fn setup_triangle(&mut self) -> Option<Assembled> {
        if self.fill(2) {
            return None;
        }
        let tri = self.triangle();

        self.vertex_counter = 0;
        self.write_pointer = self.pointers[0];

        Some(tri)
    }

    fn setup_tri_strip(&mut self) -> Option<Assembled> {
        if self.fill(2) {
            return None;
        }
        let tri = self.triangle();

        self.vertex_counter += 1;
        self.pointers[2 - (self.vertex_counter & 1) as usize] = self.pointers[0];
        self.write_pointer = self.pointers[0];
        self.pointers[0] = ((self.vertex_counter + 1) % 3) as usize;

        Some(tri)
    }

    fn setup_tri_fan(&mut self) -> Option<Assembled> {
        if self.fill(2) {
            return None;
        }
        let tri = self.triangle();

        self.vertex_counter += 1;
        self.pointers[1] = self.pointers[2];
        self.pointers[2] = 2 - (self.vertex_counter & 1) as usize;
        self.write_pointer = self.pointers[2];

        Some(tri)
    }

    fn setup_line(&mut self) -> Option<Assembled> {
        if self.fill(1) {
            return None;
        }
        let line = Assembled::Line([self.pointers[0], self.pointers[1]]);

        self.vertex_counter = 0;
        self.write_pointer = self.pointers[0];

        Some(line)
    }

    fn setup_line_strip(&mut self) -> Option<Assembled> {
        if self.fill(1) {
            return None;
        }
        self.vertex_counter += 1;
        let line = Assembled::Line([self.pointers[0], self.pointers[1]]);

        self.write_pointer = self.pointers[0];
        self.pointers[0] = self.pointers[1];
        self.pointers[1] = self.write_pointer;

        Some(line)
    }
}

impl Default for SetupUnit {
    fn default() -> Self {
        Self::new()
    }
}
