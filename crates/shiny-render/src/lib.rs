// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPolicy {
    /// Mailbox, then immediate, then FIFO.
    #[default]
    LowLatency,
    /// Always FIFO.
    Fifo,
}

/// Paths to the precompiled SPIR-V blobs used by the three pipelines.
#[derive(Clone, Debug)]
pub struct ShaderPaths {
    pub offscreen_vert: PathBuf,
    pub offscreen_frag: PathBuf,
    pub composition_vert: PathBuf,
    pub composition_frag: PathBuf,
    pub debug_vert: PathBuf,
    pub debug_frag: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        let dir = PathBuf::from("assets/shaders");
        Self {
            offscreen_vert: dir.join("mrt.vert.spv"),
            offscreen_frag: dir.join("mrt.frag.spv"),
            composition_vert: dir.join("deferred.vert.spv"),
            composition_frag: dir.join("deferred.frag.spv"),
            debug_vert: dir.join("debug.vert.spv"),
            debug_frag: dir.join("debug.frag.spv"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub present: PresentPolicy,
    pub debug_display: bool,
    pub validation: bool,
    pub shaders: ShaderPaths,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            present: PresentPolicy::LowLatency,
            debug_display: false,
            validation: cfg!(debug_assertions),
            shaders: ShaderPaths::default(),
        }
    }
}

/// Interleaved vertex as consumed by the geometry pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

/// Geometry handed over by the scene-file collaborator.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Decoded RGBA8 pixels handed over by the image collaborator.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// A 1x1 image of a single color. Used as a flat normal map or a
    /// white diffuse when a material has no texture of that kind.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub radius: f32,
}

/// Camera matrices for one frame, column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameView {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub eye: [f32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    /// Out-of-date or suboptimal presentation is handled internally; an
    /// `Err` means the renderer cannot continue.
    fn render(&mut self, view: &FrameView) -> Result<()>;

    fn upload_mesh(
        &mut self,
        mesh: &MeshData,
        diffuse: &ImageData,
        normal: &ImageData,
        model: [[f32; 4]; 4],
    ) -> Result<MeshId>;
    fn set_mesh_transform(&mut self, id: MeshId, model: [[f32; 4]; 4]);

    fn set_lights(&mut self, lights: &[PointLight]);
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_debug_display(&mut self, _on: bool) {}
}
