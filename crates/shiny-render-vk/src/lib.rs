// SPDX-License-Identifier: CEPL-1.0
//! Vulkan deferred renderer.
//!
//! [`VkRenderer`] is the `shiny_render::Renderer` entry point. Everything
//! below it talks to the device through [`gpu::Gpu`], so the frame logic runs
//! unchanged against the recording double in tests.

pub mod adapter;
pub mod attachments;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod handles;
pub mod mesh;
pub mod pipelines;
pub mod swapchain;
pub mod texture;
pub mod transfer;

#[cfg(test)]
mod mock;

use std::sync::Arc;

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use shiny_render::{
    FrameView, ImageData, MeshData, MeshId, PointLight, RenderSettings, RenderSize, Renderer,
};
use tracing::{info, warn};

use crate::context::RenderContext;
use crate::deferred::DeferredRenderer;
use crate::device::AshGpu;
use crate::error::SetupError;
use crate::pipelines::ShaderBlobs;

pub use crate::error::RenderResult;

fn open_device(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    settings: &RenderSettings,
) -> Result<AshGpu, SetupError> {
    if settings.validation {
        return AshGpu::new(window, display, true);
    }
    if !cfg!(debug_assertions) {
        return AshGpu::new(window, display, false);
    }
    // debug builds ask for validation but don't insist on it
    match AshGpu::new(window, display, true) {
        Err(SetupError::MissingValidationLayer(layer)) => {
            warn!("{layer} not installed, continuing without validation");
            AshGpu::new(window, display, false)
        }
        other => other,
    }
}

pub struct VkRenderer {
    inner: DeferredRenderer,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let gpu = open_device(window, display, settings).context("vulkan device setup")?;
        let ctx = RenderContext::new(Arc::new(gpu)).context("render context")?;
        let shaders = ShaderBlobs::load(&settings.shaders).context("loading shaders")?;
        let inner = DeferredRenderer::new(ctx, shaders, size, settings)?;
        let extent = inner.chain().extent();
        info!(
            "Vulkan renderer ready ({}x{}, fmt {:?})",
            extent.width,
            extent.height,
            inner.chain().format()
        );
        Ok(Self { inner })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.inner.resize(size);
        Ok(())
    }

    /// Staleness never surfaces here; every error is fatal.
    fn render(&mut self, view: &FrameView) -> Result<()> {
        Ok(self.inner.draw_frame(view)?)
    }

    fn upload_mesh(
        &mut self,
        mesh: &MeshData,
        diffuse: &ImageData,
        normal: &ImageData,
        model: [[f32; 4]; 4],
    ) -> Result<MeshId> {
        self.inner
            .add_mesh(mesh, diffuse, normal, model)
            .context("uploading mesh")
    }

    fn set_mesh_transform(&mut self, id: MeshId, model: [[f32; 4]; 4]) {
        self.inner.set_mesh_transform(id, model);
    }

    fn set_lights(&mut self, lights: &[PointLight]) {
        self.inner.set_lights(lights);
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.inner.set_clear_color(rgba);
    }

    fn set_debug_display(&mut self, on: bool) {
        self.inner.set_debug_display(on);
    }
}
