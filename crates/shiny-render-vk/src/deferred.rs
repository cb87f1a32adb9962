// SPDX-License-Identifier: CEPL-1.0
//! The deferred renderer: owns every GPU object of a session and drives the
//! acquire / offscreen / composition / present loop.
//!
//! Fields are declared in reverse creation order, so dropping the renderer
//! tears everything down in reverse once `Drop` has drained the GPU.

use ash::vk;
use shiny_render::{FrameView, ImageData, MeshData, MeshId, PointLight, RenderSettings, RenderSize};
use tracing::{debug, info, warn};

use crate::attachments::RenderTargets;
use crate::context::RenderContext;
use crate::descriptors::{DescriptorArena, FrameUniforms, MAX_DRAWABLES};
use crate::error::{RenderError, RenderResult};
use crate::frame::{record_composition, record_offscreen, submit, DrawInputs, Frames, MAX_FRAMES_IN_FLIGHT};
use crate::mesh::{Mesh, ScreenQuads};
use crate::pipelines::{PipelineBase, Pipelines, ShaderBlobs};
use crate::swapchain::{Acquired, ChainState, ChainStatus, PresentationChain, StaleReason};
use crate::transfer::TransferEngine;

/// Objects that embed the chain's extent or format.
struct Generation {
    pipelines: Pipelines,
    targets: RenderTargets,
}

impl Generation {
    fn new(
        ctx: &RenderContext,
        transfer: &TransferEngine,
        chain: &PresentationChain,
        base: &PipelineBase,
        shaders: &ShaderBlobs,
    ) -> RenderResult<Self> {
        let targets = RenderTargets::new(ctx, transfer, chain)?;
        let pipelines = Pipelines::new(ctx, base, shaders, &targets)?;
        Ok(Self { pipelines, targets })
    }
}

pub struct DeferredRenderer {
    meshes: Vec<Mesh>,
    frames: Frames,
    quads: ScreenQuads,
    frame_uniforms: Vec<FrameUniforms>,
    descriptors: DescriptorArena,
    generation: Option<Generation>,
    base: PipelineBase,
    transfer: TransferEngine,
    chain: PresentationChain,
    ctx: RenderContext,

    shaders: ShaderBlobs,
    lights: Vec<PointLight>,
    clear_color: [f32; 4],
    debug_display: bool,
    size: RenderSize,
    stale: Option<StaleReason>,
}

impl DeferredRenderer {
    pub fn new(
        ctx: RenderContext,
        shaders: ShaderBlobs,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> RenderResult<Self> {
        let chain = PresentationChain::new(&ctx, size, settings.present)?;
        let transfer = TransferEngine::new(&ctx)?;
        let base = PipelineBase::new(&ctx)?;
        let generation = Generation::new(&ctx, &transfer, &chain, &base, &shaders)?;

        let descriptors = DescriptorArena::new(&ctx, base.set_layout(), MAX_FRAMES_IN_FLIGHT as u32)?;
        let sets = descriptors.allocate(ctx.gpu().as_ref(), MAX_FRAMES_IN_FLIGHT)?;
        let frame_uniforms = sets
            .into_iter()
            .map(|set| {
                let uniforms = FrameUniforms::new(&ctx, set)?;
                uniforms.write_gbuffer(generation.targets.gbuffer());
                Ok(uniforms)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let quads = ScreenQuads::new(&ctx, &transfer)?;
        let frames = Frames::new(&ctx)?;

        info!(
            "deferred renderer ready: {}x{}, {} frames in flight",
            chain.extent().width,
            chain.extent().height,
            MAX_FRAMES_IN_FLIGHT
        );
        Ok(Self {
            frames,
            meshes: Vec::new(),
            quads,
            frame_uniforms,
            descriptors,
            generation: Some(generation),
            base,
            transfer,
            chain,
            ctx,
            shaders,
            lights: Vec::new(),
            clear_color: settings.clear_color,
            debug_display: settings.debug_display,
            size,
            stale: None,
        })
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    pub fn add_mesh(
        &mut self,
        data: &MeshData,
        diffuse: &ImageData,
        normal: &ImageData,
        model: [[f32; 4]; 4],
    ) -> RenderResult<MeshId> {
        if self.meshes.len() >= MAX_DRAWABLES as usize {
            return Err(RenderError::TooManyDrawables { max: MAX_DRAWABLES });
        }
        let set = self
            .descriptors
            .allocate(self.ctx.gpu().as_ref(), 1)?
            .pop()
            .ok_or(RenderError::vk(
                "allocate_descriptor_sets",
                vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            ))?;
        let mesh = Mesh::new(&self.ctx, &self.transfer, set, data, diffuse, normal, model)?;
        self.meshes.push(mesh);
        Ok(MeshId(self.meshes.len() - 1))
    }

    pub fn set_mesh_transform(&mut self, id: MeshId, model: [[f32; 4]; 4]) {
        match self.meshes.get(id.0) {
            Some(mesh) => mesh.set_transform(model),
            None => warn!("set_mesh_transform: no mesh {:?}", id),
        }
    }

    pub fn set_lights(&mut self, lights: &[PointLight]) {
        self.lights = lights.to_vec();
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn set_debug_display(&mut self, on: bool) {
        if on != self.debug_display {
            info!("debug display {}", if on { "on" } else { "off" });
        }
        self.debug_display = on;
    }

    pub fn is_paused(&self) -> bool {
        self.size.is_zero()
    }

    /// A zero size pauses rendering; the rebuild waits for a real size.
    pub fn resize(&mut self, size: RenderSize) {
        if size == self.size {
            return;
        }
        debug!("resize to {}x{}", size.width, size.height);
        self.size = size;
        self.chain.mark_stale(StaleReason::Resized);
        self.stale.get_or_insert(StaleReason::Resized);
    }

    fn note_stale(&mut self, reason: StaleReason) {
        self.stale.get_or_insert(reason);
    }

    /// Idles the device, drops everything that embeds the old extent or
    /// format, swaps the chain and rebuilds the dependents.
    fn rebuild(&mut self) -> RenderResult<()> {
        let reason = self.stale.take().unwrap_or(StaleReason::OutOfDate);
        unsafe { self.ctx.gpu().device_wait_idle() }
            .map_err(|e| RenderError::vk("device_wait_idle", e))?;

        self.generation = None;
        self.chain.rebuild(&self.ctx, self.size)?;
        let generation = Generation::new(&self.ctx, &self.transfer, &self.chain, &self.base, &self.shaders)?;
        for uniforms in &self.frame_uniforms {
            uniforms.write_gbuffer(generation.targets.gbuffer());
        }
        self.generation = Some(generation);
        self.frames.recreate_sync()?;

        let extent = self.chain.extent();
        info!(
            "presentation chain rebuilt ({reason}): {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    /// Renders and presents one frame. Staleness is handled here and never
    /// reaches the caller; a frame that hits it is dropped.
    pub fn draw_frame(&mut self, view: &FrameView) -> RenderResult<()> {
        if self.is_paused() {
            return Ok(());
        }
        if self.chain.state() == ChainState::Stale || self.generation.is_none() {
            self.rebuild()?;
        }

        self.frames.wait_current()?;
        let image_available = self.frames.sync().image_available;
        let image_index = match self.chain.acquire(image_available)? {
            Acquired::Image(index) => index,
            Acquired::Stale(reason) => {
                self.note_stale(reason);
                return self.rebuild();
            }
        };
        self.frames.reset_current()?;

        let slot = self.frames.current();
        let uniforms = &self.frame_uniforms[slot];
        uniforms.update(view, &self.lights);

        let Some(generation) = self.generation.as_ref() else {
            return Ok(());
        };
        let inputs = DrawInputs {
            targets: &generation.targets,
            pipelines: &generation.pipelines,
            layout: self.base.layout(),
            global_set: uniforms.set(),
            meshes: &self.meshes,
            quads: &self.quads,
            clear_color: self.clear_color,
            debug_display: self.debug_display,
        };
        let gpu = self.ctx.gpu().as_ref();
        let sync = self.frames.sync();

        let offscreen = self.frames.offscreen_cmd();
        record_offscreen(gpu, offscreen, &inputs)?;
        submit(
            gpu,
            offscreen,
            sync.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            sync.offscreen_complete,
            vk::Fence::null(),
        )?;

        let composition = self.frames.composition_cmd();
        record_composition(gpu, composition, &inputs, image_index)?;
        submit(
            gpu,
            composition,
            sync.offscreen_complete,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            sync.render_complete,
            sync.fence,
        )?;
        self.frames.mark_submitted();

        let status = self.chain.present(image_index, sync.render_complete)?;
        self.frames.advance();
        if let ChainStatus::Stale(reason) = status {
            self.note_stale(reason);
            self.rebuild()?;
        }
        Ok(())
    }
}

impl Drop for DeferredRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.frames.wait_all() {
            warn!("waiting for frames in flight at teardown: {e}");
        }
        if let Err(e) = unsafe { self.ctx.gpu().device_wait_idle() } {
            warn!("device_wait_idle at teardown: {e}");
        }
        debug!("deferred renderer torn down");
    }
}
