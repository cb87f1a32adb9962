// SPDX-License-Identifier: CEPL-1.0
//! Descriptor pool and uniform data for the two descriptor scopes.
//!
//! Frame-global sets (one per frame in flight) carry the camera UBO, the
//! G-buffer samplers and the lights UBO. Their buffers stay mapped; only the
//! contents change per frame. The G-buffer bindings are rewritten after a
//! chain rebuild because the attachments are recreated.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use shiny_render::{FrameView, PointLight};
use tracing::{debug, warn};

use crate::attachments::GBuffer;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::gpu::Gpu;
use crate::handles::{Buffer, DescriptorPool};
use crate::pipelines::{BINDING_FRAGMENT_UBO, BINDING_SAMPLERS, BINDING_VERTEX_UBO};
use crate::texture::Texture;

pub const MAX_LIGHTS: usize = 6;
/// Per-drawable sets the pool can hand out.
pub const MAX_DRAWABLES: u32 = 64;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4],
}

/// std140 light: vec4 position, vec3 color packed with the radius.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    pub position: [f32; 4],
    pub color: [f32; 3],
    pub radius: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightsUniform {
    pub lights: [LightUniform; MAX_LIGHTS],
    pub view_pos: [f32; 4],
}

impl LightsUniform {
    /// Unused slots keep a zero radius and contribute nothing.
    pub fn new(lights: &[PointLight], eye: [f32; 3]) -> Self {
        if lights.len() > MAX_LIGHTS {
            warn!("{} lights given, only {} are shaded", lights.len(), MAX_LIGHTS);
        }
        let mut out = Self {
            view_pos: [eye[0], eye[1], eye[2], 1.0],
            ..Self::default()
        };
        for (slot, light) in out.lights.iter_mut().zip(lights) {
            *slot = LightUniform {
                position: [light.position[0], light.position[1], light.position[2], 1.0],
                color: light.color,
                radius: light.radius,
            };
        }
        out
    }
}

/// The one descriptor pool. Sets are freed with it, never individually.
pub struct DescriptorArena {
    pool: DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
}

impl DescriptorArena {
    pub fn new(
        ctx: &RenderContext,
        set_layout: vk::DescriptorSetLayout,
        frames: u32,
    ) -> RenderResult<Self> {
        let sets = frames + MAX_DRAWABLES;
        // every set uses the full five-binding layout
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: sets * 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: sets * 3,
            },
        ];
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(sets);
        let pool = DescriptorPool::new(ctx.gpu(), &info)
            .map_err(|e| RenderError::vk("create_descriptor_pool", e))?;
        debug!("descriptor pool for {} sets", sets);
        Ok(Self { pool, set_layout })
    }

    pub fn allocate(&self, gpu: &dyn Gpu, count: usize) -> RenderResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![self.set_layout; count];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool.raw())
            .set_layouts(&layouts);
        unsafe { gpu.allocate_descriptor_sets(&info) }
            .map_err(|e| RenderError::vk("allocate_descriptor_sets", e))
    }
}

fn buffer_info(buffer: &Buffer) -> [vk::DescriptorBufferInfo; 1] {
    [vk::DescriptorBufferInfo {
        buffer: buffer.raw(),
        offset: 0,
        range: buffer.size(),
    }]
}

/// Points a per-drawable set at its model UBO and its two textures.
pub fn write_drawable_set(
    gpu: &dyn Gpu,
    set: vk::DescriptorSet,
    model: &Buffer,
    diffuse: &Texture,
    normal: &Texture,
) {
    let model_info = buffer_info(model);
    let diffuse_info = [diffuse.descriptor()];
    let normal_info = [normal.descriptor()];
    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(BINDING_VERTEX_UBO)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&model_info),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(BINDING_SAMPLERS[0])
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&diffuse_info),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(BINDING_SAMPLERS[1])
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&normal_info),
    ];
    unsafe { gpu.update_descriptor_sets(&writes) };
}

/// Frame-global uniforms and set for one frame in flight.
pub struct FrameUniforms {
    set: vk::DescriptorSet,
    lights: Buffer,
    scene: Buffer,
    gpu: Arc<dyn Gpu>,
}

impl FrameUniforms {
    pub fn new(ctx: &RenderContext, set: vk::DescriptorSet) -> RenderResult<Self> {
        let usage = vk::BufferUsageFlags::UNIFORM_BUFFER;
        let scene = Buffer::new_mapped(ctx, size_of::<SceneUniform>() as vk::DeviceSize, usage)?;
        let lights = Buffer::new_mapped(ctx, size_of::<LightsUniform>() as vk::DeviceSize, usage)?;
        scene.write(0, &[SceneUniform::default()]);
        lights.write(0, &[LightsUniform::default()]);

        let scene_info = buffer_info(&scene);
        let lights_info = buffer_info(&lights);
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(BINDING_VERTEX_UBO)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&scene_info),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(BINDING_FRAGMENT_UBO)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&lights_info),
        ];
        unsafe { ctx.gpu().update_descriptor_sets(&writes) };

        Ok(Self {
            set,
            lights,
            scene,
            gpu: Arc::clone(ctx.gpu()),
        })
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Binds the three G-buffer color attachments as samplers 1..=3.
    pub fn write_gbuffer(&self, gbuffer: &GBuffer) {
        let images = gbuffer.color_descriptors();
        let infos: Vec<[vk::DescriptorImageInfo; 1]> = images.iter().map(|i| [*i]).collect();
        let writes: Vec<vk::WriteDescriptorSet<'_>> = BINDING_SAMPLERS
            .iter()
            .zip(&infos)
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info)
            })
            .collect();
        unsafe { self.gpu.update_descriptor_sets(&writes) };
    }

    /// Only call once this frame's fence has signaled.
    pub fn update(&self, view: &FrameView, lights: &[PointLight]) {
        self.scene.write(
            0,
            &[SceneUniform {
                projection: view.projection,
                view: view.view,
            }],
        );
        self.lights.write(0, &[LightsUniform::new(lights, view.eye)]);
    }
}
