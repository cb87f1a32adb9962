// SPDX-License-Identifier: CEPL-1.0
use std::mem::size_of;

use ash::vk;
use shiny_render::{ImageData, MeshData, Vertex};
use tracing::debug;

use crate::context::RenderContext;
use crate::descriptors::{write_drawable_set, ModelUniform};
use crate::error::{RenderResult, TransferError};
use crate::gpu::Gpu;
use crate::handles::Buffer;
use crate::pipelines::SET_DRAWABLE;
use crate::texture::Texture;
use crate::transfer::TransferEngine;

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// One uploaded drawable: geometry, textures and its per-drawable set.
pub struct Mesh {
    set: vk::DescriptorSet,
    normal: Texture,
    diffuse: Texture,
    uniform: Buffer,
    indices: Buffer,
    vertices: Buffer,
    index_count: u32,
}

impl Mesh {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &RenderContext,
        transfer: &TransferEngine,
        set: vk::DescriptorSet,
        data: &MeshData,
        diffuse: &ImageData,
        normal: &ImageData,
        model: [[f32; 4]; 4],
    ) -> RenderResult<Self> {
        if data.indices.is_empty() {
            return Err(TransferError::EmptyUpload("index buffer").into());
        }
        if let Some(&index) = data
            .indices
            .iter()
            .find(|&&i| i as usize >= data.vertices.len())
        {
            return Err(TransferError::IndexOutOfRange {
                index,
                vertex_count: data.vertices.len(),
            }
            .into());
        }
        let vertices = transfer.upload_buffer(
            ctx,
            bytemuck::cast_slice(&data.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let indices = transfer.upload_buffer(
            ctx,
            bytemuck::cast_slice(&data.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let uniform = Buffer::new_mapped(
            ctx,
            size_of::<ModelUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        uniform.write(0, &[ModelUniform { model }]);

        let diffuse = Texture::from_rgba(ctx, transfer, diffuse)?;
        let normal = Texture::from_rgba(ctx, transfer, normal)?;
        write_drawable_set(ctx.gpu().as_ref(), set, &uniform, &diffuse, &normal);

        debug!(
            "mesh: {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );
        Ok(Self {
            set,
            normal,
            diffuse,
            uniform,
            indices,
            vertices,
            index_count: data.indices.len() as u32,
        })
    }

    /// Host-coherent write; visible to the next submitted frame.
    pub fn set_transform(&self, model: [[f32; 4]; 4]) {
        self.uniform.write(0, &[ModelUniform { model }]);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Expects the offscreen pipeline and the frame-global set bound.
    pub fn record(&self, gpu: &dyn Gpu, cmd: vk::CommandBuffer, layout: vk::PipelineLayout) {
        unsafe {
            gpu.cmd_bind_descriptor_sets(cmd, layout, SET_DRAWABLE, &[self.set]);
            gpu.cmd_bind_vertex_buffers(cmd, &[self.vertices.raw()]);
            gpu.cmd_bind_index_buffer(cmd, self.indices.raw());
            gpu.cmd_draw_indexed(cmd, self.index_count, 1, 0);
        }
    }
}

/// Debug tiles: position, normal and albedo in three screen quarters. The
/// channel to show is carried in `pos.z`.
pub fn debug_quads() -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(12);
    let mut indices = Vec::with_capacity(18);
    for channel in 0..3u32 {
        let x = -1.0 + (channel % 2) as f32;
        let y = -1.0 + (channel / 2) as f32;
        let z = channel as f32;
        let corners = [
            ([x, y], [0.0, 0.0]),
            ([x + 1.0, y], [1.0, 0.0]),
            ([x + 1.0, y + 1.0], [1.0, 1.0]),
            ([x, y + 1.0], [0.0, 1.0]),
        ];
        for (pos, uv) in corners {
            vertices.push(Vertex {
                pos: [pos[0], pos[1], z],
                uv,
                color: [1.0; 3],
                normal: [0.0, 0.0, 1.0],
                ..Vertex::default()
            });
        }
        let base = channel * 4;
        indices.extend(QUAD_INDICES.iter().map(|i| base + i));
    }
    (vertices, indices)
}

/// Fixed geometry for the composition and debug draws.
pub struct ScreenQuads {
    debug_indices: Buffer,
    debug_vertices: Buffer,
    fullscreen_indices: Buffer,
    debug_index_count: u32,
}

impl ScreenQuads {
    pub fn new(ctx: &RenderContext, transfer: &TransferEngine) -> Result<Self, TransferError> {
        let fullscreen_indices = transfer.upload_buffer(
            ctx,
            bytemuck::cast_slice(&QUAD_INDICES),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let (vertices, indices) = debug_quads();
        let debug_vertices = transfer.upload_buffer(
            ctx,
            bytemuck::cast_slice(&vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let debug_indices = transfer.upload_buffer(
            ctx,
            bytemuck::cast_slice(&indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        Ok(Self {
            debug_indices,
            debug_vertices,
            fullscreen_indices,
            debug_index_count: indices.len() as u32,
        })
    }

    /// Full-screen quad; positions come from the vertex index.
    pub fn record_fullscreen(&self, gpu: &dyn Gpu, cmd: vk::CommandBuffer) {
        unsafe {
            gpu.cmd_bind_index_buffer(cmd, self.fullscreen_indices.raw());
            gpu.cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0);
        }
    }

    pub fn record_debug(&self, gpu: &dyn Gpu, cmd: vk::CommandBuffer) {
        unsafe {
            gpu.cmd_bind_vertex_buffers(cmd, &[self.debug_vertices.raw()]);
            gpu.cmd_bind_index_buffer(cmd, self.debug_indices.raw());
            gpu.cmd_draw_indexed(cmd, self.debug_index_count, 1, 0);
        }
    }
}
