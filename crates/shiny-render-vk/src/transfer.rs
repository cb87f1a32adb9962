// SPDX-License-Identifier: CEPL-1.0
//! Staging uploads, image layout transitions and mipmap generation.
//!
//! Every transfer runs in a one-shot command buffer on the graphics queue
//! and blocks on `queue_wait_idle`. Assets are load-time only.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::context::RenderContext;
use crate::error::TransferError;
use crate::gpu::{has_stencil, Gpu};
use crate::handles::{Buffer, CommandBuffers, CommandPool, Image};

/// Stage and access masks for one supported layout change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl LayoutTransition {
    /// Only three transitions exist: `Undefined -> TransferDst`,
    /// `TransferDst -> ShaderReadOnly` and `Undefined -> DepthStencilAttachment`.
    pub fn resolve(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self, TransferError> {
        use vk::ImageLayout as L;
        let t = match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Self {
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
            },
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Self {
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
            },
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Self {
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            },
            _ => return Err(TransferError::UnsupportedLayoutTransition { old, new }),
        };
        Ok(t)
    }
}

/// Aspect mask for an image entering `layout` with `format`.
pub fn aspect_for(format: vk::Format, layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// `floor(log2(max(w, h))) + 1`.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Records the barrier for one supported transition over every mip level.
pub fn record_transition(
    gpu: &dyn Gpu,
    cmd: vk::CommandBuffer,
    image: &Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<(), TransferError> {
    let t = LayoutTransition::resolve(old, new)?;
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.raw())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect_for(image.format(), new),
            base_mip_level: 0,
            level_count: image.mip_levels(),
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(t.src_access)
        .dst_access_mask(t.dst_access);
    unsafe { gpu.cmd_pipeline_barrier(cmd, t.src_stage, t.dst_stage, &[barrier]) };
    Ok(())
}

/// Blits level `i - 1` into level `i` for every level, leaving the whole
/// image in `SHADER_READ_ONLY_OPTIMAL`. Expects every level in
/// `TRANSFER_DST_OPTIMAL` with level 0 filled.
fn record_mipmaps(gpu: &dyn Gpu, cmd: vk::CommandBuffer, image: &Image) {
    let extent = image.extent();
    let levels = image.mip_levels();
    let level_barrier = |level: u32,
                         old: vk::ImageLayout,
                         new: vk::ImageLayout,
                         src_access: vk::AccessFlags,
                         dst_access: vk::AccessFlags| {
        vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.raw())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: level,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
    };
    let layer = |level: u32| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: level,
        base_array_layer: 0,
        layer_count: 1,
    };
    let corner = |(w, h): (u32, u32)| vk::Offset3D {
        x: w as i32,
        y: h as i32,
        z: 1,
    };

    for level in 1..levels {
        let src = level - 1;
        unsafe {
            gpu.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                &[level_barrier(
                    src,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::TRANSFER_READ,
                )],
            );

            let blit = vk::ImageBlit {
                src_subresource: layer(src),
                src_offsets: [
                    vk::Offset3D::default(),
                    corner(mip_extent(extent.width, extent.height, src)),
                ],
                dst_subresource: layer(level),
                dst_offsets: [
                    vk::Offset3D::default(),
                    corner(mip_extent(extent.width, extent.height, level)),
                ],
            };
            gpu.cmd_blit_image(
                cmd,
                image.raw(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );

            gpu.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[level_barrier(
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::AccessFlags::SHADER_READ,
                )],
            );
        }
    }

    // last level was only ever written
    unsafe {
        gpu.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[level_barrier(
                levels - 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            )],
        );
    }
}

pub struct TransferEngine {
    pool: CommandPool,
    gpu: Arc<dyn Gpu>,
    queue: vk::Queue,
}

impl TransferEngine {
    pub fn new(ctx: &RenderContext) -> Result<Self, TransferError> {
        let gpu = ctx.gpu();
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.families.graphics)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = CommandPool::new(gpu, &info).map_err(|e| TransferError::vk("create_command_pool", e))?;
        Ok(Self {
            pool,
            gpu: Arc::clone(gpu),
            queue: gpu.graphics_queue(),
        })
    }

    /// Records `record` into a fresh command buffer, submits it and waits
    /// for the queue to drain. The command buffer is freed on return.
    pub fn one_shot<F>(&self, record: F) -> Result<(), TransferError>
    where
        F: FnOnce(&dyn Gpu, vk::CommandBuffer) -> Result<(), TransferError>,
    {
        let gpu = self.gpu.as_ref();
        let cmds = CommandBuffers::allocate(&self.gpu, &self.pool, 1)
            .map_err(|e| TransferError::vk("allocate_command_buffers", e))?;
        let cmd = cmds.get(0);
        let begin = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            gpu.begin_command_buffer(cmd, &begin)
                .map_err(|e| TransferError::vk("begin_command_buffer", e))?;
        }
        record(gpu, cmd)?;
        unsafe {
            gpu.end_command_buffer(cmd)
                .map_err(|e| TransferError::vk("end_command_buffer", e))?;
            let bufs = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&bufs);
            gpu.queue_submit(self.queue, &[submit], vk::Fence::null())
                .map_err(|e| TransferError::vk("queue_submit", e))?;
            gpu.queue_wait_idle(self.queue)
                .map_err(|e| TransferError::vk("queue_wait_idle", e))?;
        }
        Ok(())
    }

    /// Copies `bytes` into a new device-local buffer with
    /// `TRANSFER_DST | usage`. The staging buffer is gone on return.
    pub fn upload_buffer(
        &self,
        ctx: &RenderContext,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer, TransferError> {
        if bytes.is_empty() {
            return Err(TransferError::EmptyUpload("buffer"));
        }
        let size = bytes.len() as vk::DeviceSize;
        let staging = Buffer::new_mapped(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write(0, bytes);

        let dst = Buffer::new(
            ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.one_shot(|gpu, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { gpu.cmd_copy_buffer(cmd, staging.raw(), dst.raw(), &[region]) };
            Ok(())
        })?;
        debug!("uploaded {} bytes ({:?})", size, usage);
        Ok(dst)
    }

    /// Fills level 0 of `image` from tightly packed `pixels`, then either
    /// builds the mip chain or transitions straight to shader-read.
    pub fn upload_image(
        &self,
        ctx: &RenderContext,
        image: &Image,
        pixels: &[u8],
    ) -> Result<(), TransferError> {
        if pixels.is_empty() {
            return Err(TransferError::EmptyUpload("image"));
        }
        let mipmapped = image.mip_levels() > 1;
        if mipmapped {
            let features = self.gpu.format_properties(image.format()).optimal_tiling_features;
            if !features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
                return Err(TransferError::LinearBlitUnsupported(image.format()));
            }
        }

        let size = pixels.len() as vk::DeviceSize;
        let staging = Buffer::new_mapped(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write(0, pixels);
        let extent = image.extent();

        self.one_shot(|gpu, cmd| {
            record_transition(
                gpu,
                cmd,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            unsafe {
                gpu.cmd_copy_buffer_to_image(
                    cmd,
                    staging.raw(),
                    image.raw(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
            if mipmapped {
                record_mipmaps(gpu, cmd, image);
                Ok(())
            } else {
                record_transition(
                    gpu,
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            }
        })
    }

    /// Stand-alone transition, e.g. a fresh depth image to attachment layout.
    pub fn transition(
        &self,
        image: &Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<(), TransferError> {
        // fail before touching the device
        LayoutTransition::resolve(old, new)?;
        self.one_shot(|gpu, cmd| record_transition(gpu, cmd, image, old, new))
    }
}
