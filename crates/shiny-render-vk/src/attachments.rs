// SPDX-License-Identifier: CEPL-1.0
//! G-buffer attachments, the two render passes and their framebuffers.
//!
//! Everything here embeds the chain's extent or format and is rebuilt
//! with it. One G-buffer is shared by every frame in flight; the external
//! subpass dependency of the offscreen pass orders a frame's geometry
//! writes after the previous frame's composition reads on the same queue.

use ash::vk;
use tracing::debug;

use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::handles::{Framebuffer, Image, ImageView, RenderPass, Sampler};
use crate::swapchain::PresentationChain;
use crate::transfer::{aspect_for, TransferEngine};

pub const POSITION_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub const GBUFFER_COLOR_FORMATS: [vk::Format; 3] = [POSITION_FORMAT, NORMAL_FORMAT, ALBEDO_FORMAT];

/// Image, its memory and a 2D view. Drops view, then image, then memory.
pub struct Attachment {
    view: ImageView,
    image: Image,
}

impl Attachment {
    pub fn new(
        ctx: &RenderContext,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = Image::new(ctx, &info)?;
        let view = image
            .view(aspect)
            .map_err(|e| RenderError::vk("create_image_view", e))?;
        Ok(Self { view, image })
    }

    fn color(ctx: &RenderContext, format: vk::Format, extent: vk::Extent2D) -> RenderResult<Self> {
        Self::new(
            ctx,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            extent,
        )
    }

    fn depth(ctx: &RenderContext, transfer: &TransferEngine, extent: vk::Extent2D) -> RenderResult<Self> {
        let layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        let a = Self::new(
            ctx,
            ctx.depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect_for(ctx.depth_format, layout),
            extent,
        )?;
        transfer.transition(&a.image, vk::ImageLayout::UNDEFINED, layout)?;
        Ok(a)
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }

    pub fn image(&self) -> vk::Image {
        self.image.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}

/// Position, normal, albedo and depth, plus the sampler composition reads
/// the color channels through.
pub struct GBuffer {
    sampler: Sampler,
    depth: Attachment,
    albedo: Attachment,
    normal: Attachment,
    position: Attachment,
}

impl GBuffer {
    fn new(ctx: &RenderContext, transfer: &TransferEngine, extent: vk::Extent2D) -> RenderResult<Self> {
        let position = Attachment::color(ctx, POSITION_FORMAT, extent)?;
        let normal = Attachment::color(ctx, NORMAL_FORMAT, extent)?;
        let albedo = Attachment::color(ctx, ALBEDO_FORMAT, extent)?;
        let depth = Attachment::depth(ctx, transfer, extent)?;

        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_anisotropy(1.0)
            .min_lod(0.0)
            .max_lod(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
        let sampler = Sampler::new(ctx.gpu(), &info).map_err(|e| RenderError::vk("create_sampler", e))?;

        Ok(Self {
            sampler,
            depth,
            albedo,
            normal,
            position,
        })
    }

    /// Sampled views in binding order 1, 2, 3.
    pub fn color_descriptors(&self) -> [vk::DescriptorImageInfo; 3] {
        [&self.position, &self.normal, &self.albedo].map(|a| vk::DescriptorImageInfo {
            sampler: self.sampler.raw(),
            image_view: a.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    fn views(&self) -> [vk::ImageView; 4] {
        [
            self.position.view(),
            self.normal.view(),
            self.albedo.view(),
            self.depth.view(),
        ]
    }
}

/// Geometry pass: three color outputs plus depth in one subpass. Colors
/// end in `SHADER_READ_ONLY_OPTIMAL` for the composition pass.
pub fn offscreen_pass(ctx: &RenderContext) -> RenderResult<RenderPass> {
    let mut attachments: Vec<vk::AttachmentDescription> = GBUFFER_COLOR_FORMATS
        .iter()
        .map(|&format| vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..Default::default()
        })
        .collect();
    attachments.push(depth_description(ctx.depth_format));

    let color_refs = [0, 1, 2].map(|i| vk::AttachmentReference {
        attachment: i,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    });
    let depth_ref = vk::AttachmentReference {
        attachment: 3,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let dependencies = [
        // previous composition reads / depth writes before this frame's
        // writes; debug tiles sample outside their own pixel, so not by region
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        },
        // writes visible to the composition fragment shader
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            dependency_flags: vk::DependencyFlags::empty(),
        },
    ];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    RenderPass::new(ctx.gpu(), &info).map_err(|e| RenderError::vk("create_render_pass(offscreen)", e))
}

/// Composition pass: the swapchain image plus depth, ending in present layout.
pub fn composition_pass(ctx: &RenderContext, color_format: vk::Format) -> RenderResult<RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        depth_description(ctx.depth_format),
    ];
    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref)];
    // the depth attachment is shared by every frame in flight, so the
    // previous frame's depth writes come first
    let dependencies = [vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    }];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    RenderPass::new(ctx.gpu(), &info).map_err(|e| RenderError::vk("create_render_pass(composition)", e))
}

fn depth_description(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    }
}

fn framebuffer(
    ctx: &RenderContext,
    pass: &RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> RenderResult<Framebuffer> {
    let info = vk::FramebufferCreateInfo::default()
        .render_pass(pass.raw())
        .attachments(views)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    Framebuffer::new(ctx.gpu(), &info).map_err(|e| RenderError::vk("create_framebuffer", e))
}

/// Every object tied to one chain generation, in reverse creation order.
pub struct RenderTargets {
    composition_framebuffers: Vec<Framebuffer>,
    offscreen_framebuffer: Framebuffer,
    composition_pass: RenderPass,
    offscreen_pass: RenderPass,
    composition_depth: Attachment,
    gbuffer: GBuffer,
    extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn new(
        ctx: &RenderContext,
        transfer: &TransferEngine,
        chain: &PresentationChain,
    ) -> RenderResult<Self> {
        let extent = chain.extent();
        let gbuffer = GBuffer::new(ctx, transfer, extent)?;
        let composition_depth = Attachment::depth(ctx, transfer, extent)?;

        let offscreen_pass = offscreen_pass(ctx)?;
        let composition_pass = composition_pass(ctx, chain.format())?;

        let offscreen_framebuffer = framebuffer(ctx, &offscreen_pass, &gbuffer.views(), extent)?;
        let composition_framebuffers = chain
            .views()
            .map(|view| framebuffer(ctx, &composition_pass, &[view, composition_depth.view()], extent))
            .collect::<RenderResult<Vec<_>>>()?;

        debug!(
            "render targets {}x{}: {} composition framebuffers",
            extent.width,
            extent.height,
            composition_framebuffers.len()
        );
        Ok(Self {
            composition_framebuffers,
            offscreen_framebuffer,
            composition_pass,
            offscreen_pass,
            composition_depth,
            gbuffer,
            extent,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn offscreen_pass(&self) -> vk::RenderPass {
        self.offscreen_pass.raw()
    }

    pub fn composition_pass(&self) -> vk::RenderPass {
        self.composition_pass.raw()
    }

    pub fn offscreen_framebuffer(&self) -> vk::Framebuffer {
        self.offscreen_framebuffer.raw()
    }

    pub fn composition_framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.composition_framebuffers[image_index as usize].raw()
    }
}
