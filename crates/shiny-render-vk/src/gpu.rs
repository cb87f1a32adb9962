// SPDX-License-Identifier: CEPL-1.0
//! The device-level API boundary.
//!
//! Every call the renderer makes against a logical device goes through
//! [`Gpu`]. [`AshGpu`](crate::device::AshGpu) forwards to `ash`; the test
//! double in `mock` fabricates handles and records the call stream.
//!
//! Naming follows the `raw_*` convention: `create_raw_*` / `destroy_raw_*`
//! take and return plain `ash::vk` handles. Owning wrappers live in
//! [`handles`](crate::handles).
//!
//! All methods are `unsafe`: callers uphold the usual Vulkan validity
//! rules (live parent handles, externally synchronised command buffers,
//! no destruction of objects referenced by pending work).

use ash::prelude::VkResult;
use ash::vk;

use crate::adapter::QueueFamilies;

/// What the surface reports for the selected adapter.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub trait Gpu {
    // --- Device facts (immutable for the session) ---
    fn queue_families(&self) -> QueueFamilies;
    fn graphics_queue(&self) -> vk::Queue;
    fn present_queue(&self) -> vk::Queue;
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;
    fn limits(&self) -> vk::PhysicalDeviceLimits;
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    // --- Surface / swapchain ---
    unsafe fn surface_support(&self) -> VkResult<SurfaceSupport>;
    unsafe fn create_raw_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR);
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    /// Returns the image index and whether the chain is suboptimal.
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// Returns whether the chain is suboptimal.
    unsafe fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>)
        -> VkResult<bool>;

    // --- Memory ---
    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory>;
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut u8>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);

    // --- Buffers / images ---
    unsafe fn create_raw_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer>;
    unsafe fn destroy_raw_buffer(&self, buffer: vk::Buffer);
    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    unsafe fn create_raw_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;
    unsafe fn destroy_raw_image(&self, image: vk::Image);
    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    unsafe fn create_raw_image_view(&self, info: &vk::ImageViewCreateInfo<'_>)
        -> VkResult<vk::ImageView>;
    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView);
    unsafe fn create_raw_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler>;
    unsafe fn destroy_raw_sampler(&self, sampler: vk::Sampler);

    // --- Passes / pipelines ---
    unsafe fn create_raw_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_raw_render_pass(&self, pass: vk::RenderPass);
    unsafe fn create_raw_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer);
    unsafe fn create_raw_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule);
    unsafe fn create_raw_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn destroy_raw_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    unsafe fn create_raw_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool>;
    unsafe fn destroy_raw_descriptor_pool(&self, pool: vk::DescriptorPool);
    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>>;
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);
    unsafe fn create_raw_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout);
    unsafe fn create_raw_pipeline_cache(
        &self,
        info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> VkResult<vk::PipelineCache>;
    unsafe fn destroy_raw_pipeline_cache(&self, cache: vk::PipelineCache);
    unsafe fn create_raw_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline);

    // --- Commands ---
    unsafe fn create_raw_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_raw_command_pool(&self, pool: vk::CommandPool);
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    unsafe fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    unsafe fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
    #[allow(clippy::too_many_arguments)]
    unsafe fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    unsafe fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>);
    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    unsafe fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    unsafe fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, buffers: &[vk::Buffer]);
    unsafe fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    unsafe fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
    );

    // --- Synchronisation / submission ---
    unsafe fn create_raw_semaphore(&self) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore);
    unsafe fn create_raw_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    unsafe fn destroy_raw_fence(&self, fence: vk::Fence);
    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()>;
    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;
    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()>;
    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
    unsafe fn device_wait_idle(&self) -> VkResult<()>;
}

/// Picks the first memory type allowed by `type_bits` that has all of
/// `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

/// True for depth formats that carry a stencil aspect.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}
