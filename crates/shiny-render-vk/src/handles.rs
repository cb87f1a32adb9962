// SPDX-License-Identifier: CEPL-1.0
//! Owning wrappers, one per handle kind.
//!
//! Each wrapper keeps the device alive through its `Arc<dyn Gpu>` and
//! releases its handle on drop. Aggregates get reverse-creation teardown
//! by declaring fields in reverse creation order.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use crate::context::RenderContext;
use crate::error::TransferError;
use crate::gpu::Gpu;

macro_rules! owned_handle {
    ($(#[$meta:meta])* $name:ident, $raw:ty, $info:ty, $create:ident, $destroy:ident) => {
        $(#[$meta])*
        pub struct $name {
            gpu: Arc<dyn Gpu>,
            raw: $raw,
        }

        impl $name {
            pub fn new(gpu: &Arc<dyn Gpu>, info: &$info) -> VkResult<Self> {
                let raw = unsafe { gpu.$create(info)? };
                Ok(Self {
                    gpu: Arc::clone(gpu),
                    raw,
                })
            }

            pub fn raw(&self) -> $raw {
                self.raw
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                debug!("destroy {} {:?}", stringify!($name), self.raw);
                unsafe { self.gpu.$destroy(self.raw) };
            }
        }
    };
}

owned_handle!(ImageView, vk::ImageView, vk::ImageViewCreateInfo<'_>, create_raw_image_view, destroy_raw_image_view);
owned_handle!(Sampler, vk::Sampler, vk::SamplerCreateInfo<'_>, create_raw_sampler, destroy_raw_sampler);
owned_handle!(RenderPass, vk::RenderPass, vk::RenderPassCreateInfo<'_>, create_raw_render_pass, destroy_raw_render_pass);
owned_handle!(Framebuffer, vk::Framebuffer, vk::FramebufferCreateInfo<'_>, create_raw_framebuffer, destroy_raw_framebuffer);
owned_handle!(
    /// Only needs to outlive pipeline creation.
    ShaderModule,
    vk::ShaderModule,
    vk::ShaderModuleCreateInfo<'_>,
    create_raw_shader_module,
    destroy_raw_shader_module
);
owned_handle!(
    DescriptorSetLayout,
    vk::DescriptorSetLayout,
    vk::DescriptorSetLayoutCreateInfo<'_>,
    create_raw_descriptor_set_layout,
    destroy_raw_descriptor_set_layout
);
owned_handle!(
    /// Sets allocated from the pool are freed with it.
    DescriptorPool,
    vk::DescriptorPool,
    vk::DescriptorPoolCreateInfo<'_>,
    create_raw_descriptor_pool,
    destroy_raw_descriptor_pool
);
owned_handle!(
    PipelineLayout,
    vk::PipelineLayout,
    vk::PipelineLayoutCreateInfo<'_>,
    create_raw_pipeline_layout,
    destroy_raw_pipeline_layout
);
owned_handle!(
    PipelineCache,
    vk::PipelineCache,
    vk::PipelineCacheCreateInfo<'_>,
    create_raw_pipeline_cache,
    destroy_raw_pipeline_cache
);
owned_handle!(CommandPool, vk::CommandPool, vk::CommandPoolCreateInfo<'_>, create_raw_command_pool, destroy_raw_command_pool);
owned_handle!(
    Swapchain,
    vk::SwapchainKHR,
    vk::SwapchainCreateInfoKHR<'_>,
    create_raw_swapchain,
    destroy_raw_swapchain
);

pub struct Pipeline {
    gpu: Arc<dyn Gpu>,
    raw: vk::Pipeline,
}

impl Pipeline {
    pub fn new(
        gpu: &Arc<dyn Gpu>,
        cache: &PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<Self> {
        let raw = unsafe { gpu.create_raw_graphics_pipeline(cache.raw(), info)? };
        Ok(Self {
            gpu: Arc::clone(gpu),
            raw,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        debug!("destroy Pipeline {:?}", self.raw);
        unsafe { self.gpu.destroy_raw_pipeline(self.raw) };
    }
}

pub struct Semaphore {
    gpu: Arc<dyn Gpu>,
    raw: vk::Semaphore,
}

impl Semaphore {
    pub fn new(gpu: &Arc<dyn Gpu>) -> VkResult<Self> {
        let raw = unsafe { gpu.create_raw_semaphore()? };
        Ok(Self {
            gpu: Arc::clone(gpu),
            raw,
        })
    }

    pub fn raw(&self) -> vk::Semaphore {
        self.raw
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        debug!("destroy Semaphore {:?}", self.raw);
        unsafe { self.gpu.destroy_raw_semaphore(self.raw) };
    }
}

pub struct Fence {
    gpu: Arc<dyn Gpu>,
    raw: vk::Fence,
}

impl Fence {
    pub fn new(gpu: &Arc<dyn Gpu>, signaled: bool) -> VkResult<Self> {
        let raw = unsafe { gpu.create_raw_fence(signaled)? };
        Ok(Self {
            gpu: Arc::clone(gpu),
            raw,
        })
    }

    pub fn raw(&self) -> vk::Fence {
        self.raw
    }

    pub fn wait(&self) -> VkResult<()> {
        unsafe { self.gpu.wait_for_fences(&[self.raw], u64::MAX) }
    }

    pub fn reset(&self) -> VkResult<()> {
        unsafe { self.gpu.reset_fences(&[self.raw]) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        debug!("destroy Fence {:?}", self.raw);
        unsafe { self.gpu.destroy_raw_fence(self.raw) };
    }
}

/// Command buffers allocated from a pool. Must drop before the pool.
pub struct CommandBuffers {
    gpu: Arc<dyn Gpu>,
    pool: vk::CommandPool,
    raw: Vec<vk::CommandBuffer>,
}

impl CommandBuffers {
    pub fn allocate(gpu: &Arc<dyn Gpu>, pool: &CommandPool, count: u32) -> VkResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.raw())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let raw = unsafe { gpu.allocate_command_buffers(&info)? };
        Ok(Self {
            gpu: Arc::clone(gpu),
            pool: pool.raw(),
            raw,
        })
    }

    pub fn get(&self, i: usize) -> vk::CommandBuffer {
        self.raw[i]
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        if self.raw.is_empty() {
            return;
        }
        debug!("free {} command buffers", self.raw.len());
        unsafe { self.gpu.free_command_buffers(self.pool, &self.raw) };
    }
}

/// Buffer plus its dedicated allocation. Host-visible buffers may be
/// mapped for their whole lifetime.
pub struct Buffer {
    gpu: Arc<dyn Gpu>,
    raw: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<*mut u8>,
}

impl Buffer {
    pub fn new(
        ctx: &RenderContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, TransferError> {
        let gpu = ctx.gpu();
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { gpu.create_raw_buffer(&info) }
            .map_err(|e| TransferError::vk("create_buffer", e))?;
        let mut buffer = Self {
            gpu: Arc::clone(gpu),
            raw,
            memory: vk::DeviceMemory::null(),
            size,
            mapped: None,
        };

        let req = unsafe { gpu.buffer_memory_requirements(raw) };
        let type_index = ctx.memory_type(req.memory_type_bits, flags)?;
        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(req.size)
            .memory_type_index(type_index);
        buffer.memory = unsafe { gpu.allocate_memory(&alloc) }
            .map_err(|e| TransferError::vk("allocate_memory", e))?;
        unsafe { gpu.bind_buffer_memory(raw, buffer.memory, 0) }
            .map_err(|e| TransferError::vk("bind_buffer_memory", e))?;
        Ok(buffer)
    }

    /// Host-visible + coherent buffer that stays mapped until drop.
    pub fn new_mapped(
        ctx: &RenderContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, TransferError> {
        let mut buffer = Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let ptr = unsafe { buffer.gpu.map_memory(buffer.memory, 0, size) }
            .map_err(|e| TransferError::vk("map_memory", e))?;
        buffer.mapped = Some(ptr);
        Ok(buffer)
    }

    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Copies `data` into a mapped buffer at byte `offset`.
    ///
    /// # Panics
    /// If the buffer is not mapped or the write overruns it.
    pub fn write<T: Pod>(&self, offset: usize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let ptr = self.mapped.expect("write to an unmapped buffer");
        assert!(offset + bytes.len() <= self.size as usize, "buffer write out of bounds");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset), bytes.len()) };
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        debug!("destroy Buffer {:?} ({} bytes)", self.raw, self.size);
        unsafe {
            if self.mapped.take().is_some() {
                self.gpu.unmap_memory(self.memory);
            }
            self.gpu.destroy_raw_buffer(self.raw);
            if self.memory != vk::DeviceMemory::null() {
                self.gpu.free_memory(self.memory);
            }
        }
    }
}

/// Image plus its dedicated device-local allocation.
pub struct Image {
    gpu: Arc<dyn Gpu>,
    raw: vk::Image,
    memory: vk::DeviceMemory,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Image {
    pub fn new(ctx: &RenderContext, info: &vk::ImageCreateInfo<'_>) -> Result<Self, TransferError> {
        let gpu = ctx.gpu();
        let raw = unsafe { gpu.create_raw_image(info) }
            .map_err(|e| TransferError::vk("create_image", e))?;
        let mut image = Self {
            gpu: Arc::clone(gpu),
            raw,
            memory: vk::DeviceMemory::null(),
            format: info.format,
            extent: vk::Extent2D {
                width: info.extent.width,
                height: info.extent.height,
            },
            mip_levels: info.mip_levels,
        };

        let req = unsafe { gpu.image_memory_requirements(raw) };
        let type_index = ctx.memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let alloc = vk::MemoryAllocateInfo::default()
            .allocation_size(req.size)
            .memory_type_index(type_index);
        image.memory = unsafe { gpu.allocate_memory(&alloc) }
            .map_err(|e| TransferError::vk("allocate_memory", e))?;
        unsafe { gpu.bind_image_memory(raw, image.memory, 0) }
            .map_err(|e| TransferError::vk("bind_image_memory", e))?;
        Ok(image)
    }

    pub fn raw(&self) -> vk::Image {
        self.raw
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// 2D view over every mip level of this image.
    pub fn view(&self, aspect: vk::ImageAspectFlags) -> VkResult<ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(self.raw)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        ImageView::new(&self.gpu, &info)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        debug!("destroy Image {:?} {:?}", self.raw, self.format);
        unsafe {
            self.gpu.destroy_raw_image(self.raw);
            if self.memory != vk::DeviceMemory::null() {
                self.gpu.free_memory(self.memory);
            }
        }
    }
}
