// SPDX-License-Identifier: CEPL-1.0
//! `ash` backend for [`Gpu`]: instance, validation messenger, surface,
//! adapter choice, logical device and queues.
//!
//! Creation order is instance → messenger → surface → device; `Drop`
//! releases them in reverse.

use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};

use ash::prelude::VkResult;
use ash::{ext::debug_utils, khr::surface, khr::swapchain, vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{self, AdapterInfo, FamilyInfo, QueueFamilies, Requirements};
use crate::error::SetupError;
use crate::gpu::{Gpu, SurfaceSupport};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"shiny";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() || (*data).p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*data).p_message).to_string_lossy()
    };
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("vulkan {types:?}: {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("vulkan {types:?}: {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("vulkan {types:?}: {message}"),
        _ => trace!("vulkan {types:?}: {message}"),
    }
    vk::FALSE
}

fn has_name(names: &[&CStr], wanted: &CStr) -> bool {
    names.iter().any(|n| *n == wanted)
}

unsafe fn create_instance(
    entry: &Entry,
    required: &[*const c_char],
    validation: bool,
) -> Result<ash::Instance, SetupError> {
    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(|e| SetupError::vk("enumerate_instance_extension_properties", e))?;
    let available: Vec<&CStr> = available
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .collect();

    let mut extensions = required.to_vec();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    for &ext in &extensions {
        let name = CStr::from_ptr(ext);
        if !has_name(&available, name) {
            return Err(SetupError::MissingInstanceExtension(
                name.to_string_lossy().into_owned(),
            ));
        }
    }

    let mut layers = Vec::new();
    if validation {
        let props = entry
            .enumerate_instance_layer_properties()
            .map_err(|e| SetupError::vk("enumerate_instance_layer_properties", e))?;
        let names: Vec<&CStr> = props
            .iter()
            .filter_map(|l| l.layer_name_as_c_str().ok())
            .collect();
        if !has_name(&names, VALIDATION_LAYER) {
            return Err(SetupError::MissingValidationLayer(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let app = vk::ApplicationInfo::default()
        .application_name(APP_NAME)
        .engine_name(APP_NAME)
        .api_version(vk::API_VERSION_1_0);
    let info = vk::InstanceCreateInfo::default()
        .application_info(&app)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    let instance = entry
        .create_instance(&info, None)
        .map_err(|e| SetupError::vk("create_instance", e))?;
    info!(
        "vulkan instance: {} extensions, validation {}",
        extensions.len(),
        if validation { "on" } else { "off" }
    );
    Ok(instance)
}

unsafe fn query_surface(
    loader: &surface::Instance,
    pd: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<SurfaceSupport> {
    Ok(SurfaceSupport {
        capabilities: loader.get_physical_device_surface_capabilities(pd, surface)?,
        formats: loader.get_physical_device_surface_formats(pd, surface)?,
        present_modes: loader.get_physical_device_surface_present_modes(pd, surface)?,
    })
}

/// Gathers the plain-data view of one adapter for [`adapter::select`].
unsafe fn describe(
    instance: &ash::Instance,
    loader: &surface::Instance,
    pd: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<AdapterInfo, SetupError> {
    let props = instance.get_physical_device_properties(pd);
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".into());

    let families = instance
        .get_physical_device_queue_family_properties(pd)
        .iter()
        .enumerate()
        .map(|(i, f)| {
            // a failed query only means this family can't present
            let can_present = loader
                .get_physical_device_surface_support(pd, i as u32, surface)
                .unwrap_or(false);
            FamilyInfo {
                flags: f.queue_flags,
                can_present,
            }
        })
        .collect();

    let extensions = instance
        .enumerate_device_extension_properties(pd)
        .map_err(|e| SetupError::vk("enumerate_device_extension_properties", e))?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();

    let surface = query_surface(loader, pd, surface).unwrap_or_default();
    let features = instance.get_physical_device_features(pd);

    Ok(AdapterInfo {
        name,
        families,
        extensions,
        surface,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

/// The live device session.
pub struct AshGpu {
    swapchain_loader: swapchain::Device,
    present_queue: vk::Queue,
    graphics_queue: vk::Queue,
    device: ash::Device,
    families: QueueFamilies,
    memory: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    physical: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: surface::Instance,
    messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    _entry: Entry,
}

impl AshGpu {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> Result<Self, SetupError> {
        let dh = display
            .display_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();

        unsafe {
            let entry = Entry::linked();
            let required = ash_window::enumerate_required_extensions(dh)
                .map_err(|e| SetupError::vk("enumerate_required_extensions", e))?;
            let instance = create_instance(&entry, required, validation)?;

            let messenger = if validation {
                let loader = debug_utils::Instance::new(&entry, &instance);
                let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(debug_callback));
                let m = loader
                    .create_debug_utils_messenger(&info, None)
                    .map_err(|e| SetupError::vk("create_debug_utils_messenger", e))?;
                Some((loader, m))
            } else {
                None
            };

            let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
                .map_err(|e| SetupError::vk("create_surface", e))?;
            let surface_loader = surface::Instance::new(&entry, &instance);

            let physicals = instance
                .enumerate_physical_devices()
                .map_err(|e| SetupError::vk("enumerate_physical_devices", e))?;
            let infos = physicals
                .iter()
                .map(|&pd| describe(&instance, &surface_loader, pd, surface))
                .collect::<Result<Vec<_>, _>>()?;
            let (index, families) = adapter::select(&infos, &Requirements::default())?;
            let physical = physicals[index];

            let priorities = [1.0_f32];
            let queue_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = families
                .unique()
                .into_iter()
                .map(|family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&priorities)
                })
                .collect();
            let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
            let extensions = [swapchain::NAME.as_ptr()];
            let device_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&extensions)
                .enabled_features(&features);
            let device = instance
                .create_device(physical, &device_info, None)
                .map_err(|e| SetupError::vk("create_device", e))?;

            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);
            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let memory = instance.get_physical_device_memory_properties(physical);
            let limits = instance.get_physical_device_properties(physical).limits;
            info!(
                "logical device ready: {} queue famil{}",
                families.unique().len(),
                if families.is_split() { "ies" } else { "y" }
            );

            Ok(Self {
                swapchain_loader,
                present_queue,
                graphics_queue,
                device,
                families,
                memory,
                limits,
                physical,
                surface,
                surface_loader,
                messenger,
                instance,
                _entry: entry,
            })
        }
    }
}

impl Drop for AshGpu {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle before device teardown: {e}");
            }
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("vulkan device and instance destroyed");
    }
}

impl Gpu for AshGpu {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical, format)
        }
    }

    unsafe fn surface_support(&self) -> VkResult<SurfaceSupport> {
        query_surface(&self.surface_loader, self.physical, self.surface)
    }

    unsafe fn create_raw_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        // the surface handle is ours; callers leave it null
        let info = info.surface(self.surface);
        self.swapchain_loader.create_swapchain(&info, None)
    }

    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchain_loader.destroy_swapchain(swapchain, None);
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.swapchain_loader.get_swapchain_images(swapchain)
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.swapchain_loader
            .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
    }

    unsafe fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        self.swapchain_loader.queue_present(queue, info)
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        self.device.allocate_memory(info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.device.free_memory(memory, None);
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut u8> {
        self.device
            .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
            .map(|p| p.cast::<u8>())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.device.unmap_memory(memory);
    }

    unsafe fn create_raw_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        self.device.create_buffer(info, None)
    }

    unsafe fn destroy_raw_buffer(&self, buffer: vk::Buffer) {
        self.device.destroy_buffer(buffer, None);
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        self.device.get_buffer_memory_requirements(buffer)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_buffer_memory(buffer, memory, offset)
    }

    unsafe fn create_raw_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.device.create_image(info, None)
    }

    unsafe fn destroy_raw_image(&self, image: vk::Image) {
        self.device.destroy_image(image, None);
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        self.device.get_image_memory_requirements(image)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_image_memory(image, memory, offset)
    }

    unsafe fn create_raw_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        self.device.create_image_view(info, None)
    }

    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None);
    }

    unsafe fn create_raw_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        self.device.create_sampler(info, None)
    }

    unsafe fn destroy_raw_sampler(&self, sampler: vk::Sampler) {
        self.device.destroy_sampler(sampler, None);
    }

    unsafe fn create_raw_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>) -> VkResult<vk::RenderPass> {
        self.device.create_render_pass(info, None)
    }

    unsafe fn destroy_raw_render_pass(&self, pass: vk::RenderPass) {
        self.device.destroy_render_pass(pass, None);
    }

    unsafe fn create_raw_framebuffer(&self, info: &vk::FramebufferCreateInfo<'_>) -> VkResult<vk::Framebuffer> {
        self.device.create_framebuffer(info, None)
    }

    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.device.destroy_framebuffer(framebuffer, None);
    }

    unsafe fn create_raw_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        self.device.create_shader_module(info, None)
    }

    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule) {
        self.device.destroy_shader_module(module, None);
    }

    unsafe fn create_raw_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.device.create_descriptor_set_layout(info, None)
    }

    unsafe fn destroy_raw_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.device.destroy_descriptor_set_layout(layout, None);
    }

    unsafe fn create_raw_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        self.device.create_descriptor_pool(info, None)
    }

    unsafe fn destroy_raw_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.device.destroy_descriptor_pool(pool, None);
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        self.device.allocate_descriptor_sets(info)
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        self.device.update_descriptor_sets(writes, &[]);
    }

    unsafe fn create_raw_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        self.device.create_pipeline_layout(info, None)
    }

    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.device.destroy_pipeline_layout(layout, None);
    }

    unsafe fn create_raw_pipeline_cache(
        &self,
        info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> VkResult<vk::PipelineCache> {
        self.device.create_pipeline_cache(info, None)
    }

    unsafe fn destroy_raw_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.device.destroy_pipeline_cache(cache, None);
    }

    unsafe fn create_raw_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = self
            .device
            .create_graphics_pipelines(cache, std::slice::from_ref(info), None)
            .map_err(|(partial, e)| {
                for p in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    self.device.destroy_pipeline(p, None);
                }
                e
            })?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.destroy_pipeline(pipeline, None);
    }

    unsafe fn create_raw_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        self.device.create_command_pool(info, None)
    }

    unsafe fn destroy_raw_command_pool(&self, pool: vk::CommandPool) {
        self.device.destroy_command_pool(pool, None);
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(info)
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        self.device.free_command_buffers(pool, buffers);
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        self.device.begin_command_buffer(cmd, info)
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.device.end_command_buffer(cmd)
    }

    unsafe fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.device.cmd_copy_buffer(cmd, src, dst, regions);
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device
            .cmd_copy_buffer_to_image(cmd, src, dst, layout, regions);
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            image_barriers,
        );
    }

    unsafe fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.device
            .cmd_blit_image(cmd, src, src_layout, dst, dst_layout, regions, filter);
    }

    unsafe fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        self.device
            .cmd_begin_render_pass(cmd, info, vk::SubpassContents::INLINE);
    }

    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.device.cmd_end_render_pass(cmd);
    }

    unsafe fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            first_set,
            sets,
            &[],
        );
    }

    unsafe fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        self.device.cmd_bind_vertex_buffers(cmd, 0, buffers, &offsets);
    }

    unsafe fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.device
            .cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32);
    }

    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.device.cmd_set_viewport(cmd, 0, &[viewport]);
    }

    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.device.cmd_set_scissor(cmd, 0, &[scissor]);
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
    ) {
        self.device
            .cmd_draw_indexed(cmd, index_count, instance_count, first_index, 0, 0);
    }

    unsafe fn create_raw_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
    }

    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore) {
        self.device.destroy_semaphore(semaphore, None);
    }

    unsafe fn create_raw_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        self.device
            .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
    }

    unsafe fn destroy_raw_fence(&self, fence: vk::Fence) {
        self.device.destroy_fence(fence, None);
    }

    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()> {
        self.device.wait_for_fences(fences, true, timeout)
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        self.device.reset_fences(fences)
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.device.queue_submit(queue, submits, fence)
    }

    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        self.device.queue_wait_idle(queue)
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.device.device_wait_idle()
    }
}
