// SPDX-License-Identifier: CEPL-1.0
//! Recording [`Gpu`] double for unit tests.
//!
//! Handles are fabricated from one counter, so every handle is unique
//! across kinds. Every create/destroy is appended to an event log and
//! misuse (double destroy, re-recording an in-flight command buffer,
//! destroying something a pending command buffer references, waiting on a
//! fence nobody will signal) is collected in `violations()` instead of
//! panicking inside the renderer.
//!
//! Submitted work "completes" when the CPU waits for it: a fence wait
//! retires the command buffers submitted with that fence, a queue/device
//! idle wait retires everything.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::adapter::QueueFamilies;
use crate::gpu::{Gpu, SurfaceSupport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Buffer,
    Memory,
    Image,
    ImageView,
    Sampler,
    RenderPass,
    Framebuffer,
    ShaderModule,
    DescriptorSetLayout,
    DescriptorPool,
    PipelineLayout,
    PipelineCache,
    Pipeline,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
    Swapchain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Created(Kind, u64),
    Destroyed(Kind, u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Pending,
    Signaled,
}

#[derive(Clone, Debug, Default)]
pub struct SubmitRecord {
    pub command_buffers: Vec<u64>,
    pub wait: Vec<u64>,
    pub signal: Vec<u64>,
    pub fence: u64,
}

#[derive(Clone, Debug)]
pub struct PresentRecord {
    pub wait: Vec<u64>,
    pub image_index: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainRecord {
    pub handle: u64,
    pub min_image_count: u32,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub sharing: vk::SharingMode,
    pub old: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageRecord {
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Default)]
struct State {
    next: u64,
    events: Vec<Event>,
    live: HashMap<u64, Kind>,
    violations: Vec<String>,

    buffers: HashMap<u64, (vk::DeviceSize, vk::BufferUsageFlags)>,
    images: HashMap<u64, ImageRecord>,
    memory: HashMap<u64, (u32, Box<[u8]>)>,
    mapped: HashSet<u64>,
    view_image: HashMap<u64, u64>,
    framebuffer_views: HashMap<u64, Vec<u64>>,
    /// set -> binding -> referenced handles; a rewrite replaces the binding
    set_refs: HashMap<u64, HashMap<u32, Vec<u64>>>,

    fences: HashMap<u64, FenceState>,
    recording: HashSet<u64>,
    refs: HashMap<u64, HashSet<u64>>,
    /// in-flight command buffer -> (fence, submission sequence)
    pending: HashMap<u64, (u64, usize)>,

    begins: Vec<u64>,
    submits: Vec<SubmitRecord>,
    presents: Vec<PresentRecord>,
    draws: Vec<(u64, u32)>,
    viewports: Vec<(u64, vk::Viewport)>,
    barriers: Vec<(vk::ImageLayout, vk::ImageLayout)>,
    blits: Vec<vk::ImageBlit>,
    buffer_copies: Vec<(u64, u64, vk::DeviceSize)>,
    swapchains: Vec<SwapchainRecord>,
    swapchain_images: HashMap<u64, Vec<u64>>,
    pipelines: Vec<u64>,
    pass_dependencies: HashMap<u64, Vec<vk::SubpassDependency>>,
    next_image: u32,
    acquire_script: VecDeque<VkResult<bool>>,
    present_script: VecDeque<VkResult<bool>>,
    submit_script: VecDeque<VkResult<()>>,
    surface_error: Option<vk::Result>,
    device_idle_waits: u32,
}

impl State {
    fn create(&mut self, kind: Kind) -> u64 {
        self.next += 1;
        let h = self.next;
        self.live.insert(h, kind);
        self.events.push(Event::Created(kind, h));
        h
    }

    fn destroy(&mut self, kind: Kind, h: u64) {
        if h == 0 {
            return;
        }
        match self.live.get(&h) {
            Some(k) if *k == kind => {}
            _ => {
                self.violations
                    .push(format!("destroy of unknown {kind:?} {h}"));
                return;
            }
        }
        if self.pending.keys().any(|cmd| {
            self.refs
                .get(cmd)
                .is_some_and(|r| r.contains(&h))
        }) {
            self.violations
                .push(format!("{kind:?} {h} destroyed while referenced by pending work"));
        }
        self.live.remove(&h);
        self.events.push(Event::Destroyed(kind, h));
    }

    fn reference(&mut self, cmd: vk::CommandBuffer, handles: &[u64]) {
        let cmd = cmd.as_raw();
        if !self.recording.contains(&cmd) {
            self.violations
                .push(format!("command recorded into {cmd} outside begin/end"));
        }
        self.refs.entry(cmd).or_default().extend(handles.iter().copied());
    }

    fn retire_fence(&mut self, fence: u64) {
        self.fences.insert(fence, FenceState::Signaled);
        // a fence also covers everything submitted earlier on the queue
        let Some(last) = self
            .pending
            .values()
            .filter(|(f, _)| *f == fence)
            .map(|(_, seq)| *seq)
            .max()
        else {
            return;
        };
        self.pending.retain(|_, (_, seq)| *seq > last);
    }

    fn retire_all(&mut self) {
        for state in self.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
        self.pending.clear();
    }
}

/// `ptr`/`len` pair from a Vulkan create-info as a slice.
unsafe fn slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len as usize)
    }
}

pub const DEVICE_LOCAL_TYPE: u32 = 0;
pub const HOST_VISIBLE_TYPE: u32 = 1;

pub struct MockGpu {
    state: Mutex<State>,
    surface: Mutex<SurfaceSupport>,
    format_overrides: Mutex<HashMap<vk::Format, vk::FormatProperties>>,
    families: QueueFamilies,
    limits: vk::PhysicalDeviceLimits,
}

impl Default for MockGpu {
    fn default() -> Self {
        Self::new(QueueFamilies {
            graphics: 0,
            present: 0,
        })
    }
}

impl MockGpu {
    pub fn new(families: QueueFamilies) -> Self {
        Self {
            state: Mutex::new(State::default()),
            surface: Mutex::new(Self::default_surface()),
            format_overrides: Mutex::new(HashMap::new()),
            families,
            limits: vk::PhysicalDeviceLimits {
                max_sampler_anisotropy: 16.0,
                ..Default::default()
            },
        }
    }

    /// 1280x800 surface, 2..=4 images, B8G8R8A8_UNORM/sRGB, FIFO + MAILBOX.
    pub fn default_surface() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 4,
                current_extent: vk::Extent2D {
                    width: 1280,
                    height: 800,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    fn st(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // --- Scripting ---

    pub fn set_surface(&self, surface: SurfaceSupport) {
        *self.surface.lock().unwrap() = surface;
    }

    /// Makes every surface query fail until cleared with `None`.
    pub fn set_surface_error(&self, err: Option<vk::Result>) {
        self.st().surface_error = err;
    }

    pub fn set_current_extent(&self, width: u32, height: u32) {
        self.surface.lock().unwrap().capabilities.current_extent = vk::Extent2D { width, height };
    }

    pub fn set_format_properties(&self, format: vk::Format, props: vk::FormatProperties) {
        self.format_overrides.lock().unwrap().insert(format, props);
    }

    pub fn script_acquire(&self, result: VkResult<bool>) {
        self.st().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.st().present_script.push_back(result);
    }

    /// Outcome of the next `queue_submit`; a failed one records nothing.
    pub fn script_submit(&self, result: VkResult<()>) {
        self.st().submit_script.push_back(result);
    }

    // --- Inspection ---

    pub fn events(&self) -> Vec<Event> {
        self.st().events.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.st().violations.clone()
    }

    pub fn live_count(&self) -> usize {
        self.st().live.len()
    }

    pub fn live_of(&self, kind: Kind) -> usize {
        self.st().live.values().filter(|k| **k == kind).count()
    }

    pub fn is_live(&self, handle: u64) -> bool {
        self.st().live.contains_key(&handle)
    }

    /// Every buffer ever created, in creation order.
    pub fn buffers(&self) -> Vec<(u64, vk::DeviceSize, vk::BufferUsageFlags)> {
        let st = self.st();
        st.events
            .iter()
            .filter_map(|e| match e {
                Event::Created(Kind::Buffer, h) => {
                    st.buffers.get(h).map(|(s, u)| (*h, *s, *u))
                }
                _ => None,
            })
            .collect()
    }

    pub fn image(&self, handle: u64) -> Option<ImageRecord> {
        self.st().images.get(&handle).copied()
    }

    /// Contents of a memory allocation.
    pub fn memory_bytes(&self, handle: u64) -> Vec<u8> {
        self.st()
            .memory
            .get(&handle)
            .map(|(_, b)| b.to_vec())
            .unwrap_or_default()
    }

    pub fn begins(&self) -> Vec<u64> {
        self.st().begins.clone()
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.st().submits.clone()
    }

    pub fn presents(&self) -> Vec<PresentRecord> {
        self.st().presents.clone()
    }

    pub fn draws(&self) -> Vec<(u64, u32)> {
        self.st().draws.clone()
    }

    pub fn viewports(&self) -> Vec<(u64, vk::Viewport)> {
        self.st().viewports.clone()
    }

    pub fn barriers(&self) -> Vec<(vk::ImageLayout, vk::ImageLayout)> {
        self.st().barriers.clone()
    }

    pub fn blits(&self) -> Vec<vk::ImageBlit> {
        self.st().blits.clone()
    }

    pub fn buffer_copies(&self) -> Vec<(u64, u64, vk::DeviceSize)> {
        self.st().buffer_copies.clone()
    }

    pub fn swapchains(&self) -> Vec<SwapchainRecord> {
        self.st().swapchains.clone()
    }

    pub fn pass_dependencies(&self, pass: u64) -> Vec<vk::SubpassDependency> {
        self.st()
            .pass_dependencies
            .get(&pass)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pipelines(&self) -> Vec<u64> {
        self.st().pipelines.clone()
    }

    pub fn device_idle_waits(&self) -> u32 {
        self.st().device_idle_waits
    }

    /// Index in the event log of the creation / destruction of `handle`.
    pub fn created_at(&self, handle: u64) -> Option<usize> {
        self.st()
            .events
            .iter()
            .position(|e| matches!(e, Event::Created(_, h) if *h == handle))
    }

    pub fn destroyed_at(&self, handle: u64) -> Option<usize> {
        self.st()
            .events
            .iter()
            .position(|e| matches!(e, Event::Destroyed(_, h) if *h == handle))
    }
}

impl Gpu for MockGpu {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn graphics_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0x1_0000_0000 + self.families.graphics as u64)
    }

    fn present_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0x1_0000_0000 + self.families.present as u64)
    }

    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 1,
            ..Default::default()
        };
        props.memory_types[DEVICE_LOCAL_TYPE as usize].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[HOST_VISIBLE_TYPE as usize].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props
    }

    fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.limits
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        if let Some(p) = self.format_overrides.lock().unwrap().get(&format) {
            return *p;
        }
        let all = vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT
            | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST
            | vk::FormatFeatureFlags::TRANSFER_SRC
            | vk::FormatFeatureFlags::TRANSFER_DST;
        vk::FormatProperties {
            optimal_tiling_features: all,
            ..Default::default()
        }
    }

    unsafe fn surface_support(&self) -> VkResult<SurfaceSupport> {
        if let Some(e) = self.st().surface_error {
            return Err(e);
        }
        Ok(self.surface.lock().unwrap().clone())
    }

    unsafe fn create_raw_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut st = self.st();
        let old = info.old_swapchain.as_raw();
        if old != 0 && !st.live.contains_key(&old) {
            st.violations.push(format!("old swapchain {old} is not live"));
        }
        let h = st.create(Kind::Swapchain);
        st.swapchains.push(SwapchainRecord {
            handle: h,
            min_image_count: info.min_image_count,
            extent: info.image_extent,
            format: info.image_format,
            present_mode: info.present_mode,
            sharing: info.image_sharing_mode,
            old,
        });
        let images = (0..info.min_image_count)
            .map(|i| 0x2_0000_0000 + h * 16 + i as u64)
            .collect();
        st.swapchain_images.insert(h, images);
        Ok(vk::SwapchainKHR::from_raw(h))
    }

    unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.st().destroy(Kind::Swapchain, swapchain.as_raw());
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let st = self.st();
        let images = st
            .swapchain_images
            .get(&swapchain.as_raw())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok(images.iter().map(|h| vk::Image::from_raw(*h)).collect())
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut st = self.st();
        let count = st
            .swapchain_images
            .get(&swapchain.as_raw())
            .map(|v| v.len() as u32)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        let suboptimal = match st.acquire_script.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(s)) => s,
            None => false,
        };
        let index = st.next_image % count.max(1);
        st.next_image += 1;
        Ok((index, suboptimal))
    }

    unsafe fn queue_present(
        &self,
        _queue: vk::Queue,
        info: &vk::PresentInfoKHR<'_>,
    ) -> VkResult<bool> {
        let mut st = self.st();
        let wait = slice(info.p_wait_semaphores, info.wait_semaphore_count)
            .iter()
            .map(|s| s.as_raw())
            .collect();
        let image_index = slice(info.p_image_indices, info.swapchain_count)
            .first()
            .copied()
            .unwrap_or(u32::MAX);
        st.presents.push(PresentRecord { wait, image_index });
        match st.present_script.pop_front() {
            Some(r) => r,
            None => Ok(false),
        }
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> VkResult<vk::DeviceMemory> {
        if info.memory_type_index > HOST_VISIBLE_TYPE {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let mut st = self.st();
        let h = st.create(Kind::Memory);
        let bytes = vec![0u8; info.allocation_size as usize].into_boxed_slice();
        st.memory.insert(h, (info.memory_type_index, bytes));
        Ok(vk::DeviceMemory::from_raw(h))
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut st = self.st();
        let h = memory.as_raw();
        // freeing implicitly unmaps
        st.mapped.remove(&h);
        st.destroy(Kind::Memory, h);
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        _size: vk::DeviceSize,
    ) -> VkResult<*mut u8> {
        let mut st = self.st();
        let h = memory.as_raw();
        if !st.mapped.insert(h) {
            st.violations.push(format!("memory {h} mapped twice"));
        }
        let Some((ty, bytes)) = st.memory.get_mut(&h) else {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        };
        if *ty != HOST_VISIBLE_TYPE {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        Ok(bytes.as_mut_ptr().add(offset as usize))
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let mut st = self.st();
        let h = memory.as_raw();
        if !st.mapped.remove(&h) {
            st.violations.push(format!("unmap of unmapped memory {h}"));
        }
    }

    unsafe fn create_raw_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let mut st = self.st();
        if info.size == 0 {
            st.violations.push("zero-sized buffer".into());
        }
        let h = st.create(Kind::Buffer);
        st.buffers.insert(h, (info.size, info.usage));
        Ok(vk::Buffer::from_raw(h))
    }

    unsafe fn destroy_raw_buffer(&self, buffer: vk::Buffer) {
        self.st().destroy(Kind::Buffer, buffer.as_raw());
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self
            .st()
            .buffers
            .get(&buffer.as_raw())
            .map(|(s, _)| *s)
            .unwrap_or(0);
        vk::MemoryRequirements {
            size: size.div_ceil(16) * 16,
            alignment: 16,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let st = self.st();
        if !st.live.contains_key(&buffer.as_raw()) || !st.live.contains_key(&memory.as_raw()) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        Ok(())
    }

    unsafe fn create_raw_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut st = self.st();
        let h = st.create(Kind::Image);
        st.images.insert(
            h,
            ImageRecord {
                extent: info.extent,
                mip_levels: info.mip_levels,
                format: info.format,
                usage: info.usage,
            },
        );
        Ok(vk::Image::from_raw(h))
    }

    unsafe fn destroy_raw_image(&self, image: vk::Image) {
        self.st().destroy(Kind::Image, image.as_raw());
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self
            .st()
            .images
            .get(&image.as_raw())
            .map(|r| r.extent.width as u64 * r.extent.height as u64 * 8)
            .unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let st = self.st();
        if !st.live.contains_key(&image.as_raw()) || !st.live.contains_key(&memory.as_raw()) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        Ok(())
    }

    unsafe fn create_raw_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        let mut st = self.st();
        let image = info.image.as_raw();
        let swapchain_image = st.swapchain_images.values().any(|v| v.contains(&image));
        if !swapchain_image && !st.live.contains_key(&image) {
            st.violations.push(format!("view of dead image {image}"));
        }
        let h = st.create(Kind::ImageView);
        st.view_image.insert(h, image);
        Ok(vk::ImageView::from_raw(h))
    }

    unsafe fn destroy_raw_image_view(&self, view: vk::ImageView) {
        self.st().destroy(Kind::ImageView, view.as_raw());
    }

    unsafe fn create_raw_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> VkResult<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.st().create(Kind::Sampler)))
    }

    unsafe fn destroy_raw_sampler(&self, sampler: vk::Sampler) {
        self.st().destroy(Kind::Sampler, sampler.as_raw());
    }

    unsafe fn create_raw_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        let mut st = self.st();
        let h = st.create(Kind::RenderPass);
        let deps = slice(info.p_dependencies, info.dependency_count).to_vec();
        st.pass_dependencies.insert(h, deps);
        Ok(vk::RenderPass::from_raw(h))
    }

    unsafe fn destroy_raw_render_pass(&self, pass: vk::RenderPass) {
        self.st().destroy(Kind::RenderPass, pass.as_raw());
    }

    unsafe fn create_raw_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        let mut st = self.st();
        let views: Vec<u64> = slice(info.p_attachments, info.attachment_count)
            .iter()
            .map(|v| v.as_raw())
            .collect();
        for v in &views {
            if !st.live.contains_key(v) {
                st.violations.push(format!("framebuffer over dead view {v}"));
            }
        }
        if !st.live.contains_key(&info.render_pass.as_raw()) {
            st.violations.push("framebuffer over dead render pass".into());
        }
        let h = st.create(Kind::Framebuffer);
        st.framebuffer_views.insert(h, views);
        Ok(vk::Framebuffer::from_raw(h))
    }

    unsafe fn destroy_raw_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.st().destroy(Kind::Framebuffer, framebuffer.as_raw());
    }

    unsafe fn create_raw_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        if info.code_size == 0 || info.code_size % 4 != 0 {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        Ok(vk::ShaderModule::from_raw(self.st().create(Kind::ShaderModule)))
    }

    unsafe fn destroy_raw_shader_module(&self, module: vk::ShaderModule) {
        self.st().destroy(Kind::ShaderModule, module.as_raw());
    }

    unsafe fn create_raw_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(
            self.st().create(Kind::DescriptorSetLayout),
        ))
    }

    unsafe fn destroy_raw_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.st().destroy(Kind::DescriptorSetLayout, layout.as_raw());
    }

    unsafe fn create_raw_descriptor_pool(
        &self,
        _info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        Ok(vk::DescriptorPool::from_raw(self.st().create(Kind::DescriptorPool)))
    }

    unsafe fn destroy_raw_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.st().destroy(Kind::DescriptorPool, pool.as_raw());
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut st = self.st();
        // sets die with their pool; not tracked as objects
        let sets: Vec<vk::DescriptorSet> = (0..info.descriptor_set_count)
            .map(|_| {
                st.next += 1;
                vk::DescriptorSet::from_raw(st.next)
            })
            .collect();
        Ok(sets)
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        let mut st = self.st();
        for w in writes {
            let mut handles: Vec<u64> = slice(w.p_buffer_info, w.descriptor_count)
                .iter()
                .map(|b| b.buffer.as_raw())
                .collect();
            for i in slice(w.p_image_info, w.descriptor_count) {
                handles.push(i.image_view.as_raw());
                handles.push(i.sampler.as_raw());
                if let Some(img) = st.view_image.get(&i.image_view.as_raw()) {
                    handles.push(*img);
                }
            }
            for h in &handles {
                if !st.live.contains_key(h) {
                    st.violations.push(format!("descriptor write of dead handle {h}"));
                }
            }
            st.set_refs
                .entry(w.dst_set.as_raw())
                .or_default()
                .insert(w.dst_binding, handles);
        }
    }

    unsafe fn create_raw_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.st().create(Kind::PipelineLayout)))
    }

    unsafe fn destroy_raw_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.st().destroy(Kind::PipelineLayout, layout.as_raw());
    }

    unsafe fn create_raw_pipeline_cache(
        &self,
        _info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> VkResult<vk::PipelineCache> {
        Ok(vk::PipelineCache::from_raw(self.st().create(Kind::PipelineCache)))
    }

    unsafe fn destroy_raw_pipeline_cache(&self, cache: vk::PipelineCache) {
        self.st().destroy(Kind::PipelineCache, cache.as_raw());
    }

    unsafe fn create_raw_graphics_pipeline(
        &self,
        _cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut st = self.st();
        for m in slice(info.p_stages, info.stage_count) {
            if !st.live.contains_key(&m.module.as_raw()) {
                st.violations.push("pipeline over dead shader module".into());
            }
        }
        let h = st.create(Kind::Pipeline);
        st.pipelines.push(h);
        Ok(vk::Pipeline::from_raw(h))
    }

    unsafe fn destroy_raw_pipeline(&self, pipeline: vk::Pipeline) {
        self.st().destroy(Kind::Pipeline, pipeline.as_raw());
    }

    unsafe fn create_raw_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        Ok(vk::CommandPool::from_raw(self.st().create(Kind::CommandPool)))
    }

    unsafe fn destroy_raw_command_pool(&self, pool: vk::CommandPool) {
        self.st().destroy(Kind::CommandPool, pool.as_raw());
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut st = self.st();
        Ok((0..info.command_buffer_count)
            .map(|_| vk::CommandBuffer::from_raw(st.create(Kind::CommandBuffer)))
            .collect())
    }

    unsafe fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut st = self.st();
        for b in buffers {
            if st.pending.contains_key(&b.as_raw()) {
                st.violations.push(format!("freed pending command buffer {}", b.as_raw()));
            }
            st.destroy(Kind::CommandBuffer, b.as_raw());
        }
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        let mut st = self.st();
        let h = cmd.as_raw();
        if st.pending.contains_key(&h) {
            st.violations
                .push(format!("command buffer {h} re-recorded while in flight"));
        }
        st.recording.insert(h);
        st.refs.insert(h, HashSet::new());
        st.begins.push(h);
        Ok(())
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut st = self.st();
        if !st.recording.remove(&cmd.as_raw()) {
            st.violations.push("end of a command buffer not recording".into());
        }
        Ok(())
    }

    unsafe fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut st = self.st();
        let h = cmd.as_raw();
        if st.pending.contains_key(&h) {
            st.violations.push(format!("command buffer {h} reset while in flight"));
        }
        st.refs.remove(&h);
        Ok(())
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        let mut st = self.st();
        st.reference(cmd, &[src.as_raw(), dst.as_raw()]);
        for r in regions {
            st.buffer_copies.push((src.as_raw(), dst.as_raw(), r.size));
        }
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        _regions: &[vk::BufferImageCopy],
    ) {
        let mut st = self.st();
        if layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            st.violations.push(format!("buffer->image copy in {layout:?}"));
        }
        st.reference(cmd, &[src.as_raw(), dst.as_raw()]);
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut st = self.st();
        let images: Vec<u64> = image_barriers.iter().map(|b| b.image.as_raw()).collect();
        st.reference(cmd, &images);
        for b in image_barriers {
            st.barriers.push((b.old_layout, b.new_layout));
        }
    }

    unsafe fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        _filter: vk::Filter,
    ) {
        let mut st = self.st();
        st.reference(cmd, &[src.as_raw(), dst.as_raw()]);
        st.blits.extend_from_slice(regions);
    }

    unsafe fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, info: &vk::RenderPassBeginInfo<'_>) {
        let mut st = self.st();
        let fb = info.framebuffer.as_raw();
        let mut handles = vec![info.render_pass.as_raw(), fb];
        for v in st.framebuffer_views.get(&fb).cloned().unwrap_or_default() {
            handles.push(v);
            if let Some(img) = st.view_image.get(&v) {
                handles.push(*img);
            }
        }
        for h in &handles {
            if !st.live.contains_key(h) && !st.swapchain_images.values().any(|v| v.contains(h)) {
                st.violations.push(format!("render pass begun over dead handle {h}"));
            }
        }
        st.reference(cmd, &handles);
    }

    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.st().reference(cmd, &[]);
    }

    unsafe fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.st().reference(cmd, &[pipeline.as_raw()]);
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        _first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        let mut st = self.st();
        let mut handles = vec![layout.as_raw()];
        for s in sets {
            for bound in st.set_refs.get(&s.as_raw()).into_iter().flat_map(|b| b.values()) {
                handles.extend(bound.iter().copied());
            }
        }
        let dead: Vec<u64> = handles
            .iter()
            .copied()
            .filter(|h| !st.live.contains_key(h))
            .collect();
        for h in dead {
            st.violations.push(format!("descriptor set bound over dead handle {h}"));
        }
        st.reference(cmd, &handles);
    }

    unsafe fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, buffers: &[vk::Buffer]) {
        let handles: Vec<u64> = buffers.iter().map(|b| b.as_raw()).collect();
        self.st().reference(cmd, &handles);
    }

    unsafe fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.st().reference(cmd, &[buffer.as_raw()]);
    }

    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        let mut st = self.st();
        st.reference(cmd, &[]);
        st.viewports.push((cmd.as_raw(), viewport));
    }

    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, _scissor: vk::Rect2D) {
        self.st().reference(cmd, &[]);
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        _instance_count: u32,
        _first_index: u32,
    ) {
        let mut st = self.st();
        st.reference(cmd, &[]);
        st.draws.push((cmd.as_raw(), index_count));
    }

    unsafe fn create_raw_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.st().create(Kind::Semaphore)))
    }

    unsafe fn destroy_raw_semaphore(&self, semaphore: vk::Semaphore) {
        self.st().destroy(Kind::Semaphore, semaphore.as_raw());
    }

    unsafe fn create_raw_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut st = self.st();
        let h = st.create(Kind::Fence);
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        st.fences.insert(h, state);
        Ok(vk::Fence::from_raw(h))
    }

    unsafe fn destroy_raw_fence(&self, fence: vk::Fence) {
        let mut st = self.st();
        let h = fence.as_raw();
        if st.fences.get(&h) == Some(&FenceState::Pending) {
            st.violations.push(format!("fence {h} destroyed while pending"));
        }
        st.fences.remove(&h);
        st.destroy(Kind::Fence, h);
    }

    unsafe fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> VkResult<()> {
        let mut st = self.st();
        for f in fences {
            let h = f.as_raw();
            match st.fences.get(&h).copied() {
                Some(FenceState::Pending) => st.retire_fence(h),
                Some(FenceState::Signaled) => {}
                Some(FenceState::Unsignaled) => {
                    st.violations
                        .push(format!("wait on fence {h} that nothing will signal"));
                    return Err(vk::Result::TIMEOUT);
                }
                None => return Err(vk::Result::ERROR_UNKNOWN),
            }
        }
        Ok(())
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut st = self.st();
        for f in fences {
            let h = f.as_raw();
            if st.fences.get(&h) == Some(&FenceState::Pending) {
                st.violations.push(format!("reset of pending fence {h}"));
            }
            st.fences.insert(h, FenceState::Unsignaled);
        }
        Ok(())
    }

    unsafe fn queue_submit(
        &self,
        _queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut st = self.st();
        if let Some(Err(e)) = st.submit_script.pop_front() {
            return Err(e);
        }
        let fh = fence.as_raw();
        if fh != 0 {
            if st.fences.get(&fh) != Some(&FenceState::Unsignaled) {
                st.violations.push(format!("submit with fence {fh} not reset"));
            }
            st.fences.insert(fh, FenceState::Pending);
        }
        for s in submits {
            let rec = SubmitRecord {
                command_buffers: slice(s.p_command_buffers, s.command_buffer_count)
                    .iter()
                    .map(|c| c.as_raw())
                    .collect(),
                wait: slice(s.p_wait_semaphores, s.wait_semaphore_count)
                    .iter()
                    .map(|x| x.as_raw())
                    .collect(),
                signal: slice(s.p_signal_semaphores, s.signal_semaphore_count)
                    .iter()
                    .map(|x| x.as_raw())
                    .collect(),
                fence: fh,
            };
            let seq = st.submits.len();
            for c in &rec.command_buffers {
                if st.recording.contains(c) {
                    st.violations.push(format!("submit of command buffer {c} still recording"));
                }
                st.pending.insert(*c, (fh, seq));
            }
            st.submits.push(rec);
        }
        Ok(())
    }

    unsafe fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.st().retire_all();
        Ok(())
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        let mut st = self.st();
        st.retire_all();
        st.device_idle_waits += 1;
        Ok(())
    }
}
