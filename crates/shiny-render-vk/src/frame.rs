// SPDX-License-Identifier: CEPL-1.0
//! Frames in flight: per-slot sync objects, command buffers and the two
//! command recordings (offscreen G-buffer pass, composition pass).
//!
//! A slot's command buffers are only reset after its fence has signaled.
//! The offscreen submit carries no fence; the composition fence covers it
//! because it was submitted earlier on the same queue.

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::attachments::RenderTargets;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::gpu::Gpu;
use crate::handles::{CommandBuffers, CommandPool, Fence, Semaphore};
use crate::mesh::{Mesh, ScreenQuads};
use crate::pipelines::{Pipelines, SET_GLOBAL};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

// one G-buffer is shared by every slot
const _: () = assert!(MAX_FRAMES_IN_FLIGHT >= 1 && MAX_FRAMES_IN_FLIGHT <= 2);

/// Sync objects of every slot, grouped by kind and created kind by kind.
struct SyncSet {
    fences: Vec<Fence>,
    render_complete: Vec<Semaphore>,
    offscreen_complete: Vec<Semaphore>,
    image_available: Vec<Semaphore>,
}

impl SyncSet {
    fn new(gpu: &Arc<dyn Gpu>) -> RenderResult<Self> {
        let semaphores = || {
            (0..MAX_FRAMES_IN_FLIGHT)
                .map(|_| Semaphore::new(gpu).map_err(|e| RenderError::vk("create_semaphore", e)))
                .collect::<RenderResult<Vec<_>>>()
        };
        let image_available = semaphores()?;
        let offscreen_complete = semaphores()?;
        let render_complete = semaphores()?;
        // signaled so the first wait on each slot returns at once
        let fences = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Fence::new(gpu, true).map_err(|e| RenderError::vk("create_fence", e)))
            .collect::<RenderResult<Vec<_>>>()?;
        Ok(Self {
            fences,
            render_complete,
            offscreen_complete,
            image_available,
        })
    }
}

/// Raw sync handles of one slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub offscreen_complete: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub fence: vk::Fence,
}

pub struct Frames {
    sync: SyncSet,
    commands: CommandBuffers,
    pool: CommandPool,
    gpu: Arc<dyn Gpu>,
    current: usize,
    /// Fence reset but nothing submitted with it yet.
    unarmed: [bool; MAX_FRAMES_IN_FLIGHT],
}

impl Frames {
    pub fn new(ctx: &RenderContext) -> RenderResult<Self> {
        let gpu = ctx.gpu();
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.families.graphics);
        let pool = CommandPool::new(gpu, &info).map_err(|e| RenderError::vk("create_command_pool", e))?;
        // offscreen and composition buffer per slot
        let commands = CommandBuffers::allocate(gpu, &pool, 2 * MAX_FRAMES_IN_FLIGHT as u32)
            .map_err(|e| RenderError::vk("allocate_command_buffers", e))?;
        let sync = SyncSet::new(gpu)?;
        Ok(Self {
            sync,
            commands,
            pool,
            gpu: Arc::clone(gpu),
            current: 0,
            unarmed: [false; MAX_FRAMES_IN_FLIGHT],
        })
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn sync(&self) -> FrameSync {
        let i = self.current;
        FrameSync {
            image_available: self.sync.image_available[i].raw(),
            offscreen_complete: self.sync.offscreen_complete[i].raw(),
            render_complete: self.sync.render_complete[i].raw(),
            fence: self.sync.fences[i].raw(),
        }
    }

    pub fn offscreen_cmd(&self) -> vk::CommandBuffer {
        self.commands.get(2 * self.current)
    }

    pub fn composition_cmd(&self) -> vk::CommandBuffer {
        self.commands.get(2 * self.current + 1)
    }

    /// Blocks until the current slot's previous submission has retired.
    /// A slot whose last frame failed between reset and submit has nothing
    /// in flight, so there is nothing to wait for.
    pub fn wait_current(&self) -> RenderResult<()> {
        if self.unarmed[self.current] {
            return Ok(());
        }
        self.sync.fences[self.current]
            .wait()
            .map_err(|e| RenderError::vk("wait_for_fences", e))
    }

    /// Only after a successful acquire. The slot stays unarmed until
    /// [`Frames::mark_submitted`].
    pub fn reset_current(&mut self) -> RenderResult<()> {
        self.sync.fences[self.current]
            .reset()
            .map_err(|e| RenderError::vk("reset_fences", e))?;
        self.unarmed[self.current] = true;
        for cmd in [self.offscreen_cmd(), self.composition_cmd()] {
            unsafe { self.gpu.reset_command_buffer(cmd) }
                .map_err(|e| RenderError::vk("reset_command_buffer", e))?;
        }
        Ok(())
    }

    /// The current slot's fence went out with a submit.
    pub fn mark_submitted(&mut self) {
        self.unarmed[self.current] = false;
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Waits on every fence that something will signal.
    pub fn wait_all(&self) -> RenderResult<()> {
        let fences: Vec<vk::Fence> = self
            .sync
            .fences
            .iter()
            .zip(self.unarmed)
            .filter(|(_, unarmed)| !unarmed)
            .map(|(f, _)| f.raw())
            .collect();
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.gpu.wait_for_fences(&fences, u64::MAX) }
            .map_err(|e| RenderError::vk("wait_for_fences", e))
    }

    /// Fresh semaphores and fences. A suboptimal acquire leaves its
    /// semaphore signaled with nobody waiting on it, so nothing is reused
    /// across a rebuild. The device must be idle.
    pub fn recreate_sync(&mut self) -> RenderResult<()> {
        self.sync = SyncSet::new(&self.gpu)?;
        self.current = 0;
        self.unarmed = [false; MAX_FRAMES_IN_FLIGHT];
        Ok(())
    }
}

/// Everything a frame recording reads.
pub struct DrawInputs<'a> {
    pub targets: &'a RenderTargets,
    pub pipelines: &'a Pipelines,
    pub layout: vk::PipelineLayout,
    pub global_set: vk::DescriptorSet,
    pub meshes: &'a [Mesh],
    pub quads: &'a ScreenQuads,
    pub clear_color: [f32; 4],
    pub debug_display: bool,
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Lower-right quarter, where the composite goes in debug display.
pub fn quarter_viewport(extent: vk::Extent2D) -> vk::Viewport {
    let w = extent.width as f32 / 2.0;
    let h = extent.height as f32 / 2.0;
    vk::Viewport {
        x: w,
        y: h,
        width: w,
        height: h,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn begin(gpu: &dyn Gpu, cmd: vk::CommandBuffer) -> RenderResult<()> {
    let info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { gpu.begin_command_buffer(cmd, &info) }
        .map_err(|e| RenderError::vk("begin_command_buffer", e))
}

fn depth_clear() -> vk::ClearValue {
    vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    }
}

/// Geometry into the G-buffer.
pub fn record_offscreen(gpu: &dyn Gpu, cmd: vk::CommandBuffer, input: &DrawInputs<'_>) -> RenderResult<()> {
    let extent = input.targets.extent();
    let black = vk::ClearValue {
        color: vk::ClearColorValue { float32: [0.0; 4] },
    };
    let clears = [black, black, black, depth_clear()];
    let pass = vk::RenderPassBeginInfo::default()
        .render_pass(input.targets.offscreen_pass())
        .framebuffer(input.targets.offscreen_framebuffer())
        .render_area(full_rect(extent))
        .clear_values(&clears);

    begin(gpu, cmd)?;
    unsafe {
        gpu.cmd_begin_render_pass(cmd, &pass);
        gpu.cmd_set_viewport(cmd, full_viewport(extent));
        gpu.cmd_set_scissor(cmd, full_rect(extent));
        gpu.cmd_bind_pipeline(cmd, input.pipelines.offscreen());
        gpu.cmd_bind_descriptor_sets(cmd, input.layout, SET_GLOBAL, &[input.global_set]);
    }
    for mesh in input.meshes {
        mesh.record(gpu, cmd, input.layout);
    }
    unsafe {
        gpu.cmd_end_render_pass(cmd);
        gpu.end_command_buffer(cmd)
    }
    .map_err(|e| RenderError::vk("end_command_buffer", e))?;
    trace!("offscreen recorded: {} meshes", input.meshes.len());
    Ok(())
}

/// Lighting into the swapchain image. In debug display the G-buffer tiles
/// are drawn first and the composite shrinks to the lower-right quarter.
pub fn record_composition(
    gpu: &dyn Gpu,
    cmd: vk::CommandBuffer,
    input: &DrawInputs<'_>,
    image_index: u32,
) -> RenderResult<()> {
    let extent = input.targets.extent();
    let clears = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: input.clear_color,
            },
        },
        depth_clear(),
    ];
    let pass = vk::RenderPassBeginInfo::default()
        .render_pass(input.targets.composition_pass())
        .framebuffer(input.targets.composition_framebuffer(image_index))
        .render_area(full_rect(extent))
        .clear_values(&clears);

    begin(gpu, cmd)?;
    unsafe {
        gpu.cmd_begin_render_pass(cmd, &pass);
        gpu.cmd_set_viewport(cmd, full_viewport(extent));
        gpu.cmd_set_scissor(cmd, full_rect(extent));
        gpu.cmd_bind_descriptor_sets(cmd, input.layout, SET_GLOBAL, &[input.global_set]);
    }
    if input.debug_display {
        unsafe { gpu.cmd_bind_pipeline(cmd, input.pipelines.debug()) };
        input.quads.record_debug(gpu, cmd);
        unsafe { gpu.cmd_set_viewport(cmd, quarter_viewport(extent)) };
    }
    unsafe { gpu.cmd_bind_pipeline(cmd, input.pipelines.composition()) };
    input.quads.record_fullscreen(gpu, cmd);
    unsafe {
        gpu.cmd_end_render_pass(cmd);
        gpu.end_command_buffer(cmd)
    }
    .map_err(|e| RenderError::vk("end_command_buffer", e))?;
    Ok(())
}

pub fn submit(
    gpu: &dyn Gpu,
    cmd: vk::CommandBuffer,
    wait: vk::Semaphore,
    wait_stage: vk::PipelineStageFlags,
    signal: vk::Semaphore,
    fence: vk::Fence,
) -> RenderResult<()> {
    let waits = [wait];
    let stages = [wait_stage];
    let cmds = [cmd];
    let signals = [signal];
    let info = vk::SubmitInfo::default()
        .wait_semaphores(&waits)
        .wait_dst_stage_mask(&stages)
        .command_buffers(&cmds)
        .signal_semaphores(&signals);
    unsafe { gpu.queue_submit(gpu.graphics_queue(), &[info], fence) }
        .map_err(|e| RenderError::vk("queue_submit", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpu;

    #[test]
    fn quarter_is_lower_right() {
        let v = quarter_viewport(vk::Extent2D {
            width: 1280,
            height: 800,
        });
        assert_eq!((v.x, v.y, v.width, v.height), (640.0, 400.0, 640.0, 400.0));
        let full = full_viewport(vk::Extent2D {
            width: 1280,
            height: 800,
        });
        assert_eq!((full.width, full.height, full.max_depth), (1280.0, 800.0, 1.0));
    }

    #[test]
    fn slots_alternate_and_own_distinct_buffers() {
        let mock = Arc::new(MockGpu::default());
        let ctx = RenderContext::for_tests(mock.clone());
        let mut frames = Frames::new(&ctx).unwrap();
        let first = (frames.offscreen_cmd(), frames.composition_cmd());
        assert_ne!(first.0, first.1);
        frames.advance();
        assert_eq!(frames.current(), 1);
        assert_ne!(frames.offscreen_cmd(), first.0);
        frames.advance();
        assert_eq!(frames.current(), 0);
        assert_eq!(frames.offscreen_cmd(), first.0);
    }

    #[test]
    fn fresh_slots_do_not_block() {
        let mock = Arc::new(MockGpu::default());
        let ctx = RenderContext::for_tests(mock.clone());
        let mut frames = Frames::new(&ctx).unwrap();
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frames.wait_current().unwrap();
            frames.advance();
        }
        frames.wait_all().unwrap();
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn unsubmitted_slot_is_not_waited_on() {
        let mock = Arc::new(MockGpu::default());
        let ctx = RenderContext::for_tests(mock.clone());
        let mut frames = Frames::new(&ctx).unwrap();
        frames.wait_current().unwrap();
        frames.reset_current().unwrap();
        // the frame died before its submit
        frames.wait_current().unwrap();
        frames.reset_current().unwrap();
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn recreated_sync_is_signaled_again() {
        let mock = Arc::new(MockGpu::default());
        let ctx = RenderContext::for_tests(mock.clone());
        let mut frames = Frames::new(&ctx).unwrap();
        let old = frames.sync().image_available;
        frames.wait_current().unwrap();
        frames.reset_current().unwrap();
        // an unsubmitted reset fence is skipped at teardown
        frames.wait_all().unwrap();
        frames.advance();
        unsafe { mock.device_wait_idle() }.unwrap();
        frames.recreate_sync().unwrap();
        assert_eq!(frames.current(), 0);
        assert_ne!(frames.sync().image_available, old);
        frames.wait_all().unwrap();
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }
}
