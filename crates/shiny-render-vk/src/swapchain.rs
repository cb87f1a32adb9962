// SPDX-License-Identifier: CEPL-1.0
//! Presentation chain: swapchain, its images and one view per image.
//!
//! The chain is rebuilt wholesale. `PresentationChain::rebuild` creates the
//! new swapchain with `old_swapchain` pointing at the current one and only
//! then drops the old chain, so a live swapchain exists at every point.
//! Callers drop everything that embeds the old extent/format before
//! rebuilding and recreate it afterwards.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use shiny_render::{PresentPolicy, RenderSize};
use tracing::{debug, info};

use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{Gpu, SurfaceSupport};
use crate::handles::{ImageView, Swapchain};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
    Uninitialized,
    Live,
    Stale,
    Rebuilding,
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    OutOfDate,
    Suboptimal,
    Resized,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StaleReason::OutOfDate => "out_of_date",
            StaleReason::Suboptimal => "suboptimal",
            StaleReason::Resized => "resized",
        })
    }
}

/// Outcome of acquire/present. `Stale` never leaves the frame orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Ready,
    Stale(StaleReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image(u32),
    Stale(StaleReason),
}

/// Everything decided from the surface report before creating the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// A lone `UNDEFINED` entry means "anything goes". Otherwise the preferred
/// pair, otherwise whatever the driver listed first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_SURFACE_FORMAT;
        }
    }
    if formats.contains(&PREFERRED_SURFACE_FORMAT) {
        return PREFERRED_SURFACE_FORMAT;
    }
    formats.first().copied().unwrap_or(PREFERRED_SURFACE_FORMAT)
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], policy: PresentPolicy) -> vk::PresentModeKHR {
    match policy {
        PresentPolicy::Fifo => vk::PresentModeKHR::FIFO,
        PresentPolicy::LowLatency => [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
            .into_iter()
            .find(|m| modes.contains(m))
            .unwrap_or(vk::PresentModeKHR::FIFO),
    }
}

/// `current_extent` unless it is the `u32::MAX` sentinel, in which case the
/// window size is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&bit| supported.contains(bit))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub fn plan(support: &SurfaceSupport, want: RenderSize, policy: PresentPolicy) -> ChainPlan {
    let caps = &support.capabilities;
    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };
    ChainPlan {
        format: choose_surface_format(&support.formats),
        present_mode: choose_present_mode(&support.present_modes, policy),
        extent: choose_extent(caps, want),
        image_count: choose_image_count(caps),
        composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
        pre_transform,
    }
}

/// One generation of the swapchain. Views drop before the swapchain.
pub struct Chain {
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    swapchain: Swapchain,
    plan: ChainPlan,
}

impl Chain {
    fn build(
        ctx: &RenderContext,
        want: RenderSize,
        policy: PresentPolicy,
        old: vk::SwapchainKHR,
    ) -> RenderResult<Self> {
        let gpu = ctx.gpu();
        let support =
            unsafe { gpu.surface_support() }.map_err(|e| RenderError::vk("surface_support", e))?;
        let plan = plan(&support, want, policy);

        info!(
            "swapchain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images {} (min {}, max {})",
            plan.format.format,
            plan.format.color_space,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            plan.image_count,
            support.capabilities.min_image_count,
            support.capabilities.max_image_count,
        );

        let family_indices = [ctx.families.graphics, ctx.families.present];
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old);
        info = if ctx.families.is_split() {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain =
            Swapchain::new(gpu, &info).map_err(|e| RenderError::vk("create_swapchain", e))?;
        let images = unsafe { gpu.swapchain_images(swapchain.raw()) }
            .map_err(|e| RenderError::vk("get_swapchain_images", e))?;

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(plan.format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            views.push(
                ImageView::new(gpu, &view_info)
                    .map_err(|e| RenderError::vk("create_image_view", e))?,
            );
        }

        Ok(Self {
            views,
            images,
            swapchain,
            plan,
        })
    }
}

pub struct PresentationChain {
    gpu: Arc<dyn Gpu>,
    chain: Option<Chain>,
    state: ChainState,
    policy: PresentPolicy,
}

impl PresentationChain {
    pub fn new(ctx: &RenderContext, want: RenderSize, policy: PresentPolicy) -> RenderResult<Self> {
        let mut pc = Self {
            gpu: Arc::clone(ctx.gpu()),
            chain: None,
            state: ChainState::Uninitialized,
            policy,
        };
        pc.chain = Some(Chain::build(ctx, want, policy, vk::SwapchainKHR::null())?);
        pc.state = ChainState::Live;
        Ok(pc)
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Only [`PresentationChain::destroy`] empties the slot; a failed
    /// rebuild keeps the previous generation in place.
    fn live(&self) -> &Chain {
        match &self.chain {
            Some(c) => c,
            None => unreachable!("presentation chain used after destroy"),
        }
    }

    pub fn format(&self) -> vk::Format {
        self.live().plan.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.live().plan.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.live().plan.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.live().images.len()
    }

    pub fn views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.live().views.iter().map(|v| v.raw())
    }

    pub fn mark_stale(&mut self, reason: StaleReason) {
        if self.state == ChainState::Live {
            debug!("presentation chain stale: {reason}");
            self.state = ChainState::Stale;
        }
    }

    pub fn acquire(&mut self, image_available: vk::Semaphore) -> RenderResult<Acquired> {
        let chain = self.live().swapchain.raw();
        match unsafe {
            self.gpu
                .acquire_next_image(chain, u64::MAX, image_available)
        } {
            Ok((_, true)) => {
                self.mark_stale(StaleReason::Suboptimal);
                Ok(Acquired::Stale(StaleReason::Suboptimal))
            }
            Ok((index, false)) => Ok(Acquired::Image(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.mark_stale(StaleReason::OutOfDate);
                Ok(Acquired::Stale(StaleReason::OutOfDate))
            }
            Err(e) => Err(RenderError::vk("acquire_next_image", e)),
        }
    }

    pub fn present(&mut self, index: u32, wait: vk::Semaphore) -> RenderResult<ChainStatus> {
        let gpu = self.gpu.as_ref();
        let swapchains = [self.live().swapchain.raw()];
        let indices = [index];
        let waits = [wait];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let reason = match unsafe { gpu.queue_present(gpu.present_queue(), &info) } {
            Ok(false) => return Ok(ChainStatus::Ready),
            Ok(true) => StaleReason::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => StaleReason::OutOfDate,
            Err(e) => return Err(RenderError::vk("queue_present", e)),
        };
        self.mark_stale(reason);
        Ok(ChainStatus::Stale(reason))
    }

    /// Replaces the chain. The caller has already waited for the device to
    /// go idle and dropped every object that embeds the old extent/format.
    pub fn rebuild(&mut self, ctx: &RenderContext, want: RenderSize) -> RenderResult<()> {
        self.state = ChainState::Rebuilding;
        let old_raw = self
            .chain
            .as_ref()
            .map(|c| c.swapchain.raw())
            .unwrap_or_else(vk::SwapchainKHR::null);
        let new = match Chain::build(ctx, want, self.policy, old_raw) {
            Ok(new) => new,
            Err(e) => {
                self.state = ChainState::Stale;
                return Err(e);
            }
        };
        // retire the previous generation only now that its successor exists
        drop(self.chain.replace(new));
        self.state = ChainState::Live;
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.chain = None;
        self.state = ChainState::Destroyed;
    }
}
