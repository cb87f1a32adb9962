// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::adapter::QueueFamilies;
use crate::error::{SetupError, TransferError};
use crate::gpu::{find_memory_type, Gpu};

/// Depth formats in order of preference.
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Device-session facts shared by every component. Passed by reference to
/// every constructor; components clone the `Arc<dyn Gpu>` they keep.
pub struct RenderContext {
    gpu: Arc<dyn Gpu>,
    pub families: QueueFamilies,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub limits: vk::PhysicalDeviceLimits,
    pub depth_format: vk::Format,
}

impl RenderContext {
    pub fn new(gpu: Arc<dyn Gpu>) -> Result<Self, SetupError> {
        let depth_format = pick_depth_format(gpu.as_ref(), &DEPTH_CANDIDATES).ok_or_else(|| {
            SetupError::vk("pick_depth_format", vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
        })?;
        info!("depth format: {:?}", depth_format);
        Ok(Self {
            families: gpu.queue_families(),
            memory: gpu.memory_properties(),
            limits: gpu.limits(),
            depth_format,
            gpu,
        })
    }

    pub fn gpu(&self) -> &Arc<dyn Gpu> {
        &self.gpu
    }

    pub fn memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, TransferError> {
        find_memory_type(&self.memory, type_bits, flags)
            .ok_or(TransferError::NoSuitableMemoryType { type_bits, flags })
    }

    #[cfg(test)]
    pub fn for_tests(mock: Arc<crate::mock::MockGpu>) -> Self {
        let gpu: Arc<dyn Gpu> = mock;
        match Self::new(gpu) {
            Ok(ctx) => ctx,
            Err(e) => panic!("mock context: {e}"),
        }
    }
}

/// First candidate usable as an optimal-tiling depth attachment.
pub fn pick_depth_format(gpu: &dyn Gpu, candidates: &[vk::Format]) -> Option<vk::Format> {
    candidates.iter().copied().find(|&f| {
        gpu.format_properties(f)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}
