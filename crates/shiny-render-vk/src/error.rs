// SPDX-License-Identifier: CEPL-1.0
//! Error taxonomy of the renderer core.
//!
//! Setup and transfer failures are fatal and bubble up to the run loop.
//! A stale presentation chain is not an error at all: it is reported as
//! [`ChainStatus::Stale`](crate::swapchain::ChainStatus) and handled
//! inside the frame orchestrator.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no suitable adapter: {}", rejected.join("; "))]
    NoSuitableAdapter { rejected: Vec<String> },

    #[error("validation layer {0} requested but not available")]
    MissingValidationLayer(String),

    #[error("instance extension {0} required but not available")]
    MissingInstanceExtension(String),

    #[error("failed to load the Vulkan library: {0}")]
    Loader(String),

    #[error("window handle unavailable: {0}")]
    WindowHandle(String),

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("asset not found: {}", path.display())]
    MissingAsset { path: PathBuf },

    #[error("no memory type matches bits {type_bits:#x} with {flags:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("format {0:?} does not support linear blits, cannot build mipmaps")]
    LinearBlitUnsupported(vk::Format),

    #[error("refusing to upload an empty {0}")]
    EmptyUpload(&'static str),

    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("pixel buffer holds {got} bytes, {width}x{height} RGBA8 needs {want}")]
    PixelSizeMismatch {
        width: u32,
        height: u32,
        got: usize,
        want: usize,
    },

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("device lost during {call}")]
    DeviceLost { call: &'static str },

    #[error("shader blob {}: {reason}", path.display())]
    Shader { path: PathBuf, reason: String },

    #[error("descriptor pool holds at most {max} drawables")]
    TooManyDrawables { max: u32 },

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    pub fn vk(call: &'static str, result: vk::Result) -> Self {
        if result == vk::Result::ERROR_DEVICE_LOST {
            RenderError::DeviceLost { call }
        } else {
            RenderError::Vulkan { call, result }
        }
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RenderError::DeviceLost { .. }
                | RenderError::Transfer(TransferError::Vulkan {
                    result: vk::Result::ERROR_DEVICE_LOST,
                    ..
                })
                | RenderError::Setup(SetupError::Vulkan {
                    result: vk::Result::ERROR_DEVICE_LOST,
                    ..
                })
        )
    }
}

impl TransferError {
    pub fn vk(call: &'static str, result: vk::Result) -> Self {
        TransferError::Vulkan { call, result }
    }
}

impl SetupError {
    pub fn vk(call: &'static str, result: vk::Result) -> Self {
        SetupError::Vulkan { call, result }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
