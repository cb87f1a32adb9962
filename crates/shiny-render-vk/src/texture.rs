// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use shiny_render::ImageData;
use tracing::debug;

use crate::context::RenderContext;
use crate::error::TransferError;
use crate::handles::{Image, ImageView, Sampler};
use crate::transfer::{mip_levels, TransferEngine};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const WANTED_ANISOTROPY: f32 = 16.0;

/// Sampled RGBA8 texture with a full mip chain. Referenced by descriptor
/// sets, owned by nobody but itself.
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

pub fn clamp_anisotropy(wanted: f32, device_max: f32) -> f32 {
    wanted.min(device_max).max(1.0)
}

impl Texture {
    pub fn from_rgba(
        ctx: &RenderContext,
        transfer: &TransferEngine,
        data: &ImageData,
    ) -> Result<Self, TransferError> {
        let (width, height) = (data.width, data.height);
        if width == 0 || height == 0 {
            return Err(TransferError::EmptyUpload("image"));
        }
        let want = width as usize * height as usize * 4;
        if data.rgba.len() != want {
            return Err(TransferError::PixelSizeMismatch {
                width,
                height,
                got: data.rgba.len(),
                want,
            });
        }

        let levels = mip_levels(width, height);
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = Image::new(ctx, &info)?;
        transfer.upload_image(ctx, &image, &data.rgba)?;

        let view = image
            .view(vk::ImageAspectFlags::COLOR)
            .map_err(|e| TransferError::vk("create_image_view", e))?;

        let anisotropy = clamp_anisotropy(WANTED_ANISOTROPY, ctx.limits.max_sampler_anisotropy);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(levels as f32);
        let sampler = Sampler::new(ctx.gpu(), &sampler_info)
            .map_err(|e| TransferError::vk("create_sampler", e))?;

        debug!("texture {}x{} with {} mips", width, height, levels);
        Ok(Self {
            sampler,
            view,
            image,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.raw()
    }

    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler(),
            image_view: self.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}
