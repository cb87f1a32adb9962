// SPDX-License-Identifier: CEPL-1.0
//! Descriptor/pipeline layouts and the offscreen, composition and debug
//! pipelines.
//!
//! One five-binding set layout serves both descriptor scopes: set 0 is
//! frame-global (camera, G-buffer samplers, lights), set 1 is per-drawable
//! (model matrix, diffuse, normal map).

use std::ffi::CStr;
use std::fs::File;
use std::mem::{offset_of, size_of};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use shiny_render::{ShaderPaths, Vertex};
use tracing::{debug, info};

use crate::attachments::RenderTargets;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::gpu::Gpu;
use crate::handles::{DescriptorSetLayout, Pipeline, PipelineCache, PipelineLayout, ShaderModule};

const ENTRY: &CStr = c"main";

pub const BINDING_VERTEX_UBO: u32 = 0;
pub const BINDING_SAMPLERS: [u32; 3] = [1, 2, 3];
pub const BINDING_FRAGMENT_UBO: u32 = 4;

pub const SET_GLOBAL: u32 = 0;
pub const SET_DRAWABLE: u32 = 1;

/// SPIR-V words for the three pipelines, read once at startup.
#[derive(Clone, Debug)]
pub struct ShaderBlobs {
    pub offscreen_vert: Vec<u32>,
    pub offscreen_frag: Vec<u32>,
    pub composition_vert: Vec<u32>,
    pub composition_frag: Vec<u32>,
    pub debug_vert: Vec<u32>,
    pub debug_frag: Vec<u32>,
}

fn read_blob(path: &Path) -> RenderResult<Vec<u32>> {
    let shader_err = |reason: String| RenderError::Shader {
        path: PathBuf::from(path),
        reason,
    };
    let mut file = File::open(path).map_err(|e| shader_err(e.to_string()))?;
    let words = ash::util::read_spv(&mut file).map_err(|e| shader_err(e.to_string()))?;
    if words.is_empty() {
        return Err(shader_err("empty blob".into()));
    }
    debug!("shader {} ({} words)", path.display(), words.len());
    Ok(words)
}

impl ShaderBlobs {
    pub fn load(paths: &ShaderPaths) -> RenderResult<Self> {
        Ok(Self {
            offscreen_vert: read_blob(&paths.offscreen_vert)?,
            offscreen_frag: read_blob(&paths.offscreen_frag)?,
            composition_vert: read_blob(&paths.composition_vert)?,
            composition_frag: read_blob(&paths.composition_frag)?,
            debug_vert: read_blob(&paths.debug_vert)?,
            debug_frag: read_blob(&paths.debug_frag)?,
        })
    }
}

pub fn set_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 5] {
    let binding = |binding: u32, ty: vk::DescriptorType, stage: vk::ShaderStageFlags| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage)
    };
    let sampler = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    [
        binding(BINDING_VERTEX_UBO, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        binding(BINDING_SAMPLERS[0], sampler, fragment),
        binding(BINDING_SAMPLERS[1], sampler, fragment),
        binding(BINDING_SAMPLERS[2], sampler, fragment),
        binding(BINDING_FRAGMENT_UBO, vk::DescriptorType::UNIFORM_BUFFER, fragment),
    ]
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// position, uv, color, normal, tangent
pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 5] {
    let attr = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    };
    let vec3 = vk::Format::R32G32B32_SFLOAT;
    [
        attr(0, vec3, offset_of!(Vertex, pos)),
        attr(1, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        attr(2, vec3, offset_of!(Vertex, color)),
        attr(3, vec3, offset_of!(Vertex, normal)),
        attr(4, vec3, offset_of!(Vertex, tangent)),
    ]
}

/// Layout objects that outlive chain rebuilds.
pub struct PipelineBase {
    cache: PipelineCache,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
}

impl PipelineBase {
    pub fn new(ctx: &RenderContext) -> RenderResult<Self> {
        let gpu = ctx.gpu();
        let bindings = set_layout_bindings();
        let set_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let set_layout = DescriptorSetLayout::new(gpu, &set_info)
            .map_err(|e| RenderError::vk("create_descriptor_set_layout", e))?;

        // set 0 frame-global, set 1 per-drawable
        let sets = [set_layout.raw(), set_layout.raw()];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&sets);
        let layout = PipelineLayout::new(gpu, &layout_info)
            .map_err(|e| RenderError::vk("create_pipeline_layout", e))?;

        let cache = PipelineCache::new(gpu, &vk::PipelineCacheCreateInfo::default())
            .map_err(|e| RenderError::vk("create_pipeline_cache", e))?;

        Ok(Self {
            cache,
            layout,
            set_layout,
        })
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.raw()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.raw()
    }
}

struct PipelineDesc<'a> {
    name: &'static str,
    vert: &'a [u32],
    frag: &'a [u32],
    pass: vk::RenderPass,
    vertex_input: bool,
    color_attachments: usize,
    cull: vk::CullModeFlags,
}

fn shader_module(gpu: &Arc<dyn Gpu>, words: &[u32]) -> RenderResult<ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(words);
    ShaderModule::new(gpu, &info).map_err(|e| RenderError::vk("create_shader_module", e))
}

fn build(ctx: &RenderContext, base: &PipelineBase, desc: PipelineDesc<'_>) -> RenderResult<Pipeline> {
    let gpu = ctx.gpu();
    // modules only need to live until the pipeline exists
    let vert = shader_module(gpu, desc.vert)?;
    let frag = shader_module(gpu, desc.frag)?;
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert.raw())
            .name(ENTRY),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag.raw())
            .name(ENTRY),
    ];

    let bindings = [vertex_binding()];
    let attributes = vertex_attributes();
    let vertex_input = if desc.vertex_input {
        vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes)
    } else {
        vk::PipelineVertexInputStateCreateInfo::default()
    };

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    // counts only; viewport and scissor are dynamic
    let viewport = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let raster = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(desc.cull)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let depth = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
    let blend_attachments = vec![
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        desc.color_attachments
    ];
    let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport)
        .rasterization_state(&raster)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth)
        .color_blend_state(&blend)
        .dynamic_state(&dynamic)
        .layout(base.layout())
        .render_pass(desc.pass)
        .subpass(0);

    let pipeline = Pipeline::new(gpu, &base.cache, &info)
        .map_err(|e| RenderError::vk("create_graphics_pipelines", e))?;
    debug!("pipeline {} built", desc.name);
    Ok(pipeline)
}

/// The three pipelines of one chain generation.
pub struct Pipelines {
    debug: Pipeline,
    composition: Pipeline,
    offscreen: Pipeline,
}

impl Pipelines {
    pub fn new(
        ctx: &RenderContext,
        base: &PipelineBase,
        shaders: &ShaderBlobs,
        targets: &RenderTargets,
    ) -> RenderResult<Self> {
        let offscreen = build(
            ctx,
            base,
            PipelineDesc {
                name: "offscreen",
                vert: &shaders.offscreen_vert,
                frag: &shaders.offscreen_frag,
                pass: targets.offscreen_pass(),
                vertex_input: true,
                color_attachments: 3,
                cull: vk::CullModeFlags::BACK,
            },
        )?;
        // full-screen quad comes from gl_VertexIndex, winding is irrelevant
        let composition = build(
            ctx,
            base,
            PipelineDesc {
                name: "composition",
                vert: &shaders.composition_vert,
                frag: &shaders.composition_frag,
                pass: targets.composition_pass(),
                vertex_input: false,
                color_attachments: 1,
                cull: vk::CullModeFlags::NONE,
            },
        )?;
        let debug = build(
            ctx,
            base,
            PipelineDesc {
                name: "debug",
                vert: &shaders.debug_vert,
                frag: &shaders.debug_frag,
                pass: targets.composition_pass(),
                vertex_input: true,
                color_attachments: 1,
                cull: vk::CullModeFlags::BACK,
            },
        )?;
        info!("pipelines ready (offscreen, composition, debug)");
        Ok(Self {
            debug,
            composition,
            offscreen,
        })
    }

    pub fn offscreen(&self) -> vk::Pipeline {
        self.offscreen.raw()
    }

    pub fn composition(&self) -> vk::Pipeline {
        self.composition.raw()
    }

    pub fn debug(&self) -> vk::Pipeline {
        self.debug.raw()
    }
}

#[cfg(test)]
pub(crate) fn test_shaders() -> ShaderBlobs {
    // magic number plus a few words; the mock only checks the size
    let blob = vec![0x0723_0203, 0x0001_0000, 0, 1, 0];
    ShaderBlobs {
        offscreen_vert: blob.clone(),
        offscreen_frag: blob.clone(),
        composition_vert: blob.clone(),
        composition_frag: blob.clone(),
        debug_vert: blob.clone(),
        debug_frag: blob,
    }
}
