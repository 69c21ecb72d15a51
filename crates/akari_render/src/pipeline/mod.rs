mod builder;
mod description;

pub use builder::{InputLayoutBuilder, PipelineStateBuilder};
pub use description::*;

use std::sync::Arc;

use arrayvec::ArrayVec;
use ash::vk;

use crate::cache::ObjectStore;
use crate::device::NativeDevice;
use crate::error::{Error, Result};
use crate::layout::PipelineLayout;
use crate::renderpass::RenderPass;
use crate::shader::{ShaderBytecode, ShaderStage};

/// Shader modules that only live for the duration of a pipeline creation call.
struct TransientShaderModules<'a> {
    device: &'a dyn NativeDevice,
    modules: ArrayVec<vk::ShaderModule, 6>,
}

impl<'a> TransientShaderModules<'a> {
    fn new(device: &'a dyn NativeDevice) -> Self {
        Self {
            device,
            modules: ArrayVec::new(),
        }
    }
    fn create(&mut self, shader: &ShaderBytecode) -> Result<vk::PipelineShaderStageCreateInfo> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(shader.code());

        let module = unsafe { self.device.create_shader_module(&create_info) }.map_err(|result| {
            Error::ShaderModuleCreation {
                id: shader.id().to_owned(),
                result,
            }
        })?;
        self.modules.push(module);

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(shader.stage().vulkan_stage())
            .module(module)
            .name(shader.entry_point());

        Ok(*stage)
    }
}

impl Drop for TransientShaderModules<'_> {
    fn drop(&mut self) {
        for module in self.modules.drain(..) {
            unsafe {
                self.device.destroy_shader_module(module);
            }
        }
    }
}

pub struct PipelineState {
    device: Arc<dyn NativeDevice>,
    raw: vk::Pipeline,
    hash: u64,
    bind_point: vk::PipelineBindPoint,
    render_pass: Option<Arc<RenderPass>>,
    pipeline_layout: Arc<PipelineLayout>,
    description: PipelineStateDescription,
}

impl PipelineState {
    fn create(
        device: &Arc<dyn NativeDevice>,
        pipeline_cache: vk::PipelineCache,
        description: &PipelineStateDescription,
    ) -> Result<Self> {
        akari_dev::profile_function!();

        let pipeline_layout = description
            .pipeline_layout
            .clone()
            .ok_or(Error::MissingPipelineLayout)?;

        let raw = if description.compute {
            Self::create_compute(device.as_ref(), pipeline_cache, description, &pipeline_layout)?
        } else {
            Self::create_graphics(device.as_ref(), pipeline_cache, description, &pipeline_layout)?
        };

        log::debug!(
            "Created {} pipeline {:#018x}",
            if description.compute { "compute" } else { "graphics" },
            description.hash()
        );

        Ok(Self {
            device: device.clone(),
            raw,
            hash: description.hash(),
            bind_point: description.bind_point(),
            render_pass: description.render_pass.clone(),
            pipeline_layout,
            description: description.clone(),
        })
    }
    fn create_compute(
        device: &dyn NativeDevice,
        pipeline_cache: vk::PipelineCache,
        description: &PipelineStateDescription,
        pipeline_layout: &PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let shader = description
            .stage(ShaderStage::Compute)
            .ok_or(Error::MissingComputeShader)?;

        let mut modules = TransientShaderModules::new(device);
        let stage = modules.create(shader)?;

        let create_info = vk::ComputePipelineCreateInfo::builder()
            .flags(description.flags)
            .stage(stage)
            .layout(pipeline_layout.raw());

        unsafe { device.create_compute_pipeline(pipeline_cache, &create_info) }
            .map_err(Error::PipelineCreation)
    }
    fn create_graphics(
        device: &dyn NativeDevice,
        pipeline_cache: vk::PipelineCache,
        description: &PipelineStateDescription,
        pipeline_layout: &PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let render_pass = description
            .render_pass
            .as_ref()
            .ok_or(Error::MissingRenderPass)?;

        let mut modules = TransientShaderModules::new(device);
        let mut stages = ArrayVec::<vk::PipelineShaderStageCreateInfo, 5>::new();
        let mut tessellated = false;

        for shader in description.stages.iter().flatten() {
            if shader.stage().is_compute() {
                continue;
            }
            tessellated |= matches!(
                shader.stage(),
                ShaderStage::TessControl | ShaderStage::TessEvaluation
            );
            stages.push(modules.create(shader)?);
        }

        if stages.is_empty() {
            return Err(Error::NoShaderStages);
        }

        let arrays = GraphicsStateArrays::new(description);

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&arrays.bindings)
            .vertex_attribute_descriptions(&arrays.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(description.input_assembly.topology)
            .primitive_restart_enable(description.input_assembly.primitive_restart);

        let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
            .patch_control_points(description.input_assembly.patch_control_points);

        let mut viewport = vk::PipelineViewportStateCreateInfo::builder();
        if description.is_dynamic_state_enabled(vk::DynamicState::VIEWPORT) {
            viewport = viewport.viewport_count(description.viewport_count.max(1));
        } else {
            viewport = viewport.viewports(&arrays.viewports);
        }
        if description.is_dynamic_state_enabled(vk::DynamicState::SCISSOR) {
            viewport = viewport.scissor_count(description.scissor_count.max(1));
        } else {
            viewport = viewport.scissors(&arrays.scissors);
        }

        let raster = &description.rasterization;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(raster.depth_clamp)
            .rasterizer_discard_enable(raster.rasterizer_discard)
            .polygon_mode(raster.polygon_mode)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(raster.depth_bias)
            .depth_bias_constant_factor(raster.depth_bias_constant_factor)
            .depth_bias_clamp(raster.depth_bias_clamp)
            .depth_bias_slope_factor(raster.depth_bias_slope_factor)
            .line_width(raster.line_width);

        let samples = &description.multisample;
        let mut multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(samples.samples)
            .sample_shading_enable(samples.sample_shading)
            .min_sample_shading(samples.min_sample_shading)
            .alpha_to_coverage_enable(samples.alpha_to_coverage)
            .alpha_to_one_enable(samples.alpha_to_one);
        if description.sample_mask.is_some() {
            multisample = multisample.sample_mask(&arrays.sample_mask);
        }

        let depth = &description.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth.depth_test)
            .depth_write_enable(depth.depth_write)
            .depth_compare_op(depth.depth_compare_op)
            .depth_bounds_test_enable(depth.depth_bounds_test)
            .stencil_test_enable(depth.stencil_test)
            .front(depth.front.as_vk())
            .back(depth.back.as_vk())
            .min_depth_bounds(depth.min_depth_bounds)
            .max_depth_bounds(depth.max_depth_bounds);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(description.color_blend.logic_op_enable)
            .logic_op(description.color_blend.logic_op)
            .blend_constants(description.color_blend.blend_constants)
            .attachments(&arrays.blend_attachments);

        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&arrays.dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::builder()
            .flags(description.flags)
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(pipeline_layout.raw())
            .render_pass(render_pass.raw())
            .subpass(description.subpass);
        if tessellated {
            create_info = create_info.tessellation_state(&tessellation);
        }

        unsafe { device.create_graphics_pipeline(pipeline_cache, &create_info) }
            .map_err(Error::PipelineCreation)
    }
    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }
    pub fn hash(&self) -> u64 {
        self.hash
    }
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
    pub fn description(&self) -> &PipelineStateDescription {
        &self.description
    }
    /// `None` for compute pipelines.
    pub fn render_pass(&self) -> Option<&Arc<RenderPass>> {
        self.render_pass.as_ref()
    }
    pub fn pipeline_layout(&self) -> &Arc<PipelineLayout> {
        &self.pipeline_layout
    }
    /// Records a `vkCmdBindPipeline` into `command_buffer`.
    ///
    /// # Safety
    /// `command_buffer` must be in the recording state and belong to the device
    /// this pipeline was created on.
    pub unsafe fn bind_to(&self, command_buffer: vk::CommandBuffer) {
        self.device
            .cmd_bind_pipeline(command_buffer, self.bind_point, self.raw);
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.raw);
        }
        log::debug!("Dropped pipeline {:#018x}", self.hash);
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("raw", &self.raw)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("bind_point", &self.bind_point)
            .finish()
    }
}

pub struct PipelineStateManager {
    store: ObjectStore<PipelineState>,
}

impl PipelineStateManager {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            store: ObjectStore::with_capacity("pipeline state", capacity),
        }
    }
    pub fn try_get(&self, hash: u64) -> Option<Arc<PipelineState>> {
        self.store.try_get(hash)
    }
    /// Returns the pipeline for a finalized description, creating it on a miss.
    pub fn get_or_create(
        &self,
        device: &Arc<dyn NativeDevice>,
        pipeline_cache: vk::PipelineCache,
        description: &PipelineStateDescription,
    ) -> Result<Arc<PipelineState>> {
        self.store.get_or_try_create(description.hash(), || {
            PipelineState::create(device, pipeline_cache, description)
        })
    }
    pub fn len(&self) -> usize {
        self.store.len()
    }
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
