use std::hash::{Hash, Hasher};
use std::sync::Arc;

use akari_utils::hash::StructuralHasher;
use arrayvec::ArrayVec;
use ash::vk;

use crate::error::{Error, Result};
use crate::layout::PipelineLayout;
use crate::renderpass::RenderPass;
use crate::shader::{ShaderBytecode, ShaderStage};

pub const MAX_COLOR_ATTACHMENTS: usize = 8;
pub const MAX_DYNAMIC_STATES: usize = 16;

/// Writes all four color components.
pub const COLOR_WRITE_ALL: vk::ColorComponentFlags = vk::ColorComponentFlags::from_raw(0xf);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    /// Only used with tessellation stages.
    pub patch_control_points: u32,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
        }
    }
}

impl Hash for RasterizationState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth_clamp.hash(state);
        self.rasterizer_discard.hash(state);
        self.polygon_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_face.hash(state);
        self.depth_bias.hash(state);
        self.depth_bias_constant_factor.to_bits().hash(state);
        self.depth_bias_clamp.to_bits().hash(state);
        self.depth_bias_slope_factor.to_bits().hash(state);
        self.line_width.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    pub sample_shading: bool,
    pub min_sample_shading: f32,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: false,
            min_sample_shading: 0.0,
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

impl Hash for MultisampleState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.samples.hash(state);
        self.sample_shading.hash(state);
        self.min_sample_shading.to_bits().hash(state);
        self.alpha_to_coverage.hash(state);
        self.alpha_to_one.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    pub fail_op: vk::StencilOp,
    pub pass_op: vk::StencilOp,
    pub depth_fail_op: vk::StencilOp,
    pub compare_op: vk::CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: vk::StencilOp::KEEP,
            pass_op: vk::StencilOp::KEEP,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op: vk::CompareOp::ALWAYS,
            compare_mask: 0,
            write_mask: 0,
            reference: 0,
        }
    }
}

impl StencilOpState {
    pub(crate) fn as_vk(&self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail_op,
            pass_op: self.pass_op,
            depth_fail_op: self.depth_fail_op,
            compare_op: self.compare_op,
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_test: bool,
    pub stencil_test: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            depth_bounds_test: false,
            stencil_test: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
            min_depth_bounds: 0.0,
            max_depth_bounds: 0.0,
        }
    }
}

impl Hash for DepthStencilState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.depth_test.hash(state);
        self.depth_write.hash(state);
        self.depth_compare_op.hash(state);
        self.depth_bounds_test.hash(state);
        self.stencil_test.hash(state);
        self.front.hash(state);
        self.back.hash(state);
        self.min_depth_bounds.to_bits().hash(state);
        self.max_depth_bounds.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub color_blend_op: vk::BlendOp,
    pub src_alpha_blend_factor: vk::BlendFactor,
    pub dst_alpha_blend_factor: vk::BlendFactor,
    pub alpha_blend_op: vk::BlendOp,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ZERO,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ZERO,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: COLOR_WRITE_ALL,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard `src * alpha + dst * (1 - alpha)` blending.
    pub fn alpha_blended() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: COLOR_WRITE_ALL,
        }
    }
    fn as_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable as vk::Bool32,
            src_color_blend_factor: self.src_color_blend_factor,
            dst_color_blend_factor: self.dst_color_blend_factor,
            color_blend_op: self.color_blend_op,
            src_alpha_blend_factor: self.src_alpha_blend_factor,
            dst_alpha_blend_factor: self.dst_alpha_blend_factor,
            alpha_blend_op: self.alpha_blend_op,
            color_write_mask: self.color_write_mask,
        }
    }
}

/// Color blend state without the per attachment array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::CLEAR,
            blend_constants: [0.0; 4],
        }
    }
}

impl Hash for ColorBlendState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.logic_op_enable.hash(state);
        self.logic_op.hash(state);
        for constant in self.blend_constants {
            constant.to_bits().hash(state);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
    fn as_vk(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }
}

impl Hash for Viewport {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in [self.x, self.y, self.width, self.height, self.min_depth, self.max_depth] {
            value.to_bits().hash(state);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
    fn as_vk(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: self.x, y: self.y },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}

/// Owned description of a graphics or compute pipeline.
///
/// The default value matches a freshly reset builder: triangle lists, back face
/// culling with counter clockwise front faces, one opaque color attachment and a
/// `LESS_OR_EQUAL` depth test with depth writes.
#[derive(Clone)]
pub struct PipelineStateDescription {
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    /// Hashed by value when present.
    pub sample_mask: Option<u32>,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub color_blend_attachments: ArrayVec<ColorBlendAttachment, MAX_COLOR_ATTACHMENTS>,
    pub viewport_count: u32,
    pub viewports: Vec<Viewport>,
    pub scissor_count: u32,
    pub scissors: Vec<ScissorRect>,
    pub dynamic_states: ArrayVec<vk::DynamicState, MAX_DYNAMIC_STATES>,
    pub stages: [Option<ShaderBytecode>; 6],
    pub compute: bool,
    pub render_pass: Option<Arc<RenderPass>>,
    pub subpass: u32,
    pub pipeline_layout: Option<Arc<PipelineLayout>>,
    pub flags: vk::PipelineCreateFlags,
    hash: u64,
}

impl Default for PipelineStateDescription {
    fn default() -> Self {
        let mut color_blend_attachments = ArrayVec::new();
        color_blend_attachments.push(ColorBlendAttachment::default());

        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            sample_mask: Some(0x0fff_ffff),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            color_blend_attachments,
            viewport_count: 0,
            viewports: Vec::new(),
            scissor_count: 0,
            scissors: Vec::new(),
            dynamic_states: ArrayVec::new(),
            stages: Default::default(),
            compute: false,
            render_pass: None,
            subpass: 0,
            pipeline_layout: None,
            flags: vk::PipelineCreateFlags::empty(),
            hash: 0,
        }
    }
}

impl PipelineStateDescription {
    pub fn hash(&self) -> u64 {
        self.hash
    }
    pub fn is_dynamic_state_enabled(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }
    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderBytecode> {
        self.stages[stage.index()].as_ref()
    }
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        if self.compute {
            vk::PipelineBindPoint::COMPUTE
        } else {
            vk::PipelineBindPoint::GRAPHICS
        }
    }
    /// Checks that everything needed to create the pipeline has been set.
    pub fn validate(&self) -> Result<()> {
        if self.compute {
            if self.stage(ShaderStage::Compute).is_none() {
                return Err(Error::MissingComputeShader);
            }
        } else {
            if !self.stages.iter().flatten().any(|shader| !shader.stage().is_compute()) {
                return Err(Error::NoShaderStages);
            }
            if self.render_pass.is_none() {
                return Err(Error::MissingRenderPass);
            }
        }

        if self.pipeline_layout.is_none() {
            return Err(Error::MissingPipelineLayout);
        }

        Ok(())
    }
    pub fn update_hash(&mut self) -> u64 {
        let mut hasher = StructuralHasher::new();

        if self.compute {
            if let Some(shader) = self.stage(ShaderStage::Compute) {
                hasher.combine(&StageRecord::from(shader));
            }
        } else {
            hasher
                .combine(&(self.vertex_bindings.len() as u32))
                .combine_array(&self.vertex_bindings)
                .combine(&(self.vertex_attributes.len() as u32))
                .combine_array(&self.vertex_attributes)
                .combine(&self.input_assembly)
                .combine(&self.multisample);

            if let Some(mask) = self.sample_mask {
                hasher.combine(&mask);
            }

            hasher.combine(&self.rasterization);

            if self.viewport_count != 0 {
                hasher.combine(&self.viewport_count);
                if !self.is_dynamic_state_enabled(vk::DynamicState::VIEWPORT) {
                    hasher.combine_array(&self.viewports);
                }
            }

            if self.scissor_count != 0 {
                hasher.combine(&self.scissor_count);
                if !self.is_dynamic_state_enabled(vk::DynamicState::SCISSOR) {
                    hasher.combine_array(&self.scissors);
                }
            }

            hasher
                .combine(&self.depth_stencil)
                .combine(&self.color_blend)
                .combine(&(self.color_blend_attachments.len() as u32))
                .combine_array(&self.color_blend_attachments)
                .combine(&(self.dynamic_states.len() as u32))
                .combine_array(&self.dynamic_states);

            for shader in self.stages.iter().flatten() {
                if !shader.stage().is_compute() {
                    hasher.combine(&StageRecord::from(shader));
                }
            }

            let render_pass_hash = self.render_pass.as_ref().map_or(0, |pass| pass.hash());
            hasher.combine_hash(render_pass_hash).combine(&self.subpass);
        }

        let layout_hash = self.pipeline_layout.as_ref().map_or(0, |layout| layout.hash());
        hasher.combine_hash(layout_hash).combine(&self.flags);

        self.hash = hasher.finish();
        self.hash
    }
}

// Stage slot and entry point go in with the code hash, so the same module
// bound to another stage or entry point is a different pipeline.
#[derive(Hash)]
struct StageRecord<'a> {
    stage: u32,
    entry_point: &'a [u8],
    code: u64,
}

impl<'a> From<&'a ShaderBytecode> for StageRecord<'a> {
    fn from(shader: &'a ShaderBytecode) -> Self {
        Self {
            stage: shader.stage().index() as u32,
            entry_point: shader.entry_point().to_bytes(),
            code: shader.hash(),
        }
    }
}

/// Native create info arrays built from a description right before a pipeline is
/// created. The `vk` structs point into these, so they must outlive the call.
pub(crate) struct GraphicsStateArrays {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub sample_mask: [vk::SampleMask; 1],
}

impl GraphicsStateArrays {
    pub fn new(description: &PipelineStateDescription) -> Self {
        Self {
            bindings: description
                .vertex_bindings
                .iter()
                .map(|binding| vk::VertexInputBindingDescription {
                    binding: binding.binding,
                    stride: binding.stride,
                    input_rate: binding.input_rate,
                })
                .collect(),
            attributes: description
                .vertex_attributes
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: attribute.binding,
                    format: attribute.format,
                    offset: attribute.offset,
                })
                .collect(),
            viewports: description.viewports.iter().map(Viewport::as_vk).collect(),
            scissors: description.scissors.iter().map(ScissorRect::as_vk).collect(),
            blend_attachments: description
                .color_blend_attachments
                .iter()
                .map(ColorBlendAttachment::as_vk)
                .collect(),
            dynamic_states: description.dynamic_states.to_vec(),
            sample_mask: [description.sample_mask.unwrap_or(!0)],
        }
    }
}
