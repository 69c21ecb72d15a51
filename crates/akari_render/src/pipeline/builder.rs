use std::sync::Arc;

use ash::vk;

use super::{
    ColorBlendAttachment, MultisampleState, PipelineState, PipelineStateDescription,
    RasterizationState, ScissorRect, StencilOpState, VertexAttribute, VertexBinding, Viewport,
    MAX_COLOR_ATTACHMENTS, MAX_DYNAMIC_STATES,
};
use crate::device::Device;
use crate::error::Result;
use crate::format::element_size;
use crate::layout::PipelineLayout;
use crate::renderpass::RenderPass;
use crate::shader::{ShaderBytecode, ShaderStage};

/// Incrementally describes a pipeline and resolves it against a [`Device`].
///
/// A new builder starts out in the same state as after [`PipelineStateBuilder::reset`].
#[derive(Default)]
pub struct PipelineStateBuilder {
    description: PipelineStateDescription,
}

impl PipelineStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&mut self) {
        self.description = PipelineStateDescription::default();
    }
    pub fn description(&self) -> &PipelineStateDescription {
        &self.description
    }
    pub fn description_mut(&mut self) -> &mut PipelineStateDescription {
        &mut self.description
    }

    pub fn set_render_pass(&mut self, render_pass: &Arc<RenderPass>, subpass: u32) {
        self.description.render_pass = Some(render_pass.clone());
        self.description.subpass = subpass;
    }
    pub fn set_pipeline_layout(&mut self, pipeline_layout: &Arc<PipelineLayout>) {
        self.description.pipeline_layout = Some(pipeline_layout.clone());
    }
    pub fn set_compute(&mut self, compute: bool) {
        self.description.compute = compute;
    }
    pub fn set_flags(&mut self, flags: vk::PipelineCreateFlags) {
        self.description.flags = flags;
    }

    pub fn set_shader(&mut self, id: &str, entry_point: &str, code: &[u32]) -> Result<()> {
        let stage = ShaderStage::from_id(id)?;
        self.set_shader_stage(stage, id, entry_point, code)
    }
    pub fn set_shader_stage(
        &mut self,
        stage: ShaderStage,
        id: &str,
        entry_point: &str,
        code: &[u32],
    ) -> Result<()> {
        let shader = ShaderBytecode::new(stage, id, entry_point, code)?;
        self.set_shader_bytecode(shader);
        Ok(())
    }
    pub fn set_shader_bytecode(&mut self, shader: ShaderBytecode) {
        let index = shader.stage().index();
        self.description.stages[index] = Some(shader);
    }
    pub fn clear_shader(&mut self, stage: ShaderStage) {
        self.description.stages[stage.index()] = None;
    }

    pub fn set_primitive_topology(&mut self, topology: vk::PrimitiveTopology, primitive_restart: bool) {
        self.description.input_assembly.topology = topology;
        self.description.input_assembly.primitive_restart = primitive_restart;
    }
    pub fn set_patch_control_points(&mut self, patch_control_points: u32) {
        self.description.input_assembly.patch_control_points = patch_control_points;
    }
    pub fn set_rasterization(&mut self, rasterization: RasterizationState) {
        self.description.rasterization = rasterization;
    }
    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) {
        self.description.rasterization.cull_mode = cull_mode;
        self.description.rasterization.front_face = front_face;
    }
    pub fn set_depth_test(&mut self, depth_test: bool, depth_write: bool, compare_op: vk::CompareOp) {
        let depth = &mut self.description.depth_stencil;
        depth.depth_test = depth_test;
        depth.depth_write = depth_write;
        depth.depth_compare_op = compare_op;
    }
    pub fn set_stencil_test(&mut self, front: StencilOpState, back: StencilOpState) {
        let depth = &mut self.description.depth_stencil;
        depth.stencil_test = true;
        depth.front = front;
        depth.back = back;
    }
    pub fn disable_stencil_test(&mut self) {
        self.description.depth_stencil.stencil_test = false;
    }
    pub fn set_multisample(&mut self, multisample: MultisampleState) {
        self.description.multisample = multisample;
    }
    /// `None` leaves the sample mask out of the pipeline, which enables all samples.
    pub fn set_sample_mask(&mut self, sample_mask: Option<u32>) {
        self.description.sample_mask = sample_mask;
    }
    /// Sets the blend state of one color attachment, growing the attachment list
    /// with opaque defaults if needed.
    pub fn set_color_blend_attachment(&mut self, index: usize, state: ColorBlendAttachment) {
        assert!(
            index < MAX_COLOR_ATTACHMENTS,
            "Pipelines can have a maximum of {} color attachments",
            MAX_COLOR_ATTACHMENTS
        );

        let attachments = &mut self.description.color_blend_attachments;
        while attachments.len() <= index {
            attachments.push(ColorBlendAttachment::default());
        }
        attachments[index] = state;
    }
    pub fn set_color_blend_attachment_count(&mut self, count: usize) {
        assert!(
            count <= MAX_COLOR_ATTACHMENTS,
            "Pipelines can have a maximum of {} color attachments",
            MAX_COLOR_ATTACHMENTS
        );

        let attachments = &mut self.description.color_blend_attachments;
        attachments.truncate(count);
        while attachments.len() < count {
            attachments.push(ColorBlendAttachment::default());
        }
    }
    pub fn set_logic_op(&mut self, logic_op: Option<vk::LogicOp>) {
        let color_blend = &mut self.description.color_blend;
        color_blend.logic_op_enable = logic_op.is_some();
        color_blend.logic_op = logic_op.unwrap_or(vk::LogicOp::CLEAR);
    }

    /// Enabling an already enabled state does nothing.
    pub fn enable_dynamic_state(&mut self, state: vk::DynamicState) {
        if self.description.is_dynamic_state_enabled(state) {
            return;
        }

        assert!(
            !self.description.dynamic_states.is_full(),
            "Pipelines can have a maximum of {} dynamic states",
            MAX_DYNAMIC_STATES
        );
        self.description.dynamic_states.push(state);
    }
    /// Removes `state`, keeping the remaining states in order.
    pub fn disable_dynamic_state(&mut self, state: vk::DynamicState) {
        let states = &mut self.description.dynamic_states;
        if let Some(index) = states.iter().position(|enabled| *enabled == state) {
            states.remove(index);
        }
    }
    pub fn is_dynamic_state_enabled(&self, state: vk::DynamicState) -> bool {
        self.description.is_dynamic_state_enabled(state)
    }

    pub fn set_line_width(&mut self, line_width: f32) {
        self.description.rasterization.line_width = line_width;
        self.disable_dynamic_state(vk::DynamicState::LINE_WIDTH);
    }
    pub fn reset_line_width(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::LINE_WIDTH);
    }
    pub fn set_blend_constants(&mut self, blend_constants: [f32; 4]) {
        self.description.color_blend.blend_constants = blend_constants;
        self.disable_dynamic_state(vk::DynamicState::BLEND_CONSTANTS);
    }
    pub fn reset_blend_constants(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::BLEND_CONSTANTS);
    }
    pub fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        let raster = &mut self.description.rasterization;
        raster.depth_bias_constant_factor = constant_factor;
        raster.depth_bias_clamp = clamp;
        raster.depth_bias_slope_factor = slope_factor;
        self.disable_dynamic_state(vk::DynamicState::DEPTH_BIAS);
    }
    pub fn reset_depth_bias(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::DEPTH_BIAS);
    }
    pub fn set_depth_bounds(&mut self, min_depth_bounds: f32, max_depth_bounds: f32, enable_test: bool) {
        let depth = &mut self.description.depth_stencil;
        depth.min_depth_bounds = min_depth_bounds;
        depth.max_depth_bounds = max_depth_bounds;
        depth.depth_bounds_test = enable_test;
        self.disable_dynamic_state(vk::DynamicState::DEPTH_BOUNDS);
    }
    pub fn reset_depth_bounds(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::DEPTH_BOUNDS);
    }
    pub fn set_stencil_compare_mask(&mut self, front: u32, back: u32) {
        self.description.depth_stencil.front.compare_mask = front;
        self.description.depth_stencil.back.compare_mask = back;
        self.disable_dynamic_state(vk::DynamicState::STENCIL_COMPARE_MASK);
    }
    pub fn reset_stencil_compare_mask(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::STENCIL_COMPARE_MASK);
    }
    pub fn set_stencil_write_mask(&mut self, front: u32, back: u32) {
        self.description.depth_stencil.front.write_mask = front;
        self.description.depth_stencil.back.write_mask = back;
        self.disable_dynamic_state(vk::DynamicState::STENCIL_WRITE_MASK);
    }
    pub fn reset_stencil_write_mask(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::STENCIL_WRITE_MASK);
    }
    pub fn set_stencil_reference(&mut self, front: u32, back: u32) {
        self.description.depth_stencil.front.reference = front;
        self.description.depth_stencil.back.reference = back;
        self.disable_dynamic_state(vk::DynamicState::STENCIL_REFERENCE);
    }
    pub fn reset_stencil_reference(&mut self) {
        self.enable_dynamic_state(vk::DynamicState::STENCIL_REFERENCE);
    }
    /// Fixed viewports. An empty slice makes the viewport dynamic.
    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.description.viewport_count = viewports.len() as u32;
        self.description.viewports = viewports.to_vec();

        if viewports.is_empty() {
            self.enable_dynamic_state(vk::DynamicState::VIEWPORT);
        } else {
            self.disable_dynamic_state(vk::DynamicState::VIEWPORT);
        }
    }
    pub fn reset_viewports(&mut self) {
        self.set_viewports(&[]);
    }
    /// Fixed scissor rectangles. An empty slice makes the scissor dynamic.
    pub fn set_scissor_rects(&mut self, scissors: &[ScissorRect]) {
        self.description.scissor_count = scissors.len() as u32;
        self.description.scissors = scissors.to_vec();

        if scissors.is_empty() {
            self.enable_dynamic_state(vk::DynamicState::SCISSOR);
        } else {
            self.disable_dynamic_state(vk::DynamicState::SCISSOR);
        }
    }
    pub fn reset_scissor_rects(&mut self) {
        self.set_scissor_rects(&[]);
    }

    pub fn clear_input_layout(&mut self, element_count: usize, attribute_count: usize) {
        self.description.vertex_bindings = Vec::with_capacity(element_count);
        self.description.vertex_attributes = Vec::with_capacity(attribute_count);
    }
    /// Adds a vertex buffer binding with explicit attributes. The binding index of
    /// the attributes is replaced with the index of the new binding.
    pub fn add_input_element(&mut self, stride: u32, input_rate: vk::VertexInputRate, attributes: &[VertexAttribute]) -> u32 {
        let binding = self.description.vertex_bindings.len() as u32;

        self.description.vertex_bindings.push(VertexBinding {
            binding,
            stride,
            input_rate,
        });
        self.description
            .vertex_attributes
            .extend(attributes.iter().map(|attribute| VertexAttribute {
                binding,
                ..*attribute
            }));

        binding
    }
    /// Clears the vertex input and returns a builder that lays out attributes
    /// back to back.
    pub fn edit_input_layout(&mut self, element_count: usize, attribute_count: usize) -> InputLayoutBuilder<'_> {
        self.clear_input_layout(element_count, attribute_count);

        InputLayoutBuilder {
            description: &mut self.description,
            binding: None,
        }
    }

    /// Finalizes the description and returns the matching pipeline, creating it if
    /// no equivalent one exists on `device` yet.
    pub fn recreate_pipeline_state(&mut self, device: &Device) -> Result<Arc<PipelineState>> {
        akari_dev::profile_function!();

        if let Err(err) = self.description.validate() {
            log::error!("Cannot create pipeline state: {}", err);
            return Err(err);
        }

        self.description.update_hash();

        device.pipeline_state_manager().get_or_create(
            device.raw(),
            device.pipeline_cache(),
            &self.description,
        )
    }
}

struct CurrentBinding {
    index: u32,
    stride: u32,
    attribute_count: u32,
    location: u32,
    offset: u32,
}

/// Appends vertex bindings whose attributes are packed in declaration order.
///
/// ```ignore
/// builder
///     .edit_input_layout(1, 2)
///     .add_input_element(20, vk::VertexInputRate::VERTEX, 2)
///     .add_attribute(vk::Format::R32G32B32_SFLOAT)
///     .add_attribute(vk::Format::R32G32_SFLOAT);
/// ```
pub struct InputLayoutBuilder<'a> {
    description: &'a mut PipelineStateDescription,
    binding: Option<CurrentBinding>,
}

impl<'a> InputLayoutBuilder<'a> {
    /// Starts a new binding that expects `attribute_count` attributes.
    pub fn add_input_element(&mut self, stride: u32, input_rate: vk::VertexInputRate, attribute_count: u32) -> &mut Self {
        let index = self.description.vertex_bindings.len() as u32;

        self.description.vertex_bindings.push(VertexBinding {
            binding: index,
            stride,
            input_rate,
        });
        self.binding = Some(CurrentBinding {
            index,
            stride,
            attribute_count,
            location: 0,
            offset: 0,
        });

        self
    }
    /// Adds the next attribute of the current binding at the next free location and offset.
    ///
    /// # Panics
    /// When no binding was started, the binding already has all its attributes,
    /// the format has no known size or the attribute does not fit in the stride.
    pub fn add_attribute(&mut self, format: vk::Format) -> &mut Self {
        let binding = self
            .binding
            .as_mut()
            .expect("add_input_element must be called before add_attribute");

        assert!(
            binding.location < binding.attribute_count,
            "Too many attributes for binding {}",
            binding.index
        );

        let size = element_size(format)
            .unwrap_or_else(|| panic!("Unsupported vertex attribute format {:?}", format));

        assert!(
            binding.offset + size <= binding.stride,
            "Attribute {:?} does not fit in the {} byte stride of binding {}",
            format,
            binding.stride,
            binding.index
        );

        self.description.vertex_attributes.push(VertexAttribute {
            location: binding.location,
            binding: binding.index,
            format,
            offset: binding.offset,
        });

        binding.location += 1;
        binding.offset += size;

        self
    }
    pub fn shrink_to_fit(&mut self) {
        self.description.vertex_bindings.shrink_to_fit();
        self.description.vertex_attributes.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_states_are_idempotent_and_keep_order() {
        let mut builder = PipelineStateBuilder::new();

        builder.enable_dynamic_state(vk::DynamicState::VIEWPORT);
        builder.enable_dynamic_state(vk::DynamicState::SCISSOR);
        builder.enable_dynamic_state(vk::DynamicState::LINE_WIDTH);
        builder.enable_dynamic_state(vk::DynamicState::VIEWPORT);

        assert_eq!(
            builder.description().dynamic_states.as_slice(),
            &[
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::LINE_WIDTH
            ]
        );

        builder.disable_dynamic_state(vk::DynamicState::VIEWPORT);
        builder.disable_dynamic_state(vk::DynamicState::DEPTH_BIAS);

        assert_eq!(
            builder.description().dynamic_states.as_slice(),
            &[vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH]
        );
        assert!(!builder.is_dynamic_state_enabled(vk::DynamicState::VIEWPORT));
    }

    #[test]
    fn setters_toggle_their_dynamic_state() {
        let mut builder = PipelineStateBuilder::new();

        builder.reset_line_width();
        builder.reset_blend_constants();
        builder.reset_depth_bias();
        builder.reset_depth_bounds();
        builder.reset_stencil_compare_mask();
        builder.reset_stencil_write_mask();
        builder.reset_stencil_reference();
        assert_eq!(builder.description().dynamic_states.len(), 7);

        builder.set_line_width(2.0);
        builder.set_blend_constants([1.0, 0.5, 0.25, 0.0]);
        builder.set_depth_bias(1.0, 0.0, 2.0);
        builder.set_depth_bounds(0.0, 1.0, true);
        builder.set_stencil_compare_mask(0xff, 0x0f);
        builder.set_stencil_write_mask(0xff, 0xff);
        builder.set_stencil_reference(1, 2);
        assert!(builder.description().dynamic_states.is_empty());

        let description = builder.description();
        assert_eq!(description.rasterization.line_width, 2.0);
        assert_eq!(description.color_blend.blend_constants, [1.0, 0.5, 0.25, 0.0]);
        assert_eq!(description.rasterization.depth_bias_slope_factor, 2.0);
        assert!(description.depth_stencil.depth_bounds_test);
        assert_eq!(description.depth_stencil.back.compare_mask, 0x0f);
        assert_eq!(description.depth_stencil.back.reference, 2);
    }

    #[test]
    fn empty_viewports_and_scissors_are_dynamic() {
        let mut builder = PipelineStateBuilder::new();

        builder.set_viewports(&[Viewport::new(640.0, 480.0)]);
        builder.set_scissor_rects(&[ScissorRect::new(640, 480)]);
        assert!(!builder.is_dynamic_state_enabled(vk::DynamicState::VIEWPORT));
        assert_eq!(builder.description().viewport_count, 1);

        builder.reset_viewports();
        builder.reset_scissor_rects();
        assert!(builder.is_dynamic_state_enabled(vk::DynamicState::VIEWPORT));
        assert!(builder.is_dynamic_state_enabled(vk::DynamicState::SCISSOR));
        assert!(builder.description().viewports.is_empty());
    }

    #[test]
    #[should_panic(expected = "maximum of 16 dynamic states")]
    fn dynamic_state_overflow_asserts() {
        let mut builder = PipelineStateBuilder::new();
        for raw in 0..=MAX_DYNAMIC_STATES as i32 {
            builder.enable_dynamic_state(vk::DynamicState::from_raw(1000 + raw));
        }
    }

    #[test]
    fn color_blend_attachments_grow_to_index() {
        let mut builder = PipelineStateBuilder::new();
        builder.set_color_blend_attachment(2, ColorBlendAttachment::alpha_blended());

        let attachments = &builder.description().color_blend_attachments;
        assert_eq!(attachments.len(), 3);
        assert!(!attachments[1].blend_enable);
        assert!(attachments[2].blend_enable);

        builder.set_color_blend_attachment_count(1);
        assert_eq!(builder.description().color_blend_attachments.len(), 1);
    }

    #[test]
    #[should_panic(expected = "maximum of 8 color attachments")]
    fn color_blend_index_out_of_range_asserts() {
        PipelineStateBuilder::new().set_color_blend_attachment(8, ColorBlendAttachment::default());
    }

    #[test]
    fn input_layout_packs_attributes() {
        let mut builder = PipelineStateBuilder::new();
        builder
            .edit_input_layout(2, 3)
            .add_input_element(20, vk::VertexInputRate::VERTEX, 2)
            .add_attribute(vk::Format::R32G32B32_SFLOAT)
            .add_attribute(vk::Format::R32G32_SFLOAT)
            .add_input_element(16, vk::VertexInputRate::INSTANCE, 1)
            .add_attribute(vk::Format::R32G32B32A32_SFLOAT);

        let description = builder.description();
        assert_eq!(description.vertex_bindings.len(), 2);
        assert_eq!(description.vertex_bindings[1].input_rate, vk::VertexInputRate::INSTANCE);

        let attributes = &description.vertex_attributes;
        assert_eq!(attributes.len(), 3);
        assert_eq!((attributes[0].location, attributes[0].offset), (0, 0));
        assert_eq!((attributes[1].location, attributes[1].offset), (1, 12));
        assert_eq!(
            (attributes[2].binding, attributes[2].location, attributes[2].offset),
            (1, 0, 0)
        );
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_attribute_asserts() {
        let mut builder = PipelineStateBuilder::new();
        builder
            .edit_input_layout(1, 1)
            .add_input_element(8, vk::VertexInputRate::VERTEX, 1)
            .add_attribute(vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    #[should_panic(expected = "Too many attributes")]
    fn extra_attribute_asserts() {
        let mut builder = PipelineStateBuilder::new();
        builder
            .edit_input_layout(1, 2)
            .add_input_element(32, vk::VertexInputRate::VERTEX, 1)
            .add_attribute(vk::Format::R32_SFLOAT)
            .add_attribute(vk::Format::R32_SFLOAT);
    }

    #[test]
    fn explicit_input_elements_get_their_binding_index() {
        let mut builder = PipelineStateBuilder::new();
        let attribute = VertexAttribute {
            location: 3,
            binding: 99,
            format: vk::Format::R32G32_SFLOAT,
            offset: 4,
        };

        assert_eq!(builder.add_input_element(12, vk::VertexInputRate::VERTEX, &[]), 0);
        assert_eq!(builder.add_input_element(12, vk::VertexInputRate::VERTEX, &[attribute]), 1);
        assert_eq!(builder.description().vertex_attributes[0].binding, 1);
        assert_eq!(builder.description().vertex_attributes[0].location, 3);
    }

    #[test]
    fn set_shader_picks_stage_from_id() {
        let mut builder = PipelineStateBuilder::new();
        builder.set_shader("lit.frag", "main", &[0x0723_0203]).unwrap();

        assert!(builder.description().stage(ShaderStage::Fragment).is_some());
        assert!(builder.set_shader("lit.hlsl", "main", &[0x0723_0203]).is_err());

        builder.clear_shader(ShaderStage::Fragment);
        assert!(builder.description().stage(ShaderStage::Fragment).is_none());
    }
}
