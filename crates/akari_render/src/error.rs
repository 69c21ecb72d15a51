use ash::vk;
use thiserror::Error;

use crate::shader::ShaderStage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Render pass has no subpasses")]
    NoSubpasses,
    #[error("Subpass ids are not contiguous: {count} subpasses declared, highest id is {max_id}")]
    NonContiguousSubpasses { count: u32, max_id: u32 },
    #[error("Descriptor set {0} is referenced but has no bindings")]
    MissingDescriptorSet(u32),
    #[error("Graphics pipeline state has no render pass")]
    MissingRenderPass,
    #[error("Pipeline state has no pipeline layout")]
    MissingPipelineLayout,
    #[error("Compute pipeline state has no compute shader")]
    MissingComputeShader,
    #[error("Graphics pipeline state has no shader stages")]
    NoShaderStages,
    #[error("Cannot infer shader stage from id \"{0}\", expected a vert/tesc/tese/geom/frag/comp suffix")]
    UnknownShaderStage(String),
    #[error("Shader {id} ({stage}) has an invalid entry point \"{entry_point}\"")]
    InvalidEntryPoint {
        id: String,
        stage: ShaderStage,
        entry_point: String,
    },
    #[error("Shader {0} bytecode is not valid SPIR-V")]
    InvalidBytecode(String),
    #[error("Failed to create render pass: {0}")]
    RenderPassCreation(vk::Result),
    #[error("Failed to create descriptor set layout: {0}")]
    DescriptorSetLayoutCreation(vk::Result),
    #[error("Failed to create pipeline layout: {0}")]
    PipelineLayoutCreation(vk::Result),
    #[error("Failed to create shader module for {id}: {result}")]
    ShaderModuleCreation { id: String, result: vk::Result },
    #[error("Failed to create pipeline: {0}")]
    PipelineCreation(vk::Result),
}

pub type Result<T> = std::result::Result<T, Error>;
