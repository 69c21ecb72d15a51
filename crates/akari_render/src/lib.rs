pub mod descriptor;
pub mod device;
pub mod error;
pub mod format;
pub mod layout;
pub mod pipeline;
pub mod renderpass;
pub mod shader;

mod cache;

pub use device::Device;
pub use device::DeviceConfig;
pub use device::NativeDevice;
pub use error::*;

pub use descriptor::{DescriptorSetLayout, PipelineLayoutParameter};
pub use layout::*;
pub use pipeline::*;
pub use renderpass::*;
pub use shader::*;

pub use ash::vk;
