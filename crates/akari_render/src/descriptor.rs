use std::collections::BTreeMap;
use std::sync::Arc;

use akari_utils::hash::StructuralHasher;
use ash::vk;

use crate::error::{Error, Result};
use crate::device::NativeDevice;

/// One resource binding of a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLayoutParameter {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
    pub set: u32,
}

impl Default for PipelineLayoutParameter {
    fn default() -> Self {
        Self {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 0,
            stage_flags: vk::ShaderStageFlags::empty(),
            set: 0,
        }
    }
}

impl PipelineLayoutParameter {
    pub fn init(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
        set: u32,
    ) -> &mut Self {
        *self = Self {
            binding,
            descriptor_type,
            count,
            stage_flags,
            set,
        };
        self
    }
    pub fn init_as_uniform_buffer(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::UNIFORM_BUFFER, count, stage_flags, set)
    }
    pub fn init_as_uniform_buffer_dynamic(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, count, stage_flags, set)
    }
    pub fn init_as_storage_buffer(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::STORAGE_BUFFER, count, stage_flags, set)
    }
    pub fn init_as_sampler(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::SAMPLER, count, stage_flags, set)
    }
    pub fn init_as_combined_image_sampler(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, count, stage_flags, set)
    }
    pub fn init_as_sampled_image(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::SAMPLED_IMAGE, count, stage_flags, set)
    }
    pub fn init_as_storage_image(&mut self, binding: u32, stage_flags: vk::ShaderStageFlags, count: u32, set: u32) -> &mut Self {
        self.init(binding, vk::DescriptorType::STORAGE_IMAGE, count, stage_flags, set)
    }
    pub fn clear(&mut self) {
        *self = Self::default();
    }
    fn as_vk(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.descriptor_type,
            descriptor_count: self.count,
            stage_flags: self.stage_flags,
            p_immutable_samplers: std::ptr::null(),
        }
    }
}

// The set index is not part of the record, so the same bindings at different set
// indices share one set layout.
#[derive(Hash)]
struct BindingRecord {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    count: u32,
    stage_flags: vk::ShaderStageFlags,
}

impl From<&PipelineLayoutParameter> for BindingRecord {
    fn from(parameter: &PipelineLayoutParameter) -> Self {
        Self {
            binding: parameter.binding,
            descriptor_type: parameter.descriptor_type,
            count: parameter.count,
            stage_flags: parameter.stage_flags,
        }
    }
}

/// Structural hash of the bindings of one descriptor set, in declaration order.
pub fn set_layout_hash(bindings: &[PipelineLayoutParameter]) -> u64 {
    let records: Vec<BindingRecord> = bindings.iter().map(BindingRecord::from).collect();

    let mut hasher = StructuralHasher::new();
    hasher.combine(&(records.len() as u32)).combine_array(&records);
    hasher.finish()
}

/// Groups parameters by set index. Sets come out ascending, bindings within a
/// set keep the order they were declared in.
pub fn group_by_set(parameters: &[PipelineLayoutParameter]) -> BTreeMap<u32, Vec<PipelineLayoutParameter>> {
    let mut sets: BTreeMap<u32, Vec<PipelineLayoutParameter>> = BTreeMap::new();

    for parameter in parameters {
        sets.entry(parameter.set).or_default().push(*parameter);
    }

    sets
}

/// Fails on the first set index below the highest one that has no bindings.
pub fn check_contiguous_sets(sets: &BTreeMap<u32, Vec<PipelineLayoutParameter>>) -> Result<()> {
    for (expected, &set) in sets.keys().enumerate() {
        if set != expected as u32 {
            return Err(Error::MissingDescriptorSet(expected as u32));
        }
    }

    Ok(())
}

pub struct DescriptorSetLayout {
    device: Arc<dyn NativeDevice>,
    raw: vk::DescriptorSetLayout,
    hash: u64,
    bindings: Vec<PipelineLayoutParameter>,
}

impl DescriptorSetLayout {
    pub(crate) fn create(
        device: &Arc<dyn NativeDevice>,
        hash: u64,
        bindings: &[PipelineLayoutParameter],
    ) -> Result<Self> {
        let vk_bindings: Vec<_> = bindings.iter().map(PipelineLayoutParameter::as_vk).collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        let raw = unsafe { device.create_descriptor_set_layout(&create_info) }
            .map_err(Error::DescriptorSetLayoutCreation)?;

        log::debug!(
            "Created descriptor set layout {:#018x} with {} bindings",
            hash,
            bindings.len()
        );

        Ok(Self {
            device: device.clone(),
            raw,
            hash,
            bindings: bindings.to_vec(),
        })
    }
    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.raw
    }
    pub fn hash(&self) -> u64 {
        self.hash
    }
    /// Get a reference to the descriptor set layout's bindings.
    pub fn bindings(&self) -> &[PipelineLayoutParameter] {
        &self.bindings
    }
    pub fn binding(&self, binding: u32) -> Option<&PipelineLayoutParameter> {
        self.bindings.iter().find(|parameter| parameter.binding == binding)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.raw);
        }
        log::debug!("Dropped descriptor set layout {:#018x}", self.hash);
    }
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("raw", &self.raw)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("bindings", &self.bindings)
            .finish()
    }
}
