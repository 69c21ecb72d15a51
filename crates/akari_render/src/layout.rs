use std::sync::Arc;

use akari_utils::hash::StructuralHasher;
use ash::vk;

use crate::cache::ObjectStore;
use crate::descriptor::{
    check_contiguous_sets, group_by_set, set_layout_hash, DescriptorSetLayout,
    PipelineLayoutParameter,
};
use crate::device::{Device, NativeDevice};
use crate::error::{Error, Result};

pub type RootSignature = PipelineLayout;
pub type RootSignatureBuilder = PipelineLayoutBuilder;
pub type RootSignatureManager = PipelineLayoutManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PushConstantRange {
    pub stage_flags: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    fn as_vk(&self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: self.stage_flags,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// One descriptor set of a finalized pipeline layout description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescription {
    pub set: u32,
    pub hash: u64,
    pub bindings: Vec<PipelineLayoutParameter>,
}

#[derive(Hash)]
struct SetRecord {
    set: u32,
    hash: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineLayoutDescription {
    pub parameters: Vec<PipelineLayoutParameter>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    sets: Vec<SetDescription>,
    hash: u64,
}

impl PipelineLayoutDescription {
    pub fn hash(&self) -> u64 {
        self.hash
    }
    /// Sets in ascending index order. Empty until [`update_hash`](Self::update_hash) ran.
    pub fn sets(&self) -> &[SetDescription] {
        &self.sets
    }
    /// Groups the parameters into sets, hashes every set and then the whole layout.
    pub fn update_hash(&mut self) -> Result<u64> {
        let grouped = group_by_set(&self.parameters);
        check_contiguous_sets(&grouped)?;

        self.sets = grouped
            .into_iter()
            .map(|(set, bindings)| SetDescription {
                set,
                hash: set_layout_hash(&bindings),
                bindings,
            })
            .collect();

        let records: Vec<SetRecord> = self
            .sets
            .iter()
            .map(|set| SetRecord {
                set: set.set,
                hash: set.hash,
            })
            .collect();

        let mut hasher = StructuralHasher::new();
        hasher
            .combine(&(records.len() as u32))
            .combine_array(&records)
            .combine(&(self.push_constant_ranges.len() as u32))
            .combine_array(&self.push_constant_ranges);

        self.hash = hasher.finish();
        Ok(self.hash)
    }
}

pub struct PipelineLayout {
    device: Arc<dyn NativeDevice>,
    raw: vk::PipelineLayout,
    hash: u64,
    description: PipelineLayoutDescription,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    created_sets: Vec<bool>,
}

impl PipelineLayout {
    fn create(
        device: &Arc<dyn NativeDevice>,
        description: &PipelineLayoutDescription,
        set_layouts: Vec<Arc<DescriptorSetLayout>>,
        created_sets: Vec<bool>,
    ) -> Result<Self> {
        akari_dev::profile_function!();

        let vk_set_layouts: Vec<_> = set_layouts.iter().map(|layout| layout.raw()).collect();
        let push_constant_ranges: Vec<_> = description
            .push_constant_ranges
            .iter()
            .map(PushConstantRange::as_vk)
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&vk_set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let raw = unsafe { device.create_pipeline_layout(&create_info) }
            .map_err(Error::PipelineLayoutCreation)?;

        log::debug!(
            "Created pipeline layout {:#018x} ({} sets, {} push constant ranges)",
            description.hash,
            vk_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self {
            device: device.clone(),
            raw,
            hash: description.hash,
            description: description.clone(),
            set_layouts,
            created_sets,
        })
    }
    pub fn raw(&self) -> vk::PipelineLayout {
        self.raw
    }
    pub fn hash(&self) -> u64 {
        self.hash
    }
    pub fn description(&self) -> &PipelineLayoutDescription {
        &self.description
    }
    /// Set layouts indexed by set number.
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }
    pub fn set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.set_layouts.get(set as usize)
    }
    /// Whether creating this layout also created the set layout at `set`, as
    /// opposed to reusing one made for an earlier layout.
    pub fn created_set(&self, set: u32) -> bool {
        self.created_sets.get(set as usize).copied().unwrap_or(false)
    }
    pub fn push_constant_stage_flags(&self) -> vk::ShaderStageFlags {
        self.description
            .push_constant_ranges
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |flags, range| flags | range.stage_flags)
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.raw);
        }
        log::debug!("Dropped pipeline layout {:#018x}", self.hash);
    }
}

impl std::fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("raw", &self.raw)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("sets", &self.set_layouts.len())
            .finish()
    }
}

/// Pipeline layouts and the descriptor set layouts they are made of.
///
/// The set layout store is only ever locked while the pipeline layout store is held.
pub struct PipelineLayoutManager {
    layouts: ObjectStore<PipelineLayout>,
    set_layouts: ObjectStore<DescriptorSetLayout>,
}

impl PipelineLayoutManager {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            layouts: ObjectStore::with_capacity("pipeline layout", capacity),
            set_layouts: ObjectStore::with_capacity("descriptor set layout", capacity),
        }
    }
    pub fn try_get(&self, hash: u64) -> Option<Arc<PipelineLayout>> {
        self.layouts.try_get(hash)
    }
    pub fn try_get_set_layout(&self, hash: u64) -> Option<Arc<DescriptorSetLayout>> {
        self.set_layouts.try_get(hash)
    }
    /// Returns the pipeline layout for a finalized description, creating it and
    /// any missing set layouts on a miss.
    pub fn get_or_create(
        &self,
        device: &Arc<dyn NativeDevice>,
        description: &PipelineLayoutDescription,
    ) -> Result<Arc<PipelineLayout>> {
        self.layouts.get_or_try_create(description.hash(), || {
            let mut set_layouts = Vec::with_capacity(description.sets().len());
            let mut created_sets = Vec::with_capacity(description.sets().len());

            for set in description.sets() {
                let mut created = false;
                let set_layout = self.set_layouts.get_or_try_create(set.hash, || {
                    created = true;
                    DescriptorSetLayout::create(device, set.hash, &set.bindings)
                })?;

                set_layouts.push(set_layout);
                created_sets.push(created);
            }

            PipelineLayout::create(device, description, set_layouts, created_sets)
        })
    }
    pub fn len(&self) -> usize {
        self.layouts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
    pub fn set_layout_count(&self) -> usize {
        self.set_layouts.len()
    }
}

#[derive(Default)]
pub struct PipelineLayoutBuilder {
    description: PipelineLayoutDescription,
}

impl PipelineLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&mut self, binding_count: usize, push_constant_range_count: usize) {
        self.description = PipelineLayoutDescription {
            parameters: Vec::with_capacity(binding_count),
            push_constant_ranges: Vec::with_capacity(push_constant_range_count),
            ..Default::default()
        };
    }
    /// Appends a cleared binding slot to fill in.
    pub fn add_parameter(&mut self) -> &mut PipelineLayoutParameter {
        self.description.parameters.push(PipelineLayoutParameter::default());
        let last = self.description.parameters.len() - 1;
        &mut self.description.parameters[last]
    }
    pub fn add_push_const_range(&mut self) -> &mut PushConstantRange {
        self.description.push_constant_ranges.push(PushConstantRange::default());
        let last = self.description.push_constant_ranges.len() - 1;
        &mut self.description.push_constant_ranges[last]
    }
    pub fn description(&self) -> &PipelineLayoutDescription {
        &self.description
    }
    pub fn recreate_pipeline_layout(&mut self, device: &Device) -> Result<Arc<PipelineLayout>> {
        akari_dev::profile_function!();

        if let Err(err) = self.description.update_hash() {
            log::error!("Cannot create pipeline layout: {}", err);
            return Err(err);
        }

        device
            .pipeline_layout_manager()
            .get_or_create(device.raw(), &self.description)
    }
}
