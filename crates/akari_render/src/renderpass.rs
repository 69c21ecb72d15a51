use std::collections::BTreeMap;
use std::sync::Arc;

use akari_utils::hash::StructuralHasher;
use ash::vk;

use crate::cache::ObjectStore;
use crate::device::{Device, NativeDevice};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub flags: vk::AttachmentDescriptionFlags,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentDescription {
    fn as_vk(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            flags: self.flags,
            format: self.format,
            samples: self.samples,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: self.stencil_load_op,
            stencil_store_op: self.stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    pub attachment: u32,
    pub layout: vk::ImageLayout,
}

impl AttachmentReference {
    pub const UNUSED: Self = Self {
        attachment: vk::ATTACHMENT_UNUSED,
        layout: vk::ImageLayout::UNDEFINED,
    };

    fn as_vk(&self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.attachment,
            layout: self.layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub dependency_flags: vk::DependencyFlags,
}

impl SubpassDependency {
    fn as_vk(&self) -> vk::SubpassDependency {
        vk::SubpassDependency {
            src_subpass: self.src_subpass,
            dst_subpass: self.dst_subpass,
            src_stage_mask: self.src_stage_mask,
            dst_stage_mask: self.dst_stage_mask,
            src_access_mask: self.src_access_mask,
            dst_access_mask: self.dst_access_mask,
            dependency_flags: self.dependency_flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpassDescription {
    pub bind_point: vk::PipelineBindPoint,
    pub inputs: Vec<AttachmentReference>,
    pub colors: Vec<AttachmentReference>,
    /// Either empty or exactly as long as `colors`.
    pub resolves: Vec<AttachmentReference>,
    pub preserves: Vec<u32>,
    pub depth: Option<AttachmentReference>,
}

impl Default for SubpassDescription {
    fn default() -> Self {
        Self {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            inputs: Vec::new(),
            colors: Vec::new(),
            resolves: Vec::new(),
            preserves: Vec::new(),
            depth: None,
        }
    }
}

// Counts go in with the bind point so that moving an attachment from one
// reference list to another changes the hash.
#[derive(Hash)]
struct SubpassHeader {
    bind_point: vk::PipelineBindPoint,
    inputs: u32,
    colors: u32,
    resolves: u32,
    preserves: u32,
    has_depth: bool,
}

#[derive(Hash)]
struct RenderPassHeader {
    flags: vk::RenderPassCreateFlags,
    attachments: u32,
    subpasses: u32,
    dependencies: u32,
}

/// Owned description of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassDescription {
    pub flags: vk::RenderPassCreateFlags,
    pub attachments: Vec<AttachmentDescription>,
    pub dependencies: Vec<SubpassDependency>,
    pub subpasses: BTreeMap<u32, SubpassDescription>,
    /// (attachment, swapchain image id) pairs. Bookkeeping only, not hashed.
    pub swapchain_links: Vec<(u32, u32)>,
    hash: u64,
}

impl RenderPassDescription {
    pub fn hash(&self) -> u64 {
        self.hash
    }
    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }
    pub fn color_attachment_count(&self, subpass: u32) -> u32 {
        self.subpasses
            .get(&subpass)
            .map_or(0, |subpass| subpass.colors.len() as u32)
    }
    pub fn swapchain_id(&self, attachment: u32) -> Option<u32> {
        self.swapchain_links
            .iter()
            .find(|(linked, _)| *linked == attachment)
            .map(|(_, id)| *id)
    }
    /// Subpass ids must be exactly `0..count`.
    pub fn verify_subpasses(&self) -> bool {
        match self.subpasses.keys().next_back() {
            Some(&max_id) => max_id as usize + 1 == self.subpasses.len(),
            None => false,
        }
    }
    fn check_subpasses(&self) -> Result<()> {
        match self.subpasses.keys().next_back() {
            None => Err(Error::NoSubpasses),
            Some(&max_id) if max_id as usize + 1 != self.subpasses.len() => {
                Err(Error::NonContiguousSubpasses {
                    count: self.subpass_count(),
                    max_id,
                })
            }
            Some(_) => Ok(()),
        }
    }
    pub fn update_hash(&mut self) -> u64 {
        let mut hasher = StructuralHasher::new();

        hasher
            .combine(&RenderPassHeader {
                flags: self.flags,
                attachments: self.attachments.len() as u32,
                subpasses: self.subpass_count(),
                dependencies: self.dependencies.len() as u32,
            })
            .combine_array(&self.attachments)
            .combine_array(&self.dependencies);

        for subpass in self.subpasses.values() {
            hasher.combine(&SubpassHeader {
                bind_point: subpass.bind_point,
                inputs: subpass.inputs.len() as u32,
                colors: subpass.colors.len() as u32,
                resolves: subpass.resolves.len() as u32,
                preserves: subpass.preserves.len() as u32,
                has_depth: subpass.depth.is_some(),
            });

            if let Some(depth) = &subpass.depth {
                hasher.combine(depth);
            }

            hasher
                .combine_array(&subpass.inputs)
                .combine_array(&subpass.colors)
                .combine_array(&subpass.resolves)
                .combine_array(&subpass.preserves);
        }

        self.hash = hasher.finish();
        self.hash
    }
}

pub struct RenderPass {
    device: Arc<dyn NativeDevice>,
    raw: vk::RenderPass,
    hash: u64,
    description: RenderPassDescription,
}

impl RenderPass {
    fn create(device: &Arc<dyn NativeDevice>, description: &RenderPassDescription) -> Result<Self> {
        akari_dev::profile_function!();

        let attachments: Vec<_> = description
            .attachments
            .iter()
            .map(AttachmentDescription::as_vk)
            .collect();
        let dependencies: Vec<_> = description
            .dependencies
            .iter()
            .map(SubpassDependency::as_vk)
            .collect();

        struct SubpassRefs {
            inputs: Vec<vk::AttachmentReference>,
            colors: Vec<vk::AttachmentReference>,
            resolves: Vec<vk::AttachmentReference>,
            depth: Option<vk::AttachmentReference>,
        }

        let refs: Vec<_> = description
            .subpasses
            .values()
            .map(|subpass| SubpassRefs {
                inputs: subpass.inputs.iter().map(AttachmentReference::as_vk).collect(),
                colors: subpass.colors.iter().map(AttachmentReference::as_vk).collect(),
                resolves: subpass
                    .resolves
                    .iter()
                    .map(AttachmentReference::as_vk)
                    .collect(),
                depth: subpass.depth.as_ref().map(AttachmentReference::as_vk),
            })
            .collect();

        let subpasses: Vec<_> = description
            .subpasses
            .values()
            .zip(refs.iter())
            .map(|(subpass, refs)| {
                let mut vk_subpass = vk::SubpassDescription::builder()
                    .pipeline_bind_point(subpass.bind_point)
                    .input_attachments(&refs.inputs)
                    .color_attachments(&refs.colors)
                    .preserve_attachments(&subpass.preserves);

                if !refs.resolves.is_empty() {
                    vk_subpass = vk_subpass.resolve_attachments(&refs.resolves);
                }
                if let Some(depth) = &refs.depth {
                    vk_subpass = vk_subpass.depth_stencil_attachment(depth);
                }

                *vk_subpass
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .flags(description.flags)
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let raw = unsafe { device.create_render_pass(&create_info) }
            .map_err(Error::RenderPassCreation)?;

        log::debug!(
            "Created render pass {:#018x} ({} attachments, {} subpasses)",
            description.hash,
            attachments.len(),
            subpasses.len()
        );

        Ok(Self {
            device: device.clone(),
            raw,
            hash: description.hash,
            description: description.clone(),
        })
    }
    pub fn raw(&self) -> vk::RenderPass {
        self.raw
    }
    pub fn hash(&self) -> u64 {
        self.hash
    }
    pub fn description(&self) -> &RenderPassDescription {
        &self.description
    }
    pub fn subpass_count(&self) -> u32 {
        self.description.subpass_count()
    }
    pub fn color_attachment_count(&self, subpass: u32) -> u32 {
        self.description.color_attachment_count(subpass)
    }
    pub fn swapchain_id(&self, attachment: u32) -> Option<u32> {
        self.description.swapchain_id(attachment)
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.raw);
        }
        log::debug!("Dropped render pass {:#018x}", self.hash);
    }
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("raw", &self.raw)
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("subpasses", &self.subpass_count())
            .finish()
    }
}

pub struct RenderPassManager {
    store: ObjectStore<RenderPass>,
}

impl RenderPassManager {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            store: ObjectStore::with_capacity("render pass", capacity),
        }
    }
    pub fn try_get(&self, hash: u64) -> Option<Arc<RenderPass>> {
        self.store.try_get(hash)
    }
    /// Returns the render pass for a finalized description, creating it on a miss.
    pub fn get_or_create(
        &self,
        device: &Arc<dyn NativeDevice>,
        description: &RenderPassDescription,
    ) -> Result<Arc<RenderPass>> {
        self.store.get_or_try_create(description.hash(), || {
            RenderPass::create(device, description)
        })
    }
    pub fn len(&self) -> usize {
        self.store.len()
    }
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Incrementally describes a render pass and resolves it against a [`Device`].
#[derive(Default)]
pub struct RenderPassBuilder {
    description: RenderPassDescription,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&mut self, max_attachments: usize, max_dependencies: usize, max_swapchain_links: usize) {
        self.description = RenderPassDescription {
            attachments: Vec::with_capacity(max_attachments),
            dependencies: Vec::with_capacity(max_dependencies),
            swapchain_links: Vec::with_capacity(max_swapchain_links),
            ..Default::default()
        };
    }
    pub fn set_flags(&mut self, flags: vk::RenderPassCreateFlags) {
        self.description.flags = flags;
    }
    /// Adds a color or input attachment. Stencil operations are `DONT_CARE`.
    ///
    /// `swapchain_id` links the attachment to a swapchain image for the code that
    /// builds framebuffers; it does not change the render pass itself.
    #[allow(clippy::too_many_arguments)]
    pub fn add_attachment(
        &mut self,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
        may_alias: bool,
        swapchain_id: Option<u32>,
    ) -> u32 {
        let index = self.push_attachment(AttachmentDescription {
            flags: alias_flags(may_alias),
            format,
            samples,
            load_op,
            store_op,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout,
            final_layout,
        });

        if let Some(id) = swapchain_id {
            self.description.swapchain_links.push((index, id));
        }

        index
    }
    #[allow(clippy::too_many_arguments)]
    pub fn add_depth_stencil_attachment(
        &mut self,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        initial_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
        depth_load_op: vk::AttachmentLoadOp,
        depth_store_op: vk::AttachmentStoreOp,
        stencil_load_op: vk::AttachmentLoadOp,
        stencil_store_op: vk::AttachmentStoreOp,
        may_alias: bool,
    ) -> u32 {
        self.push_attachment(AttachmentDescription {
            flags: alias_flags(may_alias),
            format,
            samples,
            load_op: depth_load_op,
            store_op: depth_store_op,
            stencil_load_op,
            stencil_store_op,
            initial_layout,
            final_layout,
        })
    }
    fn push_attachment(&mut self, attachment: AttachmentDescription) -> u32 {
        let index = self.description.attachments.len() as u32;
        self.description.attachments.push(attachment);
        index
    }
    fn subpass_mut(&mut self, subpass: u32) -> &mut SubpassDescription {
        self.description.subpasses.entry(subpass).or_default()
    }
    /// Clears a subpass and reserves room for its references.
    pub fn reset_subpass(&mut self, subpass: u32, max_colors: usize, max_inputs: usize, max_preserves: usize) {
        *self.subpass_mut(subpass) = SubpassDescription {
            colors: Vec::with_capacity(max_colors),
            inputs: Vec::with_capacity(max_inputs),
            preserves: Vec::with_capacity(max_preserves),
            ..Default::default()
        };
    }
    pub fn set_subpass_bind_point(&mut self, subpass: u32, bind_point: vk::PipelineBindPoint) {
        self.subpass_mut(subpass).bind_point = bind_point;
    }
    pub fn add_color_to_subpass(&mut self, subpass: u32, attachment: u32, layout: vk::ImageLayout) {
        let subpass = self.subpass_mut(subpass);

        subpass.colors.push(AttachmentReference { attachment, layout });
        if !subpass.resolves.is_empty() {
            subpass.resolves.push(AttachmentReference::UNUSED);
        }
    }
    /// Adds a multisampled color attachment that is resolved into `resolve_attachment`
    /// at the end of the subpass.
    pub fn add_resolved_color_to_subpass(
        &mut self,
        subpass: u32,
        attachment: u32,
        layout: vk::ImageLayout,
        resolve_attachment: u32,
        resolve_layout: vk::ImageLayout,
    ) {
        let subpass = self.subpass_mut(subpass);

        let colors = subpass.colors.len();
        subpass.resolves.resize(colors, AttachmentReference::UNUSED);

        subpass.colors.push(AttachmentReference { attachment, layout });
        subpass.resolves.push(AttachmentReference {
            attachment: resolve_attachment,
            layout: resolve_layout,
        });
    }
    pub fn add_input_to_subpass(&mut self, subpass: u32, attachment: u32, layout: vk::ImageLayout) {
        self.subpass_mut(subpass)
            .inputs
            .push(AttachmentReference { attachment, layout });
    }
    pub fn set_depth_to_subpass(&mut self, subpass: u32, attachment: u32, layout: vk::ImageLayout) {
        self.subpass_mut(subpass).depth = Some(AttachmentReference { attachment, layout });
    }
    pub fn preserve_in_subpass(&mut self, subpass: u32, attachment: u32) {
        self.subpass_mut(subpass).preserves.push(attachment);
    }
    #[allow(clippy::too_many_arguments)]
    pub fn set_subpass_dependency(
        &mut self,
        src_subpass: u32,
        src_stage_mask: vk::PipelineStageFlags,
        src_access_mask: vk::AccessFlags,
        dst_subpass: u32,
        dst_stage_mask: vk::PipelineStageFlags,
        dst_access_mask: vk::AccessFlags,
        by_region: bool,
    ) {
        let dependency_flags = if by_region {
            vk::DependencyFlags::BY_REGION
        } else {
            vk::DependencyFlags::empty()
        };

        self.description.dependencies.push(SubpassDependency {
            src_subpass,
            dst_subpass,
            src_stage_mask,
            dst_stage_mask,
            src_access_mask,
            dst_access_mask,
            dependency_flags,
        });
    }
    pub fn verify_subpasses(&self) -> bool {
        self.description.verify_subpasses()
    }
    pub fn description(&self) -> &RenderPassDescription {
        &self.description
    }
    /// Finalizes the description and returns the matching render pass, creating
    /// it if no equivalent one exists on `device` yet.
    pub fn recreate_render_pass(&mut self, device: &Device) -> Result<Arc<RenderPass>> {
        akari_dev::profile_function!();

        if let Err(err) = self.description.check_subpasses() {
            log::error!("Cannot create render pass: {}", err);
            return Err(err);
        }

        self.description.update_hash();

        device
            .render_pass_manager()
            .get_or_create(device.raw(), &self.description)
    }
}

fn alias_flags(may_alias: bool) -> vk::AttachmentDescriptionFlags {
    if may_alias {
        vk::AttachmentDescriptionFlags::MAY_ALIAS
    } else {
        vk::AttachmentDescriptionFlags::empty()
    }
}
