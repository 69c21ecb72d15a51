use std::sync::Arc;

use ash::{prelude::VkResult, vk};

use crate::layout::PipelineLayoutManager;
use crate::pipeline::PipelineStateManager;
use crate::renderpass::RenderPassManager;

/// The native object creation calls the pipeline cache needs.
///
/// Implemented for [`ash::Device`]. Everything that takes a create info is `unsafe`
/// because create infos carry raw pointers which must stay valid for the call.
pub trait NativeDevice: Send + Sync {
    unsafe fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    unsafe fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout>;
    unsafe fn destroy_descriptor_set_layout(&self, set_layout: vk::DescriptorSetLayout);

    unsafe fn create_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, pipeline_layout: vk::PipelineLayout);

    unsafe fn create_shader_module(
        &self,
        create_info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);

    unsafe fn create_graphics_pipeline(
        &self,
        pipeline_cache: vk::PipelineCache,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn create_compute_pipeline(
        &self,
        pipeline_cache: vk::PipelineCache,
        create_info: &vk::ComputePipelineCreateInfo,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    unsafe fn create_pipeline_cache(
        &self,
        create_info: &vk::PipelineCacheCreateInfo,
    ) -> VkResult<vk::PipelineCache>;
    unsafe fn destroy_pipeline_cache(&self, pipeline_cache: vk::PipelineCache);

    unsafe fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
}

impl NativeDevice for ash::Device {
    unsafe fn create_render_pass(
        &self,
        create_info: &vk::RenderPassCreateInfo,
    ) -> VkResult<vk::RenderPass> {
        ash::Device::create_render_pass(self, create_info, None)
    }
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        ash::Device::destroy_render_pass(self, render_pass, None)
    }
    unsafe fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        ash::Device::create_descriptor_set_layout(self, create_info, None)
    }
    unsafe fn destroy_descriptor_set_layout(&self, set_layout: vk::DescriptorSetLayout) {
        ash::Device::destroy_descriptor_set_layout(self, set_layout, None)
    }
    unsafe fn create_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        ash::Device::create_pipeline_layout(self, create_info, None)
    }
    unsafe fn destroy_pipeline_layout(&self, pipeline_layout: vk::PipelineLayout) {
        ash::Device::destroy_pipeline_layout(self, pipeline_layout, None)
    }
    unsafe fn create_shader_module(
        &self,
        create_info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        ash::Device::create_shader_module(self, create_info, None)
    }
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        ash::Device::destroy_shader_module(self, module, None)
    }
    unsafe fn create_graphics_pipeline(
        &self,
        pipeline_cache: vk::PipelineCache,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = ash::Device::create_graphics_pipelines(
            self,
            pipeline_cache,
            std::slice::from_ref(create_info),
            None,
        )
        .map_err(|(_, result)| result)?;

        Ok(pipelines[0])
    }
    unsafe fn create_compute_pipeline(
        &self,
        pipeline_cache: vk::PipelineCache,
        create_info: &vk::ComputePipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = ash::Device::create_compute_pipelines(
            self,
            pipeline_cache,
            std::slice::from_ref(create_info),
            None,
        )
        .map_err(|(_, result)| result)?;

        Ok(pipelines[0])
    }
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        ash::Device::destroy_pipeline(self, pipeline, None)
    }
    unsafe fn create_pipeline_cache(
        &self,
        create_info: &vk::PipelineCacheCreateInfo,
    ) -> VkResult<vk::PipelineCache> {
        ash::Device::create_pipeline_cache(self, create_info, None)
    }
    unsafe fn destroy_pipeline_cache(&self, pipeline_cache: vk::PipelineCache) {
        ash::Device::destroy_pipeline_cache(self, pipeline_cache, None)
    }
    unsafe fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        ash::Device::cmd_bind_pipeline(self, command_buffer, bind_point, pipeline)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Create an in-memory `VkPipelineCache` and pass it to every pipeline creation call.
    pub use_pipeline_cache: bool,
    /// Initial capacity of each object store.
    pub initial_capacity: usize,
    /// Name used to tell devices apart in logs.
    pub debug_name: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            use_pipeline_cache: true,
            initial_capacity: 32,
            debug_name: None,
        }
    }
}

/// Owns the per device pipeline object stores.
///
/// Builders take a `&Device` and resolve their descriptions against the stores
/// held here. Cached objects are torn down when the device is dropped and no
/// outstanding `Arc` to them remains.
pub struct Device {
    raw: Arc<dyn NativeDevice>,
    config: DeviceConfig,
    pipeline_cache: vk::PipelineCache,

    pipeline_states: PipelineStateManager,
    pipeline_layouts: PipelineLayoutManager,
    render_passes: RenderPassManager,
}

impl Device {
    pub fn new(raw: Arc<dyn NativeDevice>, config: DeviceConfig) -> Arc<Self> {
        let pipeline_cache = if config.use_pipeline_cache {
            Self::create_pipeline_cache(raw.as_ref())
        } else {
            vk::PipelineCache::null()
        };

        let capacity = config.initial_capacity;

        log::debug!(
            "Created pipeline object cache for device {}",
            config.debug_name.as_deref().unwrap_or("<unnamed>")
        );

        Arc::new(Self {
            raw,
            config,
            pipeline_cache,
            pipeline_states: PipelineStateManager::with_capacity(capacity),
            pipeline_layouts: PipelineLayoutManager::with_capacity(capacity),
            render_passes: RenderPassManager::with_capacity(capacity),
        })
    }
    fn create_pipeline_cache(raw: &dyn NativeDevice) -> vk::PipelineCache {
        let create_info = vk::PipelineCacheCreateInfo::builder().initial_data(&[]);

        match unsafe { raw.create_pipeline_cache(&create_info) } {
            Ok(cache) => cache,
            Err(err) => {
                log::warn!(
                    "Failed to create pipeline cache ({}), pipelines will be created without one",
                    err
                );
                vk::PipelineCache::null()
            }
        }
    }
    pub fn raw(&self) -> &Arc<dyn NativeDevice> {
        &self.raw
    }
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }
    pub fn name(&self) -> &str {
        self.config.debug_name.as_deref().unwrap_or("<unnamed>")
    }
    pub fn pipeline_cache(&self) -> vk::PipelineCache {
        self.pipeline_cache
    }
    pub fn render_pass_manager(&self) -> &RenderPassManager {
        &self.render_passes
    }
    pub fn pipeline_layout_manager(&self) -> &PipelineLayoutManager {
        &self.pipeline_layouts
    }
    pub fn pipeline_state_manager(&self) -> &PipelineStateManager {
        &self.pipeline_states
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.pipeline_cache != vk::PipelineCache::null() {
            unsafe {
                self.raw.destroy_pipeline_cache(self.pipeline_cache);
            }
        }

        log::debug!(
            "Dropped pipeline object cache for device {}: {} pipeline states, {} pipeline layouts, {} set layouts, {} render passes",
            self.name(),
            self.pipeline_states.len(),
            self.pipeline_layouts.len(),
            self.pipeline_layouts.set_layout_count(),
            self.render_passes.len()
        );
    }
}
