#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use akari_render::vk::{self, Handle};
use akari_render::{Device, DeviceConfig, NativeDevice};
use ash::prelude::VkResult;
use parking_lot::Mutex;

#[derive(Default)]
pub struct Counter {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Counter {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
    pub fn alive(&self) -> usize {
        self.created() - self.destroyed()
    }
}

/// Hands out increasing fake handles and counts every create and destroy call.
#[derive(Default)]
pub struct FakeDevice {
    next_handle: AtomicU64,
    pub render_passes: Counter,
    pub set_layouts: Counter,
    pub pipeline_layouts: Counter,
    pub shader_modules: Counter,
    pub pipelines: Counter,
    pub pipeline_caches: Counter,
    pub binds: AtomicUsize,
    live_handles: Mutex<HashSet<u64>>,
    fail_pipelines: Mutex<Option<vk::Result>>,
    fail_render_passes: Mutex<Option<vk::Result>>,
    fail_pipeline_cache: Mutex<Option<vk::Result>>,
    pub last_set_layout_count: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(1),
            ..Default::default()
        })
    }
    pub fn fail_pipelines_with(&self, result: Option<vk::Result>) {
        *self.fail_pipelines.lock() = result;
    }
    pub fn fail_render_passes_with(&self, result: Option<vk::Result>) {
        *self.fail_render_passes.lock() = result;
    }
    pub fn fail_pipeline_cache_with(&self, result: Option<vk::Result>) {
        *self.fail_pipeline_cache.lock() = result;
    }
    pub fn live_handle_count(&self) -> usize {
        self.live_handles.lock().len()
    }
    fn create<T: Handle>(&self, counter: &Counter) -> T {
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        counter.created.fetch_add(1, Ordering::SeqCst);
        self.live_handles.lock().insert(raw);
        T::from_raw(raw)
    }
    fn destroy<T: Handle>(&self, counter: &Counter, handle: T) {
        let raw = handle.as_raw();
        let removed = self.live_handles.lock().remove(&raw);
        assert!(removed, "handle {:#x} destroyed twice or never created", raw);
        counter.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl NativeDevice for FakeDevice {
    unsafe fn create_render_pass(&self, create_info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        if let Some(result) = *self.fail_render_passes.lock() {
            return Err(result);
        }
        assert!(create_info.subpass_count > 0);
        Ok(self.create(&self.render_passes))
    }
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy(&self.render_passes, render_pass)
    }
    unsafe fn create_descriptor_set_layout(
        &self,
        _create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        Ok(self.create(&self.set_layouts))
    }
    unsafe fn destroy_descriptor_set_layout(&self, set_layout: vk::DescriptorSetLayout) {
        self.destroy(&self.set_layouts, set_layout)
    }
    unsafe fn create_pipeline_layout(
        &self,
        create_info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.last_set_layout_count
            .store(create_info.set_layout_count as usize, Ordering::SeqCst);
        Ok(self.create(&self.pipeline_layouts))
    }
    unsafe fn destroy_pipeline_layout(&self, pipeline_layout: vk::PipelineLayout) {
        self.destroy(&self.pipeline_layouts, pipeline_layout)
    }
    unsafe fn create_shader_module(
        &self,
        create_info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        assert!(create_info.code_size > 0);
        Ok(self.create(&self.shader_modules))
    }
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy(&self.shader_modules, module)
    }
    unsafe fn create_graphics_pipeline(
        &self,
        _pipeline_cache: vk::PipelineCache,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        if let Some(result) = *self.fail_pipelines.lock() {
            return Err(result);
        }
        assert!(create_info.stage_count > 0);
        assert_ne!(create_info.render_pass, vk::RenderPass::null());
        assert_ne!(create_info.layout, vk::PipelineLayout::null());
        Ok(self.create(&self.pipelines))
    }
    unsafe fn create_compute_pipeline(
        &self,
        _pipeline_cache: vk::PipelineCache,
        create_info: &vk::ComputePipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        if let Some(result) = *self.fail_pipelines.lock() {
            return Err(result);
        }
        assert_eq!(create_info.stage.stage, vk::ShaderStageFlags::COMPUTE);
        Ok(self.create(&self.pipelines))
    }
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy(&self.pipelines, pipeline)
    }
    unsafe fn create_pipeline_cache(
        &self,
        _create_info: &vk::PipelineCacheCreateInfo,
    ) -> VkResult<vk::PipelineCache> {
        if let Some(result) = *self.fail_pipeline_cache.lock() {
            return Err(result);
        }
        Ok(self.create(&self.pipeline_caches))
    }
    unsafe fn destroy_pipeline_cache(&self, pipeline_cache: vk::PipelineCache) {
        self.destroy(&self.pipeline_caches, pipeline_cache)
    }
    unsafe fn cmd_bind_pipeline(
        &self,
        _command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _pipeline: vk::Pipeline,
    ) {
        self.binds.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn init_logging() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
}

pub fn device(fake: &Arc<FakeDevice>) -> Arc<Device> {
    init_logging();

    Device::new(
        fake.clone(),
        DeviceConfig {
            debug_name: Some("fake".into()),
            ..Default::default()
        },
    )
}

pub const VERTEX_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
pub const FRAGMENT_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 2, 0];
pub const COMPUTE_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 3, 0];
