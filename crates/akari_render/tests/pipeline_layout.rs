mod common;

use std::sync::Arc;

use akari_render::vk;
use akari_render::{Error, PipelineLayoutBuilder, PushConstantRange, RootSignatureBuilder};
use common::FakeDevice;

fn camera_layout(builder: &mut PipelineLayoutBuilder) {
    builder.reset(1, 0);
    builder
        .add_parameter()
        .init_as_uniform_buffer(0, vk::ShaderStageFlags::VERTEX, 1, 0);
}

fn material_layout(builder: &mut PipelineLayoutBuilder) {
    builder.reset(2, 0);
    builder
        .add_parameter()
        .init_as_uniform_buffer(0, vk::ShaderStageFlags::VERTEX, 1, 0);
    builder
        .add_parameter()
        .init_as_sampler(1, vk::ShaderStageFlags::FRAGMENT, 1, 1);
}

#[test]
fn recreating_a_layout_is_idempotent() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder = PipelineLayoutBuilder::new();
    camera_layout(&mut builder);

    let a = builder.recreate_pipeline_layout(&device).unwrap();
    let b = builder.recreate_pipeline_layout(&device).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(fake.pipeline_layouts.created(), 1);
    assert_eq!(fake.set_layouts.created(), 1);
    assert_eq!(device.pipeline_layout_manager().len(), 1);
    assert!(device.pipeline_layout_manager().try_get(a.hash()).is_some());
}

#[test]
fn set_layouts_are_shared_between_pipeline_layouts() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder = PipelineLayoutBuilder::new();
    camera_layout(&mut builder);
    let camera = builder.recreate_pipeline_layout(&device).unwrap();

    material_layout(&mut builder);
    let material = builder.recreate_pipeline_layout(&device).unwrap();

    assert_ne!(camera.hash(), material.hash());
    assert_eq!(fake.pipeline_layouts.created(), 2);
    assert_eq!(fake.set_layouts.created(), 2);
    assert_eq!(device.pipeline_layout_manager().set_layout_count(), 2);

    assert!(Arc::ptr_eq(&camera.set_layouts()[0], &material.set_layouts()[0]));
    assert!(camera.created_set(0));
    assert!(!material.created_set(0));
    assert!(material.created_set(1));
    assert_eq!(fake.last_set_layout_count.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn identical_bindings_at_another_set_index_reuse_the_set_layout() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder = PipelineLayoutBuilder::new();
    builder.reset(2, 0);
    builder
        .add_parameter()
        .init_as_storage_buffer(0, vk::ShaderStageFlags::COMPUTE, 1, 0);
    builder
        .add_parameter()
        .init_as_storage_buffer(0, vk::ShaderStageFlags::COMPUTE, 1, 1);
    let layout = builder.recreate_pipeline_layout(&device).unwrap();

    assert_eq!(layout.set_layouts().len(), 2);
    assert!(Arc::ptr_eq(&layout.set_layouts()[0], &layout.set_layouts()[1]));
    assert_eq!(fake.set_layouts.created(), 1);
    assert!(layout.created_set(0));
    assert!(!layout.created_set(1));
}

#[test]
fn binding_order_is_preserved() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let declare = |builder: &mut PipelineLayoutBuilder, sampler_first: bool| {
        builder.reset(2, 0);
        if sampler_first {
            builder
                .add_parameter()
                .init_as_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT, 1, 0);
        }
        builder
            .add_parameter()
            .init_as_uniform_buffer(0, vk::ShaderStageFlags::VERTEX, 1, 0);
        if !sampler_first {
            builder
                .add_parameter()
                .init_as_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT, 1, 0);
        }
    };

    let mut first = PipelineLayoutBuilder::new();
    declare(&mut first, false);
    let a = first.recreate_pipeline_layout(&device).unwrap();

    let mut second = PipelineLayoutBuilder::new();
    declare(&mut second, true);
    let b = second.recreate_pipeline_layout(&device).unwrap();

    let mut third = PipelineLayoutBuilder::new();
    declare(&mut third, false);
    let c = third.recreate_pipeline_layout(&device).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(fake.pipeline_layouts.created(), 2);

    let bindings = a.set_layouts()[0].bindings();
    assert_eq!(bindings[0].binding, 0);
    assert_eq!(bindings[1].binding, 1);
}

#[test]
fn missing_set_never_reaches_the_device() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder = PipelineLayoutBuilder::new();
    camera_layout(&mut builder);
    builder
        .add_parameter()
        .init_as_storage_image(0, vk::ShaderStageFlags::COMPUTE, 1, 2);

    assert_eq!(
        builder.recreate_pipeline_layout(&device).unwrap_err(),
        Error::MissingDescriptorSet(1)
    );
    assert_eq!(fake.set_layouts.created(), 0);
    assert_eq!(fake.pipeline_layouts.created(), 0);
    assert!(device.pipeline_layout_manager().is_empty());
}

#[test]
fn push_constant_ranges_are_kept() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder: RootSignatureBuilder = PipelineLayoutBuilder::new();
    builder.reset(0, 2);
    *builder.add_push_const_range() = PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: 64,
    };
    *builder.add_push_const_range() = PushConstantRange {
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        offset: 64,
        size: 16,
    };
    let layout = builder.recreate_pipeline_layout(&device).unwrap();

    assert!(layout.set_layouts().is_empty());
    assert_eq!(
        layout.push_constant_stage_flags(),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
    assert_eq!(fake.set_layouts.created(), 0);
    assert_eq!(fake.pipeline_layouts.created(), 1);
}

#[test]
fn set_layouts_outlive_the_device_while_referenced() {
    let fake = FakeDevice::new();
    let device = common::device(&fake);

    let mut builder = PipelineLayoutBuilder::new();
    material_layout(&mut builder);
    let layout = builder.recreate_pipeline_layout(&device).unwrap();

    drop(device);
    assert_eq!(fake.set_layouts.destroyed(), 0);
    assert_eq!(fake.pipeline_layouts.destroyed(), 0);

    drop(layout);
    assert_eq!(fake.pipeline_layouts.destroyed(), 1);
    assert_eq!(fake.set_layouts.destroyed(), 2);
    assert_eq!(fake.live_handle_count(), 0);
}
