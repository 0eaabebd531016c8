// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texquad_core::Error;
use texquad_render::{Texels, TextureFilter};
use tracing::info;

use crate::buffer::{create_staging_buffer, find_memory_type, OneShot};

pub(crate) const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Access and stage masks for one layout barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub(crate) fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<TransitionMasks, Error> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(Error::UnsupportedLayoutTransition {
            from: format!("{old:?}"),
            to: format!("{new:?}"),
        }),
    }
}

/// 2D color view, identity swizzle, one mip and layer.
pub(crate) unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let iv_info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping::default(),
        subresource_range: COLOR_RANGE,
        ..Default::default()
    };
    Ok(device
        .create_image_view(&iv_info, None)
        .context("create_image_view")?)
}

#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn create_image(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    width: u32,
    height: u32,
    format: vk::Format,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let ici = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = device.create_image(&ici, None).context("create_image")?;
    let req = device.get_image_memory_requirements(image);
    let mem_type = find_memory_type(mem_props, req.memory_type_bits, props)?;
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    let memory = device
        .allocate_memory(&mai, None)
        .context("allocate_memory(image)")?;
    device
        .bind_image_memory(image, memory, 0)
        .context("bind_image_memory")?;
    Ok((image, memory))
}

// Queue family ownership is not transferred; the image stays on the graphics queue.
pub(crate) unsafe fn transition_image_layout(
    device: &ash::Device,
    graphics: OneShot,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let masks = transition_masks(old, new)?;
    graphics.run(device, |cmd| {
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: masks.src_access,
            dst_access_mask: masks.dst_access,
            old_layout: old,
            new_layout: new,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: COLOR_RANGE,
            ..Default::default()
        };
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&barrier),
        );
    })
}

pub(crate) unsafe fn copy_buffer_to_image(
    device: &ash::Device,
    graphics: OneShot,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    graphics.run(device, |cmd| {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
    })
}

pub(crate) fn sampler_create_info(
    max_anisotropy: f32,
    filter: TextureFilter,
) -> vk::SamplerCreateInfo<'static> {
    let f = match filter {
        TextureFilter::Nearest => vk::Filter::NEAREST,
        TextureFilter::Linear => vk::Filter::LINEAR,
    };
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: f,
        min_filter: f,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: vk::TRUE,
        max_anisotropy,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        mip_lod_bias: 0.0,
        min_lod: 0.0,
        max_lod: 0.0,
        ..Default::default()
    }
}

/// Sampled RGBA8 sRGB image with its view and sampler.
pub(crate) struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub unsafe fn create(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        graphics: OneShot,
        texels: &Texels,
        max_anisotropy: f32,
        filter: TextureFilter,
    ) -> Result<Self> {
        let staging = create_staging_buffer(device, mem_props, &texels.rgba)?;
        let uploaded = Self::upload(device, mem_props, graphics, staging.buffer, texels);
        staging.destroy(device);
        let (image, memory) = uploaded?;

        let view = create_image_view(device, image, TEXTURE_FORMAT)?;
        let sci = sampler_create_info(max_anisotropy, filter);
        let sampler = device.create_sampler(&sci, None).context("create_sampler")?;

        info!(
            "texture: {}x{} ({} bytes), filter {:?}, anisotropy {}",
            texels.width,
            texels.height,
            texels.byte_len(),
            filter,
            max_anisotropy
        );
        Ok(Self {
            image,
            memory,
            view,
            sampler,
        })
    }

    // UNDEFINED -> TRANSFER_DST -> copy -> SHADER_READ_ONLY
    unsafe fn upload(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        graphics: OneShot,
        staging: vk::Buffer,
        texels: &Texels,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let (image, memory) = create_image(
            device,
            mem_props,
            texels.width,
            texels.height,
            TEXTURE_FORMAT,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let steps = || -> Result<()> {
            transition_image_layout(
                device,
                graphics,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            copy_buffer_to_image(device, graphics, staging, image, texels.width, texels.height)?;
            transition_image_layout(
                device,
                graphics,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        };
        if let Err(e) = steps() {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
            return Err(e);
        }
        Ok((image, memory))
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_sampler(self.sampler, None);
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}
