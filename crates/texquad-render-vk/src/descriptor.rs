// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texquad_math::UniformBufferObject;

use crate::buffer::{create_buffer, AllocatedBuffer};
use crate::texture::Texture;
use crate::MAX_FRAMES_IN_FLIGHT;

pub(crate) const UBO_SIZE: vk::DeviceSize =
    std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;

/// One host-visible uniform buffer per frame in flight.
pub(crate) unsafe fn create_uniform_buffers(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
) -> Result<Vec<AllocatedBuffer>> {
    let mut ubufs = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        let b = create_buffer(
            device,
            mem_props,
            UBO_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &[],
        );
        match b {
            Ok(b) => ubufs.push(b),
            Err(e) => {
                for b in &ubufs {
                    b.destroy(device);
                }
                return Err(e);
            }
        }
    }
    Ok(ubufs)
}

pub(crate) fn descriptor_pool_sizes() -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
        },
    ]
}

pub(crate) unsafe fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let pool_sizes = descriptor_pool_sizes();
    let pool_ci = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        max_sets: MAX_FRAMES_IN_FLIGHT as u32,
        pool_size_count: pool_sizes.len() as u32,
        p_pool_sizes: pool_sizes.as_ptr(),
        ..Default::default()
    };
    Ok(device
        .create_descriptor_pool(&pool_ci, None)
        .context("create_descriptor_pool")?)
}

/// Set `i` points at uniform buffer `i` (binding 0) and the texture (binding 1).
pub(crate) unsafe fn create_descriptor_sets(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    ubufs: &[AllocatedBuffer],
    texture: &Texture,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![set_layout; MAX_FRAMES_IN_FLIGHT];
    let alloc = vk::DescriptorSetAllocateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
        descriptor_pool: pool,
        descriptor_set_count: layouts.len() as u32,
        p_set_layouts: layouts.as_ptr(),
        ..Default::default()
    };
    let sets = device
        .allocate_descriptor_sets(&alloc)
        .context("allocate_descriptor_sets")?;

    let image_info = vk::DescriptorImageInfo {
        sampler: texture.sampler,
        image_view: texture.view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    let buffer_infos: Vec<vk::DescriptorBufferInfo> = ubufs
        .iter()
        .map(|b| vk::DescriptorBufferInfo {
            buffer: b.buffer,
            offset: 0,
            range: UBO_SIZE,
        })
        .collect();

    let mut writes = Vec::with_capacity(sets.len() * 2);
    for (set, info) in sets.iter().zip(&buffer_infos) {
        writes.push(vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: *set,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: info,
            ..Default::default()
        });
        writes.push(vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: *set,
            dst_binding: 1,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &image_info,
            ..Default::default()
        });
    }
    device.update_descriptor_sets(&writes, &[]);
    Ok(sets)
}

pub(crate) unsafe fn update_uniform_buffer(
    device: &ash::Device,
    ubuf: &AllocatedBuffer,
    ubo: &UniformBufferObject,
) -> Result<()> {
    ubuf.write(device, bytemuck::bytes_of(ubo))
}
