// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texquad_core::Error;

/// First memory type allowed by `type_bits` that has every flag in `req`.
pub(crate) fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32, Error> {
    (0..mem.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && mem.memory_types[i as usize].property_flags.contains(req)
        })
        .ok_or(Error::NoSuitableMemoryType {
            type_filter: type_bits,
            flags: req.as_raw(),
        })
}

/// A buffer with its own dedicated allocation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }

    /// Map, copy `bytes` to offset 0, unmap. Memory must be HOST_VISIBLE | HOST_COHERENT.
    pub unsafe fn write(&self, device: &ash::Device, bytes: &[u8]) -> Result<()> {
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        let ptr = device
            .map_memory(
                self.memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .context("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(self.memory);
        Ok(())
    }
}

/// `families` with more than one entry selects CONCURRENT sharing.
pub(crate) unsafe fn create_buffer(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
    families: &[u32],
) -> Result<AllocatedBuffer> {
    let (sharing_mode, queue_family_index_count, p_queue_family_indices) = if families.len() > 1 {
        (
            vk::SharingMode::CONCURRENT,
            families.len() as u32,
            families.as_ptr(),
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
    };
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode,
        queue_family_index_count,
        p_queue_family_indices,
        ..Default::default()
    };
    let buffer = device.create_buffer(&bci, None).context("create_buffer")?;
    let req = device.get_buffer_memory_requirements(buffer);
    let mem_type = find_memory_type(mem_props, req.memory_type_bits, props)?;
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    let memory = device.allocate_memory(&mai, None).context("allocate_memory")?;
    device
        .bind_buffer_memory(buffer, memory, 0)
        .context("bind_buffer_memory")?;
    Ok(AllocatedBuffer {
        buffer,
        memory,
        size,
    })
}

pub(crate) unsafe fn create_staging_buffer(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    bytes: &[u8],
) -> Result<AllocatedBuffer> {
    let staging = create_buffer(
        device,
        mem_props,
        bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        &[],
    )?;
    staging.write(device, bytes)?;
    Ok(staging)
}

/// A pool and the queue its one-shot command buffers are submitted to.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OneShot {
    pub pool: vk::CommandPool,
    pub queue: vk::Queue,
}

impl OneShot {
    pub unsafe fn begin(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = device
            .allocate_command_buffers(&ai)
            .context("allocate_command_buffers(one-shot)")?[0];
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &bi)
            .context("begin_command_buffer(one-shot)")?;
        Ok(cmd)
    }

    /// Submit without a fence, wait for the queue to drain, free the buffer.
    pub unsafe fn end(&self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        device
            .end_command_buffer(cmd)
            .context("end_command_buffer(one-shot)")?;
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())
            .context("queue_submit(one-shot)")?;
        device
            .queue_wait_idle(self.queue)
            .context("queue_wait_idle(one-shot)")?;
        device.free_command_buffers(self.pool, std::slice::from_ref(&cmd));
        Ok(())
    }

    pub unsafe fn run(
        &self,
        device: &ash::Device,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        let cmd = self.begin(device)?;
        record(cmd);
        self.end(device, cmd)
    }
}

pub(crate) unsafe fn copy_buffer(
    device: &ash::Device,
    transfer: OneShot,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    transfer.run(device, |cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
    })
}

/// Device-local buffer with `usage`, filled from `bytes` through a staging copy on the
/// transfer queue. `families` should name every family that will read the result.
pub(crate) unsafe fn create_general_buffer(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    transfer: OneShot,
    families: &[u32],
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<AllocatedBuffer> {
    let staging = create_staging_buffer(device, mem_props, bytes)?;
    let dst = create_buffer(
        device,
        mem_props,
        staging.size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        families,
    );
    let dst = match dst {
        Ok(d) => d,
        Err(e) => {
            staging.destroy(device);
            return Err(e);
        }
    };
    let copied = copy_buffer(device, transfer, staging.buffer, dst.buffer, staging.size);
    staging.destroy(device);
    if let Err(e) = copied {
        dst.destroy(device);
        return Err(e);
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            p.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        p
    }

    #[test]
    fn picks_first_type_with_all_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mem = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&mem, u32::MAX, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&mem, u32::MAX, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn respects_type_filter_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mem = props(&[host, host]);
        assert_eq!(find_memory_type(&mem, 0b10, host).unwrap(), 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let mem = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&mem, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(
            err,
            Error::NoSuitableMemoryType {
                type_filter: 0b1,
                ..
            }
        ));
        assert!(err.to_string().contains("failed to find suitable memory type"));
    }

    #[test]
    fn types_beyond_count_are_ignored() {
        let mut mem = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        mem.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&mem, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
